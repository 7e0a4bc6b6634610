// genpool server library
// Decision: Router, configuration and logging live in the library so tests and the binary share them

pub mod api;
pub mod config;
pub mod openapi;
pub mod telemetry;

pub use api::{router, AppState};
pub use config::ServiceConfig;
pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig};
