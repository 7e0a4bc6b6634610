// Service configuration
//
// Everything is read from environment variables once at startup. A value that
// does not parse is reported and replaced by its default; only settings that
// are inconsistent with each other stop the service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use genpool_dispatch::{AdmissionLimits, RetryPolicy, WorkerPoolConfig};

const DEFAULT_OUTPUT_DIR: &str = "./img";
const DEFAULT_QUEUE_SIZE: usize = 100;
const DEFAULT_PAGE_SIZE: usize = 60;
const DEFAULT_DEVICE_COUNT: usize = 1;
const DEFAULT_FORCED_TERMINATION: Duration = Duration::from_millis(1000);

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub http_addr: SocketAddr,
    pub output_dir: PathBuf,
    pub queue_capacity: usize,
    pub limits: AdmissionLimits,
    pub pool: WorkerPoolConfig,
    /// Virtual devices exposed by the built-in backend
    pub device_count: usize,
    /// Maximum names returned by the image listing
    pub listing_page_size: usize,
    /// Bound on publications left by aborted workers, and on blocking work
    /// still running once the pool has stopped
    pub forced_termination: Duration,
    pub cors_origins: Vec<HeaderValue>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            queue_capacity: DEFAULT_QUEUE_SIZE,
            limits: AdmissionLimits::default(),
            pool: WorkerPoolConfig::default(),
            device_count: DEFAULT_DEVICE_COUNT,
            listing_page_size: DEFAULT_PAGE_SIZE,
            forced_termination: DEFAULT_FORCED_TERMINATION,
            cors_origins: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the process environment
    ///
    /// Environment variables:
    /// - `HTTP_ADDR`: listen address (default: "0.0.0.0:5000")
    /// - `OUTPUT_DIR`: output directory (default: "./img")
    /// - `MIN_RESOLUTION` / `MAX_RESOLUTION`: dimension range (default: 256 / 2048)
    /// - `MAX_STEPS`, `MAX_GUIDANCE`, `MAX_PROMPT_LENGTH`: request bounds
    /// - `MAX_QUEUE_SIZE`: queue capacity (default: 100)
    /// - `BATCH_SIZE`: images per task (default: 4)
    /// - `NEGATIVE_PROMPT`: negative prompt sent with every task
    /// - `LISTING_PAGE_SIZE`: names returned by the listing (default: 60)
    /// - `DEVICE_COUNT`: virtual devices for the built-in backend (default: 1)
    /// - `SHUTDOWN_GRACE_MS`, `FAULT_COOLDOWN_MS`, `FORCED_TERMINATION_MS`
    /// - `TASK_MAX_ATTEMPTS`: attempts per task (default: 1)
    /// - `CORS_ALLOWED_ORIGINS`: comma-separated origins (default: none)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env { lookup: &lookup };
        let defaults = Self::default();
        let default_limits = &defaults.limits;
        let default_pool = &defaults.pool;

        let http_addr = env.parse_or("HTTP_ADDR", defaults.http_addr);
        let output_dir = env
            .get("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        let limits = AdmissionLimits {
            min_resolution: env.parse_or("MIN_RESOLUTION", default_limits.min_resolution),
            max_resolution: env.parse_or("MAX_RESOLUTION", default_limits.max_resolution),
            max_steps: env.parse_or("MAX_STEPS", default_limits.max_steps),
            max_guidance: env.parse_or("MAX_GUIDANCE", default_limits.max_guidance),
            max_prompt_length: env.parse_or("MAX_PROMPT_LENGTH", default_limits.max_prompt_length),
            ..AdmissionLimits::default()
        };
        limits.validate().context("Invalid request limits")?;

        let max_attempts = env.parse_or("TASK_MAX_ATTEMPTS", 1u32);
        let retry = if max_attempts > 1 {
            RetryPolicy::exponential().with_max_attempts(max_attempts)
        } else {
            RetryPolicy::no_retry()
        };

        let forced_termination =
            env.millis_or("FORCED_TERMINATION_MS", defaults.forced_termination);

        let pool = WorkerPoolConfig::new()
            .with_batch_size(env.parse_or("BATCH_SIZE", default_pool.batch_size))
            .with_negative_prompt(
                env.get("NEGATIVE_PROMPT")
                    .unwrap_or_else(|| default_pool.negative_prompt.clone()),
            )
            .with_fault_cooldown(env.millis_or("FAULT_COOLDOWN_MS", default_pool.fault_cooldown))
            .with_shutdown_timeout(env.millis_or("SHUTDOWN_GRACE_MS", default_pool.shutdown_timeout))
            .with_forced_termination(forced_termination)
            .with_retry(retry);

        let cors_origins = env
            .get("CORS_ALLOWED_ORIGINS")
            .map(|s| s.split(',').filter_map(|s| s.trim().parse().ok()).collect())
            .unwrap_or_default();

        Ok(Self {
            http_addr,
            output_dir,
            queue_capacity: env.parse_or("MAX_QUEUE_SIZE", defaults.queue_capacity).max(1),
            limits,
            pool,
            device_count: env.parse_or("DEVICE_COUNT", defaults.device_count),
            listing_page_size: env.parse_or("LISTING_PAGE_SIZE", defaults.listing_page_size),
            forced_termination,
            cors_origins,
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + std::fmt::Debug,
    {
        match self.get(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, ?default, "Ignoring unparseable setting");
                default
            }),
        }
    }

    fn millis_or(&self, key: &str, default: Duration) -> Duration {
        Duration::from_millis(self.parse_or(key, default.as_millis() as u64))
    }
}
