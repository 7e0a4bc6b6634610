// genpool Schemas
//
// Decision: This crate is the source of truth for data shared by the HTTP adapter and the dispatch core
// Decision: Minimal dependencies - only serde, serde_json, chrono
// Decision: Optional OpenAPI support via "openapi" feature flag
// Decision: No runtime logic - only type definitions and serialization

pub mod artifact;
pub mod generation;

// Artifact types
pub use artifact::{
    ArtifactMetadata, MetadataRecord, ReconstructedMetadata, StatsResponse, METADATA_LOST,
};

// Generation types
pub use generation::{AdmissionReason, GenerateAccepted, GenerateRequest};
