// OpenAPI document for the genpool HTTP API

use genpool_schemas::{
    AdmissionReason, ArtifactMetadata, GenerateAccepted, GenerateRequest, MetadataRecord,
    ReconstructedMetadata, StatsResponse,
};
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health,
        api::generate::generate,
        api::artifacts::stats,
        api::artifacts::list_images,
        api::artifacts::get_metadata,
        api::artifacts::get_image,
    ),
    components(
        schemas(
            GenerateRequest, GenerateAccepted, AdmissionReason,
            ArtifactMetadata, ReconstructedMetadata, MetadataRecord,
            StatsResponse,
            api::ErrorResponse,
            api::HealthResponse,
        )
    ),
    tags(
        (name = "generation", description = "Task submission"),
        (name = "artifacts", description = "Published images, metadata and counters"),
        (name = "health", description = "Liveness")
    ),
    info(
        title = "genpool API",
        version = "0.1.0",
        description = "Bounded image generation queue over a pool of device workers",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;
