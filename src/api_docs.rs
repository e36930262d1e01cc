use crate::api;
use crate::domain::{JobStatus, LogJob};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health_check,
        api::logs::list_logs,
        api::logs::get_log,
    ),
    components(schemas(LogJob, JobStatus)),
    tags(
        (name = "pickup-audit", description = "Pickup point audit log API")
    )
)]
pub struct ApiDoc;
