use crate::routes::{completions, models, status};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "sluice-server",
    description = "Single-flight gatekeeping proxy for OpenAI-compatible chat completions",
    version = "0.1.0"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(status::StatusApi::openapi());
    root.merge(completions::CompletionsApi::openapi());
    root.merge(models::ModelsApi::openapi());
    root
}
