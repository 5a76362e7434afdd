//! Application-specific context (state shared by handler functions).

use crate::{config::Config, job::Pipeline, Result, TempDir};

/// State shared by all request handlers.
pub struct Context {
    /// The OpenAPI schema served from the root endpoint, rendered once
    /// at startup.
    pub schema: serde_json::Value,

    /// The print pipeline: configuration store, slicer handle, and the
    /// temporary directory, created once here and reused by every job.
    pub pipeline: Pipeline,
}

impl Context {
    /// Return a new Context. This creates the temporary directory, so it
    /// runs once at startup rather than per request.
    pub async fn new(schema: serde_json::Value, config: &Config) -> Result<Context> {
        let temp = TempDir::new(&config.temp_root).await?;
        Ok(Context {
            schema,
            pipeline: Pipeline::new(config, temp),
        })
    }
}
