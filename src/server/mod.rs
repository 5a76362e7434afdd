//! The dropshot HTTP server fronting the print pipeline.

pub mod context;
pub mod endpoints;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use dropshot::{ApiDescription, ConfigDropshot, HttpServer, ServerBuilder};

use crate::config::Config;
use crate::server::context::Context;

/// Create an API description for the server.
pub fn create_api_description() -> ApiDescription<Arc<Context>> {
    let mut api = ApiDescription::new();
    api.register(endpoints::api_get_schema).unwrap();
    api.register(endpoints::ping).unwrap();
    api.register(endpoints::get_printers).unwrap();
    api.register(endpoints::get_printer_configurations).unwrap();
    api.register(endpoints::print_file).unwrap();
    api
}

/// Create the server, returning its handle and context.
pub async fn create_server(
    bind: &str,
    config: &Config,
    logger: slog::Logger,
) -> Result<(HttpServer<Arc<Context>>, Arc<Context>)> {
    let api = create_api_description();
    let schema = get_openapi(&api)?;

    let config_dropshot = ConfigDropshot {
        bind_address: bind.parse()?,
        // Model uploads can be large.
        default_request_body_max_bytes: 1024 * 1024 * 1024,
        default_handler_task_mode: dropshot::HandlerTaskMode::CancelOnDisconnect,
        ..Default::default()
    };

    let api_context = Arc::new(Context::new(schema, config).await?);

    let server = ServerBuilder::new(api, api_context.clone(), logger)
        .config(config_dropshot)
        .start()
        .map_err(|error| anyhow!("failed to create server: {}", error))?;

    Ok((server, api_context))
}

/// Get the OpenAPI specification for the server.
pub fn get_openapi(api: &ApiDescription<Arc<Context>>) -> Result<serde_json::Value> {
    let version = semver::Version::parse(env!("CARGO_PKG_VERSION"))?;
    api.openapi("print-api", version)
        .description("3D print job orchestration server")
        .json()
        .map_err(|e| e.into())
}

/// Serve requests until shutdown.
pub async fn serve(bind: &str, config: &Config, logger: slog::Logger) -> Result<()> {
    let (server, _context) = create_server(bind, config, logger).await?;
    tracing::info!(bind = bind, "print-api listening");
    server.await.map_err(|error| anyhow!("server failed: {}", error))
}
