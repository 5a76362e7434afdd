//! HTTP endpoints of the print server.

use std::{collections::HashMap, sync::Arc};

use dropshot::{endpoint, HttpError, HttpResponseOk, MultipartBody, Path, Query, RequestContext};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Context;
use crate::printer::{PrinterConfigurations, PrinterRecord};

/** Return the OpenAPI schema in JSON format. */
#[endpoint {
    method = GET,
    path = "/",
    tags = ["meta"],
}]
pub async fn api_get_schema(
    rqctx: RequestContext<Arc<Context>>,
) -> Result<HttpResponseOk<serde_json::Value>, HttpError> {
    Ok(HttpResponseOk(rqctx.context().schema.clone()))
}

/// The response from the `/ping` endpoint.
#[derive(Deserialize, Debug, JsonSchema, Serialize)]
pub struct Pong {
    /// The pong response.
    pub message: String,
}

/** Return pong. */
#[endpoint {
    method = GET,
    path = "/ping",
    tags = ["meta"],
}]
pub async fn ping(_rqctx: RequestContext<Arc<Context>>) -> Result<HttpResponseOk<Pong>, HttpError> {
    Ok(HttpResponseOk(Pong {
        message: "pong".to_string(),
    }))
}

/// List every configured printer. Connection credentials never appear in
/// this projection.
#[endpoint {
    method = GET,
    path = "/printers",
    tags = ["printers"],
}]
pub async fn get_printers(
    rqctx: RequestContext<Arc<Context>>,
) -> Result<HttpResponseOk<Vec<PrinterRecord>>, HttpError> {
    tracing::info!("listing printers");
    let ctx = rqctx.context();
    let printers = ctx
        .pipeline
        .store()
        .all_printer_definitions()
        .await
        .map_err(HttpError::from)?;
    Ok(HttpResponseOk(printers))
}

/// The path parameters selecting a printer model.
#[derive(Deserialize, Debug, JsonSchema, Serialize)]
pub struct ModelPathParams {
    /// Manufacturer directory in the configuration store.
    pub manufacturer: String,
    /// Model directory in the configuration store.
    pub model: String,
}

/// The query parameters selecting a configuration subset.
#[derive(Deserialize, Debug, Copy, Clone, JsonSchema, Serialize)]
pub struct ConfigurationQueryParams {
    /// Nozzle size to resolve configuration files for.
    pub nozzle_size: f64,
}

/// Resolve the filament/machine/process configuration files for a model
/// and nozzle size.
#[endpoint {
    method = GET,
    path = "/printers/{manufacturer}/{model}/configurations",
    tags = ["printers"],
}]
pub async fn get_printer_configurations(
    rqctx: RequestContext<Arc<Context>>,
    path_params: Path<ModelPathParams>,
    query_params: Query<ConfigurationQueryParams>,
) -> Result<HttpResponseOk<PrinterConfigurations>, HttpError> {
    let params = path_params.into_inner();
    let query = query_params.into_inner();
    tracing::info!(
        manufacturer = params.manufacturer,
        model = params.model,
        nozzle_size = query.nozzle_size,
        "resolving printer configurations"
    );

    let ctx = rqctx.context();
    let configurations = ctx
        .pipeline
        .store()
        .printer_configurations(&params.manufacturer, &params.model, query.nozzle_size)
        .await
        .map_err(HttpError::from)?;
    Ok(HttpResponseOk(configurations))
}

/// The response from the `/print` endpoint.
#[derive(Deserialize, Debug, JsonSchema, Serialize)]
pub struct PrintJobResponse {
    /// The printer-side destination path(s) of the dispatched job: one
    /// for an FTP printer, one per build plate for a Klipper printer.
    pub file_names: Vec<String>,
}

/** Print a given file. File must be a sliceable 3D model. */
#[endpoint {
    method = POST,
    path = "/print",
    tags = ["print"],
}]
pub async fn print_file(
    rqctx: RequestContext<Arc<Context>>,
    body_param: MultipartBody,
) -> Result<HttpResponseOk<PrintJobResponse>, HttpError> {
    let mut multipart = body_param.content;
    let (file, fields) = parse_multipart_print_request(&mut multipart).await?;
    let file_name = file.file_name.unwrap_or_else(|| "model.stl".to_string());
    tracing::info!(file_name = file_name, "received print request");

    let ctx = rqctx.context();
    let file_names = ctx
        .pipeline
        .run(&fields, &file_name, &file.content)
        .await
        .map_err(HttpError::from)?;
    Ok(HttpResponseOk(PrintJobResponse { file_names }))
}

pub(crate) struct FileAttachment {
    file_name: Option<String>,
    content: bytes::Bytes,
}

/// Possible errors returned by print endpoints.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Some error occurred when processing the multipart upload.
    #[error(transparent)]
    Multer(#[from] multer::Error),

    /// Missing file attachment.
    #[error("Missing file attachment.")]
    MissingFile,
}

impl From<UploadError> for HttpError {
    fn from(err: UploadError) -> Self {
        Self::for_bad_request(None, err.to_string())
    }
}

/// Parses multipart data into the uploaded model file and the remaining
/// form fields.
pub(crate) async fn parse_multipart_print_request(
    multipart: &mut multer::Multipart<'_>,
) -> Result<(FileAttachment, HashMap<String, String>), UploadError> {
    let mut file = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if name == "file" {
            let file_name = field.file_name().map(str::to_owned);
            let content = field.bytes().await?;
            file = Some(FileAttachment { file_name, content });
        } else {
            fields.insert(name, field.text().await?);
        }
    }

    let file = file.ok_or(UploadError::MissingFile)?;
    Ok((file, fields))
}
