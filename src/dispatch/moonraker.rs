//! Multipart G-code upload to Klipper printers through the Moonraker
//! HTTP API.

use std::path::Path;

use crate::{Error, Result};

/// Upload every per-plate G-code file in `directory`, returning one
/// destination path per plate.
pub(crate) async fn upload_gcodes(
    host: &str,
    port: u16,
    route_prefix: Option<&str>,
    api_key: Option<&str>,
    directory: &Path,
    original_file_name: &str,
) -> Result<Vec<String>> {
    let mut url_base = format!("http://{}:{}", host, port);
    if let Some(prefix) = route_prefix {
        url_base = format!("{}/{}", url_base, prefix.trim_matches('/'));
    }
    let url = format!("{}/server/files/upload", url_base);
    tracing::debug!(url = url, "uploading plates to moonraker");

    let mut plates = Vec::new();
    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        plates.push(entry.path());
    }
    plates.sort();

    let client = reqwest::Client::new();
    let mut destinations = Vec::new();
    for plate in &plates {
        destinations.push(upload_gcode(&client, &url, api_key, plate, original_file_name).await?);
    }
    Ok(destinations)
}

async fn upload_gcode(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    plate: &Path,
    original_file_name: &str,
) -> Result<String> {
    let plate_stem = plate
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "plate".to_string());
    let stem = format!("{}_{}", super::file_stem(original_file_name), plate_stem);
    let destination = super::destination_name(&stem, "gcode");

    let content = tokio::fs::read(plate).await?;
    let part = reqwest::multipart::Part::bytes(content)
        .file_name(destination.clone())
        .mime_str("text/x-gcode")
        .map_err(|error| Error::Transport(error.to_string()))?;
    let form = reqwest::multipart::Form::new().part("file", part);

    let mut request = client.post(url).multipart(form);
    if let Some(key) = api_key {
        request = request.header("X-Api-Key", key);
    }

    let response = request
        .send()
        .await
        .map_err(|error| Error::Transport(format!("failed to reach moonraker: {}", error)))?;

    if !response.status().is_success() {
        tracing::error!(status = %response.status(), "moonraker upload failed");
        return Err(Error::Transport(format!(
            "moonraker upload failed with status {}",
            response.status()
        )));
    }

    tracing::debug!(destination = destination, "uploaded plate to moonraker");
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Arc, Mutex};

    use dropshot::{
        endpoint, ApiDescription, ConfigDropshot, HttpError, HttpResponseOk, RequestContext,
        ServerBuilder, UntypedBody,
    };
    use pretty_assertions::assert_eq;

    /// A stand-in Moonraker that records the api key of every upload it
    /// receives.
    struct Stub {
        fail: bool,
        api_keys: Mutex<Vec<Option<String>>>,
    }

    async fn handle_upload(
        rqctx: &RequestContext<Arc<Stub>>,
    ) -> Result<HttpResponseOk<serde_json::Value>, HttpError> {
        let stub = rqctx.context();
        let key = rqctx
            .request
            .headers()
            .get("X-Api-Key")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        stub.api_keys.lock().unwrap().push(key);
        if stub.fail {
            return Err(HttpError::for_internal_error("out of disk".to_string()));
        }
        Ok(HttpResponseOk(serde_json::json!({ "result": "ok" })))
    }

    #[endpoint {
        method = POST,
        path = "/server/files/upload",
    }]
    async fn upload_stub(
        rqctx: RequestContext<Arc<Stub>>,
        _body: UntypedBody,
    ) -> Result<HttpResponseOk<serde_json::Value>, HttpError> {
        handle_upload(&rqctx).await
    }

    #[endpoint {
        method = POST,
        path = "/moonraker/server/files/upload",
    }]
    async fn prefixed_upload_stub(
        rqctx: RequestContext<Arc<Stub>>,
        _body: UntypedBody,
    ) -> Result<HttpResponseOk<serde_json::Value>, HttpError> {
        handle_upload(&rqctx).await
    }

    async fn start_stub(fail: bool) -> (dropshot::HttpServer<Arc<Stub>>, u16, Arc<Stub>) {
        let mut api = ApiDescription::new();
        api.register(upload_stub).unwrap();
        api.register(prefixed_upload_stub).unwrap();

        let port = portpicker::pick_unused_port().unwrap();
        let stub = Arc::new(Stub {
            fail,
            api_keys: Mutex::new(Vec::new()),
        });
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let server = ServerBuilder::new(api, stub.clone(), logger)
            .config(ConfigDropshot {
                bind_address: format!("127.0.0.1:{}", port).parse().unwrap(),
                default_request_body_max_bytes: 1024 * 1024,
                ..Default::default()
            })
            .start()
            .unwrap();
        (server, port, stub)
    }

    fn plate_fixture(directory: &Path) {
        fs::write(directory.join("plate_1.gcode"), b"G28\n").unwrap();
        fs::write(directory.join("plate_2.gcode"), b"G1 X10\n").unwrap();
    }

    #[tokio::test]
    async fn test_upload_sends_one_destination_per_plate() {
        let dir = tempfile::tempdir().unwrap();
        plate_fixture(dir.path());
        let (server, port, stub) = start_stub(false).await;

        let destinations = upload_gcodes(
            "127.0.0.1",
            port,
            None,
            Some("moonraker-secret"),
            dir.path(),
            "benchy.stl",
        )
        .await
        .unwrap();

        assert_eq!(destinations.len(), 2);
        assert!(destinations[0].contains("benchy_plate_1_"));
        assert!(destinations[1].contains("benchy_plate_2_"));
        for destination in &destinations {
            assert!(destination.ends_with(".gcode"));
            // Destinations are grouped under a month folder.
            assert!(destination.contains('/'));
        }

        let keys = stub.api_keys.lock().unwrap().clone();
        assert_eq!(
            keys,
            vec![
                Some("moonraker-secret".to_string()),
                Some("moonraker-secret".to_string())
            ]
        );
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_without_api_key_omits_header() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plate_1.gcode"), b"G28\n").unwrap();
        let (server, port, stub) = start_stub(false).await;

        upload_gcodes("127.0.0.1", port, None, None, dir.path(), "benchy.stl")
            .await
            .unwrap();

        let keys = stub.api_keys.lock().unwrap().clone();
        assert_eq!(keys, vec![None]);
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_route_prefix_is_prepended() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plate_1.gcode"), b"G28\n").unwrap();
        let (server, port, _stub) = start_stub(false).await;

        let destinations = upload_gcodes(
            "127.0.0.1",
            port,
            Some("/moonraker/"),
            None,
            dir.path(),
            "benchy.stl",
        )
        .await
        .unwrap();

        assert_eq!(destinations.len(), 1);
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_upload_is_a_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        plate_fixture(dir.path());
        let (server, port, _stub) = start_stub(true).await;

        let err = upload_gcodes("127.0.0.1", port, None, None, dir.path(), "benchy.stl")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("500"));
        server.close().await.unwrap();
    }
}
