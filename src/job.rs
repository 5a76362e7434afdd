//! The end-to-end print-job pipeline:
//! validate → resolve printer → slice → dispatch.
//!
//! Every request runs this once, as one linear sequence of blocking
//! steps. A failure at any step is terminal for that job; a later retry
//! re-runs the whole pipeline from scratch.

use std::collections::HashMap;

use crate::{
    config::Config,
    dispatch,
    printer::Connection,
    resolver::ConfigStore,
    settings::PrintSettings,
    slicer::{ExportKind, Slicer},
    temp, Error, Result, TempDir,
};

/// Everything a job needs, created once at startup and shared by all
/// requests. Jobs themselves keep no state here; they are isolated by
/// their collision-resistant temporary artifact names.
#[derive(Debug, Clone)]
pub struct Pipeline {
    store: ConfigStore,
    slicer: Slicer,
    temp: TempDir,
    config: Config,
}

impl Pipeline {
    /// Build a pipeline from the application configuration and the
    /// already-created temporary directory.
    pub fn new(config: &Config, temp: TempDir) -> Self {
        Self {
            store: ConfigStore::new(&config.config_root),
            slicer: Slicer::from_config(config),
            temp,
            config: config.clone(),
        }
    }

    /// The configuration store this pipeline resolves against.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Run one complete print job. `fields` are the raw form fields,
    /// `file_name` the upload's original name, `content` the model data.
    /// On success, returns the printer-side destination path(s) and the
    /// sliced artifact no longer exists locally; on failure the artifact
    /// is also removed, and the step's own error propagates, never a
    /// cleanup error.
    pub async fn run(
        &self,
        fields: &HashMap<String, String>,
        file_name: &str,
        content: &[u8],
    ) -> Result<Vec<String>> {
        let settings = PrintSettings::from_form(fields)?;
        tracing::debug!(printer = settings.printer_name, "print request validated");

        let definition = self
            .store
            .printer_definition(&settings.printer_manufacturer, &settings.printer_model)
            .await?;
        let Some(unit) = definition
            .printers
            .iter()
            .find(|unit| unit.name == settings.printer_name)
        else {
            return Err(Error::NotFound(format!("printer {}", settings.printer_name)));
        };
        if matches!(unit.connection, Connection::Unknown) {
            // Reject before slicing; the dispatcher could not deliver the
            // result anyway.
            return Err(Error::UnsupportedConnection);
        }

        let export = ExportKind::for_connection(&unit.connection);
        let artifact = self
            .slicer
            .slice(&self.store, &self.temp, content, &settings, export)
            .await?;
        tracing::debug!(artifact = %artifact.display(), "sliced model");

        let dispatched = dispatch::upload_to_printer(unit, &artifact, file_name, &self.config).await;
        temp::remove_quietly(&artifact).await;
        let destinations = dispatched?;

        tracing::info!(destinations = ?destinations, "print job dispatched");
        Ok(destinations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    fn fixture_config(root: &Path) -> Config {
        Config {
            config_root: root.join("store"),
            temp_root: root.join("tmp"),
            slicer_path: "/bin/false".into(),
            debug: false,
            ftp_accept_invalid_certs: true,
        }
    }

    fn write_store(root: &Path, connection: serde_json::Value) {
        let printers = json!({
            "printers": [{
                "name": "Office X1C",
                "availableNozzleSizes": [0.4],
                "availableMaterials": ["PLA"],
                "defaultBuildPlate": "Textured PEI",
                "connection": connection
            }],
            "availableBuildPlates": ["Textured PEI"]
        });
        let path = root.join("store/Bambu Lab/X1 Carbon/printers.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string(&printers).unwrap()).unwrap();
    }

    fn valid_fields() -> HashMap<String, String> {
        [
            ("printer_manufacturer", "Bambu Lab"),
            ("printer_model", "X1 Carbon"),
            ("printer_name", "Office X1C"),
            ("settings_nozzleSize", "0.4"),
            ("settings_processConfigFile", "Bambu Lab/X1 Carbon/process/0.4/standard.json"),
            ("settings_filamentConfigFile", "Bambu Lab/X1 Carbon/filament/generic/pla.json"),
            ("settings_needsSupports", "false"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
    }

    async fn fixture_pipeline(root: &Path) -> Pipeline {
        let config = fixture_config(root);
        let temp = TempDir::new(&config.temp_root).await.unwrap();
        Pipeline::new(&config, temp)
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_resolution() {
        let dir = tempfile::tempdir().unwrap();
        // No store on disk at all: a bad request must fail on its own.
        let pipeline = fixture_pipeline(dir.path()).await;
        let err = pipeline
            .run(&HashMap::new(), "benchy.stl", b"solid cube")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_printer_unit_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write_store(
            dir.path(),
            json!({ "type": "BambuLab FTP", "ipAddress": "10.0.0.2", "accessCode": "1234" }),
        );
        let pipeline = fixture_pipeline(dir.path()).await;

        let mut fields = valid_fields();
        fields.insert("printer_name".to_string(), "Basement X1C".to_string());
        let err = pipeline
            .run(&fields, "benchy.stl", b"solid cube")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("Basement X1C"));
    }

    #[tokio::test]
    async fn test_unsupported_connection_rejected_before_slicing() {
        let dir = tempfile::tempdir().unwrap();
        write_store(dir.path(), json!({ "type": "Serial", "device": "/dev/ttyUSB0" }));
        let pipeline = fixture_pipeline(dir.path()).await;

        let err = pipeline
            .run(&valid_fields(), "benchy.stl", b"solid cube")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedConnection));
        // The slicer never ran: nothing was written to the temp dir.
        let residual = std::fs::read_dir(dir.path().join("tmp")).unwrap().count();
        assert_eq!(residual, 0);
    }
}
