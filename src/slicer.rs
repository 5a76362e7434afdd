//! Invocation of the external slicing engine.
//!
//! The flag vocabulary follows the BambuStudio command line
//! (<https://github.com/bambulab/BambuStudio/wiki/Command-Line-Usage>);
//! any slicer honoring those flags works.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::{
    config::Config, merge, printer::Connection, resolver::ConfigStore, settings::PrintSettings,
    temp, Error, Result, TempDir,
};

/// Export shape requested from the slicer, decided by the target
/// printer's transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExportKind {
    /// A single packaged `.3mf` project file.
    ThreeMf,
    /// A directory of per-plate G-code files.
    GcodeDirectory,
}

impl ExportKind {
    /// Which export shape the given connection needs.
    pub fn for_connection(connection: &Connection) -> Self {
        match connection {
            Connection::Klipper { .. } => ExportKind::GcodeDirectory,
            _ => ExportKind::ThreeMf,
        }
    }
}

/// The temporary artifact set of one slicing run. Paths are allocated up
/// front so cleanup can run over them no matter how far the run got.
struct JobArtifacts {
    input: PathBuf,
    machine_config: PathBuf,
    process_config: PathBuf,
    filament_config: PathBuf,
    output: PathBuf,
}

impl JobArtifacts {
    fn new(temp: &TempDir, export: ExportKind) -> Self {
        Self {
            input: temp.fresh_path("input", "stl"),
            machine_config: temp.fresh_path("machineConfiguration", "json"),
            process_config: temp.fresh_path("processConfiguration", "json"),
            filament_config: temp.fresh_path("filamentConfiguration", "json"),
            output: match export {
                ExportKind::ThreeMf => temp.fresh_path("output", "3mf"),
                ExportKind::GcodeDirectory => temp.fresh_path("outputSlicedata", ""),
            },
        }
    }

    /// Remove the input file and the merged configuration files. The
    /// output artifact is not touched here; its ownership passes to the
    /// dispatcher and orchestrator.
    async fn cleanup(&self) {
        temp::remove_quietly(&self.input).await;
        temp::remove_quietly(&self.machine_config).await;
        temp::remove_quietly(&self.process_config).await;
        temp::remove_quietly(&self.filament_config).await;
    }
}

/// Handle to invoke the external slicer binary.
#[derive(Debug, Clone)]
pub struct Slicer {
    executable: PathBuf,
    debug: bool,
}

impl Slicer {
    /// Create a new [Slicer] invoking the given executable.
    pub fn new(executable: &Path, debug: bool) -> Self {
        Self {
            executable: executable.to_owned(),
            debug,
        }
    }

    /// Create a [Slicer] from the application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.slicer_path, config.debug)
    }

    /// Slice `model` for the given settings, returning the path of the
    /// produced artifact: a `.3mf` file or, for
    /// [ExportKind::GcodeDirectory], a directory of per-plate G-code.
    ///
    /// The temporary input and configuration files are removed before
    /// this returns, on success and on failure alike.
    pub async fn slice(
        &self,
        store: &ConfigStore,
        temp: &TempDir,
        model: &[u8],
        settings: &PrintSettings,
        export: ExportKind,
    ) -> Result<PathBuf> {
        if self.executable.as_os_str().is_empty() {
            tracing::error!("slicer executable path is not configured");
            return Err(Error::Process(
                "slicer executable path is not configured".to_string(),
            ));
        }
        if !self.executable.exists() {
            tracing::error!(path = %self.executable.display(), "slicer executable does not exist");
            return Err(Error::Process(format!(
                "slicer executable {} does not exist",
                self.executable.display()
            )));
        }

        let machine_source = store.resolve(&format!(
            "{}/{}/machine/{} nozzle.json",
            settings.printer_manufacturer, settings.printer_model, settings.nozzle_size
        ))?;
        let process_source = store.resolve(&settings.process_config_file)?;
        let filament_source = store.resolve(&settings.filament_config_file)?;

        for (label, path) in [
            ("machine", &machine_source),
            ("process", &process_source),
            ("filament", &filament_source),
        ] {
            if !path.exists() {
                tracing::error!(path = %path.display(), "{} configuration file does not exist", label);
                return Err(Error::NotFound(format!(
                    "{} configuration file {}",
                    label,
                    store.strip_root(&path.display().to_string())
                )));
            }
        }
        tracing::debug!("validated configuration files");

        let artifacts = JobArtifacts::new(temp, export);
        let result = self
            .run(store, &artifacts, model, &machine_source, &process_source, &filament_source, settings, export)
            .await;
        artifacts.cleanup().await;
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        store: &ConfigStore,
        artifacts: &JobArtifacts,
        model: &[u8],
        machine_source: &Path,
        process_source: &Path,
        filament_source: &Path,
        settings: &PrintSettings,
        export: ExportKind,
    ) -> Result<PathBuf> {
        tracing::debug!(path = %artifacts.input.display(), "writing model to temporary file");
        tokio::fs::write(&artifacts.input, model).await?;

        merge::materialize(machine_source, &json!({}), &artifacts.machine_config).await?;
        merge::materialize(
            process_source,
            &json!({
                "enable_support": if settings.needs_supports { "1" } else { "0" },
                "support_type": "tree(auto)",
                "compatible_printers": [settings.full_machine_name()],
            }),
            &artifacts.process_config,
        )
        .await?;
        merge::materialize(filament_source, &json!({}), &artifacts.filament_config).await?;

        let args = self.arguments(artifacts, settings, export);
        tracing::debug!(args = ?args, "executing slicer");

        let output = tokio::process::Command::new(&self.executable)
            .args(&args)
            .output()
            .await
            .map_err(|error| Error::Process(format!("failed to execute slicer: {}", error)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let mut message = format!("{}\n{}", stderr.trim(), stdout.trim())
                .trim()
                .to_string();
            if message.is_empty() {
                message = format!("slicer exited with {}", output.status);
            }
            let message = store.strip_root(&message);
            tracing::error!(message = message, "slicer failed");
            return Err(Error::Process(message));
        }

        if !artifacts.output.exists() {
            return Err(Error::Process(
                "slicer reported success but produced no output".to_string(),
            ));
        }

        tracing::debug!(path = %artifacts.output.display(), "slicer finished");
        Ok(artifacts.output.clone())
    }

    fn arguments(
        &self,
        artifacts: &JobArtifacts,
        settings: &PrintSettings,
        export: ExportKind,
    ) -> Vec<String> {
        let bed_type = settings
            .build_plate_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string());

        let mut args: Vec<String> = vec![
            "--orient".to_string(),
            if settings.auto_orient { "1" } else { "0" }.to_string(),
            "--arrange".to_string(),
            "1".to_string(),
            "--load-settings".to_string(),
            artifacts.machine_config.display().to_string(),
            "--load-settings".to_string(),
            artifacts.process_config.display().to_string(),
            "--load-filaments".to_string(),
            artifacts.filament_config.display().to_string(),
            format!("--curr-bed-type={}", bed_type),
            "--slice".to_string(),
            "0".to_string(),
            "--debug".to_string(),
            if self.debug { "4" } else { "1" }.to_string(),
            "--ensure-on-bed".to_string(),
            "--min-save".to_string(),
        ];
        match export {
            ExportKind::ThreeMf => {
                args.push("--export-3mf".to_string());
                args.push(artifacts.output.display().to_string());
            }
            ExportKind::GcodeDirectory => {
                args.push("--outputdir".to_string());
                args.push(artifacts.output.display().to_string());
            }
        }
        args.push(artifacts.input.display().to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_json(path: &Path, value: &Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn fixture_store(root: &Path) -> ConfigStore {
        write_json(
            &root.join("Bambu Lab/X1 Carbon/machine/0.4 nozzle.json"),
            &json!({ "name": "Bambu Lab X1 Carbon 0.4 nozzle" }),
        );
        write_json(
            &root.join("Bambu Lab/X1 Carbon/process/0.4/standard.json"),
            &json!({ "name": "0.20mm Standard", "compatible_printers": [] }),
        );
        write_json(
            &root.join("Bambu Lab/X1 Carbon/filament/generic/pla.json"),
            &json!({ "name": "Generic PLA" }),
        );
        ConfigStore::new(root)
    }

    fn fixture_settings() -> PrintSettings {
        PrintSettings {
            printer_manufacturer: "Bambu Lab".to_string(),
            printer_model: "X1 Carbon".to_string(),
            printer_name: "Office X1C".to_string(),
            nozzle_size: 0.4,
            process_config_file: "Bambu Lab/X1 Carbon/process/0.4/standard.json".to_string(),
            filament_config_file: "Bambu Lab/X1 Carbon/filament/generic/pla.json".to_string(),
            needs_supports: true,
            build_plate_type: Some("Textured PEI".to_string()),
            auto_orient: true,
        }
    }

    /// A stand-in slicer that creates whatever `--export-3mf` names.
    fn fake_slicer(dir: &Path) -> PathBuf {
        let path = dir.join("fake-slicer.sh");
        fs::write(
            &path,
            "#!/bin/sh\nprev=\"\"\nfor arg in \"$@\"; do\n  if [ \"$prev\" = \"--export-3mf\" ]; then touch \"$arg\"; fi\n  prev=\"$arg\"\ndone\n",
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn residual_files(temp_root: &Path) -> Vec<String> {
        fs::read_dir(temp_root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixture_store(&dir.path().join("store"));
        let temp = TempDir::new(&dir.path().join("tmp")).await.unwrap();

        let slicer = Slicer::new(Path::new("/nonexistent/slicer"), false);
        let err = slicer
            .slice(&store, &temp, b"solid cube", &fixture_settings(), ExportKind::ThreeMf)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Process(_)));
        assert!(err.to_string().contains("/nonexistent/slicer"));
        // Preconditions fail before any artifact is written.
        assert!(residual_files(&dir.path().join("tmp")).is_empty());
    }

    #[tokio::test]
    async fn test_missing_config_error_strips_store_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixture_store(&dir.path().join("store"));
        let temp = TempDir::new(&dir.path().join("tmp")).await.unwrap();

        let mut settings = fixture_settings();
        settings.process_config_file =
            "Bambu Lab/X1 Carbon/process/0.4/does-not-exist.json".to_string();

        let slicer = Slicer::new(Path::new("/bin/false"), false);
        let err = slicer
            .slice(&store, &temp, b"solid cube", &settings, ExportKind::ThreeMf)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let message = err.to_string();
        assert!(message.contains("does-not-exist.json"));
        assert!(!message.contains(dir.path().to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_traversal_in_config_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixture_store(&dir.path().join("store"));
        let temp = TempDir::new(&dir.path().join("tmp")).await.unwrap();

        let mut settings = fixture_settings();
        settings.process_config_file = "../../../etc/passwd".to_string();

        let slicer = Slicer::new(Path::new("/bin/false"), false);
        let err = slicer
            .slice(&store, &temp, b"solid cube", &settings, ExportKind::ThreeMf)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!err.to_string().contains(dir.path().to_str().unwrap()));
        assert!(residual_files(&dir.path().join("tmp")).is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_leaves_no_residual_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixture_store(&dir.path().join("store"));
        let temp = TempDir::new(&dir.path().join("tmp")).await.unwrap();

        let slicer = Slicer::new(Path::new("/bin/false"), false);
        let err = slicer
            .slice(&store, &temp, b"solid cube", &fixture_settings(), ExportKind::ThreeMf)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Process(_)));
        assert!(residual_files(&dir.path().join("tmp")).is_empty());
    }

    #[tokio::test]
    async fn test_successful_run_returns_artifact_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixture_store(&dir.path().join("store"));
        let temp = TempDir::new(&dir.path().join("tmp")).await.unwrap();

        let slicer = Slicer::new(&fake_slicer(dir.path()), false);
        let artifact = slicer
            .slice(&store, &temp, b"solid cube", &fixture_settings(), ExportKind::ThreeMf)
            .await
            .unwrap();

        assert!(artifact.exists());
        assert_eq!(artifact.extension().unwrap(), "3mf");
        // Only the output artifact survives the run.
        let residual = residual_files(&dir.path().join("tmp"));
        assert_eq!(residual.len(), 1);
        assert!(residual[0].ends_with(".3mf"));
    }
}
