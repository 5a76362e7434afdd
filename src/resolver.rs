//! Resolution of printer metadata and configuration file sets from the
//! directory-structured configuration store.
//!
//! Store layout:
//!
//! ```text
//! {root}/{manufacturer}/{model}/printers.json
//! {root}/{manufacturer}/{model}/machine/{nozzle} nozzle.json
//! {root}/{manufacturer}/{model}/process/{nozzle}/*.json
//! {root}/{manufacturer}/{model}/filament/{nozzle}/*.json   (or filament/generic/)
//! ```

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{
    printer::{
        full_machine_name, ConfigurationFile, PrinterConfigurations, PrinterModelDefinition,
        PrinterRecord,
    },
    Error, Result,
};

/// Which configuration subset to resolve.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ConfigKind {
    Filament,
    Machine,
    Process,
}

impl ConfigKind {
    fn directory(&self) -> &'static str {
        match self {
            ConfigKind::Filament => "filament",
            ConfigKind::Machine => "machine",
            ConfigKind::Process => "process",
        }
    }
}

/// Read-only handle on the configuration store.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    /// Create a handle rooted at `root`. The directory is not touched
    /// until a resolution call needs it.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_owned(),
        }
    }

    /// The store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a store-relative path back to an absolute one. Paths with
    /// `..` components would escape the store, so they are rejected
    /// before touching the filesystem.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let trimmed = relative.trim_start_matches(['/', '\\']);
        let escapes = Path::new(trimmed)
            .components()
            .any(|component| matches!(component, std::path::Component::ParentDir));
        if escapes {
            return Err(Error::Validation(vec![format!(
                "configuration path {} escapes the configuration store",
                relative
            )]));
        }
        Ok(self.root.join(trimmed))
    }

    /// Remove every occurrence of the store root from `text`. Error
    /// messages that may reach a caller go through this so the server's
    /// filesystem layout never leaks.
    pub fn strip_root(&self, text: &str) -> String {
        match self.root.to_str() {
            Some(root) if !root.is_empty() => text.replace(root, ""),
            _ => text.to_owned(),
        }
    }

    /// Load `{manufacturer}/{model}/printers.json`, including connection
    /// details. Server-side use only; callers facing the outside world go
    /// through [ConfigStore::all_printer_definitions].
    pub async fn printer_definition(
        &self,
        manufacturer: &str,
        model: &str,
    ) -> Result<PrinterModelDefinition> {
        let path = self.resolve(&format!("{}/{}/printers.json", manufacturer, model))?;
        if !path.exists() {
            tracing::error!(path = %path.display(), "printer definition not found");
            return Err(Error::NotFound(format!(
                "printer definition for {} {}",
                manufacturer, model
            )));
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let mut definition: PrinterModelDefinition = serde_json::from_str(&content)?;
        definition.manufacturer = manufacturer.to_owned();
        definition.model = model.to_owned();
        // Thumbnail route served by the web frontend, not by this API.
        definition.image_path = format!(
            "/printer-thumbnail?manufacturer={}&model={}",
            manufacturer, model
        );
        Ok(definition)
    }

    /// Enumerate every manufacturer/model directory and flatten the units
    /// into denormalized records. The records carry no connection details;
    /// this is the projection handed to callers outside the server trust
    /// domain.
    pub async fn all_printer_definitions(&self) -> Result<Vec<PrinterRecord>> {
        let mut records = Vec::new();
        for manufacturer in visible_subdirectories(&self.root).await? {
            for model in visible_subdirectories(&self.root.join(&manufacturer)).await? {
                let definition = self.printer_definition(&manufacturer, &model).await?;
                for unit in &definition.printers {
                    records.push(PrinterRecord {
                        manufacturer: definition.manufacturer.clone(),
                        model: definition.model.clone(),
                        image_path: definition.image_path.clone(),
                        name: unit.name.clone(),
                        available_nozzle_sizes: unit.available_nozzle_sizes.clone(),
                        available_materials: unit.available_materials.clone(),
                        available_build_plates: definition.available_build_plates.clone(),
                        default_build_plate: unit.default_build_plate.clone(),
                        popups: unit.popups.clone(),
                    });
                }
            }
        }
        Ok(records)
    }

    /// Resolve the filament, machine, and process configuration sets for
    /// one (manufacturer, model, nozzle size) triple. Any missing
    /// directory or file is terminal; there is no partial result.
    pub async fn printer_configurations(
        &self,
        manufacturer: &str,
        model: &str,
        nozzle_size: f64,
    ) -> Result<PrinterConfigurations> {
        let machine_name = full_machine_name(manufacturer, model, nozzle_size);
        Ok(PrinterConfigurations {
            filament: self
                .configuration_set(ConfigKind::Filament, manufacturer, model, nozzle_size, &machine_name)
                .await?,
            machine: self
                .configuration_set(ConfigKind::Machine, manufacturer, model, nozzle_size, &machine_name)
                .await?,
            process: self
                .configuration_set(ConfigKind::Process, manufacturer, model, nozzle_size, &machine_name)
                .await?,
        })
    }

    async fn configuration_set(
        &self,
        kind: ConfigKind,
        manufacturer: &str,
        model: &str,
        nozzle_size: f64,
        machine_name: &str,
    ) -> Result<Vec<ConfigurationFile>> {
        let base = self.resolve(&format!("{}/{}/{}", manufacturer, model, kind.directory()))?;

        // The machine config is a single exact-match file directly under
        // machine/, named for the nozzle.
        if kind == ConfigKind::Machine {
            let path = base.join(format!("{} nozzle.json", nozzle_size));
            if !path.exists() {
                return Err(Error::NotFound(format!(
                    "machine configuration file {}",
                    self.strip_root(&path.display().to_string())
                )));
            }
            let content: Value =
                serde_json::from_str(&tokio::fs::read_to_string(&path).await?)?;
            return Ok(vec![self.record(&path, content)]);
        }

        let with_nozzle = base.join(nozzle_size.to_string());
        let directory = match kind {
            ConfigKind::Process => with_nozzle,
            // Filament sets may be shared across nozzle sizes.
            ConfigKind::Filament => {
                if with_nozzle.exists() {
                    with_nozzle
                } else {
                    base.join("generic")
                }
            }
            ConfigKind::Machine => unreachable!("machine configs resolved above"),
        };

        if !directory.exists() {
            return Err(Error::NotFound(format!(
                "{} configuration directory {}",
                kind.directory(),
                self.strip_root(&directory.display().to_string())
            )));
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }
            let path = directory.join(&file_name);
            let content: Value =
                serde_json::from_str(&tokio::fs::read_to_string(&path).await?)?;
            if is_compatible(&content, machine_name) {
                files.push(self.record(&path, content));
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    fn record(&self, path: &Path, content: Value) -> ConfigurationFile {
        let relative = path
            .strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string_lossy().into_owned());
        let name = content
            .get("friendly_name")
            .or_else(|| content.get("name"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
        ConfigurationFile {
            name,
            path: relative,
            content,
        }
    }
}

/// A file is compatible when it declares no `compatible_printers` list or
/// when that list contains the exact full machine name.
fn is_compatible(content: &Value, machine_name: &str) -> bool {
    match content.get("compatible_printers") {
        None | Some(Value::Null) => true,
        Some(Value::Array(printers)) => printers
            .iter()
            .any(|printer| printer.as_str() == Some(machine_name)),
        Some(_) => false,
    }
}

async fn visible_subdirectories(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
