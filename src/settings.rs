//! Validation of incoming print-request form fields.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{printer::full_machine_name, Error, Result};

/// A validated print request. Produced by [PrintSettings::from_form]
/// before any filesystem or process work begins; once one of these
/// exists, the shape of the request is no longer in question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintSettings {
    /// Manufacturer directory in the configuration store.
    pub printer_manufacturer: String,
    /// Model directory in the configuration store.
    pub printer_model: String,
    /// Name of the printer unit within the model.
    pub printer_name: String,
    /// Selected nozzle size.
    pub nozzle_size: f64,
    /// Store-relative path of the chosen process configuration.
    pub process_config_file: String,
    /// Store-relative path of the chosen filament configuration.
    pub filament_config_file: String,
    /// Whether the slicer should generate supports.
    pub needs_supports: bool,
    /// Selected build plate, if any.
    pub build_plate_type: Option<String>,
    /// Whether the slicer should auto-orient the model.
    pub auto_orient: bool,
}

fn required(
    fields: &HashMap<String, String>,
    name: &str,
    problems: &mut Vec<String>,
) -> String {
    match fields.get(name) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => {
            problems.push(format!("missing required field `{}`", name));
            String::new()
        }
    }
}

impl PrintSettings {
    /// Strictly validate raw form fields. Every violation is collected so
    /// the caller sees the full list at once, not one field per attempt.
    pub fn from_form(fields: &HashMap<String, String>) -> Result<Self> {
        let mut problems = Vec::new();

        let printer_manufacturer = required(fields, "printer_manufacturer", &mut problems);
        let printer_model = required(fields, "printer_model", &mut problems);
        let printer_name = required(fields, "printer_name", &mut problems);
        let process_config_file = required(fields, "settings_processConfigFile", &mut problems);
        let filament_config_file = required(fields, "settings_filamentConfigFile", &mut problems);

        let nozzle_size = match fields.get("settings_nozzleSize") {
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) if value > 0.0 => value,
                _ => {
                    problems.push(format!(
                        "field `settings_nozzleSize` must be a positive number, got `{}`",
                        raw
                    ));
                    0.0
                }
            },
            None => {
                problems.push("missing required field `settings_nozzleSize`".to_string());
                0.0
            }
        };

        let needs_supports = match fields.get("settings_needsSupports").map(String::as_str) {
            Some("true") => true,
            Some("false") => false,
            Some(other) => {
                problems.push(format!(
                    "field `settings_needsSupports` must be `true` or `false`, got `{}`",
                    other
                ));
                false
            }
            None => {
                problems.push("missing required field `settings_needsSupports`".to_string());
                false
            }
        };

        let build_plate_type = fields
            .get("settings_buildPlateType")
            .filter(|value| !value.is_empty())
            .cloned();

        let auto_orient = !matches!(
            fields.get("settings_autoOrient").map(String::as_str),
            Some("false")
        );

        if !problems.is_empty() {
            return Err(Error::Validation(problems));
        }

        Ok(Self {
            printer_manufacturer,
            printer_model,
            printer_name,
            nozzle_size,
            process_config_file,
            filament_config_file,
            needs_supports,
            build_plate_type,
            auto_orient,
        })
    }

    /// The exact machine name string for this request's printer and
    /// nozzle, as used in `compatible_printers` lists.
    pub fn full_machine_name(&self) -> String {
        full_machine_name(&self.printer_manufacturer, &self.printer_model, self.nozzle_size)
    }
}
