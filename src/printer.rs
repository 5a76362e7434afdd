//! Types describing printers, their transports, and their configuration
//! file sets, as stored in the on-disk configuration store.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How a sliced file gets to a printer. The `type` tag in `printers.json`
/// selects the variant; the dispatcher matches exhaustively, so adding a
/// transport means one variant and one match arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Connection {
    /// FTP over implicit TLS on the printer's LAN interface.
    #[serde(rename = "BambuLab FTP", rename_all = "camelCase")]
    BambuFtp {
        /// The printer's LAN IP address.
        ip_address: String,
        /// The LAN access code shown on the printer's display, used as
        /// the FTP password.
        access_code: String,
    },

    /// A Klipper printer fronted by the Moonraker HTTP API.
    #[serde(rename_all = "camelCase")]
    Klipper {
        /// Hostname or IP address of the Moonraker instance.
        host: String,
        /// Port the Moonraker API listens on.
        port: u16,
        /// Optional path prefix in front of the Moonraker routes.
        #[serde(default)]
        route_prefix: Option<String>,
        /// Optional API key sent as `X-Api-Key`.
        #[serde(default)]
        api_key: Option<String>,
    },

    /// Any `type` tag this server has no transport for. Kept rather than
    /// rejected at load time so the dispatcher can report it as an
    /// unsupported connection.
    #[serde(other)]
    Unknown,
}

/// Text in the languages the UI offers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LocalizedText {
    /// English text.
    pub english: String,
    /// German text.
    pub german: String,
}

/// Content of a confirmation popup shown before a printer is selected.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PopupContent {
    /// Popup title.
    pub title: LocalizedText,
    /// Popup body.
    pub description: LocalizedText,
}

/// Popups attached to a printer unit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Popups {
    /// Shown when the user selects this printer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_select: Option<PopupContent>,
}

/// One physical printer within a model definition. Every unit carries a
/// connection; a unit without one is a configuration error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterUnit {
    /// Name, unique within the model.
    pub name: String,
    /// Nozzle sizes this unit can be fitted with.
    pub available_nozzle_sizes: Vec<f64>,
    /// Material names this unit can print.
    pub available_materials: Vec<String>,
    /// Build plate selected by default.
    pub default_build_plate: String,
    /// Transport used to deliver sliced output.
    pub connection: Connection,
    /// Optional pre-selection popups.
    #[serde(default)]
    pub popups: Option<Popups>,
}

/// A model's `printers.json`, with the manufacturer/model identity filled
/// in from the directory it was read from. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterModelDefinition {
    /// Manufacturer directory this definition came from.
    #[serde(default)]
    pub manufacturer: String,
    /// Model directory this definition came from.
    #[serde(default)]
    pub model: String,
    /// Route serving the model's thumbnail image.
    #[serde(default)]
    pub image_path: String,
    /// The printer units of this model.
    pub printers: Vec<PrinterUnit>,
    /// Build plates any unit of this model may use.
    pub available_build_plates: Vec<String>,
}

/// A denormalized printer record for callers outside the server trust
/// domain. There is deliberately no connection field here: FTP access
/// codes and API keys must never leave the server.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrinterRecord {
    /// Manufacturer of the printer.
    pub manufacturer: String,
    /// Model of the printer.
    pub model: String,
    /// Route serving the model's thumbnail image.
    pub image_path: String,
    /// Name of the unit, unique within the model.
    pub name: String,
    /// Nozzle sizes this unit can be fitted with.
    pub available_nozzle_sizes: Vec<f64>,
    /// Material names this unit can print.
    pub available_materials: Vec<String>,
    /// Build plates any unit of this model may use.
    pub available_build_plates: Vec<String>,
    /// Build plate selected by default.
    pub default_build_plate: String,
    /// Optional pre-selection popups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popups: Option<Popups>,
}

/// One resolved configuration file from the store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigurationFile {
    /// Display name, from the file's `friendly_name` or `name` field.
    pub name: String,
    /// Store-root-relative path, usable to re-resolve the file later.
    pub path: String,
    /// The parsed JSON content.
    pub content: serde_json::Value,
}

/// The configuration file sets resolved for one (manufacturer, model,
/// nozzle size) triple.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PrinterConfigurations {
    /// Filament configuration files compatible with the machine.
    pub filament: Vec<ConfigurationFile>,
    /// The single machine configuration file.
    pub machine: Vec<ConfigurationFile>,
    /// Process configuration files compatible with the machine.
    pub process: Vec<ConfigurationFile>,
}

/// The exact machine name string configuration files use in their
/// `compatible_printers` lists: `"{manufacturer} {model} {nozzle} nozzle"`.
pub fn full_machine_name(manufacturer: &str, model: &str, nozzle_size: f64) -> String {
    format!("{} {} {} nozzle", manufacturer, model, nozzle_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connection_bambu_ftp_from_json() {
        let connection: Connection = serde_json::from_str(
            r#"{ "type": "BambuLab FTP", "ipAddress": "192.168.1.50", "accessCode": "12345678" }"#,
        )
        .unwrap();
        match connection {
            Connection::BambuFtp {
                ip_address,
                access_code,
            } => {
                assert_eq!(ip_address, "192.168.1.50");
                assert_eq!(access_code, "12345678");
            }
            other => panic!("expected BambuFtp, got {:?}", other),
        }
    }

    #[test]
    fn test_connection_klipper_from_json() {
        let connection: Connection = serde_json::from_str(
            r#"{ "type": "Klipper", "host": "voron.local", "port": 7125, "apiKey": "secret" }"#,
        )
        .unwrap();
        match connection {
            Connection::Klipper {
                host,
                port,
                route_prefix,
                api_key,
            } => {
                assert_eq!(host, "voron.local");
                assert_eq!(port, 7125);
                assert_eq!(route_prefix, None);
                assert_eq!(api_key.as_deref(), Some("secret"));
            }
            other => panic!("expected Klipper, got {:?}", other),
        }
    }

    #[test]
    fn test_connection_unknown_tag_parses() {
        let connection: Connection =
            serde_json::from_str(r#"{ "type": "Serial", "device": "/dev/ttyUSB0" }"#).unwrap();
        assert!(matches!(connection, Connection::Unknown));
    }

    #[test]
    fn test_full_machine_name_formats_nozzle_without_padding() {
        assert_eq!(
            full_machine_name("Bambu Lab", "X1 Carbon", 0.4),
            "Bambu Lab X1 Carbon 0.4 nozzle"
        );
    }
}
