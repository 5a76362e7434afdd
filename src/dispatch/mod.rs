//! Delivery of sliced output to the selected printer's transport.

mod bambu;
mod moonraker;

use std::path::Path;

use crate::{config::Config, printer::PrinterUnit, temp, Error, Result};

/// Upload the sliced `artifact` to `unit`'s printer, returning the
/// printer-side destination path(s): exactly one for an FTP printer, one
/// per build plate for a Klipper printer.
pub async fn upload_to_printer(
    unit: &PrinterUnit,
    artifact: &Path,
    original_file_name: &str,
    config: &Config,
) -> Result<Vec<String>> {
    use crate::printer::Connection;

    match &unit.connection {
        Connection::BambuFtp {
            ip_address,
            access_code,
        } => {
            let destination = bambu::upload_3mf(
                ip_address,
                access_code,
                artifact,
                original_file_name,
                config.ftp_accept_invalid_certs,
            )
            .await?;
            Ok(vec![destination])
        }
        Connection::Klipper {
            host,
            port,
            route_prefix,
            api_key,
        } => {
            moonraker::upload_gcodes(
                host,
                *port,
                route_prefix.as_deref(),
                api_key.as_deref(),
                artifact,
                original_file_name,
            )
            .await
        }
        Connection::Unknown => {
            tracing::error!(printer = unit.name, "printer has an unsupported connection type");
            Err(Error::UnsupportedConnection)
        }
    }
}

/// `YYYY-MM/{stem}_{suffix}.{extension}` — the printer-side naming scheme
/// shared by both transports. The year-month folder keeps the printer's
/// file list browsable; the random suffix keeps repeated prints apart.
pub(crate) fn destination_name(stem: &str, extension: &str) -> String {
    format!(
        "{}/{}.{}",
        chrono::Local::now().format("%Y-%m"),
        temp::unique_name(stem),
        extension
    )
}

/// The upload's file name without its final extension.
pub(crate) fn file_stem(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}
