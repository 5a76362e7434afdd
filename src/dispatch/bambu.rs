//! FTPS upload to Bambu Lab printers.
//!
//! Bambu printers expose an implicit-TLS FTP server on port 990, user
//! `bblp`, password = the LAN access code. We drive the transfer through
//! `curl`, which speaks the printer's ftps dialect and creates the
//! year-month folder server-side with `--ftp-create-dirs`.

use std::path::Path;

use crate::{Error, Result};

const FTP_PORT: u16 = 990;
const FTP_USER: &str = "bblp";

/// Upload a single sliced `.3mf` file, returning the destination path on
/// the printer.
pub(crate) async fn upload_3mf(
    ip_address: &str,
    access_code: &str,
    artifact: &Path,
    original_file_name: &str,
    accept_invalid_certs: bool,
) -> Result<String> {
    let destination = super::destination_name(super::file_stem(original_file_name), "3mf");

    let mut args: Vec<String> = vec![
        "--silent".to_string(),
        "--show-error".to_string(),
        "--upload-file".to_string(),
        artifact.display().to_string(),
        "--ftp-pasv".to_string(),
        "--ftp-create-dirs".to_string(),
    ];
    if accept_invalid_certs {
        // The printers present a self-signed certificate on their LAN
        // interface; operators opt in via `ftp_accept_invalid_certs`.
        args.push("--insecure".to_string());
    }
    args.push(format!("ftps://{}:{}/{}", ip_address, FTP_PORT, destination));
    args.push("--user".to_string());
    args.push(format!("{}:{}", FTP_USER, access_code));

    tracing::debug!(destination = destination, "uploading 3mf over ftps");
    let output = tokio::process::Command::new("curl")
        .args(&args)
        .output()
        .await
        .map_err(|error| Error::Transport(format!("failed to run ftps upload: {}", error)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::error!(stderr = %stderr, "ftps upload failed");
        return Err(Error::Transport(format!(
            "ftps upload failed: {}",
            stderr.trim()
        )));
    }

    tracing::debug!(destination = destination, "uploaded 3mf to printer");
    Ok(destination)
}
