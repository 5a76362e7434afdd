#![deny(missing_docs)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! This crate implements a small print server: it takes an uploaded
//! 3D-model file, slices it with an external slicing engine, and ships
//! the result to the selected printer over FTP (Bambu Lab) or HTTP
//! (Klipper/Moonraker).

pub mod config;
pub mod dispatch;
mod error;
pub mod job;
mod merge;
pub mod printer;
pub mod resolver;
pub mod server;
pub mod settings;
pub mod slicer;
mod temp;

pub use error::{Error, Result};
pub use temp::TempDir;
