// Library root
// -----------
// This crate imports a CSV of Category 1 / Category 2 / PLU rows into a
// remote catalog service as a new menu. The binary (`main.rs`) uses these
// modules to implement the command-line tool.
//
// Module responsibilities:
// - `csv_loader` and `structure`: turn the file into an ordered
//   two-level category tree.
// - `api` and `auth`: HTTP interactions with the catalog service.
// - `products`: product listing pagination and PLU lookup.
// - `importer`: drives a run and accumulates the `ImportResult`.
// - `ui`: terminal prompts, progress bars and the final report.
pub mod api;
pub mod auth;
pub mod config;
pub mod csv_loader;
pub mod error;
pub mod importer;
pub mod products;
pub mod structure;
pub mod ui;

pub use error::{ImportAborted, ImportError, Result};
pub use importer::{ImportEvent, ImportResult, Importer};
