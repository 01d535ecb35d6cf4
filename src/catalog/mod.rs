// file: src/catalog/mod.rs
// description: archive discovery and processing ledger exports
// reference: Internal module structure

pub mod ledger;

pub use ledger::{DEVELOPMENT_SAMPLE, FileCatalog, LedgerRecord, LedgerStats};
