//! Incoming scan documents and their preprocessing

mod document;
mod preprocess;

pub use document::{DocumentError, LocalId, ScanDocument, ScanMessage, ScanNode, ScanTag};
pub use preprocess::{strip_passes, PruneStats};
