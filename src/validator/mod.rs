pub mod consistency;
pub mod structure;

pub use consistency::{check_links, validate_documents, CrossValidator};
pub use structure::{check_document, require_complete};
