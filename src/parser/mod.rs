pub mod checksum;
pub mod document;

pub use checksum::{calculate_bytes_checksum, calculate_checksum};
pub use document::{placeholder, DocumentIndex, CHANGES_SECTION, Heading, Link, ListItem, Placeholder, PLACEHOLDER_PREFIX};
