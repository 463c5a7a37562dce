//! Confab - sectioned configuration distribution
//!
//! Confab lets independently-defined components declare that they need a
//! named slice of a shared configuration document, and distributes the right
//! slice to each component once the document is available.
//!
//! # Architecture
//!
//! - **Key derivation** (`key`): normalizes component identities into stable,
//!   collision-tolerant section keys
//! - **Value tree** (`tree`): keyed and dotted-path access over one shared
//!   backing store, with structural mutation and change tracking
//! - **Documents** (`document`): load, reload, staleness detection, and
//!   round-trip re-serialization of YAML/JSON files
//! - **Registry** (`registry`): weakly-held components and the dispatch walk
//!   that hands each one its section
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use confab::{configure_all, register_configurable, ConfigDocument, Configurable, SectionCell};
//!
//! #[derive(Default)]
//! struct Database {
//!     section: SectionCell,
//! }
//!
//! impl Configurable for Database {
//!     fn section_cell(&self) -> Option<&SectionCell> {
//!         Some(&self.section)
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let database = Arc::new(Database::default());
//!     register_configurable(&database, None)?;
//!
//!     let doc = ConfigDocument::load("app.yaml")?;
//!     configure_all(&doc)?;
//!
//!     let host = database.section.get().and_then(|s| s.at("host"));
//!     Ok(())
//! }
//! ```

pub mod document;
pub mod error;
pub mod key;
pub mod registry;
pub mod tree;

// Re-export commonly used types for convenience
pub use document::ConfigDocument;
pub use error::{ConfigError, ConfigResult};
pub use key::{SectionKey, ANONYMOUS_KEY};
pub use registry::{
    configure_all, register_configurable, unregister_configurable, Configurable, Registry,
    SectionCell,
};
pub use tree::ConfigTree;
