//! Output generation for parsed documents.
//!
//! # Submodules
//!
//! - [`json`]: Writes parsed documents to per-document JSON files
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── 0.json
//! └── 1.json
//! ```

pub mod json;
