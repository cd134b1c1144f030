//! Files produced from the cache.
//!
//! # Submodules
//!
//! - [`html`]: a standalone page per article, comments included
//! - [`json`]: a summary index of the cached articles
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── 151234.html
//! └── 151235.html
//!
//! json_output_dir/
//! └── articles.json
//! ```

pub mod html;
pub mod json;
