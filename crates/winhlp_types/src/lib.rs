//! This crate provides the core reader for legacy Windows Help (`.HLP`)
//! archives: the sub-file directory, the decompression layers, the
//! metadata loaders, and the paragraph interpreter that lowers topic
//! pages into RTF with link annotations.
//!
//! # Examples
//!
//! ```no_run
//! use winhlp_types::file::{File, FontScale};
//! use winhlp_types::file::hash::context_hash;
//!
//! let file = File::open("guide.hlp")?;
//! let (page, relative) = file.page_by_hash(context_hash(b"intro")).unwrap();
//! let rtf = file.browse_page(page, FontScale::Normal, relative, None).unwrap();
//! for link in rtf.links() {
//!     println!("{:?} -> {:#x}", link.kind, link.hash);
//! }
//! # Ok::<(), winhlp_types::file::HlpError>(())
//! ```

pub mod file;
pub mod prelude;

// Re-export commonly used types at the crate root for convenience
pub use file::{
	File, FontScale, HlpError, Hotspot, KeywordTree, Link, LinkKind, Opener, RtfData, SubFile,
};
