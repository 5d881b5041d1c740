//! Prelude module for `winhlp_types`.
//!
//! This module provides a convenient way to import commonly used types,
//! traits, and constants.
//!
//! # Examples
//!
//! ```no_run
//! use winhlp_types::prelude::*;
//!
//! let mut opener = Opener::new();
//! let file = opener.open("guide.hlp").unwrap();
//! let (page, relative) = file.contents_page().unwrap();
//! let rtf = file.browse_page(page, FontScale::Normal, relative, None).unwrap();
//! ```

#[doc(inline)]
pub use crate::file::{
	// Archive types
	File,
	FontScale,
	HLP_MAGIC,

	HlpError,
	Hotspot,
	// Keyword indices
	KeywordEntry,
	KeywordTree,

	// Emission types
	Link,
	LinkKind,
	Opener,
	RtfData,
	SubFile,
};

#[doc(inline)]
pub use crate::file::font::{Font, FontFamily};

#[doc(inline)]
pub use crate::file::hash::context_hash;

#[doc(inline)]
pub use crate::file::image::{DibHeader, TransparentBitmap};

#[doc(inline)]
pub use crate::file::page::{MapEntry, Page, PageKind, Row};

#[doc(inline)]
pub use crate::file::system::Window;

// Re-export the file module for advanced usage
#[doc(inline)]
pub use crate::file;
