//! `winhlp-rs` reads legacy Windows Help (`.HLP`) archives and lowers
//! their topic pages into RTF with link annotations, suitable for display
//! in a rich-text widget.
//!
//! The implementation lives in the `winhlp_types` crate; this facade
//! re-exports it and hosts the `hlpdump` inspection binary.

pub use winhlp_types::*;
