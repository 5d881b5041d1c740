//! Pages and the small lookup tables that point at them.

/// What a page represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
	/// A topic from the `|TOPIC` stream
	Topic,
	/// The synthetic contents page built from the `.CNT` sidecar
	Contents,
}

/// One help page, materialized from a topic header record.
///
/// Pages live in a flat `Vec` on the archive handle; browse links and
/// lookups refer to them by index.
#[derive(Debug, Clone)]
pub struct Page {
	/// Page kind
	pub kind: PageKind,
	/// Decoded title
	pub title: String,
	/// Topic number from the header
	pub number: u32,
	/// Topic offset used by `|CONTEXT`/`|CTXOMAP` lookups
	pub offset: u32,
	/// Reference of the topic header record in the topic stream
	pub reference: u32,
	/// Browse chain predecessor, as a topic offset
	pub browse_bwd: Option<u32>,
	/// Browse chain successor, as a topic offset
	pub browse_fwd: Option<u32>,
	/// Macros to run when the page is opened
	pub macros: Vec<String>,
}

/// One `|CTXOMAP` entry: numeric identifier to topic offset.
#[derive(Debug, Clone, Copy)]
pub struct MapEntry {
	/// Numeric identifier from the authoring tool
	pub map: u32,
	/// Topic offset of the target page
	pub offset: u32,
}

/// Column widths of one variable-width table row, in twips.
///
/// Rows are recorded while a page is rendered so a viewer can track
/// user-resized columns.
#[derive(Debug, Clone)]
pub struct Row {
	/// Width of each column
	pub widths: Vec<i32>,
}
