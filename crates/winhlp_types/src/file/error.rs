//! Error types for help file parsing.

use thiserror::Error;

/// Errors that can occur when reading a help archive.
#[derive(Debug, Error)]
pub enum HlpError {
	/// Invalid magic number
	#[error("Invalid magic number: {found:#010X}, expected {expected:#010X}")]
	BadMagic {
		/// Magic value found in the data
		found: u32,
		/// Magic value required by the format
		expected: u32,
	},

	/// Read past the end of a buffer
	#[error("Truncated data: need {needed} bytes at offset {offset}, only {available} available")]
	Truncated {
		/// Offset the read started at
		offset: usize,
		/// Number of bytes the read needed
		needed: usize,
		/// Number of bytes left in the buffer
		available: usize,
	},

	/// Help file version is not supported
	#[error("Unsupported help file version {major}.{minor}")]
	UnsupportedVersion {
		/// Major version from the system header
		major: u16,
		/// Minor version from the system header
		minor: u16,
	},

	/// Unknown graphics packing method
	#[error("Unsupported graphics packing {0}")]
	UnsupportedPacking(u8),

	/// Known but undecodable record layout (mvb / "new font")
	#[error("Unsupported format: {0}")]
	UnsupportedFormat(&'static str),

	/// An index read from the file points outside its table
	#[error("{kind} index {index} out of range (limit {limit})")]
	IndexOutOfRange {
		/// Which table the index belongs to
		kind: &'static str,
		/// Index that was requested
		index: usize,
		/// Number of entries available
		limit: usize,
	},

	/// Structural inconsistency inside the archive
	#[error("Integrity violation: {0}")]
	IntegrityViolation(String),

	/// A sub-file required by the format is absent
	#[error("Required internal file {0} is missing")]
	MissingSubFile(&'static str),

	/// IO error
	#[error(transparent)]
	IOError(#[from] std::io::Error),
}
