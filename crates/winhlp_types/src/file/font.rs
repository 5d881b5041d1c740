//! `|FONT` sub-file parsing.
//!
//! Only the original descriptor dialect (`face_offset < 12`) is decoded.
//! The later "new font" and multimedia-viewer layouts are detected and
//! reported as unsupported, since their record formats differ completely.
//!
//! Heights are stored in half-points, the same unit RTF's `\fs` uses;
//! paragraph measurements go through the file-wide `scale`/`round_error`
//! pair (`half_points * scale - round_error`).

use log::{trace, warn};

use super::bytes::{cstr_at, u16_at};
use super::error::HlpError;

/// Longest face name kept, matching `LF_FACESIZE - 1`.
const FACE_MAX: usize = 31;

/// Font family classes from the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFamily {
	/// Fixed-pitch
	Modern,
	/// Serif
	Roman,
	/// Sans-serif
	Swiss,
	/// Cursive
	Script,
	/// Ornamental
	Decorative,
	/// Unclassified
	Nil,
}

impl FontFamily {
	/// RTF font-family control word (without the backslash).
	pub fn rtf_keyword(self) -> &'static str {
		match self {
			FontFamily::Modern => "fmodern",
			FontFamily::Roman => "froman",
			FontFamily::Swiss => "fswiss",
			FontFamily::Script => "fscript",
			FontFamily::Decorative => "fdecor",
			FontFamily::Nil => "fnil",
		}
	}
}

/// One font descriptor.
#[derive(Debug, Clone)]
pub struct Font {
	/// Face name (at most 31 characters)
	pub face: String,
	/// Height in half-points
	pub height: i32,
	/// Bold flag
	pub bold: bool,
	/// Italic flag
	pub italic: bool,
	/// Underline flag
	pub underline: bool,
	/// Strikeout flag
	pub strikeout: bool,
	/// Family class
	pub family: FontFamily,
	/// Pitch nibble (always default pitch in the old dialect)
	pub pitch: u8,
	/// Charset the font renders in
	pub charset: u8,
	/// Text color
	pub color: (u8, u8, u8),
}

impl Font {
	/// Weight for host font APIs: 700 when bold, 400 otherwise.
	pub fn weight(&self) -> u16 {
		if self.bold { 700 } else { 400 }
	}
}

/// The decoded `|FONT` sub-file.
#[derive(Debug)]
pub struct FontTable {
	/// Descriptors in file order; paragraph opcodes index into this
	pub fonts: Vec<Font>,
	/// Half-point multiplier for paragraph measurements
	pub scale: i32,
	/// Rounding correction subtracted after scaling
	pub round_error: i32,
}

/// Parses a whole `|FONT` sub-file.
///
/// `charset` is the archive charset, inherited by every descriptor.
/// A zero height means "measure the default font on the host"; since host
/// font metrics are a viewer concern, such descriptors fall back to 24
/// half-points (12 pt).
pub fn load(buf: &[u8], charset: u8) -> Result<FontTable, HlpError> {
	let face_num = usize::from(u16_at(buf, 9)?);
	let dscr_num = usize::from(u16_at(buf, 11)?);
	let face_offset = usize::from(u16_at(buf, 13)?);
	let dscr_offset = usize::from(u16_at(buf, 15)?);
	trace!("fonts: {face_num} faces at {face_offset}, {dscr_num} descriptors at {dscr_offset}");

	if face_offset >= 16 {
		return Err(HlpError::UnsupportedFormat("mvb font records"));
	}
	if face_offset >= 12 {
		return Err(HlpError::UnsupportedFormat("new font records"));
	}
	if face_num == 0 || dscr_offset < face_offset {
		return Err(HlpError::IntegrityViolation("degenerate font face table".into()));
	}
	let face_len = (dscr_offset - face_offset) / face_num;

	let mut fonts = Vec::with_capacity(dscr_num);
	for i in 0..dscr_num {
		let base = 9 + dscr_offset + i * 11;
		let dscr = buf.get(base..base + 11).ok_or(HlpError::Truncated {
			offset: base,
			needed: 11,
			available: buf.len().saturating_sub(base),
		})?;
		let flag = dscr[0];
		let height = dscr[1];
		let family = match dscr[2] {
			0x01 => FontFamily::Modern,
			0x02 => FontFamily::Roman,
			0x03 => FontFamily::Swiss,
			0x04 => FontFamily::Script,
			0x05 => FontFamily::Decorative,
			other => {
				warn!("unknown font family {other}");
				FontFamily::Nil
			}
		};
		let face_idx = usize::from(u16_at(dscr, 3)?);
		let face = if face_idx < face_num {
			let start = 9 + face_offset + face_idx * face_len;
			let end = (start + face_len.min(FACE_MAX)).min(buf.len());
			let raw = cstr_at(buf.get(..end).unwrap_or_default(), start);
			String::from_utf8_lossy(raw).into_owned()
		} else {
			warn!("face index out of range ({face_idx}/{face_num})");
			"Helv".to_owned()
		};

		fonts.push(Font {
			face,
			height: if height == 0 { 24 } else { i32::from(height) },
			bold: flag & 0x01 != 0,
			italic: flag & 0x02 != 0,
			underline: flag & 0x04 != 0,
			strikeout: flag & 0x08 != 0,
			family,
			pitch: 0,
			charset,
			color: (dscr[5], dscr[6], dscr[7]),
		});
	}

	Ok(FontTable {
		fonts,
		scale: 10,
		round_error: 5,
	})
}

impl FontTable {
	/// Lowers a topic-encoded half-point value to RTF half-points.
	pub fn half_points(&self, value: i32) -> i32 {
		value * self.scale - self.round_error
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn font_subfile(face_offset: u16, faces: &[&[u8]], dscrs: &[[u8; 11]]) -> Vec<u8> {
		let face_len = faces.first().map_or(0, |f| f.len());
		let dscr_offset = face_offset as usize + faces.len() * face_len;
		let mut buf = vec![0u8; 9];
		buf.extend_from_slice(&(faces.len() as u16).to_le_bytes());
		buf.extend_from_slice(&(dscrs.len() as u16).to_le_bytes());
		buf.extend_from_slice(&face_offset.to_le_bytes());
		buf.extend_from_slice(&(dscr_offset as u16).to_le_bytes());
		buf.resize(9 + face_offset as usize, 0);
		for face in faces {
			buf.extend_from_slice(face);
		}
		for dscr in dscrs {
			buf.extend_from_slice(dscr);
		}
		buf
	}

	#[test]
	fn test_old_dialect_descriptor() {
		let mut dscr = [0u8; 11];
		dscr[0] = 0x03; // bold + italic
		dscr[1] = 20;
		dscr[2] = 0x03; // swiss
		dscr[5] = 0xFF; // red
		let buf = font_subfile(8, &[b"Arial\0\0\0\0\0"], &[dscr]);
		let table = load(&buf, 0).unwrap();
		assert_eq!(table.scale, 10);
		assert_eq!(table.round_error, 5);
		let f = &table.fonts[0];
		assert_eq!(f.face, "Arial");
		assert_eq!(f.height, 20);
		assert!(f.bold && f.italic && !f.underline);
		assert_eq!(f.weight(), 700);
		assert_eq!(f.family, FontFamily::Swiss);
		assert_eq!(f.color, (0xFF, 0, 0));
	}

	#[test]
	fn test_zero_height_fallback() {
		let mut dscr = [0u8; 11];
		dscr[2] = 0x02;
		let buf = font_subfile(8, &[b"Times\0\0\0\0\0"], &[dscr]);
		let table = load(&buf, 0).unwrap();
		assert_eq!(table.fonts[0].height, 24);
	}

	#[test]
	fn test_face_index_out_of_range() {
		let mut dscr = [0u8; 11];
		dscr[2] = 0x01;
		dscr[3] = 9; // only one face exists
		let buf = font_subfile(8, &[b"Fixed\0\0\0\0\0"], &[dscr]);
		let table = load(&buf, 0).unwrap();
		assert_eq!(table.fonts[0].face, "Helv");
	}

	#[test]
	fn test_newer_dialects_rejected() {
		let buf = font_subfile(12, &[b"X\0"], &[]);
		assert!(matches!(load(&buf, 0), Err(HlpError::UnsupportedFormat("new font records"))));
		let buf = font_subfile(16, &[b"X\0"], &[]);
		assert!(matches!(load(&buf, 0), Err(HlpError::UnsupportedFormat("mvb font records"))));
	}

	#[test]
	fn test_half_points_scale() {
		let table = FontTable {
			fonts: Vec::new(),
			scale: 10,
			round_error: 5,
		};
		assert_eq!(table.half_points(12), 115);
		assert_eq!(table.half_points(0), -5);
	}
}
