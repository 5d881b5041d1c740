//! RTF emission buffer, link and hotspot bookkeeping.
//!
//! `RtfData` collects the byte stream produced for one page together with
//! everything the stream cannot carry: the link list (with character
//! positions into the rendered text), image hotspots, variable-width table
//! rows and transparent-bitmap artifacts. Character positions are counted
//! in UTF-16 code units of the negotiated code page, which is what
//! rich-text widgets index by.

use encoding_rs::Encoding;
use log::warn;

use super::image::TransparentBitmap;
use super::page::Row;

/// What activating a link does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
	/// Runs a macro
	Macro,
	/// Jumps to a topic
	Topic,
	/// Opens a topic in a popup
	Popup,
}

/// Font scaling selected by the viewer's zoom setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontScale {
	/// One step smaller
	Small,
	/// As authored
	Normal,
	/// One step larger
	Large,
}

impl FontScale {
	/// Maps the conventional 0/1/2 setting.
	pub fn from_raw(raw: u32) -> Self {
		match raw {
			0 => FontScale::Small,
			2 => FontScale::Large,
			_ => FontScale::Normal,
		}
	}

	/// Half-point adjustment applied to every font size.
	pub fn delta(self) -> i32 {
		match self {
			FontScale::Small => -4,
			FontScale::Normal => 0,
			FontScale::Large => 4,
		}
	}
}

/// One navigation link attached to a span of the emitted text.
#[derive(Debug, Clone)]
pub struct Link {
	/// Link action
	pub kind: LinkKind,
	/// Macro body, or the help file the topic lives in
	pub target: String,
	/// Context hash of the target topic (0 for macros)
	pub hash: u32,
	/// Whether the span is drawn in the link color
	pub clr_change: bool,
	/// Whether the link belongs to an image hotspot
	pub hotspot: bool,
	/// Target window index, when the link names one
	pub window: Option<usize>,
	/// Target window name, when given as a string
	pub window_name: Option<String>,
	/// First character position covered by the link
	pub cp_min: u32,
	/// One past the last character position covered
	pub cp_max: u32,
}

/// A rectangular link region inside an embedded image.
#[derive(Debug, Clone)]
pub struct Hotspot {
	/// Index of the link in [`RtfData::links`]
	pub link: usize,
	/// Left edge in twips
	pub x: u32,
	/// Top edge in twips
	pub y: u32,
	/// Width in twips
	pub width: u32,
	/// Height in twips
	pub height: u32,
	/// Which image of the page the rectangle belongs to
	pub imgidx: u32,
}

const HEX: &[u8; 16] = b"0123456789abcdef";

/// The render product of one page.
#[derive(Debug)]
pub struct RtfData {
	data: Vec<u8>,
	in_text: bool,
	depth: i32,
	encoding: &'static Encoding,
	code_page: u16,
	pub(crate) char_pos: u32,
	pub(crate) char_pos_rel: u32,
	pub(crate) force_color: bool,
	pub(crate) current_link: Option<usize>,
	pub(crate) links: Vec<Link>,
	pub(crate) hotspots: Vec<Hotspot>,
	pub(crate) rows: Vec<Row>,
	pub(crate) transparent: Vec<TransparentBitmap>,
	pub(crate) imgcnt: u32,
	pub(crate) font_scale: FontScale,
	pub(crate) relative: u32,
}

impl RtfData {
	pub(crate) fn new(
		encoding: &'static Encoding,
		code_page: u16,
		font_scale: FontScale,
		relative: u32,
	) -> Self {
		Self {
			data: Vec::with_capacity(32768),
			in_text: true,
			depth: 0,
			encoding,
			code_page,
			char_pos: 0,
			char_pos_rel: 0,
			force_color: false,
			current_link: None,
			links: Vec::new(),
			hotspots: Vec::new(),
			rows: Vec::new(),
			transparent: Vec::new(),
			imgcnt: 0,
			font_scale,
			relative,
		}
	}

	/// The emitted RTF stream.
	pub fn rtf(&self) -> &[u8] {
		&self.data
	}

	/// Consumes the buffer, returning the RTF stream.
	pub fn into_rtf(self) -> Vec<u8> {
		self.data
	}

	/// Links referenced by the `HYPERLINK` fields, in allocation order.
	/// The field instruction text is the link's index in this list.
	pub fn links(&self) -> &[Link] {
		&self.links
	}

	/// Image hotspot rectangles.
	pub fn hotspots(&self) -> &[Hotspot] {
		&self.hotspots
	}

	/// Variable-width table rows, in document order.
	pub fn rows(&self) -> &[Row] {
		&self.rows
	}

	/// Transparent bitmaps the stream could not inline.
	pub fn transparent_images(&self) -> &[TransparentBitmap] {
		&self.transparent
	}

	/// Number of UTF-16 code units emitted so far.
	pub fn char_pos(&self) -> u32 {
		self.char_pos
	}

	/// Character position of the requested relative offset, once reached.
	pub fn char_pos_rel(&self) -> u32 {
		self.char_pos_rel
	}

	/// Code page the text was decoded with.
	pub fn code_page(&self) -> u16 {
		self.code_page
	}

	pub(crate) fn add_raw(&mut self, bytes: &[u8]) {
		self.data.extend_from_slice(bytes);
	}

	/// Appends a control sequence, tracking text state and group depth.
	pub(crate) fn add_control(&mut self, control: &str) {
		match control.as_bytes().first() {
			Some(b'\\' | b'{') => self.in_text = false,
			Some(b'}') => self.in_text = true,
			_ => {}
		}
		for &b in control.as_bytes() {
			match b {
				b'{' => self.depth += 1,
				b'}' => self.depth -= 1,
				_ => {}
			}
		}
		self.data.extend_from_slice(control.as_bytes());
	}

	/// Appends document text, escaping RTF specials and high bytes.
	pub(crate) fn add_text(&mut self, text: &[u8]) {
		if !self.in_text {
			self.data.push(b' ');
			self.in_text = true;
		}
		for &b in text {
			match b {
				b'{' => self.data.extend_from_slice(b"\\{"),
				b'}' => self.data.extend_from_slice(b"\\}"),
				b'\\' => self.data.extend_from_slice(b"\\\\"),
				0x80.. => {
					self.data.extend_from_slice(b"\\'");
					self.data.push(HEX[usize::from(b >> 4)]);
					self.data.push(HEX[usize::from(b & 0x0F)]);
				}
				_ => self.data.push(b),
			}
		}
	}

	/// Appends binary data as lowercase hex.
	pub(crate) fn add_hex(&mut self, bytes: &[u8]) {
		if !self.in_text {
			self.data.push(b' ');
			self.in_text = true;
		}
		self.data.reserve(bytes.len() * 2);
		for &b in bytes {
			self.data.push(HEX[usize::from(b >> 4)]);
			self.data.push(HEX[usize::from(b & 0x0F)]);
		}
	}

	/// Counts the UTF-16 code units `text` renders as.
	pub(crate) fn count_chars(&self, text: &[u8]) -> u32 {
		let (decoded, _, _) = self.encoding.decode(text);
		decoded.encode_utf16().count() as u32
	}

	/// Decodes file-encoded bytes into a string.
	pub(crate) fn decode_text(&self, text: &[u8]) -> String {
		self.encoding.decode(text).0.into_owned()
	}

	/// Registers a link starting at the current character position.
	///
	/// Hotspot links cover no text; any other link stays pending until the
	/// close opcode fixes its end position.
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn alloc_link(
		&mut self,
		kind: LinkKind,
		target: String,
		hash: u32,
		clr_change: bool,
		hotspot: bool,
		window: Option<usize>,
		window_name: Option<String>,
	) -> usize {
		let index = self.links.len();
		self.links.push(Link {
			kind,
			target,
			hash,
			clr_change,
			hotspot,
			window,
			window_name,
			cp_min: self.char_pos,
			cp_max: self.char_pos,
		});
		self.force_color = clr_change;
		if !hotspot {
			if self.current_link.is_some() {
				warn!("pending link replaced before being closed");
			}
			self.current_link = Some(index);
		}
		index
	}

	/// Opens the `HYPERLINK` field for a freshly allocated link.
	pub(crate) fn field_start(&mut self, index: usize) {
		self.add_control(&format!(
			"{{\\field{{\\*\\fldinst{{ HYPERLINK \"{index}\" }}}}{{\\fldrslt{{"
		));
	}

	/// Ends the span of the pending link, if any.
	pub(crate) fn close_current_link(&mut self) {
		if let Some(index) = self.current_link.take() {
			self.links[index].cp_max = self.char_pos;
		}
		self.force_color = false;
	}

	/// Closes every group still open so the stream always parses.
	pub(crate) fn finish(&mut self) {
		while self.depth > 0 {
			self.add_control("}");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rd() -> RtfData {
		RtfData::new(encoding_rs::WINDOWS_1252, 1252, FontScale::Normal, 0)
	}

	#[test]
	fn test_text_escapes() {
		let mut rd = rd();
		rd.add_text(b"a{b}c\\d\xE9");
		assert_eq!(rd.rtf(), b"a\\{b\\}c\\\\d\\'e9");
	}

	#[test]
	fn test_in_text_toggles() {
		let mut rd = rd();
		rd.add_control("\\par");
		// A space must separate the control word from following text.
		rd.add_text(b"x");
		assert_eq!(rd.rtf(), b"\\par x");
		rd.add_control("}");
		rd.add_text(b"y");
		assert_eq!(rd.rtf(), b"\\par x}y");
	}

	#[test]
	fn test_hex_lowercase_pairs() {
		let mut rd = rd();
		rd.add_hex(&[0x00, 0xAB, 0x5C]);
		assert_eq!(rd.rtf(), b"00ab5c");
	}

	#[test]
	fn test_char_pos_counts_utf16_units() {
		let rd = rd();
		assert_eq!(rd.count_chars(b"abc"), 3);
		// 0xE9 is one unit in cp1252
		assert_eq!(rd.count_chars(b"\xE9"), 1);

		let sjis = RtfData::new(encoding_rs::SHIFT_JIS, 932, FontScale::Normal, 0);
		// One double-byte character is a single UTF-16 unit.
		assert_eq!(sjis.count_chars(&[0x93, 0xFA]), 1);
	}

	#[test]
	fn test_link_positions() {
		let mut rd = rd();
		rd.char_pos = 5;
		let idx = rd.alloc_link(LinkKind::Topic, "test.hlp".into(), 42, true, false, None, None);
		rd.field_start(idx);
		rd.char_pos = 9;
		rd.close_current_link();
		let link = &rd.links()[0];
		assert_eq!((link.cp_min, link.cp_max), (5, 9));
		assert!(!rd.force_color);
		assert!(rd.current_link.is_none());
	}

	#[test]
	fn test_hotspot_link_is_closed_immediately() {
		let mut rd = rd();
		rd.char_pos = 7;
		rd.alloc_link(LinkKind::Macro, "Next()".into(), 0, false, true, None, None);
		assert!(rd.current_link.is_none());
		assert_eq!(rd.links()[0].cp_max, 7);
	}

	#[test]
	fn test_finish_balances_groups() {
		let mut rd = rd();
		rd.add_control("{\\rtf1");
		rd.add_control("{\\field{\\*\\fldinst");
		rd.finish();
		let text = String::from_utf8(rd.into_rtf()).unwrap();
		let opens = text.bytes().filter(|&b| b == b'{').count();
		let closes = text.bytes().filter(|&b| b == b'}').count();
		assert_eq!(opens, closes);
	}
}
