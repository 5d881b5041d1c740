//! `|SYSTEM` sub-file parsing and charset negotiation.
//!
//! The system file carries the archive metadata: format version, topic
//! block geometry, title and copyright, secondary window descriptors, the
//! auto-execute macros and (for newer files) the charset. Files older than
//! help 3.1 (`minor <= 16`) have no tagged records; their body is just the
//! title.

use std::path::Path;

use encoding_rs::Encoding;
use log::{debug, trace, warn};

use super::bytes::{cstr_at, u16_at, u32_at};
use super::error::HlpError;

/// Windows charset identifiers seen in help files.
pub mod charset {
	/// Western / Latin 1
	pub const ANSI: u8 = 0;
	/// "Use the system charset"
	pub const DEFAULT: u8 = 1;
	/// Mac Roman
	pub const MAC: u8 = 77;
	/// Japanese, Shift-JIS
	pub const SHIFTJIS: u8 = 128;
	/// Korean, Unified Hangul
	pub const HANGEUL: u8 = 129;
	/// Korean, Johab
	pub const JOHAB: u8 = 130;
	/// Simplified Chinese
	pub const GB2312: u8 = 134;
	/// Traditional Chinese
	pub const CHINESEBIG5: u8 = 136;
	/// Greek
	pub const GREEK: u8 = 161;
	/// Turkish
	pub const TURKISH: u8 = 162;
	/// Vietnamese
	pub const VIETNAMESE: u8 = 163;
	/// Hebrew
	pub const HEBREW: u8 = 177;
	/// Arabic
	pub const ARABIC: u8 = 178;
	/// Baltic
	pub const BALTIC: u8 = 186;
	/// Cyrillic
	pub const RUSSIAN: u8 = 204;
	/// Thai
	pub const THAI: u8 = 222;
	/// Central / Eastern European
	pub const EASTEUROPE: u8 = 238;
}

/// Magic number of the system header.
pub const SYSTEM_MAGIC: u16 = 0x036C;

/// A secondary window descriptor from a `|SYSTEM` record of kind 6.
///
/// Each field guarded by a presence bit falls back to the viewer default.
#[derive(Debug, Clone)]
pub struct Window {
	/// Window class
	pub win_type: String,
	/// Window name, referenced by links
	pub name: String,
	/// Caption (defaults to the archive title)
	pub caption: String,
	/// Horizontal origin, if given
	pub x: Option<u16>,
	/// Vertical origin, if given
	pub y: Option<u16>,
	/// Width, if given
	pub width: Option<u16>,
	/// Height, if given
	pub height: Option<u16>,
	/// Show style (`SW_*` value, defaults to `SW_SHOW`)
	pub show: u16,
	/// Background color of selectable text
	pub sr_color: u32,
	/// Background color of non-selectable text
	pub nsr_color: u32,
	/// Raw presence bitmap
	pub flags: u16,
}

/// Parsed `|SYSTEM` contents plus the negotiated code page.
#[derive(Debug)]
pub struct SystemInfo {
	/// Format minor version
	pub version: u16,
	/// System header flags
	pub flags: u16,
	/// Topic block size (0x800 or 0x1000)
	pub tbsize: usize,
	/// Decompressed size available per topic block
	pub dsize: usize,
	/// Whether topic blocks are LZ77 compressed
	pub compressed: bool,
	/// Negotiated charset
	pub charset: u8,
	/// Negotiated Windows code page
	pub code_page: u16,
	/// Archive title
	pub title: String,
	/// Copyright notice
	pub copyright: String,
	/// Topic offset of the contents page (newer files)
	pub contents_start: u32,
	/// Auto-execute macros
	pub macros: Vec<String>,
	/// Icon resource bytes, with the directory header stripped
	pub icon: Option<Vec<u8>>,
	/// Secondary window descriptors
	pub windows: Vec<Window>,
	/// Language identifier from record 9
	pub lcid: u16,
}

/// Parses `|SYSTEM` and negotiates the code page.
///
/// `charset_sub` and `font_sub` are the raw `|CHARSET` and `|FONT`
/// sub-files, consulted only when the system records leave the charset
/// undeclared.
pub fn load(
	buf: &[u8],
	path: &Path,
	charset_sub: Option<&[u8]>,
	font_sub: Option<&[u8]>,
) -> Result<SystemInfo, HlpError> {
	let magic = u16_at(buf, 9)?;
	let minor = u16_at(buf, 11)?;
	let major = u16_at(buf, 13)?;
	// generation date on 4 bytes
	let flags = u16_at(buf, 19)?;
	trace!("system header: magic={magic:#06x} version={major}.{minor} flags={flags:#06x}");
	if magic != SYSTEM_MAGIC {
		return Err(HlpError::BadMagic {
			found: u32::from(magic),
			expected: u32::from(SYSTEM_MAGIC),
		});
	}
	if major != 1 {
		return Err(HlpError::UnsupportedVersion {
			major,
			minor,
		});
	}

	let (tbsize, compressed) = if minor <= 16 {
		(0x800, false)
	} else if flags == 0 {
		(0x1000, false)
	} else if flags == 4 {
		(0x1000, true)
	} else {
		(0x800, true)
	};
	let dsize = if compressed { 0x4000 } else { tbsize - 0x0C };

	let mut charset = charset::DEFAULT;
	let mut lcid = 0u16;
	let mut title_raw: Option<Vec<u8>> = None;
	let mut copyright_raw: Option<Vec<u8>> = None;
	let mut contents_start = 0xFFFF_FFFFu32;
	let mut macros_raw: Vec<Vec<u8>> = Vec::new();
	let mut icon = None;
	let mut windows_raw: Vec<Vec<u8>> = Vec::new();

	if minor <= 16 {
		let title = cstr_at(buf, 0x15);
		if title.is_empty() {
			let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
			title_raw = Some(stem.unwrap_or_default().into_bytes());
		} else {
			title_raw = Some(title.to_vec());
		}
	} else {
		let mut pos = 0x15;
		while pos + 4 <= buf.len() {
			let kind = u16_at(buf, pos)?;
			let len = usize::from(u16_at(buf, pos + 2)?);
			let data = &buf[pos + 4..(pos + 4 + len).min(buf.len())];
			match kind {
				1 => {
					if title_raw.is_some() {
						warn!("duplicate title record");
					} else {
						title_raw = Some(cstr_at(data, 0).to_vec());
					}
				}
				2 => {
					if copyright_raw.is_some() {
						warn!("duplicate copyright record");
					} else {
						copyright_raw = Some(cstr_at(data, 0).to_vec());
					}
				}
				3 => {
					if len != 4 {
						warn!("contents record has length {len}");
					} else {
						contents_start = u32_at(data, 0)?;
						debug!("contents start at {contents_start:#010x}");
					}
				}
				4 => macros_raw.push(cstr_at(data, 0).to_vec()),
				5 => {
					if data.len() >= 6 && u16_at(data, 4)? != 1 {
						warn!("more than one icon, picking up first");
					}
					// 0x16 bytes of icon directory precede the resource
					if data.len() > 0x16 {
						icon = Some(data[0x16..].to_vec());
					}
				}
				6 => {
					if len != 90 {
						warn!("window record has length {len}");
					} else {
						windows_raw.push(data.to_vec());
					}
				}
				8 => debug!("citation: {:?}", String::from_utf8_lossy(cstr_at(data, 0))),
				9 => {
					if data.len() >= 10 {
						lcid = u16_at(data, 8)?;
					}
				}
				10 => {
					// The sidecar path always derives from the archive path.
					debug!("contents sidecar requested");
				}
				11 => {
					if let Some(&cs) = data.first() {
						charset = cs;
						debug!("charset: {charset}");
					}
				}
				other => warn!("unsupported system record {other}"),
			}
			pos += len + 4;
		}
	}

	if lcid == 0 && charset == charset::DEFAULT {
		if let Some(cs) = charset_sub {
			if cs.len() >= 11 {
				charset = u16_at(cs, 9)? as u8;
			}
		}
		if charset == charset::DEFAULT || charset == charset::ANSI {
			if let Some(font) = font_sub {
				if let Some(detected) = charset_from_faces(font) {
					charset = detected;
				}
			}
		}
	}

	let mut code_page = 1252;
	if charset != charset::DEFAULT && charset != charset::ANSI {
		code_page = charset_code_page(charset).unwrap_or_else(|| {
			warn!("unsupported charset {charset}");
			1252
		});
	} else if lcid != 0 {
		let (cp, cs) = lcid_code_page(lcid);
		code_page = cp;
		charset = cs;
	}

	let encoding = encoding_for_code_page(code_page);
	let decode = |raw: &[u8]| encoding.decode(raw).0.into_owned();

	let title = title_raw.as_deref().map(|raw| decode(raw)).unwrap_or_default();
	let windows = windows_raw.iter().map(|data| parse_window(data, &title, encoding)).collect();

	Ok(SystemInfo {
		version: minor,
		flags,
		tbsize,
		dsize,
		compressed,
		charset,
		code_page,
		title,
		copyright: copyright_raw.as_deref().map(|raw| decode(raw)).unwrap_or_default(),
		contents_start,
		macros: macros_raw.iter().map(|raw| decode(raw)).collect(),
		icon,
		windows,
		lcid,
	})
}

fn parse_window(data: &[u8], title: &str, encoding: &'static Encoding) -> Window {
	let decode = |raw: &[u8]| encoding.decode(raw).0.into_owned();
	let flags = u16_at(data, 0).unwrap_or(0);
	let caption = if flags & 0x0004 != 0 {
		decode(cstr_at(data, 21))
	} else {
		title.to_owned()
	};
	let field = |bit: u16, off: usize| {
		if flags & bit != 0 { u16_at(data, off).ok() } else { None }
	};
	Window {
		win_type: if flags & 0x0001 != 0 { decode(cstr_at(data, 2)) } else { String::new() },
		name: if flags & 0x0002 != 0 { decode(cstr_at(data, 12)) } else { String::new() },
		caption,
		x: field(0x0008, 72),
		y: field(0x0010, 74),
		width: field(0x0020, 76),
		height: field(0x0040, 78),
		// SW_SHOW
		show: field(0x0080, 80).unwrap_or(5),
		sr_color: if flags & 0x0100 != 0 {
			u32_at(data, 82).unwrap_or(0xFF_FFFF)
		} else {
			0xFF_FFFF
		},
		nsr_color: if flags & 0x0200 != 0 {
			u32_at(data, 86).unwrap_or(0xFF_FFFF)
		} else {
			0xFF_FFFF
		},
		flags,
	}
}

/// Guesses a charset from the `|FONT` face names.
///
/// Far-east help files frequently omit the charset records; their face
/// names (in the file's own encoding) give the game away.
fn charset_from_faces(font: &[u8]) -> Option<u8> {
	let face_num = usize::from(u16_at(font, 9).ok()?);
	let face_offset = usize::from(u16_at(font, 9 + 4).ok()?);
	let dscr_offset = usize::from(u16_at(font, 9 + 6).ok()?);
	if face_num == 0 || dscr_offset <= face_offset {
		return None;
	}
	let len = (dscr_offset - face_offset) / face_num;

	let contains = |hay: &[u8], needle: &[u8]| {
		!needle.is_empty() && hay.windows(needle.len()).any(|w| w == needle)
	};

	let mut guess = None;
	for i in 0..face_num {
		let start = 9 + face_offset + i * len;
		let face = cstr_at(font.get(..(start + len).min(font.len())).unwrap_or_default(), start);
		if contains(face, b"\xb2\xd3\xa9\xfa\xc5\xe9") {
			// MingLiU
			return Some(charset::CHINESEBIG5);
		}
		if face == b"CFShouSung" {
			// big5 files carry this face too, so keep scanning
			guess = Some(charset::GB2312);
		}
		if contains(face, b"\x83\x53\x56\x83\x63\x83\x4e") || contains(face, b"\x96\xbe\x92\xa9") {
			// Gothic / Mincho
			return Some(charset::SHIFTJIS);
		}
		if contains(face, b"\xb8\xed\xc1\xb6")
			|| contains(face, b"\xb0\xed\xb5\xf1")
			|| contains(face, b"\xb9\xd9\xc5\xc1")
		{
			// Myeongjo / Gothic / Batang
			return Some(charset::HANGEUL);
		}
		if contains(face, b"Arabic") {
			return Some(charset::ARABIC);
		}
		if face == b"Arial Cyr" {
			return Some(charset::RUSSIAN);
		}
		if contains(face, b"Thai") || face == b"CordiaUPC" {
			return Some(charset::THAI);
		}
	}
	guess
}

/// Windows code page for a charset identifier.
pub fn charset_code_page(charset: u8) -> Option<u16> {
	match charset {
		self::charset::ANSI | self::charset::DEFAULT => Some(1252),
		self::charset::SHIFTJIS => Some(932),
		self::charset::HANGEUL => Some(949),
		self::charset::JOHAB => Some(1361),
		self::charset::GB2312 => Some(936),
		self::charset::CHINESEBIG5 => Some(950),
		self::charset::GREEK => Some(1253),
		self::charset::TURKISH => Some(1254),
		self::charset::HEBREW => Some(1255),
		self::charset::ARABIC => Some(1256),
		self::charset::BALTIC => Some(1257),
		self::charset::VIETNAMESE => Some(1258),
		self::charset::RUSSIAN => Some(1251),
		self::charset::EASTEUROPE => Some(1250),
		self::charset::THAI => Some(874),
		self::charset::MAC => Some(10000),
		_ => None,
	}
}

/// Code page and charset for a language identifier, keyed on the primary
/// language.
fn lcid_code_page(lcid: u16) -> (u16, u8) {
	match lcid & 0x3FF {
		0x11 => (932, charset::SHIFTJIS),
		0x12 => (949, charset::HANGEUL),
		0x04 => match lcid {
			// Traditional script locales
			0x0404 | 0x0C04 | 0x1404 => (950, charset::CHINESEBIG5),
			_ => (936, charset::GB2312),
		},
		0x08 => (1253, charset::GREEK),
		0x1F => (1254, charset::TURKISH),
		0x0D => (1255, charset::HEBREW),
		0x01 => (1256, charset::ARABIC),
		0x25 | 0x26 | 0x27 => (1257, charset::BALTIC),
		0x2A => (1258, charset::VIETNAMESE),
		0x19 | 0x22 | 0x23 | 0x2F => (1251, charset::RUSSIAN),
		0x1E => (874, charset::THAI),
		0x05 | 0x0E | 0x15 | 0x18 | 0x1A | 0x1B | 0x24 => (1250, charset::EASTEUROPE),
		_ => (1252, charset::ANSI),
	}
}

/// Maps a Windows code page onto an `encoding_rs` encoding.
///
/// Johab (1361) has no encoding in the web platform set; text positions in
/// such files are counted as Latin 1 and a warning is logged.
pub fn encoding_for_code_page(code_page: u16) -> &'static Encoding {
	match code_page {
		874 => encoding_rs::WINDOWS_874,
		932 => encoding_rs::SHIFT_JIS,
		936 => encoding_rs::GBK,
		949 => encoding_rs::EUC_KR,
		950 => encoding_rs::BIG5,
		1250 => encoding_rs::WINDOWS_1250,
		1251 => encoding_rs::WINDOWS_1251,
		1252 => encoding_rs::WINDOWS_1252,
		1253 => encoding_rs::WINDOWS_1253,
		1254 => encoding_rs::WINDOWS_1254,
		1255 => encoding_rs::WINDOWS_1255,
		1256 => encoding_rs::WINDOWS_1256,
		1257 => encoding_rs::WINDOWS_1257,
		1258 => encoding_rs::WINDOWS_1258,
		10000 => encoding_rs::MACINTOSH,
		other => {
			warn!("no encoding for code page {other}, falling back to 1252");
			encoding_rs::WINDOWS_1252
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn system_body(minor: u16, flags: u16, records: &[u8]) -> Vec<u8> {
		let mut buf = vec![0u8; 9];
		buf.extend_from_slice(&SYSTEM_MAGIC.to_le_bytes());
		buf.extend_from_slice(&minor.to_le_bytes());
		buf.extend_from_slice(&1u16.to_le_bytes());
		buf.extend_from_slice(&[0; 4]); // generation date
		buf.extend_from_slice(&flags.to_le_bytes());
		buf.extend_from_slice(records);
		buf
	}

	fn record(kind: u16, data: &[u8]) -> Vec<u8> {
		let mut r = Vec::new();
		r.extend_from_slice(&kind.to_le_bytes());
		r.extend_from_slice(&(data.len() as u16).to_le_bytes());
		r.extend_from_slice(data);
		r
	}

	#[test]
	fn test_block_geometry() {
		let cases = [
			(16u16, 0u16, 0x800usize, false),
			(21, 0, 0x1000, false),
			(21, 4, 0x1000, true),
			(21, 8, 0x800, true),
		];
		for (minor, flags, tbsize, compressed) in cases {
			let buf = system_body(minor, flags, &[]);
			let sys = load(&buf, Path::new("test.hlp"), None, None).unwrap();
			assert_eq!(sys.tbsize, tbsize);
			assert_eq!(sys.compressed, compressed);
			let dsize = if compressed { 0x4000 } else { tbsize - 0x0C };
			assert_eq!(sys.dsize, dsize);
		}
	}

	#[test]
	fn test_bad_header_rejected() {
		let mut buf = system_body(21, 0, &[]);
		buf[9] = 0;
		assert!(matches!(
			load(&buf, Path::new("x.hlp"), None, None),
			Err(HlpError::BadMagic { .. })
		));

		let mut buf = system_body(21, 0, &[]);
		buf[13] = 2;
		assert!(matches!(
			load(&buf, Path::new("x.hlp"), None, None),
			Err(HlpError::UnsupportedVersion { major: 2, .. })
		));
	}

	#[test]
	fn test_tagged_records() {
		let mut records = Vec::new();
		records.extend(record(1, b"My Help\0"));
		records.extend(record(2, b"(c) nobody\0"));
		records.extend(record(3, &0x1234u32.to_le_bytes()));
		records.extend(record(4, b"About()\0"));
		let buf = system_body(21, 0, &records);
		let sys = load(&buf, Path::new("x.hlp"), None, None).unwrap();
		assert_eq!(sys.title, "My Help");
		assert_eq!(sys.copyright, "(c) nobody");
		assert_eq!(sys.contents_start, 0x1234);
		assert_eq!(sys.macros, ["About()"]);
	}

	#[test]
	fn test_old_title_fallback() {
		let buf = system_body(16, 0, b"\0");
		let sys = load(&buf, Path::new("dir/guide.hlp"), None, None).unwrap();
		assert_eq!(sys.title, "guide");

		let buf = system_body(16, 0, b"Old Title\0");
		let sys = load(&buf, Path::new("dir/guide.hlp"), None, None).unwrap();
		assert_eq!(sys.title, "Old Title");
	}

	#[test]
	fn test_window_record_presence_bits() {
		let mut data = vec![0u8; 90];
		// type + name + caption + x + show
		let flags: u16 = 0x0001 | 0x0002 | 0x0004 | 0x0008 | 0x0080;
		data[0..2].copy_from_slice(&flags.to_le_bytes());
		data[2..7].copy_from_slice(b"main\0");
		data[12..17].copy_from_slice(b"wmain\0");
		data[21..25].copy_from_slice(b"Cap\0");
		data[72..74].copy_from_slice(&100u16.to_le_bytes());
		data[80..82].copy_from_slice(&3u16.to_le_bytes());
		let buf = system_body(21, 0, &record(6, &data));
		let sys = load(&buf, Path::new("x.hlp"), None, None).unwrap();
		assert_eq!(sys.windows.len(), 1);
		let w = &sys.windows[0];
		assert_eq!(w.win_type, "main");
		assert_eq!(w.name, "wmain");
		assert_eq!(w.caption, "Cap");
		assert_eq!(w.x, Some(100));
		assert_eq!(w.y, None);
		assert_eq!(w.show, 3);
		assert_eq!(w.sr_color, 0xFF_FFFF);
	}

	#[test]
	fn test_charset_record_wins() {
		let buf = system_body(21, 0, &record(11, &[charset::GREEK]));
		let sys = load(&buf, Path::new("x.hlp"), None, None).unwrap();
		assert_eq!(sys.charset, charset::GREEK);
		assert_eq!(sys.code_page, 1253);
	}

	#[test]
	fn test_lcid_fallback() {
		let mut data = vec![0u8; 10];
		data[8..10].copy_from_slice(&0x0411u16.to_le_bytes());
		let buf = system_body(21, 0, &record(9, &data));
		let sys = load(&buf, Path::new("x.hlp"), None, None).unwrap();
		assert_eq!(sys.code_page, 932);
		assert_eq!(sys.charset, charset::SHIFTJIS);
	}

	#[test]
	fn test_face_name_heuristic() {
		// A |FONT sub-file with one 10-byte face slot named "Arial Cyr".
		let mut font = vec![0u8; 9 + 8];
		font[9..11].copy_from_slice(&1u16.to_le_bytes()); // face_num
		font[13..15].copy_from_slice(&8u16.to_le_bytes()); // face_offset
		font[15..17].copy_from_slice(&18u16.to_le_bytes()); // dscr_offset
		font.extend_from_slice(b"Arial Cyr\0");
		let buf = system_body(21, 0, &[]);
		let sys = load(&buf, Path::new("x.hlp"), None, Some(&font)).unwrap();
		assert_eq!(sys.charset, charset::RUSSIAN);
		assert_eq!(sys.code_page, 1251);
	}
}
