//! Windows Help (`.HLP`) archive support.
//!
//! A help archive is a small virtual file system: a B+ tree directory maps
//! sub-file names onto byte ranges, and the interesting sub-files stack
//! three compression layers (LZ77 blocks, run-length graphics, phrase
//! dictionaries) under a paragraph byte-code. [`File`] owns the archive
//! buffer and every table decoded from it; [`File::browse_page`] lowers
//! one page into RTF plus link annotations.

mod error;

pub mod btree;
pub mod bytes;
mod cnt;
pub mod compress;
pub mod font;
pub mod hash;
pub mod image;
pub mod page;
mod paragraph;
pub mod phrases;
pub mod rtf;
pub mod system;
pub mod topic;

mod keyword;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use encoding_rs::Encoding;
use log::{debug, error, warn};

use self::btree::{AsciiKey, HashKey};
use self::bytes::{cstr_at, u16_at, u32_at};
use self::cnt::Contents;
use self::font::FontTable;
use self::page::{MapEntry, Page, PageKind};
use self::phrases::PhraseTable;
use self::system::{SystemInfo, Window};
use self::topic::TopicArena;

pub use error::HlpError;
pub use keyword::{KeywordEntry, KeywordTree};
pub use rtf::{FontScale, Hotspot, Link, LinkKind, RtfData};

/// Magic number of a help archive.
pub const HLP_MAGIC: u32 = 0x0003_5F3F;

/// A view of one sub-file inside the archive buffer.
///
/// The first nine bytes are the sub-file header (declared length, used
/// length, one flag byte); the payload follows.
#[derive(Debug, Clone, Copy)]
pub struct SubFile<'a> {
	bytes: &'a [u8],
}

impl<'a> SubFile<'a> {
	/// The whole sub-file, header included.
	pub fn bytes(&self) -> &'a [u8] {
		self.bytes
	}

	/// The sub-file body after the nine-byte header.
	pub fn payload(&self) -> &'a [u8] {
		&self.bytes[9..]
	}
}

/// Locates a sub-file body inside the archive buffer.
fn find_sub_file<'a>(buffer: &'a [u8], name: &str) -> Option<SubFile<'a>> {
	let dir_off = u32_at(buffer, 4).ok()? as usize;
	let dir = buffer.get(dir_off..)?;

	let mut hit = btree::search(dir, &AsciiKey(name.as_bytes())).ok()?;
	if hit.is_none() {
		// Bitmap sub-files are usually prefixed with '|', but not always;
		// the directory may hold either spelling.
		if let Some(stripped) = name.strip_prefix('|') {
			debug!("{name} not found, retrying as {stripped}");
			hit = btree::search(dir, &AsciiKey(stripped.as_bytes())).ok()?;
		}
	}
	let entry = hit?;

	let key_len = cstr_at(dir, entry).len();
	let sub_off = u32_at(dir, entry + key_len + 1).ok()? as usize;
	if sub_off >= buffer.len() {
		error!("internal file {name} does not fit");
		return None;
	}
	let sub_len = u32_at(buffer, sub_off).ok()? as usize;
	if sub_off + sub_len > buffer.len() {
		error!("internal file {name} does not fit");
		return None;
	}
	let used = u32_at(buffer, sub_off + 4).ok()? as usize;
	if sub_len < used + 9 {
		error!("invalid size provided for internal file {name}");
		return None;
	}
	Some(SubFile {
		bytes: &buffer[sub_off..sub_off + sub_len],
	})
}

/// An opened help archive.
///
/// Everything decoded at open time is immutable afterwards, so a `File`
/// can be shared across threads behind an [`Arc`]; each reader only needs
/// its own [`RtfData`] per [`File::browse_page`] call.
#[derive(Debug)]
pub struct File {
	path: PathBuf,
	buffer: Vec<u8>,
	pub(crate) system: SystemInfo,
	pub(crate) font_table: FontTable,
	pub(crate) phrases: Option<PhraseTable>,
	pub(crate) topic: TopicArena,
	pub(crate) encoding: &'static Encoding,
	tomap: Vec<u32>,
	map: Vec<MapEntry>,
	context: Option<Vec<u8>>,
	keywords: Option<KeywordTree>,
	pages: Vec<Page>,
	pub(crate) contents: Option<Contents>,
	cnt_page_index: Option<usize>,
}

impl File {
	/// Opens and fully decodes a help archive.
	pub fn open(path: impl AsRef<Path>) -> Result<Self, HlpError> {
		let path = path.as_ref();
		let mut buffer = std::fs::read(path)?;
		if buffer.len() < 16 {
			return Err(HlpError::Truncated {
				offset: 0,
				needed: 16,
				available: buffer.len(),
			});
		}
		let magic = u32_at(&buffer, 0)?;
		if magic != HLP_MAGIC {
			return Err(HlpError::BadMagic {
				found: magic,
				expected: HLP_MAGIC,
			});
		}
		let declared = u32_at(&buffer, 12)? as usize;
		if declared > buffer.len() {
			return Err(HlpError::Truncated {
				offset: 0,
				needed: declared,
				available: buffer.len(),
			});
		}
		if declared < buffer.len() {
			warn!("{} trailing bytes past the declared size", buffer.len() - declared);
			buffer.truncate(declared);
		}

		let system_sub =
			find_sub_file(&buffer, "|SYSTEM").ok_or(HlpError::MissingSubFile("|SYSTEM"))?;
		let charset_sub = find_sub_file(&buffer, "|CHARSET");
		let font_sub = find_sub_file(&buffer, "|FONT");
		let system = system::load(
			system_sub.bytes(),
			path,
			charset_sub.map(|s| s.bytes()),
			font_sub.map(|s| s.bytes()),
		)?;
		let encoding = system::encoding_for_code_page(system.code_page);

		let tomap = if system.version <= 16 {
			let sub =
				find_sub_file(&buffer, "|TOMAP").ok_or(HlpError::MissingSubFile("|TOMAP"))?;
			sub.payload()
				.chunks_exact(4)
				.map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
				.collect()
		} else {
			Vec::new()
		};

		let phrases = load_phrases(&buffer, system.version);

		let topic_sub =
			find_sub_file(&buffer, "|TOPIC").ok_or(HlpError::MissingSubFile("|TOPIC"))?;
		let topic =
			TopicArena::decompress(topic_sub.bytes(), system.tbsize, system.dsize, system.compressed)?;

		let font_sub = font_sub.ok_or(HlpError::MissingSubFile("|FONT"))?;
		let font_table = font::load(font_sub.bytes(), system.charset)?;

		let pages = topic::scan_pages(
			&topic,
			system.version,
			system.dsize,
			phrases.as_ref(),
			&tomap,
			encoding,
		);

		let map = match find_sub_file(&buffer, "|CTXOMAP") {
			Some(sub) => load_ctxomap(sub.bytes()),
			None => {
				debug!("no map section");
				Vec::new()
			}
		};

		let context = if system.version > 16 {
			let sub =
				find_sub_file(&buffer, "|CONTEXT").ok_or(HlpError::MissingSubFile("|CONTEXT"))?;
			Some(sub.bytes().to_vec())
		} else {
			None
		};

		let mut file = Self {
			path: path.to_path_buf(),
			buffer,
			system,
			font_table,
			phrases,
			topic,
			encoding,
			tomap,
			map,
			context,
			keywords: None,
			pages,
			contents: None,
			cnt_page_index: None,
		};
		file.keywords = file.load_keyword_tree('K');
		file.load_contents();
		Ok(file)
	}

	fn load_contents(&mut self) {
		let cnt_path = self.path.with_extension("CNT");
		let Some(contents) =
			cnt::read_cnt(&cnt_path, &self.path_name(), self.encoding, self.system.code_page)
		else {
			return;
		};
		self.pages.push(Page {
			kind: PageKind::Contents,
			title: contents.title.clone().unwrap_or_else(|| "Contents".to_owned()),
			number: 0,
			offset: contents.rtf.len() as u32,
			reference: 0,
			browse_bwd: None,
			browse_fwd: None,
			macros: Vec::new(),
		});
		self.cnt_page_index = Some(self.pages.len() - 1);
		self.contents = Some(contents);
	}

	/// Looks up a sub-file by name, retrying without a leading `|`.
	pub(crate) fn sub_file(&self, name: &str) -> Option<SubFile<'_>> {
		find_sub_file(&self.buffer, name)
	}

	/// Loads the key-word index named by `letter` (for example `'K'` or
	/// `'A'`), if the archive carries one.
	pub fn load_keyword_tree(&self, letter: char) -> Option<KeywordTree> {
		let letter = letter.to_ascii_uppercase();
		let tree = self.sub_file(&format!("|{letter}WBTREE"))?;
		let Some(data) = self.sub_file(&format!("|{letter}WDATA")) else {
			error!("corrupted help file: |{letter}WBTREE present but |{letter}WDATA absent");
			return None;
		};
		Some(KeywordTree::new(letter, tree.bytes().to_vec(), data.bytes().to_vec()))
	}

	/// Names of every sub-file in the directory, in order.
	pub fn sub_file_names(&self) -> Vec<String> {
		let Some(dir_off) = u32_at(&self.buffer, 4).ok().map(|v| v as usize) else {
			return Vec::new();
		};
		let Some(dir) = self.buffer.get(dir_off..) else {
			return Vec::new();
		};
		let mut names = Vec::new();
		let result = btree::enumerate(dir, &AsciiKey(b""), |entry| {
			names.push(String::from_utf8_lossy(cstr_at(entry, 0)).into_owned());
		});
		if let Err(err) = result {
			warn!("directory enumeration failed: {err}");
		}
		names
	}

	/// Archive path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Archive path as the string used in link targets.
	pub fn path_name(&self) -> String {
		self.path.to_string_lossy().into_owned()
	}

	/// Format minor version.
	pub fn version(&self) -> u16 {
		self.system.version
	}

	/// Negotiated charset.
	pub fn charset(&self) -> u8 {
		self.system.charset
	}

	/// Negotiated Windows code page.
	pub fn code_page(&self) -> u16 {
		self.system.code_page
	}

	/// Whether the topic blocks are LZ77 compressed.
	pub fn compressed(&self) -> bool {
		self.system.compressed
	}

	/// Number of blocks in the topic stream.
	pub fn topic_blocks(&self) -> usize {
		self.topic.block_count()
	}

	/// Archive title.
	pub fn title(&self) -> &str {
		&self.system.title
	}

	/// Copyright notice.
	pub fn copyright(&self) -> &str {
		&self.system.copyright
	}

	/// Auto-execute macros declared by the archive.
	pub fn macros(&self) -> &[String] {
		&self.system.macros
	}

	/// Icon resource bytes, when the archive declares one.
	pub fn icon(&self) -> Option<&[u8]> {
		self.system.icon.as_deref()
	}

	/// Secondary window descriptors.
	pub fn windows(&self) -> &[Window] {
		&self.system.windows
	}

	/// Font descriptors.
	pub fn fonts(&self) -> &[font::Font] {
		&self.font_table.fonts
	}

	/// All pages, including the synthetic contents page when present.
	pub fn pages(&self) -> &[Page] {
		&self.pages
	}

	/// One page by index.
	pub fn page(&self, index: usize) -> Option<&Page> {
		self.pages.get(index)
	}

	/// The standard key-word index, when present.
	pub fn keywords(&self) -> Option<&KeywordTree> {
		self.keywords.as_ref()
	}

	/// `|CTXOMAP` entries.
	pub fn map_entries(&self) -> &[MapEntry] {
		&self.map
	}

	pub(crate) fn half_points(&self, value: i32) -> i32 {
		self.font_table.half_points(value)
	}

	/// Finds the page covering a topic offset.
	///
	/// Returns the page index and the relative offset to scroll to.
	pub fn page_by_offset(&self, offset: u32) -> Option<(usize, u32)> {
		if offset == 0xFFFF_FFFF {
			return None;
		}
		let mut found: Option<usize> = None;
		for (index, page) in self.pages.iter().enumerate() {
			if page.kind != PageKind::Topic {
				continue;
			}
			if page.offset <= offset
				&& found.is_none_or(|f| self.pages[f].offset < page.offset)
			{
				found = Some(index);
			}
		}
		if found.is_none() {
			error!("page of offset {offset:#x} not found in {}", self.path.display());
		}
		found.map(|index| (index, offset))
	}

	/// Finds a page by context hash. Hash 0 selects the contents page.
	pub fn page_by_hash(&self, hash: u32) -> Option<(usize, u32)> {
		if hash == 0 {
			return self.contents_page();
		}
		// Old files use hash values as TOMAP slots.
		if self.system.version <= 16 {
			let index = hash as usize;
			if index >= self.tomap.len() {
				return None;
			}
			return self.page_by_offset(self.tomap[index]);
		}
		let context = self.context.as_deref()?;
		let entry = match btree::search(context, &HashKey(hash)) {
			Ok(Some(entry)) => entry,
			Ok(None) => {
				error!("page of hash {hash:#x} not found in {}", self.path.display());
				return None;
			}
			Err(err) => {
				error!("context lookup failed: {err}");
				return None;
			}
		};
		self.page_by_offset(u32_at(context, entry + 4).ok()?)
	}

	/// Finds a page by its `|CTXOMAP` numeric identifier.
	pub fn page_by_map(&self, map: u32) -> Option<(usize, u32)> {
		for entry in &self.map {
			if entry.map == map {
				return self.page_by_offset(entry.offset);
			}
		}
		error!("page of map {map:#x} not found in {}", self.path.display());
		None
	}

	/// The page to show when no target is given: the sidecar contents page
	/// if one exists, else the declared contents topic, else the first
	/// page.
	pub fn contents_page(&self) -> Option<(usize, u32)> {
		if let Some(index) = self.cnt_page_index {
			return Some((index, 0));
		}
		let by_offset = if self.system.version <= 16 {
			self.tomap.first().and_then(|&offset| self.page_by_offset(offset))
		} else {
			self.page_by_offset(self.system.contents_start)
		};
		by_offset
			.map(|(index, _)| (index, 0))
			.or_else(|| (!self.pages.is_empty()).then_some((0, 0)))
	}

	/// Renders a page as RTF.
	///
	/// `relative` is a topic offset (as produced by the lookups) marked in
	/// the stream with a hidden `scroll_<hex>` paragraph; `window` selects
	/// the color scheme of the target window.
	pub fn browse_page(
		&self,
		page_index: usize,
		font_scale: FontScale,
		relative: u32,
		window: Option<&Window>,
	) -> Option<RtfData> {
		let page = self.pages.get(page_index)?;
		Some(paragraph::browse_page(self, page, font_scale, relative, window))
	}
}

fn load_phrases(buffer: &[u8], version: u16) -> Option<PhraseTable> {
	if let Some(sub) = find_sub_file(buffer, "|Phrases") {
		match PhraseTable::from_phrases(sub.bytes(), version) {
			Ok(table) => return Some(table),
			Err(err) => warn!("|Phrases unusable: {err}"),
		}
	}
	let idx = find_sub_file(buffer, "|PhrIndex")?;
	let img = find_sub_file(buffer, "|PhrImage")?;
	match PhraseTable::from_phrase_index(idx.bytes(), img.bytes()) {
		Ok(table) => Some(table),
		Err(err) => {
			warn!("|PhrIndex unusable: {err}");
			None
		}
	}
}

fn load_ctxomap(buf: &[u8]) -> Vec<MapEntry> {
	let Ok(entries) = u16_at(buf, 9) else {
		return Vec::new();
	};
	let mut map = Vec::with_capacity(usize::from(entries));
	for i in 0..usize::from(entries) {
		let (Ok(id), Ok(offset)) = (u32_at(buf, 11 + i * 8), u32_at(buf, 11 + i * 8 + 4)) else {
			warn!("map section truncated after {i} entries");
			break;
		};
		map.push(MapEntry {
			map: id,
			offset,
		});
	}
	map
}

/// The handle table sharing opened archives.
///
/// Opening a path twice hands back the same [`Arc`]; dropping every handle
/// releases the archive, so closing is naturally idempotent.
#[derive(Debug, Default)]
pub struct Opener {
	open: HashMap<PathBuf, Weak<File>>,
}

impl Opener {
	/// Creates an empty handle table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Opens `path`, reusing the archive if it is already loaded.
	pub fn open(&mut self, path: impl AsRef<Path>) -> Result<Arc<File>, HlpError> {
		let key = path.as_ref().to_path_buf();
		if let Some(existing) = self.open.get(&key).and_then(Weak::upgrade) {
			return Ok(existing);
		}
		let file = Arc::new(File::open(&key)?);
		self.open.insert(key, Arc::downgrade(&file));
		Ok(file)
	}

	/// Releases one handle and prunes fully-closed archives.
	pub fn close(&mut self, file: Arc<File>) {
		drop(file);
		self.open.retain(|_, weak| weak.strong_count() > 0);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::file::hash::context_hash;

	/// Serializes a minimal but complete help archive.
	#[derive(Default)]
	struct ArchiveBuilder {
		subfiles: Vec<(Vec<u8>, Vec<u8>)>,
	}

	impl ArchiveBuilder {
		fn add(&mut self, name: &str, payload: Vec<u8>) -> &mut Self {
			self.subfiles.push((name.as_bytes().to_vec(), payload));
			self
		}

		fn build(&mut self) -> Vec<u8> {
			self.subfiles.sort_by(|a, b| a.0.cmp(&b.0));

			let mut out = vec![0u8; 16];
			let mut entries = Vec::new();
			for (name, payload) in &self.subfiles {
				entries.push((name.clone(), out.len() as u32));
				out.extend_from_slice(&((9 + payload.len()) as u32).to_le_bytes());
				out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
				out.push(0);
				out.extend_from_slice(payload);
			}

			// Directory: a single-leaf B+ tree keyed by name.
			let page_size = 1024u16;
			let mut page = vec![0u8; 8];
			page[2..4].copy_from_slice(&(entries.len() as i16).to_le_bytes());
			page[6..8].copy_from_slice(&0xFFFFu16.to_le_bytes());
			for (name, offset) in &entries {
				page.extend_from_slice(name);
				page.push(0);
				page.extend_from_slice(&offset.to_le_bytes());
			}
			page.resize(usize::from(page_size), 0);

			let mut tree = vec![0u8; 38];
			tree[0..2].copy_from_slice(&btree::BTREE_MAGIC.to_le_bytes());
			tree[4..6].copy_from_slice(&page_size.to_le_bytes());
			tree[26..28].copy_from_slice(&0u16.to_le_bytes());
			tree[32..34].copy_from_slice(&1u16.to_le_bytes());
			tree.extend_from_slice(&page);

			let dir_off = out.len() as u32;
			out.extend_from_slice(&((9 + tree.len()) as u32).to_le_bytes());
			out.extend_from_slice(&(tree.len() as u32).to_le_bytes());
			out.push(0);
			out.extend_from_slice(&tree);

			out[0..4].copy_from_slice(&HLP_MAGIC.to_le_bytes());
			out[4..8].copy_from_slice(&dir_off.to_le_bytes());
			let size = out.len() as u32;
			out[12..16].copy_from_slice(&size.to_le_bytes());
			out
		}
	}

	fn system_payload() -> Vec<u8> {
		let mut buf = Vec::new();
		buf.extend_from_slice(&system::SYSTEM_MAGIC.to_le_bytes());
		buf.extend_from_slice(&21u16.to_le_bytes()); // minor
		buf.extend_from_slice(&1u16.to_le_bytes()); // major
		buf.extend_from_slice(&[0; 4]); // generation date
		buf.extend_from_slice(&0u16.to_le_bytes()); // flags: uncompressed 4k
		// title record
		buf.extend_from_slice(&1u16.to_le_bytes());
		buf.extend_from_slice(&10u16.to_le_bytes());
		buf.extend_from_slice(b"Test File\0");
		buf
	}

	fn font_payload() -> Vec<u8> {
		let mut buf = Vec::new();
		buf.extend_from_slice(&1u16.to_le_bytes()); // face_num
		buf.extend_from_slice(&1u16.to_le_bytes()); // dscr_num
		buf.extend_from_slice(&8u16.to_le_bytes()); // face_offset
		buf.extend_from_slice(&13u16.to_le_bytes()); // dscr_offset
		buf.extend_from_slice(b"Helv\0");
		let mut dscr = [0u8; 11];
		dscr[1] = 20; // height
		dscr[2] = 0x03; // swiss
		buf.extend_from_slice(&dscr);
		buf
	}

	/// One 4 KiB uncompressed topic block: a topic header chained to a
	/// display record saying "Hello, world!".
	fn topic_payload() -> Vec<u8> {
		let title = b"First Page\0";
		let hdr_size = 0x25 + title.len();

		let mut hdr = vec![0u8; 0x25];
		hdr[0..4].copy_from_slice(&(hdr_size as u32).to_le_bytes());
		hdr[4..8].copy_from_slice(&(title.len() as u32).to_le_bytes());
		hdr[0x0C..0x10].copy_from_slice(&((0x0C + hdr_size) as u32).to_le_bytes());
		hdr[0x10..0x14].copy_from_slice(&0x25u32.to_le_bytes());
		hdr[0x14] = topic::HLP_TOPICHDR;
		hdr[0x19..0x1D].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
		hdr[0x1D..0x21].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
		hdr[0x21..0x25].copy_from_slice(&1u32.to_le_bytes());
		hdr.extend_from_slice(title);

		let text = b"Hello, world!\0";
		// fetch_long, fetch_ushort (paragraph length), column header,
		// attribute bits, then one paragraph-break opcode.
		let format = [0x02u8, 0x80, 0x02, 0, 0, 0, 0, 0, 0, 0x82];
		let datalen = 0x15 + format.len();
		let mut dsp = vec![0u8; 0x15];
		dsp[0..4].copy_from_slice(&((datalen + text.len()) as u32).to_le_bytes());
		dsp[4..8].copy_from_slice(&(text.len() as u32).to_le_bytes());
		dsp[0x0C..0x10].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
		dsp[0x10..0x14].copy_from_slice(&(datalen as u32).to_le_bytes());
		dsp[0x14] = topic::HLP_DISPLAY;
		dsp.extend_from_slice(&format);
		dsp.extend_from_slice(text);

		let mut block = vec![0u8; 0x0C];
		block.extend_from_slice(&hdr);
		block.extend_from_slice(&dsp);
		block.resize(0x1000, 0);
		block
	}

	fn context_payload(hash: u32, offset: u32) -> Vec<u8> {
		let page_size = 64u16;
		let mut page = vec![0u8; 8];
		page[2..4].copy_from_slice(&1i16.to_le_bytes());
		page[6..8].copy_from_slice(&0xFFFFu16.to_le_bytes());
		page.extend_from_slice(&hash.to_le_bytes());
		page.extend_from_slice(&offset.to_le_bytes());
		page.resize(usize::from(page_size), 0);

		let mut tree = vec![0u8; 38];
		tree[0..2].copy_from_slice(&btree::BTREE_MAGIC.to_le_bytes());
		tree[4..6].copy_from_slice(&page_size.to_le_bytes());
		tree[32..34].copy_from_slice(&1u16.to_le_bytes());
		tree.extend_from_slice(&page);
		tree
	}

	fn write_archive(name: &str) -> PathBuf {
		let mut builder = ArchiveBuilder::default();
		builder
			.add("|SYSTEM", system_payload())
			.add("|FONT", font_payload())
			.add("|TOPIC", topic_payload())
			.add("|CONTEXT", context_payload(context_hash(b"first"), 0));
		let bytes = builder.build();
		let mut path = std::env::temp_dir();
		path.push(format!("winhlp-test-{}-{name}.hlp", std::process::id()));
		std::fs::write(&path, bytes).unwrap();
		path
	}

	#[test_log::test]
	fn test_open_full_archive() {
		let path = write_archive("open");
		let file = File::open(&path).unwrap();
		std::fs::remove_file(&path).ok();

		assert_eq!(file.title(), "Test File");
		assert_eq!(file.version(), 21);
		assert_eq!(file.code_page(), 1252);
		assert_eq!(file.fonts().len(), 1);
		assert_eq!(file.pages().len(), 1);
		assert_eq!(file.pages()[0].title, "First Page");
		assert_eq!(file.pages()[0].number, 1);

		let names = file.sub_file_names();
		assert_eq!(names, ["|CONTEXT", "|FONT", "|SYSTEM", "|TOPIC"]);
	}

	#[test_log::test]
	fn test_page_by_hash_and_browse() {
		let path = write_archive("browse");
		let file = File::open(&path).unwrap();
		std::fs::remove_file(&path).ok();

		let (page, relative) = file.page_by_hash(context_hash(b"first")).unwrap();
		assert_eq!(page, 0);
		let rd = file.browse_page(page, FontScale::Normal, relative, None).unwrap();
		let text = String::from_utf8(rd.into_rtf()).unwrap();
		assert!(text.starts_with("{\\rtf1\\ansi\\ansicpg1252\\deff1"));
		assert!(text.contains("{\\f0 Arial;}"));
		assert!(text.contains("{\\f1\\fswiss\\fprq0\\fcharset0 Helv;}"));
		assert!(text.contains("Hello, world!"));
		assert!(text.contains("\\pard"));
		assert!(text.ends_with('}'));
		assert_eq!(
			text.bytes().filter(|&b| b == b'{').count(),
			text.bytes().filter(|&b| b == b'}').count()
		);
	}

	#[test]
	fn test_sub_file_bar_prefix_retry() {
		let mut builder = ArchiveBuilder::default();
		builder
			.add("|SYSTEM", system_payload())
			.add("|FONT", font_payload())
			.add("|TOPIC", topic_payload())
			.add("|CONTEXT", context_payload(context_hash(b"first"), 0))
			.add("bm0", vec![1, 2, 3]);
		let bytes = builder.build();
		let mut path = std::env::temp_dir();
		path.push(format!("winhlp-test-{}-bar.hlp", std::process::id()));
		std::fs::write(&path, bytes).unwrap();
		let file = File::open(&path).unwrap();
		std::fs::remove_file(&path).ok();

		// Stored without the '|' prefix, found either way.
		assert!(file.sub_file("bm0").is_some());
		assert_eq!(file.sub_file("|bm0").unwrap().payload(), [1, 2, 3]);
		assert!(file.sub_file("|bm1").is_none());
	}

	#[test]
	fn test_old_version_hash_is_tomap_slot() {
		let path = write_archive("tomap");
		let mut file = File::open(&path).unwrap();
		std::fs::remove_file(&path).ok();

		file.system.version = 16;
		file.tomap = vec![0x00, 0x00];
		// In-range hashes are TOMAP slots; anything past the table misses.
		assert_eq!(file.page_by_hash(0x1).map(|(i, _)| i), Some(0));
		assert!(file.page_by_hash(0x5).is_none());
	}

	#[test]
	fn test_page_by_hash_miss() {
		let path = write_archive("miss");
		let file = File::open(&path).unwrap();
		std::fs::remove_file(&path).ok();
		assert!(file.page_by_hash(context_hash(b"absent")).is_none());
	}

	#[test]
	fn test_bad_magic() {
		let mut path = std::env::temp_dir();
		path.push(format!("winhlp-test-{}-magic.hlp", std::process::id()));
		std::fs::write(&path, [0u8; 32]).unwrap();
		let result = File::open(&path);
		std::fs::remove_file(&path).ok();
		assert!(matches!(result, Err(HlpError::BadMagic { .. })));
	}

	#[test]
	fn test_missing_required_subfile() {
		let mut builder = ArchiveBuilder::default();
		builder.add("|SYSTEM", system_payload());
		let bytes = builder.build();
		let mut path = std::env::temp_dir();
		path.push(format!("winhlp-test-{}-nofont.hlp", std::process::id()));
		std::fs::write(&path, bytes).unwrap();
		let result = File::open(&path);
		std::fs::remove_file(&path).ok();
		assert!(matches!(result, Err(HlpError::MissingSubFile(_))));
	}

	#[test]
	fn test_page_by_offset_monotonic() {
		let mut file = {
			let path = write_archive("offsets");
			let f = File::open(&path).unwrap();
			std::fs::remove_file(&path).ok();
			f
		};
		let template = file.pages[0].clone();
		file.pages.clear();
		for offset in [0x00u32, 0x100, 0x200] {
			let mut page = template.clone();
			page.offset = offset;
			file.pages.push(page);
		}

		assert_eq!(file.page_by_offset(0x1FF).map(|(i, _)| i), Some(1));
		assert_eq!(file.page_by_offset(0x200), Some((2, 0x200)));
		assert_eq!(file.page_by_offset(0xFFFF_FFFF), None);
		assert_eq!(file.page_by_offset(0x0), Some((0, 0)));
	}

	#[test]
	fn test_opener_shares_handles() {
		let path = write_archive("opener");
		let mut opener = Opener::new();
		let a = opener.open(&path).unwrap();
		let b = opener.open(&path).unwrap();
		assert!(Arc::ptr_eq(&a, &b));
		opener.close(b);
		let c = opener.open(&path).unwrap();
		assert!(Arc::ptr_eq(&a, &c));
		std::fs::remove_file(&path).ok();
	}
}
