//! `|TOPIC` stream handling.
//!
//! The topic stream is divided into fixed-size blocks, each with a 12-byte
//! block header; compressed files LZ77-code every block payload
//! separately. All blocks are decoded up front into one contiguous arena
//! so record references can be resolved with plain offsets.
//!
//! Records chain through the reference at offset 0x0C. Old files
//! (`version <= 16`) store a relative advance and terminate on 0; newer
//! files store the absolute next reference and terminate on
//! `0xFFFF_FFFF`. Crossing a block boundary in an old file skips the next
//! block header by pulling the reference back 12 bytes.

use log::{error, warn};

use encoding_rs::Encoding;

use super::bytes::{Scan, u32_at};
use super::compress::lz77_decompress;
use super::error::HlpError;
use super::page::{Page, PageKind};
use super::phrases::PhraseTable;

/// Record type starting a page.
pub const HLP_TOPICHDR: u8 = 0x02;
/// Plain paragraph record.
pub const HLP_DISPLAY: u8 = 0x20;
/// Paragraph record written by help 3.0 compilers.
pub const HLP_DISPLAY30: u8 = 0x23;
/// Table paragraph record.
pub const HLP_TABLE: u8 = 0x24;

/// The decompressed topic stream.
#[derive(Debug)]
pub(crate) struct TopicArena {
	/// Start of each block's decoded bytes within `data`
	map: Vec<usize>,
	data: Vec<u8>,
}

impl TopicArena {
	/// Decodes a whole `|TOPIC` sub-file.
	pub fn decompress(
		buf: &[u8],
		tbsize: usize,
		dsize: usize,
		compressed: bool,
	) -> Result<Self, HlpError> {
		let payload = buf.get(9..).ok_or(HlpError::Truncated {
			offset: 9,
			needed: 1,
			available: 0,
		})?;
		if payload.is_empty() {
			return Err(HlpError::IntegrityViolation("empty topic stream".into()));
		}
		let maplen = (payload.len() - 1) / tbsize + 1;
		let mut map = Vec::with_capacity(maplen);
		let mut data;

		if compressed {
			data = Vec::new();
			for i in 0..maplen {
				let mut start = i * tbsize;
				// Some compilers truncate the last block below the header
				// size; back up so the slice stays well-formed.
				if start + 0x44 > payload.len() {
					start = payload.len().saturating_sub(0x44);
				}
				let end = payload.len().min(start + tbsize);
				map.push(data.len());
				let src = payload.get(start + 0x0C..end).unwrap_or_default();
				lz77_decompress(src, &mut data);
			}
		} else {
			data = vec![0u8; maplen * dsize];
			for i in 0..maplen {
				map.push(i * dsize);
				let start = i * tbsize + 0x0C;
				if start >= payload.len() {
					break;
				}
				let avail = dsize.min(payload.len() - start);
				data[i * dsize..i * dsize + avail]
					.copy_from_slice(&payload[start..start + avail]);
			}
		}

		Ok(Self {
			map,
			data,
		})
	}

	pub fn block_count(&self) -> usize {
		self.map.len()
	}

	/// Slices the record at (`index`, `offset`), clamped to the arena.
	fn record(&self, index: usize, offset: usize) -> Option<&[u8]> {
		let start = self.map.get(index)? + offset;
		if start + 0x15 >= self.data.len() {
			warn!("record at block {index}+{offset:#x} past end of topic data");
			return None;
		}
		let blocklen = u32_at(&self.data, start).ok()? as usize;
		let end = (start + blocklen).min(self.data.len()).max(start + 0x15);
		Some(&self.data[start..end])
	}
}

/// One record of the topic stream.
#[derive(Debug)]
pub(crate) struct TopicRecord<'a> {
	/// Record bytes, from the record header to the declared end
	pub bytes: &'a [u8],
	/// Record type byte
	pub kind: u8,
	/// Topic block the record starts in
	pub index: usize,
	/// Reference the record was reached through
	pub reference: u32,
}

/// Iterator state for the record chain.
#[derive(Debug)]
pub(crate) struct TopicWalk {
	next_ref: Option<u32>,
	old_index: Option<usize>,
	/// Running in-block offset, advanced by the caller with paragraph
	/// lengths; reset when a new block is entered
	pub offs: u32,
}

impl TopicWalk {
	pub fn new(start: u32) -> Self {
		Self {
			next_ref: Some(start),
			old_index: None,
			offs: 0,
		}
	}

	/// Advances to the next record.
	pub fn next<'a>(
		&mut self,
		arena: &'a TopicArena,
		version: u16,
		dsize: usize,
	) -> Option<TopicRecord<'a>> {
		let mut reference = self.next_ref.take()?;
		let rel = reference.checked_sub(0x0C)? as usize;
		let (index, mut offset) = if version <= 16 {
			(rel / dsize, rel % dsize)
		} else {
			(rel >> 14, rel & 0x3FFF)
		};

		if version <= 16 && self.old_index.is_some_and(|old| old != index) {
			// Crossed into the next block: skip its 12-byte header.
			reference = reference.wrapping_sub(12);
			let Some(adj) = offset.checked_sub(12) else {
				warn!("record reference {reference:#x} underflows block header");
				return None;
			};
			offset = adj;
		}

		let bytes = arena.record(index, offset)?;
		if self.old_index != Some(index) {
			self.offs = 0;
			self.old_index = Some(index);
		}

		let delta = u32_at(bytes, 0x0C).ok()?;
		self.next_ref = if version <= 16 {
			(delta != 0).then(|| reference.wrapping_add(delta))
		} else {
			(delta != 0xFFFF_FFFF).then_some(delta)
		};

		Some(TopicRecord {
			kind: bytes[0x14],
			bytes,
			index,
			reference,
		})
	}
}

/// Length of a paragraph record as used by the offset bookkeeping.
pub(crate) fn paragraph_len(bytes: &[u8], kind: u8) -> u32 {
	if kind == HLP_DISPLAY || kind == HLP_TABLE {
		let mut scan = Scan::at(bytes, 0x15);
		let len = scan.fetch_long().and_then(|_| scan.fetch_ushort());
		match len {
			Ok(len) => u32::from(len),
			Err(_) => {
				warn!("paragraph header too small");
				0
			}
		}
	} else {
		bytes.len().saturating_sub(15) as u32
	}
}

/// First pass over the stream: materializes a `Page` for every topic
/// header.
pub(crate) fn scan_pages(
	arena: &TopicArena,
	version: u16,
	dsize: usize,
	phrases: Option<&PhraseTable>,
	tomap: &[u32],
	encoding: &'static Encoding,
) -> Vec<Page> {
	let mut pages = Vec::new();
	let mut walk = TopicWalk::new(0x0C);
	while let Some(record) = walk.next(arena, version, dsize) {
		match record.kind {
			HLP_TOPICHDR => {
				let offset = if version <= 16 {
					record.reference.wrapping_add(record.index as u32 * 12)
				} else {
					(record.index as u32) * 0x8000 + walk.offs
				};
				if let Some(page) =
					build_page(&record, offset, version, phrases, tomap, encoding)
				{
					pages.push(page);
				}
			}
			HLP_DISPLAY | HLP_DISPLAY30 | HLP_TABLE => {
				walk.offs += paragraph_len(record.bytes, record.kind);
			}
			other => error!("unknown record type {other:#04x}"),
		}
	}
	pages
}

fn build_page(
	record: &TopicRecord<'_>,
	offset: u32,
	version: u16,
	phrases: Option<&PhraseTable>,
	tomap: &[u32],
	encoding: &'static Encoding,
) -> Option<Page> {
	let bytes = record.bytes;
	let blocksize = u32_at(bytes, 0).ok()? as usize;
	let titlesize = u32_at(bytes, 4).ok()? as usize;
	let datalen = u32_at(bytes, 0x10).ok()? as usize;
	if datalen > bytes.len() {
		warn!("topic header title starts past the record");
		return None;
	}

	let src = &bytes[datalen..];
	let avail = blocksize.saturating_sub(datalen);
	let temp = if titlesize > avail {
		match phrases {
			Some(table) => table.decode(src, titlesize),
			None => {
				warn!("title too long for an uncompressed record, splitting");
				src[..avail.min(src.len())].to_vec()
			}
		}
	} else {
		src[..titlesize.min(src.len())].to_vec()
	};

	let title_end = temp.iter().position(|&b| b == 0).unwrap_or(temp.len());
	let title = encoding.decode(&temp[..title_end]).0.into_owned();

	// Null-terminated macro strings follow the title.
	let mut macros = Vec::new();
	let mut pos = title_end + 1;
	while pos < temp.len() {
		let len = temp[pos..].iter().position(|&b| b == 0).unwrap_or(temp.len() - pos);
		if len > 0 {
			macros.push(encoding.decode(&temp[pos..pos + len]).0.into_owned());
		}
		pos += len + 1;
	}

	let browse = |raw: u32| -> Option<u32> {
		if version <= 16 {
			if raw == 0xFFFF || raw == 0xFFFF_FFFF {
				None
			} else {
				match tomap.get(raw as usize) {
					Some(&resolved) => Some(resolved),
					None => {
						warn!("browse link {raw} outside TOMAP");
						None
					}
				}
			}
		} else if raw == 0xFFFF_FFFF {
			None
		} else {
			Some(raw)
		}
	};

	Some(Page {
		kind: PageKind::Topic,
		title,
		number: u32_at(bytes, 0x21).unwrap_or(0),
		offset,
		reference: record.reference,
		browse_bwd: browse(u32_at(bytes, 0x19).unwrap_or(0xFFFF_FFFF)),
		browse_fwd: browse(u32_at(bytes, 0x1D).unwrap_or(0xFFFF_FFFF)),
		macros,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Builds an uncompressed topic sub-file holding `records` packed into
	/// one block, returning (sub-file bytes, tbsize, dsize).
	fn topic_subfile(records: &[Vec<u8>]) -> (Vec<u8>, usize, usize) {
		let tbsize = 0x1000;
		let dsize = tbsize - 0x0C;
		let mut buf = vec![0u8; 9 + 0x0C];
		for r in records {
			buf.extend_from_slice(r);
		}
		buf.resize(9 + tbsize, 0);
		(buf, tbsize, dsize)
	}

	/// A minimal record: header + trailing payload, with the next-record
	/// reference patched in.
	fn record(kind: u8, next_ref: u32, payload: &[u8]) -> Vec<u8> {
		let blocksize = 0x15 + payload.len();
		let mut r = vec![0u8; 0x15];
		r[0..4].copy_from_slice(&(blocksize as u32).to_le_bytes());
		r[0x0C..0x10].copy_from_slice(&next_ref.to_le_bytes());
		r[0x14] = kind;
		r.extend_from_slice(payload);
		r
	}

	/// A topic header whose title (plus macros) is stored raw.
	fn topic_header(next_ref: u32, title: &[u8], number: u32) -> Vec<u8> {
		let datalen = 0x25u32;
		let blocksize = datalen as usize + title.len();
		let mut r = vec![0u8; datalen as usize];
		r[0..4].copy_from_slice(&(blocksize as u32).to_le_bytes());
		r[4..8].copy_from_slice(&(title.len() as u32).to_le_bytes());
		r[0x0C..0x10].copy_from_slice(&next_ref.to_le_bytes());
		r[0x10..0x14].copy_from_slice(&datalen.to_le_bytes());
		r[0x14] = HLP_TOPICHDR;
		r[0x19..0x1D].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
		r[0x1D..0x21].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
		r[0x21..0x25].copy_from_slice(&number.to_le_bytes());
		r.extend_from_slice(title);
		r
	}

	#[test]
	fn test_uncompressed_arena_strips_block_headers() {
		let (buf, tbsize, dsize) = topic_subfile(&[record(HLP_DISPLAY, 0xFFFF_FFFF, b"x")]);
		let arena = TopicArena::decompress(&buf, tbsize, dsize, false).unwrap();
		assert_eq!(arena.block_count(), 1);
		let rec = arena.record(0, 0).unwrap();
		assert_eq!(rec[0x14], HLP_DISPLAY);
	}

	#[test]
	fn test_walk_terminates_on_sentinel() {
		let first = topic_header(0x0C + 0x2B, b"Title\0", 7);
		assert_eq!(first.len(), 0x2B); // keep the chain reference honest
		let second = record(HLP_DISPLAY, 0xFFFF_FFFF, b"");
		let (buf, tbsize, dsize) = topic_subfile(&[first, second]);
		let arena = TopicArena::decompress(&buf, tbsize, dsize, false).unwrap();

		let mut walk = TopicWalk::new(0x0C);
		let kinds: Vec<u8> = std::iter::from_fn(|| walk.next(&arena, 21, dsize).map(|r| r.kind))
			.collect();
		assert_eq!(kinds, [HLP_TOPICHDR, HLP_DISPLAY]);
	}

	#[test]
	fn test_scan_builds_pages_with_macros() {
		let hdr = topic_header(0xFFFF_FFFF, b"My Topic\0JumpContents(`x.hlp')\0", 3);
		let (buf, tbsize, dsize) = topic_subfile(&[hdr]);
		let arena = TopicArena::decompress(&buf, tbsize, dsize, false).unwrap();
		let pages = scan_pages(&arena, 21, dsize, None, &[], encoding_rs::WINDOWS_1252);
		assert_eq!(pages.len(), 1);
		assert_eq!(pages[0].title, "My Topic");
		assert_eq!(pages[0].number, 3);
		assert_eq!(pages[0].macros, ["JumpContents(`x.hlp')"]);
		assert!(pages[0].browse_fwd.is_none());
	}

	#[test]
	fn test_old_browse_links_resolve_through_tomap() {
		let mut hdr = topic_header(0, b"T\0", 1);
		hdr[0x19..0x1D].copy_from_slice(&1u32.to_le_bytes());
		hdr[0x1D..0x21].copy_from_slice(&0xFFFFu32.to_le_bytes());
		let tbsize = 0x800;
		let dsize = tbsize - 0x0C;
		let mut buf = vec![0u8; 9 + 0x0C];
		buf.extend_from_slice(&hdr);
		buf.resize(9 + tbsize, 0);
		let arena = TopicArena::decompress(&buf, tbsize, dsize, false).unwrap();
		let pages = scan_pages(&arena, 15, dsize, None, &[0x40, 0x80], encoding_rs::WINDOWS_1252);
		assert_eq!(pages.len(), 1);
		assert_eq!(pages[0].browse_bwd, Some(0x80));
		assert!(pages[0].browse_fwd.is_none());
	}

	#[test]
	fn test_paragraph_len_variants() {
		// DISPLAY: length comes from the two leading variable ints.
		let mut payload = Vec::new();
		payload.extend_from_slice(&[0x02, 0x80]); // fetch_long -> 1
		payload.push(0x14); // fetch_ushort, even form -> 0x0A
		let rec = record(HLP_DISPLAY, 0, &payload);
		assert_eq!(paragraph_len(&rec, HLP_DISPLAY), 0x0A);

		// DISPLAY30: remaining record length.
		let rec = record(HLP_DISPLAY30, 0, b"abcdef");
		assert_eq!(paragraph_len(&rec, HLP_DISPLAY30), (0x15 + 6 - 15) as u32);
	}
}
