//! Generic search and in-order enumeration over the B+ trees embedded in a
//! help archive (the sub-file directory, `|CONTEXT`, the key-word trees).
//!
//! A B+ tree sub-file starts with the common 9-byte sub-file header; the
//! tree header at offset 9 carries a 16-bit magic, the page size, the root
//! page number and the depth. Pages follow at offset 47. Internal pages
//! hold entries and a trailing next-page pointer; leaf pages chain through
//! a next-leaf field so the whole key space can be walked in order.

use std::cmp::Ordering;

use log::error;

use super::bytes::{cstr_at, i16_at, u16_at, u32_at};
use super::error::HlpError;

/// Magic number of a B+ tree header.
pub const BTREE_MAGIC: u16 = 0x293B;

const TREE_HDR: usize = 9;
const PAGES_OFFSET: usize = TREE_HDR + 38;

/// Key lookup contract for one tree layout.
///
/// Implementations know how entries are laid out, so the engine never has
/// to: `compare` orders a raw entry against the key, `entry_len` yields the
/// distance to the next entry.
pub trait TreeKey {
	/// Orders the entry at `entry` against this key.
	fn compare(&self, entry: &[u8]) -> Ordering;

	/// Size in bytes of the entry at `entry`.
	fn entry_len(&self, entry: &[u8], leaf: bool) -> usize;
}

/// Null-terminated ASCII key, used by the sub-file directory.
///
/// Leaf entries are `name NUL u32-offset`; internal entries `name NUL u16-page`.
pub struct AsciiKey<'a>(pub &'a [u8]);

impl TreeKey for AsciiKey<'_> {
	fn compare(&self, entry: &[u8]) -> Ordering {
		cstr_at(entry, 0).cmp(self.0)
	}

	fn entry_len(&self, entry: &[u8], leaf: bool) -> usize {
		cstr_at(entry, 0).len() + if leaf { 5 } else { 3 }
	}
}

/// Numeric 32-bit key, used by `|CONTEXT`.
///
/// Leaf entries are `u32-hash u32-offset`; internal entries `u32-hash u16-page`.
/// Ordering is signed, matching the tree builder.
pub struct HashKey(pub u32);

impl TreeKey for HashKey {
	fn compare(&self, entry: &[u8]) -> Ordering {
		let value = u32_at(entry, 0).unwrap_or(0) as i32;
		value.cmp(&(self.0 as i32))
	}

	fn entry_len(&self, _entry: &[u8], leaf: bool) -> usize {
		if leaf { 8 } else { 6 }
	}
}

struct Tree<'a> {
	buf: &'a [u8],
	page_size: usize,
	root: usize,
	levels: u16,
}

fn open_tree(buf: &[u8]) -> Result<Tree<'_>, HlpError> {
	let magic = u16_at(buf, TREE_HDR)?;
	if magic != BTREE_MAGIC {
		error!("invalid magic in B+ tree: {magic:#06x}");
		return Err(HlpError::IntegrityViolation(format!(
			"B+ tree magic {magic:#06x}, expected {BTREE_MAGIC:#06x}"
		)));
	}
	Ok(Tree {
		buf,
		page_size: usize::from(u16_at(buf, TREE_HDR + 4)?),
		root: usize::from(u16_at(buf, TREE_HDR + 26)?),
		levels: u16_at(buf, TREE_HDR + 32)?,
	})
}

impl Tree<'_> {
	fn page(&self, index: usize) -> Result<usize, HlpError> {
		let start = PAGES_OFFSET + index * self.page_size;
		if start >= self.buf.len() {
			return Err(HlpError::IntegrityViolation(format!(
				"B+ tree page {index} outside sub-file"
			)));
		}
		Ok(start)
	}
}

/// Searches the B+ tree at `buf` (a whole sub-file, header included).
///
/// Returns the byte offset of the matching leaf entry within `buf`, or
/// `None` when no entry compares equal.
pub fn search(buf: &[u8], key: &impl TreeKey) -> Result<Option<usize>, HlpError> {
	let tree = open_tree(buf)?;
	let mut cur_page = tree.root;
	let mut level = tree.levels;

	while level > 1 {
		let page = tree.page(cur_page)?;
		let entries = i16_at(buf, page + 2)?;
		let mut ptr = page + 6;
		for _ in 0..entries {
			let entry = &buf[ptr.min(buf.len())..];
			if key.compare(entry) == Ordering::Greater {
				break;
			}
			ptr += key.entry_len(entry, false);
			if ptr > buf.len() {
				return Err(HlpError::IntegrityViolation("B+ tree entry overruns page".into()));
			}
		}
		cur_page = usize::from(u16_at(buf, ptr - 2)?);
		level -= 1;
	}

	let page = tree.page(cur_page)?;
	let entries = i16_at(buf, page + 2)?;
	let mut ptr = page + 8;
	for _ in 0..entries {
		let entry = &buf[ptr.min(buf.len())..];
		match key.compare(entry) {
			Ordering::Equal => return Ok(Some(ptr)),
			Ordering::Greater => return Ok(None),
			Ordering::Less => {
				ptr += key.entry_len(entry, true);
				if ptr > buf.len() {
					return Err(HlpError::IntegrityViolation("B+ tree entry overruns page".into()));
				}
			}
		}
	}
	Ok(None)
}

/// Walks every leaf entry of the B+ tree at `buf` in key order.
///
/// `key` is only consulted for entry sizes. The callback receives the raw
/// entry bytes (running to the end of the sub-file; the layout's own
/// fields delimit it).
pub fn enumerate(
	buf: &[u8],
	key: &impl TreeKey,
	mut cb: impl FnMut(&[u8]),
) -> Result<(), HlpError> {
	let tree = open_tree(buf)?;
	let mut cur_page = tree.root;
	let mut level = tree.levels;

	// Descend the leftmost spine.
	while level > 1 {
		let page = tree.page(cur_page)?;
		cur_page = usize::from(u16_at(buf, page + 4)?);
		level -= 1;
	}

	while cur_page != 0xFFFF {
		let page = tree.page(cur_page)?;
		let entries = i16_at(buf, page + 2)?;
		let mut ptr = page + 8;
		for _ in 0..entries {
			if ptr >= buf.len() {
				return Err(HlpError::IntegrityViolation("B+ tree entry overruns page".into()));
			}
			let entry = &buf[ptr..];
			cb(entry);
			ptr += key.entry_len(entry, true);
		}
		cur_page = usize::from(u16_at(buf, page + 6)?);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Builds a single-level tree whose one leaf page holds `keys` as
	/// `|CONTEXT`-style entries (u32 key, u32 value).
	fn numeric_tree(keys: &[(u32, u32)]) -> Vec<u8> {
		let page_size = 0x80usize;
		let mut buf = vec![0u8; PAGES_OFFSET + page_size];
		buf[TREE_HDR..TREE_HDR + 2].copy_from_slice(&BTREE_MAGIC.to_le_bytes());
		buf[TREE_HDR + 4..TREE_HDR + 6].copy_from_slice(&(page_size as u16).to_le_bytes());
		buf[TREE_HDR + 26..TREE_HDR + 28].copy_from_slice(&0u16.to_le_bytes());
		buf[TREE_HDR + 32..TREE_HDR + 34].copy_from_slice(&1u16.to_le_bytes());

		let page = PAGES_OFFSET;
		buf[page + 2..page + 4].copy_from_slice(&(keys.len() as i16).to_le_bytes());
		// next-leaf pointer: end of chain
		buf[page + 6..page + 8].copy_from_slice(&0xFFFFu16.to_le_bytes());
		let mut ptr = page + 8;
		for &(k, v) in keys {
			buf[ptr..ptr + 4].copy_from_slice(&k.to_le_bytes());
			buf[ptr + 4..ptr + 8].copy_from_slice(&v.to_le_bytes());
			ptr += 8;
		}
		buf
	}

	#[test]
	fn test_search_exact_match() {
		let buf = numeric_tree(&[(10, 100), (20, 200), (30, 300)]);
		let off = search(&buf, &HashKey(20)).unwrap().unwrap();
		assert_eq!(u32_at(&buf, off + 4).unwrap(), 200);
	}

	#[test]
	fn test_search_tie_break() {
		let buf = numeric_tree(&[(10, 100), (20, 200), (30, 300)]);
		// Between keys: the first greater entry ends the search.
		assert!(search(&buf, &HashKey(25)).unwrap().is_none());
		// Below all keys: not found on the very first comparison.
		assert!(search(&buf, &HashKey(5)).unwrap().is_none());
		// Past all keys: the page runs out.
		assert!(search(&buf, &HashKey(40)).unwrap().is_none());
	}

	#[test]
	fn test_bad_magic() {
		let mut buf = numeric_tree(&[(1, 2)]);
		buf[TREE_HDR] = 0;
		assert!(matches!(search(&buf, &HashKey(1)), Err(HlpError::IntegrityViolation(_))));
	}

	#[test]
	fn test_enumerate_in_order() {
		let buf = numeric_tree(&[(10, 100), (20, 200), (30, 300)]);
		let mut seen = Vec::new();
		enumerate(&buf, &HashKey(0), |entry| {
			seen.push(u32_at(entry, 0).unwrap());
		})
		.unwrap();
		assert_eq!(seen, [10, 20, 30]);
	}
}
