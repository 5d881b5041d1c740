//! Key-word indices: `|xWBTREE` / `|xWDATA` pairs, one per index letter.
//!
//! A help file can carry several key-word indices, named by a single
//! letter (`K` for the standard keyword index, `A` for author indices).
//! The tree maps each keyword onto a count and an offset into the data
//! sub-file, which holds that many topic offsets.

use std::cmp::Ordering;

use super::btree::{self, TreeKey};
use super::bytes::{cstr_at, u16_at, u32_at};
use super::error::HlpError;

/// Key for the keyword trees: a null-terminated string followed by a
/// 16-bit topic count and a 32-bit data offset in leaves, or a page number
/// in internal entries.
struct KeywordKey<'a>(&'a [u8]);

impl TreeKey for KeywordKey<'_> {
	fn compare(&self, entry: &[u8]) -> Ordering {
		cstr_at(entry, 0).cmp(self.0)
	}

	fn entry_len(&self, entry: &[u8], leaf: bool) -> usize {
		cstr_at(entry, 0).len() + 1 + if leaf { 6 } else { 2 }
	}
}

/// One loaded key-word index.
#[derive(Debug)]
pub struct KeywordTree {
	/// Index letter (upper case)
	pub letter: char,
	tree: Vec<u8>,
	data: Vec<u8>,
}

/// A keyword hit: where its topic offsets live in the data sub-file.
#[derive(Debug, Clone, Copy)]
pub struct KeywordEntry {
	/// Number of topics carrying the keyword
	pub count: usize,
	/// Byte offset of the first topic offset in `|xWDATA`
	pub data_offset: u32,
}

impl KeywordTree {
	pub(crate) fn new(letter: char, tree: Vec<u8>, data: Vec<u8>) -> Self {
		Self {
			letter: letter.to_ascii_uppercase(),
			tree,
			data,
		}
	}

	/// Looks a keyword up, byte-exact.
	pub fn find(&self, keyword: &[u8]) -> Result<Option<KeywordEntry>, HlpError> {
		let Some(entry) = btree::search(&self.tree, &KeywordKey(keyword))? else {
			return Ok(None);
		};
		let tail = cstr_at(&self.tree, entry).len() + 1;
		Ok(Some(KeywordEntry {
			count: usize::from(u16_at(&self.tree, entry + tail)?),
			data_offset: u32_at(&self.tree, entry + tail + 2)?,
		}))
	}

	/// Walks every keyword in order.
	pub fn for_each(
		&self,
		mut cb: impl FnMut(&[u8], KeywordEntry),
	) -> Result<(), HlpError> {
		btree::enumerate(&self.tree, &KeywordKey(b""), |entry| {
			let keyword = cstr_at(entry, 0);
			let tail = keyword.len() + 1;
			let count = u16_at(entry, tail).unwrap_or(0);
			let data_offset = u32_at(entry, tail + 2).unwrap_or(0);
			cb(keyword, KeywordEntry {
				count: usize::from(count),
				data_offset,
			});
		})
	}

	/// Resolves a hit into the topic offsets it indexes.
	pub fn topics(&self, entry: KeywordEntry) -> Vec<u32> {
		let mut out = Vec::with_capacity(entry.count);
		for i in 0..entry.count {
			let off = 9 + entry.data_offset as usize + 4 * i;
			match u32_at(&self.data, off) {
				Ok(topic) => out.push(topic),
				Err(_) => break,
			}
		}
		out
	}
}
