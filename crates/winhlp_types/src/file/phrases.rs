//! Phrase-dictionary substitution, the third compression layer of the
//! topic stream.
//!
//! Two generations exist. `|Phrases` (help 3.x, "v2") replaces byte pairs
//! `0x01..=0x0F, b` with a dictionary phrase; `|PhrIndex` + `|PhrImage`
//! (help 4.0, "v4") drives a denser bit-coded scheme where even source
//! bytes are direct phrase indices. Both keep one flat phrase buffer
//! delimited by a monotonic offset table.

use log::{error, warn};

use super::bytes::{u16_at, u32_at};
use super::compress::{lz77_decompress, lz77_decompressed_size};
use super::error::HlpError;

/// Which dictionary generation a file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseVariant {
	/// `|Phrases` byte-pair codes
	V2,
	/// `|PhrIndex`/`|PhrImage` bit-coded indices
	V4,
}

/// A loaded phrase dictionary.
#[derive(Debug)]
pub struct PhraseTable {
	variant: PhraseVariant,
	/// `num_phrases + 1` monotonic offsets into `buffer`
	offsets: Vec<u32>,
	buffer: Vec<u8>,
}

impl PhraseTable {
	/// Dictionary generation.
	pub fn variant(&self) -> PhraseVariant {
		self.variant
	}

	/// Number of phrases in the dictionary.
	pub fn num_phrases(&self) -> usize {
		self.offsets.len().saturating_sub(1)
	}

	/// Loads the v2 dictionary from a whole `|Phrases` sub-file.
	pub fn from_phrases(buf: &[u8], version: u16) -> Result<Self, HlpError> {
		let num = usize::from(u16_at(buf, 9)?);
		if buf.len() <= 2 * num + 0x13 {
			return Err(HlpError::IntegrityViolation("phrase offset table truncated".into()));
		}
		let head_size = if version <= 16 { 13 } else { 17 };

		let mut offsets = Vec::with_capacity(num + 1);
		for i in 0..=num {
			let raw = u16_at(buf, head_size + 2 * i)?;
			match usize::from(raw).checked_sub(2 * num + 2) {
				Some(off) => offsets.push(off as u32),
				None => {
					warn!("phrase offset {raw:#x} below data start");
					offsets.push(0);
				}
			}
		}

		let buffer = if version <= 16 {
			let start = 15 + 2 * num;
			buf[start..].to_vec()
		} else {
			let src = &buf[0x13 + 2 * num..];
			let mut out = Vec::with_capacity(lz77_decompressed_size(src));
			lz77_decompress(src, &mut out);
			out
		};

		let mut table = Self {
			variant: PhraseVariant::V2,
			offsets,
			buffer,
		};
		table.clamp_offsets();
		Ok(table)
	}

	/// Loads the v4 dictionary from whole `|PhrIndex` and `|PhrImage`
	/// sub-files.
	pub fn from_phrase_index(idx: &[u8], img: &[u8]) -> Result<Self, HlpError> {
		let num = usize::from(u16_at(idx, 9 + 4)?);
		let bit_count = u16_at(idx, 9 + 24)? & 0x0F;
		let mut dec_size = u32_at(idx, 9 + 12)? as usize;
		let cpr_size = u32_at(idx, 9 + 16)? as usize;

		if idx.len() < 9 + 28 {
			return Err(HlpError::IntegrityViolation("phrase index header truncated".into()));
		}
		if img.len() < 9 {
			return Err(HlpError::IntegrityViolation("phrase image truncated".into()));
		}

		let mut bits = BitReader::new(&idx[9 + 28..]);
		let mut offsets = Vec::with_capacity(num + 1);
		offsets.push(0u32);
		for i in 0..num {
			let mut n = 1u32;
			while bits.next() {
				n += 1 << bit_count;
			}
			if bits.next() {
				n += 1;
			}
			if bit_count > 1 && bits.next() {
				n += 2;
			}
			if bit_count > 2 && bits.next() {
				n += 4;
			}
			if bit_count > 3 && bits.next() {
				n += 8;
			}
			if bit_count > 4 && bits.next() {
				n += 16;
			}
			offsets.push(offsets[i] + n);
		}

		let src = &img[9..];
		if dec_size != cpr_size {
			let lz_size = lz77_decompressed_size(src);
			if dec_size != lz_size {
				warn!("phrase image size mismatch {dec_size} / {lz_size}");
				dec_size = dec_size.max(lz_size);
			}
		}
		let buffer = if dec_size == cpr_size {
			src.to_vec()
		} else {
			let mut out = Vec::with_capacity(dec_size);
			lz77_decompress(src, &mut out);
			out
		};

		let mut table = Self {
			variant: PhraseVariant::V4,
			offsets,
			buffer,
		};
		table.clamp_offsets();
		Ok(table)
	}

	/// Forces the offset table monotonic and inside the phrase buffer so
	/// phrase slicing can never fault on a damaged dictionary.
	fn clamp_offsets(&mut self) {
		let limit = self.buffer.len() as u32;
		let mut prev = 0u32;
		for off in &mut self.offsets {
			if *off < prev || *off > limit {
				warn!("phrase offset {} outside [{prev}, {limit}], clamping", *off);
				*off = (*off).clamp(prev, limit);
			}
			prev = *off;
		}
	}

	fn phrase(&self, index: usize) -> Option<&[u8]> {
		if index + 1 >= self.offsets.len() {
			return None;
		}
		Some(&self.buffer[self.offsets[index] as usize..self.offsets[index + 1] as usize])
	}

	/// Expands a compressed text run with whichever scheme this table uses.
	pub fn decode(&self, src: &[u8], size: usize) -> Vec<u8> {
		match self.variant {
			PhraseVariant::V2 => self.decode_v2(src, size),
			PhraseVariant::V4 => self.decode_v4(src, size),
		}
	}

	/// v2 expansion: `0x00` and `0x10..=0xFF` are literals, `0x01..=0x0F`
	/// starts a big-endian byte-pair code; the code's low bit appends a
	/// space after the phrase.
	fn decode_v2(&self, src: &[u8], size: usize) -> Vec<u8> {
		let mut out = Vec::with_capacity(size);
		let mut i = 0;
		while i < src.len() && out.len() < size {
			let byte = src[i];
			if byte == 0 || byte >= 0x10 {
				out.push(byte);
				i += 1;
				continue;
			}
			if i + 1 >= src.len() {
				warn!("phrase code truncated at end of run");
				break;
			}
			let code = usize::from(byte) * 0x100 + usize::from(src[i + 1]);
			i += 2;
			let index = (code - 0x100) / 2;
			let Some(phrase) = self.phrase(index) else {
				error!("phrase index {}/{} out of range", index, self.num_phrases());
				continue;
			};
			if out.len() + phrase.len() > size {
				warn!("phrase expansion overflows {size}-byte run");
				break;
			}
			out.extend_from_slice(phrase);
			if code & 1 != 0 {
				if out.len() < size {
					out.push(b' ');
				} else {
					warn!("phrase expansion overflows {size}-byte run");
				}
			}
		}
		out
	}

	/// v4 expansion. The write position advances by the decoded length even
	/// when the copy itself is suppressed, which keeps later runs aligned
	/// with the format stream.
	fn decode_v4(&self, src: &[u8], size: usize) -> Vec<u8> {
		let mut out = vec![0u8; size];
		let mut pos = 0usize;
		let mut i = 0;
		while i < src.len() {
			let s = src[i];
			let len;
			if s & 1 == 0 {
				len = self.copy_phrase(usize::from(s) / 2, &mut out, pos);
			} else if s & 0x03 == 0x01 {
				i += 1;
				let Some(&next) = src.get(i) else {
					warn!("phrase code truncated at end of run");
					break;
				};
				let index = (usize::from(s) + 1) * 64 + usize::from(next);
				len = self.copy_phrase(index, &mut out, pos);
			} else if s & 0x07 == 0x03 {
				len = usize::from(s) / 8 + 1;
				let avail = len.min(src.len().saturating_sub(i + 1));
				if pos + len <= out.len() {
					out[pos..pos + avail].copy_from_slice(&src[i + 1..i + 1 + avail]);
				}
				i += len;
			} else {
				len = usize::from(s) / 16 + 1;
				let filler = if s & 0x0F == 0x07 { b' ' } else { 0 };
				if pos + len <= out.len() {
					out[pos..pos + len].fill(filler);
				}
			}
			pos += len;
			i += 1;
		}
		if pos > size {
			error!("phrase expansion overflows ({pos} > {size})");
		}
		out
	}

	fn copy_phrase(&self, index: usize, out: &mut [u8], pos: usize) -> usize {
		let Some(phrase) = self.phrase(index) else {
			error!("phrase index {}/{} out of range", index, self.num_phrases());
			return 0;
		};
		if pos + phrase.len() <= out.len() {
			out[pos..pos + phrase.len()].copy_from_slice(phrase);
		}
		phrase.len()
	}
}

/// LSB-first bit reader over little-endian 32-bit words, as used by the
/// `|PhrIndex` offset stream.
struct BitReader<'a> {
	buf: &'a [u8],
	pos: usize,
	word: u32,
	mask: u32,
}

impl<'a> BitReader<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Self {
			buf,
			pos: 0,
			word: 0,
			mask: 0,
		}
	}

	fn next(&mut self) -> bool {
		self.mask <<= 1;
		if self.mask == 0 {
			self.word = match self.buf.get(self.pos..self.pos + 4) {
				Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
				None => {
					warn!("phrase index bit stream exhausted");
					0
				}
			};
			self.pos += 4;
			self.mask = 1;
		}
		self.word & self.mask != 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(variant: PhraseVariant) -> PhraseTable {
		PhraseTable {
			variant,
			offsets: vec![0, 3, 7],
			buffer: b"theword".to_vec(),
		}
	}

	#[test]
	fn test_v2_code_out_of_range() {
		let t = table(PhraseVariant::V2);
		// code 0x0200 -> index 0x80, far past the two phrases
		assert!(t.decode_v2(&[0x02, 0x00], 8).is_empty());
	}

	#[test]
	fn test_v2_phrase_without_space() {
		let t = table(PhraseVariant::V2);
		assert_eq!(t.decode_v2(&[0x01, 0x02], 4), b"word");
	}

	#[test]
	fn test_v2_phrase_with_space() {
		let t = table(PhraseVariant::V2);
		assert_eq!(t.decode_v2(&[0x01, 0x03], 5), b"word ");
	}

	#[test]
	fn test_v2_literals() {
		let t = table(PhraseVariant::V2);
		assert_eq!(t.decode_v2(b"\x00Hi", 3), b"\x00Hi");
	}

	#[test]
	fn test_v4_direct_index() {
		let t = table(PhraseVariant::V4);
		assert_eq!(t.decode_v4(&[0x00], 3), b"the");
	}

	#[test]
	fn test_v4_extended_index_out_of_range() {
		let t = table(PhraseVariant::V4);
		// s=0x01, next=0x00 -> index (0x01+1)*64 = 128, out of range: the
		// write position holds still but decoding continues.
		assert_eq!(t.decode_v4(&[0x01, 0x00, 0x02], 4), b"word");
	}

	#[test]
	fn test_v4_raw_copy() {
		let t = table(PhraseVariant::V4);
		// s=0x03 copies one raw byte
		assert_eq!(t.decode_v4(&[0x03, b'Q'], 1), b"Q");
	}

	#[test]
	fn test_v4_runs() {
		let t = table(PhraseVariant::V4);
		// s=0x07: one space; s=0x0F: one NUL
		assert_eq!(t.decode_v4(&[0x07], 1), b" ");
		assert_eq!(t.decode_v4(&[0x0F], 1), b"\x00");
		// s=0x17: (0x17/16)+1 = 2 spaces
		assert_eq!(t.decode_v4(&[0x17], 2), b"  ");
	}

	#[test]
	fn test_bit_reader_order() {
		// Word 0x00000005: bits 0 and 2 set, read LSB first.
		let mut r = BitReader::new(&[0x05, 0, 0, 0]);
		assert!(r.next());
		assert!(!r.next());
		assert!(r.next());
		assert!(!r.next());
	}
}
