//! Context-string hashing.
//!
//! Topics are addressed by a 32-bit hash of their context string; the hash
//! is the key of the `|CONTEXT` B+ tree. The folding table is part of the
//! format contract: it maps lower-case letters onto upper-case ones, digits
//! and letters onto distinct small codes, collapses punctuation, and keeps
//! high bytes as-is.

/// Byte folding table. Must stay byte-for-byte identical to the one used by
/// help compilers, or every `|CONTEXT` lookup misses.
const HASH_TABLE: [u8; 256] = [
	0x00, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE, 0xDF,
	0xE0, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xEB, 0xEC, 0xED, 0xEE, 0xEF,
	0xF0, 0x0B, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0x0C, 0xFF,
	0x0A, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
	0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F,
	0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0D,
	0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F,
	0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B, 0x2C, 0x2D, 0x2E, 0x2F,
	0x50, 0x51, 0x52, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x5B, 0x5C, 0x5D, 0x5E, 0x5F,
	0x60, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F,
	0x70, 0x71, 0x72, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x7B, 0x7C, 0x7D, 0x7E, 0x7F,
	0x80, 0x81, 0x82, 0x83, 0x0B, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x8D, 0x8E, 0x8F,
	0x90, 0x91, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0x9B, 0x9C, 0x9D, 0x9E, 0x9F,
	0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF,
	0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD, 0xBE, 0xBF,
	0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xCB, 0xCC, 0xCD, 0xCE, 0xCF,
];

/// Hashes a context string.
///
/// The accumulator starts at 1, so the empty string hashes to 1 (hash 0 is
/// reserved for the contents page) and a single letter `c` hashes to
/// `43 + table[c]`.
pub fn context_hash(context: &[u8]) -> u32 {
	let mut hash = 1u32;
	for &byte in context {
		hash = hash.wrapping_mul(43).wrapping_add(u32::from(HASH_TABLE[byte as usize]));
	}
	hash
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_empty_string() {
		assert_eq!(context_hash(b""), 1);
	}

	#[test]
	fn test_case_folding() {
		assert_eq!(context_hash(b"foo"), context_hash(b"FOO"));
		assert_eq!(context_hash(b"a"), context_hash(b"A"));
		assert_eq!(context_hash(b"a"), 43 + 0x11);
		assert_eq!(HASH_TABLE[b'A' as usize], 0x11);
	}

	#[test]
	fn test_single_letters() {
		for c in b'A'..=b'Z' {
			assert_eq!(context_hash(&[c]), 43 + u32::from(HASH_TABLE[c as usize]));
			assert_eq!(context_hash(&[c.to_ascii_lowercase()]), context_hash(&[c]));
		}
	}

	#[test]
	fn test_accumulation() {
		// h("ab") = (43 + table['A']) * 43 + table['B']
		let expected = (43 + 0x11u32) * 43 + 0x12;
		assert_eq!(context_hash(b"ab"), expected);
	}

	#[test]
	fn test_high_bytes_kept() {
		assert_eq!(context_hash(&[0x80]), 43 + 0x80);
		assert_eq!(context_hash(&[0xFF]), 43 + 0xCF);
	}
}
