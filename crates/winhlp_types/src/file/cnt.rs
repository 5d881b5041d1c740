//! `.CNT` sidecar parsing.
//!
//! Newer help files ship a plain-text contents outline next to the
//! archive: `:Title` directives plus numbered lines of the form
//! `level text[=context[@file][>window]]`. The outline is lowered once at
//! open time into an RTF blob with one paragraph style per level, so the
//! contents page renders like any other page.

use std::path::Path;

use encoding_rs::Encoding;
use log::debug;

use super::hash::context_hash;
use super::rtf::{FontScale, Link, LinkKind, RtfData};

/// The prebuilt contents page.
#[derive(Debug)]
pub(crate) struct Contents {
	/// Title from the `:Title` directive
	pub title: Option<String>,
	/// Complete RTF document for the outline
	pub rtf: Vec<u8>,
	/// Links for the outline's `HYPERLINK` fields
	pub links: Vec<Link>,
}

/// First unescaped `=` in a line (a `\=` stays part of the text).
fn find_assignment(s: &[u8]) -> Option<usize> {
	let mut from = 0;
	loop {
		let pos = s[from..].iter().position(|&b| b == b'=')? + from;
		if pos > 0 && s[pos - 1] == b'\\' {
			from = pos + 1;
		} else {
			return Some(pos);
		}
	}
}

/// Reads and lowers the sidecar at `path`. Returns `None` when the file is
/// absent or holds no outline entries.
pub(crate) fn read_cnt(
	path: &Path,
	hlp_name: &str,
	encoding: &'static Encoding,
	code_page: u16,
) -> Option<Contents> {
	let buf = std::fs::read(path).ok()?;
	debug!("reading contents sidecar {}", path.display());

	let mut rd = RtfData::new(encoding, code_page, FontScale::Normal, 0);
	let mut title = None;
	let mut found = false;
	let mut curl = 1i32;

	rd.add_control(
		"{\\rtf1\\ansi\\urtf0\\deff0{\\fonttbl{\\f0\\fcharset0 Times New Roman;}}",
	);
	rd.add_control(
		"{\\stylesheet{ Normal;}{\\s1 heading 1;}{\\s2 heading 2;}{\\s3 heading 3;}{\\s4 heading 4;}{\\s5 heading 5;}{\\s6 heading 6;}{\\s7 heading 7;}{\\s8 heading 8;}{\\s9 heading 9;}}",
	);
	rd.add_control("\\viewkind2");

	for raw_line in buf.split(|&b| b == b'\n') {
		let line = raw_line.trim_ascii();
		if line.is_empty() || line[0] == b':' {
			if let Some(rest) = line.strip_prefix(b":Title") {
				let text = rest.trim_ascii();
				if !text.is_empty() {
					title = Some(encoding.decode(text).0.into_owned());
				}
			}
			continue;
		}

		let digits = line.iter().take_while(|b| b.is_ascii_digit()).count();
		let Ok(level) = std::str::from_utf8(&line[..digits]).unwrap_or("").parse::<i32>() else {
			continue;
		};
		if !(1..=9).contains(&level) {
			continue;
		}
		found = true;

		let entry = line[digits..].trim_ascii();
		let assignment = find_assignment(entry);
		match assignment {
			None => {
				if level > curl {
					curl += 1;
				} else {
					curl = level;
				}
			}
			Some(_) if level < curl => curl = level + 1,
			Some(_) => {}
		}
		if curl == 1 {
			rd.add_control(&format!("\\pard\\s{curl} "));
		} else {
			rd.add_control(&format!("\\pard\\collapsed\\s{curl} "));
		}

		let text = match assignment {
			Some(eq) => {
				let target_spec = &entry[eq + 1..];
				let at = target_spec.iter().position(|&b| b == b'@');
				let gt = target_spec.iter().position(|&b| b == b'>');
				let context_end = [at, gt, Some(target_spec.len())]
					.into_iter()
					.flatten()
					.min()
					.unwrap_or(0);
				let context = &target_spec[..context_end];
				let file = at.map(|a| {
					let end = gt.filter(|&g| g > a).unwrap_or(target_spec.len());
					&target_spec[a + 1..end]
				});
				let window = gt.map(|g| &target_spec[g + 1..]);

				let target = match file {
					Some(f) if !f.is_empty() => encoding.decode(f).0.into_owned(),
					_ => hlp_name.to_owned(),
				};
				let link = rd.alloc_link(
					LinkKind::Topic,
					target,
					context_hash(context),
					false,
					false,
					None,
					window.map(|w| encoding.decode(w).0.into_owned()),
				);
				rd.field_start(link);
				rd.current_link = None;
				&entry[..eq]
			}
			None => {
				curl += 1;
				entry
			}
		};

		// the outline view wants UTF-8 regardless of the file's code page
		let decoded = encoding.decode(text).0.into_owned();
		rd.add_raw(decoded.as_bytes());
		if assignment.is_some() {
			rd.add_control("}}}");
		}
		rd.add_control("\\par");
	}

	if !found {
		return None;
	}
	rd.add_control("}");

	let links = std::mem::take(&mut rd.links);
	Some(Contents {
		title,
		rtf: rd.into_rtf(),
		links,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn write_cnt(content: &str) -> std::path::PathBuf {
		let mut path = std::env::temp_dir();
		path.push(format!("winhlp-cnt-test-{}-{}", std::process::id(), content.len()));
		let mut f = std::fs::File::create(&path).unwrap();
		f.write_all(content.as_bytes()).unwrap();
		path
	}

	#[test]
	fn test_outline_with_links() {
		let path = write_cnt(
			":Title Sample Guide\n1 Overview\n2 Intro=intro_topic\n2 Elsewhere=ctx@other.hlp>main\n",
		);
		let contents =
			read_cnt(&path, "sample.hlp", encoding_rs::WINDOWS_1252, 1252).unwrap();
		std::fs::remove_file(&path).ok();

		assert_eq!(contents.title.as_deref(), Some("Sample Guide"));
		let text = String::from_utf8(contents.rtf.clone()).unwrap();
		assert!(text.starts_with("{\\rtf1\\ansi\\urtf0\\deff0"));
		assert!(text.contains("\\pard\\s1 Overview"));
		assert!(text.contains("\\collapsed\\s2 Intro"));
		assert!(text.ends_with('}'));

		assert_eq!(contents.links.len(), 2);
		assert_eq!(contents.links[0].target, "sample.hlp");
		assert_eq!(contents.links[0].hash, context_hash(b"intro_topic"));
		assert_eq!(contents.links[1].target, "other.hlp");
		assert_eq!(contents.links[1].hash, context_hash(b"ctx"));
		assert_eq!(contents.links[1].window_name.as_deref(), Some("main"));
	}

	#[test]
	fn test_empty_outline_is_none() {
		let path = write_cnt(":Base nothing.hlp\n; just a comment\n");
		assert!(read_cnt(&path, "x.hlp", encoding_rs::WINDOWS_1252, 1252).is_none());
		std::fs::remove_file(&path).ok();
	}

	#[test]
	fn test_escaped_assignment_stays_text() {
		assert_eq!(find_assignment(b"a\\=b=c"), Some(4));
		assert_eq!(find_assignment(b"plain"), None);
		assert_eq!(find_assignment(b"x=y"), Some(1));
	}
}
