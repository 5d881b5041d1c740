//! The paragraph interpreter: lowers a page's record chain into RTF.
//!
//! Rendering is a second pass over the same record chain the page scan
//! walked. For every display or table record the text stream is expanded
//! through the active phrase scheme and then consumed null-terminated run
//! by run, with the format stream driving a one-byte opcode machine in
//! parallel: font changes, breaks, embedded images, and the several link
//! flavors. Character positions count UTF-16 code units of the rendered
//! text so the caller can anchor the link list into its widget.

use log::{error, trace, warn};

use super::File;
use super::bytes::{Scan, cstr_at, u32_at};
use super::error::HlpError;
use super::image;
use super::page::{Page, PageKind, Row};
use super::rtf::{FontScale, LinkKind, RtfData};
use super::system::{Window, charset};
use super::topic::{HLP_DISPLAY, HLP_DISPLAY30, HLP_TABLE, HLP_TOPICHDR, TopicWalk};

/// Rich-edit refuses bordered paragraphs outside tables; a degenerate
/// one-cell table draws the box instead.
const BORDER_HACK: &str = "{\\pard\\trowd\\clbrdrl\\brdrw1\\brdrcf2\\clbrdrt\\brdrw1\\brdrcf2\\clbrdrr\\brdrw1\\brdrcf2\\clbrdrb\\brdrw1\\cellx100000\\intbl\\f0\\fs0\\cell\\row\\pard}";

fn mul_div(value: i32, num: i32, den: i32) -> i32 {
	(i64::from(value) * i64::from(num) / i64::from(den)) as i32
}

fn font_attributes(file: &File, index: usize, scale: FontScale) -> Option<String> {
	let font = file.font_table.fonts.get(index)?;
	let fs = font.height + scale.delta();
	Some(format!(
		"\\f{}\\cf{}\\fs{}{}{}{}{}",
		index + 1,
		index + 3,
		fs,
		if font.bold { "\\b" } else { "\\b0" },
		if font.italic { "\\i" } else { "\\i0" },
		if font.underline { "\\ul" } else { "\\ul0" },
		if font.strikeout { "\\strike" } else { "\\strike0" },
	))
}

/// Renders one page as a complete RTF document.
///
/// `window` supplies the selected-text color for the color table;
/// `relative` is the topic offset whose position is marked with a hidden
/// `scroll_<hex>` paragraph. The returned [`RtfData`] owns the stream and
/// the link, hotspot, row and transparency lists built during emission.
pub(crate) fn browse_page(
	file: &File,
	page: &Page,
	font_scale: FontScale,
	relative: u32,
	window: Option<&Window>,
) -> RtfData {
	let mut rd = RtfData::new(file.encoding, file.code_page(), font_scale, relative);

	// The contents page is a prebuilt blob.
	if page.kind == PageKind::Contents {
		if let Some(contents) = &file.contents {
			rd.add_raw(&contents.rtf);
			rd.links = contents.links.clone();
		}
		return rd;
	}

	preamble(file, &mut rd, window);

	let mut walk = TopicWalk::new(page.reference);
	let mut header_seen = false;
	let mut found = false;
	while let Some(record) = walk.next(&file.topic, file.version(), file.system.dsize) {
		match record.kind {
			HLP_TOPICHDR => {
				if header_seen {
					break;
				}
				header_seen = true;
			}
			HLP_DISPLAY | HLP_DISPLAY30 | HLP_TABLE => {
				if !found && relative <= (record.index as u32) * 0x8000 + walk.offs {
					rd.add_control(&format!("{{\\v\\pard scroll_{relative:x}}}"));
					found = true;
					rd.char_pos_rel = rd.char_pos;
				}
				match browse_paragraph(file, &mut rd, record.bytes, record.kind) {
					Ok(parlen) => walk.offs += parlen,
					Err(err) => {
						warn!("paragraph at {:#x} abandoned: {err}", record.reference);
						break;
					}
				}
			}
			other => error!("unknown record type {other:#04x}"),
		}
	}

	rd.finish();
	rd
}

/// Emits the document header: charset, font table, color table.
fn preamble(file: &File, rd: &mut RtfData, window: Option<&Window>) {
	if file.charset() == charset::MAC {
		rd.add_control("{\\rtf1\\mac\\deff1");
	} else {
		rd.add_control(&format!("{{\\rtf1\\ansi\\ansicpg{}\\deff1", file.code_page()));
	}

	rd.add_control("{\\fonttbl");
	rd.add_control("{\\f0 Arial;}");
	for (index, font) in file.font_table.fonts.iter().enumerate() {
		let face = if font.face.is_empty() { "System" } else { &font.face };
		rd.add_control(&format!(
			"{{\\f{}\\{}\\fprq{}\\fcharset{} {};}}",
			index + 1,
			font.family.rtf_keyword(),
			font.pitch,
			font.charset,
			face
		));
	}
	rd.add_control("}");

	rd.add_control("{\\colortbl ;\\red0\\green128\\blue0;");
	let sr = window.map_or(0xFF_FFFF, |w| w.sr_color);
	rd.add_control(&format!(
		"\\red{}\\green{}\\blue{};",
		sr & 0xFF,
		(sr >> 8) & 0xFF,
		(sr >> 16) & 0xFF
	));
	for font in &file.font_table.fonts {
		let (r, g, b) = font.color;
		rd.add_control(&format!("\\red{r}\\green{g}\\blue{b};"));
	}
	rd.add_control("}");
}

/// Renders one display or table record, returning its paragraph length
/// for the offset bookkeeping.
fn browse_paragraph(
	file: &File,
	rd: &mut RtfData,
	buf: &[u8],
	kind: u8,
) -> Result<u32, HlpError> {
	if buf.len() < 0x19 {
		warn!("paragraph header too small");
		return Ok(0);
	}
	let blocksize = u32_at(buf, 0)? as usize;
	let mut size = u32_at(buf, 4)? as usize;
	let datalen = u32_at(buf, 0x10)? as usize;

	let src = buf.get(datalen..).unwrap_or_default();
	let avail = blocksize.saturating_sub(datalen);
	let text: Vec<u8> = if size > avail {
		match &file.phrases {
			Some(table) => table.decode(src, size),
			None => {
				warn!("text runs past the record without phrase compression, splitting");
				size = avail;
				src[..size.min(src.len())].to_vec()
			}
		}
	} else {
		src[..size.min(src.len())].to_vec()
	};

	let mut fmt = Scan::at(&buf[..datalen.min(buf.len())], 0x15);

	let mut parlen = 0u32;
	if kind == HLP_DISPLAY || kind == HLP_TABLE {
		fmt.fetch_long()?;
		parlen = u32::from(fmt.fetch_ushort()?);
	}

	let mut ncol: i32 = 1;
	let mut table_width: i32 = 32767;
	if kind == HLP_TABLE {
		ncol = i32::from(fmt.u8()?);
		let table_type = fmt.u8()?;
		let variable_row = table_type == 0 || table_type == 2;
		let mut row_widths = vec![0i32; ncol.max(0) as usize];
		if variable_row {
			table_width = i32::from(fmt.peek_i16(0)?);
			fmt.skip(2)?;
			rd.add_control("{\\v\\pard var_wid_row}");
		}
		rd.add_control("\\trowd");
		trace!("table: cols={ncol} type={table_type:#x} width={table_width}");
		let col = |delta: usize| fmt.peek_i16(delta).map(i32::from);
		if ncol > 1 {
			let gap = mul_div(file.half_points(col(6)?), table_width, 32767);
			let left = mul_div(file.half_points(col(2)? - col(6)?), table_width, 32767) - 1;
			rd.add_control(&format!("\\trgaph{gap}\\trleft{left}"));
			let mut pos = col(6)? / 2;
			for nc in 0..ncol {
				pos += col(nc as usize * 4)? + col(nc as usize * 4 + 2)?;
				let width = mul_div(file.half_points(pos), table_width, 32767);
				rd.add_control(&format!(
					"\\clbrdrl\\brdrw1\\brdrcf2\\clbrdrt\\brdrw1\\brdrcf2\\clbrdrr\\brdrw1\\brdrcf2\\clbrdrb\\brdrw1\\brdrcf2\\cellx{width}"
				));
				row_widths[nc as usize] = width;
			}
		} else {
			let twidth = mul_div(file.half_points(col(2)?), table_width, 32767) - 1;
			let cwidth = mul_div(file.half_points(col(0)?), table_width, 32767);
			rd.add_control(&format!(
				"\\trleft{twidth}\\clbrdrl\\brdrw1\\brdrcf2\\clbrdrt\\brdrw1\\brdrcf2\\clbrdrr\\brdrw1\\brdrcf2\\clbrdrb\\brdrw1\\brdrcf2\\cellx{cwidth} "
			));
			row_widths[0] = cwidth;
		}
		fmt.set_pos(fmt.pos() + ncol.max(0) as usize * 4);
		if variable_row {
			rd.rows.push(Row {
				widths: row_widths,
			});
		}
	}

	let mut text_pos = 0usize;
	let mut lastcol: i32 = -1;
	let mut lastfont = 0usize;
	let mut nc: i32 = 0;
	while nc < ncol {
		let mut brdr = 0u8;
		rd.add_control("\\pard");
		if kind == HLP_TABLE {
			nc = i32::from(fmt.peek_i16(0)?);
			lastcol = nc;
			if nc == -1 {
				// last column
				rd.add_control("\\row");
				rd.char_pos += 2;
				break;
			}
			fmt.skip(5)?;
			rd.add_control("\\intbl");
		} else {
			nc += 1;
		}
		fmt.skip(if kind == HLP_DISPLAY30 { 6 } else { 4 })?;
		let bits = fmt.u16()?;
		if bits & 0x0001 != 0 {
			// numbering, discarded
			fmt.fetch_long()?;
		}
		for (bit, word) in
			[(0x0002, "sb"), (0x0004, "sa"), (0x0008, "sl"), (0x0010, "li"), (0x0020, "ri"),
				(0x0040, "fi")]
		{
			if bits & bit != 0 {
				let value = file.half_points(i32::from(fmt.fetch_short()?));
				rd.add_control(&format!("\\{word}{value}"));
			}
		}
		// prevents contents from being cut off
		rd.add_control("\\slmult1");
		if bits & 0x0100 != 0 {
			brdr = fmt.u8()?;
			if brdr & 0x03 != 0 && kind != HLP_TABLE {
				rd.add_control(BORDER_HACK);
			}
			// border width, unused
			fmt.skip(2)?;
		}
		if bits & 0x0200 != 0 {
			let ntab = fmt.fetch_short()?;
			for _ in 0..ntab {
				let tab = fmt.fetch_ushort()?;
				let style = if tab & 0x4000 != 0 { fmt.fetch_ushort()? } else { 0 };
				let kind_kw = match style {
					0 => "",
					1 => "\\tqr",
					2 => "\\tqc",
					other => {
						warn!("unknown tab style {other:#x}");
						""
					}
				};
				let twips = file.half_points(i32::from(tab & 0x3FFF));
				rd.add_control(&format!("{kind_kw}\\tx{twips}"));
			}
		}
		match bits & 0x0C00 {
			0 => rd.add_control("\\ql"),
			0x0400 => rd.add_control("\\qr"),
			0x0800 => rd.add_control("\\qc"),
			_ => warn!("unsupported alignment bits"),
		}
		if bits & 0x1000 != 0 {
			rd.add_control("\\keep");
		}
		if bits & 0xE080 != 0 {
			warn!("unsupported attribute bits {bits:#06x}, potential trouble ahead");
		}

		'inline: while text_pos < text.len() && fmt.remaining() > 0 {
			let run = cstr_at(&text, text_pos);
			if !run.is_empty() {
				if rd.force_color {
					let popup = rd
						.current_link
						.map(|index| rd.links[index].kind == LinkKind::Popup)
						.unwrap_or(false);
					rd.add_control(if popup { "{\\uld\\cf1" } else { "{\\ul\\cf1" });
				}
				rd.add_text(run);
				if rd.force_color {
					rd.add_control("}");
				}
				rd.char_pos += rd.count_chars(run);
			}
			text_pos += run.len() + 1;

			let op = fmt.u8()?;
			trace!("format opcode {op:#04x}");
			match op {
				0xFF => break 'inline,
				// reserved, semantics unknown
				0x20 => fmt.skip(4)?,
				0x21 => fmt.skip(2)?,
				0x80 => {
					let font = usize::from(fmt.u16()?);
					match font_attributes(file, font, rd.font_scale) {
						Some(attrs) => {
							rd.add_control(&attrs);
							lastfont = font;
						}
						None => warn!(
							"font {font} out of range ({})",
							file.font_table.fonts.len()
						),
					}
				}
				0x81 => {
					rd.add_control("\\line");
					rd.char_pos += 1;
				}
				0x82 => {
					if kind == HLP_TABLE {
						if fmt.peek_u8(0)? != 0xFF {
							rd.add_control("\\par\\intbl");
						} else if fmt.peek_i16(1)? == -1 {
							rd.add_control("\\cell\\intbl\\row");
							rd.char_pos += 2;
						} else if i32::from(fmt.peek_i16(1)?) == lastcol {
							rd.add_control("\\par\\pard");
						} else {
							rd.add_control("\\cell\\pard");
						}
					} else {
						rd.add_control("\\par");
					}
					rd.char_pos += 1;
				}
				0x83 => {
					rd.add_control("\\tab");
					rd.char_pos += 1;
				}
				0x86..=0x88 => embedded_object(file, rd, &mut fmt, op)?,
				0x89 => {
					if rd.current_link.is_none() {
						warn!("link close without an open link");
					}
					rd.add_control("}}}");
					rd.close_current_link();
					// back to the surrounding font attributes
					if let Some(attrs) = font_attributes(file, lastfont, rd.font_scale) {
						rd.add_control(&attrs);
					}
				}
				0x8B => {
					rd.add_control("\\~");
					rd.char_pos += 1;
				}
				0x8C => {
					rd.add_control("\\_");
					rd.char_pos += 1;
				}
				0xC8 | 0xCC => {
					let len = usize::from(fmt.u16()?);
					let body = fmt.take(len)?;
					let target = rd.decode_text(cstr_at(body, 0));
					trace!("macro link: {target}");
					let link = rd.alloc_link(
						LinkKind::Macro,
						target,
						0,
						op & 4 == 0,
						false,
						None,
						None,
					);
					rd.field_start(link);
				}
				0xE0 | 0xE1 => {
					let hash = fmt.u32()?;
					let link_kind =
						if op & 1 != 0 { LinkKind::Topic } else { LinkKind::Popup };
					let link = rd.alloc_link(
						link_kind,
						file.path_name(),
						hash,
						true,
						false,
						None,
						None,
					);
					rd.field_start(link);
				}
				0xE2 | 0xE3 | 0xE6 | 0xE7 => {
					let hash = fmt.u32()?;
					let link_kind =
						if op & 1 != 0 { LinkKind::Topic } else { LinkKind::Popup };
					let link = rd.alloc_link(
						link_kind,
						file.path_name(),
						hash,
						op & 4 == 0,
						false,
						None,
						None,
					);
					rd.field_start(link);
				}
				0xEA | 0xEB | 0xEE | 0xEF => extended_link(file, rd, &mut fmt, op)?,
				other => {
					warn!("unknown format byte {other:#04x}");
				}
			}
		}

		if bits & 0x0100 != 0 {
			if kind == HLP_TABLE {
				warn!("bordered paragraph inside a table");
			} else if brdr & 0x09 != 0 {
				rd.add_control(BORDER_HACK);
			}
		}
	}

	Ok(parlen)
}

/// Opcodes `0x86..=0x88`: an embedded image or button object.
fn embedded_object(
	file: &File,
	rd: &mut RtfData,
	fmt: &mut Scan<'_>,
	op: u8,
) -> Result<(), HlpError> {
	let obj_type = fmt.u8()?;
	let size = fmt.fetch_long()?;

	match obj_type {
		0x22 | 0x03 => {
			if obj_type == 0x22 {
				// hot spot prefix
				fmt.fetch_ushort()?;
			}
			match fmt.peek_i16(0)? {
				0 => {
					let index = fmt.peek_i16(2)?;
					image::add_gfx_by_index(rd, file, index);
					rd.char_pos += 1;
				}
				1 => {
					let body = fmt.rest();
					let len = (size.max(0) as usize).saturating_sub(4);
					let gfx = body.get(2..(2 + len).min(body.len())).unwrap_or_default();
					image::add_gfx_by_addr(rd, &file.path_name(), file.windows(), gfx);
					rd.char_pos += 1;
				}
				other => warn!("unknown inline graphic flavor {other}"),
			}
		}
		0x05 => {
			let body = fmt.rest();
			if body.get(6) == Some(&b'!') {
				let curr = body.get(7..).unwrap_or_default();
				let nul = curr.iter().position(|&b| b == 0).unwrap_or(curr.len());
				match curr[..nul].iter().position(|&b| b == b',') {
					None => warn!(
						"button parse error: {:?}",
						String::from_utf8_lossy(&curr[..nul])
					),
					Some(comma) => {
						let label = &curr[..comma];
						let target = rd.decode_text(cstr_at(curr, comma + 1));
						trace!("button => {target}");
						let link = rd.alloc_link(
							LinkKind::Macro,
							target,
							0,
							true,
							false,
							None,
							None,
						);
						rd.field_start(link);
						if label.is_empty() {
							// ballot-box glyph stands in for an unlabeled button
							rd.add_control("\\u9744}}}");
						} else {
							rd.add_raw(label);
							rd.add_control("}}}");
						}
						rd.close_current_link();
					}
				}
			} else {
				warn!(
					"unhandled embedded element {:?}",
					String::from_utf8_lossy(cstr_at(body, 6))
				);
			}
		}
		other => warn!("embedded object type {other} skipped"),
	}

	if size < 0 {
		warn!("negative embedded object size {size}");
	} else {
		fmt.set_pos(fmt.pos() + size as usize);
	}
	if op == 0x88 {
		rd.add_control("\\qr\\par\\pard");
	}
	Ok(())
}

/// Opcodes `0xEA..=0xEF`: topic links that can name another help file
/// and/or a target window.
fn extended_link(
	file: &File,
	rd: &mut RtfData,
	fmt: &mut Scan<'_>,
	op: u8,
) -> Result<(), HlpError> {
	let len = usize::from(fmt.u16()?);
	let body = fmt.take(len)?;
	let sub_type = body.first().copied().unwrap_or(0);
	let hash = u32_at(body, 1).unwrap_or(0);
	let strings = body.get(5..).unwrap_or_default();

	let mut window = None;
	let target = match sub_type {
		0 => file.path_name(),
		1 => {
			window = Some(usize::from(strings.first().copied().unwrap_or(0)));
			file.path_name()
		}
		6 => {
			let name = cstr_at(strings, 0);
			window = image::find_window(file.windows(), name);
			if window.is_none() {
				warn!("no window info for {:?}", String::from_utf8_lossy(name));
			}
			rd.decode_text(cstr_at(strings, name.len() + 1))
		}
		4 => rd.decode_text(cstr_at(strings, 0)),
		other => {
			warn!("unknown link type {other}");
			rd.decode_text(cstr_at(strings, 0))
		}
	};

	let link_kind = if op & 1 != 0 { LinkKind::Topic } else { LinkKind::Popup };
	let link = rd.alloc_link(link_kind, target, hash, op & 4 == 0, false, window, None);
	rd.field_start(link);
	Ok(())
}
