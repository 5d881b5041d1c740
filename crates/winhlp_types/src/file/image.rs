//! Embedded graphics: `|bmN` sub-files and inline picture payloads.
//!
//! A picture group starts with a magic word, a picture count and an offset
//! table; each picture is `(type, packing)` followed by a header whose
//! fields use the variable-length integer encoding. Types 5 (DDB) and 6
//! (DIB) become `\pict\wbitmap0` / `\pict\dibitmap0` hex runs, type 8
//! (WMF) becomes `\pict\wmetafileN`. Hotspot tables ride along after the
//! image bits.
//!
//! A DIB flagged `clrImportant == 1` designates its last palette entry as
//! transparent. Compositing that into a metafile needs a rasterizer, so
//! the decoder hands the caller the structured bitmap plus the transparent
//! index instead of inlining it.

use log::{debug, trace, warn};

use super::File;
use super::bytes::{Scan, cstr_at, u16_at, u32_at};
use super::compress::{GfxPacking, decompress_gfx};
use super::error::HlpError;
use super::hash::context_hash;
use super::rtf::{Hotspot, LinkKind, RtfData};
use super::system::Window;

/// A serialized `BITMAPINFOHEADER`.
#[derive(Debug, Clone)]
pub struct DibHeader {
	/// Width in pixels
	pub width: u32,
	/// Height in pixels
	pub height: u32,
	/// Plane count (always 1 in practice)
	pub planes: u16,
	/// Bits per pixel
	pub bit_count: u16,
	/// Horizontal resolution, pixels per meter
	pub x_ppm: u32,
	/// Vertical resolution, pixels per meter
	pub y_ppm: u32,
	/// Palette entries used
	pub clr_used: u32,
	/// Important-color count (0 or the raw value when above 1)
	pub clr_important: u32,
	/// Row-padded image size in bytes
	pub size_image: u32,
}

impl DibHeader {
	/// Serializes the 40-byte little-endian header.
	pub fn to_bytes(&self) -> [u8; 40] {
		let mut out = [0u8; 40];
		out[0..4].copy_from_slice(&40u32.to_le_bytes());
		out[4..8].copy_from_slice(&self.width.to_le_bytes());
		out[8..12].copy_from_slice(&self.height.to_le_bytes());
		out[12..14].copy_from_slice(&self.planes.to_le_bytes());
		out[14..16].copy_from_slice(&self.bit_count.to_le_bytes());
		// compression: BI_RGB
		out[20..24].copy_from_slice(&self.size_image.to_le_bytes());
		out[24..28].copy_from_slice(&self.x_ppm.to_le_bytes());
		out[28..32].copy_from_slice(&self.y_ppm.to_le_bytes());
		out[32..36].copy_from_slice(&self.clr_used.to_le_bytes());
		out[36..40].copy_from_slice(&self.clr_important.to_le_bytes());
		out
	}
}

/// A bitmap the RTF stream cannot carry: one palette index is transparent
/// and compositing is the viewer's job.
#[derive(Debug, Clone)]
pub struct TransparentBitmap {
	/// DIB header
	pub header: DibHeader,
	/// Palette in `RGBQUAD` order (blue, green, red, reserved)
	pub palette: Vec<[u8; 4]>,
	/// Decompressed image bits
	pub bits: Vec<u8>,
	/// Palette index to treat as transparent
	pub transparent_index: usize,
	/// Which image of the page this would have been
	pub imgidx: u32,
}

/// Renders the picture group in the `|bmN` sub-file named by `index`.
pub(crate) fn add_gfx_by_index(rd: &mut RtfData, file: &File, index: i16) -> bool {
	trace!("loading picture #{index}");
	let name = format!("|bm{index}");
	let Some(sub) = file.sub_file(&name) else {
		warn!("no {name} sub file");
		return false;
	};
	add_gfx_by_addr(rd, &file.path_name(), file.windows(), sub.payload())
}

/// Renders an inline picture group.
///
/// Only the first picture format of a group is used; multi-format groups
/// are rare and the first entry is the most portable one.
pub(crate) fn add_gfx_by_addr(
	rd: &mut RtfData,
	path: &str,
	windows: &[Window],
	bytes: &[u8],
) -> bool {
	let numpict = u16_at(bytes, 2).unwrap_or(0);
	trace!("picture group: magic={:#06x} count={numpict}", u16_at(bytes, 0).unwrap_or(0));
	if numpict > 1 {
		warn!("using the first of {numpict} picture formats");
	}

	if numpict > 0 {
		let off = u32_at(bytes, 4).unwrap_or(0) as usize;
		let Some(beg) = bytes.get(off..) else {
			warn!("picture offset {off:#x} outside group");
			return false;
		};
		let (Some(&btype), Some(&pack_byte)) = (beg.first(), beg.get(1)) else {
			warn!("picture record too short");
			return false;
		};
		let result = match btype {
			// device dependent / independent bitmap
			5 | 6 => GfxPacking::try_from(pack_byte)
				.and_then(|pack| add_bitmap(rd, path, windows, beg, btype, pack)),
			8 => GfxPacking::try_from(pack_byte)
				.and_then(|pack| add_metafile(rd, path, windows, beg, pack)),
			other => {
				warn!("unknown picture type {other}");
				return false;
			}
		};
		if let Err(err) = result {
			warn!("picture skipped: {err}");
		}
	}
	rd.imgcnt += 1;
	true
}

fn add_bitmap(
	rd: &mut RtfData,
	path: &str,
	windows: &[Window],
	beg: &[u8],
	btype: u8,
	pack: GfxPacking,
) -> Result<(), HlpError> {
	let mut scan = Scan::at(beg, 2);
	let x_ppm = scan.fetch_ulong()?;
	let y_ppm = scan.fetch_ulong()?;
	let planes = scan.fetch_ushort()?;
	let bit_count = scan.fetch_ushort()?;
	let width = scan.fetch_ulong()?;
	let height = scan.fetch_ulong()?;
	let clr_used = scan.fetch_ulong()?;
	let clr_important = scan.fetch_ulong()?;
	if bit_count > 32 {
		warn!("unknown bit count {bit_count}");
	}
	if planes != 1 {
		warn!("unsupported plane count {planes}");
	}
	let size_image =
		((u64::from(width) * u64::from(bit_count) + 31) & !31) / 8 * u64::from(height);
	let header = DibHeader {
		width,
		height,
		planes,
		bit_count,
		x_ppm,
		y_ppm,
		clr_used,
		clr_important: if clr_important > 1 { clr_important } else { 0 },
		size_image: size_image as u32,
	};
	debug!("bitmap: planes={planes} bc={bit_count} size=({width},{height})");

	let csz = scan.fetch_ulong()? as usize;
	let hs_size = scan.fetch_ulong()?;
	let off = scan.u32()? as usize;
	let hs_offset = scan.u32()?;
	add_hotspot_links(rd, path, windows, beg, hs_size, hs_offset, 1.0);

	// palette for device-independent bitmaps
	let mut palette = Vec::new();
	if btype == 0x06 {
		let mut nc = clr_used as usize;
		if nc == 0 && bit_count <= 8 {
			nc = 1 << bit_count;
		}
		for _ in 0..nc {
			let quad = scan.take(4)?;
			palette.push([quad[0], quad[1], quad[2], 0]);
		}
	}

	let src_end = (off + csz).min(beg.len());
	let src = beg.get(off..src_end).ok_or_else(|| {
		HlpError::IntegrityViolation(format!("image bits at {off:#x} outside record"))
	})?;
	let bits = decompress_gfx(src, size_image as usize, pack);

	if clr_important == 1 && !palette.is_empty() {
		let transparent_index = palette.len() - 1;
		rd.transparent.push(TransparentBitmap {
			header,
			palette,
			bits,
			transparent_index,
			imgidx: rd.imgcnt,
		});
		return Ok(());
	}

	rd.add_control("{\\pict");
	// 96dpi: 15 twips to the pixel
	if btype == 0x06 {
		rd.add_control(&format!(
			"\\dibitmap0\\picw{width}\\pich{height}\\picwgoal{}\\pichgoal{}",
			width * 15,
			height * 15
		));
		rd.add_hex(&header.to_bytes());
		for quad in &palette {
			rd.add_hex(quad);
		}
	} else {
		rd.add_control(&format!(
			"\\wbitmap0\\wbmbitspixel{bit_count}\\wbmplanes{planes}\\picw{width}\\pich{height}\\picwgoal{}\\pichgoal{}",
			width * 15,
			height * 15
		));
	}
	rd.add_hex(&bits);
	rd.add_control("}");
	Ok(())
}

fn add_metafile(
	rd: &mut RtfData,
	path: &str,
	windows: &[Window],
	beg: &[u8],
	pack: GfxPacking,
) -> Result<(), HlpError> {
	trace!("loading metafile");
	let mut scan = Scan::at(beg, 2);
	let mm = scan.fetch_ushort()?;
	let picw = scan.u16()?;
	let pich = scan.u16()?;
	rd.add_control(&format!("\\sl0{{\\pict\\wmetafile{mm}\\picw{picw}\\pich{pich}"));

	let size = scan.fetch_ulong()? as usize;
	let csize = scan.fetch_ulong()? as usize;
	let hs_size = scan.fetch_ulong()?;
	let off = scan.u32()? as usize;
	let hs_offset = scan.u32()?;

	// HIMETRIC metafiles keep hotspot coordinates in 0.01mm units
	let coorddiv = if mm == 8 { 26.2 } else { 1.0 };
	add_hotspot_links(rd, path, windows, beg, hs_size, hs_offset, coorddiv);

	let src_end = (off + csize).min(beg.len());
	let src = beg.get(off..src_end).ok_or_else(|| {
		HlpError::IntegrityViolation(format!("metafile bits at {off:#x} outside record"))
	})?;
	let bits = decompress_gfx(src, size, pack);
	rd.add_hex(&bits);
	rd.add_control("}");
	Ok(())
}

/// Parses the hotspot table trailing an image and registers one link plus
/// rectangle per record.
///
/// Tables are occasionally shorter than `hs_size` claims; iteration stops
/// at the declared record count and tolerates missing strings.
fn add_hotspot_links(
	rd: &mut RtfData,
	path: &str,
	windows: &[Window],
	beg: &[u8],
	hs_size: u32,
	hs_offset: u32,
	coorddiv: f32,
) {
	if hs_size == 0 || hs_offset == 0 {
		return;
	}
	let Some(tbl) = beg.get(hs_offset as usize..) else {
		warn!("hotspot table outside record");
		return;
	};
	let hs_num = usize::from(u16_at(tbl, 1).unwrap_or(0));
	let hs_macro = u32_at(tbl, 3).unwrap_or(0) as usize;

	// Two null-terminated strings per record (hotspot name, link target)
	// follow the fixed-size records and the macro data.
	let mut str_pos = 7 + 15 * hs_num + hs_macro;
	for i in 0..hs_num {
		let rec = 7 + 15 * i;
		let Some(&kind) = tbl.get(rec) else {
			warn!("hotspot table truncated at record {i}");
			return;
		};
		let name = cstr_at(tbl, str_pos);
		str_pos += name.len() + 1;
		let target = cstr_at(tbl, str_pos);
		str_pos += target.len() + 1;
		trace!("hotspot {kind:#04x} {:?}", String::from_utf8_lossy(target));

		let link = match kind {
			0xC8 | 0xCC => Some(rd.alloc_link(
				LinkKind::Macro,
				rd.decode_text(target),
				0,
				false,
				true,
				None,
				None,
			)),
			0xE2 | 0xE3 | 0xE6 | 0xE7 => {
				let kind = if kind & 1 != 0 { LinkKind::Topic } else { LinkKind::Popup };
				Some(rd.alloc_link(
					kind,
					path.to_owned(),
					context_hash(target),
					false,
					true,
					None,
					None,
				))
			}
			0xEE | 0xEF => {
				let (context, window) = match target.iter().position(|&b| b == b'>') {
					Some(gt) => {
						let name = &target[gt + 1..];
						let window = find_window(windows, name);
						if window.is_none() {
							warn!(
								"no window info for {:?}",
								String::from_utf8_lossy(name)
							);
						}
						(&target[..gt], window)
					}
					None => (target, None),
				};
				let kind = if kind & 1 != 0 { LinkKind::Topic } else { LinkKind::Popup };
				Some(rd.alloc_link(
					kind,
					path.to_owned(),
					context_hash(context),
					false,
					true,
					window,
					None,
				))
			}
			other => {
				warn!("unknown hotspot target {other:#04x}");
				None
			}
		};

		if let Some(link) = link {
			let coord = |off: usize| {
				(f32::from(u16_at(tbl, rec + off).unwrap_or(0)) / coorddiv) as u32
			};
			let imgidx = rd.imgcnt;
			rd.hotspots.push(Hotspot {
				link,
				x: coord(3),
				y: coord(5),
				width: coord(7),
				height: coord(9),
				imgidx,
			});
		}
	}
}

/// Finds a window by name, preferring the latest declaration.
pub(crate) fn find_window(windows: &[Window], name: &[u8]) -> Option<usize> {
	let name = String::from_utf8_lossy(name);
	windows
		.iter()
		.rposition(|w| w.name.eq_ignore_ascii_case(&name))
}
