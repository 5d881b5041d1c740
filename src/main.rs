//! `hlpdump`: command-line inspection of Windows Help archives.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::error;
use serde::Serialize;
use winhlp_types::file::hash::context_hash;
use winhlp_types::file::page::PageKind;
use winhlp_types::file::{File, FontScale, HlpError};

#[derive(Parser)]
#[command(name = "hlpdump", version, about = "Inspect Windows Help (.HLP) archives")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Show archive metadata
	Info {
		/// Path to the .HLP archive
		file: PathBuf,
		/// Emit machine-readable JSON
		#[arg(long)]
		json: bool,
	},
	/// List pages with offsets and browse links
	Pages {
		/// Path to the .HLP archive
		file: PathBuf,
	},
	/// List the internal sub-files of the archive
	List {
		/// Path to the .HLP archive
		file: PathBuf,
	},
	/// List the keywords of the K index
	Keywords {
		/// Path to the .HLP archive
		file: PathBuf,
	},
	/// Dump one page as RTF
	Rtf {
		/// Path to the .HLP archive
		file: PathBuf,
		/// Select the page by context string
		#[arg(long, conflicts_with_all = ["hash", "map"])]
		context: Option<String>,
		/// Select the page by context hash (hex)
		#[arg(long, conflicts_with = "map")]
		hash: Option<String>,
		/// Select the page by numeric map identifier
		#[arg(long)]
		map: Option<u32>,
		/// Font scale: 0 smaller, 1 normal, 2 larger
		#[arg(long, default_value_t = 1)]
		scale: u32,
		/// Write the RTF here instead of stdout
		#[arg(short, long)]
		output: Option<PathBuf>,
	},
}

#[derive(Serialize)]
struct Summary<'a> {
	title: &'a str,
	copyright: &'a str,
	version: u16,
	charset: u8,
	code_page: u16,
	compressed: bool,
	topic_blocks: usize,
	pages: usize,
	fonts: usize,
	windows: usize,
	sub_files: Vec<String>,
	macros: &'a [String],
}

fn main() {
	env_logger::init();
	let cli = Cli::parse();
	if let Err(err) = run(cli) {
		error!("{err}");
		eprintln!("hlpdump: {err}");
		std::process::exit(1);
	}
}

fn run(cli: Cli) -> Result<(), HlpError> {
	match cli.command {
		Command::Info {
			file,
			json,
		} => info(&File::open(file)?, json),
		Command::Pages {
			file,
		} => pages(&File::open(file)?),
		Command::List {
			file,
		} => {
			for name in File::open(file)?.sub_file_names() {
				println!("{name}");
			}
			Ok(())
		}
		Command::Keywords {
			file,
		} => keywords(&File::open(file)?),
		Command::Rtf {
			file,
			context,
			hash,
			map,
			scale,
			output,
		} => rtf(&File::open(file)?, context, hash, map, scale, output),
	}
}

fn info(file: &File, json: bool) -> Result<(), HlpError> {
	let summary = Summary {
		title: file.title(),
		copyright: file.copyright(),
		version: file.version(),
		charset: file.charset(),
		code_page: file.code_page(),
		compressed: file.compressed(),
		topic_blocks: file.topic_blocks(),
		pages: file.pages().len(),
		fonts: file.fonts().len(),
		windows: file.windows().len(),
		sub_files: file.sub_file_names(),
		macros: file.macros(),
	};
	if json {
		println!("{}", serde_json::to_string_pretty(&summary).expect("serializable summary"));
		return Ok(());
	}
	println!("Title:     {}", summary.title);
	if !summary.copyright.is_empty() {
		println!("Copyright: {}", summary.copyright);
	}
	println!("Version:   1.{}", summary.version);
	println!("Charset:   {} (cp{})", summary.charset, summary.code_page);
	println!("Pages:     {}", summary.pages);
	println!("Fonts:     {}", summary.fonts);
	println!("Windows:   {}", summary.windows);
	println!("Sub-files: {}", summary.sub_files.join(" "));
	for macro_str in summary.macros {
		println!("Macro:     {macro_str}");
	}
	Ok(())
}

fn pages(file: &File) -> Result<(), HlpError> {
	for (index, page) in file.pages().iter().enumerate() {
		let marker = match page.kind {
			PageKind::Contents => " (contents)",
			PageKind::Topic => "",
		};
		println!("[{index}] {:#010x} {}{marker}", page.offset, page.title);
		if let Some(bwd) = page.browse_bwd {
			println!("      browse-: {bwd:#010x}");
		}
		if let Some(fwd) = page.browse_fwd {
			println!("      browse+: {fwd:#010x}");
		}
		for macro_str in &page.macros {
			println!("      macro: {macro_str}");
		}
	}
	Ok(())
}

fn keywords(file: &File) -> Result<(), HlpError> {
	let Some(tree) = file.keywords() else {
		eprintln!("no keyword index");
		return Ok(());
	};
	tree.for_each(|keyword, entry| {
		let topics = tree.topics(entry);
		println!("{} ({} topics)", String::from_utf8_lossy(keyword), topics.len());
	})
}

fn rtf(
	file: &File,
	context: Option<String>,
	hash: Option<String>,
	map: Option<u32>,
	scale: u32,
	output: Option<PathBuf>,
) -> Result<(), HlpError> {
	let target = if let Some(context) = context {
		file.page_by_hash(context_hash(context.as_bytes()))
	} else if let Some(hash) = hash {
		let value = u32::from_str_radix(hash.trim_start_matches("0x"), 16)
			.map_err(|_| HlpError::IntegrityViolation(format!("bad hash {hash:?}")))?;
		file.page_by_hash(value)
	} else if let Some(map) = map {
		file.page_by_map(map)
	} else {
		file.contents_page()
	};
	let Some((page, relative)) = target else {
		return Err(HlpError::IntegrityViolation("page not found".into()));
	};

	let rd = file
		.browse_page(page, FontScale::from_raw(scale), relative, file.windows().first())
		.expect("looked-up page exists");
	for (index, link) in rd.links().iter().enumerate() {
		eprintln!(
			"link {index}: {:?} {:#010x} {} [{}..{}]",
			link.kind, link.hash, link.target, link.cp_min, link.cp_max
		);
	}
	match output {
		Some(path) => std::fs::write(path, rd.rtf())?,
		None => std::io::stdout().write_all(rd.rtf())?,
	}
	Ok(())
}
