//! binlayout - print the structural layout of a binary or search its bytes

use anyhow::{bail, Context, Result};
use binlayout::io::{parse_path, IOLimits};
use binlayout::logging::{default_filter, init_tracing, init_tracing_json};
use binlayout::search::{search_with_options, SearchMode, SearchOptions, SearchResult};
use binlayout::{Palette, ParseOptions, ParsedFile, Region};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Structural region maps for PE, ELF, Mach-O, PNG, JPEG and ISOBMFF files
#[derive(Parser, Debug)]
#[command(name = "binlayout")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Refuse files larger than this many bytes
    #[arg(long, global = true, default_value_t = IOLimits::default().max_file_size, env = "BINLAYOUT_MAX_FILE_SIZE")]
    max_file_size: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the region tree of a file
    Parse(ParseArgs),
    /// Search a file's raw bytes
    Search(SearchArgs),
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// File to parse
    file: PathBuf,

    /// Print the full parse result as JSON
    #[arg(long)]
    json: bool,

    /// Use the light color palette
    #[arg(long)]
    light: bool,

    /// Stop descending below this tree depth (0 = unlimited)
    #[arg(long, default_value = "0")]
    depth: usize,

    /// Emit Mach-O segment data regions even when they overlap the load commands
    #[arg(long)]
    macho_all_segments: bool,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// File to search
    file: PathBuf,

    /// Query: hex bytes, text, or a regular expression
    query: String,

    /// How the query is interpreted
    #[arg(long, value_enum, default_value = "ascii")]
    mode: ModeArg,

    /// Treat the query as a regular expression (ascii mode only)
    #[arg(long)]
    regex: bool,

    /// Maximum number of results
    #[arg(long, default_value_t = binlayout::search::MAX_RESULTS)]
    limit: usize,

    /// Abort the scan after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Hex,
    Ascii,
    Unicode,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Hex => SearchMode::Hex,
            ModeArg::Ascii => SearchMode::Ascii,
            ModeArg::Unicode => SearchMode::Unicode,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = default_filter(cli.verbose);
    if cli.log_json {
        init_tracing_json(filter);
    } else {
        init_tracing(filter);
    }

    let limits = IOLimits {
        max_file_size: cli.max_file_size,
    };
    match cli.command {
        Command::Parse(args) => run_parse(args, &limits),
        Command::Search(args) => run_search(args, &limits),
    }
}

fn load(path: &Path, limits: &IOLimits, options: &ParseOptions) -> Result<ParsedFile> {
    parse_path(path, limits, options).with_context(|| format!("Failed to load {}", path.display()))
}

fn run_parse(args: ParseArgs, limits: &IOLimits) -> Result<()> {
    let mut options = ParseOptions::with_palette(if args.light {
        Palette::Light
    } else {
        Palette::Dark
    });
    options.macho.skip_segment_data_in_header = !args.macho_all_segments;

    let parsed = load(&args.file, limits, &options)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.json {
        writeln!(out, "{}", parsed.to_json()?)?;
        return Ok(());
    }

    writeln!(
        out,
        "{} ({}, {} bytes, {} regions)",
        parsed.name,
        parsed.format,
        parsed.size,
        parsed.region_count()
    )?;
    if let Some(error) = &parsed.error {
        writeln!(out, "error: {}", error)?;
    }
    for region in &parsed.regions {
        print_tree(&mut out, region, args.depth)?;
    }
    if !parsed.sections.is_empty() {
        writeln!(out)?;
        writeln!(out, "{:<24} {:>18} {:>10} {:>10} {:>10}", "section", "address", "vsize", "offset", "size")?;
        for s in &parsed.sections {
            writeln!(
                out,
                "{:<24} {:>#18x} {:>#10x} {:>#10x} {:>#10x}",
                s.name, s.virtual_address, s.virtual_size, s.file_offset, s.file_size
            )?;
        }
    }
    Ok(())
}

fn print_tree(out: &mut impl Write, root: &Region, max_depth: usize) -> io::Result<()> {
    let mut stack = vec![(root, 0usize)];
    while let Some((region, depth)) = stack.pop() {
        write!(
            out,
            "{:indent$}{:#010x} {:>10}  {}",
            "",
            region.offset,
            region.size,
            region.name,
            indent = depth * 2
        )?;
        if let Some(value) = &region.value {
            write!(out, " = {}", value)?;
        }
        if let Some(description) = &region.description {
            write!(out, "  ({})", description)?;
        }
        writeln!(out)?;
        for (label, value) in region.details.iter() {
            writeln!(out, "{:indent$}  {}: {}", "", label, value, indent = depth * 2 + 11)?;
        }
        if max_depth == 0 || depth + 1 < max_depth {
            stack.extend(region.children.iter().rev().map(|c| (c, depth + 1)));
        }
    }
    Ok(())
}

fn run_search(args: SearchArgs, limits: &IOLimits) -> Result<()> {
    if args.limit == 0 {
        bail!("--limit must be at least 1");
    }
    let parsed = load(&args.file, limits, &ParseOptions::default())?;
    let options = SearchOptions {
        max_results: args.limit.min(binlayout::search::MAX_RESULTS),
        deadline: args.timeout_ms.map(std::time::Duration::from_millis),
        ..SearchOptions::default()
    };
    debug!(query = %args.query, mode = ?args.mode, regex = args.regex, "searching");
    let results = search_with_options(&parsed, &args.query, args.mode.into(), args.regex, &options)
        .with_context(|| format!("Search in {} failed", parsed.name))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&results)?)?;
        return Ok(());
    }
    for result in &results {
        print_result(&mut out, result)?;
    }
    writeln!(out, "{} match(es)", results.len())?;
    Ok(())
}

fn print_result(out: &mut impl Write, result: &SearchResult) -> io::Result<()> {
    write!(out, "{:#010x} {:>6}", result.offset, result.size)?;
    match result.virtual_address {
        Some(va) => write!(out, "  va {:#x}", va)?,
        None => write!(out, "  va -")?,
    }
    if let Some(text) = &result.matched_text {
        write!(out, "  {:?}", text)?;
    }
    writeln!(out)
}
