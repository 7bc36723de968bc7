// Command-line front end (`hdp`).
//
// Subcommands map onto the file-path entry points: `diff` and `patch`
// stream through files and print the written path, `info` prints a patch
// header, `config` prints build details.

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::delta::codec::{self, CodecConfig, CodecKind};
use crate::delta::decoder::{self, PatchOptions};
use crate::delta::encoder::DiffOptions;
use crate::error::IoRole;
use crate::io::{self as file_io, DiffStats, PatchStats};
use crate::matcher::config::{
    DEFAULT_MATCH_BLOCK_SIZE, DEFAULT_MATCH_SCORE, DEFAULT_STEP_MEM_SIZE,
};
use crate::stream::FileInput;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (digits, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1u64 << 10),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1 << 20),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1 << 30),
        _ => (s, 1),
    };
    let n: u64 = digits
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    n.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

fn parse_codec(s: &str) -> Result<CodecKind, String> {
    CodecKind::from_name(s).ok_or_else(|| format!("unknown or disabled codec '{s}'"))
}

fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Compressed binary diff and patch.
#[derive(Parser, Debug)]
#[command(
    name = "hdp",
    version,
    about = "Compressed binary diff/patch",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (repeat for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create a patch that turns OLD into NEW.
    Diff(DiffArgs),
    /// Apply a patch to OLD.
    Patch(PatchArgs),
    /// Print a patch header.
    Info(InfoArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct TuningArgs {
    /// Minimum match score for a copy to replace literal bytes.
    #[arg(long = "match-score", default_value_t = DEFAULT_MATCH_SCORE)]
    match_score: u32,

    /// New-data window size for file streaming (supports K/M/G suffix).
    #[arg(long = "step-mem-size", value_parser = parse_byte_size, default_value_t = DEFAULT_STEP_MEM_SIZE as u64)]
    step_mem_size: u64,

    /// Block size of the old-file index used when streaming.
    #[arg(long = "block-size", value_parser = parse_byte_size, default_value_t = DEFAULT_MATCH_BLOCK_SIZE as u64)]
    match_block_size: u64,

    /// Frame codec: stored, zlib or lzma.
    #[arg(long, value_parser = parse_codec)]
    codec: Option<CodecKind>,

    /// Codec compression level (0-9).
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=9))]
    level: Option<u32>,
}

#[derive(Args, Debug)]
struct DiffArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    old: PathBuf,
    #[arg(value_hint = ValueHint::FilePath)]
    new: PathBuf,
    /// Where to write the patch.
    #[arg(value_hint = ValueHint::FilePath)]
    out: PathBuf,

    #[command(flatten)]
    tuning: TuningArgs,
}

#[derive(Args, Debug)]
struct PatchArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    old: PathBuf,
    #[arg(value_hint = ValueHint::FilePath)]
    diff: PathBuf,
    /// Where to write the reconstructed file.
    #[arg(value_hint = ValueHint::FilePath)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct InfoArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    diff: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved command + options
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Command {
    Diff {
        old: PathBuf,
        new: PathBuf,
        out: PathBuf,
        options: DiffOptions,
    },
    Patch {
        old: PathBuf,
        diff: PathBuf,
        out: PathBuf,
    },
    Info {
        diff: PathBuf,
    },
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
}

fn diff_options(tuning: TuningArgs) -> DiffOptions {
    let mut options = DiffOptions {
        match_score: tuning.match_score,
        step_mem_size: usize::try_from(tuning.step_mem_size).unwrap_or(usize::MAX),
        match_block_size: usize::try_from(tuning.match_block_size).unwrap_or(usize::MAX),
        ..Default::default()
    };
    if let Some(codec) = tuning.codec {
        options.codec = codec;
    }
    if let Some(level) = tuning.level {
        options.codec_config.level = level;
    }
    options
}

fn resolve_options(cli: Cli) -> Options {
    let command = match cli.command {
        Cmd::Diff(args) => Command::Diff {
            old: args.old,
            new: args.new,
            out: args.out,
            options: diff_options(args.tuning),
        },
        Cmd::Patch(args) => Command::Patch {
            old: args.old,
            diff: args.diff,
            out: args.out,
        },
        Cmd::Info(args) => Command::Info { diff: args.diff },
        Cmd::Config => Command::Config,
    };
    Options {
        command,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv = std::iter::once("hdp".to_string()).chain(args.iter().cloned());
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn refuse_overwrite(path: &Path, force: bool) -> bool {
    if path.exists() && !force {
        eprintln!(
            "hdp: output file exists, use -f to overwrite: {}",
            path.display()
        );
        return true;
    }
    false
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => eprintln!("{s}"),
        Err(e) => eprintln!("hdp: cannot format stats: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Diff command
// ---------------------------------------------------------------------------

fn diff_json(stats: &DiffStats) -> serde_json::Value {
    serde_json::json!({
        "command": "diff",
        "old_size": stats.old_size,
        "new_size": stats.new_size,
        "diff_size": stats.diff_size,
        "operations": stats.operations,
        "copied": stats.copied,
        "inserted": stats.inserted,
        "new_sha256": stats.new_sha256.as_ref().map(|d| hex(d)),
    })
}

fn cmd_diff(opts: &Options, old: &Path, new: &Path, out: &Path, options: &DiffOptions) -> i32 {
    if refuse_overwrite(out, opts.force) {
        return 1;
    }
    let stats = match file_io::diff_file_with_stats(old, new, out, options) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("hdp: diff error: {e}");
            return 1;
        }
    };
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "hdp: diff: old size: {}, new size: {}, diff size: {}, copied: {}, inserted: {}",
            stats.old_size, stats.new_size, stats.diff_size, stats.copied, stats.inserted
        );
    }
    if opts.json_output {
        print_json(&diff_json(&stats));
    }
    if !opts.quiet {
        println!("{}", out.display());
    }
    0
}

// ---------------------------------------------------------------------------
// Patch command
// ---------------------------------------------------------------------------

fn patch_json(stats: &PatchStats) -> serde_json::Value {
    serde_json::json!({
        "command": "patch",
        "old_size": stats.old_size,
        "diff_size": stats.diff_size,
        "new_size": stats.new_size,
        "operations": stats.operations,
        "new_sha256": stats.new_sha256.as_ref().map(|d| hex(d)),
    })
}

fn cmd_patch(opts: &Options, old: &Path, diff: &Path, out: &Path) -> i32 {
    if refuse_overwrite(out, opts.force) {
        return 1;
    }
    let stats = match file_io::patch_file_with_stats(old, diff, out, &PatchOptions::default()) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("hdp: patch error: {e}");
            return 1;
        }
    };
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "hdp: patch: old size: {}, diff size: {}, new size: {}, operations: {}",
            stats.old_size, stats.diff_size, stats.new_size, stats.operations
        );
    }
    if opts.json_output {
        print_json(&patch_json(&stats));
    }
    if !opts.quiet {
        println!("{}", out.display());
    }
    0
}

// ---------------------------------------------------------------------------
// Info command
// ---------------------------------------------------------------------------

fn cmd_info(opts: &Options, diff: &Path) -> i32 {
    let header = match FileInput::open(diff, IoRole::Diff)
        .and_then(|mut input| decoder::read_header(&mut input))
    {
        Ok(header) => header,
        Err(e) => {
            eprintln!("hdp: info error: {e}");
            return 1;
        }
    };
    let tag = header.compress_type_tag;
    if opts.json_output {
        print_json(&serde_json::json!({
            "command": "info",
            "old_size": header.old_size,
            "new_size": header.new_size,
            "codec": codec::tag_name(tag),
            "codec_tag": tag,
            "header_size": header.header_size,
            "control_stream_size": header.control_stream_size,
            "literal_stream_size": header.literal_stream_size,
        }));
    }
    if !opts.quiet {
        println!("old size:            {}", header.old_size);
        println!("new size:            {}", header.new_size);
        println!("codec:               {} ({tag})", codec::tag_name(tag));
        println!("header size:         {}", header.header_size);
        println!("control stream size: {}", header.control_stream_size);
        println!("literal stream size: {}", header.literal_stream_size);
        if !codec::is_supported(tag) {
            println!("warning: this build cannot decode codec tag {tag}");
        }
    }
    0
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let config = CodecConfig::default();
    println!("hdp version {}", env!("CARGO_PKG_VERSION"));
    println!("default codec:       {:?}", CodecKind::default());
    println!("codec level:         {}", config.level);
    println!("dictionary size:     {}", config.dictionary_size);
    println!("match score:         {DEFAULT_MATCH_SCORE}");
    println!("step mem size:       {DEFAULT_STEP_MEM_SIZE}");
    println!("match block size:    {DEFAULT_MATCH_BLOCK_SIZE}");
    println!("zlib codec:          {}", cfg!(feature = "zlib-codec"));
    println!("lzma codec:          {}", cfg!(feature = "lzma-codec"));
    println!("sha-256 stats:       {}", cfg!(feature = "file-io"));
    println!("parallel dispatch:   {}", cfg!(feature = "parallel"));
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(opts.verbose)),
    )
    .format_timestamp(None)
    .format_target(false)
    .init();

    let exit_code = match &opts.command {
        Command::Diff {
            old,
            new,
            out,
            options,
        } => cmd_diff(&opts, old, new, out, options),
        Command::Patch { old, diff, out } => cmd_patch(&opts, old, diff, out),
        Command::Info { diff } => cmd_info(&opts, diff),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
