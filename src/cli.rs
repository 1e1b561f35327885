// Command-line front end for Unrepeat.
//
// Pipes stdin (or a file) through the marker decompressor and writes the
// expanded text to stdout (or a file). The output byte count is reported on
// stderr, separately from the data itself.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use log::{info, warn};

use crate::decoder::{
    self, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_BLOCK_LEN, DecompressOptions, DecompressStats,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Largest accepted `--buffer-size`.
const MAX_BUFFER_SIZE: u64 = 1 << 30; // 1 GiB

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Decompressor for (LxN) repetition-marker text.
#[derive(Parser, Debug)]
#[command(
    name = "unrepeat",
    version,
    about = "Expand (LxN) repetition markers",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Decompress an input stream.
    Decompress(DecompressArgs),
    /// Print the decompressed length without writing the output.
    Measure(MeasureArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct TuningArgs {
    /// Read buffer size (supports K/M/G suffix).
    #[arg(long = "buffer-size", value_parser = parse_byte_size, default_value_t = DEFAULT_BUFFER_SIZE as u64)]
    buffer_size: u64,

    /// Largest repeated block a marker may request (supports K/M/G suffix).
    #[arg(long = "max-block", value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_BLOCK_LEN as u64)]
    max_block_len: u64,
}

#[derive(Args, Debug)]
struct DecompressArgs {
    /// Input file (default: stdin).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "input_pos")]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "output_pos")]
    output: Option<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Check/compute only (do not write output).
    #[arg(long = "check-only")]
    no_output: bool,

    #[command(flatten)]
    tuning: TuningArgs,

    /// Input file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    input_pos: Option<PathBuf>,

    /// Output file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    output_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MeasureArgs {
    /// Input file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    #[command(flatten)]
    tuning: TuningArgs,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Decompress,
    Measure,
    Config,
}

struct Options {
    command: Command,
    use_stdout: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    no_output: bool,
    buffer_size: u64,
    max_block_len: u64,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    json_output: bool,
}

fn resolve_options(cli: Cli) -> Options {
    let quiet = cli.quiet;
    let verbose = cli.verbose.min(2);
    let force = cli.force;
    let json_output = cli.json_output;

    match cli.command {
        Cmd::Decompress(args) => Options {
            command: Command::Decompress,
            use_stdout: args.stdout,
            force,
            quiet,
            verbose,
            no_output: args.no_output,
            buffer_size: args.tuning.buffer_size,
            max_block_len: args.tuning.max_block_len,
            input_file: args.input.or(args.input_pos),
            output_file: args.output.or(args.output_pos),
            json_output,
        },
        Cmd::Measure(args) => Options {
            command: Command::Measure,
            use_stdout: false,
            force,
            quiet,
            verbose,
            no_output: true,
            buffer_size: args.tuning.buffer_size,
            max_block_len: args.tuning.max_block_len,
            input_file: args.input,
            output_file: None,
            json_output,
        },
        Cmd::Config => Options {
            command: Command::Config,
            use_stdout: false,
            force,
            quiet,
            verbose,
            no_output: false,
            buffer_size: DEFAULT_BUFFER_SIZE as u64,
            max_block_len: DEFAULT_MAX_BLOCK_LEN as u64,
            input_file: None,
            output_file: None,
            json_output,
        },
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("unrepeat".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = build_decompress_options(&resolve_options(cli));
    }
}

// ---------------------------------------------------------------------------
// Build DecompressOptions from CLI options
// ---------------------------------------------------------------------------

fn build_decompress_options(opts: &Options) -> Result<DecompressOptions, String> {
    if opts.buffer_size == 0 {
        return Err("--buffer-size must be greater than zero".into());
    }
    if opts.buffer_size > MAX_BUFFER_SIZE {
        return Err(format!(
            "--buffer-size {} exceeds max {MAX_BUFFER_SIZE}",
            opts.buffer_size
        ));
    }
    let max_block_len = usize::try_from(opts.max_block_len)
        .map_err(|_| format!("--max-block {} does not fit in memory", opts.max_block_len))?;

    Ok(DecompressOptions {
        buffer_size: opts.buffer_size as usize,
        max_block_len,
    })
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("unrepeat version {version} (Rust)");

    let file_io = cfg!(feature = "file-io") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("FILE_IO={file_io}");
    eprintln!("DEFAULT_BUFFER_SIZE={DEFAULT_BUFFER_SIZE}");
    eprintln!("DEFAULT_MAX_BLOCK_LEN={DEFAULT_MAX_BLOCK_LEN}");
    eprintln!("MAX_BUFFER_SIZE={MAX_BUFFER_SIZE}");
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn open_input(opts: &Options) -> Option<Box<dyn Read>> {
    match &opts.input_file {
        Some(path) => match File::open(path) {
            Ok(f) => Some(Box::new(f)),
            Err(e) => {
                eprintln!("unrepeat: input file: {}: {e}", path.display());
                None
            }
        },
        None => Some(Box::new(io::stdin().lock())),
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => eprintln!("{s}"),
        Err(e) => eprintln!("unrepeat: json output: {e}"),
    }
}

fn report(command: &str, stats: &DecompressStats, opts: &Options) {
    if stats.termination.is_truncated() {
        warn!(
            "input ended early ({}), partial tail written",
            stats.termination.as_str()
        );
    }

    info!(
        "input size: {}, markers: {}, end: {}",
        stats.bytes_in,
        stats.markers,
        stats.termination.as_str()
    );

    if opts.json_output {
        print_json(&serde_json::json!({
            "command": command,
            "input_size": stats.bytes_in,
            "output_size": stats.bytes_written,
            "markers": stats.markers,
            "termination": stats.termination.as_str(),
        }));
    }
}

// ---------------------------------------------------------------------------
// Decompress command
// ---------------------------------------------------------------------------

fn cmd_decompress(opts: &Options, decompress_opts: &DecompressOptions) -> i32 {
    let Some(reader) = open_input(opts) else {
        return 1;
    };

    let mut output_writer: Box<dyn Write> = match (opts.no_output, &opts.output_file) {
        (true, _) => Box::new(io::sink()),
        (false, None) => Box::new(BufWriter::with_capacity(
            decompress_opts.buffer_size,
            io::stdout().lock(),
        )),
        (false, Some(path)) => {
            if path.exists() && !opts.force {
                eprintln!(
                    "unrepeat: output file exists, use -f to overwrite: {}",
                    path.display()
                );
                return 1;
            }
            match File::create(path) {
                Ok(f) => Box::new(BufWriter::with_capacity(decompress_opts.buffer_size, f)),
                Err(e) => {
                    eprintln!("unrepeat: output file: {}: {e}", path.display());
                    return 1;
                }
            }
        }
    };

    let result = decoder::decompress(reader, &mut output_writer, decompress_opts);

    // Output written before a failure is kept.
    if let Err(e) = output_writer.flush() {
        eprintln!("unrepeat: write flush error: {e}");
        return 1;
    }

    match result {
        Ok(stats) => {
            if !opts.quiet {
                eprintln!("unrepeat: output size: {}", stats.bytes_written);
            }
            report("decompress", &stats, opts);
            0
        }
        Err(e) => {
            eprintln!("unrepeat: decompress error: {e}");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Measure command
// ---------------------------------------------------------------------------

fn cmd_measure(opts: &Options, decompress_opts: &DecompressOptions) -> i32 {
    let Some(reader) = open_input(opts) else {
        return 1;
    };

    match decoder::decompressed_len(reader, decompress_opts) {
        Ok(stats) => {
            println!("{}", stats.bytes_written);
            report("measure", &stats, opts);
            0
        }
        Err(e) => {
            eprintln!("unrepeat: decompress error: {e}");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let mut opts = resolve_options(cli);

    let default_filter = match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let decompress_opts = match build_decompress_options(&opts) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("unrepeat: {msg}");
            process::exit(1);
        }
    };

    // Warn if -c overrides output filename.
    if opts.use_stdout
        && let Some(path) = opts.output_file.take()
        && !opts.quiet
    {
        eprintln!(
            "unrepeat: warning: -c option overrides output filename: {}",
            path.display()
        );
    }

    let exit_code = match opts.command {
        Command::Decompress => cmd_decompress(&opts, &decompress_opts),
        Command::Measure => cmd_measure(&opts, &decompress_opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
