// Command-line front end.
//
// `blazer <input>` compresses to `<input>.blz`; `blazer -d <input>.blz`
// restores the original (stored file name first, stripped suffix second,
// `.unpacked` last).  Exit code 0 on success, 1 on any error.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::UNIX_EPOCH;

use clap::{Parser, ValueEnum, ValueHint};

use crate::container::file_info::FileInfo;
use crate::container::flags::StreamOptions;
use crate::container::reader::{DecompressOptions, DecompressionStream};
use crate::container::writer::CompressionStream;
use crate::io::{copy_stream, default_compressed_name, default_decompressed_name};

// ---------------------------------------------------------------------------
// Clap definition
// ---------------------------------------------------------------------------

/// Block compression with optional password encryption.
#[derive(Parser, Debug)]
#[command(
    name = "blazer",
    version,
    about = "Single-stream block compressor",
    arg_required_else_help = true
)]
struct Cli {
    /// Decompress instead of compress.
    #[arg(short = 'd', long)]
    decompress: bool,

    /// Overwrite existing output files.
    #[arg(short = 'f', long)]
    force: bool,

    /// Read input from standard input.
    #[arg(long)]
    stdin: bool,

    /// Write output to standard output.
    #[arg(long)]
    stdout: bool,

    /// Password for encryption (compress) or decryption (decompress).
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Bare frames: no header, footer, or CRC; 16 MiB blocks.
    #[arg(long)]
    blobonly: bool,

    /// Do not store (or restore) the original file name.
    #[arg(long)]
    nofilename: bool,

    /// Encrypt (or decrypt) the whole container as one stream.
    #[arg(long)]
    encryptfull: bool,

    /// Compression codec.
    #[arg(long, value_enum, default_value_t = Mode::Block)]
    mode: Mode,

    /// Input file (omit with --stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    None,
    Block,
    Stream,
    #[value(name = "streamhigh")]
    StreamHigh,
}

// ---------------------------------------------------------------------------
// Compress
// ---------------------------------------------------------------------------

fn build_stream_options(cli: &Cli) -> StreamOptions {
    let mut options = if cli.blobonly {
        StreamOptions::blob_only()
    } else {
        StreamOptions::default()
    };
    options.password = cli.password.clone();
    options.encrypt_full = cli.encryptfull;

    if !cli.nofilename && !cli.blobonly && !cli.stdin {
        if let Some(input) = &cli.input {
            options.file_info = gather_file_info(input);
        }
    }
    options
}

fn gather_file_info(path: &Path) -> Option<FileInfo> {
    let meta = std::fs::metadata(path).ok()?;
    let modified_unix = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Some(FileInfo {
        file_name: path.file_name()?.to_string_lossy().into_owned(),
        length: meta.len(),
        modified_unix,
    })
}

fn cmd_compress(cli: &Cli) -> i32 {
    if cli.mode != Mode::Block {
        eprintln!("blazer: mode is not supported in this build (only 'block' is)");
        return 1;
    }

    let mut reader: Box<dyn Read> = if cli.stdin {
        Box::new(io::stdin().lock())
    } else {
        // run() guarantees an input path when --stdin is absent.
        let Some(path) = cli.input.as_ref() else {
            return 1;
        };
        match File::open(path) {
            Ok(f) => Box::new(BufReader::new(f)),
            Err(e) => {
                eprintln!("blazer: {}: {e}", path.display());
                return 1;
            }
        }
    };

    let output_path = if cli.stdout {
        None
    } else {
        let path = match &cli.input {
            Some(input) => default_compressed_name(input),
            None => {
                eprintln!("blazer: --stdin needs --stdout");
                return 1;
            }
        };
        if path.exists() && !cli.force {
            eprintln!(
                "blazer: output file exists, use -f to overwrite: {}",
                path.display()
            );
            return 1;
        }
        Some(path)
    };

    let writer: Box<dyn Write> = match &output_path {
        None => Box::new(io::stdout().lock()),
        Some(path) => match File::create(path) {
            Ok(f) => Box::new(BufWriter::new(f)),
            Err(e) => {
                eprintln!("blazer: {}: {e}", path.display());
                return 1;
            }
        },
    };

    let mut stream = match CompressionStream::new(writer, build_stream_options(cli)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("blazer: {e}");
            return 1;
        }
    };
    if let Err(e) = copy_stream(&mut reader, &mut stream) {
        eprintln!("blazer: {e}");
        return 1;
    }
    match stream.finish() {
        Ok(mut w) => match w.flush() {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("blazer: {e}");
                1
            }
        },
        Err(e) => {
            eprintln!("blazer: {e}");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Decompress
// ---------------------------------------------------------------------------

fn cmd_decompress(cli: &Cli) -> i32 {
    let options = DecompressOptions {
        password: cli.password.clone(),
        encrypt_full: cli.encryptfull,
        headerless: if cli.blobonly {
            // Headerless containers carry no flag word; rebuild it from the
            // same switches the compressing side used.
            let profile = StreamOptions {
                password: cli.password.clone(),
                encrypt_full: cli.encryptfull,
                ..StreamOptions::blob_only()
            };
            match profile.to_flags() {
                Ok(flags) => Some(flags),
                Err(e) => {
                    eprintln!("blazer: {e}");
                    return 1;
                }
            }
        } else {
            None
        },
    };

    let reader: Box<dyn Read> = if cli.stdin {
        Box::new(io::stdin().lock())
    } else {
        let Some(path) = cli.input.as_ref() else {
            return 1;
        };
        match File::open(path) {
            Ok(f) => Box::new(BufReader::new(f)),
            Err(e) => {
                eprintln!("blazer: {}: {e}", path.display());
                return 1;
            }
        }
    };

    let mut stream = match DecompressionStream::new(reader, options) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("blazer: {e}");
            return 1;
        }
    };

    let output_path = if cli.stdout {
        None
    } else {
        match resolve_decompressed_name(cli, stream.file_info()) {
            Ok(path) => {
                if path.exists() && !cli.force {
                    eprintln!(
                        "blazer: output file exists, use -f to overwrite: {}",
                        path.display()
                    );
                    return 1;
                }
                Some(path)
            }
            Err(msg) => {
                eprintln!("blazer: {msg}");
                return 1;
            }
        }
    };

    let mut writer: Box<dyn Write> = match &output_path {
        None => Box::new(io::stdout().lock()),
        Some(path) => match File::create(path) {
            Ok(f) => Box::new(BufWriter::new(f)),
            Err(e) => {
                eprintln!("blazer: {}: {e}", path.display());
                return 1;
            }
        },
    };

    if let Err(e) = copy_stream(&mut stream, &mut writer) {
        eprintln!("blazer: {e}");
        return 1;
    }
    if let Err(e) = writer.flush() {
        eprintln!("blazer: {e}");
        return 1;
    }
    0
}

/// Stored file name first, stripped `.blz` second, `.unpacked` last.
fn resolve_decompressed_name(cli: &Cli, file_info: Option<&FileInfo>) -> Result<PathBuf, String> {
    if !cli.nofilename {
        if let Some(info) = file_info {
            if !info.file_name.is_empty() {
                let dir = cli
                    .input
                    .as_deref()
                    .and_then(Path::parent)
                    .unwrap_or_else(|| Path::new(""));
                return Ok(dir.join(&info.file_name));
            }
        }
    }
    match &cli.input {
        Some(input) => Ok(default_decompressed_name(input)),
        None => Err("cannot pick an output name for --stdin; use --stdout".into()),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();

    if !cli.stdin && cli.input.is_none() {
        eprintln!("blazer: no input file (use --stdin to read standard input)");
        process::exit(1);
    }

    let code = if cli.decompress {
        cmd_decompress(&cli)
    } else {
        cmd_compress(&cli)
    };
    process::exit(code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
