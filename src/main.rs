use anyhow::{bail, Context, Result};
use cartridge_rs::archive::DEFAULT_CHUNK_SIZE;
use cartridge_rs::{BlockRecord, Cartridge, Header, Packer};
use clap::{ArgAction, Args, Parser};
use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "cartridge",
    version,
    about = "Pack files into a cartridge archive",
    after_help = "Pack: cartridge <INPUT>... <OUTPUT>\nInspect: cartridge --list|--verify <ARCHIVE>, cartridge --get <ARCHIVE> <NAME>"
)]
struct Cli {
    /// Input files to pack, followed by the output cartridge path.
    #[arg(
        value_name = "FILES",
        num_args = 2..,
        required_unless_present_any = ["list", "verify", "get"],
        conflicts_with_all = ["list", "verify", "get"]
    )]
    files: Vec<PathBuf>,

    #[command(flatten)]
    pack: PackArgs,

    #[command(flatten)]
    inspect: InspectArgs,

    /// Emit JSON from --list instead of a table.
    #[arg(long, requires = "list")]
    json: bool,

    /// Output file for --get (defaults to stdout).
    #[arg(short, long, requires = "get")]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Args)]
struct PackArgs {
    /// Copy buffer size in bytes used while streaming inputs.
    #[arg(long, env = "CARTRIDGE_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Write the output directly instead of through a temporary file.
    #[arg(long, env = "CARTRIDGE_IN_PLACE")]
    in_place: bool,
}

#[derive(Debug, Args)]
#[group(multiple = false)]
struct InspectArgs {
    /// Print the header and block index of a cartridge.
    #[arg(long, value_name = "ARCHIVE")]
    list: Option<PathBuf>,

    /// Check the layout of a cartridge (full index, contiguous blocks).
    #[arg(long, value_name = "ARCHIVE")]
    verify: Option<PathBuf>,

    /// Write the bytes packed under NAME to stdout or a file.
    #[arg(long, num_args = 2, value_names = ["ARCHIVE", "NAME"])]
    get: Option<Vec<OsString>>,
}

#[derive(Serialize)]
struct ListReport<'a> {
    header: &'a Header,
    blocks: Vec<BlockRecord>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let InspectArgs { list, verify, get } = cli.inspect;

    if let Some(archive) = list {
        return self::list(&archive, cli.json);
    }
    if let Some(archive) = verify {
        return self::verify(&archive);
    }
    if let Some(mut args) = get {
        let (Some(name), Some(archive)) = (args.pop(), args.pop()) else {
            bail!("--get takes an archive and a name");
        };
        return self::get(Path::new(&archive), &name, cli.output);
    }
    pack(cli.files, &cli.pack)
}

fn pack(mut files: Vec<PathBuf>, args: &PackArgs) -> Result<()> {
    let Some(output) = files.pop() else {
        bail!("at least 1 input file and 1 output file are required");
    };
    if files.is_empty() {
        bail!("at least 1 input file and 1 output file are required");
    }

    let mut packer = Packer::new()
        .with_chunk_size(args.chunk_size)
        .with_atomic_output(!args.in_place);
    for input in &files {
        packer.add_file(input);
    }

    let summary = packer.pack(&output)?;
    tracing::info!(
        output = %output.display(),
        blocks = summary.block_count,
        bytes = summary.archive_size,
        "packed"
    );
    Ok(())
}

fn open(archive: &Path) -> Result<Cartridge> {
    Cartridge::open(archive).with_context(|| format!("failed to load '{}'", archive.display()))
}

fn list(archive: &Path, json: bool) -> Result<()> {
    let cartridge = open(archive)?;

    if json {
        let report = ListReport {
            header: cartridge.header(),
            blocks: cartridge.blocks().collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let header = cartridge.header();
    println!(
        "version {}, {} blocks, {} data bytes",
        header.version, header.block_count, header.data_size
    );
    println!(
        "{:>6}  {:<16}  {:<16}  {:>12}  {:>12}",
        "slot", "id", "hash", "offset", "length"
    );
    for (slot, block) in cartridge.blocks().enumerate() {
        println!(
            "{:>6}  {:016x}  {:016x}  {:>12}  {:>12}",
            slot, block.id, block.hash, block.start_offset, block.length
        );
    }
    Ok(())
}

fn verify(archive: &Path) -> Result<()> {
    let cartridge = open(archive)?;
    cartridge
        .verify()
        .with_context(|| format!("'{}' failed verification", archive.display()))?;
    println!(
        "ok: {} blocks, {} data bytes",
        cartridge.block_count(),
        cartridge.data_size()
    );
    Ok(())
}

fn get(archive: &Path, name: &OsStr, output: Option<PathBuf>) -> Result<()> {
    let cartridge = open(archive)?;
    // Names are raw path bytes, so lookups go through the same encoding.
    let Some(bytes) = cartridge.lookup_path(Path::new(name)) else {
        bail!(
            "'{}' not found in '{}'",
            Path::new(name).display(),
            archive.display()
        );
    };

    match output {
        Some(path) => std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write '{}'", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
