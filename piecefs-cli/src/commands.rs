//! CLI command implementations

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, bail};
use piecefs_core::torrent::MetadataSource;
use piecefs_core::{Lookup, PiecefsConfig, PiecefsError, Session, TorrentFs};
use piecefs_sim::{InMemoryPieceStore, SimConfig, SimulatedEngine};

use crate::{Cli, Commands};

const CAT_CHUNK: usize = 64 * 1024;

/// Exit status when startup configuration keeps the filesystem from serving.
pub const EXIT_CONFIGURATION: u8 = 2;
pub const EXIT_FAILURE: u8 = 1;

/// Starts a session, runs the command against it and shuts it down.
///
/// # Errors
/// - Invalid metadata source, unreadable content directory or scratch root
/// - Metadata not arriving within the timeout
/// - Any failure of the command itself
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli);
    let source = MetadataSource::resolve(&cli.source)
        .map_err(PiecefsError::from)
        .with_context(|| format!("Cannot use {} as a metadata source", cli.source))?;

    let store = cli
        .content
        .as_deref()
        .map(|dir| InMemoryPieceStore::from_dir(dir, cli.piece_length))
        .transpose()
        .map_err(|e| PiecefsError::Configuration {
            reason: e.to_string(),
        })?;
    if store.is_none() {
        tracing::warn!("No --content directory given, the swarm has nothing to offer");
    }

    let sim = SimConfig::with_seed(cli.seed);
    let (engine, notifications) = SimulatedEngine::spawn(store, sim)?;
    let session = Session::start(engine, notifications, source, &config)?;

    let result = if session
        .fs()
        .wait_ready(Duration::from_secs(cli.metadata_timeout))
    {
        execute(session.fs(), &cli.command)
    } else {
        Err(anyhow::anyhow!(
            "Torrent metadata did not arrive within {}s",
            cli.metadata_timeout
        ))
    };

    session.shutdown()?;
    result
}

/// Maps a failed run to its process exit status.
///
/// Errors that stopped the filesystem from ever serving get
/// [`EXIT_CONFIGURATION`], whatever context was attached on the way up.
pub fn exit_status(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<PiecefsError>() {
        Some(error) if error.is_fatal() => EXIT_CONFIGURATION,
        _ => EXIT_FAILURE,
    }
}

fn build_config(cli: &Cli) -> PiecefsConfig {
    let mut config = PiecefsConfig::from_env();

    if let Some(target) = &cli.target {
        config.storage.target_root = Some(target.clone());
    }
    if let Some(limit) = cli.download_limit {
        config.network.download_limit = (limit > 0).then_some(limit);
    }
    if let Some(limit) = cli.upload_limit {
        config.network.upload_limit = (limit > 0).then_some(limit);
    }
    if let Some(bytes) = cli.urgent_window {
        config.window.urgent_window_bytes = bytes;
    }

    config
}

fn execute(fs: &TorrentFs, command: &Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ls { path } => list(fs, &normalize(path)),
        Commands::Stat { path } => stat(fs, &normalize(path)),
        Commands::Cat {
            path,
            offset,
            length,
        } => cat(fs, &normalize(path), *offset, *length),
    }
}

fn list(fs: &TorrentFs, path: &str) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    for name in fs.read_dir(path)? {
        let child = child_path(path, &name);
        match fs.lookup(&child) {
            Lookup::Directory(_) => writeln!(out, "{name}/")?,
            Lookup::File { size } => writeln!(out, "{size:>14}  {name}")?,
            Lookup::NotFound => {}
        }
    }
    Ok(())
}

fn stat(fs: &TorrentFs, path: &str) -> anyhow::Result<()> {
    match fs.lookup(path) {
        Lookup::Directory(children) => println!("{path}: directory, {} entries", children.len()),
        Lookup::File { size } => println!("{path}: file, {size} bytes"),
        Lookup::NotFound => bail!("No such file or directory: {path}"),
    }
    Ok(())
}

fn cat(fs: &TorrentFs, path: &str, offset: u64, length: Option<u64>) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    let mut buffer = vec![0u8; CAT_CHUNK];
    let mut position = offset;
    let mut remaining = length.unwrap_or(u64::MAX);

    while remaining > 0 {
        let want = remaining.min(CAT_CHUNK as u64) as usize;
        let n = fs
            .read(path, position, &mut buffer[..want])
            .with_context(|| format!("Read of {path} at offset {position} failed"))?;
        if n == 0 {
            break;
        }
        out.write_all(&buffer[..n])?;
        position += n as u64;
        remaining -= n as u64;
    }
    out.flush()?;

    let stats = fs.stats();
    tracing::info!(
        "Wrote {} bytes; {} of {} reads blocked on download",
        position - offset,
        stats.blocking_reads,
        stats.reads_completed
    );
    Ok(())
}

/// Makes a user-supplied path absolute, without a trailing slash.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}

fn child_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}
