//! Reference CLI for the ferry file transfer engine.
//!
//! There is no concrete network transport in this workspace (out of scope
//! by design), so this CLI demonstrates the library end to end over a
//! shared directory instead of a socket: `send` wire-frames a file into
//! numbered chunk files plus a manifest, `receive` reassembles them back
//! into a byte-exact, hash-verified file, and `resume` inspects or
//! compacts the persisted transfer state a real transport would tick on a
//! cadence.

mod config;
mod progress;

use clap::{Parser, Subcommand};
use config::Config;
use ferry_core::controller::TransferController;
use ferry_core::events::{Dispatcher, Event};
use ferry_core::types::{ChunkConfig, FileMetadata, TransferId};
use ferry_core::wire;
use ferry_files::{ChunkAssembler, ChunkSplitter};
use ferry_resume::ResumeHandler;
use progress::{format_bytes, TransferProgress};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Chunked, resumable, integrity-verified file transfer.
#[derive(Parser)]
#[command(name = "ferry", author, version, about, long_about = None)]
struct Cli {
    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the platform config directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a file into wire-framed chunks under `--chunk-dir`.
    Send {
        /// File to send.
        file: PathBuf,

        /// Directory to write the manifest and chunk files into.
        #[arg(long, default_value = "./ferry-out")]
        chunk_dir: PathBuf,
    },

    /// Reassemble the chunks under `--chunk-dir` into `--output`.
    Receive {
        /// Directory containing the manifest and chunk files.
        #[arg(long, default_value = "./ferry-out")]
        chunk_dir: PathBuf,

        /// Directory to write the reassembled file into.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Inspect or compact persisted transfer state.
    Resume {
        #[command(subcommand)]
        action: ResumeAction,
    },

    /// Print the effective configuration.
    Info,
}

#[derive(Subcommand)]
enum ResumeAction {
    /// List every tracked transfer.
    List,
    /// Show one transfer's progress.
    Show {
        /// Transfer id (UUID).
        id: String,
    },
    /// Fold the journal into a fresh snapshot and truncate it.
    Compact,
}

/// Pairs a [`FileMetadata`] with the transfer id it belongs to, so `send`
/// and `receive` agree on both without a real metadata control message.
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    id: TransferId,
    metadata: FileMetadata,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            let code = match err.downcast_ref::<ferry_core::error::Error>() {
                Some(ferry_core::error::Error::InvalidConfig(_)) => 1,
                _ => 2,
            };
            ExitCode::from(code)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.config {
        Some(path) => Config::load(&path)?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    match cli.command {
        Commands::Send { file, chunk_dir } => run_send(file, chunk_dir, &config).await,
        Commands::Receive { chunk_dir, output } => run_receive(chunk_dir, output, &config).await,
        Commands::Resume { action } => run_resume(action, &config).await,
        Commands::Info => run_info(&config),
    }
}

fn run_info(config: &Config) -> anyhow::Result<()> {
    println!("chunk_size            = {}", format_bytes(u64::from(config.runtime.chunk_size)));
    println!("max_connections        = {}", config.runtime.max_connections);
    println!("max_file_size          = {}", format_bytes(config.runtime.max_file_size));
    println!("storage_quota          = {}", format_bytes(config.runtime.storage_quota));
    println!("eviction_policy        = {:?}", config.runtime.eviction_policy);
    println!("resume_flush_every     = {} chunks", config.runtime.resume_flush_every_chunks);
    println!("resume_flush_interval  = {} ms", config.runtime.resume_flush_interval_ms);
    println!("verify_crc32           = {}", config.runtime.verify_crc32);
    println!("state_dir              = {}", config.state_dir.display());
    Ok(())
}

async fn run_send(file: PathBuf, chunk_dir: PathBuf, config: &Config) -> anyhow::Result<()> {
    let file = sanitize_existing_path(&file)?;
    std::fs::create_dir_all(&chunk_dir)?;

    let chunk_config = ChunkConfig {
        chunk_size: config.runtime.chunk_size,
        verify_crc32: config.runtime.verify_crc32,
    };
    let splitter = ChunkSplitter::new(chunk_config)?;
    let metadata = splitter.calculate_metadata(&file)?;

    let id = TransferId::new_v4();
    let manifest = Manifest { id, metadata: metadata.clone() };
    std::fs::write(chunk_dir.join("manifest.json"), serde_json::to_vec_pretty(&manifest)?)?;

    let dispatcher = Dispatcher::new();
    let progress = TransferProgress::new(metadata.file_size);
    let bar = progress.handle();
    dispatcher.subscribe(move |event| {
        if let Event::Progress { bytes_written, .. } = event {
            bar.set_position(bytes_written);
        }
    });
    let controller = Arc::new(TransferController::new(id, dispatcher));
    controller.start()?;

    let shutdown = tokio::spawn(wait_for_shutdown(controller.clone()));

    let worker_controller = controller.clone();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut cursor = splitter.split(&file, id)?;
        while cursor.has_next() {
            if worker_controller.state().is_terminal() {
                break;
            }
            let Some(chunk) = cursor.next()? else {
                break;
            };
            let frame_path = chunk_dir.join(format!("{:08}.chunk", chunk.index));
            std::fs::write(frame_path, wire::encode_chunk(&chunk))?;
            worker_controller.report_progress(
                (chunk.index + 1) * u64::from(chunk_config.chunk_size),
                cursor.file_size(),
            );
        }
        Ok(())
    })
    .await?;

    shutdown.abort();

    match result {
        Ok(()) if controller.state().is_terminal() && controller.state() != ferry_core::controller::State::Completed => {
            progress.abandon("cancelled");
            anyhow::bail!("send cancelled before completion");
        }
        Ok(()) => {
            controller.complete()?;
            progress.finish("sent");
            println!("transfer {id}: {} chunks, sha256 {}", metadata.total_chunks, hex::encode(metadata.sha256_hash));
            Ok(())
        }
        Err(err) => {
            controller.fail(err.to_string());
            progress.abandon("failed");
            Err(err)
        }
    }
}

async fn run_receive(chunk_dir: PathBuf, output: PathBuf, config: &Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&output)?;
    let manifest_bytes = std::fs::read(chunk_dir.join("manifest.json"))?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)?;
    let id = manifest.id;
    let metadata = manifest.metadata;

    let resume = Arc::new(ResumeHandler::open(&config.state_dir)?);
    let assembler = Arc::new(ChunkAssembler::new(&output));
    assembler.start_session(id, &metadata)?;

    let dispatcher = Dispatcher::new();
    let progress = TransferProgress::new(metadata.file_size);
    let bar = progress.handle();
    dispatcher.subscribe(move |event| {
        if let Event::Progress { bytes_written, .. } = event {
            bar.set_position(bytes_written);
        }
    });
    let controller = Arc::new(TransferController::new(id, dispatcher));
    controller.start()?;

    let shutdown = tokio::spawn(wait_for_shutdown(controller.clone()));

    // Mirrors the assembler's own bitmap so the resume handler can be
    // ticked on a cadence without the assembler exposing its internals.
    let mut local_state = ferry_core::types::TransferState::new(
        id,
        metadata.filename.clone(),
        metadata.file_size,
        metadata.total_chunks,
        metadata.sha256_hash,
    );
    resume.save(local_state.clone())?;

    let flush_every = u64::from(config.runtime.resume_flush_every_chunks).max(1);
    let total_chunks = metadata.total_chunks;
    let total_bytes = metadata.file_size;
    let worker_controller = controller.clone();
    let worker_assembler = assembler.clone();
    let worker_resume = resume.clone();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut index = 0u64;
        while index < total_chunks {
            if worker_controller.state().is_terminal() {
                break;
            }
            let frame_path = chunk_dir.join(format!("{index:08}.chunk"));
            let bytes = std::fs::read(&frame_path)
                .map_err(|e| anyhow::anyhow!("missing chunk {index} at {}: {e}", frame_path.display()))?;
            let chunk = wire::decode_chunk(&bytes)?;
            match worker_assembler.process_chunk(&chunk) {
                Ok(progress) => {
                    worker_controller.report_progress(progress.bytes_written, total_bytes);
                    local_state.mark_received(chunk.index, chunk.data.len() as u64);
                }
                Err(ferry_core::error::Error::ChecksumMismatch { index }) => {
                    tracing::warn!(transfer_id = %id, index, "skipping chunk with bad checksum, retrying later");
                }
                Err(err) => {
                    worker_controller.fail(err.to_string());
                    return Err(err.into());
                }
            }

            index += 1;
            if index % flush_every == 0 {
                worker_resume.save(local_state.clone())?;
            }
        }
        worker_resume.save(local_state.clone())?;
        Ok(())
    })
    .await?;

    shutdown.abort();
    result?;

    if !assembler.is_complete(id)? {
        let missing = assembler.missing_chunks(id)?;
        controller.fail(format!("{} chunks missing", missing.len()));
        progress.abandon("incomplete");
        anyhow::bail!("transfer incomplete: {} chunks missing", missing.len());
    }

    let final_path = assembler.finalize(id, Some(metadata.sha256_hash))?;
    resume.remove(id).ok();
    controller.complete()?;
    progress.finish("received");
    println!("wrote {}", final_path.display());
    Ok(())
}

async fn run_resume(action: ResumeAction, config: &Config) -> anyhow::Result<()> {
    let handler = ResumeHandler::open(&config.state_dir)?;
    match action {
        ResumeAction::List => {
            let states = handler.list();
            if states.is_empty() {
                println!("no tracked transfers");
            }
            for state in states {
                println!(
                    "{}  {}  {}/{} chunks  {}",
                    state.id,
                    state.filename,
                    state.received_count(),
                    state.total_chunks,
                    format_bytes(state.bytes_written)
                );
            }
        }
        ResumeAction::Show { id } => {
            let id: TransferId = id.parse()?;
            let state = handler.load(id)?;
            println!("id             = {}", state.id);
            println!("filename       = {}", state.filename);
            println!("status         = {:?}", state.status);
            println!("received       = {}/{}", state.received_count(), state.total_chunks);
            println!("bytes_written  = {}", format_bytes(state.bytes_written));
            println!("missing_chunks = {:?}", state.missing_chunks());
        }
        ResumeAction::Compact => {
            handler.compact()?;
            println!("compacted {}", config.state_dir.display());
        }
    }
    Ok(())
}

/// Wait for an interrupt or terminate signal, then cancel `controller`.
/// Spawned as its own task and aborted once the transfer finishes on its
/// own; never errors, since a controller that is already terminal just
/// ignores the cancel.
async fn wait_for_shutdown(controller: Arc<TransferController>) {
    #[cfg(unix)]
    {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(_) => return,
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    let _ = controller.cancel();
}

/// Reject paths containing `..` components and canonicalize the rest, so a
/// crafted `--file` argument can't escape the directory the caller
/// intended.
fn sanitize_existing_path(path: &Path) -> anyhow::Result<PathBuf> {
    if path.components().any(|c| c.as_os_str() == "..") {
        anyhow::bail!("path traversal attempt detected: {}", path.display());
    }
    Ok(path.canonicalize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_dotdot() {
        assert!(sanitize_existing_path(Path::new("../etc/passwd")).is_err());
    }

    #[test]
    fn manifest_roundtrips_through_json() {
        let manifest = Manifest {
            id: TransferId::new_v4(),
            metadata: FileMetadata {
                filename: "a.bin".into(),
                file_size: 10,
                chunk_size: 4,
                total_chunks: 3,
                sha256_hash: [0u8; 32],
            },
        };
        let bytes = serde_json::to_vec(&manifest).unwrap();
        let decoded: Manifest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded.id, manifest.id);
        assert_eq!(decoded.metadata, manifest.metadata);
    }
}
