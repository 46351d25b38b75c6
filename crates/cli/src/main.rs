//! CloudVault command-line tool.
//!
//! Provides subcommands for splitting a file into upload chunks, merging and
//! verifying a chunk directory, resolving conflicting change records, and
//! generating / validating configuration files.
//!
//! A chunk directory holds `manifest.json` plus one `<index>.chunk` file per
//! chunk.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cloudvault_core::chunker::{Chunk, ChunkManifest, Chunker};
use cloudvault_core::config::VaultConfig;
use cloudvault_core::conflict::{ConflictResolver, Strategy};
use cloudvault_core::errors::{ChunkError, ConflictError};
use cloudvault_core::models::Change;

const MANIFEST_FILE: &str = "manifest.json";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// CloudVault command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "cloudvault",
    version,
    about = "Split, merge, and verify chunked uploads; resolve sync conflicts"
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a file into chunks plus a manifest.
    Split {
        /// File to split.
        file: PathBuf,

        /// Directory to write the chunks and manifest into.
        #[arg(long)]
        out_dir: PathBuf,

        /// Chunk size in bytes (overrides the config).
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Reassemble a chunk directory into the original file.
    Merge {
        /// Chunk directory produced by `split`.
        #[arg(long)]
        dir: PathBuf,

        /// Where to write the reassembled file.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Check every chunk in a directory against its manifest.
    Verify {
        /// Chunk directory produced by `split`.
        #[arg(long)]
        dir: PathBuf,
    },

    /// Resolve two conflicting change records.
    Resolve {
        /// JSON change record from the local device.
        #[arg(long)]
        local: PathBuf,

        /// JSON change record from the remote device.
        #[arg(long)]
        remote: PathBuf,

        /// File holding the local content.
        #[arg(long)]
        local_content: Option<PathBuf>,

        /// File holding the remote content.
        #[arg(long)]
        remote_content: Option<PathBuf>,

        /// File holding the common ancestor content.
        #[arg(long)]
        base: Option<PathBuf>,

        /// Strategy name (defaults to the configured one).
        #[arg(short, long)]
        strategy: Option<String>,

        /// Write the resolved content here.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./cloudvault.toml")]
        output: PathBuf,
    },

    /// Validate the configuration file given with `--config`.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command, cli.config.as_deref(), &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config_path: Option<&Path>, config: &VaultConfig) -> Result<()> {
    match command {
        Commands::Split {
            file,
            out_dir,
            chunk_size,
        } => {
            let manifest = cmd_split(config, &file, &out_dir, chunk_size)?;
            println!(
                "Split {} ({} bytes) into {} chunks in {}",
                file.display(),
                manifest.total_size,
                manifest.chunk_count(),
                out_dir.display()
            );
            Ok(())
        }
        Commands::Merge { dir, output } => {
            let bytes = cmd_merge(&dir, &output)?;
            println!("Wrote {} bytes to {}", bytes, output.display());
            Ok(())
        }
        Commands::Verify { dir } => cmd_verify(&dir),
        Commands::Resolve {
            local,
            remote,
            local_content,
            remote_content,
            base,
            strategy,
            output,
        } => {
            let inputs = ResolveInputs {
                local,
                remote,
                local_content,
                remote_content,
                base,
                strategy,
            };
            let mut resolved = cmd_resolve(config, &inputs)?;
            if let (Some(path), Some(content)) = (output.as_ref(), resolved.content.as_ref()) {
                std::fs::write(path, content)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            resolved.content = None;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
            Ok(())
        }
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => {
            let path = config_path.context("validate needs --config <PATH>")?;
            cmd_validate(path, config)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<VaultConfig> {
    match path {
        Some(path) => {
            VaultConfig::load_and_validate(path).context("failed to load configuration file")
        }
        None => Ok(VaultConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// Chunk directory helpers
// ---------------------------------------------------------------------------

fn chunk_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{index}.chunk"))
}

fn read_manifest(dir: &Path) -> Result<ChunkManifest> {
    let path = dir.join(MANIFEST_FILE);
    let file =
        File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// Load the chunks listed in `manifest`, skipping files that are absent.
///
/// Each chunk keeps the checksum and size recorded in the manifest, so
/// on-disk corruption shows up as a checksum mismatch.
fn read_chunks(dir: &Path, manifest: &ChunkManifest) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::with_capacity(manifest.chunks.len());
    for entry in &manifest.chunks {
        let path = chunk_path(dir, entry.index);
        if !path.exists() {
            debug!(index = entry.index, "chunk file absent");
            continue;
        }
        let data =
            std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        chunks.push(Chunk {
            index: entry.index,
            data,
            checksum: entry.checksum.clone(),
            size: entry.size,
        });
    }
    Ok(chunks)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_split(
    config: &VaultConfig,
    file: &Path,
    out_dir: &Path,
    chunk_size: Option<usize>,
) -> Result<ChunkManifest> {
    let chunker = match chunk_size {
        Some(size) => Chunker::new(size)?,
        None => Chunker::from_config(&config.chunking)?,
    };

    let input = File::open(file).with_context(|| format!("failed to open {}", file.display()))?;
    let chunks = chunker
        .split(BufReader::new(input))
        .context("failed to split input")?;
    let manifest = chunker.manifest(&chunks)?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    for chunk in &chunks {
        std::fs::write(chunk_path(out_dir, chunk.index), &chunk.data)
            .with_context(|| format!("failed to write chunk {}", chunk.index))?;
    }
    std::fs::write(
        out_dir.join(MANIFEST_FILE),
        serde_json::to_vec_pretty(&manifest)?,
    )
    .context("failed to write manifest")?;

    info!(chunks = chunks.len(), dir = %out_dir.display(), "wrote chunk directory");
    Ok(manifest)
}

/// Merge with the chunk size recorded in the manifest, not the configured one.
fn cmd_merge(dir: &Path, output: &Path) -> Result<usize> {
    let manifest = read_manifest(dir)?;
    let chunker = Chunker::new(manifest.chunk_size)?;
    let chunks = read_chunks(dir, &manifest)?;

    let data = chunker
        .merge_with_manifest(&chunks, &manifest)
        .context("chunk directory failed verification")?;
    std::fs::write(output, &data)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(data.len())
}

fn cmd_verify(dir: &Path) -> Result<()> {
    let manifest = read_manifest(dir)?;
    let chunks = read_chunks(dir, &manifest)?;
    let report = verify_report(&manifest, &chunks);

    println!("Verifying {} ({} chunks)", dir.display(), manifest.chunk_count());
    for (index, status) in &report {
        println!("  chunk {:>6}: {}", index, status);
    }

    let failures = report.iter().filter(|(_, s)| *s != "ok").count();
    if failures > 0 {
        anyhow::bail!("{} of {} chunks failed verification", failures, report.len());
    }

    // The whole-file checksum is only checked once every chunk is intact.
    Chunker::new(manifest.chunk_size)?
        .merge_with_manifest(&chunks, &manifest)
        .context("reassembled file failed verification")?;
    println!("All chunks verified.");
    Ok(())
}

/// Per-chunk status for every index in the manifest.
fn verify_report(manifest: &ChunkManifest, chunks: &[Chunk]) -> Vec<(u64, &'static str)> {
    manifest
        .chunks
        .iter()
        .map(|entry| {
            let status = match chunks.iter().find(|c| c.index == entry.index) {
                None => "missing",
                Some(chunk) => match manifest.check_chunk(chunk) {
                    Ok(()) => "ok",
                    Err(ChunkError::SizeMismatch { .. }) => "wrong size",
                    Err(_) => "corrupt",
                },
            };
            (entry.index, status)
        })
        .collect()
}

struct ResolveInputs {
    local: PathBuf,
    remote: PathBuf,
    local_content: Option<PathBuf>,
    remote_content: Option<PathBuf>,
    base: Option<PathBuf>,
    strategy: Option<String>,
}

fn read_change(path: &Path, content: Option<&Path>) -> Result<Change> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut change: Change = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse change record {}", path.display()))?;
    if let Some(content) = content {
        change.content = Some(
            std::fs::read(content)
                .with_context(|| format!("failed to read {}", content.display()))?,
        );
    }
    Ok(change)
}

fn cmd_resolve(config: &VaultConfig, inputs: &ResolveInputs) -> Result<Change> {
    let local = read_change(&inputs.local, inputs.local_content.as_deref())?;
    let remote = read_change(&inputs.remote, inputs.remote_content.as_deref())?;
    let base = inputs
        .base
        .as_ref()
        .map(|p| std::fs::read(p).with_context(|| format!("failed to read {}", p.display())))
        .transpose()?;

    let resolver = ConflictResolver::from_config(&config.conflict);
    let Some(conflict) = resolver.detect_conflict(&local, &remote) else {
        anyhow::bail!(
            "no conflict: '{}' and '{}' are different files",
            local.file_id,
            remote.file_id
        );
    };
    info!(id = %conflict.id, kind = %conflict.conflict_type, "resolving conflict");

    let strategy = inputs.strategy.as_deref().map(Strategy::from);
    match resolver.resolve_with_base(&local, &remote, base.as_deref(), strategy.as_ref()) {
        Ok(resolved) => Ok(resolved),
        Err(ConflictError::Unresolvable {
            file_id,
            detail,
            conflicted,
        }) => {
            if let Some(markers) = conflicted {
                eprintln!("{}", String::from_utf8_lossy(&markers));
            }
            anyhow::bail!("conflict on '{}' needs manual resolution: {}", file_id, detail)
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# CloudVault configuration

log_level = "info"

[chunking]
# Bytes per chunk (5 MiB).
chunk_size = 5242880
verify_on_merge = true

[conflict]
# local_wins | remote_wins | newest_wins | merge | <custom>
default_strategy = "newest_wins"
# higher_version | prefer_local | prefer_remote
tie_break = "higher_version"
line_merge = false
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!(
        "Validate with: cloudvault validate --config {}",
        output.display()
    );
    Ok(())
}

fn cmd_validate(path: &Path, config: &VaultConfig) -> Result<()> {
    // `config` was already loaded and validated from `path`.
    println!("Validating configuration: {}", path.display());
    println!("  [OK] TOML structure is valid");
    println!("  [OK] All values are valid");
    println!();
    println!("Configuration summary:");
    println!("  Log level        : {}", config.log_level);
    println!("  Chunk size       : {} bytes", config.chunking.chunk_size);
    println!("  Verify on merge  : {}", config.chunking.verify_on_merge);
    println!("  Default strategy : {}", config.conflict.default_strategy);
    println!("  Tie break        : {:?}", config.conflict.tie_break);
    println!("  Line merge       : {}", config.conflict.line_merge);

    let builtins = Strategy::builtins();
    let names: Vec<&str> = builtins.iter().map(Strategy::as_str).collect();
    println!("  Built-ins        : {}", names.join(", "));
    if !is_builtin(&config.conflict.default_strategy) {
        println!(
            "  [WARN] '{}' is not a built-in strategy; it must be registered at runtime",
            config.conflict.default_strategy
        );
    }
    Ok(())
}

fn is_builtin(name: &str) -> bool {
    Strategy::builtins().iter().any(|s| s.as_str() == name)
}
