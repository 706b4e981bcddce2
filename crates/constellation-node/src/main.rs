//! Constellation - chunked peer-to-peer file transfer over TCP

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use constellation_core::{chunk, ChunkStore, OutboundDescriptor, PeerAddress};
use constellation_node::config::expand_path;
use constellation_node::{filelist, Catalog, Provider, Requester, Settings, TransferOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "constellation")]
#[command(about = "Chunked peer-to-peer file transfer", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "~/.constellation/config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Address to listen on (overrides config)
    #[arg(long, global = true, env = "LISTEN_HOST")]
    listen_host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(long, global = true, env = "LISTEN_PORT")]
    listen_port: Option<u16>,

    /// Chunk size in bytes (overrides config)
    #[arg(long, global = true, env = "CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// YAML list of files to download (overrides config)
    #[arg(long, global = true, env = "DOWNLOAD_FILES")]
    download_files: Option<String>,

    /// YAML list of files to share (overrides config)
    #[arg(long, global = true, env = "SHARE_FILES")]
    share_files: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download everything in the download list and serve the share list
    Run,

    /// Serve the share list only
    Serve,

    /// Download everything in the download list, then exit
    Fetch,

    /// Download a single file
    Get {
        /// Provider address as host:port
        #[arg(short, long, required = true)]
        peer: String,

        /// Content id the provider knows the file by
        #[arg(short, long, required = true)]
        id: String,

        /// Number of chunks to request
        #[arg(short, long, required = true)]
        chunks: u32,

        /// Destination path
        #[arg(short, long, required = true)]
        output: PathBuf,
    },

    /// Print a content id and chunk count for a local file
    Id {
        /// File to describe
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Show staging progress of the download list
    Status,

    /// Initialize configuration
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config_path = expand_path(&cli.config);
    let settings = || load_settings(&cli, &config_path);

    match &cli.command {
        Commands::Init => init_config(&config_path)?,
        Commands::Run => run(&settings()?).await?,
        Commands::Serve => serve(&settings()?).await?,
        Commands::Fetch => fetch(&settings()?).await?,
        Commands::Get {
            peer,
            id,
            chunks,
            output,
        } => get(&settings()?, peer, id, *chunks, output).await?,
        Commands::Id { file } => describe_file(&settings()?, file)?,
        Commands::Status => show_status(&settings()?)?,
    }

    Ok(())
}

fn load_settings(cli: &Cli, config_path: &Path) -> Result<Settings> {
    let mut settings = Settings::load_or_default(config_path)?;

    if let Some(host) = &cli.listen_host {
        settings.listen_host = host.clone();
    }
    if let Some(port) = cli.listen_port {
        settings.listen_port = port;
    }
    if let Some(chunk_size) = cli.chunk_size {
        settings.chunk_size = chunk_size;
    }
    if let Some(path) = &cli.download_files {
        settings.download_files = path.clone();
    }
    if let Some(path) = &cli.share_files {
        settings.share_files = path.clone();
    }

    settings.validate()?;
    Ok(settings)
}

fn requesters(settings: &Settings) -> Result<Vec<Requester>> {
    let options = TransferOptions::from(&settings.transfer);
    let downloads = filelist::load_downloads(&settings.download_files_path())?;

    Ok(downloads
        .into_iter()
        .map(|descriptor| Requester::new(descriptor, settings.chunk_size, options))
        .collect())
}

async fn provider(settings: &Settings) -> Result<(Provider, tokio::net::TcpListener)> {
    let shares = filelist::load_shares(&settings.share_files_path())?;
    let provider = Provider::new(Catalog::new(shares), settings.chunk_size);

    let address = settings.listen_address();
    let listener = Provider::bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;

    Ok((provider, listener))
}

async fn run(settings: &Settings) -> Result<()> {
    // Both lists are checked before anything starts
    let requesters = requesters(settings)?;
    let (provider, listener) = provider(settings).await?;

    tracing::info!("Starting {} download(s)", requesters.len());
    tokio::spawn(constellation_node::fetch_all(requesters));

    tokio::select! {
        result = provider.serve(listener) => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}

async fn serve(settings: &Settings) -> Result<()> {
    let (provider, listener) = provider(settings).await?;

    println!("Serving {} file(s). Press Ctrl+C to stop.", provider.catalog().len());
    for file in provider.catalog().iter() {
        println!("  - {} ({})", file.path.display(), file.content_id);
    }

    tokio::select! {
        result = provider.serve(listener) => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}

async fn fetch(settings: &Settings) -> Result<()> {
    let requesters = requesters(settings)?;
    if requesters.is_empty() {
        println!("Download list is empty.");
        return Ok(());
    }

    let results = constellation_node::fetch_all(requesters).await;
    let mut failed = 0;
    for (descriptor, result) in &results {
        match result {
            Ok(report) => println!(
                "Downloaded: {} ({} bytes)",
                descriptor.path.display(),
                report.bytes
            ),
            Err(e) => {
                failed += 1;
                println!("Failed: {} ({})", descriptor.path.display(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} download(s) failed", failed, results.len());
    }
    Ok(())
}

async fn get(
    settings: &Settings,
    peer: &str,
    content_id: &str,
    chunk_count: u32,
    output: &Path,
) -> Result<()> {
    let peer: PeerAddress = peer.parse()?;
    let descriptor = OutboundDescriptor::new(output, peer, content_id, chunk_count)?;
    let requester = Requester::new(
        descriptor,
        settings.chunk_size,
        TransferOptions::from(&settings.transfer),
    );

    println!("Downloading {} chunks from {}...", chunk_count, requester.descriptor().peer);
    let report = requester.fetch().await?;
    println!(
        "Downloaded successfully: {} ({} bytes)",
        output.display(),
        report.bytes
    );

    Ok(())
}

fn describe_file(settings: &Settings, path: &Path) -> Result<()> {
    let content_id = constellation_core::content_id_for_file(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let size = std::fs::metadata(path)?.len();

    println!("File: {}", path.display());
    println!("Content id: {}", content_id);
    println!("Size: {} bytes", size);
    println!(
        "Chunks: {} (chunk size {})",
        chunk::chunk_count(size, settings.chunk_size),
        settings.chunk_size
    );

    Ok(())
}

fn show_status(settings: &Settings) -> Result<()> {
    println!("Constellation v{}", env!("CARGO_PKG_VERSION"));
    println!("Listen address: {}", settings.listen_address());
    println!("Chunk size: {} bytes", settings.chunk_size);

    let path = settings.download_files_path();
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("file list not found: {}", path.display()))?;
    let entries: Vec<filelist::DownloadEntry> = filelist::parse_list(&content)?;

    if entries.is_empty() {
        println!("No downloads configured.");
        return Ok(());
    }

    println!();
    for entry in &entries {
        let progress = ChunkStore::for_destination(&entry.path).progress(entry.chunk_count);
        let state = if progress.staged.is_empty() {
            "not started or finished"
        } else if progress.is_complete() {
            "ready to merge"
        } else {
            "partial"
        };
        println!(
            "{} <- {} : {}/{} chunks staged ({:.0}%, {})",
            entry.path.display(),
            entry.peer,
            progress.staged.len(),
            entry.chunk_count,
            progress.progress(),
            state
        );
    }

    Ok(())
}

fn init_config(config_path: &Path) -> Result<()> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
        tracing::info!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        return Ok(());
    }

    let settings = Settings::default();
    let toml = toml::to_string_pretty(&settings)?;
    std::fs::write(config_path, toml)?;

    // Empty lists are valid lists
    for list in [settings.download_files_path(), settings.share_files_path()] {
        if !list.exists() {
            if let Some(parent) = list.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&list, "[]\n")?;
        }
    }

    println!("Initialized Constellation at: {}", config_path.display());

    Ok(())
}
