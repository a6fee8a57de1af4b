use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tagview::config::{self, LogFormat, LogLevel, ViewerConfig};
use tagview::derivative::{DISPLAY_CACHE_DIR, DerivativeCache, Profile, THUMB_CACHE_DIR};
use tagview::imaging;
use tagview::sandbox::DatasetRoot;
use tagview::scan::{IndexOptions, IndexSource};
use tagview::serve::Viewer;
use tagview::server;
use tagview::store::{self, ItemStore, Population};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Flags shared by every command that opens a dataset.
#[derive(clap::Args, Clone)]
struct DatasetArgs {
    /// Dataset root directory
    #[arg(long)]
    root: PathBuf,

    /// Newline-delimited JSON manifest (default: looked up in the root)
    #[arg(long)]
    index: Option<PathBuf>,

    /// Config file (default: viewer.toml in the root, if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Thumbnail longer edge in pixels (clamped to 128-4096)
    #[arg(long)]
    thumb_size: Option<u32>,

    /// Display longer edge in pixels (clamped to 640-8192)
    #[arg(long)]
    display_size: Option<u32>,

    /// Thumbnail JPEG quality (clamped to 40-95)
    #[arg(long)]
    thumb_quality: Option<u32>,

    /// Display JPEG quality (clamped to 40-95)
    #[arg(long)]
    display_quality: Option<u32>,

    /// Serve originals only; never create derivatives
    #[arg(long)]
    no_derivatives: bool,
}

#[derive(clap::Args, Clone)]
struct ServeArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    /// Listen host (default 127.0.0.1)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (default 8188)
    #[arg(long)]
    port: Option<u16>,

    /// Create all derivatives before indexing
    #[arg(long)]
    prebuild: bool,

    /// Directory of front-end assets served for any other path
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "tagview")]
#[command(about = "Browse a captioned, tagged image dataset over HTTP")]
#[command(long_about = "\
Browse a captioned, tagged image dataset over HTTP

Items come from a newline-delimited JSON manifest when one is found, otherwise
from a recursive scan of the dataset root:

  dataset/
  ├── viewer.toml                  # Optional config
  ├── dataset_index_fixed.jsonl    # Optional manifest (also looked up in ..)
  ├── cats/
  │   ├── 001.png
  │   ├── 001.png.caption.txt      # Side-car caption
  │   └── 001.png.json             # Side-car tags (tag_string_* fields)
  ├── .thumbs/                     # Thumbnail cache, created on demand
  └── .display/                    # Display-size cache, created on demand

Run 'tagview gen-config' to generate a documented viewer.toml.")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the dataset and serve it
    Serve(ServeArgs),
    /// Create all derivatives, then exit
    Prebuild(DatasetArgs),
    /// Print a stock viewer.toml with all options documented
    GenConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Prebuild(args) => {
            let (root, config) = open_dataset(&args)?;
            init_logging(config.logging.level, config.logging.format, cli.verbose)?;
            init_thread_pool(&config.processing);

            let Some(cache) = derivative_cache(&root, &config) else {
                warn!("derivatives are disabled, nothing to prebuild");
                return Ok(());
            };
            let stats = cache.prebuild();
            println!("Prebuild done. {}", stats);
        }
        Command::Serve(args) => {
            let (root, mut config) = open_dataset(&args.dataset)?;
            if let Some(host) = args.host {
                config.server.host = host;
            }
            if let Some(port) = args.port {
                config.server.port = port;
            }
            config.validate()?;
            init_logging(config.logging.level, config.logging.format, cli.verbose)?;
            init_thread_pool(&config.processing);

            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(serve(
                root,
                config,
                args.dataset.index,
                args.prebuild,
                args.static_dir,
            ))?;
        }
    }

    Ok(())
}

/// Open the root (the one fatal check) and resolve the layered config.
fn open_dataset(args: &DatasetArgs) -> Result<(DatasetRoot, ViewerConfig)> {
    let root = DatasetRoot::open(&args.root)
        .with_context(|| format!("Cannot open dataset root {}", args.root.display()))?;
    let mut config = config::load_config(args.config.as_deref(), root.path())
        .context("Invalid configuration")?;

    if let Some(size) = args.thumb_size {
        config.thumbs.max_dimension = size;
    }
    if let Some(size) = args.display_size {
        config.display.max_dimension = size;
    }
    if let Some(quality) = args.thumb_quality {
        config.thumbs.quality = quality;
    }
    if let Some(quality) = args.display_quality {
        config.display.quality = quality;
    }
    if args.no_derivatives {
        config.derivatives.enabled = false;
    }
    config.clamp_profiles();
    Ok((root, config))
}

fn derivative_cache(root: &DatasetRoot, config: &ViewerConfig) -> Option<Arc<DerivativeCache>> {
    if !config.derivatives.enabled {
        return None;
    }
    let backend = imaging::default_backend();
    if !backend.is_available() {
        warn!("built without image support, derivatives fall back to originals");
    }
    Some(Arc::new(DerivativeCache::new(
        root.clone(),
        Profile::thumb(&config.thumbs),
        Profile::display(&config.display),
        backend,
    )))
}

async fn serve(
    root: DatasetRoot,
    config: ViewerConfig,
    index: Option<PathBuf>,
    prebuild: bool,
    static_dir: Option<PathBuf>,
) -> Result<()> {
    let listener = server::bind(&config.server.host, config.server.port).await?;
    let url = server::local_url(&listener)?;

    let cache = derivative_cache(&root, &config);
    let store = Arc::new(ItemStore::new());
    let job = Population {
        source: IndexSource::discover(
            &root,
            index.as_deref(),
            &config.index.manifest,
            config.index.parent_fallback,
        ),
        options: IndexOptions {
            progress_interval: config.index.progress_interval,
            skip_dirs: vec![THUMB_CACHE_DIR.to_string(), DISPLAY_CACHE_DIR.to_string()],
        },
        cache: cache.clone(),
        prebuild,
    };
    store::spawn_population(store.clone(), root.clone(), job)
        .context("Failed to start indexer thread")?;

    println!("Serving viewer at {}", url);
    println!("Dataset root: {}", root.path().display());

    let viewer = Arc::new(Viewer::new(root, store, cache));
    let app = server::create_router(viewer, static_dir.as_deref());
    server::run(listener, app, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl-C received, shutting down");
    }
}

fn init_logging(level: LogLevel, format: LogFormat, verbose: u8) -> Result<()> {
    let level = match level.raised(verbose) {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false);
    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
