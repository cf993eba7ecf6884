use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use storage_explorer::preferences::{JsonFilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
use storage_explorer::store::{HttpStore, MemoryStore};
use storage_explorer::{ExplorerConfig, ObjectStore, StorageExplorer};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "storage-explorer",
    about = "Browse and edit object storage buckets as folders"
)]
struct Cli {
    /// Project URL of the storage service
    #[arg(long, env = "STORAGE_URL", global = true)]
    url: Option<String>,
    /// API key sent with every request
    #[arg(long, env = "STORAGE_KEY", global = true, hide_env_values = true)]
    key: Option<String>,
    /// Use an in-process store seeded with a `demo` bucket instead of a server
    #[arg(long, global = true)]
    memory: bool,
    /// JSON file overriding the explorer configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// File to persist view and sort preferences in
    #[arg(long, global = true)]
    prefs: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List buckets
    Buckets,

    /// List a folder like ls
    Ls {
        #[arg(short = 'l', long = "long")]
        long: bool,
        bucket: String,
        #[arg(default_value = "")]
        path: String,
    },

    /// Upload local files into a folder
    Upload {
        bucket: String,
        dest: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete files or folders
    Rm {
        bucket: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Delete a folder and everything below it
    Rmdir { bucket: String, path: String },

    /// Create an empty folder
    Mkdir { bucket: String, path: String },

    /// Move files or folders into a folder
    Mv {
        bucket: String,
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },

    /// Rename a file or folder in place
    Rename {
        bucket: String,
        path: String,
        new_name: String,
    },

    /// Print a shareable URL for a file
    Url {
        bucket: String,
        path: String,
        /// Seconds; 0 uses the configured default
        #[arg(long, default_value_t = 0)]
        expires_in: u64,
    },

    /// Download a file or folder
    Get {
        bucket: String,
        path: String,
        #[arg(short = 'o', long = "out", default_value = ".")]
        out: PathBuf,
    },
}

async fn dispatch<S: ObjectStore>(explorer: StorageExplorer<S>, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Buckets => commands::buckets::run(&explorer).await,
        Commands::Ls { long, bucket, path } => commands::ls::run(&explorer, &bucket, &path, long).await,
        Commands::Upload {
            bucket,
            dest,
            files,
        } => commands::upload::run(&explorer, &bucket, &dest, &files).await,
        Commands::Rm { bucket, paths } => commands::rm::run(&explorer, &bucket, &paths).await,
        Commands::Rmdir { bucket, path } => commands::rm::run_dir(&explorer, &bucket, &path).await,
        Commands::Mkdir { bucket, path } => commands::mkdir::run(&explorer, &bucket, &path).await,
        Commands::Mv { bucket, mut paths } => {
            let dest = paths.pop().unwrap_or_default();
            commands::mv::run(&explorer, &bucket, &paths, &dest).await
        }
        Commands::Rename {
            bucket,
            path,
            new_name,
        } => commands::mv::rename(&explorer, &bucket, &path, &new_name).await,
        Commands::Url {
            bucket,
            path,
            expires_in,
        } => commands::get::url(&explorer, &bucket, &path, expires_in).await,
        Commands::Get { bucket, path, out } => commands::get::run(&explorer, &bucket, &path, &out).await,
    }
}

fn demo_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_bucket("demo", false);
    store.put_object("demo", "readme.md", b"# demo bucket\n");
    store.put_object("demo", "docs/guide.md", b"# guide\n");
    store.put_object("demo", "images/.emptyFolderPlaceholder", b"");
    store
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ExplorerConfig::from_file(path)?,
        None => ExplorerConfig::default(),
    }
    .with_env()?;
    let prefs: Arc<dyn PreferenceStore + Send + Sync> = match &cli.prefs {
        Some(path) => Arc::new(JsonFilePreferenceStore::new(path)),
        None => Arc::new(MemoryPreferenceStore::default()),
    };

    if cli.memory {
        return dispatch(StorageExplorer::new(demo_store(), config, prefs), cli.cmd).await;
    }
    let (Some(url), Some(key)) = (&cli.url, &cli.key) else {
        bail!("--url and --key (or STORAGE_URL and STORAGE_KEY) are required without --memory");
    };
    let store = HttpStore::new(url, key)?;
    dispatch(StorageExplorer::new(store, config, prefs), cli.cmd).await
}

mod commands;
mod common;
