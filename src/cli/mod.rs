//! CLI mode - command-line driver for the offline cache manager.

mod progress;

use std::path::PathBuf;

use console::style;

use crate::{
    AppConfig, Cache, CacheStorage, DiskCacheStorage, HttpFetcher, OfflineCacheManager, Request,
    build_http_client, format_bytes, parse_url, resolve,
};

use progress::{BarProgress, make_entry_progress_bar, print_install, print_preload_summary};

type CliManager = OfflineCacheManager<DiskCacheStorage, HttpFetcher>;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Populate the core namespace.
    Install,
    /// Delete old namespaces.
    Activate,
    /// Warm the audio namespace.
    Preload,
    /// Answer one request through the manager.
    Fetch {
        /// Path relative to the origin.
        path: String,
        /// Treat the request as a navigation.
        navigate: bool,
    },
    /// List namespaces and entry counts.
    Status,
    /// Print the effective configuration.
    Config,
    /// Run the caching proxy.
    Serve,
    /// Print usage.
    Help,
}

/// Global options shared by every command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Configuration file to load.
    pub config: Option<PathBuf>,
    /// Overrides the application origin.
    pub origin: Option<String>,
    /// Overrides the cache directory.
    pub cache_dir: Option<PathBuf>,
}

/// Prints usage to stderr.
pub fn print_usage() {
    eprintln!("Usage: fitreport-offline [OPTIONS] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install             Cache the core files of the configured version");
    eprintln!("  activate            Delete caches from older versions");
    eprintln!("  preload             Cache every audio clip not yet cached");
    eprintln!("  fetch <path>        Request a path through the cache (--navigate for documents)");
    eprintln!("  status              List caches and their entry counts");
    eprintln!("  config              Print the effective configuration");
    eprintln!("  serve               Run the caching proxy");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <FILE>     Configuration file (default: $FITREPORT_CONFIG or ~/.config/fitreport-offline/config.toml)");
    eprintln!("  --origin <URL>      Report application origin");
    eprintln!("  --cache-dir <DIR>   Cache storage directory");
    eprintln!("  -h, --help          Show this help");
}

/// Parses command-line arguments (without the program name).
///
/// # Errors
///
/// Returns a message describing the first invalid argument.
pub fn parse_args(args: &[String]) -> std::result::Result<(Command, Options), String> {
    let mut options = Options::default();
    let mut positional = Vec::new();
    let mut navigate = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().ok_or("--config requires a value")?;
                options.config = Some(PathBuf::from(value));
            }
            "--origin" => {
                let value = iter.next().ok_or("--origin requires a value")?;
                options.origin = Some(value.clone());
            }
            "--cache-dir" => {
                let value = iter.next().ok_or("--cache-dir requires a value")?;
                options.cache_dir = Some(PathBuf::from(value));
            }
            "--navigate" => navigate = true,
            "-h" | "--help" => return Ok((Command::Help, options)),
            flag if flag.starts_with('-') => return Err(format!("Unknown option: {flag}")),
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        None => Command::Help,
        Some("install") => Command::Install,
        Some("activate") => Command::Activate,
        Some("preload") => Command::Preload,
        Some("fetch") => Command::Fetch {
            path: positional.next().ok_or("fetch requires a path")?,
            navigate,
        },
        Some("status") => Command::Status,
        Some("config") => Command::Config,
        Some("serve") => Command::Serve,
        Some(other) => return Err(format!("Unknown command: {other}")),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {extra}"));
    }
    Ok((command, options))
}

/// Loads configuration and applies command-line overrides.
///
/// # Errors
///
/// Returns an error if the configuration file cannot be read or parsed.
pub fn load_config(options: &Options) -> crate::Result<AppConfig> {
    let mut config = AppConfig::load(options.config.as_deref())?;
    if let Some(origin) = &options.origin {
        config.server.origin.clone_from(origin);
    }
    if let Some(cache_dir) = &options.cache_dir {
        config.paths.cache_dir.clone_from(cache_dir);
    }
    Ok(config)
}

async fn build_manager(config: &AppConfig) -> crate::Result<CliManager> {
    let origin = parse_url(&config.server.origin)?;
    let storage = DiskCacheStorage::new(&config.paths.cache_dir).await?;
    let fetcher = HttpFetcher::new(build_http_client()?, origin.clone());
    Ok(OfflineCacheManager::new(
        config.cache.clone(),
        origin,
        storage,
        fetcher,
    ))
}

/// Runs a parsed command.
///
/// # Errors
///
/// Returns an error if the command fails.
pub async fn run(command: Command, options: &Options) -> crate::Result<()> {
    if command == Command::Help {
        print_usage();
        return Ok(());
    }

    let config = load_config(options)?;
    match command {
        Command::Help => Ok(()),
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Serve => serve(&config).await,
        command => {
            let manager = build_manager(&config).await?;
            let result = run_with_manager(&manager, command).await;
            manager.settle().await;
            result
        }
    }
}

#[cfg(feature = "server")]
async fn serve(config: &AppConfig) -> crate::Result<()> {
    crate::server::run(config).await
}

#[cfg(not(feature = "server"))]
async fn serve(_config: &AppConfig) -> crate::Result<()> {
    eprintln!("Proxy support requires the 'server' feature");
    std::process::exit(1);
}

async fn run_with_manager(manager: &CliManager, command: Command) -> crate::Result<()> {
    match command {
        Command::Install => {
            let outcome = manager.install().await;
            print_install(&manager.config().core_cache_name, &outcome);
        }
        Command::Activate => {
            let deleted = manager.activate().await?;
            if deleted.is_empty() {
                println!("No old caches to delete.");
            }
            for name in deleted {
                println!("{} Deleted {name}", style("✓").green());
            }
        }
        Command::Preload => {
            let bar = make_entry_progress_bar(manager.config().audio_files.len() as u64);
            let progress = BarProgress::new(bar);
            let stats = manager.preload_audio(&progress).await?;
            progress.finish();
            print_preload_summary(&stats);
        }
        Command::Fetch { path, navigate } => {
            let url = resolve(manager.origin(), &path)?;
            let request = if navigate {
                Request::navigate(url)
            } else {
                Request::get(url)
            };
            let response = manager.handle_fetch(request).await?;
            println!(
                "{} {:?} {} {}",
                response.status,
                response.response_type,
                response.content_type().unwrap_or("-"),
                format_bytes(response.body.len() as u64)
            );
        }
        Command::Status => print_status(manager).await?,
        Command::Help | Command::Config | Command::Serve => {}
    }
    Ok(())
}

async fn print_status(manager: &CliManager) -> crate::Result<()> {
    let recognized = manager.config().recognized_names();
    let names = manager.storage().keys().await?;
    if names.is_empty() {
        println!("No caches.");
        return Ok(());
    }
    for name in names {
        let Some(cache) = manager.storage().lookup(&name).await? else {
            continue;
        };
        let entries = cache.keys().await?.len();
        let marker = if recognized.contains(&name.as_str()) {
            style("current").green()
        } else {
            style("stale").yellow()
        };
        println!("  {name:<28} {entries:>4} entries  {marker}");
    }
    Ok(())
}
