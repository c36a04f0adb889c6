use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use revhash::corpus::CorpusStore;
use revhash::engine::{validate_plaintext, EngineConfig, EngineError, HashEngine};
use revhash::output;
use revhash::server::{self, IndexClient};
use revhash::utils::{digest, AppConfig, Digest};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(name = "revhash")]
#[command(about = "Reverse MD5 dictionary lookup engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Corpus word list (overrides config)
    #[arg(short, long, global = true)]
    corpus: Option<PathBuf>,

    /// Config file (defaults to the app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server socket (overrides config)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Never use a running daemon
    #[arg(long, global = true)]
    no_daemon: bool,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors and hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the corpus, empty or from a seed word list
    Init {
        /// Word list to copy into the new corpus
        #[arg(long)]
        seed: Option<PathBuf>,

        /// Remember the corpus path in the config file
        #[arg(long)]
        save_config: bool,
    },
    /// Print the MD5 digest of each word
    Hash {
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Resolve digests to plaintexts
    Lookup {
        /// Hex digests (case-insensitive)
        #[arg(required = true)]
        digests: Vec<String>,
    },
    /// Append plaintexts to the corpus
    Add {
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Build the index and show corpus statistics
    Stats,
    /// Run the index server in the foreground (Ctrl+C to stop)
    Serve,
    /// Check server status
    Status,
    /// Ask the server to rebuild its index from the corpus
    Reload,
    /// Stop the running server
    Stop,
}

/// Settings resolved from config file and flags
struct Settings {
    config: AppConfig,
    corpus_path: PathBuf,
    socket_path: PathBuf,
    use_daemon: bool,
    json: bool,
    color: bool,
    progress: bool,
}

impl Settings {
    fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => AppConfig::load_from(path)?,
            None => AppConfig::load()?,
        };
        if let Some(corpus) = &cli.corpus {
            config.corpus_path = Some(corpus.clone());
        }

        let corpus_path = config.resolve_corpus_path()?;
        let socket_path = cli
            .socket
            .clone()
            .or_else(|| config.socket_path.clone())
            .unwrap_or_else(server::get_socket_path);

        Ok(Self {
            config,
            corpus_path,
            socket_path,
            use_daemon: !cli.no_daemon,
            json: cli.json,
            color: !cli.no_color,
            progress: !cli.quiet,
        })
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig::from_app_config(&self.config).with_progress(self.progress)
    }

    /// Connect to the daemon serving this corpus, if any
    fn client(&self) -> Option<IndexClient> {
        if !self.use_daemon {
            return None;
        }
        let mut client = IndexClient::connect(&self.socket_path)?;
        let status = client.status().ok()?;
        if same_file(&status.engine.corpus_path, &self.corpus_path) {
            Some(client)
        } else {
            tracing::debug!(
                served = %status.engine.corpus_path.display(),
                "daemon serves another corpus, using it directly"
            );
            None
        }
    }

    fn open_engine(&self) -> Result<HashEngine> {
        HashEngine::open(&self.corpus_path, self.engine_config())
            .with_context(|| format!("Failed to load corpus {}", self.corpus_path.display()))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn init_logging(verbose: u8, quiet: bool, floor: Level) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => floor,
            1 => Level::INFO.max(floor),
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let floor = if matches!(cli.command, Commands::Serve) {
        Level::INFO
    } else {
        Level::WARN
    };
    init_logging(cli.verbose, cli.quiet, floor);

    let settings = Settings::resolve(&cli)?;

    match cli.command {
        Commands::Init { seed, save_config } => {
            let config_path = save_config.then(|| cli.config.clone());
            init_corpus(&settings, seed.as_deref(), config_path)
        }
        Commands::Hash { words } => hash_words(&settings, &words),
        Commands::Lookup { digests } => lookup_digests(&settings, &digests),
        Commands::Add { words } => add_words(&settings, &words),
        Commands::Stats => show_stats(&settings),
        Commands::Serve => serve(&settings),
        Commands::Status => show_status(&settings),
        Commands::Reload => reload(&settings),
        Commands::Stop => stop(&settings),
    }
}

/// `save_config` is `Some(target)` when the corpus path should be persisted;
/// a `None` target means the default config file.
fn init_corpus(
    settings: &Settings,
    seed: Option<&Path>,
    save_config: Option<Option<PathBuf>>,
) -> Result<ExitCode> {
    let store = CorpusStore::create(&settings.corpus_path, seed)
        .with_context(|| format!("Failed to create corpus {}", settings.corpus_path.display()))?;

    println!(
        "Created corpus {} ({} lines)",
        store.path().display(),
        store.line_count()
    );

    if let Some(target) = save_config {
        let mut config = settings.config.clone();
        config.corpus_path = Some(
            settings
                .corpus_path
                .canonicalize()
                .unwrap_or_else(|_| settings.corpus_path.clone()),
        );
        match target {
            Some(path) => config.save_to(&path)?,
            None => config.save()?,
        }
        println!("Saved corpus path to config");
    }

    Ok(ExitCode::SUCCESS)
}

fn hash_words(settings: &Settings, words: &[String]) -> Result<ExitCode> {
    for word in words {
        let d = digest(word.as_bytes());
        if settings.json {
            println!("{}", json!({ "plaintext": word, "digest": d }));
        } else {
            output::print_lookup(&d.to_hex(), Some(word.as_str()), settings.color)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Exit code 1 when any digest is unknown, 2 when any input is malformed
fn lookup_digests(settings: &Settings, digests: &[String]) -> Result<ExitCode> {
    let mut missing = false;
    let mut malformed = false;

    let mut report = |input: &str, result: std::result::Result<(String, Option<String>), String>| -> Result<()> {
        match result {
            Ok((hex, plaintext)) => {
                missing |= plaintext.is_none();
                if settings.json {
                    println!("{}", json!({ "digest": hex, "plaintext": plaintext }));
                } else {
                    output::print_lookup(&hex, plaintext.as_deref(), settings.color)?;
                }
            }
            Err(message) => {
                malformed = true;
                if settings.json {
                    println!("{}", json!({ "input": input, "error": "MalformedDigest", "message": message }));
                } else {
                    eprintln!("{}: {}", input, message);
                }
            }
        }
        Ok(())
    };

    if let Some(mut client) = settings.client() {
        for input in digests {
            let result = match client.lookup(input) {
                Ok(found) => Ok((found.digest, found.plaintext)),
                Err(e) if e.kind() == Some(revhash::engine::ErrorKind::MalformedDigest) => {
                    Err(e.to_string())
                }
                Err(e) => return Err(e).context("Lookup via daemon failed"),
            };
            report(input, result)?;
        }
    } else {
        // Validate before paying for an index build
        let parsed: Vec<(&String, std::result::Result<Digest, EngineError>)> =
            digests.iter().map(|d| (d, Digest::from_hex(d))).collect();
        let engine = if parsed.iter().any(|(_, r)| r.is_ok()) {
            Some(settings.open_engine()?)
        } else {
            None
        };

        for (input, result) in parsed {
            let result = match (result, &engine) {
                (Ok(d), Some(engine)) => Ok((d.to_hex(), engine.lookup(&d))),
                (Ok(d), None) => Ok((d.to_hex(), None)),
                (Err(e), _) => Err(e.to_string()),
            };
            report(input, result)?;
        }
    }

    let code = if malformed {
        ExitCode::from(2)
    } else if missing {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    };
    Ok(code)
}

fn add_words(settings: &Settings, words: &[String]) -> Result<ExitCode> {
    if let Some(mut client) = settings.client() {
        for word in words {
            let ingested = client
                .ingest(word)
                .with_context(|| format!("Failed to add {:?}", word))?;
            if settings.json {
                println!("{}", serde_json::to_string(&ingested)?);
            } else {
                output::print_ingested(&ingested.digest, word.trim(), Some(ingested.update), settings.color)?;
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    // No daemon: append straight to the corpus. The next index build picks
    // the words up, so there is no need to build one here.
    let mut store = CorpusStore::open(&settings.corpus_path)
        .with_context(|| format!("Failed to open corpus {}", settings.corpus_path.display()))?;
    store.set_sync_on_append(settings.config.sync_on_append);

    for word in words {
        let plaintext = validate_plaintext(word).with_context(|| format!("Rejected {:?}", word))?;
        let position = store.append(plaintext)?;
        let d = digest(plaintext.as_bytes());
        if settings.json {
            println!("{}", json!({ "digest": d, "line": position.line }));
        } else {
            output::print_ingested(&d.to_hex(), plaintext, None, settings.color)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn show_stats(settings: &Settings) -> Result<ExitCode> {
    if let Some(mut client) = settings.client() {
        let status = client.status()?;
        if settings.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            output::print_engine_stats(&status.engine);
            output::print_build_stats(&status.engine.last_build);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let engine = settings.open_engine()?;
    let stats = engine.stats();
    if settings.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        output::print_engine_stats(&stats);
        output::print_build_stats(&stats.last_build);
    }
    Ok(ExitCode::SUCCESS)
}

fn serve(settings: &Settings) -> Result<ExitCode> {
    if server::is_daemon_running(&settings.socket_path) {
        println!("Server is already running. Stop it first with 'revhash stop'");
        return Ok(ExitCode::FAILURE);
    }

    let engine = settings.open_engine()?;
    println!(
        "Serving {} entries on {} (Ctrl+C to stop)",
        engine.len(),
        settings.socket_path.display()
    );
    server::daemon::run_foreground(engine, settings.socket_path.clone())?;
    Ok(ExitCode::SUCCESS)
}

fn show_status(settings: &Settings) -> Result<ExitCode> {
    if !server::is_daemon_running(&settings.socket_path) {
        println!("Server is not running");
        return Ok(ExitCode::FAILURE);
    }

    let Some(mut client) = IndexClient::connect(&settings.socket_path) else {
        println!("Server is running but not responding");
        return Ok(ExitCode::FAILURE);
    };

    let status = client.status()?;
    if settings.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("revhash server status:");
        println!("  Requests served: {}", status.requests_served);
        println!("  Connections: {}", status.connections);
        output::print_engine_stats(&status.engine);
    }
    Ok(ExitCode::SUCCESS)
}

fn reload(settings: &Settings) -> Result<ExitCode> {
    let mut client = IndexClient::connect_required(&settings.socket_path)
        .context("Start the server with 'revhash serve'")?;
    let stats = client.reload()?;
    if settings.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        output::print_build_stats(&stats);
    }
    Ok(ExitCode::SUCCESS)
}

fn stop(settings: &Settings) -> Result<ExitCode> {
    match IndexClient::connect(&settings.socket_path) {
        Some(mut client) => {
            client.shutdown()?;
            println!("Server stopped");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("Server is not running");
            Ok(ExitCode::FAILURE)
        }
    }
}
