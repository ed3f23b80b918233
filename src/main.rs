//! fmlkb - Fuzzy Markup Language knowledge base
//!
//! Command-line interface: import, export and serve fuzzy systems.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use fmlkb::codec::{self, CodecOptions};
use fmlkb::config::{FmlConfig, LogLevel, StoreBackend};
use fmlkb::server::{run_server, ServerConfig};
use fmlkb::KnowledgeBaseService;

#[derive(Parser)]
#[command(name = "fmlkb")]
#[command(version)]
#[command(about = "Fuzzy Markup Language knowledge base", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to the standard search path)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Keep systems in memory only
    #[arg(long, global = true, conflicts_with = "database")]
    memory: bool,

    /// Default missing weight, scale and complement attributes when parsing
    #[arg(long, global = true)]
    lenient: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the knowledge base over HTTP
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Store FML documents
    Import {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Write a stored system as FML
    Export {
        name: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored systems
    List,

    /// Delete one stored system, or all of them
    Delete {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,

        #[arg(long)]
        all: bool,
    },

    /// Parse FML documents without storing them
    Check {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Print the commented default configuration instead
        #[arg(long)]
        default: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(config.general.log_level);

    match cli.command {
        Command::Serve { port, host } => serve(config, port, host),
        Command::Import { files } => import(&config, &files),
        Command::Export { name, output } => export(&config, &name, output),
        Command::List => list(&config),
        Command::Delete { name, all } => delete(&config, name, all),
        Command::Check { files } => check(&config.codec, &files),
        Command::Config { default } => {
            if default {
                print!("{}", FmlConfig::default_config_content());
            } else {
                print!("{}", config.to_toml()?);
            }
            Ok(())
        }
    }
}

/// File and environment configuration with the command-line flags on top
fn load_config(cli: &Cli) -> Result<FmlConfig> {
    let mut config = match &cli.config {
        Some(path) => FmlConfig::load_explicit(path)?,
        None => FmlConfig::load()?,
    };

    if cli.verbose {
        config.general.log_level = LogLevel::Verbose;
    } else if cli.quiet {
        config.general.log_level = LogLevel::Quiet;
    }
    if cli.lenient {
        config.codec.strict_parse = false;
    }
    if cli.memory {
        config.store.backend = StoreBackend::Memory;
    } else if let Some(path) = &cli.database {
        config.store.backend = StoreBackend::Sqlite;
        config.store.database_path = Some(path.clone());
    }
    Ok(config)
}

fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.filter_directive()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn open_service(config: &FmlConfig) -> Result<KnowledgeBaseService> {
    KnowledgeBaseService::from_config(config).context("Failed to open the knowledge store")
}

fn serve(config: FmlConfig, port: Option<u16>, host: Option<String>) -> Result<()> {
    let mut server = ServerConfig::from(&config.server);
    if let Some(port) = port {
        server.port = port;
    }
    if let Some(host) = host {
        server = server.with_host(host);
    }
    let service = open_service(&config)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    runtime.block_on(run_server(service, server))?;
    Ok(())
}

fn import(config: &FmlConfig, files: &[PathBuf]) -> Result<()> {
    let mut service = open_service(config)?;
    let mut failed = 0;

    for path in files {
        match service.put_fml_file(path) {
            Ok(upload) => println!(
                "{}: stored '{}' ({} variables, {} terms, {} rules)",
                path.display(),
                upload.system,
                upload.stats.variables,
                upload.stats.terms,
                upload.stats.rules
            ),
            Err(e) => {
                error!(path = %path.display(), "{}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} files were not imported", failed, files.len());
    }
    Ok(())
}

fn export(config: &FmlConfig, name: &str, output: Option<PathBuf>) -> Result<()> {
    let service = open_service(config)?;
    let Some(fml) = service.fetch_fml(name)? else {
        bail!("no fuzzy system named '{}'", name);
    };

    match output {
        Some(path) => {
            fs::write(&path, &fml)
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
            info!(system = name, path = %path.display(), "exported");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(fml.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn list(config: &FmlConfig) -> Result<()> {
    let service = open_service(config)?;
    for name in service.list_systems()? {
        println!("{}", name);
    }
    Ok(())
}

fn delete(config: &FmlConfig, name: Option<String>, all: bool) -> Result<()> {
    let mut service = open_service(config)?;
    if all {
        let count = service.delete_all()?;
        println!("deleted {} systems", count);
        return Ok(());
    }

    let Some(name) = name else {
        bail!("name a system or pass --all");
    };
    if !service.delete_system(&name)? {
        bail!("no fuzzy system named '{}'", name);
    }
    println!("deleted '{}'", name);
    Ok(())
}

fn check(options: &CodecOptions, files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;

    for path in files {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        match codec::parse(&text, options) {
            Ok(system) => println!(
                "{}: ok '{}' ({} variables, {} terms, {} rules)",
                path.display(),
                system.name,
                system.knowledge_base.variables.len(),
                system.term_count(),
                system.rule_base.rules.len()
            ),
            Err(e) => {
                println!("{}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} files are not valid FML", failed, files.len());
    }
    Ok(())
}
