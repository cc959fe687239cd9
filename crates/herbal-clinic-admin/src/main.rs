//! Configuration maintenance tool for the herbal clinic store.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use herbal_clinic_core::config::{self, ConfigUpdate, DatabaseConfig};
use herbal_clinic_core::Session;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "herbal-clinic-admin")]
#[command(about = "Maintain the herbal clinic database configuration")]
struct Cli {
    /// Configuration document (defaults to database_config.json beside the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current settings
    Show,
    /// Try to connect with the current settings
    Test,
    /// Change one or more settings
    Set {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        charset: Option<String>,
        /// Test the connection after saving
        #[arg(long, default_value_t = false)]
        test: bool,
    },
    /// Write a sample configuration document
    Sample {
        /// Overwrite an existing document
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(config::config_path);
    run(cli.command, &path)
}

fn run(command: Commands, path: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Show => {
            let config = load(path)?;
            print!("{}", render_settings(&config, path));
        }
        Commands::Test => {
            let config = load(path)?;
            test_connection(config, path)?;
        }
        Commands::Set {
            host,
            port,
            database,
            user,
            password,
            charset,
            test,
        } => {
            let update = ConfigUpdate {
                host,
                port,
                database,
                user,
                password,
                charset,
            };
            if update.is_empty() && !test {
                bail!("nothing to change; pass at least one setting");
            }
            let mut config = load(path)?;
            if !update.is_empty() {
                config.apply(update);
                config
                    .save(path)
                    .with_context(|| format!("saving {}", path.display()))?;
                tracing::info!(path = %path.display(), "configuration saved");
                print!("{}", render_settings(&config, path));
            }
            if test {
                test_connection(config, path)?;
            }
        }
        Commands::Sample { force } => {
            write_sample(path, force)?;
            println!("Sample configuration written to {}", path.display());
        }
    }
    Ok(())
}

fn load(path: &Path) -> anyhow::Result<DatabaseConfig> {
    DatabaseConfig::load_or_create(path).with_context(|| format!("loading {}", path.display()))
}

fn test_connection(config: DatabaseConfig, path: &Path) -> anyhow::Result<()> {
    let session = Session::new(config, &config::document_dir(path));
    match session.test_connection() {
        Ok(()) => {
            let info = session.connection_info();
            println!(
                "Connection OK: database {} on {}:{} as {}",
                info.database, info.host, info.port, info.user
            );
            Ok(())
        }
        Err(err) => bail!("{}", session.diagnose(&err)),
    }
}

fn write_sample(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; use --force to overwrite it",
            path.display()
        );
    }
    DatabaseConfig::default()
        .save(path)
        .with_context(|| format!("writing {}", path.display()))
}

fn render_settings(config: &DatabaseConfig, path: &Path) -> String {
    format!(
        "Configuration document: {}\n  host:     {}\n  port:     {}\n  database: {}\n  user:     {}\n  password: {}\n  charset:  {}\n",
        path.display(),
        config.host,
        config.port,
        config.database,
        config.user,
        config.masked_password(),
        config.charset,
    )
}
