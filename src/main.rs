use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use sqlpy::connection::{ConnectionInfo, DEFAULT_PORT};
use sqlpy::index::PyPiClient;
use sqlpy::manager::{InstallOptions, InstallOutcome, SqlPackageManager};
use sqlpy::scope::Scope;
use sqlpy::sql::TdsClient;

/// sqlpy - Python package management for SQL Server
///
/// Install, remove and list Python packages inside a SQL Server Machine
/// Learning Services database, and run Python snippets in the SQL-hosted
/// runtime.
///
/// Connection settings can also come from the environment:
/// SQLPY_SERVER, SQLPY_DATABASE, SQLPY_USER, SQLPY_PASSWORD.
///
/// Examples:
///   sqlpy -s sqlhost -d AirlineTestDB install simplejson -v 3.0.3
#[derive(Parser, Debug)]
#[command(author, version = env!("SQLPY_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQL Server hostname
    #[arg(long, short = 's', env = "SQLPY_SERVER", global = true)]
    pub server: Option<String>,

    /// TCP port of the server
    #[arg(long, default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,

    /// Database to connect to
    #[arg(long, short = 'd', env = "SQLPY_DATABASE", global = true)]
    pub database: Option<String>,

    /// SQL login name
    #[arg(long, short = 'U', env = "SQLPY_USER", global = true)]
    pub user: Option<String>,

    /// SQL login password
    #[arg(
        long,
        short = 'P',
        env = "SQLPY_PASSWORD",
        hide_env_values = true,
        global = true
    )]
    pub password: Option<String>,

    /// Accept the server TLS certificate without validation
    #[arg(long, global = true)]
    pub trust_cert: bool,

    /// Package index API URL (defaults to https://pypi.org/pypi)
    #[arg(long, value_name = "URL", global = true)]
    pub index_url: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a package and its dependencies on the server
    Install(InstallArgs),

    /// Remove a package and its exclusively-owned dependencies
    Uninstall(UninstallArgs),

    /// List the packages installed on the server
    List,

    /// Run a Python snippet inside the SQL-hosted runtime
    Exec(ExecArgs),
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Distribution name on the package index
    pub package: String,

    /// Exact version to install (latest when omitted)
    #[arg(long, short = 'v')]
    pub version: Option<String>,

    /// Replace the package if it is already installed
    #[arg(long)]
    pub upgrade: bool,

    /// Install scope: private, or public/shared for all database users
    #[arg(long, default_value = "private")]
    pub scope: Scope,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    pub package: String,

    /// Scope to uninstall from
    #[arg(long, default_value = "private")]
    pub scope: Scope,
}

#[derive(clap::Args, Debug)]
pub struct ExecArgs {
    /// Inline Python source; assign `result` to return a value
    #[arg(conflicts_with = "file")]
    pub script: Option<String>,

    /// Read the Python source from a file instead
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
}

impl Cli {
    fn connection(&self) -> Result<ConnectionInfo> {
        let server = match &self.server {
            Some(server) => server,
            None => bail!("--server is required (or set SQLPY_SERVER)"),
        };
        let database = match &self.database {
            Some(database) => database,
            None => bail!("--database is required (or set SQLPY_DATABASE)"),
        };
        let user = match &self.user {
            Some(user) => user,
            None => bail!("--user is required (or set SQLPY_USER)"),
        };
        let password = match &self.password {
            Some(password) => password,
            None => bail!("--password is required (or set SQLPY_PASSWORD)"),
        };
        Ok(ConnectionInfo::new(server, database, user, password)
            .with_port(self.port)
            .with_trust_cert(self.trust_cert))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let client = TdsClient::connect(&cli.connection()?).await?;
    let index = PyPiClient::new(reqwest::Client::new(), cli.index_url.clone());
    let manager = SqlPackageManager::new(&client, &index);

    match &cli.command {
        Commands::Install(args) => {
            let options = InstallOptions {
                version: args.version.clone(),
                upgrade: args.upgrade,
                scope: args.scope,
            };
            match manager.install(&args.package, &options).await? {
                InstallOutcome::Installed { packages } => {
                    for package in packages {
                        println!(
                            "Installed {} {}",
                            package.name,
                            package.version.as_deref().unwrap_or("(unknown version)")
                        );
                    }
                }
                InstallOutcome::Upgraded { package, from, to } => {
                    println!("Upgraded {} {} -> {}", package, from, to);
                }
                InstallOutcome::AlreadyInstalled { package, version } => {
                    println!("{} {} is already installed; nothing to do", package, version);
                }
            }
        }
        Commands::Uninstall(args) => {
            for name in manager.uninstall(&args.package, args.scope).await? {
                println!("Removed {}", name);
            }
        }
        Commands::List => {
            for package in manager.installed_packages().await? {
                println!(
                    "{} {} ({})",
                    package.name,
                    package.version.as_deref().unwrap_or("-"),
                    package.scope
                );
            }
        }
        Commands::Exec(args) => {
            let body = match (&args.script, &args.file) {
                (Some(script), None) => script.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                _ => bail!("Provide either an inline script or --file"),
            };
            let value = manager
                .executor()
                .execute_script_in_sql(&body, &BTreeMap::new())
                .await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}
