//! KaaS orchestrator CLI
//!
//! A command-line tool for provisioning applications, inspecting their
//! status and reading the watchdog's health history.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{apps, history};
use std::path::PathBuf;

/// KaaS orchestrator CLI
#[derive(Parser)]
#[command(name = "kaasctl")]
#[command(author, version, about = "CLI for the KaaS application orchestrator", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via KAAS_API_URL env var)
    #[arg(long, env = "KAAS_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or update an application from a JSON spec file
    Create {
        /// Path to the application spec
        #[arg(long, short = 'F')]
        file: PathBuf,

        /// Namespace, used when the spec does not name one
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Deploy the predefined database application
    DeployPredefined {
        /// Application name
        name: String,

        /// Expose through a LoadBalancer service
        #[arg(long)]
        external: bool,

        /// CPU request and limit (e.g. 250m)
        #[arg(long)]
        cpu: Option<String>,

        /// Memory request and limit (e.g. 512Mi)
        #[arg(long)]
        memory: Option<String>,

        /// Database user (generated when omitted)
        #[arg(long)]
        username: Option<String>,

        /// Database password (generated when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Target namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Show the status of one application
    Status {
        /// Application name
        app_name: String,

        /// Namespace to look in
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// List applications in a namespace
    List {
        /// Namespace to list
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Show probe history for monitored pods
    History {
        /// Pod name (shows all targets if not specified)
        name: Option<String>,
    },

    /// Manage local CLI settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the current settings
    Show,

    /// Update one or more settings
    Set {
        #[arg(long)]
        api_url: Option<String>,

        #[arg(long)]
        namespace: Option<String>,

        #[arg(long)]
        format: Option<output::OutputFormat>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| {
            settings
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::parse)
        })
        .unwrap_or_default();

    if let Commands::Config(config_cmd) = cli.command {
        match config_cmd {
            ConfigCommands::Show => output::print_json(&settings)?,
            ConfigCommands::Set {
                api_url,
                namespace,
                format,
            } => {
                if let Some(url) = api_url {
                    url::Url::parse(&url)?;
                    settings.api_url = Some(url);
                }
                if namespace.is_some() {
                    settings.default_namespace = namespace;
                }
                if let Some(format) = format {
                    settings.default_format = Some(
                        match format {
                            output::OutputFormat::Table => "table",
                            output::OutputFormat::Json => "json",
                        }
                        .to_string(),
                    );
                }
                let path = settings.save()?;
                output::print_success(&format!("Saved {}", path.display()));
            }
        }
        return Ok(());
    }

    // Initialize client
    let client = client::ApiClient::new(&settings.resolve_api_url(cli.api_url))?;

    // Execute command
    match cli.command {
        Commands::Create { file, namespace } => {
            apps::create_application(&client, &file, settings.resolve_namespace(namespace), format)
                .await?;
        }
        Commands::DeployPredefined {
            name,
            external,
            cpu,
            memory,
            username,
            password,
            namespace,
        } => {
            let args = apps::PredefinedArgs {
                name,
                external,
                cpu,
                memory,
                username,
                password,
                namespace: settings.resolve_namespace(namespace),
            };
            apps::deploy_predefined(&client, args, format).await?;
        }
        Commands::Status { app_name, namespace } => {
            apps::show_status(&client, &app_name, settings.resolve_namespace(namespace), format)
                .await?;
        }
        Commands::List { namespace } => {
            apps::list_applications(&client, settings.resolve_namespace(namespace), format).await?;
        }
        Commands::History { name } => {
            history::show_history(&client, name, format).await?;
        }
        Commands::Config(_) => {}
    }

    Ok(())
}
