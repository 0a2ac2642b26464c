//! Orgtree CLI - manage users, groups, and their hierarchy

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use orgtree_core::api::{
    AssociateUserRequest, CreateGroupRequest, CreateUserRequest, HierarchyEntry, OrgApi,
};
use orgtree_core::config::Config;
use orgtree_core::infrastructure::hierarchy::SqliteHierarchyRepository;
use orgtree_core::{Error, ErrorResponse};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orgtree")]
#[command(author, version, about = "Closure-table organization hierarchy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Database file (overrides database.path)
    #[arg(long, global = true, env = "ORGTREE_DATABASE")]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage groups
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Inspect nodes and their relatives
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },

    /// Check the closure relation for inconsistencies
    Verify,

    /// Show node and closure counts
    Stats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user
    Create {
        /// Display name
        name: String,
        /// Email address (unique across all nodes)
        email: String,
    },
    /// Add a user to a group
    Join {
        /// User ID
        user_id: String,
        /// Group ID
        group_id: String,
    },
    /// List the groups a user belongs to, directly or transitively
    Orgs {
        /// User ID
        user_id: String,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// Create a group
    Create {
        /// Display name
        name: String,
        /// Parent group ID
        #[arg(short, long)]
        parent: Option<String>,
    },
}

#[derive(Subcommand)]
enum NodeAction {
    /// Show a node
    Show { id: String },
    /// List ancestors, nearest first
    Ancestors { id: String },
    /// List descendants, nearest first
    Descendants { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Print the config file path
    Path,
    /// Reset configuration to defaults
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(path) = &cli.database {
        config.database.path = Some(path.clone());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = cli.format;
    let result = match cli.command {
        Commands::Config { action } => return cmd_config(action, cli.quiet),
        command => run(command, &config, format, cli.quiet).await,
    };

    if let Err(err) = result {
        report_error(&err, format);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(
    command: Commands,
    config: &Config,
    format: OutputFormat,
    quiet: bool,
) -> orgtree_core::Result<()> {
    debug!(path = %config.database.resolved_path().display(), "Opening hierarchy database");
    let api = OrgApi::open(config).await?;

    match command {
        Commands::User { action } => cmd_user(&api, action, format, quiet).await,
        Commands::Group { action } => cmd_group(&api, action, format, quiet).await,
        Commands::Node { action } => cmd_node(&api, action, format).await,
        Commands::Verify => cmd_verify(&api, format).await,
        Commands::Stats => cmd_stats(&api, format).await,
        Commands::Config { .. } => Ok(()),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

type Api = OrgApi<SqliteHierarchyRepository>;

async fn cmd_user(
    api: &Api,
    action: UserAction,
    format: OutputFormat,
    quiet: bool,
) -> orgtree_core::Result<()> {
    match action {
        UserAction::Create { name, email } => {
            let user = api.create_user(CreateUserRequest::new(name, email)).await?;
            emit(format, &user, || {
                if quiet {
                    println!("{}", user.id);
                } else {
                    println!("User created: {} <{}>", user.name, user.email);
                    println!("  ID: {}", user.id);
                }
            })
        }
        UserAction::Join { user_id, group_id } => {
            let summary = api
                .associate_user_to_group(AssociateUserRequest::new(user_id, group_id))
                .await?;
            emit(format, &summary, || {
                if !quiet {
                    println!(
                        "User {} joined group {} ({} closure rows written)",
                        summary.user_id, summary.group_id, summary.edges_written
                    );
                }
            })
        }
        UserAction::Orgs { user_id } => {
            let orgs = api.get_user_organizations(&user_id).await?;
            emit(format, &orgs, || print_entries(&orgs, "No organizations."))
        }
    }
}

async fn cmd_group(
    api: &Api,
    action: GroupAction,
    format: OutputFormat,
    quiet: bool,
) -> orgtree_core::Result<()> {
    match action {
        GroupAction::Create { name, parent } => {
            let group = api.create_group(CreateGroupRequest::new(name, parent)).await?;
            emit(format, &group, || {
                if quiet {
                    println!("{}", group.id);
                } else {
                    println!("Group created: {}", group.name);
                    println!("  ID: {}", group.id);
                }
            })
        }
    }
}

async fn cmd_node(api: &Api, action: NodeAction, format: OutputFormat) -> orgtree_core::Result<()> {
    match action {
        NodeAction::Show { id } => {
            let node = api.get_node(&id).await?;
            emit(format, &node, || {
                println!("{}: {}", node.kind, node.name);
                println!("  ID: {}", node.id);
                if let Some(email) = &node.email {
                    println!("  Email: {}", email);
                }
                println!("  Created: {}", node.created_at);
                println!("  Updated: {}", node.updated_at);
            })
        }
        NodeAction::Ancestors { id } => {
            let ancestors = api.get_node_ancestors(&id).await?;
            emit(format, &ancestors, || print_entries(&ancestors, "No ancestors."))
        }
        NodeAction::Descendants { id } => {
            let descendants = api.get_node_descendants(&id).await?;
            emit(format, &descendants, || print_entries(&descendants, "No descendants."))
        }
    }
}

async fn cmd_verify(api: &Api, format: OutputFormat) -> orgtree_core::Result<()> {
    let report = api.verify().await?;
    emit(format, &report, || {
        println!(
            "Checked {} nodes and {} closure rows",
            report.nodes_checked, report.edges_checked
        );
        if report.consistent {
            println!("[OK] Closure relation is consistent");
        } else {
            println!("[!!] {} violations:", report.violations.len());
            for violation in &report.violations {
                println!("  - {}", violation.describe());
            }
        }
    })?;

    if report.consistent {
        Ok(())
    } else {
        Err(Error::Other(format!(
            "closure relation has {} violations",
            report.violations.len()
        )))
    }
}

async fn cmd_stats(api: &Api, format: OutputFormat) -> orgtree_core::Result<()> {
    let stats = api.stats().await?;
    emit(format, &stats, || {
        println!("Nodes: {} ({} users, {} groups)", stats.total_nodes, stats.users, stats.groups);
        println!("Closure rows: {}", stats.closure_edges);
        println!("Max depth: {}", stats.max_depth);
    })
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(),
) -> orgtree_core::Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| Error::Other(format!("Failed to serialize output: {}", e)))?;
            println!("{}", json);
        }
        OutputFormat::Text => text(),
    }
    Ok(())
}

fn print_entries(entries: &[HierarchyEntry], empty: &str) {
    if entries.is_empty() {
        println!("{}", empty);
        return;
    }
    for entry in entries {
        println!("  [{}] {} ({})", entry.depth, entry.name, entry.id);
    }
}

fn report_error(err: &Error, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let body = ErrorResponse::from(err);
            match serde_json::to_string_pretty(&body) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("Error [{}]: {}", err.code(), err),
            }
        }
        OutputFormat::Text => {
            eprintln!("Error [{}]: {}", err.code(), err);
            if let Some(suggestion) = err.suggestion() {
                eprintln!("  Try: {}", suggestion);
            }
        }
    }
}
