//! jirest - Command line client for the Jira REST API
//!
//! Loads, edits and saves issues through the change-tracking object model,
//! so only modified fields are ever sent back.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;

#[derive(Parser)]
#[command(name = "jirest")]
#[command(about = "Command line client for the Jira REST API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// REST API root, e.g. https://jira.example.com/rest/api/2
    #[arg(long, global = true, env = "JIREST_URL")]
    url: Option<String>,

    /// Basic auth user
    #[arg(long, global = true, env = "JIREST_USER")]
    user: Option<String>,

    /// Basic auth password or API token
    #[arg(long, global = true, env = "JIREST_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show issue details
    Show {
        /// Issue key or id
        key: String,

        /// Print a single field, as a dotted path (e.g. "fields.status.name")
        #[arg(short, long)]
        field: Option<String>,
    },

    /// Create a new issue
    Create {
        /// Issue summary
        summary: String,

        /// Project key (defaults to default_project from the config)
        #[arg(short, long)]
        project: Option<String>,

        /// Issue type name
        #[arg(short = 't', long = "type", default_value = "Task")]
        issue_type: String,

        /// Description
        #[arg(short, long)]
        description: Option<String>,

        /// Parent issue key (creates a sub-task)
        #[arg(long)]
        parent: Option<String>,
    },

    /// Update fields of an issue
    Update {
        /// Issue key or id
        key: String,

        /// Field assignment PATH=VALUE; VALUE is read as JSON when it parses
        #[arg(short, long = "set", value_name = "PATH=VALUE", required = true)]
        set: Vec<String>,
    },

    /// Search issues with JQL
    Search {
        /// JQL query
        jql: String,

        /// Fetch every page
        #[arg(short, long)]
        all: bool,

        /// Maximum number of issues to show
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// Add a comment to an issue
    Comment {
        /// Issue key or id
        key: String,

        /// Comment text
        text: String,
    },

    /// List the transitions available for an issue
    Transitions {
        /// Issue key or id
        key: String,
    },

    /// Move an issue through a workflow transition
    Transition {
        /// Issue key or id
        key: String,

        /// Transition id
        id: String,

        /// Comment added with the transition
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// List the sub-tasks of an issue
    Subtasks {
        /// Issue key or id
        key: String,
    },

    /// Show or create the configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Write a commented default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file location
    Path,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("JIREST_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "jirest=debug,warn"
        } else {
            "jirest=warn"
        })
    });

    let format = env::var("JIREST_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let overrides = commands::Overrides {
        config: cli.config,
        url: cli.url,
        user: cli.user,
        password: cli.password,
    };
    let json = cli.json;

    let ctx = || commands::Context::new(&overrides);

    match cli.command {
        Commands::Show { key, field } => commands::show(&ctx()?, &key, field.as_deref(), json),
        Commands::Create {
            summary,
            project,
            issue_type,
            description,
            parent,
        } => commands::create(
            &ctx()?,
            &summary,
            project,
            &issue_type,
            description,
            parent,
            json,
        ),
        Commands::Update { key, set } => commands::update(&ctx()?, &key, &set, json),
        Commands::Search { jql, all, limit } => commands::search(&ctx()?, &jql, all, limit, json),
        Commands::Comment { key, text } => commands::comment(&ctx()?, &key, &text, json),
        Commands::Transitions { key } => commands::transitions(&ctx()?, &key, json),
        Commands::Transition { key, id, comment } => {
            commands::transition(&ctx()?, &key, &id, comment, json)
        }
        Commands::Subtasks { key } => commands::subtasks(&ctx()?, &key, json),
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => commands::config_show(&overrides, json),
            Some(ConfigCommands::Init { force }) => commands::config_init(&overrides, force),
            Some(ConfigCommands::Path) => commands::config_path(&overrides),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_requires_assignments() {
        assert!(Cli::try_parse_from(["jirest", "update", "PRJ-1"]).is_err());

        let cli = Cli::try_parse_from(["jirest", "update", "PRJ-1", "--set", "fields.summary=x", "-s", "a=1"])
            .unwrap();
        match cli.command {
            Commands::Update { key, set } => {
                assert_eq!(key, "PRJ-1");
                assert_eq!(set, vec!["fields.summary=x", "a=1"]);
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["jirest", "search", "project = PRJ", "--all", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Search { all: true, limit: None, .. }));
    }
}
