//! fixdesk - Maintenance request tracker for residential facilities
//!
//! Data lives in .fixdesk/ next to the config and resident profiles.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "fixdesk")]
#[command(about = "Maintenance request tracker for residential facilities")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Act as this user (reporter, viewer or staff member)
    #[arg(long = "as", global = true, env = "FIXDESK_USER")]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new fixdesk workspace
    Init {
        /// Storage backend (jsonl, sqlite)
        #[arg(long, default_value = "jsonl")]
        storage: String,
    },

    /// Manage resident and staff profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Report a new issue as the --as user
    Report {
        /// What is wrong
        description: String,

        /// Category (Plumbing, Electrical, Cleaning, ...)
        #[arg(short, long, default_value = "General")]
        category: String,

        /// Priority (Low, Medium, High, ...)
        #[arg(short, long, default_value = "Medium")]
        priority: String,

        /// Visibility (public, private); config default when omitted
        #[arg(short, long)]
        visibility: Option<String>,

        /// Path to an attached photo
        #[arg(long)]
        image: Option<String>,
    },

    /// List issues visible to the --as user
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,

        /// Only issues reported by the --as user
        #[arg(long)]
        mine: bool,
    },

    /// Show issue details
    Show {
        /// Issue ID
        id: String,
    },

    /// Move an issue to a new status
    Status {
        /// Issue ID
        id: String,

        /// New status (Reported, Assigned, In Progress, Resolved, Closed)
        status: String,

        /// Assign to this staff member at the same time
        #[arg(long)]
        assign: Option<String>,
    },

    /// Assign an issue to a staff member
    Assign {
        /// Issue ID
        id: String,

        /// Staff member
        who: String,
    },

    /// Mark an issue as a duplicate of another
    Merge {
        /// Canonical issue
        parent: String,

        /// Issue to fold into the parent
        child: String,
    },

    /// List the reporters of issues merged into an issue
    Duplicates {
        /// Issue ID
        id: String,
    },

    /// Show the status history of an issue
    History {
        /// Issue ID
        id: String,
    },

    /// Check parent links for cycles and dangling references
    Check,

    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Add or replace a profile
    Add {
        /// Username
        username: String,

        /// Role (student, management)
        #[arg(short, long, default_value = "student")]
        role: String,

        #[arg(long)]
        hostel: Option<String>,

        #[arg(long)]
        block: Option<String>,

        #[arg(long)]
        room: Option<String>,
    },

    /// List profiles
    List,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Reset to default configuration
    Reset,
    /// Get a specific config value
    Get {
        /// Config key (e.g., "policy", "display.colors")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let user = cli.user.as_deref();

    match cli.command {
        Commands::Init { storage } => commands::init(&storage),
        Commands::Profile { command } => match command {
            ProfileCommands::Add {
                username,
                role,
                hostel,
                block,
                room,
            } => commands::profile_add(&username, &role, hostel, block, room, cli.json),
            ProfileCommands::List => commands::profile_list(cli.json),
        },
        Commands::Report {
            description,
            category,
            priority,
            visibility,
            image,
        } => commands::report(
            user,
            &description,
            &category,
            &priority,
            visibility,
            image,
            cli.json,
        ),
        Commands::List { status, mine } => commands::list(user, status, mine, cli.json),
        Commands::Show { id } => commands::show(user, &id, cli.json),
        Commands::Status { id, status, assign } => {
            commands::status(user, &id, &status, assign, cli.json)
        }
        Commands::Assign { id, who } => commands::assign(user, &id, &who, cli.json),
        Commands::Merge { parent, child } => commands::merge(user, &parent, &child, cli.json),
        Commands::Duplicates { id } => commands::duplicates(user, &id, cli.json),
        Commands::History { id } => commands::history(user, &id, cli.json),
        Commands::Check => commands::check(cli.json),
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) => commands::config_show(cli.json),
            Some(ConfigCommands::Reset) => commands::config_reset(),
            Some(ConfigCommands::Get { key }) => commands::config_get(&key, cli.json),
            Some(ConfigCommands::Set { key, value }) => commands::config_set(&key, &value),
            None => commands::config_show(cli.json),
        },
    }
}
