//! leasedesk: review LOI and lease clauses from the terminal

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::App;
use config::Config;
use lease_api::AuthPurpose;
use review_core::{Panel, RollbackPolicy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "leasedesk=info,lease_api=warn,review_core=warn";

#[derive(Parser, Debug)]
#[command(name = "leasedesk")]
#[command(version, about = "Review LOI and lease clauses against the lease backend")]
struct Cli {
    /// Config file (default: <config dir>/leasedesk/leasedesk.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as tenant or landlord
    #[arg(long, global = true)]
    panel: Option<Panel>,

    /// Backend base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// What to do with an optimistic change when its request fails
    #[arg(long, global = true)]
    rollback: Option<RollbackPolicy>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the stored access token
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// List draft documents
    Drafts,
    /// Show one clause in full
    Show { id: String, clause: String },
    /// Clause overview with counts and progress
    Review {
        id: String,
        /// Case-insensitive match on name or text
        #[arg(long)]
        search: Option<String>,
        /// pending, approved, rejected or need-review
        #[arg(long)]
        status: Option<String>,
    },
    /// Accept a clause (takes the AI suggestion when there is one)
    Accept { id: String, clause: String },
    /// Reject a clause
    Reject { id: String, clause: String },
    /// Comment on a clause
    Comment {
        id: String,
        clause: String,
        text: String,
        #[arg(long)]
        author: Option<String>,
    },
    /// Replace a clause's text
    Edit {
        id: String,
        clause: String,
        text: String,
    },
    /// Approve every clause of a document
    ApproveAll { id: String },
    /// Ask the assistant to redraft a clause
    Suggest {
        id: String,
        clause: String,
        #[arg(long, default_value = "Suggest a balanced revision of this clause")]
        prompt: String,
    },
    /// Download a document and render it as Markdown
    Export {
        id: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Delete a document
    Delete { id: String },
    /// Submit an LOI form (JSON file)
    Submit {
        form: PathBuf,
        /// Save as draft instead of submitting
        #[arg(long)]
        draft: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AuthAction {
    /// Store an access token
    Login {
        #[arg(long)]
        token: String,
    },
    /// Forget the token and any pending verification
    Logout,
    /// Remember an email awaiting a reset or sign-up code
    Verify {
        #[arg(long)]
        email: String,
        /// password-reset or signup
        #[arg(long, default_value = "password-reset")]
        purpose: AuthPurpose,
    },
    /// Show login state
    Status,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    // stdout carries command output; logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok())?;
    if let Some(panel) = cli.panel {
        config.review.panel = panel;
    }
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(policy) = cli.rollback {
        config.review.rollback = policy;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    tracing::debug!(
        api = %config.api.base_url,
        panel = %config.review.panel,
        "configuration loaded"
    );
    let app = App::new(config, cli.json)?;

    match cli.command {
        Command::Auth { action } => match action {
            AuthAction::Login { token } => app.login(&token),
            AuthAction::Logout => app.logout(),
            AuthAction::Verify { email, purpose } => app.start_verification(&email, purpose),
            AuthAction::Status => app.status(),
        },
        Command::Drafts => app.drafts().await,
        Command::Show { id, clause } => app.show(&id, &clause).await,
        Command::Review { id, search, status } => app.review(&id, search, status.as_deref()).await,
        Command::Accept { id, clause } => app.accept(&id, &clause).await,
        Command::Reject { id, clause } => app.reject(&id, &clause).await,
        Command::Comment {
            id,
            clause,
            text,
            author,
        } => app.comment(&id, &clause, &text, author.as_deref()).await,
        Command::Edit { id, clause, text } => app.edit(&id, &clause, &text).await,
        Command::ApproveAll { id } => app.approve_all(&id).await,
        Command::Suggest { id, clause, prompt } => app.suggest(&id, &clause, &prompt).await,
        Command::Export { id, out } => app.export(&id, out.as_deref()).await,
        Command::Delete { id } => app.delete(&id).await,
        Command::Submit { form, draft } => app.submit(&form, draft).await,
    }
}
