//! Command implementations for the `leasedesk` binary

use crate::config::Config;
use anyhow::{anyhow, bail, Context};
use lease_api::{render_markdown, AuthContext, AuthPurpose, LeaseClient, SessionStore};
use review_core::{
    ActionOutcome, DocumentWorkspace, Notice, NoticeLevel, Notifier, Projection, ReviewFilter,
    ReviewSession,
};
use serde::Serialize;
use shared_types::{Clause, ClauseKey, ClauseStatus, DocumentSummary, LoiForm, TemplateData};
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit status for an action that was skipped because it is already running
/// or was replaced by a newer one
pub const EXIT_NOT_APPLIED: u8 = 2;

/// Prints action feedback to stderr
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        let tag = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Error => "error",
        };
        eprintln!("[{}] {}", tag, notice.message);
    }
}

pub fn exit_status<T>(outcome: &ActionOutcome<T>) -> u8 {
    match outcome {
        ActionOutcome::Applied(_) => 0,
        ActionOutcome::Failed(_) => 1,
        ActionOutcome::Superseded | ActionOutcome::AlreadyRunning => EXIT_NOT_APPLIED,
    }
}

pub fn exit_code<T>(outcome: &ActionOutcome<T>) -> ExitCode {
    ExitCode::from(exit_status(outcome))
}

/// Find a clause by exact key, then by case-insensitive name
pub fn resolve_clause<'a>(clauses: &'a [Clause], needle: &str) -> anyhow::Result<&'a Clause> {
    if let Some(clause) = clauses.iter().find(|c| c.key.as_str() == needle) {
        return Ok(clause);
    }
    let matches: Vec<&Clause> = clauses
        .iter()
        .filter(|c| c.name.eq_ignore_ascii_case(needle.trim()))
        .collect();
    match matches.as_slice() {
        [one] => Ok(*one),
        [] => bail!("No clause named or keyed '{}'", needle),
        many => bail!(
            "'{}' matches {} clauses; use a key ({})",
            needle,
            many.len(),
            many.iter()
                .map(|c| c.key.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

pub fn parse_status(raw: &str) -> anyhow::Result<ClauseStatus> {
    ClauseStatus::parse(raw).ok_or_else(|| {
        anyhow!(
            "Unknown status '{}'; expected one of {}",
            raw,
            ClauseStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })
}

fn truncate(text: &str, width: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        return flat;
    }
    let mut out: String = flat.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

pub fn render_projection(projection: &Projection) -> String {
    let counts = &projection.counts;
    let mut out = format!(
        "{} clauses: {} approved, {} rejected, {} pending, {} need review ({:.0}% complete)\n",
        counts.total,
        counts.approved,
        counts.rejected,
        counts.pending,
        counts.need_review,
        projection.completion_percent
    );
    for row in &projection.rows {
        let marker = if row.pending { "*" } else { " " };
        let risk = if row.risk_label.is_empty() {
            String::new()
        } else {
            format!(" [{}]", row.risk_label)
        };
        out.push_str(&format!(
            "{}{:<14} {:<24} {}{}\n",
            marker,
            row.status.as_str(),
            truncate(&row.name, 24),
            truncate(&row.text, 60),
            risk
        ));
    }
    out
}

pub fn render_drafts(drafts: &[DocumentSummary]) -> String {
    if drafts.is_empty() {
        return "No drafts\n".to_string();
    }
    drafts
        .iter()
        .map(|d| {
            format!(
                "{:<26} {:<10} {}{}\n",
                d.id,
                d.status.as_str(),
                d.title,
                d.property_address
                    .as_deref()
                    .map(|a| format!(" ({})", a))
                    .unwrap_or_default()
            )
        })
        .collect()
}

fn render_clause(clause: &Clause) -> String {
    let mut out = format!("{} [{}]\nkey: {}\n", clause.name, clause.status, clause.key);
    if let Some(category) = &clause.category {
        out.push_str(&format!("category: {}\n", category));
    }
    out.push_str(&format!("\n{}\n", clause.text.trim()));
    if let Some(suggestion) = &clause.suggestion {
        out.push_str(&format!("\nsuggestion: {}\n", suggestion.trim()));
    }
    for comment in &clause.comments {
        let author = comment.author.as_deref().unwrap_or("anonymous");
        out.push_str(&format!("  - {}: {}\n", author, comment.text));
    }
    out
}

/// Export payload as JSON or rendered Markdown
pub fn export_body(data: &TemplateData, json: bool) -> anyhow::Result<String> {
    if json {
        let mut body = serde_json::to_string_pretty(data)?;
        body.push('\n');
        Ok(body)
    } else {
        Ok(render_markdown(data))
    }
}

/// Write to `out` when given, else stdout
pub fn write_output(out: Option<&Path>, body: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{}", body),
    }
    Ok(())
}

pub struct App {
    config: Config,
    session: Arc<SessionStore>,
    workspace: DocumentWorkspace<LeaseClient>,
    json: bool,
}

impl App {
    pub fn new(config: Config, json: bool) -> anyhow::Result<Self> {
        let data_dir = config.data_dir();
        let session = Arc::new(
            SessionStore::open(&data_dir)
                .with_context(|| format!("Failed to open client state in {}", data_dir.display()))?,
        );
        let client = LeaseClient::new(&config.api.base_url, config.timeout(), session.clone())?;
        let workspace = DocumentWorkspace::new(
            Arc::new(client),
            Arc::new(ConsoleNotifier),
            config.review.panel,
            config.review.rollback,
        );
        Ok(Self {
            config,
            session,
            workspace,
            json,
        })
    }

    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            print!("{}", text());
        }
        Ok(())
    }

    // ============================================================
    // Authentication
    // ============================================================

    pub fn login(&self, token: &str) -> anyhow::Result<ExitCode> {
        if token.trim().is_empty() {
            bail!("Access token must not be empty");
        }
        self.session.set_access_token(token)?;
        self.session.finish_auth_flow()?;
        eprintln!("Logged in to {}", self.config.api.base_url);
        Ok(ExitCode::SUCCESS)
    }

    pub fn logout(&self) -> anyhow::Result<ExitCode> {
        self.session.clear()?;
        eprintln!("Logged out");
        Ok(ExitCode::SUCCESS)
    }

    /// Remember the email of a password reset or sign-up awaiting its code
    pub fn start_verification(
        &self,
        email: &str,
        purpose: AuthPurpose,
    ) -> anyhow::Result<ExitCode> {
        let email = email.trim();
        if !email.contains('@') {
            bail!("'{}' is not an email address", email);
        }
        self.session.begin_auth_flow(email, purpose)?;
        eprintln!("Waiting for {} verification of {}", purpose, email);
        Ok(ExitCode::SUCCESS)
    }

    pub fn status(&self) -> anyhow::Result<ExitCode> {
        #[derive(Serialize)]
        struct Status<'a> {
            api: &'a str,
            panel: String,
            logged_in: bool,
            pending_verification: Option<AuthContext>,
        }
        let status = Status {
            api: &self.config.api.base_url,
            panel: self.config.review.panel.to_string(),
            logged_in: self.session.is_logged_in(),
            pending_verification: self.session.auth_context(),
        };
        self.print(&status, || {
            let mut out = format!(
                "api: {}\npanel: {}\nlogged in: {}\n",
                status.api,
                status.panel,
                if status.logged_in { "yes" } else { "no" }
            );
            if let Some(context) = &status.pending_verification {
                out.push_str(&format!(
                    "pending {} verification for {} (since {})\n",
                    context.purpose,
                    context.email,
                    context.issued_at.format("%Y-%m-%d %H:%M UTC")
                ));
            }
            out
        })?;
        Ok(ExitCode::SUCCESS)
    }

    // ============================================================
    // Documents
    // ============================================================

    pub async fn drafts(&self) -> anyhow::Result<ExitCode> {
        let drafts = self.workspace.refresh_drafts().await?;
        self.print(&drafts, || render_drafts(&drafts))?;
        Ok(ExitCode::SUCCESS)
    }

    async fn open(&self, id: &str) -> anyhow::Result<ReviewSession> {
        Ok(self.workspace.open(id).await?)
    }

    pub async fn show(&self, id: &str, clause: &str) -> anyhow::Result<ExitCode> {
        let session = self.open(id).await?;
        let clauses = session.clauses();
        let clause = resolve_clause(&clauses, clause)?;
        self.print(clause, || render_clause(clause))?;
        Ok(ExitCode::SUCCESS)
    }

    pub async fn review(
        &self,
        id: &str,
        search: Option<String>,
        status: Option<&str>,
    ) -> anyhow::Result<ExitCode> {
        let filter = ReviewFilter {
            search,
            status: status.map(parse_status).transpose()?,
        };
        let session = self.open(id).await?;
        let projection = session.projection(&filter);
        self.print(&projection, || render_projection(&projection))?;
        Ok(ExitCode::SUCCESS)
    }

    pub async fn export(&self, id: &str, out: Option<&Path>) -> anyhow::Result<ExitCode> {
        let outcome = self.workspace.download(id).await;
        let ActionOutcome::Applied(data) = &outcome else {
            return Ok(exit_code(&outcome));
        };
        write_output(out, &export_body(data, self.json)?)?;
        Ok(ExitCode::SUCCESS)
    }

    pub async fn delete(&self, id: &str) -> anyhow::Result<ExitCode> {
        Ok(exit_code(&self.workspace.delete(id).await))
    }

    pub async fn submit(&self, form: &Path, draft: bool) -> anyhow::Result<ExitCode> {
        let raw = fs::read_to_string(form)
            .with_context(|| format!("Failed to read form: {}", form.display()))?;
        let mut form: LoiForm = serde_json::from_str(&raw).context("Invalid LOI form JSON")?;
        form.save_as_draft |= draft;

        let outcome = self.workspace.submit(&form).await;
        if let ActionOutcome::Applied(receipt) = &outcome {
            self.print(receipt, || {
                format!("{} {}\n", receipt.id, receipt.status.as_str())
            })?;
        }
        Ok(exit_code(&outcome))
    }

    // ============================================================
    // Clause actions
    // ============================================================

    async fn target(&self, id: &str, clause: &str) -> anyhow::Result<(ReviewSession, ClauseKey)> {
        let session = self.open(id).await?;
        let key = resolve_clause(&session.clauses(), clause)?.key.clone();
        Ok((session, key))
    }

    pub async fn accept(&self, id: &str, clause: &str) -> anyhow::Result<ExitCode> {
        let (session, key) = self.target(id, clause).await?;
        Ok(exit_code(&session.accept(&key).await?))
    }

    pub async fn reject(&self, id: &str, clause: &str) -> anyhow::Result<ExitCode> {
        let (session, key) = self.target(id, clause).await?;
        Ok(exit_code(&session.reject(&key).await?))
    }

    pub async fn comment(
        &self,
        id: &str,
        clause: &str,
        text: &str,
        author: Option<&str>,
    ) -> anyhow::Result<ExitCode> {
        let (session, key) = self.target(id, clause).await?;
        Ok(exit_code(&session.comment(&key, text, author).await?))
    }

    pub async fn edit(&self, id: &str, clause: &str, text: &str) -> anyhow::Result<ExitCode> {
        let (session, key) = self.target(id, clause).await?;
        let edit = session.edit_text(&key, text).await?;
        if let Some(draft) = &edit.draft {
            // Keep the rejected draft so it can be retried
            eprintln!("Edit not saved. Draft:\n{}", draft);
        }
        Ok(exit_code(&edit.outcome))
    }

    pub async fn suggest(&self, id: &str, clause: &str, prompt: &str) -> anyhow::Result<ExitCode> {
        let (session, key) = self.target(id, clause).await?;
        let outcome = session.suggest(&key, prompt).await?;
        if outcome.is_applied() {
            if let Some(clause) = session.clause(&key) {
                self.print(&clause, || render_clause(&clause))?;
            }
        }
        Ok(exit_code(&outcome))
    }

    pub async fn approve_all(&self, id: &str) -> anyhow::Result<ExitCode> {
        let session = self.open(id).await?;
        Ok(exit_code(&session.approve_all().await?))
    }
}
