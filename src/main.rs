use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use campus_moderator::api::HttpResourceClient;
use campus_moderator::cache::QueryCache;
use campus_moderator::config;
use campus_moderator::model::{
    ListQuery, RecordId, ResourceKind, ReviewDecision, ReviewStatus, ReviewableRecord, StatsSource,
};
use campus_moderator::notify::{Level, Notification, Notifier, TracingNotifier};
use campus_moderator::session::{ActiveSession, SessionContext, SessionStore};
use campus_moderator::workflow::{
    badge, ReviewModal, ReviewOrchestrator, ReviewOutcome, ReviewTarget, SelectionSet, ViewLoader,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Moderate campus marketplace listings, verifications and users")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and store the session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in operator
    Whoami,
    /// List records of a collection
    List {
        kind: ResourceKind,
        #[arg(long)]
        status: Option<ReviewStatus>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one record
    Show { kind: ResourceKind, id: String },
    /// Pending/approved/rejected counts
    Stats { kind: ResourceKind },
    /// Approve one record, or several in one bulk request
    Approve {
        kind: ResourceKind,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Reject one record, or several in one bulk request
    Reject {
        kind: ResourceKind,
        #[arg(required = true)]
        ids: Vec<String>,
        /// Why the records are rejected (required)
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Mark a listing as sold
    MarkSold { id: String },
}

/// Prints notifications the way the dashboard shows toasts, and logs them.
struct ConsoleNotifier(TracingNotifier);

impl Notifier for ConsoleNotifier {
    fn notify(&self, n: Notification) {
        self.0.notify(n.clone());
        match n.level {
            Level::Success => println!("✔ {}", n.message),
            Level::Warning => eprintln!("! {}", n.message),
            Level::Error => eprintln!("✘ {}", n.message),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let store = SessionStore::new(cfg.session_path());
    let session = Arc::new(SessionContext::new());
    match store.load() {
        Ok(Some(saved)) => session.login(saved.user, saved.token),
        Ok(None) => {}
        Err(err) => warn!(?err, "ignoring unreadable session file"),
    }

    let client = Arc::new(HttpResourceClient::from_config(&cfg, Arc::clone(&session))?);
    let cache = Arc::new(QueryCache::new());

    let result = run(args.command, &store, &session, &client, &cache).await;

    if session.signed_out() {
        store.clear()?;
        eprintln!("Session expired. Sign in again with `campus-moderator login`.");
    }
    result
}

async fn run(
    command: Command,
    store: &SessionStore,
    session: &Arc<SessionContext>,
    client: &Arc<HttpResourceClient>,
    cache: &Arc<QueryCache>,
) -> Result<()> {
    let loader = ViewLoader::new(Arc::clone(client), Arc::clone(cache));

    match command {
        Command::Login { email, password } => {
            let (user, token) = client
                .sign_in(&email, &password)
                .await
                .context("sign-in failed")?;
            if !user.role.is_admin() {
                warn!(user_id = %user.id, "signed in without moderation rights");
            }
            store.save(&ActiveSession {
                user: user.clone(),
                token: token.clone(),
            })?;
            session.login(user.clone(), token);
            println!("Signed in as {} ({:?})", user.email, user.role);
        }
        Command::Logout => {
            session.logout();
            store.clear()?;
            println!("Signed out");
        }
        Command::Whoami => match session.current_user() {
            Some(user) => {
                println!("{} <{}>", user.name.as_deref().unwrap_or("-"), user.email);
                println!("role: {:?}", user.role);
                if let Some(campus) = &user.campus_id {
                    println!("campus: {campus}");
                }
            }
            None => println!("Not signed in"),
        },
        Command::List {
            kind,
            status,
            search,
            page,
            limit,
        } => {
            let query = ListQuery {
                status,
                search,
                page,
                limit,
                ..scoped_query(session)?
            };
            let page = loader.collection(kind, &query).await?;
            for record in &page.items {
                print_record(record);
            }
            println!(
                "page {} of {} ({} {} total)",
                page.page,
                page.pages.max(1),
                page.total,
                kind.plural()
            );
        }
        Command::Show { kind, id } => {
            let record = loader.record(kind, &id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Stats { kind } => {
            let query = scoped_query(session)?;
            print_stats(&loader, kind, &query).await;
        }
        Command::Approve { kind, ids } => {
            let orchestrator = orchestrator(client, cache, session);
            let (mut modal, mut selection) = open_review(ids);
            let (target, decision) = modal.submit_approve()?;
            apply(&orchestrator, &loader, session, kind, target, decision, &mut selection).await?;
        }
        Command::Reject { kind, ids, reason } => {
            let orchestrator = orchestrator(client, cache, session);
            let (mut modal, mut selection) = open_review(ids);
            let (target, decision) = match modal.submit_reject_with(reason) {
                Ok(submitted) => submitted,
                Err(err) => bail!("{err} (use --reason)"),
            };
            apply(&orchestrator, &loader, session, kind, target, decision, &mut selection).await?;
        }
        Command::MarkSold { id } => {
            let orchestrator = orchestrator(client, cache, session);
            let record = orchestrator.mark_sold(&id).await?;
            print_record(&record);
        }
    }
    Ok(())
}

fn orchestrator(
    client: &Arc<HttpResourceClient>,
    cache: &Arc<QueryCache>,
    session: &Arc<SessionContext>,
) -> ReviewOrchestrator<Arc<HttpResourceClient>, ConsoleNotifier> {
    ReviewOrchestrator::new(
        Arc::clone(client),
        ConsoleNotifier(TracingNotifier),
        Arc::clone(cache),
        Arc::clone(session),
    )
}

/// One id opens a single review; several go through the selection set.
fn open_review(ids: Vec<RecordId>) -> (ReviewModal, SelectionSet) {
    let mut modal = ReviewModal::new();
    let mut selection = SelectionSet::new();
    if ids.len() == 1 {
        modal.open(ReviewTarget::Single(ids[0].clone()));
    } else {
        selection.select_all(ids, true);
        selection.open_menu();
        modal.open(ReviewTarget::Bulk(selection.ids()));
    }
    (modal, selection)
}

async fn apply(
    orchestrator: &ReviewOrchestrator<Arc<HttpResourceClient>, ConsoleNotifier>,
    loader: &ViewLoader<Arc<HttpResourceClient>>,
    session: &Arc<SessionContext>,
    kind: ResourceKind,
    target: ReviewTarget,
    decision: ReviewDecision,
    selection: &mut SelectionSet,
) -> Result<()> {
    let outcome = orchestrator
        .submit(kind, target, decision, selection)
        .await?;
    match &outcome {
        ReviewOutcome::Single(record) => print_record(record),
        ReviewOutcome::Bulk(summary) => {
            info!(updated = summary.updated.len(), failed = summary.failed.len(), "bulk review done");
            if !selection.is_empty() {
                println!("still selected: {}", selection.ids().join(", "));
            }
        }
    }
    let query = scoped_query(session)?;
    let refreshed = loader.refresh_stale().await;
    info!(refreshed, "views refreshed");
    print_stats(loader, kind, &query).await;
    Ok(())
}

fn scoped_query(session: &SessionContext) -> Result<ListQuery> {
    let scope = session.moderation_scope()?;
    Ok(ListQuery::default().with_campus(scope.campus_id()))
}

async fn print_stats(loader: &ViewLoader<Arc<HttpResourceClient>>, kind: ResourceKind, query: &ListQuery) {
    let snapshot = loader.stats().load(kind, query).await;
    let counts = snapshot.counts;
    println!(
        "{}: pending {} · approved {} · rejected {} · total {}{}",
        kind.plural(),
        counts.pending,
        counts.approved,
        counts.rejected,
        snapshot.total,
        match snapshot.source {
            StatsSource::Endpoint => "",
            StatsSource::Derived => " (current page only)",
        }
    );
    if let Some(text) = badge(&counts) {
        println!("pending badge: {text}");
    }
}

fn print_record(record: &ReviewableRecord) {
    println!(
        "{:<12} {:<9} {:<40} {}",
        record.id,
        record.status.as_str(),
        record.label(),
        record.created_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(note) = record.review_note.as_deref().filter(|n| !n.is_empty()) {
        println!("{:<12} note: {}", "", note);
    }
}
