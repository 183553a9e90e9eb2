use anyhow::Context;
use clap::Parser;
use server::directory::{DirectorySnapshot, InMemoryDirectory};
use server::engine::{Engine, JobOutcome};
use server::kvstore::{KvLockStore, MemoryKvStore};
use server::request::{BulkAddPayload, accepted_body};
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod logger;

/// Runs one bulk add job against a directory snapshot and prints what the
/// job posted.
#[derive(Parser, Debug)]
#[command(name = "bulk-invite", version, about)]
struct Args {
    /// Configuration file (defaults to ~/.config/bulk-invite/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON snapshot of users, channels, team members and permission grants
    #[arg(short, long)]
    snapshot: PathBuf,

    /// JSON users file, as submitted by a client
    #[arg(short, long)]
    users: PathBuf,

    /// Channel to add users to, overriding the one in the users file
    #[arg(long)]
    channel: Option<String>,

    /// User id the job runs on behalf of
    #[arg(short, long)]
    initiator: String,

    /// Add users missing from the team to it first
    #[arg(long)]
    add_to_team: bool,

    /// Process guest accounts instead of skipping them
    #[arg(long)]
    include_guests: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::load(args.config.as_deref())?;
    logger::setup_logger(config.logging())?;

    let snapshot: DirectorySnapshot = serde_json::from_slice(
        &std::fs::read(&args.snapshot)
            .with_context(|| format!("reading snapshot {}", args.snapshot.display()))?,
    )
    .context("parsing directory snapshot")?;
    let directory = Arc::new(InMemoryDirectory::from_snapshot(snapshot));

    let users_file = std::fs::read(&args.users)
        .with_context(|| format!("reading users file {}", args.users.display()))?;
    let mut payload = BulkAddPayload::from_json(&users_file, config.engine().max_payload_kb())
        .map_err(|e| anyhow::anyhow!(e.as_json()))?;
    if let Some(channel) = args.channel {
        payload.channel_id = channel;
    }
    payload.add_to_team |= args.add_to_team;
    payload.include_guests |= args.include_guests;

    let request = payload
        .into_request(&args.initiator)
        .map_err(|e| anyhow::anyhow!(e.as_json()))?;

    let locks = Arc::new(KvLockStore::with_cache(
        Arc::new(MemoryKvStore::new()),
        config.engine(),
    ));
    let mut engine = Engine::new(
        directory.clone(),
        directory.clone(),
        locks,
        config.bot_user_id(),
        config.engine(),
    );
    engine.set_on_finish(|report| match &report.outcome {
        JobOutcome::Completed(tally) => println!("job {} finished: {tally}", report.job_id),
        JobOutcome::Failed(reason) => println!("job {} failed: {reason}", report.job_id),
    });

    let accepted = engine.start_job(request).await.map_err(|e| {
        log::error!("bulk job rejected, code={}, err={e}", e.code());
        anyhow::anyhow!(e.as_json())
    })?;
    println!("{}", accepted_body(&accepted));

    engine.wait_idle().await;

    for post in directory.posts() {
        match &post.root_id {
            Some(root) => println!("  [reply to {root}] {}", post.message),
            None => println!("[{}] {}", post.id, post.message),
        }
    }
    for (user_id, message) in directory.ephemeral_messages() {
        println!("(ephemeral to {user_id}) {message}");
    }

    Ok(())
}
