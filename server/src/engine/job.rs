use super::resolver::MembershipResolver;
use super::types::{
    BulkOperationRequest, JobAccepted, JobId, JobOutcome, JobReport, ResultTally,
};
use crate::common::{DirectoryError, JobError, JobErrorKind};
use crate::config::EngineConfig;
use crate::directory::{
    Directory, NotificationSink, Permission, Post, ResourceKind, TargetResource,
};
use crate::kvstore::LockStore;
use crate::taskpool::TaskPool;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

const ERROR_NOTICE: &str =
    "⚠️ Error bulk inviting users. Please check logs for more information.";

/// Hook called with the report of every finished job.
pub type FinishHook = Arc<dyn Fn(&JobReport) + Send + Sync>;

/// Accepts bulk membership jobs and runs them in the background.
///
/// Built once at startup and shared by request handlers. At most one job
/// runs per resource at a time; jobs on different resources run
/// concurrently.
///
/// # Job Lifecycle
///
/// ## Synchronous (returned to the caller)
/// - request validation ([`JobErrorKind::InvalidRequest`])
/// - busy channel ([`JobErrorKind::AlreadyLocked`])
/// - channel lookup ([`JobErrorKind::NotFound`] or internal)
/// - authorization by channel kind ([`JobErrorKind::PermissionDenied`])
/// - lock acquisition (internal `lock_failed` when a racing job won)
///
/// ## Asynchronous (reported through posts and logs)
/// - initiator lookup, "starting" post, per-user resolution
/// - "finished" post with the report threaded under it
/// - lock release, on every path including panics
///
/// # Examples
///
/// ```no_run
/// use server::config::EngineConfig;
/// use server::directory::InMemoryDirectory;
/// use server::engine::{BulkOperationRequest, Engine, UserRef};
/// use server::kvstore::{KvLockStore, MemoryKvStore};
/// use std::sync::Arc;
///
/// # async fn run() {
/// let config = EngineConfig::default();
/// let directory = Arc::new(InMemoryDirectory::new());
/// let locks = Arc::new(KvLockStore::with_cache(Arc::new(MemoryKvStore::new()), &config));
/// let engine = Engine::new(directory.clone(), directory, locks, "bot", &config);
///
/// let request = BulkOperationRequest::new("town-square", "admin", vec![UserRef::by_handle("alice")])
///     .add_to_parent(true);
///
/// match engine.start_job(request).await {
///     Ok(accepted) => println!("job {} accepted", accepted.job_id),
///     Err(e) if e.is_retryable() => eprintln!("try again later: {}", e.message()),
///     Err(e) => eprintln!("rejected ({}): {}", e.code(), e.message()),
/// }
///
/// engine.wait_idle().await;
/// # }
/// ```
pub struct Engine {
    worker: JobWorker,
    pool: TaskPool,
    on_finish: Option<FinishHook>,
}

impl Engine {
    pub fn new(
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn NotificationSink>,
        lock_store: Arc<dyn LockStore>,
        bot_user_id: &str,
        config: &EngineConfig,
    ) -> Self {
        Self {
            worker: JobWorker {
                directory,
                notifier,
                lock_store,
                bot_user_id: bot_user_id.to_string(),
            },
            pool: TaskPool::new(config.max_concurrent_jobs()),
            on_finish: None,
        }
    }

    /// Registers a hook fired after each job released its lock. Meant for
    /// synchronizing tests and one-shot drivers, not for control flow.
    pub fn set_on_finish(&mut self, hook: impl Fn(&JobReport) + Send + Sync + 'static) {
        self.on_finish = Some(Arc::new(hook));
    }

    /// Validates `request`, takes the resource lock and schedules the job.
    ///
    /// Returning `Ok` means the job was accepted, not that it completed.
    /// Progress and results are posted into the resource.
    pub async fn start_job(&self, request: BulkOperationRequest) -> Result<JobAccepted, JobError> {
        validate(&request)?;

        if self.worker.lock_store.is_locked(&request.resource_id).await {
            log::info!(
                "rejecting bulk job, channel busy, channel_id={}",
                request.resource_id
            );
            return Err(JobError::already_locked(&request.resource_id));
        }

        let resource = self
            .worker
            .directory
            .get_resource(&request.resource_id)
            .await
            .map_err(|e| {
                log::error!(
                    "error getting channel information, channel_id={}, err={e}",
                    request.resource_id
                );
                resource_lookup_error(&request.resource_id, e)
            })?;

        self.authorize(&request, &resource).await?;

        if let Err(e) = self.worker.lock_store.lock(&request.resource_id).await {
            log::error!(
                "error locking channel after it was reported free, channel_id={}, err={e}",
                request.resource_id
            );
            return Err(JobError::internal(
                "lock_failed",
                format!("error locking channel: {e}"),
            ));
        }

        let job_id = JobId::new();
        let accepted = JobAccepted {
            job_id,
            resource_id: request.resource_id.clone(),
        };

        log::info!(
            "bulk job accepted, job_id={job_id}, channel_id={}, users={}, trigger_user_id={}",
            request.resource_id,
            request.users.len(),
            request.initiator_id
        );

        let worker = self.worker.clone();
        let on_finish = self.on_finish.clone();
        self.pool
            .execute(worker.run(job_id, request, resource, on_finish));

        Ok(accepted)
    }

    pub async fn is_running(&self, resource_id: &str) -> bool {
        self.worker.lock_store.is_locked(resource_id).await
    }

    /// Waits for every job accepted so far to finish.
    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await;
    }

    async fn authorize(
        &self,
        request: &BulkOperationRequest,
        resource: &TargetResource,
    ) -> Result<(), JobError> {
        let directory = &self.worker.directory;
        let initiator = &request.initiator_id;

        let required = match resource.kind {
            ResourceKind::Private => Some((
                Permission::ManagePrivateChannelMembers,
                "insufficient_private_channel_permissions__add_user",
            )),
            ResourceKind::Open => Some((
                Permission::ManagePublicChannelMembers,
                "insufficient_public_channel_permissions__add_user",
            )),
            ResourceKind::Group => Some((
                Permission::ManageCustomGroupMembers,
                "insufficient_group_channel_permissions__add_user",
            )),
            ResourceKind::Direct => None,
        };

        match required {
            Some((permission, code)) => {
                if !directory
                    .has_resource_permission(initiator, &resource.id, permission)
                    .await
                {
                    log::info!(
                        "permission denied, user_id={initiator}, channel_id={}, permission={permission:?}",
                        resource.id
                    );
                    return Err(JobError::permission_denied(
                        code,
                        "You dont have permission to add users to this channel",
                    ));
                }
            }
            None => {
                return Err(JobError::permission_denied(
                    "direct_channel_not_supported",
                    "Users can not be added to a direct message channel",
                ));
            }
        }

        if request.add_to_parent
            && !directory
                .has_parent_permission(initiator, &resource.parent_id, Permission::AddUserToTeam)
                .await
        {
            log::info!(
                "permission denied, user_id={initiator}, team_id={}, permission={:?}",
                resource.parent_id,
                Permission::AddUserToTeam
            );
            return Err(JobError::permission_denied(
                "insufficient_team_permissions__add_user",
                "You dont have enough permissions to add users to this team",
            ));
        }

        Ok(())
    }
}

fn validate(request: &BulkOperationRequest) -> Result<(), JobError> {
    let problem = if request.resource_id.is_empty() {
        Some(("missing_channel_id", "Channel ID is required."))
    } else if request.initiator_id.is_empty() {
        Some(("missing_initiator", "An authenticated user is required."))
    } else if request.users.is_empty() {
        Some(("missing_users", "User list is empty."))
    } else {
        None
    };

    match problem {
        Some((code, message)) => Err(JobError::new(
            JobErrorKind::InvalidRequest,
            code,
            message,
            code,
        )),
        None => Ok(()),
    }
}

fn resource_lookup_error(resource_id: &str, err: DirectoryError) -> JobError {
    if err.is_not_found() {
        JobError::new(
            JobErrorKind::NotFound,
            "channel_not_found",
            format!("Error getting channel information. Does channel `{resource_id}` exist?"),
            err.to_string(),
        )
    } else {
        JobError::internal(
            "channel_lookup_failed",
            format!("error getting channel: {err}"),
        )
    }
}

/// Everything a background job needs, cloned into its task.
#[derive(Clone)]
struct JobWorker {
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn NotificationSink>,
    lock_store: Arc<dyn LockStore>,
    bot_user_id: String,
}

impl JobWorker {
    async fn run(
        self,
        job_id: JobId,
        request: BulkOperationRequest,
        resource: TargetResource,
        on_finish: Option<FinishHook>,
    ) {
        let outcome = match AssertUnwindSafe(self.process(&request, &resource))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_message(&*panic);
                log::error!(
                    "bulk job crashed, job_id={job_id}, channel_id={}, err={reason}",
                    resource.id
                );
                self.notify_error(&request.initiator_id).await;
                JobOutcome::Failed(format!("job crashed: {reason}"))
            }
        };

        if let Err(e) = self.lock_store.unlock(&resource.id).await {
            log::error!(
                "error unlocking channel. channel will be automatically unlocked after ttl expired, channel_id={}, err={e}",
                resource.id
            );
        }

        let report = JobReport {
            job_id,
            resource_id: resource.id,
            outcome,
        };

        match &report.outcome {
            JobOutcome::Completed(tally) => {
                log::info!("bulk job finished, job_id={job_id}, result={tally}")
            }
            JobOutcome::Failed(reason) => {
                log::warn!("bulk job failed, job_id={job_id}, reason={reason}")
            }
        }

        if let Some(hook) = on_finish {
            hook(&report);
        }
    }

    async fn process(
        &self,
        request: &BulkOperationRequest,
        resource: &TargetResource,
    ) -> JobOutcome {
        let initiator = match self.directory.get_user(&request.initiator_id).await {
            Ok(user) => user,
            Err(e) => {
                log::error!(
                    "error getting user information, user_id={}, err={e}",
                    request.initiator_id
                );
                self.notify_error(&request.initiator_id).await;
                return JobOutcome::Failed(format!("initiator lookup failed: {e}"));
            }
        };

        let starting = Post::new(
            &resource.id,
            &self.bot_user_id,
            format!(
                "Starting bulk add of {} users (triggered by @{})",
                request.users.len(),
                initiator.username
            ),
        );
        if let Err(e) = self.notifier.create_post(starting).await {
            log::error!(
                "error creating initial post in channel, channel_id={}, err={e}",
                resource.id
            );
        }

        let tally = self.add_users(request, resource).await;

        let finished = Post::new(&resource.id, &self.bot_user_id, "Bulk add process finished.");
        match self.notifier.create_post(finished).await {
            Ok(root) => {
                let report = Post::new(&resource.id, &self.bot_user_id, tally.pretty())
                    .reply_to(&root.id);
                if let Err(e) = self.notifier.create_post(report).await {
                    log::error!(
                        "error creating threaded result post in channel, channel_id={}, err={e}",
                        resource.id
                    );
                    self.notify_error(&request.initiator_id).await;
                }
            }
            Err(e) => {
                log::error!(
                    "error creating result post in channel, channel_id={}, err={e}",
                    resource.id
                );
                self.notify_error(&request.initiator_id).await;
            }
        }

        JobOutcome::Completed(tally)
    }

    async fn add_users(
        &self,
        request: &BulkOperationRequest,
        resource: &TargetResource,
    ) -> ResultTally {
        let resolver = MembershipResolver::new(self.directory.as_ref(), request, resource);
        let mut tally = ResultTally::new();

        for user in &request.users {
            tally.record(resolver.resolve(user).await);
        }

        tally
    }

    async fn notify_error(&self, user_id: &str) {
        self.notifier.send_ephemeral(user_id, ERROR_NOTICE).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
