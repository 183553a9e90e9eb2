use thiserror::Error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal error, please check logs";
const PERMISSION_DENIED_MESSAGE: &str = "Insufficient permissions to add users to channel";

/// Errors raised by a key/value backing store.
///
/// The cache-backed store and the lock store pass these through unchanged,
/// so callers always see the backing store's own failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The key does not exist (or its TTL has elapsed) in the backing store.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// The backing store could not complete the operation.
    #[error("store operation '{operation}' failed for key {key}: {reason}")]
    Backend {
        operation: String,
        key: String,
        reason: String,
    },
}

impl StoreError {
    pub fn backend(operation: &str, key: &str, reason: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors raised by the lock store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    /// Another holder owns the lock for this key.
    #[error("item is locked: {key}")]
    AlreadyLocked { key: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors returned by the identity/membership directory.
///
/// Every directory capability distinguishes "does not exist" from any other
/// failure, since membership lookups treat the former as a normal answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("directory request failed: {0}")]
    Failed(String),
}

impl DirectoryError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Problems with a submitted bulk add payload.
///
/// The `Display` output is the message shown to the submitter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("File is too large. Max file size is {max_kb}KB.")]
    TooLarge { max_kb: u64 },

    #[error("Error parsing submitted file")]
    Malformed { reason: String },

    #[error("Channel ID is required.")]
    MissingChannel,

    #[error("User list is empty.")]
    MissingUsers,

    #[error("An authenticated user is required.")]
    MissingInitiator,
}

impl RequestError {
    /// Renders the error as the JSON body sent back to the submitter.
    pub fn as_json(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}

/// Broad class of a [`JobError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobErrorKind {
    /// A bulk operation already holds the resource. Retry after backoff.
    AlreadyLocked,
    /// Resource or identity missing. Needs corrected input.
    NotFound,
    /// The initiator lacks a required permission.
    PermissionDenied,
    /// Backing store or otherwise unexpected failure. Retryable.
    Internal,
    /// The request itself is incomplete (no resource, initiator or users).
    InvalidRequest,
}

/// Caller-visible rejection of a bulk job.
///
/// Carries three views of the same failure: a machine readable `code`, a
/// `message` that is safe to show to the user, and the internal `detail`
/// that only goes to the logs.
///
/// # Codes
///
/// | Kind | Codes |
/// |------|-------|
/// | `AlreadyLocked` | `channel_locked` |
/// | `NotFound` | `channel_not_found` |
/// | `PermissionDenied` | `insufficient_{private,public,group}_channel_permissions__add_user`, `insufficient_team_permissions__add_user`, `direct_channel_not_supported` |
/// | `Internal` | `lock_failed`, `channel_lookup_failed` |
/// | `InvalidRequest` | `missing_channel_id`, `missing_initiator`, `missing_users` |
///
/// # Examples
///
/// ```no_run
/// use server::common::{JobError, JobErrorKind};
///
/// fn status_for(error: &JobError) -> u16 {
///     match error.kind() {
///         JobErrorKind::InvalidRequest => 400,
///         JobErrorKind::PermissionDenied => 403,
///         JobErrorKind::NotFound => 404,
///         JobErrorKind::AlreadyLocked => 409,
///         JobErrorKind::Internal => 500,
///     }
/// }
///
/// let error = JobError::already_locked("town-square");
/// assert_eq!(status_for(&error), 409);
/// // Only the safe message leaves the process
/// assert!(!error.as_json().contains("is locked"));
/// ```
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {detail}")]
pub struct JobError {
    kind: JobErrorKind,
    code: &'static str,
    message: String,
    detail: String,
}

impl JobError {
    pub fn new(
        kind: JobErrorKind,
        code: &'static str,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn already_locked(resource_id: &str) -> Self {
        Self::new(
            JobErrorKind::AlreadyLocked,
            "channel_locked",
            "A bulk operation is already running on this channel. Please wait until it finishes.",
            format!("resource {resource_id} is locked"),
        )
    }

    /// Every authorization failure shows the same message to the caller; the
    /// specific check that failed only goes to `detail`.
    pub fn permission_denied(code: &'static str, reason: &str) -> Self {
        Self::new(
            JobErrorKind::PermissionDenied,
            code,
            PERMISSION_DENIED_MESSAGE,
            format!("insufficient permissions: {reason}"),
        )
    }

    /// Wraps an unexpected failure behind the generic internal message.
    pub fn internal(code: &'static str, detail: impl Into<String>) -> Self {
        Self::new(JobErrorKind::Internal, code, INTERNAL_ERROR_MESSAGE, detail)
    }

    pub fn kind(&self) -> JobErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            JobErrorKind::AlreadyLocked | JobErrorKind::Internal
        )
    }

    /// Renders the user-facing message as a JSON error body.
    pub fn as_json(&self) -> String {
        serde_json::json!({ "error": self.message }).to_string()
    }
}
