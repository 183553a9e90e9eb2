//! Types and data structures for bulk membership jobs.

use serde::Deserialize;
use std::fmt;
use uuid::Uuid;

/// Reference to a user to add, resolved once at the boundary.
///
/// A user id wins over a handle when a caller supplies both. An entry with
/// neither is kept as [`UserRef::Empty`] and skipped by the job without
/// counting towards any outcome.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawUserRef")]
pub enum UserRef {
    ById(String),
    ByHandle(String),
    Empty,
}

#[derive(Deserialize)]
struct RawUserRef {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    username: String,
}

impl From<RawUserRef> for UserRef {
    fn from(raw: RawUserRef) -> Self {
        Self::from_parts(&raw.user_id, &raw.username)
    }
}

impl UserRef {
    /// Only an entry with both fields empty is [`UserRef::Empty`]. A field
    /// that normalizes to nothing (`" "`, `"@"`) is still looked up as given,
    /// so it fails resolution and counts as an error.
    pub fn from_parts(user_id: &str, handle: &str) -> Self {
        let trimmed_id = user_id.trim();
        let bare_handle = handle.trim().trim_start_matches('@');

        if !trimmed_id.is_empty() {
            Self::ById(trimmed_id.to_string())
        } else if !bare_handle.is_empty() {
            Self::ByHandle(bare_handle.to_string())
        } else if !user_id.is_empty() {
            Self::ById(user_id.to_string())
        } else if !handle.is_empty() {
            Self::ByHandle(handle.to_string())
        } else {
            Self::Empty
        }
    }

    pub fn by_id(user_id: &str) -> Self {
        Self::from_parts(user_id, "")
    }

    pub fn by_handle(handle: &str) -> Self {
        Self::from_parts("", handle)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ById(id) => write!(f, "id:{id}"),
            Self::ByHandle(handle) => write!(f, "@{handle}"),
            Self::Empty => write!(f, "<empty>"),
        }
    }
}

/// A request to add a list of users to one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOperationRequest {
    pub resource_id: String,
    /// User who triggered the job; permissions are checked against them.
    pub initiator_id: String,
    pub users: Vec<UserRef>,
    /// Add users missing from the parent team instead of skipping them.
    pub add_to_parent: bool,
    /// Process guest accounts instead of skipping them.
    pub include_guests: bool,
}

impl BulkOperationRequest {
    pub fn new(resource_id: &str, initiator_id: &str, users: Vec<UserRef>) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            initiator_id: initiator_id.to_string(),
            users,
            add_to_parent: false,
            include_guests: false,
        }
    }

    pub fn add_to_parent(mut self, add_to_parent: bool) -> Self {
        self.add_to_parent = add_to_parent;
        self
    }

    pub fn include_guests(mut self, include_guests: bool) -> Self {
        self.include_guests = include_guests;
        self
    }
}

/// Terminal outcome of processing one [`UserRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    /// Added to the resource; `joined_parent` when the job also added them
    /// to the parent team.
    Added { joined_parent: bool },
    /// Added to the parent team, then failed to join the resource.
    ErroredAfterParentJoin,
    Errored,
    SkippedGuest,
    SkippedNotParentMember,
    /// Empty reference, nothing to do.
    Ignored,
}

/// Aggregate outcome counters of one job.
///
/// Owned by the single worker running the job. Each user lands in at most
/// one of `succeeded`, `errored`, `skipped_guest` and
/// `skipped_not_parent_member`; `added_to_parent` counts a side effect on
/// top of that.
///
/// # Examples
///
/// ```no_run
/// use server::engine::{ResultTally, UserOutcome};
///
/// let mut tally = ResultTally::new();
/// tally.record(UserOutcome::Added { joined_parent: true });
/// tally.record(UserOutcome::SkippedGuest);
/// tally.record(UserOutcome::Ignored);
///
/// assert_eq!(tally.accounted(), 2);
/// assert_eq!(
///     tally.to_string(),
///     "1 users were added. 0 had errors (check logs) and 1 were not added, 1 were added to the team."
/// );
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultTally {
    pub succeeded: usize,
    pub errored: usize,
    pub added_to_parent: usize,
    pub skipped_guest: usize,
    pub skipped_not_parent_member: usize,
}

impl ResultTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: UserOutcome) {
        match outcome {
            UserOutcome::Added { joined_parent } => {
                self.succeeded += 1;
                if joined_parent {
                    self.added_to_parent += 1;
                }
            }
            UserOutcome::ErroredAfterParentJoin => {
                self.errored += 1;
                self.added_to_parent += 1;
            }
            UserOutcome::Errored => self.errored += 1,
            UserOutcome::SkippedGuest => self.skipped_guest += 1,
            UserOutcome::SkippedNotParentMember => self.skipped_not_parent_member += 1,
            UserOutcome::Ignored => {}
        }
    }

    pub fn not_added(&self) -> usize {
        self.skipped_guest + self.skipped_not_parent_member
    }

    /// Users that reached a terminal counter.
    pub fn accounted(&self) -> usize {
        self.succeeded + self.errored + self.not_added()
    }

    /// Markdown report posted when the job finishes.
    pub fn pretty(&self) -> String {
        let mut report = String::from("Results:\n");

        report.push_str(&format!("- **Total users to add**: {}\n", self.succeeded));

        if self.errored > 0 {
            report.push_str(&format!("- **Errors**: {} (check logs)\n", self.errored));
        }

        if self.not_added() > 0 {
            report.push_str(&format!("- **Not added**: {}\n", self.not_added()));

            if self.skipped_guest > 0 {
                report.push_str(&format!(
                    "  - **Due to being a guest**: {}\n",
                    self.skipped_guest
                ));
            }

            if self.skipped_not_parent_member > 0 {
                report.push_str(&format!(
                    "  - **Due to not being a team member**: {}\n",
                    self.skipped_not_parent_member
                ));
            }
        }

        if self.added_to_parent > 0 {
            report.push_str(&format!("- **Added to team**: {}\n", self.added_to_parent));
        }

        report
    }
}

impl fmt::Display for ResultTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} users were added. {} had errors (check logs) and {} were not added, {} were added to the team.",
            self.succeeded,
            self.errored,
            self.not_added(),
            self.added_to_parent
        )
    }
}

/// Identifier handed out when a job is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Synchronous answer to an accepted job. The job itself runs later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub resource_id: String,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(ResultTally),
    /// The job stopped before processing users (or crashed while doing so).
    Failed(String),
}

/// Completion notice emitted once per job, after its lock was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: JobId,
    pub resource_id: String,
    pub outcome: JobOutcome,
}

impl JobReport {
    pub fn tally(&self) -> Option<&ResultTally> {
        match &self.outcome {
            JobOutcome::Completed(tally) => Some(tally),
            JobOutcome::Failed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_ref_from_parts() {
        assert_eq!(UserRef::from_parts("u1", ""), UserRef::ById("u1".into()));
        assert_eq!(UserRef::from_parts("", "@alice"), UserRef::ByHandle("alice".into()));
        assert_eq!(UserRef::from_parts("u1", "alice"), UserRef::ById("u1".into()));
        assert_eq!(UserRef::from_parts("", ""), UserRef::Empty);
        assert_eq!(UserRef::from_parts(" ", ""), UserRef::ById(" ".into()));
        assert_eq!(UserRef::from_parts("", "@"), UserRef::ByHandle("@".into()));
        assert_eq!(UserRef::from_parts(" ", "bob"), UserRef::ByHandle("bob".into()));
    }

    #[test]
    fn test_user_ref_deserialize() {
        let users: Vec<UserRef> =
            serde_json::from_str(r#"[{"user_id": "u1"}, {"username": "bob"}, {}]"#).unwrap();

        assert_eq!(
            users,
            vec![
                UserRef::ById("u1".into()),
                UserRef::ByHandle("bob".into()),
                UserRef::Empty
            ]
        );
    }

    #[test]
    fn test_tally_records_one_terminal_counter_per_user() {
        let mut tally = ResultTally::new();
        for outcome in [
            UserOutcome::Added { joined_parent: true },
            UserOutcome::Added { joined_parent: false },
            UserOutcome::Errored,
            UserOutcome::ErroredAfterParentJoin,
            UserOutcome::SkippedGuest,
            UserOutcome::SkippedNotParentMember,
            UserOutcome::Ignored,
        ] {
            tally.record(outcome);
        }

        assert_eq!(tally.succeeded, 2);
        assert_eq!(tally.errored, 2);
        assert_eq!(tally.added_to_parent, 2);
        assert_eq!(tally.accounted(), 6);
    }

    #[test]
    fn test_display_summary() {
        let tally = ResultTally {
            succeeded: 3,
            errored: 1,
            added_to_parent: 2,
            skipped_guest: 1,
            skipped_not_parent_member: 1,
        };

        assert_eq!(
            tally.to_string(),
            "3 users were added. 1 had errors (check logs) and 2 were not added, 2 were added to the team."
        );
    }

    #[test]
    fn test_pretty_report_full() {
        let tally = ResultTally {
            succeeded: 3,
            errored: 1,
            added_to_parent: 2,
            skipped_guest: 1,
            skipped_not_parent_member: 1,
        };

        assert_eq!(
            tally.pretty(),
            "Results:\n\
             - **Total users to add**: 3\n\
             - **Errors**: 1 (check logs)\n\
             - **Not added**: 2\n  \
             - **Due to being a guest**: 1\n  \
             - **Due to not being a team member**: 1\n\
             - **Added to team**: 2\n"
        );
    }

    #[test]
    fn test_pretty_report_omits_zero_sections() {
        let tally = ResultTally {
            succeeded: 5,
            ..ResultTally::default()
        };

        assert_eq!(tally.pretty(), "Results:\n- **Total users to add**: 5\n");
    }
}
