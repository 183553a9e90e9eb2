use super::types::{BulkOperationRequest, UserOutcome, UserRef};
use crate::directory::{Directory, TargetResource, User};

/// Resolves one [`UserRef`] against the directory and applies the
/// membership change for a single job.
///
/// Steps for each user, stopping at the first terminal outcome:
///
/// 1. Look the user up by id or handle. Any failure is an error.
/// 2. Skip guests unless the request includes them.
/// 3. Check team membership (skipped for channels without a team). A user
///    outside the team is added to it when the request asks for that,
///    otherwise skipped. Lookup failures other than "not found" are errors.
/// 4. Add the user to the channel.
///
/// Users are processed one at a time; the resolver never fans out.
pub struct MembershipResolver<'a> {
    directory: &'a dyn Directory,
    request: &'a BulkOperationRequest,
    resource: &'a TargetResource,
}

impl<'a> MembershipResolver<'a> {
    pub fn new(
        directory: &'a dyn Directory,
        request: &'a BulkOperationRequest,
        resource: &'a TargetResource,
    ) -> Self {
        Self {
            directory,
            request,
            resource,
        }
    }

    pub async fn resolve(&self, user: &UserRef) -> UserOutcome {
        let identity = match user {
            UserRef::ById(id) => self.directory.get_user(id).await,
            UserRef::ByHandle(handle) => self.directory.get_user_by_handle(handle).await,
            UserRef::Empty => return UserOutcome::Ignored,
        };

        match identity {
            Ok(identity) => self.add(&identity).await,
            Err(e) => {
                log::error!(
                    "error getting user information, user={user}, trigger_user_id={}, channel_id={}, err={e}",
                    self.request.initiator_id,
                    self.resource.id
                );
                UserOutcome::Errored
            }
        }
    }

    async fn add(&self, user: &User) -> UserOutcome {
        let trigger = &self.request.initiator_id;
        let channel_id = &self.resource.id;
        let team_id = &self.resource.parent_id;

        if user.is_guest && !self.request.include_guests {
            log::info!(
                "not adding guest user, add_user_id={}, trigger_user_id={trigger}, channel_id={channel_id}",
                user.id
            );
            return UserOutcome::SkippedGuest;
        }

        let mut joined_parent = false;
        if self.resource.has_parent() {
            match self.directory.get_parent_member(team_id, &user.id).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    if !self.request.add_to_parent {
                        log::info!(
                            "not adding user since it doesn't belong to the team, add_user_id={}, trigger_user_id={trigger}, channel_id={channel_id}, team_id={team_id}",
                            user.id
                        );
                        return UserOutcome::SkippedNotParentMember;
                    }

                    if let Err(e) = self.directory.add_parent_member(team_id, &user.id).await {
                        log::error!(
                            "error creating team membership for user, add_user_id={}, trigger_user_id={trigger}, channel_id={channel_id}, team_id={team_id}, err={e}",
                            user.id
                        );
                        return UserOutcome::Errored;
                    }
                    joined_parent = true;
                }
                Err(e) => {
                    log::error!(
                        "error getting team membership for user, add_user_id={}, trigger_user_id={trigger}, channel_id={channel_id}, team_id={team_id}, err={e}",
                        user.id
                    );
                    return UserOutcome::Errored;
                }
            }
        }

        if let Err(e) = self
            .directory
            .add_resource_member(channel_id, &user.id, trigger)
            .await
        {
            log::error!(
                "error adding user to channel, add_user_id={}, trigger_user_id={trigger}, channel_id={channel_id}, err={e}",
                user.id
            );
            return if joined_parent {
                UserOutcome::ErroredAfterParentJoin
            } else {
                UserOutcome::Errored
            };
        }

        log::debug!("added user to channel, add_user_id={}, channel_id={channel_id}", user.id);
        UserOutcome::Added { joined_parent }
    }
}
