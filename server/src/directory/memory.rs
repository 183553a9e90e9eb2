use super::{
    Directory, NotificationSink, ParentMember, Permission, Post, TargetResource, User,
};
use crate::common::DirectoryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// A permission held by a user over a resource or a parent collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub user_id: String,
    /// Resource id or parent id the permission applies to.
    pub scope_id: String,
    pub permission: Permission,
}

/// Serializable contents of an [`InMemoryDirectory`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub resources: Vec<TargetResource>,
    #[serde(default)]
    pub parent_members: Vec<ParentMember>,
    #[serde(default)]
    pub grants: Vec<PermissionGrant>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<String, User>,
    resources: HashMap<String, TargetResource>,
    parent_members: HashSet<(String, String)>,
    resource_members: HashSet<(String, String)>,
    grants: HashSet<PermissionGrant>,
    posts: Vec<Post>,
    ephemeral: Vec<(String, String)>,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Faults {
    handles: HashSet<String>,
    membership_lookups: HashSet<String>,
    parent_adds: HashSet<String>,
    resource_adds: HashSet<String>,
    panicking_users: HashSet<String>,
    posts_containing: Vec<String>,
}

/// Directory and notification sink held entirely in memory.
///
/// Records every membership change and post, and can be told to fail
/// specific calls so partial-failure paths can be driven deterministically.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: Mutex<State>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        let directory = Self::new();
        {
            let mut state = directory.state();
            for user in snapshot.users {
                state.users.insert(user.id.clone(), user);
            }
            for resource in snapshot.resources {
                state.resources.insert(resource.id.clone(), resource);
            }
            for member in snapshot.parent_members {
                state
                    .parent_members
                    .insert((member.parent_id, member.user_id));
            }
            state.grants.extend(snapshot.grants);
        }
        directory
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic injected by a test must not poison the directory for the
        // rest of that test.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_user(&self, user: User) -> &Self {
        self.state().users.insert(user.id.clone(), user);
        self
    }

    pub fn add_resource(&self, resource: TargetResource) -> &Self {
        self.state().resources.insert(resource.id.clone(), resource);
        self
    }

    pub fn add_member_of_parent(&self, parent_id: &str, user_id: &str) -> &Self {
        self.state()
            .parent_members
            .insert((parent_id.to_string(), user_id.to_string()));
        self
    }

    pub fn grant(&self, user_id: &str, scope_id: &str, permission: Permission) -> &Self {
        self.state().grants.insert(PermissionGrant {
            user_id: user_id.to_string(),
            scope_id: scope_id.to_string(),
            permission,
        });
        self
    }

    /// Handle lookups for `handle` fail with a non-not-found error.
    pub fn fail_handle(&self, handle: &str) -> &Self {
        self.state().faults.handles.insert(handle.to_string());
        self
    }

    /// Parent membership lookups for `user_id` fail with a non-not-found error.
    pub fn fail_membership_lookup(&self, user_id: &str) -> &Self {
        self.state()
            .faults
            .membership_lookups
            .insert(user_id.to_string());
        self
    }

    pub fn fail_parent_add(&self, user_id: &str) -> &Self {
        self.state().faults.parent_adds.insert(user_id.to_string());
        self
    }

    pub fn fail_resource_add(&self, user_id: &str) -> &Self {
        self.state().faults.resource_adds.insert(user_id.to_string());
        self
    }

    /// `get_user(user_id)` panics instead of answering.
    pub fn panic_on_user(&self, user_id: &str) -> &Self {
        self.state()
            .faults
            .panicking_users
            .insert(user_id.to_string());
        self
    }

    /// Posts whose message contains `fragment` fail.
    pub fn fail_posts_containing(&self, fragment: &str) -> &Self {
        self.state()
            .faults
            .posts_containing
            .push(fragment.to_string());
        self
    }

    pub fn posts(&self) -> Vec<Post> {
        self.state().posts.clone()
    }

    /// Ephemeral messages as `(user_id, message)` pairs.
    pub fn ephemeral_messages(&self) -> Vec<(String, String)> {
        self.state().ephemeral.clone()
    }

    pub fn is_resource_member(&self, resource_id: &str, user_id: &str) -> bool {
        self.state()
            .resource_members
            .contains(&(resource_id.to_string(), user_id.to_string()))
    }

    pub fn is_parent_member(&self, parent_id: &str, user_id: &str) -> bool {
        self.state()
            .parent_members
            .contains(&(parent_id.to_string(), user_id.to_string()))
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn get_resource(&self, resource_id: &str) -> Result<TargetResource, DirectoryError> {
        self.state()
            .resources
            .get(resource_id)
            .cloned()
            .ok_or_else(|| DirectoryError::not_found("channel", resource_id))
    }

    async fn get_user(&self, user_id: &str) -> Result<User, DirectoryError> {
        let state = self.state();
        if state.faults.panicking_users.contains(user_id) {
            drop(state);
            panic!("directory crashed resolving user {user_id}");
        }
        state
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| DirectoryError::not_found("user", user_id))
    }

    async fn get_user_by_handle(&self, handle: &str) -> Result<User, DirectoryError> {
        let state = self.state();
        if state.faults.handles.contains(handle) {
            return Err(DirectoryError::Failed(format!(
                "username lookup failed for {handle}"
            )));
        }
        state
            .users
            .values()
            .find(|user| user.username == handle)
            .cloned()
            .ok_or_else(|| DirectoryError::not_found("user", handle))
    }

    async fn has_resource_permission(
        &self,
        user_id: &str,
        resource_id: &str,
        permission: Permission,
    ) -> bool {
        self.state().grants.contains(&PermissionGrant {
            user_id: user_id.to_string(),
            scope_id: resource_id.to_string(),
            permission,
        })
    }

    async fn has_parent_permission(
        &self,
        user_id: &str,
        parent_id: &str,
        permission: Permission,
    ) -> bool {
        self.has_resource_permission(user_id, parent_id, permission)
            .await
    }

    async fn get_parent_member(
        &self,
        parent_id: &str,
        user_id: &str,
    ) -> Result<ParentMember, DirectoryError> {
        let state = self.state();
        if state.faults.membership_lookups.contains(user_id) {
            return Err(DirectoryError::Failed(format!(
                "membership lookup failed for {user_id}"
            )));
        }
        let key = (parent_id.to_string(), user_id.to_string());
        if state.parent_members.contains(&key) {
            Ok(ParentMember {
                parent_id: key.0,
                user_id: key.1,
            })
        } else {
            Err(DirectoryError::not_found("team member", user_id))
        }
    }

    async fn add_parent_member(
        &self,
        parent_id: &str,
        user_id: &str,
    ) -> Result<ParentMember, DirectoryError> {
        let mut state = self.state();
        if state.faults.parent_adds.contains(user_id) {
            return Err(DirectoryError::Failed(format!(
                "could not add {user_id} to team {parent_id}"
            )));
        }
        state
            .parent_members
            .insert((parent_id.to_string(), user_id.to_string()));
        Ok(ParentMember {
            parent_id: parent_id.to_string(),
            user_id: user_id.to_string(),
        })
    }

    async fn add_resource_member(
        &self,
        resource_id: &str,
        user_id: &str,
        _actor_id: &str,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state();
        if state.faults.resource_adds.contains(user_id) {
            return Err(DirectoryError::Failed(format!(
                "could not add {user_id} to channel {resource_id}"
            )));
        }
        state
            .resource_members
            .insert((resource_id.to_string(), user_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for InMemoryDirectory {
    async fn create_post(&self, mut post: Post) -> Result<Post, DirectoryError> {
        let mut state = self.state();
        if state
            .faults
            .posts_containing
            .iter()
            .any(|fragment| post.message.contains(fragment.as_str()))
        {
            return Err(DirectoryError::Failed("post rejected".to_string()));
        }
        post.id = uuid::Uuid::new_v4().simple().to_string();
        state.posts.push(post.clone());
        Ok(post)
    }

    async fn send_ephemeral(&self, user_id: &str, message: &str) {
        self.state()
            .ephemeral
            .push((user_id.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ResourceKind;
    use claims::*;

    #[test]
    fn test_snapshot_deserialize() {
        let snapshot: DirectorySnapshot = serde_json::from_str(
            r#"{
                "users": [{"id": "u1", "username": "alice"}, {"id": "u2", "username": "bob", "is_guest": true}],
                "resources": [{"id": "c1", "kind": "O", "parent_id": "t1"}],
                "parent_members": [{"parent_id": "t1", "user_id": "u1"}],
                "grants": [{"user_id": "u1", "scope_id": "c1", "permission": "manage_public_channel_members"}]
            }"#,
        )
        .unwrap();

        let directory = InMemoryDirectory::from_snapshot(snapshot);

        assert!(directory.is_parent_member("t1", "u1"));
        assert!(!directory.is_parent_member("t1", "u2"));
        assert_eq!(directory.state().users["u2"], User::guest("u2", "bob"));
        assert_eq!(
            directory.state().resources["c1"].kind,
            ResourceKind::Open
        );
    }

    #[tokio::test]
    async fn test_membership_not_found_is_distinguished() {
        let directory = InMemoryDirectory::new();
        directory.fail_membership_lookup("broken");

        let missing = directory.get_parent_member("t1", "u1").await.unwrap_err();
        let broken = directory.get_parent_member("t1", "broken").await.unwrap_err();

        assert!(missing.is_not_found());
        assert!(!broken.is_not_found());
    }

    #[tokio::test]
    async fn test_create_post_assigns_id() {
        let directory = InMemoryDirectory::new();

        let post = assert_ok!(directory.create_post(Post::new("c1", "bot", "hello")).await);

        assert!(!post.id.is_empty());
        assert_eq!(directory.posts(), vec![post]);
    }

    #[tokio::test]
    async fn test_permissions_are_scoped() {
        let directory = InMemoryDirectory::new();
        directory.grant("u1", "c1", Permission::ManagePublicChannelMembers);

        assert!(
            directory
                .has_resource_permission("u1", "c1", Permission::ManagePublicChannelMembers)
                .await
        );
        assert!(
            !directory
                .has_resource_permission("u1", "c2", Permission::ManagePublicChannelMembers)
                .await
        );
    }
}
