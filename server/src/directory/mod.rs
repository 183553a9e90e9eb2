//! Capabilities the engine needs from the identity/membership directory and
//! the messaging side channel.
//!
//! The engine never implements membership itself; it calls into these
//! traits. [`InMemoryDirectory`] implements both for tests and dry runs.

use crate::common::DirectoryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;

pub use memory::{DirectorySnapshot, InMemoryDirectory, PermissionGrant};

/// A resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub is_guest: bool,
}

impl User {
    pub fn new(id: &str, username: &str) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            is_guest: false,
        }
    }

    pub fn guest(id: &str, username: &str) -> Self {
        Self {
            is_guest: true,
            ..Self::new(id, username)
        }
    }
}

/// Kind of channel-like resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "O", alias = "open")]
    Open,
    #[serde(rename = "P", alias = "private")]
    Private,
    #[serde(rename = "G", alias = "group")]
    Group,
    #[serde(rename = "D", alias = "direct")]
    Direct,
}

/// The resource users are added to, resolved once per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResource {
    pub id: String,
    pub kind: ResourceKind,
    /// Enclosing team; empty when the resource has none.
    #[serde(default)]
    pub parent_id: String,
}

impl TargetResource {
    pub fn new(id: &str, kind: ResourceKind, parent_id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            parent_id: parent_id.to_string(),
        }
    }

    pub fn has_parent(&self) -> bool {
        !self.parent_id.is_empty()
    }
}

/// Named capabilities checked before a job is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManagePublicChannelMembers,
    ManagePrivateChannelMembers,
    ManageCustomGroupMembers,
    AddUserToTeam,
}

/// Membership of a user in a parent collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentMember {
    pub parent_id: String,
    pub user_id: String,
}

/// A message posted into a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Assigned by the sink when the post is created.
    #[serde(default)]
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    /// Thread root this post replies to.
    #[serde(default)]
    pub root_id: Option<String>,
    pub message: String,
}

impl Post {
    pub fn new(channel_id: &str, user_id: &str, message: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            root_id: None,
            message: message.into(),
        }
    }

    pub fn reply_to(mut self, root_id: &str) -> Self {
        self.root_id = Some(root_id.to_string());
        self
    }
}

/// Identity and membership capabilities of the directory service.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_resource(&self, resource_id: &str) -> Result<TargetResource, DirectoryError>;

    async fn get_user(&self, user_id: &str) -> Result<User, DirectoryError>;

    async fn get_user_by_handle(&self, handle: &str) -> Result<User, DirectoryError>;

    async fn has_resource_permission(
        &self,
        user_id: &str,
        resource_id: &str,
        permission: Permission,
    ) -> bool;

    async fn has_parent_permission(
        &self,
        user_id: &str,
        parent_id: &str,
        permission: Permission,
    ) -> bool;

    /// Fails with [`DirectoryError::NotFound`] when the user is not a member.
    async fn get_parent_member(
        &self,
        parent_id: &str,
        user_id: &str,
    ) -> Result<ParentMember, DirectoryError>;

    async fn add_parent_member(
        &self,
        parent_id: &str,
        user_id: &str,
    ) -> Result<ParentMember, DirectoryError>;

    /// Adds `user_id` to the resource on behalf of `actor_id`.
    async fn add_resource_member(
        &self,
        resource_id: &str,
        user_id: &str,
        actor_id: &str,
    ) -> Result<(), DirectoryError>;
}

/// Fire-and-forget messaging into resources and to single users.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Creates the post and returns it with its assigned id.
    async fn create_post(&self, post: Post) -> Result<Post, DirectoryError>;

    /// Sends a message only `user_id` can see.
    async fn send_ephemeral(&self, user_id: &str, message: &str);
}
