//! Host abstraction: where chat history and group membership come from.
//!
//! The stage never owns chat data. It asks the host on every pass, so a host
//! adapter only has to answer two questions: what was said, and who is in
//! the active group.

use async_trait::async_trait;
use tableau_seating::ChatEntry;
use tokio::sync::RwLock;

use crate::error::HostError;

/// Ordered chat history, oldest entry first.
#[async_trait]
pub trait ChatHistory: Send + Sync {
    async fn history(&self) -> Result<Vec<ChatEntry>, HostError>;
}

/// Group membership lookup.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Id of the active group chat, if the current chat is a group.
    async fn active_group(&self) -> Option<String>;

    /// Display names of the group's members, in membership order.
    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, HostError>;
}

/// Everything the stage needs from its host.
pub trait Host: ChatHistory + GroupDirectory {}

impl<T: ChatHistory + GroupDirectory> Host for T {}

#[derive(Debug, Default)]
struct MemoryHostState {
    group: Option<(String, Vec<String>)>,
    history: Vec<ChatEntry>,
}

/// In-memory host driven by tests and scripted sessions.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: RwLock<MemoryHostState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `id` the active group with the given members.
    pub async fn set_group(&self, id: impl Into<String>, members: Vec<String>) {
        self.state.write().await.group = Some((id.into(), members));
    }

    /// Leave group chat mode.
    pub async fn clear_group(&self) {
        self.state.write().await.group = None;
    }

    /// Append a chat entry.
    pub async fn push_message(&self, entry: ChatEntry) {
        self.state.write().await.history.push(entry);
    }

    /// Replace the whole history.
    pub async fn set_history(&self, history: Vec<ChatEntry>) {
        self.state.write().await.history = history;
    }
}

#[async_trait]
impl ChatHistory for MemoryHost {
    async fn history(&self) -> Result<Vec<ChatEntry>, HostError> {
        Ok(self.state.read().await.history.clone())
    }
}

#[async_trait]
impl GroupDirectory for MemoryHost {
    async fn active_group(&self) -> Option<String> {
        self.state
            .read()
            .await
            .group
            .as_ref()
            .map(|(id, _)| id.clone())
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, HostError> {
        match &self.state.read().await.group {
            Some((id, members)) if id == group_id => Ok(members.clone()),
            _ => Err(HostError::GroupNotFound(group_id.to_string())),
        }
    }
}
