//! Scripted sessions.
//!
//! A script is a JSON array of steps replayed against an in-memory host, so
//! the stage can be driven end to end without a chat frontend:
//!
//! ```json
//! [
//!   {"step": "group", "id": "tavern", "members": ["Alice", "Bob", "Carol"]},
//!   {"step": "chat_changed"},
//!   {"step": "message", "author": "Bob"},
//!   {"step": "tick"},
//!   {"step": "settings", "patch": {"num_right": 1}},
//!   {"step": "wait", "ms": 1000}
//! ]
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tableau_seating::ChatEntry;
use tracing::{debug, info};

use crate::error::StageError;
use crate::host::MemoryHost;
use crate::settings::ChatSettings;
use crate::stage::Stage;

/// One step of a scripted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Enter a group chat (or change its members) and signal a membership update.
    Group { id: String, members: Vec<String> },

    /// Leave group chat mode.
    LeaveGroup,

    /// A message was rendered.
    Message {
        author: String,
        #[serde(default)]
        is_user: bool,
        #[serde(default)]
        is_system: bool,
    },

    /// The host's own expression image changed.
    Expression { url: String },

    /// Patch global settings.
    Settings { patch: serde_json::Value },

    /// The host switched chats.
    ChatChanged {
        #[serde(default)]
        exclude: Vec<String>,
    },

    /// Run one full pass right away.
    Tick,

    /// Let time pass.
    Wait { ms: u64 },
}

/// Parse a script from JSON text.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, StageError> {
    serde_json::from_str(text).map_err(|e| StageError::Script(e.to_string()))
}

/// Read and parse a script file.
pub async fn load_script(path: &Path) -> Result<Vec<ScriptStep>, StageError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StageError::Script(format!("{}: {}", path.display(), e)))?;
    parse_script(&text)
}

/// Replay `steps` in order.
pub async fn run_script(
    stage: &Arc<Stage>,
    host: &MemoryHost,
    steps: Vec<ScriptStep>,
) -> Result<(), StageError> {
    info!(step_count = steps.len(), "Replaying script");

    for (index, step) in steps.into_iter().enumerate() {
        debug!(index, step = ?step, "Script step");
        match step {
            ScriptStep::Group { id, members } => {
                host.set_group(id, members).await;
                stage.group_updated().await;
            }
            ScriptStep::LeaveGroup => {
                host.clear_group().await;
                stage.chat_changed(ChatSettings::default()).await;
            }
            ScriptStep::Message {
                author,
                is_user,
                is_system,
            } => {
                host.push_message(ChatEntry {
                    author,
                    is_user,
                    is_system,
                })
                .await;
                stage.message_rendered().await;
            }
            ScriptStep::Expression { url } => stage.expression_changed(&url).await,
            ScriptStep::Settings { patch } => {
                let mut next = stage.settings().await;
                next.merge_json(patch)?;
                stage.update_settings(move |settings| *settings = next).await?;
            }
            ScriptStep::ChatChanged { exclude } => {
                let chat = ChatSettings::from_exclude_text(&exclude.join(","));
                stage.chat_changed(chat).await;
            }
            ScriptStep::Tick => stage.tick().await,
            ScriptStep::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
    }

    Ok(())
}
