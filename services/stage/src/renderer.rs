//! Rendering adapters.
//!
//! A [`Renderer`] receives the stage's style and its effect stream. It owns
//! nothing the allocator cares about; it only draws.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tableau_seating::Effect;
use tracing::warn;

/// Numeric style parameters for drawing the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStyle {
    /// Current speaker scale, in percent.
    pub scale_speaker: u32,
    /// Horizontal distance between slots, in percent.
    pub offset: u32,
    /// Scale reduction per slot away from center, in percent.
    pub scale_dropoff: i32,
    /// Transition length in milliseconds.
    pub transition_ms: u64,
    /// Horizontal stage position, 0 to 100.
    pub position: u8,
}

/// Drawing surface for the stage.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create the stage surface.
    async fn mount(&self, style: &StageStyle);

    /// Style parameters changed while mounted.
    async fn update_style(&self, style: &StageStyle);

    /// Apply one effect.
    async fn apply(&self, effect: &Effect);

    /// Remove the stage surface.
    async fn unmount(&self);
}

/// Everything a renderer was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RenderCommand {
    Mount { style: StageStyle },
    UpdateStyle { style: StageStyle },
    Apply { effect: Effect },
    Unmount,
}

/// Renderer that records commands in memory.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    commands: Mutex<Vec<RenderCommand>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded commands.
    pub fn commands(&self) -> Vec<RenderCommand> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Only the applied effects.
    pub fn effects(&self) -> Vec<Effect> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                RenderCommand::Apply { effect } => Some(effect),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, command: RenderCommand) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn mount(&self, style: &StageStyle) {
        self.record(RenderCommand::Mount { style: *style });
    }

    async fn update_style(&self, style: &StageStyle) {
        self.record(RenderCommand::UpdateStyle { style: *style });
    }

    async fn apply(&self, effect: &Effect) {
        self.record(RenderCommand::Apply {
            effect: effect.clone(),
        });
    }

    async fn unmount(&self) {
        self.record(RenderCommand::Unmount);
    }
}

/// Renderer that writes one JSON object per command to a writer.
pub struct JsonLinesRenderer<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Take the writer back.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, command: &RenderCommand) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = serde_json::to_writer(&mut *out, command)
            .map_err(std::io::Error::from)
            .and_then(|()| out.write_all(b"\n"))
            .and_then(|()| out.flush());
        if let Err(e) = written {
            warn!(error = %e, "Failed to write render command");
        }
    }
}

#[async_trait]
impl<W: Write + Send> Renderer for JsonLinesRenderer<W> {
    async fn mount(&self, style: &StageStyle) {
        self.emit(&RenderCommand::Mount { style: *style });
    }

    async fn update_style(&self, style: &StageStyle) {
        self.emit(&RenderCommand::UpdateStyle { style: *style });
    }

    async fn apply(&self, effect: &Effect) {
        self.emit(&RenderCommand::Apply {
            effect: effect.clone(),
        });
    }

    async fn unmount(&self) {
        self.emit(&RenderCommand::Unmount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tableau_seating::Side;

    fn style() -> StageStyle {
        StageStyle {
            scale_speaker: 120,
            offset: 25,
            scale_dropoff: 3,
            transition_ms: 400,
            position: 0,
        }
    }

    #[tokio::test]
    async fn test_json_lines_renderer_writes_one_object_per_line() {
        let renderer = JsonLinesRenderer::new(Vec::new());
        renderer.mount(&style()).await;
        renderer
            .apply(&Effect::Enter {
                name: "Alice".to_string(),
                side: Side::Left,
                slot: 0,
            })
            .await;
        renderer.unmount().await;

        let out = String::from_utf8(renderer.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["command"], "mount");
        assert_eq!(lines[0]["style"]["scale_speaker"], 120);
        assert_eq!(lines[1]["command"], "apply");
        assert_eq!(lines[1]["effect"]["effect"], "enter");
        assert_eq!(lines[1]["effect"]["side"], "left");
        assert_eq!(lines[2], serde_json::json!({"command": "unmount"}));
    }

    #[tokio::test]
    async fn test_recording_renderer_filters_effects() {
        let renderer = RecordingRenderer::new();
        renderer.mount(&style()).await;
        renderer
            .apply(&Effect::Exit {
                name: "Bob".to_string(),
            })
            .await;

        assert_eq!(renderer.commands().len(), 2);
        assert_eq!(
            renderer.effects(),
            vec![Effect::Exit {
                name: "Bob".to_string()
            }]
        );

        renderer.clear();
        assert!(renderer.commands().is_empty());
    }
}
