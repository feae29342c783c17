//! Signals exchanged with the host game.
//!
//! Inbound: scene lifecycle events drive auto-save and restore.
//! Outbound: data-changed notifications let the UI re-render after a
//! restore stage rewrites something it displays.

use crate::types::SceneId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneEvent {
    /// The scene is about to be torn down; its state must be captured now.
    AboutToUnload { scene: SceneId },
    /// A fresh instance of the scene has finished constructing.
    FinishedLoading { scene: SceneId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataChannel {
    Inventory,
    Container,
    Market,
}

/// UI refresh hooks called by the restore orchestrator.
pub trait RestoreHooks {
    fn data_changed(&mut self, channel: DataChannel);
}

/// For headless runs with no UI attached.
#[derive(Debug, Default)]
pub struct NoHooks;

impl RestoreHooks for NoHooks {
    fn data_changed(&mut self, _channel: DataChannel) {}
}

/// Records every notification in order. Used by tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub notified: Vec<DataChannel>,
}

impl RestoreHooks for RecordingHooks {
    fn data_changed(&mut self, channel: DataChannel) {
        self.notified.push(channel);
    }
}
