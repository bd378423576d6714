//! Discrete events delivered to the editing front-end.
//!
//! Command rejections, item-local media warnings, resource releases and
//! export lifecycle changes are all reported through an [`EventBus`] so the
//! collaborator that owns the UI can surface them without polling.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorClass, ReelError};

/// A classified event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReelEvent {
    /// A timeline command passed validation and was applied.
    CommandCommitted { command: String },

    /// A timeline command was rejected; the timeline is unchanged.
    CommandRejected {
        command: String,
        class: ErrorClass,
        message: String,
    },

    /// A source could not be read in time; a default was substituted.
    MediaLoadWarning {
        item_id: u64,
        /// Display label of the source (file path or byte count).
        source: String,
        message: String,
        substituted_secs: f64,
    },

    /// Decoded media for an item was dropped.
    ResourceReleased { item_id: u64 },

    ExportStarted {
        total_secs: f64,
        container: String,
        codec: String,
        bitrate_bps: u64,
    },

    /// Export progress in percent (0-100).
    ExportProgress { percent: u8 },

    ExportCompleted { file_name: String, bytes: usize },

    ExportFailed { class: ErrorClass, message: String },
}

impl ReelEvent {
    /// Build an `ExportFailed` event from an error.
    pub fn export_failed(err: &ReelError) -> Self {
        Self::ExportFailed {
            class: err.class(),
            message: err.to_string(),
        }
    }

    /// Whether this event reports a problem.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::CommandRejected { .. } | Self::MediaLoadWarning { .. } | Self::ExportFailed { .. }
        )
    }
}

/// Listener callback.
pub type EventListener = Arc<dyn Fn(&ReelEvent) + Send + Sync>;

/// Fan-out of events to registered listeners.
///
/// Clones share the same listener list.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Vec<EventListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: impl Fn(&ReelEvent) + Send + Sync + 'static) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Arc::new(listener));
        }
    }

    /// Deliver an event to every listener.
    pub fn emit(&self, event: ReelEvent) {
        if event.is_error() {
            tracing::warn!(?event, "Event");
        } else {
            tracing::debug!(?event, "Event");
        }

        // Snapshot so listeners may subscribe or emit re-entrantly.
        let listeners: Vec<EventListener> = match self.listeners.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener(&event);
        }
    }

    /// Subscribe a collector that records every event (handy in tests and
    /// for batch reporting in the CLI).
    pub fn collector(&self) -> Arc<Mutex<Vec<ReelEvent>>> {
        let store = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&store);
        self.subscribe(move |event| {
            if let Ok(mut events) = sink.lock() {
                events.push(event.clone());
            }
        });
        store
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.listeners.lock().map(|l| l.len()).unwrap_or(0);
        f.debug_struct("EventBus").field("listeners", &count).finish()
    }
}
