// flowdbg - Message Flow Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine-facing seams.
//!
//! The routing engine drives the debugger core through [`PipelineHooks`] and
//! shares a small amount of mutable configuration through
//! [`EngineSettings`]. Both live here so the core and any engine embedding
//! it agree on one surface.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::Exchange;

/// A lifecycle event of one exchange, delivered to `on_event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ExchangeEvent {
    /// The exchange entered the pipeline.
    #[display("ExchangeCreated")]
    Created,
    /// The exchange finished processing successfully.
    #[display("ExchangeCompleted")]
    Completed,
    /// The exchange finished processing with a failure.
    #[display("ExchangeFailed: {_0}")]
    Failed(String),
}

/// The hook surface the routing engine calls into, once per node visit and
/// once per lifecycle event, always on the routing thread of the exchange.
pub trait PipelineHooks: Send + Sync {
    /// Called before a node processes the exchange. Returns true when a
    /// breakpoint matched (the call may have blocked while the exchange was
    /// suspended).
    fn before_process(&self, exchange: &Exchange, node_id: &str, route_id: &str) -> bool;

    /// Called after a node processed the exchange, with the processing time.
    fn after_process(&self, exchange: &Exchange, node_id: &str, route_id: &str, elapsed: Duration);

    /// Called on exchange lifecycle transitions.
    fn on_event(&self, exchange: &Exchange, event: &ExchangeEvent);
}

#[derive(Debug)]
struct EngineSettingsState {
    name: String,
    message_history: AtomicBool,
}

/// A cloneable handle to the surrounding engine's mutable settings.
///
/// The debugger core needs exactly one knob from its host: whether
/// per-exchange message history is recorded. Without history the debugger
/// cannot answer "where did this exchange fail", so starting the debugger
/// forces the flag on.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    state: Arc<EngineSettingsState>,
}

impl EngineSettings {
    /// Creates settings for an engine with the given name. Message history
    /// starts disabled, as it is in a production engine by default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(EngineSettingsState {
                name: name.into(),
                message_history: AtomicBool::new(false),
            }),
        }
    }

    /// The engine name, used for log correlation.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Whether per-exchange message history is recorded.
    pub fn is_message_history(&self) -> bool {
        self.state.message_history.load(Ordering::Relaxed)
    }

    /// Enables or disables per-exchange message history recording.
    pub fn set_message_history(&self, enabled: bool) {
        self.state.message_history.store(enabled, Ordering::Relaxed);
    }
}
