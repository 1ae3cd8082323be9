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

//! Capture of immutable exchange snapshots.

use std::sync::Arc;

use chrono::Utc;
use flowdbg_common::{types::EventSnapshot, DumpOptions, Exchange, MessageDumper};
use parking_lot::RwLock;
use tracing::debug;

use crate::DebugContext;

/// Produces [`EventSnapshot`]s of an exchange's externally visible state.
///
/// The recorder owns the dump configuration and the sequence counter access;
/// it never mutates the exchange. A failed rendering is logged and omitted
/// from the snapshot, never fatal.
pub struct SnapshotRecorder {
    context: Arc<DebugContext>,
    dumper: Arc<dyn MessageDumper>,
    options: RwLock<DumpOptions>,
}

impl std::fmt::Debug for SnapshotRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotRecorder").field("options", &*self.options.read()).finish()
    }
}

impl SnapshotRecorder {
    /// Creates a recorder with default dump options.
    pub fn new(context: Arc<DebugContext>, dumper: Arc<dyn MessageDumper>) -> Self {
        Self { context, dumper, options: RwLock::new(DumpOptions::default()) }
    }

    /// The current dump options.
    pub fn options(&self) -> DumpOptions {
        self.options.read().clone()
    }

    /// Replaces the dump options.
    pub fn set_options(&self, options: DumpOptions) {
        *self.options.write() = options;
    }

    /// Applies an in-place update to the dump options.
    pub fn update_options(&self, update: impl FnOnce(&mut DumpOptions)) {
        update(&mut self.options.write());
    }

    /// Captures a snapshot of the exchange at the given node.
    ///
    /// `first` and `last` mark pipeline-start and pipeline-end semantics for
    /// the exchange at this node.
    pub fn capture(
        &self,
        exchange: &Exchange,
        node_id: &str,
        route_id: &str,
        first: bool,
        last: bool,
    ) -> EventSnapshot {
        let (xml, json) = self.render(exchange, node_id);
        EventSnapshot {
            uid: self.context.next_uid(),
            timestamp: Utc::now(),
            route_id: route_id.to_string(),
            node_id: node_id.to_string(),
            exchange_id: exchange.exchange_id().to_string(),
            first,
            last,
            message_as_xml: xml,
            message_as_json: json,
        }
    }

    /// Re-renders an existing snapshot against the exchange's current state,
    /// keeping its identity (uid, timestamp, location) untouched.
    ///
    /// Used after an operator mutates a suspended exchange so the externally
    /// visible snapshot reflects the edit.
    pub fn refresh(&self, snapshot: &EventSnapshot, exchange: &Exchange) -> EventSnapshot {
        let (xml, json) = self.render(exchange, &snapshot.node_id);
        snapshot.with_renderings(xml, json)
    }

    fn render(&self, exchange: &Exchange, node_id: &str) -> (Option<String>, Option<String>) {
        let options = self.options.read().clone();
        let xml = match self.dumper.dump_as_xml(exchange, &options) {
            Ok(xml) => Some(xml),
            Err(err) => {
                debug!(node_id, %err, "XML dump failed, omitting rendering from snapshot");
                None
            }
        };
        let json = match self.dumper.dump_as_json(exchange, &options) {
            Ok(json) => Some(json),
            Err(err) => {
                debug!(node_id, %err, "JSON dump failed, omitting rendering from snapshot");
                None
            }
        };
        (xml, json)
    }
}
