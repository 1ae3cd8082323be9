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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable point-in-time snapshot of an exchange at a pipeline node.
///
/// Snapshots carry identity (a process-wide monotonic `uid`), location
/// (route and node ids), and two serialized renderings of the message so
/// operator tooling can pick its preferred format. A rendering is `None`
/// when the dumping facility failed to produce it; the snapshot itself is
/// still valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventSnapshot {
    /// Monotonic sequence number, unique within the owning debug context.
    pub uid: i64,
    /// Wall-clock time the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Id of the route the node belongs to.
    pub route_id: String,
    /// Id of the node the exchange was at when captured.
    pub node_id: String,
    /// Id of the captured exchange.
    pub exchange_id: String,
    /// True when the node is the first of the pipeline for this exchange.
    pub first: bool,
    /// True when this snapshot marks the end of processing for this exchange.
    pub last: bool,
    /// The message rendered as an XML document, if dumping succeeded.
    pub message_as_xml: Option<String>,
    /// The message rendered as a JSON document, if dumping succeeded.
    pub message_as_json: Option<String>,
}

impl EventSnapshot {
    /// Returns a copy of this snapshot with fresh renderings but the same
    /// identity (uid, timestamp, location).
    ///
    /// Used when an operator mutates a suspended exchange: the externally
    /// visible snapshot must reflect the new state without changing which
    /// event it describes.
    pub fn with_renderings(&self, xml: Option<String>, json: Option<String>) -> Self {
        Self {
            message_as_xml: xml,
            message_as_json: json,
            ..self.clone()
        }
    }
}
