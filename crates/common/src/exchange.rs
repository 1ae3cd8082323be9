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

//! The in-memory exchange (unit of work) model.
//!
//! An [`Exchange`] is one message flowing through the routing pipeline. The
//! routing thread owns it logically, but while the exchange is suspended at a
//! breakpoint an operator thread must be able to read and mutate its body,
//! headers, properties and variables. The handle is therefore a cheap clone
//! over shared interior state guarded by a read-write lock; the routing
//! thread is parked on a gate whenever an operator mutates, so the lock is
//! never contended for long.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The payload carried by an exchange.
///
/// Stream and file payloads are modelled separately from plain values so the
/// dumping facility can honor the "include streams" / "include files"
/// configuration when rendering snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    /// An in-memory structured payload.
    Value(Value),
    /// A streaming payload buffered as text; dumped only when streams are allowed.
    Stream(String),
    /// A file-backed payload referenced by path; dumped only when files are allowed.
    File(PathBuf),
}

impl MessageBody {
    /// Returns the in-memory value if this body is a plain value.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for MessageBody {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for MessageBody {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<String> for MessageBody {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

/// One entry of an exchange's linear processing history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVisit {
    /// Id of the visited pipeline node.
    pub node_id: String,
    /// Id of the route the node belongs to.
    pub route_id: String,
    /// Wall-clock time of the visit.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ExchangeState {
    route_id: String,
    body: Option<MessageBody>,
    headers: BTreeMap<String, Value>,
    properties: BTreeMap<String, Value>,
    variables: BTreeMap<String, Value>,
    exception: Option<String>,
    history: Vec<NodeVisit>,
}

/// A cloneable handle to one unit of work flowing through the pipeline.
///
/// Cloning the handle shares the underlying state; identity is the exchange
/// id, which is fixed at creation and stable for the exchange's lifetime.
#[derive(Debug, Clone)]
pub struct Exchange {
    exchange_id: Arc<str>,
    state: Arc<RwLock<ExchangeState>>,
}

impl Exchange {
    /// Creates a new exchange with the given id, bound to a route.
    pub fn new(exchange_id: impl Into<String>, route_id: impl Into<String>) -> Self {
        Self {
            exchange_id: Arc::from(exchange_id.into()),
            state: Arc::new(RwLock::new(ExchangeState {
                route_id: route_id.into(),
                ..Default::default()
            })),
        }
    }

    /// The stable identifier of this exchange.
    pub fn exchange_id(&self) -> &str {
        &self.exchange_id
    }

    /// The id of the route currently processing this exchange.
    pub fn route_id(&self) -> String {
        self.state.read().route_id.clone()
    }

    /// The current message body, if any.
    pub fn body(&self) -> Option<MessageBody> {
        self.state.read().body.clone()
    }

    /// Replaces the message body. `None` clears it.
    pub fn set_body(&self, body: Option<MessageBody>) {
        self.state.write().body = body;
    }

    /// Looks up a single message header.
    pub fn header(&self, name: &str) -> Option<Value> {
        self.state.read().headers.get(name).cloned()
    }

    /// All message headers in name order.
    pub fn headers(&self) -> BTreeMap<String, Value> {
        self.state.read().headers.clone()
    }

    /// Sets a message header, replacing any previous value.
    pub fn set_header(&self, name: impl Into<String>, value: Value) {
        self.state.write().headers.insert(name.into(), value);
    }

    /// Removes a message header. Returns the previous value if present.
    pub fn remove_header(&self, name: &str) -> Option<Value> {
        self.state.write().headers.remove(name)
    }

    /// Looks up a single exchange-scoped property.
    pub fn property(&self, name: &str) -> Option<Value> {
        self.state.read().properties.get(name).cloned()
    }

    /// All exchange-scoped properties in name order.
    pub fn properties(&self) -> BTreeMap<String, Value> {
        self.state.read().properties.clone()
    }

    /// Sets an exchange-scoped property, replacing any previous value.
    pub fn set_property(&self, name: impl Into<String>, value: Value) {
        self.state.write().properties.insert(name.into(), value);
    }

    /// Removes an exchange-scoped property. Returns the previous value if present.
    pub fn remove_property(&self, name: &str) -> Option<Value> {
        self.state.write().properties.remove(name)
    }

    /// Looks up a single exchange-scoped variable.
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.state.read().variables.get(name).cloned()
    }

    /// All exchange-scoped variables in name order.
    pub fn variables(&self) -> BTreeMap<String, Value> {
        self.state.read().variables.clone()
    }

    /// Sets an exchange-scoped variable, replacing any previous value.
    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.state.write().variables.insert(name.into(), value);
    }

    /// Removes an exchange-scoped variable. Returns the previous value if present.
    pub fn remove_variable(&self, name: &str) -> Option<Value> {
        self.state.write().variables.remove(name)
    }

    /// The exception message attached to this exchange, if it has failed.
    pub fn exception(&self) -> Option<String> {
        self.state.read().exception.clone()
    }

    /// Attaches or clears an exception message.
    pub fn set_exception(&self, exception: Option<String>) {
        self.state.write().exception = exception;
    }

    /// Appends a node visit to the processing history.
    ///
    /// The routing engine calls this once per node, before invoking the
    /// debugger hooks, so the history always contains the node currently
    /// being processed as its last entry.
    pub fn record_visit(&self, node_id: impl Into<String>, route_id: impl Into<String>) {
        let mut state = self.state.write();
        let route_id = route_id.into();
        state.route_id.clone_from(&route_id);
        state.history.push(NodeVisit {
            node_id: node_id.into(),
            route_id,
            timestamp: Utc::now(),
        });
    }

    /// The linear processing history of this exchange, oldest first.
    pub fn history(&self) -> Vec<NodeVisit> {
        self.state.read().history.clone()
    }

    /// The most recently visited node id, if any node has been visited.
    pub fn last_visited_node(&self) -> Option<String> {
        self.state.read().history.last().map(|v| v.node_id.clone())
    }

    /// True while this exchange has visited at most one node.
    pub fn is_first_visit(&self) -> bool {
        self.state.read().history.len() <= 1
    }

    /// True if both handles refer to the same underlying exchange.
    pub fn same_exchange(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}
