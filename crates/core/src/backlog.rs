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

//! The rolling trace backlog.
//!
//! Independent of any breakpoint, the backlog retains the last N snapshots
//! whose node or route matches the configured patterns and filter. Tracing
//! is lossy by design: when full, the oldest entries are evicted first, and
//! recording never applies backpressure to the routing pipeline.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use flowdbg_common::{match_patterns, types::EventSnapshot, Exchange, Predicate};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::{DebugError, DebugResult};

/// Hard ceiling on the backlog queue, regardless of configuration.
pub const MAX_BACKLOG_SIZE: usize = 10_000;

/// Default soft limit of the backlog queue.
pub const DEFAULT_BACKLOG_SIZE: usize = 1_000;

/// A bounded FIFO store of traced [`EventSnapshot`]s.
pub struct TraceBacklog {
    enabled: AtomicBool,
    backlog_size: AtomicUsize,
    remove_on_dump: AtomicBool,
    trace_counter: AtomicU64,
    trace_pattern: RwLock<Option<String>>,
    trace_filter: RwLock<Option<Arc<dyn Predicate>>>,
    queue: Mutex<VecDeque<EventSnapshot>>,
}

impl std::fmt::Debug for TraceBacklog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceBacklog")
            .field("enabled", &self.is_enabled())
            .field("backlog_size", &self.backlog_size())
            .field("len", &self.len())
            .finish()
    }
}

impl Default for TraceBacklog {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceBacklog {
    /// Creates a disabled backlog with the default soft limit.
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            backlog_size: AtomicUsize::new(DEFAULT_BACKLOG_SIZE),
            remove_on_dump: AtomicBool::new(true),
            trace_counter: AtomicU64::new(0),
            trace_pattern: RwLock::new(None),
            trace_filter: RwLock::new(None),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Enables tracing.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Disables tracing. Already recorded entries are kept.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Whether tracing is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Sets the soft limit of the queue, within `1..=`[`MAX_BACKLOG_SIZE`].
    pub fn set_backlog_size(&self, size: usize) -> DebugResult<()> {
        if size == 0 || size > MAX_BACKLOG_SIZE {
            return Err(DebugError::InvalidConfiguration(format!(
                "backlog size must be in 1..={MAX_BACKLOG_SIZE}, got {size}"
            )));
        }
        self.backlog_size.store(size, Ordering::Release);
        Ok(())
    }

    /// The configured soft limit.
    pub fn backlog_size(&self) -> usize {
        self.backlog_size.load(Ordering::Acquire)
    }

    /// Whether dumping removes the returned entries (default true).
    pub fn is_remove_on_dump(&self) -> bool {
        self.remove_on_dump.load(Ordering::Acquire)
    }

    /// Configures whether dumping removes the returned entries.
    pub fn set_remove_on_dump(&self, remove: bool) {
        self.remove_on_dump.store(remove, Ordering::Release);
    }

    /// The configured node/route pattern, if any.
    pub fn trace_pattern(&self) -> Option<String> {
        self.trace_pattern.read().clone()
    }

    /// Sets the comma-separated glob pattern traced node or route ids must
    /// match. `None` traces every node.
    pub fn set_trace_pattern(&self, pattern: Option<String>) {
        *self.trace_pattern.write() = pattern;
    }

    /// The source text of the configured trace filter, if any.
    pub fn trace_filter(&self) -> Option<String> {
        self.trace_filter.read().as_ref().map(|p| p.expression().to_string())
    }

    /// Sets the compiled predicate traced exchanges must match. `None`
    /// clears the filter.
    pub fn set_trace_filter(&self, filter: Option<Arc<dyn Predicate>>) {
        *self.trace_filter.write() = filter;
    }

    /// Decides whether an exchange at the given node should be traced.
    ///
    /// True iff tracing is enabled, the node id (checked first) or route id
    /// matches the configured patterns (or none are configured), and the
    /// filter predicate matches (or none is configured). A predicate failure
    /// counts as a non-match.
    pub fn should_trace(&self, node_id: &str, route_id: &str, exchange: &Exchange) -> bool {
        if !self.is_enabled() {
            return false;
        }

        if let Some(pattern) = self.trace_pattern.read().as_deref() {
            if !match_patterns(node_id, pattern) && !match_patterns(route_id, pattern) {
                return false;
            }
        }

        if let Some(filter) = self.trace_filter.read().as_ref() {
            match filter.matches(exchange) {
                Ok(matched) => return matched,
                Err(err) => {
                    debug!(node_id, %err, "trace filter failed, not tracing");
                    return false;
                }
            }
        }

        true
    }

    /// Appends a snapshot, evicting the oldest entries first when the queue
    /// is at or above the soft limit. No-op while disabled.
    pub fn trace_event(&self, snapshot: EventSnapshot) {
        if !self.is_enabled() {
            return;
        }
        self.trace_counter.fetch_add(1, Ordering::Relaxed);

        let limit = self.backlog_size();
        let mut queue = self.queue.lock();
        while queue.len() >= limit {
            queue.pop_front();
        }
        queue.push_back(snapshot);
    }

    /// Returns the traced snapshots for one node, oldest first, removing
    /// them when remove-on-dump is set.
    pub fn dump_traced(&self, node_id: &str) -> Vec<EventSnapshot> {
        let mut queue = self.queue.lock();
        if self.is_remove_on_dump() {
            let mut kept = VecDeque::with_capacity(queue.len());
            let mut dumped = Vec::new();
            for snapshot in queue.drain(..) {
                if snapshot.node_id == node_id {
                    dumped.push(snapshot);
                } else {
                    kept.push_back(snapshot);
                }
            }
            *queue = kept;
            dumped
        } else {
            queue.iter().filter(|s| s.node_id == node_id).cloned().collect()
        }
    }

    /// Returns all traced snapshots, oldest first, removing them when
    /// remove-on-dump is set.
    pub fn dump_all_traced(&self) -> Vec<EventSnapshot> {
        let mut queue = self.queue.lock();
        if self.is_remove_on_dump() {
            queue.drain(..).collect()
        } else {
            queue.iter().cloned().collect()
        }
    }

    /// Number of events traced since the counter was last reset. Not
    /// affected by eviction or dumping.
    pub fn trace_counter(&self) -> u64 {
        self.trace_counter.load(Ordering::Relaxed)
    }

    /// Resets the trace counter to zero.
    pub fn reset_trace_counter(&self) {
        self.trace_counter.store(0, Ordering::Relaxed);
    }

    /// Current number of entries in the queue.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True when the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Drops all queued entries. The trace counter is unaffected.
    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}
