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

//! The low-level breakpoint registry and hook dispatcher.
//!
//! The [`Debugger`] holds the registered breakpoint handlers with their
//! attached conditions and routes `before_process`/`after_process`/`on_event`
//! calls from the routing engine to every matching, active handler. It also
//! owns the single-step registry binding one exchange id to an ad-hoc
//! handler, guarded by a hard admission ceiling.
//!
//! Every invocation of a condition or handler crosses a catch-log-continue
//! boundary: a faulty breakpoint must never abort the pipeline.

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use flowdbg_common::{
    types::BreakpointState, Exchange, ExchangeEvent, Predicate,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::DebugContext;

/// Hard ceiling on concurrently stepping exchanges. Admission control, not a
/// queue: starting a session beyond the ceiling is refused.
pub const MAX_CONCURRENT_SINGLE_STEPS: usize = 1;

/// The capability interface of a breakpoint implementation.
///
/// Implementations form a small closed set (a node breakpoint suspending at
/// one pipeline node, a step breakpoint following one exchange); the
/// [`Debugger`] only sees this interface.
pub trait BreakpointHandler: Send + Sync {
    /// The current activation state.
    fn state(&self) -> BreakpointState;

    /// Arms the breakpoint.
    fn activate(&self);

    /// Parks the breakpoint: it is skipped during matching until activated
    /// again. Exchanges it already suspended stay suspended.
    fn suspend(&self);

    /// Invoked when the breakpoint matched before a node processes the
    /// exchange. May block the calling (routing) thread.
    fn before_hit(&self, exchange: &Exchange, node_id: &str, route_id: &str);

    /// Invoked when the breakpoint matched after a node processed the
    /// exchange.
    fn after_hit(&self, exchange: &Exchange, node_id: &str, route_id: &str, elapsed: Duration);

    /// Invoked on exchange lifecycle events. `last_node_id` is the most
    /// recent node from the exchange's processing history, not a live call
    /// site.
    fn on_lifecycle_event(
        &self,
        exchange: &Exchange,
        event: &ExchangeEvent,
        last_node_id: Option<&str>,
    );
}

/// A condition attached to a registered breakpoint. All conditions of one
/// breakpoint must match for the breakpoint to trigger.
pub trait Condition: Send + Sync {
    /// Whether the breakpoint applies to this node visit.
    fn match_process(&self, exchange: &Exchange, node_id: &str, route_id: &str) -> bool;

    /// Whether the breakpoint applies to this lifecycle event.
    fn match_event(&self, exchange: &Exchange, event: &ExchangeEvent) -> bool {
        let _ = (exchange, event);
        false
    }
}

/// Matches visits to one specific pipeline node.
#[derive(Debug, Clone)]
pub struct NodeIdCondition {
    node_id: String,
}

impl NodeIdCondition {
    /// Creates a condition matching visits to `node_id`.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self { node_id: node_id.into() }
    }
}

impl Condition for NodeIdCondition {
    fn match_process(&self, _exchange: &Exchange, node_id: &str, _route_id: &str) -> bool {
        self.node_id == node_id
    }
}

/// Adapts a compiled [`Predicate`] into a condition. A predicate failure
/// counts as a non-match and is logged, never propagated.
pub struct PredicateCondition {
    predicate: Arc<dyn Predicate>,
}

impl PredicateCondition {
    /// Wraps a compiled predicate.
    pub fn new(predicate: Arc<dyn Predicate>) -> Self {
        Self { predicate }
    }

    fn evaluate(&self, exchange: &Exchange) -> bool {
        match self.predicate.matches(exchange) {
            Ok(matched) => matched,
            Err(err) => {
                debug!(expression = self.predicate.expression(), %err,
                    "breakpoint condition failed, treating as non-match");
                false
            }
        }
    }
}

impl Condition for PredicateCondition {
    fn match_process(&self, exchange: &Exchange, _node_id: &str, _route_id: &str) -> bool {
        self.evaluate(exchange)
    }

    fn match_event(&self, exchange: &Exchange, _event: &ExchangeEvent) -> bool {
        self.evaluate(exchange)
    }
}

#[derive(Clone)]
struct BreakpointEntry {
    handler: Arc<dyn BreakpointHandler>,
    conditions: Vec<Arc<dyn Condition>>,
    // Entries registered via add_single_step_breakpoint: armed by a Created
    // event, torn down on Completed/Failed, never matched directly.
    single_step_lifecycle: bool,
}

impl BreakpointEntry {
    fn is_active(&self) -> bool {
        self.handler.state() == BreakpointState::Active
    }

    fn match_process(&self, exchange: &Exchange, node_id: &str, route_id: &str) -> bool {
        self.conditions
            .iter()
            .all(|c| guarded(|| c.match_process(exchange, node_id, route_id)).unwrap_or(false))
    }

    fn match_event(&self, exchange: &Exchange, event: &ExchangeEvent) -> bool {
        self.conditions
            .iter()
            .all(|c| guarded(|| c.match_event(exchange, event)).unwrap_or(false))
    }
}

/// Runs a user-supplied callback behind the catch-log-continue boundary.
fn guarded<R>(f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => Some(result),
        Err(_) => {
            warn!("breakpoint callback panicked, ignoring");
            None
        }
    }
}

/// The breakpoint registry and dispatch core.
pub struct Debugger {
    context: Arc<DebugContext>,
    breakpoints: RwLock<Vec<BreakpointEntry>>,
    single_steps: Mutex<HashMap<String, Arc<dyn BreakpointHandler>>>,
    max_concurrent_single_steps: usize,
    started: AtomicBool,
}

impl std::fmt::Debug for Debugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debugger")
            .field("started", &self.is_started())
            .field("breakpoints", &self.breakpoint_count())
            .field("single_steps", &self.single_step_count())
            .finish()
    }
}

impl Debugger {
    /// Creates a stopped debugger bound to the given context.
    pub fn new(context: Arc<DebugContext>) -> Self {
        Self {
            context,
            breakpoints: RwLock::new(Vec::new()),
            single_steps: Mutex::new(HashMap::new()),
            max_concurrent_single_steps: MAX_CONCURRENT_SINGLE_STEPS,
            started: AtomicBool::new(false),
        }
    }

    /// Starts dispatching. Forces per-exchange message history on in the
    /// engine settings: without history, lifecycle events cannot recover
    /// where an exchange failed.
    pub fn start(&self) {
        let settings = self.context.settings();
        if !settings.is_message_history() {
            warn!(
                engine = settings.name(),
                "debugger requires message history, forcing it on"
            );
            settings.set_message_history(true);
        }
        self.started.store(true, Ordering::Release);
    }

    /// Stops dispatching and clears both registries.
    pub fn stop(&self) {
        self.started.store(false, Ordering::Release);
        self.breakpoints.write().clear();
        self.single_steps.lock().clear();
    }

    /// Whether the debugger is dispatching.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Registers a breakpoint without conditions.
    pub fn add_breakpoint(&self, handler: Arc<dyn BreakpointHandler>) {
        self.add_breakpoint_with_conditions(handler, Vec::new());
    }

    /// Registers a breakpoint with conditions; all of them must match for
    /// the breakpoint to trigger.
    pub fn add_breakpoint_with_conditions(
        &self,
        handler: Arc<dyn BreakpointHandler>,
        conditions: Vec<Arc<dyn Condition>>,
    ) {
        self.breakpoints.write().push(BreakpointEntry {
            handler,
            conditions,
            single_step_lifecycle: false,
        });
    }

    /// Registers a breakpoint whose lifecycle is bound to one exchange: a
    /// `Created` event matching the conditions starts a single-step session
    /// for that exchange, and its completion tears the session down.
    pub fn add_single_step_breakpoint(
        &self,
        handler: Arc<dyn BreakpointHandler>,
        conditions: Vec<Arc<dyn Condition>>,
    ) {
        self.breakpoints.write().push(BreakpointEntry {
            handler,
            conditions,
            single_step_lifecycle: true,
        });
    }

    /// Removes a breakpoint by identity.
    pub fn remove_breakpoint(&self, handler: &Arc<dyn BreakpointHandler>) {
        self.breakpoints.write().retain(|entry| !Arc::ptr_eq(&entry.handler, handler));
    }

    /// Removes every breakpoint and single-step binding.
    pub fn remove_all_breakpoints(&self) {
        self.breakpoints.write().clear();
        self.single_steps.lock().clear();
    }

    /// The registered breakpoint handlers.
    pub fn breakpoints(&self) -> Vec<Arc<dyn BreakpointHandler>> {
        self.breakpoints.read().iter().map(|entry| entry.handler.clone()).collect()
    }

    /// Number of registered breakpoints.
    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.read().len()
    }

    /// Parks every registered breakpoint.
    pub fn suspend_all_breakpoints(&self) {
        for entry in self.breakpoints.read().iter() {
            entry.handler.suspend();
        }
    }

    /// Arms every registered breakpoint.
    pub fn activate_all_breakpoints(&self) {
        for entry in self.breakpoints.read().iter() {
            entry.handler.activate();
        }
    }

    /// Binds an exchange id to a single-step handler if the concurrency
    /// ceiling allows it. Returns false when refused; an existing session is
    /// never disturbed.
    pub fn start_single_step(
        &self,
        exchange_id: impl Into<String>,
        handler: Arc<dyn BreakpointHandler>,
    ) -> bool {
        let exchange_id = exchange_id.into();
        let mut bindings = self.single_steps.lock();
        if bindings.contains_key(&exchange_id) || bindings.len() >= self.max_concurrent_single_steps
        {
            debug!(exchange_id = %exchange_id, "single-step session refused, ceiling reached");
            return false;
        }
        bindings.insert(exchange_id, handler);
        true
    }

    /// Unbinds an exchange id from its single-step handler, if bound.
    pub fn stop_single_step(&self, exchange_id: &str) {
        self.single_steps.lock().remove(exchange_id);
    }

    /// Whether the exchange id has an active single-step binding.
    pub fn is_single_stepping(&self, exchange_id: &str) -> bool {
        self.single_steps.lock().contains_key(exchange_id)
    }

    /// Number of active single-step bindings.
    pub fn single_step_count(&self) -> usize {
        self.single_steps.lock().len()
    }

    fn single_step_handler(&self, exchange_id: &str) -> Option<Arc<dyn BreakpointHandler>> {
        self.single_steps.lock().get(exchange_id).cloned()
    }

    fn entries(&self) -> Vec<BreakpointEntry> {
        self.breakpoints.read().clone()
    }

    /// Dispatches a before-node hook. Returns true when at least one
    /// breakpoint matched. A single-step binding for the exchange matches
    /// unconditionally and short-circuits the registry.
    pub fn before_process(&self, exchange: &Exchange, node_id: &str, route_id: &str) -> bool {
        if !self.is_started() {
            return false;
        }

        if let Some(handler) = self.single_step_handler(exchange.exchange_id()) {
            guarded(|| handler.before_hit(exchange, node_id, route_id));
            return true;
        }

        let mut matched = false;
        for entry in self.entries() {
            if entry.single_step_lifecycle || !entry.is_active() {
                continue;
            }
            if entry.match_process(exchange, node_id, route_id) {
                guarded(|| entry.handler.before_hit(exchange, node_id, route_id));
                matched = true;
            }
        }
        matched
    }

    /// Dispatches an after-node hook, mirroring [`before_process`](Self::before_process).
    pub fn after_process(
        &self,
        exchange: &Exchange,
        node_id: &str,
        route_id: &str,
        elapsed: Duration,
    ) -> bool {
        if !self.is_started() {
            return false;
        }

        if let Some(handler) = self.single_step_handler(exchange.exchange_id()) {
            guarded(|| handler.after_hit(exchange, node_id, route_id, elapsed));
            return true;
        }

        let mut matched = false;
        for entry in self.entries() {
            if entry.single_step_lifecycle || !entry.is_active() {
                continue;
            }
            if entry.match_process(exchange, node_id, route_id) {
                guarded(|| entry.handler.after_hit(exchange, node_id, route_id, elapsed));
                matched = true;
            }
        }
        matched
    }

    /// Dispatches an exchange lifecycle event.
    ///
    /// A single-step binding receives the event first and short-circuits the
    /// registry; lifecycle-bound entries are armed on `Created` and torn
    /// down when their exchange completes or fails.
    pub fn on_event(&self, exchange: &Exchange, event: &ExchangeEvent) {
        if !self.is_started() {
            return;
        }

        let last_node = exchange.last_visited_node();
        let exchange_id = exchange.exchange_id();

        if let Some(handler) = self.single_step_handler(exchange_id) {
            guarded(|| handler.on_lifecycle_event(exchange, event, last_node.as_deref()));
            if matches!(event, ExchangeEvent::Completed | ExchangeEvent::Failed(_)) {
                // Lifecycle-bound entries own their binding; the handler of
                // an explicit session tears itself down instead.
                let auto_owned = self.entries().iter().any(|entry| {
                    entry.single_step_lifecycle && Arc::ptr_eq(&entry.handler, &handler)
                });
                if auto_owned {
                    self.stop_single_step(exchange_id);
                }
            }
            return;
        }

        if *event == ExchangeEvent::Created {
            for entry in self.entries() {
                if entry.single_step_lifecycle
                    && entry.is_active()
                    && entry.match_event(exchange, event)
                    && !self.start_single_step(exchange_id, entry.handler.clone())
                {
                    debug!(exchange_id, "lifecycle breakpoint could not start single-step session");
                }
            }
        }

        for entry in self.entries() {
            if entry.single_step_lifecycle || !entry.is_active() {
                continue;
            }
            if entry.match_event(exchange, event) {
                guarded(|| entry.handler.on_lifecycle_event(exchange, event, last_node.as_deref()));
            }
        }
    }
}
