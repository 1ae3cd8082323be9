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

//! The operator-facing suspend/resume/step engine.
//!
//! The [`DebugController`] owns per-node breakpoints backed by per-node
//! suspension slots, the snapshot cache, the global suspend-mode gate, and
//! single-step session orchestration. It is where cross-thread blocking and
//! release happen: routing threads park here when a breakpoint matches, and
//! operator threads release them.
//!
//! # Suspension protocol
//!
//! On a condition match the routing thread atomically claims the per-node
//! slot (a second exchange arriving at an occupied slot continues
//! unsuspended), captures a snapshot, and parks on the slot's gate with a
//! bounded wait. Release happens on explicit resume, bulk resume, breakpoint
//! removal, shutdown, or timeout; a timed-out exchange proceeds as if
//! resumed. The releasing side always removes the slot mapping atomically
//! first and releases the returned gate second, so a concurrent new arrival
//! can never merge with a stale mapping.

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use dashmap::{mapref::entry::Entry, DashMap};
use flowdbg_common::{
    suspend_mode_from_env,
    types::{BreakpointSpec, BreakpointState, EventSnapshot, DEFAULT_CONDITION_LANGUAGE},
    DefaultMessageDumper, DefaultTypeConverter, DumpOptions, EngineSettings, Exchange,
    ExchangeEvent, ExpressionResolver, MessageBody, MessageDumper, PipelineHooks, Predicate,
    SimpleExpressionResolver, TypeConverter,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, error, info, trace, warn, Level};

use crate::{
    BreakpointHandler, Condition, DebugContext, DebugError, DebugResult, Debugger,
    NodeIdCondition, PredicateCondition, SnapshotRecorder, SuspendGate, TraceBacklog,
};

/// How long a suspended exchange waits for an operator before proceeding on
/// its own.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// One suspended exchange parked at a node: the exchange reference plus the
/// gate its routing thread is waiting on.
struct SuspendedExchange {
    exchange: Exchange,
    gate: Arc<SuspendGate>,
}

/// A registered per-node breakpoint: its spec and the hook installed in the
/// [`Debugger`].
struct NodeBreakpoint {
    spec: BreakpointSpec,
    hook: Arc<BreakpointHook>,
}

/// The closed set of hook behaviors, selected by tag.
enum HookKind {
    /// Suspends exchanges arriving at one pipeline node.
    Node,
    /// Follows one exchange (by id) through every subsequent node.
    Step { exchange_id: String },
}

/// The one breakpoint implementation dispatched by the [`Debugger`];
/// behavior is selected by [`HookKind`].
struct BreakpointHook {
    controller: Weak<ControllerState>,
    kind: HookKind,
    state: Mutex<BreakpointState>,
}

impl BreakpointHook {
    fn new(controller: &Arc<ControllerState>, kind: HookKind) -> Arc<Self> {
        Arc::new(Self {
            controller: Arc::downgrade(controller),
            kind,
            state: Mutex::new(BreakpointState::Active),
        })
    }
}

impl BreakpointHandler for BreakpointHook {
    fn state(&self) -> BreakpointState {
        *self.state.lock()
    }

    fn activate(&self) {
        *self.state.lock() = BreakpointState::Active;
    }

    fn suspend(&self) {
        *self.state.lock() = BreakpointState::Suspended;
    }

    fn before_hit(&self, exchange: &Exchange, node_id: &str, route_id: &str) {
        let Some(controller) = self.controller.upgrade() else { return };
        controller.suspend_and_wait(exchange, node_id, route_id, false);
    }

    fn after_hit(&self, exchange: &Exchange, node_id: &str, _route_id: &str, elapsed: Duration) {
        // Node breakpoints only match before a node runs; the after hook is
        // meaningful for step sessions, which observe it for diagnostics.
        if let HookKind::Step { .. } = self.kind {
            trace!(
                exchange_id = exchange.exchange_id(),
                node_id,
                elapsed_us = elapsed.as_micros() as u64,
                "step session passed node"
            );
        }
    }

    fn on_lifecycle_event(
        &self,
        exchange: &Exchange,
        event: &ExchangeEvent,
        last_node_id: Option<&str>,
    ) {
        let HookKind::Step { exchange_id } = &self.kind else { return };
        if exchange.exchange_id() != exchange_id {
            return;
        }
        let Some(controller) = self.controller.upgrade() else { return };
        match event {
            ExchangeEvent::Created => {}
            ExchangeEvent::Completed | ExchangeEvent::Failed(_) => {
                controller.step_exchange_ended(exchange, last_node_id);
            }
        }
    }
}

struct ControllerState {
    debugger: Debugger,
    recorder: SnapshotRecorder,
    backlog: TraceBacklog,
    resolver: Arc<dyn ExpressionResolver>,
    converter: Arc<dyn TypeConverter>,
    enabled: AtomicBool,
    breakpoints: DashMap<String, NodeBreakpoint>,
    suspended: DashMap<String, SuspendedExchange>,
    snapshots: DashMap<String, EventSnapshot>,
    debug_counter: AtomicU64,
    fallback_timeout_secs: AtomicU64,
    logging_level: RwLock<Level>,
    suspend_mode: AtomicBool,
    attach_gate: Mutex<Arc<SuspendGate>>,
    single_step_exchange_id: Mutex<Option<String>>,
    step_mode: AtomicBool,
}

impl ControllerState {
    fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs.load(Ordering::Acquire))
    }

    fn log_suspended(&self, exchange: &Exchange, node_id: &str, timeout: Duration) {
        let level = *self.logging_level.read();
        let message = format!(
            "Suspended exchange {} at node {} waiting for operator (timeout {}s)",
            exchange.exchange_id(),
            node_id,
            timeout.as_secs()
        );
        if level == Level::ERROR {
            error!("{message}");
        } else if level == Level::WARN {
            warn!("{message}");
        } else if level == Level::INFO {
            info!("{message}");
        } else if level == Level::DEBUG {
            debug!("{message}");
        } else {
            trace!("{message}");
        }
    }

    /// The breakpoint-hit protocol. Runs on the routing thread of the
    /// exchange. Returns false when the node already holds a suspended
    /// exchange, in which case this one continues unsuspended.
    fn suspend_and_wait(
        &self,
        exchange: &Exchange,
        node_id: &str,
        route_id: &str,
        last: bool,
    ) -> bool {
        let gate = Arc::new(SuspendGate::new());
        match self.suspended.entry(node_id.to_string()) {
            Entry::Occupied(_) => {
                debug!(
                    node_id,
                    exchange_id = exchange.exchange_id(),
                    "node already holds a suspended exchange, letting this one continue"
                );
                return false;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(SuspendedExchange { exchange: exchange.clone(), gate: gate.clone() });
            }
        }

        let snapshot =
            self.recorder.capture(exchange, node_id, route_id, exchange.is_first_visit(), last);
        self.snapshots.insert(node_id.to_string(), snapshot);
        self.debug_counter.fetch_add(1, Ordering::Relaxed);

        let timeout = self.fallback_timeout();
        self.log_suspended(exchange, node_id, timeout);

        if !gate.wait_timeout(timeout) {
            warn!(
                node_id,
                exchange_id = exchange.exchange_id(),
                timeout_secs = timeout.as_secs(),
                "suspended exchange was not resumed within the fallback timeout, continuing"
            );
            // Fail-open cleanup. The snapshot goes first: the slot is still
            // ours until the remove below, so no new suspension can race a
            // fresh snapshot in. The slot is only removed if it is still our
            // gate; a concurrent release has already removed it.
            self.snapshots.remove(node_id);
            self.suspended.remove_if(node_id, |_, slot| Arc::ptr_eq(&slot.gate, &gate));
        }
        true
    }

    /// Releases one node's suspended exchange, if any. A resume that is the
    /// continuation of a step keeps the single-step session alive; any other
    /// resume tears it down first.
    fn resume_node(&self, node_id: &str, step_continuation: bool) {
        if !step_continuation {
            self.exit_single_step_if_any();
        }
        self.snapshots.remove(node_id);
        // Atomic remove first, release the returned gate second.
        if let Some((_, slot)) = self.suspended.remove(node_id) {
            debug!(node_id, exchange_id = slot.exchange.exchange_id(), "resuming exchange");
            slot.gate.release();
        }
    }

    fn release_all_slots(&self) {
        let node_ids: Vec<String> = self.suspended.iter().map(|e| e.key().clone()).collect();
        for node_id in node_ids {
            if let Some((_, slot)) = self.suspended.remove(&node_id) {
                slot.gate.release();
            }
        }
    }

    fn exit_single_step_if_any(&self) {
        let exchange_id = self.single_step_exchange_id.lock().take();
        if let Some(exchange_id) = exchange_id {
            self.debugger.stop_single_step(&exchange_id);
            self.step_mode.store(false, Ordering::Release);
            debug!(exchange_id = %exchange_id, "single-step session ended");
        }
    }

    /// Ends a specific single-step session, leaving any other alone.
    fn single_step_session_ended(&self, exchange_id: &str) {
        self.debugger.stop_single_step(exchange_id);
        let mut current = self.single_step_exchange_id.lock();
        if current.as_deref() == Some(exchange_id) {
            *current = None;
            self.step_mode.store(false, Ordering::Release);
            debug!(exchange_id, "single-step session ended");
        }
    }

    /// Completion-triggered pseudo-last step: suspend one final time at the
    /// exchange's last visited node so the operator can inspect the final
    /// state, then tear the session down.
    fn step_exchange_ended(&self, exchange: &Exchange, last_node_id: Option<&str>) {
        if self.step_mode.load(Ordering::Acquire) {
            if let Some(node_id) = last_node_id {
                self.suspend_and_wait(exchange, node_id, &exchange.route_id(), true);
            }
        }
        self.single_step_session_ended(exchange.exchange_id());
    }

    /// Re-derives the cached snapshot for a node after a mutation, keeping
    /// its identity.
    fn refresh_snapshot(&self, node_id: &str, exchange: &Exchange) {
        let current = self.snapshots.get(node_id).map(|entry| entry.value().clone());
        if let Some(snapshot) = current {
            let refreshed = self.recorder.refresh(&snapshot, exchange);
            self.snapshots.insert(node_id.to_string(), refreshed);
        }
    }

    /// The global suspend gate, engaged before any breakpoint logic.
    fn check_suspend_mode(&self) {
        if !self.suspend_mode.load(Ordering::Acquire) {
            return;
        }
        let gate = self.attach_gate.lock().clone();
        if gate.is_released() {
            return;
        }
        info!("suspend mode: holding exchange until an operator attaches");
        let timeout = self.fallback_timeout();
        if !gate.wait_timeout(timeout) {
            warn!(
                timeout_secs = timeout.as_secs(),
                "no operator attached within the fallback timeout, continuing"
            );
        }
    }

    /// Looks up the exchange suspended at a node, if any.
    fn suspended_exchange(&self, node_id: &str) -> Option<Exchange> {
        self.suspended.get(node_id).map(|slot| slot.exchange.clone())
    }
}

/// The operator-facing debugger surface.
///
/// Cheap to clone; all clones drive the same underlying state. The routing
/// engine talks to it through [`PipelineHooks`], operators through the
/// methods below, from any thread.
#[derive(Clone)]
pub struct DebugController {
    state: Arc<ControllerState>,
}

impl std::fmt::Debug for DebugController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugController")
            .field("enabled", &self.is_enabled())
            .field("breakpoints", &self.breakpoint_ids())
            .field("suspended", &self.suspended_node_ids())
            .finish()
    }
}

impl DebugController {
    /// Creates a controller from its collaborators. The suspend-on-start
    /// flag is resolved from the environment at construction.
    pub fn new(
        context: Arc<DebugContext>,
        resolver: Arc<dyn ExpressionResolver>,
        dumper: Arc<dyn MessageDumper>,
        converter: Arc<dyn TypeConverter>,
    ) -> Self {
        let suspend_mode = suspend_mode_from_env();
        if suspend_mode {
            info!("debugger starting in suspend mode, exchanges block until an operator attaches");
        }
        Self {
            state: Arc::new(ControllerState {
                debugger: Debugger::new(context.clone()),
                recorder: SnapshotRecorder::new(context, dumper),
                backlog: TraceBacklog::new(),
                resolver,
                converter,
                enabled: AtomicBool::new(false),
                breakpoints: DashMap::new(),
                suspended: DashMap::new(),
                snapshots: DashMap::new(),
                debug_counter: AtomicU64::new(0),
                fallback_timeout_secs: AtomicU64::new(DEFAULT_FALLBACK_TIMEOUT.as_secs()),
                logging_level: RwLock::new(Level::INFO),
                suspend_mode: AtomicBool::new(suspend_mode),
                attach_gate: Mutex::new(Arc::new(SuspendGate::new())),
                single_step_exchange_id: Mutex::new(None),
                step_mode: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a controller wired to the built-in default collaborators,
    /// for standalone use and tests.
    pub fn with_defaults(engine_name: &str) -> Self {
        let context = Arc::new(DebugContext::new(EngineSettings::new(engine_name)));
        Self::new(
            context,
            Arc::new(SimpleExpressionResolver),
            Arc::new(DefaultMessageDumper),
            Arc::new(DefaultTypeConverter),
        )
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts the underlying debugger and begins matching breakpoints.
    pub fn enable_debugger(&self) {
        self.state.debugger.start();
        self.state.enabled.store(true, Ordering::Release);
        info!("debugger enabled");
    }

    /// Stops the debugger, clears every breakpoint and force-releases every
    /// currently suspended exchange so no routing thread stays parked.
    pub fn disable_debugger(&self) {
        self.state.enabled.store(false, Ordering::Release);
        self.state.exit_single_step_if_any();
        self.state.debugger.stop();
        self.state.breakpoints.clear();
        self.state.snapshots.clear();
        self.state.release_all_slots();
        info!("debugger disabled");
    }

    /// Whether breakpoints are currently matched.
    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Acquire)
    }

    /// Shutdown path: disables the debugger if enabled and releases anything
    /// still parked, including suspend-mode waiters. Guarantees no thread is
    /// left blocked when the enclosing engine stops.
    pub fn stop(&self) {
        if self.is_enabled() {
            self.disable_debugger();
        } else {
            self.state.exit_single_step_if_any();
            self.state.debugger.remove_all_breakpoints();
            self.state.breakpoints.clear();
            self.state.snapshots.clear();
            self.state.release_all_slots();
        }
        self.state.attach_gate.lock().release();
    }

    // -----------------------------------------------------------------------
    // Suspend mode
    // -----------------------------------------------------------------------

    /// Whether the controller is in global suspend mode.
    pub fn is_suspend_mode(&self) -> bool {
        self.state.suspend_mode.load(Ordering::Acquire)
    }

    /// Whether an operator has attached (suspend-mode waiters released).
    pub fn is_attached(&self) -> bool {
        self.state.attach_gate.lock().is_released()
    }

    /// Attaches an operator: releases every exchange held by suspend mode
    /// and lets new ones pass.
    pub fn attach(&self) {
        info!("operator attached");
        self.state.attach_gate.lock().release();
    }

    /// Detaches the operator and re-engages suspend mode: subsequent
    /// exchanges block at their next node until [`attach`](Self::attach).
    pub fn detach(&self) {
        info!("operator detached, suspend mode engaged");
        self.state.suspend_mode.store(true, Ordering::Release);
        *self.state.attach_gate.lock() = Arc::new(SuspendGate::new());
    }

    // -----------------------------------------------------------------------
    // Breakpoint management
    // -----------------------------------------------------------------------

    /// Adds (or re-arms) a breakpoint on a node. Re-adding clears any
    /// previous condition.
    pub fn add_breakpoint(&self, node_id: &str) {
        self.install_breakpoint(BreakpointSpec::plain(node_id), None);
    }

    /// Adds (or replaces) a conditional breakpoint on a node. The condition
    /// is compiled at registration time; a malformed expression is rejected
    /// here, never at match time.
    pub fn add_conditional_breakpoint(
        &self,
        node_id: &str,
        language: &str,
        condition: &str,
    ) -> DebugResult<()> {
        let predicate = self.state.resolver.create_predicate(language, condition).map_err(
            |source| DebugError::ConditionCompile {
                language: language.to_string(),
                expression: condition.to_string(),
                source,
            },
        )?;
        self.install_breakpoint(
            BreakpointSpec::conditional(node_id, language, condition),
            Some(predicate),
        );
        Ok(())
    }

    fn install_breakpoint(&self, spec: BreakpointSpec, predicate: Option<Arc<dyn Predicate>>) {
        let hook = BreakpointHook::new(&self.state, HookKind::Node);
        let mut conditions: Vec<Arc<dyn Condition>> =
            vec![Arc::new(NodeIdCondition::new(&spec.node_id))];
        if let Some(predicate) = predicate {
            conditions.push(Arc::new(PredicateCondition::new(predicate)));
        }

        // Create-or-update: one breakpoint per node id.
        if let Some((_, previous)) = self.state.breakpoints.remove(&spec.node_id) {
            let handler: Arc<dyn BreakpointHandler> = previous.hook;
            self.state.debugger.remove_breakpoint(&handler);
        }

        debug!(node_id = %spec.node_id, conditional = spec.condition.is_some(), "breakpoint added");
        let handler: Arc<dyn BreakpointHandler> = hook.clone();
        self.state.debugger.add_breakpoint_with_conditions(handler, conditions);
        self.state.breakpoints.insert(spec.node_id.clone(), NodeBreakpoint { spec, hook });
    }

    /// Removes the breakpoint on a node. If an exchange is suspended there
    /// its gate is released immediately; removal is an explicit cancellation
    /// signal, not something to wait out.
    pub fn remove_breakpoint(&self, node_id: &str) {
        if let Some((_, breakpoint)) = self.state.breakpoints.remove(node_id) {
            let handler: Arc<dyn BreakpointHandler> = breakpoint.hook;
            self.state.debugger.remove_breakpoint(&handler);
            debug!(node_id, "breakpoint removed");
        }
        self.state.snapshots.remove(node_id);
        if let Some((_, slot)) = self.state.suspended.remove(node_id) {
            slot.gate.release();
        }
    }

    /// Removes every breakpoint, ending any single-step session and
    /// releasing every suspended exchange.
    pub fn remove_all_breakpoints(&self) {
        self.state.exit_single_step_if_any();
        let node_ids = self.breakpoint_ids();
        for node_id in node_ids {
            self.remove_breakpoint(&node_id);
        }
        self.state.debugger.remove_all_breakpoints();
        self.state.snapshots.clear();
        self.state.release_all_slots();
    }

    /// The node ids carrying breakpoints, sorted.
    pub fn breakpoint_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> =
            self.state.breakpoints.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Whether a node carries a breakpoint.
    pub fn has_breakpoint(&self, node_id: &str) -> bool {
        self.state.breakpoints.contains_key(node_id)
    }

    /// The spec of the breakpoint on a node, if one is registered.
    pub fn breakpoint_spec(&self, node_id: &str) -> Option<BreakpointSpec> {
        self.state.breakpoints.get(node_id).map(|entry| entry.spec.clone())
    }

    /// The activation state of the breakpoint on a node.
    pub fn breakpoint_state(&self, node_id: &str) -> Option<BreakpointState> {
        self.state.breakpoints.get(node_id).map(|entry| entry.hook.state())
    }

    /// Parks the breakpoint on a node: no new matches until activated.
    pub fn suspend_breakpoint(&self, node_id: &str) {
        if let Some(entry) = self.state.breakpoints.get(node_id) {
            entry.hook.suspend();
        }
    }

    /// Re-arms the breakpoint on a node.
    pub fn activate_breakpoint(&self, node_id: &str) {
        if let Some(entry) = self.state.breakpoints.get(node_id) {
            entry.hook.activate();
        }
    }

    /// Parks every registered breakpoint.
    pub fn suspend_all_breakpoints(&self) {
        for entry in self.state.breakpoints.iter() {
            entry.hook.suspend();
        }
    }

    /// Re-arms every registered breakpoint.
    pub fn activate_all_breakpoints(&self) {
        for entry in self.state.breakpoints.iter() {
            entry.hook.activate();
        }
    }

    // -----------------------------------------------------------------------
    // Resume and step
    // -----------------------------------------------------------------------

    /// Releases the exchange suspended at a node, if any. Exits single-step
    /// mode: an explicit resume means the operator is done following the
    /// exchange.
    pub fn resume_breakpoint(&self, node_id: &str) {
        self.state.resume_node(node_id, false);
    }

    /// Releases every suspended exchange and exits single-step mode.
    pub fn resume_all(&self) {
        self.state.exit_single_step_if_any();
        self.state.snapshots.clear();
        self.state.release_all_slots();
    }

    /// Promotes the exchange suspended at `node_id` into a single-step
    /// session and advances it. From here every node the exchange visits
    /// suspends it again, regardless of the static breakpoint set, until it
    /// completes or the session ends.
    ///
    /// Returns false when nothing is suspended there or the single-step
    /// ceiling is reached (an existing session is never disturbed).
    pub fn step_breakpoint(&self, node_id: &str) -> bool {
        let Some(exchange) = self.state.suspended_exchange(node_id) else {
            debug!(node_id, "nothing suspended, cannot step");
            return false;
        };
        let exchange_id = exchange.exchange_id().to_string();

        let hook =
            BreakpointHook::new(&self.state, HookKind::Step { exchange_id: exchange_id.clone() });
        let handler: Arc<dyn BreakpointHandler> = hook;
        if !self.state.debugger.start_single_step(exchange_id.clone(), handler) {
            return false;
        }

        *self.state.single_step_exchange_id.lock() = Some(exchange_id.clone());
        self.state.step_mode.store(true, Ordering::Release);
        debug!(node_id, exchange_id = %exchange_id, "single-step session started");

        // The step's own continuation: release without ending the session.
        self.state.resume_node(node_id, true);
        true
    }

    /// The no-argument step form: steps the single suspended exchange.
    /// Returns false unless exactly one exchange is suspended.
    pub fn step_breakpoint_single(&self) -> bool {
        let node_ids = self.suspended_node_ids();
        match node_ids.as_slice() {
            [node_id] => self.step_breakpoint(node_id),
            _ => {
                debug!(suspended = node_ids.len(), "step requires exactly one suspended exchange");
                false
            }
        }
    }

    /// Advances a stepping session: releases every suspended exchange
    /// without ending single-step mode.
    pub fn step(&self) {
        for node_id in self.suspended_node_ids() {
            self.state.resume_node(&node_id, true);
        }
    }

    /// Whether a single-step session is active.
    pub fn is_single_step_mode(&self) -> bool {
        self.state.step_mode.load(Ordering::Acquire)
    }

    /// The exchange id currently being stepped, if any.
    pub fn single_step_exchange_id(&self) -> Option<String> {
        self.state.single_step_exchange_id.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Suspended exchange inspection and mutation
    // -----------------------------------------------------------------------

    /// The node ids currently holding a suspended exchange, sorted.
    pub fn suspended_node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> =
            self.state.suspended.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// The id of the exchange suspended at a node, if any.
    pub fn suspended_exchange_id(&self, node_id: &str) -> Option<String> {
        self.state.suspended.get(node_id).map(|slot| slot.exchange.exchange_id().to_string())
    }

    /// The cached snapshot for a node, if an exchange is suspended there.
    pub fn suspended_snapshot(&self, node_id: &str) -> Option<EventSnapshot> {
        self.state.snapshots.get(node_id).map(|entry| entry.value().clone())
    }

    /// The suspended exchange's message at a node, rendered as XML.
    pub fn dump_traced_message_as_xml(&self, node_id: &str) -> Option<String> {
        self.state.snapshots.get(node_id).and_then(|entry| entry.message_as_xml.clone())
    }

    /// The suspended exchange's message at a node, rendered as JSON.
    pub fn dump_traced_message_as_json(&self, node_id: &str) -> Option<String> {
        self.state.snapshots.get(node_id).and_then(|entry| entry.message_as_json.clone())
    }

    /// Replaces the message body of the exchange suspended at a node,
    /// optionally coercing it to a target type first. `None` removes the
    /// body. A silent no-op when nothing is suspended there; on conversion
    /// failure the exchange is left unchanged.
    pub fn set_message_body_on_breakpoint(
        &self,
        node_id: &str,
        body: Option<MessageBody>,
        target_type: Option<&str>,
    ) -> DebugResult<()> {
        let Some(exchange) = self.state.suspended_exchange(node_id) else {
            return Ok(());
        };
        let body = match (body, target_type) {
            (Some(MessageBody::Value(value)), Some(target)) => Some(MessageBody::Value(
                self.state.converter.convert_to(target, &exchange, value)?,
            )),
            (Some(other), Some(target)) => {
                let kind = match other {
                    MessageBody::Stream(_) => "stream body",
                    MessageBody::File(_) => "file body",
                    MessageBody::Value(_) => unreachable!(),
                };
                return Err(flowdbg_common::NoTypeConversion::new(target, kind).into());
            }
            (body, None) => body,
            (None, Some(_)) => None,
        };
        exchange.set_body(body);
        self.state.refresh_snapshot(node_id, &exchange);
        Ok(())
    }

    /// Removes the message body of the exchange suspended at a node.
    pub fn remove_message_body_on_breakpoint(&self, node_id: &str) -> DebugResult<()> {
        self.set_message_body_on_breakpoint(node_id, None, None)
    }

    /// Sets a message header on the exchange suspended at a node. `None`
    /// removes the header.
    pub fn set_message_header_on_breakpoint(
        &self,
        node_id: &str,
        name: &str,
        value: Option<Value>,
        target_type: Option<&str>,
    ) -> DebugResult<()> {
        self.mutate_suspended(node_id, name, value, target_type, |exchange, name, value| {
            match value {
                Some(value) => exchange.set_header(name, value),
                None => {
                    exchange.remove_header(name);
                }
            }
        })
    }

    /// Removes a message header from the exchange suspended at a node.
    pub fn remove_message_header_on_breakpoint(
        &self,
        node_id: &str,
        name: &str,
    ) -> DebugResult<()> {
        self.set_message_header_on_breakpoint(node_id, name, None, None)
    }

    /// Sets an exchange property on the exchange suspended at a node.
    /// `None` removes the property.
    pub fn set_exchange_property_on_breakpoint(
        &self,
        node_id: &str,
        name: &str,
        value: Option<Value>,
        target_type: Option<&str>,
    ) -> DebugResult<()> {
        self.mutate_suspended(node_id, name, value, target_type, |exchange, name, value| {
            match value {
                Some(value) => exchange.set_property(name, value),
                None => {
                    exchange.remove_property(name);
                }
            }
        })
    }

    /// Removes an exchange property from the exchange suspended at a node.
    pub fn remove_exchange_property_on_breakpoint(
        &self,
        node_id: &str,
        name: &str,
    ) -> DebugResult<()> {
        self.set_exchange_property_on_breakpoint(node_id, name, None, None)
    }

    /// Sets an exchange variable on the exchange suspended at a node.
    /// `None` removes the variable.
    pub fn set_exchange_variable_on_breakpoint(
        &self,
        node_id: &str,
        name: &str,
        value: Option<Value>,
        target_type: Option<&str>,
    ) -> DebugResult<()> {
        self.mutate_suspended(node_id, name, value, target_type, |exchange, name, value| {
            match value {
                Some(value) => exchange.set_variable(name, value),
                None => {
                    exchange.remove_variable(name);
                }
            }
        })
    }

    /// Removes an exchange variable from the exchange suspended at a node.
    pub fn remove_exchange_variable_on_breakpoint(
        &self,
        node_id: &str,
        name: &str,
    ) -> DebugResult<()> {
        self.set_exchange_variable_on_breakpoint(node_id, name, None, None)
    }

    fn mutate_suspended(
        &self,
        node_id: &str,
        name: &str,
        value: Option<Value>,
        target_type: Option<&str>,
        apply: impl FnOnce(&Exchange, &str, Option<Value>),
    ) -> DebugResult<()> {
        let Some(exchange) = self.state.suspended_exchange(node_id) else {
            // Mutating a node that holds nothing is a silent no-op.
            return Ok(());
        };
        let value = match (value, target_type) {
            (Some(value), Some(target)) => {
                Some(self.state.converter.convert_to(target, &exchange, value)?)
            }
            (value, _) => value,
        };
        apply(&exchange, name, value);
        self.state.refresh_snapshot(node_id, &exchange);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Counters and configuration
    // -----------------------------------------------------------------------

    /// Number of suspensions since the counter was last reset.
    pub fn debug_counter(&self) -> u64 {
        self.state.debug_counter.load(Ordering::Relaxed)
    }

    /// Resets the suspension counter.
    pub fn reset_debug_counter(&self) {
        self.state.debug_counter.store(0, Ordering::Relaxed);
    }

    /// The bounded wait applied to every suspension.
    pub fn fallback_timeout(&self) -> Duration {
        self.state.fallback_timeout()
    }

    /// Sets the bounded wait applied to every suspension. Sub-second
    /// timeouts are rejected.
    pub fn set_fallback_timeout(&self, timeout: Duration) -> DebugResult<()> {
        if timeout.as_secs() == 0 {
            return Err(DebugError::InvalidConfiguration(
                "fallback timeout must be at least one second".to_string(),
            ));
        }
        self.state.fallback_timeout_secs.store(timeout.as_secs(), Ordering::Release);
        Ok(())
    }

    /// The level suspension announcements are logged at.
    pub fn logging_level(&self) -> Level {
        *self.state.logging_level.read()
    }

    /// Sets the level suspension announcements are logged at. Unknown level
    /// names are rejected.
    pub fn set_logging_level(&self, level: &str) -> DebugResult<()> {
        let parsed = Level::from_str(level).map_err(|_| {
            DebugError::InvalidConfiguration(format!("unknown logging level '{level}'"))
        })?;
        *self.state.logging_level.write() = parsed;
        Ok(())
    }

    /// The current dump options applied to snapshots.
    pub fn dump_options(&self) -> DumpOptions {
        self.state.recorder.options()
    }

    /// Caps the number of body characters included in dumps; 0 disables the cap.
    pub fn set_body_max_chars(&self, max_chars: usize) {
        self.state.recorder.update_options(|options| options.body_max_chars = max_chars);
    }

    /// Whether stream-typed bodies are read into dumps.
    pub fn set_body_include_streams(&self, include: bool) {
        self.state.recorder.update_options(|options| options.body_include_streams = include);
    }

    /// Whether file-typed bodies are referenced in dumps.
    pub fn set_body_include_files(&self, include: bool) {
        self.state.recorder.update_options(|options| options.body_include_files = include);
    }

    /// Whether exchange properties are included in dumps.
    pub fn set_include_exchange_properties(&self, include: bool) {
        self.state.recorder.update_options(|options| options.include_exchange_properties = include);
    }

    /// Whether exchange variables are included in dumps.
    pub fn set_include_exchange_variables(&self, include: bool) {
        self.state.recorder.update_options(|options| options.include_exchange_variables = include);
    }

    /// Whether exception detail is included in dumps.
    pub fn set_include_exception(&self, include: bool) {
        self.state.recorder.update_options(|options| options.include_exception = include);
    }

    // -----------------------------------------------------------------------
    // Tracing (the rolling backlog)
    // -----------------------------------------------------------------------

    /// The backlog component, for direct inspection.
    pub fn backlog(&self) -> &TraceBacklog {
        &self.state.backlog
    }

    /// Enables passive tracing into the backlog.
    pub fn enable_tracing(&self) {
        self.state.backlog.enable();
    }

    /// Disables passive tracing.
    pub fn disable_tracing(&self) {
        self.state.backlog.disable();
    }

    /// Whether passive tracing is enabled.
    pub fn is_tracing_enabled(&self) -> bool {
        self.state.backlog.is_enabled()
    }

    /// Sets the backlog's soft limit.
    pub fn set_backlog_size(&self, size: usize) -> DebugResult<()> {
        self.state.backlog.set_backlog_size(size)
    }

    /// Sets the comma-separated node/route pattern traced events must match.
    pub fn set_trace_pattern(&self, pattern: Option<String>) {
        self.state.backlog.set_trace_pattern(pattern);
    }

    /// Sets (or clears) the trace filter, compiled in the default condition
    /// language. Malformed expressions are rejected here.
    pub fn set_trace_filter(&self, expression: Option<&str>) -> DebugResult<()> {
        match expression {
            Some(expression) => {
                let predicate = self
                    .state
                    .resolver
                    .create_predicate(DEFAULT_CONDITION_LANGUAGE, expression)
                    .map_err(|source| DebugError::ConditionCompile {
                        language: DEFAULT_CONDITION_LANGUAGE.to_string(),
                        expression: expression.to_string(),
                        source,
                    })?;
                self.state.backlog.set_trace_filter(Some(predicate));
            }
            None => self.state.backlog.set_trace_filter(None),
        }
        Ok(())
    }

    /// Returns (and by default removes) the traced snapshots for one node.
    pub fn dump_traced_messages(&self, node_id: &str) -> Vec<EventSnapshot> {
        self.state.backlog.dump_traced(node_id)
    }

    /// Returns (and by default removes) every traced snapshot.
    pub fn dump_all_traced_messages(&self) -> Vec<EventSnapshot> {
        self.state.backlog.dump_all_traced()
    }
}

impl PipelineHooks for DebugController {
    fn before_process(&self, exchange: &Exchange, node_id: &str, route_id: &str) -> bool {
        // Passive tracing runs first and never blocks, independent of the
        // breakpoint machinery.
        if self.state.backlog.should_trace(node_id, route_id, exchange) {
            let snapshot = self.state.recorder.capture(
                exchange,
                node_id,
                route_id,
                exchange.is_first_visit(),
                false,
            );
            self.state.backlog.trace_event(snapshot);
        }

        self.state.check_suspend_mode();

        if !self.is_enabled() {
            return false;
        }
        self.state.debugger.before_process(exchange, node_id, route_id)
    }

    fn after_process(
        &self,
        exchange: &Exchange,
        node_id: &str,
        route_id: &str,
        elapsed: Duration,
    ) {
        if self.is_enabled() {
            self.state.debugger.after_process(exchange, node_id, route_id, elapsed);
        }
    }

    fn on_event(&self, exchange: &Exchange, event: &ExchangeEvent) {
        if self.is_enabled() {
            self.state.debugger.on_event(exchange, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{thread, time::Instant};

    fn controller() -> DebugController {
        let controller = DebugController::with_defaults("test-engine");
        controller.enable_debugger();
        controller.set_fallback_timeout(Duration::from_secs(5)).unwrap();
        controller
    }

    /// Drives an exchange through the hook surface the way a routing engine
    /// would, on the calling thread.
    fn route(controller: &DebugController, exchange: &Exchange, nodes: &[&str]) {
        controller.on_event(exchange, &ExchangeEvent::Created);
        for node in nodes {
            exchange.record_visit(*node, "route-a");
            controller.before_process(exchange, node, "route-a");
            controller.after_process(exchange, node, "route-a", Duration::from_millis(1));
        }
        controller.on_event(exchange, &ExchangeEvent::Completed);
    }

    fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    #[test]
    fn test_enable_disable_lifecycle() {
        let controller = DebugController::with_defaults("test-engine");
        assert!(!controller.is_enabled());
        controller.enable_debugger();
        assert!(controller.is_enabled());
        controller.add_breakpoint("a");
        controller.disable_debugger();
        assert!(!controller.is_enabled());
        assert!(controller.breakpoint_ids().is_empty());
    }

    #[test]
    fn test_readding_breakpoint_clears_condition() {
        let controller = controller();
        controller
            .add_conditional_breakpoint("a", DEFAULT_CONDITION_LANGUAGE, "header:x == 1")
            .unwrap();
        assert!(controller.breakpoint_spec("a").unwrap().condition.is_some());

        controller.add_breakpoint("a");
        assert!(controller.breakpoint_spec("a").unwrap().condition.is_none());
        assert_eq!(controller.breakpoint_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn test_malformed_condition_rejected_at_registration() {
        let controller = controller();
        let err = controller
            .add_conditional_breakpoint("a", DEFAULT_CONDITION_LANGUAGE, "nonsense:x == 1")
            .unwrap_err();
        assert!(matches!(err, DebugError::ConditionCompile { .. }));
        assert!(!controller.has_breakpoint("a"));
    }

    #[test]
    fn test_configuration_validation() {
        let controller = controller();
        assert!(controller.set_fallback_timeout(Duration::ZERO).is_err());
        assert!(controller.set_fallback_timeout(Duration::from_secs(60)).is_ok());
        assert_eq!(controller.fallback_timeout(), Duration::from_secs(60));

        assert!(controller.set_logging_level("noisy").is_err());
        assert!(controller.set_logging_level("debug").is_ok());
        assert_eq!(controller.logging_level(), Level::DEBUG);

        assert!(controller.set_backlog_size(0).is_err());
        assert!(controller.set_trace_filter(Some("bogus ===")).is_err());
    }

    #[test]
    fn test_mutating_unsuspended_node_is_silent_noop() {
        let controller = controller();
        assert!(controller
            .set_message_header_on_breakpoint("nowhere", "X", Some(json!(1)), None)
            .is_ok());
        assert!(controller.set_message_body_on_breakpoint("nowhere", None, None).is_ok());
        assert!(controller.remove_exchange_property_on_breakpoint("nowhere", "p").is_ok());
    }

    #[test]
    fn test_suspend_and_resume_from_another_thread() {
        let controller = controller();
        controller.add_breakpoint("a");

        let exchange = Exchange::new("u1", "route-a");
        let routed = {
            let controller = controller.clone();
            let exchange = exchange.clone();
            thread::spawn(move || route(&controller, &exchange, &["a", "b"]))
        };

        assert!(wait_until(
            || controller.suspended_node_ids() == vec!["a".to_string()],
            Duration::from_secs(2)
        ));
        assert_eq!(controller.suspended_exchange_id("a").as_deref(), Some("u1"));
        assert_eq!(controller.debug_counter(), 1);
        assert!(controller.dump_traced_message_as_json("a").is_some());

        controller.resume_breakpoint("a");
        routed.join().unwrap();

        assert!(controller.suspended_node_ids().is_empty());
        assert!(controller.suspended_exchange_id("a").is_none());
        assert!(controller.dump_traced_message_as_json("a").is_none());
    }

    #[test]
    fn test_second_exchange_at_occupied_node_continues() {
        let controller = controller();
        controller.add_breakpoint("a");

        let first = Exchange::new("u1", "route-a");
        let blocked = {
            let controller = controller.clone();
            let first = first.clone();
            thread::spawn(move || route(&controller, &first, &["a"]))
        };
        assert!(wait_until(
            || controller.suspended_exchange_id("a").is_some(),
            Duration::from_secs(2)
        ));

        // The slot is occupied: a second exchange must pass straight through.
        let second = Exchange::new("u2", "route-a");
        let start = Instant::now();
        route(&controller, &second, &["a"]);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(controller.suspended_exchange_id("a").as_deref(), Some("u1"));

        controller.resume_all();
        blocked.join().unwrap();
    }

    #[test]
    fn test_timeout_fail_open_frees_slot() {
        let controller = controller();
        controller.set_fallback_timeout(Duration::from_secs(1)).unwrap();
        controller.add_breakpoint("a");

        let exchange = Exchange::new("u1", "route-a");
        let start = Instant::now();
        route(&controller, &exchange, &["a", "b"]);

        // Proceeded on its own after the timeout, and the slot is free.
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(controller.suspended_node_ids().is_empty());
        assert!(controller.dump_traced_message_as_json("a").is_none());
    }

    #[test]
    fn test_removing_breakpoint_releases_suspended_exchange() {
        let controller = controller();
        controller.add_breakpoint("a");

        let exchange = Exchange::new("u1", "route-a");
        let routed = {
            let controller = controller.clone();
            let exchange = exchange.clone();
            thread::spawn(move || route(&controller, &exchange, &["a"]))
        };
        assert!(wait_until(
            || controller.suspended_exchange_id("a").is_some(),
            Duration::from_secs(2)
        ));

        controller.remove_breakpoint("a");
        routed.join().unwrap();
        assert!(!controller.has_breakpoint("a"));
        assert!(controller.suspended_node_ids().is_empty());
    }

    #[test]
    fn test_disable_debugger_releases_all_suspended() {
        let controller = controller();
        controller.add_breakpoint("a");
        controller.add_breakpoint("b");

        let mut routed = Vec::new();
        for (id, node) in [("u1", "a"), ("u2", "b")] {
            let controller = controller.clone();
            let exchange = Exchange::new(id, "route-a");
            routed.push(thread::spawn(move || route(&controller, &exchange, &[node])));
        }
        assert!(wait_until(
            || controller.suspended_node_ids().len() == 2,
            Duration::from_secs(2)
        ));

        controller.disable_debugger();
        for handle in routed {
            handle.join().unwrap();
        }
        assert!(controller.suspended_node_ids().is_empty());
        assert!(controller.breakpoint_ids().is_empty());
    }

    #[test]
    fn test_conditional_breakpoint_only_matches_condition() {
        let controller = controller();
        controller
            .add_conditional_breakpoint("a", DEFAULT_CONDITION_LANGUAGE, "header:stop == true")
            .unwrap();

        // Non-matching exchange passes through synchronously.
        let passing = Exchange::new("u1", "route-a");
        route(&controller, &passing, &["a"]);
        assert!(controller.suspended_node_ids().is_empty());

        let matching = Exchange::new("u2", "route-a");
        matching.set_header("stop", json!(true));
        let routed = {
            let controller = controller.clone();
            let matching = matching.clone();
            thread::spawn(move || route(&controller, &matching, &["a"]))
        };
        assert!(wait_until(
            || controller.suspended_exchange_id("a").as_deref() == Some("u2"),
            Duration::from_secs(2)
        ));
        controller.resume_breakpoint("a");
        routed.join().unwrap();
    }

    #[test]
    fn test_mutation_refreshes_snapshot_keeping_identity() {
        let controller = controller();
        controller.add_breakpoint("b");

        let exchange = Exchange::new("u1", "route-a");
        let routed = {
            let controller = controller.clone();
            let exchange = exchange.clone();
            thread::spawn(move || route(&controller, &exchange, &["b"]))
        };
        assert!(wait_until(
            || controller.suspended_exchange_id("b").is_some(),
            Duration::from_secs(2)
        ));

        let before = controller.suspended_snapshot("b").unwrap();
        controller
            .set_message_header_on_breakpoint("b", "X-Test", Some(json!("42")), None)
            .unwrap();

        let after = controller.suspended_snapshot("b").unwrap();
        assert_eq!(after.uid, before.uid);
        assert_eq!(after.timestamp, before.timestamp);
        assert_eq!(after.route_id, before.route_id);

        let dumped = controller.dump_traced_message_as_json("b").unwrap();
        let parsed: Value = serde_json::from_str(&dumped).unwrap();
        assert_eq!(parsed["message"]["headers"]["X-Test"], json!("42"));
        assert_eq!(exchange.header("X-Test"), Some(json!("42")));

        controller.resume_breakpoint("b");
        routed.join().unwrap();
    }

    #[test]
    fn test_mutation_with_type_coercion() {
        let controller = controller();
        controller.add_breakpoint("a");

        let exchange = Exchange::new("u1", "route-a");
        let routed = {
            let controller = controller.clone();
            let exchange = exchange.clone();
            thread::spawn(move || route(&controller, &exchange, &["a"]))
        };
        assert!(wait_until(
            || controller.suspended_exchange_id("a").is_some(),
            Duration::from_secs(2)
        ));

        controller
            .set_message_header_on_breakpoint("a", "attempts", Some(json!("7")), Some("int"))
            .unwrap();
        assert_eq!(exchange.header("attempts"), Some(json!(7)));

        // A failed coercion leaves the exchange unchanged.
        let err = controller
            .set_message_header_on_breakpoint("a", "attempts", Some(json!("x")), Some("int"))
            .unwrap_err();
        assert!(matches!(err, DebugError::NoTypeConversion(_)));
        assert_eq!(exchange.header("attempts"), Some(json!(7)));

        controller.resume_breakpoint("a");
        routed.join().unwrap();
    }

    #[test]
    fn test_single_step_session_walks_every_node() {
        let controller = controller();
        controller.add_breakpoint("a");

        let exchange = Exchange::new("u1", "route-a");
        let routed = {
            let controller = controller.clone();
            let exchange = exchange.clone();
            thread::spawn(move || route(&controller, &exchange, &["a", "b", "c"]))
        };
        assert!(wait_until(
            || controller.suspended_exchange_id("a").is_some(),
            Duration::from_secs(2)
        ));

        // Promote into a single-step session; next stop is "b" even though
        // no static breakpoint exists there.
        assert!(controller.step_breakpoint("a"));
        assert!(controller.is_single_step_mode());
        assert!(wait_until(
            || controller.suspended_exchange_id("b").is_some(),
            Duration::from_secs(2)
        ));

        controller.step();
        assert!(wait_until(
            || controller.suspended_exchange_id("c").is_some(),
            Duration::from_secs(2)
        ));

        // Stepping past the last node parks once more on completion, as the
        // pseudo-last step, with the last flag set.
        controller.step();
        assert!(wait_until(
            || controller.suspended_snapshot("c").is_some_and(|s| s.last),
            Duration::from_secs(2)
        ));

        controller.step();
        routed.join().unwrap();
        assert!(!controller.is_single_step_mode());
        assert!(controller.single_step_exchange_id().is_none());
    }

    #[test]
    fn test_step_admission_rejected_beyond_ceiling() {
        let controller = controller();
        controller.add_breakpoint("a");
        controller.add_breakpoint("b");

        let mut routed = Vec::new();
        for (id, node) in [("u1", "a"), ("u2", "b")] {
            let controller = controller.clone();
            let exchange = Exchange::new(id, "route-a");
            routed.push(thread::spawn(move || route(&controller, &exchange, &[node])));
        }
        assert!(wait_until(
            || controller.suspended_node_ids().len() == 2,
            Duration::from_secs(2)
        ));

        assert!(controller.step_breakpoint("a"));
        // Ceiling of one: the second session is refused and the first stays.
        assert!(!controller.step_breakpoint("b"));
        assert_eq!(controller.single_step_exchange_id().as_deref(), Some("u1"));
        assert_eq!(controller.suspended_exchange_id("b").as_deref(), Some("u2"));

        controller.resume_all();
        for handle in routed {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_step_breakpoint_single_requires_exactly_one() {
        let controller = controller();
        assert!(!controller.step_breakpoint_single());

        controller.add_breakpoint("a");
        let exchange = Exchange::new("u1", "route-a");
        let routed = {
            let controller = controller.clone();
            let exchange = exchange.clone();
            thread::spawn(move || route(&controller, &exchange, &["a", "b"]))
        };
        assert!(wait_until(
            || controller.suspended_exchange_id("a").is_some(),
            Duration::from_secs(2)
        ));

        assert!(controller.step_breakpoint_single());
        assert!(wait_until(
            || controller.suspended_exchange_id("b").is_some(),
            Duration::from_secs(2)
        ));
        controller.resume_all();
        routed.join().unwrap();
    }

    #[test]
    fn test_explicit_resume_exits_single_step() {
        let controller = controller();
        controller.add_breakpoint("a");

        let exchange = Exchange::new("u1", "route-a");
        let routed = {
            let controller = controller.clone();
            let exchange = exchange.clone();
            thread::spawn(move || route(&controller, &exchange, &["a", "b", "c"]))
        };
        assert!(wait_until(
            || controller.suspended_exchange_id("a").is_some(),
            Duration::from_secs(2)
        ));

        assert!(controller.step_breakpoint("a"));
        assert!(wait_until(
            || controller.suspended_exchange_id("b").is_some(),
            Duration::from_secs(2)
        ));

        // An operator resume (not a step) tears the session down; the
        // exchange runs to completion without stopping at "c".
        controller.resume_breakpoint("b");
        routed.join().unwrap();
        assert!(!controller.is_single_step_mode());
        assert!(controller.suspended_node_ids().is_empty());
    }

    #[test]
    fn test_suspend_mode_blocks_until_attach() {
        let controller = controller();
        controller.detach();
        assert!(controller.is_suspend_mode());
        assert!(!controller.is_attached());

        let exchange = Exchange::new("u1", "route-a");
        let routed = {
            let controller = controller.clone();
            let exchange = exchange.clone();
            thread::spawn(move || route(&controller, &exchange, &["a"]))
        };

        // No breakpoint on "a": the block comes from suspend mode alone.
        thread::sleep(Duration::from_millis(100));
        assert!(!routed.is_finished());

        controller.attach();
        routed.join().unwrap();
        assert!(controller.is_attached());
    }

    #[test]
    fn test_tracing_is_independent_of_breakpoints() {
        let controller = controller();
        controller.enable_tracing();
        controller.set_trace_pattern(Some("transform*".to_string()));

        let exchange = Exchange::new("u1", "route-a");
        route(&controller, &exchange, &["transform-orders", "enrich", "transform-invoices"]);

        assert!(controller.suspended_node_ids().is_empty());
        assert_eq!(controller.backlog().trace_counter(), 2);

        let traced = controller.dump_all_traced_messages();
        assert_eq!(traced.len(), 2);
        assert_eq!(traced[0].node_id, "transform-orders");
        assert_eq!(traced[1].node_id, "transform-invoices");
    }

    #[test]
    fn test_breakpoint_activation_state_gates_matching() {
        let controller = controller();
        controller.add_breakpoint("a");
        controller.suspend_breakpoint("a");
        assert_eq!(controller.breakpoint_state("a"), Some(BreakpointState::Suspended));

        // A parked breakpoint never suspends new exchanges.
        let exchange = Exchange::new("u1", "route-a");
        route(&controller, &exchange, &["a"]);
        assert!(controller.suspended_node_ids().is_empty());

        controller.activate_breakpoint("a");
        assert_eq!(controller.breakpoint_state("a"), Some(BreakpointState::Active));
    }
}
