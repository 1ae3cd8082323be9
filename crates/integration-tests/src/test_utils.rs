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

//! Test utilities for integration tests

use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use flowdbg_common::{Exchange, ExchangeEvent, PipelineHooks};
use flowdbg_core::DebugController;

/// Initialization utilities for tests
pub mod init {
    /// Initialize logging for a test; safe to call from every test.
    pub fn init_test_environment() {
        flowdbg_common::logging::ensure_test_logging(None);
    }
}

/// A stand-in for the routing engine: drives exchanges through the
/// controller's hook surface the way real routing threads would, one thread
/// per exchange.
#[derive(Clone)]
pub struct SimulatedEngine {
    controller: DebugController,
    route_id: String,
}

impl SimulatedEngine {
    /// Creates an engine simulator driving the given controller.
    pub fn new(controller: DebugController, route_id: impl Into<String>) -> Self {
        Self { controller, route_id: route_id.into() }
    }

    /// The controller under test.
    pub fn controller(&self) -> &DebugController {
        &self.controller
    }

    /// Routes an exchange through the given nodes on the calling thread,
    /// emitting lifecycle events the way the engine would. Blocks wherever
    /// the debugger suspends the exchange.
    pub fn route(&self, exchange: &Exchange, nodes: &[&str]) {
        self.controller.on_event(exchange, &ExchangeEvent::Created);
        for node in nodes {
            exchange.record_visit(*node, self.route_id.clone());
            let started = Instant::now();
            self.controller.before_process(exchange, node, &self.route_id);
            self.controller.after_process(exchange, node, &self.route_id, started.elapsed());
        }
        let event = match exchange.exception() {
            Some(reason) => ExchangeEvent::Failed(reason),
            None => ExchangeEvent::Completed,
        };
        self.controller.on_event(exchange, &event);
    }

    /// Routes an exchange on a dedicated routing thread, returning its
    /// handle.
    pub fn route_async(&self, exchange: &Exchange, nodes: &[&str]) -> JoinHandle<()> {
        let engine = self.clone();
        let exchange = exchange.clone();
        let nodes: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
        thread::spawn(move || {
            let node_refs: Vec<&str> = nodes.iter().map(String::as_str).collect();
            engine.route(&exchange, &node_refs);
        })
    }
}

/// Polls a predicate until it holds or the timeout expires. Returns the
/// final predicate value.
pub fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    predicate()
}
