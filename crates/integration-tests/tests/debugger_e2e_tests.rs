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

//! End-to-end tests for the flowdbg suspension engine
//!
//! These tests drive the controller through its hook surface from real
//! routing threads, the way an embedding engine would: suspensions block a
//! dedicated thread per exchange while operator calls arrive from the test
//! thread.

use std::time::{Duration, Instant};

use flowdbg_common::{Exchange, FLOWDBG_SUSPEND, FLOWDBG_SUSPEND_FALLBACK};
use flowdbg_core::DebugController;
use flowdbg_integration_tests::test_utils::{init, wait_until, SimulatedEngine};
use serde_json::json;
use serial_test::serial;

fn engine() -> SimulatedEngine {
    init::init_test_environment();
    let controller = DebugController::with_defaults("e2e-engine");
    controller.enable_debugger();
    controller.set_fallback_timeout(Duration::from_secs(5)).unwrap();
    SimulatedEngine::new(controller, "route-a")
}

#[test]
#[serial]
fn test_resume_from_another_thread() {
    let engine = engine();
    let controller = engine.controller();
    controller.add_breakpoint("A");

    let u1 = Exchange::new("u1", "route-a");
    let routed = engine.route_async(&u1, &["A", "B"]);

    assert!(wait_until(
        || controller.suspended_node_ids() == vec!["A".to_string()],
        Duration::from_secs(2)
    ));
    assert_eq!(controller.suspended_exchange_id("A").as_deref(), Some("u1"));

    controller.resume_breakpoint("A");
    routed.join().unwrap();

    assert!(controller.suspended_node_ids().is_empty());
    assert!(controller.suspended_exchange_id("A").is_none());
}

#[test]
#[serial]
fn test_at_most_one_suspension_per_node_under_concurrency() {
    let engine = engine();
    let controller = engine.controller();
    controller.add_breakpoint("A");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let exchange = Exchange::new(format!("u{i}"), "route-a");
            engine.route_async(&exchange, &["A"])
        })
        .collect();

    // Exactly one exchange may hold the slot; the rest pass through and
    // finish on their own.
    assert!(wait_until(
        || controller.suspended_node_ids() == vec!["A".to_string()],
        Duration::from_secs(2)
    ));
    assert!(wait_until(
        || handles.iter().filter(|h| !h.is_finished()).count() <= 1,
        Duration::from_secs(2)
    ));
    assert_eq!(controller.suspended_node_ids().len(), 1);

    controller.resume_all();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(controller.suspended_node_ids().is_empty());
}

#[test]
#[serial]
fn test_unrelated_traffic_flows_past_suspension() {
    let engine = engine();
    let controller = engine.controller();
    controller.add_breakpoint("B");

    let held = Exchange::new("held", "route-a");
    let blocked = engine.route_async(&held, &["A", "B", "C"]);
    assert!(wait_until(
        || controller.suspended_exchange_id("B").is_some(),
        Duration::from_secs(2)
    ));

    // Other exchanges on the same route, avoiding the occupied node's slot,
    // are unobstructed while "held" stays parked.
    for i in 0..3 {
        let exchange = Exchange::new(format!("free{i}"), "route-a");
        let start = Instant::now();
        engine.route(&exchange, &["A", "C"]);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
    assert_eq!(controller.suspended_exchange_id("B").as_deref(), Some("held"));

    controller.resume_breakpoint("B");
    blocked.join().unwrap();
}

#[test]
#[serial]
fn test_no_orphaned_threads_on_shutdown() {
    let engine = engine();
    let controller = engine.controller();
    controller.add_breakpoint("A");
    controller.add_breakpoint("B");

    let u1 = Exchange::new("u1", "route-a");
    let u2 = Exchange::new("u2", "route-a");
    let first = engine.route_async(&u1, &["A"]);
    let second = engine.route_async(&u2, &["B"]);

    assert!(wait_until(|| controller.suspended_node_ids().len() == 2, Duration::from_secs(2)));

    // Shutdown must release every parked thread promptly.
    let start = Instant::now();
    controller.stop();
    first.join().unwrap();
    second.join().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(controller.suspended_node_ids().is_empty());
}

#[test]
#[serial]
fn test_removing_breakpoint_releases_its_exchange() {
    let engine = engine();
    let controller = engine.controller();
    controller.add_breakpoint("A");

    let u1 = Exchange::new("u1", "route-a");
    let routed = engine.route_async(&u1, &["A"]);
    assert!(wait_until(
        || controller.suspended_exchange_id("A").is_some(),
        Duration::from_secs(2)
    ));

    controller.remove_breakpoint("A");
    routed.join().unwrap();
    assert!(controller.suspended_node_ids().is_empty());
}

#[test]
#[serial]
fn test_timeout_fail_open_and_slot_reuse() {
    let engine = engine();
    let controller = engine.controller();
    controller.set_fallback_timeout(Duration::from_secs(1)).unwrap();
    controller.add_breakpoint("A");

    let u1 = Exchange::new("u1", "route-a");
    let start = Instant::now();
    engine.route(&u1, &["A"]);
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(controller.suspended_node_ids().is_empty());

    // The slot is immediately reusable by the next exchange.
    let u2 = Exchange::new("u2", "route-a");
    let routed = engine.route_async(&u2, &["A"]);
    assert!(wait_until(
        || controller.suspended_exchange_id("A").as_deref() == Some("u2"),
        Duration::from_secs(2)
    ));
    controller.resume_breakpoint("A");
    routed.join().unwrap();
}

#[test]
#[serial]
fn test_header_mutation_is_visible_in_json_dump() {
    let engine = engine();
    let controller = engine.controller();
    controller.add_breakpoint("B");

    let u1 = Exchange::new("u1", "route-a");
    let routed = engine.route_async(&u1, &["A", "B"]);
    assert!(wait_until(
        || controller.suspended_exchange_id("B").is_some(),
        Duration::from_secs(2)
    ));

    let before = controller.suspended_snapshot("B").unwrap();
    controller
        .set_message_header_on_breakpoint("B", "X-Test", Some(json!("42")), None)
        .unwrap();

    let dumped = controller.dump_traced_message_as_json("B").unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&dumped).unwrap();
    assert_eq!(parsed["message"]["headers"]["X-Test"], json!("42"));

    // Same event identity as before the edit.
    let after = controller.suspended_snapshot("B").unwrap();
    assert_eq!(after.uid, before.uid);
    assert_eq!(after.timestamp, before.timestamp);
    assert_eq!(after.route_id, before.route_id);

    controller.resume_all();
    routed.join().unwrap();
}

#[test]
#[serial]
fn test_backlog_keeps_most_recent_entries_in_order() {
    let engine = engine();
    let controller = engine.controller();
    controller.enable_tracing();
    controller.set_backlog_size(10).unwrap();

    for i in 0..15 {
        let exchange = Exchange::new(format!("u{i}"), "route-a");
        engine.route(&exchange, &["A"]);
    }

    assert_eq!(controller.backlog().trace_counter(), 15);
    let traced = controller.dump_all_traced_messages();
    assert_eq!(traced.len(), 10);
    let exchange_ids: Vec<_> = traced.iter().map(|s| s.exchange_id.clone()).collect();
    let expected: Vec<_> = (5..15).map(|i| format!("u{i}")).collect();
    assert_eq!(exchange_ids, expected);
}

#[test]
#[serial]
fn test_single_step_exclusivity_under_concurrency() {
    let engine = engine();
    let controller = engine.controller();
    controller.add_breakpoint("A");
    controller.add_breakpoint("B");

    let u1 = Exchange::new("u1", "route-a");
    let u2 = Exchange::new("u2", "route-a");
    let first = engine.route_async(&u1, &["A", "C"]);
    let second = engine.route_async(&u2, &["B", "D"]);
    assert!(wait_until(|| controller.suspended_node_ids().len() == 2, Duration::from_secs(2)));

    assert!(controller.step_breakpoint("A"));
    assert!(!controller.step_breakpoint("B"));
    assert_eq!(controller.single_step_exchange_id().as_deref(), Some("u1"));

    // The refused step left u2 parked at B; the stepping exchange reaches C.
    assert!(wait_until(
        || controller.suspended_exchange_id("C").as_deref() == Some("u1"),
        Duration::from_secs(2)
    ));
    assert_eq!(controller.suspended_exchange_id("B").as_deref(), Some("u2"));

    controller.resume_all();
    first.join().unwrap();
    second.join().unwrap();
}

#[test]
#[serial]
fn test_step_session_follows_exchange_to_completion() {
    let engine = engine();
    let controller = engine.controller();
    controller.add_breakpoint("A");

    let u1 = Exchange::new("u1", "route-a");
    let routed = engine.route_async(&u1, &["A", "B", "C"]);
    assert!(wait_until(
        || controller.suspended_exchange_id("A").is_some(),
        Duration::from_secs(2)
    ));

    assert!(controller.step_breakpoint("A"));
    for node in ["B", "C"] {
        assert!(wait_until(
            || controller.suspended_exchange_id(node).as_deref() == Some("u1"),
            Duration::from_secs(2)
        ));
        controller.step();
    }

    // Completion parks the exchange one final time at its last node.
    assert!(wait_until(
        || controller.suspended_snapshot("C").is_some_and(|s| s.last),
        Duration::from_secs(2)
    ));
    controller.step();

    routed.join().unwrap();
    assert!(!controller.is_single_step_mode());
    assert!(controller.suspended_node_ids().is_empty());
}

#[test]
#[serial]
fn test_suspend_on_start_from_environment() {
    init::init_test_environment();
    std::env::set_var(FLOWDBG_SUSPEND, "true");
    let controller = DebugController::with_defaults("suspended-engine");
    std::env::remove_var(FLOWDBG_SUSPEND);

    controller.set_fallback_timeout(Duration::from_secs(5)).unwrap();
    assert!(controller.is_suspend_mode());
    assert!(!controller.is_attached());

    let engine = SimulatedEngine::new(controller.clone(), "route-a");
    let exchange = Exchange::new("u1", "route-a");
    let routed = engine.route_async(&exchange, &["A"]);

    // Suspend mode holds the exchange before any breakpoint logic runs.
    std::thread::sleep(Duration::from_millis(100));
    assert!(!routed.is_finished());

    controller.attach();
    routed.join().unwrap();
    assert!(controller.is_attached());
}

#[test]
#[serial]
fn test_suspend_on_start_fallback_variable() {
    init::init_test_environment();
    std::env::set_var(FLOWDBG_SUSPEND_FALLBACK, "1");
    let controller = DebugController::with_defaults("suspended-engine");
    std::env::remove_var(FLOWDBG_SUSPEND_FALLBACK);

    assert!(controller.is_suspend_mode());
    controller.attach();
    assert!(controller.is_attached());
}

#[test]
#[serial]
fn test_normal_start_without_environment() {
    init::init_test_environment();
    std::env::remove_var(FLOWDBG_SUSPEND);
    std::env::remove_var(FLOWDBG_SUSPEND_FALLBACK);
    let controller = DebugController::with_defaults("normal-engine");
    assert!(!controller.is_suspend_mode());

    // Exchanges flow without attaching.
    let engine = SimulatedEngine::new(controller, "route-a");
    let exchange = Exchange::new("u1", "route-a");
    let start = Instant::now();
    engine.route(&exchange, &["A"]);
    assert!(start.elapsed() < Duration::from_secs(1));
}
