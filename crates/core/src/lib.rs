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

//! flowdbg Core - the breakpoint, suspension and trace-backlog engine.
//!
//! This crate is the heart of flowdbg: the mechanism that lets an operator
//! pause an in-flight exchange at a named pipeline node, inspect and mutate
//! its state, and resume it - one exchange at a time or in bulk - while
//! other concurrently routed exchanges continue unobstructed.
//!
//! # Architecture
//!
//! Four components, built bottom-up:
//!
//! - [`SnapshotRecorder`] ([`recorder`]) - captures immutable point-in-time
//!   snapshots of an exchange at a pipeline node
//! - [`TraceBacklog`] ([`backlog`]) - a bounded FIFO store of snapshots with
//!   pattern/predicate filtering, independent of breakpoints
//! - [`Debugger`] ([`debugger`]) - the low-level breakpoint registry and
//!   hook dispatcher driven by the routing engine
//! - [`DebugController`] ([`controller`]) - the operator-facing
//!   suspend/resume/step engine where cross-thread blocking happens
//!
//! The routing engine calls the controller's
//! [`PipelineHooks`](flowdbg_common::PipelineHooks) surface once per node
//! visit per exchange, on the routing thread of that exchange. All operator
//! calls arrive on arbitrary external threads; every shared structure is
//! keyed by node id (or exchange id for single-stepping) and safe under
//! concurrent invocation.

pub mod backlog;
pub use backlog::*;

pub mod context;
pub use context::*;

pub mod controller;
pub use controller::*;

pub mod debugger;
pub use debugger::*;

pub mod error;
pub use error::*;

pub mod gate;
pub use gate::*;

pub mod recorder;
pub use recorder::*;
