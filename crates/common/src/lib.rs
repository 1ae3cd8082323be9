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

//! flowdbg Common - Shared functionality for flowdbg components
//!
//! This crate provides the types shared between the debugger core and the
//! surrounding routing engine: the in-memory exchange (unit of work) model,
//! breakpoint and snapshot value types, and the collaborator seams
//! (expression resolver, message dumper, type converter) the core talks to.

/// Common value types used throughout flowdbg including breakpoint specs and event snapshots
pub mod types;

/// Engine-facing seams: lifecycle events, engine settings and the pipeline hook surface
pub mod engine;
/// Environment variable name constants for flowdbg configuration
pub mod env;
/// The in-memory exchange (unit of work) model shared between routing and operator threads
pub mod exchange;
/// Expression normalization helpers shared by breakpoint and trace-filter handling
pub mod expression;
/// Logging setup and utilities for consistent logging across flowdbg components
pub mod logging;
/// Glob-like pattern matching for trace node/route filters
pub mod pattern;
/// Collaborator traits and their default in-memory implementations
pub mod traits;

pub use engine::*;
pub use env::*;
pub use exchange::*;
pub use expression::*;
pub use pattern::*;
pub use traits::*;
