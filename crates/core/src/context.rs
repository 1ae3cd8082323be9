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

//! The shared per-engine debug context.
//!
//! All process-wide counters live here as explicit atomics owned by one
//! context instance that is passed by reference to every component, so two
//! engines embedded in the same process never cross-contaminate sequence
//! numbers or settings.

use std::sync::atomic::{AtomicI64, Ordering};

use flowdbg_common::EngineSettings;

/// Shared state for one engine's debugger components.
#[derive(Debug)]
pub struct DebugContext {
    settings: EngineSettings,
    uid_counter: AtomicI64,
}

impl DebugContext {
    /// Creates a context bound to the given engine settings.
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings, uid_counter: AtomicI64::new(0) }
    }

    /// The surrounding engine's settings handle.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Returns the next snapshot sequence number. Monotonic within this
    /// context, starting at 1.
    pub fn next_uid(&self) -> i64 {
        self.uid_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The number of snapshot uids handed out so far.
    pub fn current_uid(&self) -> i64 {
        self.uid_counter.load(Ordering::Relaxed)
    }
}
