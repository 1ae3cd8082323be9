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

//! The single-use release gate a suspended routing thread parks on.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A single-permit, single-use signal.
///
/// One thread parks on [`wait_timeout`](Self::wait_timeout); any number of
/// threads may call [`release`](Self::release), which is idempotent. Once
/// released the gate stays released - a later wait returns immediately.
#[derive(Debug, Default)]
pub struct SuspendGate {
    released: Mutex<bool>,
    condvar: Condvar,
}

impl SuspendGate {
    /// Creates an unreleased gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases the gate, waking any parked thread. Safe to call more than
    /// once and from any thread.
    pub fn release(&self) {
        let mut released = self.released.lock();
        if !*released {
            *released = true;
            self.condvar.notify_all();
        }
    }

    /// True once the gate has been released.
    pub fn is_released(&self) -> bool {
        *self.released.lock()
    }

    /// Parks the calling thread until the gate is released or the timeout
    /// elapses. Returns true when released, false on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut released = self.released.lock();
        while !*released {
            if self.condvar.wait_until(&mut released, deadline).timed_out() {
                return *released;
            }
        }
        true
    }
}
