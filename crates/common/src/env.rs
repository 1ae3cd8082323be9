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

//! Environment variable name constants for flowdbg configuration.
//!
//! This module provides constant string names for all environment variables
//! used by flowdbg. These constants ensure consistency across the codebase
//! and provide a single source of truth for environment variable names.

/// Environment variable for starting the debugger in global suspend mode.
///
/// When set to `true` (or `1`), every exchange entering the pipeline blocks
/// at its first node until an operator attaches to the debugger. This is
/// used to hold an entire engine paused from the very first message until a
/// remote debugger connects, independent of any per-node breakpoint.
///
/// # Syntax
///
/// - `FLOWDBG_SUSPEND=true` - Start in suspend mode
/// - `FLOWDBG_SUSPEND=1` - Same
/// - Any other value, or unset - Start normally
///
/// # Related
///
/// [`FLOWDBG_SUSPEND_FALLBACK`] is consulted when this variable is unset.
pub const FLOWDBG_SUSPEND: &str = "FLOWDBG_SUSPEND";

/// Fallback environment variable for [`FLOWDBG_SUSPEND`].
///
/// Deployment tooling that cannot set `FLOWDBG_SUSPEND` directly (because it
/// namespaces variables per component) may set this one instead. It is only
/// consulted when [`FLOWDBG_SUSPEND`] is unset, mirroring the
/// variable-then-property lookup order of comparable engine settings.
pub const FLOWDBG_SUSPEND_FALLBACK: &str = "FLOWDBG_DEBUGGER_SUSPEND";

/// Resolves the suspend-on-start flag from the environment.
///
/// Checks [`FLOWDBG_SUSPEND`] first, then [`FLOWDBG_SUSPEND_FALLBACK`].
/// A value of `true` (case-insensitive) or `1` enables suspend mode.
pub fn suspend_mode_from_env() -> bool {
    let value = std::env::var(FLOWDBG_SUSPEND)
        .or_else(|_| std::env::var(FLOWDBG_SUSPEND_FALLBACK))
        .unwrap_or_default();
    value.eq_ignore_ascii_case("true") || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var mutation is process-global; these tests restore state and the
    // integration suite runs its env tests under serial_test.
    #[test]
    fn test_suspend_mode_from_env() {
        let old = std::env::var(FLOWDBG_SUSPEND).ok();

        std::env::set_var(FLOWDBG_SUSPEND, "true");
        assert!(suspend_mode_from_env());

        std::env::set_var(FLOWDBG_SUSPEND, "TRUE");
        assert!(suspend_mode_from_env());

        std::env::set_var(FLOWDBG_SUSPEND, "1");
        assert!(suspend_mode_from_env());

        std::env::set_var(FLOWDBG_SUSPEND, "false");
        assert!(!suspend_mode_from_env());

        std::env::set_var(FLOWDBG_SUSPEND, "yes");
        assert!(!suspend_mode_from_env());

        match old {
            Some(v) => std::env::set_var(FLOWDBG_SUSPEND, v),
            None => std::env::remove_var(FLOWDBG_SUSPEND),
        }
    }
}
