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

//! Typed failures surfaced to operator calls.
//!
//! Nothing in this module ever reaches the routing pipeline: internal faults
//! are logged and recovered at the dispatch boundary, and the only
//! user-visible failure mode is a rejected operator command.

use flowdbg_common::NoTypeConversion;
use thiserror::Error;

/// Failures returned from operator-facing debugger calls.
#[derive(Debug, Error)]
pub enum DebugError {
    /// A configuration value was rejected (backlog size out of range,
    /// unknown logging level, ...). Fatal to that call only.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A condition expression failed to compile at registration time.
    #[error("failed to compile '{language}' condition '{expression}': {source}")]
    ConditionCompile {
        /// Language of the rejected expression.
        language: String,
        /// The rejected expression text.
        expression: String,
        /// The resolver's failure.
        source: eyre::Error,
    },

    /// A type coercion on a mutation call failed; the suspended exchange is
    /// left unchanged.
    #[error(transparent)]
    NoTypeConversion(#[from] NoTypeConversion),
}

/// Result alias for operator-facing debugger calls.
pub type DebugResult<T> = std::result::Result<T, DebugError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DebugError::InvalidConfiguration("backlog size must be positive".to_string());
        assert_eq!(err.to_string(), "invalid configuration: backlog size must be positive");

        let err = DebugError::ConditionCompile {
            language: "simple".to_string(),
            expression: "bogus ===".to_string(),
            source: eyre::eyre!("unknown operand"),
        };
        assert!(err.to_string().contains("simple"));
        assert!(err.to_string().contains("bogus ==="));

        let err: DebugError = NoTypeConversion::new("int", "abc").into();
        assert!(err.to_string().contains("no type conversion available"));
    }
}
