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

use std::{fmt::Display, str::FromStr};

use eyre::{bail, Error, Result};
use serde::{Deserialize, Serialize};

use crate::normalize_expression;

/// The language a breakpoint condition is written in when none is given
/// explicitly.
pub const DEFAULT_CONDITION_LANGUAGE: &str = "simple";

/// Represents a breakpoint specification: the pipeline node it intercepts and
/// an optional condition that must evaluate to true for the breakpoint to
/// trigger. One breakpoint exists per node id; re-registering the same node
/// without a condition clears any previous condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BreakpointSpec {
    /// Id of the pipeline node the breakpoint intercepts.
    pub node_id: String,
    /// Language of the optional condition expression.
    pub language: String,
    /// Optional condition expression that must evaluate to true for the
    /// breakpoint to trigger.
    pub condition: Option<String>,
}

impl Display for BreakpointSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.node_id)?;
        if let Some(cond) = &self.condition {
            write!(f, " if {cond}")?;
        }
        Ok(())
    }
}

impl FromStr for BreakpointSpec {
    type Err = Error;

    /// Parses a breakpoint from a string.
    /// Format: `@<node-id> [if $ <condition>]`
    /// Examples:
    /// - `@transform-orders` - Plain breakpoint on a node
    /// - `@transform-orders if $ header:priority == 'high'` - Conditional breakpoint
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();

        let Some(rest) = trimmed.strip_prefix('@') else {
            bail!("Invalid breakpoint format. Expected @<node-id> [if $ <condition>], got: {s}");
        };

        if let Some(if_pos) = rest.find(" if ") {
            let node_id = rest[..if_pos].trim();
            if node_id.is_empty() {
                bail!("Breakpoint node id must not be empty");
            }
            let condition_str = rest[if_pos + 4..].trim();
            if !condition_str.starts_with('$') {
                bail!("Condition expression does not start with $");
            }
            Ok(Self {
                node_id: node_id.to_string(),
                language: DEFAULT_CONDITION_LANGUAGE.to_string(),
                condition: Some(normalize_expression(condition_str[1..].trim())),
            })
        } else {
            let node_id = rest.trim();
            if node_id.is_empty() {
                bail!("Breakpoint node id must not be empty");
            }
            Ok(Self::plain(node_id))
        }
    }
}

impl BreakpointSpec {
    /// Creates a plain breakpoint on the given node, without a condition.
    pub fn plain(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            language: DEFAULT_CONDITION_LANGUAGE.to_string(),
            condition: None,
        }
    }

    /// Creates a conditional breakpoint on the given node.
    pub fn conditional(
        node_id: impl Into<String>,
        language: impl Into<String>,
        condition: &str,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            language: language.into(),
            condition: Some(normalize_expression(condition)),
        }
    }

    /// Update the condition of the breakpoint.
    pub fn set_condition(&mut self, condition: &str) {
        self.condition = Some(normalize_expression(condition));
    }
}

/// Activation state of a registered breakpoint.
///
/// A `Suspended` breakpoint is never evaluated for new matches; exchanges it
/// already suspended stay suspended until explicitly resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BreakpointState {
    /// The breakpoint is evaluated on every node visit.
    #[default]
    Active,
    /// The breakpoint is parked: never matched, never removed.
    Suspended,
}
