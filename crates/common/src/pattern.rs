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

//! Glob-like pattern matching for trace node/route filters.
//!
//! Patterns are deliberately small: exact match, `prefix*`, `*suffix`,
//! `*infix*`, and the match-all `*`. Multiple patterns are combined with
//! commas and match if any single pattern matches.

/// Matches a name against a single glob-like pattern.
pub fn match_pattern(name: &str, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }

    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(rest), _) if rest.ends_with('*') => {
            name.contains(rest.trim_end_matches('*'))
        }
        (Some(suffix), None) => name.ends_with(suffix),
        (None, Some(prefix)) => name.starts_with(prefix),
        _ => name == pattern,
    }
}

/// Matches a name against a comma-separated list of glob-like patterns.
///
/// Returns true if any single pattern matches. An empty list never matches.
pub fn match_patterns(name: &str, patterns: &str) -> bool {
    patterns
        .split(',')
        .filter(|p| !p.trim().is_empty())
        .any(|p| match_pattern(name, p))
}
