use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// History messages pushed to a joining connection unless configured.
pub const DEFAULT_HISTORY_WINDOW: usize = 50;

/// Upper bound accepted for the history window.
pub const MAX_HISTORY_WINDOW: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Number of recent messages delivered on join.
    pub history_window: usize,
    /// Who may wipe the message history.
    pub clear_policy: ClearPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
            clear_policy: ClearPolicy::Anyone,
        }
    }
}

/// Capability check for `clear_chat`.
///
/// `Only` names are matched against the authenticated username when the
/// connection has one, otherwise against the announced display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearPolicy {
    Anyone,
    Nobody,
    Only(BTreeSet<String>),
}

impl ClearPolicy {
    pub fn allows(&self, name: Option<&str>) -> bool {
        match self {
            Self::Anyone => true,
            Self::Nobody => false,
            Self::Only(names) => name.is_some_and(|n| names.contains(n)),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid clear policy '{0}': expected anyone, nobody or only:<name>[,<name>...]")]
pub struct ClearPolicyParseError(pub String);

impl FromStr for ClearPolicy {
    type Err = ClearPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "anyone" => return Ok(Self::Anyone),
            "nobody" => return Ok(Self::Nobody),
            _ => {}
        }

        let list = trimmed
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("only:"))
            .and_then(|_| trimmed.get(5..))
            .ok_or_else(|| ClearPolicyParseError(s.to_string()))?;
        let names: BTreeSet<String> = list
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();

        if names.is_empty() {
            return Err(ClearPolicyParseError(s.to_string()));
        }
        Ok(Self::Only(names))
    }
}

impl fmt::Display for ClearPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anyone => f.write_str("anyone"),
            Self::Nobody => f.write_str("nobody"),
            Self::Only(names) => {
                let list: Vec<&str> = names.iter().map(String::as_str).collect();
                write!(f, "only:{}", list.join(","))
            }
        }
    }
}
