//! Access-scope evaluation.
//!
//! A scope descriptor controls which systems and talkgroups a listener,
//! API key, or downstream relay may see. Three descriptor shapes exist
//! in configuration: the wildcard `"*"`, the legacy flat system-id list
//! (where an *empty* list means unrestricted), and the structured
//! per-system form with optional talkgroup lists. The shape is resolved
//! once at deserialisation into [`AccessScope`]; every access check in
//! the repository goes through this one evaluator so the scope rules
//! cannot drift between code paths.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Resolved access scope for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AccessScopeRaw", into = "AccessScopeRaw")]
pub enum AccessScope {
    /// Wildcard, or the legacy empty list: everything is visible.
    Unrestricted,
    /// Legacy flat list of visible system references (non-empty).
    Systems(Vec<u32>),
    /// Structured per-system entries; first match on the system wins,
    /// no match anywhere is a deny.
    Scoped(Vec<SystemScope>),
}

/// One structured scope entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemScope {
    pub system_ref: u32,
    pub talkgroups: TalkgroupScope,
}

/// Talkgroup visibility within one scoped system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TalkgroupScope {
    /// `"*"` or an absent `talkgroups` key: the whole system.
    All,
    /// Only the listed talkgroup references.
    List(Vec<u32>),
}

impl AccessScope {
    /// Whether any part of the given system is visible.
    pub fn has_access(&self, system_ref: u32) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Systems(ids) => ids.contains(&system_ref),
            Self::Scoped(entries) => entries.iter().any(|e| e.system_ref == system_ref),
        }
    }

    /// Whether the given system/talkgroup pair is visible.
    pub fn has_talkgroup_access(&self, system_ref: u32, talkgroup_ref: u32) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Systems(ids) => ids.contains(&system_ref),
            Self::Scoped(entries) => entries
                .iter()
                .find(|e| e.system_ref == system_ref)
                .is_some_and(|e| match &e.talkgroups {
                    TalkgroupScope::All => true,
                    TalkgroupScope::List(tgs) => tgs.contains(&talkgroup_ref),
                }),
        }
    }
}

impl Default for AccessScope {
    fn default() -> Self {
        Self::Unrestricted
    }
}

// ---------------------------------------------------------------------------
// Raw serde shapes; the union is resolved here exactly once.
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum AccessScopeRaw {
    Wildcard(String),
    Legacy(Vec<u32>),
    Scoped(Vec<SystemScopeRaw>),
}

#[derive(Clone, Serialize, Deserialize)]
struct SystemScopeRaw {
    id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    talkgroups: Option<TalkgroupScopeRaw>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TalkgroupScopeRaw {
    Wildcard(String),
    List(Vec<u32>),
}

impl TryFrom<AccessScopeRaw> for AccessScope {
    type Error = Error;

    fn try_from(raw: AccessScopeRaw) -> Result<Self, Error> {
        match raw {
            AccessScopeRaw::Wildcard(s) => {
                if s == "*" {
                    Ok(Self::Unrestricted)
                } else {
                    Err(Error::AccessScope(format!("unknown scope string {s:?}")))
                }
            }
            AccessScopeRaw::Legacy(ids) => {
                if ids.is_empty() {
                    // Legacy convention: empty list means "all systems".
                    Ok(Self::Unrestricted)
                } else {
                    Ok(Self::Systems(ids))
                }
            }
            AccessScopeRaw::Scoped(entries) => {
                let entries = entries
                    .into_iter()
                    .map(|e| {
                        let talkgroups = match e.talkgroups {
                            None => TalkgroupScope::All,
                            Some(TalkgroupScopeRaw::Wildcard(s)) if s == "*" => TalkgroupScope::All,
                            Some(TalkgroupScopeRaw::Wildcard(s)) => {
                                return Err(Error::AccessScope(format!(
                                    "unknown talkgroup scope string {s:?}"
                                )));
                            }
                            Some(TalkgroupScopeRaw::List(tgs)) => TalkgroupScope::List(tgs),
                        };
                        Ok(SystemScope {
                            system_ref: e.id,
                            talkgroups,
                        })
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok(Self::Scoped(entries))
            }
        }
    }
}

impl From<AccessScope> for AccessScopeRaw {
    fn from(scope: AccessScope) -> Self {
        match scope {
            AccessScope::Unrestricted => Self::Wildcard("*".to_string()),
            AccessScope::Systems(ids) => Self::Legacy(ids),
            AccessScope::Scoped(entries) => Self::Scoped(
                entries
                    .into_iter()
                    .map(|e| SystemScopeRaw {
                        id: e.system_ref,
                        talkgroups: match e.talkgroups {
                            TalkgroupScope::All => None,
                            TalkgroupScope::List(tgs) => Some(TalkgroupScopeRaw::List(tgs)),
                        },
                    })
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(json: &str) -> AccessScope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn wildcard_allows_everything() {
        let scope = parse(r#""*""#);
        assert_eq!(scope, AccessScope::Unrestricted);
        assert!(scope.has_access(1));
        assert!(scope.has_talkgroup_access(42, 9999));
    }

    #[test]
    fn empty_legacy_list_means_unrestricted() {
        let scope = parse("[]");
        assert_eq!(scope, AccessScope::Unrestricted);
        assert!(scope.has_access(7));
    }

    #[test]
    fn legacy_list_matches_listed_systems_only() {
        let scope = parse("[5, 7]");
        assert!(scope.has_access(5));
        assert!(scope.has_access(7));
        assert!(!scope.has_access(9));
        // Legacy lists carry no talkgroup granularity.
        assert!(scope.has_talkgroup_access(5, 12345));
        assert!(!scope.has_talkgroup_access(9, 12345));
    }

    #[test]
    fn scoped_wildcard_talkgroups() {
        let scope = parse(r#"[{"id": 5, "talkgroups": "*"}]"#);
        assert!(scope.has_access(5));
        assert!(scope.has_talkgroup_access(5, 101));
        assert!(scope.has_talkgroup_access(5, 202));
        assert!(!scope.has_access(7));
        assert!(!scope.has_talkgroup_access(7, 101));
    }

    #[test]
    fn scoped_missing_talkgroups_key_means_whole_system() {
        let scope = parse(r#"[{"id": 5}]"#);
        assert!(scope.has_talkgroup_access(5, 321));
    }

    #[test]
    fn scoped_talkgroup_list_restricts_within_system() {
        let scope = parse(r#"[{"id": 5, "talkgroups": [101, 102]}, {"id": 7}]"#);
        assert!(scope.has_talkgroup_access(5, 101));
        assert!(!scope.has_talkgroup_access(5, 103));
        assert!(scope.has_talkgroup_access(7, 555));
        assert!(!scope.has_talkgroup_access(8, 101));
    }

    #[test]
    fn first_matching_system_entry_wins() {
        let scope = parse(r#"[{"id": 5, "talkgroups": [101]}, {"id": 5, "talkgroups": "*"}]"#);
        assert!(scope.has_talkgroup_access(5, 101));
        assert!(!scope.has_talkgroup_access(5, 999));
    }

    #[test]
    fn unknown_scope_string_rejected() {
        assert!(serde_json::from_str::<AccessScope>(r#""all""#).is_err());
    }

    #[test]
    fn serializes_back_to_config_shape() {
        let scope = parse(r#"[{"id": 5, "talkgroups": [101]}]"#);
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(parse(&json), scope);
    }
}
