//! Delay-policy resolution.
//!
//! The compliance delay for a call is resolved through a hierarchy:
//! a recipient's talkgroup override outranks their system override,
//! which outranks their flat delay, which outranks the caller-supplied
//! default; the default itself is resolved talkgroup → system → global
//! when no recipient is involved. Zero means "no delay" at every level;
//! there is no separate disabled sentinel. All values are minutes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::call::Call;

/// Per-recipient delay override maps, as carried by users and groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayOverrides {
    /// Flat baseline delay for the recipient, minutes.
    #[serde(default)]
    pub delay: u32,
    /// Per-system overrides keyed by system reference.
    #[serde(default)]
    pub system_delays: HashMap<u32, u32>,
    /// Per-talkgroup overrides keyed by `"system:talkgroup"`.
    #[serde(default)]
    pub talkgroup_delays: HashMap<String, u32>,
}

impl DelayOverrides {
    pub fn is_empty(&self) -> bool {
        self.delay == 0 && self.system_delays.is_empty() && self.talkgroup_delays.is_empty()
    }

    /// Merge user overrides over group overrides: at every tier the
    /// user's value wins when present.
    pub fn merged(user: &Self, group: Option<&Self>) -> Self {
        let Some(group) = group else {
            return user.clone();
        };
        let mut merged = group.clone();
        merged.system_delays.extend(&user.system_delays);
        merged
            .talkgroup_delays
            .extend(user.talkgroup_delays.iter().map(|(k, v)| (k.clone(), *v)));
        if user.delay > 0 {
            merged.delay = user.delay;
        }
        merged
    }
}

/// Composite key for per-talkgroup override maps.
pub fn talkgroup_key(system_ref: u32, talkgroup_ref: u32) -> String {
    format!("{system_ref}:{talkgroup_ref}")
}

/// Resolve the effective delay in minutes for a call and recipient.
///
/// Missing overrides fall through to `default_delay`; a fully zeroed
/// hierarchy resolves to zero, i.e. immediate delivery (fail-open).
pub fn effective_delay(call: &Call, overrides: Option<&DelayOverrides>, default_delay: u32) -> u32 {
    let Some(ov) = overrides else {
        return default_delay;
    };

    let key = talkgroup_key(call.system_ref, call.talkgroup_ref);
    if let Some(&d) = ov.talkgroup_delays.get(&key) {
        if d > 0 {
            return d;
        }
    }
    if let Some(&d) = ov.system_delays.get(&call.system_ref) {
        if d > 0 {
            return d;
        }
    }
    if ov.delay > 0 {
        return ov.delay;
    }
    default_delay
}

/// Resolve the global baseline delay: talkgroup over system over the
/// configured default, zeros skipping to the next tier.
pub fn baseline_delay(talkgroup_delay: u32, system_delay: u32, global_default: u32) -> u32 {
    if talkgroup_delay > 0 {
        talkgroup_delay
    } else if system_delay > 0 {
        system_delay
    } else {
        global_default
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn call(system: u32, talkgroup: u32) -> Call {
        Call::new(1, system, talkgroup, 1_700_000_000_000, Vec::new(), "audio/mpeg".into())
    }

    #[test]
    fn talkgroup_baseline_outranks_system() {
        assert_eq!(baseline_delay(10, 5, 3), 10);
        assert_eq!(baseline_delay(0, 5, 3), 5);
        assert_eq!(baseline_delay(0, 0, 3), 3);
        assert_eq!(baseline_delay(0, 0, 0), 0);
    }

    #[test]
    fn talkgroup_override_wins() {
        let mut ov = DelayOverrides::default();
        ov.system_delays.insert(5, 15);
        ov.talkgroup_delays.insert("5:101".into(), 30);
        ov.delay = 7;
        assert_eq!(effective_delay(&call(5, 101), Some(&ov), 3), 30);
        // Other talkgroups in the system fall to the system override.
        assert_eq!(effective_delay(&call(5, 102), Some(&ov), 3), 15);
        // Other systems fall to the flat delay.
        assert_eq!(effective_delay(&call(9, 101), Some(&ov), 3), 7);
    }

    #[test]
    fn zero_override_is_not_set() {
        let mut ov = DelayOverrides::default();
        ov.talkgroup_delays.insert("5:101".into(), 0);
        ov.system_delays.insert(5, 0);
        assert_eq!(effective_delay(&call(5, 101), Some(&ov), 4), 4);
    }

    #[test]
    fn missing_overrides_use_default() {
        assert_eq!(effective_delay(&call(5, 101), None, 12), 12);
        let ov = DelayOverrides::default();
        assert_eq!(effective_delay(&call(5, 101), Some(&ov), 12), 12);
    }

    #[test]
    fn all_zero_resolves_to_zero() {
        let ov = DelayOverrides::default();
        assert_eq!(effective_delay(&call(5, 101), Some(&ov), 0), 0);
    }

    #[test]
    fn user_values_win_in_merge() {
        let mut group = DelayOverrides::default();
        group.delay = 10;
        group.system_delays.insert(5, 20);
        group.talkgroup_delays.insert("5:101".into(), 25);

        let mut user = DelayOverrides::default();
        user.system_delays.insert(5, 2);

        let merged = DelayOverrides::merged(&user, Some(&group));
        assert_eq!(merged.delay, 10);
        assert_eq!(merged.system_delays.get(&5), Some(&2));
        assert_eq!(merged.talkgroup_delays.get("5:101"), Some(&25));
    }

    #[test]
    fn merge_without_group_is_identity() {
        let mut user = DelayOverrides::default();
        user.delay = 6;
        assert_eq!(DelayOverrides::merged(&user, None), user);
    }
}
