/// Replay priority of drain groups
use compact_str::CompactString;
use std::collections::HashMap;

/// Names of the agent's features, which double as their drain group names.
pub mod features {
    pub const AJAX: &str = "ajax";
    pub const GENERIC_EVENTS: &str = "generic_events";
    pub const JSERRORS: &str = "jserrors";
    pub const LOGGING: &str = "logging";
    pub const METRICS: &str = "metrics";
    pub const PAGE_ACTION: &str = "page_action";
    pub const PAGE_VIEW_EVENT: &str = "page_view_event";
    pub const PAGE_VIEW_TIMING: &str = "page_view_timing";
    pub const SESSION_REPLAY: &str = "session_replay";
    pub const SESSION_TRACE: &str = "session_trace";
    pub const SOFT_NAV: &str = "soft_navigations";
    pub const SPA: &str = "spa";

    /// Default replay order, first drains first.
    pub const DEFAULT_ORDER: [&str; 11] = [
        PAGE_VIEW_EVENT,
        PAGE_VIEW_TIMING,
        METRICS,
        JSERRORS,
        SPA,
        AJAX,
        SESSION_TRACE,
        SOFT_NAV,
        SESSION_REPLAY,
        LOGGING,
        GENERIC_EVENTS,
    ];
}

/// Total order over group names used when a gate flushes several groups.
///
/// Lower ranks replay first. Groups missing from the table rank `0`, ahead
/// of every listed feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePriority {
    ranks: HashMap<CompactString, i32>,
}

impl FeaturePriority {
    /// Ranks `groups` 1, 2, 3, ... in the order given.
    pub fn from_order<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ranks = groups
            .into_iter()
            .enumerate()
            .map(|(i, group)| (CompactString::new(group.as_ref()), i as i32 + 1))
            .collect();
        Self { ranks }
    }

    /// Builds a table from explicit ranks.
    pub fn from_ranks<I, S>(ranks: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: AsRef<str>,
    {
        Self {
            ranks: ranks
                .into_iter()
                .map(|(group, rank)| (CompactString::new(group.as_ref()), rank))
                .collect(),
        }
    }

    pub fn rank(&self, group: &str) -> i32 {
        self.ranks.get(group).copied().unwrap_or(0)
    }
}

impl Default for FeaturePriority {
    fn default() -> Self {
        Self::from_order(features::DEFAULT_ORDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priority() {
        let priority = FeaturePriority::default();
        assert_eq!(priority.rank(features::PAGE_VIEW_EVENT), 1);
        assert_eq!(priority.rank(features::GENERIC_EVENTS), 11);
        assert_eq!(priority.rank("api"), 0);
        assert!(priority.rank(features::METRICS) < priority.rank(features::AJAX));
    }

    #[test]
    fn test_explicit_ranks() {
        let priority = FeaturePriority::from_ranks([("g1", 1), ("g2", 0)]);
        assert!(priority.rank("g2") < priority.rank("g1"));
    }
}
