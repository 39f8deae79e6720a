//! Edge-triggered connectivity detection.
//!
//! The platform reports raw reachability events; the monitor turns them into
//! at most one [`ConnectivityEdge::Reconnected`] per offline-to-online
//! transition. The very first observation only seeds the last-known state -
//! an `unknown -> online` transition is not an edge, which prevents a
//! spurious "recovered" sync at process start.

use tracing::debug;

/// One raw connectivity event from the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectivitySnapshot {
    pub reachable: bool,
    /// `None` when the platform has not yet probed actual internet access.
    pub internet_reachable: Option<bool>,
}

impl ConnectivitySnapshot {
    pub fn online() -> Self {
        Self {
            reachable: true,
            internet_reachable: Some(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            reachable: false,
            internet_reachable: Some(false),
        }
    }

    /// A device counts as online when it is reachable and internet access
    /// has not been ruled out.
    pub fn is_online(&self) -> bool {
        self.reachable && self.internet_reachable != Some(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEdge {
    Reconnected,
    Disconnected,
}

#[derive(Debug, Default)]
pub struct ConnectivityMonitor {
    last_known: Option<bool>,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one platform event; returns the edge it produced, if any.
    pub fn observe(&mut self, snapshot: ConnectivitySnapshot) -> Option<ConnectivityEdge> {
        let online = snapshot.is_online();
        let edge = match self.last_known {
            None => None,
            Some(prev) if prev == online => None,
            Some(false) => Some(ConnectivityEdge::Reconnected),
            Some(true) => Some(ConnectivityEdge::Disconnected),
        };
        self.last_known = Some(online);
        if let Some(edge) = edge {
            debug!(?edge, "connectivity edge");
        }
        edge
    }

    /// Last observed state; `None` until the first event arrives.
    pub fn is_online(&self) -> Option<bool> {
        self.last_known
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_not_an_edge() {
        let mut monitor = ConnectivityMonitor::new();
        assert_eq!(monitor.observe(ConnectivitySnapshot::online()), None);
        assert_eq!(monitor.is_online(), Some(true));

        let mut monitor = ConnectivityMonitor::new();
        assert_eq!(monitor.observe(ConnectivitySnapshot::offline()), None);
        assert_eq!(monitor.is_online(), Some(false));
    }

    #[test]
    fn one_edge_per_transition_under_flapping() {
        let mut monitor = ConnectivityMonitor::new();
        monitor.observe(ConnectivitySnapshot::offline());

        // Repeated offline events produce nothing.
        assert_eq!(monitor.observe(ConnectivitySnapshot::offline()), None);
        assert_eq!(monitor.observe(ConnectivitySnapshot::offline()), None);

        assert_eq!(
            monitor.observe(ConnectivitySnapshot::online()),
            Some(ConnectivityEdge::Reconnected)
        );
        // Staying online is not a new edge.
        assert_eq!(monitor.observe(ConnectivitySnapshot::online()), None);

        assert_eq!(
            monitor.observe(ConnectivitySnapshot::offline()),
            Some(ConnectivityEdge::Disconnected)
        );
        assert_eq!(
            monitor.observe(ConnectivitySnapshot::online()),
            Some(ConnectivityEdge::Reconnected)
        );
    }

    #[test]
    fn reachable_without_internet_counts_as_offline() {
        let snapshot = ConnectivitySnapshot {
            reachable: true,
            internet_reachable: Some(false),
        };
        assert!(!snapshot.is_online());

        // An unprobed internet state does not rule the device offline.
        let snapshot = ConnectivitySnapshot {
            reachable: true,
            internet_reachable: None,
        };
        assert!(snapshot.is_online());
    }
}
