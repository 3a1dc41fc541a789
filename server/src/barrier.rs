//! Scene-load barrier gating the Starting -> InProgress transition

use log::debug;
use shared::ConnectionId;
use std::collections::HashSet;

/// Counts distinct "scene loaded" acknowledgements against the roster that
/// was present when the barrier was armed.
///
/// The barrier releases exactly once per arming. Acknowledgements from
/// connections outside the armed snapshot are ignored, duplicates are not
/// counted twice, and a member leaving before acknowledging shrinks the
/// expected count instead of stalling the barrier.
#[derive(Debug, Default)]
pub struct SceneLoadBarrier {
    armed: bool,
    released: bool,
    expected: usize,
    /// Snapshot members that have not acknowledged yet
    pending: HashSet<ConnectionId>,
    acknowledged: HashSet<ConnectionId>,
}

impl SceneLoadBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the barrier against a roster snapshot, discarding any earlier state
    pub fn arm(&mut self, members: impl IntoIterator<Item = ConnectionId>) {
        self.pending = members.into_iter().collect();
        self.acknowledged.clear();
        self.expected = self.pending.len();
        self.armed = true;
        self.released = false;
        debug!("Scene barrier armed for {} connections", self.expected);
    }

    /// Records an acknowledgement. Returns true only on the call that
    /// releases the barrier.
    pub fn acknowledge(&mut self, connection_id: ConnectionId) -> bool {
        if !self.armed || self.released {
            return false;
        }
        if !self.pending.remove(&connection_id) {
            debug!(
                "Ignoring scene ack from {} (duplicate or not in snapshot)",
                connection_id
            );
            return false;
        }

        self.acknowledged.insert(connection_id);
        self.try_release()
    }

    /// Drops a member that disconnected. A member that already acknowledged
    /// keeps counting; one that had not shrinks the expected count. Returns
    /// true if this releases the barrier.
    pub fn forget(&mut self, connection_id: ConnectionId) -> bool {
        if !self.armed || self.released {
            return false;
        }
        if !self.pending.remove(&connection_id) {
            return false;
        }

        self.expected -= 1;
        debug!(
            "Connection {} left before acknowledging, expecting {}",
            connection_id, self.expected
        );
        self.try_release()
    }

    fn try_release(&mut self) -> bool {
        // An emptied snapshot has nobody left to start a match for
        if self.expected == 0 || self.acknowledged.len() < self.expected {
            return false;
        }
        self.released = true;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn expected_count(&self) -> usize {
        self.expected
    }

    pub fn acknowledged_count(&self) -> usize {
        self.acknowledged.len()
    }

    /// Disarms and clears all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_releases_when_all_acknowledge() {
        let mut barrier = SceneLoadBarrier::new();
        barrier.arm([1, 2, 3]);

        assert!(!barrier.acknowledge(1));
        assert!(!barrier.acknowledge(2));
        assert!(barrier.acknowledge(3));
        assert!(barrier.is_released());
    }

    #[test]
    fn test_duplicate_ack_counts_once() {
        let mut barrier = SceneLoadBarrier::new();
        barrier.arm([1, 2]);

        assert!(!barrier.acknowledge(1));
        assert!(!barrier.acknowledge(1));
        assert_eq!(barrier.acknowledged_count(), 1);
        assert!(!barrier.is_released());
    }

    #[test]
    fn test_unknown_connection_ignored() {
        let mut barrier = SceneLoadBarrier::new();
        barrier.arm([1]);

        assert!(!barrier.acknowledge(99));
        assert_eq!(barrier.acknowledged_count(), 0);
        assert!(barrier.acknowledge(1));
    }

    #[test]
    fn test_unarmed_barrier_ignores_acks() {
        let mut barrier = SceneLoadBarrier::new();
        assert!(!barrier.acknowledge(1));
        assert!(!barrier.is_armed());
    }

    #[test]
    fn test_releases_only_once() {
        let mut barrier = SceneLoadBarrier::new();
        barrier.arm([1]);

        assert!(barrier.acknowledge(1));
        assert!(!barrier.acknowledge(1));
        assert!(!barrier.forget(1));
    }

    #[test]
    fn test_leaving_before_ack_decrements_expected() {
        let mut barrier = SceneLoadBarrier::new();
        barrier.arm([1, 2, 3, 4]);

        barrier.acknowledge(1);
        barrier.acknowledge(2);
        assert!(!barrier.forget(4));
        assert_eq!(barrier.expected_count(), 3);
        assert!(barrier.acknowledge(3));
    }

    #[test]
    fn test_last_pending_leaving_releases() {
        let mut barrier = SceneLoadBarrier::new();
        barrier.arm([1, 2, 3, 4]);

        barrier.acknowledge(1);
        barrier.acknowledge(2);
        barrier.acknowledge(3);
        assert!(barrier.forget(4));
        assert!(barrier.is_released());
    }

    #[test]
    fn test_ack_after_leaving_is_not_counted() {
        let mut barrier = SceneLoadBarrier::new();
        barrier.arm([1, 2, 3, 4]);

        assert!(!barrier.forget(4));
        assert!(!barrier.acknowledge(4));
        assert_eq!(barrier.expected_count(), 3);
        assert_eq!(barrier.acknowledged_count(), 0);
        assert!(!barrier.is_released());

        barrier.acknowledge(1);
        barrier.acknowledge(2);
        assert!(barrier.acknowledge(3));
    }

    #[test]
    fn test_leaving_after_ack_still_counts() {
        let mut barrier = SceneLoadBarrier::new();
        barrier.arm([1, 2]);

        barrier.acknowledge(1);
        assert!(!barrier.forget(1));
        assert_eq!(barrier.expected_count(), 2);
        assert!(barrier.acknowledge(2));
    }

    #[test]
    fn test_everyone_leaving_does_not_release() {
        let mut barrier = SceneLoadBarrier::new();
        barrier.arm([1, 2]);

        assert!(!barrier.forget(1));
        assert!(!barrier.forget(2));
        assert_eq!(barrier.expected_count(), 0);
        assert!(!barrier.is_released());
    }

    #[test]
    fn test_reset_disarms() {
        let mut barrier = SceneLoadBarrier::new();
        barrier.arm([1]);
        barrier.acknowledge(1);

        barrier.reset();
        assert!(!barrier.is_armed());
        assert!(!barrier.is_released());
        assert_eq!(barrier.expected_count(), 0);
    }
}
