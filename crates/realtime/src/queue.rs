//! FIFO buffer for operations issued before authentication.

use std::collections::VecDeque;

use crate::types::{OperationKind, QueuedOperation};

/// Operations waiting for an authenticated connection, oldest first.
#[derive(Debug, Default)]
pub struct OperationQueue {
    ops: VecDeque<QueuedOperation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation unless an identical one is already waiting.
    ///
    /// Room operations are compared against the latest queued operation
    /// for the same room, so `join, leave, join` keeps all three while
    /// `join, join` collapses to one. Returns `false` when deduplicated.
    pub fn enqueue(&mut self, kind: OperationKind, payload: impl Into<String>) -> bool {
        let payload = payload.into();
        let duplicate = match kind.room_kind() {
            Some(room_kind) => self
                .ops
                .iter()
                .rev()
                .find(|op| op.kind.room_kind() == Some(room_kind) && op.payload == payload)
                .is_some_and(|op| op.kind == kind),
            None => self.contains(kind, &payload),
        };
        if duplicate {
            return false;
        }
        self.ops.push_back(QueuedOperation::new(kind, payload));
        true
    }

    /// Returns `true` if an operation with this kind and payload is queued.
    pub fn contains(&self, kind: OperationKind, payload: &str) -> bool {
        self.ops
            .iter()
            .any(|op| op.kind == kind && op.payload == payload)
    }

    pub fn pop_front(&mut self) -> Option<QueuedOperation> {
        self.ops.pop_front()
    }

    /// Puts an operation back at the head (used after a failed emit).
    pub fn push_front(&mut self, op: QueuedOperation) {
        self.ops.push_front(op);
    }

    /// Drops every queued operation and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.ops.len();
        self.ops.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedOperation> {
        self.ops.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(q: &OperationQueue) -> Vec<(OperationKind, String)> {
        q.iter().map(|op| (op.kind, op.payload.clone())).collect()
    }

    #[test]
    fn fifo_order() {
        let mut q = OperationQueue::new();
        q.enqueue(OperationKind::JoinVessel, "V1");
        q.enqueue(OperationKind::MarkAlertRead, "AL-9");
        q.enqueue(OperationKind::JoinArea, "A2");

        assert_eq!(q.pop_front().unwrap().payload, "V1");
        assert_eq!(q.pop_front().unwrap().payload, "AL-9");
        assert_eq!(q.pop_front().unwrap().payload, "A2");
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn duplicate_join_is_noop() {
        let mut q = OperationQueue::new();
        assert!(q.enqueue(OperationKind::JoinVessel, "V1"));
        assert!(!q.enqueue(OperationKind::JoinVessel, "V1"));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn duplicate_alert_is_noop() {
        let mut q = OperationQueue::new();
        q.enqueue(OperationKind::DismissAlert, "AL-1");
        q.enqueue(OperationKind::JoinVessel, "V1");
        assert!(!q.enqueue(OperationKind::DismissAlert, "AL-1"));
        assert!(q.enqueue(OperationKind::MarkAlertRead, "AL-1"));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn same_id_different_kind_not_deduplicated() {
        let mut q = OperationQueue::new();
        q.enqueue(OperationKind::JoinVessel, "X");
        assert!(q.enqueue(OperationKind::JoinArea, "X"));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn join_after_leave_is_kept() {
        let mut q = OperationQueue::new();
        q.enqueue(OperationKind::JoinVessel, "V1");
        q.enqueue(OperationKind::LeaveVessel, "V1");
        assert!(q.enqueue(OperationKind::JoinVessel, "V1"));
        assert_eq!(
            kinds(&q),
            vec![
                (OperationKind::JoinVessel, "V1".to_string()),
                (OperationKind::LeaveVessel, "V1".to_string()),
                (OperationKind::JoinVessel, "V1".to_string()),
            ]
        );
    }

    #[test]
    fn push_front_restores_head() {
        let mut q = OperationQueue::new();
        q.enqueue(OperationKind::JoinVessel, "V1");
        q.enqueue(OperationKind::JoinVessel, "V2");
        let mut head = q.pop_front().unwrap();
        head.retries += 1;
        q.push_front(head);
        let op = q.pop_front().unwrap();
        assert_eq!(op.payload, "V1");
        assert_eq!(op.retries, 1);
    }

    #[test]
    fn clear_reports_count() {
        let mut q = OperationQueue::new();
        q.enqueue(OperationKind::JoinVessel, "V1");
        q.enqueue(OperationKind::JoinArea, "A1");
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
        // Cleared operations can be queued again.
        assert!(q.enqueue(OperationKind::JoinVessel, "V1"));
    }
}
