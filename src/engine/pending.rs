//! Bookkeeping for one in-flight Read or Write.

use crate::error::{Operation, TransferError};
use crate::timeout::{Deadline, Timeout};

/// One blocking call: what it asked for, how far it got, and when it gives up.
///
/// Created when the call begins and dropped when it returns.
#[derive(Debug, Clone, Copy)]
pub struct PendingOperation {
    kind: Operation,
    requested: usize,
    completed: usize,
    deadline: Deadline,
}

impl PendingOperation {
    pub fn begin(kind: Operation, requested: usize, timeout: Timeout) -> Self {
        Self {
            kind,
            requested,
            completed: 0,
            deadline: Deadline::begin(timeout),
        }
    }

    pub fn kind(&self) -> Operation {
        self.kind
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Bytes still outstanding.
    pub fn remaining(&self) -> usize {
        self.requested - self.completed
    }

    pub fn record(&mut self, n: usize) {
        self.completed = (self.completed + n).min(self.requested);
    }

    pub fn is_satisfied(&self) -> bool {
        self.completed == self.requested
    }

    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    /// The error to return once the deadline has passed.
    pub fn timed_out(&self) -> TransferError {
        TransferError::Timeout {
            operation: self.kind,
            timeout: self.deadline.timeout(),
            completed: self.completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress() {
        let mut op = PendingOperation::begin(Operation::Write, 10, Timeout::Infinite);
        assert_eq!(op.remaining(), 10);
        op.record(4);
        assert_eq!(op.completed(), 4);
        assert!(!op.is_satisfied());
        op.record(6);
        assert!(op.is_satisfied());
        assert_eq!(op.remaining(), 0);
    }

    #[test]
    fn test_timed_out_carries_progress() {
        let mut op = PendingOperation::begin(Operation::Write, 8, Timeout::Millis(0));
        op.record(3);
        match op.timed_out() {
            TransferError::Timeout {
                operation,
                timeout,
                completed,
            } => {
                assert_eq!(operation, Operation::Write);
                assert_eq!(timeout, Timeout::Millis(0));
                assert_eq!(completed, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
