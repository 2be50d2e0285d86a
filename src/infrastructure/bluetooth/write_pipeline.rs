//! Write → execute-write sequencing.
//!
//! One write may be in flight per link. Its completion event commits it
//! with an execute-write, and only the execute-write answer frees the
//! pipeline for the next write.

use crate::domain::error::GattError;
use crate::domain::gatt::{ConnectionId, GattStatus, WriteTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    AwaitingWrite {
        connection: ConnectionId,
        target: WriteTarget,
        generation: u64,
    },
    AwaitingExecute {
        connection: ConnectionId,
        generation: u64,
    },
}

/// What to do with a write-completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// The write succeeded: issue execute-write on `connection`.
    Execute(ConnectionId),
    /// The write failed; the pipeline is idle again.
    Cancelled(GattStatus),
    /// Not the pending write.
    Ignored,
}

#[derive(Debug, Default)]
pub struct WritePipeline {
    phase: Phase,
}

impl WritePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the pipeline for a write to `target`.
    pub fn begin(
        &mut self,
        connection: ConnectionId,
        target: WriteTarget,
        generation: u64,
    ) -> Result<(), GattError> {
        match self.phase {
            Phase::Idle => {
                self.phase = Phase::AwaitingWrite {
                    connection,
                    target,
                    generation,
                };
                Ok(())
            }
            Phase::AwaitingWrite { connection, .. } | Phase::AwaitingExecute { connection, .. } => {
                Err(GattError::ConcurrentWrite(connection))
            }
        }
    }

    /// Release the pipeline after the transport refused the write call.
    pub fn abort(&mut self) {
        self.phase = Phase::Idle;
    }

    pub fn on_write_complete(
        &mut self,
        completed: &WriteTarget,
        status: GattStatus,
        generation: u64,
    ) -> WriteStep {
        let Phase::AwaitingWrite {
            connection,
            target,
            generation: pending,
        } = self.phase
        else {
            return WriteStep::Ignored;
        };
        if pending != generation || &target != completed {
            return WriteStep::Ignored;
        }
        if !status.is_success() {
            self.phase = Phase::Idle;
            return WriteStep::Cancelled(status);
        }
        self.phase = Phase::AwaitingExecute {
            connection,
            generation,
        };
        WriteStep::Execute(connection)
    }

    /// Returns true when the execute-write answer closed the pending write.
    pub fn on_execute_complete(&mut self, generation: u64) -> bool {
        match self.phase {
            Phase::AwaitingExecute {
                generation: pending,
                ..
            } if pending == generation => {
                self.phase = Phase::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn is_awaiting_execute(&self) -> bool {
        matches!(self.phase, Phase::AwaitingExecute { .. })
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gatt::{GattId, ServiceId};
    use uuid::Uuid;

    fn target(n: u128) -> WriteTarget {
        WriteTarget::Characteristic {
            service: ServiceId::primary(Uuid::from_u128(1), 0),
            characteristic: GattId::new(Uuid::from_u128(n), 0),
        }
    }

    #[test]
    fn test_single_outstanding_write() {
        let mut pipeline = WritePipeline::new();
        pipeline.begin(ConnectionId(7), target(2), 1).unwrap();
        assert_eq!(
            pipeline.begin(ConnectionId(7), target(3), 1),
            Err(GattError::ConcurrentWrite(ConnectionId(7)))
        );

        assert_eq!(
            pipeline.on_write_complete(&target(2), GattStatus::SUCCESS, 1),
            WriteStep::Execute(ConnectionId(7))
        );
        // still busy until execute-write answers
        assert!(pipeline.begin(ConnectionId(7), target(3), 1).is_err());
        assert!(pipeline.is_awaiting_execute());

        assert!(pipeline.on_execute_complete(1));
        assert!(pipeline.is_idle());
        assert!(pipeline.begin(ConnectionId(7), target(3), 1).is_ok());
    }

    #[test]
    fn test_failed_write_skips_execute() {
        let mut pipeline = WritePipeline::new();
        pipeline.begin(ConnectionId(7), target(2), 1).unwrap();
        assert_eq!(
            pipeline.on_write_complete(&target(2), GattStatus::FAILURE, 1),
            WriteStep::Cancelled(GattStatus::FAILURE)
        );
        assert!(pipeline.is_idle());
        assert!(!pipeline.on_execute_complete(1));
    }

    #[test]
    fn test_unrelated_completions_ignored() {
        let mut pipeline = WritePipeline::new();
        assert_eq!(
            pipeline.on_write_complete(&target(2), GattStatus::SUCCESS, 1),
            WriteStep::Ignored
        );

        pipeline.begin(ConnectionId(7), target(2), 2).unwrap();
        assert_eq!(
            pipeline.on_write_complete(&target(3), GattStatus::SUCCESS, 2),
            WriteStep::Ignored
        );
        assert_eq!(
            pipeline.on_write_complete(&target(2), GattStatus::SUCCESS, 1),
            WriteStep::Ignored
        );
        assert!(!pipeline.is_idle());
    }
}
