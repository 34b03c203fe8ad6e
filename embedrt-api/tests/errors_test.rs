use embedrt_api::errors::{NotifyError, RejectReason, RuntimeError, WakeError};
use embedrt_api::host::{PoolTask, Rejected};
use std::error::Error;
use anyhow::anyhow;

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverRun;

    impl PoolTask for NeverRun {
        fn run(&mut self) {
            panic!("rejected task must not run");
        }

        fn complete(self: Box<Self>) {
            panic!("rejected task must not complete");
        }
    }

    #[test]
    fn test_import_error_display() {
        let error = RuntimeError::Import {
            module: "embedrt._bridge".to_string(),
            reason: "not found".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "could not import module embedrt._bridge: not found"
        );
        assert_eq!(error.as_label(), "runtime_import");
        assert!(error.source().is_none());
    }

    #[test]
    fn test_runtime_error_from_anyhow() {
        let error: RuntimeError = anyhow!("interpreter exploded").into();

        assert_eq!(error.to_string(), "interpreter exploded");
        assert_eq!(error.as_label(), "runtime_other");
    }

    #[test]
    fn test_notify_error_wraps_reject_reason() {
        let error: NotifyError = RejectReason::Saturated { capacity: 8 }.into();

        assert_eq!(error, NotifyError::Submission(RejectReason::Saturated { capacity: 8 }));
        assert_eq!(
            error.to_string(),
            "pool submission failed: pool queue is full (capacity: 8)"
        );
        assert_eq!(error.as_label(), "notify_submission");
    }

    #[test]
    fn test_notify_error_wraps_wake_error() {
        let error: NotifyError = WakeError::WrongThread.into();

        assert_eq!(error, NotifyError::Wake(WakeError::WrongThread));
        assert_eq!(error.as_label(), "notify_wake");
        assert_eq!(WakeError::Closed.as_label(), "wake_closed");
        assert_eq!(WakeError::Full.as_label(), "wake_full");
        assert_eq!(WakeError::Full.to_string(), "reactor queue is full");
    }

    #[test]
    fn test_rejected_returns_task() {
        let rejected = Rejected::new(RejectReason::Closed, Box::new(NeverRun));

        assert_eq!(rejected.to_string(), "pool rejected task: pool is shut down");
        assert!(format!("{:?}", rejected).contains("<pool-task>"));

        let (reason, task) = rejected.into_parts();
        assert_eq!(reason, RejectReason::Closed);
        assert_eq!(reason.as_label(), "pool_closed");
        // Dropping the task releases it without running it.
        drop(task);
    }
}
