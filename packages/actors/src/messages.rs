//! Message types for actor communication.

use ractor::RpcReplyPort;

use crate::coordinator::ReconcileReport;

/// Messages for the DispatchReconciler.
#[derive(Debug)]
pub enum ReconcilerMessage {
    /// Periodic tick; runs one reconcile pass.
    Tick,

    /// Run a reconcile pass now and reply with its report.
    ReconcileNow {
        reply: RpcReplyPort<Result<ReconcileReport, String>>,
    },

    /// Stop the reconciler.
    Shutdown,
}
