//! Dispatch retry lane.
//!
//! A timer-driven actor that periodically asks the coordinator to dispatch
//! `CREATED` jobs whose retry is due or which were orphaned between creation
//! and their first publish.

use std::marker::PhantomData;

use chrono::Utc;
use queue_core::{DispatchPublisher, JobStore};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::coordinator::{Coordinator, ReconcileReport};
use crate::messages::ReconcilerMessage;

/// State for the reconciler actor.
pub struct ReconcilerState<S, P> {
    coordinator: Coordinator<S, P>,
    /// Passes run since start.
    passes: u64,
}

/// Reconciler actor driving [`Coordinator::reconcile_once`].
pub struct DispatchReconciler<S, P> {
    _marker: PhantomData<fn() -> (S, P)>,
}

impl<S, P> DispatchReconciler<S, P> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<S, P> Default for DispatchReconciler<S, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: JobStore, P: DispatchPublisher> ReconcilerState<S, P> {
    async fn run_pass(&mut self) -> Result<ReconcileReport, String> {
        self.passes += 1;
        self.coordinator
            .reconcile_once(Utc::now())
            .await
            .map_err(|e| e.to_string())
    }
}

impl<S: JobStore, P: DispatchPublisher> Actor for DispatchReconciler<S, P> {
    type Msg = ReconcilerMessage;
    type State = ReconcilerState<S, P>;
    type Arguments = Coordinator<S, P>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        coordinator: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let period = coordinator.config().reconcile_interval;
        tracing::info!(interval_ms = period.as_millis() as u64, "Starting dispatch reconciler");

        // Start periodic tick
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if myself.send_message(ReconcilerMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(ReconcilerState {
            coordinator,
            passes: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ReconcilerMessage::Tick => match state.run_pass().await {
                Ok(report) if !report.is_idle() => {
                    tracing::info!(
                        dispatched = report.dispatched,
                        rescheduled = report.rescheduled,
                        exhausted = report.exhausted,
                        skipped = report.skipped,
                        errors = report.errors,
                        "Reconciled pending dispatches"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Reconcile pass failed");
                }
            },

            ReconcilerMessage::ReconcileNow { reply } => {
                let result = state.run_pass().await;
                let _ = reply.send(result);
            }

            ReconcilerMessage::Shutdown => {
                tracing::info!("Shutting down dispatch reconciler");
                myself.stop(Some("shutdown".to_string()));
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(passes = state.passes, "Dispatch reconciler stopped");
        Ok(())
    }
}

/// Spawn a reconciler for `coordinator`.
pub async fn start_reconciler<S: JobStore, P: DispatchPublisher>(
    coordinator: Coordinator<S, P>,
) -> Result<(ActorRef<ReconcilerMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(None, DispatchReconciler::new(), coordinator).await
}

/// Ask a running reconciler for an immediate pass.
pub async fn reconcile_now(
    reconciler: &ActorRef<ReconcilerMessage>,
) -> Result<ReconcileReport, String> {
    let (tx, rx) = ractor::concurrency::oneshot();
    reconciler
        .send_message(ReconcilerMessage::ReconcileNow { reply: tx.into() })
        .map_err(|e| format!("Failed to send message: {}", e))?;

    rx.await
        .map_err(|_| "Failed to receive response".to_string())?
}
