use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use consensus_client_common::{
    retry_transient, ConsensusError, ConsensusPromise, MessageIndex, MessageWithMetadata,
    RetryConfig, SequencerSink, TaskPool,
};
use tokio::{
    select,
    sync::{mpsc, watch},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{state::CoordinatorState, SequencerStatus};

#[derive(Debug)]
pub(crate) enum SequencerRequest {
    Write {
        pos: MessageIndex,
        msg: MessageWithMetadata,
        promise: ConsensusPromise<()>,
    },
    Probe {
        promise: ConsensusPromise<()>,
    },
}

impl SequencerRequest {
    fn promise(&self) -> &ConsensusPromise<()> {
        match self {
            Self::Write { promise, .. } | Self::Probe { promise } => promise,
        }
    }
}

pub(crate) struct SequencerCtx<S> {
    pub(crate) sink: Arc<S>,
    pub(crate) pool: TaskPool,
    pub(crate) retry: RetryConfig,
    pub(crate) write_timeout: Duration,
    pub(crate) status_tx: watch::Sender<SequencerStatus>,
}

pub(crate) async fn sequencer_task<S: SequencerSink + 'static>(
    mut request_rx: mpsc::Receiver<SequencerRequest>,
    mut state: CoordinatorState,
    ctx: SequencerCtx<S>,
    shutdown: CancellationToken,
) {
    loop {
        let request = select! {
            biased;
            _ = shutdown.cancelled() => break,
            maybe_request = request_rx.recv() => {
                let Some(request) = maybe_request else {
                    debug!("all coordinator handles dropped; exiting");
                    break;
                };
                request
            }
        };

        let promise = request.promise().clone();
        let outcome = select! {
            biased;
            _ = shutdown.cancelled() => Err(ConsensusError::ShutDown),
            outcome = ctx.handle_request(&mut state, request) => outcome,
        };
        let _ = promise.settle(outcome);
    }

    // Reject whatever was queued before the channel closed.
    request_rx.close();
    let mut rejected = 0usize;
    while let Ok(request) = request_rx.try_recv() {
        let _ = request.promise().reject(ConsensusError::ShutDown);
        rejected += 1;
    }
    info!(%rejected, "sequencer coordinator stopped");
}

impl<S: SequencerSink + 'static> SequencerCtx<S> {
    async fn handle_request(
        &self,
        state: &mut CoordinatorState,
        request: SequencerRequest,
    ) -> Result<(), ConsensusError> {
        match request {
            SequencerRequest::Write { pos, msg, .. } => self.handle_write(state, pos, msg).await,
            SequencerRequest::Probe { .. } => self.handle_probe(state).await,
        }
    }

    #[instrument(skip(self, state, msg), fields(component = "sequencer"))]
    async fn handle_write(
        &self,
        state: &mut CoordinatorState,
        pos: MessageIndex,
        msg: MessageWithMetadata,
    ) -> Result<(), ConsensusError> {
        if let Some(answer) = state.check_local(pos, &msg) {
            debug!(ok = answer.is_ok(), "write answered locally");
            self.publish_outcome(state, Some(pos), &answer);
            return answer;
        }

        self.status_tx
            .send_replace(SequencerStatus::AttemptingWrite { pos });
        let outcome = self.remote_write(pos, &msg).await;

        match &outcome {
            Ok(()) => state.accept(pos, msg),
            Err(ConsensusError::NotChosenSequencer) => {
                warn!("sequencer lease lost");
                state.lose_lease();
            }
            Err(ConsensusError::OutOfOrderWrite { expected, .. }) => {
                warn!(?expected, "consensus node rejected write position");
                state.resync(*expected);
            }
            Err(ConsensusError::WriteOutcomeUnknown { .. }) => {
                error!("write outcome unknown; lease probe required before further writes");
                state.outcome_unknown();
            }
            Err(err) => warn!(%err, "write rejected"),
        }
        self.publish_outcome(state, Some(pos), &outcome);
        outcome
    }

    #[instrument(skip(self, state), fields(component = "sequencer"))]
    async fn handle_probe(&self, state: &mut CoordinatorState) -> Result<(), ConsensusError> {
        let outcome = retry_transient("expect_chosen_sequencer", &self.retry, || {
            let sink = Arc::clone(&self.sink);
            let pool = self.pool.clone();
            async move {
                pool.run("expect_chosen_sequencer", sink.expect_chosen_sequencer())
                    .await
            }
        })
        .await;

        match &outcome {
            Ok(()) => {
                debug!("sequencer lease confirmed");
                state.probe_confirmed();
            }
            Err(ConsensusError::NotChosenSequencer) => state.lose_lease(),
            Err(err) => warn!(%err, "lease probe failed"),
        }
        self.publish_outcome(state, None, &outcome);
        outcome
    }

    /// Submits the write, resubmitting it after transport failures.
    ///
    /// Resubmitting is safe as the consensus node accepts an identical write at an accepted
    /// position again. Once retries are exhausted the write may or may not have been applied,
    /// unless no attempt ever got past the pool.
    async fn remote_write(
        &self,
        pos: MessageIndex,
        msg: &MessageWithMetadata,
    ) -> Result<(), ConsensusError> {
        let write_timeout = self.write_timeout;
        let sent = AtomicBool::new(false);
        let res = retry_transient("write_message_from_sequencer", &self.retry, || {
            let sink = Arc::clone(&self.sink);
            let pool = self.pool.clone();
            let msg = msg.clone();
            let sent = &sent;
            async move {
                let attempt = pool.run("write_message_from_sequencer", async move {
                    sent.store(true, Ordering::Release);
                    sink.write_message_from_sequencer(pos, msg).await
                });
                timeout(write_timeout, attempt)
                    .await
                    .unwrap_or(Err(ConsensusError::Timeout))
            }
        })
        .await;

        res.map_err(|err| {
            if !err.is_transient() {
                err
            } else if sent.load(Ordering::Acquire) {
                ConsensusError::WriteOutcomeUnknown { pos }
            } else {
                debug!(%err, "write never left the pool");
                err
            }
        })
    }

    fn publish_outcome(
        &self,
        state: &CoordinatorState,
        pos: Option<MessageIndex>,
        outcome: &Result<(), ConsensusError>,
    ) {
        let status = match outcome {
            Ok(()) => SequencerStatus::Confirmed { tail: state.tail() },
            Err(err) => SequencerStatus::Rejected {
                pos,
                reason: err.clone(),
            },
        };
        self.status_tx.send_replace(status);
    }
}
