use std::time::Duration;

use consensus_client_common::{
    ConsensusError, ConsensusPromise, MessageCounts, MessageIndex, ProgressCounter,
};
use tokio::time::Instant;

/// Identifies a remote count query by the session and the moment it was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueryTicket {
    session: u64,
    issued: u64,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    value: MessageIndex,
    at: Instant,
    /// Ticket of the query that produced the value.
    issued: u64,
    recorded: u64,
}

impl Observation {
    /// Whether this value was recorded before `other` was even asked for.
    fn precedes(&self, other_issued: u64) -> bool {
        self.recorded < other_issued
    }
}

/// Observed counts and in-flight queries of the current session.
///
/// Issuing a query and recording its answer both advance one logical clock. The consensus
/// node takes its snapshot somewhere between the two, so an observation only bounds another
/// query's answer when it was recorded before that query was issued.
#[derive(Debug, Default)]
pub(crate) struct TrackerState {
    observations: [Option<Observation>; 3],
    in_flight: [Option<ConsensusPromise<MessageIndex>>; 3],
    session: u64,
    clock: u64,
}

impl TrackerState {
    pub(crate) fn session(&self) -> u64 {
        self.session
    }

    /// Drops everything observed so far. Queries still in flight finish unrecorded.
    pub(crate) fn start_new_session(&mut self) {
        self.session += 1;
        self.observations = Default::default();
        self.in_flight = Default::default();
    }

    /// Ticket for a query about to be sent to the consensus node.
    pub(crate) fn issue(&mut self) -> QueryTicket {
        self.clock += 1;
        QueryTicket {
            session: self.session,
            issued: self.clock,
        }
    }

    pub(crate) fn latest(&self, counter: ProgressCounter) -> Option<MessageIndex> {
        self.observations[counter.rank()].map(|obs| obs.value)
    }

    /// Last observed triple, once every counter has been observed in this session.
    ///
    /// Answers of overlapping queries may be recorded out of order, leaving a triple that
    /// was never true on the node at once. Such a triple is withheld until newer answers
    /// restore the order.
    pub(crate) fn last_observed(&self) -> Option<MessageCounts> {
        let counts = MessageCounts {
            finalized: self.latest(ProgressCounter::Finalized)?,
            safe: self.latest(ProgressCounter::Safe)?,
            target: self.latest(ProgressCounter::SyncTarget)?,
        };
        counts.is_ordered().then_some(counts)
    }

    /// Value of `counter` that may still be served without asking the consensus node.
    ///
    /// It must be younger than `ttl` and agree with every observation of the other counters
    /// that is not strictly older. A later finalized count above a cached safe count means
    /// the safe count moved on, so it is not served.
    pub(crate) fn cached(
        &self,
        counter: ProgressCounter,
        now: Instant,
        ttl: Duration,
    ) -> Option<MessageIndex> {
        let obs = self.observations[counter.rank()]?;
        if now.saturating_duration_since(obs.at) >= ttl {
            return None;
        }

        let consistent = ProgressCounter::ALL
            .into_iter()
            .filter(|other| *other != counter)
            .filter_map(|other| self.observations[other.rank()].map(|o| (other, o)))
            .filter(|(_, o)| !o.precedes(obs.issued))
            .all(|(other, o)| {
                if other.rank() < counter.rank() {
                    obs.value >= o.value
                } else {
                    obs.value <= o.value
                }
            });
        consistent.then_some(obs.value)
    }

    /// Checks a freshly queried count and records it.
    ///
    /// A count is only held against the counts it dominates when those were recorded
    /// before its query was issued. Returns `Ok(false)` without recording if the query was
    /// issued in an earlier session.
    pub(crate) fn observe(
        &mut self,
        counter: ProgressCounter,
        value: MessageIndex,
        ticket: QueryTicket,
        now: Instant,
    ) -> Result<bool, ConsensusError> {
        if ticket.session != self.session {
            return Ok(false);
        }

        if let Some(previous) = self.latest(counter) {
            if value < previous {
                return Err(ConsensusError::NonMonotonicProgress {
                    counter,
                    previous,
                    observed: value,
                });
            }
        }

        for &bound_counter in counter.dominated() {
            let Some(bound) = self.observations[bound_counter.rank()] else {
                continue;
            };
            if bound.precedes(ticket.issued) && value < bound.value {
                return Err(ConsensusError::ProgressOrderViolation {
                    counter,
                    observed: value,
                    bound_counter,
                    bound: bound.value,
                });
            }
        }

        self.clock += 1;
        self.observations[counter.rank()] = Some(Observation {
            value,
            at: now,
            issued: ticket.issued,
            recorded: self.clock,
        });
        Ok(true)
    }

    pub(crate) fn pending(&self, counter: ProgressCounter) -> Option<ConsensusPromise<MessageIndex>> {
        self.in_flight[counter.rank()].clone()
    }

    pub(crate) fn set_pending(
        &mut self,
        counter: ProgressCounter,
        promise: ConsensusPromise<MessageIndex>,
    ) {
        self.in_flight[counter.rank()] = Some(promise);
    }

    /// Forgets the in-flight query of `counter` if it is still `promise`.
    pub(crate) fn clear_pending(
        &mut self,
        counter: ProgressCounter,
        promise: &ConsensusPromise<MessageIndex>,
    ) {
        let slot = &mut self.in_flight[counter.rank()];
        if slot.as_ref().is_some_and(|p| p.same_as(promise)) {
            *slot = None;
        }
    }
}
