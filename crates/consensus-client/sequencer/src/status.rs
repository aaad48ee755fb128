use consensus_client_common::{ConsensusError, MessageIndex};

/// What the coordinator last learned about its role as sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerStatus {
    /// Nothing written or probed yet.
    NotSequencer,
    /// A write at `pos` is in flight.
    AttemptingWrite { pos: MessageIndex },
    /// The lease is held. `tail` is the last position known to be accepted.
    Confirmed { tail: Option<MessageIndex> },
    /// The last request failed. `pos` is unset for lease probes.
    Rejected {
        pos: Option<MessageIndex>,
        reason: ConsensusError,
    },
}

impl SequencerStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}
