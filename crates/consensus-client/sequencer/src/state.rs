use std::num::NonZeroUsize;

use consensus_client_common::{ConsensusError, MessageIndex, MessageWithMetadata};
use lru::LruCache;

/// Coordinator's local view of the message log.
#[derive(Debug)]
pub(crate) struct CoordinatorState {
    /// Last position known to be accepted, `None` when unknown.
    tail: Option<MessageIndex>,
    /// Set after a write with unknown outcome, cleared by a successful lease probe.
    probe_required: bool,
    recent_writes: LruCache<MessageIndex, MessageWithMetadata>,
}

impl CoordinatorState {
    pub(crate) fn new(recent_writes_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(recent_writes_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            tail: None,
            probe_required: false,
            recent_writes: LruCache::new(capacity),
        }
    }

    pub(crate) fn tail(&self) -> Option<MessageIndex> {
        self.tail
    }

    /// Answers a write without the consensus node where the local view allows it.
    pub(crate) fn check_local(
        &mut self,
        pos: MessageIndex,
        msg: &MessageWithMetadata,
    ) -> Option<Result<(), ConsensusError>> {
        if self.probe_required {
            return Some(Err(ConsensusError::LeaseProbeRequired));
        }

        if let Some(accepted) = self.recent_writes.get(&pos) {
            return Some(if accepted == msg {
                Ok(())
            } else {
                Err(ConsensusError::ConflictingWrite { pos })
            });
        }

        let expected = self.tail?.next();
        (pos > expected).then_some(Err(ConsensusError::OutOfOrderWrite {
            expected: Some(expected),
            got: pos,
        }))
    }

    pub(crate) fn accept(&mut self, pos: MessageIndex, msg: MessageWithMetadata) {
        self.recent_writes.put(pos, msg);
        self.tail = Some(self.tail.map_or(pos, |tail| tail.max(pos)));
    }

    /// Applies the next position the consensus node reported it would accept.
    pub(crate) fn resync(&mut self, expected: Option<MessageIndex>) {
        self.tail = expected.and_then(MessageIndex::prev);
    }

    pub(crate) fn lose_lease(&mut self) {
        self.tail = None;
        self.recent_writes.clear();
    }

    pub(crate) fn outcome_unknown(&mut self) {
        self.tail = None;
        self.probe_required = true;
    }

    pub(crate) fn probe_confirmed(&mut self) {
        self.probe_required = false;
    }
}
