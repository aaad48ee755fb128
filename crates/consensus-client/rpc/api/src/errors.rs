//! Mapping between [`ConsensusError`] and JSON-RPC error objects.
//!
//! Every variant has its own application code and carries its fields as structured `data`,
//! so the client side reconstructs exactly the error the consensus node reported.

use consensus_client_common::{
    BatchNumber, ConsensusError, MessageIndex, ProgressCounter, Resource,
};
use jsonrpsee::types::{ErrorObject, ErrorObjectOwned};
use serde::{Deserialize, Serialize};

/// Application error codes of the `nitroconsensus` namespace.
pub mod codes {
    pub const NOT_YET_AVAILABLE: i32 = -38001;
    pub const BATCH_UNAVAILABLE: i32 = -38002;
    pub const LOOKUP_UNAVAILABLE: i32 = -38003;

    pub const NOT_CHOSEN_SEQUENCER: i32 = -38010;
    pub const OUT_OF_ORDER_WRITE: i32 = -38011;
    pub const CONFLICTING_WRITE: i32 = -38012;
    pub const LEASE_PROBE_REQUIRED: i32 = -38013;
    pub const WRITE_OUTCOME_UNKNOWN: i32 = -38014;

    pub const NON_MONOTONIC_PROGRESS: i32 = -38020;
    pub const PROGRESS_ORDER_VIOLATION: i32 = -38021;

    /// Consensus node could not reach something it depends on.
    pub const UNAVAILABLE: i32 = -38030;
    pub const TIMEOUT: i32 = -38031;
    pub const OVERLOADED: i32 = -38032;

    pub const CANCELLED: i32 = -38040;
    pub const SHUT_DOWN: i32 = -38041;
    pub const INTERNAL: i32 = -38042;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RpcResource {
    Batch { batch: u64 },
    BatchL1Block { batch: u64 },
    MessageBatch { message: u64 },
}

impl From<Resource> for RpcResource {
    fn from(resource: Resource) -> Self {
        match resource {
            Resource::Batch(batch) => Self::Batch { batch: batch.get() },
            Resource::BatchL1Block(batch) => Self::BatchL1Block { batch: batch.get() },
            Resource::MessageBatch(message) => Self::MessageBatch {
                message: message.get(),
            },
        }
    }
}

impl From<RpcResource> for Resource {
    fn from(resource: RpcResource) -> Self {
        match resource {
            RpcResource::Batch { batch } => Self::Batch(BatchNumber::new(batch)),
            RpcResource::BatchL1Block { batch } => Self::BatchL1Block(BatchNumber::new(batch)),
            RpcResource::MessageBatch { message } => {
                Self::MessageBatch(MessageIndex::new(message))
            }
        }
    }
}

/// Structured `data` of an application error. Only the fields of the variant are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<RpcResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<ProgressCounter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_counter: Option<ProgressCounter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<u64>,
}

/// Converts an error into the JSON-RPC error object a consensus node responds with.
pub fn to_rpc_error(err: &ConsensusError) -> ErrorObjectOwned {
    use ConsensusError::*;

    let (code, data) = match err {
        NotYetAvailable(resource) => (
            codes::NOT_YET_AVAILABLE,
            RpcErrorData {
                resource: Some((*resource).into()),
                ..Default::default()
            },
        ),
        BatchUnavailable { batch, reason } => (
            codes::BATCH_UNAVAILABLE,
            RpcErrorData {
                batch: Some(batch.get()),
                reason: Some(reason.clone()),
                ..Default::default()
            },
        ),
        LookupUnavailable { resource, reason } => (
            codes::LOOKUP_UNAVAILABLE,
            RpcErrorData {
                resource: Some((*resource).into()),
                reason: Some(reason.clone()),
                ..Default::default()
            },
        ),
        NotChosenSequencer => (codes::NOT_CHOSEN_SEQUENCER, RpcErrorData::default()),
        OutOfOrderWrite { expected, got } => (
            codes::OUT_OF_ORDER_WRITE,
            RpcErrorData {
                pos: Some(got.get()),
                expected: expected.map(MessageIndex::get),
                ..Default::default()
            },
        ),
        ConflictingWrite { pos } => (
            codes::CONFLICTING_WRITE,
            RpcErrorData {
                pos: Some(pos.get()),
                ..Default::default()
            },
        ),
        LeaseProbeRequired => (codes::LEASE_PROBE_REQUIRED, RpcErrorData::default()),
        WriteOutcomeUnknown { pos } => (
            codes::WRITE_OUTCOME_UNKNOWN,
            RpcErrorData {
                pos: Some(pos.get()),
                ..Default::default()
            },
        ),
        NonMonotonicProgress {
            counter,
            previous,
            observed,
        } => (
            codes::NON_MONOTONIC_PROGRESS,
            RpcErrorData {
                counter: Some(*counter),
                previous: Some(previous.get()),
                observed: Some(observed.get()),
                ..Default::default()
            },
        ),
        ProgressOrderViolation {
            counter,
            observed,
            bound_counter,
            bound,
        } => (
            codes::PROGRESS_ORDER_VIOLATION,
            RpcErrorData {
                counter: Some(*counter),
                observed: Some(observed.get()),
                bound_counter: Some(*bound_counter),
                bound: Some(bound.get()),
                ..Default::default()
            },
        ),
        Transport(reason) => (
            codes::UNAVAILABLE,
            RpcErrorData {
                reason: Some(reason.clone()),
                ..Default::default()
            },
        ),
        Timeout => (codes::TIMEOUT, RpcErrorData::default()),
        Overloaded => (codes::OVERLOADED, RpcErrorData::default()),
        Cancelled => (codes::CANCELLED, RpcErrorData::default()),
        ShutDown => (codes::SHUT_DOWN, RpcErrorData::default()),
        Internal(reason) => (
            codes::INTERNAL,
            RpcErrorData {
                reason: Some(reason.clone()),
                ..Default::default()
            },
        ),
    };

    let data = (data != RpcErrorData::default()).then_some(data);
    ErrorObject::owned(code, err.to_string(), data)
}

/// Reconstructs the error a consensus node responded with.
///
/// Codes outside the namespace are reported as transport errors. Known codes with missing
/// or malformed data become [`ConsensusError::Internal`].
pub fn from_error_object(obj: &ErrorObject<'_>) -> ConsensusError {
    let code = obj.code();
    let data = match obj.data() {
        Some(raw) => match serde_json::from_str::<RpcErrorData>(raw.get()) {
            Ok(data) => data,
            Err(err) => {
                return ConsensusError::internal(format!(
                    "malformed data for rpc error {code}: {err}"
                ))
            }
        },
        None => RpcErrorData::default(),
    };

    decode(code, obj.message(), data).unwrap_or_else(|| {
        ConsensusError::internal(format!("missing data for rpc error {code}"))
    })
}

fn decode(code: i32, message: &str, data: RpcErrorData) -> Option<ConsensusError> {
    use ConsensusError::*;

    let reason = data.reason.clone().unwrap_or_else(|| message.to_owned());
    let err = match code {
        codes::NOT_YET_AVAILABLE => NotYetAvailable(data.resource?.into()),
        codes::BATCH_UNAVAILABLE => BatchUnavailable {
            batch: BatchNumber::new(data.batch?),
            reason,
        },
        codes::LOOKUP_UNAVAILABLE => LookupUnavailable {
            resource: data.resource?.into(),
            reason,
        },
        codes::NOT_CHOSEN_SEQUENCER => NotChosenSequencer,
        codes::OUT_OF_ORDER_WRITE => OutOfOrderWrite {
            expected: data.expected.map(MessageIndex::new),
            got: MessageIndex::new(data.pos?),
        },
        codes::CONFLICTING_WRITE => ConflictingWrite {
            pos: MessageIndex::new(data.pos?),
        },
        codes::LEASE_PROBE_REQUIRED => LeaseProbeRequired,
        codes::WRITE_OUTCOME_UNKNOWN => WriteOutcomeUnknown {
            pos: MessageIndex::new(data.pos?),
        },
        codes::NON_MONOTONIC_PROGRESS => NonMonotonicProgress {
            counter: data.counter?,
            previous: MessageIndex::new(data.previous?),
            observed: MessageIndex::new(data.observed?),
        },
        codes::PROGRESS_ORDER_VIOLATION => ProgressOrderViolation {
            counter: data.counter?,
            observed: MessageIndex::new(data.observed?),
            bound_counter: data.bound_counter?,
            bound: MessageIndex::new(data.bound?),
        },
        codes::UNAVAILABLE => Transport(reason),
        codes::TIMEOUT => Timeout,
        codes::OVERLOADED => Overloaded,
        codes::CANCELLED => Cancelled,
        codes::SHUT_DOWN => ShutDown,
        codes::INTERNAL => Internal(reason),
        other => Transport(format!("rpc error {other}: {message}")),
    };
    Some(err)
}

#[cfg(test)]
mod tests {
    use consensus_client_common::ErrorKind;
    use serde_json::json;

    use super::*;

    fn idx(v: u64) -> MessageIndex {
        MessageIndex::new(v)
    }

    #[test]
    fn test_every_variant_survives_the_wire() {
        let errors = [
            ConsensusError::NotYetAvailable(Resource::MessageBatch(idx(4))),
            ConsensusError::BatchUnavailable {
                batch: BatchNumber::new(3),
                reason: "connection reset".to_owned(),
            },
            ConsensusError::LookupUnavailable {
                resource: Resource::BatchL1Block(BatchNumber::new(8)),
                reason: "timed out".to_owned(),
            },
            ConsensusError::NotChosenSequencer,
            ConsensusError::OutOfOrderWrite {
                expected: Some(idx(4)),
                got: idx(9),
            },
            ConsensusError::OutOfOrderWrite {
                expected: None,
                got: idx(9),
            },
            ConsensusError::ConflictingWrite { pos: idx(2) },
            ConsensusError::LeaseProbeRequired,
            ConsensusError::WriteOutcomeUnknown { pos: idx(5) },
            ConsensusError::NonMonotonicProgress {
                counter: ProgressCounter::Safe,
                previous: idx(50),
                observed: idx(48),
            },
            ConsensusError::ProgressOrderViolation {
                counter: ProgressCounter::SyncTarget,
                observed: idx(1),
                bound_counter: ProgressCounter::Finalized,
                bound: idx(2),
            },
            ConsensusError::transport("upstream down"),
            ConsensusError::Timeout,
            ConsensusError::Overloaded,
            ConsensusError::Cancelled,
            ConsensusError::ShutDown,
            ConsensusError::internal("bug"),
        ];

        for err in errors {
            let obj = to_rpc_error(&err);
            assert_eq!(obj.message(), err.to_string());
            assert_eq!(from_error_object(&obj), err);
        }
    }

    #[test]
    fn test_out_of_order_data_shape() {
        let obj = to_rpc_error(&ConsensusError::OutOfOrderWrite {
            expected: Some(idx(4)),
            got: idx(9),
        });
        assert_eq!(obj.code(), codes::OUT_OF_ORDER_WRITE);

        let data: serde_json::Value =
            serde_json::from_str(obj.data().expect("has data").get()).unwrap();
        assert_eq!(data, json!({ "pos": 9, "expected": 4 }));

        let obj = to_rpc_error(&ConsensusError::NotChosenSequencer);
        assert!(obj.data().is_none());
    }

    #[test]
    fn test_foreign_code_is_transient() {
        let obj = ErrorObject::owned(-32601, "Method not found", None::<()>);
        let err = from_error_object(&obj);
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(
            err,
            ConsensusError::transport("rpc error -32601: Method not found")
        );
    }

    #[test]
    fn test_missing_or_malformed_data_is_internal() {
        let obj = ErrorObject::owned(codes::CONFLICTING_WRITE, "conflict", None::<()>);
        assert!(matches!(from_error_object(&obj), ConsensusError::Internal(_)));

        let obj = ErrorObject::owned(codes::CONFLICTING_WRITE, "conflict", Some(json!([1, 2])));
        assert!(matches!(from_error_object(&obj), ConsensusError::Internal(_)));
    }
}
