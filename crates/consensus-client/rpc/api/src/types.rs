use std::fmt;

use bytes::Bytes;
use consensus_client_common::{
    Batch, L1IncomingMessage, L1IncomingMessageHeader, MessageWithMetadata,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Byte string encoded as `0x` prefixed hex on the wire.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HexBytes(pub Bytes);

impl fmt::Debug for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl Serialize for HexBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits)
            .map(|bytes| Self(Bytes::from(bytes)))
            .map_err(de::Error::custom)
    }
}

impl From<Bytes> for HexBytes {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Batch> for HexBytes {
    fn from(batch: Batch) -> Self {
        Self(batch.into_bytes())
    }
}

impl From<HexBytes> for Batch {
    fn from(bytes: HexBytes) -> Self {
        Batch::new(bytes.0)
    }
}

/// Wire value that cannot be turned into a domain type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("field {field} must be {expected} bytes, got {got}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },
}

fn fixed<const N: usize>(field: &'static str, bytes: &HexBytes) -> Result<[u8; N], WireError> {
    <[u8; N]>::try_from(&bytes.0[..]).map_err(|_| WireError::InvalidLength {
        field,
        expected: N,
        got: bytes.0.len(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcL1IncomingMessageHeader {
    pub kind: u8,
    /// 20 byte address.
    pub poster: HexBytes,
    pub block_number: u64,
    pub timestamp: u64,
    /// 32 byte hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_base_fee: Option<u128>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcL1IncomingMessage {
    pub header: RpcL1IncomingMessageHeader,
    pub l2_msg: HexBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcMessageWithMetadata {
    pub message: RpcL1IncomingMessage,
    pub delayed_messages_read: u64,
}

impl From<MessageWithMetadata> for RpcMessageWithMetadata {
    fn from(msg: MessageWithMetadata) -> Self {
        let header = msg.message.header;
        Self {
            message: RpcL1IncomingMessage {
                header: RpcL1IncomingMessageHeader {
                    kind: header.kind,
                    poster: HexBytes(Bytes::copy_from_slice(&header.poster)),
                    block_number: header.block_number,
                    timestamp: header.timestamp,
                    request_id: header
                        .request_id
                        .map(|id| HexBytes(Bytes::copy_from_slice(&id))),
                    l1_base_fee: header.l1_base_fee,
                },
                l2_msg: HexBytes(msg.message.l2_msg),
            },
            delayed_messages_read: msg.delayed_messages_read,
        }
    }
}

impl TryFrom<RpcMessageWithMetadata> for MessageWithMetadata {
    type Error = WireError;

    fn try_from(msg: RpcMessageWithMetadata) -> Result<Self, Self::Error> {
        let header = msg.message.header;
        let request_id = header
            .request_id
            .as_ref()
            .map(|id| fixed::<32>("requestId", id))
            .transpose()?;

        Ok(Self {
            message: L1IncomingMessage {
                header: L1IncomingMessageHeader {
                    kind: header.kind,
                    poster: fixed::<20>("poster", &header.poster)?,
                    block_number: header.block_number,
                    timestamp: header.timestamp,
                    request_id,
                    l1_base_fee: header.l1_base_fee,
                },
                l2_msg: msg.message.l2_msg.0,
            },
            delayed_messages_read: msg.delayed_messages_read,
        })
    }
}
