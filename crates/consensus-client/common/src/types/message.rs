use bytes::Bytes;

/// Header of a message delivered to the execution layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1IncomingMessageHeader {
    pub kind: u8,
    /// Address of the account that posted the message.
    pub poster: [u8; 20],
    pub block_number: u64,
    pub timestamp: u64,
    pub request_id: Option<[u8; 32]>,
    pub l1_base_fee: Option<u128>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1IncomingMessage {
    pub header: L1IncomingMessageHeader,
    pub l2_msg: Bytes,
}

/// A message together with the delayed-inbox position it was sequenced at.
///
/// Compared by value, which is what write idempotency is decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWithMetadata {
    pub message: L1IncomingMessage,
    pub delayed_messages_read: u64,
}

/// Opaque batch payload as posted to the base layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch(Bytes);

impl Batch {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Batch {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

impl From<Vec<u8>> for Batch {
    fn from(data: Vec<u8>) -> Self {
        Self(data.into())
    }
}

impl From<&'static [u8]> for Batch {
    fn from(data: &'static [u8]) -> Self {
        Self(Bytes::from_static(data))
    }
}
