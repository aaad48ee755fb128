use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! u64_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

u64_id! {
    /// Position in the execution message log.
    ///
    /// Also used for message counts: a count of `N` covers indices `0..N`.
    MessageIndex
}

u64_id! {
    /// Sequence number of a batch posted by the consensus node.
    BatchNumber
}

u64_id! {
    /// Base layer block height.
    L1BlockNumber
}

impl MessageIndex {
    /// Index right after this one.
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Index right before this one, `None` at zero.
    pub const fn prev(self) -> Option<Self> {
        match self.0.checked_sub(1) {
            Some(prev) => Some(Self(prev)),
            None => None,
        }
    }
}
