//! Identifier types for the chat core.
//!
//! Messages and exchanges use process-monotonic counters: an identifier is
//! never reused while the process lives, which is what lets a streaming
//! exchange locate "its" placeholder by key alone. Archived sessions get a
//! UUID since they are the unit a caller may hand back later.

use core::fmt;
use core::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declare a counter-backed identifier newtype.
macro_rules! define_counter_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        counter = $counter:ident
    ) => {
        static $counter: AtomicU64 = AtomicU64::new(1);

        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Allocate the next identifier.
            #[inline]
            #[must_use]
            pub fn fresh() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_counter_id!(
    /// Identifier of a single chat message.
    MessageId,
    counter = NEXT_MESSAGE_ID
);

define_counter_id!(
    /// Identifier of one request/response exchange.
    ExchangeId,
    counter = NEXT_EXCHANGE_ID
);

/// Generate a session UUID.
///
/// With feature `uuid_v7` enabled, this uses `Uuid::now_v7()`.
#[inline]
#[must_use]
fn session_uuid() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Identifier of an archived conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionId {
    /// Create a new identifier.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(session_uuid())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
