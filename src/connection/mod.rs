//! Per-connection wrapper and delivery statistics.
//!
//! A [`Connection`] owns one duplex channel and serializes every write to it.
//! Each connection is paired 1:1 with a [`DeliveryStats`] by the hub.

mod message;
mod socket;
mod stats;
mod types;

pub use message::OutboundMessage;
pub use socket::{Connection, DEFAULT_WRITE_TIMEOUT};
pub use stats::{DeliveryStats, DeliveryStatsSnapshot};
pub use types::{ClientKey, CloseError, RecvError, SendError};
