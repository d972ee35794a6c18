//! Connection registry ("hub").
//!
//! The hub admits connections under unique client keys, runs one inbound
//! reader per connection, and is the only entry point producers use to push
//! events: [`Hub::send_to`], [`Hub::broadcast`] and [`Hub::publish`].

mod reader;
mod registry;
mod types;

pub use registry::Hub;
pub use types::{
    BroadcastReport, ConnectionHandle, ConnectionStatsView, Envelope, HubConfig, HubEntry,
    HubError, HubStats, InboundEvent, RegisterError, RemovalReason, Target,
};
