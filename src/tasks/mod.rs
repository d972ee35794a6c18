mod heartbeat;

pub use heartbeat::{HeartbeatConfig, HeartbeatConfigError, HeartbeatRound, HeartbeatTask};
