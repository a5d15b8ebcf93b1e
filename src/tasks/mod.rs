//! Background tasks.

mod heartbeat;

pub use heartbeat::HeartbeatTask;
