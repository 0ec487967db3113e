//! Daemon lifecycle management.
//!
//! Spawns external daemons, waits for their control sockets and guarantees
//! termination plus path cleanup.

mod daemon;
mod handle;
mod readiness;

pub use daemon::DaemonSpec;
pub use handle::{ExternalProcess, ProcessSpec};
pub use readiness::{Poller, ReadinessCondition, ReadinessWaiter, SystemPoller};
