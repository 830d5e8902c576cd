//! The state synchronization engine: poll, diff and publish downstream;
//! queue, retry and reconcile upstream.

pub mod command;
pub mod differ;
pub mod engine;
pub mod heartbeat;
pub mod poller;
pub mod publisher;
pub mod reconciler;
pub mod snapshot;
pub mod state;

pub use command::{CommandQueue, CommandRequest, CommandWorker, RetryPolicy};
pub use differ::{Differ, FieldKey};
pub use engine::{route, Bridge, PollRequest, Routed, SyncSettings};
pub use heartbeat::HeartbeatSync;
pub use poller::{PollOutcome, Poller};
pub use publisher::{OutboundSink, Publisher};
pub use reconciler::reconcile;
pub use snapshot::Snapshot;
pub use state::{IntendedState, IntentTracker, Lifecycle, LinkState, TipActiveFlags};
