//! Synchronization engine: condition polling and the interaction layer built
//! on top of it

pub mod interaction;
pub mod poller;

pub use interaction::{
    AttemptOutcome, InteractionAttempt, InteractionExecutor, InteractionOutcome, Strategy,
    SyncEngine,
};
pub use poller::{Poller, WaitSpec, DEFAULT_IGNORED};
