//! Feed scheduling and deduplication engine.
//!
//! ```text
//!  command ──► Relay ──► RegistrationStore
//!                 │
//!                 └────► Scheduler ──(one task per destination)──► Poller
//!                                                                   │
//!                                    Fetcher ◄──────────────────────┤
//!                                    DedupLedger ◄──────────────────┤
//!                                    ChatTransport ◄────────────────┘
//! ```

pub mod engine;
pub mod ledger;
pub mod poller;
pub mod registration;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{DestinationStatus, Relay};
pub use ledger::{DedupLedger, Fingerprint};
pub use poller::{render_message, Poller, TickReport};
pub use registration::{Credentials, Registration};
pub use scheduler::{Scheduler, StopToken, TimerId, TimerState};
pub use store::RegistrationStore;
