//! Reconciliation engine
//!
//! Translates desired-state specs into API requests, drives long-running
//! operations to a terminal state, and reads the settled state back in the
//! caller's terms.

pub mod allow_list;
pub mod audit_log;
pub mod backup;
pub mod cluster;
pub mod drift;
pub mod integration;
pub mod lease;
pub mod poller;
pub mod progress;
pub mod read_replica;
pub mod reader;
mod reconciler;
pub mod translator;
pub mod vpc;

pub use drift::Drift;
pub use lease::{Lease, ResourceLeases};
pub use poller::{
    cancellation, CancelHandle, CancellationSignal, Observation, OperationPoller, RetryPolicy,
    Settlement, TerminalPredicate,
};
pub use progress::{MemorySink, ProgressEvent, ProgressSink, TracingSink};
pub use reader::{ReadPurpose, RegionOrder};
pub use reconciler::{Applied, ApplyAction, Reconciler};
pub use translator::{ListingResolver, ReferenceKind, ReferenceResolver, Translated};
