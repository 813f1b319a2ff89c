//! Reusable assertions for the six testable properties (P1-P6) that every
//! `DagStore`/`Pipe`/`NotificationQueue` instance is required to satisfy.
//! These are plain functions, not a registered test-compatibility-kit: a
//! downstream crate's own `#[test]` calls into them directly against its own
//! store instances, the same way `skein-dag`/`skein-pipe`/`skein-notify`'s
//! in-crate tests already exercise each property on their own types.

mod acyclicity;
mod detach;
mod notify;
mod pipe;
mod state_machine;

pub use acyclicity::{assert_alias_accepts, assert_alias_rejects_cycle};
pub use detach::assert_detach_snapshot_unaffected;
pub use notify::assert_no_lost_wakeup;
pub use pipe::{assert_contiguous_reads, assert_late_join_equivalence};
pub use state_machine::assert_monotonic_state_sequence;
