//! Managed storage area for uploaded audio.
//!
//! - [`stager`] copies user files into the storage root under content-hash names
//! - [`sweeper`] deletes staged files once they outlive the retention TTL
//!
//! Both sides share the storage root without locking: the stager only ever
//! renames complete files into place, and the sweeper treats a file vanishing
//! mid-scan as a normal event.

mod stager;
mod sweeper;

pub use stager::{ContentStager, StageError, StagedFile};
pub use sweeper::{sweep, sweep_at, RetentionSweeper, SweepReport, SweeperHandle};
