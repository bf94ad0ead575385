//! Batch import of user accounts.
//!
//! An import runs in four stages against a loaded [`ReferenceSystem`]:
//!
//! ```text
//!   source ──► ImportBatch ──► Detector::diagnose ──► resolve / edit ──► commit
//!                 ▲                    │                                   │
//!                 └──── remove_rows ◄──┘              ReferenceSystem ◄────┘
//! ```
//!
//! Candidates are completed with [`complete`], diagnosed per field, fixed
//! automatically where a fix is unambiguous and by hand otherwise, and
//! committed only once no diagnosis is left.
//!
//! [`ReferenceSystem`]: crate::system::ReferenceSystem

pub mod batch;
pub mod commit;
pub mod complete;
pub mod detect;
pub mod resolve;
pub mod types;

pub use batch::ImportBatch;
pub use commit::{CommitPlan, Membership, PlannedGroup, commit, plan};
pub use complete::{CandidateRecord, complete};
pub use detect::{Detector, FsInspector, HomeInspector, Ownership, Reference};
pub use resolve::{Change, Resolution, resolve};
pub use types::{BatchError, CandidateReport, CommitError, Diagnosis, ImportReport, Status};
