//! Resume points.
//!
//! When a run is interrupted after grouping, the grouper's output can be
//! persisted so a later `--resume` re-enters the pipeline at the
//! keep-select stage instead of re-scanning. Three files make up a resume
//! point:
//!
//! * `resume.meta`: key=value metadata (version, algorithm, roots)
//! * `resume.groups`: the groups, bincode-serialized
//! * `resume.sha256`: hex checksum of the groups file
//!
//! All three are 0600 and deleted on clean completion. A checksum mismatch
//! on load is reported as corruption, never silently ignored.

pub mod data;
pub mod io;

pub use data::{ResumeMeta, ResumePoint, RESUME_VERSION};
pub use io::SessionError;
