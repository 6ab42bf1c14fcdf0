//! muster-store — Storage collaborators for the attendance backend.
//!
//! Defines the seams to the external object store, user directory, and
//! attendance ledger, plus local reference implementations (filesystem
//! blobs, SQLite documents). All traits are synchronous; callers are
//! expected to be on a blocking-friendly thread already.

pub mod directory;
pub mod ledger;
pub mod object;

pub use directory::{DirectoryError, NewUser, SqliteDirectory, UserDirectory, UserRecord};
pub use ledger::{
    AttendanceKind, AttendanceLedger, AttendanceRecord, DateRange, LedgerError,
    NewAttendanceRecord, SqliteLedger,
};
pub use object::{reference_image_key, FsObjectStore, ObjectStore, ObjectStoreError};
