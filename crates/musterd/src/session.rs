//! The attendance session manager.
//!
//! Orchestrates reference-image registration, verification against the
//! stored reference, and attendance marking/history over the storage
//! collaborators. All durable state lives in the stores; each call is
//! independent and blocking, with per-call transient files that are removed
//! on every exit path.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveTime, Timelike, Utc};
use muster_core::{FaceVerifier, VerificationResult};
use muster_store::{
    reference_image_key, AttendanceKind, AttendanceLedger, AttendanceRecord, DateRange,
    DirectoryError, LedgerError, NewAttendanceRecord, NewUser, ObjectStore, ObjectStoreError,
    UserDirectory, UserRecord,
};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Status recorded on every attendance event.
const PRESENT_STATUS: &str = "Present";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no reference image registered for {0}")]
    NoReference(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("identifier already registered: {0}")]
    AlreadyExists(String),
    #[error("object store: {0}")]
    Objects(#[from] ObjectStoreError),
    #[error("user directory: {0}")]
    Directory(DirectoryError),
    #[error("attendance ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("transient file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DirectoryError> for SessionError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(identifier) => SessionError::UserNotFound(identifier),
            DirectoryError::AlreadyExists(identifier) => SessionError::AlreadyExists(identifier),
            other => SessionError::Directory(other),
        }
    }
}

/// Outcome of a reference registration.
#[derive(Debug, Clone)]
pub struct RegisteredReference {
    pub image_url: String,
}

/// Outcome of an attendance marking.
#[derive(Debug, Clone)]
pub struct MarkedAttendance {
    pub record_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// A user's attendance history, newest first.
#[derive(Debug, Clone)]
pub struct AttendanceHistory {
    pub records: Vec<AttendanceRecord>,
    pub count: usize,
}

pub struct SessionManager {
    objects: Arc<dyn ObjectStore>,
    directory: Arc<dyn UserDirectory>,
    ledger: Arc<dyn AttendanceLedger>,
    verifier: FaceVerifier,
    temp_dir: PathBuf,
}

impl SessionManager {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        directory: Arc<dyn UserDirectory>,
        ledger: Arc<dyn AttendanceLedger>,
        verifier: FaceVerifier,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            objects,
            directory,
            ledger,
            verifier,
            temp_dir,
        }
    }

    /// Store `image_bytes` as the reference image for `identifier`,
    /// overwriting any previous reference, and record the public URL on the
    /// user document.
    ///
    /// No face detection happens here — a faceless registration succeeds and
    /// every later verification against it fails at the detection step.
    pub fn register_reference(
        &self,
        identifier: &str,
        image_bytes: &[u8],
    ) -> Result<RegisteredReference, SessionError> {
        let staged = self.stage_image(image_bytes, "register_")?;
        let key = reference_image_key(identifier);
        tracing::info!(identifier, key, "uploading reference image");
        self.objects.put_file(&key, staged.path())?;
        remove_transient(staged);

        let image_url = self.objects.public_url(&key);
        self.directory
            .record_reference(identifier, &image_url, Utc::now())?;
        Ok(RegisteredReference { image_url })
    }

    /// Verify `image_bytes` against the stored reference for `identifier`.
    ///
    /// Fails with [`SessionError::NoReference`] before any biometric work
    /// when no reference exists. Otherwise both images are materialized to
    /// uniquely-named transient files (collision-free across concurrent
    /// calls) and the match engine's result is returned unchanged.
    pub fn verify_and_score(
        &self,
        identifier: &str,
        image_bytes: &[u8],
    ) -> Result<VerificationResult, SessionError> {
        let key = reference_image_key(identifier);
        if !self.objects.exists(&key)? {
            tracing::warn!(identifier, key, "no reference image registered");
            return Err(SessionError::NoReference(identifier.to_string()));
        }

        let captured = self.stage_image(image_bytes, "capture_")?;
        let reference = self.fresh_transient("ref_")?;
        self.objects.fetch_to_file(&key, reference.path())?;

        let result = self.verifier.verify(reference.path(), captured.path());

        // Files created after the guard points above are dropped (and
        // removed) automatically on the early-error paths; the happy path
        // removes them here so deletion failures get logged.
        remove_transient(reference);
        remove_transient(captured);
        Ok(result)
    }

    /// Record a check-in/check-out for `identifier` at the current local
    /// wall-clock time, tagged with the verification confidence the caller
    /// obtained.
    ///
    /// Nothing prevents duplicate same-day events or out-of-order
    /// check-in/check-out sequences; the ledger is append-only and
    /// interpretation belongs to reporting.
    pub fn mark_attendance(
        &self,
        identifier: &str,
        kind: AttendanceKind,
        confidence: f32,
    ) -> Result<MarkedAttendance, SessionError> {
        let user = self
            .directory
            .find(identifier)?
            .ok_or_else(|| SessionError::UserNotFound(identifier.to_string()))?;

        let now = Local::now();
        let date = now.date_naive();
        let time = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());

        let record = self.ledger.append(NewAttendanceRecord {
            user_id: identifier.to_string(),
            user_name: user.display_name(),
            date,
            time,
            kind,
            status: PRESENT_STATUS.to_string(),
            verification_confidence: confidence,
        })?;

        Ok(MarkedAttendance {
            record_id: record.id,
            date,
            time,
        })
    }

    /// All attendance records for `identifier` within the (inclusive) date
    /// range, newest first, plus their count.
    pub fn history(
        &self,
        identifier: &str,
        range: DateRange,
    ) -> Result<AttendanceHistory, SessionError> {
        let records = self.ledger.query(identifier, range)?;
        let count = records.len();
        Ok(AttendanceHistory { records, count })
    }

    /// Insert a user document for an account the identity provider created.
    pub fn enroll_user(&self, user: NewUser) -> Result<UserRecord, SessionError> {
        Ok(self.directory.insert(user)?)
    }

    /// Delete the user document and, best-effort, the reference image blob.
    pub fn remove_user(&self, identifier: &str) -> Result<(), SessionError> {
        self.directory.delete(identifier)?;

        let key = reference_image_key(identifier);
        match self.objects.delete(&key) {
            Ok(()) => tracing::info!(identifier, key, "reference image deleted"),
            Err(ObjectStoreError::NotFound(_)) => {}
            Err(err) => {
                // The account is already gone; a stranded blob is logged,
                // not escalated.
                tracing::warn!(identifier, key, error = %err, "failed to delete reference image");
            }
        }
        Ok(())
    }

    /// Write payload bytes to a fresh uniquely-named transient file.
    fn stage_image(&self, bytes: &[u8], prefix: &str) -> Result<NamedTempFile, SessionError> {
        let mut file = self.fresh_transient(prefix)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    }

    /// A transient file with a per-call unique name under the configured
    /// temp directory. Uniqueness is what keeps concurrent verifications
    /// from ever sharing a path.
    fn fresh_transient(&self, prefix: &str) -> std::io::Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".jpg")
            .tempfile_in(&self.temp_dir)
    }
}

/// Best-effort removal of a transient file; failure is logged, never
/// escalated, and never blocks the response.
fn remove_transient(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(err) = file.close() {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove transient file");
    }
}
