//! Error type for `ident-store-sqlite`.

use ident_core::store::{FailureClass, StoreFailure};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] ident_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Self::Database(e.into()) }
}

impl StoreFailure for Error {
  fn class(&self) -> FailureClass {
    if let Self::Core(ident_core::Error::DeadlineExceeded) = self {
      return FailureClass::Timeout;
    }
    let Self::Database(tokio_rusqlite::Error::Rusqlite(
      rusqlite::Error::SqliteFailure(err, _),
    )) = self
    else {
      return FailureClass::Fatal;
    };

    match err.code {
      rusqlite::ErrorCode::ConstraintViolation
        if is_unique_violation(err.extended_code) =>
      {
        FailureClass::Conflict
      }
      rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
        FailureClass::Timeout
      }
      _ => FailureClass::Fatal,
    }
  }
}

/// `SQLITE_CONSTRAINT_UNIQUE` / `SQLITE_CONSTRAINT_PRIMARYKEY`. `CHECK` and
/// foreign-key violations are bugs, not races.
fn is_unique_violation(extended_code: std::ffi::c_int) -> bool {
  extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    || extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
