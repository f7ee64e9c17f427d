use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::storage::StorageError;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB backend, converted into [`StorageError`] at the trait boundary.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to write exercise `{id}`")]
    WriteExercise {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("access code `{code}` is already in use")]
    DuplicateAccessCode { code: String },
    #[error("failed to load exercise `{id}`")]
    LoadExercise {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to query exercises")]
    QueryExercises {
        #[source]
        source: MongoError,
    },
    #[error("failed to write participant `{id}`")]
    WriteParticipant {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load participant `{id}`")]
    LoadParticipant {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to query participants of exercise `{exercise_id}`")]
    QueryParticipants {
        exercise_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("stored document could not be decoded")]
    Decode(#[source] StorageError),
}

/// Server error code reported when a write violates a unique index.
const DUPLICATE_KEY: i32 = 11000;

/// Whether `err` is a unique index violation.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}
