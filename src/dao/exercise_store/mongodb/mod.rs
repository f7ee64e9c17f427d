mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoExerciseStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Decode(inner) => inner,
            MongoDaoError::DuplicateAccessCode { code } => StorageError::AccessCodeTaken(code),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
