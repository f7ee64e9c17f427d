/// Exercise and participant persistence behind the [`exercise_store::ExerciseStore`] trait.
pub mod exercise_store;
/// Storage-agnostic entity definitions.
pub mod models;
/// Storage error types shared by every backend.
pub mod storage;
