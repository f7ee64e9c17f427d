pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            ExerciseEntity, ExercisePatch, InjectEntity, InjectPatch, ParticipantEntity,
            ParticipantStatus, ResponseEntity,
        },
        storage::StorageResult,
    },
    state::lifecycle::LifecycleEvent,
};

/// Outcome of a write scoped to a single inject of an exercise.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectWrite {
    /// The inject was modified; carries its new state.
    Updated(InjectEntity),
    /// The inject exists but the write had nothing to change.
    Unchanged(InjectEntity),
    /// The exercise exists but holds no inject with that number.
    InjectNotFound,
    /// No exercise with that id.
    ExerciseNotFound,
}

/// Persistence layer for exercises (with embedded injects) and their participants.
///
/// Writes touching an inject are single-document conditional updates keyed on the exercise id
/// and the inject number, so writers working on different injects never clobber each other.
pub trait ExerciseStore: Send + Sync {
    /// Persist a new exercise. Fails with [`StorageError::AccessCodeTaken`] when another
    /// exercise already uses its access code.
    ///
    /// [`StorageError::AccessCodeTaken`]: crate::dao::storage::StorageError::AccessCodeTaken
    fn insert_exercise(&self, exercise: ExerciseEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load an exercise with its injects.
    fn find_exercise(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ExerciseEntity>>>;
    /// Exact, case-sensitive lookup; callers normalise the code first.
    fn find_exercise_by_access_code(
        &self,
        access_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<ExerciseEntity>>>;
    /// Exercises owned by `facilitator`, newest first.
    fn list_exercises(
        &self,
        facilitator: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ExerciseEntity>>>;
    /// Patch top-level exercise fields, never the injects.
    fn update_exercise(
        &self,
        id: Uuid,
        patch: ExercisePatch,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<ExerciseEntity>>>;

    /// Append `inject` only if the exercise still holds `expected_count` injects.
    /// Returns `false` when the exercise is gone or the count moved.
    fn append_inject(
        &self,
        exercise_id: Uuid,
        expected_count: usize,
        inject: InjectEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Shallow-merge `patch` into one inject, writing only the patched fields.
    fn update_inject(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
        patch: InjectPatch,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<InjectWrite>>;
    /// Apply a guarded lifecycle event to one inject.
    fn apply_lifecycle(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
        event: LifecycleEvent,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<InjectWrite>>;

    /// Persist a newly joined participant.
    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a participant with its responses.
    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    /// Participants of an exercise in join order, optionally filtered by status.
    fn list_participants(
        &self,
        exercise_id: Uuid,
        status: Option<ParticipantStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Number of participants of the exercise, whatever their status.
    fn count_participants(&self, exercise_id: Uuid) -> BoxFuture<'static, StorageResult<u64>>;
    /// Move every active participant of the exercise to phase 1 of `inject_number`.
    /// Returns how many participants were matched.
    fn reposition_active_participants(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Append a response and add its points to the total, unless a response for the same
    /// inject and phase already exists. `None` when nothing was written.
    fn record_response(
        &self,
        participant_id: Uuid,
        response: ResponseEntity,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    /// Move the participant from `from_phase` to the next phase, provided it still sits at
    /// `inject_number`/`from_phase`. `None` when the position moved in between.
    fn advance_phase(
        &self,
        participant_id: Uuid,
        inject_number: u32,
        from_phase: u32,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    /// Change the status of a participant belonging to `exercise_id`. `None` when no such
    /// participant exists in that exercise.
    fn set_participant_status(
        &self,
        exercise_id: Uuid,
        participant_id: Uuid,
        status: ParticipantStatus,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;

    /// Cheap round trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the underlying connection in place after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
