//! In-process [`ExerciseStore`] used by tests and by `STORAGE_BACKEND=memory`.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ExerciseStore, InjectWrite};
use crate::{
    dao::{
        models::{
            ExerciseEntity, ExercisePatch, InjectEntity, InjectPatch, ParticipantEntity,
            ParticipantStatus, ResponseEntity,
        },
        storage::{StorageError, StorageResult},
    },
    state::lifecycle::{LifecycleEvent, Transition},
};

/// Exercises and participants held in process memory behind one lock per collection.
/// Data is lost when the process exits.
#[derive(Clone, Default)]
pub struct MemoryExerciseStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    exercises: RwLock<HashMap<Uuid, ExerciseEntity>>,
    participants: RwLock<IndexMap<Uuid, ParticipantEntity>>,
}

impl MemoryExerciseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_inject<F>(&self, exercise_id: Uuid, inject_number: u32, write: F) -> InjectWrite
    where
        F: FnOnce(&mut InjectEntity) -> bool,
    {
        let mut exercises = self.inner.exercises.write().await;
        let Some(exercise) = exercises.get_mut(&exercise_id) else {
            return InjectWrite::ExerciseNotFound;
        };
        let Some(inject) = exercise
            .injects
            .iter_mut()
            .find(|inject| inject.inject_number == inject_number)
        else {
            return InjectWrite::InjectNotFound;
        };

        if write(inject) {
            InjectWrite::Updated(inject.clone())
        } else {
            InjectWrite::Unchanged(inject.clone())
        }
    }
}

impl ExerciseStore for MemoryExerciseStore {
    fn insert_exercise(&self, exercise: ExerciseEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut exercises = store.inner.exercises.write().await;
            if exercises
                .values()
                .any(|existing| existing.access_code == exercise.access_code)
            {
                return Err(StorageError::AccessCodeTaken(exercise.access_code));
            }
            exercises.insert(exercise.id, exercise);
            Ok(())
        })
    }

    fn find_exercise(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ExerciseEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.exercises.read().await.get(&id).cloned()) })
    }

    fn find_exercise_by_access_code(
        &self,
        access_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<ExerciseEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .exercises
                .read()
                .await
                .values()
                .find(|exercise| exercise.access_code == access_code)
                .cloned())
        })
    }

    fn list_exercises(
        &self,
        facilitator: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ExerciseEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut owned: Vec<ExerciseEntity> = store
                .inner
                .exercises
                .read()
                .await
                .values()
                .filter(|exercise| exercise.facilitator == facilitator)
                .cloned()
                .collect();
            owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(owned)
        })
    }

    fn update_exercise(
        &self,
        id: Uuid,
        patch: ExercisePatch,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<ExerciseEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut exercises = store.inner.exercises.write().await;
            Ok(exercises.get_mut(&id).map(|exercise| {
                patch.apply_to(exercise, now);
                exercise.clone()
            }))
        })
    }

    fn append_inject(
        &self,
        exercise_id: Uuid,
        expected_count: usize,
        inject: InjectEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut exercises = store.inner.exercises.write().await;
            match exercises.get_mut(&exercise_id) {
                Some(exercise) if exercise.injects.len() == expected_count => {
                    exercise.injects.push(inject);
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn update_inject(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
        patch: InjectPatch,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<InjectWrite>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .with_inject(exercise_id, inject_number, |inject| {
                    inject.apply_patch(&patch, now);
                    true
                })
                .await)
        })
    }

    fn apply_lifecycle(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
        event: LifecycleEvent,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<InjectWrite>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .with_inject(exercise_id, inject_number, |inject| {
                    match inject.lifecycle().apply(event) {
                        Transition::Changed { next, .. } => {
                            inject.set_lifecycle(next, now);
                            true
                        }
                        Transition::Unchanged => false,
                    }
                })
                .await)
        })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .participants
                .write()
                .await
                .insert(participant.id, participant);
            Ok(())
        })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.participants.read().await.get(&id).cloned()) })
    }

    fn list_participants(
        &self,
        exercise_id: Uuid,
        status: Option<ParticipantStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .participants
                .read()
                .await
                .values()
                .filter(|participant| participant.exercise_id == exercise_id)
                .filter(|participant| status.is_none_or(|status| participant.status == status))
                .cloned()
                .collect())
        })
    }

    fn count_participants(&self, exercise_id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .participants
                .read()
                .await
                .values()
                .filter(|participant| participant.exercise_id == exercise_id)
                .count() as u64)
        })
    }

    fn reposition_active_participants(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let mut participants = store.inner.participants.write().await;
            let mut matched = 0;
            for participant in participants.values_mut().filter(|participant| {
                participant.exercise_id == exercise_id
                    && participant.status == ParticipantStatus::Active
            }) {
                participant.current_inject = inject_number;
                participant.current_phase = 1;
                matched += 1;
            }
            Ok(matched)
        })
    }

    fn record_response(
        &self,
        participant_id: Uuid,
        response: ResponseEntity,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut participants = store.inner.participants.write().await;
            let Some(participant) = participants.get_mut(&participant_id) else {
                return Ok(None);
            };
            if participant.has_responded(response.inject_number, response.phase) {
                return Ok(None);
            }
            participant.total_score += response.points_earned;
            participant.responses.push(response);
            Ok(Some(participant.clone()))
        })
    }

    fn advance_phase(
        &self,
        participant_id: Uuid,
        inject_number: u32,
        from_phase: u32,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut participants = store.inner.participants.write().await;
            Ok(participants
                .get_mut(&participant_id)
                .filter(|participant| {
                    participant.current_inject == inject_number
                        && participant.current_phase == from_phase
                })
                .map(|participant| {
                    participant.current_phase = from_phase + 1;
                    participant.clone()
                }))
        })
    }

    fn set_participant_status(
        &self,
        exercise_id: Uuid,
        participant_id: Uuid,
        status: ParticipantStatus,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut participants = store.inner.participants.write().await;
            Ok(participants
                .get_mut(&participant_id)
                .filter(|participant| participant.exercise_id == exercise_id)
                .map(|participant| {
                    participant.status = status;
                    participant.clone()
                }))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{ExerciseSettingsEntity, ExerciseStatus};

    fn exercise() -> ExerciseEntity {
        let now = SystemTime::now();
        ExerciseEntity {
            id: Uuid::new_v4(),
            title: "Ransomware drill".into(),
            description: String::new(),
            facilitator: "fac-1".into(),
            access_code: "ABC234".into(),
            max_participants: 10,
            settings: ExerciseSettingsEntity::default(),
            status: ExerciseStatus::Draft,
            injects: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn participant(exercise_id: Uuid, status: ParticipantStatus) -> ParticipantEntity {
        ParticipantEntity {
            id: Uuid::new_v4(),
            exercise_id,
            name: "Ada".into(),
            team: "Blue".into(),
            status,
            current_inject: 0,
            current_phase: 3,
            total_score: 0,
            responses: Vec::new(),
            joined_at: SystemTime::now(),
        }
    }

    fn inject(number: u32) -> InjectEntity {
        InjectEntity::new(number, format!("Inject {number}"), String::new(), vec![], vec![])
    }

    #[tokio::test]
    async fn access_codes_are_unique() {
        let store = MemoryExerciseStore::new();
        store.insert_exercise(exercise()).await.unwrap();

        let duplicate = store.insert_exercise(exercise()).await;
        assert!(matches!(
            duplicate,
            Err(StorageError::AccessCodeTaken(code)) if code == "ABC234"
        ));
    }

    #[tokio::test]
    async fn append_requires_expected_count() {
        let store = MemoryExerciseStore::new();
        let exercise = exercise();
        let id = exercise.id;
        store.insert_exercise(exercise).await.unwrap();

        assert!(store.append_inject(id, 0, inject(1)).await.unwrap());
        assert!(!store.append_inject(id, 0, inject(1)).await.unwrap());
        assert!(store.append_inject(id, 1, inject(2)).await.unwrap());
        assert!(!store.append_inject(Uuid::new_v4(), 0, inject(1)).await.unwrap());

        let stored = store.find_exercise(id).await.unwrap().unwrap();
        let numbers: Vec<u32> = stored.injects.iter().map(|i| i.inject_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[tokio::test]
    async fn lifecycle_reports_missing_documents() {
        let store = MemoryExerciseStore::new();
        let exercise = exercise();
        let id = exercise.id;
        store.insert_exercise(exercise).await.unwrap();

        let now = SystemTime::now();
        assert_eq!(
            store
                .apply_lifecycle(Uuid::new_v4(), 1, LifecycleEvent::Release, now)
                .await
                .unwrap(),
            InjectWrite::ExerciseNotFound
        );
        assert_eq!(
            store
                .apply_lifecycle(id, 1, LifecycleEvent::Release, now)
                .await
                .unwrap(),
            InjectWrite::InjectNotFound
        );
    }

    #[tokio::test]
    async fn reposition_only_moves_active_participants_of_the_exercise() {
        let store = MemoryExerciseStore::new();
        let exercise_id = Uuid::new_v4();
        let active = participant(exercise_id, ParticipantStatus::Active);
        let inactive = participant(exercise_id, ParticipantStatus::Inactive);
        let elsewhere = participant(Uuid::new_v4(), ParticipantStatus::Active);
        for p in [active.clone(), inactive.clone(), elsewhere.clone()] {
            store.insert_participant(p).await.unwrap();
        }

        let matched = store
            .reposition_active_participants(exercise_id, 4)
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let moved = store.find_participant(active.id).await.unwrap().unwrap();
        assert_eq!((moved.current_inject, moved.current_phase), (4, 1));
        let untouched = store.find_participant(inactive.id).await.unwrap().unwrap();
        assert_eq!((untouched.current_inject, untouched.current_phase), (0, 3));
        let other = store.find_participant(elsewhere.id).await.unwrap().unwrap();
        assert_eq!(other.current_inject, 0);
    }

    #[tokio::test]
    async fn duplicate_response_is_not_recorded() {
        let store = MemoryExerciseStore::new();
        let p = participant(Uuid::new_v4(), ParticipantStatus::Active);
        let id = p.id;
        store.insert_participant(p).await.unwrap();

        let response = ResponseEntity {
            inject_number: 1,
            phase: 1,
            content: "isolate".into(),
            points_earned: 5,
            submitted_at: SystemTime::now(),
        };
        let recorded = store
            .record_response(id, response.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recorded.total_score, 5);
        assert!(store.record_response(id, response).await.unwrap().is_none());
    }
}
