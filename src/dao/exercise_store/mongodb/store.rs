use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        MongoExerciseDocument, MongoParticipantDocument, artifacts_bson, bson_uuid, doc_id,
        exercise_status_bson, inject_doc, participant_status_bson, phases_bson, response_doc,
        settings_doc,
    },
};
use crate::{
    dao::{
        exercise_store::{ExerciseStore, InjectWrite},
        models::{
            ExerciseEntity, ExercisePatch, InjectEntity, InjectPatch, ParticipantEntity,
            ParticipantStatus, ResponseEntity,
        },
        storage::{StorageError, StorageResult},
    },
    state::lifecycle::LifecycleEvent,
};

const EXERCISE_COLLECTION_NAME: &str = "exercises";
const PARTICIPANT_COLLECTION_NAME: &str = "participants";

/// MongoDB-backed [`ExerciseStore`].
#[derive(Clone)]
pub struct MongoExerciseStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn decode<D, E>(document: D) -> MongoResult<E>
where
    E: TryFrom<D, Error = StorageError>,
{
    E::try_from(document).map_err(MongoDaoError::Decode)
}

fn inject_filter(exercise_id: Uuid, inject_number: u32, guard: Document) -> Document {
    let mut element = doc! { "injectNumber": i64::from(inject_number) };
    element.extend(guard);
    doc! {
        "_id": bson_uuid(exercise_id),
        "injects": { "$elemMatch": element },
    }
}

/// Guard and `$set` pairs tried in order by a release: first activation, then reopening
/// responses on an inject that is already active. Neither touches `releaseTime`.
fn release_updates() -> [(Document, Document); 2] {
    [
        (
            doc! {"isActive": {"$ne": true}},
            doc! {"injects.$.isActive": true, "injects.$.responsesOpen": true},
        ),
        (
            doc! {"responsesOpen": {"$ne": true}},
            doc! {"injects.$.isActive": true, "injects.$.responsesOpen": true},
        ),
    ]
}

/// Guard and `$set` stamping the release time of an inject that never had one.
fn release_time_stamp(now: SystemTime) -> (Document, Document) {
    (
        doc! {"releaseTime": null},
        doc! {"injects.$.releaseTime": DateTime::from_system_time(now)},
    )
}

impl MongoExerciseStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { client, database }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let exercises = self.exercises().await;
        let access_code = IndexModel::builder()
            .keys(doc! {"accessCode": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("exercise_access_code_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        exercises
            .create_index(access_code)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: EXERCISE_COLLECTION_NAME,
                index: "accessCode",
                source,
            })?;

        let facilitator = IndexModel::builder()
            .keys(doc! {"facilitator": 1, "createdAt": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("exercise_facilitator_idx".to_owned()))
                    .build(),
            )
            .build();
        exercises
            .create_index(facilitator)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: EXERCISE_COLLECTION_NAME,
                index: "facilitator,createdAt",
                source,
            })?;

        let participant_index = IndexModel::builder()
            .keys(doc! {"exerciseId": 1, "status": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("participant_exercise_idx".to_owned()))
                    .build(),
            )
            .build();
        self.participants()
            .await
            .create_index(participant_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PARTICIPANT_COLLECTION_NAME,
                index: "exerciseId,status",
                source,
            })?;

        Ok(())
    }

    async fn exercises(&self) -> Collection<MongoExerciseDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoExerciseDocument>(EXERCISE_COLLECTION_NAME)
    }

    async fn participants(&self) -> Collection<MongoParticipantDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION_NAME)
    }

    async fn insert_exercise(&self, exercise: ExerciseEntity) -> MongoResult<()> {
        let id = exercise.id;
        let code = exercise.access_code.clone();
        let document: MongoExerciseDocument = exercise.into();
        self.exercises()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::DuplicateAccessCode { code }
                } else {
                    MongoDaoError::WriteExercise { id, source }
                }
            })?;
        Ok(())
    }

    async fn find_exercise(&self, id: Uuid) -> MongoResult<Option<ExerciseEntity>> {
        self.exercises()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadExercise { id, source })?
            .map(decode)
            .transpose()
    }

    async fn find_exercise_by_access_code(
        &self,
        access_code: String,
    ) -> MongoResult<Option<ExerciseEntity>> {
        self.exercises()
            .await
            .find_one(doc! {"accessCode": access_code})
            .await
            .map_err(|source| MongoDaoError::QueryExercises { source })?
            .map(decode)
            .transpose()
    }

    async fn list_exercises(&self, facilitator: String) -> MongoResult<Vec<ExerciseEntity>> {
        let documents: Vec<MongoExerciseDocument> = self
            .exercises()
            .await
            .find(doc! {"facilitator": facilitator})
            .sort(doc! {"createdAt": -1})
            .await
            .map_err(|source| MongoDaoError::QueryExercises { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryExercises { source })?;

        documents.into_iter().map(decode).collect()
    }

    async fn update_exercise(
        &self,
        id: Uuid,
        patch: ExercisePatch,
        now: SystemTime,
    ) -> MongoResult<Option<ExerciseEntity>> {
        let mut set = doc! {"updatedAt": DateTime::from_system_time(now)};
        if let Some(title) = patch.title {
            set.insert("title", title);
        }
        if let Some(description) = patch.description {
            set.insert("description", description);
        }
        if let Some(max_participants) = patch.max_participants {
            set.insert("maxParticipants", i64::from(max_participants));
        }
        if let Some(settings) = patch.settings {
            set.insert("settings", settings_doc(&settings));
        }
        if let Some(status) = patch.status {
            set.insert("status", exercise_status_bson(status));
        }

        self.exercises()
            .await
            .find_one_and_update(doc_id(id), doc! {"$set": set})
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::WriteExercise { id, source })?
            .map(decode)
            .transpose()
    }

    async fn append_inject(
        &self,
        exercise_id: Uuid,
        expected_count: usize,
        inject: InjectEntity,
    ) -> MongoResult<bool> {
        let expected = i64::try_from(expected_count).unwrap_or(i64::MAX);
        let result = self
            .exercises()
            .await
            .update_one(
                doc! {"_id": bson_uuid(exercise_id), "injects": {"$size": expected}},
                doc! {
                    "$push": {"injects": inject_doc(&inject)},
                    "$set": {"updatedAt": DateTime::now()},
                },
            )
            .await
            .map_err(|source| MongoDaoError::WriteExercise {
                id: exercise_id,
                source,
            })?;
        Ok(result.matched_count == 1)
    }

    /// Run a `$set` against the inject matching `guard`, returning the updated exercise or
    /// `None` when the guard did not match.
    async fn guarded_inject_update(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
        guard: Document,
        mut set: Document,
        now: SystemTime,
    ) -> MongoResult<Option<ExerciseEntity>> {
        set.insert("updatedAt", DateTime::from_system_time(now));
        self.exercises()
            .await
            .find_one_and_update(
                inject_filter(exercise_id, inject_number, guard),
                doc! {"$set": set},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::WriteExercise {
                id: exercise_id,
                source,
            })?
            .map(decode)
            .transpose()
    }

    /// Classify why a guarded update matched nothing.
    async fn unchanged_inject(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
    ) -> MongoResult<InjectWrite> {
        Ok(match self.find_exercise(exercise_id).await? {
            None => InjectWrite::ExerciseNotFound,
            Some(exercise) => match exercise.inject(inject_number) {
                Some(inject) => InjectWrite::Unchanged(inject.clone()),
                None => InjectWrite::InjectNotFound,
            },
        })
    }

    fn updated(exercise: ExerciseEntity, inject_number: u32) -> InjectWrite {
        exercise
            .inject(inject_number)
            .cloned()
            .map_or(InjectWrite::InjectNotFound, InjectWrite::Updated)
    }

    async fn update_inject(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
        patch: InjectPatch,
        now: SystemTime,
    ) -> MongoResult<InjectWrite> {
        let mut set = Document::new();
        if let Some(title) = &patch.title {
            set.insert("injects.$.title", title.as_str());
        }
        if let Some(narrative) = &patch.narrative {
            set.insert("injects.$.narrative", narrative.as_str());
        }
        if let Some(artifacts) = &patch.artifacts {
            set.insert("injects.$.artifacts", artifacts_bson(artifacts));
        }
        if let Some(phases) = &patch.phases {
            set.insert("injects.$.phases", phases_bson(phases));
        }
        if let Some(is_active) = patch.is_active {
            set.insert("injects.$.isActive", is_active);
        }
        if let Some(responses_open) = patch.responses_open {
            set.insert("injects.$.responsesOpen", responses_open);
        }
        if let Some(locked) = patch.phase_progression_locked {
            set.insert("injects.$.phaseProgressionLocked", locked);
        }

        let Some(mut exercise) = self
            .guarded_inject_update(exercise_id, inject_number, Document::new(), set, now)
            .await?
        else {
            return self.unchanged_inject(exercise_id, inject_number).await;
        };

        // An inject activated through a patch still gets its first release time.
        if patch.is_active == Some(true) {
            exercise = self
                .stamp_first_release(exercise_id, inject_number, now)
                .await?
                .unwrap_or(exercise);
        }

        Ok(Self::updated(exercise, inject_number))
    }

    /// Set `releaseTime` on an inject that never had one. Returns `None` when the inject already
    /// carries a release time, which is then left untouched.
    async fn stamp_first_release(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
        now: SystemTime,
    ) -> MongoResult<Option<ExerciseEntity>> {
        let (guard, set) = release_time_stamp(now);
        self.guarded_inject_update(exercise_id, inject_number, guard, set, now)
            .await
    }

    async fn apply_lifecycle(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
        event: LifecycleEvent,
        now: SystemTime,
    ) -> MongoResult<InjectWrite> {
        let updated = match event {
            LifecycleEvent::Release => {
                let [(activate_guard, activate), (reopen_guard, reopen)] = release_updates();
                let first_release = self
                    .guarded_inject_update(
                        exercise_id,
                        inject_number,
                        activate_guard,
                        activate,
                        now,
                    )
                    .await?;
                match first_release {
                    // An inject deactivated through a patch keeps the release time it got the
                    // first time around.
                    Some(exercise) => Some(
                        self.stamp_first_release(exercise_id, inject_number, now)
                            .await?
                            .unwrap_or(exercise),
                    ),
                    // Already active: only reopening responses is left to do.
                    None => {
                        self.guarded_inject_update(
                            exercise_id,
                            inject_number,
                            reopen_guard,
                            reopen,
                            now,
                        )
                        .await?
                    }
                }
            }
            LifecycleEvent::SetResponsesOpen(open) => {
                self.guarded_inject_update(
                    exercise_id,
                    inject_number,
                    doc! {"responsesOpen": {"$ne": open}},
                    doc! {"injects.$.responsesOpen": open},
                    now,
                )
                .await?
            }
            LifecycleEvent::SetPhaseProgressionLocked(locked) => {
                self.guarded_inject_update(
                    exercise_id,
                    inject_number,
                    doc! {"phaseProgressionLocked": {"$ne": locked}},
                    doc! {"injects.$.phaseProgressionLocked": locked},
                    now,
                )
                .await?
            }
        };

        match updated {
            Some(exercise) => Ok(Self::updated(exercise, inject_number)),
            None => self.unchanged_inject(exercise_id, inject_number).await,
        }
    }

    async fn insert_participant(&self, participant: ParticipantEntity) -> MongoResult<()> {
        let id = participant.id;
        let document: MongoParticipantDocument = participant.into();
        self.participants()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::WriteParticipant { id, source })?;
        Ok(())
    }

    async fn find_participant(&self, id: Uuid) -> MongoResult<Option<ParticipantEntity>> {
        self.participants()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadParticipant { id, source })?
            .map(decode)
            .transpose()
    }

    async fn list_participants(
        &self,
        exercise_id: Uuid,
        status: Option<ParticipantStatus>,
    ) -> MongoResult<Vec<ParticipantEntity>> {
        let mut filter = doc! {"exerciseId": bson_uuid(exercise_id)};
        if let Some(status) = status {
            filter.insert("status", participant_status_bson(status));
        }

        let documents: Vec<MongoParticipantDocument> = self
            .participants()
            .await
            .find(filter)
            .sort(doc! {"joinedAt": 1})
            .await
            .map_err(|source| MongoDaoError::QueryParticipants {
                exercise_id,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryParticipants {
                exercise_id,
                source,
            })?;

        documents.into_iter().map(decode).collect()
    }

    async fn count_participants(&self, exercise_id: Uuid) -> MongoResult<u64> {
        self.participants()
            .await
            .count_documents(doc! {"exerciseId": bson_uuid(exercise_id)})
            .await
            .map_err(|source| MongoDaoError::QueryParticipants {
                exercise_id,
                source,
            })
    }

    async fn reposition_active_participants(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
    ) -> MongoResult<u64> {
        let result = self
            .participants()
            .await
            .update_many(
                doc! {
                    "exerciseId": bson_uuid(exercise_id),
                    "status": participant_status_bson(ParticipantStatus::Active),
                },
                doc! {"$set": {
                    "currentInject": i64::from(inject_number),
                    "currentPhase": 1_i64,
                }},
            )
            .await
            .map_err(|source| MongoDaoError::QueryParticipants {
                exercise_id,
                source,
            })?;
        Ok(result.matched_count)
    }

    async fn record_response(
        &self,
        participant_id: Uuid,
        response: ResponseEntity,
    ) -> MongoResult<Option<ParticipantEntity>> {
        let filter = doc! {
            "_id": bson_uuid(participant_id),
            "responses": {"$not": {"$elemMatch": {
                "injectNumber": i64::from(response.inject_number),
                "phase": i64::from(response.phase),
            }}},
        };
        let update = doc! {
            "$push": {"responses": response_doc(&response)},
            "$inc": {"totalScore": response.points_earned},
        };

        self.participants()
            .await
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::WriteParticipant {
                id: participant_id,
                source,
            })?
            .map(decode)
            .transpose()
    }

    async fn advance_phase(
        &self,
        participant_id: Uuid,
        inject_number: u32,
        from_phase: u32,
    ) -> MongoResult<Option<ParticipantEntity>> {
        self.participants()
            .await
            .find_one_and_update(
                doc! {
                    "_id": bson_uuid(participant_id),
                    "currentInject": i64::from(inject_number),
                    "currentPhase": i64::from(from_phase),
                },
                doc! {"$set": {"currentPhase": i64::from(from_phase) + 1}},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::WriteParticipant {
                id: participant_id,
                source,
            })?
            .map(decode)
            .transpose()
    }

    async fn set_participant_status(
        &self,
        exercise_id: Uuid,
        participant_id: Uuid,
        status: ParticipantStatus,
    ) -> MongoResult<Option<ParticipantEntity>> {
        self.participants()
            .await
            .find_one_and_update(
                doc! {
                    "_id": bson_uuid(participant_id),
                    "exerciseId": bson_uuid(exercise_id),
                },
                doc! {"$set": {"status": participant_status_bson(status)}},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::WriteParticipant {
                id: participant_id,
                source,
            })?
            .map(decode)
            .transpose()
    }
}

impl ExerciseStore for MongoExerciseStore {
    fn insert_exercise(&self, exercise: ExerciseEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_exercise(exercise).await.map_err(Into::into) })
    }

    fn find_exercise(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ExerciseEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_exercise(id).await.map_err(Into::into) })
    }

    fn find_exercise_by_access_code(
        &self,
        access_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<ExerciseEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_exercise_by_access_code(access_code)
                .await
                .map_err(Into::into)
        })
    }

    fn list_exercises(
        &self,
        facilitator: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ExerciseEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_exercises(facilitator).await.map_err(Into::into) })
    }

    fn update_exercise(
        &self,
        id: Uuid,
        patch: ExercisePatch,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<ExerciseEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_exercise(id, patch, now)
                .await
                .map_err(Into::into)
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
            store
                .append_inject(exercise_id, expected_count, inject)
                .await
                .map_err(Into::into)
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
            store
                .update_inject(exercise_id, inject_number, patch, now)
                .await
                .map_err(Into::into)
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
            store
                .apply_lifecycle(exercise_id, inject_number, event, now)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_participant(participant).await.map_err(Into::into) })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_participant(id).await.map_err(Into::into) })
    }

    fn list_participants(
        &self,
        exercise_id: Uuid,
        status: Option<ParticipantStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_participants(exercise_id, status)
                .await
                .map_err(Into::into)
        })
    }

    fn count_participants(&self, exercise_id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.count_participants(exercise_id).await.map_err(Into::into) })
    }

    fn reposition_active_participants(
        &self,
        exercise_id: Uuid,
        inject_number: u32,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .reposition_active_participants(exercise_id, inject_number)
                .await
                .map_err(Into::into)
        })
    }

    fn record_response(
        &self,
        participant_id: Uuid,
        response: ResponseEntity,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .record_response(participant_id, response)
                .await
                .map_err(Into::into)
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
            store
                .advance_phase(participant_id, inject_number, from_phase)
                .await
                .map_err(Into::into)
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
            store
                .set_participant_status(exercise_id, participant_id, status)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
