use mongodb::bson::{self, Bson, DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::{
    models::{
        ArtifactEntity, ArtifactKind, ExerciseEntity, ExerciseSettingsEntity, ExerciseStatus,
        InjectEntity, ParticipantEntity, ParticipantStatus, PhaseEntity, ResponseEntity,
        ResponseOptionEntity,
    },
    storage::StorageError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoExerciseDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    title: String,
    #[serde(default)]
    description: String,
    facilitator: String,
    access_code: String,
    max_participants: i64,
    settings: MongoSettingsDocument,
    status: ExerciseStatus,
    #[serde(default)]
    injects: Vec<MongoInjectDocument>,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoSettingsDocument {
    scoring_enabled: bool,
    auto_release: bool,
    show_scores: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoInjectDocument {
    inject_number: i64,
    title: String,
    #[serde(default)]
    narrative: String,
    #[serde(default)]
    artifacts: Vec<MongoArtifactDocument>,
    #[serde(default)]
    phases: Vec<MongoPhaseDocument>,
    order: i64,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    release_time: Option<DateTime>,
    #[serde(default)]
    responses_open: bool,
    #[serde(default)]
    phase_progression_locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoArtifactDocument {
    name: String,
    kind: ArtifactKind,
    content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPhaseDocument {
    title: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    options: Vec<MongoOptionDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoOptionDocument {
    key: String,
    label: String,
    points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoParticipantDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    exercise_id: bson::Uuid,
    name: String,
    #[serde(default)]
    team: String,
    status: ParticipantStatus,
    current_inject: i64,
    current_phase: i64,
    total_score: i32,
    #[serde(default)]
    responses: Vec<MongoResponseDocument>,
    joined_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoResponseDocument {
    inject_number: i64,
    phase: i64,
    content: String,
    points_earned: i32,
    timestamp: DateTime,
}

pub fn bson_uuid(id: Uuid) -> bson::Uuid {
    bson::Uuid::from_bytes(id.into_bytes())
}

fn from_bson_uuid(id: bson::Uuid) -> Uuid {
    Uuid::from_bytes(id.bytes())
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": bson_uuid(id)}
}

fn to_u32(value: i64, field: &str) -> Result<u32, StorageError> {
    u32::try_from(value)
        .map_err(|_| StorageError::Corrupt(format!("field `{field}` out of range: {value}")))
}

impl From<ExerciseEntity> for MongoExerciseDocument {
    fn from(value: ExerciseEntity) -> Self {
        Self {
            id: bson_uuid(value.id),
            title: value.title,
            description: value.description,
            facilitator: value.facilitator,
            access_code: value.access_code,
            max_participants: i64::from(value.max_participants),
            settings: value.settings.into(),
            status: value.status,
            injects: value.injects.into_iter().map(Into::into).collect(),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoExerciseDocument> for ExerciseEntity {
    type Error = StorageError;

    fn try_from(value: MongoExerciseDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: from_bson_uuid(value.id),
            title: value.title,
            description: value.description,
            facilitator: value.facilitator,
            access_code: value.access_code,
            max_participants: to_u32(value.max_participants, "maxParticipants")?,
            settings: value.settings.into(),
            status: value.status,
            injects: value
                .injects
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

impl From<ExerciseSettingsEntity> for MongoSettingsDocument {
    fn from(value: ExerciseSettingsEntity) -> Self {
        Self {
            scoring_enabled: value.scoring_enabled,
            auto_release: value.auto_release,
            show_scores: value.show_scores,
        }
    }
}

impl From<MongoSettingsDocument> for ExerciseSettingsEntity {
    fn from(value: MongoSettingsDocument) -> Self {
        Self {
            scoring_enabled: value.scoring_enabled,
            auto_release: value.auto_release,
            show_scores: value.show_scores,
        }
    }
}

impl From<InjectEntity> for MongoInjectDocument {
    fn from(value: InjectEntity) -> Self {
        Self {
            inject_number: i64::from(value.inject_number),
            title: value.title,
            narrative: value.narrative,
            artifacts: value.artifacts.into_iter().map(Into::into).collect(),
            phases: value.phases.into_iter().map(Into::into).collect(),
            order: i64::from(value.order),
            is_active: value.is_active,
            release_time: value.release_time.map(DateTime::from_system_time),
            responses_open: value.responses_open,
            phase_progression_locked: value.phase_progression_locked,
        }
    }
}

impl TryFrom<MongoInjectDocument> for InjectEntity {
    type Error = StorageError;

    fn try_from(value: MongoInjectDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            inject_number: to_u32(value.inject_number, "injectNumber")?,
            title: value.title,
            narrative: value.narrative,
            artifacts: value.artifacts.into_iter().map(Into::into).collect(),
            phases: value.phases.into_iter().map(Into::into).collect(),
            order: to_u32(value.order, "order")?,
            is_active: value.is_active,
            release_time: value.release_time.map(DateTime::to_system_time),
            responses_open: value.responses_open,
            phase_progression_locked: value.phase_progression_locked,
        })
    }
}

impl From<ArtifactEntity> for MongoArtifactDocument {
    fn from(value: ArtifactEntity) -> Self {
        Self {
            name: value.name,
            kind: value.kind,
            content: value.content,
        }
    }
}

impl From<MongoArtifactDocument> for ArtifactEntity {
    fn from(value: MongoArtifactDocument) -> Self {
        Self {
            name: value.name,
            kind: value.kind,
            content: value.content,
        }
    }
}

impl From<PhaseEntity> for MongoPhaseDocument {
    fn from(value: PhaseEntity) -> Self {
        Self {
            title: value.title,
            prompt: value.prompt,
            options: value
                .options
                .into_iter()
                .map(|option| MongoOptionDocument {
                    key: option.key,
                    label: option.label,
                    points: option.points,
                })
                .collect(),
        }
    }
}

impl From<MongoPhaseDocument> for PhaseEntity {
    fn from(value: MongoPhaseDocument) -> Self {
        Self {
            title: value.title,
            prompt: value.prompt,
            options: value
                .options
                .into_iter()
                .map(|option| ResponseOptionEntity {
                    key: option.key,
                    label: option.label,
                    points: option.points,
                })
                .collect(),
        }
    }
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: bson_uuid(value.id),
            exercise_id: bson_uuid(value.exercise_id),
            name: value.name,
            team: value.team,
            status: value.status,
            current_inject: i64::from(value.current_inject),
            current_phase: i64::from(value.current_phase),
            total_score: value.total_score,
            responses: value.responses.into_iter().map(Into::into).collect(),
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl TryFrom<MongoParticipantDocument> for ParticipantEntity {
    type Error = StorageError;

    fn try_from(value: MongoParticipantDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: from_bson_uuid(value.id),
            exercise_id: from_bson_uuid(value.exercise_id),
            name: value.name,
            team: value.team,
            status: value.status,
            current_inject: to_u32(value.current_inject, "currentInject")?,
            current_phase: to_u32(value.current_phase, "currentPhase")?,
            total_score: value.total_score,
            responses: value
                .responses
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
            joined_at: value.joined_at.to_system_time(),
        })
    }
}

impl From<ResponseEntity> for MongoResponseDocument {
    fn from(value: ResponseEntity) -> Self {
        Self {
            inject_number: i64::from(value.inject_number),
            phase: i64::from(value.phase),
            content: value.content,
            points_earned: value.points_earned,
            timestamp: DateTime::from_system_time(value.submitted_at),
        }
    }
}

impl TryFrom<MongoResponseDocument> for ResponseEntity {
    type Error = StorageError;

    fn try_from(value: MongoResponseDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            inject_number: to_u32(value.inject_number, "injectNumber")?,
            phase: to_u32(value.phase, "phase")?,
            content: value.content,
            points_earned: value.points_earned,
            submitted_at: value.timestamp.to_system_time(),
        })
    }
}

/// Hand-built BSON for embedded values written through `$set`/`$push` operators, keeping the
/// field names identical to the serde representation above.
fn status_bson<T: Serialize>(value: T) -> Bson {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => Bson::String(name),
        _ => Bson::Null,
    }
}

pub fn exercise_status_bson(status: ExerciseStatus) -> Bson {
    status_bson(status)
}

pub fn participant_status_bson(status: ParticipantStatus) -> Bson {
    status_bson(status)
}

pub fn settings_doc(settings: &ExerciseSettingsEntity) -> Document {
    doc! {
        "scoringEnabled": settings.scoring_enabled,
        "autoRelease": settings.auto_release,
        "showScores": settings.show_scores,
    }
}

pub fn artifacts_bson(artifacts: &[ArtifactEntity]) -> Vec<Document> {
    artifacts
        .iter()
        .map(|artifact| {
            doc! {
                "name": artifact.name.as_str(),
                "kind": status_bson(artifact.kind),
                "content": artifact.content.as_str(),
            }
        })
        .collect()
}

pub fn phases_bson(phases: &[PhaseEntity]) -> Vec<Document> {
    phases
        .iter()
        .map(|phase| {
            let options: Vec<Document> = phase
                .options
                .iter()
                .map(|option| {
                    doc! {
                        "key": option.key.as_str(),
                        "label": option.label.as_str(),
                        "points": option.points,
                    }
                })
                .collect();
            doc! {
                "title": phase.title.as_str(),
                "prompt": phase.prompt.as_str(),
                "options": options,
            }
        })
        .collect()
}

pub fn inject_doc(inject: &InjectEntity) -> Document {
    doc! {
        "injectNumber": i64::from(inject.inject_number),
        "title": inject.title.as_str(),
        "narrative": inject.narrative.as_str(),
        "artifacts": artifacts_bson(&inject.artifacts),
        "phases": phases_bson(&inject.phases),
        "order": i64::from(inject.order),
        "isActive": inject.is_active,
        "releaseTime": inject.release_time.map(DateTime::from_system_time),
        "responsesOpen": inject.responses_open,
        "phaseProgressionLocked": inject.phase_progression_locked,
    }
}

pub fn response_doc(response: &ResponseEntity) -> Document {
    doc! {
        "injectNumber": i64::from(response.inject_number),
        "phase": i64::from(response.phase),
        "content": response.content.as_str(),
        "pointsEarned": response.points_earned,
        "timestamp": DateTime::from_system_time(response.submitted_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_match_serde_representation() {
        assert_eq!(
            exercise_status_bson(ExerciseStatus::Completed),
            Bson::String("completed".into())
        );
        assert_eq!(
            participant_status_bson(ParticipantStatus::Active),
            Bson::String("active".into())
        );
    }

    #[test]
    fn phase_points_survive_document_round_trip() {
        let phase = PhaseEntity {
            title: "Contain".into(),
            prompt: "What now?".into(),
            options: vec![ResponseOptionEntity {
                key: "a".into(),
                label: "Isolate host".into(),
                points: 10,
            }],
        };
        let document: MongoPhaseDocument = phase.clone().into();
        assert_eq!(PhaseEntity::from(document), phase);
    }
}
