//! DTO definitions used by the facilitator exercise endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ExerciseEntity, ExercisePatch, ExerciseSettingsEntity, ExerciseStatus},
    dto::{format_system_time, inject::InjectSummary, validation::validate_not_blank},
};

/// Feature flags of an exercise.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSettingsDto {
    pub scoring_enabled: bool,
    pub auto_release: bool,
    pub show_scores: bool,
}

impl From<ExerciseSettingsEntity> for ExerciseSettingsDto {
    fn from(settings: ExerciseSettingsEntity) -> Self {
        Self {
            scoring_enabled: settings.scoring_enabled,
            auto_release: settings.auto_release,
            show_scores: settings.show_scores,
        }
    }
}

impl From<ExerciseSettingsDto> for ExerciseSettingsEntity {
    fn from(settings: ExerciseSettingsDto) -> Self {
        Self {
            scoring_enabled: settings.scoring_enabled,
            auto_release: settings.auto_release,
            show_scores: settings.show_scores,
        }
    }
}

/// Payload creating a new exercise owned by the caller.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExerciseRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to the configured participant cap.
    #[validate(range(min = 1))]
    pub max_participants: Option<u32>,
    /// Defaults to the configured settings.
    pub settings: Option<ExerciseSettingsDto>,
}

/// Shallow patch over the top-level fields of an exercise. Injects are never touched.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExerciseRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub max_participants: Option<u32>,
    pub settings: Option<ExerciseSettingsDto>,
    pub status: Option<ExerciseStatus>,
}

impl From<UpdateExerciseRequest> for ExercisePatch {
    fn from(request: UpdateExerciseRequest) -> Self {
        Self {
            title: request.title.map(|title| title.trim().to_string()),
            description: request.description,
            max_participants: request.max_participants,
            settings: request.settings.map(ExerciseSettingsEntity::from),
            status: request.status,
        }
    }
}

/// Full exercise including its injects.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub facilitator: String,
    pub access_code: String,
    pub max_participants: u32,
    pub settings: ExerciseSettingsDto,
    pub status: ExerciseStatus,
    pub injects: Vec<InjectSummary>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ExerciseEntity> for ExerciseSummary {
    fn from(exercise: ExerciseEntity) -> Self {
        Self {
            id: exercise.id,
            title: exercise.title,
            description: exercise.description,
            facilitator: exercise.facilitator,
            access_code: exercise.access_code,
            max_participants: exercise.max_participants,
            settings: exercise.settings.into(),
            status: exercise.status,
            injects: exercise.injects.into_iter().map(InjectSummary::from).collect(),
            created_at: format_system_time(exercise.created_at),
            updated_at: format_system_time(exercise.updated_at),
        }
    }
}

/// Minimal projection of an exercise when listed for its facilitator.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseListItem {
    pub id: Uuid,
    pub title: String,
    pub access_code: String,
    pub status: ExerciseStatus,
    pub inject_count: usize,
    pub released_count: usize,
    pub created_at: String,
}

impl From<ExerciseEntity> for ExerciseListItem {
    fn from(exercise: ExerciseEntity) -> Self {
        Self {
            id: exercise.id,
            released_count: exercise
                .injects
                .iter()
                .filter(|inject| inject.is_active)
                .count(),
            inject_count: exercise.injects.len(),
            title: exercise.title,
            access_code: exercise.access_code,
            status: exercise.status,
            created_at: format_system_time(exercise.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_validates_present_fields_only() {
        let empty: UpdateExerciseRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.validate().is_ok());

        let blank: UpdateExerciseRequest =
            serde_json::from_str(r#"{"title": " ", "maxParticipants": 0}"#).unwrap();
        let errors = blank.validate().unwrap_err();
        assert!(errors.errors().contains_key("title"));
        assert!(errors.errors().contains_key("max_participants"));
    }

    #[test]
    fn status_uses_snake_case_on_the_wire() {
        let request: UpdateExerciseRequest =
            serde_json::from_str(r#"{"status": "completed"}"#).unwrap();
        assert_eq!(request.status, Some(ExerciseStatus::Completed));
    }
}
