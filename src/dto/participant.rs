//! DTO definitions for participants and their responses.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ParticipantEntity, ParticipantStatus, ResponseEntity},
    dto::{
        format_system_time,
        validation::{validate_access_code, validate_not_blank},
    },
};

/// Payload used by a participant to join an exercise with its access code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinExerciseRequest {
    #[validate(custom(function = "validate_access_code"))]
    pub access_code: String,
    #[validate(custom(function = "validate_not_blank"), length(max = 80))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 80))]
    pub team: String,
}

/// Answer to one phase of an inject.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponseRequest {
    #[validate(range(min = 1))]
    pub inject_number: u32,
    /// 1-based phase number.
    #[validate(range(min = 1))]
    pub phase: u32,
    #[validate(custom(function = "validate_not_blank"))]
    pub content: String,
}

/// Facilitator request changing a participant's status.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParticipantStatusRequest {
    pub status: ParticipantStatus,
}

/// Recorded answer.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    pub inject_number: u32,
    pub phase: u32,
    pub content: String,
    pub points_earned: i32,
    pub submitted_at: String,
}

impl From<ResponseEntity> for ResponseSummary {
    fn from(response: ResponseEntity) -> Self {
        Self {
            inject_number: response.inject_number,
            phase: response.phase,
            content: response.content,
            points_earned: response.points_earned,
            submitted_at: format_system_time(response.submitted_at),
        }
    }
}

/// Participant as exposed to REST and realtime clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: Uuid,
    pub exercise_id: Uuid,
    pub name: String,
    pub team: String,
    pub status: ParticipantStatus,
    pub current_inject: u32,
    pub current_phase: u32,
    pub total_score: i32,
    pub responses: Vec<ResponseSummary>,
    pub joined_at: String,
}

impl From<ParticipantEntity> for ParticipantSummary {
    fn from(participant: ParticipantEntity) -> Self {
        Self {
            id: participant.id,
            exercise_id: participant.exercise_id,
            name: participant.name,
            team: participant.team,
            status: participant.status,
            current_inject: participant.current_inject,
            current_phase: participant.current_phase,
            total_score: participant.total_score,
            responses: participant
                .responses
                .into_iter()
                .map(ResponseSummary::from)
                .collect(),
            joined_at: format_system_time(participant.joined_at),
        }
    }
}

/// Result of a successful join: the new participant and the exercise it belongs to.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinExerciseResponse {
    pub participant: ParticipantSummary,
    pub exercise_title: String,
}
