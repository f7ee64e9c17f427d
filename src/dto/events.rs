//! Payloads pushed through the realtime rooms.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::{inject::InjectSummary, participant::ParticipantSummary};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast to the exercise room after an inject has been released.
pub struct InjectReleasedEvent {
    pub inject_number: u32,
    pub inject: InjectSummary,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast to the exercise room when responses are opened or closed.
pub struct ResponsesToggledEvent {
    pub inject_number: u32,
    pub open: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast to the exercise room when phase progression is locked or unlocked.
pub struct PhaseProgressionToggledEvent {
    pub inject_number: u32,
    pub locked: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast to the exercise room when a participant joins.
pub struct ParticipantJoinedEvent {
    pub participant: ParticipantSummary,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast to the exercise room when a participant answers a phase.
pub struct ResponseSubmittedEvent {
    pub participant_id: Uuid,
    pub inject_number: u32,
    pub phase: u32,
    pub points_earned: i32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Sent to a participant's own room whenever its record changes.
pub struct ParticipantUpdatedEvent {
    pub participant: ParticipantSummary,
}
