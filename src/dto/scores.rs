use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Leaderboard of the active participants of an exercise.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub exercise_title: String,
    pub total_participants: usize,
    /// Sorted by total score, highest first.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Mean total score, 0 when there are no participants.
    pub average_score: f64,
}

/// Score line of a single participant.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub participant_id: Uuid,
    pub name: String,
    pub team: String,
    pub total_score: i32,
    /// Points per inject number, in ascending inject order.
    pub inject_scores: IndexMap<u32, i32>,
}
