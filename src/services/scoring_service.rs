use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    dao::models::{ParticipantEntity, ParticipantStatus},
    dto::scores::{LeaderboardEntry, LeaderboardResponse},
    error::ServiceError,
    services::exercise_service::load_owned_exercise,
    state::SharedState,
};

/// Build the leaderboard of an exercise from its active participants.
pub async fn leaderboard(
    state: &SharedState,
    user_id: &str,
    exercise_id: Uuid,
) -> Result<LeaderboardResponse, ServiceError> {
    let store = state.require_store().await?;
    let exercise = load_owned_exercise(store.as_ref(), exercise_id, user_id).await?;
    let participants = store
        .list_participants(exercise_id, Some(ParticipantStatus::Active))
        .await?;
    Ok(compute_leaderboard(exercise.title, participants))
}

/// Rank participants by their stored total score (highest first, ties keep input order) and
/// break their responses down per inject.
///
/// `total_score` is trusted as stored; only the per-inject breakdown is derived here.
pub fn compute_leaderboard(
    exercise_title: String,
    participants: Vec<ParticipantEntity>,
) -> LeaderboardResponse {
    let mut leaderboard: Vec<LeaderboardEntry> = participants
        .into_iter()
        .map(|participant| {
            let mut inject_scores = IndexMap::new();
            for response in &participant.responses {
                *inject_scores.entry(response.inject_number).or_insert(0) +=
                    response.points_earned;
            }
            inject_scores.sort_keys();

            LeaderboardEntry {
                participant_id: participant.id,
                name: participant.name,
                team: participant.team,
                total_score: participant.total_score,
                inject_scores,
            }
        })
        .collect();

    // `sort_by` is stable, so equal scores keep their join order.
    leaderboard.sort_by(|a, b| b.total_score.cmp(&a.total_score));

    let total_participants = leaderboard.len();
    let average_score = if total_participants == 0 {
        0.0
    } else {
        let sum: i64 = leaderboard
            .iter()
            .map(|entry| i64::from(entry.total_score))
            .sum();
        sum as f64 / total_participants as f64
    };

    LeaderboardResponse {
        exercise_title,
        total_participants,
        leaderboard,
        average_score,
    }
}
