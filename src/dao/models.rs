use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::lifecycle::InjectLifecycle;

/// Lifecycle status of an exercise as a whole.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseStatus {
    /// Being prepared by the facilitator.
    #[default]
    Draft,
    /// Running with participants.
    Active,
    /// Finished; no new participants may join.
    Completed,
}

/// Status of a participant within an exercise.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Taking part; follows released injects and appears on the leaderboard.
    #[default]
    Active,
    /// Temporarily away; keeps its position and responses.
    Inactive,
    /// Removed by the facilitator.
    Removed,
}

/// Category of an artifact attached to an inject.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Inline text document (email, memo, report).
    #[default]
    Document,
    /// Image referenced by URL.
    Image,
    /// External link.
    Link,
    /// Log excerpt.
    Log,
    /// Anything else.
    Other,
}

/// Feature flags of an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExerciseSettingsEntity {
    /// Whether responses earn points.
    pub scoring_enabled: bool,
    /// Whether the client may release injects automatically.
    pub auto_release: bool,
    /// Whether participants may see scores.
    pub show_scores: bool,
}

impl Default for ExerciseSettingsEntity {
    fn default() -> Self {
        Self {
            scoring_enabled: true,
            auto_release: false,
            show_scores: false,
        }
    }
}

/// Exercise document, embedding its injects in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseEntity {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Identifier of the owning facilitator.
    pub facilitator: String,
    pub access_code: String,
    pub max_participants: u32,
    pub settings: ExerciseSettingsEntity,
    pub status: ExerciseStatus,
    pub injects: Vec<InjectEntity>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl ExerciseEntity {
    /// Look up an inject by its stable number.
    pub fn inject(&self, inject_number: u32) -> Option<&InjectEntity> {
        self.injects
            .iter()
            .find(|inject| inject.inject_number == inject_number)
    }

    /// Number the next appended inject receives.
    pub fn next_inject_number(&self) -> u32 {
        self.injects.len() as u32 + 1
    }

    /// Highest inject number that has been released, if any.
    pub fn latest_released_inject(&self) -> Option<u32> {
        self.injects
            .iter()
            .filter(|inject| inject.is_active)
            .map(|inject| inject.inject_number)
            .max()
    }
}

/// Scenario event embedded in an exercise.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectEntity {
    pub inject_number: u32,
    pub title: String,
    pub narrative: String,
    pub artifacts: Vec<ArtifactEntity>,
    pub phases: Vec<PhaseEntity>,
    /// Mirrors `inject_number`.
    pub order: u32,
    pub is_active: bool,
    /// Set on first release and never cleared.
    pub release_time: Option<SystemTime>,
    pub responses_open: bool,
    pub phase_progression_locked: bool,
}

impl InjectEntity {
    /// Build a fresh, unreleased inject.
    pub fn new(
        inject_number: u32,
        title: String,
        narrative: String,
        artifacts: Vec<ArtifactEntity>,
        phases: Vec<PhaseEntity>,
    ) -> Self {
        Self {
            inject_number,
            title,
            narrative,
            artifacts,
            phases,
            order: inject_number,
            is_active: false,
            release_time: None,
            responses_open: false,
            phase_progression_locked: false,
        }
    }

    /// Current lifecycle flags.
    pub fn lifecycle(&self) -> InjectLifecycle {
        InjectLifecycle {
            is_active: self.is_active,
            responses_open: self.responses_open,
            phase_progression_locked: self.phase_progression_locked,
        }
    }

    /// Overwrite the lifecycle flags, stamping `release_time` the first time the inject becomes
    /// active.
    pub fn set_lifecycle(&mut self, next: InjectLifecycle, now: SystemTime) {
        self.is_active = next.is_active;
        self.responses_open = next.responses_open;
        self.phase_progression_locked = next.phase_progression_locked;
        if self.is_active && self.release_time.is_none() {
            self.release_time = Some(now);
        }
    }

    /// Phase definition for a 1-based phase number.
    pub fn phase(&self, phase: u32) -> Option<&PhaseEntity> {
        let index = usize::try_from(phase).ok()?.checked_sub(1)?;
        self.phases.get(index)
    }

    /// Shallow merge of `patch` into this inject. Fields absent from the patch are kept.
    pub fn apply_patch(&mut self, patch: &InjectPatch, now: SystemTime) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(narrative) = &patch.narrative {
            self.narrative = narrative.clone();
        }
        if let Some(artifacts) = &patch.artifacts {
            self.artifacts = artifacts.clone();
        }
        if let Some(phases) = &patch.phases {
            self.phases = phases.clone();
        }
        let next = InjectLifecycle {
            is_active: patch.is_active.unwrap_or(self.is_active),
            responses_open: patch.responses_open.unwrap_or(self.responses_open),
            phase_progression_locked: patch
                .phase_progression_locked
                .unwrap_or(self.phase_progression_locked),
        };
        self.set_lifecycle(next, now);
    }
}

/// Document or media handed to participants alongside an inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntity {
    pub name: String,
    pub kind: ArtifactKind,
    /// Inline text or URL.
    pub content: String,
}

/// Sub-step of an inject that participants progress through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseEntity {
    pub title: String,
    pub prompt: String,
    pub options: Vec<ResponseOptionEntity>,
}

impl PhaseEntity {
    /// Points earned by a response: the points of the option whose key matches `content`.
    pub fn points_for(&self, content: &str) -> i32 {
        let content = content.trim();
        self.options
            .iter()
            .find(|option| option.key == content)
            .map(|option| option.points)
            .unwrap_or(0)
    }
}

/// Scored answer choice of a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseOptionEntity {
    pub key: String,
    pub label: String,
    pub points: i32,
}

/// Shallow patch applied to an inject. Lifecycle flags are patchable on purpose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectPatch {
    pub title: Option<String>,
    pub narrative: Option<String>,
    pub artifacts: Option<Vec<ArtifactEntity>>,
    pub phases: Option<Vec<PhaseEntity>>,
    pub is_active: Option<bool>,
    pub responses_open: Option<bool>,
    pub phase_progression_locked: Option<bool>,
}

/// Shallow patch applied to the top-level fields of an exercise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExercisePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub max_participants: Option<u32>,
    pub settings: Option<ExerciseSettingsEntity>,
    pub status: Option<ExerciseStatus>,
}

impl ExercisePatch {
    /// Apply the patch to an in-memory exercise.
    pub fn apply_to(&self, exercise: &mut ExerciseEntity, now: SystemTime) {
        if let Some(title) = &self.title {
            exercise.title = title.clone();
        }
        if let Some(description) = &self.description {
            exercise.description = description.clone();
        }
        if let Some(max_participants) = self.max_participants {
            exercise.max_participants = max_participants;
        }
        if let Some(settings) = self.settings {
            exercise.settings = settings;
        }
        if let Some(status) = self.status {
            exercise.status = status;
        }
        exercise.updated_at = now;
    }
}

/// Participant of an exercise, referencing it by id.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantEntity {
    pub id: Uuid,
    pub exercise_id: Uuid,
    pub name: String,
    pub team: String,
    pub status: ParticipantStatus,
    /// Inject the participant is positioned at (0 before any release).
    pub current_inject: u32,
    /// 1-based phase within `current_inject`.
    pub current_phase: u32,
    pub total_score: i32,
    pub responses: Vec<ResponseEntity>,
    pub joined_at: SystemTime,
}

impl ParticipantEntity {
    /// Whether a response already exists for the given inject and phase.
    pub fn has_responded(&self, inject_number: u32, phase: u32) -> bool {
        self.responses
            .iter()
            .any(|response| response.inject_number == inject_number && response.phase == phase)
    }
}

/// Immutable answer submitted by a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEntity {
    pub inject_number: u32,
    pub phase: u32,
    pub content: String,
    pub points_earned: i32,
    pub submitted_at: SystemTime,
}
