//! DTO definitions for injects, their artifacts and phases, and the lifecycle endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{
        ArtifactEntity, ArtifactKind, InjectEntity, InjectPatch, PhaseEntity,
        ResponseOptionEntity,
    },
    dto::{format_system_time, validation::validate_not_blank},
};

/// Document or media handed to participants alongside an inject.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDto {
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[serde(default)]
    pub kind: ArtifactKind,
    /// Inline text or URL.
    #[serde(default)]
    pub content: String,
}

/// Scored answer choice of a phase.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOptionDto {
    /// Value a participant submits to pick this option.
    #[validate(custom(function = "validate_not_blank"))]
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub points: i32,
}

/// Sub-step of an inject.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDto {
    #[validate(custom(function = "validate_not_blank"))]
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    #[validate(nested)]
    pub options: Vec<ResponseOptionDto>,
}

/// Payload appending a new inject to an exercise.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInjectRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub title: String,
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    #[validate(nested)]
    pub artifacts: Vec<ArtifactDto>,
    #[serde(default)]
    #[validate(nested)]
    pub phases: Vec<PhaseDto>,
}

/// Shallow patch of an inject. Every field is optional; absent fields are left untouched.
///
/// The lifecycle flags are accepted here as well. This path does not go through the guarded
/// release flow, emits no realtime event and does not reposition participants.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInjectRequest {
    pub title: Option<String>,
    pub narrative: Option<String>,
    pub artifacts: Option<Vec<ArtifactDto>>,
    pub phases: Option<Vec<PhaseDto>>,
    pub is_active: Option<bool>,
    pub responses_open: Option<bool>,
    pub phase_progression_locked: Option<bool>,
}

impl Validate for UpdateInjectRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(title) = &self.title {
            if let Err(e) = validate_not_blank(title) {
                errors.add("title", e);
            }
        }

        if let Some(artifacts) = &self.artifacts {
            for artifact in artifacts {
                if let Err(artifact_errors) = artifact.validate() {
                    errors.merge_self("artifacts", Err(artifact_errors));
                }
            }
        }

        if let Some(phases) = &self.phases {
            for phase in phases {
                if let Err(phase_errors) = phase.validate() {
                    errors.merge_self("phases", Err(phase_errors));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Target of a release request.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInjectRequest {
    #[validate(range(min = 1))]
    pub inject_number: u32,
}

/// Opens or closes responses on an inject.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponsesRequest {
    #[validate(range(min = 1))]
    pub inject_number: u32,
    pub open: bool,
}

/// Locks or unlocks phase progression on an inject.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PhaseLockRequest {
    #[validate(range(min = 1))]
    pub inject_number: u32,
    pub locked: bool,
}

/// Inject as exposed to REST and realtime clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InjectSummary {
    pub inject_number: u32,
    pub title: String,
    pub narrative: String,
    pub artifacts: Vec<ArtifactDto>,
    pub phases: Vec<PhaseDto>,
    pub order: u32,
    pub is_active: bool,
    /// RFC 3339 timestamp of the first release.
    pub release_time: Option<String>,
    pub responses_open: bool,
    pub phase_progression_locked: bool,
}

impl From<InjectEntity> for InjectSummary {
    fn from(inject: InjectEntity) -> Self {
        Self {
            inject_number: inject.inject_number,
            title: inject.title,
            narrative: inject.narrative,
            artifacts: inject.artifacts.into_iter().map(ArtifactDto::from).collect(),
            phases: inject.phases.into_iter().map(PhaseDto::from).collect(),
            order: inject.order,
            is_active: inject.is_active,
            release_time: inject.release_time.map(format_system_time),
            responses_open: inject.responses_open,
            phase_progression_locked: inject.phase_progression_locked,
        }
    }
}

impl From<ArtifactEntity> for ArtifactDto {
    fn from(artifact: ArtifactEntity) -> Self {
        Self {
            name: artifact.name,
            kind: artifact.kind,
            content: artifact.content,
        }
    }
}

impl From<ArtifactDto> for ArtifactEntity {
    fn from(artifact: ArtifactDto) -> Self {
        Self {
            name: artifact.name.trim().to_string(),
            kind: artifact.kind,
            content: artifact.content,
        }
    }
}

impl From<PhaseEntity> for PhaseDto {
    fn from(phase: PhaseEntity) -> Self {
        Self {
            title: phase.title,
            prompt: phase.prompt,
            options: phase
                .options
                .into_iter()
                .map(|option| ResponseOptionDto {
                    key: option.key,
                    label: option.label,
                    points: option.points,
                })
                .collect(),
        }
    }
}

impl From<PhaseDto> for PhaseEntity {
    fn from(phase: PhaseDto) -> Self {
        Self {
            title: phase.title.trim().to_string(),
            prompt: phase.prompt,
            options: phase
                .options
                .into_iter()
                .map(|option| ResponseOptionEntity {
                    key: option.key.trim().to_string(),
                    label: option.label,
                    points: option.points,
                })
                .collect(),
        }
    }
}

impl From<UpdateInjectRequest> for InjectPatch {
    fn from(request: UpdateInjectRequest) -> Self {
        Self {
            title: request.title.map(|title| title.trim().to_string()),
            narrative: request.narrative,
            artifacts: request
                .artifacts
                .map(|artifacts| artifacts.into_iter().map(ArtifactEntity::from).collect()),
            phases: request
                .phases
                .map(|phases| phases.into_iter().map(PhaseEntity::from).collect()),
            is_active: request.is_active,
            responses_open: request.responses_open,
            phase_progression_locked: request.phase_progression_locked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_rejects_blank_title_and_nested_phase_errors() {
        let request: UpdateInjectRequest = serde_json::from_str(
            r#"{"title": "  ", "phases": [{"title": "", "options": []}]}"#,
        )
        .unwrap();
        let errors = request.validate().unwrap_err();
        let fields = errors.errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("phases"));
    }

    #[test]
    fn empty_update_request_is_valid_and_patches_nothing() {
        let request: UpdateInjectRequest = serde_json::from_str("{}").unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(InjectPatch::from(request), InjectPatch::default());
    }

    #[test]
    fn create_request_defaults_optional_collections() {
        let request: CreateInjectRequest =
            serde_json::from_str(r#"{"title": "Breach detected"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert!(request.artifacts.is_empty());
        assert!(request.phases.is_empty());
        assert_eq!(request.narrative, "");
    }

    #[test]
    fn release_request_requires_positive_number() {
        let request: ReleaseInjectRequest =
            serde_json::from_str(r#"{"injectNumber": 0}"#).unwrap();
        assert!(request.validate().is_err());
    }
}
