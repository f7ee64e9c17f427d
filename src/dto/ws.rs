use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, ToSchema, PartialEq)]
/// Messages accepted from realtime WebSocket clients.
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Follow every event of an exercise.
    #[serde(rename_all = "camelCase")]
    JoinExercise { exercise_id: Uuid },
    /// Stop following an exercise.
    #[serde(rename_all = "camelCase")]
    LeaveExercise { exercise_id: Uuid },
    /// Follow the personal channel of a participant.
    #[serde(rename_all = "camelCase")]
    JoinParticipant { participant_id: Uuid },
    /// Stop following a participant.
    #[serde(rename_all = "camelCase")]
    LeaveParticipant { participant_id: Uuid },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn from_json_str(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq)]
/// Envelope delivered to sockets: `{"event": name, "data": payload}`.
pub struct RoomEvent {
    pub event: String,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

impl RoomEvent {
    /// Wrap an already-built JSON payload.
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<T>(event: impl Into<String>, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_value(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Acknowledgement sent back after a join or leave request.
pub struct RoomAck {
    /// Room name, e.g. `exercise:<uuid>`.
    pub room: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_messages_use_camel_case_tags() {
        let id = Uuid::new_v4();
        let message = ClientMessage::from_json_str(&format!(
            r#"{{"type":"joinExercise","exerciseId":"{id}"}}"#
        ))
        .unwrap();
        assert_eq!(message, ClientMessage::JoinExercise { exercise_id: id });

        let message = ClientMessage::from_json_str(&format!(
            r#"{{"type":"joinParticipant","participantId":"{id}"}}"#
        ))
        .unwrap();
        assert_eq!(message, ClientMessage::JoinParticipant { participant_id: id });
    }

    #[test]
    fn unknown_message_types_are_tolerated() {
        let message = ClientMessage::from_json_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(message, ClientMessage::Unknown);
    }

    #[test]
    fn room_event_envelope_shape() {
        let event =
            RoomEvent::json("responsesToggled", &serde_json::json!({"open": true})).unwrap();
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(
            wire,
            serde_json::json!({"event": "responsesToggled", "data": {"open": true}})
        );
    }
}
