use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, RoomAck, RoomEvent},
    state::{RoomKey, SharedState},
};

const EVENT_ROOM_JOINED: &str = "roomJoined";
const EVENT_ROOM_LEFT: &str = "roomLeft";
/// Messages queued for a socket before room forwarders start waiting on it.
const OUTBOUND_BUFFER: usize = 32;

/// Writer channel closed; the socket is gone.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// Rooms a single socket is subscribed to, each with the task forwarding its events.
type Subscriptions = HashMap<RoomKey, JoinHandle<()>>;

/// Handle the full lifecycle of a realtime WebSocket connection.
///
/// The socket starts in no room; clients join exercise or participant rooms explicitly and
/// only receive events broadcast after they joined.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    // A stalled socket fills the bounded queue, so its forwarders fall behind their rooms and
    // skip events instead of buffering them.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    info!(connection = %connection_id, "realtime socket connected");
    let mut subscriptions = Subscriptions::new();

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(message) => {
                    let handled =
                        handle_client_message(&state, message, &outbound_tx, &mut subscriptions)
                            .await;
                    if handled.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        connection = %connection_id,
                        error = %err,
                        "failed to parse client message"
                    );
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame)).await;
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    for (key, task) in subscriptions.drain() {
        leave_room(&state, key, task).await;
    }
    info!(connection = %connection_id, "realtime socket disconnected");

    finalize(writer_task, outbound_tx).await;
}

async fn handle_client_message(
    state: &SharedState,
    message: ClientMessage,
    outbound_tx: &mpsc::Sender<Message>,
    subscriptions: &mut Subscriptions,
) -> Result<(), ConnectionClosed> {
    match message {
        ClientMessage::JoinExercise { exercise_id } => {
            join_room(state, RoomKey::Exercise(exercise_id), outbound_tx, subscriptions).await
        }
        ClientMessage::JoinParticipant { participant_id } => {
            join_room(
                state,
                RoomKey::Participant(participant_id),
                outbound_tx,
                subscriptions,
            )
            .await
        }
        ClientMessage::LeaveExercise { exercise_id } => {
            detach_room(state, RoomKey::Exercise(exercise_id), outbound_tx, subscriptions).await
        }
        ClientMessage::LeaveParticipant { participant_id } => {
            detach_room(
                state,
                RoomKey::Participant(participant_id),
                outbound_tx,
                subscriptions,
            )
            .await
        }
        ClientMessage::Unknown => {
            debug!("ignoring unknown client message type");
            Ok(())
        }
    }
}

/// Subscribe the socket to `key`. Joining a room twice keeps the existing subscription.
async fn join_room(
    state: &SharedState,
    key: RoomKey,
    outbound_tx: &mpsc::Sender<Message>,
    subscriptions: &mut Subscriptions,
) -> Result<(), ConnectionClosed> {
    if !subscriptions.contains_key(&key) {
        let receiver = state.rooms().subscribe(key);
        subscriptions.insert(key, spawn_forwarder(key, receiver, outbound_tx.clone()));
        info!(room = %key, "socket joined room");
    }
    acknowledge(outbound_tx, EVENT_ROOM_JOINED, key).await
}

async fn detach_room(
    state: &SharedState,
    key: RoomKey,
    outbound_tx: &mpsc::Sender<Message>,
    subscriptions: &mut Subscriptions,
) -> Result<(), ConnectionClosed> {
    if let Some(task) = subscriptions.remove(&key) {
        leave_room(state, key, task).await;
        info!(room = %key, "socket left room");
    }
    acknowledge(outbound_tx, EVENT_ROOM_LEFT, key).await
}

/// Stop forwarding `key` and drop the room once nobody else listens.
async fn leave_room(state: &SharedState, key: RoomKey, task: JoinHandle<()>) {
    task.abort();
    // Wait for the aborted task so its receiver is dropped before releasing the room.
    let _ = task.await;
    state.rooms().release(key);
}

async fn acknowledge(
    outbound_tx: &mpsc::Sender<Message>,
    event: &str,
    key: RoomKey,
) -> Result<(), ConnectionClosed> {
    let ack = RoomAck {
        room: key.to_string(),
    };
    match RoomEvent::json(event, &ack) {
        Ok(message) => send_message_to_websocket(outbound_tx, &message).await,
        Err(err) => {
            warn!(error = %err, "failed to serialize room acknowledgement");
            Ok(())
        }
    }
}

/// Pump room events into the socket writer until either side goes away.
///
/// Sending waits for room in the socket queue; meanwhile the room keeps moving, and a socket
/// that falls behind the room buffer skips the missed events and keeps going.
fn spawn_forwarder(
    key: RoomKey,
    receiver: broadcast::Receiver<RoomEvent>,
    outbound_tx: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = BroadcastStream::new(receiver);
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if send_message_to_websocket(&outbound_tx, &event).await.is_err() {
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(room = %key, skipped, "socket lagging behind room; events skipped");
                }
            }
        }
    })
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; only a closed writer is reported.
async fn send_message_to_websocket<T>(
    tx: &mpsc::Sender<Message>,
    value: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .await
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::Sender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
