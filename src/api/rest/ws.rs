use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::location::GeoPoint;
use crate::models::request::RequestStatus;
use crate::realtime::events::{ClientEvent, ErrorEvent, ERROR};
use crate::realtime::registry::{Room, SessionId};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub user_id: Uuid,
    pub role: Role,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let actor = Actor {
        id: params.user_id,
        role: params.role,
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, actor))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, actor: Actor) {
    let (mut sender, mut receiver) = socket.split();
    let (session_id, rx) = state.registry.connect(actor.id, actor.role);

    for request_id in state.machine.open_requests_for(actor.id) {
        state.registry.join(session_id, Room::Request(request_id));
    }

    let mut outbound = ReceiverStream::new(rx);
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.next().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize frame for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let outcome = serde_json::from_str::<ClientEvent>(&text)
                .map_err(|err| AppError::Validation(format!("unrecognised frame: {err}")))
                .and_then(|event| handle_client_event(&recv_state, session_id, &actor, event));

            if let Err(err) = outcome {
                debug!(session_id = %session_id, error = %err, "client event rejected");
                recv_state.registry.send_to(
                    session_id,
                    ERROR,
                    &ErrorEvent {
                        message: err.to_string(),
                    },
                );
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.registry.disconnect(session_id);
}

pub(crate) fn handle_client_event(
    state: &AppState,
    session_id: SessionId,
    actor: &Actor,
    event: ClientEvent,
) -> Result<(), AppError> {
    match event {
        ClientEvent::JoinRequest { request_id } => {
            let request = state
                .machine
                .get(&request_id)
                .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;
            let allowed = actor.is_admin()
                || request.is_party(actor.id)
                || (actor.role == Role::Mechanic && request.status == RequestStatus::Pending);
            if !allowed {
                return Err(AppError::Forbidden(format!(
                    "cannot follow request {request_id}"
                )));
            }
            state.registry.join(session_id, Room::Request(request_id));
        }
        ClientEvent::LeaveRequest { request_id } => {
            state.registry.leave(session_id, &Room::Request(request_id));
        }
        ClientEvent::UpdateLocation { lat, lng, accuracy } => {
            require_mechanic(actor)?;
            let mechanic =
                state
                    .broadcaster
                    .relay_location(&actor.id, GeoPoint::new(lat, lng), accuracy)?;
            if state.registry.following_area(session_id) {
                if let Some(location) = mechanic.location {
                    let cell = state.broadcaster.area_for(&location);
                    state.registry.switch_area(session_id, Some(cell));
                }
            }
        }
        ClientEvent::JoinMechanicArea {
            mechanic_id,
            location,
        } => {
            require_mechanic(actor)?;
            if mechanic_id != actor.id {
                return Err(AppError::Forbidden(
                    "mechanicId does not match this session".to_string(),
                ));
            }
            state.broadcaster.relay_location(&actor.id, location, None)?;
            let cell = state.broadcaster.area_for(&location);
            state.registry.switch_area(session_id, Some(cell));
        }
        ClientEvent::LeaveMechanicArea => {
            state.registry.switch_area(session_id, None);
        }
    }
    Ok(())
}

fn require_mechanic(actor: &Actor) -> Result<(), AppError> {
    if actor.role != Role::Mechanic {
        return Err(AppError::Forbidden(
            "only mechanics can share a location".to_string(),
        ));
    }
    Ok(())
}
