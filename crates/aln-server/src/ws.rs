//! GM WebSocket gateway (C9, spec.md §4.9). Grounded on the teacher's
//! paired send/receive task pattern in `relay-server/src/message_relay.rs`
//! (`tokio::select!` with abort-the-other-on-exit) and its handshake-first
//! connection setup in `relay-server/src/hand_shake.rs`, adapted from
//! postcard/binary framing to the JSON envelope this gateway uses.

use std::sync::Arc;

use aln_protocol::{
    ApiError, AuthHandshake, DeviceType, Envelope, ErrorCode, GmCommandAction, GmIdentify,
    ScanRequest, ServerEventData, SessionStatus,
};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

const OUTBOUND_BUFFER: usize = aln_core::broadcast::DEFAULT_OUTBOUND_BUFFER;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

struct Identity {
    device_id: String,
    device_type: DeviceType,
}

/// Reads frames until a valid `AuthHandshake` or legacy `GmIdentify` arrives,
/// or the socket closes first. Rejects anything else as a protocol error.
async fn authenticate(socket: &mut WebSocket, state: &AppState) -> Option<Identity> {
    loop {
        let Some(frame) = socket.next().await else {
            return None;
        };
        let Ok(Message::Text(text)) = frame else {
            if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                return None;
            }
            continue;
        };

        if let Ok(handshake) = serde_json::from_str::<AuthHandshake>(&text) {
            if state.admin_auth.is_valid(&handshake.token).await {
                return Some(Identity {
                    device_id: handshake.device_id,
                    device_type: handshake.device_type,
                });
            }
            let _ = send_raw(socket, auth_error_envelope()).await;
            let _ = socket.send(Message::Close(None)).await;
            return None;
        }

        if let Ok(identify) = serde_json::from_str::<GmIdentify>(&text) {
            if state.admin_auth.is_valid(&identify.token).await {
                return Some(Identity {
                    device_id: identify.device_id,
                    device_type: identify.device_type,
                });
            }
            let _ = send_raw(socket, auth_error_envelope()).await;
            let _ = socket.send(Message::Close(None)).await;
            return None;
        }

        tracing::warn!("unrecognized handshake frame, closing socket");
        let _ = send_raw(socket, auth_error_envelope()).await;
        let _ = socket.send(Message::Close(None)).await;
        return None;
    }
}

fn auth_error_envelope() -> Envelope {
    ServerEventData::Error(ApiError::new(ErrorCode::AuthRequired, "authentication failed"))
        .into_envelope()
}

async fn send_raw(socket: &mut WebSocket, envelope: Envelope) -> Result<(), axum::Error> {
    let text = serde_json::to_string(&envelope).expect("Envelope is always JSON-serializable");
    socket.send(Message::Text(text.into())).await
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let Some(identity) = authenticate(&mut socket, &state).await else {
        return;
    };
    let Identity {
        device_id,
        device_type,
    } = identity;

    let (outbound_tx, outbound_rx) = mpsc::channel::<Envelope>(OUTBOUND_BUFFER);
    state
        .broadcast
        .register(device_id.clone(), device_type, outbound_tx.clone())
        .await;
    state.devices.connect(device_id.clone(), device_type, None).await;
    state
        .broadcast
        .send_to(
            &device_id,
            ServerEventData::SyncFull(Box::new(state.projection.snapshot().await)).into_envelope(),
        )
        .await;
    let _ = state
        .events_tx
        .send(aln_core::DomainEvent::DeviceConnected {
            device_id: device_id.clone(),
            device_type,
        })
        .await;

    let (sink, stream) = socket.split();

    let mut send_task = tokio::spawn(send_loop(sink, outbound_rx));
    let mut recv_task = tokio::spawn(recv_loop(stream, state.clone(), device_id.clone(), device_type));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.broadcast.unregister(&device_id).await;
    state.devices.disconnect(&device_id).await;
    let _ = state
        .events_tx
        .send(aln_core::DomainEvent::DeviceDisconnected {
            device_id,
            device_type,
        })
        .await;
}

async fn send_loop(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Envelope>,
) {
    while let Some(envelope) = outbound_rx.recv().await {
        let text = serde_json::to_string(&envelope).expect("Envelope is always JSON-serializable");
        if sink.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }
}

async fn recv_loop(
    mut stream: futures_util::stream::SplitStream<WebSocket>,
    state: Arc<AppState>,
    device_id: String,
    device_type: DeviceType,
) {
    while let Some(frame) = stream.next().await {
        let Ok(Message::Text(text)) = frame else {
            if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                return;
            }
            continue;
        };
        state.devices.touch(&device_id).await;

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                reply_error(&state, &device_id, format!("malformed envelope: {e}")).await;
                continue;
            }
        };

        match envelope.event.as_str() {
            "transaction:submit" => handle_transaction_submit(&state, &device_id, envelope).await,
            "gm:command" => handle_gm_command(&state, &device_id, device_type, envelope).await,
            other => {
                reply_error(&state, &device_id, format!("unknown event {other}")).await;
            }
        }
    }
}

async fn reply_error(state: &AppState, device_id: &str, message: String) {
    let envelope = ServerEventData::Error(ApiError::new(ErrorCode::ValidationError, message)).into_envelope();
    state.broadcast.send_to(device_id, envelope).await;
}

async fn handle_transaction_submit(state: &AppState, device_id: &str, envelope: Envelope) {
    let scan: ScanRequest = match serde_json::from_value(envelope.data) {
        Ok(scan) => scan,
        Err(e) => {
            reply_error(state, device_id, format!("invalid transaction:submit payload: {e}")).await;
            return;
        }
    };
    let result = state.pipeline.submit(scan, false).await;
    let reply = ServerEventData::TransactionResult(result).into_envelope();
    state.broadcast.send_to(device_id, reply).await;
}

async fn ack(state: &AppState, device_id: &str, action: &str, success: bool, message: impl Into<String>) {
    let envelope = ServerEventData::GmCommandAck {
        action: action.to_string(),
        success,
        message: message.into(),
    }
    .into_envelope();
    state.broadcast.send_to(device_id, envelope).await;
}

async fn handle_gm_command(state: &AppState, device_id: &str, device_type: DeviceType, envelope: Envelope) {
    let action: GmCommandAction = match serde_json::from_value(envelope.data) {
        Ok(action) => action,
        Err(e) => {
            reply_error(state, device_id, format!("invalid gm:command payload: {e}")).await;
            return;
        }
    };
    let name = action.name();

    if !matches!(device_type, DeviceType::Gm | DeviceType::Admin) {
        ack(state, device_id, name, false, "only GM/admin devices may issue commands").await;
        return;
    }

    match action {
        GmCommandAction::SessionCreate { name: session_name, teams } => {
            match state.session_service.create_session(session_name, teams).await {
                Ok(session) => ack(state, device_id, "session:create", true, format!("session {} created", session.name)).await,
                Err(e) => ack(state, device_id, "session:create", false, e.to_string()).await,
            }
        }
        GmCommandAction::SessionPause => session_status(state, device_id, SessionStatus::Paused, "session:pause").await,
        GmCommandAction::SessionResume | GmCommandAction::SessionStart => {
            session_status(state, device_id, SessionStatus::Active, name).await
        }
        GmCommandAction::SessionEnd => session_status(state, device_id, SessionStatus::Ended, "session:end").await,
        GmCommandAction::VideoPlay => {
            match state.video_fsm.resume().await {
                Ok(()) => ack(state, device_id, "video:play", true, "playback resumed").await,
                Err(e) => ack(state, device_id, "video:play", false, e.to_string()).await,
            }
        }
        GmCommandAction::VideoPause => {
            match state.video_fsm.pause().await {
                Ok(()) => ack(state, device_id, "video:pause", true, "playback paused").await,
                Err(e) => ack(state, device_id, "video:pause", false, e.to_string()).await,
            }
        }
        GmCommandAction::VideoStop => {
            state.video_fsm.stop().await;
            ack(state, device_id, "video:stop", true, "playback stopped").await;
        }
        GmCommandAction::VideoSkip => {
            state.video_fsm.skip().await;
            ack(state, device_id, "video:skip", true, "skipped to next item").await;
        }
        GmCommandAction::VideoQueueAdd { filename } => {
            let (queued, reason, _wait) = state
                .video_fsm
                .enqueue(filename.clone(), filename, 0, true)
                .await;
            ack(
                state,
                device_id,
                "video:queue:add",
                queued,
                reason.unwrap_or_else(|| "queued".to_string()),
            )
            .await;
        }
        GmCommandAction::VideoQueueReorder { order } => {
            match state.video_fsm.reorder(order).await {
                Ok(()) => ack(state, device_id, "video:queue:reorder", true, "queue reordered").await,
                Err(e) => ack(state, device_id, "video:queue:reorder", false, e.to_string()).await,
            }
        }
        GmCommandAction::VideoQueueClear => {
            state.video_fsm.clear().await;
            ack(state, device_id, "video:queue:clear", true, "queue cleared").await;
        }
        GmCommandAction::ScoreAdjust { team_id, delta, reason } => {
            match state.session_service.adjust_score(&team_id, delta, reason, device_id.to_string()).await {
                Ok(score) => ack(state, device_id, "score:adjust", true, format!("{} now at {}", score.team_id, score.current_score)).await,
                Err(e) => ack(state, device_id, "score:adjust", false, e.to_string()).await,
            }
        }
        GmCommandAction::TransactionCreate(scan) => {
            let transaction = state.pipeline.admin_create_transaction(*scan).await;
            ack(state, device_id, "transaction:create", true, format!("transaction {} created", transaction.id.0)).await;
        }
        GmCommandAction::TransactionDelete { transaction_id } => {
            let deleted = state.pipeline.admin_delete_transaction(&transaction_id).await;
            ack(state, device_id, "transaction:delete", deleted, if deleted { "transaction deleted" } else { "transaction not found" }).await;
        }
        GmCommandAction::DisplayIdleLoop => {
            let mode = state.display.set_idle_loop().await;
            ack(state, device_id, "display:idle-loop", true, format!("display set to {mode}")).await;
        }
        GmCommandAction::DisplayScoreboard => {
            let mode = state.display.set_scoreboard().await;
            ack(state, device_id, "display:scoreboard", true, format!("display set to {mode}")).await;
        }
        GmCommandAction::DisplayToggle => {
            let mode = state.display.toggle().await;
            ack(state, device_id, "display:toggle", true, format!("display set to {mode}")).await;
        }
        GmCommandAction::DisplayStatus => {
            let mode = state.display.status().await;
            ack(state, device_id, "display:status", true, format!("display is {mode}")).await;
        }
        GmCommandAction::SystemReset => {
            state.session_service.reset().await;
            state.pipeline.reset().await;
            ack(state, device_id, "system:reset", true, "session, scores and transaction history reset").await;
        }
    }
}

async fn session_status(state: &AppState, device_id: &str, status: SessionStatus, action: &str) {
    match state.session_service.update_session(Some(status), None).await {
        Ok(session) => ack(state, device_id, action, true, format!("session now {:?}", session.status)).await,
        Err(e) => ack(state, device_id, action, false, e.to_string()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::log_capture::LogBuffer;
    use clap::Parser;

    async fn harness() -> (Arc<AppState>, mpsc::Receiver<Envelope>) {
        let mut dir = std::env::temp_dir();
        dir.push(format!("aln-ws-test-{}", uuid::Uuid::new_v4()));
        let config = Config::parse_from([
            "aln-orchestrator",
            "--admin-password",
            "secret",
            "--vlc-host",
            "127.0.0.1",
            "--vlc-port",
            "1",
            "--video-playback-enabled",
            "false",
            "--state-dir",
            dir.to_str().unwrap(),
            "--token-catalog-path",
            "does-not-exist.json",
        ]);
        let bootstrap = AppState::bootstrap(config, Arc::new(LogBuffer::new()))
            .await
            .unwrap();
        let state = bootstrap.state;
        let (tx, rx) = mpsc::channel(32);
        state.broadcast.register("gm-1".into(), DeviceType::Gm, tx).await;
        (state, rx)
    }

    #[tokio::test]
    async fn session_create_acks_success() {
        let (state, mut rx) = harness().await;
        handle_gm_command(
            &state,
            "gm-1",
            DeviceType::Gm,
            Envelope::new(
                "gm:command",
                serde_json::json!({
                    "action": "session:create",
                    "payload": {"name": "Test Run", "teams": ["001", "002"]}
                }),
            ),
        )
        .await;

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event, "gm:command:ack");
        assert!(envelope.data.get("success").unwrap().as_bool().unwrap());
        assert!(state.session_service.get_current_session().await.is_some());
    }

    #[tokio::test]
    async fn display_toggle_round_trips_through_ack_message() {
        let (state, mut rx) = harness().await;
        handle_gm_command(
            &state,
            "gm-1",
            DeviceType::Gm,
            Envelope::new("gm:command", serde_json::json!({"action": "display:toggle"})),
        )
        .await;
        let envelope = rx.recv().await.unwrap();
        let message = envelope.data.get("message").unwrap().as_str().unwrap();
        assert!(message.contains("scoreboard"));
    }

    #[tokio::test]
    async fn player_device_cannot_issue_commands() {
        let (state, mut rx) = harness().await;
        handle_gm_command(
            &state,
            "gm-1",
            DeviceType::Player,
            Envelope::new("gm:command", serde_json::json!({"action": "system:reset"})),
        )
        .await;
        let envelope = rx.recv().await.unwrap();
        assert!(!envelope.data.get("success").unwrap().as_bool().unwrap());
    }

    #[tokio::test]
    async fn transaction_submit_replies_with_result_privately() {
        let (state, mut rx) = harness().await;
        let payload = serde_json::json!({
            "tokenId": "unknown_token",
            "teamId": "001",
            "deviceId": "gm-1",
            "deviceType": "gm",
        });
        handle_transaction_submit(&state, "gm-1", Envelope::new("transaction:submit", payload)).await;
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event, "transaction:result");
    }
}
