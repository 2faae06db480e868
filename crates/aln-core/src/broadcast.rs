//! Broadcast Fabric (C10, spec.md §4.10). The only place that knows wire
//! event names and field shapes: it subscribes to the single stream of
//! [`DomainEvent`]s produced by C4/C5/C6/C7 and fans each one out, in a
//! wrapped [`Envelope`], to the audience the wire table names. Nothing
//! upstream of this module ever touches a socket.
//!
//! Connection bookkeeping itself (who is a GM, who is an admin, the socket's
//! outbound task) lives in the gateway (C9, in `aln-server`); this module
//! only needs a place to drop an envelope per connected device, which is
//! why registration is a bounded per-device `mpsc::Sender<Envelope>` rather
//! than a socket handle. Grounded on the room/broadcast split in the
//! teacher's `relay-server/src/lobby.rs` (rooms as shared state) and
//! `message_relay.rs` (per-recipient send task that drops instead of
//! blocking a slow peer) — the teacher uses `tokio::sync::broadcast` with a
//! lagged-receiver error; spec.md §5 asks for drop-on-overflow with a fixed
//! per-socket bound instead, which `try_send` on a bounded `mpsc` gives
//! directly.

use std::collections::HashMap;
use std::sync::Arc;

use aln_protocol::{
    ApiError, DeviceEventPayload, DeviceId, DeviceType, Envelope, ErrorCode,
    OfflineQueueProcessedPayload, OfflineResultEntry, ServerEventData,
};
use tokio::sync::{mpsc, RwLock};

use crate::domain_event::DomainEvent;

/// Default bound for a connection's outbound envelope channel (spec.md §5).
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

struct Registration {
    device_type: DeviceType,
    sender: mpsc::Sender<Envelope>,
}

/// Tracks connected GM/admin sockets and routes translated domain events to
/// them. One instance per server process; `run` owns the domain event
/// receiver for the lifetime of the process.
#[derive(Default)]
pub struct BroadcastFabric {
    registry: RwLock<HashMap<DeviceId, Registration>>,
}

impl BroadcastFabric {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a connected GM/admin socket. The caller (C9) owns draining
    /// the other end of `sender` into the actual WebSocket write half.
    pub async fn register(&self, device_id: DeviceId, device_type: DeviceType, sender: mpsc::Sender<Envelope>) {
        self.registry
            .write()
            .await
            .insert(device_id, Registration { device_type, sender });
    }

    pub async fn unregister(&self, device_id: &str) {
        self.registry.write().await.remove(device_id);
    }

    /// Sends directly to one connection (`transaction:result`, `gm:command:ack`,
    /// and originator-scoped `error` replies — these are synchronous handler
    /// replies in C9, not domain events, so they bypass translation here).
    pub async fn send_to(&self, device_id: &str, envelope: Envelope) {
        let registry = self.registry.read().await;
        if let Some(reg) = registry.get(device_id) {
            if reg.sender.try_send(envelope).is_err() {
                tracing::warn!(device_id, "outbound buffer full, dropping event for socket");
            }
        }
    }

    /// Broadcasts to every connected GM/admin socket except `exclude` (used
    /// for `device:connected`, which the lifecycle describes as going to
    /// "all other GMs/admins").
    async fn broadcast_room(&self, envelope: Envelope, exclude: Option<&str>) {
        let registry = self.registry.read().await;
        for (device_id, reg) in registry.iter() {
            if exclude == Some(device_id.as_str()) {
                continue;
            }
            if !matches!(reg.device_type, DeviceType::Gm | DeviceType::Admin) {
                continue;
            }
            if reg.sender.try_send(envelope.clone()).is_err() {
                tracing::warn!(device_id, "outbound buffer full, dropping event for socket");
            }
        }
    }

    /// Drives the fabric: consumes domain events until the channel closes.
    /// Intended to be spawned once at startup.
    pub async fn run(self: Arc<Self>, mut events_rx: mpsc::Receiver<DomainEvent>) {
        while let Some(event) = events_rx.recv().await {
            let envelope = translate(event);
            self.broadcast_room(envelope, None).await;
        }
        tracing::info!("domain event channel closed, broadcast fabric shutting down");
    }
}

/// Translates a domain event into its wire envelope, per spec.md §4.10's
/// field-name discipline (`{groupId, bonus}` -> `{group, bonusPoints}`, raw
/// service errors -> `{code, message, details?}`).
fn translate(event: DomainEvent) -> Envelope {
    let data = match event {
        DomainEvent::SessionUpdated(session) => ServerEventData::SessionUpdate(session),
        DomainEvent::ScoreUpdated(score) => ServerEventData::ScoreUpdated(score),
        DomainEvent::GroupCompleted {
            group_id,
            bonus,
            team_id,
        } => ServerEventData::GroupCompleted {
            group: group_id,
            bonus_points: bonus,
            team_id,
        },
        DomainEvent::TransactionNew(transaction) => ServerEventData::TransactionNew(transaction),
        DomainEvent::PlayerScan(scan) => ServerEventData::PlayerScan(scan),
        DomainEvent::VideoStatus(status) => ServerEventData::VideoStatus(status.dto),
        DomainEvent::OfflineQueueProcessed { queue_size, results } => {
            ServerEventData::OfflineQueueProcessed(OfflineQueueProcessedPayload {
                queue_size,
                results: results
                    .into_iter()
                    .map(|r| OfflineResultEntry {
                        transaction_id: r.transaction_id,
                        status: r.status,
                        token_id: r.token_id,
                        error: r.error,
                    })
                    .collect(),
            })
        }
        DomainEvent::DeviceConnected { device_id, device_type } => {
            ServerEventData::DeviceConnected(DeviceEventPayload { device_id, device_type })
        }
        DomainEvent::DeviceDisconnected { device_id, device_type } => {
            ServerEventData::DeviceDisconnected(DeviceEventPayload { device_id, device_type })
        }
        DomainEvent::ServiceError { message, details } => {
            let mut error = ApiError::new(ErrorCode::InternalError, message);
            if let Some(details) = details {
                error = error.with_details(details);
            }
            ServerEventData::Error(error)
        }
    };
    data.into_envelope()
}
