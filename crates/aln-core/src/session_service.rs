//! Session & Score Service (C4, spec.md §4.4). Owns the current session
//! and every team's score; the transaction pipeline (C5) calls into this
//! service to apply scoring effects but never mutates scores directly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use aln_protocol::{
    validate, AdminAdjustment, DeviceId, GroupId, MemoryType, Session, SessionId, SessionMetadata,
    SessionStatus, TeamId, TeamScore,
};
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use crate::catalog::TokenCatalog;
use crate::domain_event::DomainEvent;
use crate::error::{CoreError, CoreResult};
use crate::persistence::{Blob, PersistencePort, KEY_SCORES_CURRENT, KEY_SESSION_CURRENT};

struct State {
    session: Option<Session>,
    scores: BTreeMap<TeamId, TeamScore>,
}

/// Outcome of applying a scoring transaction's effect on a team.
pub struct ScoreEffect {
    pub points: i64,
    pub group_completed: Option<(GroupId, i64)>,
}

pub struct SessionService {
    state: Mutex<State>,
    catalog: Arc<TokenCatalog>,
    events_tx: mpsc::Sender<DomainEvent>,
    persistence: Option<Arc<dyn PersistencePort>>,
}

impl SessionService {
    pub fn new(catalog: Arc<TokenCatalog>, events_tx: mpsc::Sender<DomainEvent>) -> Self {
        Self {
            state: Mutex::new(State {
                session: None,
                scores: BTreeMap::new(),
            }),
            catalog,
            events_tx,
            persistence: None,
        }
    }

    /// `session:current`/`scores:current` are written under this service's
    /// own lock-free snapshot (spec.md §5: "never block on I/O while
    /// holding the state lock") after every mutation.
    pub fn with_persistence(
        catalog: Arc<TokenCatalog>,
        events_tx: mpsc::Sender<DomainEvent>,
        persistence: Arc<dyn PersistencePort>,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                session: None,
                scores: BTreeMap::new(),
            }),
            catalog,
            events_tx,
            persistence: Some(persistence),
        }
    }

    async fn persist(&self, session: &Option<Session>, scores: &BTreeMap<TeamId, TeamScore>) {
        let Some(store) = &self.persistence else {
            return;
        };
        if let Some(session) = session {
            if let Ok(blob) = Blob::new(session) {
                if let Err(e) = store.put(KEY_SESSION_CURRENT, blob).await {
                    tracing::warn!(error = %e, "failed to persist session");
                    self.emit_service_error("failed to persist session", &e).await;
                }
            }
        }
        let scores: Vec<_> = scores.values().cloned().collect();
        if let Ok(blob) = Blob::new(&scores) {
            if let Err(e) = store.put(KEY_SCORES_CURRENT, blob).await {
                tracing::warn!(error = %e, "failed to persist scores");
                self.emit_service_error("failed to persist scores", &e).await;
            }
        }
    }

    /// Broadcasts a `service:error` event (spec.md §7) so GMs see that a
    /// write they depend on (session/score persistence) silently failed,
    /// instead of it only surfacing in the server log.
    async fn emit_service_error(&self, message: &str, error: &CoreError) {
        let _ = self
            .events_tx
            .send(DomainEvent::ServiceError {
                message: message.to_string(),
                details: Some(serde_json::json!({ "error": error.to_string() })),
            })
            .await;
    }

    /// Restores a session and its scores from persistence (startup only;
    /// bypasses the normal create/update transitions and emits no events).
    pub async fn restore(&self, session: Option<Session>, scores: Vec<TeamScore>) {
        let mut state = self.state.lock().await;
        state.session = session;
        state.scores = scores.into_iter().map(|s| (s.team_id.clone(), s)).collect();
    }

    /// Creates a new session, implicitly ending whatever session is
    /// currently active or paused first (spec.md §3/§4.4: "a new session
    /// may be created and implicitly terminates the previous one").
    pub async fn create_session(&self, name: String, teams: Vec<TeamId>) -> CoreResult<Session> {
        if !validate::is_valid_session_name(&name) {
            return Err(CoreError::Validation("session name must be 1-100 chars".into()));
        }
        if teams.iter().any(|t| !validate::is_valid_team_id(t)) {
            return Err(CoreError::Validation("team ids must be non-empty".into()));
        }
        let now = Utc::now();
        let session = Session {
            id: SessionId::new(),
            name,
            start_time: now,
            end_time: None,
            status: SessionStatus::Active,
            teams: teams.iter().cloned().collect::<BTreeSet<_>>(),
            metadata: SessionMetadata::default(),
        };

        let mut state = self.state.lock().await;
        let ended_previous = state.session.as_mut().and_then(|previous| {
            if previous.status == SessionStatus::Ended {
                return None;
            }
            previous.status = SessionStatus::Ended;
            previous.end_time = Some(now);
            Some(previous.clone())
        });
        state.scores = teams
            .into_iter()
            .map(|t| (t.clone(), TeamScore::new(t, now)))
            .collect();
        state.session = Some(session.clone());
        let scores = state.scores.clone();
        drop(state);

        if let Some(previous) = ended_previous {
            let _ = self
                .events_tx
                .send(DomainEvent::SessionUpdated(previous))
                .await;
        }

        self.persist(&Some(session.clone()), &scores).await;
        let _ = self
            .events_tx
            .send(DomainEvent::SessionUpdated(session.clone()))
            .await;
        Ok(session)
    }

    pub async fn update_session(
        &self,
        new_status: Option<SessionStatus>,
        new_name: Option<String>,
    ) -> CoreResult<Session> {
        let mut state = self.state.lock().await;
        let session = state
            .session
            .as_mut()
            .ok_or_else(|| CoreError::NotFound("no active session".into()))?;

        if let Some(name) = new_name {
            if !validate::is_valid_session_name(&name) {
                return Err(CoreError::Validation("session name must be 1-100 chars".into()));
            }
            session.name = name;
        }

        if let Some(status) = new_status {
            let legal = matches!(
                (session.status, status),
                (SessionStatus::Active, SessionStatus::Paused)
                    | (SessionStatus::Paused, SessionStatus::Active)
                    | (SessionStatus::Active, SessionStatus::Ended)
                    | (SessionStatus::Paused, SessionStatus::Ended)
            );
            if session.status == SessionStatus::Ended && status == SessionStatus::Ended {
                // end() is idempotent once terminal.
            } else if !legal {
                return Err(CoreError::Validation(format!(
                    "illegal session transition {:?} -> {:?}",
                    session.status, status
                )));
            }
            session.status = status;
            if status == SessionStatus::Ended && session.end_time.is_none() {
                session.end_time = Some(Utc::now());
            }
        }

        let updated = session.clone();
        let scores = state.scores.clone();
        drop(state);

        self.persist(&Some(updated.clone()), &scores).await;
        let _ = self
            .events_tx
            .send(DomainEvent::SessionUpdated(updated.clone()))
            .await;
        Ok(updated)
    }

    pub async fn end_session(&self) -> CoreResult<Session> {
        self.update_session(Some(SessionStatus::Ended), None).await
    }

    pub async fn adjust_score(
        &self,
        team_id: &str,
        delta: i64,
        reason: String,
        gm_device_id: DeviceId,
    ) -> CoreResult<TeamScore> {
        let mut state = self.state.lock().await;
        let score = state
            .scores
            .get_mut(team_id)
            .ok_or_else(|| CoreError::NotFound(format!("unknown team {team_id}")))?;
        score.admin_adjustments.push(AdminAdjustment {
            delta,
            reason,
            timestamp: Utc::now(),
            gm_device_id,
        });
        score.recompute();
        score.last_update = Utc::now();
        let updated = score.clone();
        let session = state.session.clone();
        let scores = state.scores.clone();
        drop(state);

        self.persist(&session, &scores).await;
        let _ = self
            .events_tx
            .send(DomainEvent::ScoreUpdated(updated.clone()))
            .await;
        Ok(updated)
    }

    pub async fn is_active(&self) -> bool {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(Session::is_active)
            .unwrap_or(false)
    }

    /// `None` when a scan is free to score; `Some(message)` when the
    /// pipeline's session gate (spec.md §4.5 step 2) should reject it.
    pub async fn session_gate_message(&self) -> Option<String> {
        let state = self.state.lock().await;
        match &state.session {
            None => Some("No active session".to_string()),
            Some(s) if s.status != SessionStatus::Active => {
                Some("Session is paused".to_string())
            }
            Some(_) => None,
        }
    }

    /// Applies a blackmarket-mode scoring effect for an accepted transaction:
    /// adds `scoreFor(memoryType, valueRating)` to baseScore and increments
    /// `tokensScanned` (spec.md §4.4). Group-completion is a separate step
    /// via [`Self::complete_group_if_new`], since only C5 knows (from its
    /// own transaction history) whether a team now holds every token in a
    /// group.
    pub async fn apply_transaction_effect(
        &self,
        team_id: &str,
        memory_type: MemoryType,
        value_rating: u8,
    ) -> CoreResult<ScoreEffect> {
        let points = self.catalog.score_for(memory_type, value_rating).await;
        let mut state = self.state.lock().await;
        let score = state
            .scores
            .get_mut(team_id)
            .ok_or_else(|| CoreError::NotFound(format!("unknown team {team_id}")))?;
        score.base_score += points;
        score.tokens_scanned += 1;
        score.recompute();
        score.last_update = Utc::now();
        let updated = score.clone();
        let session = state.session.clone();
        let scores = state.scores.clone();
        drop(state);

        self.persist(&session, &scores).await;
        let _ = self
            .events_tx
            .send(DomainEvent::ScoreUpdated(updated))
            .await;

        Ok(ScoreEffect {
            points,
            group_completed: None,
        })
    }

    /// Marks a group completed for a team, awarding its bonus exactly once
    /// (spec.md §4.4). Called by C5 once it has established (via its own
    /// transaction history) that the team holds every token in the group.
    pub async fn complete_group_if_new(
        &self,
        team_id: &str,
        group_id: &str,
    ) -> CoreResult<Option<i64>> {
        let mut state = self.state.lock().await;
        let score = state
            .scores
            .get_mut(team_id)
            .ok_or_else(|| CoreError::NotFound(format!("unknown team {team_id}")))?;
        if score.completed_groups.contains(group_id) {
            return Ok(None);
        }
        let bonus = self.catalog.group_bonus(group_id).await;
        score.completed_groups.insert(group_id.to_string());
        score.bonus_points += bonus;
        score.recompute();
        score.last_update = Utc::now();
        let updated = score.clone();
        let session = state.session.clone();
        let scores = state.scores.clone();
        drop(state);

        self.persist(&session, &scores).await;
        let _ = self
            .events_tx
            .send(DomainEvent::ScoreUpdated(updated))
            .await;
        let _ = self
            .events_tx
            .send(DomainEvent::GroupCompleted {
                group_id: group_id.to_string(),
                bonus,
                team_id: team_id.to_string(),
            })
            .await;
        Ok(Some(bonus))
    }

    pub async fn get_current_session(&self) -> Option<Session> {
        self.state.lock().await.session.clone()
    }

    pub async fn get_team_scores(&self) -> Vec<TeamScore> {
        self.state.lock().await.scores.values().cloned().collect()
    }

    pub async fn get_team_score(&self, team_id: &str) -> Option<TeamScore> {
        self.state.lock().await.scores.get(team_id).cloned()
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.session = None;
        state.scores.clear();
    }
}
