//! Video Queue & Playback FSM (C6, spec.md §4.6).
//!
//! All transitions happen under one mutex, so the "no two transitions
//! interleave" ordering guarantee of spec.md §5 holds by construction —
//! this is the "plain mutex" strategy the spec calls acceptable, mirroring
//! the teacher's `Mutex<HashMap<String, Room>>` single-lock-per-resource
//! pattern in `lobby.rs`.

use std::collections::VecDeque;
use std::sync::Arc;

use aln_protocol::{TokenId, VideoItemId, VideoQueueItem, VideoState, VideoStatusDto};
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use crate::domain_event::DomainEvent;
use crate::error::{CoreError, CoreResult};
use crate::media_player::{MediaPlayerPort, PlayerState};

#[derive(Debug, Clone)]
pub struct VideoStatus {
    pub dto: VideoStatusDto,
    /// Set exactly once, the instant an item finishes (spec.md §4.6).
    pub just_completed: Option<VideoItemId>,
}

struct Inner {
    queue: VecDeque<VideoQueueItem>,
    current: Option<VideoQueueItem>,
}

impl Inner {
    fn queue_length(&self) -> u32 {
        self.queue.len() as u32
    }

    fn status_dto(&self) -> VideoStatusDto {
        match &self.current {
            Some(item) => VideoStatusDto {
                status: item.status,
                token_id: Some(item.token_id.clone()),
                duration_sec: Some(item.duration_sec),
                position_sec: None,
                queue_length: self.queue_length(),
            },
            None => VideoStatusDto {
                status: VideoState::Idle,
                token_id: None,
                duration_sec: None,
                position_sec: None,
                queue_length: self.queue_length(),
            },
        }
    }
}

pub struct VideoFsm<P: MediaPlayerPort> {
    inner: Mutex<Inner>,
    player: Arc<P>,
    events_tx: mpsc::Sender<DomainEvent>,
}

impl<P: MediaPlayerPort> VideoFsm<P> {
    pub fn new(player: Arc<P>, events_tx: mpsc::Sender<DomainEvent>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                current: None,
            }),
            player,
            events_tx,
        }
    }

    async fn emit_status(&self, inner: &Inner, just_completed: Option<VideoItemId>) {
        let status = VideoStatus {
            dto: inner.status_dto(),
            just_completed,
        };
        let _ = self.events_tx.send(DomainEvent::VideoStatus(status)).await;
    }

    /// `enqueue` — `from_gateway` allows building a queue while non-idle
    /// (GM gateway); HTTP ingest must pass `false` and gets `VIDEO_TAKEN`
    /// when the FSM isn't idle (spec.md §4.6).
    pub async fn enqueue(
        &self,
        token_id: TokenId,
        filename: String,
        duration_sec: u32,
        from_gateway: bool,
    ) -> (bool, Option<String>, Option<u32>) {
        let mut inner = self.inner.lock().await;
        let is_idle = inner.current.is_none();
        if !from_gateway && !is_idle {
            let wait = inner
                .current
                .as_ref()
                .map(|c| c.duration_sec)
                .unwrap_or(0);
            return (false, Some("Video already playing".to_string()), Some(wait.max(1)));
        }

        let item = VideoQueueItem {
            id: VideoItemId::new(),
            token_id,
            filename,
            duration_sec,
            enqueue_time: Utc::now(),
            start_time: None,
            status: VideoState::Loading,
            error: None,
        };

        if is_idle {
            let started = self.start_item(&mut inner, item, None).await;
            return (true, None, if started { None } else { Some("player unavailable".into()) });
        }

        inner.queue.push_back(item);
        self.emit_status(&inner, None).await;
        (true, None, None)
    }

    /// Installs `item` as current and drives it `Loading -> Playing`/`Error`,
    /// broadcasting a `video:status` event at each edge so GMs observe the
    /// full transition sequence rather than only the final state (spec.md
    /// §8 S4). `just_completed` is threaded through from [`Self::advance`]
    /// so the item that just finished is reported alongside the new one.
    async fn start_item(
        &self,
        inner: &mut Inner,
        mut item: VideoQueueItem,
        just_completed: Option<VideoItemId>,
    ) -> bool {
        item.status = VideoState::Loading;
        inner.current = Some(item);
        self.emit_status(inner, None).await;

        let filename = inner
            .current
            .as_ref()
            .expect("current was just set")
            .filename
            .clone();
        match self.player.play(&filename).await {
            Ok(()) => {
                if let Some(current) = inner.current.as_mut() {
                    current.status = VideoState::Playing;
                    current.start_time = Some(Utc::now());
                }
                self.emit_status(inner, just_completed).await;
                true
            }
            Err(e) => {
                if let Some(current) = inner.current.as_mut() {
                    current.status = VideoState::Error;
                    current.error = Some(e.to_string());
                }
                self.emit_status(inner, just_completed).await;
                false
            }
        }
    }

    /// Advances the FSM once the current item has finished (completed or
    /// errored): pulls the next queued item, or returns to the idle loop.
    pub async fn advance(&self, outcome: VideoState, error: Option<String>) {
        let mut inner = self.inner.lock().await;
        let completed_id = if let Some(mut item) = inner.current.take() {
            item.status = outcome;
            item.error = error;
            Some(item.id)
        } else {
            None
        };

        match inner.queue.pop_front() {
            Some(next) => {
                self.start_item(&mut inner, next, completed_id).await;
            }
            None => {
                let _ = self.player.return_to_idle_loop().await;
                self.emit_status(&inner, completed_id).await;
            }
        }
    }

    pub async fn skip(&self) {
        let _ = self.player.stop().await;
        self.advance(VideoState::Completed, None).await;
    }

    pub async fn pause(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(item) = inner.current.as_mut() else {
            return Err(CoreError::Conflict("no video is playing".into()));
        };
        if item.status != VideoState::Playing {
            return Err(CoreError::Conflict("video is not playing".into()));
        }
        self.player.pause().await?;
        item.status = VideoState::Paused;
        self.emit_status(&inner, None).await;
        Ok(())
    }

    pub async fn resume(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(item) = inner.current.as_mut() else {
            return Err(CoreError::Conflict("no video is paused".into()));
        };
        if item.status != VideoState::Paused {
            return Err(CoreError::Conflict("video is not paused".into()));
        }
        self.player.play(&item.filename.clone()).await?;
        item.status = VideoState::Playing;
        self.emit_status(&inner, None).await;
        Ok(())
    }

    pub async fn stop(&self) {
        let _ = self.player.stop().await;
        self.advance(VideoState::Completed, None).await;
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.queue.clear();
        self.emit_status(&inner, None).await;
    }

    pub async fn reorder(&self, new_order: Vec<String>) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        let mut by_filename: std::collections::HashMap<String, VideoQueueItem> = inner
            .queue
            .drain(..)
            .map(|item| (item.filename.clone(), item))
            .collect();
        let mut reordered = VecDeque::with_capacity(by_filename.len());
        for filename in &new_order {
            if let Some(item) = by_filename.remove(filename) {
                reordered.push_back(item);
            }
        }
        // Anything not named in new_order keeps its relative place at the end.
        for item in by_filename.into_values() {
            reordered.push_back(item);
        }
        inner.queue = reordered;
        self.emit_status(&inner, None).await;
        Ok(())
    }

    pub async fn status(&self) -> VideoStatusDto {
        self.inner.lock().await.status_dto()
    }

    pub async fn is_idle(&self) -> bool {
        self.inner.lock().await.current.is_none()
    }

    /// Whether the underlying media player is reachable right now. Used by
    /// the ingest path (C5) to decide whether a video-bearing player scan
    /// should be diverted to the offline queue instead of enqueued for
    /// immediate playback (spec.md §4.7).
    pub async fn player_connected(&self) -> bool {
        self.player.is_connected().await
    }

    /// Reacts to a media-player disconnect mid-playback: the current item
    /// goes to ERROR and the FSM immediately advances, pulling the next
    /// queued item (or returning to idle) so the queue resumes rather than
    /// wedging on the errored item forever.
    pub async fn on_player_disconnected(&self) {
        let has_current = self.inner.lock().await.current.is_some();
        if !has_current {
            return;
        }
        self.advance(VideoState::Error, Some("player disconnected".to_string()))
            .await;
    }

    /// Called by the C3 status-poll loop when it observes the player went
    /// playing -> stopped/ended, synthesizing a `completed` edge.
    pub async fn on_player_reported_state(&self, state: PlayerState) {
        let should_complete = {
            let inner = self.inner.lock().await;
            matches!(
                (&inner.current, state),
                (Some(item), PlayerState::Stopped) if item.status == VideoState::Playing
            )
        };
        if should_complete {
            self.advance(VideoState::Completed, None).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_player::PlayerStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakePlayer {
        play_calls: AtomicUsize,
        fail_next: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl MediaPlayerPort for FakePlayer {
        async fn init(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn is_connected(&self) -> bool {
            true
        }
        async fn play(&self, _filename: &str) -> CoreResult<()> {
            self.play_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(CoreError::MediaPlayer("forced failure".into()));
            }
            Ok(())
        }
        async fn pause(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn stop(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn status(&self) -> CoreResult<PlayerStatus> {
            unimplemented!()
        }
        async fn return_to_idle_loop(&self) -> CoreResult<()> {
            Ok(())
        }
    }

    fn fsm() -> (VideoFsm<FakePlayer>, mpsc::Receiver<DomainEvent>) {
        let (tx, rx) = mpsc::channel(32);
        let player = Arc::new(FakePlayer {
            play_calls: AtomicUsize::new(0),
            fail_next: std::sync::atomic::AtomicBool::new(false),
        });
        (VideoFsm::new(player, tx), rx)
    }

    #[tokio::test]
    async fn enqueue_from_idle_starts_playing_immediately() {
        let (fsm, _rx) = fsm();
        let (queued, reason, _wait) = fsm
            .enqueue("tok1".into(), "tok1.mp4".into(), 30, false)
            .await;
        assert!(queued);
        assert!(reason.is_none());
        let status = fsm.status().await;
        assert_eq!(status.status, VideoState::Playing);
    }

    #[tokio::test]
    async fn http_enqueue_while_playing_is_rejected() {
        let (fsm, _rx) = fsm();
        fsm.enqueue("tok1".into(), "tok1.mp4".into(), 30, false)
            .await;
        let (queued, reason, wait) = fsm
            .enqueue("tok2".into(), "tok2.mp4".into(), 20, false)
            .await;
        assert!(!queued);
        assert_eq!(reason.unwrap(), "Video already playing");
        assert!(wait.unwrap() > 0);
    }

    #[tokio::test]
    async fn gateway_enqueue_while_playing_builds_a_queue() {
        let (fsm, _rx) = fsm();
        fsm.enqueue("tok1".into(), "tok1.mp4".into(), 30, false)
            .await;
        let (queued, reason, _) = fsm
            .enqueue("tok2".into(), "tok2.mp4".into(), 20, true)
            .await;
        assert!(queued);
        assert!(reason.is_none());
        assert_eq!(fsm.status().await.queue_length, 1);
    }

    #[tokio::test]
    async fn advance_pulls_next_queued_item() {
        let (fsm, _rx) = fsm();
        fsm.enqueue("tok1".into(), "tok1.mp4".into(), 30, false)
            .await;
        fsm.enqueue("tok2".into(), "tok2.mp4".into(), 20, true)
            .await;
        fsm.advance(VideoState::Completed, None).await;
        let status = fsm.status().await;
        assert_eq!(status.status, VideoState::Playing);
        assert_eq!(status.token_id.unwrap(), "tok2");
        assert_eq!(status.queue_length, 0);
    }

    #[tokio::test]
    async fn advance_with_empty_queue_returns_to_idle() {
        let (fsm, _rx) = fsm();
        fsm.enqueue("tok1".into(), "tok1.mp4".into(), 30, false)
            .await;
        fsm.advance(VideoState::Completed, None).await;
        assert!(fsm.is_idle().await);
    }

    #[tokio::test]
    async fn enqueue_from_idle_broadcasts_loading_then_playing() {
        let (fsm, mut rx) = fsm();
        fsm.enqueue("tok1".into(), "tok1.mp4".into(), 30, false)
            .await;
        let loading = rx.recv().await.unwrap();
        match loading {
            DomainEvent::VideoStatus(s) => assert_eq!(s.dto.status, VideoState::Loading),
            other => panic!("expected VideoStatus, got {other:?}"),
        }
        let playing = rx.recv().await.unwrap();
        match playing {
            DomainEvent::VideoStatus(s) => assert_eq!(s.dto.status, VideoState::Playing),
            other => panic!("expected VideoStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn on_player_disconnected_advances_to_next_queued_item() {
        let (fsm, _rx) = fsm();
        fsm.enqueue("tok1".into(), "tok1.mp4".into(), 30, false)
            .await;
        fsm.enqueue("tok2".into(), "tok2.mp4".into(), 20, true)
            .await;
        fsm.on_player_disconnected().await;
        let status = fsm.status().await;
        assert_eq!(status.status, VideoState::Playing);
        assert_eq!(status.token_id.unwrap(), "tok2");
        assert!(!fsm.is_idle().await);
    }

    #[tokio::test]
    async fn on_player_disconnected_with_empty_queue_returns_to_idle() {
        let (fsm, _rx) = fsm();
        fsm.enqueue("tok1".into(), "tok1.mp4".into(), 30, false)
            .await;
        fsm.on_player_disconnected().await;
        assert!(fsm.is_idle().await);
    }

    #[tokio::test]
    async fn on_player_disconnected_while_idle_is_a_no_op() {
        let (fsm, mut rx) = fsm();
        fsm.on_player_disconnected().await;
        assert!(fsm.is_idle().await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reorder_respects_requested_order() {
        let (fsm, _rx) = fsm();
        fsm.enqueue("tok1".into(), "a.mp4".into(), 10, false).await;
        fsm.enqueue("tok2".into(), "b.mp4".into(), 10, true).await;
        fsm.enqueue("tok3".into(), "c.mp4".into(), 10, true).await;
        fsm.reorder(vec!["c.mp4".into(), "b.mp4".into()])
            .await
            .unwrap();
        assert_eq!(fsm.status().await.queue_length, 2);
    }
}
