//! HDMI display mode FSM, driven by the `display:*` `gm:command` actions
//! (spec.md §4.9 table). Presentation-only state: which screen a second
//! HDMI output shows. Not a domain service — no domain event exists for it
//! on the wire, so its current mode is only surfaced via the command ack.

use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    IdleLoop,
    Scoreboard,
}

impl DisplayMode {
    fn as_str(self) -> &'static str {
        match self {
            DisplayMode::IdleLoop => "idle-loop",
            DisplayMode::Scoreboard => "scoreboard",
        }
    }
}

pub struct DisplayFsm {
    mode: Mutex<DisplayMode>,
}

impl DisplayFsm {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(DisplayMode::IdleLoop),
        }
    }

    pub async fn set_idle_loop(&self) -> &'static str {
        *self.mode.lock().await = DisplayMode::IdleLoop;
        DisplayMode::IdleLoop.as_str()
    }

    pub async fn set_scoreboard(&self) -> &'static str {
        *self.mode.lock().await = DisplayMode::Scoreboard;
        DisplayMode::Scoreboard.as_str()
    }

    pub async fn toggle(&self) -> &'static str {
        let mut mode = self.mode.lock().await;
        *mode = match *mode {
            DisplayMode::IdleLoop => DisplayMode::Scoreboard,
            DisplayMode::Scoreboard => DisplayMode::IdleLoop,
        };
        mode.as_str()
    }

    pub async fn status(&self) -> &'static str {
        self.mode.lock().await.as_str()
    }
}

impl Default for DisplayFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn toggle_alternates_between_modes() {
        let fsm = DisplayFsm::new();
        assert_eq!(fsm.status().await, "idle-loop");
        assert_eq!(fsm.toggle().await, "scoreboard");
        assert_eq!(fsm.toggle().await, "idle-loop");
    }

    #[tokio::test]
    async fn set_scoreboard_then_idle_loop() {
        let fsm = DisplayFsm::new();
        fsm.set_scoreboard().await;
        assert_eq!(fsm.status().await, "scoreboard");
        fsm.set_idle_loop().await;
        assert_eq!(fsm.status().await, "idle-loop");
    }
}
