//! In-memory ring buffer of recent log lines, exposed via `GET
//! /api/admin/logs` (spec.md §6). A `tracing_subscriber::Layer` alongside
//! the teacher's `fmt` layer in `relay-server/src/main.rs`, rather than a
//! replacement for it — stdout logging is unchanged.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const CAPACITY: usize = 2000;

pub struct LogBuffer {
    lines: Mutex<VecDeque<String>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(CAPACITY)),
        }
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() >= CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Returns the last `n` lines, optionally filtered to `level` (case
    /// insensitive substring match on the rendered line).
    pub fn recent(&self, n: usize, level: Option<&str>) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let filtered: Vec<&String> = match level {
            Some(level) => lines
                .iter()
                .filter(|line| line.to_lowercase().contains(&level.to_lowercase()))
                .collect(),
            None => lines.iter().collect(),
        };
        filtered
            .into_iter()
            .rev()
            .take(n)
            .rev()
            .cloned()
            .collect()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for LogBuffer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        let line = format!(
            "{} {} {}",
            chrono::Utc::now().to_rfc3339(),
            event.metadata().level(),
            visitor.0
        );
        self.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_returns_last_n_in_order() {
        let buffer = LogBuffer::new();
        for i in 0..5 {
            buffer.push(format!("line {i}"));
        }
        let recent = buffer.recent(3, None);
        assert_eq!(recent, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn recent_filters_by_level_substring() {
        let buffer = LogBuffer::new();
        buffer.push("2024 WARN something".into());
        buffer.push("2024 INFO something else".into());
        let recent = buffer.recent(10, Some("warn"));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        let buffer = LogBuffer::new();
        for i in 0..(CAPACITY + 10) {
            buffer.push(format!("line {i}"));
        }
        let recent = buffer.recent(1, None);
        assert_eq!(recent[0], format!("line {}", CAPACITY + 9));
    }
}
