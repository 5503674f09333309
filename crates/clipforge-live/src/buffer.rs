//! Bounded per-stream rolling event window.

use std::collections::VecDeque;

use metrics::counter;

use clipforge_models::SignalEvent;

/// Rolling window of recent events for one stream.
///
/// Two bounds apply: events older than `window_secs` behind the newest
/// stream timestamp are pruned, and the buffer never holds more than
/// `cap` events; when full, the oldest is dropped first. Arrival
/// outpacing consumption therefore costs old events, never memory.
#[derive(Debug)]
pub struct StreamWindow {
    events: VecDeque<SignalEvent>,
    window_secs: f64,
    cap: usize,
}

impl StreamWindow {
    pub fn new(window_secs: f64, cap: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(cap.min(64)),
            window_secs,
            cap,
        }
    }

    /// Append an event, enforcing both bounds.
    pub fn push(&mut self, event: SignalEvent) {
        if self.events.len() == self.cap {
            self.events.pop_front();
            counter!("live_events_dropped").increment(1);
        }
        self.events.push_back(event);
        self.prune();
    }

    fn prune(&mut self) {
        let Some(newest) = self.events.back().map(|e| e.stream_ts_secs) else {
            return;
        };
        let horizon = newest - self.window_secs;
        while let Some(front) = self.events.front() {
            if front.stream_ts_secs < horizon {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Events currently inside the window, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &SignalEvent> {
        self.events.iter()
    }

    /// Stream timestamp of the newest buffered event.
    pub fn latest_ts(&self) -> Option<f64> {
        self.events.back().map(|e| e.stream_ts_secs)
    }

    /// Span of the buffered window in stream seconds.
    pub fn span_secs(&self) -> f64 {
        match (self.events.front(), self.events.back()) {
            (Some(first), Some(last)) => (last.stream_ts_secs - first.stream_ts_secs).max(0.0),
            _ => 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::{SignalPayload, StreamId};

    fn event(ts: f64) -> SignalEvent {
        SignalEvent::new(StreamId::new("s1"), ts, SignalPayload::ChatMessage)
    }

    #[test]
    fn prunes_events_outside_time_window() {
        let mut w = StreamWindow::new(30.0, 100);
        w.push(event(0.0));
        w.push(event(10.0));
        w.push(event(45.0));
        // 0.0 is older than 45 - 30
        assert_eq!(w.len(), 2);
        assert_eq!(w.events().next().unwrap().stream_ts_secs, 10.0);
    }

    #[test]
    fn cap_drops_oldest_first() {
        let mut w = StreamWindow::new(1000.0, 3);
        for ts in [1.0, 2.0, 3.0, 4.0] {
            w.push(event(ts));
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.events().next().unwrap().stream_ts_secs, 2.0);
        assert_eq!(w.latest_ts(), Some(4.0));
    }

    #[test]
    fn span_tracks_buffered_range() {
        let mut w = StreamWindow::new(30.0, 100);
        assert_eq!(w.span_secs(), 0.0);
        w.push(event(10.0));
        w.push(event(22.5));
        assert!((w.span_secs() - 12.5).abs() < f64::EPSILON);
    }
}
