//! Coalescing of token-level fragments into paced display updates.

use tokio::time::Instant;

use crate::config::PacingConfig;
use crate::core::StreamDelta;

/// Buffers fragments and decides when a coalesced delta may be forwarded.
///
/// Time is passed in by the caller so the policy stays deterministic.
#[derive(Debug)]
pub(crate) struct Pacer {
    config: PacingConfig,
    buffer: String,
    buffered_chars: usize,
    last_forward: Instant,
    forwarded: usize,
    offset: usize,
}

impl Pacer {
    pub fn new(config: PacingConfig, now: Instant) -> Self {
        Self {
            config,
            buffer: String::new(),
            buffered_chars: 0,
            last_forward: now,
            forwarded: 0,
            offset: 0,
        }
    }

    /// Buffer `fragment`, returning a delta if the pacing policy allows one now.
    pub fn push(&mut self, fragment: &str, now: Instant) -> Option<StreamDelta> {
        self.buffer.push_str(fragment);
        self.buffered_chars += fragment.chars().count();

        let interval_elapsed =
            now.saturating_duration_since(self.last_forward) >= self.config.interval;
        if self.can_forward_early()
            && (self.buffered_chars >= self.config.min_chars || interval_elapsed)
        {
            return Some(self.take(now));
        }

        None
    }

    /// When buffered text becomes due for a time-slice flush, if ever.
    pub fn flush_due(&self) -> Option<Instant> {
        (!self.buffer.is_empty() && self.can_forward_early())
            .then(|| self.last_forward + self.config.interval)
    }

    /// Forward buffered text whose time slice has elapsed.
    pub fn tick(&mut self, now: Instant) -> Option<StreamDelta> {
        match self.flush_due() {
            Some(due) if now >= due => Some(self.take(now)),
            _ => None,
        }
    }

    /// Final flush at stream end or on error; ignores the interval and the cap.
    pub fn finish(&mut self, now: Instant) -> Option<StreamDelta> {
        (!self.buffer.is_empty()).then(|| self.take(now))
    }

    pub fn forwarded(&self) -> usize {
        self.forwarded
    }

    /// One slot stays reserved for the final flush.
    fn can_forward_early(&self) -> bool {
        self.forwarded + 1 < self.config.max_updates
    }

    fn take(&mut self, now: Instant) -> StreamDelta {
        let text = std::mem::take(&mut self.buffer);
        let delta = StreamDelta {
            sequence: self.forwarded as u64,
            offset: self.offset,
            text,
        };

        self.offset += delta.text.len();
        self.forwarded += 1;
        self.buffered_chars = 0;
        self.last_forward = now;

        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pacer(min_chars: usize, interval_ms: u64, max_updates: usize) -> (Pacer, Instant) {
        let start = Instant::now();
        let config = PacingConfig::new(min_chars, Duration::from_millis(interval_ms), max_updates);
        (Pacer::new(config, start), start)
    }

    #[test]
    fn test_small_fragments_are_coalesced_until_threshold() {
        let (mut pacer, start) = pacer(5, 10_000, 10);

        assert!(pacer.push("ab", start).is_none());
        assert!(pacer.push("cd", start).is_none());
        let delta = pacer.push("ef", start).expect("threshold reached");

        assert_eq!(delta.text, "abcdef");
        assert_eq!(delta.sequence, 0);
        assert_eq!(delta.offset, 0);
        assert!(pacer.finish(start).is_none());
    }

    #[test]
    fn test_interval_forwards_short_buffer() {
        let (mut pacer, start) = pacer(100, 500, 10);

        assert!(pacer.push("p", start).is_none());
        assert_eq!(pacer.flush_due(), Some(start + Duration::from_millis(500)));
        assert!(pacer.tick(start + Duration::from_millis(499)).is_none());

        let delta = pacer
            .tick(start + Duration::from_millis(500))
            .expect("time slice elapsed");
        assert_eq!(delta.text, "p");
        assert_eq!(pacer.flush_due(), None);
    }

    #[test]
    fn test_offsets_and_sequences_advance() {
        let (mut pacer, start) = pacer(2, 10_000, 10);

        let first = pacer.push("héllo", start).unwrap();
        let second = pacer.push("wörld", start).unwrap();

        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.offset, "héllo".len());
    }

    #[test]
    fn test_cap_reserves_final_flush() {
        let (mut pacer, start) = pacer(1, 0, 3);

        let mut forwarded = Vec::new();
        for fragment in ["a", "b", "c", "d", "e"] {
            forwarded.extend(pacer.push(fragment, start));
        }
        forwarded.extend(pacer.finish(start));

        assert_eq!(forwarded.len(), 3);
        let joined: String = forwarded.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(joined, "abcde");
        assert_eq!(forwarded.last().unwrap().text, "cde");
    }

    #[test]
    fn test_single_update_cap_only_flushes_at_end() {
        let (mut pacer, start) = pacer(1, 0, 1);

        assert!(pacer.push("p", start).is_none());
        assert!(pacer.push("on", start).is_none());
        assert_eq!(pacer.flush_due(), None);
        assert_eq!(pacer.finish(start).unwrap().text, "pon");
        assert_eq!(pacer.forwarded(), 1);
    }
}
