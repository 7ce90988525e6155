// crates/kinoline-timeline/src/player.rs
//
// Observable playback state sitting on top of the composer. Grounded on
// `Timeline.cpp`'s `Private::tick` (playback/loop bookkeeping, frame-cache
// maintenance), re-expressed against this workspace's `ValueSubject` in
// place of the original's Qt-style signals.
//
// Single-threaded: `tick` and every setter run on whichever thread the host
// drives (typically a UI timer). The composer it owns gets its own
// background thread; the player's own state never crosses a thread boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};

use kinoline_core::image::Frame;
use kinoline_core::observer::{ListSubject, ValueSubject};
use kinoline_core::time::{clamp_time, loop_time, to_ranges, RationalTime, TimeRange};
use kinoline_core::timeline::Timeline;

use kinoline_io::ReaderRegistry;

use crate::composer::Composer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Playback {
    Stop,
    Forward,
    Reverse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loop {
    Loop,
    Once,
    PingPong,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameAction {
    Start,
    End,
    Prev,
    Next,
}

#[derive(Clone, Copy, Debug)]
pub struct PlayerConfig {
    pub frame_cache_read_ahead: i64,
    pub frame_cache_read_behind: i64,
    /// Bounds the composer worker's condvar wait, same role as
    /// `ReaderConfig::request_timeout` plays for reader workers.
    pub request_timeout: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { frame_cache_read_ahead: 48, frame_cache_read_behind: 12, request_timeout: Duration::from_millis(1) }
    }
}

/// Frames and pending requests are keyed by rounded frame index rather than
/// `RationalTime` itself — `RationalTime`'s epsilon equality doesn't give a
/// stable hash, and every time the player deals with is already at the
/// timeline's own rate.
fn frame_key(t: RationalTime) -> i64 {
    t.value.round() as i64
}

pub struct Player {
    timeline: Arc<Timeline>,
    composer: Composer,
    config: PlayerConfig,

    pub playback: ValueSubject<Playback>,
    pub loop_mode: ValueSubject<Loop>,
    pub current_time: ValueSubject<RationalTime>,
    pub in_out_range: ValueSubject<TimeRange>,
    pub frame: ValueSubject<Frame>,
    pub cached_frames: ListSubject<TimeRange>,

    start_wallclock: Instant,
    playback_start_time: RationalTime,
    /// Sign of the playback direction at the last Stop -> not-Stop
    /// transition; biases which side of `current_time` the frame cache
    /// treats as "ahead" (§4.5's "cache direction = sign of playback").
    cache_direction: i64,

    cache: HashMap<i64, Frame>,
    pending: HashMap<i64, Receiver<Frame>>,
}

impl Player {
    pub fn new(timeline: Arc<Timeline>, registry: Arc<ReaderRegistry>, config: PlayerConfig) -> Self {
        let composer = Composer::new(Arc::clone(&timeline), registry, config.request_timeout);
        let full_range = timeline.full_range();
        let start = timeline.global_start_time();

        Self {
            composer,
            playback: ValueSubject::new(Playback::Stop),
            loop_mode: ValueSubject::new(Loop::Loop),
            current_time: ValueSubject::new(start),
            in_out_range: ValueSubject::new(full_range),
            frame: ValueSubject::new(Frame::empty(start)),
            cached_frames: ListSubject::new(Vec::new()),
            start_wallclock: Instant::now(),
            playback_start_time: start,
            cache_direction: 1,
            cache: HashMap::new(),
            pending: HashMap::new(),
            timeline,
            config,
        }
    }

    pub fn rate(&self) -> f64 {
        self.timeline.rate()
    }

    /// Apply a playback state change, including the pre-seek and direction-
    /// flip rules §4.5 attaches to `Loop::Once` / `Loop::PingPong`.
    pub fn set_playback(&mut self, v: Playback) {
        let range = self.in_out_range.get();
        let end = range.end_time_inclusive();
        let prev = self.playback.get();
        let mut target = v;

        match (self.loop_mode.get(), v) {
            (Loop::Once, Playback::Forward) if self.current_time.get() == end => {
                self.seek(range.start_time);
            }
            (Loop::Once, Playback::Reverse) if self.current_time.get() == range.start_time => {
                self.seek(end);
            }
            (Loop::PingPong, Playback::Forward) if self.current_time.get() == end => {
                target = Playback::Reverse;
            }
            (Loop::PingPong, Playback::Reverse) if self.current_time.get() == range.start_time => {
                target = Playback::Forward;
            }
            _ => {}
        }

        if prev == Playback::Stop && target != Playback::Stop {
            self.start_wallclock = Instant::now();
            self.playback_start_time = self.current_time.get();
            self.cache_direction = if target == Playback::Reverse { -1 } else { 1 };
        }

        self.playback.set_if_changed(target);
    }

    /// Non-blocking; invoke at whatever rate the host's event loop ticks.
    pub fn tick(&mut self) {
        if self.playback.get() != Playback::Stop {
            let elapsed = self.start_wallclock.elapsed().as_secs_f64();
            let rate = self.rate();
            let delta_frames = (elapsed * rate).floor();
            let sign = if self.playback.get() == Playback::Reverse { -1.0 } else { 1.0 };
            let raw = RationalTime::new(self.playback_start_time.value + sign * delta_frames, self.playback_start_time.rate);
            let wrapped = self.apply_loop_semantics(raw);
            self.current_time.set_if_changed(wrapped);
        }

        self.frame_cache_update();

        let key = frame_key(self.current_time.get());
        let frame = self.cache.get(&key).cloned().unwrap_or_else(|| Frame::empty(self.current_time.get()));
        self.frame.set_if_changed(frame);
    }

    /// §4.5 loop semantics. May itself flip `playback` (PingPong) or stop it
    /// (Once); resets the wallclock anchors whenever a wrap occurs so the
    /// next tick's elapsed-time math starts fresh from the wrapped point.
    fn apply_loop_semantics(&mut self, t: RationalTime) -> RationalTime {
        let range = self.in_out_range.get();
        let a = range.start_time;
        let b = range.end_time_inclusive();

        match self.loop_mode.get() {
            Loop::Loop => {
                if t < a {
                    self.start_wallclock = Instant::now();
                    self.playback_start_time = b;
                    b
                } else if t > b {
                    self.start_wallclock = Instant::now();
                    self.playback_start_time = a;
                    a
                } else {
                    t
                }
            }
            Loop::Once => {
                let (clamped, was_clamped) = clamp_time(t, range);
                if was_clamped {
                    self.playback.set_if_changed(Playback::Stop);
                }
                clamped
            }
            Loop::PingPong => {
                if self.playback.get() == Playback::Reverse && t < a {
                    self.start_wallclock = Instant::now();
                    self.playback_start_time = a;
                    self.playback.set_if_changed(Playback::Forward);
                    self.cache_direction = 1;
                    a
                } else if self.playback.get() == Playback::Forward && t > b {
                    self.start_wallclock = Instant::now();
                    self.playback_start_time = b;
                    self.playback.set_if_changed(Playback::Reverse);
                    self.cache_direction = -1;
                    b
                } else {
                    t
                }
            }
        }
    }

    /// Step `frames` one-at-a-time in `cache_direction`'s sense (negative
    /// `frames` steps the opposite way), wrapping at `in_out_range` the same
    /// way the main tick does.
    fn step_frames(&self, mut t: RationalTime, frames: i64) -> RationalTime {
        let range = self.in_out_range.get();
        let per_frame = 1.0 / self.rate();
        let step = per_frame * self.cache_direction as f64 * frames.signum() as f64;
        for _ in 0..frames.abs() {
            t = RationalTime::new(t.value + step, t.rate);
            t = loop_time(t, range);
        }
        t
    }

    fn frame_cache_update(&mut self) {
        let t0 = self.current_time.get();
        let cache_start = self.step_frames(t0, -self.config.frame_cache_read_behind);

        let total = self.config.frame_cache_read_behind + self.config.frame_cache_read_ahead;
        let mut window = Vec::with_capacity(total as usize + 1);
        let mut cursor = cache_start;
        window.push(cursor);
        for _ in 0..total {
            cursor = self.step_frames(cursor, 1);
            window.push(cursor);
        }

        let active_ranges = to_ranges(window.clone());
        let keep: std::collections::HashSet<i64> = window.iter().map(|t| frame_key(*t)).collect();
        self.cache.retain(|k, _| keep.contains(k));

        for &t in &window {
            let key = frame_key(t);
            if !self.cache.contains_key(&key) && !self.pending.contains_key(&key) {
                self.pending.insert(key, self.composer.request_frame(t));
            }
        }

        let mut done = Vec::new();
        for (&key, rx) in self.pending.iter() {
            match rx.try_recv() {
                Ok(frame) => done.push((key, Some(frame))),
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!(key, "composer reply channel dropped before resolving, treating frame as empty");
                    done.push((key, None));
                }
                Err(TryRecvError::Empty) => {}
            }
        }
        for (key, frame) in done {
            self.pending.remove(&key);
            if let Some(frame) = frame {
                self.cache.insert(key, frame);
            }
        }

        self.composer.set_active_ranges(active_ranges);

        let cached_times: Vec<RationalTime> = self.cache.keys().map(|&k| RationalTime::new(k as f64, self.rate())).collect();
        self.cached_frames.set_if_changed(to_ranges(cached_times));
    }

    /// Loop-normalize `t` against the full timeline range, reset the
    /// wallclock anchors, and cancel in-flight composer requests. Cached
    /// frames are left in place — they're still valid at the new time.
    pub fn seek(&mut self, t: RationalTime) {
        let normalized = loop_time(t, self.timeline.full_range());
        if self.current_time.set_if_changed(normalized) {
            tracing::debug!(dropped = self.pending.len(), to = normalized.value, "seek, cancelling in-flight composer requests");
            self.start_wallclock = Instant::now();
            self.playback_start_time = normalized;
            self.composer.cancel_frames();
            self.pending.clear();
        }
    }

    /// Forces playback to Stop first, per §4.5.
    pub fn frame_action(&mut self, action: FrameAction) {
        self.set_playback(Playback::Stop);
        let range = self.in_out_range.get();
        let per_frame = RationalTime::new(1.0, self.rate());
        let target = match action {
            FrameAction::Start => range.start_time,
            FrameAction::End => range.end_time_inclusive(),
            FrameAction::Prev => self.current_time.get() - per_frame,
            FrameAction::Next => self.current_time.get() + per_frame,
        };
        self.seek(target);
    }

    pub fn set_in_point(&mut self) {
        let range = self.in_out_range.get();
        let updated = TimeRange::from_start_end_inclusive(self.current_time.get(), range.end_time_inclusive());
        self.in_out_range.set_if_changed(updated);
    }

    pub fn set_out_point(&mut self) {
        let range = self.in_out_range.get();
        let updated = TimeRange::from_start_end_inclusive(range.start_time, self.current_time.get());
        self.in_out_range.set_if_changed(updated);
    }

    pub fn reset_in_point(&mut self) {
        let range = self.in_out_range.get();
        let updated = TimeRange::from_start_end_inclusive(self.timeline.global_start_time(), range.end_time_inclusive());
        self.in_out_range.set_if_changed(updated);
    }

    pub fn reset_out_point(&mut self) {
        let range = self.in_out_range.get();
        let end = self.timeline.full_range().end_time_inclusive();
        let updated = TimeRange::from_start_end_inclusive(range.start_time, end);
        self.in_out_range.set_if_changed(updated);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.composer.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinoline_core::timeline::{Stack, Track, TrackKind};

    fn test_timeline() -> Arc<Timeline> {
        let rate = 24.0;
        let mut timeline = Timeline::new(RationalTime::new(240.0, rate));
        timeline.stack = Stack { tracks: vec![Track::new(TrackKind::Video)] };
        Arc::new(timeline)
    }

    fn test_player() -> Player {
        Player::new(test_timeline(), Arc::new(ReaderRegistry::new()), PlayerConfig::default())
    }

    #[test]
    fn seek_clears_pending_and_updates_current_time() {
        let mut player = test_player();
        player.seek(RationalTime::new(12.0, 24.0));
        assert_eq!(player.current_time.get(), RationalTime::new(12.0, 24.0));
        assert!(player.pending.is_empty());
    }

    #[test]
    fn frame_action_start_stops_playback_and_seeks_to_in_point() {
        let mut player = test_player();
        player.set_playback(Playback::Forward);
        player.seek(RationalTime::new(100.0, 24.0));
        player.frame_action(FrameAction::Start);
        assert_eq!(player.playback.get(), Playback::Stop);
        assert_eq!(player.current_time.get(), player.in_out_range.get().start_time);
    }

    #[test]
    fn once_clamps_and_stops_at_end() {
        let mut player = test_player();
        player.loop_mode.set_if_changed(Loop::Once);
        let end = player.in_out_range.get().end_time_inclusive();
        let past_end = RationalTime::new(end.value + 5.0, 24.0);
        let clamped = player.apply_loop_semantics(past_end);
        assert_eq!(clamped, end);
        assert_eq!(player.playback.get(), Playback::Stop);
    }

    #[test]
    fn ping_pong_flips_direction_at_bounds() {
        let mut player = test_player();
        player.loop_mode.set_if_changed(Loop::PingPong);
        player.set_playback(Playback::Forward);
        let end = player.in_out_range.get().end_time_inclusive();
        let past_end = RationalTime::new(end.value + 3.0, 24.0);
        let wrapped = player.apply_loop_semantics(past_end);
        assert_eq!(wrapped, end);
        assert_eq!(player.playback.get(), Playback::Reverse);
    }

    #[test]
    fn in_out_points_track_current_time() {
        let mut player = test_player();
        player.seek(RationalTime::new(20.0, 24.0));
        player.set_in_point();
        assert_eq!(player.in_out_range.get().start_time, RationalTime::new(20.0, 24.0));

        player.seek(RationalTime::new(100.0, 24.0));
        player.set_out_point();
        assert_eq!(player.in_out_range.get().end_time_inclusive(), RationalTime::new(100.0, 24.0));

        player.reset_in_point();
        player.reset_out_point();
        let full = player.timeline.full_range();
        assert_eq!(player.in_out_range.get().start_time, full.start_time);
        assert_eq!(player.in_out_range.get().end_time_inclusive(), full.end_time_inclusive());
    }

    #[test]
    fn tick_without_playback_leaves_current_time_unchanged() {
        let mut player = test_player();
        player.seek(RationalTime::new(50.0, 24.0));
        player.tick();
        assert_eq!(player.current_time.get(), RationalTime::new(50.0, 24.0));
    }
}
