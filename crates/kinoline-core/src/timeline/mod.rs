// crates/kinoline-core/src/timeline/mod.rs
//
// The immutable timeline tree consumed from the (out-of-scope) parser.
// Built once, never mutated — so clip identity is a plain integer handle
// (ClipId) assigned at construction, mirroring velocut-core::state's use of
// a plain Uuid as a TimelineClip's identity rather than pointer identity.
//
// Layout/neighbor queries here (`Track::layout`) are pure tree navigation —
// they're grounded on `Timeline.cpp`'s `trimmed_range_in_parent` /
// `neighbors_of` / `transformed_time`, kept in this crate because the
// composer (kinoline-timeline) needs them but they require no I/O.

mod reference;

pub use reference::MediaReference;

use serde::{Deserialize, Serialize};

use crate::time::{RationalTime, TimeRange};

/// Stable identity for a Clip, assigned once at tree-construction time and
/// never reused. Used to key reader workers in the composer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

/// The only per-clip effect this engine honors (§4.4: only clip-level time
/// warps are applied; nested warps in composition parents are a known,
/// preserved limitation — see DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearTimeWarp {
    pub time_scalar: f64,
}

impl Default for LinearTimeWarp {
    fn default() -> Self {
        Self { time_scalar: 1.0 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Effect {
    LinearTimeWarp(LinearTimeWarp),
}

/// A clip's composed time-warp, accumulated across all its effects (identity
/// if it has none). The source only ever applies one warp per clip in
/// practice, but we fold in case of several, matching `readVideoFrame`'s
/// `for (effect : clip->effects())` loop.
pub fn composed_time_scalar(clip: &Clip) -> f64 {
    clip.effects.iter().fold(1.0, |acc, e| match e {
        Effect::LinearTimeWarp(w) => acc * w.time_scalar,
    })
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub media_reference: MediaReference,
    /// Source-media range this clip samples. `start_time` is the offset
    /// into the media where sampling begins; `duration` is how long the
    /// clip occupies (both on the track's display rate).
    pub trimmed_range: TimeRange,
    pub effects: Vec<Effect>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum TransitionKind {
    None,
    Dissolve,
}

impl TransitionKind {
    pub fn from_type_name(name: &str) -> TransitionKind {
        if name == "SMPTE_Dissolve" { TransitionKind::Dissolve } else { TransitionKind::None }
    }
}

/// Sits between two adjacent clips in a track, overlapping the tail of the
/// first by `in_offset` and the head of the second by `out_offset`. Occupies
/// no duration of its own in the track's cursor.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TransitionItem {
    pub kind: TransitionKind,
    pub in_offset: RationalTime,
    pub out_offset: RationalTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TrackItem {
    Clip(Clip),
    Gap(TimeRange),
    Transition(TransitionItem),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub kind: TrackKind,
    pub items: Vec<TrackItem>,
}

impl Track {
    pub fn new(kind: TrackKind) -> Self {
        Self { kind, items: Vec::new() }
    }

    pub fn total_duration(&self, rate: f64) -> RationalTime {
        let mut total = 0.0;
        for item in &self.items {
            total += match item {
                TrackItem::Clip(c) => c.trimmed_range.duration.rescaled_to(rate).value,
                TrackItem::Gap(range) => range.duration.rescaled_to(rate).value,
                TrackItem::Transition(_) => 0.0,
            };
        }
        RationalTime::new(total, rate)
    }

    /// Walk the track, placing each Clip/Gap sequentially and recording the
    /// transitions (if any) immediately before/after each clip. Transitions
    /// occupy no cursor space — they overlap the surrounding clips.
    pub fn layout(&self, rate: f64) -> Vec<ClipPlacement<'_>> {
        let mut out = Vec::new();
        let mut cursor = RationalTime::new(0.0, rate);
        for (idx, item) in self.items.iter().enumerate() {
            match item {
                TrackItem::Clip(clip) => {
                    let duration = clip.trimmed_range.duration.rescaled_to(rate);
                    let range_in_parent = TimeRange::new(cursor, duration);
                    let prev_transition = self.transition_before(idx);
                    let next_transition = self.transition_after(idx);
                    out.push(ClipPlacement { clip, range_in_parent, prev_transition, next_transition });
                    cursor = cursor + duration;
                }
                TrackItem::Gap(range) => {
                    cursor = cursor + range.duration.rescaled_to(rate);
                }
                TrackItem::Transition(_) => {}
            }
        }
        out
    }

    fn transition_before(&self, clip_idx: usize) -> Option<&TransitionItem> {
        if clip_idx == 0 { return None; }
        match &self.items[clip_idx - 1] {
            TrackItem::Transition(t) => Some(t),
            _ => None,
        }
    }

    fn transition_after(&self, clip_idx: usize) -> Option<&TransitionItem> {
        match self.items.get(clip_idx + 1) {
            Some(TrackItem::Transition(t)) => Some(t),
            _ => None,
        }
    }

    /// The clip immediately across a given transition from `clip_idx`
    /// (the clip on the other side of the dissolve).
    pub fn clip_across(&self, clip_idx: usize, forward: bool) -> Option<&Clip> {
        let other_idx = if forward { clip_idx + 2 } else { clip_idx.checked_sub(2)? };
        match self.items.get(other_idx) {
            Some(TrackItem::Clip(c)) => Some(c),
            _ => None,
        }
    }
}

/// A clip positioned within its track, with neighbor transition context —
/// exactly what the composer needs per §4.4 step 2.
pub struct ClipPlacement<'a> {
    pub clip: &'a Clip,
    pub range_in_parent: TimeRange,
    pub prev_transition: Option<&'a TransitionItem>,
    pub next_transition: Option<&'a TransitionItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stack {
    pub tracks: Vec<Track>,
}

impl Stack {
    pub fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Timeline {
    pub global_start_time: Option<RationalTime>,
    pub duration: RationalTime,
    pub stack: Stack,
    next_clip_id: u32,
}

impl Timeline {
    pub fn new(duration: RationalTime) -> Self {
        Self { global_start_time: None, duration, stack: Stack::new(), next_clip_id: 0 }
    }

    pub fn global_start_time(&self) -> RationalTime {
        self.global_start_time.unwrap_or(RationalTime::new(0.0, self.duration.rate))
    }

    pub fn rate(&self) -> f64 {
        self.duration.rate
    }

    /// The inclusive full range of the timeline in global coordinates —
    /// the default `in_out_range` per §4.5's observable state table.
    pub fn full_range(&self) -> TimeRange {
        TimeRange::new(self.global_start_time(), self.duration)
    }

    /// Allocate the next ClipId. The parser-facing builder calls this once
    /// per clip so ids are stable for the tree's lifetime.
    pub fn next_clip_id(&mut self) -> ClipId {
        let id = ClipId(self.next_clip_id);
        self.next_clip_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::reference::MediaReference;

    fn clip(tl: &mut Timeline, duration: f64, rate: f64) -> Clip {
        Clip {
            id: tl.next_clip_id(),
            media_reference: MediaReference::External { target_url: "a.mov".into() },
            trimmed_range: TimeRange::new(RationalTime::new(0.0, rate), RationalTime::new(duration, rate)),
            effects: Vec::new(),
        }
    }

    #[test]
    fn track_layout_places_clips_sequentially() {
        let mut tl = Timeline::new(RationalTime::new(240.0, 24.0));
        let mut track = Track::new(TrackKind::Video);
        track.items.push(TrackItem::Clip(clip(&mut tl, 10.0, 24.0)));
        track.items.push(TrackItem::Clip(clip(&mut tl, 10.0, 24.0)));

        let layout = track.layout(24.0);
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].range_in_parent.start_time.value, 0.0);
        assert_eq!(layout[1].range_in_parent.start_time.value, 10.0);
    }

    #[test]
    fn transitions_do_not_advance_cursor() {
        let mut tl = Timeline::new(RationalTime::new(240.0, 24.0));
        let mut track = Track::new(TrackKind::Video);
        track.items.push(TrackItem::Clip(clip(&mut tl, 10.0, 24.0)));
        track.items.push(TrackItem::Transition(TransitionItem {
            kind: TransitionKind::Dissolve,
            in_offset: RationalTime::new(2.0, 24.0),
            out_offset: RationalTime::new(2.0, 24.0),
        }));
        track.items.push(TrackItem::Clip(clip(&mut tl, 10.0, 24.0)));

        let layout = track.layout(24.0);
        assert_eq!(layout[1].range_in_parent.start_time.value, 10.0);
        assert!(layout[0].next_transition.is_some());
        assert!(layout[1].prev_transition.is_some());
    }
}
