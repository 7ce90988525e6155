// crates/kinoline-timeline/src/composer.rs
//
// Frame composer: one background thread that drains a request queue and
// walks the flattened tree for each requested time. Grounded line-for-line
// on `Timeline.cpp`'s `Private::tick` (= frameRequests + stopReaders +
// delReaders), `Private::frameRequests` (per-track clip lookup, transition
// neighbor inspection), and `Private::readVideoFrame` (the clip→media time
// transform). The request-queue/condvar shape again follows the reader
// actors in `kinoline-io` — same `MediaWorker` idiom throughout this
// workspace.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use kinoline_core::image::{Frame, FrameLayer, Transition};
use kinoline_core::time::RationalTime;
use kinoline_core::timeline::{composed_time_scalar, Clip, ClipId, Timeline, TrackKind, TransitionItem};
use kinoline_core::TimeRange;

use kinoline_io::{FrameFuture, Options, Reader, ReaderRegistry};

struct ComposeRequest {
    time: RationalTime,
    reply: Sender<Frame>,
}

struct Shared {
    requests: Mutex<VecDeque<ComposeRequest>>,
    cv: Condvar,
    running: AtomicBool,
    /// Set by `cancel_frames`; the worker clears pending requests and calls
    /// `cancel_video_frames` on every open reader, since `readers` itself is
    /// only ever touched by the worker thread.
    cancel_requested: AtomicBool,
    /// Pushed by the player every `frame_cache_update`; drives reader
    /// lifecycle (`stopReaders`). Global coordinates.
    active_ranges: Mutex<Vec<TimeRange>>,
    /// `PlayerConfig::request_timeout`, bounding the worker's condvar wait.
    request_timeout: Duration,
}

/// Handle the player holds. Cloned cheaply; every clone talks to the same
/// background worker.
#[derive(Clone)]
pub struct Composer {
    shared: Arc<Shared>,
}

impl Composer {
    pub fn new(timeline: Arc<Timeline>, registry: Arc<ReaderRegistry>, request_timeout: Duration) -> Self {
        let shared = Arc::new(Shared {
            requests: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            running: AtomicBool::new(true),
            cancel_requested: AtomicBool::new(false),
            active_ranges: Mutex::new(Vec::new()),
            request_timeout,
        });

        let worker_shared = Arc::clone(&shared);
        thread::spawn(move || run(timeline, registry, worker_shared));

        Self { shared }
    }

    /// Request the composed frame at global time `t`. Never blocks.
    pub fn request_frame(&self, t: RationalTime) -> crossbeam_channel::Receiver<Frame> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut q = self.shared.requests.lock().unwrap();
        q.push_back(ComposeRequest { time: t, reply: tx });
        self.shared.cv.notify_one();
        rx
    }

    /// Clear pending requests and cancel every open reader's in-flight
    /// frames — used by the player's `seek`.
    pub fn cancel_frames(&self) {
        let mut q = self.shared.requests.lock().unwrap();
        q.clear();
        drop(q);
        self.shared.cancel_requested.store(true, Ordering::Relaxed);
        self.shared.cv.notify_one();
    }

    /// Publish the set of times the player wants kept warm. Drives which
    /// readers the worker keeps open.
    pub fn set_active_ranges(&self, ranges: Vec<TimeRange>) {
        *self.shared.active_ranges.lock().unwrap() = ranges;
    }

    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Relaxed);
        self.shared.cv.notify_all();
    }
}

/// A clip's position precomputed once at composer construction time — the
/// tree never mutates so this never goes stale. Stored per-track, in track
/// order, so transition neighbors are direct index lookups rather than a
/// range-based guess.
struct ClipEntry {
    clip: Clip,
    global_range: TimeRange,
    prev_transition: Option<TransitionItem>,
    next_transition: Option<TransitionItem>,
}

fn flatten_clip_entries(timeline: &Timeline) -> Vec<Vec<ClipEntry>> {
    let rate = timeline.rate();
    let start = timeline.global_start_time();
    timeline
        .stack
        .video_tracks()
        .map(|track| {
            track
                .layout(rate)
                .into_iter()
                .map(|placement| ClipEntry {
                    clip: placement.clip.clone(),
                    global_range: TimeRange::new(start + placement.range_in_parent.start_time, placement.range_in_parent.duration),
                    prev_transition: placement.prev_transition.copied(),
                    next_transition: placement.next_transition.copied(),
                })
                .collect()
        })
        .collect()
}

fn run(timeline: Arc<Timeline>, registry: Arc<ReaderRegistry>, shared: Arc<Shared>) {
    let entries = flatten_clip_entries(&timeline);

    let mut readers: HashMap<ClipId, Arc<dyn Reader>> = HashMap::new();
    let mut stopping: Vec<(ClipId, Arc<dyn Reader>)> = Vec::new();

    loop {
        if !shared.running.load(Ordering::Relaxed) {
            break;
        }

        if shared.cancel_requested.swap(false, Ordering::Relaxed) {
            for reader in readers.values() {
                reader.cancel_video_frames();
            }
        }

        if let Some(req) = pop_request(&shared) {
            let frame = compose(&timeline, &entries, &registry, &mut readers, req.time);
            let _ = req.reply.send(frame);
        }

        maintain_readers(&entries, &shared, &mut readers, &mut stopping);
    }

    for reader in readers.values() {
        reader.stop();
    }
    for reader in readers.values().chain(stopping.iter().map(|(_, r)| r)) {
        while !reader.has_stopped() {
            thread::sleep(shared.request_timeout);
        }
    }
}

fn pop_request(shared: &Arc<Shared>) -> Option<ComposeRequest> {
    let mut q = shared.requests.lock().unwrap();
    if let Some(req) = q.pop_front() {
        return Some(req);
    }
    let (mut q2, _timeout) = shared.cv.wait_timeout(q, shared.request_timeout).unwrap();
    q2.pop_front()
}

fn maintain_readers(
    entries: &[Vec<ClipEntry>],
    shared: &Arc<Shared>,
    readers: &mut HashMap<ClipId, Arc<dyn Reader>>,
    stopping: &mut Vec<(ClipId, Arc<dyn Reader>)>,
) {
    let active = shared.active_ranges.lock().unwrap().clone();

    let mut to_stop = Vec::new();
    for (&id, reader) in readers.iter() {
        let entry = entries.iter().flatten().find(|e| e.clip.id == id);
        let still_active = entry.map(|e| active.iter().any(|r| r.intersects(&e.global_range))).unwrap_or(false);
        if !still_active && !reader.has_video_frames() {
            reader.stop();
            to_stop.push(id);
        }
    }
    for id in to_stop {
        if let Some(reader) = readers.remove(&id) {
            stopping.push((id, reader));
        }
    }

    stopping.retain(|(id, reader)| {
        let stopped = reader.has_stopped();
        if stopped {
            tracing::debug!(clip_id = id.0, "reader stopped and dropped");
        }
        !stopped
    });
}

fn get_or_create_reader(
    clip: &Clip,
    registry: &ReaderRegistry,
    readers: &mut HashMap<ClipId, Arc<dyn Reader>>,
) -> Option<Arc<dyn Reader>> {
    if let Some(r) = readers.get(&clip.id) {
        return Some(Arc::clone(r));
    }
    match registry.open(&clip.media_reference, &Options::new()) {
        Ok(reader) => {
            readers.insert(clip.id, Arc::clone(&reader));
            Some(reader)
        }
        Err(e) => {
            tracing::warn!(clip_id = clip.id.0, error = %e, "failed to open reader for clip");
            None
        }
    }
}

/// `readVideoFrame`'s clip→media time transform: rescale `t_local` into the
/// clip's own coordinate frame, apply its accumulated time warp, then
/// rescale to the reader's native rate.
fn media_time(clip: &Clip, entry: &ClipEntry, t_local: RationalTime, media_rate: f64) -> RationalTime {
    let clip_start = clip.trimmed_range.start_time;
    let clip_local = clip_start + (t_local - entry.global_range.start_time);
    let scalar = composed_time_scalar(clip);
    let warped = clip_start + RationalTime::new(scalar * (clip_local - clip_start).value, clip_start.rate);
    warped.rescaled_to(media_rate).floor()
}

/// Dispatch, never wait. Mirrors `Private::readVideoFrame`'s clip→media time
/// transform, then hands back whatever future the reader gave us.
fn dispatch_clip_frame(
    clip: &Clip,
    entry: &ClipEntry,
    t_local: RationalTime,
    registry: &ReaderRegistry,
    readers: &mut HashMap<ClipId, Arc<dyn Reader>>,
) -> Option<FrameFuture> {
    let reader = get_or_create_reader(clip, registry, readers)?;
    let info = reader.info().ok()?;
    let t = media_time(clip, entry, t_local, info.video_duration.rate);
    Some(reader.read_video_frame(t))
}

/// One track's worth of in-flight reads for a single composed frame, not yet
/// awaited.
struct PendingLayer {
    future_a: Option<FrameFuture>,
    future_b: Option<FrameFuture>,
    transition: Transition,
    transition_value: f32,
}

/// `Private::frameRequests`: dispatch every track's `imageA`/`imageB` futures
/// in one pass, then await all of them in a second pass, so every reader's
/// background thread decodes concurrently instead of one clip at a time.
fn compose(
    timeline: &Timeline,
    entries: &[Vec<ClipEntry>],
    registry: &ReaderRegistry,
    readers: &mut HashMap<ClipId, Arc<dyn Reader>>,
    t: RationalTime,
) -> Frame {
    let t_local = t - timeline.global_start_time();
    let per_frame = RationalTime::new(1.0, timeline.rate());
    let mut pending = Vec::with_capacity(entries.len());

    for track in entries {
        let Some(clip_index) = track.iter().position(|e| e.global_range.contains(t_local)) else {
            continue;
        };
        let entry = &track[clip_index];

        let future_a = dispatch_clip_frame(&entry.clip, entry, t_local, registry, readers);
        let mut future_b = None;
        let mut transition = Transition::None;
        let mut transition_value = 0.0f32;

        if let Some(next) = entry.next_transition {
            let transition_start = entry.global_range.end_time_inclusive() - next.in_offset;
            if t_local > transition_start {
                if let Some(other) = track.get(clip_index + 1) {
                    future_b = dispatch_clip_frame(&other.clip, other, t_local, registry, readers);
                    transition = Transition::Dissolve;
                    let span = (next.in_offset + next.out_offset + per_frame).value;
                    transition_value = ((t_local - transition_start).value / span) as f32;
                }
            }
        } else if let Some(prev) = entry.prev_transition {
            let transition_end = entry.global_range.start_time + prev.out_offset;
            if t_local < transition_end {
                if let Some(other) = clip_index.checked_sub(1).and_then(|i| track.get(i)) {
                    future_b = dispatch_clip_frame(&other.clip, other, t_local, registry, readers);
                    transition = Transition::Dissolve;
                    let span = (prev.in_offset + prev.out_offset + per_frame).value;
                    let numerator = (t_local - entry.global_range.start_time + prev.in_offset + per_frame).value;
                    transition_value = (1.0 - numerator / span) as f32;
                }
            }
        }

        pending.push(PendingLayer { future_a, future_b, transition, transition_value });
    }

    let layers = pending
        .into_iter()
        .map(|p| {
            let image = p.future_a.and_then(|f| f.wait().image);
            let mut layer = FrameLayer::new(image);
            layer.image_b = p.future_b.and_then(|f| f.wait().image);
            layer.transition = p.transition;
            layer.transition_value = p.transition_value;
            layer
        })
        .collect();

    Frame { time: t, layers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinoline_core::timeline::{MediaReference, Stack, Track, TrackItem};

    fn clip(tl: &mut Timeline, duration: f64, rate: f64) -> Clip {
        Clip {
            id: tl.next_clip_id(),
            media_reference: MediaReference::Missing,
            trimmed_range: TimeRange::new(RationalTime::new(0.0, rate), RationalTime::new(duration, rate)),
            effects: Vec::new(),
        }
    }

    #[test]
    fn missing_reference_layer_has_no_image_and_no_panic() {
        let rate = 24.0;
        let mut timeline = Timeline::new(RationalTime::new(10.0, rate));
        let mut track = Track::new(TrackKind::Video);
        track.items.push(TrackItem::Clip(clip(&mut timeline, 10.0, rate)));
        timeline.stack = Stack { tracks: vec![track] };

        let registry = Arc::new(ReaderRegistry::new());
        let entries = flatten_clip_entries(&timeline);
        let mut readers = HashMap::new();
        let frame = compose(&timeline, &entries, &registry, &mut readers, RationalTime::new(5.0, rate));

        assert_eq!(frame.layers.len(), 1);
        assert!(frame.layers[0].image.is_none());
    }
}
