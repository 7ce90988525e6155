// crates/kinoline-io/src/reader.rs
//
// The contract every reader implements, generalized from AVIO's IRead and
// FFmpegRead/SequenceIO's shared shape: open on a background thread, accept
// one video-frame request at a time per in-flight call, resolve a future
// rather than blocking the caller. The composer polls these futures from
// its own tick rather than waiting on them.

use std::collections::HashMap;
use std::time::Duration;

use kinoline_core::image::VideoFrame;
use kinoline_core::time::RationalTime;
use kinoline_core::{Error, ImageInfo};

/// String-keyed options passed to a reader at construction. Mirrors AVIO's
/// `Options` map — the only key readers in this crate recognize is
/// `DefaultSpeed`, which seeds the rate used to interpret plain-integer
/// sequence frame numbers.
pub type Options = HashMap<String, String>;

pub const DEFAULT_SPEED_KEY: &str = "DefaultSpeed";

/// Parsed once at construction so readers don't re-parse the map per frame.
/// `request_timeout` bounds every reader's condvar wait (`movie.rs`'s
/// `next_request`, `sequence.rs`'s `next_batch`); `sequence_thread_count`
/// bounds how many files a `SequenceReader` decodes concurrently per batch.
#[derive(Clone, Copy, Debug)]
pub struct ReaderConfig {
    pub default_speed: RationalTime,
    pub request_timeout: Duration,
    pub sequence_thread_count: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self { default_speed: RationalTime::new(1.0, 24.0), request_timeout: Duration::from_millis(1), sequence_thread_count: 4 }
    }
}

impl ReaderConfig {
    pub fn from_options(options: &Options) -> Self {
        let default_speed = options
            .get(DEFAULT_SPEED_KEY)
            .and_then(|s| s.parse().ok())
            .unwrap_or(RationalTime::new(1.0, 24.0));
        Self { default_speed, ..Self::default() }
    }
}

/// Static facts about a reader's media, resolved once after open.
#[derive(Clone, Copy, Debug)]
pub struct ReaderInfo {
    pub image_info: ImageInfo,
    pub video_duration: RationalTime,
}

/// A pending `read_video_frame` call. The background thread fulfills it
/// exactly once, with an empty frame if the reader stopped or the request
/// was cancelled before it ran.
pub struct FrameFuture {
    time: RationalTime,
    rx: crossbeam_channel::Receiver<VideoFrame>,
}

impl FrameFuture {
    pub fn new(time: RationalTime, rx: crossbeam_channel::Receiver<VideoFrame>) -> Self {
        Self { time, rx }
    }

    /// Non-blocking poll, used by the composer's tick loop.
    pub fn poll(&self) -> Option<VideoFrame> {
        self.rx.try_recv().ok()
    }

    /// Block until resolved. Used by tests and by callers outside the
    /// composer's own tick loop.
    pub fn wait(self) -> VideoFrame {
        self.rx.recv().unwrap_or_else(|_| VideoFrame::empty(self.time))
    }
}

/// One video-frame source. Implementors own a background thread that opens
/// the underlying media and serves `read_video_frame` requests in order.
pub trait Reader: Send + Sync {
    /// Block until the reader's info is known (or it failed to open).
    fn info(&self) -> Result<ReaderInfo, Error>;

    /// Request the frame at `time` (reader-native rate). Never blocks.
    fn read_video_frame(&self, time: RationalTime) -> FrameFuture;

    /// True while at least one request is queued or being served.
    fn has_video_frames(&self) -> bool;

    /// Drop all queued, not-yet-dispatched requests.
    fn cancel_video_frames(&self);

    /// Ask the background thread to exit. Idempotent.
    fn stop(&self);

    /// True once the background thread has actually exited.
    fn has_stopped(&self) -> bool;
}
