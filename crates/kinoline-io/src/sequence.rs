// crates/kinoline-io/src/sequence.rs
//
// Reader for a numbered image sequence (one file per frame). Grounded on
// `SequenceIO.cpp`'s `ISequenceRead::Private`: a background thread drains up
// to `ReaderConfig::sequence_thread_count` requests per wake, dispatches one decode per
// file concurrently, then joins and fulfills them in request order; a
// size-1 cache (`videoFrameCache.setMax(1)`) absorbs the common case of the
// same frame being asked for twice in a row (a seek landing back where
// playback paused). The request-queue/condvar shape again follows
// `FFmpegRead::Private`, same as `movie.rs`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use kinoline_core::image::{Endian, Image, ImageInfo, PixelType, VideoFrame};
use kinoline_core::time::RationalTime;
use kinoline_core::Error;

use crate::reader::{FrameFuture, Options, Reader, ReaderConfig, ReaderInfo};

/// Per-format decode and encode, implemented once per supported image type.
/// The write side mirrors `AVIO::IPlugin`'s `write`/`writePixelTypes`/
/// `writeAlignment`/`writeEndian` — registry-level write compatibility is
/// checked against these, never hardcoded per caller.
pub trait SequenceDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> anyhow::Result<Image>;

    /// Pixel types this format's encoder accepts.
    fn write_pixel_types(&self) -> Vec<PixelType>;

    /// Row alignment this format's encoder writes at, for `pixel_type`.
    fn write_alignment(&self, pixel_type: PixelType) -> u8;

    /// Byte order this format's encoder writes samples in.
    fn write_endian(&self) -> Endian;

    /// Encode `image` to `path`. Callers should check `accepts_write` first;
    /// implementations are free to error instead of silently reformatting.
    fn encode(&self, path: &Path, image: &Image) -> anyhow::Result<()>;

    /// `pixel_type ∈ write_pixel_types()`, `layout.alignment ==
    /// write_alignment(pixel_type)`, `layout.endian == write_endian()`.
    fn accepts_write(&self, info: &ImageInfo) -> bool {
        self.write_pixel_types().contains(&info.pixel_type)
            && info.layout.alignment == self.write_alignment(info.pixel_type)
            && info.layout.endian == self.write_endian()
    }
}

struct Request {
    time: RationalTime,
    reply: Sender<VideoFrame>,
}

struct Shared {
    requests: Mutex<VecDeque<Request>>,
    cv: Condvar,
    running: AtomicBool,
    stopped: AtomicBool,
}

enum InfoState {
    Ready(ReaderInfo),
    Failed(String),
}

type InfoSlot = Arc<(Mutex<Option<InfoState>>, Condvar)>;

/// Fields parsed out of the reference per `file::split` in the original:
/// `base + prefix + zero-padded(number) + suffix`.
#[derive(Clone, Debug)]
pub struct SequenceSpec {
    pub base: String,
    pub prefix: String,
    pub padding: u32,
    pub start_frame: i64,
    pub suffix: String,
}

impl SequenceSpec {
    pub fn path_for(&self, frame: i64) -> PathBuf {
        let number = if self.padding > 0 {
            format!("{:0width$}", frame, width = self.padding as usize)
        } else {
            frame.to_string()
        };
        PathBuf::from(format!("{}{}{}{}", self.base, self.prefix, number, self.suffix))
    }
}

pub struct SequenceReader {
    shared: Arc<Shared>,
    info_slot: InfoSlot,
}

impl SequenceReader {
    pub fn open(spec: SequenceSpec, image_info_hint: ReaderInfo, decoder: Arc<dyn SequenceDecoder>, options: &Options) -> Self {
        let config = ReaderConfig::from_options(options);
        let shared = Arc::new(Shared {
            requests: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            running: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        });
        let info_slot: InfoSlot = Arc::new((Mutex::new(Some(InfoState::Ready(image_info_hint))), Condvar::new()));

        let thread_shared = Arc::clone(&shared);
        thread::spawn(move || run(spec, config, decoder, thread_shared));

        Self { shared, info_slot }
    }
}

impl Reader for SequenceReader {
    fn info(&self) -> Result<ReaderInfo, Error> {
        let (lock, _cvar) = &*self.info_slot;
        match lock.lock().unwrap().as_ref().unwrap() {
            InfoState::Ready(info) => Ok(*info),
            InfoState::Failed(reason) => Err(Error::Open { path: "sequence".into(), reason: reason.clone() }),
        }
    }

    fn read_video_frame(&self, time: RationalTime) -> FrameFuture {
        let (tx, rx) = crossbeam_channel::bounded(1);
        if self.shared.stopped.load(Ordering::Relaxed) {
            let _ = tx.send(VideoFrame::empty(time));
            return FrameFuture::new(time, rx);
        }
        let mut q = self.shared.requests.lock().unwrap();
        q.push_back(Request { time, reply: tx });
        self.shared.cv.notify_one();
        FrameFuture::new(time, rx)
    }

    fn has_video_frames(&self) -> bool {
        !self.shared.requests.lock().unwrap().is_empty()
    }

    fn cancel_video_frames(&self) {
        let mut q = self.shared.requests.lock().unwrap();
        for req in q.drain(..) {
            let _ = req.reply.send(VideoFrame::empty(req.time));
        }
    }

    fn stop(&self) {
        self.shared.running.store(false, Ordering::Relaxed);
        self.shared.cv.notify_all();
    }

    fn has_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Relaxed)
    }
}

fn run(spec: SequenceSpec, config: ReaderConfig, decoder: Arc<dyn SequenceDecoder>, shared: Arc<Shared>) {
    let mut cache: Option<(i64, Image)> = None;

    loop {
        let batch = match next_batch(&shared, config.sequence_thread_count, config.request_timeout) {
            Some(batch) => batch,
            None => break,
        };

        let mut handles = Vec::with_capacity(batch.len());
        for req in batch {
            let frame = spec.start_frame + req.time.rescaled_to(config.default_speed.rate).value.round() as i64;
            if let Some((cached_frame, image)) = &cache {
                if *cached_frame == frame {
                    let _ = req.reply.send(VideoFrame { time: req.time, image: Some(image.clone()) });
                    continue;
                }
            }
            let path = spec.path_for(frame);
            let decoder = Arc::clone(&decoder);
            handles.push((
                req,
                frame,
                thread::spawn(move || decoder.decode(&path)),
            ));
        }

        for (req, frame, handle) in handles {
            let image = match handle.join() {
                Ok(Ok(image)) => {
                    cache = Some((frame, image.clone()));
                    Some(image)
                }
                Ok(Err(reason)) => {
                    tracing::warn!(%reason, frame, "sequence frame decode failed");
                    None
                }
                Err(_) => None,
            };
            let _ = req.reply.send(VideoFrame { time: req.time, image });
        }
    }

    let mut q = shared.requests.lock().unwrap();
    for req in q.drain(..) {
        let _ = req.reply.send(VideoFrame::empty(req.time));
    }
    drop(q);
    shared.stopped.store(true, Ordering::Relaxed);
}

/// Drain up to `sequence_thread_count` pending requests at once so decode
/// for the batch can run concurrently instead of one file at a time.
fn next_batch(shared: &Arc<Shared>, sequence_thread_count: usize, request_timeout: Duration) -> Option<Vec<Request>> {
    let mut q = shared.requests.lock().unwrap();
    loop {
        if !q.is_empty() {
            let mut batch = Vec::new();
            while let Some(req) = q.pop_front() {
                batch.push(req);
                if batch.len() >= sequence_thread_count {
                    break;
                }
            }
            return Some(batch);
        }
        if !shared.running.load(Ordering::Relaxed) {
            return None;
        }
        let (guard, _timeout) = shared.cv.wait_timeout(q, request_timeout).unwrap();
        q = guard;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinoline_core::image::{Channels, ImageInfo, PixelType, SampleType};
    use std::sync::atomic::AtomicUsize;

    fn spec() -> SequenceSpec {
        SequenceSpec { base: "/frames/".into(), prefix: "shot.".into(), padding: 4, start_frame: 1, suffix: ".png".into() }
    }

    #[test]
    fn path_for_zero_pads_to_width() {
        let s = spec();
        assert_eq!(s.path_for(7), PathBuf::from("/frames/shot.0007.png"));
        assert_eq!(s.path_for(123), PathBuf::from("/frames/shot.0123.png"));
    }

    #[test]
    fn unpadded_spec_uses_bare_number() {
        let mut s = spec();
        s.padding = 0;
        assert_eq!(s.path_for(7), PathBuf::from("/frames/shot.7.png"));
    }

    struct CountingDecoder {
        calls: Arc<AtomicUsize>,
    }

    impl SequenceDecoder for CountingDecoder {
        fn decode(&self, _path: &Path) -> anyhow::Result<Image> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(Image::new(ImageInfo::new(4, 4, PixelType::Packed(Channels::Rgb, SampleType::U8)), vec![0u8; 48]))
        }

        fn write_pixel_types(&self) -> Vec<PixelType> {
            vec![PixelType::Packed(Channels::Rgb, SampleType::U8)]
        }

        fn write_alignment(&self, _pixel_type: PixelType) -> u8 {
            1
        }

        fn write_endian(&self) -> Endian {
            Endian::Little
        }

        fn encode(&self, _path: &Path, _image: &Image) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn repeated_request_for_same_frame_hits_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let decoder: Arc<dyn SequenceDecoder> = Arc::new(CountingDecoder { calls: Arc::clone(&calls) });
        let info = ReaderInfo {
            image_info: ImageInfo::new(4, 4, PixelType::Packed(Channels::Rgb, SampleType::U8)),
            video_duration: RationalTime::new(1000.0, 24.0),
        };
        let reader = SequenceReader::open(spec(), info, decoder, &Options::new());

        let f1 = reader.read_video_frame(RationalTime::new(0.0, 24.0)).wait();
        let f2 = reader.read_video_frame(RationalTime::new(0.0, 24.0)).wait();
        assert!(f1.image.is_some());
        assert!(f2.image.is_some());
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        reader.stop();
    }
}
