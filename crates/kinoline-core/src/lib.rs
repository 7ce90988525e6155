// crates/kinoline-core/src/lib.rs
//
// Pure data and tree types shared by the reader and player crates. No I/O,
// no threads — mirrors velocut-core's role as the plain-data crate the
// media and UI crates both depend on.

pub mod error;
pub mod image;
pub mod observer;
pub mod time;
pub mod timeline;

pub use error::Error;
pub use image::{Channels, Endian, Frame, FrameLayer, Image, ImageInfo, Layout, PixelType, SampleType, Transition, VideoFrame};
pub use observer::{ListSubject, Subscription, ValueSubject};
pub use time::{loop_time, clamp_time, to_ranges, RationalTime, TimeRange};
pub use timeline::{
    composed_time_scalar, Clip, ClipId, ClipPlacement, Effect, LinearTimeWarp, MediaReference,
    Stack, Timeline, Track, TrackItem, TrackKind, TransitionItem, TransitionKind,
};

pub type Result<T> = std::result::Result<T, Error>;
