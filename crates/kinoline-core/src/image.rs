// crates/kinoline-core/src/image.rs
//
// Plain data that flows between readers, the cache, and the composer. No
// ffmpeg, no GUI — just shapes and bytes, mirroring the split in
// velocut-core::media_types (types that cross the channel between the
// media worker and the UI) generalized to the reader/composer boundary here.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::time::RationalTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channels {
    L,
    LA,
    Rgb,
    Rgba,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    U8,
    U16,
    F16,
    F32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelType {
    Packed(Channels, SampleType),
    Yuv420p,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub alignment: u8,
    pub endian: Endian,
}

impl Default for Layout {
    fn default() -> Self {
        Self { alignment: 1, endian: Endian::Little }
    }
}

/// Width, height, pixel format, and byte layout of decoded image data.
/// Two `ImageInfo`s are equal iff all fields match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_type: PixelType,
    pub layout: Layout,
}

impl ImageInfo {
    pub fn new(width: u32, height: u32, pixel_type: PixelType) -> Self {
        Self { width, height, pixel_type, layout: Layout::default() }
    }

    /// Byte size of one plane-packed buffer matching this info. Used by
    /// readers to size output buffers and by tests to sanity-check decoders.
    pub fn byte_size(&self) -> usize {
        let pixels = self.width as usize * self.height as usize;
        match self.pixel_type {
            PixelType::Packed(channels, sample) => {
                let n_channels = match channels {
                    Channels::L => 1,
                    Channels::LA => 2,
                    Channels::Rgb => 3,
                    Channels::Rgba => 4,
                };
                let bytes_per_sample = match sample {
                    SampleType::U8 => 1,
                    SampleType::U16 => 2,
                    SampleType::F16 => 2,
                    SampleType::F32 => 4,
                };
                pixels * n_channels * bytes_per_sample
            }
            PixelType::Yuv420p => pixels + pixels / 2,
        }
    }
}

/// A decoded image: info + raw pixel bytes + string tags. Produced once by a
/// reader, then shared (never pixel-copied) by the cache and the composer.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub info: ImageInfo,
    pub data: Arc<Vec<u8>>,
    pub tags: HashMap<String, String>,
}

impl Image {
    pub fn new(info: ImageInfo, data: Vec<u8>) -> Self {
        Self { info, data: Arc::new(data), tags: HashMap::new() }
    }

    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = tags;
        self
    }
}

/// A frame as produced by a reader: (time, image). `None` image represents
/// the empty-frame sentinel returned on open/decode failure or cancellation.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoFrame {
    pub time: RationalTime,
    pub image: Option<Image>,
}

impl VideoFrame {
    pub fn empty(time: RationalTime) -> Self {
        Self { time, image: None }
    }
}

/// The only recognized transition kind besides a hard cut.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    None,
    Dissolve,
}

impl Transition {
    /// Map the timeline tree's transition type string. Only `SMPTE_Dissolve`
    /// is recognized; everything else degrades to `None`.
    pub fn from_type_name(name: &str) -> Transition {
        if name == "SMPTE_Dissolve" {
            Transition::Dissolve
        } else {
            Transition::None
        }
    }
}

/// One track's contribution to a composed Frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameLayer {
    pub image: Option<Image>,
    pub image_b: Option<Image>,
    pub transition: Transition,
    pub transition_value: f32,
}

impl FrameLayer {
    pub fn new(image: Option<Image>) -> Self {
        Self { image, image_b: None, transition: Transition::None, transition_value: 0.0 }
    }
}

/// The player-visible composited frame: all layers for one global time,
/// bottom-to-top.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub time: RationalTime,
    pub layers: Vec<FrameLayer>,
}

impl Frame {
    pub fn empty(time: RationalTime) -> Self {
        Self { time, layers: Vec::new() }
    }
}
