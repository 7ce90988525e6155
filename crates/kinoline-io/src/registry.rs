// crates/kinoline-io/src/registry.rs
//
// Extension-based reader dispatch, generalized from `AVIO::System::read()`:
// first matching plugin wins, and every reader is seeded with the same
// `DefaultSpeed` option (`RationalTime(1.0, 24.0)` in the original) unless
// the caller overrides it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kinoline_core::image::{Image, ImageInfo};
use kinoline_core::time::RationalTime;
use kinoline_core::timeline::MediaReference;
use kinoline_core::Error;

use crate::movie::MovieReader;
use crate::png_reader::PngDecoder;
use crate::reader::{Options, Reader, ReaderInfo, DEFAULT_SPEED_KEY};
use crate::sequence::{SequenceDecoder, SequenceReader, SequenceSpec};

const MOVIE_EXTENSIONS: &[&str] = &["mov", "mp4", "mkv", "avi", "webm"];

/// The one plugin resolution path, shared by read (`open`) and write
/// (`write`) — first, and only, match wins per extension.
fn decoder_for_suffix(suffix: &str) -> Option<Arc<dyn SequenceDecoder>> {
    match suffix.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "png" => Some(Arc::new(PngDecoder)),
        _ => None,
    }
}

pub struct ReaderRegistry {
    default_options: Options,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        let mut default_options = Options::new();
        default_options.insert(DEFAULT_SPEED_KEY.to_string(), RationalTime::new(1.0, 24.0).to_string());
        Self { default_options }
    }

    fn merged_options(&self, overrides: &Options) -> Options {
        let mut merged = self.default_options.clone();
        merged.extend(overrides.clone());
        merged
    }

    /// Open the reader for `reference`, or an error if the reference names
    /// an extension no plugin handles, or is itself unresolved.
    pub fn open(&self, reference: &MediaReference, overrides: &Options) -> Result<Arc<dyn Reader>, Error> {
        let options = self.merged_options(overrides);
        match reference {
            MediaReference::External { target_url } => {
                let ext = reference.extension().map(|e| e.to_ascii_lowercase());
                match ext.as_deref() {
                    Some(ext) if MOVIE_EXTENSIONS.contains(&ext) => {
                        Ok(Arc::new(MovieReader::open(PathBuf::from(target_url), &options)))
                    }
                    _ => Err(Error::Open {
                        path: target_url.clone(),
                        reason: "no reader plugin for this extension".into(),
                    }),
                }
            }
            MediaReference::ImageSequence { base, prefix, padding, start_frame, suffix } => {
                let decoder = decoder_for_suffix(suffix).ok_or_else(|| Error::Open {
                    path: format!("{base}{prefix}*{suffix}"),
                    reason: format!("no sequence decoder for {suffix}"),
                })?;
                let spec = SequenceSpec {
                    base: base.clone(),
                    prefix: prefix.clone(),
                    padding: *padding,
                    start_frame: *start_frame,
                    suffix: suffix.clone(),
                };
                let rate = options
                    .get(DEFAULT_SPEED_KEY)
                    .and_then(|s| s.parse::<RationalTime>().ok())
                    .map(|t| t.rate)
                    .unwrap_or(24.0);
                let first_frame = spec.path_for(spec.start_frame);
                let first_image = decoder.decode(&first_frame).map_err(|reason| Error::Open {
                    path: first_frame.display().to_string(),
                    reason: reason.to_string(),
                })?;
                // Sequences carry no total-length metadata of their own; the
                // timeline's own trimmed_range is what actually bounds playback.
                let info_hint = ReaderInfo {
                    image_info: ImageInfo::new(first_image.info.width, first_image.info.height, first_image.info.pixel_type),
                    video_duration: RationalTime::new(i32::MAX as f64, rate),
                };
                Ok(Arc::new(SequenceReader::open(spec, info_hint, decoder, &options)))
            }
            MediaReference::Missing => Err(Error::Open { path: "<missing>".into(), reason: "unresolved media reference".into() }),
        }
    }

    /// Write `image` to `path` through the plugin registered for its
    /// extension, after checking the write-compatibility contract
    /// (`SequenceDecoder::accepts_write`): `pixel_type ∈ write_pixel_types()`,
    /// `layout.alignment == write_alignment(pixel_type)`, `layout.endian ==
    /// write_endian()`.
    pub fn write(&self, path: &Path, image: &Image) -> Result<(), Error> {
        let suffix = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let decoder = decoder_for_suffix(suffix).ok_or_else(|| Error::Open {
            path: path.display().to_string(),
            reason: format!("no writer plugin for .{suffix}"),
        })?;
        if !decoder.accepts_write(&image.info) {
            return Err(Error::Open {
                path: path.display().to_string(),
                reason: format!("writer does not accept pixel type {:?} at the given layout", image.info.pixel_type),
            });
        }
        decoder.encode(path, image).map_err(|reason| Error::Open { path: path.display().to_string(), reason: reason.to_string() })
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_has_no_plugin() {
        let registry = ReaderRegistry::new();
        let reference = MediaReference::External { target_url: "clip.xyz".into() };
        let err = registry.open(&reference, &Options::new()).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn missing_reference_errors_without_touching_disk() {
        let registry = ReaderRegistry::new();
        let err = registry.open(&MediaReference::Missing, &Options::new()).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn write_then_open_a_sequence_produces_an_equal_first_image() {
        use kinoline_core::image::{Channels, PixelType, SampleType};

        let registry = ReaderRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        let info = ImageInfo::new(4, 3, PixelType::Packed(Channels::Rgb, SampleType::U8));
        let image = Image::new(info, vec![64u8; 4 * 3 * 3]);
        let path = dir.path().join("shot.0001.png");
        registry.write(&path, &image).unwrap();

        let reference = MediaReference::ImageSequence {
            base: format!("{}/", dir.path().display()),
            prefix: "shot.".into(),
            padding: 4,
            start_frame: 1,
            suffix: ".png".into(),
        };
        let reader = registry.open(&reference, &Options::new()).unwrap();
        let first = reader.read_video_frame(RationalTime::new(0.0, 24.0)).wait();
        assert_eq!(first.image.unwrap().info, image.info);
    }

    #[test]
    fn writer_rejects_an_unsupported_pixel_type() {
        use kinoline_core::image::PixelType;

        let registry = ReaderRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        let image = Image::new(ImageInfo::new(1, 1, PixelType::Yuv420p), vec![0u8; 2]);
        let err = registry.write(&dir.path().join("frame.png"), &image).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }
}
