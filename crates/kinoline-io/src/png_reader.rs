// crates/kinoline-io/src/png_reader.rs
//
// Reference SequenceDecoder for `.png` frames. velocut-media only ever
// writes PNGs (`decode.rs::emit_frame`'s save_png path); here we read them
// back, using the same `png` crate the teacher already depends on.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use kinoline_core::image::{Channels, Endian, Image, ImageInfo, PixelType, SampleType};

use crate::sequence::SequenceDecoder;

pub struct PngDecoder;

fn png_color_type(channels: Channels) -> png::ColorType {
    match channels {
        Channels::L => png::ColorType::Grayscale,
        Channels::LA => png::ColorType::GrayscaleAlpha,
        Channels::Rgb => png::ColorType::Rgb,
        Channels::Rgba => png::ColorType::Rgba,
    }
}

impl SequenceDecoder for PngDecoder {
    fn decode(&self, path: &Path) -> Result<Image> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let decoder = png::Decoder::new(BufReader::new(file));
        let mut reader = decoder.read_info().context("reading PNG header")?;
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).context("decoding PNG frame")?;
        buf.truncate(info.buffer_size());

        let channels = match info.color_type {
            png::ColorType::Grayscale => Channels::L,
            png::ColorType::GrayscaleAlpha => Channels::LA,
            png::ColorType::Rgb => Channels::Rgb,
            png::ColorType::Rgba => Channels::Rgba,
            png::ColorType::Indexed => return Err(anyhow!("indexed PNGs are not supported")),
        };
        let sample = match info.bit_depth {
            png::BitDepth::Eight => SampleType::U8,
            png::BitDepth::Sixteen => SampleType::U16,
            other => return Err(anyhow!("unsupported PNG bit depth {other:?}")),
        };

        let image_info = ImageInfo::new(info.width, info.height, PixelType::Packed(channels, sample));
        Ok(Image::new(image_info, buf))
    }

    fn write_pixel_types(&self) -> Vec<PixelType> {
        [Channels::L, Channels::LA, Channels::Rgb, Channels::Rgba]
            .into_iter()
            .map(|c| PixelType::Packed(c, SampleType::U8))
            .collect()
    }

    fn write_alignment(&self, _pixel_type: PixelType) -> u8 {
        1
    }

    fn write_endian(&self) -> Endian {
        Endian::Little
    }

    /// `velocut-media::decode.rs::emit_frame`'s save_png path, read back
    /// through the same `png` crate rather than shelling out.
    fn encode(&self, path: &Path, image: &Image) -> Result<()> {
        let PixelType::Packed(channels, SampleType::U8) = image.info.pixel_type else {
            return Err(anyhow!("PngDecoder can only write 8-bit packed pixel types, got {:?}", image.info.pixel_type));
        };

        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), image.info.width, image.info.height);
        encoder.set_color(png_color_type(channels));
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().context("writing PNG header")?;
        writer.write_image_data(&image.data).context("writing PNG image data")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufWriter;

    fn write_rgba_png(path: &Path, width: u32, height: u32) {
        let file = File::create(path).unwrap();
        let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        let pixels = vec![128u8; (width * height * 4) as usize];
        writer.write_image_data(&pixels).unwrap();
    }

    #[test]
    fn decodes_rgba_png_into_matching_image_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        write_rgba_png(&path, 4, 3);

        let image = PngDecoder.decode(&path).unwrap();
        assert_eq!(image.info.width, 4);
        assert_eq!(image.info.height, 3);
        assert_eq!(image.info.pixel_type, PixelType::Packed(Channels::Rgba, SampleType::U8));
        assert_eq!(image.data.len(), 4 * 3 * 4);
    }

    #[test]
    fn missing_file_is_a_decode_error_not_a_panic() {
        let err = PngDecoder.decode(Path::new("/nonexistent/frame.png")).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn write_then_read_produces_an_image_with_equal_tags() {
        let info = ImageInfo::new(4, 3, PixelType::Packed(Channels::Rgba, SampleType::U8));
        assert!(PngDecoder.accepts_write(&info));

        let original = Image::new(info, vec![200u8; 4 * 3 * 4]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("written.png");

        PngDecoder.encode(&path, &original).unwrap();
        let roundtripped = PngDecoder.decode(&path).unwrap();

        assert_eq!(roundtripped.info, original.info);
        assert_eq!(roundtripped.data, original.data);
    }

    #[test]
    fn indexed_pixel_types_are_not_write_compatible() {
        let yuv = ImageInfo::new(4, 4, PixelType::Yuv420p);
        assert!(!PngDecoder.accepts_write(&yuv));
    }
}
