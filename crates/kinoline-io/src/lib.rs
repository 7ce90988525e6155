// crates/kinoline-io/src/lib.rs
//
// Reader plugins and their registry. Mirrors velocut-media's role as the
// crate that owns ffmpeg and background decode threads, kept separate from
// the pure tree/time types in kinoline-core.

pub mod movie;
pub mod png_reader;
pub mod reader;
pub mod registry;
pub mod sequence;

pub use movie::MovieReader;
pub use png_reader::PngDecoder;
pub use reader::{FrameFuture, Options, Reader, ReaderConfig, ReaderInfo, DEFAULT_SPEED_KEY};
pub use registry::ReaderRegistry;
pub use sequence::{SequenceDecoder, SequenceReader, SequenceSpec};
