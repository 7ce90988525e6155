// crates/kinoline-timeline/src/lib.rs
//
// Frame composition and playback on top of kinoline-core's immutable
// timeline tree and kinoline-io's readers.

pub mod composer;
pub mod player;

pub use composer::Composer;
pub use player::{FrameAction, Loop, Player, PlayerConfig, Playback};
