// crates/kinoline-core/src/timeline/reference.rs
//
// What a Clip points at. Grounded on AVIO's extension-based dispatch
// (`System::getPlugin` picks a reader by file extension) and SequenceIO's
// filename synthesis (`path + baseName + zero-padded(number) + extension`) —
// `ImageSequence` here carries exactly the fields SequenceIO::Private parses
// out of a sample filename.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaReference {
    /// A single movie file, resolved and opened by extension.
    External { target_url: String },

    /// A numbered image sequence. `padding` is the zero-padded digit width
    /// inferred from the directory listing (0 means unpadded).
    ImageSequence {
        base: String,
        prefix: String,
        padding: u32,
        start_frame: i64,
        suffix: String,
    },

    /// A reference the parser could not resolve to a file on disk. Readers
    /// never see this; the composer synthesizes an empty frame for it.
    Missing,
}

impl MediaReference {
    /// The extension used for reader-plugin lookup, or `None` for
    /// `ImageSequence`/`Missing` references (the sequence reader base
    /// dispatches by `suffix` directly, not through the registry).
    pub fn extension(&self) -> Option<&str> {
        match self {
            MediaReference::External { target_url } => {
                target_url.rsplit('.').next().filter(|ext| *ext != *target_url)
            }
            MediaReference::ImageSequence { .. } | MediaReference::Missing => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercase_suffix() {
        let r = MediaReference::External { target_url: "clip.mov".into() };
        assert_eq!(r.extension(), Some("mov"));
    }

    #[test]
    fn extensionless_path_has_no_extension() {
        let r = MediaReference::External { target_url: "clip".into() };
        assert_eq!(r.extension(), None);
    }
}
