//! ICY metadata text extraction
//!
//! A metadata block reassembled by the demuxer is null-padded to a multiple
//! of 16 bytes and carries fields like `StreamTitle='Artist - Song';`. This
//! module turns such a block into displayable text.

/// Now-playing info published on the metadata channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl StreamMetadata {
    /// Split an ICY title on the first ` - ` separator:
    /// "Artist - Title" → artist + title, otherwise everything is the title.
    pub fn from_icy_title(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self {
                title: None,
                artist: None,
            };
        }
        match raw.find(" - ") {
            Some(pos) => {
                let artist = raw[..pos].trim();
                let title = raw[pos + 3..].trim();
                Self {
                    title: (!title.is_empty()).then(|| title.to_string()),
                    artist: (!artist.is_empty()).then(|| artist.to_string()),
                }
            }
            None => Self {
                title: Some(raw.to_string()),
                artist: None,
            },
        }
    }
}

/// Extract the `StreamTitle` value from a raw metadata block.
///
/// Strips the null padding, decodes lossily, then scans for
/// `StreamTitle='…';`. Returns `None` for empty or titleless blocks.
pub fn icy_title(block: &[u8]) -> Option<String> {
    let end = block.iter().rposition(|&b| b != 0).map(|p| p + 1)?;
    let text = String::from_utf8_lossy(&block[..end]);

    let start = text.find("StreamTitle='")? + "StreamTitle='".len();
    let len = text[start..].find("';")?;
    let title = text[start..start + len].trim();
    (!title.is_empty()).then(|| title.to_string())
}
