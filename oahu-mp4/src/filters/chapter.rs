use super::{FrameEntry, FrameSink};
use crate::{Error, Result, chapters::ticks_to_duration};
use std::{sync::mpsc::Sender, time::Duration};

/// One chapter announced by a text track sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterBoundary {
    pub title: String,
    pub start: Duration,
    pub duration: Duration,
}

/// Terminal stage for chapter text tracks. Every sample becomes one
/// [`ChapterBoundary`] sent to the receiving end of the channel.
pub struct ChapterNotifier {
    sender: Sender<ChapterBoundary>,
    timescale: u32,
}

impl ChapterNotifier {
    pub fn new(sender: Sender<ChapterBoundary>, timescale: u32) -> Self {
        Self { sender, timescale }
    }
}

/// Reads a 3GPP timed text sample: a 16-bit length and that many bytes of
/// UTF-8 (or UTF-16 with a BOM), followed by optional modifier boxes.
fn sample_text(data: &[u8]) -> Result<String> {
    let [hi, lo, rest @ ..] = data else {
        return Err(Error::decode(0, "text sample shorter than its length field"));
    };

    let len = u16::from_be_bytes([*hi, *lo]) as usize;
    let text = rest.get(..len).ok_or_else(|| {
        Error::decode(
            2,
            format!("text sample declares {} bytes but holds {}", len, rest.len()),
        )
    })?;

    match text {
        [0xFE, 0xFF, utf16 @ ..] => {
            let units = utf16
                .chunks_exact(2)
                .map(|x| u16::from_be_bytes([x[0], x[1]]))
                .collect::<Vec<_>>();
            String::from_utf16(&units).map_err(|_| Error::decode(4, "invalid utf-16 chapter title"))
        }
        _ => Ok(String::from_utf8(text.to_vec())?),
    }
}

impl FrameSink for ChapterNotifier {
    fn name(&self) -> &'static str {
        "chapter-notifier"
    }

    fn add_input(&mut self, entry: FrameEntry) -> Result<()> {
        let chunk = entry.chunk.unwrap_or_default();
        let boundary = ChapterBoundary {
            title: sample_text(&entry.frame_data)?,
            start: ticks_to_duration(chunk.decode_time, self.timescale),
            duration: ticks_to_duration(chunk.duration as u64, self.timescale),
        };

        log::debug!(
            "chapter '{}' at {:?} for {:?}",
            boundary.title,
            boundary.start,
            boundary.duration
        );

        if self.sender.send(boundary).is_err() {
            log::debug!("chapter receiver dropped, boundary discarded");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{ChunkEntry, FrameEntry};
    use std::sync::mpsc;

    fn text_sample(title: &str) -> Vec<u8> {
        let mut data = (title.len() as u16).to_be_bytes().to_vec();
        data.extend(title.as_bytes());
        // encd modifier box
        data.extend([0, 0, 0, 12, b'e', b'n', b'c', b'd', 0, 0, 1, 0]);
        data
    }

    #[test]
    fn test_boundaries_sent() {
        let (tx, rx) = mpsc::channel();
        let mut notifier = ChapterNotifier::new(tx, 1000);

        for (i, title) in ["Prologue", "Chapter 1"].into_iter().enumerate() {
            let chunk = ChunkEntry {
                sample_index: i as u64,
                decode_time: i as u64 * 2500,
                duration: 2500,
                ..Default::default()
            };
            notifier
                .add_input(FrameEntry::new(chunk, 1, text_sample(title)))
                .unwrap();
        }
        drop(notifier);

        let boundaries = rx.iter().collect::<Vec<_>>();
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[1].title, "Chapter 1");
        assert_eq!(boundaries[1].start, Duration::from_millis(2500));
        assert_eq!(boundaries[1].duration, Duration::from_millis(2500));
    }

    #[test]
    fn test_truncated_sample() {
        assert!(sample_text(&[0, 9, b'a']).unwrap_err().is_decode_err());
    }
}
