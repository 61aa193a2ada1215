//! Chapter series and the sources they are built from.

use crate::{
    Result,
    boxes::ChplBox,
    filters::ChapterBoundary,
    id3::Id3Chapter,
};
use serde::{Deserialize, Serialize};
use std::{sync::mpsc::Receiver, time::Duration};

/// Converts a count of `timescale` ticks to a duration.
pub fn ticks_to_duration(ticks: u64, timescale: u32) -> Duration {
    if timescale == 0 {
        return Duration::ZERO;
    }
    let nanos = ticks as u128 * 1_000_000_000 / timescale as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Named time range of the audio stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub start_offset: Duration,
    pub duration: Duration,
}

impl Chapter {
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.duration
    }
}

/// Ordered, append only chapter list. Each chapter starts where the previous
/// one ends, so chapters never overlap or leave gaps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChapterInfo {
    start_offset: Duration,
    chapters: Vec<Chapter>,
}

impl ChapterInfo {
    pub fn new(start_offset: Duration) -> Self {
        Self {
            start_offset,
            chapters: Vec::new(),
        }
    }

    pub fn add_chapter<T: Into<String>>(&mut self, title: T, duration: Duration) {
        let start_offset = self.chapters.last().map_or(self.start_offset, |x| x.end_offset());

        self.chapters.push(Chapter {
            title: title.into(),
            start_offset,
            duration,
        });
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn count(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn start_offset(&self) -> Duration {
        self.start_offset
    }

    pub fn end_offset(&self) -> Duration {
        self.chapters
            .iter()
            .map(|x| x.end_offset())
            .max()
            .unwrap_or(self.start_offset)
    }

    /// One chapter covering the whole track.
    pub fn single<T: Into<String>>(title: T, duration: Duration) -> Self {
        let mut info = Self::new(Duration::ZERO);
        info.add_chapter(title, duration);
        info
    }

    /// Builds the series from a Nero chapter list. The last chapter runs to
    /// `total`.
    pub fn from_chpl(chpl: &ChplBox, total: Duration) -> Self {
        let starts = chpl
            .entries
            .iter()
            .map(|x| x.start_time())
            .collect::<Vec<_>>();
        let mut info = Self::new(starts.first().copied().unwrap_or_default());

        for (i, entry) in chpl.entries.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(total);
            info.add_chapter(entry.title(), end.saturating_sub(starts[i]));
        }

        info
    }

    /// Builds the series from ID3 `CHAP` frames, ordered by start time.
    pub fn from_id3(chapters: &[Id3Chapter]) -> Self {
        let mut chapters = chapters.iter().collect::<Vec<_>>();
        chapters.sort_by_key(|x| x.start);

        let mut info = Self::new(chapters.first().map(|x| x.start).unwrap_or_default());
        for chapter in chapters {
            let title = chapter
                .title
                .clone()
                .unwrap_or_else(|| chapter.element_id.clone());
            info.add_chapter(title, chapter.end.saturating_sub(chapter.start));
        }

        info
    }

    /// Collects the boundaries reported by a chapter notifier stage.
    pub fn collect(receiver: Receiver<ChapterBoundary>) -> Self {
        let mut info: Option<Self> = None;

        for boundary in receiver.try_iter() {
            info.get_or_insert_with(|| Self::new(boundary.start))
                .add_chapter(boundary.title, boundary.duration);
        }

        info.unwrap_or_default()
    }

    /// Parses Audible content metadata. Accepts the full metadata document,
    /// an object with a `chapter_info` field, or the chapter info itself.
    /// Nested chapters are flattened and their titles joined with ": ".
    pub fn from_audible_json(json: &str) -> Result<Self> {
        let info = match serde_json::from_str::<AudibleDocument>(json)? {
            AudibleDocument::Metadata { content_metadata } => content_metadata.chapter_info,
            AudibleDocument::Wrapped { chapter_info } => chapter_info,
            AudibleDocument::Bare(x) => x,
        };

        let chapters = flatten(info.chapters, ": ");
        let mut series = Self::new(Duration::from_millis(
            chapters.first().map_or(0, |x| x.start_offset_ms.max(0) as u64),
        ));

        for chapter in chapters {
            series.add_chapter(
                chapter.title,
                Duration::from_millis(chapter.length_ms.max(0) as u64),
            );
        }

        Ok(series)
    }
}

impl<'a> IntoIterator for &'a ChapterInfo {
    type Item = &'a Chapter;
    type IntoIter = std::slice::Iter<'a, Chapter>;

    fn into_iter(self) -> Self::IntoIter {
        self.chapters.iter()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AudibleDocument {
    Metadata { content_metadata: AudibleMetadata },
    Wrapped { chapter_info: AudibleChapterInfo },
    Bare(AudibleChapterInfo),
}

#[derive(Debug, Deserialize)]
struct AudibleMetadata {
    chapter_info: AudibleChapterInfo,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AudibleChapterInfo {
    #[serde(rename = "brandIntroDurationMs", default)]
    pub brand_intro_duration_ms: i64,
    #[serde(rename = "brandOutroDurationMs", default)]
    pub brand_outro_duration_ms: i64,
    pub chapters: Vec<AudibleChapter>,
    #[serde(rename = "isAccurate", default)]
    pub is_accurate: bool,
    #[serde(rename = "runtimeLengthMs", default)]
    pub runtime_length_ms: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AudibleChapter {
    pub title: String,
    #[serde(default)]
    pub start_offset_ms: i64,
    #[serde(default)]
    pub start_offset_sec: i64,
    #[serde(default)]
    pub length_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<AudibleChapter>>,
}

/// Parents shorter than this are merged into their first child.
const SHORT_PARENT_MS: i64 = 10_000;

fn flatten(chapters: Vec<AudibleChapter>, separator: &str) -> Vec<AudibleChapter> {
    let mut result = Vec::new();

    for mut chapter in chapters {
        let Some(mut children) = chapter.chapters.take().filter(|x| !x.is_empty()) else {
            result.push(chapter);
            continue;
        };

        if chapter.length_ms < SHORT_PARENT_MS {
            children[0].start_offset_ms = chapter.start_offset_ms;
            children[0].start_offset_sec = chapter.start_offset_sec;
            children[0].length_ms += chapter.length_ms;
        } else {
            result.push(chapter.clone());
        }

        for mut child in flatten(children, separator) {
            child.title = format!("{}{}{}", chapter.title, separator, child.title);
            result.push(child);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::{ChplEntry, FullBoxHeader};
    use std::sync::mpsc;

    #[test]
    fn test_contiguous_chapters() {
        let mut info = ChapterInfo::new(Duration::from_secs(2));
        assert_eq!(info.end_offset(), Duration::from_secs(2));

        info.add_chapter("One", Duration::from_secs(10));
        info.add_chapter("Two", Duration::from_secs(5));
        info.add_chapter("Three", Duration::ZERO);

        let chapters = info.chapters();
        assert_eq!(chapters[0].start_offset, Duration::from_secs(2));
        assert_eq!(chapters[1].start_offset, chapters[0].end_offset());
        assert_eq!(chapters[2].start_offset, Duration::from_secs(17));
        assert_eq!(info.end_offset(), Duration::from_secs(17));
        assert_eq!(info.count(), 3);
    }

    #[test]
    fn test_from_chpl() {
        let chpl = ChplBox {
            full: FullBoxHeader::default(),
            reserved: None,
            entries: vec![
                ChplEntry {
                    start: 0,
                    title: b"Intro".to_vec(),
                },
                ChplEntry {
                    start: 15_000_000,
                    title: b"Body".to_vec(),
                },
            ],
        };

        let info = ChapterInfo::from_chpl(&chpl, Duration::from_secs(4));
        assert_eq!(info.chapters()[0].duration, Duration::from_millis(1500));
        assert_eq!(info.chapters()[1].title, "Body");
        assert_eq!(info.end_offset(), Duration::from_secs(4));
    }

    #[test]
    fn test_collect_boundaries() {
        let (tx, rx) = mpsc::channel();
        for (i, title) in ["A", "B"].into_iter().enumerate() {
            tx.send(ChapterBoundary {
                title: title.to_owned(),
                start: Duration::from_secs(i as u64 * 3),
                duration: Duration::from_secs(3),
            })
            .unwrap();
        }
        drop(tx);

        let info = ChapterInfo::collect(rx);
        assert_eq!(info.count(), 2);
        assert_eq!(info.end_offset(), Duration::from_secs(6));
    }

    #[test]
    fn test_audible_json_flattens() {
        let json = r#"{
            "chapter_info": {
                "brandIntroDurationMs": 2000,
                "brandOutroDurationMs": 5000,
                "isAccurate": true,
                "runtimeLengthMs": 125000,
                "chapters": [
                    { "title": "Opening Credits", "start_offset_ms": 0, "start_offset_sec": 0, "length_ms": 20000 },
                    { "title": "Part One", "start_offset_ms": 20000, "start_offset_sec": 20, "length_ms": 1000,
                      "chapters": [
                        { "title": "Chapter 1", "start_offset_ms": 21000, "start_offset_sec": 21, "length_ms": 60000 },
                        { "title": "Chapter 2", "start_offset_ms": 81000, "start_offset_sec": 81, "length_ms": 44000 }
                      ] }
                ]
            }
        }"#;

        let info = ChapterInfo::from_audible_json(json).unwrap();
        let titles = info.chapters().iter().map(|x| x.title.as_str()).collect::<Vec<_>>();

        assert_eq!(
            titles,
            vec!["Opening Credits", "Part One: Chapter 1", "Part One: Chapter 2"]
        );
        assert_eq!(info.chapters()[1].start_offset, Duration::from_secs(20));
        assert_eq!(info.chapters()[1].duration, Duration::from_secs(61));
        assert_eq!(info.end_offset(), Duration::from_secs(125));
    }
}
