use super::{FrameEntry, FrameSink};
use crate::{
    Error, Result,
    chapters::{Chapter, ChapterInfo},
    descriptors::AudioSpecificConfig,
};
use std::{io::Write, time::Duration};

/// Per-chapter output slot handed to the caller when a chapter starts.
///
/// The caller may fill in the track numbering and must assign `output` for
/// the chapter to be written. The output is flushed and dropped when the
/// chapter ends.
pub struct SplitCallback {
    pub chapter: Chapter,
    pub track_number: Option<u32>,
    pub track_count: Option<u32>,
    pub track_title: Option<String>,
    pub output: Option<Box<dyn Write + Send>>,
}

impl SplitCallback {
    fn new(chapter: Chapter) -> Self {
        Self {
            chapter,
            track_number: None,
            track_count: None,
            track_title: None,
            output: None,
        }
    }
}

/// 7 byte ADTS header without CRC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdtsHeader {
    profile: u8,
    frequency_index: u8,
    channel_configuration: u8,
}

impl AdtsHeader {
    pub const SIZE: usize = 7;
    const MAX_FRAME_LENGTH: usize = (1 << 13) - 1;

    pub fn new(config: &AudioSpecificConfig) -> Result<Self> {
        if !(1..=4).contains(&config.object_type) {
            return Err(Error::unsupported(format!(
                "ADTS cannot carry audio object type {}",
                config.object_type
            )));
        }
        if config.sampling_frequency_index > 12 {
            return Err(Error::unsupported(format!(
                "ADTS cannot carry an explicit sampling frequency of {} Hz",
                config.sampling_frequency
            )));
        }

        Ok(Self {
            profile: config.object_type - 1,
            frequency_index: config.sampling_frequency_index,
            channel_configuration: config.channel_configuration & 0x07,
        })
    }

    pub fn to_bytes(&self, payload: usize) -> Result<[u8; Self::SIZE]> {
        let len = payload + Self::SIZE;
        if len > Self::MAX_FRAME_LENGTH {
            return Err(Error::invalid_input(format!(
                "{} byte frame does not fit an ADTS header",
                payload
            )));
        }

        Ok([
            0xFF,
            0xF1,
            (self.profile & 0x03) << 6
                | (self.frequency_index & 0x0F) << 2
                | (self.channel_configuration >> 2) & 0x01,
            (self.channel_configuration & 0x03) << 6 | ((len >> 11) & 0x03) as u8,
            ((len >> 3) & 0xFF) as u8,
            ((len & 0x07) as u8) << 5 | 0x1F,
            0xFC,
        ])
    }
}

type Callback<'a> = Box<dyn FnMut(&mut SplitCallback) -> Result<()> + Send + 'a>;

/// Terminal stage that writes decrypted audio frames into one output per
/// chapter.
///
/// Chapter membership is decided on the running sample count, so boundaries
/// never drift from rounding. Frames before the first chapter are dropped,
/// frames after the last chapter go to the last chapter.
pub struct ChapterSplitter<'a> {
    /// Chapter start in ticks, with the chapter.
    chapters: Vec<(u64, Chapter)>,
    adts: Option<AdtsHeader>,
    callback: Callback<'a>,
    current: Option<(usize, SplitCallback)>,
    position: u64,
    written: Vec<usize>,
}

fn to_ticks(offset: Duration, timescale: u32) -> u64 {
    (offset.as_nanos() * timescale as u128 / 1_000_000_000) as u64
}

impl<'a> ChapterSplitter<'a> {
    /// `timescale` is the rate of the `samples_in_frame` counts, the audio
    /// sample rate for AAC.
    pub fn new<F>(
        chapters: &ChapterInfo,
        timescale: u32,
        adts: Option<AdtsHeader>,
        callback: F,
    ) -> Self
    where
        F: FnMut(&mut SplitCallback) -> Result<()> + Send + 'a,
    {
        Self {
            chapters: chapters
                .chapters()
                .iter()
                .map(|x| (to_ticks(x.start_offset, timescale), x.clone()))
                .collect(),
            adts,
            callback: Box::new(callback),
            current: None,
            position: 0,
            written: Vec::new(),
        }
    }

    /// Indices of the chapters that received at least one frame.
    pub fn written_chapters(&self) -> &[usize] {
        &self.written
    }

    fn chapter_at(&self, position: u64) -> Option<usize> {
        self.chapters
            .iter()
            .rposition(|(start, _)| *start <= position)
    }

    fn close(&mut self) -> Result<()> {
        if let Some((index, mut callback)) = self.current.take() {
            if let Some(mut output) = callback.output.take() {
                output.flush()?;
                log::debug!("closed chapter {} '{}'", index + 1, callback.chapter.title);
            }
        }
        Ok(())
    }

    fn open(&mut self, index: usize) -> Result<()> {
        self.close()?;

        let mut callback = SplitCallback::new(self.chapters[index].1.clone());
        callback.track_number = Some(index as u32 + 1);
        callback.track_count = Some(self.chapters.len() as u32);
        callback.track_title = Some(callback.chapter.title.clone());
        (self.callback)(&mut callback)?;

        if callback.output.is_none() {
            log::debug!("chapter {} has no output, frames are skipped", index + 1);
        }
        self.current = Some((index, callback));
        Ok(())
    }
}

impl FrameSink for ChapterSplitter<'_> {
    fn name(&self) -> &'static str {
        "chapter-splitter"
    }

    fn add_input(&mut self, entry: FrameEntry) -> Result<()> {
        let position = self.position;
        self.position += entry.samples_in_frame as u64;

        let Some(index) = self.chapter_at(position) else {
            return Ok(());
        };

        if self.current.as_ref().map(|(x, _)| *x) != Some(index) {
            self.open(index)?;
        }

        let Some((_, SplitCallback {
            output: Some(output),
            ..
        })) = self.current.as_mut()
        else {
            return Ok(());
        };

        if let Some(adts) = &self.adts {
            output.write_all(&adts.to_bytes(entry.frame_data.len())?)?;
        }
        output.write_all(&entry.frame_data)?;

        if self.written.last() != Some(&index) {
            self.written.push(index);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::tests::entry;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn lc_stereo_44k() -> AudioSpecificConfig {
        AudioSpecificConfig {
            object_type: 2,
            sampling_frequency_index: 4,
            sampling_frequency: 44100,
            channel_configuration: 2,
        }
    }

    #[test]
    fn test_adts_header() {
        let header = AdtsHeader::new(&lc_stereo_44k()).unwrap();
        assert_eq!(
            header.to_bytes(371).unwrap(),
            [0xFF, 0xF1, 0x50, 0x80, 0x2F, 0x5F, 0xFC]
        );
        assert!(header.to_bytes(8200).is_err());
    }

    #[test]
    fn test_split_by_sample_count() {
        let mut chapters = ChapterInfo::new(Duration::ZERO);
        chapters.add_chapter("One", Duration::from_secs(2));
        chapters.add_chapter("Two", Duration::from_secs(1));

        let outputs = Arc::new(Mutex::new(Vec::<(u32, Shared)>::new()));
        let sink_outputs = outputs.clone();
        let mut splitter = ChapterSplitter::new(&chapters, 1024, None, move |callback| {
            let shared = Shared::default();
            sink_outputs
                .lock()
                .unwrap()
                .push((callback.track_number.unwrap_or_default(), shared.clone()));
            callback.output = Some(Box::new(shared));
            Ok(())
        });

        // One frame per second at this timescale; the fourth frame overruns
        // the last chapter and stays in it.
        for i in 0..4 {
            splitter.add_input(entry(i, &[i as u8])).unwrap();
        }
        splitter.flush().unwrap();

        let outputs = outputs.lock().unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].0, 1);
        assert_eq!(*outputs[0].1.0.lock().unwrap(), vec![0, 1]);
        assert_eq!(*outputs[1].1.0.lock().unwrap(), vec![2, 3]);
        assert_eq!(splitter.written_chapters(), &[0, 1]);
    }

    #[test]
    fn test_frames_before_first_chapter() {
        let mut chapters = ChapterInfo::new(Duration::from_secs(1));
        chapters.add_chapter("Only", Duration::from_secs(1));

        let mut opened = 0;
        let mut splitter = ChapterSplitter::new(&chapters, 1024, None, |_| {
            opened += 1;
            Ok(())
        });
        splitter.add_input(entry(0, &[0])).unwrap();
        splitter.add_input(entry(1, &[1])).unwrap();
        splitter.flush().unwrap();
        drop(splitter);

        assert_eq!(opened, 1);
    }
}
