//! Streaming frame stages.
//!
//! A [`Pipeline`] moves one [`FrameEntry`] at a time through an ordered list of
//! [`FrameFilter`]s into a terminal [`FrameSink`]. Every stage has its own
//! bounded buffer; a stage processes its buffered entries once the buffer is
//! full, and everything left over is drained on [`Pipeline::flush`].
//!
//! ```no_run
//! use oahu_mp4::{Unstoppable, filters::*};
//!
//! let mut pipeline = Pipeline::new(DiscardSink::new())
//!     .filter(DecryptFilter::new(Some([0; 16])))
//!     .filter(AacValidateFilter::new(2));
//!
//! let entry = FrameEntry::new(ChunkEntry::default(), 1024, vec![0x21, 0x10]);
//! pipeline.add_input(entry.with_iv(vec![0; 8]), &Unstoppable)?;
//! pipeline.flush()?;
//! # Ok::<(), oahu_mp4::Error>(())
//! ```

mod chapter;
mod decrypt;
mod discard;
mod split;
mod validate;
mod writer;

pub use chapter::{ChapterBoundary, ChapterNotifier};
pub use decrypt::{DecryptFilter, apply_ctr};
pub use discard::DiscardSink;
pub use split::{AdtsHeader, ChapterSplitter, SplitCallback};
pub use validate::AacValidateFilter;
pub use writer::InPlaceWriter;

use crate::{Error, Result, Stop};
use std::collections::VecDeque;

/// Location of a frame in its source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkEntry {
    pub track_id: u32,
    /// Index of the fragment (or chunk) the sample belongs to.
    pub chunk_index: u32,
    /// Zero-based sample number within the track.
    pub sample_index: u64,
    /// Absolute file offset of the sample bytes.
    pub offset: u64,
    pub size: u32,
    /// Decode timestamp in track timescale units.
    pub decode_time: u64,
    /// Duration in track timescale units.
    pub duration: u32,
}

/// Side data attached to a frame by the demuxer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtraData {
    /// Per-sample initialization vector from `senc`.
    Iv(Vec<u8>),
    Other(Vec<u8>),
}

/// One encoded media unit in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameEntry {
    pub chunk: Option<ChunkEntry>,
    /// Decoded samples the frame expands to, 1024 for AAC LC.
    pub samples_in_frame: u32,
    pub frame_data: Vec<u8>,
    pub extra_data: Option<ExtraData>,
}

impl FrameEntry {
    pub fn new(chunk: ChunkEntry, samples_in_frame: u32, frame_data: Vec<u8>) -> Self {
        Self {
            chunk: Some(chunk),
            samples_in_frame,
            frame_data,
            extra_data: None,
        }
    }

    pub fn with_iv(mut self, iv: Vec<u8>) -> Self {
        self.extra_data = Some(ExtraData::Iv(iv));
        self
    }

    pub fn sample_index(&self) -> Option<u64> {
        self.chunk.map(|x| x.sample_index)
    }

    pub fn iv(&self) -> Option<&[u8]> {
        match &self.extra_data {
            Some(ExtraData::Iv(x)) => Some(x),
            _ => None,
        }
    }
}

/// Intermediate stage: transforms an entry in place and forwards it.
pub trait FrameFilter: Send {
    fn name(&self) -> &'static str;

    fn input_buffer_size(&self) -> usize {
        1
    }

    fn perform_filtering(&mut self, entry: FrameEntry) -> Result<FrameEntry>;

    /// Emits residual state after the last input. Called at most once.
    fn flush(&mut self) -> Result<Vec<FrameEntry>> {
        Ok(Vec::new())
    }
}

/// Terminal stage: consumes entries without forwarding them.
pub trait FrameSink: Send {
    fn name(&self) -> &'static str;

    fn input_buffer_size(&self) -> usize {
        1
    }

    fn add_input(&mut self, entry: FrameEntry) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

struct Stage<'a> {
    filter: Box<dyn FrameFilter + 'a>,
    buffer: VecDeque<FrameEntry>,
}

pub struct Pipeline<'a> {
    stages: Vec<Stage<'a>>,
    sink: Box<dyn FrameSink + 'a>,
    sink_buffer: VecDeque<FrameEntry>,
    last_sample: Option<u64>,
    frames: u64,
    flushed: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new<S: FrameSink + 'a>(sink: S) -> Self {
        Self {
            stages: Vec::new(),
            sink: Box::new(sink),
            sink_buffer: VecDeque::new(),
            last_sample: None,
            frames: 0,
            flushed: false,
        }
    }

    /// Appends a filter in front of the sink.
    pub fn filter<F: FrameFilter + 'a>(mut self, filter: F) -> Self {
        self.stages.push(Stage {
            filter: Box::new(filter),
            buffer: VecDeque::new(),
        });
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .map(|x| x.filter.name())
            .chain([self.sink.name()])
            .collect()
    }

    /// Frames accepted so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn add_input(&mut self, entry: FrameEntry, stop: &dyn Stop) -> Result<()> {
        stop.check()?;

        if self.flushed {
            return Err(Error::invalid_input("pipeline received a frame after flush"));
        }

        if let Some(current) = entry.sample_index() {
            if let Some(previous) = self.last_sample {
                if current <= previous {
                    return Err(Error::OutOfOrder { previous, current });
                }
            }
            self.last_sample = Some(current);
        }

        self.frames += 1;
        self.push(0, entry);
        self.drain(false)
    }

    fn push(&mut self, stage: usize, entry: FrameEntry) {
        match self.stages.get_mut(stage) {
            Some(x) => x.buffer.push_back(entry),
            None => self.sink_buffer.push_back(entry),
        }
    }

    /// Runs every stage whose buffer is full, or every buffered entry when
    /// `all` is set.
    fn drain(&mut self, all: bool) -> Result<()> {
        for i in 0..self.stages.len() {
            let stage = &mut self.stages[i];
            let capacity = stage.filter.input_buffer_size().max(1);

            if !all && stage.buffer.len() < capacity {
                continue;
            }

            let name = stage.filter.name();
            let pending = stage.buffer.drain(..).collect::<Vec<_>>();
            let mut output = Vec::with_capacity(pending.len());

            for entry in pending {
                output.push(
                    stage
                        .filter
                        .perform_filtering(entry)
                        .map_err(|e| e.in_stage(name))?,
                );
            }

            for entry in output {
                self.push(i + 1, entry);
            }
        }

        let capacity = self.sink.input_buffer_size().max(1);
        if all || self.sink_buffer.len() >= capacity {
            let name = self.sink.name();
            while let Some(entry) = self.sink_buffer.pop_front() {
                self.sink.add_input(entry).map_err(|e| e.in_stage(name))?;
            }
        }

        Ok(())
    }

    /// Pushes every buffered entry through to the sink and flushes each stage
    /// in order. Calling it again is a no-op.
    pub fn flush(&mut self) -> Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;

        self.drain(true)?;

        for i in 0..self.stages.len() {
            let name = self.stages[i].filter.name();
            let residual = self.stages[i]
                .filter
                .flush()
                .map_err(|e| e.in_stage(name))?;

            for entry in residual {
                self.push(i + 1, entry);
            }
            self.drain(true)?;
        }

        let name = self.sink.name();
        self.sink.flush().map_err(|e| e.in_stage(name))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Unstoppable;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    };

    pub(crate) fn entry(sample_index: u64, data: &[u8]) -> FrameEntry {
        FrameEntry::new(
            ChunkEntry {
                track_id: 1,
                sample_index,
                size: data.len() as u32,
                duration: 1024,
                decode_time: sample_index * 1024,
                ..Default::default()
            },
            1024,
            data.to_vec(),
        )
    }

    /// Records everything it receives.
    #[derive(Clone, Default)]
    pub(crate) struct Collect {
        pub frames: Arc<Mutex<Vec<FrameEntry>>>,
        pub flushes: Arc<Mutex<u32>>,
    }

    impl FrameSink for Collect {
        fn name(&self) -> &'static str {
            "collect"
        }

        fn add_input(&mut self, entry: FrameEntry) -> Result<()> {
            self.frames.lock().unwrap().push(entry);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct Increment(usize);

    impl FrameFilter for Increment {
        fn name(&self) -> &'static str {
            "increment"
        }

        fn input_buffer_size(&self) -> usize {
            self.0
        }

        fn perform_filtering(&mut self, mut entry: FrameEntry) -> Result<FrameEntry> {
            entry.frame_data.iter_mut().for_each(|x| *x += 1);
            Ok(entry)
        }
    }

    struct Flag(AtomicBool);

    impl Stop for Flag {
        fn check(&self) -> std::result::Result<(), crate::StopReason> {
            if self.0.load(Ordering::Relaxed) {
                Err(crate::StopReason::Cancelled)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_buffering_and_flush() {
        let sink = Collect::default();
        let mut pipeline = Pipeline::new(sink.clone()).filter(Increment(3));

        pipeline.add_input(entry(0, &[1]), &Unstoppable).unwrap();
        pipeline.add_input(entry(1, &[2]), &Unstoppable).unwrap();
        assert!(sink.frames.lock().unwrap().is_empty());

        pipeline.add_input(entry(2, &[3]), &Unstoppable).unwrap();
        pipeline.add_input(entry(3, &[4]), &Unstoppable).unwrap();
        assert_eq!(sink.frames.lock().unwrap().len(), 3);

        pipeline.flush().unwrap();
        pipeline.flush().unwrap();

        let frames = sink.frames.lock().unwrap();
        let data = frames.iter().map(|x| x.frame_data[0]).collect::<Vec<_>>();
        assert_eq!(data, vec![2, 3, 4, 5]);
        assert_eq!(*sink.flushes.lock().unwrap(), 1);
        assert_eq!(pipeline.stage_names(), vec!["increment", "collect"]);
    }

    #[test]
    fn test_out_of_order() {
        let mut pipeline = Pipeline::new(Collect::default());
        pipeline.add_input(entry(4, &[0]), &Unstoppable).unwrap();

        let err = pipeline.add_input(entry(4, &[0]), &Unstoppable).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfOrder {
                previous: 4,
                current: 4
            }
        ));
    }

    #[test]
    fn test_stop_between_frames() {
        let stop = Flag(AtomicBool::new(false));
        let sink = Collect::default();
        let mut pipeline = Pipeline::new(sink.clone()).filter(Increment(10));

        pipeline.add_input(entry(0, &[0]), &stop).unwrap();
        stop.0.store(true, Ordering::Relaxed);

        let err = pipeline.add_input(entry(1, &[0]), &stop).unwrap_err();
        assert!(err.is_stopped());

        // Buffered frames still reach the sink.
        pipeline.flush().unwrap();
        assert_eq!(sink.frames.lock().unwrap().len(), 1);
    }
}
