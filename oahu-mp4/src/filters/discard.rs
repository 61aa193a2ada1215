use super::{FrameEntry, FrameSink};
use crate::Result;

/// Terminal stage for tracks that are demuxed but not kept, such as cover
/// art video tracks.
#[derive(Debug, Default)]
pub struct DiscardSink {
    discarded: u64,
}

impl DiscardSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for DiscardSink {
    fn name(&self) -> &'static str {
        "discard"
    }

    fn add_input(&mut self, _: FrameEntry) -> Result<()> {
        self.discarded += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        log::debug!("discarded {} frames", self.discarded);
        Ok(())
    }
}
