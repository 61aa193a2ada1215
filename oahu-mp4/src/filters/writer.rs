use super::{FrameEntry, FrameSink};
use crate::{Error, Result};
use std::io::{Seek, SeekFrom, Write};

/// Terminal stage writing each frame back at the file offset it was read
/// from. Frames keep their size, so the surrounding layout stays valid.
pub struct InPlaceWriter<W: Write + Seek + Send> {
    output: W,
    written: u64,
}

impl<W: Write + Seek + Send> InPlaceWriter<W> {
    pub fn new(output: W) -> Self {
        Self { output, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

impl<W: Write + Seek + Send> FrameSink for InPlaceWriter<W> {
    fn name(&self) -> &'static str {
        "in-place-writer"
    }

    fn input_buffer_size(&self) -> usize {
        16
    }

    fn add_input(&mut self, entry: FrameEntry) -> Result<()> {
        let chunk = entry
            .chunk
            .ok_or_else(|| Error::invalid_input("frame without a source location"))?;

        if chunk.size as usize != entry.frame_data.len() {
            return Err(Error::InvalidFrame {
                stage: self.name(),
                sample: chunk.sample_index,
                reason: format!(
                    "frame is {} bytes but its slot holds {}",
                    entry.frame_data.len(),
                    chunk.size
                ),
            });
        }

        self.output.seek(SeekFrom::Start(chunk.offset))?;
        self.output.write_all(&entry.frame_data)?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::ChunkEntry;
    use std::io::Cursor;

    #[test]
    fn test_writes_at_offset() {
        let mut buf = Cursor::new(vec![0u8; 8]);
        let mut writer = InPlaceWriter::new(&mut buf);

        let chunk = ChunkEntry {
            offset: 3,
            size: 2,
            ..Default::default()
        };
        writer
            .add_input(FrameEntry::new(chunk, 1024, vec![0xAA, 0xBB]))
            .unwrap();
        assert!(
            writer
                .add_input(FrameEntry::new(chunk, 1024, vec![1, 2, 3]))
                .is_err()
        );
        writer.flush().unwrap();

        assert_eq!(buf.into_inner(), vec![0, 0, 0, 0xAA, 0xBB, 0, 0, 0]);
    }
}
