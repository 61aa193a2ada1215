use super::{BoxFields, BoxHeader, FullBoxHeader};
use crate::{Error, Reader, Result, Writer};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChplEntry {
    /// Start time in 100 nanosecond units.
    pub start: u64,
    pub title: Vec<u8>,
}

impl ChplEntry {
    pub fn start_time(&self) -> Duration {
        Duration::from_nanos(self.start.saturating_mul(100))
    }

    pub fn title(&self) -> String {
        String::from_utf8_lossy(&self.title).into_owned()
    }
}

/// Nero chapter list found under `moov/udta`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChplBox {
    pub full: FullBoxHeader,
    /// Present in version 1 boxes only.
    pub reserved: Option<u32>,
    pub entries: Vec<ChplEntry>,
}

impl BoxFields for ChplBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;
        let reserved = if full.version == 1 {
            Some(reader.read_u32()?)
        } else {
            None
        };

        let count = reader.read_u8()?;
        let mut entries = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let start = reader.read_u64()?;
            let len = reader.read_u8()?;
            entries.push(ChplEntry {
                start,
                title: reader.read_bytes_u8(len as usize)?,
            });
        }

        Ok(Self {
            full,
            reserved,
            entries,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE
            + if self.reserved.is_some() { 4 } else { 0 }
            + 1
            + self
                .entries
                .iter()
                .map(|x| 9 + x.title.len() as u64)
                .sum::<u64>()
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        if self.entries.len() > u8::MAX as usize {
            return Err(Error::invalid_input("chpl holds at most 255 chapters"));
        }

        self.full.write(writer)?;
        if let Some(x) = self.reserved {
            writer.write_u32(x)?;
        }
        writer.write_u8(self.entries.len() as u8)?;

        for entry in &self.entries {
            if entry.title.len() > u8::MAX as usize {
                return Err(Error::invalid_input("chpl titles are at most 255 bytes"));
            }
            writer.write_u64(entry.start)?;
            writer.write_u8(entry.title.len() as u8)?;
            writer.write_bytes(&entry.title)?;
        }

        Ok(())
    }
}
