use super::{BoxFields, BoxHeader, FullBoxHeader};
use crate::{Error, Reader, Result, Writer};

fn check_count(reader: &Reader, count: u32, entry_size: u64) -> Result<()> {
    let needed = count as u64 * entry_size;
    if needed > reader.remaining() {
        return Err(Error::decode(
            reader.position(),
            format!(
                "{} entries need {} bytes but only {} remain",
                count,
                needed,
                reader.remaining()
            ),
        ));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Decoding time to sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SttsBox {
    pub full: FullBoxHeader,
    pub entries: Vec<SttsEntry>,
}

impl SttsBox {
    /// Duration of every sample, expanded from the run-length table.
    pub fn durations(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .flat_map(|x| std::iter::repeat_n(x.sample_delta, x.sample_count as usize))
    }
}

impl BoxFields for SttsBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;
        let count = reader.read_u32()?;
        check_count(reader, count, 8)?;

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(SttsEntry {
                sample_count: reader.read_u32()?,
                sample_delta: reader.read_u32()?,
            });
        }

        Ok(Self { full, entries })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + self.entries.len() as u64 * 8
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u32(self.entries.len() as u32)?;
        for entry in &self.entries {
            writer.write_u32(entry.sample_count)?;
            writer.write_u32(entry.sample_delta)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Sample to chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StscBox {
    pub full: FullBoxHeader,
    pub entries: Vec<StscEntry>,
}

impl StscBox {
    /// Samples in chunk `chunk` (1-based).
    pub fn samples_in_chunk(&self, chunk: u32) -> u32 {
        self.entries
            .iter()
            .take_while(|x| x.first_chunk <= chunk)
            .last()
            .map(|x| x.samples_per_chunk)
            .unwrap_or_default()
    }
}

impl BoxFields for StscBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;
        let count = reader.read_u32()?;
        check_count(reader, count, 12)?;

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(StscEntry {
                first_chunk: reader.read_u32()?,
                samples_per_chunk: reader.read_u32()?,
                sample_description_index: reader.read_u32()?,
            });
        }

        Ok(Self { full, entries })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + self.entries.len() as u64 * 12
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u32(self.entries.len() as u32)?;
        for entry in &self.entries {
            writer.write_u32(entry.first_chunk)?;
            writer.write_u32(entry.samples_per_chunk)?;
            writer.write_u32(entry.sample_description_index)?;
        }
        Ok(())
    }
}

/// Sample sizes, either one constant size or a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StszBox {
    pub full: FullBoxHeader,
    pub sample_size: u32,
    pub sample_count: u32,
    pub entry_sizes: Vec<u32>,
}

impl StszBox {
    pub fn size_of(&self, index: usize) -> Option<u32> {
        if self.sample_size != 0 {
            (index < self.sample_count as usize).then_some(self.sample_size)
        } else {
            self.entry_sizes.get(index).copied()
        }
    }
}

impl BoxFields for StszBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;
        let sample_size = reader.read_u32()?;
        let sample_count = reader.read_u32()?;
        let mut entry_sizes = Vec::new();

        if sample_size == 0 {
            check_count(reader, sample_count, 4)?;
            entry_sizes.reserve(sample_count as usize);
            for _ in 0..sample_count {
                entry_sizes.push(reader.read_u32()?);
            }
        }

        Ok(Self {
            full,
            sample_size,
            sample_count,
            entry_sizes,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 8 + self.entry_sizes.len() as u64 * 4
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u32(self.sample_size)?;
        writer.write_u32(self.sample_count)?;
        for size in &self.entry_sizes {
            writer.write_u32(*size)?;
        }
        Ok(())
    }
}

/// Chunk offsets, 32-bit (`stco`) or 64-bit (`co64`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkOffsetBox {
    pub full: FullBoxHeader,
    pub large: bool,
    pub offsets: Vec<u64>,
}

impl BoxFields for ChunkOffsetBox {
    fn parse(reader: &mut Reader, header: &BoxHeader) -> Result<Self> {
        let large = header.box_type == b"co64";
        let full = FullBoxHeader::read(reader)?;
        let count = reader.read_u32()?;
        check_count(reader, count, if large { 8 } else { 4 })?;

        let mut offsets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            offsets.push(if large {
                reader.read_u64()?
            } else {
                reader.read_u32()? as u64
            });
        }

        Ok(Self {
            full,
            large,
            offsets,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + self.offsets.len() as u64 * if self.large { 8 } else { 4 }
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u32(self.offsets.len() as u32)?;
        for offset in &self.offsets {
            if self.large {
                writer.write_u64(*offset)?;
            } else {
                writer.write_u32(*offset as u32)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stsc_lookup() {
        let stsc = StscBox {
            full: FullBoxHeader::default(),
            entries: vec![
                StscEntry {
                    first_chunk: 1,
                    samples_per_chunk: 4,
                    sample_description_index: 1,
                },
                StscEntry {
                    first_chunk: 3,
                    samples_per_chunk: 2,
                    sample_description_index: 1,
                },
            ],
        };
        assert_eq!(stsc.samples_in_chunk(1), 4);
        assert_eq!(stsc.samples_in_chunk(2), 4);
        assert_eq!(stsc.samples_in_chunk(3), 2);
        assert_eq!(stsc.samples_in_chunk(9), 2);
    }

    #[test]
    fn test_stts_durations() {
        let stts = SttsBox {
            full: FullBoxHeader::default(),
            entries: vec![
                SttsEntry {
                    sample_count: 2,
                    sample_delta: 1024,
                },
                SttsEntry {
                    sample_count: 1,
                    sample_delta: 512,
                },
            ],
        };
        assert_eq!(stts.durations().collect::<Vec<_>>(), vec![1024, 1024, 512]);
    }
}
