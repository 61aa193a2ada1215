use super::{
    BoxFields, BoxHeader, FullBoxHeader,
    movie::{read_versioned, versioned_size, write_versioned},
};
use crate::{Error, Reader, Result, Writer};

pub mod tfhd_flags {
    pub const BASE_DATA_OFFSET: u32 = 0x000001;
    pub const SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
    pub const DEFAULT_SAMPLE_DURATION: u32 = 0x000008;
    pub const DEFAULT_SAMPLE_SIZE: u32 = 0x000010;
    pub const DEFAULT_SAMPLE_FLAGS: u32 = 0x000020;
    pub const DURATION_IS_EMPTY: u32 = 0x010000;
    pub const DEFAULT_BASE_IS_MOOF: u32 = 0x020000;
}

pub mod trun_flags {
    pub const DATA_OFFSET: u32 = 0x000001;
    pub const FIRST_SAMPLE_FLAGS: u32 = 0x000004;
    pub const SAMPLE_DURATION: u32 = 0x000100;
    pub const SAMPLE_SIZE: u32 = 0x000200;
    pub const SAMPLE_FLAGS: u32 = 0x000400;
    pub const SAMPLE_COMPOSITION_TIME_OFFSET: u32 = 0x000800;
}

/// Movie extends header, the duration of the whole fragmented movie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MehdBox {
    pub full: FullBoxHeader,
    pub fragment_duration: u64,
}

impl BoxFields for MehdBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;
        Ok(Self {
            fragment_duration: read_versioned(reader, full.version)?,
            full,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + versioned_size(self.full.version)
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        write_versioned(writer, self.full.version, self.fragment_duration)
    }
}

/// Movie fragment header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MfhdBox {
    pub full: FullBoxHeader,
    pub sequence_number: u32,
}

impl BoxFields for MfhdBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        Ok(Self {
            full: FullBoxHeader::read(reader)?,
            sequence_number: reader.read_u32()?,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u32(self.sequence_number)
    }
}

/// Track fragment base media decode time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TfdtBox {
    pub full: FullBoxHeader,
    pub base_media_decode_time: u64,
}

impl BoxFields for TfdtBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;
        Ok(Self {
            base_media_decode_time: read_versioned(reader, full.version)?,
            full,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + versioned_size(self.full.version)
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        write_versioned(writer, self.full.version, self.base_media_decode_time)
    }
}

/// Track fragment header. Optional fields are present according to flags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TfhdBox {
    pub full: FullBoxHeader,
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
}

fn read_if(reader: &mut Reader, flags: u32, flag: u32) -> Result<Option<u32>> {
    if flags & flag != 0 {
        Ok(Some(reader.read_u32()?))
    } else {
        Ok(None)
    }
}

fn write_if(writer: &mut Writer, flags: u32, flag: u32, value: Option<u32>) -> Result<()> {
    if flags & flag != 0 {
        writer.write_u32(value.unwrap_or_default())?;
    }
    Ok(())
}

impl TfhdBox {
    pub fn default_base_is_moof(&self) -> bool {
        self.full.has_flag(tfhd_flags::DEFAULT_BASE_IS_MOOF)
    }
}

impl BoxFields for TfhdBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        use tfhd_flags::*;

        let full = FullBoxHeader::read(reader)?;
        let flags = full.flags;

        Ok(Self {
            track_id: reader.read_u32()?,
            base_data_offset: if flags & BASE_DATA_OFFSET != 0 {
                Some(reader.read_u64()?)
            } else {
                None
            },
            sample_description_index: read_if(reader, flags, SAMPLE_DESCRIPTION_INDEX)?,
            default_sample_duration: read_if(reader, flags, DEFAULT_SAMPLE_DURATION)?,
            default_sample_size: read_if(reader, flags, DEFAULT_SAMPLE_SIZE)?,
            default_sample_flags: read_if(reader, flags, DEFAULT_SAMPLE_FLAGS)?,
            full,
        })
    }

    fn fields_size(&self) -> u64 {
        use tfhd_flags::*;

        let flags = self.full.flags;
        let optional = [
            SAMPLE_DESCRIPTION_INDEX,
            DEFAULT_SAMPLE_DURATION,
            DEFAULT_SAMPLE_SIZE,
            DEFAULT_SAMPLE_FLAGS,
        ]
        .iter()
        .filter(|x| flags & **x != 0)
        .count() as u64;

        FullBoxHeader::SIZE
            + 4
            + if flags & BASE_DATA_OFFSET != 0 { 8 } else { 0 }
            + optional * 4
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        use tfhd_flags::*;

        let flags = self.full.flags;
        self.full.write(writer)?;
        writer.write_u32(self.track_id)?;
        if flags & BASE_DATA_OFFSET != 0 {
            writer.write_u64(self.base_data_offset.unwrap_or_default())?;
        }
        write_if(writer, flags, SAMPLE_DESCRIPTION_INDEX, self.sample_description_index)?;
        write_if(writer, flags, DEFAULT_SAMPLE_DURATION, self.default_sample_duration)?;
        write_if(writer, flags, DEFAULT_SAMPLE_SIZE, self.default_sample_size)?;
        write_if(writer, flags, DEFAULT_SAMPLE_FLAGS, self.default_sample_flags)
    }
}

/// Track extends defaults used by fragments of one track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrexBox {
    pub full: FullBoxHeader,
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

impl BoxFields for TrexBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        Ok(Self {
            full: FullBoxHeader::read(reader)?,
            track_id: reader.read_u32()?,
            default_sample_description_index: reader.read_u32()?,
            default_sample_duration: reader.read_u32()?,
            default_sample_size: reader.read_u32()?,
            default_sample_flags: reader.read_u32()?,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 20
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u32(self.track_id)?;
        writer.write_u32(self.default_sample_description_index)?;
        writer.write_u32(self.default_sample_duration)?;
        writer.write_u32(self.default_sample_size)?;
        writer.write_u32(self.default_sample_flags)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    /// Signed in version 1 boxes; stored as raw bits either way.
    pub composition_time_offset: Option<u32>,
}

/// Track fragment run: sizes and durations of consecutive samples.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrunBox {
    pub full: FullBoxHeader,
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrunSample>,
}

impl TrunBox {
    /// Upper bound for runs whose samples all take the fragment defaults.
    pub const MAX_DEFAULTED_SAMPLES: u32 = 1 << 20;

    fn sample_size(&self) -> u64 {
        use trun_flags::*;

        [
            SAMPLE_DURATION,
            SAMPLE_SIZE,
            SAMPLE_FLAGS,
            SAMPLE_COMPOSITION_TIME_OFFSET,
        ]
        .iter()
        .filter(|x| self.full.flags & **x != 0)
        .count() as u64
            * 4
    }
}

impl BoxFields for TrunBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        use trun_flags::*;

        let full = FullBoxHeader::read(reader)?;
        let flags = full.flags;
        let sample_count = reader.read_u32()?;
        let data_offset = if flags & DATA_OFFSET != 0 {
            Some(reader.read_i32()?)
        } else {
            None
        };
        let first_sample_flags = read_if(reader, flags, FIRST_SAMPLE_FLAGS)?;

        let mut trun = Self {
            full,
            data_offset,
            first_sample_flags,
            samples: Vec::new(),
        };

        // Guard the allocation against a corrupt count before reading entries.
        // Runs without per-sample fields take no bytes, so they are capped.
        let needed = sample_count as u64 * trun.sample_size();
        if needed == 0 && sample_count > TrunBox::MAX_DEFAULTED_SAMPLES {
            return Err(Error::decode(
                reader.position(),
                format!("{} samples in a run without sample fields", sample_count),
            ));
        }
        if needed > reader.remaining() {
            return Err(Error::decode(
                reader.position(),
                format!(
                    "{} samples need {} bytes but only {} remain",
                    sample_count,
                    needed,
                    reader.remaining()
                ),
            ));
        }

        for _ in 0..sample_count {
            trun.samples.push(TrunSample {
                duration: read_if(reader, flags, SAMPLE_DURATION)?,
                size: read_if(reader, flags, SAMPLE_SIZE)?,
                flags: read_if(reader, flags, SAMPLE_FLAGS)?,
                composition_time_offset: read_if(reader, flags, SAMPLE_COMPOSITION_TIME_OFFSET)?,
            });
        }

        Ok(trun)
    }

    fn fields_size(&self) -> u64 {
        use trun_flags::*;

        let flags = self.full.flags;
        FullBoxHeader::SIZE
            + 4
            + if flags & DATA_OFFSET != 0 { 4 } else { 0 }
            + if flags & FIRST_SAMPLE_FLAGS != 0 { 4 } else { 0 }
            + self.samples.len() as u64 * self.sample_size()
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        use trun_flags::*;

        let flags = self.full.flags;
        self.full.write(writer)?;
        writer.write_u32(self.samples.len() as u32)?;
        if flags & DATA_OFFSET != 0 {
            writer.write_i32(self.data_offset.unwrap_or_default())?;
        }
        write_if(writer, flags, FIRST_SAMPLE_FLAGS, self.first_sample_flags)?;

        for sample in &self.samples {
            write_if(writer, flags, SAMPLE_DURATION, sample.duration)?;
            write_if(writer, flags, SAMPLE_SIZE, sample.size)?;
            write_if(writer, flags, SAMPLE_FLAGS, sample.flags)?;
            write_if(
                writer,
                flags,
                SAMPLE_COMPOSITION_TIME_OFFSET,
                sample.composition_time_offset,
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FourCC;
    use std::io::Cursor;

    fn parse<T: BoxFields>(payload: &[u8]) -> Result<T> {
        let mut data = Cursor::new(payload.to_vec());
        let mut reader = Reader::new(&mut data)?;
        let header = BoxHeader::new(8 + payload.len() as u64, FourCC(*b"test"))?;
        T::parse(&mut reader, &header)
    }

    #[test]
    fn test_tfhd_flags() {
        let mut payload = vec![0x00, 0x02, 0x00, 0x18];
        payload.extend(1u32.to_be_bytes());
        payload.extend(1024u32.to_be_bytes());
        payload.extend(300u32.to_be_bytes());

        let tfhd = parse::<TfhdBox>(&payload).unwrap();
        assert_eq!(tfhd.track_id, 1);
        assert_eq!(tfhd.default_sample_duration, Some(1024));
        assert_eq!(tfhd.default_sample_size, Some(300));
        assert_eq!(tfhd.base_data_offset, None);
        assert!(tfhd.default_base_is_moof());
        assert_eq!(tfhd.fields_size(), payload.len() as u64);
    }

    #[test]
    fn test_trun_samples() {
        let mut payload = vec![0x00, 0x00, 0x03, 0x01];
        payload.extend(2u32.to_be_bytes());
        payload.extend(120i32.to_be_bytes());
        payload.extend(1024u32.to_be_bytes());
        payload.extend(10u32.to_be_bytes());
        payload.extend(1024u32.to_be_bytes());
        payload.extend(12u32.to_be_bytes());

        let trun = parse::<TrunBox>(&payload).unwrap();
        assert_eq!(trun.data_offset, Some(120));
        assert_eq!(trun.samples.len(), 2);
        assert_eq!(trun.samples[1].size, Some(12));

        let mut out = Vec::new();
        trun.write_fields(&mut Writer::new(&mut out)).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_trun_count_exceeds_box() {
        let mut payload = vec![0x00, 0x00, 0x02, 0x00];
        payload.extend(1000u32.to_be_bytes());
        payload.extend(10u32.to_be_bytes());

        assert!(parse::<TrunBox>(&payload).unwrap_err().is_decode_err());
    }

    #[test]
    fn test_trun_defaulted_count_capped() {
        let mut payload = vec![0x00, 0x00, 0x00, 0x00];
        payload.extend(u32::MAX.to_be_bytes());
        assert!(parse::<TrunBox>(&payload).unwrap_err().is_decode_err());

        let mut payload = vec![0x00, 0x00, 0x00, 0x00];
        payload.extend(3u32.to_be_bytes());
        assert_eq!(parse::<TrunBox>(&payload).unwrap().samples.len(), 3);
    }
}
