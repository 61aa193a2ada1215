use super::{BoxData, BoxFields, BoxHeader, BoxId, BoxParser, FullBoxHeader, registry};
use crate::{Error, FourCC, Reader, Result, Writer};

/// Sample description box. Entries are child nodes whose shape depends on the
/// handler of the enclosing track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StsdBox {
    pub full: FullBoxHeader,
    pub entry_count: u32,
}

impl BoxFields for StsdBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        Ok(Self {
            full: FullBoxHeader::read(reader)?,
            entry_count: reader.read_u32()?,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u32(self.entry_count)
    }
}

pub(super) fn parse_stsd(parser: &mut BoxParser<'_>, id: BoxId) -> Result<BoxData> {
    let header = parser.tree().header(id).clone();
    let stsd = StsdBox::parse(parser.reader(), &header)?;

    let constructor: super::Constructor = match parser.tree().handler_type(id) {
        Some(x) if x == b"soun" => parse_audio_entry,
        Some(x) if x == b"vide" => parse_visual_entry,
        _ => registry::unknown,
    };

    for _ in 0..stsd.entry_count {
        parser.parse_next_with(Some(id), constructor)?;
    }

    Ok(stsd.into())
}

fn parse_audio_entry(parser: &mut BoxParser<'_>, id: BoxId) -> Result<BoxData> {
    let header = parser.tree().header(id).clone();
    let entry = AudioSampleEntry::parse(parser.reader(), &header)?;
    parser.read_children(id)?;
    Ok(entry.into())
}

fn parse_visual_entry(parser: &mut BoxParser<'_>, id: BoxId) -> Result<BoxData> {
    let header = parser.tree().header(id).clone();
    let entry = VisualSampleEntry::parse(parser.reader(), &header)?;
    parser.read_children(id)?;
    Ok(entry.into())
}

/// Audio sample description (`mp4a`, `aavd`, `enca`, ...).
///
/// QuickTime version 1 and 2 layouts append extra fields after the ISO ones;
/// they are kept verbatim in `extension`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioSampleEntry {
    pub reserved: [u8; 6],
    pub data_reference_index: u16,
    pub version: u16,
    pub revision_level: u16,
    pub vendor: u32,
    pub channel_count: u16,
    pub sample_size: u16,
    pub compression_id: u16,
    pub packet_size: u16,
    /// 16.16 fixed point.
    pub sample_rate: u32,
    pub extension: Vec<u8>,
}

impl AudioSampleEntry {
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate >> 16
    }

    /// Channel count, taken from the version 2 extension when present.
    pub fn channels(&self) -> u16 {
        if self.version == 2 && self.extension.len() >= 16 {
            let x = &self.extension[12..16];
            u32::from_be_bytes([x[0], x[1], x[2], x[3]]) as u16
        } else {
            self.channel_count
        }
    }
}

impl BoxFields for AudioSampleEntry {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let mut entry = Self {
            reserved: reader.read_array()?,
            data_reference_index: reader.read_u16()?,
            version: reader.read_u16()?,
            revision_level: reader.read_u16()?,
            vendor: reader.read_u32()?,
            channel_count: reader.read_u16()?,
            sample_size: reader.read_u16()?,
            compression_id: reader.read_u16()?,
            packet_size: reader.read_u16()?,
            sample_rate: reader.read_u32()?,
            extension: Vec::new(),
        };

        entry.extension = match entry.version {
            0 => Vec::new(),
            1 => reader.read_bytes_u8(16)?,
            2 => reader.read_bytes_u8(36)?,
            x => {
                return Err(Error::unsupported(format!(
                    "audio sample entry version {}",
                    x
                )));
            }
        };

        Ok(entry)
    }

    fn fields_size(&self) -> u64 {
        28 + self.extension.len() as u64
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        writer.write_bytes(&self.reserved)?;
        writer.write_u16(self.data_reference_index)?;
        writer.write_u16(self.version)?;
        writer.write_u16(self.revision_level)?;
        writer.write_u32(self.vendor)?;
        writer.write_u16(self.channel_count)?;
        writer.write_u16(self.sample_size)?;
        writer.write_u16(self.compression_id)?;
        writer.write_u16(self.packet_size)?;
        writer.write_u32(self.sample_rate)?;
        writer.write_bytes(&self.extension)
    }
}

/// Video sample description (`avc1`, `mp4v`, `jpeg`, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisualSampleEntry {
    pub reserved: [u8; 6],
    pub data_reference_index: u16,
    pub pre_defined: [u8; 16],
    pub width: u16,
    pub height: u16,
    pub horizontal_resolution: u32,
    pub vertical_resolution: u32,
    pub reserved2: u32,
    pub frame_count: u16,
    /// Length byte, up to 31 bytes of name and zero padding.
    compressor_name: [u8; 32],
    pub depth: u16,
    pub pre_defined2: u16,
}

impl VisualSampleEntry {
    pub fn compressor_name(&self) -> String {
        let len = self.compressor_name[0] as usize;
        String::from_utf8_lossy(&self.compressor_name[1..=len]).into_owned()
    }

    pub fn set_compressor_name(&mut self, name: &str) -> Result<()> {
        if name.len() > 31 {
            return Err(Error::invalid_input(format!(
                "compressor name '{}' is longer than 31 bytes",
                name
            )));
        }

        self.compressor_name = [0; 32];
        self.compressor_name[0] = name.len() as u8;
        self.compressor_name[1..=name.len()].copy_from_slice(name.as_bytes());
        Ok(())
    }
}

impl BoxFields for VisualSampleEntry {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let reserved = reader.read_array()?;
        let data_reference_index = reader.read_u16()?;
        let pre_defined = reader.read_array()?;
        let width = reader.read_u16()?;
        let height = reader.read_u16()?;
        let horizontal_resolution = reader.read_u32()?;
        let vertical_resolution = reader.read_u32()?;
        let reserved2 = reader.read_u32()?;
        let frame_count = reader.read_u16()?;

        let position = reader.position();
        let compressor_name: [u8; 32] = reader.read_array()?;
        if compressor_name[0] > 31 {
            return Err(Error::decode(
                position,
                format!(
                    "compressor name declares {} bytes, at most 31 fit",
                    compressor_name[0]
                ),
            ));
        }

        Ok(Self {
            reserved,
            data_reference_index,
            pre_defined,
            width,
            height,
            horizontal_resolution,
            vertical_resolution,
            reserved2,
            frame_count,
            compressor_name,
            depth: reader.read_u16()?,
            pre_defined2: reader.read_u16()?,
        })
    }

    fn fields_size(&self) -> u64 {
        78
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        writer.write_bytes(&self.reserved)?;
        writer.write_u16(self.data_reference_index)?;
        writer.write_bytes(&self.pre_defined)?;
        writer.write_u16(self.width)?;
        writer.write_u16(self.height)?;
        writer.write_u32(self.horizontal_resolution)?;
        writer.write_u32(self.vertical_resolution)?;
        writer.write_u32(self.reserved2)?;
        writer.write_u16(self.frame_count)?;
        writer.write_bytes(&self.compressor_name)?;
        writer.write_u16(self.depth)?;
        writer.write_u16(self.pre_defined2)
    }
}

impl FourCC {
    /// Sample entry codes used for protected audio.
    pub fn is_protected_audio(&self) -> bool {
        self == &b"enca" || self == &b"aavd"
    }
}
