//! MPEG-4 elementary stream descriptors (ISO/IEC 14496-1), as nested in `esds`.
//!
//! A descriptor starts with a tag byte and an expandable size of one to four
//! bytes, seven bits each. Encoders commonly pad the size to four bytes, so
//! the width found while parsing is kept and reused on render.

use crate::{Error, Reader, Result, Writer};
use bitreader::BitReader;

pub const ES_DESCRIPTOR: u8 = 0x03;
pub const DECODER_CONFIG_DESCRIPTOR: u8 = 0x04;
pub const DECODER_SPECIFIC_INFO: u8 = 0x05;
pub const SL_CONFIG_DESCRIPTOR: u8 = 0x06;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorHeader {
    pub tag: u8,
    /// Payload size in bytes.
    pub size: u32,
    /// Width of the size field, 1 to 4 bytes.
    pub size_bytes: u8,
}

impl DescriptorHeader {
    pub fn new(tag: u8) -> Self {
        Self {
            tag,
            size: 0,
            size_bytes: 1,
        }
    }

    pub fn read(reader: &mut Reader) -> Result<Self> {
        let position = reader.position();
        let tag = reader.read_u8()?;
        let mut size = 0u32;

        for size_bytes in 1..=4 {
            let b = reader.read_u8()?;
            size = (size << 7) | (b & 0x7F) as u32;

            if b & 0x80 == 0 {
                return Ok(Self {
                    tag,
                    size,
                    size_bytes,
                });
            }
        }

        Err(Error::decode(
            position,
            format!("descriptor 0x{:02x} has a size field longer than 4 bytes", tag),
        ))
    }

    fn width_for(&self, size: u64) -> Result<u8> {
        let needed = match size {
            0..0x80 => 1,
            0x80..0x4000 => 2,
            0x4000..0x20_0000 => 3,
            0x20_0000..0x1000_0000 => 4,
            _ => {
                return Err(Error::invalid_input(format!(
                    "descriptor payload of {} bytes does not fit a 28-bit size",
                    size
                )));
            }
        };
        Ok(needed.max(self.size_bytes))
    }

    fn write(&self, size: u64, writer: &mut Writer) -> Result<()> {
        let width = self.width_for(size)?;
        writer.write_u8(self.tag)?;

        for i in (0..width).rev() {
            let bits = ((size >> (7 * i as u32)) & 0x7F) as u8;
            writer.write_u8(if i > 0 { bits | 0x80 } else { bits })?;
        }

        Ok(())
    }
}

/// ES_Descriptor, the root of an `esds` box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EsDescriptor {
    pub header: DescriptorHeader,
    pub es_id: u16,
    /// Dependency, URL and OCR flags plus a 5-bit stream priority.
    pub flags: u8,
    pub depends_on_es_id: Option<u16>,
    pub url: Option<Vec<u8>>,
    pub ocr_es_id: Option<u16>,
    pub children: Vec<Descriptor>,
}

/// DecoderConfigDescriptor, describing the codec of the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderConfigDescriptor {
    pub header: DescriptorHeader,
    /// 0x40 for MPEG-4 audio.
    pub object_type_indication: u8,
    /// Stream type (6 bits), upstream flag and a reserved bit.
    pub stream_type: u8,
    pub buffer_size_db: u32,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
    pub children: Vec<Descriptor>,
}

/// DecoderSpecificInfo, for AAC an AudioSpecificConfig.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderSpecificInfo {
    pub header: DescriptorHeader,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlConfigDescriptor {
    pub header: DescriptorHeader,
    pub predefined: u8,
    pub rest: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownDescriptor {
    pub header: DescriptorHeader,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Descriptor {
    Es(EsDescriptor),
    DecoderConfig(DecoderConfigDescriptor),
    DecoderSpecificInfo(DecoderSpecificInfo),
    SlConfig(SlConfigDescriptor),
    Unknown(UnknownDescriptor),
}

fn read_children(reader: &mut Reader) -> Result<Vec<Descriptor>> {
    let mut children = Vec::new();
    while reader.has_more_data() {
        children.push(Descriptor::parse(reader)?);
    }
    Ok(children)
}

fn children_size(children: &[Descriptor]) -> Result<u64> {
    children.iter().map(|x| x.render_size()).sum()
}

impl Descriptor {
    /// Parses one descriptor and everything nested in it.
    pub fn parse(reader: &mut Reader) -> Result<Self> {
        let header = DescriptorHeader::read(reader)?;
        let end = reader.position() + header.size as u64;

        if end > reader.limit() {
            return Err(Error::decode(
                reader.position(),
                format!(
                    "descriptor 0x{:02x} declares {} bytes, more than its container holds",
                    header.tag, header.size
                ),
            ));
        }

        let outer = reader.set_limit(end);
        let descriptor = Self::parse_payload(reader, header);
        reader.set_limit(outer);
        let descriptor = descriptor?;

        if reader.position() != end {
            return Err(Error::decode(
                reader.position(),
                format!("descriptor 0x{:02x} has unconsumed bytes", header.tag),
            ));
        }

        Ok(descriptor)
    }

    fn parse_payload(reader: &mut Reader, header: DescriptorHeader) -> Result<Self> {
        Ok(match header.tag {
            ES_DESCRIPTOR => {
                let es_id = reader.read_u16()?;
                let flags = reader.read_u8()?;
                let depends_on_es_id = if flags & 0x80 != 0 {
                    Some(reader.read_u16()?)
                } else {
                    None
                };
                let url = if flags & 0x40 != 0 {
                    let len = reader.read_u8()?;
                    Some(reader.read_bytes_u8(len as usize)?)
                } else {
                    None
                };
                let ocr_es_id = if flags & 0x20 != 0 {
                    Some(reader.read_u16()?)
                } else {
                    None
                };

                Self::Es(EsDescriptor {
                    header,
                    es_id,
                    flags,
                    depends_on_es_id,
                    url,
                    ocr_es_id,
                    children: read_children(reader)?,
                })
            }
            DECODER_CONFIG_DESCRIPTOR => Self::DecoderConfig(DecoderConfigDescriptor {
                header,
                object_type_indication: reader.read_u8()?,
                stream_type: reader.read_u8()?,
                buffer_size_db: reader.read_u24()?,
                max_bitrate: reader.read_u32()?,
                avg_bitrate: reader.read_u32()?,
                children: read_children(reader)?,
            }),
            DECODER_SPECIFIC_INFO => Self::DecoderSpecificInfo(DecoderSpecificInfo {
                header,
                data: reader.read_to_limit()?,
            }),
            SL_CONFIG_DESCRIPTOR => Self::SlConfig(SlConfigDescriptor {
                header,
                predefined: reader.read_u8()?,
                rest: reader.read_to_limit()?,
            }),
            _ => Self::Unknown(UnknownDescriptor {
                header,
                data: reader.read_to_limit()?,
            }),
        })
    }

    pub fn header(&self) -> &DescriptorHeader {
        match self {
            Self::Es(x) => &x.header,
            Self::DecoderConfig(x) => &x.header,
            Self::DecoderSpecificInfo(x) => &x.header,
            Self::SlConfig(x) => &x.header,
            Self::Unknown(x) => &x.header,
        }
    }

    pub fn children(&self) -> &[Descriptor] {
        match self {
            Self::Es(x) => &x.children,
            Self::DecoderConfig(x) => &x.children,
            _ => &[],
        }
    }

    pub fn payload_size(&self) -> Result<u64> {
        Ok(match self {
            Self::Es(x) => {
                3 + x.depends_on_es_id.map_or(0, |_| 2)
                    + x.url.as_ref().map_or(0, |u| 1 + u.len() as u64)
                    + x.ocr_es_id.map_or(0, |_| 2)
                    + children_size(&x.children)?
            }
            Self::DecoderConfig(x) => 13 + children_size(&x.children)?,
            Self::DecoderSpecificInfo(x) => x.data.len() as u64,
            Self::SlConfig(x) => 1 + x.rest.len() as u64,
            Self::Unknown(x) => x.data.len() as u64,
        })
    }

    pub fn render_size(&self) -> Result<u64> {
        let payload = self.payload_size()?;
        Ok(1 + self.header().width_for(payload)? as u64 + payload)
    }

    pub fn write(&self, writer: &mut Writer) -> Result<()> {
        self.header().write(self.payload_size()?, writer)?;

        match self {
            Self::Es(x) => {
                writer.write_u16(x.es_id)?;
                writer.write_u8(x.flags)?;
                if let Some(id) = x.depends_on_es_id {
                    writer.write_u16(id)?;
                }
                if let Some(url) = &x.url {
                    writer.write_u8(url.len() as u8)?;
                    writer.write_bytes(url)?;
                }
                if let Some(id) = x.ocr_es_id {
                    writer.write_u16(id)?;
                }
            }
            Self::DecoderConfig(x) => {
                writer.write_u8(x.object_type_indication)?;
                writer.write_u8(x.stream_type)?;
                writer.write_u24(x.buffer_size_db)?;
                writer.write_u32(x.max_bitrate)?;
                writer.write_u32(x.avg_bitrate)?;
            }
            Self::DecoderSpecificInfo(x) => writer.write_bytes(&x.data)?,
            Self::SlConfig(x) => {
                writer.write_u8(x.predefined)?;
                writer.write_bytes(&x.rest)?;
            }
            Self::Unknown(x) => writer.write_bytes(&x.data)?,
        }

        for child in self.children() {
            child.write(writer)?;
        }

        Ok(())
    }

    /// Depth-first search for the first descriptor with `tag`.
    pub fn find(&self, tag: u8) -> Option<&Descriptor> {
        if self.header().tag == tag {
            return Some(self);
        }
        self.children().iter().find_map(|x| x.find(tag))
    }

    pub fn decoder_config(&self) -> Option<&DecoderConfigDescriptor> {
        match self.find(DECODER_CONFIG_DESCRIPTOR)? {
            Self::DecoderConfig(x) => Some(x),
            _ => None,
        }
    }

    pub fn audio_specific_config(&self) -> Option<Result<AudioSpecificConfig>> {
        match self.find(DECODER_SPECIFIC_INFO)? {
            Self::DecoderSpecificInfo(x) => Some(AudioSpecificConfig::parse(&x.data)),
            _ => None,
        }
    }
}

const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Leading fields of an MPEG-4 AudioSpecificConfig.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// 2 for AAC LC, 5 for SBR, 29 for PS.
    pub object_type: u8,
    /// Index into the standard frequency table, 15 when explicit.
    pub sampling_frequency_index: u8,
    pub sampling_frequency: u32,
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut bits = BitReader::new(data);

        let mut object_type = bits.read_u8(5)?;
        if object_type == 31 {
            object_type = 32 + bits.read_u8(6)?;
        }

        let sampling_frequency_index = bits.read_u8(4)?;
        let sampling_frequency = if sampling_frequency_index == 15 {
            bits.read_u32(24)?
        } else {
            *SAMPLING_FREQUENCIES
                .get(sampling_frequency_index as usize)
                .ok_or_else(|| {
                    Error::decode(
                        0,
                        format!(
                            "reserved sampling frequency index {}",
                            sampling_frequency_index
                        ),
                    )
                })?
        };

        Ok(Self {
            object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration: bits.read_u8(4)?,
        })
    }
}
