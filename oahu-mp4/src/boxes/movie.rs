use super::{BoxFields, BoxHeader, FullBoxHeader};
use crate::{FourCC, Reader, Result, Writer};

/// Reads a field that is 64 bits wide in version 1 boxes and 32 bits otherwise.
pub(crate) fn read_versioned(reader: &mut Reader, version: u8) -> Result<u64> {
    if version == 1 {
        reader.read_u64()
    } else {
        Ok(reader.read_u32()? as u64)
    }
}

pub(crate) fn write_versioned(writer: &mut Writer, version: u8, value: u64) -> Result<()> {
    if version == 1 {
        writer.write_u64(value)
    } else {
        writer.write_u32(value as u32)
    }
}

pub(crate) fn versioned_size(version: u8) -> u64 {
    if version == 1 { 8 } else { 4 }
}

/// Movie header. Only the timing fields are decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MvhdBox {
    pub full: FullBoxHeader,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// Rate, volume, matrix and next track id, kept verbatim.
    pub rest: Vec<u8>,
}

impl BoxFields for MvhdBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;
        Ok(Self {
            creation_time: read_versioned(reader, full.version)?,
            modification_time: read_versioned(reader, full.version)?,
            timescale: reader.read_u32()?,
            duration: read_versioned(reader, full.version)?,
            rest: reader.read_to_limit()?,
            full,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 3 * versioned_size(self.full.version) + 4 + self.rest.len() as u64
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        let version = self.full.version;
        self.full.write(writer)?;
        write_versioned(writer, version, self.creation_time)?;
        write_versioned(writer, version, self.modification_time)?;
        writer.write_u32(self.timescale)?;
        write_versioned(writer, version, self.duration)?;
        writer.write_bytes(&self.rest)
    }
}

/// Track header. Duration is in movie timescale units.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TkhdBox {
    pub full: FullBoxHeader,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub reserved: u32,
    pub duration: u64,
    pub rest: Vec<u8>,
}

impl BoxFields for TkhdBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;
        Ok(Self {
            creation_time: read_versioned(reader, full.version)?,
            modification_time: read_versioned(reader, full.version)?,
            track_id: reader.read_u32()?,
            reserved: reader.read_u32()?,
            duration: read_versioned(reader, full.version)?,
            rest: reader.read_to_limit()?,
            full,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 3 * versioned_size(self.full.version) + 8 + self.rest.len() as u64
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        let version = self.full.version;
        self.full.write(writer)?;
        write_versioned(writer, version, self.creation_time)?;
        write_versioned(writer, version, self.modification_time)?;
        writer.write_u32(self.track_id)?;
        writer.write_u32(self.reserved)?;
        write_versioned(writer, version, self.duration)?;
        writer.write_bytes(&self.rest)
    }
}

/// Media header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdhdBox {
    pub full: FullBoxHeader,
    pub creation_time: u64,
    pub modification_time: u64,
    /// Number of time units that pass in one second.
    pub timescale: u32,
    pub duration: u64,
    /// Packed ISO-639-2/T code, three 5-bit letters offset by 0x60.
    pub language: u16,
    pub pre_defined: u16,
}

impl MdhdBox {
    pub fn language(&self) -> String {
        [10, 5, 0]
            .iter()
            .map(|shift| (((self.language >> shift) & 0x1f) as u8 + 0x60) as char)
            .collect()
    }
}

impl BoxFields for MdhdBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;
        Ok(Self {
            creation_time: read_versioned(reader, full.version)?,
            modification_time: read_versioned(reader, full.version)?,
            timescale: reader.read_u32()?,
            duration: read_versioned(reader, full.version)?,
            language: reader.read_u16()?,
            pre_defined: reader.read_u16()?,
            full,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 3 * versioned_size(self.full.version) + 8
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        let version = self.full.version;
        self.full.write(writer)?;
        write_versioned(writer, version, self.creation_time)?;
        write_versioned(writer, version, self.modification_time)?;
        writer.write_u32(self.timescale)?;
        write_versioned(writer, version, self.duration)?;
        writer.write_u16(self.language)?;
        writer.write_u16(self.pre_defined)
    }
}

/// Handler reference, naming the media type of a track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HdlrBox {
    pub full: FullBoxHeader,
    pub pre_defined: u32,
    pub handler_type: FourCC,
    pub reserved: [u8; 12],
    /// Null terminated in ISO files, a pascal string in QuickTime ones.
    pub name: Vec<u8>,
}

impl HdlrBox {
    pub fn name(&self) -> String {
        let name = match self.name.first() {
            Some(&len) if len as usize == self.name.len() - 1 => &self.name[1..],
            _ => &self.name[..],
        };
        String::from_utf8_lossy(name)
            .trim_end_matches('\0')
            .to_owned()
    }
}

impl BoxFields for HdlrBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        Ok(Self {
            full: FullBoxHeader::read(reader)?,
            pre_defined: reader.read_u32()?,
            handler_type: reader.read_fourcc()?,
            reserved: reader.read_array()?,
            name: reader.read_to_limit()?,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + 4 + 12 + self.name.len() as u64
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u32(self.pre_defined)?;
        writer.write_fourcc(self.handler_type)?;
        writer.write_bytes(&self.reserved)?;
        writer.write_bytes(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_mdhd_versions() {
        let mut v0 = vec![0, 0, 0, 0];
        v0.extend(1u32.to_be_bytes());
        v0.extend(2u32.to_be_bytes());
        v0.extend(44100u32.to_be_bytes());
        v0.extend(441000u32.to_be_bytes());
        v0.extend([0x15, 0xC7, 0, 0]);

        let mut data = Cursor::new(v0.clone());
        let mut reader = Reader::new(&mut data).unwrap();
        let header = BoxHeader::new(8 + v0.len() as u64, FourCC(*b"mdhd")).unwrap();
        let mdhd = MdhdBox::parse(&mut reader, &header).unwrap();
        assert_eq!(mdhd.timescale, 44100);
        assert_eq!(mdhd.duration, 441000);
        assert_eq!(mdhd.language(), "eng");
        assert_eq!(mdhd.fields_size(), v0.len() as u64);

        let mut v1 = vec![1, 0, 0, 0];
        v1.extend(1u64.to_be_bytes());
        v1.extend(2u64.to_be_bytes());
        v1.extend(1000u32.to_be_bytes());
        v1.extend((u32::MAX as u64 + 5).to_be_bytes());
        v1.extend([0x15, 0xC7, 0, 0]);

        let mut data = Cursor::new(v1.clone());
        let mut reader = Reader::new(&mut data).unwrap();
        let mdhd = MdhdBox::parse(&mut reader, &header).unwrap();
        assert_eq!(mdhd.duration, u32::MAX as u64 + 5);

        let mut out = Vec::new();
        mdhd.write_fields(&mut Writer::new(&mut out)).unwrap();
        assert_eq!(out, v1);
    }

    #[test]
    fn test_hdlr_name() {
        let hdlr = HdlrBox {
            full: FullBoxHeader::default(),
            pre_defined: 0,
            handler_type: FourCC(*b"soun"),
            reserved: [0; 12],
            name: b"SoundHandler\0".to_vec(),
        };
        assert_eq!(hdlr.name(), "SoundHandler");

        let pascal = HdlrBox {
            name: b"\x05Sound".to_vec(),
            ..hdlr
        };
        assert_eq!(pascal.name(), "Sound");
    }
}
