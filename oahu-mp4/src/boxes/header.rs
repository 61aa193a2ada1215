use crate::{Error, FourCC, Reader, Result, Writer};

/// Header of one box as found in (or authored for) a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoxHeader {
    pub file_position: u64,
    pub total_box_size: u64,
    pub box_type: FourCC,
    pub header_size: u8,
    /// `1` when the 64-bit size form is used.
    pub version: u8,
    /// Size field was zero, i.e. the box extends to the end of the stream.
    pub open_ended: bool,
}

impl BoxHeader {
    pub fn read(reader: &mut Reader) -> Result<Self> {
        let file_position = reader.position();
        let size = reader.read_u32()?;
        let box_type = reader.read_fourcc()?;

        let (total_box_size, header_size, version, open_ended) = match size {
            1 => (reader.read_u64()?, 16, 1, false),
            0 => (reader.limit() - file_position, 8, 0, true),
            x => (x as u64, 8, 0, false),
        };

        if total_box_size < header_size as u64 {
            return Err(Error::decode(
                file_position,
                format!(
                    "declared size {} is smaller than its {} byte header",
                    total_box_size, header_size
                ),
            )
            .with_box_type(box_type));
        }

        if file_position + total_box_size > reader.limit() {
            return Err(Error::decode(
                file_position,
                format!(
                    "declared size {} runs past the available {} bytes",
                    total_box_size,
                    reader.limit() - file_position
                ),
            )
            .with_box_type(box_type));
        }

        Ok(Self {
            file_position,
            total_box_size,
            box_type,
            header_size,
            version,
            open_ended,
        })
    }

    /// Header for an authored box of `box_size` total bytes.
    pub fn new(box_size: u64, box_type: FourCC) -> Result<Self> {
        if box_size < 8 {
            return Err(Error::invalid_input("box size must be at least 8 bytes"));
        }

        let large = box_size > u32::MAX as u64;
        Ok(Self {
            file_position: 0,
            total_box_size: box_size,
            box_type,
            header_size: if large { 16 } else { 8 },
            version: large as u8,
            open_ended: false,
        })
    }

    pub fn end(&self) -> u64 {
        self.file_position + self.total_box_size
    }

    pub fn payload_position(&self) -> u64 {
        self.file_position + self.header_size as u64
    }

    pub fn payload_size(&self) -> u64 {
        self.total_box_size - self.header_size as u64
    }

    /// Header width that will be rendered for a payload of `payload` bytes.
    pub fn render_header_size(&self, payload: u64) -> u64 {
        if self.version == 1 || payload + 8 > u32::MAX as u64 {
            16
        } else {
            8
        }
    }

    pub fn write(&self, payload: u64, writer: &mut Writer) -> Result<()> {
        let header_size = self.render_header_size(payload);

        if header_size == 16 {
            writer.write_u32(1)?;
            writer.write_fourcc(self.box_type)?;
            writer.write_u64(payload + 16)?;
        } else {
            writer.write_u32(if self.open_ended { 0 } else { (payload + 8) as u32 })?;
            writer.write_fourcc(self.box_type)?;
        }

        Ok(())
    }
}

/// Version and flags that follow the header of a full box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32,
}

impl FullBoxHeader {
    pub const SIZE: u64 = 4;

    pub fn new(version: u8, flags: u32) -> Self {
        Self { version, flags }
    }

    pub fn read(reader: &mut Reader) -> Result<Self> {
        Ok(Self {
            version: reader.read_u8()?,
            flags: reader.read_u24()?,
        })
    }

    pub fn write(&self, writer: &mut Writer) -> Result<()> {
        writer.write_u8(self.version)?;
        writer.write_u24(self.flags)
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}
