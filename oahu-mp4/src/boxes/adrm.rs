use super::{BoxFields, BoxHeader};
use crate::{Reader, Result, Writer};

/// Audible DRM box carried by protected (`aavd`) sample entries.
///
/// Only the DRM blob and checksum have known meaning; the surrounding bytes
/// are kept opaque.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdrmBox {
    pub prologue: [u8; 8],
    pub drm_blob: [u8; 56],
    pub middle: [u8; 4],
    pub checksum: [u8; 20],
    pub tail: Vec<u8>,
}

impl AdrmBox {
    const FIXED_SIZE: u64 = 8 + 56 + 4 + 20;
}

impl BoxFields for AdrmBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        Ok(Self {
            prologue: reader.read_array()?,
            drm_blob: reader.read_array()?,
            middle: reader.read_array()?,
            checksum: reader.read_array()?,
            tail: reader.read_to_limit()?,
        })
    }

    fn fields_size(&self) -> u64 {
        Self::FIXED_SIZE + self.tail.len() as u64
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        writer.write_bytes(&self.prologue)?;
        writer.write_bytes(&self.drm_blob)?;
        writer.write_bytes(&self.middle)?;
        writer.write_bytes(&self.checksum)?;
        writer.write_bytes(&self.tail)
    }
}
