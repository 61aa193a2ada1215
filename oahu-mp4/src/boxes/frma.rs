use super::{BoxFields, BoxHeader};
use crate::{FourCC, Reader, Result, Writer};

/// Original format of a protected sample entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrmaBox {
    pub data_format: FourCC,
}

impl BoxFields for FrmaBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        Ok(Self {
            data_format: reader.read_fourcc()?,
        })
    }

    fn fields_size(&self) -> u64 {
        4
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        writer.write_fourcc(self.data_format)
    }
}
