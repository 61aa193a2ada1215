use super::{BoxFields, BoxHeader, FullBoxHeader};
use crate::{Reader, Result, Writer, id3::Id3Tag};

/// ID3v2 tag stored in a `meta` box (`ID32`, 3GPP TS 26.244).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Id32Box {
    pub full: FullBoxHeader,
    /// One pad bit and three 5-bit ISO-639-2/T letters.
    pub language: u16,
    pub tag: Id3Tag,
}

impl BoxFields for Id32Box {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        Ok(Self {
            full: FullBoxHeader::read(reader)?,
            language: reader.read_u16()?,
            tag: Id3Tag::parse(reader)?,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 2 + self.tag.size()
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u16(self.language)?;
        self.tag.write(writer)
    }
}
