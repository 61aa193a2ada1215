use super::{BoxFields, BoxHeader, FullBoxHeader};
use crate::{
    Reader, Result, Writer,
    descriptors::{AudioSpecificConfig, DecoderConfigDescriptor, Descriptor},
};

/// Elementary stream description carried by `mp4a` style sample entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EsdsBox {
    pub full: FullBoxHeader,
    pub descriptors: Vec<Descriptor>,
}

impl EsdsBox {
    pub fn decoder_config(&self) -> Option<&DecoderConfigDescriptor> {
        self.descriptors.iter().find_map(|x| x.decoder_config())
    }

    pub fn audio_specific_config(&self) -> Option<Result<AudioSpecificConfig>> {
        self.descriptors
            .iter()
            .find_map(|x| x.audio_specific_config())
    }
}

impl BoxFields for EsdsBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;
        let mut descriptors = Vec::new();

        while reader.has_more_data() {
            descriptors.push(Descriptor::parse(reader)?);
        }

        Ok(Self { full, descriptors })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE
            + self
                .descriptors
                .iter()
                .map(|x| x.render_size().unwrap_or_default())
                .sum::<u64>()
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        for descriptor in &self.descriptors {
            descriptor.write(writer)?;
        }
        Ok(())
    }
}
