use super::{BoxFields, BoxHeader, FullBoxHeader};
use crate::{Error, Reader, Result, Writer};

/// Sample Encryption Box (senc), one initialization vector per sample.
///
/// Sub-sample encryption (flag `0x02`) is not supported: such boxes fail to
/// parse instead of yielding IVs that would only cover parts of a sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SencBox {
    pub full: FullBoxHeader,
    /// Per-sample initialization vectors, all of the same width.
    pub ivs: Vec<Vec<u8>>,
}

impl SencBox {
    pub const USE_SUBSAMPLE_ENCRYPTION: u32 = 0x02;

    pub fn sample_count(&self) -> usize {
        self.ivs.len()
    }

    pub fn iv_size(&self) -> usize {
        self.ivs.first().map(|x| x.len()).unwrap_or_default()
    }
}

impl BoxFields for SencBox {
    fn parse(reader: &mut Reader, header: &BoxHeader) -> Result<Self> {
        let full = FullBoxHeader::read(reader)?;

        if full.has_flag(Self::USE_SUBSAMPLE_ENCRYPTION) {
            return Err(Error::unsupported(format!(
                "sub-sample encryption in 'senc' box at offset {}",
                header.file_position
            )));
        }

        let sample_count = reader.read_u32()? as u64;
        let remaining = reader.remaining();

        // Every sample carries an IV of the same width, so the width follows
        // from the bytes left in the box.
        if sample_count == 0 {
            if remaining != 0 {
                return Err(Error::decode(
                    reader.position(),
                    format!("{} bytes of IV data for zero samples", remaining),
                ));
            }
            return Ok(Self {
                full,
                ivs: Vec::new(),
            });
        }

        if remaining == 0 || remaining % sample_count != 0 {
            return Err(Error::decode(
                reader.position(),
                format!(
                    "{} bytes of IV data do not divide into {} samples",
                    remaining, sample_count
                ),
            ));
        }

        let iv_size = (remaining / sample_count) as usize;
        let mut ivs = Vec::with_capacity((remaining / iv_size.max(1) as u64) as usize);

        for _ in 0..sample_count {
            ivs.push(reader.read_bytes_u8(iv_size)?);
        }

        Ok(Self { full, ivs })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + self.ivs.iter().map(|x| x.len() as u64).sum::<u64>()
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u32(self.ivs.len() as u32)?;

        for iv in &self.ivs {
            writer.write_bytes(iv)?;
        }

        Ok(())
    }
}
