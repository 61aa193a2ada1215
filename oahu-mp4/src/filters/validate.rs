use super::{FrameEntry, FrameFilter};
use crate::{Error, Result};

/// Largest raw AAC frame per channel (ISO/IEC 14496-3, 6144 bits).
const MAX_BYTES_PER_CHANNEL: usize = 768;

/// Syntactic element id that terminates a raw data block.
const ID_END: u8 = 7;

/// Rejects AAC frames that cannot be valid, which is also how a wrong key
/// usually shows up after decryption.
pub struct AacValidateFilter {
    channels: u16,
}

impl AacValidateFilter {
    pub fn new(channels: u16) -> Self {
        Self {
            channels: channels.max(1),
        }
    }

    fn check(&self, data: &[u8]) -> Option<String> {
        let max = MAX_BYTES_PER_CHANNEL * self.channels as usize;

        match data.first() {
            None => Some("empty frame".to_owned()),
            Some(_) if data.len() > max => Some(format!(
                "{} bytes exceed the {} byte limit for {} channel(s)",
                data.len(),
                max,
                self.channels
            )),
            Some(x) if x >> 5 == ID_END && data.len() > 1 => {
                Some("raw data block ends before its first element".to_owned())
            }
            _ => None,
        }
    }
}

impl FrameFilter for AacValidateFilter {
    fn name(&self) -> &'static str {
        "aac-validate"
    }

    fn perform_filtering(&mut self, entry: FrameEntry) -> Result<FrameEntry> {
        match self.check(&entry.frame_data) {
            Some(reason) => Err(Error::InvalidFrame {
                stage: self.name(),
                sample: entry.sample_index().unwrap_or_default(),
                reason,
            }),
            None => Ok(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::tests::entry;

    #[test]
    fn test_rejects_malformed() {
        let mut filter = AacValidateFilter::new(2);

        assert!(filter.perform_filtering(entry(0, &[0x21, 0x1A, 0x00])).is_ok());
        assert!(filter.perform_filtering(entry(1, &[])).is_err());
        assert!(filter.perform_filtering(entry(2, &[0x21; 1537])).is_err());

        let err = filter
            .perform_filtering(entry(3, &[0xE0, 0x00]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFrame { sample: 3, .. }));
    }
}
