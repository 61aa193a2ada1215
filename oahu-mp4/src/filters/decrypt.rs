use super::{FrameEntry, FrameFilter};
use crate::{Error, Result};
use aes::{
    Aes128,
    cipher::{KeyIvInit, StreamCipher, generic_array::GenericArray},
};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// XORs `data` with the AES-128-CTR keystream for `key` and `iv`. IVs shorter
/// than a block are zero padded on the right, as `senc` stores 8 byte IVs.
pub fn apply_ctr(key: &[u8; 16], iv: &[u8], data: &mut [u8]) -> Result<()> {
    if iv.len() > 16 {
        return Err(Error::InvalidKey(format!(
            "initialization vector is {} bytes, at most 16 are allowed",
            iv.len()
        )));
    }

    let mut counter = [0u8; 16];
    counter[..iv.len()].copy_from_slice(iv);

    let mut cipher = Aes128Ctr::new(
        GenericArray::from_slice(key),
        GenericArray::from_slice(&counter),
    );
    cipher.apply_keystream(data);
    Ok(())
}

/// Decrypts frames in place with the content key and the IV each frame
/// carries. Without a key the stage passes frames through, but a frame that
/// does carry an IV is then a wiring error.
pub struct DecryptFilter {
    key: Option<[u8; 16]>,
    decrypted: u64,
}

impl DecryptFilter {
    pub fn new(key: Option<[u8; 16]>) -> Self {
        Self { key, decrypted: 0 }
    }

    pub fn decrypted(&self) -> u64 {
        self.decrypted
    }
}

impl FrameFilter for DecryptFilter {
    fn name(&self) -> &'static str {
        "decrypt"
    }

    fn input_buffer_size(&self) -> usize {
        1000
    }

    fn perform_filtering(&mut self, mut entry: FrameEntry) -> Result<FrameEntry> {
        let Some(iv) = entry.iv() else {
            return Ok(entry);
        };

        let Some(key) = &self.key else {
            return Err(Error::MissingKey {
                sample: entry.sample_index().unwrap_or_default(),
            });
        };

        let iv = iv.to_vec();
        apply_ctr(key, &iv, &mut entry.frame_data)?;
        self.decrypted += 1;
        Ok(entry)
    }
}

impl Drop for DecryptFilter {
    fn drop(&mut self) {
        if let Some(key) = self.key.as_mut() {
            key.fill(0);
        }
        log::trace!("decrypt stage released after {} frames", self.decrypted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::tests::entry;

    const KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];

    #[test]
    fn test_nist_vector() {
        // SP 800-38A F.5.1, first block.
        let counter = (0xf0..=0xff).collect::<Vec<u8>>();
        let mut data = [
            0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93,
            0x17, 0x2a,
        ];

        apply_ctr(&KEY, &counter, &mut data).unwrap();
        assert_eq!(
            data,
            [
                0x87, 0x4d, 0x61, 0x91, 0xb6, 0x20, 0xe3, 0x26, 0x1b, 0xef, 0x68, 0x64, 0x99, 0x0d,
                0xb6, 0xce
            ]
        );
    }

    #[test]
    fn test_round_trip_with_short_iv() {
        let plain = b"\x21\x10 some aac payload of odd length".to_vec();
        let iv = vec![9, 8, 7, 6, 5, 4, 3, 2];

        let mut encrypted = plain.clone();
        apply_ctr(&KEY, &iv, &mut encrypted).unwrap();
        assert_ne!(encrypted, plain);

        let mut filter = DecryptFilter::new(Some(KEY));
        let out = filter
            .perform_filtering(entry(0, &encrypted).with_iv(iv))
            .unwrap();
        assert_eq!(out.frame_data, plain);
        assert_eq!(filter.decrypted(), 1);
    }

    #[test]
    fn test_iv_without_key() {
        let mut filter = DecryptFilter::new(None);

        let clear = filter.perform_filtering(entry(0, &[1, 2])).unwrap();
        assert_eq!(clear.frame_data, vec![1, 2]);

        let err = filter
            .perform_filtering(entry(7, &[1, 2]).with_iv(vec![0; 8]))
            .unwrap_err();
        assert!(matches!(err, Error::MissingKey { sample: 7 }));
    }
}
