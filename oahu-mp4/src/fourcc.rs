use crate::{Error, Result};
use std::fmt;

/// A four character code identifying a box, a handler or a sample format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Builds a code from a string, which must be exactly four bytes of utf-8.
    pub fn new(value: &str) -> Result<Self> {
        let bytes: [u8; 4] = value.as_bytes().try_into().map_err(|_| {
            Error::invalid_input(format!(
                "'{}' is not a four character code ({} bytes)",
                value,
                value.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        Self(value)
    }
}

impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.0 == *other
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Item atoms such as '©nam' use latin-1.
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else if b == 0xA9 {
                write!(f, "©")?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        assert_eq!(FourCC::new("moov").unwrap(), FourCC(*b"moov"));
        assert!(FourCC::new("moo").is_err());
        assert!(FourCC::new("moovs").is_err());
        assert_eq!(FourCC::from_u32(0x6D6F6F76), FourCC(*b"moov"));
    }

    #[test]
    fn test_display() {
        assert_eq!(FourCC(*b"mp4a").to_string(), "mp4a");
        assert_eq!(FourCC([0xA9, b'n', b'a', b'm']).to_string(), "©nam");
        assert_eq!(FourCC([0, b'a', b'b', b'c']).to_string(), "\\x00abc");
    }
}
