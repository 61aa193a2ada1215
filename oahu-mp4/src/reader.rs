use crate::{Error, FourCC, Result};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// Any seekable byte source.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Big-endian reader over a seekable stream.
///
/// Every read is checked against a movable limit, which the box parser sets to
/// the end of the box being decoded. Reading past it is a decode error rather
/// than a silent read into the next box.
pub struct Reader<'a> {
    inner: &'a mut dyn ReadSeek,
    position: u64,
    length: u64,
    limit: u64,
}

impl<'a> Reader<'a> {
    pub fn new(inner: &'a mut dyn ReadSeek) -> Result<Self> {
        let position = inner.stream_position()?;
        let length = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(position))?;

        Ok(Self {
            inner,
            position,
            length,
            limit: length,
        })
    }

    pub fn has_more_data(&self) -> bool {
        self.position < self.limit
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Bytes left before the current limit.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.position)
    }

    /// Replaces the read limit and returns the previous one.
    pub fn set_limit(&mut self, limit: u64) -> u64 {
        std::mem::replace(&mut self.limit, limit.min(self.length))
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.length {
            return Err(Error::decode(
                position,
                format!("seek beyond end of stream ({} bytes)", self.length),
            ));
        }

        self.inner.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    pub fn skip(&mut self, bytes: u64) -> Result<()> {
        self.ensure(bytes)?;
        self.seek(self.position + bytes)
    }

    fn ensure(&self, bytes: u64) -> Result<()> {
        if bytes > self.remaining() {
            return Err(Error::decode(
                self.position,
                format!(
                    "need {} bytes but only {} remain in the enclosing box",
                    bytes,
                    self.remaining()
                ),
            ));
        }
        Ok(())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure(buf.len() as u64)?;
        let position = self.position;
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::decode(position, "unexpected end of stream"),
            _ => Error::Io(e),
        })?;
        self.position += buf.len() as u64;
        Ok(())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let [a, b, c] = self.read_array()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        Ok(FourCC(self.read_array()?))
    }

    pub fn read_bytes_u8(&mut self, bytes: usize) -> Result<Vec<u8>> {
        self.ensure(bytes as u64)?;
        let mut buf = vec![0; bytes];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads everything up to the current limit.
    pub fn read_to_limit(&mut self) -> Result<Vec<u8>> {
        let size = usize::try_from(self.remaining()).map_err(|_| {
            Error::decode(self.position, "payload too large to load into memory")
        })?;
        self.read_bytes_u8(size)
    }

    /// Reads `N` bytes without advancing.
    pub fn peek<const N: usize>(&mut self) -> Result<[u8; N]> {
        let position = self.position;
        let buf = self.read_array()?;
        self.seek(position)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads() {
        let mut data = Cursor::new(vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        let mut reader = Reader::new(&mut data).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 0);
        assert_eq!(reader.read_u24().unwrap(), 0x010203);
        assert_eq!(reader.peek::<2>().unwrap(), [4, 5]);
        assert_eq!(reader.read_u32().unwrap(), 0x04050607);
        assert_eq!(reader.remaining(), 1);
        assert!(reader.read_u16().is_err());
    }

    #[test]
    fn test_limit() {
        let mut data = Cursor::new(vec![0; 16]);
        let mut reader = Reader::new(&mut data).unwrap();
        let old = reader.set_limit(4);
        assert_eq!(old, 16);
        assert!(reader.read_u32().is_ok());
        let err = reader.read_u8().unwrap_err();
        assert!(err.is_decode_err());
        reader.set_limit(old);
        assert_eq!(reader.read_bytes_u8(12).unwrap().len(), 12);
        assert!(!reader.has_more_data());
    }
}
