//! ID3v2.3 and v2.4 tags, as embedded in `ID32` boxes.
//!
//! Only the frames needed for chapter discovery are interpreted (`T***` text
//! frames and `CHAP`); everything else is kept as raw bytes so the tag renders
//! back unchanged.

use crate::{Error, Reader, Result, Writer};
use std::time::Duration;

const HEADER_SIZE: u64 = 10;
const FRAME_HEADER_SIZE: u64 = 10;

pub mod encoding {
    pub const LATIN1: u8 = 0;
    pub const UTF16: u8 = 1;
    pub const UTF16BE: u8 = 2;
    pub const UTF8: u8 = 3;
}

fn read_syncsafe(reader: &mut Reader) -> Result<u32> {
    let position = reader.position();
    let bytes: [u8; 4] = reader.read_array()?;

    if bytes.iter().any(|x| x & 0x80 != 0) {
        return Err(Error::decode(position, "syncsafe integer has its high bit set"));
    }

    Ok(bytes.iter().fold(0, |acc, x| (acc << 7) | *x as u32))
}

fn write_syncsafe(value: u64, writer: &mut Writer) -> Result<()> {
    if value >= 1 << 28 {
        return Err(Error::invalid_input(format!(
            "{} does not fit a syncsafe integer",
            value
        )));
    }

    for shift in [21, 14, 7, 0] {
        writer.write_u8(((value >> shift) & 0x7F) as u8)?;
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Id3Header {
    /// Major version, 3 or 4.
    pub version: u8,
    pub revision: u8,
    pub flags: u8,
}

impl Id3Header {
    const UNSYNCHRONISATION: u8 = 0x80;
    const EXTENDED_HEADER: u8 = 0x40;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextFrame {
    pub id: [u8; 4],
    pub flags: u16,
    /// Encoding byte followed by the encoded string.
    pub data: Vec<u8>,
}

impl TextFrame {
    pub fn new(id: [u8; 4], text: &str) -> Self {
        let mut data = vec![encoding::UTF8];
        data.extend(text.as_bytes());
        Self { id, flags: 0, data }
    }

    pub fn text(&self) -> Result<String> {
        decode_text(&self.data)
    }
}

/// `CHAP` frame. Times are in milliseconds, offsets are byte offsets into
/// the audio stream (`0xFFFFFFFF` when unused).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterFrame {
    pub flags: u16,
    pub element_id: Vec<u8>,
    pub start_time: u32,
    pub end_time: u32,
    pub start_offset: u32,
    pub end_offset: u32,
    pub frames: Vec<Id3Frame>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownFrame {
    pub id: [u8; 4],
    pub flags: u16,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Id3Frame {
    Text(TextFrame),
    Chapter(ChapterFrame),
    Unknown(UnknownFrame),
}

impl Id3Frame {
    pub fn id(&self) -> [u8; 4] {
        match self {
            Self::Text(x) => x.id,
            Self::Chapter(_) => *b"CHAP",
            Self::Unknown(x) => x.id,
        }
    }

    fn read(reader: &mut Reader, version: u8) -> Result<Self> {
        let position = reader.position();
        let id: [u8; 4] = reader.read_array()?;
        let size = if version >= 4 {
            read_syncsafe(reader)?
        } else {
            reader.read_u32()?
        } as u64;
        let flags = reader.read_u16()?;

        let end = reader.position() + size;
        if end > reader.limit() {
            return Err(Error::decode(
                position,
                format!(
                    "ID3 frame '{}' of {} bytes runs past the end of the tag",
                    String::from_utf8_lossy(&id),
                    size
                ),
            ));
        }

        let outer = reader.set_limit(end);
        let frame = Self::read_body(reader, id, flags, version);
        reader.set_limit(outer);
        frame
    }

    fn read_body(reader: &mut Reader, id: [u8; 4], flags: u16, version: u8) -> Result<Self> {
        if &id == b"CHAP" {
            let mut element_id = Vec::new();
            loop {
                match reader.read_u8()? {
                    0 => break,
                    x => element_id.push(x),
                }
            }

            let start_time = reader.read_u32()?;
            let end_time = reader.read_u32()?;
            let start_offset = reader.read_u32()?;
            let end_offset = reader.read_u32()?;

            let mut frames = Vec::new();
            while reader.remaining() >= FRAME_HEADER_SIZE {
                frames.push(Self::read(reader, version)?);
            }
            // Anything shorter than a frame header is sub-frame padding.
            let padding = reader.read_to_limit()?;
            if padding.iter().any(|x| *x != 0) {
                return Err(Error::decode(
                    reader.position(),
                    "trailing bytes inside CHAP frame",
                ));
            }

            Ok(Self::Chapter(ChapterFrame {
                flags,
                element_id,
                start_time,
                end_time,
                start_offset,
                end_offset,
                frames,
            }))
        } else if id[0] == b'T' && &id != b"TXXX" {
            Ok(Self::Text(TextFrame {
                id,
                flags,
                data: reader.read_to_limit()?,
            }))
        } else {
            Ok(Self::Unknown(UnknownFrame {
                id,
                flags,
                data: reader.read_to_limit()?,
            }))
        }
    }

    fn body_size(&self) -> u64 {
        match self {
            Self::Text(x) => x.data.len() as u64,
            Self::Chapter(x) => {
                x.element_id.len() as u64 + 1 + 16 + x.frames.iter().map(|f| f.size()).sum::<u64>()
            }
            Self::Unknown(x) => x.data.len() as u64,
        }
    }

    pub fn size(&self) -> u64 {
        FRAME_HEADER_SIZE + self.body_size()
    }

    fn write(&self, writer: &mut Writer, version: u8) -> Result<()> {
        let flags = match self {
            Self::Text(x) => x.flags,
            Self::Chapter(x) => x.flags,
            Self::Unknown(x) => x.flags,
        };

        writer.write_bytes(&self.id())?;
        let body = self.body_size();
        if version >= 4 {
            write_syncsafe(body, writer)?;
        } else {
            let body = u32::try_from(body)
                .map_err(|_| Error::invalid_input("ID3 frame larger than 4 GiB"))?;
            writer.write_u32(body)?;
        }
        writer.write_u16(flags)?;

        match self {
            Self::Text(x) => writer.write_bytes(&x.data)?,
            Self::Unknown(x) => writer.write_bytes(&x.data)?,
            Self::Chapter(x) => {
                writer.write_bytes(&x.element_id)?;
                writer.write_u8(0)?;
                writer.write_u32(x.start_time)?;
                writer.write_u32(x.end_time)?;
                writer.write_u32(x.start_offset)?;
                writer.write_u32(x.end_offset)?;
                for frame in &x.frames {
                    frame.write(writer, version)?;
                }
            }
        }

        Ok(())
    }
}

/// Chapter described by a `CHAP` frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Id3Chapter {
    pub element_id: String,
    pub title: Option<String>,
    pub start: Duration,
    pub end: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Id3Tag {
    pub header: Id3Header,
    pub frames: Vec<Id3Frame>,
    pub padding: Vec<u8>,
}

impl Id3Tag {
    pub fn new() -> Self {
        Self {
            header: Id3Header {
                version: 4,
                revision: 0,
                flags: 0,
            },
            frames: Vec::new(),
            padding: Vec::new(),
        }
    }

    pub fn parse(reader: &mut Reader) -> Result<Self> {
        let position = reader.position();
        let magic: [u8; 3] = reader.read_array()?;
        if &magic != b"ID3" {
            return Err(Error::decode(position, "missing ID3 signature"));
        }

        let header = Id3Header {
            version: reader.read_u8()?,
            revision: reader.read_u8()?,
            flags: reader.read_u8()?,
        };

        if !matches!(header.version, 3 | 4) {
            return Err(Error::unsupported(format!("ID3v2.{} tag", header.version)));
        }
        if header.flags & (Id3Header::UNSYNCHRONISATION | Id3Header::EXTENDED_HEADER) != 0 {
            return Err(Error::unsupported(
                "ID3 tag with unsynchronisation or an extended header",
            ));
        }

        let size = read_syncsafe(reader)? as u64;
        let end = reader.position() + size;
        if end > reader.limit() {
            return Err(Error::decode(
                position,
                format!("ID3 tag of {} bytes runs past its container", size),
            ));
        }

        let outer = reader.set_limit(end);
        let frames = Self::read_frames(reader, header.version);
        let padding = frames.as_ref().ok().map(|_| reader.read_to_limit());
        reader.set_limit(outer);

        let frames = frames?;
        let padding = padding.transpose()?.unwrap_or_default();
        Ok(Self {
            header,
            frames,
            padding,
        })
    }

    fn read_frames(reader: &mut Reader, version: u8) -> Result<Vec<Id3Frame>> {
        let mut frames = Vec::new();
        while reader.remaining() >= FRAME_HEADER_SIZE && reader.peek::<1>()?[0] != 0 {
            frames.push(Id3Frame::read(reader, version)?);
        }
        Ok(frames)
    }

    pub fn size(&self) -> u64 {
        HEADER_SIZE + self.body_size()
    }

    fn body_size(&self) -> u64 {
        self.frames.iter().map(|x| x.size()).sum::<u64>() + self.padding.len() as u64
    }

    pub fn write(&self, writer: &mut Writer) -> Result<()> {
        writer.write_bytes(b"ID3")?;
        writer.write_u8(self.header.version)?;
        writer.write_u8(self.header.revision)?;
        writer.write_u8(self.header.flags)?;
        write_syncsafe(self.body_size(), writer)?;

        for frame in &self.frames {
            frame.write(writer, self.header.version)?;
        }
        writer.write_bytes(&self.padding)
    }

    /// Text of the first top-level frame with `id`.
    pub fn text(&self, id: &[u8; 4]) -> Option<String> {
        text_of(&self.frames, id)
    }

    pub fn chapters(&self) -> Vec<Id3Chapter> {
        self.frames
            .iter()
            .filter_map(|x| match x {
                Id3Frame::Chapter(chap) => Some(Id3Chapter {
                    element_id: String::from_utf8_lossy(&chap.element_id).into_owned(),
                    title: text_of(&chap.frames, b"TIT2"),
                    start: Duration::from_millis(chap.start_time as u64),
                    end: Duration::from_millis(chap.end_time as u64),
                }),
                _ => None,
            })
            .collect()
    }
}

impl Default for Id3Tag {
    fn default() -> Self {
        Self::new()
    }
}

fn text_of(frames: &[Id3Frame], id: &[u8; 4]) -> Option<String> {
    frames.iter().find_map(|x| match x {
        Id3Frame::Text(text) if &text.id == id => text.text().ok(),
        _ => None,
    })
}

fn utf16(data: &[u8], big_endian: bool) -> Result<String> {
    let units = data
        .chunks_exact(2)
        .map(|x| {
            if big_endian {
                u16::from_be_bytes([x[0], x[1]])
            } else {
                u16::from_le_bytes([x[0], x[1]])
            }
        })
        .collect::<Vec<_>>();

    String::from_utf16(&units).map_err(|_| Error::decode(0, "invalid utf-16 text"))
}

/// Decodes an encoding byte followed by text. Terminating nulls are dropped.
pub fn decode_text(data: &[u8]) -> Result<String> {
    let Some((encoding, text)) = data.split_first() else {
        return Ok(String::new());
    };

    let text = match *encoding {
        encoding::LATIN1 => text.iter().map(|x| *x as char).collect(),
        encoding::UTF16 => match text {
            [0xFF, 0xFE, rest @ ..] => utf16(rest, false)?,
            [0xFE, 0xFF, rest @ ..] => utf16(rest, true)?,
            _ => utf16(text, false)?,
        },
        encoding::UTF16BE => utf16(text, true)?,
        encoding::UTF8 => String::from_utf8(text.to_vec())?,
        x => {
            return Err(Error::decode(0, format!("unknown ID3 text encoding {}", x)));
        }
    };

    Ok(text.trim_end_matches('\0').to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend((body.len() as u32).to_be_bytes());
        out.extend([0, 0]);
        out.extend(body);
        out
    }

    fn tag(version: u8, frames: &[u8], padding: usize) -> Vec<u8> {
        let size = frames.len() + padding;
        let mut out = vec![b'I', b'D', b'3', version, 0, 0];
        out.extend([
            (size >> 21) as u8 & 0x7F,
            (size >> 14) as u8 & 0x7F,
            (size >> 7) as u8 & 0x7F,
            size as u8 & 0x7F,
        ]);
        out.extend(frames);
        out.extend(vec![0; padding]);
        out
    }

    fn parse(bytes: &[u8]) -> Result<Id3Tag> {
        let mut data = Cursor::new(bytes.to_vec());
        let mut reader = Reader::new(&mut data)?;
        Id3Tag::parse(&mut reader)
    }

    #[test]
    fn test_text_encodings() {
        assert_eq!(decode_text(b"\x00caf\xe9").unwrap(), "café");
        assert_eq!(decode_text(b"\x01\xff\xfeh\x00i\x00").unwrap(), "hi");
        assert_eq!(decode_text(b"\x02\x00h\x00i").unwrap(), "hi");
        assert_eq!(decode_text(b"\x03hi\x00").unwrap(), "hi");
        assert!(decode_text(b"\x07hi").is_err());
    }

    #[test]
    fn test_chapters_round_trip() {
        let mut chap = b"ch0\0".to_vec();
        chap.extend(0u32.to_be_bytes());
        chap.extend(1500u32.to_be_bytes());
        chap.extend(u32::MAX.to_be_bytes());
        chap.extend(u32::MAX.to_be_bytes());
        chap.extend(frame(b"TIT2", b"\x03Opening"));

        let mut frames = frame(b"TIT2", b"\x00Book");
        frames.extend(frame(b"CHAP", &chap));
        frames.extend(frame(b"APIC", &[1, 2, 3]));
        let bytes = tag(3, &frames, 16);

        let tag = parse(&bytes).unwrap();
        assert_eq!(tag.frames.len(), 3);
        assert_eq!(tag.padding.len(), 16);
        assert_eq!(tag.text(b"TIT2").as_deref(), Some("Book"));

        let chapters = tag.chapters();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title.as_deref(), Some("Opening"));
        assert_eq!(chapters[0].end, Duration::from_millis(1500));

        let mut out = Vec::new();
        tag.write(&mut Writer::new(&mut out)).unwrap();
        assert_eq!(out, bytes);
        assert_eq!(tag.size(), bytes.len() as u64);
    }

    #[test]
    fn test_frame_overruns_tag() {
        let mut frames = frame(b"TIT2", b"\x00Book");
        frames[7] = 0x40;
        assert!(parse(&tag(3, &frames, 0)).unwrap_err().is_decode_err());
    }

    #[test]
    fn test_limit_restored_after_error() {
        let mut frames = frame(b"TIT2", b"\x00Book");
        frames[7] = 0x40;
        let mut data = Cursor::new(tag(4, &frames, 4));
        let mut reader = Reader::new(&mut data).unwrap();
        let limit = reader.limit();

        assert!(Id3Tag::parse(&mut reader).is_err());
        assert_eq!(reader.limit(), limit);
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = tag(3, &[], 0);
        bytes[3] = 2;
        assert!(matches!(parse(&bytes), Err(Error::Unsupported(_))));
    }
}
