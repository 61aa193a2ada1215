use super::{BoxData, BoxFields, BoxHeader, BoxId, FullBoxHeader, Mp4Tree};
use crate::{FourCC, Reader, Result, Writer};

/// Well-known type indicators of iTunes `data` boxes.
pub mod data_type {
    pub const BINARY: u32 = 0;
    pub const UTF8: u32 = 1;
    pub const UTF16: u32 = 2;
    pub const JPEG: u32 = 13;
    pub const PNG: u32 = 14;
    pub const SIGNED_INT: u32 = 21;
}

/// Reverse DNS domain of a freeform (`----`) tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeanBox {
    pub full: FullBoxHeader,
    pub domain: String,
}

/// Name of a freeform (`----`) tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameBox {
    pub full: FullBoxHeader,
    pub name: String,
}

fn read_string(reader: &mut Reader) -> Result<String> {
    Ok(String::from_utf8(reader.read_to_limit()?)?)
}

impl MeanBox {
    pub fn create(tree: &mut Mp4Tree, parent: Option<BoxId>, domain: &str) -> Result<BoxId> {
        let data = Self {
            full: FullBoxHeader::default(),
            domain: domain.to_owned(),
        };
        tree.append(parent, FourCC(*b"mean"), data.into())
    }
}

impl NameBox {
    pub fn create(tree: &mut Mp4Tree, parent: Option<BoxId>, name: &str) -> Result<BoxId> {
        let data = Self {
            full: FullBoxHeader::default(),
            name: name.to_owned(),
        };
        tree.append(parent, FourCC(*b"name"), data.into())
    }
}

impl BoxFields for MeanBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        Ok(Self {
            full: FullBoxHeader::read(reader)?,
            domain: read_string(reader)?,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + self.domain.len() as u64
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_bytes(self.domain.as_bytes())
    }
}

impl BoxFields for NameBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        Ok(Self {
            full: FullBoxHeader::read(reader)?,
            name: read_string(reader)?,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + self.name.len() as u64
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_bytes(self.name.as_bytes())
    }
}

/// Value of an iTunes metadata item.
///
/// The version byte and 24-bit flags of the full box header double as the
/// type indicator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataBox {
    pub full: FullBoxHeader,
    pub locale: u32,
    pub value: Vec<u8>,
}

impl DataBox {
    pub fn data_type(&self) -> u32 {
        self.full.flags
    }

    pub fn as_text(&self) -> Option<String> {
        match self.data_type() {
            data_type::UTF8 => String::from_utf8(self.value.clone()).ok(),
            _ => None,
        }
    }

    pub fn create(
        tree: &mut Mp4Tree,
        parent: Option<BoxId>,
        value: &[u8],
        data_type: u32,
    ) -> Result<BoxId> {
        let data = Self {
            full: FullBoxHeader::new(0, data_type),
            locale: 0,
            value: value.to_vec(),
        };
        tree.append(parent, FourCC(*b"data"), data.into())
    }
}

impl BoxFields for DataBox {
    fn parse(reader: &mut Reader, _: &BoxHeader) -> Result<Self> {
        Ok(Self {
            full: FullBoxHeader::read(reader)?,
            locale: reader.read_u32()?,
            value: reader.read_to_limit()?,
        })
    }

    fn fields_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + self.value.len() as u64
    }

    fn write_fields(&self, writer: &mut Writer) -> Result<()> {
        self.full.write(writer)?;
        writer.write_u32(self.locale)?;
        writer.write_bytes(&self.value)
    }
}

/// Appends a `----` tag (`mean`, `name` and `data` children) to an `ilst` box.
pub fn create_freeform_tag(
    tree: &mut Mp4Tree,
    ilst: Option<BoxId>,
    domain: &str,
    name: &str,
    value: &[u8],
    data_type: u32,
) -> Result<BoxId> {
    let tag = tree.append(ilst, FourCC(*b"----"), BoxData::Container)?;
    MeanBox::create(tree, Some(tag), domain)?;
    NameBox::create(tree, Some(tag), name)?;
    DataBox::create(tree, Some(tag), value, data_type)?;
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::parse_tree;
    use std::io::Cursor;

    #[test]
    fn test_mean_size_matches_parser() {
        let mut tree = Mp4Tree::new();
        let id = MeanBox::create(&mut tree, None, "com.apple.iTunes").unwrap();
        assert_eq!(tree.render_size(id), 16 + 12);
        assert_eq!(tree.header(id).total_box_size, tree.render_size(id));
    }

    #[test]
    fn test_freeform_tag_reparses() {
        let mut tree = Mp4Tree::new();
        let ilst = tree.append(None, FourCC(*b"ilst"), BoxData::Container).unwrap();
        create_freeform_tag(
            &mut tree,
            Some(ilst),
            "com.apple.iTunes",
            "AUDIBLE_ASIN",
            b"B00TEST123",
            data_type::UTF8,
        )
        .unwrap();

        let tag = tree.child(ilst, b"----").unwrap();
        assert_eq!(tree.header(tag).total_box_size, tree.render_size(tag));
        assert_eq!(tree.header(ilst).total_box_size, tree.render_size(ilst));

        let mut out = Vec::new();
        tree.write_all(&mut out).unwrap();
        assert_eq!(out.len() as u64, tree.header(ilst).total_box_size);

        let parsed = parse_tree(&mut Cursor::new(out.clone()), Default::default()).unwrap();
        let tag = parsed.find_path(None, "ilst/----").unwrap();
        match parsed.data(parsed.child(tag, b"name").unwrap()) {
            BoxData::Name(x) => assert_eq!(x.name, "AUDIBLE_ASIN"),
            x => panic!("unexpected {:?}", x),
        }
        match parsed.data(parsed.child(tag, b"data").unwrap()) {
            BoxData::Data(x) => assert_eq!(x.as_text().as_deref(), Some("B00TEST123")),
            x => panic!("unexpected {:?}", x),
        }

        let mut rendered = Vec::new();
        parsed.write_all(&mut rendered).unwrap();
        assert_eq!(rendered, out);
    }
}
