use super::{
    AdrmBox, BoxData, BoxFields, BoxId, BoxParser, ChplBox, ChunkOffsetBox, DataBox, EsdsBox,
    FrmaBox, FullBoxHeader, HdlrBox, Id32Box, MdhdBox, MeanBox, MehdBox, MfhdBox, MvhdBox,
    NameBox, SencBox, StscBox, StszBox, SttsBox, TfdtBox, TfhdBox, TkhdBox, TrexBox, TrunBox, stsd,
};
use crate::{FourCC, Result};
use std::{collections::HashMap, sync::LazyLock};

/// Builds the payload of a box whose header has just been read.
///
/// The reader is positioned at the first payload byte and limited to the end
/// of the box. Constructors of boxes with children call
/// [`BoxParser::read_children`] themselves.
pub type Constructor = fn(&mut BoxParser<'_>, BoxId) -> Result<BoxData>;

/// Maps box types to constructors.
///
/// Lookup checks the exact type first, then a rule registered for children of
/// the parent's type (used for `ilst` item atoms whose types are open ended),
/// and finally falls back to [`unknown`].
#[derive(Clone)]
pub struct BoxRegistry {
    definitions: HashMap<FourCC, Constructor>,
    parent_rules: HashMap<FourCC, Constructor>,
}

static DEFAULT: LazyLock<BoxRegistry> = LazyLock::new(BoxRegistry::mp4);

impl BoxRegistry {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
            parent_rules: HashMap::new(),
        }
    }

    /// Registry knowing every box type this crate models.
    pub fn mp4() -> Self {
        let mut registry = Self::new();

        for x in [
            b"moov", b"trak", b"mdia", b"minf", b"stbl", b"dinf", b"udta", b"moof", b"traf",
            b"mvex", b"sinf", b"schi", b"edts", b"mfra", b"ilst", b"----",
        ] {
            registry = registry.container(x);
        }

        registry
            .define(b"meta", meta)
            .define(b"mdat", media_data)
            .define(b"stsd", stsd::parse_stsd)
            .leaf::<AdrmBox>(b"adrm")
            .leaf::<ChplBox>(b"chpl")
            .leaf::<ChunkOffsetBox>(b"stco")
            .leaf::<ChunkOffsetBox>(b"co64")
            .leaf::<DataBox>(b"data")
            .leaf::<EsdsBox>(b"esds")
            .leaf::<FrmaBox>(b"frma")
            .leaf::<HdlrBox>(b"hdlr")
            .leaf::<Id32Box>(b"ID32")
            .leaf::<MdhdBox>(b"mdhd")
            .leaf::<MeanBox>(b"mean")
            .leaf::<MehdBox>(b"mehd")
            .leaf::<MfhdBox>(b"mfhd")
            .leaf::<MvhdBox>(b"mvhd")
            .leaf::<NameBox>(b"name")
            .leaf::<SencBox>(b"senc")
            .leaf::<StscBox>(b"stsc")
            .leaf::<StszBox>(b"stsz")
            .leaf::<SttsBox>(b"stts")
            .leaf::<TfdtBox>(b"tfdt")
            .leaf::<TfhdBox>(b"tfhd")
            .leaf::<TkhdBox>(b"tkhd")
            .leaf::<TrexBox>(b"trex")
            .leaf::<TrunBox>(b"trun")
            .children_of(b"ilst", container)
    }

    /// Shared instance of [`BoxRegistry::mp4`].
    pub fn default_ref() -> &'static BoxRegistry {
        &DEFAULT
    }

    pub fn define(mut self, box_type: &[u8; 4], constructor: Constructor) -> Self {
        self.definitions.insert(FourCC(*box_type), constructor);
        self
    }

    /// Declare a box type as a plain container.
    pub fn container(self, box_type: &[u8; 4]) -> Self {
        self.define(box_type, container)
    }

    /// Declare a box type whose payload is fully described by `T`.
    pub fn leaf<T: BoxFields + Into<BoxData>>(self, box_type: &[u8; 4]) -> Self {
        self.define(box_type, leaf::<T>)
    }

    /// Use `constructor` for any child of `parent_type` without its own definition.
    pub fn children_of(mut self, parent_type: &[u8; 4], constructor: Constructor) -> Self {
        self.parent_rules.insert(FourCC(*parent_type), constructor);
        self
    }

    pub fn lookup(&self, box_type: FourCC, parent_type: Option<FourCC>) -> Constructor {
        self.definitions
            .get(&box_type)
            .or_else(|| parent_type.and_then(|x| self.parent_rules.get(&x)))
            .copied()
            .unwrap_or(unknown)
    }
}

pub fn container(parser: &mut BoxParser<'_>, id: BoxId) -> Result<BoxData> {
    parser.read_children(id)?;
    Ok(BoxData::Container)
}

pub fn unknown(parser: &mut BoxParser<'_>, _: BoxId) -> Result<BoxData> {
    Ok(BoxData::Unknown(parser.reader().read_to_limit()?))
}

pub fn leaf<T: BoxFields + Into<BoxData>>(
    parser: &mut BoxParser<'_>,
    id: BoxId,
) -> Result<BoxData> {
    let header = parser.tree().header(id).clone();
    Ok(T::parse(parser.reader(), &header)?.into())
}

fn media_data(parser: &mut BoxParser<'_>, id: BoxId) -> Result<BoxData> {
    if parser.options().load_media_data {
        return unknown(parser, id);
    }

    let length = parser.reader().remaining();
    parser.reader().skip(length)?;
    Ok(BoxData::MediaData(length))
}

fn meta(parser: &mut BoxParser<'_>, id: BoxId) -> Result<BoxData> {
    // QuickTime writes 'meta' without version and flags, in which case the
    // payload starts directly with a child header such as 'hdlr'.
    let full = if parser.reader().remaining() >= 8 {
        let [_, _, _, _, a, b, c, d] = parser.reader().peek::<8>()?;
        let child_type = FourCC([a, b, c, d]);
        if child_type == b"hdlr" || child_type == b"ilst" || child_type == b"keys" {
            None
        } else {
            Some(FullBoxHeader::read(parser.reader())?)
        }
    } else {
        Some(FullBoxHeader::read(parser.reader())?)
    };

    parser.read_children(id)?;
    Ok(BoxData::Meta(full))
}
