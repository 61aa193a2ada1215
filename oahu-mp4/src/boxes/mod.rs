//! ISO-BMFF box model.
//!
//! Boxes are parsed into an arena ([`Mp4Tree`]) where every node owns its
//! header, its children (by index) and a [`BoxData`] payload. Payloads are a
//! closed set of typed variants with an [`BoxData::Unknown`] catch-all that keeps
//! unrecognized boxes byte for byte.

mod adrm;
mod chpl;
mod esds;
mod fragment;
mod frma;
mod header;
mod id32;
mod movie;
mod parser;
mod registry;
mod sample_table;
mod senc;
mod stsd;
mod tags;
mod tree;

pub use adrm::AdrmBox;
pub use chpl::{ChplBox, ChplEntry};
pub use esds::EsdsBox;
pub use fragment::{
    MehdBox, MfhdBox, TfdtBox, TfhdBox, TrexBox, TrunBox, TrunSample, tfhd_flags, trun_flags,
};
pub use frma::FrmaBox;
pub use header::{BoxHeader, FullBoxHeader};
pub use id32::Id32Box;
pub use movie::{HdlrBox, MdhdBox, MvhdBox, TkhdBox};
pub use parser::{BoxParser, ParseOptions, parse_tree};
pub use registry::{BoxRegistry, Constructor};
pub use sample_table::{ChunkOffsetBox, StscBox, StscEntry, StszBox, SttsBox, SttsEntry};
pub use senc::SencBox;
pub use stsd::{AudioSampleEntry, StsdBox, VisualSampleEntry};
pub use tags::{DataBox, MeanBox, NameBox, create_freeform_tag, data_type};
pub use tree::{BoxId, Mp4Tree, Node};

use crate::{Reader, Result, Writer};

/// Fixed and variable fields a box owns besides its header and children.
pub trait BoxFields: Sized {
    fn parse(reader: &mut Reader, header: &BoxHeader) -> Result<Self>;

    /// Byte length of the fields, excluding header and children.
    fn fields_size(&self) -> u64;

    fn write_fields(&self, writer: &mut Writer) -> Result<()>;
}

macro_rules! box_data {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// Payload of one node in the tree.
        #[derive(Clone, Debug, PartialEq)]
        pub enum BoxData {
            /// Plain container, only children.
            Container,
            /// `meta`, a full box container in ISO files and a plain one in QuickTime.
            Meta(Option<FullBoxHeader>),
            /// `mdat` payload that was skipped while parsing, with its length.
            MediaData(u64),
            /// Unrecognized box, payload kept verbatim.
            Unknown(Vec<u8>),
            $($variant($ty),)*
        }

        $(
            impl From<$ty> for BoxData {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*

        impl BoxData {
            pub fn fields_size(&self) -> u64 {
                match self {
                    Self::Container => 0,
                    Self::Meta(x) => if x.is_some() { FullBoxHeader::SIZE } else { 0 },
                    Self::MediaData(x) => *x,
                    Self::Unknown(x) => x.len() as u64,
                    $(Self::$variant(x) => x.fields_size(),)*
                }
            }

            pub fn write_fields(&self, writer: &mut Writer) -> Result<()> {
                match self {
                    Self::Container => Ok(()),
                    Self::Meta(x) => match x {
                        Some(x) => x.write(writer),
                        None => Ok(()),
                    },
                    Self::MediaData(_) => Err(crate::Error::unsupported(
                        "media payload was not loaded and cannot be rendered from the tree",
                    )),
                    Self::Unknown(x) => writer.write_bytes(x),
                    $(Self::$variant(x) => x.write_fields(writer),)*
                }
            }

            pub fn kind(&self) -> &'static str {
                match self {
                    Self::Container => "Container",
                    Self::Meta(_) => "Meta",
                    Self::MediaData(_) => "MediaData",
                    Self::Unknown(_) => "Unknown",
                    $(Self::$variant(_) => stringify!($variant),)*
                }
            }
        }
    };
}

box_data! {
    Adrm(AdrmBox),
    AudioSampleEntry(AudioSampleEntry),
    ChunkOffset(ChunkOffsetBox),
    Chpl(ChplBox),
    Data(DataBox),
    Esds(EsdsBox),
    Frma(FrmaBox),
    Hdlr(HdlrBox),
    Id32(Id32Box),
    Mdhd(MdhdBox),
    Mean(MeanBox),
    Mehd(MehdBox),
    Mfhd(MfhdBox),
    Mvhd(MvhdBox),
    Name(NameBox),
    Senc(SencBox),
    Stsc(StscBox),
    Stsd(StsdBox),
    Stsz(StszBox),
    Stts(SttsBox),
    Tfdt(TfdtBox),
    Tfhd(TfhdBox),
    Tkhd(TkhdBox),
    Trex(TrexBox),
    Trun(TrunBox),
    VisualSampleEntry(VisualSampleEntry),
}

impl BoxData {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// Whether children may follow the fields of this payload.
    pub fn has_children(&self) -> bool {
        matches!(
            self,
            Self::Container
                | Self::Meta(_)
                | Self::Stsd(_)
                | Self::AudioSampleEntry(_)
                | Self::VisualSampleEntry(_)
        )
    }
}
