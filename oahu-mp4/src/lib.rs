#![cfg_attr(docsrs, feature(doc_cfg))]

//! This crate contains the container and decryption core used to turn
//! protected audiobook files (`.aax`, `.aaxc`, DASH style `.m4b`) into plain
//! MPEG-4 audio.
//!
//! - [`boxes`]: a recursive ISO-BMFF box parser and renderer. Unknown boxes are
//!   kept verbatim so a parsed tree renders back byte for byte.
//! - [`filters`]: a chain of frame stages (decryption, AAC validation, chapter
//!   notification and splitting) fed by the [`demux`] stage in sample order.
//! - [`voucher`] and [`chapters`]: license documents and chapter tables.
//! - [`convert`]: file level entry points tying everything together.
//!
//! # Quick Start
//!
//! ```no_run
//! use oahu_mp4::{Unstoppable, convert, voucher::Voucher};
//! use std::fs::File;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let voucher = Voucher::load("book.voucher")?;
//!     let options = convert::DecryptOptions::new(Some(voucher.key_material()?));
//!
//!     let mut input = File::open("book.aaxc")?;
//!     let mut output = File::create("book.m4b")?;
//!     convert::decrypt_file(&mut input, &mut output, &options, &Unstoppable, |_| ())?;
//!     Ok(())
//! }
//! ```

pub mod boxes;
pub mod chapters;
pub mod convert;
pub mod demux;
pub mod descriptors;
pub mod filters;
pub mod id3;
pub mod remux;
pub mod voucher;

mod error;
mod fourcc;
mod reader;
mod writer;

pub use enough::{Stop, StopReason, Unstoppable};
pub use error::{Error, Result};
pub use fourcc::FourCC;
pub use reader::{ReadSeek, Reader};
pub use writer::{WriteSeek, Writer};
