use super::utils::{Interrupt, KeyArgs};
use crate::progress::Progress;
use anyhow::Result;
use clap::Args;
use log::{info, warn};
use oahu_mp4::{
    Stop,
    convert::{self, DecryptOptions, DecryptReport},
    demux::Progress as DemuxProgress,
};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

/// Decrypt a protected audiobook into a plain MPEG-4 audio file.
#[derive(Debug, Clone, Args)]
pub struct Decrypt {
    /// Protected input file (.aax, .aaxc or fragmented .m4b).
    #[arg(required = true)]
    input: PathBuf,

    /// Path for the decrypted output file.
    #[arg(short, long, required = true)]
    output: PathBuf,

    #[command(flatten)]
    key: KeyArgs,

    /// Skip the sanity checks on decrypted AAC frames.
    #[arg(long)]
    no_validate: bool,
}

impl Decrypt {
    pub fn execute(self) -> Result<()> {
        let options = DecryptOptions {
            key: self.key.load()?,
            validate_aac: !self.no_validate,
        };
        let stop = Interrupt::install()?;

        let length = fs::metadata(&self.input)?.len();
        let mut progress = Progress::new("decrypt", length);
        let result = decrypt_to(&self.input, &self.output, &options, &stop, |x| progress.update(x));
        drop(progress);
        let report = result?;

        info!(
            "decrypted {} frames, {} protection boxes removed, saved as {}",
            report.frames,
            report.strip.neutralized,
            self.output.display()
        );
        Ok(())
    }
}

/// Decrypts `input` into a new file at `output`, which is removed again if
/// anything fails on the way.
fn decrypt_to<F: FnMut(DemuxProgress)>(
    input: &Path,
    output: &Path,
    options: &DecryptOptions,
    stop: &dyn Stop,
    progress: F,
) -> Result<DecryptReport> {
    let mut source = File::open(input)?;
    let file = File::create(output)?;

    let result = (|| -> Result<DecryptReport> {
        let mut writer = BufWriter::new(file);
        let report = convert::decrypt_file(&mut source, &mut writer, options, stop, progress)?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        Ok(report)
    })();

    if let Err(e) = &result {
        match e.downcast_ref::<oahu_mp4::Error>() {
            Some(x) if x.is_stopped() => warn!("interrupted, removing {}", output.display()),
            _ => warn!("removing incomplete {}", output.display()),
        }
        if let Err(e) = fs::remove_file(output) {
            warn!("could not remove {}: {}", output.display(), e);
        }
    }
    result
}
