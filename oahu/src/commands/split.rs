use super::utils::{Interrupt, KeyArgs, file_name};
use crate::progress::Progress;
use anyhow::Result;
use clap::Args;
use log::info;
use oahu_mp4::{
    convert::{self, SplitOptions},
    demux::Mp4File,
};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
};

/// Split the audio of a book into one file per chapter.
#[derive(Debug, Clone, Args)]
pub struct Split {
    /// Input file, protected or plain.
    #[arg(required = true)]
    input: PathBuf,

    /// Directory receiving the chapter files.
    #[arg(short, long, required = true)]
    output: PathBuf,

    #[command(flatten)]
    key: KeyArgs,

    /// Audible chapter metadata (json) overriding the chapters in the file.
    #[arg(long, value_name = "FILE")]
    chapters: Option<PathBuf>,

    /// Write raw AAC access units instead of ADTS streams.
    #[arg(long)]
    raw: bool,

    /// Skip the sanity checks on decrypted AAC frames.
    #[arg(long)]
    no_validate: bool,
}

impl Split {
    pub fn execute(self) -> Result<()> {
        let options = SplitOptions {
            key: self.key.load()?,
            validate_aac: !self.no_validate,
            adts: !self.raw,
        };
        let json = self.chapters.as_ref().map(fs::read_to_string).transpose()?;
        let stop = Interrupt::install()?;

        let mut input = File::open(&self.input)?;
        let length = input.metadata()?.len();
        let chapters = {
            let file = Mp4File::read(&mut input)?;
            convert::read_chapters(&file, &mut input, json.as_deref(), &stop)?
        };
        fs::create_dir_all(&self.output)?;

        let extension = if self.raw { "raw" } else { "aac" };
        let directory = &self.output;
        let mut progress = Progress::new("split", length);

        let report = convert::split_file(
            &mut input,
            &options,
            &chapters,
            &stop,
            |x| progress.update(x),
            |callback| {
                let number = callback.track_number.unwrap_or_default();
                let title = file_name(&callback.chapter.title)
                    .unwrap_or_else(|_| format!("Chapter {}", number));
                let path = directory.join(format!("{:02} - {}.{}", number, title, extension));

                log::debug!("chapter {} -> {}", number, path.display());
                callback.output = Some(Box::new(BufWriter::new(File::create(path)?)));
                Ok(())
            },
        );
        drop(progress);
        let report = report?;

        info!(
            "wrote {} chapter files from {} frames to {}",
            report.chapters,
            report.frames,
            self.output.display()
        );
        Ok(())
    }
}
