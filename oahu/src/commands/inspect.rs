use anyhow::Result;
use clap::Args;
use colored::Colorize;
use oahu_mp4::{Unstoppable, convert, demux::Mp4File};
use std::{fs::File, path::PathBuf, time::Duration};

/// Print the box tree, tracks and chapters of a file.
#[derive(Debug, Clone, Args)]
pub struct Inspect {
    #[arg(required = true)]
    input: PathBuf,

    /// Deepest box level to list.
    #[arg(short, long, default_value_t = 8)]
    depth: usize,
}

fn timestamp(x: Duration) -> String {
    let secs = x.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        x.subsec_millis()
    )
}

impl Inspect {
    pub fn execute(self) -> Result<()> {
        let mut input = File::open(&self.input)?;
        let file = Mp4File::read(&mut input)?;

        println!("{}", "Boxes".cyan().bold());
        print!("{}", file.tree().dump(self.depth));

        println!("\n{}", "Tracks".cyan().bold());
        for track in file.tracks()? {
            println!(
                "  #{} {} {} {} {}{}",
                track.track_id,
                track.handler,
                track
                    .codec
                    .map(|x| x.to_string())
                    .unwrap_or_else(|| "-".to_owned()),
                timestamp(track.duration_time()),
                match &track.audio_config {
                    Some(x) => format!(
                        "aot {} {} Hz {} ch",
                        x.object_type, x.sampling_frequency, x.channel_configuration
                    ),
                    None => String::new(),
                },
                match (track.protected, track.original_format) {
                    (true, Some(x)) => format!(" {} ({})", "protected".red(), x),
                    (true, None) => format!(" {}", "protected".red()),
                    _ => String::new(),
                }
            );
        }
        println!(
            "  duration {}{}",
            timestamp(file.duration()),
            if file.is_fragmented() { ", fragmented" } else { "" }
        );

        println!("\n{}", "Chapters".cyan().bold());
        let chapters = convert::read_chapters(&file, &mut input, None, &Unstoppable)?;
        for (i, chapter) in chapters.chapters().iter().enumerate() {
            println!(
                "  {:>3} {} {} {}",
                i + 1,
                timestamp(chapter.start_offset).dimmed(),
                timestamp(chapter.end_offset()).dimmed(),
                chapter.title
            );
        }

        Ok(())
    }
}
