use colored::Colorize;
use oahu_mp4::demux::Progress as DemuxProgress;
use std::{
    fmt,
    io::{self, IsTerminal, Write},
    time::Instant,
};

/// Single line progress report on stderr, redrawn on every update.
pub struct Progress {
    label: &'static str,
    total_size: u64,
    started: Instant,
    enabled: bool,
}

impl Progress {
    pub fn new(label: &'static str, total_size: u64) -> Self {
        let enabled = io::stderr().is_terminal() && log::max_level() > log::LevelFilter::Error;
        if enabled {
            let mut handle = io::stderr().lock();
            let _ = write!(handle, "\x1B[?25l");
            let _ = handle.flush();
        }

        Self {
            label,
            total_size,
            started: Instant::now(),
            enabled,
        }
    }

    pub fn update(&mut self, progress: DemuxProgress) {
        if !self.enabled {
            return;
        }

        let position = progress.position.min(self.total_size);
        let elapsed = self.started.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            position as f64 / elapsed
        } else {
            0.0
        };
        let eta = if speed > 0.0 {
            (self.total_size.saturating_sub(position) as f64 / speed) as u64
        } else {
            0
        };
        let percent = match self.total_size {
            0 => 100,
            x => position * 100 / x,
        };

        let mut handle = io::stderr().lock();
        let _ = write!(
            handle,
            "\r\x1B[2K{}{} {}/{}{} FR:{} ETA:{}{}",
            "[".magenta(),
            self.label,
            ByteSize(position),
            ByteSize(self.total_size),
            format!("({}%)", percent).cyan(),
            progress.frames.to_string().green(),
            Eta(eta).to_string().yellow(),
            "]".magenta(),
        );
        let _ = handle.flush();
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if self.enabled {
            let mut handle = io::stderr().lock();
            let _ = writeln!(handle, "\x1B[?25h");
            let _ = handle.flush();
        }
    }
}

pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KIB: f64 = 1024.0;
        const MIB: f64 = KIB * 1024.0;
        const GIB: f64 = MIB * 1024.0;

        let bytes = self.0 as f64;

        if bytes >= GIB {
            write!(f, "{:.1}GiB", bytes / GIB)
        } else if bytes >= MIB {
            write!(f, "{:.1}MiB", bytes / MIB)
        } else if bytes >= KIB {
            write!(f, "{:.1}KiB", bytes / KIB)
        } else {
            write!(f, "{}B", self.0)
        }
    }
}

struct Eta(u64);

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;

        if hours > 0 {
            write!(f, "{}h{}m{}s", hours, minutes, seconds)
        } else if minutes > 0 {
            write!(f, "{}m{}s", minutes, seconds)
        } else {
            write!(f, "{}s", seconds)
        }
    }
}
