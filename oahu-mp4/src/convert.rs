//! File level entry points: decrypting a protected file into a plain one,
//! resolving its chapters and splitting its audio per chapter.

use crate::{
    Error, ReadSeek, Result, Stop,
    boxes::BoxData,
    chapters::ChapterInfo,
    demux::{Demuxer, Mp4File, Progress, TrackInfo},
    filters::{
        AacValidateFilter, AdtsHeader, ChapterNotifier, ChapterSplitter, DecryptFilter,
        DiscardSink, InPlaceWriter, Pipeline, SplitCallback,
    },
    remux::{StripReport, strip_protection},
    voucher::{KeyMaterial, Voucher},
};
use std::{
    io::{self, Read, Seek, SeekFrom, Write},
    sync::{Mutex, mpsc},
    time::Duration,
};

#[derive(Clone, Debug)]
pub struct DecryptOptions {
    pub key: Option<KeyMaterial>,
    /// Run every decrypted audio frame through [`AacValidateFilter`].
    pub validate_aac: bool,
}

impl DecryptOptions {
    pub fn new(key: Option<KeyMaterial>) -> Self {
        Self {
            key,
            validate_aac: true,
        }
    }
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self::new(None)
    }
}

#[derive(Clone, Debug)]
pub struct SplitOptions {
    pub key: Option<KeyMaterial>,
    pub validate_aac: bool,
    /// Prefix every frame with an ADTS header. Raw access units otherwise.
    pub adts: bool,
}

impl SplitOptions {
    pub fn new(key: Option<KeyMaterial>) -> Self {
        Self {
            key,
            validate_aac: true,
            adts: true,
        }
    }
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self::new(None)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecryptReport {
    pub strip: StripReport,
    /// Tracks whose samples were decrypted in place.
    pub tracks: Vec<u32>,
    pub frames: u64,
    /// Bytes written by the copy pass.
    pub bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitReport {
    /// Chapters that were handed to the caller.
    pub chapters: usize,
    pub frames: u64,
}

/// Decodes the key material of a voucher, warning about expired rules.
pub fn key_from_voucher(voucher: &Voucher) -> Result<KeyMaterial> {
    for rule in voucher.expired_rules(chrono::Utc::now()) {
        log::warn!("voucher rule '{}' has expired", rule.name);
    }
    voucher.key_material()
}

fn key_of(key: &Option<KeyMaterial>) -> Option<[u8; 16]> {
    key.as_ref().map(|x| x.key)
}

fn validated(tracks: &[TrackInfo], track_id: u32) -> Option<AacValidateFilter> {
    tracks
        .iter()
        .find(|x| x.track_id == track_id && x.is_audio())
        .map(|x| AacValidateFilter::new(x.channels.max(1)))
}

/// Seekable output shared by several in-place writers.
struct SharedOutput<'a, T>(&'a Mutex<T>);

impl<T: Write> Write for SharedOutput<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("output lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("output lock poisoned"))?
            .flush()
    }
}

impl<T: Seek> Seek for SharedOutput<'_, T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("output lock poisoned"))?
            .seek(pos)
    }
}

/// Writes a plain copy of `source` to `output`.
///
/// The first pass copies the file box by box: header boxes are rendered with
/// their protection stripped, media payloads are copied as they are. Every
/// box keeps its size, so the second pass can decrypt each protected sample
/// and write it back at its original offset.
pub fn decrypt_file<W, F>(
    source: &mut dyn ReadSeek,
    output: &mut W,
    options: &DecryptOptions,
    stop: &dyn Stop,
    progress: F,
) -> Result<DecryptReport>
where
    W: Write + Seek + Send,
    F: FnMut(Progress),
{
    let file = Mp4File::read(source)?;
    let tracks = file.tracks()?;
    for track in &tracks {
        log::info!(
            "track {}: '{}' {} ({} Hz, {} channels){}",
            track.track_id,
            track.handler,
            track.codec.map(|x| x.to_string()).unwrap_or_default(),
            track.sample_rate,
            track.channels,
            if track.protected { ", protected" } else { "" }
        );
    }

    let mut stripped = file.tree().clone();
    let strip = strip_protection(&mut stripped)?;

    let mut report = DecryptReport {
        strip,
        ..Default::default()
    };

    output.seek(SeekFrom::Start(0))?;
    for id in stripped.roots().iter().copied() {
        stop.check()?;
        let header = file.tree().header(id);

        if let BoxData::MediaData(_) = stripped.data(id) {
            source.seek(SeekFrom::Start(header.file_position))?;
            let copied = io::copy(&mut (&mut *source).take(header.total_box_size), output)?;
            if copied != header.total_box_size {
                return Err(Error::decode(
                    header.file_position + copied,
                    "media payload ends before its declared size",
                )
                .with_box_type(header.box_type));
            }
            report.bytes += copied;
            continue;
        }

        let rendered = stripped.render_size(id);
        if rendered != header.total_box_size {
            return Err(Error::invalid_input(format!(
                "'{}' box at {} would move from {} to {} bytes",
                header.box_type, header.file_position, header.total_box_size, rendered
            )));
        }
        report.bytes += stripped.write(id, output)?;
    }
    log::debug!("copied {} bytes with protection stripped", report.bytes);

    let protected = tracks
        .iter()
        .filter(|x| x.protected)
        .map(|x| x.track_id)
        .collect::<Vec<_>>();
    if protected.is_empty() {
        log::info!("no protected tracks, the copy is already plain");
        output.flush()?;
        return Ok(report);
    }
    if options.key.is_none() {
        log::warn!("protected tracks found but no key was given");
    }

    let shared = Mutex::new(output);
    let mut demuxer = Demuxer::new(&file)?;
    demuxer.on_progress(progress);

    for track_id in &protected {
        let mut pipeline = Pipeline::new(InPlaceWriter::new(SharedOutput(&shared)))
            .filter(DecryptFilter::new(key_of(&options.key)));
        if options.validate_aac {
            if let Some(validate) = validated(&tracks, *track_id) {
                pipeline = pipeline.filter(validate);
            }
        }
        log::debug!("track {}: {}", track_id, pipeline.stage_names().join(" -> "));
        demuxer.route(*track_id, pipeline)?;
    }

    let demuxed = demuxer.run(source, stop)?;
    report.frames = demuxed.frames.values().sum();
    report.tracks = protected;

    log::info!(
        "decrypted {} frames in {} tracks",
        report.frames,
        report.tracks.len()
    );
    Ok(report)
}

/// Resolves the chapter series of a file. Sources in priority order:
/// Audible chapter JSON given by the caller, a `chpl` box, a chapter text
/// track, ID3 `CHAP` frames, and finally one chapter spanning the audio.
pub fn read_chapters(
    file: &Mp4File,
    source: &mut dyn ReadSeek,
    json: Option<&str>,
    stop: &dyn Stop,
) -> Result<ChapterInfo> {
    let tracks = file.tracks()?;
    let total = tracks
        .iter()
        .find(|x| x.is_audio())
        .map(|x| x.duration_time())
        .filter(|x| !x.is_zero())
        .unwrap_or_else(|| file.duration());

    let (chapters, origin) = if let Some(json) = json {
        (ChapterInfo::from_audible_json(json)?, "chapter metadata")
    } else if let Some(chpl) = file.chpl().filter(|x| !x.entries.is_empty()) {
        (ChapterInfo::from_chpl(chpl, total), "'chpl' box")
    } else if let Some(text) = tracks.iter().find(|x| x.is_text()) {
        let (sender, receiver) = mpsc::channel();
        let mut demuxer = Demuxer::new(file)?;
        demuxer.route(
            text.track_id,
            Pipeline::new(ChapterNotifier::new(sender, text.timescale)),
        )?;
        demuxer.run(source, stop)?;
        (ChapterInfo::collect(receiver), "text track")
    } else {
        (ChapterInfo::default(), "")
    };

    let (chapters, origin) = match chapters.is_empty() {
        false => (chapters, origin),
        true => match file.id3_chapters() {
            x if !x.is_empty() => (ChapterInfo::from_id3(&x), "ID3 tag"),
            _ => (ChapterInfo::single("Chapter 1", total), "track duration"),
        },
    };

    let drift = chapters.end_offset().abs_diff(total);
    if !total.is_zero() && drift > Duration::from_secs(1) {
        log::warn!(
            "chapters end at {:.3}s but the audio lasts {:.3}s",
            chapters.end_offset().as_secs_f64(),
            total.as_secs_f64()
        );
    }

    log::info!("resolved {} chapters from {}", chapters.count(), origin);
    Ok(chapters)
}

/// Decrypts the first audio track and writes it into one output per chapter.
/// `callback` is called when a chapter starts and assigns its output.
pub fn split_file<F, P>(
    source: &mut dyn ReadSeek,
    options: &SplitOptions,
    chapters: &ChapterInfo,
    stop: &dyn Stop,
    progress: P,
    mut callback: F,
) -> Result<SplitReport>
where
    F: FnMut(&mut SplitCallback) -> Result<()> + Send,
    P: FnMut(Progress),
{
    let file = Mp4File::read(source)?;
    let tracks = file.tracks()?;
    let audio = tracks
        .iter()
        .find(|x| x.is_audio())
        .ok_or_else(|| Error::unsupported("file has no audio track"))?;

    let adts = match options.adts {
        true => Some(AdtsHeader::new(audio.audio_config.as_ref().ok_or_else(|| {
            Error::unsupported(format!(
                "track {} has no decoder configuration for ADTS headers",
                audio.track_id
            ))
        })?)?),
        false => None,
    };

    let mut opened = 0;
    let splitter = ChapterSplitter::new(chapters, audio.timescale, adts, |x: &mut SplitCallback| {
        opened += 1;
        callback(x)
    });

    let mut pipeline = Pipeline::new(splitter).filter(DecryptFilter::new(key_of(&options.key)));
    if options.validate_aac {
        pipeline = pipeline.filter(AacValidateFilter::new(audio.channels.max(1)));
    }

    let mut demuxer = Demuxer::new(&file)?;
    demuxer.on_progress(progress);
    demuxer.route(audio.track_id, pipeline)?;
    for video in tracks.iter().filter(|x| x.handler == b"vide") {
        demuxer.route(video.track_id, Pipeline::new(DiscardSink::new()))?;
    }

    let demuxed = demuxer.run(source, stop)?;
    let report = SplitReport {
        chapters: opened,
        frames: demuxed.frames.get(&audio.track_id).copied().unwrap_or_default(),
    };

    log::info!(
        "wrote {} of {} chapters from {} frames",
        report.chapters,
        chapters.count(),
        report.frames
    );
    Ok(report)
}
