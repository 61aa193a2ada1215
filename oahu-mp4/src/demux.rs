//! Turns a parsed file into per-track frame streams.
//!
//! [`Mp4File`] holds the box tree of a file with media payloads skipped and
//! describes its tracks. [`Demuxer`] walks either the movie fragments
//! (`moof`/`traf`/`trun`) or the classic sample tables (`stbl`), reads every
//! sample from the source and feeds it, in sample order, to the pipeline
//! routed to its track.

use crate::{
    Error, FourCC, ReadSeek, Reader, Result, Stop,
    boxes::{
        AudioSampleEntry, BoxData, BoxId, ChplBox, Mp4Tree, ParseOptions, SencBox, TfhdBox,
        TrexBox, TrunBox, parse_tree,
    },
    chapters::ticks_to_duration,
    descriptors::AudioSpecificConfig,
    filters::{ChunkEntry, FrameEntry, Pipeline},
    id3::Id3Chapter,
};
use std::{
    collections::BTreeMap,
    io::SeekFrom,
    time::Duration,
};

#[derive(Clone, Debug, PartialEq)]
pub struct TrackInfo {
    pub track_id: u32,
    /// `soun`, `vide`, `text`...
    pub handler: FourCC,
    pub timescale: u32,
    /// In `timescale` units, from `mdhd`.
    pub duration: u64,
    /// Sample entry code as stored (`mp4a`, `enca`, `aavd`...).
    pub codec: Option<FourCC>,
    /// Codec of a protected sample entry, from `frma`.
    pub original_format: Option<FourCC>,
    pub protected: bool,
    pub channels: u16,
    pub sample_rate: u32,
    pub audio_config: Option<AudioSpecificConfig>,
    pub trak: BoxId,
}

impl TrackInfo {
    pub fn is_audio(&self) -> bool {
        self.handler == b"soun"
    }

    pub fn is_text(&self) -> bool {
        self.handler == b"text" || self.handler == b"sbtl"
    }

    pub fn duration_time(&self) -> Duration {
        ticks_to_duration(self.duration, self.timescale)
    }
}

/// A file's box tree, with `mdat` payloads skipped.
pub struct Mp4File {
    tree: Mp4Tree,
    length: u64,
}

impl Mp4File {
    pub fn read(source: &mut dyn ReadSeek) -> Result<Self> {
        Self::read_with(source, ParseOptions::default())
    }

    pub fn read_with(source: &mut dyn ReadSeek, options: ParseOptions) -> Result<Self> {
        let length = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;
        let tree = parse_tree(source, options)?;

        log::debug!(
            "parsed {} top-level boxes from {} bytes",
            tree.roots().len(),
            length
        );
        Ok(Self { tree, length })
    }

    pub fn tree(&self) -> &Mp4Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Mp4Tree {
        &mut self.tree
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn is_fragmented(&self) -> bool {
        self.tree.find_path(None, "moov/mvex").is_some() || self.tree.root(b"moof").is_some()
    }

    pub fn tracks(&self) -> Result<Vec<TrackInfo>> {
        let moov = self
            .tree
            .root(b"moov")
            .ok_or_else(|| Error::decode(0, "file has no 'moov' box"))?;

        self.tree
            .children_of_type(moov, b"trak")
            .map(|trak| self.track(trak))
            .collect()
    }

    fn track(&self, trak: BoxId) -> Result<TrackInfo> {
        let tree = &self.tree;
        let missing = |what: &str| {
            Error::decode(
                tree.header(trak).file_position,
                format!("track without '{}'", what),
            )
            .with_box_type(FourCC(*b"trak"))
        };

        let track_id = match tree.child(trak, b"tkhd").map(|x| tree.data(x)) {
            Some(BoxData::Tkhd(x)) => x.track_id,
            _ => return Err(missing("tkhd")),
        };
        let (timescale, duration) = match tree
            .find_path(Some(trak), "mdia/mdhd")
            .map(|x| tree.data(x))
        {
            Some(BoxData::Mdhd(x)) => (x.timescale, x.duration),
            _ => return Err(missing("mdhd")),
        };
        let handler = tree
            .find_path(Some(trak), "mdia")
            .and_then(|x| tree.handler_type(x))
            .ok_or_else(|| missing("hdlr"))?;

        let mut info = TrackInfo {
            track_id,
            handler,
            timescale,
            duration,
            codec: None,
            original_format: None,
            protected: false,
            channels: 0,
            sample_rate: 0,
            audio_config: None,
            trak,
        };

        let Some(entry) = tree
            .find_path(Some(trak), "mdia/minf/stbl/stsd")
            .and_then(|x| tree.children(x).first().copied())
        else {
            return Ok(info);
        };

        let codec = tree.box_type(entry);
        info.codec = Some(codec);
        info.protected = codec.is_protected_audio() || codec == b"encv";
        info.original_format = match tree
            .find_path(Some(entry), "sinf/frma")
            .map(|x| tree.data(x))
        {
            Some(BoxData::Frma(x)) => Some(x.data_format),
            _ => None,
        };

        if let BoxData::AudioSampleEntry(audio) = tree.data(entry) {
            info.channels = audio.channels();
            info.sample_rate = audio.sample_rate_hz();
            info.audio_config = self.audio_config(entry, audio)?;
        }

        Ok(info)
    }

    fn audio_config(
        &self,
        entry: BoxId,
        audio: &AudioSampleEntry,
    ) -> Result<Option<AudioSpecificConfig>> {
        let Some(esds) = self
            .tree
            .descendants(entry)
            .into_iter()
            .find(|x| self.tree.box_type(*x) == b"esds")
        else {
            return Ok(None);
        };

        match self.tree.data(esds) {
            BoxData::Esds(x) => match x.audio_specific_config() {
                Some(config) => {
                    let config = config.map_err(|e| e.with_box_type(FourCC(*b"esds")))?;
                    if config.channel_configuration as u16 != audio.channels() {
                        log::debug!(
                            "sample entry declares {} channels, decoder config {}",
                            audio.channels(),
                            config.channel_configuration
                        );
                    }
                    Ok(Some(config))
                }
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Presentation length: `mehd` for fragmented files, `mvhd` otherwise.
    pub fn duration(&self) -> Duration {
        let Some(BoxData::Mvhd(mvhd)) = self
            .tree
            .find_path(None, "moov/mvhd")
            .map(|x| self.tree.data(x))
        else {
            return Duration::ZERO;
        };

        match self
            .tree
            .find_path(None, "moov/mvex/mehd")
            .map(|x| self.tree.data(x))
        {
            Some(BoxData::Mehd(x)) => ticks_to_duration(x.fragment_duration, mvhd.timescale),
            _ => ticks_to_duration(mvhd.duration, mvhd.timescale),
        }
    }

    pub fn chpl(&self) -> Option<&ChplBox> {
        self.tree
            .find_all(b"chpl")
            .into_iter()
            .find_map(|x| match self.tree.data(x) {
                BoxData::Chpl(chpl) => Some(chpl),
                _ => None,
            })
    }

    pub fn id3_chapters(&self) -> Vec<Id3Chapter> {
        self.tree
            .find_all(b"ID32")
            .into_iter()
            .flat_map(|x| match self.tree.data(x) {
                BoxData::Id32(id32) => id32.tag.chapters(),
                _ => Vec::new(),
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub frames: u64,
    pub position: u64,
    pub length: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DemuxReport {
    /// Frames handed to a pipeline, per track.
    pub frames: BTreeMap<u32, u64>,
    pub fragments: u64,
}

/// Sample location before it is read.
#[derive(Clone)]
struct Sample {
    offset: u64,
    size: u32,
    duration: u32,
    iv: Option<Vec<u8>>,
}

type ProgressFn<'a> = Box<dyn FnMut(Progress) + 'a>;

pub struct Demuxer<'a, 'p> {
    file: &'a Mp4File,
    tracks: Vec<TrackInfo>,
    pipelines: BTreeMap<u32, Pipeline<'p>>,
    next_sample: BTreeMap<u32, u64>,
    decode_time: BTreeMap<u32, u64>,
    progress: Option<ProgressFn<'a>>,
    report: DemuxReport,
}

impl<'a, 'p> Demuxer<'a, 'p> {
    pub fn new(file: &'a Mp4File) -> Result<Self> {
        Ok(Self {
            file,
            tracks: file.tracks()?,
            pipelines: BTreeMap::new(),
            next_sample: BTreeMap::new(),
            decode_time: BTreeMap::new(),
            progress: None,
            report: DemuxReport::default(),
        })
    }

    /// Sends the samples of `track_id` to `pipeline`. Tracks without a
    /// pipeline are skipped.
    pub fn route(&mut self, track_id: u32, pipeline: Pipeline<'p>) -> Result<()> {
        if !self.tracks.iter().any(|x| x.track_id == track_id) {
            return Err(Error::invalid_input(format!("no track with id {}", track_id)));
        }
        self.pipelines.insert(track_id, pipeline);
        Ok(())
    }

    pub fn on_progress<F: FnMut(Progress) + 'a>(&mut self, callback: F) {
        self.progress = Some(Box::new(callback));
    }

    /// Demuxes every routed track and flushes the pipelines. On cancellation
    /// the pipelines are flushed before the stop error is returned.
    pub fn run(mut self, source: &mut dyn ReadSeek, stop: &dyn Stop) -> Result<DemuxReport> {
        let result = {
            let mut reader = Reader::new(source)?;
            if self.file.is_fragmented() {
                self.run_fragments(&mut reader, stop)
            } else {
                self.run_tables(&mut reader, stop)
            }
        };

        match result {
            Ok(()) => {
                for pipeline in self.pipelines.values_mut() {
                    pipeline.flush()?;
                }
                log::info!(
                    "demuxed {} frames",
                    self.report.frames.values().sum::<u64>()
                );
                Ok(self.report)
            }
            Err(e) if e.is_stopped() => {
                for (track_id, pipeline) in self.pipelines.iter_mut() {
                    if let Err(flush) = pipeline.flush() {
                        log::warn!("track {} could not be flushed: {}", track_id, flush);
                    }
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn track(&self, track_id: u32) -> Option<&TrackInfo> {
        self.tracks.iter().find(|x| x.track_id == track_id)
    }

    fn trex(&self, track_id: u32) -> Option<&'a TrexBox> {
        let tree = self.file.tree();
        let mvex = tree.find_path(None, "moov/mvex")?;

        tree.children_of_type(mvex, b"trex")
            .find_map(|x| match tree.data(x) {
                BoxData::Trex(trex) if trex.track_id == track_id => Some(trex),
                _ => None,
            })
    }

    fn run_fragments(&mut self, reader: &mut Reader, stop: &dyn Stop) -> Result<()> {
        let file = self.file;
        let tree = file.tree();

        for moof in tree.roots().iter().copied().filter(|x| tree.box_type(*x) == b"moof") {
            stop.check()?;
            let moof_start = tree.header(moof).file_position;
            let mut previous_end: Option<u64> = None;

            for traf in tree.children_of_type(moof, b"traf") {
                let (track_id, samples, decode_time, end) =
                    self.fragment_samples(moof_start, traf, previous_end)?;
                previous_end = Some(end);

                log::debug!(
                    "fragment at {}: track {} with {} samples",
                    moof_start,
                    track_id,
                    samples.len()
                );

                if let Some(time) = decode_time {
                    self.decode_time.insert(track_id, time);
                }
                self.feed(reader, track_id, samples, stop)?;
            }

            self.report.fragments += 1;
            self.notify(reader.position(), reader.length());
        }

        Ok(())
    }

    /// Resolves the samples of one track fragment. Returns the track id, the
    /// samples, the `tfdt` time and the end of the fragment's data.
    fn fragment_samples(
        &self,
        moof_start: u64,
        traf: BoxId,
        previous_end: Option<u64>,
    ) -> Result<(u32, Vec<Sample>, Option<u64>, u64)> {
        let tree = self.file.tree();
        let position = tree.header(traf).file_position;
        let fault =
            |reason: String| Error::decode(position, reason).with_box_type(FourCC(*b"traf"));

        let tfhd: &TfhdBox = match tree.child(traf, b"tfhd").map(|x| tree.data(x)) {
            Some(BoxData::Tfhd(x)) => x,
            _ => return Err(fault("track fragment without 'tfhd'".to_owned())),
        };
        let trex = self.trex(tfhd.track_id);

        let base = match tfhd.base_data_offset {
            Some(x) => x,
            None if tfhd.default_base_is_moof() => moof_start,
            None => previous_end.unwrap_or(moof_start),
        };

        let decode_time = match tree.child(traf, b"tfdt").map(|x| tree.data(x)) {
            Some(BoxData::Tfdt(x)) => Some(x.base_media_decode_time),
            _ => None,
        };

        let mut samples = Vec::new();
        let mut cursor = base;

        for trun in tree.children_of_type(traf, b"trun") {
            let BoxData::Trun(trun) = tree.data(trun) else {
                continue;
            };
            let trun: &TrunBox = trun;

            if let Some(offset) = trun.data_offset {
                cursor = base.checked_add_signed(offset as i64).ok_or_else(|| {
                    fault(format!("data offset {} points before the file start", offset))
                })?;
            }

            for sample in &trun.samples {
                let size = sample
                    .size
                    .or(tfhd.default_sample_size)
                    .or(trex.map(|x| x.default_sample_size))
                    .ok_or_else(|| fault("sample without a size".to_owned()))?;
                let duration = sample
                    .duration
                    .or(tfhd.default_sample_duration)
                    .or(trex.map(|x| x.default_sample_duration))
                    .unwrap_or_default();

                samples.push(Sample {
                    offset: cursor,
                    size,
                    duration,
                    iv: None,
                });
                cursor += size as u64;
            }
        }

        let senc = tree.child(traf, b"senc").map(|x| tree.data(x));
        match senc {
            Some(BoxData::Senc(senc)) => {
                let senc: &SencBox = senc;
                if senc.sample_count() != samples.len() {
                    return Err(fault(format!(
                        "'senc' holds {} IVs for {} samples",
                        senc.sample_count(),
                        samples.len()
                    )));
                }
                for (sample, iv) in samples.iter_mut().zip(&senc.ivs) {
                    sample.iv = Some(iv.clone());
                }
            }
            _ if self.track(tfhd.track_id).is_some_and(|x| x.protected)
                && self.pipelines.contains_key(&tfhd.track_id) =>
            {
                return Err(Error::unsupported(format!(
                    "protected fragment of track {} without a 'senc' box",
                    tfhd.track_id
                )));
            }
            _ => {}
        }

        Ok((tfhd.track_id, samples, decode_time, cursor))
    }

    fn run_tables(&mut self, reader: &mut Reader, stop: &dyn Stop) -> Result<()> {
        let routed = self.pipelines.keys().copied().collect::<Vec<_>>();

        for track_id in routed {
            let Some(track) = self.track(track_id).cloned() else {
                continue;
            };

            if track.protected {
                return Err(Error::unsupported(format!(
                    "protected samples of track {} outside movie fragments",
                    track_id
                )));
            }

            let samples = self.table_samples(&track)?;
            log::debug!("track {}: {} samples in sample tables", track_id, samples.len());

            for chunk in samples.chunks(256) {
                self.feed(reader, track_id, chunk.to_vec(), stop)?;
                self.notify(reader.position(), reader.length());
            }
        }

        Ok(())
    }

    fn table_samples(&self, track: &TrackInfo) -> Result<Vec<Sample>> {
        let tree = self.file.tree();
        let Some(stbl) = tree.find_path(Some(track.trak), "mdia/minf/stbl") else {
            return Ok(Vec::new());
        };
        let fault = |reason: &str| {
            Error::decode(tree.header(stbl).file_position, reason).with_box_type(FourCC(*b"stbl"))
        };

        let (Some(BoxData::Stsz(stsz)), Some(BoxData::Stsc(stsc)), Some(BoxData::Stts(stts))) = (
            tree.child(stbl, b"stsz").map(|x| tree.data(x)),
            tree.child(stbl, b"stsc").map(|x| tree.data(x)),
            tree.child(stbl, b"stts").map(|x| tree.data(x)),
        ) else {
            return Err(fault("sample table without 'stsz', 'stsc' or 'stts'"));
        };

        let offsets = match tree
            .child(stbl, b"stco")
            .or_else(|| tree.child(stbl, b"co64"))
            .map(|x| tree.data(x))
        {
            Some(BoxData::ChunkOffset(x)) => &x.offsets,
            _ => return Err(fault("sample table without chunk offsets")),
        };

        let mut durations = stts.durations();
        // A constant size needs no table, so the count alone is untrusted.
        let length = self.file.length();
        let capacity = match stsz.sample_size {
            0 => stsz.sample_count as u64,
            size => (stsz.sample_count as u64).min(length / size as u64),
        };
        let mut samples = Vec::with_capacity(capacity as usize);

        for (chunk, offset) in offsets.iter().enumerate() {
            let mut offset = *offset;
            for _ in 0..stsc.samples_in_chunk(chunk as u32 + 1) {
                let Some(size) = stsz.size_of(samples.len()) else {
                    return Err(fault("chunks describe more samples than 'stsz'"));
                };
                if offset + size as u64 > length {
                    return Err(fault("sample lies past the end of the file"));
                }
                samples.push(Sample {
                    offset,
                    size,
                    duration: durations.next().unwrap_or_default(),
                    iv: None,
                });
                offset += size as u64;
            }
        }

        Ok(samples)
    }

    fn feed(
        &mut self,
        reader: &mut Reader,
        track_id: u32,
        samples: Vec<Sample>,
        stop: &dyn Stop,
    ) -> Result<()> {
        let first = *self.next_sample.entry(track_id).or_default();
        self.next_sample.insert(track_id, first + samples.len() as u64);

        let mut decode_time = self.decode_time.get(&track_id).copied().unwrap_or_default();
        let end_time = decode_time + samples.iter().map(|x| x.duration as u64).sum::<u64>();
        self.decode_time.insert(track_id, end_time);

        let Some(pipeline) = self.pipelines.get_mut(&track_id) else {
            return Ok(());
        };

        for (i, sample) in samples.into_iter().enumerate() {
            reader.seek(sample.offset)?;
            let data = reader
                .read_bytes_u8(sample.size as usize)
                .map_err(|e| e.with_box_type(FourCC(*b"mdat")))?;

            let chunk = ChunkEntry {
                track_id,
                chunk_index: self.report.fragments as u32,
                sample_index: first + i as u64,
                offset: sample.offset,
                size: sample.size,
                decode_time,
                duration: sample.duration,
            };
            decode_time += sample.duration as u64;

            let mut entry = FrameEntry::new(chunk, sample.duration, data);
            if let Some(iv) = sample.iv {
                entry = entry.with_iv(iv);
            }

            pipeline.add_input(entry, stop)?;
            *self.report.frames.entry(track_id).or_default() += 1;
        }

        Ok(())
    }

    fn notify(&mut self, position: u64, length: u64) {
        let frames = self.report.frames.values().sum();
        if let Some(callback) = self.progress.as_mut() {
            callback(Progress {
                frames,
                position,
                length,
            });
        }
    }
}
