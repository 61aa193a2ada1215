#![allow(dead_code)]

use oahu_mp4::filters::apply_ctr;

pub const KEY_HEX: &str = "100b6c20940f779a4589152b57d2dacb";
pub const IV_HEX: &str = "3bda3329158a4789880816a70e7e436d";
pub const KEY: [u8; 16] = [
    0x10, 0x0b, 0x6c, 0x20, 0x94, 0x0f, 0x77, 0x9a, 0x45, 0x89, 0x15, 0x2b, 0x57, 0xd2, 0xda, 0xcb,
];

/// AAC LC, 44.1 kHz, stereo.
pub const AUDIO_SPECIFIC_CONFIG: [u8; 2] = [0x12, 0x10];

/// Track timescale and samples per frame are equal, so every frame lasts one second.
pub const TIMESCALE: u32 = 1024;

pub fn bx(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend(box_type);
    out.extend(payload);
    out
}

pub fn large_bx(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = 1u32.to_be_bytes().to_vec();
    out.extend(box_type);
    out.extend(((payload.len() + 16) as u64).to_be_bytes());
    out.extend(payload);
    out
}

pub fn full(box_type: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut fields = (flags | (version as u32) << 24).to_be_bytes().to_vec();
    fields.extend(payload);
    bx(box_type, &fields)
}

pub fn large_full(box_type: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut fields = (flags | (version as u32) << 24).to_be_bytes().to_vec();
    fields.extend(payload);
    large_bx(box_type, &fields)
}

fn concat(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

fn be32(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|x| x.to_be_bytes()).collect()
}

/// AAC frames whose first syntax element is a channel pair (0x21 ...).
pub fn aac_frames(sizes: &[usize]) -> Vec<Vec<u8>> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, size)| {
            let mut frame = vec![0x21];
            frame.extend((1..*size).map(|x| (x * 7 + i * 13) as u8));
            frame
        })
        .collect()
}

pub fn iv(index: u8) -> Vec<u8> {
    vec![0xA0, 0, 0, 0, 0, 0, 0, index]
}

pub fn encrypt(frames: &[Vec<u8>]) -> Vec<Vec<u8>> {
    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let mut data = frame.clone();
            apply_ctr(&KEY, &iv(i as u8), &mut data).unwrap();
            data
        })
        .collect()
}

pub fn voucher_json(expired: usize, valid: usize) -> String {
    let rules = (0..expired)
        .map(|i| ("2001-01-01T00:00:00Z", i))
        .chain((0..valid).map(|i| ("2200-01-01T00:00:00", expired + i)))
        .map(|(date, i)| {
            format!(
                r#"{{"name":"Rule{}","parameters":[{{"expireDate":"{}","type":"EXPIRES"}}]}}"#,
                i, date
            )
        })
        .collect::<Vec<_>>()
        .join(",");

    format!(
        r#"{{"key":"{}","iv":"{}","rules":[{}]}}"#,
        KEY_HEX, IV_HEX, rules
    )
}

fn ftyp() -> Vec<u8> {
    bx(b"ftyp", b"M4A \0\0\0\0M4A mp42isom")
}

fn mvhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut rest = vec![0; 80];
    rest[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    rest[76..80].copy_from_slice(&3u32.to_be_bytes());
    full(b"mvhd", 0, 0, &concat(&[&be32(&[0, 0, timescale, duration]), &rest]))
}

fn tkhd(track_id: u32, duration: u32) -> Vec<u8> {
    full(b"tkhd", 0, 7, &concat(&[&be32(&[0, 0, track_id, 0, duration]), &[0; 60]]))
}

fn mdhd(timescale: u32, duration: u32) -> Vec<u8> {
    full(b"mdhd", 0, 0, &concat(&[&be32(&[0, 0, timescale, duration]), &[0x55, 0xC4, 0, 0]]))
}

fn hdlr(handler: &[u8; 4], name: &str) -> Vec<u8> {
    let mut payload = be32(&[0]);
    payload.extend(handler);
    payload.extend([0; 12]);
    payload.extend(name.as_bytes());
    payload.push(0);
    full(b"hdlr", 0, 0, &payload)
}

/// `esds` whose ES descriptor declares its size with `size_bytes` bytes.
pub fn esds(size_bytes: usize) -> Vec<u8> {
    fn descriptor(tag: u8, payload: &[u8], size_bytes: usize) -> Vec<u8> {
        let mut out = vec![tag];
        for i in (0..size_bytes).rev() {
            let more = if i > 0 { 0x80 } else { 0 };
            out.push(more | ((payload.len() >> (7 * i)) & 0x7F) as u8);
        }
        out.extend(payload);
        out
    }

    let specific = descriptor(0x05, &AUDIO_SPECIFIC_CONFIG, 1);
    let mut config = vec![0x40, 0x15, 0, 0x03, 0];
    config.extend(be32(&[128_000, 128_000]));
    config.extend(&specific);
    let config = descriptor(0x04, &config, size_bytes);
    let sl = descriptor(0x06, &[0x02], 1);

    let es = descriptor(0x03, &concat(&[&[0, 1, 0], &config, &sl]), size_bytes);
    full(b"esds", 0, 0, &es)
}

fn audio_entry(entry_type: &[u8; 4], children: &[u8]) -> Vec<u8> {
    bx(entry_type, &audio_fields(children))
}

fn audio_fields(children: &[u8]) -> Vec<u8> {
    let mut payload = vec![0; 6];
    payload.extend(1u16.to_be_bytes());
    payload.extend([0; 8]);
    payload.extend(2u16.to_be_bytes());
    payload.extend(16u16.to_be_bytes());
    payload.extend([0; 4]);
    payload.extend((44_100u32 << 16).to_be_bytes());
    payload.extend(children);
    payload
}

fn sinf(original: &[u8; 4]) -> Vec<u8> {
    bx(
        b"sinf",
        &concat(&[
            &bx(b"frma", original),
            &full(b"schm", 0, 0, b"cenc\0\x01\0\0"),
            &bx(b"schi", &full(b"tenc", 0, 0, &[0; 20])),
        ]),
    )
}

fn stsd(entry: &[u8]) -> Vec<u8> {
    full(b"stsd", 0, 0, &concat(&[&be32(&[1]), entry]))
}

fn trak(track_id: u32, handler: &[u8; 4], duration: u32, stbl: &[u8]) -> Vec<u8> {
    bx(
        b"trak",
        &concat(&[
            &tkhd(track_id, duration),
            &bx(
                b"mdia",
                &concat(&[
                    &mdhd(TIMESCALE, duration),
                    &hdlr(handler, "Handler"),
                    &bx(b"minf", &bx(b"stbl", stbl)),
                ]),
            ),
        ]),
    )
}

/// Sound track whose `mp4a` entry and sample tables use 64-bit box headers.
pub fn large_header_track() -> Vec<u8> {
    let entry = large_bx(b"mp4a", &audio_fields(&esds(1)));
    let stbl = concat(&[
        &large_full(b"stsd", 0, 0, &concat(&[&be32(&[1]), &entry])),
        &large_full(b"stts", 0, 0, &be32(&[1, 2, TIMESCALE])),
        &full(b"stsz", 0, 0, &be32(&[0, 2, 10, 20])),
    ]);
    bx(b"moov", &trak(1, b"soun", 2 * TIMESCALE, &stbl))
}

/// Plain file whose constant-size `stsz` claims `count` samples in one chunk
/// while `mdat` holds only 100 bytes.
pub fn oversized_table(sample_size: u32, count: u32) -> Vec<u8> {
    let moov = |offset: u32| {
        let stbl = concat(&[
            &stsd(&audio_entry(b"mp4a", &esds(1))),
            &full(b"stts", 0, 0, &be32(&[1, count, TIMESCALE])),
            &full(b"stsc", 0, 0, &be32(&[1, 1, count, 1])),
            &full(b"stsz", 0, 0, &be32(&[sample_size, count])),
            &full(b"stco", 0, 0, &be32(&[1, offset])),
        ]);
        bx(
            b"moov",
            &concat(&[&mvhd(TIMESCALE, TIMESCALE), &trak(1, b"soun", TIMESCALE, &stbl)]),
        )
    };

    let head = concat(&[&ftyp(), &moov(0)]);
    concat(&[&ftyp(), &moov(head.len() as u32 + 8), &bx(b"mdat", &[0; 100])])
}

pub fn chpl(titles: &[&str], step_secs: u64) -> Vec<u8> {
    let mut payload = vec![0; 4];
    payload.push(titles.len() as u8);
    for (i, title) in titles.iter().enumerate() {
        payload.extend((i as u64 * step_secs * 10_000_000).to_be_bytes());
        payload.push(title.len() as u8);
        payload.extend(title.as_bytes());
    }
    full(b"chpl", 1, 0, &payload)
}

fn pssh() -> Vec<u8> {
    full(
        b"pssh",
        0,
        0,
        &concat(&[&[0x10; 16], &be32(&[4]), b"data"]),
    )
}

pub struct Fragmented {
    pub bytes: Vec<u8>,
    pub frames: Vec<Vec<u8>>,
    /// File offset of each sample.
    pub offsets: Vec<u64>,
}

/// Single fragment, single protected audio track file. Each frame lasts one
/// second at [`TIMESCALE`].
pub fn fragmented(frames: &[Vec<u8>], chapters: &[&str], senc_flags: u32) -> Fragmented {
    let encrypted = encrypt(frames);
    let duration = (frames.len() as u32) * TIMESCALE;

    let entry = audio_entry(b"enca", &concat(&[&esds(1), &sinf(b"mp4a")]));
    let moov = bx(
        b"moov",
        &concat(&[
            &mvhd(TIMESCALE, 0),
            &trak(1, b"soun", 0, &stsd(&entry)),
            &bx(
                b"mvex",
                &concat(&[
                    &full(b"mehd", 0, 0, &be32(&[duration])),
                    &full(b"trex", 0, 0, &be32(&[1, 1, TIMESCALE, 0, 0])),
                ]),
            ),
            &bx(b"udta", &chpl(chapters, 1)),
            &pssh(),
        ]),
    );

    let moof = |data_offset: u32| {
        let mut trun = be32(&[frames.len() as u32, data_offset]);
        trun.extend(be32(&frames.iter().map(|x| x.len() as u32).collect::<Vec<_>>()));

        let mut senc = be32(&[frames.len() as u32]);
        for i in 0..frames.len() {
            senc.extend(iv(i as u8));
        }

        bx(
            b"moof",
            &concat(&[
                &full(b"mfhd", 0, 0, &be32(&[1])),
                &bx(
                    b"traf",
                    &concat(&[
                        &full(b"tfhd", 0, 0x020000, &be32(&[1])),
                        &full(b"tfdt", 0, 0, &be32(&[0])),
                        &full(b"trun", 0, 0x000201, &trun),
                        &full(b"senc", 0, senc_flags, &senc),
                        &full(b"saiz", 0, 0, &[8, 0, 0, 0, frames.len() as u8]),
                    ]),
                ),
            ]),
        )
    };
    let moof_len = moof(0).len();
    let moof = moof(moof_len as u32 + 8);

    let mut bytes = concat(&[&ftyp(), &moov]);
    let moof_start = bytes.len() as u64;
    bytes.extend(&moof);
    bytes.extend(bx(b"mdat", &encrypted.concat()));

    let mut offsets = Vec::new();
    let mut offset = moof_start + moof_len as u64 + 8;
    for frame in frames {
        offsets.push(offset);
        offset += frame.len() as u64;
    }

    Fragmented {
        bytes,
        frames: frames.to_vec(),
        offsets,
    }
}

/// Plain file with an audio track and a chapter text track, both described by
/// classic sample tables. Audio frames last one second each; chapter `i`
/// lasts `chapter_secs[i]` seconds.
pub fn classic(frames: &[Vec<u8>], chapter_titles: &[&str], chapter_secs: &[u32]) -> Vec<u8> {
    let samples = chapter_titles
        .iter()
        .map(|x| {
            let mut sample = (x.len() as u16).to_be_bytes().to_vec();
            sample.extend(x.as_bytes());
            sample
        })
        .collect::<Vec<_>>();
    let audio_duration = frames.len() as u32 * TIMESCALE;
    let text_duration = chapter_secs.iter().sum::<u32>() * TIMESCALE;

    let moov = |audio_offset: u32, text_offset: u32| {
        let audio_stbl = concat(&[
            &stsd(&audio_entry(b"mp4a", &esds(1))),
            &full(b"stts", 0, 0, &be32(&[1, frames.len() as u32, TIMESCALE])),
            &full(b"stsc", 0, 0, &be32(&[1, 1, frames.len() as u32, 1])),
            &full(
                b"stsz",
                0,
                0,
                &concat(&[
                    &be32(&[0, frames.len() as u32]),
                    &be32(&frames.iter().map(|x| x.len() as u32).collect::<Vec<_>>()),
                ]),
            ),
            &full(b"stco", 0, 0, &be32(&[1, audio_offset])),
        ]);

        let mut stts = be32(&[chapter_secs.len() as u32]);
        for secs in chapter_secs {
            stts.extend(be32(&[1, secs * TIMESCALE]));
        }
        let text_stbl = concat(&[
            &stsd(&bx(b"text", &[0; 8])),
            &full(b"stts", 0, 0, &stts),
            &full(b"stsc", 0, 0, &be32(&[1, 1, samples.len() as u32, 1])),
            &full(
                b"stsz",
                0,
                0,
                &concat(&[
                    &be32(&[0, samples.len() as u32]),
                    &be32(&samples.iter().map(|x| x.len() as u32).collect::<Vec<_>>()),
                ]),
            ),
            &full(b"stco", 0, 0, &be32(&[1, text_offset])),
        ]);

        bx(
            b"moov",
            &concat(&[
                &mvhd(TIMESCALE, audio_duration),
                &trak(1, b"soun", audio_duration, &audio_stbl),
                &trak(2, b"text", text_duration, &text_stbl),
            ]),
        )
    };

    let head = ftyp().len() + moov(0, 0).len() + 8;
    let audio = frames.concat();
    let moov = moov(head as u32, (head + audio.len()) as u32);

    concat(&[
        &ftyp(),
        &moov,
        &bx(b"mdat", &concat(&[&audio, &samples.concat()])),
    ])
}
