#![allow(dead_code)]

use byteorder::{BigEndian, WriteBytesExt};

/// Compact atom: 32-bit size, type, body.
pub fn atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<BigEndian>(8 + body.len() as u32).unwrap();
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

/// Atom with the 64-bit size form.
pub fn large_atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<BigEndian>(1).unwrap();
    out.extend_from_slice(kind);
    out.write_u64::<BigEndian>(16 + body.len() as u64).unwrap();
    out.extend_from_slice(body);
    out
}

/// Atom starting with a version byte and 24 bits of flags.
pub fn full_atom(kind: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut data = vec![version];
    data.write_u24::<BigEndian>(flags).unwrap();
    data.extend_from_slice(body);
    atom(kind, &data)
}

pub fn concat(parts: &[Vec<u8>]) -> Vec<u8> {
    parts.concat()
}

fn u16s(values: &[u16]) -> Vec<u8> {
    let mut out = Vec::new();
    for &v in values {
        out.write_u16::<BigEndian>(v).unwrap();
    }
    out
}

fn u32s(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    for &v in values {
        out.write_u32::<BigEndian>(v).unwrap();
    }
    out
}

pub fn ftyp() -> Vec<u8> {
    let mut body = b"isom".to_vec();
    body.extend(u32s(&[0x200]));
    body.extend_from_slice(b"isomiso2avc1mp41");
    atom(b"ftyp", &body)
}

/// Version 0 movie header with the given time scale and duration.
pub fn mvhd(time_scale: u32, duration: u32) -> Vec<u8> {
    let mut body = u32s(&[0, 0, time_scale, duration, 0x0001_0000]);
    body.extend(u16s(&[0x0100]));
    body.extend_from_slice(&[0; 10]);
    body.extend(u32s(&[0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000]));
    body.extend_from_slice(&[0; 24]);
    body.extend(u32s(&[2]));
    full_atom(b"mvhd", 0, 0, &body)
}

pub fn tkhd(track_id: u32) -> Vec<u8> {
    let mut body = u32s(&[0, 0, track_id, 0, 1000]);
    body.extend_from_slice(&[0; 8]);
    body.extend(u16s(&[0, 0, 0, 0]));
    body.extend(u32s(&[0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000]));
    body.extend(u32s(&[640 << 16, 480 << 16]));
    full_atom(b"tkhd", 0, 1, &body)
}

pub fn hdlr(handler: &[u8; 4], name: &str) -> Vec<u8> {
    let mut body = u32s(&[0]);
    body.extend_from_slice(handler);
    body.extend_from_slice(&[0; 12]);
    body.extend_from_slice(name.as_bytes());
    body.push(0);
    full_atom(b"hdlr", 0, 0, &body)
}

pub fn mdhd(time_scale: u32) -> Vec<u8> {
    let mut body = u32s(&[0, 0, time_scale, 0]);
    body.extend(u16s(&[0x55C4, 0]));
    full_atom(b"mdhd", 0, 0, &body)
}

/// H.264 sample entry holding an `avcC` with one SPS and one PPS.
pub fn avc1() -> Vec<u8> {
    let mut avcc = vec![1, 0x64, 0, 0x28, 0xFF, 0xE1];
    avcc.extend(u16s(&[4]));
    avcc.extend_from_slice(&[0x67, 0x64, 0x00, 0x28]);
    avcc.push(1);
    avcc.extend(u16s(&[2]));
    avcc.extend_from_slice(&[0x68, 0xEE]);

    let mut body = vec![0; 6];
    body.extend(u16s(&[1]));
    body.extend_from_slice(&[0; 16]);
    body.extend(u16s(&[640, 480]));
    body.extend(u32s(&[72 << 16, 72 << 16, 0]));
    body.extend(u16s(&[1]));
    let mut name = [0u8; 32];
    name[0] = 4;
    name[1..5].copy_from_slice(b"test");
    body.extend_from_slice(&name);
    body.extend(u16s(&[0x18, 0xFFFF]));
    body.extend(atom(b"avcC", &avcc));
    atom(b"avc1", &body)
}

pub fn stbl() -> Vec<u8> {
    let mut stsd_body = u32s(&[0, 1]);
    stsd_body.extend(avc1());
    atom(
        b"stbl",
        &concat(&[
            atom(b"stsd", &stsd_body),
            full_atom(b"stts", 0, 0, &u32s(&[1, 3, 512])),
            full_atom(b"stss", 0, 0, &u32s(&[1, 1])),
            full_atom(b"stsc", 0, 0, &u32s(&[1, 1, 3, 1])),
            full_atom(b"stsz", 0, 0, &u32s(&[0, 3, 100, 200, 300])),
            full_atom(b"stco", 0, 0, &u32s(&[1, 48])),
        ]),
    )
}

pub fn video_trak(track_id: u32) -> Vec<u8> {
    let dinf = atom(
        b"dinf",
        &full_atom(b"dref", 0, 0, &concat(&[u32s(&[1]), full_atom(b"url ", 0, 1, &[])])),
    );
    let vmhd = full_atom(b"vmhd", 0, 1, &[0; 8]);
    let minf = atom(b"minf", &concat(&[vmhd, dinf, stbl()]));
    let mdia = atom(
        b"mdia",
        &concat(&[mdhd(12800), hdlr(b"vide", "VideoHandler"), minf]),
    );
    atom(b"trak", &concat(&[tkhd(track_id), mdia]))
}

pub fn sound_trak(track_id: u32) -> Vec<u8> {
    let smhd = full_atom(b"smhd", 0, 0, &[0; 4]);
    let minf = atom(b"minf", &smhd);
    let mdia = atom(
        b"mdia",
        &concat(&[mdhd(48000), hdlr(b"soun", "SoundHandler"), minf]),
    );
    atom(b"trak", &concat(&[tkhd(track_id), mdia]))
}

/// A small but complete movie: `ftyp`, `moov` with a video and a sound
/// track, then `free` and `mdat`.
pub fn sample_movie() -> Vec<u8> {
    let moov = atom(
        b"moov",
        &concat(&[mvhd(1000, 3000), video_trak(1), sound_trak(2)]),
    );
    concat(&[
        ftyp(),
        moov,
        atom(b"free", &[0; 4]),
        atom(b"mdat", &[0xAB; 600]),
    ])
}
