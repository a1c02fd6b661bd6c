mod common;

use atomtree::{Atom, FourCC, Layout};
use common::{atom, concat, large_atom, sample_movie};
use std::io::{Seek, SeekFrom, Write};

#[test]
fn parse_then_write_is_identical() {
    let data = sample_movie();
    let mut root = atomtree::read(&data).unwrap();

    let kinds: Vec<String> = root.children().iter().map(|a| a.kind().to_string()).collect();
    assert_eq!(kinds, ["ftyp", "moov", "free", "mdat"]);
    assert_eq!(root.size(), data.len() as u64);

    assert_eq!(atomtree::to_bytes(&mut root).unwrap(), data);
}

#[test]
fn child_sizes_match_the_input() {
    let data = sample_movie();
    let root = atomtree::read(&data).unwrap();
    let moov = root.find_atom("moov").unwrap();
    let expected = u32::from_be_bytes(data[32..36].try_into().unwrap());
    assert_eq!(&data[36..40], b"moov");
    assert_eq!(moov.size(), u64::from(expected));
    assert_eq!(moov.child_count(), 3);
}

#[test]
fn unknown_atoms_are_preserved() {
    let unknown = atom(b"zzzz", b"opaque payload bytes");
    let nested = atom(b"moov", &concat(&[common::mvhd(600, 0), atom(b"xtra", &[1, 2, 3])]));
    let data = concat(&[common::ftyp(), unknown, nested]);

    let mut root = atomtree::read(&data).unwrap();
    let zzzz = root.find_atom("zzzz").unwrap();
    assert_eq!(zzzz.layout(), Layout::Leaf);
    assert_eq!(
        root.find_property("zzzz.data").unwrap().bytes().unwrap().as_ref(),
        b"opaque payload bytes"
    );
    assert!(root.have_atom("moov.xtra"));

    assert_eq!(atomtree::to_bytes(&mut root).unwrap(), data);
}

#[test]
fn largesize_input_keeps_its_header_form() {
    let data = concat(&[common::ftyp(), large_atom(b"mdat", &[7; 32])]);
    let mut root = atomtree::read(&data).unwrap();
    let mdat = root.find_atom("mdat").unwrap();
    assert!(mdat.is_largesize());
    assert_eq!(mdat.size(), 48);

    assert_eq!(atomtree::to_bytes(&mut root).unwrap(), data);
}

#[test]
fn forced_largesize_grows_the_header() {
    let data = sample_movie();
    let mut root = atomtree::read(&data).unwrap();
    let compact_size = root.find_atom("moov").unwrap().size();
    root.find_atom_mut("moov").unwrap().set_largesize(true);

    let written = atomtree::to_bytes(&mut root).unwrap();
    assert_eq!(written.len(), data.len() + 8);

    let moov = root.find_atom("moov").unwrap();
    assert_eq!(moov.size(), compact_size + 8);
    let start = root.find_atom("ftyp").unwrap().size() as usize;
    assert_eq!(&written[start..start + 8], &[0, 0, 0, 1, b'm', b'o', b'o', b'v']);
    assert_eq!(
        u64::from_be_bytes(written[start + 8..start + 16].try_into().unwrap()),
        compact_size + 8
    );

    let reparsed = atomtree::read(&written).unwrap();
    assert!(reparsed.find_atom("moov").unwrap().is_largesize());
    assert_eq!(
        reparsed
            .find_property("moov.trak[1].mdia.hdlr.handlerType")
            .unwrap()
            .string()
            .unwrap(),
        "soun"
    );
}

#[test]
fn size_zero_atom_is_written_with_its_real_size() {
    let mut mdat = atom(b"mdat", &[5; 10]);
    mdat[..4].copy_from_slice(&[0, 0, 0, 0]);
    let data = concat(&[common::ftyp(), mdat]);

    let mut root = atomtree::read(&data).unwrap();
    assert_eq!(root.find_atom("mdat").unwrap().size(), 18);

    let written = atomtree::to_bytes(&mut root).unwrap();
    let start = written.len() - 18;
    assert_eq!(&written[start..start + 4], &18u32.to_be_bytes());
    assert_eq!(written[start + 4..], data[start + 4..]);
}

#[test]
fn bytes_after_a_counted_name_are_kept() {
    let mut data = sample_movie();
    let at = data.windows(5).position(|w| w == b"\x04test").unwrap();
    let mut name = vec![3, b'a', b'v', b'c'];
    name.resize(32, 0xAA);
    data[at..at + 32].copy_from_slice(&name);

    let mut root = atomtree::read(&data).unwrap();
    let path = "moov.trak.mdia.minf.stbl.stsd.avc1.compressorName";
    assert_eq!(root.find_property(path).unwrap().string().unwrap(), "avc");
    assert_eq!(atomtree::to_bytes(&mut root).unwrap(), data);
}

/// Discards everything written, keeping only the length and the first bytes.
#[derive(Default)]
struct HeaderSink {
    pos: u64,
    end: u64,
    head: [u8; 16],
}

impl Write for HeaderSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for (i, &byte) in buf.iter().enumerate() {
            let at = self.pos + i as u64;
            if at >= self.head.len() as u64 {
                break;
            }
            self.head[at as usize] = byte;
        }
        self.pos += buf.len() as u64;
        self.end = self.end.max(self.pos);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for HeaderSink {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(n) => n,
            SeekFrom::Current(d) => self.pos.checked_add_signed(d).unwrap(),
            SeekFrom::End(d) => self.end.checked_add_signed(d).unwrap(),
        };
        Ok(self.pos)
    }
}

fn write_padding(len: u64) -> (Atom, HeaderSink) {
    let mut free = Atom::padding(FourCC::new(*b"free"));
    free.generate().unwrap();
    free.set_padding_len(len);
    let sink = atomtree::write(&mut free, HeaderSink::default()).unwrap();
    (free, sink)
}

#[test]
fn body_past_32_bits_gets_a_64_bit_header() {
    let (free, sink) = write_padding(u64::from(u32::MAX) - 7);
    let size = u64::from(u32::MAX) + 9;
    assert!(free.is_largesize());
    assert_eq!(free.size(), size);
    assert_eq!(sink.end, size);
    assert_eq!(&sink.head[..8], &[0, 0, 0, 1, b'f', b'r', b'e', b'e']);
    assert_eq!(sink.head[8..], size.to_be_bytes());

    let (free, sink) = write_padding(u64::from(u32::MAX) - 8);
    assert!(!free.is_largesize());
    assert_eq!(free.size(), u64::from(u32::MAX));
    assert_eq!(&sink.head[..8], &[0xFF, 0xFF, 0xFF, 0xFF, b'f', b'r', b'e', b'e']);
    assert!(sink.head[8..].iter().all(|&b| b == 0));
}

#[test]
fn padding_is_written_as_zeros() {
    let data = concat(&[common::ftyp(), atom(b"skip", &[0x55; 6])]);
    let mut root = atomtree::read(&data).unwrap();
    let skip = root.find_atom("skip").unwrap();
    assert_eq!(skip.layout(), Layout::Padding);
    assert_eq!(skip.padding_len(), 6);

    let written = atomtree::to_bytes(&mut root).unwrap();
    assert_eq!(written.len(), data.len());
    assert!(written[written.len() - 6..].iter().all(|&b| b == 0));
}

#[test]
fn write_file_replaces_the_target() {
    let dir = std::env::temp_dir().join(format!("atomtree-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("movie.mp4");

    let data = sample_movie();
    let mut root = atomtree::read(&data).unwrap();
    atomtree::write_file(&mut root, &path).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), data);

    let reread = atomtree::read_file(&path).unwrap();
    assert_eq!(reread.child_count(), 4);
    assert!(reread.find_child(FourCC::new(*b"mdat"), 0).is_some());

    std::fs::remove_dir_all(&dir).unwrap();
}
