use super::{atoms, container};
use crate::property::{BytesLength, FloatFormat, Property, StringFormat};
use crate::{Atom, FourCC, Registry};

/// Unity transform: 16.16 `a`, `d` and 2.30 `w` on the diagonal.
pub(crate) const IDENTITY_MATRIX: [u8; 36] = [
    0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, //
];

pub(crate) fn register(registry: &mut Registry) {
    atoms!(registry, {
        b"moov" => container,
        b"mvhd" => mvhd,
        b"iods" => iods,
        b"udta" => container,
    });
    atoms!(registry, in b"udta" {
        b"name" => track_name,
        b"chpl" => chpl,
        b"cprt" => cprt,
    });
}

/// Movie header. Times and duration widen to 64 bits in version 1.
pub(crate) fn mvhd(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::versioned("creationTime"))
        .with_property(Property::versioned("modificationTime"))
        .with_property(Property::uint("timeScale", 4).default_integer(1000))
        .with_property(Property::versioned("duration"))
        .with_property(Property::fixed("rate", FloatFormat::Fixed16_16).default_float(1.0))
        .with_property(Property::fixed("volume", FloatFormat::Fixed8_8).default_float(1.0))
        .with_property(Property::reserved("reserved", 10))
        .with_property(Property::blob("matrix", BytesLength::Fixed(36)).default_bytes(&IDENTITY_MATRIX))
        .with_property(Property::reserved("predefined", 24))
        .with_property(Property::uint("nextTrackId", 4).default_integer(1))
}

/// Initial object descriptor, kept as raw descriptor bytes.
fn iods(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::blob("descriptors", BytesLength::Remaining))
}

/// QuickTime track name stored in a track's `udta`.
fn track_name(kind: FourCC) -> Atom {
    Atom::leaf(kind).with_property(Property::text("value", StringFormat::Remaining))
}

/// Nero chapter list.
fn chpl(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::uint("reserved", 1))
        .with_property(Property::uint("chaptercount", 1))
        .with_property(Property::table(
            "chapters",
            "chaptercount",
            vec![
                Property::uint("starttime", 8),
                Property::text("title", StringFormat::Counted(None)),
            ],
        ))
}

fn cprt(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::bitfield("pad", 1).read_only())
        .with_property(Property::bitfield("language", 15).default_integer(0x55C4))
        .with_property(Property::text("notice", StringFormat::NullTerminated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mvhd_defaults() {
        let mut atom = mvhd(FourCC::new(*b"mvhd"));
        atom.generate().unwrap();
        assert_eq!(atom.find_property("timeScale").unwrap().integer().unwrap(), 1000);
        assert!((atom.find_property("rate").unwrap().float().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(
            atom.find_property("matrix").unwrap().bytes().unwrap().as_ref(),
            &IDENTITY_MATRIX
        );
        assert!(matches!(
            atom.find_property_mut("predefined")
                .unwrap()
                .set_bytes(vec![1u8; 24]),
            Err(crate::Error::PropertyReadOnly(_))
        ));
    }

    #[test]
    fn test_chapter_rows() {
        let mut atom = chpl(FourCC::new(*b"chpl"));
        atom.generate().unwrap();
        let row = atom.add_row("chapters").unwrap();
        atom.find_property_mut("chapters[0].title")
            .unwrap()
            .set_string("Intro")
            .unwrap();
        atom.find_property_mut("chapters[0].starttime")
            .unwrap()
            .set_integer(10_000_000)
            .unwrap();
        assert_eq!(row, 0);
        assert_eq!(atom.find_property("chaptercount").unwrap().integer().unwrap(), 1);
    }
}
