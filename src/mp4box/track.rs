use super::movie::IDENTITY_MATRIX;
use super::{add_generated, atoms, container, set_flag_one};
use crate::property::{BytesLength, FloatFormat, Property, StringFormat};
use crate::{Atom, FourCC, Registry, Result};

pub(crate) fn register(registry: &mut Registry) {
    atoms!(registry, {
        b"trak" => container,
        b"tkhd" => tkhd,
        b"tref" => container,
        b"edts" => container,
        b"elst" => elst,
        b"mdia" => container,
        b"mdhd" => mdhd,
        b"minf" => container,
        b"vmhd" => vmhd,
        b"smhd" => smhd,
        b"nmhd" => nmhd,
        b"gmhd" => container,
        b"dinf" => container,
        b"dref" => dref,
        b"url " => url,
    });
    atoms!(registry, in b"tref" {
        b"chap" => track_references,
    });
}

/// Track header. `flags` bit 0 enables the track.
fn tkhd(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::versioned("creationTime"))
        .with_property(Property::versioned("modificationTime"))
        .with_property(Property::uint("trackId", 4))
        .with_property(Property::reserved("reserved1", 4))
        .with_property(Property::versioned("duration"))
        .with_property(Property::reserved("reserved2", 8))
        .with_property(Property::uint("layer", 2))
        .with_property(Property::uint("alternateGroup", 2))
        .with_property(Property::fixed("volume", FloatFormat::Fixed8_8))
        .with_property(Property::reserved("reserved3", 2))
        .with_property(Property::blob("matrix", BytesLength::Fixed(36)).default_bytes(&IDENTITY_MATRIX))
        .with_property(Property::fixed("width", FloatFormat::Fixed16_16))
        .with_property(Property::fixed("height", FloatFormat::Fixed16_16))
        .with_generator(set_flag_one)
}

/// Track ids referenced by a `tref` entry, up to the end of the atom.
fn track_references(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_property(Property::uint("entryCount", 4).implicit())
        .with_property(Property::table(
            "entries",
            "entryCount",
            vec![Property::uint("trackId", 4)],
        ))
}

/// Edit list.
fn elst(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::uint("entryCount", 4))
        .with_property(Property::table(
            "edits",
            "entryCount",
            vec![
                Property::versioned("segmentDuration"),
                Property::versioned("mediaTime"),
                Property::uint("mediaRate", 2).default_integer(1),
                Property::uint("reserved", 2),
            ],
        ))
}

/// Media header. The language is three 5-bit letters offset by 0x60,
/// defaulting to "und".
fn mdhd(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::versioned("creationTime"))
        .with_property(Property::versioned("modificationTime"))
        .with_property(Property::uint("timeScale", 4).default_integer(1000))
        .with_property(Property::versioned("duration"))
        .with_property(Property::bitfield("pad", 1).read_only())
        .with_property(Property::bitfield("language", 15).default_integer(0x55C4))
        .with_property(Property::uint("quality", 2))
}

fn vmhd(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::uint("graphicsMode", 2))
        .with_property(Property::blob("opColor", BytesLength::Fixed(6)))
        .with_generator(set_flag_one)
}

fn smhd(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::uint("balance", 2))
        .with_property(Property::reserved("reserved", 2))
}

fn nmhd(kind: FourCC) -> Atom {
    Atom::leaf(kind).with_version_and_flags()
}

/// Data reference table. Its entries are child atoms, counted by `entryCount`.
fn dref(kind: FourCC) -> Atom {
    Atom::container(kind)
        .with_version_and_flags()
        .with_property(Property::uint("entryCount", 4).counts_children())
        .with_generator(generate_dref)
}

fn generate_dref(dref: &mut Atom) -> Result<()> {
    add_generated(dref, url, b"url ")
}

/// Data location. With `flags` bit 0 set the media is in this file and no
/// location follows.
fn url(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(
            Property::text("location", StringFormat::NullTerminated).present_if("flags", 1, 0),
        )
        .with_generator(set_flag_one)
}
