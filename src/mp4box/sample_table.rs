//! Sample tables: descriptions, timing, sync points, chunking and sizes.

use super::{atoms, container};
use crate::property::Property;
use crate::{Atom, FourCC, Registry};

pub(crate) fn register(registry: &mut Registry) {
    atoms!(registry, {
        b"stbl" => container,
        b"stsd" => stsd,
        b"stts" => stts,
        b"ctts" => ctts,
        b"stss" => stss,
        b"stsc" => stsc,
        b"stsz" => stsz,
        b"stco" => stco,
        b"co64" => co64,
        b"sdtp" => sdtp,
    });
}

/// Sample descriptions, one child sample entry per description.
fn stsd(kind: FourCC) -> Atom {
    Atom::container(kind)
        .with_version_and_flags()
        .with_property(Property::uint("entryCount", 4).counts_children())
}

/// A full atom holding a 32-bit entry count and a table of 32-bit columns.
fn counted_table(kind: FourCC, columns: &[&'static str]) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::uint("entryCount", 4))
        .with_property(Property::table(
            "entries",
            "entryCount",
            columns.iter().map(|&name| Property::uint(name, 4)).collect(),
        ))
}

fn stts(kind: FourCC) -> Atom {
    counted_table(kind, &["sampleCount", "sampleDelta"])
}

fn ctts(kind: FourCC) -> Atom {
    counted_table(kind, &["sampleCount", "sampleOffset"])
}

fn stss(kind: FourCC) -> Atom {
    counted_table(kind, &["sampleNumber"])
}

fn stsc(kind: FourCC) -> Atom {
    counted_table(kind, &["firstChunk", "samplesPerChunk", "sampleDescriptionIndex"])
}

fn stco(kind: FourCC) -> Atom {
    counted_table(kind, &["chunkOffset"])
}

fn co64(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::uint("entryCount", 4))
        .with_property(Property::table(
            "entries",
            "entryCount",
            vec![Property::uint("chunkOffset", 8)],
        ))
}

/// Sample sizes. A non-zero `sampleSize` means every sample has that size and
/// no per-sample table follows.
fn stsz(kind: FourCC) -> Atom {
    let mut stsz = Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::uint("sampleSize", 4))
        .with_property(Property::uint("sampleCount", 4))
        .with_property(
            Property::table(
                "entries",
                "sampleCount",
                vec![Property::uint("entrySize", 4)],
            )
            .present_if("sampleSize", u64::MAX, 0),
        );
    // Without the table the count is the caller's to set.
    if let Some(count) = stsz.property_mut("sampleCount") {
        count.set_read_only(false);
    }
    stsz
}

/// Independent and disposable samples. One byte per sample up to the end of
/// the atom; the sample count is not stored.
fn sdtp(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::uint("sampleCount", 4).implicit())
        .with_property(Property::table(
            "entries",
            "sampleCount",
            vec![
                Property::bitfield("isLeading", 2),
                Property::bitfield("sampleDependsOn", 2),
                Property::bitfield("sampleIsDependedOn", 2),
                Property::bitfield("sampleHasRedundancy", 2),
            ],
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_sample_size_has_no_table() {
        let mut atom = stsz(FourCC::new(*b"stsz"));
        atom.generate().unwrap();
        atom.find_property_mut("sampleSize").unwrap().set_integer(512).unwrap();
        atom.find_property_mut("sampleCount").unwrap().set_integer(40).unwrap();
        atom.sync_counts().unwrap();
        assert_eq!(atom.find_property("sampleCount").unwrap().integer().unwrap(), 40);
    }

    #[test]
    fn test_sdtp_rows() {
        let mut atom = sdtp(FourCC::new(*b"sdtp"));
        atom.generate().unwrap();
        atom.add_row("entries").unwrap();
        atom.find_property_mut("entries[0].sampleDependsOn")
            .unwrap()
            .set_integer(2)
            .unwrap();
        assert!(atom
            .find_property_mut("entries[0].isLeading")
            .unwrap()
            .set_integer(4)
            .is_err());
    }
}
