//! Layouts of the ISO-MP4 and QuickTime atoms known to [`Registry::standard`].
//!
//! * [ISO/IEC 14496-12](https://en.wikipedia.org/wiki/MPEG-4_Part_14) - ISO Base Media File Format (QuickTime, MPEG-4, etc)
//! * [ISO/IEC 14496-14](https://en.wikipedia.org/wiki/MPEG-4_Part_14) - MP4 file format
//! * ETSI TS 102 366 Annex F - AC-3 in ISO base media files
//!
//! * <http://mp4ra.org/#/atoms>
//!
//! Every atom is declared as a list of [`Property`] values plus a [`Layout`];
//! anything not listed here is kept as opaque bytes.
//!
//! Supported Atoms:
//! ```text
//! ftyp
//! moov
//!     mvhd
//!     iods
//!     udta
//!         name
//!         chpl
//!         cprt
//!         meta
//!             hdlr
//!             ilst
//!                 <item>
//!                     data
//!                 ----
//!                     mean
//!                     name
//!                     data
//!     trak
//!         tkhd
//!         tref
//!             chap
//!         edts
//!             elst
//!         mdia
//!             mdhd
//!             hdlr
//!             minf
//!                 vmhd
//!                 smhd
//!                 nmhd
//!                 gmhd
//!                 dinf
//!                     dref
//!                         url
//!                 stbl
//!                     stsd
//!                         mp4a
//!                             esds
//!                         avc1
//!                             avcC
//!                             btrt
//!                             colr
//!                             pasp
//!                         ac-3
//!                             dac3
//!                     stts
//!                     ctts
//!                     stss
//!                     stsc
//!                     stsz
//!                     stco
//!                     co64
//!                     sdtp
//! mdat
//! free
//! skip
//! wide
//! ```

#[cfg(doc)]
use crate::{Layout, Property};
use crate::{Atom, FourCC, Registry};

mod file;
mod metadata;
mod movie;
mod sample_entry;
mod sample_table;
mod track;

/// Registers each `code => constructor` pair, optionally under one parent.
macro_rules! atoms {
    ($registry:expr, { $( $code:literal => $ctor:path ),* $(,)? }) => {
        $( $registry.register(FourCC::new(*$code), $ctor); )*
    };
    ($registry:expr, in $parent:literal { $( $code:literal => $ctor:path ),* $(,)? }) => {
        $( $registry.register_in(FourCC::new(*$parent), FourCC::new(*$code), $ctor); )*
    };
}
pub(crate) use atoms;

pub(crate) fn register_standard(registry: &mut Registry) {
    file::register(registry);
    movie::register(registry);
    metadata::register(registry);
    track::register(registry);
    sample_table::register(registry);
    sample_entry::register(registry);
}

/// Properties followed by children, with no fields of its own.
pub(crate) fn container(kind: FourCC) -> Atom {
    Atom::container(kind)
}

/// Creates `kind` as the registry would under `parent`, generates it and
/// appends it to `parent`.
pub(crate) fn add_generated(
    parent: &mut Atom,
    constructor: fn(FourCC) -> Atom,
    kind: &[u8; 4],
) -> crate::Result<()> {
    let mut child = constructor(FourCC::new(*kind));
    child.generate()?;
    parent.add_child(child);
    Ok(())
}

/// Sets `flags` to 1, the "enabled" / "self-contained" bit of several atoms.
pub(crate) fn set_flag_one(atom: &mut Atom) -> crate::Result<()> {
    atom.find_property_mut("flags")?.set_integer(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Layout;

    #[test]
    fn test_standard_registry() {
        let registry = Registry::standard();
        let moov = FourCC::new(*b"moov");
        assert_eq!(registry.create(moov, None).layout(), Layout::Container);
        assert_eq!(
            registry.create(FourCC::new(*b"free"), Some(moov)).layout(),
            Layout::Padding
        );
        assert!(registry.is_registered(FourCC::new(*b"stsz"), Some(FourCC::new(*b"stbl"))));
        assert!(!registry.is_registered(FourCC::new(*b"zzzz"), Some(moov)));
    }

    #[test]
    fn test_context_specific_name() {
        let registry = Registry::standard();
        let name = FourCC::new(*b"name");
        let track_name = registry.create(name, Some(FourCC::new(*b"udta")));
        assert!(track_name.property("version").is_none());
        let freeform = registry.create(name, Some(FourCC::new(*b"----")));
        assert!(freeform.property("version").is_some());
    }

    #[test]
    fn test_every_standard_atom_generates() {
        let registry = Registry::standard();
        for (kind, parent) in [
            (*b"ftyp", None),
            (*b"mvhd", Some(*b"moov")),
            (*b"tkhd", Some(*b"trak")),
            (*b"mdhd", Some(*b"mdia")),
            (*b"hdlr", Some(*b"mdia")),
            (*b"dref", Some(*b"dinf")),
            (*b"stsd", Some(*b"stbl")),
            (*b"stsz", Some(*b"stbl")),
            (*b"avc1", Some(*b"stsd")),
            (*b"avcC", Some(*b"avc1")),
            (*b"mp4a", Some(*b"stsd")),
            (*b"ac-3", Some(*b"stsd")),
            (*b"chpl", Some(*b"udta")),
            (*b"data", Some(*b"\xa9nam")),
        ] {
            let mut atom = registry.create(FourCC::new(kind), parent.map(FourCC::new));
            atom.generate().unwrap();
            assert!(atom.properties().iter().all(|p| !p.is_empty()
                || p.as_table().is_some()
                || p.is_implicit()));
        }
    }
}
