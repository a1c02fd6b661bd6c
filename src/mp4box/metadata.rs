//! iTunes-style metadata: `meta`, `hdlr`, `ilst` and its items.

use super::{add_generated, atoms, container};
use crate::property::{BytesLength, Property, StringFormat};
use crate::{Atom, FourCC, Registry, Result};

/// Item codes whose `data` children are parsed as typed values. `data` under
/// any other parent stays opaque.
const ITEMS: &[&[u8; 4]] = &[
    b"\xa9nam", b"\xa9ART", b"aART", b"\xa9alb", b"\xa9grp", b"\xa9wrt", b"\xa9cmt",
    b"\xa9gen", b"\xa9day", b"\xa9too", b"\xa9enc", b"\xa9lyr", b"gnre", b"trkn", b"disk",
    b"tmpo", b"cpil", b"pgap", b"pcst", b"hdvd", b"stik", b"rtng", b"tvsh", b"tven",
    b"tvsn", b"tves", b"tvnn", b"desc", b"ldes", b"sonm", b"soar", b"soaa", b"soal",
    b"soco", b"sosn", b"purd", b"purl", b"catg", b"keyw", b"egid", b"apID", b"akID",
    b"cnID", b"atID", b"plID", b"geID", b"sfID", b"cprt", b"covr", b"----",
];

pub(crate) fn register(registry: &mut Registry) {
    atoms!(registry, {
        b"meta" => meta,
        b"hdlr" => hdlr,
        b"ilst" => container,
    });
    registry.register_children_of(FourCC::new(*b"ilst"), container);
    for item in ITEMS {
        registry.register_in(FourCC::new(**item), FourCC::new(*b"data"), data);
    }
    atoms!(registry, in b"----" {
        b"mean" => freeform_text,
        b"name" => freeform_text,
    });
}

/// Full container: version and flags, then children.
fn meta(kind: FourCC) -> Atom {
    Atom::container(kind)
        .with_version_and_flags()
        .with_generator(generate_meta)
}

fn generate_meta(meta: &mut Atom) -> Result<()> {
    add_generated(meta, hdlr, b"hdlr")?;
    meta.find_property_mut("hdlr.handlerType")?.set_string("mdir")
}

/// Handler reference: what kind of media or metadata the parent holds.
pub(crate) fn hdlr(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::uint("reserved1", 4))
        .with_property(Property::text("handlerType", StringFormat::Fixed(4)))
        .with_property(Property::reserved("reserved2", 12))
        .with_property(Property::text("name", StringFormat::NullTerminated))
}

/// Value of one metadata item. `typeCode` tells how to read `metadata`
/// (1 = UTF-8, 13 = JPEG, 21 = signed integer, ...).
fn data(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_property(Property::uint("typeReserved", 2))
        .with_property(Property::uint("typeSetIdentifier", 1))
        .with_property(Property::uint("typeCode", 1))
        .with_property(Property::uint("locale", 4))
        .with_property(Property::blob("metadata", BytesLength::Remaining))
}

/// `mean` and `name` of a freeform `----` item.
fn freeform_text(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::text("value", StringFormat::Remaining))
}
