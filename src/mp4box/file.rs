use super::atoms;
use crate::property::{Property, StringFormat};
use crate::{Atom, FourCC, Registry, Result};

pub(crate) fn register(registry: &mut Registry) {
    atoms!(registry, {
        b"ftyp" => ftyp,
        b"mdat" => Atom::opaque,
        b"free" => Atom::padding,
        b"skip" => Atom::padding,
        b"wide" => Atom::padding,
    });
}

/// File type: major brand, minor version and compatible brands running to the
/// end of the atom.
pub(crate) fn ftyp(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_property(Property::text("majorBrand", StringFormat::Fixed(4)))
        .with_property(Property::uint("minorVersion", 4))
        .with_property(Property::uint("compatibleBrandsCount", 4).implicit())
        .with_property(Property::table(
            "compatibleBrands",
            "compatibleBrandsCount",
            vec![Property::text("brand", StringFormat::Fixed(4))],
        ))
        .with_generator(generate_ftyp)
}

fn generate_ftyp(ftyp: &mut Atom) -> Result<()> {
    ftyp.find_property_mut("majorBrand")?.set_string("mp42")?;
    for brand in ["mp42", "isom"] {
        let row = ftyp.add_row("compatibleBrands")?;
        ftyp.find_property_mut(&format!("compatibleBrands[{row}].brand"))?
            .set_string(brand)?;
    }
    Ok(())
}
