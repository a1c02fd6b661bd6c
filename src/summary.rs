use serde::Serialize;

use crate::atom::fourcc_property;
use crate::{Atom, FourCC};

/// File-level facts gathered from a parsed or generated tree.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub major_brand: String,
    pub minor_version: u64,
    /// Compatible brands with trailing spaces stripped, e.g. `"3gp6"`, `"M4A"`.
    pub compatible_brands: Vec<String>,
    pub largesize_atoms: usize,
    pub version_one_atoms: usize,
    pub co64_atoms: usize,
}

impl FileSummary {
    /// Summarizes `root`. A missing `ftyp` leaves the brand fields empty.
    pub fn of(root: &Atom) -> Self {
        let mut summary = Self::default();

        if let Some(ftyp) = root.find_child(FourCC::new(*b"ftyp"), 0) {
            if let Some(brand) = fourcc_property(ftyp, "majorBrand") {
                summary.major_brand = brand.to_string().trim_end().to_owned();
            }
            summary.minor_version = ftyp
                .property("minorVersion")
                .and_then(|p| p.integer().ok())
                .unwrap_or(0);
            if let Some(brands) = ftyp
                .property("compatibleBrands")
                .and_then(|p| p.as_table())
                .and_then(|t| t.column("brand"))
            {
                summary.compatible_brands = (0..brands.len())
                    .filter_map(|row| brands.string_at(row).ok())
                    .map(|brand| brand.trim_end().to_owned())
                    .collect();
            }
        }

        summary.count(root);
        summary
    }

    fn count(&mut self, atom: &Atom) {
        if !atom.is_root() {
            if atom.is_largesize() {
                self.largesize_atoms += 1;
            }
            if atom.property("version").is_some() && atom.version() == 1 {
                self.version_one_atoms += 1;
            }
            if atom.kind() == FourCC::new(*b"co64") {
                self.co64_atoms += 1;
            }
        }
        for child in atom.children() {
            self.count(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;

    #[test]
    fn test_summary_of_generated_tree() {
        let registry = Registry::standard();
        let mut root = Atom::root();
        root.generate().unwrap();
        root.add_descendant_atoms(&registry, "ftyp").unwrap();
        root.add_descendant_atoms(&registry, "moov.trak.mdia.minf.stbl.co64")
            .unwrap();
        root.add_descendant_atoms(&registry, "moov.mvhd").unwrap();
        root.find_property_mut("moov.mvhd.version")
            .unwrap()
            .set_integer(1)
            .unwrap();
        root.find_atom_mut("moov").unwrap().set_largesize(true);

        let summary = FileSummary::of(&root);
        assert_eq!(summary.major_brand, "mp42");
        assert_eq!(summary.compatible_brands, vec!["mp42", "isom"]);
        assert_eq!(summary.largesize_atoms, 1);
        assert_eq!(summary.version_one_atoms, 1);
        assert_eq!(summary.co64_atoms, 1);
    }
}
