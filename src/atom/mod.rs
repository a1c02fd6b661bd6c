//! The in-memory atom tree.
//!
//! Every [`Atom`] exclusively owns its properties and children. There is no
//! parent pointer: code that needs the parent's type code (the registry,
//! path walks) receives it from the traversal that reached the atom.

use serde::Serialize;
use std::fmt::Write as _;

use crate::path::{parse_path, Segment};
use crate::property::{self, Property, PropertyKind, PropertyMut, PropertyRef, StringFormat};
use crate::{Bytes, Error, FourCC, Registry, Result};

mod header;
pub use header::{AtomHeader, HEADER_SIZE, LARGE_HEADER_SIZE};

/// How the bytes after an atom's properties are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layout {
    /// The headerless top of a file. Its children are the top-level atoms.
    Root,
    /// Properties only. Bytes left after the last property are kept verbatim.
    Leaf,
    /// Properties followed by child atoms filling the rest of the extent.
    Container,
    /// Skipped on read and written back as zeros.
    Padding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AtomState {
    /// Constructed, holding declared defaults only.
    Unpopulated,
    Parsed,
    Generated,
}

/// Installs static defaults after the generic per-property generate.
pub type Generator = fn(&mut Atom) -> Result<()>;

#[derive(Debug, Clone, Serialize)]
pub struct Atom {
    #[serde(rename = "type")]
    pub(crate) kind: FourCC,
    #[serde(skip)]
    pub(crate) layout: Layout,
    pub(crate) size: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub(crate) largesize: bool,
    #[serde(skip)]
    pub(crate) state: AtomState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) properties: Vec<Property>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) children: Vec<Atom>,
    #[serde(skip_serializing_if = "Bytes::is_empty")]
    pub(crate) trailing: Bytes,
    #[serde(skip)]
    pub(crate) padding: u64,
    #[serde(skip)]
    generator: Option<Generator>,
}

impl Atom {
    fn with_layout(kind: FourCC, layout: Layout) -> Self {
        Self {
            kind,
            layout,
            size: 0,
            largesize: false,
            state: AtomState::Unpopulated,
            properties: Vec::new(),
            children: Vec::new(),
            trailing: Bytes::new(),
            padding: 0,
            generator: None,
        }
    }

    pub fn leaf(kind: FourCC) -> Self {
        Self::with_layout(kind, Layout::Leaf)
    }

    pub fn container(kind: FourCC) -> Self {
        Self::with_layout(kind, Layout::Container)
    }

    pub fn padding(kind: FourCC) -> Self {
        Self::with_layout(kind, Layout::Padding)
    }

    /// An atom of unknown layout: the whole body is one byte property named
    /// `data`, so it survives a round trip untouched.
    pub fn opaque(kind: FourCC) -> Self {
        Self::leaf(kind).with_property(Property::blob(
            "data",
            property::BytesLength::Remaining,
        ))
    }

    /// The headerless top of a file.
    pub fn root() -> Self {
        Self::with_layout(FourCC::default(), Layout::Root)
    }

    /// Appends a property declaration. A table's count field becomes
    /// read-only, since the engine owns its value.
    pub fn with_property(mut self, property: Property) -> Self {
        if let Some(table) = property.as_table() {
            let count_field = table.count_field();
            if let Some(count) = self.properties.iter_mut().find(|p| p.name() == count_field) {
                count.set_read_only(true);
            }
        }
        self.properties.push(property);
        self
    }

    /// Declares the 8-bit `version` and 24-bit `flags` that open a full atom.
    pub fn with_version_and_flags(self) -> Self {
        self.with_property(Property::uint("version", 1))
            .with_property(Property::uint("flags", 3))
    }

    pub fn with_generator(mut self, generator: Generator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn kind(&self) -> FourCC {
        self.kind
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn state(&self) -> AtomState {
        self.state
    }

    /// Total byte size, header included, as of the last read or write.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_largesize(&self) -> bool {
        self.largesize
    }

    /// Forces the 64-bit header form on the next write. Clearing it lets the
    /// writer pick the compact form again whenever the size allows.
    pub fn set_largesize(&mut self, largesize: bool) {
        self.largesize = largesize;
    }

    pub fn is_root(&self) -> bool {
        self.layout == Layout::Root
    }

    /// Type code handed to the registry for this atom's children.
    pub(crate) fn context(&self) -> Option<FourCC> {
        (!self.is_root()).then_some(self.kind)
    }

    /// Bytes found after the last property of a leaf, or a zero tail after
    /// the last child of a container. Written back verbatim.
    pub fn trailing(&self) -> &Bytes {
        &self.trailing
    }

    /// Body length of a padding atom.
    pub fn padding_len(&self) -> u64 {
        self.padding
    }

    pub fn set_padding_len(&mut self, len: u64) {
        self.padding = len;
    }

    // ---- properties ----

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name() == name)
    }

    pub fn version(&self) -> u64 {
        self.property("version")
            .and_then(|p| p.integer().ok())
            .unwrap_or(0)
    }

    pub fn find_property(&self, path: &str) -> Result<PropertyRef<'_>> {
        crate::path::resolve_property(self, path)
    }

    pub fn find_property_mut(&mut self, path: &str) -> Result<PropertyMut<'_>> {
        crate::path::resolve_property_mut(self, path)
    }

    /// Inserts a default row into the table property `table` before `index`
    /// and updates its count field.
    pub fn insert_row(&mut self, table: &str, index: usize) -> Result<()> {
        self.table_mut(table)?.insert_row(index)?;
        if let Err(err) = self.sync_counts() {
            // The count field cannot represent the new length.
            self.table_mut(table)?.remove_row(index)?;
            return Err(err);
        }
        Ok(())
    }

    /// Appends a default row and returns its index.
    pub fn add_row(&mut self, table: &str) -> Result<usize> {
        let index = self.table_mut(table)?.row_count();
        self.insert_row(table, index)?;
        Ok(index)
    }

    pub fn remove_row(&mut self, table: &str, index: usize) -> Result<()> {
        self.table_mut(table)?.remove_row(index)?;
        self.sync_counts()
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut property::Table> {
        let property = self
            .properties
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| Error::PropertyNotFound(name.to_owned()))?;
        if property.kind() != PropertyKind::Table {
            return Err(Error::TypeMismatch {
                name: name.to_owned(),
                expected: "a table",
            });
        }
        property
            .as_table_mut()
            .ok_or(Error::InvalidData("table property without rows"))
    }

    /// Keeps count and length fields equal to the data they describe.
    pub(crate) fn sync_counts(&mut self) -> Result<()> {
        property::sync_counts(&mut self.properties, Some(self.children.len()))
    }

    // ---- children ----

    pub fn children(&self) -> &[Atom] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, index: usize) -> Result<&Atom> {
        let len = self.children.len();
        self.children
            .get(index)
            .ok_or(Error::IndexOutOfRange { index, len })
    }

    pub fn child_mut(&mut self, index: usize) -> Result<&mut Atom> {
        let len = self.children.len();
        self.children
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })
    }

    /// The `index`-th child (zero-based) among those of type `kind`.
    pub fn find_child(&self, kind: FourCC, index: usize) -> Option<&Atom> {
        self.children.iter().filter(|c| c.kind == kind).nth(index)
    }

    pub fn find_child_mut(&mut self, kind: FourCC, index: usize) -> Option<&mut Atom> {
        self.children
            .iter_mut()
            .filter(|c| c.kind == kind)
            .nth(index)
    }

    pub fn add_child(&mut self, child: Atom) {
        self.children.push(child);
    }

    pub fn insert_child(&mut self, index: usize, child: Atom) -> Result<()> {
        let len = self.children.len();
        if index > len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        self.children.insert(index, child);
        Ok(())
    }

    /// Detaches and returns the child at `index` together with its subtree.
    pub fn delete_child(&mut self, index: usize) -> Result<Atom> {
        let len = self.children.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        Ok(self.children.remove(index))
    }

    pub fn find_atom(&self, path: &str) -> Result<&Atom> {
        crate::path::resolve_atom(self, path)
    }

    pub fn find_atom_mut(&mut self, path: &str) -> Result<&mut Atom> {
        crate::path::resolve_atom_mut(self, path)
    }

    pub fn have_atom(&self, path: &str) -> bool {
        self.find_atom(path).is_ok()
    }

    /// Walks `path`, creating and generating every atom that is missing, and
    /// returns the deepest one. An indexed segment may only name an existing
    /// child or the next one to be appended.
    pub fn add_descendant_atoms(&mut self, registry: &Registry, path: &str) -> Result<&mut Atom> {
        let segments = parse_path(path)?;
        let mut atom = self;
        for Segment { kind, index } in segments {
            let wanted = index.unwrap_or(0);
            let existing = atom.children.iter().filter(|c| c.kind == kind).count();
            let position = if wanted < existing {
                atom.children
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.kind == kind)
                    .nth(wanted)
                    .map(|(i, _)| i)
            } else if wanted == existing {
                let mut child = registry.create(kind, atom.context());
                child.generate()?;
                log::trace!("added {kind} under {}", atom.kind);
                atom.children.push(child);
                Some(atom.children.len() - 1)
            } else {
                None
            };
            let position = position.ok_or_else(|| Error::PathNotFound(path.to_owned()))?;
            atom = &mut atom.children[position];
        }
        Ok(atom)
    }

    // ---- generate ----

    /// Populates a freshly constructed atom with defaults: every property in
    /// declaration order, then every unpopulated child, then the atom's own
    /// generator if it has one.
    pub fn generate(&mut self) -> Result<()> {
        if self.state != AtomState::Unpopulated {
            return Err(Error::AlreadyPopulated(self.kind));
        }
        for property in &mut self.properties {
            property.generate();
        }
        for child in &mut self.children {
            if child.state == AtomState::Unpopulated {
                child.generate()?;
            }
        }
        self.state = AtomState::Generated;
        if let Some(generator) = self.generator {
            generator(self)?;
        }
        self.sync_counts()
    }

    // ---- inspection ----

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|_err| Error::InvalidData("atom tree is not serializable"))
    }

    /// Indented listing of the subtree: one line per atom followed by its
    /// property values, table rows listed by index.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if self.is_root() {
            for child in &self.children {
                child.dump_into(&mut out, 0);
            }
        } else {
            self.dump_into(&mut out, 0);
        }
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let large = if self.largesize { ", largesize" } else { "" };
        writeln!(out, "{indent}type {} (size {}{large})", self.kind, self.size).ok();
        for property in &self.properties {
            if property.is_implicit() && !matches!(property.kind(), PropertyKind::Table) {
                continue;
            }
            match property.as_table() {
                Some(table) => {
                    for row in 0..table.row_count() {
                        for column in table.columns() {
                            writeln!(
                                out,
                                "{indent}  {}[{row}].{} = {}",
                                property.name(),
                                column.name(),
                                column.display_value(row)
                            )
                            .ok();
                        }
                    }
                }
                None => {
                    writeln!(
                        out,
                        "{indent}  {} = {}",
                        property.name(),
                        property.display_value(0)
                    )
                    .ok();
                }
            }
        }
        if !self.trailing.is_empty() {
            writeln!(out, "{indent}  <{} trailing bytes>", self.trailing.len()).ok();
        }
        for child in &self.children {
            child.dump_into(out, depth + 1);
        }
    }
}

/// Reads a four character code from a fixed-width string property, such as
/// `hdlr.handlerType`.
pub(crate) fn fourcc_property(atom: &Atom, name: &str) -> Option<FourCC> {
    let property = atom.property(name)?;
    if property.kind() != PropertyKind::String(StringFormat::Fixed(4)) {
        return None;
    }
    let bytes = property.bytes().ok()?;
    let value: [u8; 4] = bytes.as_ref().try_into().ok()?;
    Some(FourCC::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::BytesLength;

    fn stco(kind: FourCC) -> Atom {
        Atom::leaf(kind)
            .with_version_and_flags()
            .with_property(Property::uint("entryCount", 1))
            .with_property(Property::table(
                "entries",
                "entryCount",
                vec![Property::uint("chunkOffset", 4)],
            ))
    }

    #[test]
    fn test_count_field_is_read_only() {
        let atom = stco(FourCC::new(*b"stco"));
        assert!(atom.property("entryCount").unwrap().is_read_only());
        assert!(!atom.property("version").unwrap().is_read_only());
    }

    #[test]
    fn test_rows_keep_count_in_step() {
        let mut atom = stco(FourCC::new(*b"stco"));
        atom.generate().unwrap();
        assert_eq!(atom.add_row("entries").unwrap(), 0);
        assert_eq!(atom.add_row("entries").unwrap(), 1);
        atom.insert_row("entries", 0).unwrap();
        assert_eq!(atom.property("entryCount").unwrap().integer().unwrap(), 3);
        atom.remove_row("entries", 2).unwrap();
        assert_eq!(atom.property("entryCount").unwrap().integer().unwrap(), 2);
        assert!(matches!(
            atom.remove_row("entries", 2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            atom.insert_row("version", 0),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_count_overflow_rolls_back() {
        let mut atom = stco(FourCC::new(*b"stco"));
        atom.generate().unwrap();
        for _ in 0..255 {
            atom.add_row("entries").unwrap();
        }
        assert!(matches!(atom.add_row("entries"), Err(Error::InvalidValue(..))));
        let table = atom.property("entries").unwrap().as_table().unwrap();
        assert_eq!(table.row_count(), 255);
        assert_eq!(atom.property("entryCount").unwrap().integer().unwrap(), 255);
    }

    #[test]
    fn test_generate_once() {
        let mut atom = Atom::opaque(FourCC::new(*b"xyzw"));
        atom.generate().unwrap();
        assert_eq!(atom.state(), AtomState::Generated);
        assert!(matches!(atom.generate(), Err(Error::AlreadyPopulated(_))));
    }

    #[test]
    fn test_children_by_type() {
        let mut moov = Atom::container(FourCC::new(*b"moov"));
        for kind in [*b"mvhd", *b"trak", *b"udta", *b"trak"] {
            moov.add_child(Atom::opaque(FourCC::new(kind)));
        }
        let trak = FourCC::new(*b"trak");
        assert!(moov.find_child(trak, 1).is_some());
        assert!(moov.find_child(trak, 2).is_none());
        assert!(matches!(
            moov.child(4),
            Err(Error::IndexOutOfRange { index: 4, len: 4 })
        ));
        let removed = moov.delete_child(1).unwrap();
        assert_eq!(removed.kind(), trak);
        assert_eq!(moov.child(1).unwrap().kind(), FourCC::new(*b"udta"));
    }

    #[test]
    fn test_length_field_follows_bytes() {
        let mut atom = Atom::leaf(FourCC::new(*b"test"))
            .with_property(Property::uint("length", 2))
            .with_property(Property::blob("payload", BytesLength::Field("length")));
        atom.generate().unwrap();
        atom.property_mut("payload")
            .unwrap()
            .set_bytes(vec![1u8, 2, 3])
            .unwrap();
        atom.sync_counts().unwrap();
        assert_eq!(atom.property("length").unwrap().integer().unwrap(), 3);
    }
}
