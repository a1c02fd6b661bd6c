//! Typed, named fields owned by atoms.
//!
//! A [`Property`] is declared with a [`PropertyKind`] that alone decides how
//! many bytes (or bits) it occupies on disk. Every property holds an ordered
//! list of values: scalars hold exactly one, the columns of a [`Table`] hold
//! one per row.

use serde::Serialize;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::io::{Read, Seek, Write};

use crate::stream::{AtomReader, AtomWriter};
use crate::{Bytes, Error, FixedPointU16, FixedPointU8, Result};

mod table;
pub use table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FloatFormat {
    /// 8.8 fixed point in 16 bits.
    Fixed8_8,
    /// 16.16 fixed point in 32 bits.
    Fixed16_16,
    Ieee32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StringFormat {
    NullTerminated,
    /// Exactly this many bytes, zero padded.
    Fixed(usize),
    /// One length byte followed by the characters. With `Some(width)` the
    /// field always occupies `width` bytes and is stored whole, so whatever
    /// follows the text is written back as it was read.
    Counted(Option<usize>),
    /// Everything up to the end of the atom.
    Remaining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BytesLength {
    Fixed(usize),
    /// Length held by an integer declared earlier in the atom or row.
    Field(&'static str),
    /// Everything up to the end of the atom.
    Remaining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropertyKind {
    /// Unsigned big-endian integer of 1, 2, 3, 4 or 8 bytes.
    Integer(u8),
    /// 4 bytes when the owning atom has `version == 0`, 8 bytes when it is 1.
    VersionedInteger,
    /// 1 to 64 bits, packed MSB-first with neighbouring bitfields.
    Bitfield(u8),
    Float(FloatFormat),
    String(StringFormat),
    Bytes(BytesLength),
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DefaultValue {
    Integer(u64),
    Float(f64),
    Bytes(&'static [u8]),
}

/// Makes a property conditional on an integer declared before it: the field
/// is present only when `(field & mask) == equals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Guard {
    pub field: &'static str,
    pub mask: u64,
    pub equals: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Values {
    Integer(Vec<u64>),
    Bytes(Vec<Bytes>),
    Table(Table),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Integer(u64),
    Bytes(Bytes),
}

/// On-disk footprint of one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Width {
    Bits(u64),
    Bytes(u64),
}

/// Mirrors the alignment rules of [`AtomWriter`]: bitfields share bytes,
/// anything else starts on a fresh byte.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SizeCounter {
    bytes: u64,
    bits: u64,
}

impl SizeCounter {
    pub fn add(&mut self, width: Width) {
        match width {
            Width::Bits(n) => {
                self.bits += n;
                self.bytes += self.bits / 8;
                self.bits %= 8;
            }
            Width::Bytes(n) => {
                self.align();
                self.bytes += n;
            }
        }
    }

    pub fn align(&mut self) {
        if self.bits > 0 {
            self.bytes += 1;
            self.bits = 0;
        }
    }

    pub fn finish(mut self) -> u64 {
        self.align();
        self.bytes
    }
}

/// What a property can see while it is read, written or measured: the
/// properties declared before it and, inside a table, the earlier columns of
/// the current row.
#[derive(Clone, Copy)]
pub(crate) struct FieldContext<'a> {
    siblings: &'a [Property],
    row: Option<(&'a [Property], usize)>,
}

impl<'a> FieldContext<'a> {
    pub fn new(siblings: &'a [Property]) -> Self {
        Self {
            siblings,
            row: None,
        }
    }

    pub fn with_row(self, columns: &'a [Property], row: usize) -> Self {
        Self {
            siblings: self.siblings,
            row: Some((columns, row)),
        }
    }

    pub fn find(&self, name: &str) -> Option<&'a Property> {
        self.siblings.iter().find(|p| p.name == name)
    }

    pub fn integer(&self, name: &str) -> Option<u64> {
        if let Some((columns, row)) = self.row {
            if let Some(column) = columns.iter().find(|p| p.name == name) {
                return column.integer_at(row).ok();
            }
        }
        self.find(name).and_then(|p| p.integer_at(0).ok())
    }

    pub fn version(&self) -> u64 {
        self.integer("version").unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    name: &'static str,
    kind: PropertyKind,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    read_only: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    implicit: bool,
    #[serde(skip)]
    counts_children: bool,
    #[serde(skip)]
    guard: Option<Guard>,
    #[serde(skip)]
    default: Option<DefaultValue>,
    values: Values,
}

impl Property {
    fn declare(name: &'static str, kind: PropertyKind) -> Self {
        let values = match kind {
            PropertyKind::Integer(_)
            | PropertyKind::VersionedInteger
            | PropertyKind::Bitfield(_)
            | PropertyKind::Float(_) => Values::Integer(Vec::new()),
            PropertyKind::String(_) | PropertyKind::Bytes(_) => Values::Bytes(Vec::new()),
            PropertyKind::Table => Values::Table(Table::new("", Vec::new())),
        };
        let mut property = Self {
            name,
            kind,
            read_only: false,
            implicit: false,
            counts_children: false,
            guard: None,
            default: None,
            values,
        };
        property.generate();
        property
    }

    /// Unsigned integer `width` bytes wide.
    pub fn uint(name: &'static str, width: u8) -> Self {
        debug_assert!(matches!(width, 1 | 2 | 3 | 4 | 8), "bad integer width");
        Self::declare(name, PropertyKind::Integer(width))
    }

    pub fn versioned(name: &'static str) -> Self {
        Self::declare(name, PropertyKind::VersionedInteger)
    }

    pub fn bitfield(name: &'static str, bits: u8) -> Self {
        debug_assert!((1..=64).contains(&bits), "bad bitfield width");
        Self::declare(name, PropertyKind::Bitfield(bits))
    }

    pub fn fixed(name: &'static str, format: FloatFormat) -> Self {
        Self::declare(name, PropertyKind::Float(format))
    }

    pub fn text(name: &'static str, format: StringFormat) -> Self {
        Self::declare(name, PropertyKind::String(format))
    }

    pub fn blob(name: &'static str, length: BytesLength) -> Self {
        Self::declare(name, PropertyKind::Bytes(length))
    }

    /// Zero-filled padding that callers cannot change.
    pub fn reserved(name: &'static str, size: usize) -> Self {
        Self::blob(name, BytesLength::Fixed(size)).read_only()
    }

    /// A table whose row count lives in the integer property `count_field`,
    /// which must be declared earlier in the same atom.
    pub fn table(name: &'static str, count_field: &'static str, columns: Vec<Self>) -> Self {
        let mut property = Self::declare(name, PropertyKind::Table);
        property.values = Values::Table(Table::new(count_field, columns));
        property
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Declared and addressable but never read from or written to the stream.
    pub fn implicit(mut self) -> Self {
        self.implicit = true;
        self
    }

    /// Keeps this integer equal to the number of child atoms on write.
    pub fn counts_children(mut self) -> Self {
        self.counts_children = true;
        self.read_only = true;
        self
    }

    pub fn present_if(mut self, field: &'static str, mask: u64, equals: u64) -> Self {
        self.guard = Some(Guard {
            field,
            mask,
            equals,
        });
        self
    }

    pub fn default_integer(mut self, value: u64) -> Self {
        self.default = Some(DefaultValue::Integer(value));
        self.generate();
        self
    }

    pub fn default_float(mut self, value: f64) -> Self {
        self.default = Some(DefaultValue::Float(value));
        self.generate();
        self
    }

    pub fn default_bytes(mut self, value: &'static [u8]) -> Self {
        self.default = Some(DefaultValue::Bytes(value));
        self.generate();
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Number of values held: one for scalars, one per row for table columns.
    pub fn len(&self) -> usize {
        match &self.values {
            Values::Integer(v) => v.len(),
            Values::Bytes(v) => v.len(),
            Values::Table(t) => t.row_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_table(&self) -> Option<&Table> {
        match &self.values {
            Values::Table(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn as_table_mut(&mut self) -> Option<&mut Table> {
        match &mut self.values {
            Values::Table(t) => Some(t),
            _ => None,
        }
    }

    // ---- typed access ----

    fn check_index(&self, index: usize) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch {
            name: self.name.to_owned(),
            expected,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::PropertyReadOnly(self.name.to_owned()));
        }
        Ok(())
    }

    pub fn integer_at(&self, index: usize) -> Result<u64> {
        match (&self.kind, &self.values) {
            (
                PropertyKind::Integer(_)
                | PropertyKind::VersionedInteger
                | PropertyKind::Bitfield(_),
                Values::Integer(values),
            ) => values.get(index).copied().ok_or(Error::IndexOutOfRange {
                index,
                len: values.len(),
            }),
            _ => Err(self.mismatch("an integer")),
        }
    }

    pub fn set_integer_at(&mut self, index: usize, value: u64) -> Result<()> {
        self.check_writable()?;
        self.check_integer(value)?;
        self.force_integer(index, value)
    }

    fn check_integer(&self, value: u64) -> Result<()> {
        let bits = match self.kind {
            PropertyKind::Integer(width) => u32::from(width) * 8,
            PropertyKind::Bitfield(bits) => u32::from(bits),
            PropertyKind::VersionedInteger => 64,
            _ => return Err(self.mismatch("an integer")),
        };
        if bits < 64 && value >> bits != 0 {
            return Err(Error::InvalidValue(
                self.name.to_owned(),
                "value does not fit the declared width",
            ));
        }
        Ok(())
    }

    /// Sets a value regardless of the read-only flag. Used by the engine to
    /// keep count fields in step with the data they describe.
    pub(crate) fn force_integer(&mut self, index: usize, value: u64) -> Result<()> {
        self.check_index(index)?;
        match &mut self.values {
            Values::Integer(values) => {
                values[index] = value;
                Ok(())
            }
            _ => Err(self.mismatch("an integer")),
        }
    }

    pub fn float_at(&self, index: usize) -> Result<f64> {
        let PropertyKind::Float(format) = self.kind else {
            return Err(self.mismatch("a float"));
        };
        let Values::Integer(values) = &self.values else {
            return Err(self.mismatch("a float"));
        };
        let raw = *values.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: values.len(),
        })?;
        Ok(match format {
            FloatFormat::Fixed8_8 => FixedPointU8::new_raw(raw as u16).to_f64(),
            FloatFormat::Fixed16_16 => FixedPointU16::new_raw(raw as u32).to_f64(),
            FloatFormat::Ieee32 => f64::from(f32::from_bits(raw as u32)),
        })
    }

    pub fn set_float_at(&mut self, index: usize, value: f64) -> Result<()> {
        self.check_writable()?;
        let PropertyKind::Float(format) = self.kind else {
            return Err(self.mismatch("a float"));
        };
        if !value.is_finite() {
            return Err(Error::InvalidValue(self.name.to_owned(), "not a finite number"));
        }
        self.check_index(index)?;
        if let Values::Integer(values) = &mut self.values {
            values[index] = float_to_raw(format, value);
        }
        Ok(())
    }

    /// Text content, cut at the first NUL and decoded lossily as UTF-8.
    pub fn string_at(&self, index: usize) -> Result<Cow<'_, str>> {
        if !matches!(self.kind, PropertyKind::String(_)) {
            return Err(self.mismatch("a string"));
        }
        let raw = self.text_of(self.bytes_at(index)?);
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]))
    }

    /// The characters of a stored value. A fixed-width counted field holds its
    /// length byte and padding too; a length past the field end is cut there.
    fn text_of<'b>(&self, raw: &'b [u8]) -> &'b [u8] {
        match self.kind {
            PropertyKind::String(StringFormat::Counted(Some(_))) => match raw.split_first() {
                Some((&len, text)) => &text[..usize::from(len).min(text.len())],
                None => raw,
            },
            _ => raw,
        }
    }

    pub fn set_string_at(&mut self, index: usize, value: &str) -> Result<()> {
        self.check_writable()?;
        let PropertyKind::String(format) = self.kind else {
            return Err(self.mismatch("a string"));
        };
        let len = value.len();
        let fits = match format {
            StringFormat::NullTerminated => !value.as_bytes().contains(&0),
            StringFormat::Fixed(size) => len <= size,
            StringFormat::Counted(None) => len <= u8::MAX as usize,
            StringFormat::Counted(Some(width)) => len < width && len <= u8::MAX as usize,
            StringFormat::Remaining => true,
        };
        if !fits {
            return Err(Error::InvalidValue(
                self.name.to_owned(),
                "string does not fit the declared format",
            ));
        }
        let stored = match format {
            StringFormat::Counted(Some(width)) => {
                let mut field = Vec::with_capacity(width);
                field.push(len as u8);
                field.extend_from_slice(value.as_bytes());
                field.resize(width, 0);
                Bytes::from(field)
            }
            _ => Bytes::copy_from_slice(value.as_bytes()),
        };
        self.store_bytes(index, stored)
    }

    /// Raw content of a bytes or string property. For a fixed-width counted
    /// string this is the whole field, length byte included.
    pub fn bytes_at(&self, index: usize) -> Result<&Bytes> {
        match &self.values {
            Values::Bytes(values) => values.get(index).ok_or(Error::IndexOutOfRange {
                index,
                len: values.len(),
            }),
            _ => Err(self.mismatch("a byte array")),
        }
    }

    pub fn set_bytes_at(&mut self, index: usize, value: impl Into<Bytes>) -> Result<()> {
        self.check_writable()?;
        let value = value.into();
        match self.kind {
            PropertyKind::Bytes(BytesLength::Fixed(size)) if value.len() != size => {
                Err(Error::InvalidValue(
                    self.name.to_owned(),
                    "length differs from the declared fixed size",
                ))
            }
            PropertyKind::Bytes(_) => self.store_bytes(index, value),
            _ => Err(self.mismatch("a byte array")),
        }
    }

    fn store_bytes(&mut self, index: usize, value: Bytes) -> Result<()> {
        self.check_index(index)?;
        match &mut self.values {
            Values::Bytes(values) => {
                values[index] = value;
                Ok(())
            }
            _ => Err(self.mismatch("a byte array")),
        }
    }

    pub fn integer(&self) -> Result<u64> {
        self.integer_at(0)
    }

    pub fn set_integer(&mut self, value: u64) -> Result<()> {
        self.set_integer_at(0, value)
    }

    pub fn float(&self) -> Result<f64> {
        self.float_at(0)
    }

    pub fn set_float(&mut self, value: f64) -> Result<()> {
        self.set_float_at(0, value)
    }

    pub fn string(&self) -> Result<Cow<'_, str>> {
        self.string_at(0)
    }

    pub fn set_string(&mut self, value: &str) -> Result<()> {
        self.set_string_at(0, value)
    }

    pub fn bytes(&self) -> Result<&Bytes> {
        self.bytes_at(0)
    }

    pub fn set_bytes(&mut self, value: impl Into<Bytes>) -> Result<()> {
        self.set_bytes_at(0, value)
    }

    // ---- lifecycle ----

    pub(crate) fn default_cell(&self) -> Cell {
        match (self.default, self.kind) {
            (Some(DefaultValue::Integer(v)), _) => Cell::Integer(v),
            (Some(DefaultValue::Float(v)), PropertyKind::Float(format)) => {
                Cell::Integer(float_to_raw(format, v))
            }
            (Some(DefaultValue::Bytes(b)), _) => Cell::Bytes(Bytes::from_static(b)),
            (
                _,
                PropertyKind::Bytes(BytesLength::Fixed(size))
                | PropertyKind::String(StringFormat::Counted(Some(size))),
            ) => {
                Cell::Bytes(Bytes::from(vec![0u8; size]))
            }
            (_, PropertyKind::String(_) | PropertyKind::Bytes(_)) => Cell::Bytes(Bytes::new()),
            _ => Cell::Integer(0),
        }
    }

    pub(crate) fn push_cell(&mut self, cell: Cell) -> Result<()> {
        match (&mut self.values, cell) {
            (Values::Integer(values), Cell::Integer(v)) => values.push(v),
            (Values::Bytes(values), Cell::Bytes(b)) => values.push(b),
            _ => return Err(self.mismatch("matching the stored value")),
        }
        Ok(())
    }

    pub(crate) fn insert_cell(&mut self, index: usize, cell: Cell) -> Result<()> {
        match (&mut self.values, cell) {
            (Values::Integer(values), Cell::Integer(v)) => values.insert(index, v),
            (Values::Bytes(values), Cell::Bytes(b)) => values.insert(index, b),
            _ => return Err(self.mismatch("matching the stored value")),
        }
        Ok(())
    }

    pub(crate) fn remove_cell(&mut self, index: usize) {
        match &mut self.values {
            Values::Integer(values) => {
                values.remove(index);
            }
            Values::Bytes(values) => {
                values.remove(index);
            }
            Values::Table(_) => {}
        }
    }

    pub(crate) fn clear(&mut self) {
        match &mut self.values {
            Values::Integer(values) => values.clear(),
            Values::Bytes(values) => values.clear(),
            Values::Table(table) => table.clear(),
        }
    }

    fn cell_at(&self, index: usize) -> Result<Cell> {
        match &self.values {
            Values::Integer(values) => values.get(index).map(|v| Cell::Integer(*v)),
            Values::Bytes(values) => values.get(index).map(|b| Cell::Bytes(b.clone())),
            Values::Table(_) => None,
        }
        .ok_or(Error::IndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    /// Resets to the declared default without touching any stream: zero for
    /// integers, empty for strings and bytes, no rows for tables.
    pub(crate) fn generate(&mut self) {
        self.clear();
        if !matches!(self.kind, PropertyKind::Table) {
            let cell = self.default_cell();
            // A scalar always holds exactly one value of its own kind.
            let _ignored: Result<()> = self.push_cell(cell);
        }
    }

    pub(crate) fn is_present(&self, ctx: &FieldContext<'_>) -> bool {
        match self.guard {
            Some(guard) => ctx
                .integer(guard.field)
                .map_or(true, |v| v & guard.mask == guard.equals),
            None => true,
        }
    }

    pub(crate) fn read<R: Read + Seek>(
        &mut self,
        reader: &mut AtomReader<R>,
        ctx: &FieldContext<'_>,
    ) -> Result<()> {
        if self.implicit {
            return Ok(());
        }
        if !self.is_present(ctx) {
            if let Values::Table(table) = &mut self.values {
                table.clear();
            }
            return Ok(());
        }
        if let Values::Table(table) = &mut self.values {
            return table.read(reader, ctx);
        }
        let cell = read_cell(self.name, self.kind, reader, ctx)?;
        self.clear();
        self.push_cell(cell)
    }

    pub(crate) fn write<W: Write + Seek>(
        &self,
        writer: &mut AtomWriter<W>,
        ctx: &FieldContext<'_>,
    ) -> Result<()> {
        if self.implicit || !self.is_present(ctx) {
            return Ok(());
        }
        match &self.values {
            Values::Table(table) => table.write(writer, ctx),
            _ => self.write_value(0, writer, ctx),
        }
    }

    pub(crate) fn write_value<W: Write + Seek>(
        &self,
        index: usize,
        writer: &mut AtomWriter<W>,
        ctx: &FieldContext<'_>,
    ) -> Result<()> {
        let cell = self.cell_at(index)?;
        write_cell(self.name, self.kind, &cell, writer, ctx)
    }

    pub(crate) fn measure(&self, counter: &mut SizeCounter, ctx: &FieldContext<'_>) -> Result<()> {
        if self.implicit || !self.is_present(ctx) {
            return Ok(());
        }
        match &self.values {
            Values::Table(table) => table.measure(counter, ctx),
            _ => {
                counter.add(self.width_of(0, ctx)?);
                Ok(())
            }
        }
    }

    pub(crate) fn width_of(&self, index: usize, ctx: &FieldContext<'_>) -> Result<Width> {
        let len = || -> Result<u64> { Ok(self.bytes_at(index)?.len() as u64) };
        Ok(match self.kind {
            PropertyKind::Integer(width) => Width::Bytes(u64::from(width)),
            PropertyKind::VersionedInteger => Width::Bytes(versioned_width(ctx).into()),
            PropertyKind::Bitfield(bits) => Width::Bits(u64::from(bits)),
            PropertyKind::Float(FloatFormat::Fixed8_8) => Width::Bytes(2),
            PropertyKind::Float(_) => Width::Bytes(4),
            PropertyKind::String(StringFormat::NullTerminated) => Width::Bytes(len()? + 1),
            PropertyKind::String(StringFormat::Fixed(size) | StringFormat::Counted(Some(size)))
            | PropertyKind::Bytes(BytesLength::Fixed(size)) => Width::Bytes(size as u64),
            PropertyKind::String(StringFormat::Counted(None)) => Width::Bytes(len()? + 1),
            PropertyKind::String(StringFormat::Remaining)
            | PropertyKind::Bytes(BytesLength::Field(_) | BytesLength::Remaining) => {
                Width::Bytes(len()?)
            }
            PropertyKind::Table => return Err(self.mismatch("a scalar")),
        })
    }

    /// Width that does not depend on the stored value, if there is one.
    pub(crate) fn static_width(&self, ctx: &FieldContext<'_>) -> Option<Width> {
        match self.kind {
            PropertyKind::Integer(width) => Some(Width::Bytes(u64::from(width))),
            PropertyKind::VersionedInteger => Some(Width::Bytes(versioned_width(ctx).into())),
            PropertyKind::Bitfield(bits) => Some(Width::Bits(u64::from(bits))),
            PropertyKind::Float(FloatFormat::Fixed8_8) => Some(Width::Bytes(2)),
            PropertyKind::Float(_) => Some(Width::Bytes(4)),
            PropertyKind::String(StringFormat::Fixed(size) | StringFormat::Counted(Some(size)))
            | PropertyKind::Bytes(BytesLength::Fixed(size)) => Some(Width::Bytes(size as u64)),
            _ => None,
        }
    }

    /// Human readable rendering of one value, used by tree dumps.
    pub fn display_value(&self, index: usize) -> String {
        match self.kind {
            PropertyKind::Integer(_) | PropertyKind::VersionedInteger | PropertyKind::Bitfield(_) => {
                match self.integer_at(index) {
                    Ok(v) => format!("{v} ({v:#x})"),
                    Err(_) => "<none>".to_owned(),
                }
            }
            PropertyKind::Float(_) => self
                .float_at(index)
                .map_or_else(|_| "<none>".to_owned(), |v| format!("{v:.4}")),
            PropertyKind::String(_) => self
                .string_at(index)
                .map_or_else(|_| "<none>".to_owned(), |s| format!("{s:?}")),
            PropertyKind::Bytes(_) => match self.bytes_at(index) {
                Ok(bytes) => {
                    let mut s = format!("<{} bytes>", bytes.len());
                    for byte in bytes.iter().take(16) {
                        write!(s, " {byte:02x}").ok();
                    }
                    if bytes.len() > 16 {
                        s.push_str(" ...");
                    }
                    s
                }
                Err(_) => "<none>".to_owned(),
            },
            PropertyKind::Table => format!("<{} rows>", self.len()),
        }
    }
}

/// Brings every count and length field in `properties` in line with the data
/// it describes: table row counts, byte lengths held in sibling or column
/// integers, and, when `child_count` is given, child-atom counts.
pub(crate) fn sync_counts(properties: &mut [Property], child_count: Option<usize>) -> Result<()> {
    for i in 0..properties.len() {
        let (before, rest) = properties.split_at_mut(i);
        let property = &mut rest[0];

        if let (true, Some(children)) = (property.counts_children, child_count) {
            set_count(property, 0, children as u64)?;
        }

        if let PropertyKind::Bytes(BytesLength::Field(field)) = property.kind {
            if let Some(target) = before.iter_mut().find(|p| p.name == field) {
                sync_lengths(property, target)?;
            }
        }

        let present = property.is_present(&FieldContext::new(before));
        if let Values::Table(table) = &mut property.values {
            sync_columns(table.columns_mut())?;
            if present {
                let rows = table.row_count() as u64;
                if let Some(count) = before.iter_mut().find(|p| p.name == table.count_field()) {
                    set_count(count, 0, rows)?;
                }
            }
        }
    }
    Ok(())
}

fn sync_columns(columns: &mut [Property]) -> Result<()> {
    for i in 0..columns.len() {
        let (before, rest) = columns.split_at_mut(i);
        if let PropertyKind::Bytes(BytesLength::Field(field)) = rest[0].kind {
            if let Some(target) = before.iter_mut().find(|p| p.name == field) {
                sync_lengths(&rest[0], target)?;
            }
        }
    }
    Ok(())
}

fn sync_lengths(data: &Property, target: &mut Property) -> Result<()> {
    if let Values::Bytes(values) = &data.values {
        for (index, bytes) in values.iter().enumerate() {
            if index < target.len() {
                set_count(target, index, bytes.len() as u64)?;
            }
        }
    }
    Ok(())
}

fn set_count(target: &mut Property, index: usize, value: u64) -> Result<()> {
    if target.integer_at(index)? == value {
        return Ok(());
    }
    target.check_integer(value)?;
    target.force_integer(index, value)
}

fn float_to_raw(format: FloatFormat, value: f64) -> u64 {
    match format {
        FloatFormat::Fixed8_8 => u64::from(FixedPointU8::from_f64(value).raw_value()),
        FloatFormat::Fixed16_16 => u64::from(FixedPointU16::from_f64(value).raw_value()),
        FloatFormat::Ieee32 => u64::from((value as f32).to_bits()),
    }
}

fn versioned_width(ctx: &FieldContext<'_>) -> u8 {
    if ctx.version() == 1 {
        8
    } else {
        4
    }
}

pub(crate) fn read_cell<R: Read + Seek>(
    name: &str,
    kind: PropertyKind,
    reader: &mut AtomReader<R>,
    ctx: &FieldContext<'_>,
) -> Result<Cell> {
    Ok(match kind {
        PropertyKind::Integer(width) => Cell::Integer(reader.read_uint(width)?),
        PropertyKind::VersionedInteger => Cell::Integer(reader.read_uint(versioned_width(ctx))?),
        PropertyKind::Bitfield(bits) => Cell::Integer(reader.read_bits(bits)?),
        PropertyKind::Float(FloatFormat::Fixed8_8) => Cell::Integer(reader.read_uint(2)?),
        PropertyKind::Float(_) => Cell::Integer(reader.read_uint(4)?),
        PropertyKind::String(StringFormat::NullTerminated) => {
            Cell::Bytes(reader.read_null_terminated()?)
        }
        PropertyKind::String(StringFormat::Fixed(size))
        | PropertyKind::Bytes(BytesLength::Fixed(size)) => {
            Cell::Bytes(reader.read_bytes(size as u64)?)
        }
        PropertyKind::String(StringFormat::Counted(None)) => {
            let len = reader.read_uint(1)?;
            Cell::Bytes(reader.read_bytes(len)?)
        }
        PropertyKind::String(StringFormat::Counted(Some(width))) => {
            Cell::Bytes(reader.read_bytes(width as u64)?)
        }
        PropertyKind::String(StringFormat::Remaining)
        | PropertyKind::Bytes(BytesLength::Remaining) => {
            let len = reader.remaining();
            Cell::Bytes(reader.read_bytes(len)?)
        }
        PropertyKind::Bytes(BytesLength::Field(field)) => {
            let len = ctx.integer(field).ok_or_else(|| {
                log::debug!("length field {field} of {name} is not declared before it");
                Error::InvalidData("bytes length field is not declared before its data")
            })?;
            Cell::Bytes(reader.read_bytes(len)?)
        }
        PropertyKind::Table => return Err(Error::InvalidData("tables cannot be nested")),
    })
}

pub(crate) fn write_cell<W: Write + Seek>(
    name: &str,
    kind: PropertyKind,
    cell: &Cell,
    writer: &mut AtomWriter<W>,
    ctx: &FieldContext<'_>,
) -> Result<()> {
    let invalid = |reason| Error::InvalidValue(name.to_owned(), reason);
    match (kind, cell) {
        (PropertyKind::Integer(width), Cell::Integer(v)) => writer.write_uint(*v, width),
        (PropertyKind::VersionedInteger, Cell::Integer(v)) => {
            let width = versioned_width(ctx);
            if width == 4 && *v > u64::from(u32::MAX) {
                return Err(invalid("value needs a version 1 atom"));
            }
            writer.write_uint(*v, width)
        }
        (PropertyKind::Bitfield(bits), Cell::Integer(v)) => writer.write_bits(*v, bits),
        (PropertyKind::Float(FloatFormat::Fixed8_8), Cell::Integer(v)) => writer.write_uint(*v, 2),
        (PropertyKind::Float(_), Cell::Integer(v)) => writer.write_uint(*v, 4),
        (PropertyKind::String(StringFormat::NullTerminated), Cell::Bytes(b)) => {
            writer.write_bytes(b)?;
            writer.write_uint(0, 1)
        }
        (PropertyKind::String(StringFormat::Fixed(size)), Cell::Bytes(b)) => {
            if b.len() > size {
                return Err(invalid("string longer than its fixed size"));
            }
            writer.write_bytes(b)?;
            writer.write_zeros((size - b.len()) as u64)
        }
        (PropertyKind::String(StringFormat::Counted(Some(width))), Cell::Bytes(b)) => {
            if b.len() != width {
                return Err(invalid("counted field differs from its declared width"));
            }
            writer.write_bytes(b)
        }
        (PropertyKind::String(StringFormat::Counted(None)), Cell::Bytes(b)) => {
            if b.len() > u8::MAX as usize {
                return Err(invalid("string longer than its counted field"));
            }
            writer.write_uint(b.len() as u64, 1)?;
            writer.write_bytes(b)
        }
        (PropertyKind::Bytes(BytesLength::Fixed(size)), Cell::Bytes(b)) => {
            if b.len() != size {
                return Err(invalid("length differs from the declared fixed size"));
            }
            writer.write_bytes(b)
        }
        (
            PropertyKind::String(StringFormat::Remaining)
            | PropertyKind::Bytes(BytesLength::Field(_) | BytesLength::Remaining),
            Cell::Bytes(b),
        ) => writer.write_bytes(b),
        _ => Err(invalid("stored value does not match the declared kind")),
    }
}

/// A property located by path, together with the row it was addressed at.
#[derive(Debug, Clone, Copy)]
pub struct PropertyRef<'a> {
    property: &'a Property,
    index: usize,
}

impl<'a> PropertyRef<'a> {
    pub(crate) fn new(property: &'a Property, index: usize) -> Self {
        Self { property, index }
    }

    pub fn property(&self) -> &'a Property {
        self.property
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn integer(&self) -> Result<u64> {
        self.property.integer_at(self.index)
    }

    pub fn float(&self) -> Result<f64> {
        self.property.float_at(self.index)
    }

    pub fn string(&self) -> Result<Cow<'a, str>> {
        self.property.string_at(self.index)
    }

    pub fn bytes(&self) -> Result<&'a Bytes> {
        self.property.bytes_at(self.index)
    }
}

/// Mutable counterpart of [`PropertyRef`].
#[derive(Debug)]
pub struct PropertyMut<'a> {
    property: &'a mut Property,
    index: usize,
}

impl<'a> PropertyMut<'a> {
    pub(crate) fn new(property: &'a mut Property, index: usize) -> Self {
        Self { property, index }
    }

    pub fn property(&self) -> &Property {
        self.property
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn integer(&self) -> Result<u64> {
        self.property.integer_at(self.index)
    }

    pub fn float(&self) -> Result<f64> {
        self.property.float_at(self.index)
    }

    pub fn string(&self) -> Result<Cow<'_, str>> {
        self.property.string_at(self.index)
    }

    pub fn bytes(&self) -> Result<&Bytes> {
        self.property.bytes_at(self.index)
    }

    pub fn set_integer(&mut self, value: u64) -> Result<()> {
        self.property.set_integer_at(self.index, value)
    }

    pub fn set_float(&mut self, value: f64) -> Result<()> {
        self.property.set_float_at(self.index, value)
    }

    pub fn set_string(&mut self, value: &str) -> Result<()> {
        self.property.set_string_at(self.index, value)
    }

    pub fn set_bytes(&mut self, value: impl Into<Bytes>) -> Result<()> {
        self.property.set_bytes_at(self.index, value)
    }
}
