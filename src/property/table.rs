use serde::Serialize;
use std::io::{Read, Seek, Write};

use super::{read_cell, FieldContext, Property, SizeCounter, Width};
use crate::stream::{AtomReader, AtomWriter};
use crate::{Error, Result};

/// Rows of column values whose count lives in a sibling integer property.
///
/// Each column is a [`Property`] holding one value per row, so every column
/// always has exactly [`Table::row_count`] values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    #[serde(skip)]
    count_field: &'static str,
    rows: usize,
    columns: Vec<Property>,
}

impl Table {
    pub(crate) fn new(count_field: &'static str, mut columns: Vec<Property>) -> Self {
        for column in &mut columns {
            column.clear();
        }
        Self {
            count_field,
            rows: 0,
            columns,
        }
    }

    pub fn count_field(&self) -> &'static str {
        self.count_field
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Property] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Property> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Property] {
        &mut self.columns
    }

    /// Inserts a row of column defaults before `index`; `index == row_count`
    /// appends.
    pub(crate) fn insert_row(&mut self, index: usize) -> Result<()> {
        if index > self.rows {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.rows,
            });
        }
        for column in &mut self.columns {
            let cell = column.default_cell();
            column.insert_cell(index, cell)?;
        }
        self.rows += 1;
        Ok(())
    }

    pub(crate) fn remove_row(&mut self, index: usize) -> Result<()> {
        if index >= self.rows {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.rows,
            });
        }
        for column in &mut self.columns {
            column.remove_cell(index);
        }
        self.rows -= 1;
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
        self.rows = 0;
    }

    /// Bits per row when no column depends on its stored value.
    fn static_row_bits(&self, ctx: &FieldContext<'_>) -> Option<u64> {
        self.columns.iter().try_fold(0u64, |bits, column| {
            Some(
                bits + match column.static_width(ctx)? {
                    Width::Bits(n) => n,
                    Width::Bytes(n) => n * 8,
                },
            )
        })
    }

    fn rows_to_read<R: Read + Seek>(
        &self,
        reader: &AtomReader<R>,
        ctx: &FieldContext<'_>,
    ) -> Result<u64> {
        let count = ctx
            .find(self.count_field)
            .ok_or(Error::InvalidData("table count field is not declared before the table"))?;
        let row_bits = self.static_row_bits(ctx);
        let available_bits = reader.remaining() * 8;

        if count.is_implicit() {
            // Rows run to the end of the atom.
            let row_bits = row_bits.ok_or(Error::InvalidData(
                "implicit row count needs fixed-width columns",
            ))?;
            return Ok(if row_bits == 0 {
                0
            } else {
                available_bits / row_bits
            });
        }

        let rows = count.integer()?;
        if let Some(row_bits) = row_bits {
            let needed_bits = rows.saturating_mul(row_bits);
            if needed_bits > available_bits {
                return Err(Error::TruncatedInput {
                    kind: reader.extent().kind,
                    needed: needed_bits.div_ceil(8),
                    available: reader.remaining(),
                });
            }
        }
        Ok(rows)
    }

    pub(crate) fn read<R: Read + Seek>(
        &mut self,
        reader: &mut AtomReader<R>,
        ctx: &FieldContext<'_>,
    ) -> Result<()> {
        self.clear();
        let rows = self.rows_to_read(reader, ctx)?;
        log::trace!("reading {rows} rows counted by {}", self.count_field);

        let rows = usize::try_from(rows)
            .map_err(|_err| Error::InvalidData("table row count does not fit in memory"))?;
        for row in 0..rows {
            for c in 0..self.columns.len() {
                let (before, rest) = self.columns.split_at_mut(c);
                let column = &mut rest[0];
                let row_ctx = ctx.with_row(before, row);
                let cell = read_cell(column.name(), column.kind(), reader, &row_ctx)?;
                column.push_cell(cell)?;
            }
            self.rows += 1;
        }
        reader.align();
        Ok(())
    }

    pub(crate) fn write<W: Write + Seek>(
        &self,
        writer: &mut AtomWriter<W>,
        ctx: &FieldContext<'_>,
    ) -> Result<()> {
        for row in 0..self.rows {
            for (c, column) in self.columns.iter().enumerate() {
                let row_ctx = ctx.with_row(&self.columns[..c], row);
                column.write_value(row, writer, &row_ctx)?;
            }
        }
        writer.flush_bits()
    }

    pub(crate) fn measure(&self, counter: &mut SizeCounter, ctx: &FieldContext<'_>) -> Result<()> {
        for row in 0..self.rows {
            for (c, column) in self.columns.iter().enumerate() {
                let row_ctx = ctx.with_row(&self.columns[..c], row);
                counter.add(column.width_of(row, &row_ctx)?);
            }
        }
        counter.align();
        Ok(())
    }
}
