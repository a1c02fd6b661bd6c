//! Whole-tree parse and serialize.
//!
//! Parsing is root-down and recursive: each atom reads its properties in
//! declaration order, then, for containers, reads child headers and asks the
//! [`Registry`] for the matching layout until its extent is used up.
//!
//! Serializing writes a placeholder header, the body, and then seeks back to
//! patch in the real size. The 64-bit header form is chosen up front from the
//! measured body size, so the placeholder always has the right width.

use std::io::{Read, Seek, Write};

use crate::atom::{AtomHeader, AtomState, Layout, HEADER_SIZE, LARGE_HEADER_SIZE};
use crate::property::{FieldContext, SizeCounter};
use crate::stream::{AtomReader, AtomWriter, Extent};
use crate::{Atom, Error, Registry, Result};

/// Nesting limit for parse and serialize.
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Depth (the root is 0) at which atoms are no longer descended into.
    /// Reaching it with children left to read is [`Error::TreeTooDeep`].
    /// A tree parsed with a limit above [`DEFAULT_MAX_DEPTH`] is written back
    /// with [`write_tree_with`] and the same limit.
    pub max_depth: usize,

    /// Keep a child that fails to parse, or that nests too deep, as opaque
    /// bytes instead of failing the whole parse. Only applies to children of
    /// container atoms.
    pub recover_malformed: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            recover_malformed: true,
        }
    }
}

struct ReadContext<'a> {
    registry: &'a Registry,
    options: ReadOptions,
}

/// Parses `size` bytes from the current position of `reader` into a root atom
/// whose children are the top-level atoms.
#[profiling::function]
pub fn read_tree<R: Read + Seek>(
    reader: R,
    size: u64,
    registry: &Registry,
    options: ReadOptions,
) -> Result<Atom> {
    let mut reader = AtomReader::new(reader, size)?;
    let ctx = ReadContext { registry, options };
    let mut root = Atom::root();
    let end = reader.stream_end();
    root.read_body(&mut reader, &ctx, end, 0)?;
    root.size = size;
    log::trace!("parsed {} top-level atoms", root.children.len());
    Ok(root)
}

/// Serializes `atom` (the root, or any single atom with its subtree) and
/// returns the sink.
pub fn write_tree<W: Write + Seek>(atom: &mut Atom, writer: W) -> Result<W> {
    write_tree_with(atom, writer, DEFAULT_MAX_DEPTH)
}

/// [`write_tree`] with an explicit nesting limit.
#[profiling::function]
pub fn write_tree_with<W: Write + Seek>(atom: &mut Atom, writer: W, max_depth: usize) -> Result<W> {
    let mut writer = AtomWriter::new(writer)?;
    atom.write_atom(&mut writer, 0, max_depth)?;
    writer.flush()?;
    Ok(writer.into_inner())
}

fn check_depth(depth: usize, max_depth: usize) -> Result<()> {
    if depth > max_depth {
        return Err(Error::TreeTooDeep(max_depth));
    }
    Ok(())
}

impl Atom {
    fn read_body<R: Read + Seek>(
        &mut self,
        reader: &mut AtomReader<R>,
        ctx: &ReadContext<'_>,
        end: u64,
        depth: usize,
    ) -> Result<()> {
        let previous = reader.enter(Extent {
            kind: self.kind,
            end,
        });
        let result = self.read_contents(reader, ctx, depth);
        reader.leave(previous);
        result?;
        self.state = AtomState::Parsed;
        Ok(())
    }

    fn read_contents<R: Read + Seek>(
        &mut self,
        reader: &mut AtomReader<R>,
        ctx: &ReadContext<'_>,
        depth: usize,
    ) -> Result<()> {
        if self.layout == Layout::Padding {
            return self.skip(reader);
        }

        for i in 0..self.properties.len() {
            let (before, rest) = self.properties.split_at_mut(i);
            rest[0].read(reader, &FieldContext::new(before))?;
        }
        reader.align();
        // Fills in counts that are not stored on disk.
        crate::property::sync_counts(&mut self.properties, None)?;

        match self.layout {
            Layout::Leaf => {
                let remaining = reader.remaining();
                if remaining > 0 {
                    log::debug!("{} has {remaining} bytes after its properties", self.kind);
                    self.trailing = reader.read_bytes(remaining)?;
                }
                Ok(())
            }
            _ => self.read_children(reader, ctx, depth),
        }
    }

    /// Moves past the body of an atom that is not interpreted, remembering
    /// only its length.
    fn skip<R: Read + Seek>(&mut self, reader: &mut AtomReader<R>) -> Result<()> {
        self.padding = reader.remaining();
        reader.skip(self.padding)
    }

    fn read_children<R: Read + Seek>(
        &mut self,
        reader: &mut AtomReader<R>,
        ctx: &ReadContext<'_>,
        depth: usize,
    ) -> Result<()> {
        let extent_end = reader.extent().end;
        if reader.position() < extent_end && depth >= ctx.options.max_depth {
            return Err(Error::TreeTooDeep(ctx.options.max_depth));
        }
        while reader.position() < extent_end {
            let remaining = extent_end - reader.position();
            if remaining < HEADER_SIZE {
                return self.read_tail(reader, remaining);
            }

            let header = AtomHeader::read(reader)?;
            let end = if header.size == 0 {
                log::debug!("{} extends to the end of its parent", header.kind);
                extent_end
            } else {
                header
                    .start
                    .checked_add(header.size)
                    .ok_or(Error::InvalidData("atom size overflows"))?
            };
            if end > extent_end {
                return Err(if self.is_root() {
                    Error::TruncatedInput {
                        kind: header.kind,
                        needed: end - header.start,
                        available: extent_end - header.start,
                    }
                } else {
                    Error::MalformedContainer(self.kind, "child atom overruns its parent")
                });
            }

            let mut child = ctx.registry.create(header.kind, self.context());
            child.largesize = header.largesize;
            let body_start = reader.position();
            log::trace!("reading {} at {} ({} bytes)", header.kind, header.start, end - header.start);

            if let Err(err) = child.read_body(reader, ctx, end, depth + 1) {
                let recover = (err.is_structural() || matches!(err, Error::TreeTooDeep(_)))
                    && ctx.options.recover_malformed
                    && self.layout == Layout::Container;
                if !recover {
                    return Err(err);
                }
                log::warn!("keeping malformed {} atom as opaque bytes: {err}", header.kind);
                child = Atom::opaque(header.kind);
                child.largesize = header.largesize;
                reader.seek_to(body_start)?;
                child.read_body(reader, ctx, end, depth + 1)?;
            }

            child.size = end - header.start;
            reader.seek_to(end)?;
            self.children.push(child);
        }
        Ok(())
    }

    /// Fewer bytes than a header are left after the last child. Zeros are a
    /// known terminator and are kept; anything else is a cut-off atom.
    fn read_tail<R: Read + Seek>(&mut self, reader: &mut AtomReader<R>, remaining: u64) -> Result<()> {
        let tail = reader.read_bytes(remaining)?;
        if tail.iter().all(|&b| b == 0) {
            log::debug!("{remaining} zero bytes after the last child of {}", self.kind);
            self.trailing = tail;
            return Ok(());
        }
        Err(if self.is_root() {
            Error::TruncatedInput {
                kind: self.kind,
                needed: HEADER_SIZE,
                available: remaining,
            }
        } else {
            Error::MalformedContainer(self.kind, "bytes left over after the last child")
        })
    }

    /// Bytes after the header, computed from the declared property widths,
    /// the children and any trailing bytes.
    pub fn body_size(&self) -> Result<u64> {
        self.measure_body(0, DEFAULT_MAX_DEPTH)
    }

    fn measure_body(&self, depth: usize, max_depth: usize) -> Result<u64> {
        check_depth(depth, max_depth)?;
        if self.layout == Layout::Padding {
            return Ok(self.padding);
        }
        let mut counter = SizeCounter::default();
        for (i, property) in self.properties.iter().enumerate() {
            property.measure(&mut counter, &FieldContext::new(&self.properties[..i]))?;
        }
        let mut size = counter.finish();
        for child in &self.children {
            let body = child.measure_body(depth + 1, max_depth)?;
            size += body + child.header_size_for(body);
        }
        Ok(size + self.trailing.len() as u64)
    }

    fn needs_largesize(&self, body: u64) -> bool {
        self.largesize || body + HEADER_SIZE > u64::from(u32::MAX)
    }

    fn header_size_for(&self, body: u64) -> u64 {
        if self.needs_largesize(body) {
            LARGE_HEADER_SIZE
        } else {
            HEADER_SIZE
        }
    }

    fn write_atom<W: Write + Seek>(
        &mut self,
        writer: &mut AtomWriter<W>,
        depth: usize,
        max_depth: usize,
    ) -> Result<()> {
        check_depth(depth, max_depth)?;
        if self.state == AtomState::Unpopulated {
            return Err(Error::NotPopulated(self.kind));
        }
        self.sync_counts()?;

        let start = writer.position();
        if self.is_root() {
            self.write_children(writer, depth, max_depth)?;
            self.size = writer.position() - start;
            return Ok(());
        }

        let body = self.measure_body(depth, max_depth)?;
        let largesize = self.needs_largesize(body);
        if largesize && !self.largesize {
            log::debug!("{} needs a 64-bit size ({body} body bytes)", self.kind);
        }
        self.largesize = largesize;

        let (size_at, width) = AtomHeader::write_placeholder(self.kind, largesize, writer)?;
        if self.layout == Layout::Padding {
            writer.write_zeros(self.padding)?;
        } else {
            for (i, property) in self.properties.iter().enumerate() {
                property.write(writer, &FieldContext::new(&self.properties[..i]))?;
            }
            writer.flush_bits()?;
            self.write_children(writer, depth, max_depth)?;
        }

        let size = writer.position() - start;
        if size != body + self.header_size_for(body) {
            return Err(Error::InvalidData("atom size differs from its measured size"));
        }
        writer.patch_uint(size_at, size, width)?;
        self.size = size;
        log::trace!("wrote {} at {start} ({size} bytes)", self.kind);
        Ok(())
    }

    fn write_children<W: Write + Seek>(
        &mut self,
        writer: &mut AtomWriter<W>,
        depth: usize,
        max_depth: usize,
    ) -> Result<()> {
        for child in &mut self.children {
            child.write_atom(writer, depth + 1, max_depth)?;
        }
        writer.write_bytes(&self.trailing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;
    use crate::FourCC;
    use std::io::Cursor;

    fn header(size: u32, kind: &[u8; 4]) -> Vec<u8> {
        let mut data = size.to_be_bytes().to_vec();
        data.extend_from_slice(kind);
        data
    }

    fn parse(data: &[u8], options: ReadOptions) -> Result<Atom> {
        read_tree(
            Cursor::new(data.to_vec()),
            data.len() as u64,
            &Registry::standard(),
            options,
        )
    }

    fn serialize(atom: &mut Atom) -> Vec<u8> {
        write_tree(atom, Cursor::new(Vec::new())).unwrap().into_inner()
    }

    #[test]
    fn test_size_zero_runs_to_end() {
        let mut data = header(0, b"mdat");
        data.extend_from_slice(&[1, 2, 3, 4, 5]);
        let mut root = parse(&data, ReadOptions::default()).unwrap();
        assert_eq!(root.children()[0].size(), 13);

        let written = serialize(&mut root);
        assert_eq!(&written[..4], &13u32.to_be_bytes());
        assert_eq!(&written[4..], &data[4..]);
    }

    #[test]
    fn test_padding_is_skipped_and_zero_filled() {
        let mut data = header(12, b"free");
        data.extend_from_slice(&[9, 9, 9, 9]);
        let mut root = parse(&data, ReadOptions::default()).unwrap();
        assert_eq!(root.children()[0].padding_len(), 4);
        assert_eq!(serialize(&mut root)[8..], [0, 0, 0, 0]);
    }

    #[test]
    fn test_zero_tail_in_container_is_kept() {
        let mut data = header(20, b"udta");
        data.extend_from_slice(&header(8, b"zzzz"));
        data.extend_from_slice(&[0, 0, 0, 0]);
        let mut root = parse(&data, ReadOptions::default()).unwrap();
        assert_eq!(root.children()[0].trailing().len(), 4);
        assert_eq!(serialize(&mut root), data);
    }

    #[test]
    fn test_depth_limit() {
        let mut data = Vec::new();
        for depth in 0..4u32 {
            data.extend_from_slice(&header(8 * (4 - depth), b"moov"));
        }
        let strict = ReadOptions {
            max_depth: 2,
            recover_malformed: false,
        };
        assert!(matches!(parse(&data, strict), Err(Error::TreeTooDeep(2))));

        // The atom at the limit keeps its children as opaque bytes.
        let lenient = ReadOptions {
            max_depth: 2,
            recover_malformed: true,
        };
        let mut root = parse(&data, lenient).unwrap();
        let deepest = root.find_atom("moov.moov").unwrap();
        assert!(deepest.property("data").is_some());
        assert_eq!(serialize(&mut root), data);

        assert!(parse(&data, ReadOptions::default()).is_ok());
    }

    #[test]
    fn test_deep_tree_writes_with_its_read_limit() {
        let mut data = Vec::new();
        for _ in 0..70 {
            let mut outer = header(8 + data.len() as u32, b"udta");
            outer.extend_from_slice(&data);
            data = outer;
        }
        let deep = ReadOptions {
            max_depth: 100,
            recover_malformed: false,
        };
        let mut root = parse(&data, deep).unwrap();

        let err = write_tree(&mut root, Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::TreeTooDeep(DEFAULT_MAX_DEPTH)));
        let written = write_tree_with(&mut root, Cursor::new(Vec::new()), deep.max_depth).unwrap();
        assert_eq!(written.into_inner(), data);
    }

    #[test]
    fn test_unpopulated_atom_is_not_written() {
        let mut atom = Atom::leaf(FourCC::new(*b"test")).with_property(Property::uint("a", 2));
        let err = write_tree(&mut atom, Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::NotPopulated(_)));
    }

    #[test]
    fn test_body_size_counts_bitfields_once() {
        let mut atom = Atom::leaf(FourCC::new(*b"test"))
            .with_property(Property::bitfield("a", 3))
            .with_property(Property::bitfield("b", 13))
            .with_property(Property::uint("c", 1));
        atom.generate().unwrap();
        assert_eq!(atom.body_size().unwrap(), 3);
        assert_eq!(serialize(&mut atom).len(), 11);
    }
}
