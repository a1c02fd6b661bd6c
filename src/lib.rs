//! `atomtree` reads, edits and writes ISO base media (MP4/QuickTime) files as
//! a generic tree of atoms.
//!
//! Every atom is a list of typed [`Property`] values followed, for
//! containers, by child atoms. Layouts come from a [`Registry`] keyed by type
//! code and parent; atoms it does not know are kept as opaque bytes, so a
//! parse followed by a write reproduces the input.
//!
//! Supported parts of:
//!    * ISO/IEC 14496-12 - ISO Base Media File Format (QuickTime, MPEG-4, etc)
//!    * ISO/IEC 14496-14 - MP4 file format
//!    * iTunes-style `ilst` metadata
//!
//! ```no_run
//! let bytes = std::fs::read("video.mp4")?;
//! let mut root = atomtree::read(&bytes)?;
//! root.find_property_mut("moov.mvhd.timeScale")?.set_integer(90_000)?;
//! std::fs::write("out.mp4", atomtree::to_bytes(&mut root)?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

mod error;
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

mod types;
pub use types::*;

mod stream;
pub use stream::{AtomReader, AtomWriter, Extent};

mod property;
pub use property::{
    BytesLength, DefaultValue, FloatFormat, Guard, Property, PropertyKind, PropertyMut,
    PropertyRef, StringFormat, Table, Values,
};

mod atom;
pub use atom::{Atom, AtomHeader, AtomState, Generator, Layout, HEADER_SIZE, LARGE_HEADER_SIZE};

mod registry;
pub use registry::{AtomConstructor, Registry};

pub mod path;

mod tree;
pub use tree::{read_tree, write_tree, write_tree_with, ReadOptions, DEFAULT_MAX_DEPTH};

mod summary;
pub use summary::FileSummary;

mod mp4box;

/// Parses a byte slice with the standard registry.
pub fn read(bytes: &[u8]) -> Result<Atom> {
    read_with(
        Cursor::new(bytes),
        bytes.len() as u64,
        &Registry::standard(),
        ReadOptions::default(),
    )
}

/// Reads and parses a whole file with the standard registry.
pub fn read_file(file_path: impl AsRef<Path>) -> Result<Atom> {
    let bytes = std::fs::read(file_path)?;
    read(&bytes)
}

/// Parses `size` bytes from the current position of `reader`.
pub fn read_with<R: Read + Seek>(
    reader: R,
    size: u64,
    registry: &Registry,
    options: ReadOptions,
) -> Result<Atom> {
    read_tree(reader, size, registry, options)
}

/// Serializes `root` into `writer`, updating every atom's size.
pub fn write<W: Write + Seek>(root: &mut Atom, writer: W) -> Result<W> {
    write_tree(root, writer)
}

pub fn to_bytes(root: &mut Atom) -> Result<Vec<u8>> {
    Ok(write(root, Cursor::new(Vec::new()))?.into_inner())
}

/// Serializes `root` to `file_path`. The output goes to a temporary file next
/// to the target and is renamed into place only once it is complete.
pub fn write_file(root: &mut Atom, file_path: impl AsRef<Path>) -> Result<()> {
    let file_path = file_path.as_ref();
    let file_name = file_path
        .file_name()
        .ok_or(Error::InvalidData("output path has no file name"))?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".tmp");
    let temp_path = file_path.with_file_name(temp_name);

    let result = std::fs::File::create(&temp_path)
        .map_err(Error::from)
        .and_then(|file| write(root, std::io::BufWriter::new(file)))
        .and_then(|mut writer| Ok(writer.flush()?));
    if let Err(err) = result {
        log::warn!("discarding partial output {}: {err}", temp_path.display());
        let _ignored = std::fs::remove_file(&temp_path);
        return Err(err);
    }
    std::fs::rename(&temp_path, file_path)?;
    Ok(())
}
