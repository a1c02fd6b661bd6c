//! Dotted path expressions such as `moov.trak[2].mdia.hdlr.handlerType`.
//!
//! Atom segments are type codes, optionally followed by a zero-based index
//! that counts only children of that type. Resolution runs strictly left to
//! right: a segment names a child when one of that type exists, otherwise the
//! rest of the path names a property of the current atom. A segment before
//! the last that matches neither a child nor a property is
//! [`Error::PathNotFound`].

use crate::property::{PropertyMut, PropertyRef};
use crate::{Atom, Error, FourCC, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub kind: FourCC,
    /// `None` for a bare code, which selects the first child of that type.
    pub index: Option<usize>,
}

/// Parses an atom-only path. The empty path has no segments.
pub fn parse_path(path: &str) -> Result<Vec<Segment>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    path.split('.').map(parse_segment).collect()
}

fn parse_segment(segment: &str) -> Result<Segment> {
    let (code, index) = split_index(segment)?;
    Ok(Segment {
        kind: code.parse()?,
        index,
    })
}

/// Splits `name[3]` into `("name", Some(3))`.
fn split_index(segment: &str) -> Result<(&str, Option<usize>)> {
    let Some(open) = segment.find('[') else {
        return Ok((segment, None));
    };
    let index = segment[open + 1..]
        .strip_suffix(']')
        .ok_or(Error::InvalidData("unterminated index in path"))?
        .parse::<usize>()
        .map_err(|_err| Error::InvalidData("path index is not a number"))?;
    Ok((&segment[..open], Some(index)))
}

pub fn resolve_atom<'a>(root: &'a Atom, path: &str) -> Result<&'a Atom> {
    let mut atom = root;
    for segment in parse_path(path)? {
        atom = atom
            .find_child(segment.kind, segment.index.unwrap_or(0))
            .ok_or_else(|| Error::PathNotFound(path.to_owned()))?;
    }
    Ok(atom)
}

pub fn resolve_atom_mut<'a>(root: &'a mut Atom, path: &str) -> Result<&'a mut Atom> {
    let mut atom = root;
    for segment in parse_path(path)? {
        let Some(child) = atom.find_child_mut(segment.kind, segment.index.unwrap_or(0)) else {
            return Err(Error::PathNotFound(path.to_owned()));
        };
        atom = child;
    }
    Ok(atom)
}

/// Where a property path ends up.
#[derive(Debug)]
struct Target {
    /// Positions in `children` walked from the starting atom.
    children: Vec<usize>,
    property: usize,
    column: Option<usize>,
    row: usize,
}

fn locate(root: &Atom, path: &str) -> Result<Target> {
    let not_found = || Error::PropertyNotFound(path.to_owned());
    let mut pieces: Vec<&str> = path.split('.').collect();

    // An atom may be addressed with its own type as a leading prefix, as in
    // `hdlr.handlerType` on an hdlr atom.
    if pieces.len() > 1 {
        if let Ok(first) = pieces[0].parse::<FourCC>() {
            if first == root.kind() && root.find_child(first, 0).is_none() {
                pieces.remove(0);
            }
        }
    }

    let mut atom = root;
    let mut children = Vec::new();
    let mut consumed = 0;
    while consumed + 1 < pieces.len() {
        if literal_property(atom, &pieces[consumed..]).is_some() {
            break;
        }
        let Ok(segment) = parse_segment(pieces[consumed]) else {
            break;
        };
        if atom.find_child(segment.kind, 0).is_none() {
            let (name, _) = split_index(pieces[consumed])?;
            if atom.property(name).is_some() {
                break;
            }
            return Err(Error::PathNotFound(path.to_owned()));
        }
        let wanted = segment.index.unwrap_or(0);
        let position = atom
            .children()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind() == segment.kind)
            .nth(wanted)
            .map(|(i, _)| i)
            .ok_or_else(|| Error::PathNotFound(path.to_owned()))?;
        children.push(position);
        atom = &atom.children()[position];
        consumed += 1;
    }

    let rest = &pieces[consumed..];
    if let Some(property) = literal_property(atom, rest) {
        return Ok(Target {
            children,
            property,
            column: None,
            row: 0,
        });
    }

    let (name, index) = split_index(rest[0]).map_err(|_err| not_found())?;
    let property = atom
        .properties()
        .iter()
        .position(|p| p.name() == name)
        .ok_or_else(not_found)?;
    let declared = &atom.properties()[property];

    match (declared.as_table(), rest.len()) {
        (Some(table), 2) => {
            let column = table
                .columns()
                .iter()
                .position(|c| c.name() == rest[1])
                .ok_or_else(not_found)?;
            let row = index.unwrap_or(0);
            if row >= table.row_count() {
                return Err(Error::IndexOutOfRange {
                    index: row,
                    len: table.row_count(),
                });
            }
            Ok(Target {
                children,
                property,
                column: Some(column),
                row,
            })
        }
        (_, 1) => {
            let row = index.unwrap_or(0);
            if index.is_some() && row >= declared.len() {
                return Err(Error::IndexOutOfRange {
                    index: row,
                    len: declared.len(),
                });
            }
            Ok(Target {
                children,
                property,
                column: None,
                row,
            })
        }
        _ => Err(not_found()),
    }
}

/// Matches the remaining pieces, rejoined with dots, against a property name.
fn literal_property(atom: &Atom, pieces: &[&str]) -> Option<usize> {
    let name = pieces.join(".");
    atom.properties().iter().position(|p| p.name() == name)
}

pub fn resolve_property<'a>(root: &'a Atom, path: &str) -> Result<PropertyRef<'a>> {
    let target = locate(root, path)?;
    let mut atom = root;
    for position in target.children {
        atom = &atom.children()[position];
    }
    let property = &atom.properties()[target.property];
    match (target.column, property.as_table()) {
        (Some(column), Some(table)) => Ok(PropertyRef::new(&table.columns()[column], target.row)),
        _ => Ok(PropertyRef::new(property, target.row)),
    }
}

pub fn resolve_property_mut<'a>(root: &'a mut Atom, path: &str) -> Result<PropertyMut<'a>> {
    let target = locate(root, path)?;
    let mut atom = root;
    for position in target.children {
        atom = &mut atom.children[position];
    }
    let property = &mut atom.properties[target.property];
    match target.column {
        Some(column) => {
            let table = property
                .as_table_mut()
                .ok_or_else(|| Error::PropertyNotFound(path.to_owned()))?;
            Ok(PropertyMut::new(&mut table.columns_mut()[column], target.row))
        }
        None => Ok(PropertyMut::new(property, target.row)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;

    fn code(s: &str) -> FourCC {
        s.parse().unwrap()
    }

    fn hdlr(handler: &'static [u8]) -> Atom {
        let mut atom = Atom::leaf(code("hdlr"))
            .with_version_and_flags()
            .with_property(Property::text(
                "handlerType",
                crate::property::StringFormat::Fixed(4),
            ));
        atom.generate().unwrap();
        atom.property_mut("handlerType")
            .unwrap()
            .set_string(std::str::from_utf8(handler).unwrap())
            .unwrap();
        atom
    }

    fn movie() -> Atom {
        let mut moov = Atom::container(code("moov"));
        for handler in [b"vide", b"soun", b"text"] {
            let mut mdia = Atom::container(code("mdia"));
            mdia.add_child(hdlr(handler));
            let mut trak = Atom::container(code("trak"));
            trak.add_child(mdia);
            moov.add_child(trak);
        }
        moov
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path("").unwrap(), vec![]);
        assert_eq!(
            parse_path("moov.trak[2]").unwrap(),
            vec![
                Segment {
                    kind: code("moov"),
                    index: None
                },
                Segment {
                    kind: code("trak"),
                    index: Some(2)
                },
            ]
        );
        assert!(parse_path("trak[2").is_err());
        assert!(parse_path("trak[x]").is_err());
    }

    #[test]
    fn test_indexed_segment_counts_same_type_only() {
        let moov = movie();
        let hdlr = resolve_atom(&moov, "trak[2].mdia.hdlr").unwrap();
        let manual = moov
            .children()
            .iter()
            .filter(|c| c.kind() == code("trak"))
            .nth(2)
            .and_then(|t| t.find_child(code("mdia"), 0))
            .and_then(|m| m.find_child(code("hdlr"), 0))
            .unwrap();
        assert!(std::ptr::eq(hdlr, manual));
        assert!(matches!(
            resolve_atom(&moov, "trak[3].mdia.hdlr"),
            Err(Error::PathNotFound(_))
        ));
    }

    #[test]
    fn test_property_paths() {
        let mut moov = movie();
        let handler = resolve_property(&moov, "trak[1].mdia.hdlr.handlerType").unwrap();
        assert_eq!(handler.string().unwrap(), "soun");

        let hdlr = moov.find_atom("trak.mdia.hdlr").unwrap();
        assert_eq!(
            hdlr.find_property("hdlr.handlerType").unwrap().string().unwrap(),
            "vide"
        );
        assert_eq!(
            hdlr.find_property("handlerType").unwrap().string().unwrap(),
            "vide"
        );

        assert!(matches!(
            resolve_property(&moov, "trak.mdia.hdlr.nothing"),
            Err(Error::PropertyNotFound(_))
        ));
        assert!(matches!(
            resolve_property(&moov, "trak[5].mdia.hdlr.handlerType"),
            Err(Error::PathNotFound(_))
        ));
        assert!(matches!(
            resolve_property(&moov, "trak.zzzz.hdlr.handlerType"),
            Err(Error::PathNotFound(_))
        ));

        let mut flags = resolve_property_mut(&mut moov, "trak[2].mdia.hdlr.flags").unwrap();
        flags.set_integer(1).unwrap();
        assert_eq!(
            moov.find_property("trak[2].mdia.hdlr.flags")
                .unwrap()
                .integer()
                .unwrap(),
            1
        );
    }
}
