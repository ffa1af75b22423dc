//! Path resolution over the linked node chain.
//!
//! `.` and `..` are ordinary hardlink (or directory) entries in every
//! directory, so relative traversal needs no special cases: each step scans
//! the current directory's child list and follows hardlinks as it goes.

use crate::{
    common::{RomfsError, RomfsResult},
    layout::{decode_node_header, NodeHeader, Volume},
    path::{Component, RomfsPath},
    MAX_LINKS,
};

/// Follow `node` through hardlinks until it names something else.
///
/// At most [`MAX_LINKS`] hops are taken; a longer chain is reported as a
/// loop.
pub fn follow_hardlinks<'img>(
    vol: &Volume<'_>,
    img: &'img [u8],
    node: NodeHeader<'img>,
) -> RomfsResult<NodeHeader<'img>> {
    let mut node = node;
    for _ in 0..MAX_LINKS {
        if !node.is_hardlink() {
            return Ok(node);
        }
        node = decode_node_header(vol, img, node.info)?;
    }
    if node.is_hardlink() {
        Err(RomfsError::LinkLoop)
    } else {
        Ok(node)
    }
}

/// Scan the entries starting at `first` for one called `name`.
///
/// A chain longer than [`Volume::max_nodes`] has a cycle in it and is
/// reported as malformed at the entry where the walk gave up.
pub fn search_dir<'img>(
    vol: &Volume<'_>,
    img: &'img [u8],
    first: u32,
    name: &[u8],
) -> RomfsResult<NodeHeader<'img>> {
    let mut offset = first;
    let mut budget = vol.max_nodes(img);
    while offset != 0 {
        if budget == 0 {
            return Err(RomfsError::MalformedNode(offset));
        }
        budget -= 1;
        let entry = decode_node_header(vol, img, offset)?;
        if entry.name == name {
            return Ok(entry);
        }
        offset = entry.next;
    }
    Err(RomfsError::NotFound)
}

/// Resolve `path` starting from the node at `start`.
///
/// An absolute path restarts from the volume root. The result is never a
/// hardlink.
pub fn find_entry<'img>(
    vol: &Volume<'_>,
    img: &'img [u8],
    start: u32,
    path: &str,
) -> RomfsResult<NodeHeader<'img>> {
    let path = RomfsPath::parse(path)?;
    let mut node = decode_node_header(vol, img, start)?;

    for component in path.components() {
        node = match component {
            Component::Root => decode_node_header(vol, img, vol.root_offset)?,
            Component::Name(name) => {
                let dir = follow_hardlinks(vol, img, node)?;
                if !dir.is_dir() {
                    return Err(RomfsError::NotFound);
                }
                search_dir(vol, img, dir.info, name.as_bytes())?
            }
        };
    }

    follow_hardlinks(vol, img, node)
}
