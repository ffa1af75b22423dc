//! Builds romfs images for tests.
//!
//! Nodes are laid out in the order given, each header immediately followed by
//! its padded name and padded data, the same way `genromfs` writes them.
//! `next` and `info` pointers refer to other nodes by index and are patched
//! once every offset is known. Header and volume checksums are filled in so
//! that the word sums come out to zero.

use alloc::{vec, vec::Vec};

use crate::{align_up, RomfsFileType, ROMFS_MAGIC};

/// Offsets of the nodes in [`basic`].
pub mod offsets {
    pub const ROOT: u32 = 0x20;
    pub const SECOND_ENTRY_ROOT: u32 = 0x40;
    pub const DIR: u32 = 0x60;
    pub const FIRST_ENTRY_IN_DIR: u32 = 0x80;
    pub const B_FILE: u32 = 0xA0;
    pub const DIR_IN_DIR: u32 = 0xD0;
    pub const A_FILE: u32 = 0xF0;
}

pub const B_CONTENT: &[u8] = b"bbbbbbbbbbbbbbb\n";

#[derive(Clone, Copy)]
pub enum Link {
    None,
    Node(usize),
    Raw(u32),
}

pub struct RawNode {
    name: Vec<u8>,
    mode: u8,
    info: Link,
    next: Link,
    data: Vec<u8>,
}

impl RawNode {
    pub fn new(name: &str, ty: RomfsFileType, info: Link, next: Link) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            mode: ty as u8,
            info,
            next,
            data: Vec::new(),
        }
    }

    pub fn exec(mut self) -> Self {
        self.mode |= 0x8;
        self
    }

    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    fn header_len(&self) -> usize {
        align_up(16 + self.name.len() + 1)
    }

    fn total_len(&self) -> usize {
        self.header_len() + align_up(self.data.len())
    }
}

pub struct ImageBuilder {
    volume_name: Vec<u8>,
    nodes: Vec<RawNode>,
}

impl ImageBuilder {
    pub fn new(volume_name: &str) -> Self {
        Self {
            volume_name: volume_name.as_bytes().to_vec(),
            nodes: Vec::new(),
        }
    }

    /// Append a node and return its index.
    pub fn push(&mut self, node: RawNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn offset_of(&self, index: usize) -> u32 {
        let mut off = align_up(16 + self.volume_name.len() + 1);
        for node in &self.nodes[..index] {
            off += node.total_len();
        }
        off as u32
    }

    pub fn build(&self) -> Vec<u8> {
        let root = align_up(16 + self.volume_name.len() + 1);
        let total = root + self.nodes.iter().map(RawNode::total_len).sum::<usize>();
        let mut img = vec![0u8; total];

        img[..8].copy_from_slice(ROMFS_MAGIC);
        img[8..12].copy_from_slice(&(total as u32).to_be_bytes());
        img[16..16 + self.volume_name.len()].copy_from_slice(&self.volume_name);

        let resolve = |link: Link| match link {
            Link::None => 0,
            Link::Node(i) => self.offset_of(i),
            Link::Raw(off) => off,
        };

        let mut off = root;
        for node in &self.nodes {
            let next = resolve(node.next) | node.mode as u32;
            img[off..off + 4].copy_from_slice(&next.to_be_bytes());
            img[off + 4..off + 8].copy_from_slice(&resolve(node.info).to_be_bytes());
            img[off + 8..off + 12].copy_from_slice(&(node.data.len() as u32).to_be_bytes());
            img[off + 16..off + 16 + node.name.len()].copy_from_slice(&node.name);
            let hdr_end = off + node.header_len();
            let sum = word_sum(&img[off..hdr_end]);
            img[off + 12..off + 16].copy_from_slice(&0u32.wrapping_sub(sum).to_be_bytes());
            img[hdr_end..hdr_end + node.data.len()].copy_from_slice(&node.data);
            off += node.total_len();
        }

        let span = core::cmp::min(512, total);
        let sum = word_sum(&img[..span]);
        img[12..16].copy_from_slice(&0u32.wrapping_sub(sum).to_be_bytes());
        img
    }
}

fn word_sum(bytes: &[u8]) -> u32 {
    bytes.chunks(4).fold(0u32, |sum, c| {
        let mut w = [0u8; 4];
        w[..c.len()].copy_from_slice(c);
        sum.wrapping_add(u32::from_be_bytes(w))
    })
}

/// A root directory holding only `.` and `..`.
pub fn empty() -> Vec<u8> {
    let mut b = ImageBuilder::new("empty");
    b.push(RawNode::new(".", RomfsFileType::Directory, Link::Node(0), Link::Node(1)).exec());
    b.push(RawNode::new("..", RomfsFileType::HardLink, Link::Node(0), Link::None));
    b.build()
}

/// ```text
/// /
/// |-- .        directory, child list starts at itself
/// |-- ..       -> /.
/// |-- dir/
/// |   |-- ..   -> /.
/// |   |-- b    "bbb...\n"
/// |   `-- .    -> /dir
/// `-- a        "aaa\n"
/// ```
pub fn basic() -> Vec<u8> {
    let mut b = ImageBuilder::new("basic");
    b.push(RawNode::new(".", RomfsFileType::Directory, Link::Node(0), Link::Node(1)).exec());
    b.push(RawNode::new("..", RomfsFileType::HardLink, Link::Node(0), Link::Node(2)));
    b.push(RawNode::new("dir", RomfsFileType::Directory, Link::Node(3), Link::Node(6)).exec());
    b.push(RawNode::new("..", RomfsFileType::HardLink, Link::Node(0), Link::Node(4)));
    b.push(
        RawNode::new("b", RomfsFileType::RegularFile, Link::None, Link::Node(5)).data(B_CONTENT),
    );
    b.push(RawNode::new(".", RomfsFileType::HardLink, Link::Node(2), Link::None));
    b.push(RawNode::new("a", RomfsFileType::RegularFile, Link::None, Link::None).data(b"aaa\n"));
    b.build()
}

/// Everything the basic image lacks: a root-level `b`, nested directories,
/// a soft link, a hardlink to a file, a device node, an empty file and a
/// hardlink cycle.
///
/// ```text
/// /
/// |-- . ..
/// |-- b          "advanced\n"
/// |-- alias      -> /b
/// |-- link       softlink "b"
/// |-- tty        char device 4:1
/// |-- empty      ""
/// |-- loop1      -> loop2
/// |-- loop2      -> loop1
/// `-- nested/
///     |-- . ..
///     `-- deep/
///         |-- . ..
///         `-- leaf   "leaf\n" (executable)
/// ```
pub fn advanced() -> Vec<u8> {
    let mut b = ImageBuilder::new("advanced");
    // 0 .. 9: root
    b.push(RawNode::new(".", RomfsFileType::Directory, Link::Node(0), Link::Node(1)).exec());
    b.push(RawNode::new("..", RomfsFileType::HardLink, Link::Node(0), Link::Node(2)));
    b.push(
        RawNode::new("b", RomfsFileType::RegularFile, Link::None, Link::Node(3))
            .data(b"advanced\n"),
    );
    b.push(RawNode::new("alias", RomfsFileType::HardLink, Link::Node(2), Link::Node(4)));
    b.push(RawNode::new("link", RomfsFileType::SoftLink, Link::None, Link::Node(5)).data(b"b"));
    b.push(RawNode::new("tty", RomfsFileType::CharDevice, Link::Raw(0x0004_0001), Link::Node(6)));
    b.push(RawNode::new("empty", RomfsFileType::RegularFile, Link::None, Link::Node(7)));
    b.push(RawNode::new("loop1", RomfsFileType::HardLink, Link::Node(8), Link::Node(8)));
    b.push(RawNode::new("loop2", RomfsFileType::HardLink, Link::Node(7), Link::Node(9)));
    b.push(RawNode::new("nested", RomfsFileType::Directory, Link::Node(10), Link::None).exec());
    // 10 .. 12: nested
    b.push(RawNode::new(".", RomfsFileType::HardLink, Link::Node(9), Link::Node(11)));
    b.push(RawNode::new("..", RomfsFileType::HardLink, Link::Node(0), Link::Node(12)));
    b.push(RawNode::new("deep", RomfsFileType::Directory, Link::Node(13), Link::None).exec());
    // 13 .. 15: nested/deep
    b.push(RawNode::new(".", RomfsFileType::HardLink, Link::Node(12), Link::Node(14)));
    b.push(RawNode::new("..", RomfsFileType::HardLink, Link::Node(9), Link::Node(15)));
    b.push(
        RawNode::new("leaf", RomfsFileType::RegularFile, Link::None, Link::None)
            .exec()
            .data(b"leaf\n"),
    );
    b.build()
}

/// A root whose child list lacks the synthetic `.` and `..` entries.
pub fn without_dots() -> Vec<u8> {
    let mut b = ImageBuilder::new("nodots");
    b.push(RawNode::new("top", RomfsFileType::Directory, Link::Node(1), Link::None).exec());
    b.push(RawNode::new("f", RomfsFileType::RegularFile, Link::None, Link::None).data(b"f"));
    b.build()
}

/// A root whose sibling chain runs `.`, `..`, `x` and then back to `..`.
pub fn sibling_cycle() -> Vec<u8> {
    let mut b = ImageBuilder::new("cycle");
    b.push(RawNode::new(".", RomfsFileType::Directory, Link::Node(0), Link::Node(1)).exec());
    b.push(RawNode::new("..", RomfsFileType::HardLink, Link::Node(0), Link::Node(2)));
    b.push(RawNode::new("x", RomfsFileType::RegularFile, Link::None, Link::Node(1)).data(b"x"));
    b.build()
}

/// A flat root with `count` files named `f0`, `f1`, ...
pub fn wide(count: usize) -> Vec<u8> {
    let mut b = ImageBuilder::new("wide");
    b.push(RawNode::new(".", RomfsFileType::Directory, Link::Node(0), Link::Node(1)).exec());
    b.push(RawNode::new(
        "..",
        RomfsFileType::HardLink,
        Link::Node(0),
        if count == 0 { Link::None } else { Link::Node(2) },
    ));
    for i in 0..count {
        let name = alloc::format!("f{}", i);
        let next = if i + 1 == count { Link::None } else { Link::Node(i + 3) };
        b.push(
            RawNode::new(&name, RomfsFileType::RegularFile, Link::None, next)
                .data(name.as_bytes()),
        );
    }
    b.build()
}

#[test]
fn test_basic_layout_matches_offsets() {
    let img = basic();
    let vol = crate::layout::decode_volume_header(&img).unwrap();
    assert_eq!(vol.root_offset, offsets::ROOT);
    for (off, name) in [
        (offsets::ROOT, &b"."[..]),
        (offsets::SECOND_ENTRY_ROOT, b".."),
        (offsets::DIR, b"dir"),
        (offsets::FIRST_ENTRY_IN_DIR, b".."),
        (offsets::B_FILE, b"b"),
        (offsets::DIR_IN_DIR, b"."),
        (offsets::A_FILE, b"a"),
    ] {
        let node = crate::layout::decode_node_header(&vol, &img, off).unwrap();
        assert_eq!(node.name, name);
        assert!(node.verify_checksum(&img).is_ok());
    }
    assert!(vol.verify_checksum(&img).is_ok());
    assert_eq!(img.len(), 0x120);
}
