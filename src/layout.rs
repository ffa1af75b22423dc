//! On-image layout of the volume header and node headers.
//!
//! All multi-byte fields are big-endian. The image is untrusted: every offset
//! is checked against both the size the volume claims and the real buffer
//! length before anything is read from it.

use core::ops::Range;

use crate::{
    align_up, be32,
    common::{RomfsError, RomfsFileType, RomfsMode, RomfsResult},
    ROMFS_ALIGNMENT, ROMFS_MAGIC,
};

pub const VOLHDR_MAGIC_OFF: usize = 0;
/// Number of accessible bytes in the image.
pub const VOLHDR_SIZE_OFF: usize = 8;
/// Checksum of the first 512 bytes.
pub const VOLHDR_CHKSUM_OFF: usize = 12;
pub const VOLHDR_VOLNAME_OFF: usize = 16;

/// Offset of the next header; the low 4 bits carry the mode.
pub const FILEHDR_NEXT_OFF: usize = 0;
pub const FILEHDR_INFO_OFF: usize = 4;
pub const FILEHDR_SIZE_OFF: usize = 8;
/// Covers the header, the name and its padding.
pub const FILEHDR_CHKSUM_OFF: usize = 12;
pub const FILEHDR_NAME_OFF: usize = 16;

pub const FILEHDR_NEXT_MODE_MASK: u32 = 0x0F;

/// Bytes covered by the volume checksum.
pub const VOLHDR_CHKSUM_SPAN: usize = 512;

/// Decoded volume header. Borrowed from the image, immutable after mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Volume<'img> {
    pub size: u32,
    /// Volume label, without the terminating NUL.
    pub name: &'img [u8],
    pub checksum: u32,
    /// First node header of the root directory.
    pub root_offset: u32,
}

impl<'img> Volume<'img> {
    /// Highest offset any node may reach: the smaller of the claimed size and
    /// the bytes actually present.
    pub fn bound(&self, img: &[u8]) -> usize {
        core::cmp::min(self.size as usize, img.len())
    }

    /// Upper bound on the number of headers the image can hold. A sibling
    /// chain longer than this must revisit a node.
    pub fn max_nodes(&self, img: &[u8]) -> usize {
        self.bound(img) / ROMFS_ALIGNMENT
    }

    pub fn name_lossy(&self) -> alloc::borrow::Cow<'img, str> {
        alloc::string::String::from_utf8_lossy(self.name)
    }

    /// The big-endian word sum of the first `min(512, size)` bytes must be zero.
    pub fn verify_checksum(&self, img: &[u8]) -> RomfsResult<()> {
        let span = core::cmp::min(VOLHDR_CHKSUM_SPAN, self.bound(img));
        if word_sum(&img[..span]) == 0 {
            Ok(())
        } else {
            Err(RomfsError::ChecksumMismatch)
        }
    }
}

/// One file, directory, link or device entry, as found in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader<'img> {
    /// Where this header starts; doubles as the inode number.
    pub offset: u32,
    /// Next sibling, 0 for the last entry of a directory.
    pub next: u32,
    pub mode: RomfsMode,
    /// Link target, first child, or device numbers depending on the type.
    pub info: u32,
    pub size: u32,
    pub checksum: u32,
    /// Entry name, without the terminating NUL.
    pub name: &'img [u8],
    /// First byte of the payload, 16-byte aligned.
    pub data_offset: u32,
}

impl<'img> NodeHeader<'img> {
    pub fn file_type(&self) -> RomfsFileType {
        self.mode.file_type()
    }

    pub fn is_hardlink(&self) -> bool {
        self.mode.is_hardlink()
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.mode.is_file()
    }

    /// Bytes of the image holding this node's payload.
    ///
    /// Only files and soft links have their size checked by the decoder; for
    /// other nodes the end saturates instead of wrapping.
    pub fn data_range(&self) -> Range<usize> {
        let start = self.data_offset as usize;
        start..start.saturating_add(self.size as usize)
    }

    pub fn data_end(&self) -> u32 {
        self.data_offset.saturating_add(self.size)
    }

    pub fn name_lossy(&self) -> alloc::borrow::Cow<'img, str> {
        alloc::string::String::from_utf8_lossy(self.name)
    }

    /// The big-endian word sum over the header, name and padding must be zero.
    pub fn verify_checksum(&self, img: &[u8]) -> RomfsResult<()> {
        let start = self.offset as usize;
        let end = start + align_up(FILEHDR_NAME_OFF + self.name.len() + 1);
        match img.get(start..end) {
            Some(bytes) if word_sum(bytes) == 0 => Ok(()),
            _ => Err(RomfsError::ChecksumMismatch),
        }
    }
}

/// Decode the volume header at the start of `img`.
pub fn decode_volume_header(img: &[u8]) -> RomfsResult<Volume<'_>> {
    if img.is_empty() {
        return Err(RomfsError::InvalidArgument);
    }
    if img.len() < VOLHDR_VOLNAME_OFF
        || &img[VOLHDR_MAGIC_OFF..VOLHDR_MAGIC_OFF + ROMFS_MAGIC.len()] != ROMFS_MAGIC
    {
        return Err(RomfsError::MalformedVolume);
    }

    let size = be32!(img, VOLHDR_SIZE_OFF);
    let checksum = be32!(img, VOLHDR_CHKSUM_OFF);
    let name = cstr_at(img, VOLHDR_VOLNAME_OFF, img.len()).ok_or(RomfsError::MalformedVolume)?;
    let root_offset = align_up(VOLHDR_VOLNAME_OFF + name.len() + 1);

    Ok(Volume {
        size,
        name,
        checksum,
        root_offset: u32::try_from(root_offset).map_err(|_| RomfsError::MalformedVolume)?,
    })
}

/// Decode the node header at `offset`.
///
/// The header, its name and (for files and soft links) its data must all lie
/// inside [`Volume::bound`]; offset 0 is never a valid node.
pub fn decode_node_header<'img>(
    vol: &Volume<'_>,
    img: &'img [u8],
    offset: u32,
) -> RomfsResult<NodeHeader<'img>> {
    let malformed = RomfsError::MalformedNode(offset);
    let bound = vol.bound(img);
    let start = offset as usize;
    if offset == 0 || start > bound || bound - start < FILEHDR_NAME_OFF {
        return Err(malformed);
    }

    let raw_next = be32!(img, start + FILEHDR_NEXT_OFF);
    let mode = RomfsMode::from_bits_truncate((raw_next & FILEHDR_NEXT_MODE_MASK) as u8);
    let info = be32!(img, start + FILEHDR_INFO_OFF);
    let size = be32!(img, start + FILEHDR_SIZE_OFF);
    let checksum = be32!(img, start + FILEHDR_CHKSUM_OFF);
    let name = cstr_at(img, start + FILEHDR_NAME_OFF, bound).ok_or(malformed)?;

    let data_offset = start + align_up(FILEHDR_NAME_OFF + name.len() + 1);
    if matches!(
        mode.file_type(),
        RomfsFileType::RegularFile | RomfsFileType::SoftLink
    ) && data_offset
        .checked_add(size as usize)
        .map_or(true, |end| end > bound)
    {
        return Err(malformed);
    }

    Ok(NodeHeader {
        offset,
        next: raw_next & !FILEHDR_NEXT_MODE_MASK,
        mode,
        info,
        size,
        checksum,
        name,
        data_offset: u32::try_from(data_offset).map_err(|_| malformed)?,
    })
}

/// NUL-terminated string starting at `start`, which must end before `bound`.
fn cstr_at(img: &[u8], start: usize, bound: usize) -> Option<&[u8]> {
    let region = img.get(start..bound)?;
    let len = region.iter().position(|&b| b == 0)?;
    Some(&region[..len])
}

/// Wrapping sum of big-endian 32-bit words; a short tail is zero padded.
fn word_sum(bytes: &[u8]) -> u32 {
    bytes.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}
