//! Read-only driver for `romfs` images.
//!
//! An image is a single byte buffer: a volume header followed by a chain of
//! node headers, each carrying a name, a size, a type and the offset of its
//! next sibling. [`Romfs`] mounts such a buffer (borrowed, never copied) and
//! hands out POSIX-like descriptors for reading, seeking, stat'ing, listing
//! directories and mapping file data without copying.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

mod common;
mod fd_table;
pub mod layout;
pub mod path;
mod resolve;
mod romfs;
mod sync;

#[cfg(test)]
mod test_image;

pub use common::{
    DirCookie, Fd, OpenFlags, RomfsError, RomfsFileType, RomfsMode, RomfsResult, RomfsStat,
    Whence,
};
pub use layout::{NodeHeader, Volume};
pub use romfs::{DirEntry, MountOptions, ReadDir, Romfs};
pub use sync::LockedRomfs;

/// Magic string at offset 0 of every image.
pub const ROMFS_MAGIC: &[u8; 8] = b"-rom1fs-";

/// Headers, names and file data all start on this boundary.
pub const ROMFS_ALIGNMENT: usize = 16;

/// Longest hardlink chain followed before giving up with [`RomfsError::LinkLoop`].
pub const MAX_LINKS: usize = 16;

/// A path component must be strictly shorter than this.
pub const MAX_NAME_LEN: usize = 32;

/// A path must be strictly shorter than this.
pub const MAX_PATH_LEN: usize = 256;

/// Descriptor numbers below this are reserved (stdin, stdout, stderr).
/// The pre-opened root directory is always `FD_OFFSET`.
pub const FD_OFFSET: usize = 3;

#[cfg(feature = "fd10")]
pub const MAX_OPEN: usize = 10;

#[cfg(all(feature = "fd32", not(feature = "fd10")))]
pub const MAX_OPEN: usize = 32;

#[cfg(all(feature = "fd128", not(any(feature = "fd10", feature = "fd32"))))]
pub const MAX_OPEN: usize = 128;

#[cfg(not(any(feature = "fd10", feature = "fd32", feature = "fd128")))]
pub const MAX_OPEN: usize = 10;

/// Round `addr` up to the next [`ROMFS_ALIGNMENT`] boundary.
#[inline]
pub const fn align_up(addr: usize) -> usize {
    (addr + ROMFS_ALIGNMENT - 1) & !(ROMFS_ALIGNMENT - 1)
}

#[macro_export]
macro_rules! be32 {
    ($buf:expr, $off:expr) => {
        u32::from_be_bytes([$buf[$off], $buf[$off + 1], $buf[$off + 2], $buf[$off + 3]])
    };
}
