//! Mount handle and descriptor operations.

use alloc::{borrow::Cow, vec::Vec};

use log::{debug, trace};
use serde::{Serialize, Serializer};

use crate::{
    common::{
        serialize_mode, DirCookie, Fd, OpenFlags, RomfsError, RomfsFileType, RomfsMode,
        RomfsResult, RomfsStat, Whence,
    },
    fd_table::FdTable,
    layout::{decode_node_header, decode_volume_header, NodeHeader, Volume},
    resolve::find_entry,
};

/// Runtime knobs for [`Romfs::load_with_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MountOptions {
    /// Check the volume checksum and the root header checksum at mount time.
    pub verify_checksum: bool,
}

/// One entry produced by [`Romfs::read_dir`]. Hardlinks, `.` and `..`
/// included, are reported as they appear in the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirEntry<'img> {
    /// Offset of the following entry, 0 after the last one.
    pub next: u32,
    /// Offset of this entry's header.
    pub inode: u32,
    #[serde(serialize_with = "serialize_mode")]
    pub mode: RomfsMode,
    #[serde(serialize_with = "serialize_name")]
    pub name: &'img [u8],
}

impl<'img> DirEntry<'img> {
    fn from_node(node: &NodeHeader<'img>) -> Self {
        Self {
            next: node.next,
            inode: node.offset,
            mode: node.mode,
            name: node.name,
        }
    }

    pub fn file_type(&self) -> RomfsFileType {
        self.mode.file_type()
    }

    pub fn name_lossy(&self) -> Cow<'img, str> {
        alloc::string::String::from_utf8_lossy(self.name)
    }
}

fn serialize_name<S: Serializer>(name: &&[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&alloc::string::String::from_utf8_lossy(name))
}

/// Outcome of one [`Romfs::read_dir`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDir {
    /// Entries written to the front of the caller's buffer.
    pub used: usize,
    /// Where the next call resumes; [`DirCookie::LAST`] once exhausted.
    pub next_cookie: DirCookie,
}

/// A mounted image.
///
/// The image bytes are borrowed for the life of the mount and never written.
/// Each mount owns its own descriptor table; descriptors from one mount mean
/// nothing to another.
pub struct Romfs<'img> {
    img: &'img [u8],
    vol: Volume<'img>,
    fds: FdTable<'img>,
}

impl<'img> Romfs<'img> {
    pub fn load(img: &'img [u8]) -> RomfsResult<Self> {
        Self::load_with_options(img, &MountOptions::default())
    }

    /// Decode the volume header and pre-open the root directory as [`Fd::ROOT`].
    pub fn load_with_options(img: &'img [u8], opts: &MountOptions) -> RomfsResult<Self> {
        let vol = decode_volume_header(img)?;
        let root = decode_node_header(&vol, img, vol.root_offset)?;
        if opts.verify_checksum {
            vol.verify_checksum(img)?;
            root.verify_checksum(img)?;
        }

        debug!(
            "Loaded volume \"{}\". Size is {} bytes. First entry offset = {:#x}",
            vol.name_lossy(),
            vol.size,
            vol.root_offset
        );

        Ok(Self {
            img,
            vol,
            fds: FdTable::new(root),
        })
    }

    /// Release the mount. Every descriptor it issued becomes meaningless.
    pub fn unload(self) {
        debug!("Unloading volume \"{}\"", self.vol.name_lossy());
    }

    pub fn volume(&self) -> &Volume<'img> {
        &self.vol
    }

    pub fn image(&self) -> &'img [u8] {
        self.img
    }

    pub fn is_open(&self, fd: Fd) -> bool {
        self.fds.get(fd).is_ok()
    }

    pub fn open_fds(&self) -> impl Iterator<Item = Fd> + '_ {
        self.fds.open_fds()
    }

    fn node(&self, fd: Fd) -> RomfsResult<&NodeHeader<'img>> {
        self.fds.get(fd).map(|desc| &desc.node)
    }

    fn resolve(&self, base: Fd, path: &str) -> RomfsResult<NodeHeader<'img>> {
        let start = self.node(base)?.offset;
        find_entry(&self.vol, self.img, start, path)
    }

    /// Open `path` relative to the directory behind `base`.
    pub fn open_at(&mut self, base: Fd, path: &str, flags: OpenFlags) -> RomfsResult<Fd> {
        let node = self.resolve(base, path)?;
        if flags.contains(OpenFlags::DIRECTORY) && !node.is_dir() {
            return Err(RomfsError::NotADirectory);
        }
        let fd = self.fds.insert(node)?;
        trace!("open {:?} at fd {} -> fd {} (node {:#x})", path, base, fd, node.offset);
        Ok(fd)
    }

    /// Open `path` relative to the root directory.
    pub fn open_root(&mut self, path: &str, flags: OpenFlags) -> RomfsResult<Fd> {
        self.open_at(Fd::ROOT, path, flags)
    }

    pub fn close(&mut self, fd: Fd) -> RomfsResult<()> {
        self.fds.remove(fd)?;
        trace!("close fd {}", fd);
        Ok(())
    }

    pub fn fd_stat(&self, fd: Fd) -> RomfsResult<RomfsStat> {
        self.node(fd).map(stat_of)
    }

    /// Stat `path` relative to `fd` without opening it.
    pub fn fd_stat_at(&self, fd: Fd, path: &str) -> RomfsResult<RomfsStat> {
        self.resolve(fd, path).map(|node| stat_of(&node))
    }

    /// Copy file data at the cursor into `buf` and advance the cursor.
    ///
    /// Returns the number of bytes copied, 0 at end of file.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> RomfsResult<usize> {
        let img = self.img;
        let desc = self.fds.get_mut(fd)?;
        if !desc.node.is_file() {
            return Err(RomfsError::IsADirectory);
        }
        if buf.is_empty() {
            return Err(RomfsError::InvalidArgument);
        }

        let len = core::cmp::min(buf.len(), desc.remaining() as usize);
        let start = desc.cursor as usize;
        buf[..len].copy_from_slice(&img[start..start + len]);
        desc.cursor += len as u32;
        Ok(len)
    }

    /// Move the cursor. The target must stay within the file's data; a
    /// rejected seek leaves the cursor untouched.
    ///
    /// Returns the new position relative to the start of the data.
    pub fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> RomfsResult<u32> {
        let desc = self.fds.get_mut(fd)?;
        if !desc.node.is_file() {
            return Err(RomfsError::BadDescriptor);
        }

        let base = match whence {
            Whence::Set => desc.node.data_offset,
            Whence::Current => desc.cursor,
            Whence::End => desc.node.data_end(),
        };
        let target = i64::from(base)
            .checked_add(offset)
            .filter(|&pos| {
                pos >= i64::from(desc.node.data_offset) && pos <= i64::from(desc.node.data_end())
            })
            .ok_or(RomfsError::InvalidArgument)?;

        desc.cursor = target as u32;
        Ok(desc.position())
    }

    /// Cursor position relative to the start of the data.
    pub fn tell(&self, fd: Fd) -> RomfsResult<u32> {
        let desc = self.fds.get(fd)?;
        if !desc.node.is_file() {
            return Err(RomfsError::BadDescriptor);
        }
        Ok(desc.position())
    }

    /// Fill `buf` with directory entries, resuming at `cookie`.
    ///
    /// [`DirCookie::START`] begins at the first child; any other value is the
    /// offset of the next header to decode, as handed back in
    /// [`ReadDir::next_cookie`]. The final call reports [`DirCookie::LAST`],
    /// after which further calls return no entries.
    pub fn read_dir(
        &self,
        fd: Fd,
        buf: &mut [DirEntry<'img>],
        cookie: DirCookie,
    ) -> RomfsResult<ReadDir> {
        let dir = self.node(fd)?;
        if !dir.is_dir() {
            return Err(RomfsError::NotADirectory);
        }
        if buf.is_empty() {
            return Err(RomfsError::InvalidArgument);
        }

        let mut offset = match cookie {
            DirCookie::LAST => 0,
            DirCookie::START => dir.info,
            DirCookie(offset) => offset,
        };
        let mut used = 0;
        while offset != 0 && used < buf.len() {
            let entry = decode_node_header(&self.vol, self.img, offset)?;
            buf[used] = DirEntry::from_node(&entry);
            used += 1;
            offset = entry.next;
        }

        let next_cookie = if offset == 0 {
            DirCookie::LAST
        } else {
            DirCookie(offset)
        };
        trace!("read_dir fd {} from {:?}: {} entries, next {:?}", fd, cookie, used, next_cookie);
        Ok(ReadDir { used, next_cookie })
    }

    /// Every entry of the directory behind `fd`, in image order.
    ///
    /// Fails with [`RomfsError::MalformedNode`] once more entries have been
    /// seen than the image can hold, which only a cyclic chain produces.
    pub fn dir_entries(&self, fd: Fd) -> RomfsResult<Vec<DirEntry<'img>>> {
        let limit = self.vol.max_nodes(self.img);
        let mut entries = Vec::new();
        let mut buf = [DirEntry::default(); 16];
        let mut cookie = DirCookie::START;
        while !cookie.is_last() {
            if entries.len() > limit {
                return Err(RomfsError::MalformedNode(cookie.0));
            }
            let page = self.read_dir(fd, &mut buf, cookie)?;
            entries.extend_from_slice(&buf[..page.used]);
            cookie = page.next_cookie;
        }
        Ok(entries)
    }

    /// Borrow file data straight from the image, starting `offset` bytes in.
    ///
    /// The slice lives as long as the image; it does not touch the cursor.
    pub fn map_file(&self, fd: Fd, offset: u32) -> RomfsResult<&'img [u8]> {
        let node = self.node(fd)?;
        if !node.is_file() {
            return Err(RomfsError::PermissionDenied);
        }
        if offset >= node.size {
            return Err(RomfsError::InvalidArgument);
        }
        let range = node.data_range();
        Ok(&self.img[range.start + offset as usize..range.end])
    }

    /// Target of the soft link at `path`, relative to `fd`. Not followed.
    pub fn readlink_at(&self, fd: Fd, path: &str) -> RomfsResult<&'img [u8]> {
        let node = self.resolve(fd, path)?;
        if node.file_type() != RomfsFileType::SoftLink {
            return Err(RomfsError::InvalidArgument);
        }
        Ok(&self.img[node.data_range()])
    }
}

fn stat_of(node: &NodeHeader<'_>) -> RomfsStat {
    RomfsStat {
        ino: node.offset,
        mode: node.mode,
        size: node.size,
        checksum: node.checksum,
        info: node.info,
    }
}
