//! One lock per mount, for callers that share a handle between threads.
//!
//! [`Romfs`] itself never locks. Distinct mounts need no coordination at all;
//! only a handle reached from several threads has to be serialized, and this
//! wrapper does that with a spin lock so it works without `std`.

use spin::{Mutex, MutexGuard};

use crate::{
    common::{Fd, OpenFlags, RomfsResult},
    romfs::{MountOptions, Romfs},
};

pub struct LockedRomfs<'img> {
    inner: Mutex<Romfs<'img>>,
}

impl<'img> LockedRomfs<'img> {
    pub fn new(fs: Romfs<'img>) -> Self {
        Self {
            inner: Mutex::new(fs),
        }
    }

    pub fn load(img: &'img [u8], opts: &MountOptions) -> RomfsResult<Self> {
        Romfs::load_with_options(img, opts).map(Self::new)
    }

    /// Hold the mount for a sequence of operations that must not interleave
    /// with other threads, such as seek followed by read.
    pub fn lock(&self) -> MutexGuard<'_, Romfs<'img>> {
        self.inner.lock()
    }

    /// Open `path` from the root, read it whole and close it again.
    pub fn read_file(&self, path: &str) -> RomfsResult<&'img [u8]> {
        let mut fs = self.lock();
        let fd = fs.open_root(path, OpenFlags::empty())?;
        let data = read_all(&fs, fd);
        fs.close(fd)?;
        data
    }

    pub fn into_inner(self) -> Romfs<'img> {
        self.inner.into_inner()
    }
}

fn read_all<'img>(fs: &Romfs<'img>, fd: Fd) -> RomfsResult<&'img [u8]> {
    let stat = fs.fd_stat(fd)?;
    if stat.size == 0 && stat.mode.is_file() {
        return Ok(&[]);
    }
    fs.map_file(fd, 0)
}
