//! Types shared by the decoder, the resolver and the descriptor operations.

use bitflags::bitflags;
use serde::{Serialize, Serializer};

use crate::FD_OFFSET;

pub type RomfsResult<T> = Result<T, RomfsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, onlyerror::Error)]
pub enum RomfsError {
    /// Bad magic or a truncated volume header.
    #[error("malformed volume header")]
    MalformedVolume,
    /// A node header at the given offset lies outside the image.
    #[error("malformed node header at offset {0}")]
    MalformedNode(u32),
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("too many open files")]
    TooManyOpen,
    #[error("file name too long")]
    NameTooLong,
    #[error("path too long")]
    PathTooLong,
    #[error("too many levels of hard links")]
    LinkLoop,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("permission denied")]
    PermissionDenied,
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

impl RomfsError {
    /// POSIX errno for this error, for callers that speak `-errno`.
    pub fn errno(&self) -> i32 {
        match self {
            RomfsError::MalformedVolume
            | RomfsError::MalformedNode(_)
            | RomfsError::InvalidArgument => 22, // EINVAL
            RomfsError::NotFound => 2,            // ENOENT
            RomfsError::NotADirectory => 20,      // ENOTDIR
            RomfsError::IsADirectory => 21,       // EISDIR
            RomfsError::BadDescriptor => 9,       // EBADF
            RomfsError::TooManyOpen => 24,        // EMFILE
            RomfsError::NameTooLong | RomfsError::PathTooLong => 36, // ENAMETOOLONG
            RomfsError::LinkLoop => 40,           // ELOOP
            RomfsError::PermissionDenied => 13,   // EACCES
            RomfsError::ChecksumMismatch => 5,    // EIO
        }
    }
}

/// The 3-bit type tag stored in the low bits of a node's `next` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RomfsFileType {
    HardLink = 0,
    Directory = 1,
    RegularFile = 2,
    SoftLink = 3,
    BlockDevice = 4,
    CharDevice = 5,
    Socket = 6,
    Fifo = 7,
}

impl RomfsFileType {
    fn from_tag(tag: u8) -> Self {
        match tag & RomfsMode::TYPE_MASK.bits() {
            0 => RomfsFileType::HardLink,
            1 => RomfsFileType::Directory,
            2 => RomfsFileType::RegularFile,
            3 => RomfsFileType::SoftLink,
            4 => RomfsFileType::BlockDevice,
            5 => RomfsFileType::CharDevice,
            6 => RomfsFileType::Socket,
            _ => RomfsFileType::Fifo,
        }
    }

    /// Single character used by `ls`-style listings.
    pub fn as_char(&self) -> char {
        match self {
            RomfsFileType::HardLink => 'h',
            RomfsFileType::Directory => 'd',
            RomfsFileType::RegularFile => '-',
            RomfsFileType::SoftLink => 'l',
            RomfsFileType::BlockDevice => 'b',
            RomfsFileType::CharDevice => 'c',
            RomfsFileType::Socket => 's',
            RomfsFileType::Fifo => 'p',
        }
    }
}

bitflags! {
    /// Type tag plus the executable modifier, as packed into a node header.
    pub struct RomfsMode: u8 {
        const TYPE_MASK = 0x7;
        /// Only meaningful for directories and regular files.
        const EXEC = 0x8;
    }
}

impl RomfsMode {
    pub fn file_type(&self) -> RomfsFileType {
        RomfsFileType::from_tag(self.bits())
    }

    pub fn is_type(&self, ty: RomfsFileType) -> bool {
        self.file_type() == ty
    }

    pub fn is_hardlink(&self) -> bool {
        self.is_type(RomfsFileType::HardLink)
    }

    pub fn is_dir(&self) -> bool {
        self.is_type(RomfsFileType::Directory)
    }

    pub fn is_file(&self) -> bool {
        self.is_type(RomfsFileType::RegularFile)
    }

    pub fn is_exec(&self) -> bool {
        self.contains(RomfsMode::EXEC)
    }
}

impl Default for RomfsMode {
    fn default() -> Self {
        RomfsMode::empty()
    }
}

pub(crate) fn serialize_mode<S: Serializer>(mode: &RomfsMode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u8(mode.bits())
}

bitflags! {
    pub struct OpenFlags: u32 {
        /// Accepted for compatibility; reads never block on an in-memory image.
        const NONBLOCK = 1 << 0;
        /// Fail with `NotADirectory` unless the path names a directory.
        const DIRECTORY = 1 << 1;
    }
}

/// Reference point for [`Romfs::seek`](crate::Romfs::seek).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Current,
    End,
}

impl TryFrom<i32> for Whence {
    type Error = RomfsError;

    fn try_from(value: i32) -> RomfsResult<Self> {
        match value {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            _ => Err(RomfsError::InvalidArgument),
        }
    }
}

/// Caller-visible descriptor number, valid only within the mount that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fd(pub usize);

impl Fd {
    /// The root directory, pre-opened by every mount.
    pub const ROOT: Fd = Fd(FD_OFFSET);

    pub(crate) fn from_slot(slot: usize) -> Self {
        Fd(slot + FD_OFFSET)
    }

    pub(crate) fn slot(&self) -> Option<usize> {
        self.0.checked_sub(FD_OFFSET)
    }
}

impl core::fmt::Display for Fd {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Continuation token for [`Romfs::read_dir`](crate::Romfs::read_dir).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirCookie(pub u32);

impl DirCookie {
    /// Start from the directory's first child.
    pub const START: DirCookie = DirCookie(0);
    /// Enumeration is exhausted.
    pub const LAST: DirCookie = DirCookie(u32::MAX);

    pub fn is_last(&self) -> bool {
        *self == DirCookie::LAST
    }
}

impl From<u32> for DirCookie {
    fn from(offset: u32) -> Self {
        DirCookie(offset)
    }
}

/// Node metadata returned by the stat family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RomfsStat {
    /// Offset of the node header, unique within the image.
    pub ino: u32,
    #[serde(serialize_with = "serialize_mode")]
    pub mode: RomfsMode,
    pub size: u32,
    pub checksum: u32,
    /// Raw `info` word: child list, link target or device numbers.
    pub info: u32,
}

impl RomfsStat {
    pub fn file_type(&self) -> RomfsFileType {
        self.mode.file_type()
    }

    /// `(major, minor)` for block and character devices.
    pub fn device(&self) -> Option<(u16, u16)> {
        match self.file_type() {
            RomfsFileType::BlockDevice | RomfsFileType::CharDevice => {
                Some(((self.info >> 16) as u16, self.info as u16))
            }
            _ => None,
        }
    }
}
