//! Splits slash-delimited paths into components.
//!
//! Runs of separators collapse, trailing separators are ignored, and a
//! leading separator becomes an explicit [`Component::Root`] so that the
//! resolver can jump to the volume root no matter where it started.

use crate::{
    common::{RomfsError, RomfsResult},
    MAX_NAME_LEN, MAX_PATH_LEN,
};

const SEPARATOR: char = '/';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component<'a> {
    /// The path was absolute.
    Root,
    /// A directory entry name, `.` and `..` included.
    Name(&'a str),
}

/// A path whose length and component lengths have been checked.
#[derive(Debug, Clone, Copy)]
pub struct RomfsPath<'a> {
    raw: &'a str,
}

impl<'a> RomfsPath<'a> {
    pub fn parse(raw: &'a str) -> RomfsResult<Self> {
        if raw.len() >= MAX_PATH_LEN {
            return Err(RomfsError::PathTooLong);
        }
        let path = Self { raw };
        if path.names().any(|name| name.len() >= MAX_NAME_LEN) {
            return Err(RomfsError::NameTooLong);
        }
        Ok(path)
    }

    pub fn is_absolute(&self) -> bool {
        self.raw.starts_with(SEPARATOR)
    }

    /// True for `""`: resolving it yields the starting node.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = Component<'a>> + 'a {
        let root = self.is_absolute().then_some(Component::Root);
        root.into_iter().chain(self.names().map(Component::Name))
    }

    /// Number of components, counting the root marker of an absolute path.
    pub fn count(&self) -> usize {
        self.components().count()
    }

    fn names(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.raw.split(SEPARATOR).filter(|s| !s.is_empty())
    }
}
