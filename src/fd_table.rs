//! Fixed-capacity table of open descriptors, private to one mount.
//!
//! Slots are addressed by small integers rather than pointers; slot 0 holds
//! the root directory for the whole life of the mount.

use crate::{
    common::{Fd, RomfsError, RomfsResult},
    layout::NodeHeader,
    MAX_OPEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor<'img> {
    pub node: NodeHeader<'img>,
    /// Absolute image offset, within `node.data_offset..=node.data_end()`.
    pub cursor: u32,
}

impl<'img> Descriptor<'img> {
    pub fn new(node: NodeHeader<'img>) -> Self {
        Self {
            cursor: node.data_offset,
            node,
        }
    }

    /// Cursor relative to the start of the data.
    pub fn position(&self) -> u32 {
        self.cursor - self.node.data_offset
    }

    pub fn remaining(&self) -> u32 {
        self.node.data_end() - self.cursor
    }
}

pub struct FdTable<'img> {
    slots: [Option<Descriptor<'img>>; MAX_OPEN],
}

impl<'img> FdTable<'img> {
    /// A table with `root` pre-opened in slot 0.
    pub fn new(root: NodeHeader<'img>) -> Self {
        let mut slots = [None; MAX_OPEN];
        slots[0] = Some(Descriptor::new(root));
        Self { slots }
    }

    pub fn get(&self, fd: Fd) -> RomfsResult<&Descriptor<'img>> {
        fd.slot()
            .and_then(|slot| self.slots.get(slot))
            .and_then(Option::as_ref)
            .ok_or(RomfsError::BadDescriptor)
    }

    pub fn get_mut(&mut self, fd: Fd) -> RomfsResult<&mut Descriptor<'img>> {
        fd.slot()
            .and_then(|slot| self.slots.get_mut(slot))
            .and_then(Option::as_mut)
            .ok_or(RomfsError::BadDescriptor)
    }

    /// Store `node` in the first free slot.
    pub fn insert(&mut self, node: NodeHeader<'img>) -> RomfsResult<Fd> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RomfsError::TooManyOpen)?;
        self.slots[slot] = Some(Descriptor::new(node));
        Ok(Fd::from_slot(slot))
    }

    pub fn remove(&mut self, fd: Fd) -> RomfsResult<Descriptor<'img>> {
        if fd == Fd::ROOT {
            return Err(RomfsError::PermissionDenied);
        }
        fd.slot()
            .and_then(|slot| self.slots.get_mut(slot))
            .and_then(Option::take)
            .ok_or(RomfsError::BadDescriptor)
    }

    pub fn open_fds(&self) -> impl Iterator<Item = Fd> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(slot, _)| Fd::from_slot(slot))
    }
}
