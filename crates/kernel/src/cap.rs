//! Per-process capability (handle) tables.
//!
//! A handle is `generation << 16 | index`; revoking a slot bumps its
//! generation so stale handles with the right index still fail. Derivation
//! can only narrow rights.

use viper_abi::{CapRights, VError, VResult, cap_kind};

pub const MAX_CAPS: usize = 64;

#[derive(Debug, Clone, Copy)]
struct CapEntry {
    kind: u8,
    rights: CapRights,
    generation: u16,
    /// Kernel object reference; interpretation is kind-specific (channel
    /// handle, inode number, timer id, ...).
    object: u64,
    in_use: bool,
}

impl CapEntry {
    const fn empty() -> Self {
        Self {
            kind: cap_kind::NONE,
            rights: CapRights::empty(),
            generation: 0,
            object: 0,
            in_use: false,
        }
    }
}

/// Result of `cap_query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapInfo {
    pub kind: u8,
    pub rights: CapRights,
    pub generation: u16,
}

pub struct CapTable {
    entries: [CapEntry; MAX_CAPS],
}

#[inline]
fn handle_index(handle: u32) -> usize {
    (handle & 0xFFFF) as usize
}

#[inline]
fn handle_generation(handle: u32) -> u16 {
    (handle >> 16) as u16
}

#[inline]
fn make_handle(index: usize, generation: u16) -> u32 {
    ((generation as u32) << 16) | index as u32
}

impl CapTable {
    pub const fn new() -> Self {
        Self {
            entries: [CapEntry::empty(); MAX_CAPS],
        }
    }

    fn entry(&self, handle: u32) -> VResult<&CapEntry> {
        let idx = handle_index(handle);
        let e = self.entries.get(idx).ok_or(VError::NotFound)?;
        if !e.in_use || e.generation != handle_generation(handle) {
            return Err(VError::NotFound);
        }
        Ok(e)
    }

    /// Install an object and mint its handle.
    pub fn insert(&mut self, kind: u8, rights: CapRights, object: u64) -> VResult<u32> {
        let idx = self
            .entries
            .iter()
            .position(|e| !e.in_use)
            .ok_or(VError::OutOfMemory)?;
        let e = &mut self.entries[idx];
        e.kind = kind;
        e.rights = rights;
        e.object = object;
        e.in_use = true;
        Ok(make_handle(idx, e.generation))
    }

    /// Resolve to the kernel object, checking kind and required rights.
    pub fn resolve(&self, handle: u32, kind: u8, required: CapRights) -> VResult<u64> {
        let e = self.entry(handle)?;
        if e.kind != kind {
            return Err(VError::InvalidArg);
        }
        if !e.rights.contains(required) {
            return Err(VError::Denied);
        }
        Ok(e.object)
    }

    /// Rights-agnostic lookup (kind + object), for enumeration-style ops.
    pub fn lookup(&self, handle: u32) -> VResult<(u8, u64)> {
        let e = self.entry(handle)?;
        Ok((e.kind, e.object))
    }

    /// New handle to the same object with `rights' = rights & parent`.
    /// The parent must itself carry `DERIVE`.
    pub fn derive(&mut self, handle: u32, rights: CapRights) -> VResult<u32> {
        let parent = *self.entry(handle)?;
        if !parent.rights.contains(CapRights::DERIVE) {
            return Err(VError::Denied);
        }
        self.insert(parent.kind, rights & parent.rights, parent.object)
    }

    /// Invalidate one handle; the slot is reusable under a new generation.
    pub fn revoke(&mut self, handle: u32) -> VResult<()> {
        self.entry(handle)?;
        let idx = handle_index(handle);
        let e = &mut self.entries[idx];
        e.in_use = false;
        e.kind = cap_kind::NONE;
        e.rights = CapRights::empty();
        e.object = 0;
        e.generation = e.generation.wrapping_add(1);
        Ok(())
    }

    pub fn query(&self, handle: u32) -> VResult<CapInfo> {
        let e = self.entry(handle)?;
        Ok(CapInfo {
            kind: e.kind,
            rights: e.rights,
            generation: e.generation,
        })
    }

    /// Write the live handles into `buf`; returns the count written.
    pub fn list(&self, buf: &mut [u32]) -> usize {
        let mut n = 0;
        for (idx, e) in self.entries.iter().enumerate() {
            if n >= buf.len() {
                break;
            }
            if e.in_use {
                buf[n] = make_handle(idx, e.generation);
                n += 1;
            }
        }
        n
    }
}

impl Default for CapTable {
    fn default() -> Self {
        Self::new()
    }
}
