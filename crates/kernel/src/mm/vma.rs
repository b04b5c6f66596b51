//! Virtual memory area tracking.
//!
//! VMAs describe the valid regions of a user address space with uniform
//! protection and backing. The page-fault handler consults them to decide
//! whether a fault could become demand paging; today they gate user-pointer
//! validation and keep `sbrk` honest.

use alloc::vec::Vec;
use bitflags::bitflags;
use viper_abi::VError;

bitflags! {
    /// VMA protection bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Prot: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

/// What backs a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmaKind {
    /// Zero-filled memory (heap, BSS).
    Anonymous,
    /// File-backed mapping.
    File { inode: u64, offset: u64 },
    /// Growable stack region.
    Stack,
    /// Trap region; must never have an installed translation.
    Guard,
}

/// Half-open `[start, end)` range of page-aligned virtual addresses.
#[derive(Debug, Clone, Copy)]
pub struct Vma {
    pub start: u64,
    pub end: u64,
    pub prot: Prot,
    pub kind: VmaKind,
}

impl Vma {
    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

/// Upper bound on VMAs per address space.
pub const MAX_VMAS: usize = 64;

/// Start-sorted, non-overlapping set of VMAs for one address space.
#[derive(Debug, Default)]
pub struct VmaList {
    vmas: Vec<Vma>,
}

impl VmaList {
    pub const fn new() -> Self {
        Self { vmas: Vec::new() }
    }

    /// Insert a region. Rejects misaligned bounds, empty ranges, overlap
    /// with an existing VMA, and pool exhaustion.
    pub fn add(&mut self, start: u64, end: u64, prot: Prot, kind: VmaKind) -> Result<(), VError> {
        if start >= end || start % 4096 != 0 || end % 4096 != 0 {
            return Err(VError::InvalidArg);
        }
        if self.vmas.len() >= MAX_VMAS {
            return Err(VError::OutOfMemory);
        }
        if self.vmas.iter().any(|v| start < v.end && v.start < end) {
            return Err(VError::Exists);
        }

        let at = self.vmas.partition_point(|v| v.start < start);
        self.vmas.insert(
            at,
            Vma {
                start,
                end,
                prot,
                kind,
            },
        );
        Ok(())
    }

    /// The VMA containing `addr`, if any.
    pub fn find(&self, addr: u64) -> Option<&Vma> {
        let at = self.vmas.partition_point(|v| v.end <= addr);
        self.vmas.get(at).filter(|v| v.contains(addr))
    }

    pub fn find_mut(&mut self, addr: u64) -> Option<&mut Vma> {
        let at = self.vmas.partition_point(|v| v.end <= addr);
        self.vmas.get_mut(at).filter(|v| v.contains(addr))
    }

    /// Drop every VMA fully inside `[start, end)`. Partial overlaps are left
    /// alone; splitting is not needed at this stage.
    pub fn remove_range(&mut self, start: u64, end: u64) {
        self.vmas.retain(|v| !(v.start >= start && v.end <= end));
    }

    /// True when every byte of `[addr, addr+len)` lies inside VMAs granting
    /// `required` and none of them is a guard region.
    pub fn covers(&self, addr: u64, len: u64, required: Prot) -> bool {
        if len == 0 {
            return true;
        }
        let mut cursor = addr;
        let end = match addr.checked_add(len) {
            Some(e) => e,
            None => return false,
        };
        while cursor < end {
            match self.find(cursor) {
                Some(v) if v.kind != VmaKind::Guard && v.prot.contains(required) => {
                    cursor = v.end;
                }
                _ => return false,
            }
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vma> {
        self.vmas.iter()
    }

    pub fn count(&self) -> usize {
        self.vmas.len()
    }

    pub fn clear(&mut self) {
        self.vmas.clear();
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn add_keeps_sorted_order() {
        let mut l = VmaList::new();
        l.add(0x3000, 0x4000, Prot::READ, VmaKind::Anonymous).unwrap();
        l.add(0x1000, 0x2000, Prot::READ, VmaKind::Anonymous).unwrap();
        l.add(0x5000, 0x6000, Prot::READ, VmaKind::Anonymous).unwrap();
        let starts: Vec<u64> = l.iter().map(|v| v.start).collect();
        assert_eq!(starts, vec![0x1000, 0x3000, 0x5000]);
    }

    #[test]
    fn overlap_is_rejected() {
        let mut l = VmaList::new();
        l.add(0x1000, 0x3000, Prot::READ, VmaKind::Anonymous).unwrap();
        assert_eq!(
            l.add(0x2000, 0x4000, Prot::READ, VmaKind::Anonymous),
            Err(VError::Exists)
        );
        // Adjacent is fine (half-open ranges).
        l.add(0x3000, 0x4000, Prot::READ, VmaKind::Anonymous).unwrap();
    }

    #[test]
    fn misaligned_is_rejected() {
        let mut l = VmaList::new();
        assert_eq!(
            l.add(0x1001, 0x2000, Prot::READ, VmaKind::Anonymous),
            Err(VError::InvalidArg)
        );
        assert_eq!(
            l.add(0x2000, 0x2000, Prot::READ, VmaKind::Anonymous),
            Err(VError::InvalidArg)
        );
    }

    #[test]
    fn find_hits_containing_region() {
        let mut l = VmaList::new();
        l.add(0x1000, 0x3000, Prot::READ | Prot::WRITE, VmaKind::Stack)
            .unwrap();
        assert!(l.find(0x1000).is_some());
        assert!(l.find(0x2FFF).is_some());
        assert!(l.find(0x3000).is_none());
        assert!(l.find(0x0FFF).is_none());
    }

    #[test]
    fn covers_spans_adjacent_vmas() {
        let mut l = VmaList::new();
        l.add(0x1000, 0x2000, Prot::READ, VmaKind::Anonymous).unwrap();
        l.add(0x2000, 0x3000, Prot::READ, VmaKind::Anonymous).unwrap();
        assert!(l.covers(0x1800, 0x1000, Prot::READ));
        assert!(!l.covers(0x2800, 0x1000, Prot::READ)); // runs past 0x3000
        assert!(!l.covers(0x1800, 0x1000, Prot::WRITE)); // wrong prot
    }

    #[test]
    fn guard_regions_never_satisfy_covers() {
        let mut l = VmaList::new();
        l.add(0x1000, 0x2000, Prot::READ | Prot::WRITE, VmaKind::Guard)
            .unwrap();
        assert!(!l.covers(0x1000, 8, Prot::READ));
        assert!(l.find(0x1800).is_some());
    }

    #[test]
    fn remove_range_drops_contained_only() {
        let mut l = VmaList::new();
        l.add(0x1000, 0x2000, Prot::READ, VmaKind::Anonymous).unwrap();
        l.add(0x2000, 0x3000, Prot::READ, VmaKind::Anonymous).unwrap();
        l.add(0x4000, 0x8000, Prot::READ, VmaKind::Anonymous).unwrap();
        l.remove_range(0x1000, 0x3000);
        assert_eq!(l.count(), 1);
        assert!(l.find(0x4000).is_some());
    }
}
