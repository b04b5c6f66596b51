//! Memory management: physical frames, translation tables, address spaces,
//! VMAs, fault handling, and the kernel heap.

pub mod addrspace;
pub mod fault;
pub mod heap;
pub mod pmm;
pub mod vma;
pub mod vmm;
