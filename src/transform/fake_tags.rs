//! Reserved synthetic tags and the fake-tag allocator for anonymous code.
//!
//! Raw anonymous-code addresses are not stable or comparable across runs, so the
//! transformer remaps them through a monotonic synthetic allocator. A small tag
//! range is reserved by contract for fixed synthetic nodes - real code addresses
//! never produce these values.

use std::collections::HashMap;

/// Tag of the process-entry singleton, pre-registered per process.
pub const PROCESS_ENTRY_TAG: u32 = 1;
/// Tag of the system singleton, pre-registered per process.
pub const SYSTEM_SINGLETON_TAG: u32 = 2;
/// Tag of the child-process singleton, pre-registered per process.
pub const CHILD_PROCESS_TAG: u32 = 3;

/// Content hash of the system singleton; a reachability anchor.
pub const SYSTEM_SINGLETON_HASH: u64 = 1;
/// Content hash of the process-entry singleton.
pub const PROCESS_ENTRY_HASH: u64 = 2;
/// Content hash of the child-process singleton; a reachability anchor.
pub const CHILD_PROCESS_HASH: u64 = 3;

/// First tag of the per-syscall singleton range.
pub const SYSCALL_SINGLETON_START: u32 = 0x10;
/// Number of tags reserved for syscall singletons.
pub const MAX_SYSCALL_COUNT: u32 = 0x1A0;
/// First tag available to the fake-tag allocator, just above the reserved
/// syscall-singleton range.
pub const FAKE_TAG_BASE: u32 = SYSCALL_SINGLETON_START + MAX_SYSCALL_COUNT;

/// Returns the reserved singleton tag for a system call number, if in range.
#[must_use]
pub fn syscall_singleton_tag(sysnum: u32) -> Option<u32> {
    (sysnum < MAX_SYSCALL_COUNT).then(|| SYSCALL_SINGLETON_START + sysnum)
}

/// Remaps unstable anonymous-code tags onto a stable synthetic range.
///
/// Within one raw trace the same raw tag always receives the same synthetic tag;
/// allocation is monotonic starting at [`FAKE_TAG_BASE`].
#[derive(Debug, Default)]
pub struct FakeTagAllocator {
    assigned: HashMap<u32, u32>,
    next: u32,
}

impl FakeTagAllocator {
    /// Creates an allocator starting at [`FAKE_TAG_BASE`].
    #[must_use]
    pub fn new() -> Self {
        FakeTagAllocator {
            assigned: HashMap::new(),
            next: FAKE_TAG_BASE,
        }
    }

    /// Returns the synthetic tag for `raw_tag`, allocating on first sight.
    pub fn allocate(&mut self, raw_tag: u32) -> u32 {
        if let Some(tag) = self.assigned.get(&raw_tag) {
            return *tag;
        }
        let tag = self.next;
        self.next += 1;
        self.assigned.insert(raw_tag, tag);
        tag
    }

    /// Returns the number of distinct raw tags seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    /// Returns `true` if no tags have been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_memoized_and_monotonic() {
        let mut allocator = FakeTagAllocator::new();
        let first = allocator.allocate(0xDEAD_0000);
        let second = allocator.allocate(0xBEEF_0000);
        assert_eq!(first, FAKE_TAG_BASE);
        assert_eq!(second, FAKE_TAG_BASE + 1);
        assert_eq!(allocator.allocate(0xDEAD_0000), first);
        assert_eq!(allocator.len(), 2);
    }

    #[test]
    fn test_fake_tags_clear_reserved_ranges() {
        let mut allocator = FakeTagAllocator::new();
        let tag = allocator.allocate(0x1234);
        assert!(tag > CHILD_PROCESS_TAG);
        assert!(tag >= SYSCALL_SINGLETON_START + MAX_SYSCALL_COUNT);
    }

    #[test]
    fn test_syscall_singleton_range() {
        assert_eq!(syscall_singleton_tag(0), Some(SYSCALL_SINGLETON_START));
        assert_eq!(
            syscall_singleton_tag(MAX_SYSCALL_COUNT - 1),
            Some(SYSCALL_SINGLETON_START + MAX_SYSCALL_COUNT - 1)
        );
        assert_eq!(syscall_singleton_tag(MAX_SYSCALL_COUNT), None);
    }
}
