//! Raw-trace batch transformation.
//!
//! A raw per-process execution trace carries every unit's activity interleaved
//! in one stream, with anonymous code under unstable address-derived tags. The
//! [`RawGraphTransformer`] redistributes such a trace into the per-unit stream
//! files the graph loader consumes, synthesizing boundary nodes at unit
//! crossings, remapping anonymous tags through the [`FakeTagAllocator`], and
//! merge-joining the edge-correlated metadata queues onto the output edge
//! tables.

mod fake_tags;
mod raw_transformer;

pub use fake_tags::{
    syscall_singleton_tag, FakeTagAllocator, CHILD_PROCESS_HASH, CHILD_PROCESS_TAG,
    FAKE_TAG_BASE, MAX_SYSCALL_COUNT, PROCESS_ENTRY_HASH, PROCESS_ENTRY_TAG,
    SYSCALL_SINGLETON_START, SYSTEM_SINGLETON_HASH, SYSTEM_SINGLETON_TAG,
};
pub use raw_transformer::{RawGraphTransformer, TransformStats};
