//! Software-unit registry and cross-module hash label tables.
//!
//! The registry is the engine's view of the monitored software distribution: which
//! modules (units) exist, which hash labels identify their anonymous-code entry and
//! exit points, and which hashes map to system call numbers. It replaces the mutable
//! global registries of earlier designs with an explicitly constructed object that is
//! built once at startup and treated as read-only for the remainder of the process.
//!
//! # Initialization Order
//!
//! 1. Register every unit with [`ModuleRegistry::register_unit`] (module-list order
//!    matters for trace decoding, see [`crate::trace::ModuleList`]).
//! 2. Register hash labels and syscall hashes.
//! 3. Hand the registry by reference to loaders, partitioners and transformers.
//!
//! Lookup tables are [`dashmap`]-backed so concurrent read-only passes (e.g. parallel
//! validation) can resolve hashes without locking.

use dashmap::DashMap;

/// Identifies one software unit (module) within a [`ModuleRegistry`].
///
/// `ModuleId` is a small copyable index; the registry maps it back to the full
/// [`ModuleUnit`]. Node keys embed `ModuleId` rather than unit names so key
/// comparison stays cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(
    /// Raw registry index; [`ModuleId::ANONYMOUS`] is reserved.
    pub u16,
);

impl ModuleId {
    /// The pseudo-unit owning dynamically generated (anonymous) code.
    ///
    /// Anonymous code has no backing image on disk; its nodes carry synthetic tags
    /// and its content hashes are not reliable identity signals.
    pub const ANONYMOUS: ModuleId = ModuleId(u16::MAX);

    /// Returns `true` if this is the anonymous pseudo-unit.
    #[must_use]
    pub fn is_anonymous(self) -> bool {
        self == Self::ANONYMOUS
    }

    /// Returns the raw index value.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One software unit (module) of the monitored distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleUnit {
    /// Registry identifier of this unit.
    pub id: ModuleId,
    /// Filename-derived unit name, unique within the distribution.
    pub name: String,
}

impl ModuleUnit {
    /// Returns `true` if two units refer to the same distributed module, which is
    /// the unit-equivalence used by module-relative node comparison.
    #[must_use]
    pub fn is_equivalent(&self, other: &ModuleUnit) -> bool {
        self.name == other.name
    }
}

/// Classifies what a cross-module hash label denotes.
///
/// Labels fall into two families that the anonymous-graph ownership resolver treats
/// differently: gencode labels mark links created by a code *generator* writing or
/// re-protecting code (unreliable for ownership, since JIT engines are shared
/// infrastructure), while execution labels mark genuine control-flow entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum HashLabelKind {
    /// A code generator wrote into the target region.
    GencodeWrite,
    /// A code generator changed permissions on the target region.
    GencodePerm,
    /// A registered callback into generated code.
    Callback,
    /// An intercepted (hooked) control transfer.
    Interception,
    /// An exported entry point invoked across modules.
    Export,
}

impl HashLabelKind {
    /// Returns `true` for labels created by code generation rather than execution.
    #[must_use]
    pub fn is_gencode(self) -> bool {
        matches!(self, HashLabelKind::GencodeWrite | HashLabelKind::GencodePerm)
    }
}

/// A decoded cross-module hash label.
///
/// Boundary nodes carry 64-bit label hashes; the registry maps each hash back to the
/// participating modules and the label kind. Labels are registered from distribution
/// configuration before any trace is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashLabel {
    /// The 64-bit label hash as it appears on boundary nodes.
    pub hash: u64,
    /// What the label denotes.
    pub kind: HashLabelKind,
    /// The unit on the outside of the boundary (caller / writer).
    pub from_module: ModuleId,
    /// The unit on the inside, when the label names one.
    pub to_module: Option<ModuleId>,
}

/// Computes the stable 64-bit hash of a textual label.
///
/// FNV-1a over the label bytes. Trace writers and the registry must agree on this
/// function for boundary hashes to resolve.
#[must_use]
pub fn label_hash(label: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in label.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Registry of software units and their cross-module hash labels.
///
/// Built once at startup, read-only afterwards. All mutating methods take `&mut self`
/// so the type system enforces the initialization-order contract: once the registry
/// is shared by reference, no further registration is possible.
///
/// # Examples
///
/// ```rust
/// use tracegraph::registry::{HashLabel, HashLabelKind, ModuleRegistry, label_hash};
///
/// let mut registry = ModuleRegistry::new();
/// let app = registry.register_unit("app.exe");
/// let jit = registry.register_unit("jitengine.dll");
///
/// let hash = label_hash("jitengine.dll!gencode-write");
/// registry.register_gencode_label(HashLabel {
///     hash,
///     kind: HashLabelKind::GencodeWrite,
///     from_module: jit,
///     to_module: None,
/// });
///
/// assert_eq!(registry.unit_by_name("app.exe").map(|u| u.id), Some(app));
/// assert!(registry.gencode_label(hash).is_some());
/// ```
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    units: Vec<ModuleUnit>,
    by_name: DashMap<String, ModuleId>,
    anonymous_entry_labels: DashMap<u64, HashLabel>,
    anonymous_exit_labels: DashMap<u64, HashLabel>,
    gencode_labels: DashMap<u64, HashLabel>,
    interception_labels: DashMap<u64, HashLabel>,
    syscall_numbers: DashMap<u64, u32>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a unit by name, or returns the existing id if already present.
    ///
    /// Registration order defines the unit's `ModuleId` and must match the
    /// module-index order of the traces being loaded.
    pub fn register_unit(&mut self, name: &str) -> ModuleId {
        if let Some(existing) = self.by_name.get(name) {
            return *existing;
        }

        let id = ModuleId(u16::try_from(self.units.len()).unwrap_or(u16::MAX - 1));
        self.units.push(ModuleUnit {
            id,
            name: name.to_string(),
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Returns the unit registered under `name`, if any.
    #[must_use]
    pub fn unit_by_name(&self, name: &str) -> Option<&ModuleUnit> {
        self.by_name.get(name).map(|id| &self.units[id.index()])
    }

    /// Returns the unit for `id`, if it was registered.
    ///
    /// [`ModuleId::ANONYMOUS`] has no backing unit and resolves to `None`.
    #[must_use]
    pub fn unit(&self, id: ModuleId) -> Option<&ModuleUnit> {
        if id.is_anonymous() {
            return None;
        }
        self.units.get(id.index())
    }

    /// Returns the display name of a unit, including the anonymous pseudo-unit.
    #[must_use]
    pub fn unit_name(&self, id: ModuleId) -> &str {
        if id.is_anonymous() {
            return "<anonymous>";
        }
        self.units
            .get(id.index())
            .map_or("<unknown>", |unit| unit.name.as_str())
    }

    /// Returns the number of registered units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Iterates all registered units in registration order.
    pub fn units(&self) -> impl Iterator<Item = &ModuleUnit> {
        self.units.iter()
    }

    /// Registers a label identifying an anonymous-code entry point.
    pub fn register_anonymous_entry_label(&mut self, label: HashLabel) {
        self.anonymous_entry_labels.insert(label.hash, label);
    }

    /// Registers a label identifying an anonymous-code exit point.
    pub fn register_anonymous_exit_label(&mut self, label: HashLabel) {
        self.anonymous_exit_labels.insert(label.hash, label);
    }

    /// Registers a gencode (write/perm) label.
    pub fn register_gencode_label(&mut self, label: HashLabel) {
        self.gencode_labels.insert(label.hash, label);
    }

    /// Registers an interception label.
    pub fn register_interception_label(&mut self, label: HashLabel) {
        self.interception_labels.insert(label.hash, label);
    }

    /// Registers the hash under which a system call number appears in traces.
    pub fn register_syscall_hash(&mut self, hash: u64, sysnum: u32) {
        self.syscall_numbers.insert(hash, sysnum);
    }

    /// Looks up an anonymous-entry label by boundary hash.
    #[must_use]
    pub fn anonymous_entry_label(&self, hash: u64) -> Option<HashLabel> {
        self.anonymous_entry_labels
            .get(&hash)
            .map(|label| label.value().clone())
    }

    /// Looks up an anonymous-exit label by boundary hash.
    #[must_use]
    pub fn anonymous_exit_label(&self, hash: u64) -> Option<HashLabel> {
        self.anonymous_exit_labels
            .get(&hash)
            .map(|label| label.value().clone())
    }

    /// Looks up a gencode label by boundary hash.
    #[must_use]
    pub fn gencode_label(&self, hash: u64) -> Option<HashLabel> {
        self.gencode_labels
            .get(&hash)
            .map(|label| label.value().clone())
    }

    /// Looks up an interception label by boundary hash.
    #[must_use]
    pub fn interception_label(&self, hash: u64) -> Option<HashLabel> {
        self.interception_labels
            .get(&hash)
            .map(|label| label.value().clone())
    }

    /// Resolves the system call number recorded under `hash`, if any.
    #[must_use]
    pub fn syscall_number(&self, hash: u64) -> Option<u32> {
        self.syscall_numbers.get(&hash).map(|entry| *entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unit_is_idempotent() {
        let mut registry = ModuleRegistry::new();
        let a = registry.register_unit("app.exe");
        let b = registry.register_unit("app.exe");
        assert_eq!(a, b);
        assert_eq!(registry.unit_count(), 1);
    }

    #[test]
    fn test_unit_ids_follow_registration_order() {
        let mut registry = ModuleRegistry::new();
        let first = registry.register_unit("first.dll");
        let second = registry.register_unit("second.dll");
        assert_eq!(first, ModuleId(0));
        assert_eq!(second, ModuleId(1));
    }

    #[test]
    fn test_anonymous_unit_resolution() {
        let registry = ModuleRegistry::new();
        assert!(registry.unit(ModuleId::ANONYMOUS).is_none());
        assert_eq!(registry.unit_name(ModuleId::ANONYMOUS), "<anonymous>");
        assert!(ModuleId::ANONYMOUS.is_anonymous());
    }

    #[test]
    fn test_label_hash_is_stable() {
        assert_eq!(label_hash("abc"), label_hash("abc"));
        assert_ne!(label_hash("abc"), label_hash("abd"));
    }

    #[test]
    fn test_label_lookup() {
        let mut registry = ModuleRegistry::new();
        let jit = registry.register_unit("jit.dll");
        let hash = label_hash("jit.dll!gencode-write");
        registry.register_gencode_label(HashLabel {
            hash,
            kind: HashLabelKind::GencodeWrite,
            from_module: jit,
            to_module: None,
        });

        let label = registry.gencode_label(hash).unwrap();
        assert_eq!(label.from_module, jit);
        assert!(label.kind.is_gencode());
        assert!(registry.gencode_label(hash ^ 1).is_none());
    }

    #[test]
    fn test_syscall_hash_lookup() {
        let mut registry = ModuleRegistry::new();
        registry.register_syscall_hash(0x40, 64);
        assert_eq!(registry.syscall_number(0x40), Some(64));
        assert_eq!(registry.syscall_number(0x41), None);
    }
}
