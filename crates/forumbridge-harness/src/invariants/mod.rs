//! Invariant checking for the Identity Store.
//!
//! Invariants are properties that must hold after any sequence of handled
//! events, whatever order they arrived in. Tests capture a
//! [`StoreSnapshot`] after driving the bridge and run the registered
//! [`Invariant`] checks against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = StoreSnapshot::from_memory(&store)?;
//! registry.assert_all(&snapshot, "after duplicate delivery");
//! ```

mod checks;
mod snapshot;

pub use checks::{BindingBijection, BindingsUseTopics, PairRoundTrip, UniqueForumKeys};
pub use snapshot::StoreSnapshot;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// What went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a store snapshot.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant.
    fn check(&self, state: &StoreSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every store invariant:
    ///
    /// - [`PairRoundTrip`]: both lookups return the stored pair
    /// - [`UniqueForumKeys`]: no two pairs share a Network-B identity
    /// - [`BindingBijection`]: conversations and topics pair up one to one
    /// - [`BindingsUseTopics`]: nothing is bound to the General thread
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(PairRoundTrip);
        registry.add(UniqueForumKeys);
        registry.add(BindingBijection);
        registry.add(BindingsUseTopics);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Run every invariant and collect all violations.
    pub fn check_all(&self, state: &StoreSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Fail the calling test on any violation.
    pub fn assert_all(&self, state: &StoreSnapshot, context: &str) {
        let violations = self.check_all(state).err().unwrap_or_default();
        let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
        assert!(messages.is_empty(), "Invariant violation {context}:\n  {}", messages.join("\n  "));
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
