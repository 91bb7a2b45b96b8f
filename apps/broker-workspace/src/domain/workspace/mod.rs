//! Workspace Registry
//!
//! Named store of the live objects bound to the current session.
//!
//! # Design
//!
//! The registry tracks:
//! - A mapping from name to bound value
//! - A sorted index of bound names (`symbols`) used for display
//!
//! A name is present in the mapping iff it is present in the index.
//! Registration is first-writer-wins: re-assigning a bound name is a no-op,
//! so repeated subscription attempts never replace a live binding.

use std::collections::HashMap;

// =============================================================================
// Types
// =============================================================================

/// A workspace entry name (contract symbol or feed name).
pub type Name = String;

/// A value that can be bound into the workspace.
pub trait Binding: Clone {
    /// Error produced when cancelling the value's live subscriptions.
    type Error;

    /// Cancel the live subscriptions held by this value.
    ///
    /// Returns `None` when the value has nothing to cancel.
    fn cancel(&self) -> Option<Result<(), Self::Error>>;
}

/// Outcome of [`Workspace::free`].
#[derive(Debug)]
pub enum Freed<E> {
    /// The name was not bound.
    Unbound,
    /// The binding was removed. Carries the cancellation result, if the
    /// value exposed one.
    Removed(Option<Result<(), E>>),
}

// =============================================================================
// Workspace
// =============================================================================

/// Ordered name to value registry.
///
/// # Example
///
/// ```rust
/// use broker_workspace::domain::workspace::{Binding, Workspace};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Plain(u32);
///
/// impl Binding for Plain {
///     type Error = ();
///     fn cancel(&self) -> Option<Result<(), ()>> {
///         None
///     }
/// }
///
/// let mut workspace = Workspace::new();
/// workspace.assign("MSFT", Plain(1)).assign("AAPL", Plain(2));
///
/// // First registration wins
/// workspace.assign("MSFT", Plain(3));
/// assert_eq!(workspace.get("MSFT"), Some(&Plain(1)));
///
/// // Index is kept sorted
/// assert_eq!(workspace.symbols(), ["AAPL", "MSFT"]);
/// ```
#[derive(Debug, Clone)]
pub struct Workspace<V> {
    entries: HashMap<Name, V>,
    symbols: Vec<Name>,
}

impl<V> Default for Workspace<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Workspace<V> {
    /// Create an empty workspace.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            symbols: Vec::new(),
        }
    }

    /// Bind `value` under `name` unless the name is already bound.
    pub fn assign(&mut self, name: impl Into<Name>, value: V) -> &mut Self {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return self;
        }

        if let Err(pos) = self.symbols.binary_search(&name) {
            self.symbols.insert(pos, name.clone());
        }
        self.entries.insert(name, value);
        self
    }

    /// Look up a binding.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(name)
    }

    /// Check whether a name is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Bound names in sorted order.
    #[must_use]
    pub fn symbols(&self) -> &[Name] {
        &self.symbols
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the workspace has no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate bindings in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.symbols
            .iter()
            .filter_map(|name| self.entries.get(name).map(|v| (name.as_str(), v)))
    }

    /// Drop every binding without cancelling anything.
    ///
    /// Used on session teardown, where the session owns its feeds.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.symbols.clear();
    }

    /// Remove a binding without cancelling it.
    pub fn remove(&mut self, name: &str) -> Option<V> {
        let value = self.entries.remove(name)?;
        if let Ok(pos) = self.symbols.binary_search_by(|s| s.as_str().cmp(name)) {
            self.symbols.remove(pos);
        }
        Some(value)
    }
}

impl<V: Binding> Workspace<V> {
    /// Cancel and remove a binding.
    ///
    /// The binding is removed even when cancellation fails; the failure is
    /// handed back to the caller.
    pub fn free(&mut self, name: &str) -> Freed<V::Error> {
        let Some(value) = self.entries.get(name) else {
            return Freed::Unbound;
        };

        let cancelled = value.cancel();
        self.remove(name);
        Freed::Removed(cancelled)
    }
}

// =============================================================================
// Tests
// =============================================================================
