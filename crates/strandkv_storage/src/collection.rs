//! Collection handle types.

use std::fmt;

/// Engine-assigned identifier for an opened collection.
///
/// Ids are never reused: reopening a dropped collection yields a new id,
/// which is what makes older handles detectably stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(pub u32);

impl CollectionId {
    /// Creates a new collection ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col:{}", self.0)
    }
}

/// Options used when opening a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Whether a key may hold several sorted values.
    pub dupsort: bool,
}

impl CollectionOptions {
    /// Creates default options (one value per key).
    #[must_use]
    pub const fn new() -> Self {
        Self { dupsort: false }
    }

    /// Sets whether the collection keeps duplicate values per key.
    #[must_use]
    pub const fn dupsort(mut self, value: bool) -> Self {
        self.dupsort = value;
        self
    }
}

/// A handle to an opened collection.
///
/// Handles are cheap to clone. A handle stays usable until its collection
/// is dropped, or until the transaction that created it is aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    name: Option<String>,
    id: CollectionId,
    dupsort: bool,
}

impl CollectionHandle {
    /// Creates a handle. Only engines mint handles.
    #[must_use]
    pub fn new(name: Option<&str>, id: CollectionId, dupsort: bool) -> Self {
        Self {
            name: name.map(str::to_owned),
            id,
            dupsort,
        }
    }

    /// Returns the collection name, `None` for the default collection.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the engine-assigned id.
    #[must_use]
    pub fn id(&self) -> CollectionId {
        self.id
    }

    /// Returns whether the collection keeps duplicate values per key.
    #[must_use]
    pub fn is_dupsort(&self) -> bool {
        self.dupsort
    }
}

impl fmt::Display for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}@{}", self.id),
            None => write!(f, "<default>@{}", self.id),
        }
    }
}
