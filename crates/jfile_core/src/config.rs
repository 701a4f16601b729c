//! Reader configuration.

/// What to do with an integrity problem in a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityPolicy {
    /// Attach the issue to the returned value, log it, keep going.
    #[default]
    Report,
    /// Fail the operation with [`CoreError::Integrity`](crate::CoreError::Integrity).
    Strict,
}

/// What a linear scan does with an object whose type tag is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownObjectPolicy {
    /// Stop with [`FormatError::UnknownObjectType`](crate::FormatError::UnknownObjectType).
    #[default]
    Abort,
    /// Step over the object using its declared size.
    Skip,
}

/// Configuration for opening a journal.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Lenient or strict handling of integrity issues.
    pub integrity: IntegrityPolicy,

    /// Whether to check each entry's `xor_hash`.
    pub verify_xor: bool,

    /// Handling of unknown object types during scans.
    pub unknown_objects: UnknownObjectPolicy,

    /// Whether decoded objects are kept in the offset cache.
    pub cache_objects: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            integrity: IntegrityPolicy::Report,
            verify_xor: true,
            unknown_objects: UnknownObjectPolicy::Abort,
            cache_objects: true,
        }
    }
}

impl ReaderConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the integrity policy.
    #[must_use]
    pub const fn integrity(mut self, policy: IntegrityPolicy) -> Self {
        self.integrity = policy;
        self
    }

    /// Shorthand for `integrity(IntegrityPolicy::Strict)`.
    #[must_use]
    pub const fn strict(self) -> Self {
        self.integrity(IntegrityPolicy::Strict)
    }

    /// Sets whether entry XOR hashes are verified.
    #[must_use]
    pub const fn verify_xor(mut self, value: bool) -> Self {
        self.verify_xor = value;
        self
    }

    /// Sets the unknown-object policy.
    #[must_use]
    pub const fn unknown_objects(mut self, policy: UnknownObjectPolicy) -> Self {
        self.unknown_objects = policy;
        self
    }

    /// Sets whether decoded objects are cached.
    #[must_use]
    pub const fn cache_objects(mut self, value: bool) -> Self {
        self.cache_objects = value;
        self
    }

    /// Checks if integrity issues abort.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        matches!(self.integrity, IntegrityPolicy::Strict)
    }
}
