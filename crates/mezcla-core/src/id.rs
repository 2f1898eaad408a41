//! Stable external identifiers.

use core::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub u32);

        impl $name {
            /// Returns the raw id value.
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifies a source within its context.
    SourceId
);
define_id!(
    /// Identifies a buffer. Id 0 means "no buffer".
    BufferId
);
define_id!(
    /// Identifies a context.
    ContextId
);

impl BufferId {
    /// The "no buffer" placeholder.
    pub const NONE: BufferId = BufferId(0);

    /// Returns true for the placeholder id.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// A source reference as seen from a buffer: sources are unique per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceKey {
    /// Owning context.
    pub context: ContextId,
    /// Source within that context.
    pub source: SourceId,
}

impl SourceKey {
    /// Creates a key.
    pub const fn new(context: ContextId, source: SourceId) -> Self {
        Self { context, source }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.context, self.source)
    }
}
