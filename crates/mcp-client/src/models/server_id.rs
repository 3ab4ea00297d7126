//! Non-owning back-reference to a registered server.

use std::fmt;

/// An index into the aggregator's server slab (spec.md §9: "Cross-referenced
/// graphs (Tool → Server → Client)... store servers in a slab and reference
/// them by index"). Cheap to copy, carries no lifetime, and never keeps a
/// server alive on its own — only the `McpClient` that created it owns the
/// actual `McpServer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(pub(crate) usize);

impl ServerId {
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server#{}", self.0)
    }
}
