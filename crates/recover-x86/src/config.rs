//! Resolver configuration.

/// Settings for one or more jump-table queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Address width given to every memory node.
    pub address_bits: u32,
    /// Largest number of table entries a query may enumerate.
    pub max_entries: Option<u64>,
    /// Render the expression tree at trace level after each rewrite.
    pub dump_tree: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            address_bits: 64,
            max_entries: None,
            dump_tree: false,
        }
    }
}

impl ResolverConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Address width of memory nodes.
    #[must_use]
    pub const fn with_address_bits(mut self, bits: u32) -> Self {
        self.address_bits = bits;
        self
    }

    /// Fail queries whose bound admits more than `limit` entries.
    #[must_use]
    pub const fn with_max_entries(mut self, limit: u64) -> Self {
        self.max_entries = Some(limit);
        self
    }

    /// Trace the expression tree after each rewrite.
    #[must_use]
    pub const fn with_dump_tree(mut self, dump: bool) -> Self {
        self.dump_tree = dump;
        self
    }
}
