//! Paging defaults for range queries.

use serde::Deserialize;

/// Default number of records per page.
pub const DEFAULT_PER_PAGE: usize = 20;

/// Default multiplier applied to `per_page` when querying raw records.
pub const DEFAULT_OVERFETCH_FACTOR: usize = 2;

/// Multiplier for entity-list lookups, whose filters reject more records.
pub const DEFAULT_ENTITY_LIST_OVERFETCH_FACTOR: usize = 3;

/// Largest page a caller may request.
pub const DEFAULT_MAX_PER_PAGE: usize = 500;

/// Paging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size used when the request carries none.
    ///
    /// Also assumed for legacy tokens, which do not record a page size.
    pub default_per_page: usize,

    /// Upper bound on requested page sizes.
    pub max_per_page: usize,

    /// Raw records fetched per store query, as a multiple of `per_page`.
    ///
    /// Default: 2. Absorbs records rejected by post-query filters.
    pub overfetch_factor: usize,

    /// Overfetch multiple for entity-list lookups.
    ///
    /// Default: 3.
    pub entity_list_overfetch_factor: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: DEFAULT_MAX_PER_PAGE,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            entity_list_overfetch_factor: DEFAULT_ENTITY_LIST_OVERFETCH_FACTOR,
        }
    }
}

impl PaginationConfig {
    /// Clamp a requested page size into `1..=max_per_page`.
    pub fn clamp_per_page(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_per_page)
            .clamp(1, self.max_per_page.max(1))
    }
}
