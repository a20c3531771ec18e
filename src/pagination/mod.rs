//! Cursor pagination over range queries.
//!
//! Clients page through a partition with an opaque token that wraps the
//! store's continuation key together with the page number, total record
//! count and page size of the session, so every page reports consistent
//! metadata without recounting.

mod envelope;
mod paginator;
mod token;

pub use envelope::{format_page, PageEnvelope, PageMetadata};
pub use paginator::{FetchedPage, PageRequest, Paginator, RecordFilter};
pub use token::{PageToken, TokenError};

impl FetchedPage {
    /// Format into an envelope after mapping each record.
    pub fn into_envelope<T>(self, f: impl FnMut(crate::storage::Record) -> T) -> PageEnvelope<T> {
        format_page(
            self.items.into_iter().map(f).collect(),
            self.current_page,
            self.per_page,
            self.next_token,
            self.total_records,
        )
    }

    /// Like [`FetchedPage::into_envelope`], stopping at the first mapping error.
    pub fn try_into_envelope<T, E>(
        self,
        f: impl FnMut(crate::storage::Record) -> Result<T, E>,
    ) -> Result<PageEnvelope<T>, E> {
        let data = self.items.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(format_page(
            data,
            self.current_page,
            self.per_page,
            self.next_token,
            self.total_records,
        ))
    }
}
