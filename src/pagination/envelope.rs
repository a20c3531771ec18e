//! Page envelope returned to transport callers.

use serde::Serialize;

/// Paging metadata shown alongside a page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    pub page: u32,
    pub previous_page: Option<u32>,
    pub next_page: Option<u32>,
    pub total_records: Option<u64>,
    pub pages: Option<u64>,
    pub per_page: usize,
    /// 1-based index of the first record on the page; 0 when empty.
    pub from: u64,
    /// 1-based index of the last record on the page; 0 when empty.
    pub to: u64,
    pub pagination_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageEnvelope<T> {
    pub data: Vec<T>,
    pub metadata: PageMetadata,
}

impl<T> PageEnvelope<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageEnvelope<U> {
        PageEnvelope {
            data: self.data.into_iter().map(f).collect(),
            metadata: self.metadata,
        }
    }
}

pub fn format_page<T>(
    items: Vec<T>,
    current_page: u32,
    per_page: usize,
    next_token: Option<String>,
    total_records: Option<u64>,
) -> PageEnvelope<T> {
    let per_page_u64 = per_page.max(1) as u64;
    let pages = total_records.map(|total| {
        if total == 0 {
            1
        } else {
            total.div_ceil(per_page_u64)
        }
    });

    let (from, to) = if items.is_empty() {
        (0, 0)
    } else {
        let from = u64::from(current_page.saturating_sub(1))
            .saturating_mul(per_page_u64)
            .saturating_add(1);
        (from, from.saturating_add(items.len() as u64 - 1))
    };

    PageEnvelope {
        metadata: PageMetadata {
            page: current_page,
            previous_page: (current_page > 1).then(|| current_page - 1),
            next_page: next_token
                .as_ref()
                .and_then(|_| current_page.checked_add(1)),
            total_records,
            pages,
            per_page,
            from,
            to,
            pagination_token: next_token,
        },
        data: items,
    }
}
