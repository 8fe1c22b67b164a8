//! # Pagination / Load-more State Machine
//!
//! Every collection pipeline owns one [`PaginationCursor`]. It answers two
//! questions for the pipeline:
//!
//! - which page parameter a trigger should fetch (or whether it should fetch
//!   at all), and
//! - what to do with the response once it arrives (replace the visible page,
//!   append to it, or ignore an out-of-range page).
//!
//! | from | event | to |
//! |------|-------|----|
//! | any | `begin_replace` | `FetchingReplace` |
//! | `Idle` (load-more mode) | `begin_append` | `FetchingAppend` |
//! | `LastPageReached` | `begin_append` | unchanged, no fetch |
//! | fetching | `complete` on the last page | `LastPageReached` |
//! | fetching | `complete` otherwise | `Idle` |
//!
//! The cursor is only updated by successful responses; [`PaginationCursor::fail`]
//! leaves the last known metadata untouched.

use serde::{Deserialize, Serialize};

/// Pagination metadata reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub per_page: u64,
    pub current_page: u64,
    pub total: u64,
}

impl PageMeta {
    /// `ceil(total / per_page)`; zero pages for an empty collection.
    pub fn page_count(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page)
    }

    pub fn is_last_page(&self) -> bool {
        self.page_count() <= self.current_page
    }

    /// Whether `current_page` lies within the collection (the last page included).
    pub fn in_range(&self) -> bool {
        self.current_page <= self.page_count()
    }
}

/// Observable state of a collection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagerState {
    #[default]
    Idle,
    FetchingReplace,
    FetchingAppend,
    LastPageReached,
}

/// How a successful response must be merged into the visible page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Show the response items on their own.
    Replace,
    /// Show the previously visible items followed by the response items.
    Append,
    /// The response page lies beyond the end; keep what is visible.
    OutOfRange,
}

#[derive(Debug, Clone, Default)]
pub struct PaginationCursor {
    load_more: bool,
    last_meta: Option<PageMeta>,
    is_last_page: bool,
    state: PagerState,
}

impl PaginationCursor {
    pub fn new(load_more: bool) -> Self {
        Self {
            load_more,
            ..Self::default()
        }
    }

    pub fn state(&self) -> PagerState {
        self.state
    }

    pub fn is_last_page(&self) -> bool {
        self.is_last_page
    }

    pub fn last_meta(&self) -> Option<&PageMeta> {
        self.last_meta.as_ref()
    }

    pub fn is_load_more(&self) -> bool {
        self.load_more
    }

    /// Starts a replacing fetch and returns the page parameter to send.
    ///
    /// Always resets the cursor first. `None` means "let the server pick"
    /// (non-load-more mode); load-more mode starts again at page 1.
    pub fn begin_replace(&mut self) -> Option<u64> {
        self.last_meta = None;
        self.is_last_page = false;
        self.state = PagerState::FetchingReplace;
        self.load_more.then_some(1)
    }

    /// Starts an appending fetch, or returns `None` when no fetch must happen:
    /// outside load-more mode, on the last page, or while a fetch is in flight.
    pub fn begin_append(&mut self) -> Option<u64> {
        if !self.load_more || self.state != PagerState::Idle {
            return None;
        }
        let next = self
            .last_meta
            .map_or(0, |meta| meta.current_page)
            .saturating_add(1);
        self.state = PagerState::FetchingAppend;
        Some(next)
    }

    /// Records a successful response.
    pub fn complete(&mut self, meta: Option<PageMeta>) -> Completion {
        let appending = self.state == PagerState::FetchingAppend;

        let Some(meta) = meta else {
            // A load-more collection that stops reporting pagination cannot be
            // paged further.
            self.is_last_page = self.load_more;
            self.state = if self.is_last_page {
                PagerState::LastPageReached
            } else {
                PagerState::Idle
            };
            return if appending {
                Completion::Append
            } else {
                Completion::Replace
            };
        };

        self.is_last_page = meta.is_last_page();
        self.state = if self.is_last_page {
            PagerState::LastPageReached
        } else {
            PagerState::Idle
        };

        if appending && !meta.in_range() {
            return Completion::OutOfRange;
        }
        self.last_meta = Some(meta);
        if appending {
            Completion::Append
        } else {
            Completion::Replace
        }
    }

    /// Records a failed fetch without touching the known metadata.
    pub fn fail(&mut self) {
        self.state = if self.is_last_page {
            PagerState::LastPageReached
        } else {
            PagerState::Idle
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(current_page: u64, per_page: u64, total: u64) -> PageMeta {
        PageMeta {
            per_page,
            current_page,
            total,
        }
    }

    #[test]
    fn test_is_last_page_matches_ceiling_formula() {
        for total in 0..35u64 {
            for per_page in 1..12u64 {
                for current_page in 1..6u64 {
                    let expected =
                        ((total as f64) / (per_page as f64)).ceil() <= current_page as f64;
                    assert_eq!(
                        meta(current_page, per_page, total).is_last_page(),
                        expected,
                        "total={total} per_page={per_page} current={current_page}"
                    );
                }
            }
        }
        assert!(meta(1, 0, 10).is_last_page());
    }

    #[test]
    fn test_replace_mode_omits_page_parameter() {
        let mut cursor = PaginationCursor::new(false);
        assert_eq!(cursor.begin_replace(), None);
        assert_eq!(cursor.state(), PagerState::FetchingReplace);
        assert_eq!(cursor.complete(Some(meta(1, 10, 30))), Completion::Replace);
        assert_eq!(cursor.state(), PagerState::Idle);
        assert_eq!(cursor.begin_append(), None);
    }

    #[test]
    fn test_load_more_walks_pages_until_last() {
        let mut cursor = PaginationCursor::new(true);
        assert_eq!(cursor.begin_replace(), Some(1));
        assert_eq!(cursor.complete(Some(meta(1, 10, 20))), Completion::Replace);
        assert!(!cursor.is_last_page());

        assert_eq!(cursor.begin_append(), Some(2));
        assert_eq!(cursor.state(), PagerState::FetchingAppend);
        assert_eq!(cursor.complete(Some(meta(2, 10, 20))), Completion::Append);
        assert!(cursor.is_last_page());
        assert_eq!(cursor.state(), PagerState::LastPageReached);

        assert_eq!(cursor.begin_append(), None);
    }

    #[test]
    fn test_append_ignored_while_fetching() {
        let mut cursor = PaginationCursor::new(true);
        cursor.begin_replace();
        assert_eq!(cursor.begin_append(), None);
    }

    #[test]
    fn test_replace_resets_last_page() {
        let mut cursor = PaginationCursor::new(true);
        cursor.begin_replace();
        cursor.complete(Some(meta(1, 10, 5)));
        assert!(cursor.is_last_page());

        assert_eq!(cursor.begin_replace(), Some(1));
        assert!(!cursor.is_last_page());
        assert!(cursor.last_meta().is_none());
    }

    #[test]
    fn test_missing_meta_stops_load_more() {
        let mut cursor = PaginationCursor::new(true);
        cursor.begin_replace();
        assert_eq!(cursor.complete(None), Completion::Replace);
        assert_eq!(cursor.state(), PagerState::LastPageReached);
        assert_eq!(cursor.begin_append(), None);
    }

    #[test]
    fn test_out_of_range_page_is_not_appended() {
        let mut cursor = PaginationCursor::new(true);
        cursor.begin_replace();
        cursor.complete(Some(meta(1, 10, 15)));
        cursor.begin_append();
        // the collection shrank while paging
        assert_eq!(cursor.complete(Some(meta(2, 10, 5))), Completion::OutOfRange);
        assert!(cursor.is_last_page());
        assert_eq!(cursor.last_meta(), Some(&meta(1, 10, 15)));
    }

    #[test]
    fn test_failure_keeps_metadata() {
        let mut cursor = PaginationCursor::new(true);
        cursor.begin_replace();
        cursor.complete(Some(meta(1, 10, 30)));
        cursor.begin_append();
        cursor.fail();
        assert_eq!(cursor.state(), PagerState::Idle);
        assert_eq!(cursor.last_meta(), Some(&meta(1, 10, 30)));
        assert_eq!(cursor.begin_append(), Some(2));
    }
}
