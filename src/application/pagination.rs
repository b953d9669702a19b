//! Fixed-size page-number pagination for the dashboard.

use serde::Deserialize;

/// One-based page request. Anything below 1 is treated as the first page.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    pub number: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }
}

/// A page of results together with enough bookkeeping for pager links.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total_items: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_items: u64) -> Self {
        Self {
            items,
            number: request.number,
            size: request.size,
            total_items,
        }
    }

    /// An empty collection still has one (empty) page.
    pub fn total_pages(&self) -> u32 {
        let size = u64::from(self.size.max(1));
        let pages = self.total_items.div_ceil(size).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// A page number past the end of a non-empty collection does not exist;
    /// the original framework treats that as a not-found condition.
    pub fn out_of_range(&self) -> bool {
        self.number > self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_are_one_based_and_clamped() {
        let request = PageRequest::new(0, 6);
        assert_eq!(request.number, 1);
        assert_eq!(request.offset(), 0);

        let request = PageRequest::new(3, 6);
        assert_eq!(request.offset(), 12);
        assert_eq!(request.limit(), 6);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<u8> = Page::new(vec![], PageRequest::new(1, 6), 13);
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn empty_collection_has_a_single_empty_page() {
        let page: Page<u8> = Page::new(vec![], PageRequest::new(1, 6), 0);
        assert_eq!(page.total_pages(), 1);
        assert!(!page.out_of_range());
        assert!(!page.has_previous());
        assert!(!page.has_next());
    }

    #[test]
    fn pages_past_the_end_are_out_of_range() {
        let page: Page<u8> = Page::new(vec![], PageRequest::new(4, 6), 13);
        assert!(page.out_of_range());
    }

    #[test]
    fn middle_pages_link_both_ways() {
        let page: Page<u8> = Page::new(vec![1, 2, 3, 4, 5, 6], PageRequest::new(2, 6), 18);
        assert!(page.has_previous());
        assert!(page.has_next());
    }
}
