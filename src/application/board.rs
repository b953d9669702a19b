//! Listing/search over the post collection.

use std::sync::Arc;

use thiserror::Error;

use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{PostQueryFilter, PostsRepo, RepoError};
use crate::domain::entities::PostRecord;
use crate::domain::policy::{self, Caller};

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("page {number} is past the end of the listing")]
    PageOutOfRange { number: u32 },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct BoardService {
    posts: Arc<dyn PostsRepo>,
    page_size: u32,
}

impl BoardService {
    pub fn new(posts: Arc<dyn PostsRepo>, page_size: u32) -> Self {
        Self {
            posts,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The dashboard listing: visibility scope comes from the caller's
    /// permissions, the optional query restricts titles case-insensitively.
    pub async fn list(
        &self,
        caller: Option<&Caller>,
        query: Option<&str>,
        page_number: u32,
    ) -> Result<Page<PostRecord>, BoardError> {
        let scope = policy::listing_scope(caller);
        let filter = match query {
            Some(query) => PostQueryFilter::title_contains(query),
            None => PostQueryFilter::default(),
        };

        let request = PageRequest::new(page_number, self.page_size);
        let page = self.posts.list_posts(scope, &filter, request).await?;

        if page.out_of_range() {
            return Err(BoardError::PageOutOfRange {
                number: page.number,
            });
        }

        Ok(page)
    }
}
