//! Paged list results

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;

/// Source of pages behind a [`Pager`].
#[async_trait]
pub trait PageSource<T>: Send {
    /// Fetch the next page, or `None` once the listing is exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<T>>>;
}

/// Lazily fetched, page-by-page list result.
///
/// Nothing is requested until the first call to [`Pager::next_page`], so a
/// caller that finds what it needs on page one never pays for the rest.
pub struct Pager<T> {
    source: Box<dyn PageSource<T>>,
}

impl<T: Send + 'static> Pager<T> {
    pub fn new(source: impl PageSource<T> + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Pager over pre-materialized pages.
    pub fn from_pages(pages: Vec<Vec<T>>) -> Self {
        Self::new(StaticPages {
            pages: pages.into(),
        })
    }

    /// Pager whose first page fails with `err`.
    pub fn from_error(err: CloudError) -> Self {
        Self::new(FailedPages { err: Some(err) })
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        self.source.next_page().await
    }

    /// Drain every page into one vector.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }
}

impl<T> std::fmt::Debug for Pager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pager").finish_non_exhaustive()
    }
}

struct StaticPages<T> {
    pages: VecDeque<Vec<T>>,
}

#[async_trait]
impl<T: Send> PageSource<T> for StaticPages<T> {
    async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        Ok(self.pages.pop_front())
    }
}

struct FailedPages {
    err: Option<CloudError>,
}

#[async_trait]
impl<T: Send> PageSource<T> for FailedPages {
    async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        match self.err.take() {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_all_flattens_pages() {
        let pager = Pager::from_pages(vec![vec![1, 2], vec![], vec![3]]);
        let items = tokio_test::block_on(pager.collect_all()).unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_next_page_stops_at_end() {
        let mut pager = Pager::from_pages(vec![vec!["a"]]);
        assert_eq!(pager.next_page().await.unwrap(), Some(vec!["a"]));
        assert_eq!(pager.next_page().await.unwrap(), None);
        assert_eq!(pager.next_page().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_pager() {
        let pager: Pager<u8> = Pager::from_error(CloudError::not_found("scope gone"));
        let err = pager.collect_all().await.unwrap_err();
        assert!(err.is_not_found());
    }
}
