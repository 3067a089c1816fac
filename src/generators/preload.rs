//! Bulk loading of page text.

use super::{StopHandle, ThreadedGenerator};
use crate::{
    error::{Error, Result},
    page::Page,
    site::{MAX_TITLES_PER_QUERY, Site},
};
use std::{collections::VecDeque, sync::Arc};

/// Yields the pages of another generator with their latest revision already
/// loaded, fetching them with one request per batch and site instead of one
/// request per page.
///
/// Batching and loading run on the generator thread, at most `lookahead`
/// pages ahead of the consumer. A batch is handed over completely before the
/// next one is loaded.
pub struct PreloadingGenerator {
    pages: ThreadedGenerator<Result<Page>>,
}

impl PreloadingGenerator {
    /// The default batch size.
    pub const DEFAULT_PAGE_NUMBER: usize = 60;
    /// The default number of loaded pages queued for the consumer.
    pub const DEFAULT_LOOKAHEAD: usize = 10;

    /// Wraps `source`.
    pub fn new<I>(source: I, page_number: usize, lookahead: usize) -> Result<Self>
    where
        I: Iterator<Item = Result<Page>> + Send + 'static,
    {
        let batches = Batches {
            source,
            page_number: page_number.max(1),
            ready: VecDeque::new(),
            failed: None,
            exhausted: false,
        };
        Ok(Self {
            pages: ThreadedGenerator::new(batches.map(Ok), lookahead)?,
        })
    }

    /// Wraps `source` with the default batch size and lookahead.
    pub fn with_defaults<I>(source: I) -> Result<Self>
    where
        I: Iterator<Item = Result<Page>> + Send + 'static,
    {
        Self::new(source, Self::DEFAULT_PAGE_NUMBER, Self::DEFAULT_LOOKAHEAD)
    }

    /// A handle which stops this generator.
    pub fn stop_handle(&self) -> StopHandle {
        self.pages.stop_handle()
    }

    /// Stops the generator.
    pub fn stop(&self) {
        self.pages.stop();
    }
}

impl Iterator for PreloadingGenerator {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pages.next()
    }
}

/// The producer side: pages of `source`, loaded one batch at a time.
struct Batches<I> {
    source: I,
    /// The maximum number of pages per batch.
    page_number: usize,
    /// The loaded batch.
    ready: VecDeque<Result<Page>>,
    /// An error which ended the last batch, yielded after it.
    failed: Option<Error>,
    exhausted: bool,
}

impl<I: Iterator<Item = Result<Page>>> Batches<I> {
    /// Collects and loads the next batch.
    fn fill(&mut self) {
        let mut batch = Vec::with_capacity(self.page_number);
        while batch.len() < self.page_number {
            match self.source.next() {
                Some(Ok(page)) => batch.push(page),
                Some(Err(err)) => {
                    self.failed = Some(err);
                    break;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            return;
        }

        // Group by site, keeping the order in which sites first appear.
        let mut groups = Vec::<(Arc<Site>, Vec<Page>)>::new();
        for page in batch {
            match groups.iter_mut().find(|(site, _)| **site == **page.site()) {
                Some((_, group)) => group.push(page),
                None => groups.push((Arc::clone(page.site()), vec![page])),
            }
        }

        for (site, group) in groups {
            let titles = group
                .iter()
                .map(|page| page.title().clone())
                .collect::<Vec<_>>();
            match site.preload_pages(group, MAX_TITLES_PER_QUERY) {
                Ok(pages) => self.ready.extend(pages.into_iter().map(Ok)),
                Err(err) => {
                    log::warn!("{site}: could not preload {} page(s): {err}", titles.len());
                    self.ready.extend(
                        titles
                            .into_iter()
                            .map(|title| Ok(Page::from_title(Arc::clone(&site), title))),
                    );
                }
            }
        }
    }
}

impl<I: Iterator<Item = Result<Page>>> Iterator for Batches<I> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(page) = self.ready.pop_front() {
                return Some(page);
            }
            if let Some(err) = self.failed.take() {
                return Some(Err(err));
            }
            if self.exhausted {
                return None;
            }
            self.fill();
        }
    }
}
