//! Generators which narrow down another generator.
//!
//! Every filter passes errors through untouched, so a failed listing is still
//! seen by whoever drives the pipeline.

use super::PageIter;
use crate::{error::Result, page::Page};
use regex::Regex;
use std::collections::HashSet;

/// Yields only pages in some namespaces.
pub struct NamespaceFilter<I> {
    source: I,
    namespaces: Vec<i32>,
}

impl<I> NamespaceFilter<I> {
    /// Creates a filter. An empty namespace list lets everything through.
    pub fn new(source: I, namespaces: Vec<i32>) -> Self {
        Self { source, namespaces }
    }
}

impl<I: Iterator<Item = Result<Page>>> Iterator for NamespaceFilter<I> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.find(|page| match page {
            Ok(page) => {
                self.namespaces.is_empty() || self.namespaces.contains(&page.namespace())
            }
            Err(_) => true,
        })
    }
}

/// Yields only pages which are, or are not, redirects.
///
/// Pages whose redirect status is unknown are loaded first. Pages from
/// [`PageGenerator`](crate::api::PageGenerator)s already know it.
pub struct RedirectFilter<I> {
    source: I,
    redirects: bool,
}

impl<I> RedirectFilter<I> {
    /// Creates a filter which drops redirects.
    pub fn no_redirects(source: I) -> Self {
        Self {
            source,
            redirects: false,
        }
    }

    /// Creates a filter which keeps only redirects.
    pub fn only_redirects(source: I) -> Self {
        Self {
            source,
            redirects: true,
        }
    }
}

impl<I: Iterator<Item = Result<Page>>> Iterator for RedirectFilter<I> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut page = match self.source.next()? {
                Ok(page) => page,
                Err(err) => return Some(Err(err)),
            };
            match page.is_redirect_page() {
                Ok(redirect) if redirect == self.redirects => return Some(Ok(page)),
                Ok(_) => {}
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Yields each page once.
///
/// Pages are the same if they have the same site and the same title without
/// a section.
pub struct DuplicateFilter<I> {
    source: I,
    seen: HashSet<(String, String)>,
}

impl<I> DuplicateFilter<I> {
    /// Creates a filter.
    pub fn new(source: I) -> Self {
        Self {
            source,
            seen: HashSet::new(),
        }
    }
}

impl<I: Iterator<Item = Result<Page>>> Iterator for DuplicateFilter<I> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.find(|page| match page {
            Ok(page) => self
                .seen
                .insert((page.site().to_string(), page.title().key().to_string())),
            Err(_) => true,
        })
    }
}

/// Yields only pages whose title matches a regular expression.
pub struct RegexFilter<I> {
    source: I,
    regex: Regex,
    inverse: bool,
}

impl<I> RegexFilter<I> {
    /// Creates a filter which keeps pages whose title matches.
    pub fn new(source: I, regex: Regex) -> Self {
        Self {
            source,
            regex,
            inverse: false,
        }
    }

    /// Creates a filter which keeps pages whose title does not match.
    pub fn inverse(source: I, regex: Regex) -> Self {
        Self {
            source,
            regex,
            inverse: true,
        }
    }
}

impl<I: Iterator<Item = Result<Page>>> Iterator for RegexFilter<I> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.find(|page| match page {
            Ok(page) => self.regex.is_match(page.title().key()) != self.inverse,
            Err(_) => true,
        })
    }
}

/// Chains generators, one after the other.
pub fn combined(sources: Vec<PageIter>) -> PageIter {
    Box::new(sources.into_iter().flatten())
}
