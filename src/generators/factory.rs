//! A generator built from command line options.

use super::{
    DuplicateFilter, NamespaceFilter, PageIter, RedirectFilter, Redirects, RegexFilter, all_pages,
    combined, images, interwiki_pages, linked_pages, prefixing_pages, referring_pages,
    search_pages, textfile_pages, user_contributions,
};
use crate::{
    error::{Error, Result},
    link::Link,
    page::{Category, Page},
    site::Site,
    title::Namespace,
};
use regex::Regex;
use std::sync::Arc;

/// Builds one generator from options like `-cat:Foo` or `-namespace:0`.
///
/// Every source option adds a generator; the generators are combined in
/// option order. Filter options apply to the combination, and each page is
/// yielded once.
///
/// | Option | Pages |
/// |--------|-------|
/// | `-cat:C`, `-catr:C` | in category C, recursively with `-catr` |
/// | `-subcats:C`, `-subcatsr:C` | subcategories of C |
/// | `-ref:P` | linking to or transcluding P |
/// | `-links:P` | linked from P |
/// | `-imagelinks:P` | files used on P |
/// | `-interwiki:P` | interlanguage links of P |
/// | `-transcludes:T` | transcluding template T |
/// | `-start:T` | all pages in T’s namespace from T on |
/// | `-prefix:T` | starting with T |
/// | `-file:F` | linked from the local file F |
/// | `-page:P` | P itself |
/// | `-search:Q` | full-text search results for Q |
/// | `-usercontribs:U` | edited by user U |
/// | `-namespace:N`, `-ns:N` | only in namespaces N (comma separated) |
/// | `-titleregex:R` | only with titles matching R |
/// | `-noredirect` | only non-redirects |
/// | `-limit:N` | at most N pages |
pub struct GeneratorFactory {
    site: Arc<Site>,
    sources: Vec<PageIter>,
    namespaces: Vec<i32>,
    title_regex: Option<Regex>,
    no_redirects: bool,
    limit: Option<usize>,
}

impl GeneratorFactory {
    /// Creates a factory for pages of `site`.
    pub fn new(site: &Arc<Site>) -> Self {
        Self {
            site: Arc::clone(site),
            sources: Vec::new(),
            namespaces: Vec::new(),
            title_regex: None,
            no_redirects: false,
            limit: None,
        }
    }

    /// Handles one option. Returns `false` if the option is not a generator
    /// option.
    pub fn handle_arg(&mut self, arg: &str) -> Result<bool> {
        let (name, value) = match arg.split_once(':') {
            Some((name, value)) => (name, Some(value)),
            None => (arg, None),
        };
        let required = || {
            value
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| Error::InvalidArgument(format!("{name} needs a value")))
        };

        let source: PageIter = match name {
            "-cat" | "-catr" => {
                let category = Category::new(&self.site, required()?)?;
                let depth = if name == "-catr" { usize::MAX } else { 0 };
                Box::new(category.articles(depth))
            }
            "-subcats" | "-subcatsr" => {
                let category = Category::new(&self.site, required()?)?;
                let depth = if name == "-subcatsr" { usize::MAX } else { 0 };
                Box::new(category.subcategories(depth))
            }
            "-ref" => {
                let page = Page::new(&self.site, required()?)?;
                referring_pages(&page, true, true, false)
            }
            "-links" => Box::new(linked_pages(&Page::new(&self.site, required()?)?)),
            "-imagelinks" => Box::new(images(&Page::new(&self.site, required()?)?)),
            "-interwiki" => interwiki_pages(&Page::new(&self.site, required()?)?),
            "-transcludes" => {
                let template = Page::with_namespace(&self.site, required()?, Namespace::TEMPLATE)?;
                referring_pages(&template, false, true, true)
            }
            "-start" => {
                let link = Link::new(required()?, &self.site);
                Box::new(all_pages(
                    &self.site,
                    link.title()?,
                    link.namespace()?,
                    Redirects::Include,
                ))
            }
            "-prefix" => Box::new(prefixing_pages(&self.site, required()?, Redirects::Include)?),
            "-file" => textfile_pages(&self.site, required()?)?,
            "-page" => Box::new(core::iter::once(Page::new(&self.site, required()?))),
            "-search" => Box::new(search_pages(&self.site, required()?, &[])),
            "-usercontribs" => user_contributions(&self.site, required()?, &[]),
            "-namespace" | "-ns" => {
                for name in required()?.split(',') {
                    let id = self.namespace_id(name)?;
                    if !self.namespaces.contains(&id) {
                        self.namespaces.push(id);
                    }
                }
                return Ok(true);
            }
            "-titleregex" => {
                let regex = Regex::new(required()?)
                    .map_err(|err| Error::InvalidArgument(format!("{name}: {err}")))?;
                self.title_regex = Some(regex);
                return Ok(true);
            }
            "-noredirect" => {
                self.no_redirects = true;
                return Ok(true);
            }
            "-limit" => {
                let limit = required()?
                    .parse()
                    .map_err(|err| Error::InvalidArgument(format!("{name}: {err}")))?;
                self.limit = Some(limit);
                return Ok(true);
            }
            _ => return Ok(false),
        };

        log::debug!("Generator option {arg}");
        self.sources.push(source);
        Ok(true)
    }

    /// Builds the generator, or returns `None` if no source option was
    /// given.
    pub fn build(self) -> Option<PageIter> {
        if self.sources.is_empty() {
            return None;
        }

        let mut pages = combined(self.sources);
        if !self.namespaces.is_empty() {
            pages = Box::new(NamespaceFilter::new(pages, self.namespaces));
        }
        if let Some(regex) = self.title_regex {
            pages = Box::new(RegexFilter::new(pages, regex));
        }
        if self.no_redirects {
            pages = Box::new(RedirectFilter::no_redirects(pages));
        }
        pages = Box::new(DuplicateFilter::new(pages));
        if let Some(limit) = self.limit {
            pages = Box::new(pages.take(limit));
        }
        Some(pages)
    }

    /// Resolves a namespace given by number or by name.
    fn namespace_id(&self, name: &str) -> Result<i32> {
        let name = name.trim();
        if let Ok(id) = name.parse::<i32>() {
            return Ok(id);
        }
        self.site
            .namespace_index(name)?
            .ok_or_else(|| Error::InvalidArgument(format!("unknown namespace {name}")))
    }
}
