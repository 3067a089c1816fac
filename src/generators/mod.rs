//! Page generators.
//!
//! A generator is an iterator over `Result<Page>`. Sources produce pages
//! from the server or from local input; filters narrow them down;
//! [`ThreadedGenerator`] moves a source onto its own thread so listing
//! overlaps with the consumer's work; and [`PreloadingGenerator`] loads the
//! text of many pages with one request. Errors travel through the pipeline
//! as items and filters never swallow them.

mod factory;
mod filters;
mod preload;
mod threaded;

pub use factory::GeneratorFactory;
pub use filters::{DuplicateFilter, NamespaceFilter, RedirectFilter, RegexFilter, combined};
pub use preload::PreloadingGenerator;
pub use threaded::{DEFAULT_QUEUE_SIZE, StopHandle, ThreadedGenerator};

use crate::{
    api::{PageGenerator, QueryGenerator, ResultPath},
    error::{Error, Result},
    link::Link,
    page::{Category, CategoryMembers, Page, join_namespaces},
    site::Site,
};
use regex::Regex;
use std::{path::Path, sync::{Arc, LazyLock}};

/// A boxed page generator.
pub type PageIter = Box<dyn Iterator<Item = Result<Page>> + Send>;

/// Matches a wikilink, capturing its target.
static WIKILINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]|]+)(?:\|[^\]]*)?\]\]").unwrap());

/// Whether a listing includes redirects.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Redirects {
    /// Redirects and other pages.
    #[default]
    Include,
    /// Only pages which are not redirects.
    Exclude,
    /// Only redirects.
    Only,
}

impl Redirects {
    /// The `filterredir` parameter value.
    fn filterredir(self) -> &'static str {
        match self {
            Self::Include => "all",
            Self::Exclude => "nonredirects",
            Self::Only => "redirects",
        }
    }
}

/// All pages in a namespace, alphabetically from `start`.
pub fn all_pages(site: &Arc<Site>, start: &str, namespace: i32, redirects: Redirects) -> PageGenerator {
    PageGenerator::new(
        site,
        [
            ("generator", "allpages"),
            ("gaplimit", "max"),
            ("gapfrom", start),
            ("gapnamespace", namespace.to_string().as_str()),
            ("gapfilterredir", redirects.filterredir()),
        ],
    )
}

/// All pages whose title starts with `prefix`. A namespace prefix in
/// `prefix` selects the namespace.
pub fn prefixing_pages(site: &Arc<Site>, prefix: &str, redirects: Redirects) -> Result<PageGenerator> {
    let link = Link::new(prefix, site);
    let namespace = link.namespace()?;
    Ok(PageGenerator::new(
        site,
        [
            ("generator", "allpages"),
            ("gaplimit", "max"),
            ("gapprefix", link.title()?),
            ("gapnamespace", namespace.to_string().as_str()),
            ("gapfilterredir", redirects.filterredir()),
        ],
    ))
}

/// The pages in a category and, down to `recurse` levels, in its
/// subcategories.
pub fn categorized_pages(category: &Category, recurse: usize) -> CategoryMembers {
    category.articles(recurse)
}

/// The subcategories of a category down to `recurse` levels.
pub fn subcategories(category: &Category, recurse: usize) -> CategoryMembers {
    category.subcategories(recurse)
}

/// The pages which link to or transclude `page`.
pub fn referring_pages(
    page: &Page,
    follow_redirects: bool,
    with_template_inclusion: bool,
    only_template_inclusion: bool,
) -> PageIter {
    page.references(follow_redirects, with_template_inclusion, only_template_inclusion)
}

/// The pages `page` links to.
pub fn linked_pages(page: &Page) -> PageGenerator {
    page.linked_pages(&[])
}

/// The files `page` uses.
pub fn images(page: &Page) -> PageGenerator {
    page.image_links()
}

/// The interlanguage links of `page`.
pub fn interwiki_pages(page: &Page) -> PageIter {
    match page.langlinks() {
        Ok(pages) => Box::new(pages.into_iter().map(Ok)),
        Err(err) => Box::new(core::iter::once(Err(err))),
    }
}

/// The pages linked from a local text file.
///
/// Every `[[wikilink]]` in the file is a page. A file without wikilinks has
/// one title per line. Links which fail to parse are skipped.
pub fn textfile_pages(site: &Arc<Site>, path: impl AsRef<Path>) -> Result<PageIter> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let mut titles = WIKILINK
        .captures_iter(&text)
        .map(|captures| captures[1].to_string())
        .collect::<Vec<_>>();
    if titles.is_empty() {
        titles = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
    }
    log::debug!("{} title(s) in {}", titles.len(), path.as_ref().display());

    let site = Arc::clone(site);
    Ok(Box::new(titles.into_iter().filter_map(move |title| {
        match Page::from_link(&Link::new(title.as_str(), &site)) {
            Ok(page) => Some(Ok(page)),
            Err(err @ (Error::InvalidTitle(_) | Error::UnknownSite { .. } | Error::UnknownFamily(_))) => {
                log::warn!("Skipping [[{title}]]: {err}");
                None
            }
            Err(err) => Some(Err(err)),
        }
    })))
}

/// Pages from a list of titles.
pub fn pages_from_titles<I>(site: &Arc<Site>, titles: I) -> PageIter
where
    I: IntoIterator,
    I::Item: AsRef<str>,
    I::IntoIter: Send + 'static,
{
    let site = Arc::clone(site);
    Box::new(
        titles
            .into_iter()
            .map(move |title| Page::new(&site, title.as_ref())),
    )
}

/// The results of a full-text search.
pub fn search_pages(site: &Arc<Site>, query: &str, namespaces: &[i32]) -> PageGenerator {
    let mut params = vec![
        ("generator".to_string(), "search".to_string()),
        ("gsrsearch".into(), query.into()),
        ("gsrlimit".into(), "max".into()),
        ("gsrwhat".into(), "text".into()),
    ];
    if !namespaces.is_empty() {
        params.push(("gsrnamespace".into(), join_namespaces(namespaces)));
    }
    PageGenerator::new(site, params)
}

/// The pages a user edited, most recent edit first. Each page is yielded
/// once.
pub fn user_contributions(site: &Arc<Site>, user: &str, namespaces: &[i32]) -> PageIter {
    let mut params = vec![
        ("list".to_string(), "usercontribs".to_string()),
        ("ucuser".into(), user.into()),
        ("uclimit".into(), "max".into()),
    ];
    if !namespaces.is_empty() {
        params.push(("ucnamespace".into(), join_namespaces(namespaces)));
    }
    let site = Arc::clone(site);
    let contributions = QueryGenerator::new(&site, ResultPath::List("usercontribs".into()), params);
    Box::new(DuplicateFilter::new(contributions.map(move |item| {
        let item = item?;
        let title = item["title"]
            .as_str()
            .ok_or_else(|| Error::Protocol(format!("contribution without a title: {item}")))?;
        Page::new(&site, title)
    })))
}
