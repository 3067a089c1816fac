//! Wiki pages and their cached state.
//!
//! A [`Page`] is cheap to create: it is only a site and a title until
//! something asks for more. Information is fetched from the server on first
//! use and cached on the page. Writes go through the site's page lock and
//! invalidate the cache.

mod category;
mod image;

pub use category::{Category, CategoryInfo, CategoryMembers, MemberKind};
pub use image::{ImageInfo, ImagePage};

use crate::{
    api::{PageGenerator, QueryGenerator, Request, ResultPath},
    error::{Error, Result},
    generators::{DuplicateFilter, PageIter},
    link::Link,
    site::Site,
    title::{self, Namespace, NamespaceCase, Title},
};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc, thread::JoinHandle};
use time::{UtcDateTime, format_description::well_known::Rfc3339};

/// One revision of a page.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Revision {
    /// The revision ID.
    pub id: u64,
    /// When the revision was saved.
    pub timestamp: UtcDateTime,
    /// The user name or IP address of the author.
    pub user: String,
    /// Whether the author was logged out.
    pub anon: bool,
    /// The edit summary.
    pub comment: String,
    /// The page text, if it was requested.
    pub text: Option<String>,
    /// Whether the edit was marked minor.
    pub minor: bool,
}

/// A protection setting of a page.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Protection {
    /// The protected action, like `edit` or `move`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The group needed to do the action, like `autoconfirmed` or `sysop`.
    pub level: String,
    /// When the protection ends.
    #[serde(default)]
    pub expiry: String,
}

/// Options for [`Page::title_with`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TitleOptions {
    /// Leave out the namespace prefix.
    pub without_namespace: bool,
    /// Leave out the section.
    pub without_section: bool,
    /// Use underscores instead of spaces.
    pub underscore: bool,
}

/// Lazily fetched page state. `None` means not fetched yet.
#[derive(Clone, Debug, Default)]
struct Cache {
    /// The page ID.
    page_id: Option<u64>,
    /// Whether the page exists.
    exists: Option<bool>,
    /// Whether the page is a redirect.
    is_redirect: Option<bool>,
    /// The title the redirect points to.
    redirect_target: Option<String>,
    /// The ID of the latest revision.
    latest_revid: Option<u64>,
    /// Fetched revisions, by ID.
    revisions: BTreeMap<u64, Revision>,
    /// Protection settings.
    protection: Option<Vec<Protection>>,
    /// Category member counts.
    category_info: Option<CategoryInfo>,
    /// File information.
    image_info: Option<ImageInfo>,
    /// Whether the page uses a disambiguation template.
    is_disambig: Option<bool>,
    /// Set when [`Page::get`] refused to return a redirect, so the refusal
    /// can be repeated without asking the server again.
    redirect_error: bool,
}

/// A wiki page.
#[derive(Clone, Debug)]
pub struct Page {
    /// The site the page is on.
    site: Arc<Site>,
    /// The normalised title.
    title: Title,
    /// Fetched state.
    cache: Cache,
    /// Local changes which have not been saved.
    text: Option<String>,
}

impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.site == other.site && self.title == other.title
    }
}

impl Eq for Page {}

impl core::hash::Hash for Page {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.site.hash(state);
        self.title.hash(state);
    }
}

impl PartialOrd for Page {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Pages sort by site, then by title.
impl Ord for Page {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (&self.site, &self.title).cmp(&(&other.site, &other.title))
    }
}

impl core::fmt::Display for Page {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[[{}:{}]]", self.site, self.title)
    }
}

impl Page {
    /// Parameters shared by every request which loads page info and the
    /// latest revision.
    pub(crate) const LOAD_PARAMS: [(&'static str, &'static str); 4] = [
        ("action", "query"),
        ("prop", "info|revisions"),
        ("inprop", "protection"),
        ("rvslots", "main"),
    ];
    /// Revision properties without the text.
    pub(crate) const REVISION_PROPS: &'static str = "ids|timestamp|user|comment|flags";
    /// Revision properties with the text.
    pub(crate) const REVISION_PROPS_WITH_CONTENT: &'static str =
        "ids|timestamp|user|comment|flags|content";

    /// Creates a page from a title. The title may carry a namespace prefix,
    /// an interwiki prefix, and a section.
    pub fn new(site: &Arc<Site>, title: &str) -> Result<Self> {
        Self::with_namespace(site, title, Namespace::MAIN)
    }

    /// Creates a page from a title which is in namespace `ns` unless it has a
    /// namespace prefix.
    pub fn with_namespace(site: &Arc<Site>, title: &str, ns: i32) -> Result<Self> {
        Self::from_link(&Link::with_default_namespace(title, site, ns))
    }

    /// Creates the page a link points to.
    pub fn from_link(link: &Link) -> Result<Self> {
        Ok(Self::from_title(link.site()?, link.to_title()?))
    }

    /// Creates a page from an already normalised title.
    pub(crate) fn from_title(site: Arc<Site>, title: Title) -> Self {
        Self {
            site,
            title,
            cache: Cache::default(),
            text: None,
        }
    }

    /// Creates a page from a page object in a query response, with whatever
    /// the response says about it already cached.
    pub(crate) fn from_api(site: &Arc<Site>, item: &Value) -> Result<Self> {
        let full = item["title"]
            .as_str()
            .ok_or_else(|| Error::Protocol(format!("page without a title: {item}")))?;
        let ns = item["ns"]
            .as_i64()
            .and_then(|ns| i32::try_from(ns).ok())
            .unwrap_or(Namespace::MAIN);

        let namespaces = site.namespaces()?;
        let namespace = namespaces
            .find_by_id(ns)
            .ok_or_else(|| Error::Protocol(format!("unknown namespace {ns} for {full}")))?;
        let text = match full.split_once(':') {
            Some((prefix, text)) if ns != Namespace::MAIN && namespace.matches(prefix) => text,
            _ => full,
        };

        let mut page = Self::from_title(Arc::clone(site), Title::from_parts(namespace, text, None));
        page.update_from_api(item)?;
        Ok(page)
    }

    /// Creates a page on the same site with another title.
    pub fn retitled(&self, title: &str) -> Result<Self> {
        Self::new(&self.site, title)
    }

    /// The site the page is on.
    pub fn site(&self) -> &Arc<Site> {
        &self.site
    }

    /// The title, with namespace and section.
    pub fn title(&self) -> &Title {
        &self.title
    }

    /// The title, formatted.
    pub fn title_with(&self, options: TitleOptions) -> String {
        let title = match (options.without_namespace, options.without_section) {
            (false, false) => self.title.full_text().to_string(),
            (false, true) => self.title.key().to_string(),
            (true, without_section) => match self.title.fragment() {
                Some(section) if !without_section => format!("{}#{section}", self.title.text()),
                _ => self.title.text().to_string(),
            },
        };
        if options.underscore {
            title.replace(' ', "_")
        } else {
            title
        }
    }

    /// The title without the namespace prefix or section.
    pub fn title_without_namespace(&self) -> &str {
        self.title.text()
    }

    /// The namespace ID.
    pub fn namespace(&self) -> i32 {
        self.title.namespace()
    }

    /// The section the title points to.
    pub fn section(&self) -> Option<&str> {
        self.title.fragment()
    }

    /// The title in URL form.
    pub fn url_name(&self) -> String {
        self.title.partial_url()
    }

    /// The full URL of the page.
    pub fn full_url(&self) -> String {
        self.site.article_url(&self.url_name())
    }

    /// Wikitext linking to the page from `from`, or from the page's own site
    /// if `from` is `None`. Categories and files get a leading colon so the
    /// link is a link and not a category assignment or an image.
    pub fn as_link(&self, from: Option<&Site>) -> String {
        let colon = if matches!(self.namespace(), Namespace::CATEGORY | Namespace::FILE) {
            ":"
        } else {
            ""
        };
        match from {
            Some(from) if *from != *self.site => {
                if from.family() == self.site.family() {
                    format!("[[{}:{}]]", self.site.code(), self.title)
                } else {
                    format!(
                        "[[{}:{}:{}]]",
                        self.site.family().name(),
                        self.site.code(),
                        self.title
                    )
                }
            }
            _ => format!("[[{colon}{}]]", self.title),
        }
    }

    /// Returns true if the page is in a talk namespace.
    pub fn is_talk_page(&self) -> bool {
        Namespace::is_talk_id(self.namespace())
    }

    /// The talk page of a subject page, or the subject page of a talk page.
    /// Special pages have neither.
    pub fn toggle_talk_page(&self) -> Result<Option<Self>> {
        let ns = self.namespace();
        if ns < Namespace::MAIN {
            return Ok(None);
        }
        let namespaces = self.site.namespaces()?;
        let Some(other) = namespaces.find_by_id(Namespace::associated_id(ns)) else {
            return Ok(None);
        };
        Ok(Some(Self::from_title(
            Arc::clone(&self.site),
            Title::from_parts(other, self.title.text(), None),
        )))
    }

    /// Returns true if the page is a category.
    pub fn is_category(&self) -> bool {
        self.namespace() == Namespace::CATEGORY
    }

    /// Returns true if the page is a file description page.
    pub fn is_image(&self) -> bool {
        self.namespace() == Namespace::FILE
    }

    /// Returns the text of the latest revision.
    ///
    /// Fails with [`Error::NoPage`] if the page does not exist, and with
    /// [`Error::IsRedirectPage`] if it is a redirect and `get_redirect` is
    /// false. Cached results are reused unless `force` is true.
    pub fn get(&mut self, force: bool, get_redirect: bool) -> Result<String> {
        if force {
            self.cache = Cache::default();
        } else if self.cache.redirect_error && !get_redirect {
            return Err(Error::IsRedirectPage(self.title.to_string()));
        }

        if self.latest_text().is_none() && self.cache.exists != Some(false) {
            log::debug!("Loading {self}");
            self.load(true)?;
        }

        if self.cache.exists == Some(false) {
            return Err(Error::NoPage(self.title.to_string()));
        }
        if self.cache.is_redirect == Some(true) && !get_redirect {
            self.cache.redirect_error = true;
            return Err(Error::IsRedirectPage(self.title.to_string()));
        }

        self.latest_text()
            .map(String::from)
            .ok_or_else(|| Error::Protocol(format!("no text for {self}")))
    }

    /// The text to save: local changes if there are any, and otherwise the
    /// current text. A page which does not exist has no text.
    pub fn text(&mut self) -> Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        match self.get(false, true) {
            Ok(text) => Ok(text),
            Err(Error::NoPage(_)) => Ok(String::new()),
            Err(err) => Err(err),
        }
    }

    /// Changes the text locally. Nothing is sent to the server until
    /// [`save`](Self::save).
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    /// Returns true if the page exists.
    pub fn exists(&mut self) -> Result<bool> {
        self.ensure_info()?;
        Ok(self.cache.exists == Some(true))
    }

    /// Returns true if the page is a redirect.
    pub fn is_redirect_page(&mut self) -> Result<bool> {
        self.ensure_info()?;
        Ok(self.cache.is_redirect == Some(true))
    }

    /// The page a redirect points to.
    pub fn get_redirect_target(&mut self) -> Result<Self> {
        if !self.is_redirect_page()? {
            return Err(Error::IsNotRedirectPage(self.title.to_string()));
        }

        if self.cache.redirect_target.is_none() {
            let response = Request::new(&self.site)
                .params([("action", "query"), ("redirects", "1")])
                .param("titles", self.title.key())
                .submit()?;
            let redirect = response
                .pointer("/query/redirects/0")
                .ok_or_else(|| Error::Protocol(format!("no redirect target for {self}")))?;
            let to = redirect["to"]
                .as_str()
                .ok_or_else(|| Error::Protocol(format!("bad redirect for {self}: {redirect}")))?;
            let target = match redirect["tofragment"].as_str() {
                Some(fragment) => format!("{to}#{fragment}"),
                None => to.to_string(),
            };
            self.cache.redirect_target = Some(target);
        }

        let target = self.cache.redirect_target.as_deref().unwrap_or_default();
        self.retitled(target)
    }

    /// The ID of the latest revision.
    pub fn latest_revision_id(&mut self) -> Result<u64> {
        self.ensure_info()?;
        self.cache
            .latest_revid
            .ok_or_else(|| Error::NoPage(self.title.to_string()))
    }

    /// The page ID.
    pub fn page_id(&mut self) -> Result<u64> {
        self.ensure_info()?;
        self.cache
            .page_id
            .ok_or_else(|| Error::NoPage(self.title.to_string()))
    }

    /// The author of the latest revision.
    pub fn user_name(&mut self) -> Result<String> {
        Ok(self.latest_revision()?.user.clone())
    }

    /// When the latest revision was saved.
    pub fn edit_time(&mut self) -> Result<UtcDateTime> {
        Ok(self.latest_revision()?.timestamp)
    }

    /// The protection settings.
    pub fn protection(&mut self) -> Result<Vec<Protection>> {
        if self.cache.protection.is_none() {
            self.load(false)?;
        }
        Ok(self.cache.protection.clone().unwrap_or_default())
    }

    /// Returns true if the configured account may edit the page. Pages
    /// protected to `autoconfirmed` need an account; anything stricter needs
    /// an administrator, which this client never assumes it is.
    pub fn can_be_edited(&mut self) -> Result<bool> {
        let logged_in = self.site.user().is_some();
        Ok(self
            .protection()?
            .iter()
            .filter(|protection| protection.kind == "edit")
            .all(|protection| match protection.level.as_str() {
                "" | "all" => true,
                "autoconfirmed" => logged_in,
                _ => false,
            }))
    }

    /// Returns true if the page uses one of the site's disambiguation
    /// templates.
    pub fn is_disambig(&mut self) -> Result<bool> {
        if let Some(is_disambig) = self.cache.is_disambig {
            return Ok(is_disambig);
        }

        let names = self.site.disambiguation_templates();
        let mut is_disambig = false;
        for template in self.templates() {
            let template = template?;
            let name = template.title_without_namespace();
            if names
                .iter()
                .any(|candidate| title::apply_case(NamespaceCase::FirstLetter, candidate) == name)
            {
                is_disambig = true;
                break;
            }
        }
        self.cache.is_disambig = Some(is_disambig);
        Ok(is_disambig)
    }

    /// Loads up to `count` revisions, newest first.
    pub fn revisions(&mut self, count: usize, with_content: bool) -> Result<Vec<Revision>> {
        let props = if with_content {
            Self::REVISION_PROPS_WITH_CONTENT
        } else {
            Self::REVISION_PROPS
        };
        let response = Request::new(&self.site)
            .params([("action", "query"), ("prop", "revisions"), ("rvslots", "main")])
            .param("rvprop", props)
            .param("rvlimit", count.max(1).to_string())
            .param("titles", self.title.key())
            .submit()?;
        let item = response
            .pointer("/query/pages/0")
            .ok_or_else(|| Error::Protocol(format!("no page in history of {self}")))?;
        let info = wire::PageInfo::deserialize(item)?;
        if info.missing {
            self.cache.exists = Some(false);
            return Err(Error::NoPage(self.title.to_string()));
        }

        let mut out = Vec::with_capacity(info.revisions.len());
        for revision in info.revisions {
            let revision = Revision::try_from(revision)?;
            self.cache_revision(revision.clone());
            out.push(revision);
        }
        Ok(out)
    }

    /// Saves the local text.
    ///
    /// If the page changed on the server since it was loaded, fails with
    /// [`Error::EditConflict`] and writes nothing.
    pub fn save(&mut self, comment: &str, minor: bool) -> Result<()> {
        let text = self.text()?;
        let site = Arc::clone(&self.site);
        let key = self.title.key().to_string();
        let _lock = site.page_lock(&key);

        self.check_conflict()?;

        let baserevid = self.cache.latest_revid.map(|id| id.to_string());
        let mut params = vec![
            ("action", "edit"),
            ("title", key.as_str()),
            ("text", text.as_str()),
            ("summary", comment),
            (if minor { "minor" } else { "notminor" }, "1"),
            ("bot", "1"),
        ];
        if let Some(baserevid) = &baserevid {
            params.push(("baserevid", baserevid.as_str()));
        }
        match self.cache.exists {
            Some(true) => params.push(("nocreate", "1")),
            Some(false) => params.push(("createonly", "1")),
            None => {}
        }

        let response = site.write(params)?;
        let edit = &response["edit"];
        match edit["result"].as_str() {
            Some("Success") => {}
            result => {
                return Err(Error::Api {
                    code: result.unwrap_or("failure").to_ascii_lowercase(),
                    info: edit.to_string(),
                });
            }
        }

        if edit.get("nochange").is_some() {
            log::info!("No changes were needed on {self}");
        } else {
            log::info!("Saved {self}: {comment}");
        }

        self.text = None;
        self.cache = Cache::default();
        if let Err(err) = self.load(true) {
            // The edit is committed; the next read loads the page again.
            log::warn!("Saved {self} but could not reload it: {err}");
        }
        Ok(())
    }

    /// Replaces the text and saves it.
    pub fn put(&mut self, text: impl Into<String>, comment: &str, minor: bool) -> Result<()> {
        self.set_text(text);
        self.save(comment, minor)
    }

    /// Saves the local text on another thread. The thread returns the page
    /// with the result of the save.
    pub fn save_async(
        mut self,
        comment: impl Into<String>,
        minor: bool,
    ) -> JoinHandle<(Self, Result<()>)> {
        let comment = comment.into();
        std::thread::spawn(move || {
            let result = self.save(&comment, minor);
            if let Err(err) = &result {
                log::error!("Saving {self} failed: {err}");
            }
            (self, result)
        })
    }

    /// Moves the page and returns the page at the new title.
    pub fn move_to(&mut self, new_title: &str, reason: &str, leave_redirect: bool) -> Result<Self> {
        let site = Arc::clone(&self.site);
        let key = self.title.key().to_string();
        let target = self.retitled(new_title)?;
        let _lock = site.page_lock(&key);

        let mut params = vec![
            ("action", "move"),
            ("from", key.as_str()),
            ("to", target.title.key()),
            ("reason", reason),
            ("movetalk", "1"),
        ];
        if !leave_redirect {
            params.push(("noredirect", "1"));
        }

        let response = site.write(params)?;
        let to = response["move"]["to"]
            .as_str()
            .ok_or_else(|| Error::Protocol(format!("bad move response: {response}")))?;
        log::info!("Moved {self} to {to}: {reason}");

        self.text = None;
        self.cache = Cache::default();
        if !leave_redirect {
            self.cache.exists = Some(false);
        }
        self.retitled(to)
    }

    /// Deletes the page.
    pub fn delete(&mut self, reason: &str) -> Result<()> {
        let site = Arc::clone(&self.site);
        let key = self.title.key().to_string();
        let _lock = site.page_lock(&key);

        let response = site.write([("action", "delete"), ("title", key.as_str()), ("reason", reason)])?;
        if response.get("delete").is_none() {
            return Err(Error::Protocol(format!("bad delete response: {response}")));
        }
        log::info!("Deleted {self}: {reason}");

        self.text = None;
        self.cache = Cache::default();
        self.cache.exists = Some(false);
        Ok(())
    }

    /// The categories the page is in.
    pub fn categories(&self) -> PageGenerator {
        PageGenerator::new(
            &self.site,
            [
                ("generator", "categories"),
                ("gcllimit", "max"),
                ("titles", self.title.key()),
            ],
        )
    }

    /// The templates the page uses.
    pub fn templates(&self) -> PageGenerator {
        PageGenerator::new(
            &self.site,
            [
                ("generator", "templates"),
                ("gtllimit", "max"),
                ("titles", self.title.key()),
            ],
        )
    }

    /// The pages the page links to, optionally only those in some
    /// namespaces.
    pub fn linked_pages(&self, namespaces: &[i32]) -> PageGenerator {
        let mut params = vec![
            ("generator".to_string(), "links".to_string()),
            ("gpllimit".into(), "max".into()),
            ("titles".into(), self.title.key().into()),
        ];
        if !namespaces.is_empty() {
            params.push(("gplnamespace".into(), join_namespaces(namespaces)));
        }
        PageGenerator::new(&self.site, params)
    }

    /// The files the page uses.
    pub fn image_links(&self) -> PageGenerator {
        PageGenerator::new(
            &self.site,
            [
                ("generator", "images"),
                ("gimlimit", "max"),
                ("titles", self.title.key()),
            ],
        )
    }

    /// The interlanguage links of the page, as pages on the other sites, in
    /// the interwiki sort order of their family.
    pub fn langlinks(&self) -> Result<Vec<Self>> {
        let forward = match self.site.family().interwiki_forward() {
            Some(name) => Some(self.site.registry()?.family(name)?),
            None => None,
        };
        let family = forward.as_ref().unwrap_or(self.site.family());

        let mut links = QueryGenerator::new(
            &self.site,
            ResultPath::PageProp("langlinks".into()),
            [
                ("prop", "langlinks"),
                ("lllimit", "max"),
                ("titles", self.title.key()),
            ],
        )
        .map(|item| {
            let item = item?;
            let (Some(lang), Some(title)) = (item["lang"].as_str(), item["title"].as_str()) else {
                return Err(Error::Protocol(format!("bad language link {item}")));
            };
            Ok((lang.to_string(), title.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
        family.sort_interwiki(&mut links, |(lang, _)| lang.as_str());

        links
            .into_iter()
            .map(|(lang, title)| {
                let site = match &forward {
                    Some(family) => self.site.registry()?.site(&lang, family.name())?,
                    None => self.site.other_language(&lang)?,
                };
                Self::new(&site, &title)
            })
            .collect()
    }

    /// The pages which link to or transclude this page.
    pub fn references(
        &self,
        follow_redirects: bool,
        with_template_inclusion: bool,
        only_template_inclusion: bool,
    ) -> PageIter {
        let key = self.title.key();
        let mut sources = Vec::<PageIter>::new();

        if !only_template_inclusion {
            let mut params = vec![
                ("generator", "backlinks"),
                ("gbllimit", "max"),
                ("gbltitle", key),
            ];
            if follow_redirects {
                params.push(("gblredirect", "1"));
            }
            sources.push(Box::new(PageGenerator::new(&self.site, params)));
        }

        if with_template_inclusion || only_template_inclusion {
            sources.push(Box::new(PageGenerator::new(
                &self.site,
                [
                    ("generator", "embeddedin"),
                    ("geilimit", "max"),
                    ("geititle", key),
                ],
            )));
        }

        Box::new(DuplicateFilter::new(sources.into_iter().flatten()))
    }

    /// Loads page info and the latest revision with one request.
    fn load(&mut self, content: bool) -> Result<()> {
        let props = if content {
            Self::REVISION_PROPS_WITH_CONTENT
        } else {
            Self::REVISION_PROPS
        };
        let response = Request::new(&self.site)
            .params(Self::LOAD_PARAMS)
            .param("rvprop", props)
            .param("titles", self.title.key())
            .submit()?;
        let item = response
            .pointer("/query/pages/0")
            .ok_or_else(|| Error::Protocol(format!("no page in response for {self}")))?;
        self.update_from_api(item)
    }

    /// Loads page info if it has not been loaded yet.
    fn ensure_info(&mut self) -> Result<()> {
        if self.cache.exists.is_none() {
            self.load(false)?;
        }
        Ok(())
    }

    /// The latest revision, loading it if needed.
    fn latest_revision(&mut self) -> Result<&Revision> {
        let cached = self
            .cache
            .latest_revid
            .is_some_and(|id| self.cache.revisions.contains_key(&id));
        if !cached {
            self.load(false)?;
        }
        self.cache
            .latest_revid
            .and_then(|id| self.cache.revisions.get(&id))
            .ok_or_else(|| Error::NoPage(self.title.to_string()))
    }

    /// The text of the latest revision, if it is cached.
    fn latest_text(&self) -> Option<&str> {
        self.cache
            .latest_revid
            .and_then(|id| self.cache.revisions.get(&id))
            .and_then(|revision| revision.text.as_deref())
    }

    /// Fails with [`Error::EditConflict`] if the server's latest revision is
    /// not the one this page last loaded.
    fn check_conflict(&mut self) -> Result<()> {
        let Some(known) = self.cache.latest_revid else {
            return Ok(());
        };

        let response = Request::new(&self.site)
            .params([("action", "query"), ("prop", "info")])
            .param("titles", self.title.key())
            .submit()?;
        let current = response
            .pointer("/query/pages/0/lastrevid")
            .and_then(Value::as_u64);
        if current != Some(known) {
            log::warn!("{self} changed on the server (revision {known} is now {current:?})");
            return Err(Error::EditConflict(self.title.to_string()));
        }
        Ok(())
    }

    /// Caches a revision. Text already cached for it is kept when the new
    /// copy was fetched without text.
    fn cache_revision(&mut self, mut revision: Revision) {
        if revision.text.is_none()
            && let Some(cached) = self.cache.revisions.get_mut(&revision.id)
        {
            revision.text = cached.text.take();
        }
        self.cache.revisions.insert(revision.id, revision);
    }

    /// Caches what a query response says about the page.
    pub(crate) fn update_from_api(&mut self, item: &Value) -> Result<()> {
        let info = wire::PageInfo::deserialize(item)?;
        if info.invalid {
            return Err(Error::InvalidTitle(format!(
                "{}: {}",
                self.title,
                info.invalidreason.unwrap_or_default()
            )));
        }

        if info.missing {
            self.cache.exists = Some(false);
            self.cache.is_redirect = Some(false);
            self.cache.page_id = None;
            self.cache.latest_revid = None;
        } else if let Some(lastrevid) = info.lastrevid {
            self.cache.exists = Some(true);
            self.cache.is_redirect = Some(info.redirect);
            self.cache.latest_revid = Some(lastrevid);
        }
        if info.pageid.is_some() {
            self.cache.page_id = info.pageid;
        }
        if let Some(protection) = info.protection {
            self.cache.protection = Some(protection);
        }
        for revision in info.revisions {
            self.cache_revision(Revision::try_from(revision)?);
        }
        if let Some(category_info) = info.categoryinfo {
            self.cache.category_info = Some(category_info);
        }
        if let Some(image_info) = info.imageinfo.into_iter().next() {
            self.cache.image_info = Some(ImageInfo::try_from(image_info)?);
        }
        Ok(())
    }
}

/// Joins namespace IDs for a namespace filter parameter.
pub(crate) fn join_namespaces(namespaces: &[i32]) -> String {
    namespaces
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

/// Parses an API timestamp.
pub(crate) fn parse_timestamp(timestamp: &str) -> Result<UtcDateTime> {
    Ok(UtcDateTime::parse(timestamp, &Rfc3339)?)
}

impl TryFrom<wire::Revision> for Revision {
    type Error = Error;

    fn try_from(revision: wire::Revision) -> Result<Self> {
        let text = revision
            .slots
            .and_then(|slots| slots.main.content)
            .or(revision.content);
        Ok(Self {
            id: revision.revid,
            timestamp: parse_timestamp(&revision.timestamp)?,
            user: revision.user,
            anon: revision.anon,
            comment: revision.comment,
            text,
            minor: revision.minor,
        })
    }
}

/// Deserialisation types for page queries.
mod wire {
    use super::{CategoryInfo, Protection};
    use serde::Deserialize;

    #[derive(Deserialize)]
    pub(super) struct PageInfo {
        #[serde(default)]
        pub pageid: Option<u64>,
        #[serde(default)]
        pub missing: bool,
        #[serde(default)]
        pub invalid: bool,
        #[serde(default)]
        pub invalidreason: Option<String>,
        #[serde(default)]
        pub redirect: bool,
        #[serde(default)]
        pub lastrevid: Option<u64>,
        #[serde(default)]
        pub protection: Option<Vec<Protection>>,
        #[serde(default)]
        pub revisions: Vec<Revision>,
        #[serde(default)]
        pub categoryinfo: Option<CategoryInfo>,
        #[serde(default)]
        pub imageinfo: Vec<ImageInfo>,
    }

    #[derive(Deserialize)]
    pub(super) struct Revision {
        pub revid: u64,
        #[serde(default)]
        pub user: String,
        #[serde(default)]
        pub anon: bool,
        pub timestamp: String,
        #[serde(default)]
        pub comment: String,
        #[serde(default)]
        pub minor: bool,
        #[serde(default)]
        pub content: Option<String>,
        #[serde(default)]
        pub slots: Option<Slots>,
    }

    #[derive(Deserialize)]
    pub(super) struct Slots {
        pub main: Slot,
    }

    #[derive(Deserialize)]
    pub(super) struct Slot {
        #[serde(default)]
        pub content: Option<String>,
    }

    #[derive(Deserialize)]
    pub(crate) struct ImageInfo {
        #[serde(default)]
        pub url: String,
        #[serde(default)]
        pub size: u64,
        #[serde(default)]
        pub width: u64,
        #[serde(default)]
        pub height: u64,
        #[serde(default)]
        pub mime: Option<String>,
        #[serde(default)]
        pub sha1: Option<String>,
        pub timestamp: String,
        #[serde(default)]
        pub user: String,
    }
}
