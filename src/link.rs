//! Wikilinks.
//!
//! A [`Link`] is the text between `[[` and `]]`, resolved relative to the
//! site it was found on. Resolution walks interwiki and namespace prefixes
//! until it finds the page's site, namespace, and title. It is done once,
//! on first access, and never touches the network except to fetch the
//! namespace tables of the sites involved.

use crate::{
    error::{Error, Result},
    site::Site,
    title::{self, Namespace, Title},
};
use percent_encoding::percent_decode_str;
use std::{cell::OnceCell, sync::Arc};
use unicode_normalization::UnicodeNormalization as _;

/// The resolved parts of a link.
#[derive(Debug)]
struct Parsed {
    /// The site the link points to.
    site: Arc<Site>,
    /// The namespace of the target page.
    namespace: Namespace,
    /// The title without namespace prefix or section.
    title: String,
    /// The section name.
    section: Option<String>,
    /// The link label.
    anchor: Option<String>,
}

/// A wikilink, resolved lazily.
#[derive(Debug)]
pub struct Link {
    /// The raw link text.
    text: String,
    /// The site the link was found on.
    source: Arc<Site>,
    /// The namespace of a link without a namespace prefix.
    default_namespace: i32,
    /// The resolved link.
    parsed: OnceCell<Parsed>,
}

impl Link {
    /// Creates a link found on `source`.
    pub fn new(text: impl Into<String>, source: &Arc<Site>) -> Self {
        Self::with_default_namespace(text, source, Namespace::MAIN)
    }

    /// Creates a link whose target is in namespace `ns` unless it says
    /// otherwise, like the argument of a template transclusion.
    pub fn with_default_namespace(text: impl Into<String>, source: &Arc<Site>, ns: i32) -> Self {
        Self {
            text: text.into(),
            source: Arc::clone(source),
            default_namespace: ns,
            parsed: OnceCell::new(),
        }
    }

    /// The raw link text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The site the link was found on.
    pub fn source(&self) -> &Arc<Site> {
        &self.source
    }

    /// The site the link points to.
    pub fn site(&self) -> Result<Arc<Site>> {
        Ok(Arc::clone(&self.parsed()?.site))
    }

    /// The namespace ID of the target page.
    pub fn namespace(&self) -> Result<i32> {
        Ok(self.parsed()?.namespace.id)
    }

    /// The title of the target page, without namespace prefix or section.
    pub fn title(&self) -> Result<&str> {
        Ok(&self.parsed()?.title)
    }

    /// The section name, if the link points to one.
    pub fn section(&self) -> Result<Option<&str>> {
        Ok(self.parsed()?.section.as_deref())
    }

    /// The link label, if the link has one.
    pub fn anchor(&self) -> Result<Option<&str>> {
        Ok(self.parsed()?.anchor.as_deref())
    }

    /// The full title of the target page, including the section.
    pub fn to_title(&self) -> Result<Title> {
        let parsed = self.parsed()?;
        Ok(Title::from_parts(
            &parsed.namespace,
            &parsed.title,
            parsed.section.as_deref(),
        ))
    }

    /// Returns the resolved link, resolving it first if needed.
    fn parsed(&self) -> Result<&Parsed> {
        if let Some(parsed) = self.parsed.get() {
            return Ok(parsed);
        }
        let parsed = self.parse()?;
        Ok(self.parsed.get_or_init(|| parsed))
    }

    /// Resolves the link.
    fn parse(&self) -> Result<Parsed> {
        let invalid = |reason: &str| Error::InvalidTitle(format!("{:?} {reason}", self.text));

        let (text, anchor) = match self.text.split_once('|') {
            Some((text, anchor)) => (text, Some(anchor.to_string())),
            None => (self.text.as_str(), None),
        };

        let decoded = percent_decode_str(text)
            .decode_utf8()
            .map_err(|_| invalid("has bad percent-encoding"))?;
        let mut t = title::normalize(&decoded).nfc().collect::<String>();

        let mut site = Arc::clone(&self.source);
        let mut namespaces = site.namespaces()?;
        let mut ns = self.default_namespace;
        let mut first_pass = true;

        loop {
            let forced_main = if let Some(rest) = t.strip_prefix(':') {
                t = rest.trim_start().to_string();
                ns = Namespace::MAIN;
                true
            } else {
                false
            };

            let Some((prefix, rest)) = t.split_once(':') else {
                break;
            };

            if let Some(namespace) = namespaces.find_by_name(prefix) {
                ns = namespace.id;
                t = rest.trim_start().to_string();
                break;
            }

            if forced_main {
                break;
            }

            let Some(target) = interwiki_target(&site, &prefix.trim().to_lowercase())? else {
                break;
            };

            let rest = rest.trim_start().to_string();
            if target == site {
                if rest.is_empty() {
                    return Err(invalid("has an empty title after an interwiki prefix"));
                }
                log::trace!("Dropping redundant prefix {prefix:?} from {:?}", self.text);
            } else if !first_pass {
                return Err(invalid("has chained interwiki prefixes"));
            } else {
                namespaces = target.namespaces()?;
                site = target;
                ns = Namespace::MAIN;
            }
            first_pass = false;
            t = rest;
        }

        let (title, section) = match t.split_once('#') {
            Some((title, section)) => (title.trim_end().to_string(), Some(section.trim().to_string())),
            None => (t, None),
        };

        let namespace = namespaces
            .find_by_id(ns)
            .cloned()
            .ok_or_else(|| invalid("has an unknown namespace"))?;
        title::check_legal(&title, ns).map_err(invalid)?;
        let title = title::apply_case(namespace.case, &title).into_owned();

        // An empty title on another wiki is its main page.
        if title.is_empty()
            && site == self.source
            && !(section.is_some() && ns == Namespace::MAIN)
        {
            return Err(invalid("has an empty title"));
        }

        Ok(Parsed {
            site,
            namespace,
            title,
            section,
            anchor,
        })
    }
}

impl core::fmt::Display for Link {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[[{}]]", self.text)
    }
}

/// Returns the site an interwiki prefix points to, or `None` if the prefix
/// is not an interwiki prefix. `prefix` must be lowercase.
fn interwiki_target(site: &Arc<Site>, prefix: &str) -> Result<Option<Arc<Site>>> {
    let family = site.family();
    if family.has_language(prefix) || family.obsolete(prefix).is_some() {
        return site.registry()?.site(prefix, family.name()).map(Some);
    }

    let registry = site.registry()?;
    if let Some(forward) = family.interwiki_forward() {
        let forward = registry.family(forward)?;
        if forward.has_language(prefix) || forward.obsolete(prefix).is_some() {
            return registry.site(prefix, forward.name()).map(Some);
        }
    }

    if let Some(name) = family.known_family(prefix) {
        let target = registry.family(name)?;
        let code = target
            .sole_language()
            .or_else(|| target.has_language(site.code()).then_some(site.code()))
            .unwrap_or(&registry.config().code);
        return registry.site(code, name).map(Some);
    }

    Ok(None)
}
