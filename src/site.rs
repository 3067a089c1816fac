//! Sites and the registry which creates them.
//!
//! A [`Site`] is one wiki: one language of one [`Family`]. Sites are created
//! only through a [`Registry`], which hands out the same `Arc<Site>` for the
//! same family, language, and user every time, so that per-site state like
//! the login session, the edit token, and the page lock set is shared by
//! everything talking to that wiki.

use crate::{
    api::Request,
    config::Config,
    error::{Error, Result},
    family::Family,
    http::{HttpClient, Transport},
    page::Page,
    title::{Namespace, NamespaceCase, Namespaces},
};
use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
    time::Instant,
};

/// The maximum number of titles the API accepts in one query.
pub const MAX_TITLES_PER_QUERY: usize = 50;

/// The key of the site cache.
type SiteKey = (String, String, Option<String>);

/// Creates and caches [`Site`] objects.
pub struct Registry {
    /// User configuration.
    config: Arc<Config>,
    /// The shared HTTP worker pool.
    transport: Arc<Transport>,
    /// Known families, by name.
    families: RwLock<HashMap<String, Arc<Family>>>,
    /// Sites which have been created so far.
    sites: Mutex<HashMap<SiteKey, Arc<Site>>>,
    /// A weak reference to this registry, handed to new sites.
    this: Weak<Registry>,
}

impl Registry {
    /// Creates a registry which talks to real wikis.
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let transport = Transport::from_config(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a registry which sends every request through `client`.
    pub fn with_client(config: Config, client: Arc<dyn HttpClient>) -> Result<Arc<Self>> {
        let transport = Transport::new(client, config.numthreads, config.http_queue_size)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a registry with the built-in families.
    fn with_transport(config: Config, transport: Transport) -> Arc<Self> {
        let families = Family::builtin()
            .into_iter()
            .map(|family| (family.name().to_string(), Arc::new(family)))
            .collect();
        Arc::new_cyclic(|this| Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            families: RwLock::new(families),
            sites: Mutex::default(),
            this: this.clone(),
        })
    }

    /// User configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared HTTP worker pool.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Adds a family, replacing any family with the same name. Sites already
    /// created for the old family keep using it.
    pub fn register_family(&self, family: Family) -> Arc<Family> {
        let family = Arc::new(family);
        log::debug!("Registered family {}", family.name());
        self.families
            .write()
            .insert(family.name().to_string(), Arc::clone(&family));
        family
    }

    /// Looks up a family by name.
    pub fn family(&self, name: &str) -> Result<Arc<Family>> {
        self.families
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownFamily(name.into()))
    }

    /// Returns the site for a language code of a family, creating it on first
    /// use.
    ///
    /// Obsolete codes are followed to their replacement. A family with a
    /// single wiki accepts any code and returns that wiki.
    pub fn site(&self, code: &str, family: &str) -> Result<Arc<Site>> {
        let family = self.family(family)?;
        let unknown = || Error::UnknownSite {
            code: code.into(),
            family: family.name().into(),
        };

        let mut resolved = code;
        if let Some(renamed) = family.obsolete(code) {
            match renamed {
                Some(new_code) => {
                    log::debug!("Language code {code} is obsolete, using {new_code}");
                    resolved = new_code;
                }
                None => return Err(unknown()),
            }
        }

        if !family.has_language(resolved) {
            resolved = family.sole_language().ok_or_else(unknown)?;
        }

        let account = self.config.account(family.name(), resolved);
        let key = (
            family.name().to_string(),
            resolved.to_string(),
            account.map(|account| account.username.clone()),
        );

        let mut sites = self.sites.lock();
        if let Some(site) = sites.get(&key) {
            return Ok(Arc::clone(site));
        }

        log::debug!("Creating site {}:{resolved}", family.name());
        let hostname = family.hostname(resolved).ok_or_else(unknown)?.to_string();
        let site = Arc::new(Site {
            code: resolved.to_string(),
            config: Arc::clone(&self.config),
            family: Arc::clone(&family),
            hostname,
            last_write: Mutex::new(None),
            locked_pages: Mutex::default(),
            logged_in_as: Mutex::new(None),
            page_unlocked: Condvar::new(),
            password: account.and_then(|account| account.password.clone()),
            registry: self.this.clone(),
            siteinfo: Mutex::new(None),
            token: Mutex::new(None),
            transport: Arc::clone(&self.transport),
            user: account.map(|account| account.username.clone()),
        });
        sites.insert(key, Arc::clone(&site));
        Ok(site)
    }

    /// Returns the site named by the configuration defaults.
    pub fn default_site(&self) -> Result<Arc<Site>> {
        self.site(&self.config.code, &self.config.family)
    }

    /// Stops the HTTP worker pool.
    pub fn shutdown(&self) {
        self.transport.shutdown();
    }
}

/// Server-provided site information.
#[derive(Debug)]
pub struct SiteInfo {
    /// The namespace table, merged with the family's static names.
    pub namespaces: Namespaces,
    /// The case rule of the main namespace.
    pub case: NamespaceCase,
    /// The MediaWiki version string.
    pub generator: String,
    /// Localised spellings of `#REDIRECT`.
    pub redirect_words: Vec<String>,
    /// The wiki's name.
    pub sitename: String,
}

/// One wiki.
pub struct Site {
    /// The language code.
    code: String,
    /// User configuration.
    config: Arc<Config>,
    /// The family the wiki belongs to.
    family: Arc<Family>,
    /// The server hostname.
    hostname: String,
    /// When the last write finished.
    last_write: Mutex<Option<Instant>>,
    /// Titles of pages currently being changed.
    locked_pages: Mutex<HashSet<String>>,
    /// The user name of the active session, if logged in.
    logged_in_as: Mutex<Option<String>>,
    /// Signalled whenever a page is unlocked.
    page_unlocked: Condvar,
    /// The configured password.
    password: Option<String>,
    /// The registry which created the site.
    registry: Weak<Registry>,
    /// Lazily fetched site information.
    siteinfo: Mutex<Option<Arc<SiteInfo>>>,
    /// The cached CSRF token.
    token: Mutex<Option<String>>,
    /// The shared HTTP worker pool.
    transport: Arc<Transport>,
    /// The configured user name.
    user: Option<String>,
}

impl core::fmt::Debug for Site {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Site")
            .field("family", &self.family.name())
            .field("code", &self.code)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl core::fmt::Display for Site {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.family.name(), self.code)
    }
}

impl PartialEq for Site {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.family.name() == other.family.name()
    }
}

impl Eq for Site {}

impl core::hash::Hash for Site {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.family.name().hash(state);
        self.code.hash(state);
    }
}

impl PartialOrd for Site {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Site {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.family.name(), self.code.as_str()).cmp(&(other.family.name(), other.code.as_str()))
    }
}

impl Site {
    /// The language code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The family the wiki belongs to.
    pub fn family(&self) -> &Arc<Family> {
        &self.family
    }

    /// User configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared HTTP worker pool.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The registry which created the site.
    pub fn registry(&self) -> Result<Arc<Registry>> {
        self.registry.upgrade().ok_or(Error::TransportClosed)
    }

    /// Returns another language of the same family.
    pub fn other_language(&self, code: &str) -> Result<Arc<Site>> {
        self.registry()?.site(code, self.family.name())
    }

    /// The configured user name.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// The server hostname.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The URL scheme.
    pub fn protocol(&self) -> &str {
        self.family.protocol()
    }

    /// The script path.
    pub fn scriptpath(&self) -> &str {
        self.family.scriptpath()
    }

    /// The URL of `api.php`.
    pub fn api_url(&self) -> String {
        format!(
            "{}://{}{}/api.php",
            self.protocol(),
            self.hostname,
            self.scriptpath()
        )
    }

    /// The URL of an article, given its URL-encoded title.
    pub fn article_url(&self, partial_url: &str) -> String {
        format!("{}://{}/wiki/{partial_url}", self.protocol(), self.hostname)
    }

    /// The language codes of the family.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.family.languages()
    }

    /// The order in which interwiki links are sorted.
    pub fn interwiki_sort_order(&self) -> &[String] {
        self.family.interwiki_sort_order()
    }

    /// The names of disambiguation templates on this wiki.
    pub fn disambiguation_templates(&self) -> &[String] {
        self.family.disambiguation_templates(&self.code)
    }

    /// Server-provided site information, fetched on first use.
    ///
    /// A failed fetch is not cached; the next call tries again.
    pub fn siteinfo(&self) -> Result<Arc<SiteInfo>> {
        let mut siteinfo = self.siteinfo.lock();
        if let Some(info) = &*siteinfo {
            return Ok(Arc::clone(info));
        }

        let info = Arc::new(self.fetch_siteinfo()?);
        log::debug!(
            "{self}: loaded {} namespaces from {}",
            info.namespaces.iter().count(),
            info.generator
        );
        *siteinfo = Some(Arc::clone(&info));
        Ok(info)
    }

    /// Requests site information and merges it with the family's static
    /// namespace names.
    fn fetch_siteinfo(&self) -> Result<SiteInfo> {
        let response = Request::new(self)
            .params([
                ("action", "query"),
                ("meta", "siteinfo"),
                ("siprop", "general|namespaces|namespacealiases|magicwords"),
            ])
            .submit()?;
        let response = serde_json::from_value::<siteinfo::Response>(response)?;
        let siteinfo::Query {
            general,
            magic_words,
            namespaces,
            namespace_aliases,
        } = response.query;

        let statics = self.family.namespaces(&self.code);
        let namespaces = namespaces
            .into_values()
            .map(|ns| {
                let mut out = Namespace::new(ns.id, ns.name);
                out.canonical = ns.canonical;
                out.case = NamespaceCase::from_siteinfo(&ns.case).unwrap_or_default();
                out.content = ns.content;
                out.subpages = ns.subpages;
                let aliases = namespace_aliases
                    .iter()
                    .filter(|alias| alias.id == ns.id)
                    .map(|alias| alias.alias.as_str());
                let statics = statics.find_by_id(ns.id).into_iter().flat_map(|known| {
                    core::iter::once(known.name.as_str()).chain(known.aliases.iter().map(String::as_str))
                });
                for alias in aliases.chain(statics) {
                    if !out.matches(alias) {
                        out.aliases.push(alias.to_string());
                    }
                }
                out
            })
            .collect();

        let redirect_words = magic_words
            .into_iter()
            .find_map(|word| word.name.eq_ignore_ascii_case("redirect").then_some(word.aliases))
            .unwrap_or_else(|| vec!["#REDIRECT".into()]);

        Ok(SiteInfo {
            namespaces: Namespaces::new(namespaces),
            case: NamespaceCase::from_siteinfo(&general.case).unwrap_or_default(),
            generator: general.generator,
            redirect_words,
            sitename: general.sitename,
        })
    }

    /// The namespace table.
    pub fn namespaces(&self) -> Result<Namespaces> {
        Ok(self.siteinfo()?.namespaces.clone())
    }

    /// Finds a namespace ID by any of its names. The empty name is the main
    /// namespace.
    pub fn namespace_index(&self, name: &str) -> Result<Option<i32>> {
        if name.trim().is_empty() {
            return Ok(Some(Namespace::MAIN));
        }
        Ok(self
            .siteinfo()?
            .namespaces
            .find_by_name(name)
            .map(|ns| ns.id))
    }

    /// The display name of a namespace.
    pub fn namespace_name(&self, id: i32) -> Result<Option<String>> {
        Ok(self
            .siteinfo()?
            .namespaces
            .find_by_id(id)
            .map(|ns| ns.name.clone()))
    }

    /// The case rule of the main namespace.
    pub fn case(&self) -> Result<NamespaceCase> {
        Ok(self.siteinfo()?.case)
    }

    /// The MediaWiki version string.
    pub fn generator(&self) -> Result<String> {
        Ok(self.siteinfo()?.generator.clone())
    }

    /// Localised spellings of `#REDIRECT`.
    pub fn redirect_words(&self) -> Result<Vec<String>> {
        Ok(self.siteinfo()?.redirect_words.clone())
    }

    /// Marks a page as being changed by this process.
    ///
    /// If another thread holds the lock, waits for it when `block` is true,
    /// and otherwise returns false immediately.
    pub fn lock_page(&self, title: &str, block: bool) -> bool {
        let mut locked = self.locked_pages.lock();
        while locked.contains(title) {
            if !block {
                return false;
            }
            self.page_unlocked.wait(&mut locked);
        }
        locked.insert(title.to_string());
        true
    }

    /// Releases a page lock.
    pub fn unlock_page(&self, title: &str) {
        self.locked_pages.lock().remove(title);
        self.page_unlocked.notify_all();
    }

    /// Locks a page until the returned guard is dropped.
    pub fn page_lock<'a>(&'a self, title: &'a str) -> PageLock<'a> {
        self.lock_page(title, true);
        PageLock { site: self, title }
    }

    /// Locks a page until the returned guard is dropped, unless another thread
    /// already holds the lock.
    pub fn try_page_lock<'a>(&'a self, title: &'a str) -> Option<PageLock<'a>> {
        self.lock_page(title, false)
            .then_some(PageLock { site: self, title })
    }

    /// Returns true if a session is active.
    pub fn logged_in(&self) -> bool {
        self.logged_in_as.lock().is_some()
    }

    /// Logs in with the configured account.
    ///
    /// A site without an account stays anonymous. An existing session from
    /// the cookie jar is reused.
    pub fn login(&self) -> Result<()> {
        let Some(user) = &self.user else {
            log::debug!("{self}: no account configured, staying anonymous");
            return Ok(());
        };
        if self.logged_in() {
            return Ok(());
        }

        let response = Request::new(self)
            .params([("action", "query"), ("meta", "userinfo")])
            .submit()?;
        let userinfo = &response["query"]["userinfo"];
        if userinfo.get("anon").is_none() && userinfo["name"].as_str() == Some(user.as_str()) {
            log::debug!("{self}: reusing session for {user}");
            *self.logged_in_as.lock() = Some(user.clone());
            return Ok(());
        }

        let Some(password) = &self.password else {
            return Err(Error::PermissionDenied {
                code: "nopassword".into(),
                info: format!("no password configured for {user} on {self}"),
            });
        };

        let response = Request::new(self)
            .params([("action", "query"), ("meta", "tokens"), ("type", "login")])
            .submit()?;
        let login_token = response
            .pointer("/query/tokens/logintoken")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("response has no login token".into()))?
            .to_string();

        let response = Request::new(self)
            .post()
            .params([
                ("action", "login"),
                ("lgname", user.as_str()),
                ("lgpassword", password.as_str()),
                ("lgtoken", login_token.as_str()),
            ])
            .submit()?;
        let login = &response["login"];
        match login["result"].as_str() {
            Some("Success") => {}
            result => {
                return Err(Error::PermissionDenied {
                    code: result.unwrap_or("login").to_ascii_lowercase(),
                    info: login["reason"].as_str().unwrap_or_default().to_string(),
                });
            }
        }

        let name = login["lgusername"].as_str().unwrap_or(user).to_string();
        log::info!("Logged in to {self} as {name}");
        *self.logged_in_as.lock() = Some(name);
        *self.token.lock() = None;
        self.transport.client().save_cookies()
    }

    /// Logs in before a write. Writes need a configured account.
    pub fn ensure_login(&self) -> Result<()> {
        if self.user.is_none() {
            return Err(Error::NoUsername(self.to_string()));
        }
        self.login()
    }

    /// The CSRF token needed for writes, fetched on first use.
    pub fn token(&self) -> Result<String> {
        if let Some(token) = &*self.token.lock() {
            return Ok(token.clone());
        }

        let response = Request::new(self)
            .params([("action", "query"), ("meta", "tokens"), ("type", "csrf")])
            .submit()?;
        let token = response
            .pointer("/query/tokens/csrftoken")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("response has no csrf token".into()))?
            .to_string();
        *self.token.lock() = Some(token.clone());
        Ok(token)
    }

    /// Forgets the cached CSRF token.
    pub fn invalidate_token(&self) {
        *self.token.lock() = None;
    }

    /// Waits until enough time has passed since the last write.
    pub fn put_throttle(&self) {
        let mut last_write = self.last_write.lock();
        if let Some(at) = *last_write {
            let wait = self.config.put_throttle().saturating_sub(at.elapsed());
            if !wait.is_zero() {
                log::debug!("{self}: sleeping {wait:?} before the next write");
                std::thread::sleep(wait);
            }
        }
        *last_write = Some(Instant::now());
    }

    /// Sends a throttled, token-bearing write request. A stale token is
    /// refreshed and the request resent once.
    pub(crate) fn write<'a, I>(&self, params: I) -> Result<Value>
    where
        I: IntoIterator<Item = (&'a str, &'a str)> + Clone,
    {
        self.ensure_login()?;
        self.put_throttle();
        let mut refreshed = false;
        loop {
            let token = self.token()?;
            let result = Request::new(self)
                .post()
                .params(params.clone())
                .param("token", token)
                .submit();
            match result {
                Err(Error::Api { code, .. }) if code == "badtoken" && !refreshed => {
                    log::debug!("{self}: edit token expired");
                    self.invalidate_token();
                    refreshed = true;
                }
                result => return result,
            }
        }
    }

    /// Loads the latest revision and page info of many pages at once.
    ///
    /// Pages are requested in groups of at most `group_size` titles and come
    /// back in the order the server listed them, loaded. Pages the server did
    /// not describe come last, unloaded.
    pub fn preload_pages(&self, pages: Vec<Page>, group_size: usize) -> Result<Vec<Page>> {
        let group_size = group_size.clamp(1, MAX_TITLES_PER_QUERY);
        let mut out = Vec::with_capacity(pages.len());
        let mut pages = pages;
        while !pages.is_empty() {
            let rest = pages.split_off(group_size.min(pages.len()));
            let group = core::mem::replace(&mut pages, rest);
            out.extend(self.preload_group(group)?);
        }
        Ok(out)
    }

    /// Loads one group of pages with a single request.
    fn preload_group(&self, group: Vec<Page>) -> Result<Vec<Page>> {
        let titles = group
            .iter()
            .map(|page| page.title().key())
            .collect::<Vec<_>>()
            .join("|");
        log::debug!("{self}: preloading {} page(s)", group.len());

        let response = Request::new(self)
            .params(Page::LOAD_PARAMS)
            .param("rvprop", Page::REVISION_PROPS_WITH_CONTENT)
            .param("titles", titles)
            .submit()?;
        let query = &response["query"];

        let normalized = query["normalized"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|entry| Some((entry["from"].as_str()?, entry["to"].as_str()?)))
            .collect::<HashMap<_, _>>();

        let mut pending = group.into_iter().map(Some).collect::<Vec<_>>();
        let mut out = Vec::with_capacity(pending.len());
        for item in query["pages"].as_array().into_iter().flatten() {
            let Some(title) = item["title"].as_str() else {
                continue;
            };
            let slot = pending.iter_mut().find(|slot| {
                slot.as_ref().is_some_and(|page| {
                    let key = page.title().key();
                    key == title || normalized.get(key) == Some(&title)
                })
            });
            if let Some(mut page) = slot.and_then(Option::take) {
                match page.update_from_api(item) {
                    Ok(()) => out.push(page),
                    Err(err) => {
                        // The page loads on its own when used.
                        log::warn!("{self}: could not preload {}: {err}", page.title());
                        out.push(Page::from_title(Arc::clone(page.site()), page.title().clone()));
                    }
                }
            } else {
                log::debug!("{self}: response has unrequested page {title}");
            }
        }

        for page in pending.into_iter().flatten() {
            log::warn!("{self}: page {} was not in the preload response", page.title());
            out.push(page);
        }
        Ok(out)
    }
}

/// A held page lock. Dropping it unlocks the page.
#[must_use]
pub struct PageLock<'a> {
    /// The site which holds the lock.
    site: &'a Site,
    /// The locked title.
    title: &'a str,
}

impl Drop for PageLock<'_> {
    fn drop(&mut self) {
        self.site.unlock_page(self.title);
    }
}

/// Deserialisation types for siteinfo responses.
mod siteinfo {
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Deserialize)]
    pub(super) struct Response {
        pub query: Query,
    }

    #[derive(Deserialize)]
    pub(super) struct General {
        #[serde(default)]
        pub case: String,
        #[serde(default)]
        pub generator: String,
        #[serde(default)]
        pub sitename: String,
    }

    #[derive(Deserialize)]
    pub(super) struct MagicWord {
        pub aliases: Vec<String>,
        pub name: String,
    }

    #[derive(Deserialize)]
    pub(super) struct Namespace {
        pub id: i32,
        pub name: String,
        #[serde(default)]
        pub canonical: Option<String>,
        #[serde(default)]
        pub case: String,
        #[serde(default)]
        pub content: bool,
        #[serde(default)]
        pub subpages: bool,
    }

    #[derive(Deserialize)]
    pub(super) struct NamespaceAlias {
        pub id: i32,
        pub alias: String,
    }

    #[derive(Deserialize)]
    pub(super) struct Query {
        pub general: General,
        #[serde(rename = "magicwords", default)]
        pub magic_words: Vec<MagicWord>,
        pub namespaces: BTreeMap<String, Namespace>,
        #[serde(rename = "namespacealiases", default)]
        pub namespace_aliases: Vec<NamespaceAlias>,
    }
}
