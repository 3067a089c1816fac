//! An in-memory wiki for tests.
//!
//! [`MockWiki`] answers API requests for the hosts of the built-in families
//! the way a MediaWiki server would, closely enough for the client to be
//! tested end to end: siteinfo, tokens, login, page queries, the list and
//! generator modules the client uses, and edits, moves, and deletes. Tests
//! arrange its content directly and can make it lag, garble responses, or
//! fail the next request of some action.

use crate::{
    config::{Account, Config},
    family::Family,
    http::{HttpClient, Method},
    site::Registry,
    title::{self, Namespace, NamespaceCase, Namespaces},
};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

/// The account name the test configuration logs in with.
pub const USER: &str = "Example bot";
/// The author of pages arranged by tests.
pub const OTHER_USER: &str = "Somebody else";
/// The English Wikipedia host.
pub const EN: &str = "en.wikipedia.org";
/// The Wikimedia Commons host.
pub const COMMONS: &str = "commons.wikimedia.org";

/// The password of every account on the mock.
const PASSWORD: &str = "secret";
/// The CSRF token of every session.
const CSRF_TOKEN: &str = "0123456789abcdef+\\";
/// The login token of every session.
const LOGIN_TOKEN: &str = "fedcba9876543210+\\";
/// The default number of items per list batch.
const DEFAULT_BATCH_SIZE: usize = 500;
/// Actions which change content.
const WRITE_ACTIONS: &[&str] = &["edit", "move", "delete"];

type Params = HashMap<String, String>;

/// A configuration for tests: no waiting, and an account on every Wikipedia
/// and on Commons.
pub fn config() -> Config {
    let account = |family: &str| Account {
        family: family.into(),
        code: "*".into(),
        username: USER.into(),
        password: Some(PASSWORD.into()),
    };
    Config {
        accounts: vec![account("wikipedia"), account("commons")],
        put_throttle: 0.0,
        retry_wait: 0.0,
        ..Config::default()
    }
}

/// Creates a registry backed by a fresh mock wiki.
pub fn registry() -> (Arc<Registry>, Arc<MockWiki>) {
    registry_with(config())
}

/// Creates a registry with a custom configuration backed by a fresh mock
/// wiki.
pub fn registry_with(config: Config) -> (Arc<Registry>, Arc<MockWiki>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mock = Arc::new(MockWiki::new());
    let registry = Registry::with_client(config, Arc::clone(&mock) as Arc<dyn HttpClient>)
        .expect("registry");
    (registry, mock)
}

/// A scripted in-memory MediaWiki server.
#[derive(Debug)]
pub struct MockWiki {
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    /// Requests received.
    requests: usize,
    /// Parameters of the last request.
    last_request: Option<Vec<(String, String)>>,
    /// Write requests received.
    writes: usize,
    /// Parameters of the last write request.
    last_write: Option<Vec<(String, String)>>,
    /// Injected failures, as (action, code, info).
    failures: Vec<(String, String, String)>,
    /// Requests still to answer with a maxlag error.
    lag: u32,
    /// Requests still to answer with garbage.
    garble: u32,
    /// The maximum number of list items per response.
    batch_size: usize,
    /// Wikis by hostname, created on first contact.
    wikis: HashMap<String, Wiki>,
}

impl State {
    fn wiki(&mut self, host: &str) -> &mut Wiki {
        self.wikis
            .entry(host.to_string())
            .or_insert_with(|| Wiki::new(host))
    }
}

impl Default for MockWiki {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWiki {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                requests: 0,
                last_request: None,
                writes: 0,
                last_write: None,
                failures: Vec::new(),
                lag: 0,
                garble: 0,
                batch_size: DEFAULT_BATCH_SIZE,
                wikis: HashMap::new(),
            }),
        }
    }

    /// The number of requests received, including failed ones.
    pub fn request_count(&self) -> usize {
        self.state.lock().requests
    }

    /// The parameters of the last request.
    pub fn last_request(&self) -> Option<Vec<(String, String)>> {
        self.state.lock().last_request.clone()
    }

    /// The number of edit, move, and delete requests received.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    /// The parameters of the last edit, move, or delete request.
    pub fn last_write(&self) -> Option<Vec<(String, String)>> {
        self.state.lock().last_write.clone()
    }

    /// Fails the next request with the given action.
    pub fn fail_next(&self, action: &str, code: &str, info: &str) {
        self.state
            .lock()
            .failures
            .push((action.into(), code.into(), info.into()));
    }

    /// Answers the next `count` requests with a maxlag error.
    pub fn lag(&self, count: u32) {
        self.state.lock().lag = count;
    }

    /// Answers the next `count` requests with something which is not JSON.
    pub fn garble(&self, count: u32) {
        self.state.lock().garble = count;
    }

    /// Limits list responses to `size` items.
    pub fn set_batch_size(&self, size: usize) {
        self.state.lock().batch_size = size.max(1);
    }

    /// The user logged in on a host.
    pub fn logged_in_user(&self, host: &str) -> Option<String> {
        self.state.lock().wiki(host).logged_in.clone()
    }

    /// Creates a page, or adds a revision to an existing one, as somebody
    /// else.
    pub fn add_page(&self, host: &str, title: &str, text: &str) {
        let mut state = self.state.lock();
        let wiki = state.wiki(host);
        let title = wiki.normalize(title);
        wiki.save(&title, OTHER_USER, "", text, false);
    }

    /// Changes a page behind the client's back.
    pub fn edit_directly(&self, host: &str, title: &str, text: &str) {
        self.add_page(host, title, text);
    }

    /// Creates a redirect.
    pub fn add_redirect(&self, host: &str, title: &str, target: &str) {
        self.add_page(host, title, &format!("#REDIRECT [[{target}]]"));
    }

    /// Uploads a file.
    pub fn add_file(&self, host: &str, name: &str, size: u64, width: u64, height: u64) {
        let mut state = self.state.lock();
        let wiki = state.wiki(host);
        let title = wiki.normalize(&format!("File:{name}"));
        wiki.save(&title, OTHER_USER, "upload", "", false);
        wiki.page_mut(&title).file = Some((size, width, height));
    }

    /// The current text of a page, or `None` if it does not exist.
    pub fn text(&self, host: &str, title: &str) -> Option<String> {
        let mut state = self.state.lock();
        let wiki = state.wiki(host);
        let title = wiki.normalize(title);
        wiki.pages.get(&title).map(|page| page.text().to_string())
    }

    /// Protects a page.
    pub fn protect(&self, host: &str, title: &str, action: &str, level: &str) {
        let mut state = self.state.lock();
        let wiki = state.wiki(host);
        let title = wiki.normalize(title);
        wiki.page_mut(&title)
            .protection
            .push((action.into(), level.into()));
    }

    /// Makes the revisions of a page carry timestamps which do not parse.
    pub fn garble_timestamps(&self, host: &str, title: &str) {
        let mut state = self.state.lock();
        let wiki = state.wiki(host);
        let title = wiki.normalize(title);
        wiki.page_mut(&title).garbled_timestamps = true;
    }

    /// Sets the pages a page links to.
    pub fn set_links(&self, host: &str, title: &str, links: &[&str]) {
        self.set_table(host, title, links, |page| &mut page.links);
    }

    /// Sets the templates a page uses.
    pub fn set_templates(&self, host: &str, title: &str, templates: &[&str]) {
        self.set_table(host, title, templates, |page| &mut page.templates);
    }

    /// Sets the categories a page is in.
    pub fn set_categories(&self, host: &str, title: &str, categories: &[&str]) {
        self.set_table(host, title, categories, |page| &mut page.categories);
    }

    /// Sets the files a page uses.
    pub fn set_images(&self, host: &str, title: &str, images: &[&str]) {
        self.set_table(host, title, images, |page| &mut page.images);
    }

    /// Sets the interlanguage links of a page.
    pub fn set_langlinks(&self, host: &str, title: &str, links: &[(&str, &str)]) {
        let mut state = self.state.lock();
        let wiki = state.wiki(host);
        let title = wiki.normalize(title);
        wiki.page_mut(&title).langlinks = links
            .iter()
            .map(|(lang, title)| (lang.to_string(), title.to_string()))
            .collect();
    }

    fn set_table(
        &self,
        host: &str,
        title: &str,
        entries: &[&str],
        table: impl FnOnce(&mut MockPage) -> &mut Vec<String>,
    ) {
        let mut state = self.state.lock();
        let wiki = state.wiki(host);
        let title = wiki.normalize(title);
        let entries = entries
            .iter()
            .map(|entry| wiki.normalize(entry))
            .collect();
        *table(wiki.page_mut(&title)) = entries;
    }
}

impl HttpClient for MockWiki {
    fn execute(
        &self,
        method: Method,
        url: &str,
        params: &[(String, String)],
    ) -> crate::error::Result<String> {
        let host = url
            .split_once("://")
            .and_then(|(_, rest)| rest.split('/').next())
            .unwrap_or_default()
            .to_string();

        let mut state = self.state.lock();
        state.requests += 1;
        state.last_request = Some(params.to_vec());

        if state.garble > 0 {
            state.garble -= 1;
            return Ok("<!DOCTYPE html><title>502 Bad Gateway</title>".into());
        }
        if state.lag > 0 {
            state.lag -= 1;
            return Ok(error("maxlag", "Waiting for 10.0.0.1: 3 seconds lagged").to_string());
        }

        let params_map = params.iter().cloned().collect::<Params>();
        let action = params_map
            .get("action")
            .map_or("", String::as_str)
            .to_string();
        if WRITE_ACTIONS.contains(&action.as_str()) {
            state.writes += 1;
            state.last_write = Some(params.to_vec());
            if method != Method::Post {
                return Ok(error("mustbeposted", "The action must be POSTed").to_string());
            }
        }

        if let Some(index) = state.failures.iter().position(|(a, ..)| *a == action) {
            let (_, code, info) = state.failures.remove(index);
            return Ok(error(&code, &info).to_string());
        }

        let batch_size = state.batch_size;
        let wiki = state.wiki(&host);
        let response = match action.as_str() {
            "query" => wiki.query(&params_map, batch_size),
            "edit" => wiki.edit(&params_map),
            "move" => wiki.move_page(&params_map),
            "delete" => wiki.delete(&params_map),
            "login" => wiki.login(&params_map),
            _ => error("badvalue", &format!("Unrecognized value for action: {action}")),
        };
        Ok(response.to_string())
    }
}

fn error(code: &str, info: &str) -> Value {
    json!({ "error": { "code": code, "info": info } })
}

fn split(value: Option<&String>) -> Vec<&str> {
    value
        .map(|value| value.split('|').filter(|part| !part.is_empty()).collect())
        .unwrap_or_default()
}

fn case_name(case: NamespaceCase) -> &'static str {
    match case {
        NamespaceCase::FirstLetter => "first-letter",
        NamespaceCase::CaseSensitive => "case-sensitive",
    }
}

fn timestamp(id: u64) -> String {
    format!(
        "2024-01-{:02}T{:02}:{:02}:{:02}Z",
        1 + (id / 86400) % 28,
        (id / 3600) % 24,
        (id / 60) % 60,
        id % 60
    )
}

#[derive(Clone, Debug)]
struct MockRevision {
    revid: u64,
    user: String,
    comment: String,
    text: String,
    minor: bool,
}

#[derive(Debug, Default)]
struct MockPage {
    pageid: u64,
    ns: i32,
    /// Oldest first. Never empty.
    revisions: Vec<MockRevision>,
    /// (action, level) pairs.
    protection: Vec<(String, String)>,
    links: Vec<String>,
    templates: Vec<String>,
    categories: Vec<String>,
    images: Vec<String>,
    langlinks: Vec<(String, String)>,
    /// (size, width, height).
    file: Option<(u64, u64, u64)>,
    garbled_timestamps: bool,
}

impl MockPage {
    fn latest(&self) -> &MockRevision {
        self.revisions.last().expect("page has revisions")
    }

    fn text(&self) -> &str {
        &self.latest().text
    }

    /// The redirect target, with fragment.
    fn redirect_target(&self) -> Option<&str> {
        let rest = self.text().strip_prefix("#REDIRECT [[")?;
        rest.split_once("]]").map(|(target, _)| target)
    }

    fn is_protected(&self, action: &str) -> bool {
        self.protection
            .iter()
            .any(|(a, level)| a == action && level == "sysop")
    }
}

#[derive(Debug)]
struct Wiki {
    code: String,
    family: Family,
    namespaces: Namespaces,
    pages: BTreeMap<String, MockPage>,
    logged_in: Option<String>,
    next_id: u64,
}

impl Wiki {
    fn new(host: &str) -> Self {
        let (family, code) = Family::builtin()
            .into_iter()
            .find_map(|family| {
                let code = family
                    .languages()
                    .find(|code| family.hostname(code) == Some(host))?
                    .to_string();
                Some((family, code))
            })
            .unwrap_or_else(|| panic!("no mock wiki at {host}"));
        Self {
            namespaces: family.namespaces(&code),
            code,
            family,
            pages: BTreeMap::new(),
            logged_in: None,
            next_id: 100,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn normalize(&self, title: &str) -> String {
        let title = title::normalize(title);
        if let Some((prefix, rest)) = title.split_once(':')
            && let Some(ns) = self.namespaces.find_by_name(prefix)
        {
            return format!("{}:{}", ns.name, title::apply_case(ns.case, rest.trim()));
        }
        let case = self
            .namespaces
            .main()
            .map_or(NamespaceCase::FirstLetter, |ns| ns.case);
        title::apply_case(case, &title).into_owned()
    }

    fn ns_of(&self, title: &str) -> i32 {
        title
            .split_once(':')
            .and_then(|(prefix, _)| self.namespaces.find_by_name(prefix))
            .map_or(Namespace::MAIN, |ns| ns.id)
    }

    fn page_mut(&mut self, title: &str) -> &mut MockPage {
        self.pages
            .get_mut(title)
            .unwrap_or_else(|| panic!("no page {title}"))
    }

    /// Adds a revision, creating the page if needed. Returns the IDs of the
    /// previous and new revisions.
    fn save(&mut self, title: &str, user: &str, comment: &str, text: &str, minor: bool) -> (u64, u64) {
        let ns = self.ns_of(title);
        let pageid = match self.pages.get(title) {
            Some(page) => page.pageid,
            None => self.next_id(),
        };
        let revid = self.next_id();
        let page = self.pages.entry(title.to_string()).or_insert_with(|| MockPage {
            pageid,
            ns,
            ..MockPage::default()
        });
        let old = page.revisions.last().map_or(0, |revision| revision.revid);
        page.revisions.push(MockRevision {
            revid,
            user: user.into(),
            comment: comment.into(),
            text: text.into(),
            minor,
        });
        (old, revid)
    }

    fn user(&self) -> String {
        self.logged_in.clone().unwrap_or_else(|| "127.0.0.1".into())
    }

    fn query(&mut self, params: &Params, batch_size: usize) -> Value {
        let mut response = Map::new();
        let mut query = Map::new();

        for meta in split(params.get("meta")) {
            match meta {
                "siteinfo" => query.extend(self.siteinfo()),
                "userinfo" => {
                    let userinfo = match &self.logged_in {
                        Some(name) => json!({ "id": 1, "name": name }),
                        None => json!({ "id": 0, "name": "127.0.0.1", "anon": true }),
                    };
                    query.insert("userinfo".into(), userinfo);
                }
                "tokens" => {
                    let tokens = match params.get("type").map(String::as_str) {
                        Some("login") => json!({ "logintoken": LOGIN_TOKEN }),
                        _ => json!({ "csrftoken": CSRF_TOKEN }),
                    };
                    query.insert("tokens".into(), tokens);
                }
                _ => {}
            }
        }

        let mut titles = None;
        if let Some(generator) = params.get("generator") {
            let (items, more) = self.module(generator, true, params, batch_size);
            if let Some(more) = more {
                response.insert("query-continue".into(), json!({ generator.as_str(): more }));
            }
            titles = Some(
                items
                    .iter()
                    .filter_map(|item| item["title"].as_str().map(String::from))
                    .collect::<Vec<_>>(),
            );
        } else if let Some(raw) = params.get("titles") {
            let mut normalized = Vec::new();
            let list = raw
                .split('|')
                .map(|from| {
                    let to = self.normalize(from);
                    if to != from {
                        normalized.push(json!({ "from": from, "to": to }));
                    }
                    to
                })
                .collect::<Vec<_>>();
            if !normalized.is_empty() {
                query.insert("normalized".into(), Value::Array(normalized));
            }
            titles = Some(list);
        }

        if let Some(list) = &mut titles
            && params.contains_key("redirects")
        {
            let mut redirects = Vec::new();
            for title in list.iter_mut() {
                let Some(target) = self.pages.get(title.as_str()).and_then(MockPage::redirect_target)
                else {
                    continue;
                };
                let (to, fragment) = match target.split_once('#') {
                    Some((to, fragment)) => (self.normalize(to), Some(fragment.to_string())),
                    None => (self.normalize(target), None),
                };
                let mut entry = json!({ "from": title.as_str(), "to": to });
                if let Some(fragment) = fragment {
                    entry["tofragment"] = fragment.into();
                }
                redirects.push(entry);
                *title = to;
            }
            if !redirects.is_empty() {
                query.insert("redirects".into(), Value::Array(redirects));
            }
        }

        if let Some(titles) = titles {
            let pages = titles
                .iter()
                .map(|title| self.page_object(title, params))
                .collect();
            query.insert("pages".into(), Value::Array(pages));
        }

        for list in split(params.get("list")) {
            let (items, more) = self.module(list, false, params, batch_size);
            if let Some(more) = more {
                response.insert("query-continue".into(), json!({ list: more }));
            }
            query.insert(list.into(), Value::Array(items));
        }

        response.insert("batchcomplete".into(), true.into());
        response.insert("query".into(), Value::Object(query));
        Value::Object(response)
    }

    fn siteinfo(&self) -> Map<String, Value> {
        let namespaces = self
            .namespaces
            .iter()
            .map(|ns| {
                let object = json!({
                    "id": ns.id,
                    "name": ns.name,
                    "canonical": ns.canonical,
                    "case": case_name(ns.case),
                    "content": ns.content,
                    "subpages": ns.subpages,
                });
                (ns.id.to_string(), object)
            })
            .collect::<Map<_, _>>();
        let aliases = self
            .namespaces
            .iter()
            .flat_map(|ns| {
                ns.aliases
                    .iter()
                    .map(move |alias| json!({ "id": ns.id, "alias": alias }))
            })
            .collect::<Vec<_>>();
        let sitename = self
            .namespaces
            .find_by_id(Namespace::PROJECT)
            .map_or_else(|| self.family.name().to_string(), |ns| ns.name.clone());

        let mut out = Map::new();
        out.insert(
            "general".into(),
            json!({
                "sitename": sitename,
                "lang": self.code,
                "case": case_name(self.family.case()),
                "generator": "MediaWiki 1.43.0",
            }),
        );
        out.insert("namespaces".into(), Value::Object(namespaces));
        out.insert("namespacealiases".into(), Value::Array(aliases));
        out.insert(
            "magicwords".into(),
            json!([{ "name": "redirect", "aliases": ["#REDIRECT"] }]),
        );
        out
    }

    /// A short description of a page for list results.
    fn page_ref(&self, title: &str) -> Value {
        let mut object = json!({ "ns": self.ns_of(title), "title": title });
        if let Some(page) = self.pages.get(title) {
            object["pageid"] = page.pageid.into();
        }
        object
    }

    /// Runs a list or generator module. Returns one batch of items and the
    /// continuation parameters, if there are more.
    fn module(
        &self,
        name: &str,
        generator: bool,
        params: &Params,
        batch_size: usize,
    ) -> (Vec<Value>, Option<Value>) {
        let prefix = match name {
            "allpages" => "ap",
            "backlinks" => "bl",
            "categories" => "cl",
            "categorymembers" => "cm",
            "embeddedin" => "ei",
            "images" => "im",
            "imageusage" => "iu",
            "links" => "pl",
            "search" => "sr",
            "templates" => "tl",
            "usercontribs" => "uc",
            _ => return (Vec::new(), None),
        };
        let key = if generator {
            format!("g{prefix}")
        } else {
            prefix.to_string()
        };
        let arg = |name: &str| params.get(&format!("{key}{name}")).map(String::as_str);
        let namespaces = arg("namespace").map(|list| {
            list.split('|')
                .filter_map(|ns| ns.parse::<i32>().ok())
                .collect::<Vec<_>>()
        });
        let in_namespace = |title: &str| {
            namespaces
                .as_ref()
                .is_none_or(|list| list.contains(&self.ns_of(title)))
        };
        let target = arg("title").map(|title| self.normalize(title));
        let pages_with = |table: fn(&MockPage) -> &Vec<String>| {
            self.pages
                .iter()
                .filter(|(title, page)| {
                    target
                        .as_ref()
                        .is_some_and(|target| table(page).contains(target))
                        && in_namespace(title)
                })
                .map(|(title, _)| self.page_ref(title))
                .collect::<Vec<_>>()
        };
        let of_source = |table: fn(&MockPage) -> &Vec<String>| {
            let source = params
                .get("titles")
                .and_then(|titles| titles.split('|').next())
                .map(|title| self.normalize(title))
                .unwrap_or_default();
            self.pages
                .get(&source)
                .map(|page| {
                    table(page)
                        .iter()
                        .filter(|title| in_namespace(title))
                        .map(|title| self.page_ref(title))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        let items = match name {
            "allpages" => {
                let ns = arg("namespace")
                    .and_then(|ns| ns.parse().ok())
                    .unwrap_or(Namespace::MAIN);
                let from = arg("from").unwrap_or_default();
                let start = arg("prefix").unwrap_or_default();
                let filter = arg("filterredir").unwrap_or("all");
                self.pages
                    .iter()
                    .filter(|(title, page)| {
                        let text = match page.ns {
                            Namespace::MAIN => title.as_str(),
                            _ => title.split_once(':').map_or(title.as_str(), |(_, text)| text),
                        };
                        page.ns == ns
                            && text >= from
                            && text.starts_with(start)
                            && match filter {
                                "redirects" => page.redirect_target().is_some(),
                                "nonredirects" => page.redirect_target().is_none(),
                                _ => true,
                            }
                    })
                    .map(|(title, _)| self.page_ref(title))
                    .collect()
            }
            "categorymembers" => {
                let types = split(params.get(&format!("{key}type")));
                let wanted = |ns: i32| {
                    let kind = match ns {
                        Namespace::CATEGORY => "subcat",
                        Namespace::FILE => "file",
                        _ => "page",
                    };
                    types.is_empty() || types.contains(&kind)
                };
                self.pages
                    .iter()
                    .filter(|(title, page)| {
                        target
                            .as_ref()
                            .is_some_and(|target| page.categories.contains(target))
                            && wanted(page.ns)
                            && in_namespace(title)
                    })
                    .map(|(title, _)| self.page_ref(title))
                    .collect()
            }
            "backlinks" => pages_with(|page| &page.links),
            "embeddedin" => pages_with(|page| &page.templates),
            "imageusage" => pages_with(|page| &page.images),
            "categories" => of_source(|page| &page.categories),
            "images" => of_source(|page| &page.images),
            "links" => of_source(|page| &page.links),
            "templates" => of_source(|page| &page.templates),
            "search" => {
                let term = arg("search").unwrap_or_default().to_lowercase();
                self.pages
                    .iter()
                    .filter(|(title, page)| {
                        in_namespace(title)
                            && (title.to_lowercase().contains(&term)
                                || page.text().to_lowercase().contains(&term))
                    })
                    .map(|(title, _)| self.page_ref(title))
                    .collect()
            }
            "usercontribs" => {
                let user = arg("user").unwrap_or_default();
                let mut contributions = self
                    .pages
                    .iter()
                    .filter(|(title, _)| in_namespace(title))
                    .flat_map(|(title, page)| {
                        page.revisions
                            .iter()
                            .filter(move |revision| revision.user == user)
                            .map(move |revision| (revision.revid, title, page))
                    })
                    .collect::<Vec<_>>();
                contributions.sort_by(|a, b| b.0.cmp(&a.0));
                contributions
                    .into_iter()
                    .map(|(revid, title, page)| {
                        json!({
                            "user": user,
                            "pageid": page.pageid,
                            "revid": revid,
                            "ns": page.ns,
                            "title": title,
                            "timestamp": timestamp(revid),
                        })
                    })
                    .collect()
            }
            _ => unreachable!(),
        };

        let limit = arg("limit")
            .and_then(|limit| limit.parse::<usize>().ok())
            .unwrap_or(batch_size)
            .min(batch_size);
        let offset = arg("continue")
            .and_then(|offset| offset.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (offset + limit).min(items.len());
        let more = (end < items.len()).then(|| json!({ format!("{key}continue"): end.to_string() }));
        let items = items.into_iter().skip(offset).take(end.saturating_sub(offset)).collect();
        (items, more)
    }

    /// A page object of a page query.
    fn page_object(&self, title: &str, params: &Params) -> Value {
        let props = split(params.get("prop"));
        let ns = self.ns_of(title);
        let mut object = json!({ "ns": ns, "title": title });

        match self.pages.get(title) {
            None => object["missing"] = true.into(),
            Some(page) => {
                object["pageid"] = page.pageid.into();
                if props.contains(&"info") {
                    object["lastrevid"] = page.latest().revid.into();
                    object["length"] = page.text().len().into();
                    if page.redirect_target().is_some() {
                        object["redirect"] = true.into();
                    }
                    if split(params.get("inprop")).contains(&"protection") {
                        object["protection"] = page
                            .protection
                            .iter()
                            .map(|(action, level)| {
                                json!({ "type": action, "level": level, "expiry": "infinity" })
                            })
                            .collect();
                    }
                }
                if props.contains(&"revisions") {
                    object["revisions"] = self.revisions(page, params);
                }
                if props.contains(&"langlinks") && !page.langlinks.is_empty() {
                    object["langlinks"] = page
                        .langlinks
                        .iter()
                        .map(|(lang, title)| json!({ "lang": lang, "title": title }))
                        .collect();
                }
                if props.contains(&"imageinfo")
                    && let Some((size, width, height)) = page.file
                {
                    let name = title.split_once(':').map_or(title, |(_, name)| name);
                    let mime = match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
                        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
                        Some(ext) if ext == "png" => "image/png",
                        _ => "application/octet-stream",
                    };
                    let first = &page.revisions[0];
                    object["imageinfo"] = json!([{
                        "url": format!("https://upload.wikimedia.org/{}/{}", self.code, name.replace(' ', "_")),
                        "size": size,
                        "width": width,
                        "height": height,
                        "mime": mime,
                        "sha1": format!("{:040x}", page.pageid),
                        "timestamp": timestamp(first.revid),
                        "user": first.user,
                    }]);
                }
            }
        }

        if props.contains(&"categoryinfo") && ns == Namespace::CATEGORY {
            let members = self
                .pages
                .values()
                .filter(|page| page.categories.iter().any(|category| category == title))
                .collect::<Vec<_>>();
            let count = |ns: i32| members.iter().filter(|page| page.ns == ns).count();
            let files = count(Namespace::FILE);
            let subcats = count(Namespace::CATEGORY);
            object["categoryinfo"] = json!({
                "size": members.len(),
                "pages": members.len() - files - subcats,
                "files": files,
                "subcats": subcats,
            });
        }

        object
    }

    fn revisions(&self, page: &MockPage, params: &Params) -> Value {
        let props = split(params.get("rvprop"));
        let limit = params
            .get("rvlimit")
            .and_then(|limit| limit.parse::<usize>().ok())
            .unwrap_or(1);
        page.revisions
            .iter()
            .rev()
            .take(limit)
            .map(|revision| {
                let mut object = json!({
                    "revid": revision.revid,
                    "user": revision.user,
                    "timestamp": if page.garbled_timestamps {
                        "yesterday".to_string()
                    } else {
                        timestamp(revision.revid)
                    },
                    "comment": revision.comment,
                    "minor": revision.minor,
                });
                if props.contains(&"content") {
                    object["slots"] = json!({
                        "main": { "contentmodel": "wikitext", "content": revision.text }
                    });
                }
                object
            })
            .collect()
    }

    fn check_token(params: &Params) -> Result<(), Value> {
        if params.get("token").map(String::as_str) == Some(CSRF_TOKEN) {
            Ok(())
        } else {
            Err(error("badtoken", "Invalid CSRF token."))
        }
    }

    fn edit(&mut self, params: &Params) -> Value {
        if let Err(err) = Self::check_token(params) {
            return err;
        }
        let title = self.normalize(params.get("title").map_or("", String::as_str));
        let text = params.get("text").map_or("", String::as_str).trim_end();
        let page = self.pages.get(&title);

        if page.is_some_and(|page| page.is_protected("edit")) {
            return error(
                "protectedpage",
                "This page has been protected to prevent editing or other actions.",
            );
        }
        if page.is_some() && params.contains_key("createonly") {
            return error("articleexists", "The article you tried to create has been created already.");
        }
        if page.is_none() && params.contains_key("nocreate") {
            return error("missingtitle", "The page you specified doesn't exist.");
        }
        if let Some(page) = page
            && let Some(base) = params.get("baserevid")
            && *base != page.latest().revid.to_string()
        {
            return error("editconflict", "Edit conflict.");
        }
        if let Some(page) = page
            && page.text() == text
        {
            return json!({
                "edit": { "result": "Success", "pageid": page.pageid, "title": title, "nochange": true }
            });
        }

        let user = self.user();
        let summary = params.get("summary").map_or("", String::as_str);
        let (old, new) = self.save(&title, &user, summary, text, params.contains_key("minor"));
        json!({
            "edit": {
                "result": "Success",
                "pageid": self.pages[&title].pageid,
                "title": title,
                "oldrevid": old,
                "newrevid": new,
                "newtimestamp": timestamp(new),
            }
        })
    }

    fn move_page(&mut self, params: &Params) -> Value {
        if let Err(err) = Self::check_token(params) {
            return err;
        }
        let from = self.normalize(params.get("from").map_or("", String::as_str));
        let to = self.normalize(params.get("to").map_or("", String::as_str));
        let Some(page) = self.pages.get(&from) else {
            return error("missingtitle", "The page you specified doesn't exist.");
        };
        if page.is_protected("move") {
            return error("protectedpage", "This page has been protected to prevent moving.");
        }
        if self.pages.contains_key(&to) {
            return error("articleexists", "A page of that name already exists.");
        }

        let mut page = self.pages.remove(&from).expect("page exists");
        page.ns = self.ns_of(&to);
        self.pages.insert(to.clone(), page);
        let redirect = !params.contains_key("noredirect");
        if redirect {
            let user = self.user();
            self.save(&from, &user, "moved", &format!("#REDIRECT [[{to}]]"), false);
        }
        json!({
            "move": {
                "from": from,
                "to": to,
                "reason": params.get("reason").cloned().unwrap_or_default(),
                "redirectcreated": redirect,
            }
        })
    }

    fn delete(&mut self, params: &Params) -> Value {
        if let Err(err) = Self::check_token(params) {
            return err;
        }
        let title = self.normalize(params.get("title").map_or("", String::as_str));
        if self.pages.remove(&title).is_none() {
            return error("missingtitle", "The page you specified doesn't exist.");
        }
        json!({
            "delete": {
                "title": title,
                "reason": params.get("reason").cloned().unwrap_or_default(),
                "logid": self.next_id(),
            }
        })
    }

    fn login(&mut self, params: &Params) -> Value {
        if params.get("lgtoken").map(String::as_str) != Some(LOGIN_TOKEN) {
            return json!({ "login": { "result": "WrongToken" } });
        }
        let name = params.get("lgname").cloned().unwrap_or_default();
        if params.get("lgpassword").map(String::as_str) != Some(PASSWORD) {
            return json!({
                "login": {
                    "result": "Failed",
                    "reason": "Incorrect username or password entered. Please try again.",
                }
            });
        }
        self.logged_in = Some(name.clone());
        json!({ "login": { "result": "Success", "lguserid": 1, "lgusername": name } })
    }
}
