//! The MediaWiki action API.
//!
//! [`Request`] sends one API call through the site's HTTP transport and
//! handles the parts of the protocol every call shares: the common
//! parameters, replication lag back-off, and translation of API error codes
//! into [`Error`] variants. [`QueryGenerator`] walks a `list=`, `prop=`, or
//! `generator=` query across as many continuation requests as it takes, and
//! [`PageGenerator`] turns the results of a `generator=` query into pages.

use crate::{
    error::{Error, Result},
    http::Method,
    page::Page,
    site::Site,
};
use serde_json::{Map, Value};
use std::{collections::VecDeque, sync::Arc, time::Duration};

/// Parameters whose value names the page a request is about.
const TITLE_PARAMS: &[&str] = &["title", "titles", "from", "page"];

/// A single API request.
#[derive(Clone, Debug)]
pub struct Request<'a> {
    /// The target site.
    site: &'a Site,
    /// Request-specific parameters.
    params: Vec<(String, String)>,
    /// The HTTP method. Writes must be POSTed.
    method: Method,
}

impl<'a> Request<'a> {
    /// Creates an empty GET request.
    pub fn new(site: &'a Site) -> Self {
        Self {
            site,
            params: Vec::new(),
            method: Method::Get,
        }
    }

    /// Sets a parameter, replacing any previous value.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key.into(), value.into());
        self
    }

    /// Sets many parameters.
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            self.set(key.into(), value.into());
        }
        self
    }

    /// Sends the request as a POST.
    pub fn post(mut self) -> Self {
        self.method = Method::Post;
        self
    }

    /// The value of a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v.as_str()))
    }

    /// Sets a parameter in place.
    fn set(&mut self, key: String, value: String) {
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some((_, old)) => *old = value,
            None => self.params.push((key, value)),
        }
    }

    /// The complete parameter list as sent on the wire.
    fn wire_params(&self) -> Vec<(String, String)> {
        let mut params = self.params.clone();
        for (key, value) in [
            ("format", "json".to_string()),
            ("formatversion", "2".to_string()),
            ("maxlag", self.site.config().maxlag.to_string()),
        ] {
            if self.get(key).is_none() {
                params.push((key.into(), value));
            }
        }
        params
    }

    /// Sends the request and returns the decoded response.
    ///
    /// Lagged and garbled responses are retried after a pause, up to the
    /// configured retry limit. API errors become the matching [`Error`].
    pub fn submit(&self) -> Result<Value> {
        let url = self.site.api_url();
        let params = self.wire_params();
        let mut retry = Retry::new(self.site);

        loop {
            let body = self
                .site
                .transport()
                .request(self.method, url.as_str(), params.clone())?;

            let response = match serde_json::from_str::<Value>(&body) {
                Ok(response) => response,
                Err(err) => {
                    log::warn!("{}: unparseable response ({err})", self.site);
                    retry.wait()?;
                    continue;
                }
            };

            if let Some(error) = response.get("error") {
                let code = error["code"].as_str().unwrap_or_default();
                let info = error["info"].as_str().unwrap_or_default();
                if code == "maxlag" {
                    log::debug!("{}: {info}", self.site);
                    retry.wait()?;
                    continue;
                }
                return Err(translate_error(code, info, self.title()));
            }

            if let Some(warnings) = response.get("warnings") {
                log::warn!("{}: API warnings: {warnings}", self.site);
            }

            return Ok(response);
        }
    }

    /// The page the request is about, for error messages.
    fn title(&self) -> &str {
        TITLE_PARAMS
            .iter()
            .find_map(|key| self.get(key))
            .unwrap_or_default()
    }
}

/// Retry bookkeeping for one request.
struct Retry<'a> {
    /// The site, for configuration and log messages.
    site: &'a Site,
    /// Retries so far.
    count: u32,
    /// Total time spent waiting.
    waited: Duration,
    /// The total wait when the streak was last logged.
    logged_at: Duration,
}

impl<'a> Retry<'a> {
    fn new(site: &'a Site) -> Self {
        Self {
            site,
            count: 0,
            waited: Duration::ZERO,
            logged_at: Duration::ZERO,
        }
    }

    /// Sleeps before the next attempt, or fails if the retry limit has been
    /// reached.
    fn wait(&mut self) -> Result<()> {
        let config = self.site.config();
        if config.max_retries.is_some_and(|max| self.count >= max) {
            log::error!("{}: giving up after {} retries", self.site, self.count);
            return Err(Error::MaxRetries(self.count));
        }
        self.count += 1;

        let pause = config.retry_wait();
        std::thread::sleep(pause);
        self.waited += pause;
        if self.waited.saturating_sub(self.logged_at) >= config.retry_log_interval()
            && !self.waited.is_zero()
        {
            log::warn!(
                "{}: still waiting for the server after {:?} ({} retries)",
                self.site,
                self.waited,
                self.count
            );
            self.logged_at = self.waited;
        }
        Ok(())
    }
}

/// Converts an API error code into an [`Error`].
pub fn translate_error(code: &str, info: &str, title: &str) -> Error {
    let locked = || Error::LockedPage {
        title: title.into(),
        info: info.into(),
    };
    let denied = || Error::PermissionDenied {
        code: code.into(),
        info: info.into(),
    };

    match code {
        "editconflict" => Error::EditConflict(title.into()),
        "protectedpage" | "cascadeprotected" | "protectedtitle" => locked(),
        "spamdetected" | "spamblacklist" => Error::SpamFilter(spam_fragment(info).into()),
        "noapiwrite" | "writeapidenied" | "permissiondenied" | "cantdelete" | "blocked"
        | "autoblocked" => denied(),
        "missingtitle" => Error::NoPage(title.into()),
        _ if code.starts_with("protectednamespace") => locked(),
        _ if ["cantcreate", "noedit", "badaccess-", "cantmove"]
            .iter()
            .any(|prefix| code.starts_with(prefix)) =>
        {
            denied()
        }
        _ => Error::Api {
            code: code.into(),
            info: info.into(),
        },
    }
}

/// Pulls the offending URL out of a spam filter message.
fn spam_fragment(info: &str) -> &str {
    if let Some((_, rest)) = info.split_once("``")
        && let Some((fragment, _)) = rest.split_once("``")
    {
        return fragment;
    }
    info.rsplit_once(':')
        .map_or(info, |(_, rest)| rest)
        .trim()
        .trim_end_matches('.')
}

/// Where a query keeps the items it returns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResultPath {
    /// `query.<module>`, for `list=` modules.
    List(String),
    /// `query.pages`, for `generator=` queries and plain page queries.
    Pages,
    /// `query.pages[].<module>`, for `prop=` modules.
    PageProp(String),
}

/// An iterator over the items of a query, following continuations.
pub struct QueryGenerator {
    /// The target site.
    site: Arc<Site>,
    /// The query parameters, without continuation parameters.
    params: Vec<(String, String)>,
    /// Where items live in a response.
    path: ResultPath,
    /// The continuation parameters of the next request, or `None` once the
    /// query is exhausted.
    next: Option<Vec<(String, String)>>,
    /// Items from the last response which have not been yielded yet.
    buffer: VecDeque<Value>,
    /// The maximum number of items to yield.
    limit: Option<usize>,
    /// The number of items yielded so far.
    count: usize,
}

impl QueryGenerator {
    /// Creates a query. `action=query` and `rawcontinue=1` are added.
    pub fn new<I, K, V>(site: &Arc<Site>, path: ResultPath, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut all = vec![
            ("action".to_string(), "query".to_string()),
            ("rawcontinue".into(), "1".into()),
        ];
        all.extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self {
            site: Arc::clone(site),
            params: all,
            path,
            next: Some(Vec::new()),
            buffer: VecDeque::new(),
            limit: None,
            count: 0,
        }
    }

    /// Stops after `limit` items.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// The target site.
    pub fn site(&self) -> &Arc<Site> {
        &self.site
    }

    /// Requests the next batch of items.
    fn fetch(&mut self, continuation: Vec<(String, String)>) -> Result<()> {
        let response = Request::new(&self.site)
            .params(self.params.iter().cloned())
            .params(continuation)
            .submit()?;

        self.next = continuation_params(&response)?;
        let query = &response["query"];
        match &self.path {
            ResultPath::List(module) => {
                self.buffer
                    .extend(query[module].as_array().into_iter().flatten().cloned());
            }
            ResultPath::Pages => {
                self.buffer
                    .extend(query["pages"].as_array().into_iter().flatten().cloned());
            }
            ResultPath::PageProp(module) => {
                for page in query["pages"].as_array().into_iter().flatten() {
                    self.buffer
                        .extend(page[module].as_array().into_iter().flatten().cloned());
                }
            }
        }
        log::trace!(
            "{}: query batch of {} item(s), more: {}",
            self.site,
            self.buffer.len(),
            self.next.is_some()
        );
        Ok(())
    }
}

impl Iterator for QueryGenerator {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit.is_some_and(|limit| self.count >= limit) {
            return None;
        }

        while self.buffer.is_empty() {
            let continuation = self.next.take()?;
            if let Err(err) = self.fetch(continuation) {
                self.next = None;
                return Some(Err(err));
            }
        }

        self.count += 1;
        self.buffer.pop_front().map(Ok)
    }
}

/// An iterator over the pages a `generator=` query returns, with their page
/// info already cached.
pub struct PageGenerator(QueryGenerator);

impl PageGenerator {
    /// Creates a generator query. `prop=info` is added.
    pub fn new<I, K, V>(site: &Arc<Site>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .chain([
                ("prop".to_string(), "info".to_string()),
                ("inprop".into(), "protection".into()),
            ]);
        Self(QueryGenerator::new(site, ResultPath::Pages, params))
    }

    /// Stops after `limit` pages.
    pub fn with_limit(self, limit: Option<usize>) -> Self {
        Self(self.0.with_limit(limit))
    }
}

impl Iterator for PageGenerator {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.0.next()?;
        Some(item.and_then(|item| Page::from_api(self.0.site(), &item)))
    }
}

/// Reads the continuation parameters from a response. Returns `None` when
/// the query is complete.
fn continuation_params(response: &Value) -> Result<Option<Vec<(String, String)>>> {
    if let Some(raw) = response.get("query-continue") {
        let modules = raw
            .as_object()
            .ok_or_else(|| Error::Protocol("query-continue is not an object".into()))?;
        let mut modules = modules.values();
        let (Some(params), None) = (modules.next(), modules.next()) else {
            return Err(Error::Protocol(format!(
                "expected one continuation module, got {raw}"
            )));
        };
        return params
            .as_object()
            .map(object_params)
            .map(Some)
            .ok_or_else(|| Error::Protocol(format!("bad continuation {params}")));
    }

    Ok(response
        .get("continue")
        .and_then(Value::as_object)
        .map(object_params))
}

/// Flattens a JSON object of scalars into request parameters.
fn object_params(object: &Map<String, Value>) -> Vec<(String, String)> {
    object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}
