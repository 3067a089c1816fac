//! HTTP transport with a fixed pool of worker threads.
//!
//! Every request in the process goes through one bounded queue. Workers pull
//! requests off the queue and execute them with a shared [`HttpClient`]; each
//! request carries its own reply channel, so callers block only on their own
//! result.

use crate::{
    config::Config,
    error::{Error, Result},
};
use parking_lot::Mutex;
use std::{
    fs::File,
    io::BufReader,
    path::PathBuf,
    sync::{
        Arc,
        mpsc::{self, Receiver, SyncSender},
    },
    thread::JoinHandle,
};

/// An HTTP request method.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    /// Parameters are sent in the query string.
    Get,
    /// Parameters are sent as a form body.
    Post,
}

/// The wire-level client used by the worker pool.
pub trait HttpClient: Send + Sync {
    /// Executes a request and returns the response body.
    fn execute(&self, method: Method, url: &str, params: &[(String, String)]) -> Result<String>;

    /// Persists session cookies, if the client has somewhere to put them.
    fn save_cookies(&self) -> Result<()> {
        Ok(())
    }
}

/// A queued HTTP request.
pub struct HttpRequest {
    /// The request method.
    pub method: Method,
    /// The absolute URL.
    pub url: String,
    /// The request parameters.
    pub params: Vec<(String, String)>,
    /// The return channel.
    reply: mpsc::Sender<Result<String>>,
}

/// The queue message type. `None` tells one worker to exit.
type Message = Option<HttpRequest>;

/// A pool of HTTP worker threads.
pub struct Transport {
    /// The wire-level client shared by all workers.
    client: Arc<dyn HttpClient>,
    /// The sending side of the request queue. `None` once shut down.
    queue: Mutex<Option<SyncSender<Message>>>,
    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Transport {
    /// Starts `numthreads` workers (at least one) sharing a queue of
    /// `queue_size` requests.
    pub fn new(client: Arc<dyn HttpClient>, numthreads: usize, queue_size: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<Message>(queue_size);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..numthreads.max(1))
            .map(|index| {
                let client = Arc::clone(&client);
                let rx = Arc::clone(&rx);
                std::thread::Builder::new()
                    .name(format!("http-{index}"))
                    .spawn(move || worker(&*client, &rx))
                    .map_err(Error::from)
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("Started {} HTTP worker(s)", workers.len());

        Ok(Self {
            client,
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        })
    }

    /// Creates a transport for the production client described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = UreqClient::new(config)?;
        Self::new(Arc::new(client), config.numthreads, config.http_queue_size)
    }

    /// The wire-level client.
    pub fn client(&self) -> &Arc<dyn HttpClient> {
        &self.client
    }

    /// Queues a request and blocks until a worker has executed it.
    pub fn request(
        &self,
        method: Method,
        url: impl Into<String>,
        params: Vec<(String, String)>,
    ) -> Result<String> {
        let url = url.into();
        log::trace!("Queueing {method:?} {url}");

        let (tx, rx) = mpsc::channel();
        let queue = self.queue.lock().clone().ok_or(Error::TransportClosed)?;
        queue
            .send(Some(HttpRequest {
                method,
                url,
                params,
                reply: tx,
            }))
            .map_err(|_| Error::TransportClosed)?;
        rx.recv().map_err(|_| Error::TransportClosed)?
    }

    /// Stops all workers after they finish the requests already queued, and
    /// saves cookies. Requests made after shutdown fail with
    /// [`Error::TransportClosed`].
    pub fn shutdown(&self) {
        let Some(queue) = self.queue.lock().take() else {
            return;
        };

        let mut workers = self.workers.lock();
        for _ in 0..workers.len() {
            if queue.send(None).is_err() {
                break;
            }
        }
        drop(queue);

        for worker in workers.drain(..) {
            if worker.join().is_err() {
                log::error!("HTTP worker panicked");
            }
        }

        if let Err(err) = self.client.save_cookies() {
            log::warn!("Could not save cookies: {err}");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The worker thread main loop.
fn worker(client: &dyn HttpClient, rx: &Mutex<Receiver<Message>>) {
    loop {
        // The lock is held while waiting so that exactly one idle worker
        // receives each message.
        let message = rx.lock().recv();
        let Ok(Some(request)) = message else {
            break;
        };

        log::trace!("{:?} {}", request.method, request.url);
        let result = client.execute(request.method, &request.url, &request.params);
        // The caller may have given up waiting.
        let _ = request.reply.send(result);
    }
}

/// The production HTTP client.
pub struct UreqClient {
    /// The connection pool and cookie jar.
    agent: ureq::Agent,
    /// Where cookies are persisted.
    cookie_file: Option<PathBuf>,
    /// The `User-Agent` header.
    user_agent: String,
}

impl UreqClient {
    /// Creates a client and loads any persisted cookies.
    pub fn new(config: &Config) -> Result<Self> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .http_status_as_error(false)
            .build()
            .into();

        if let Some(path) = &config.cookie_file
            && path.exists()
        {
            let file = File::open(path)?;
            agent.cookie_jar_lock().load_json(BufReader::new(file))?;
            log::debug!("Loaded cookies from {}", path.display());
        }

        Ok(Self {
            agent,
            cookie_file: config.cookie_file.clone(),
            user_agent: config.user_agent.clone(),
        })
    }
}

impl HttpClient for UreqClient {
    fn execute(&self, method: Method, url: &str, params: &[(String, String)]) -> Result<String> {
        let pairs = params.iter().map(|(k, v)| (k.as_str(), v.as_str()));
        let mut response = match method {
            Method::Get => self
                .agent
                .get(url)
                .header("User-Agent", self.user_agent.as_str())
                .query_pairs(pairs)
                .call()?,
            Method::Post => self
                .agent
                .post(url)
                .header("User-Agent", self.user_agent.as_str())
                .send_form(pairs)?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!("{url}: HTTP {status}")));
        }

        Ok(response.body_mut().read_to_string()?)
    }

    fn save_cookies(&self) -> Result<()> {
        if let Some(path) = &self.cookie_file {
            let mut file = File::create(path)?;
            self.agent.cookie_jar_lock().save_json(&mut file)?;
            log::debug!("Saved cookies to {}", path.display());
        }
        Ok(())
    }
}
