//! HTTP fetch collaborator: robots policy, bounded transport, validators.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::failure::{FailureClass, FailureEvent};
use crate::core::robots::{RobotsRules, split_url};
use crate::core::types::FetchedPage;
use crate::core::validators::{validate_structure, validate_transport};
use crate::io::config::HttpConfig;

const ROBOTS_MAX_BYTES: u64 = 512 * 1024;

/// Fetches a URL and returns the page or the failure it represents.
///
/// Implementations convert every low-level fault into a [`FailureEvent`].
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FailureEvent>;
}

/// Blocking `ureq` fetcher with a per-origin robots cache.
pub struct HttpFetcher {
    agent: ureq::Agent,
    max_body_bytes: u64,
    robots: Mutex<HashMap<String, RobotsRules>>,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.read_timeout_ms))
            .user_agent(&config.user_agent)
            .redirects(5)
            .build();
        Self {
            agent,
            max_body_bytes: config.max_body_bytes,
            robots: Mutex::new(HashMap::new()),
        }
    }

    /// Whether robots.txt of the URL's origin allows fetching it.
    ///
    /// robots.txt is fetched once per origin; any fault allows (fail-open).
    fn robots_allowed(&self, origin: &str, path: &str) -> bool {
        let mut cache = match self.robots.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        let rules = cache
            .entry(origin.to_string())
            .or_insert_with(|| self.load_robots(origin));
        rules.is_allowed(path)
    }

    fn load_robots(&self, origin: &str) -> RobotsRules {
        let robots_url = format!("{origin}/robots.txt");
        match self.agent.get(&robots_url).call() {
            Ok(response) => {
                let mut body = Vec::new();
                if let Err(err) = response
                    .into_reader()
                    .take(ROBOTS_MAX_BYTES)
                    .read_to_end(&mut body)
                {
                    warn!(%origin, err = %err, "robots.txt read failed, allowing");
                    return RobotsRules::allow_all();
                }
                let rules = RobotsRules::parse(&String::from_utf8_lossy(&body));
                debug!(%origin, restrictive = !rules.is_empty(), "robots.txt loaded");
                rules
            }
            Err(err) => {
                debug!(%origin, err = %err, "robots.txt unavailable, allowing");
                RobotsRules::allow_all()
            }
        }
    }

    /// Header names are lowercased; repeated fields are joined with `", "`
    /// in arrival order. The body is read up to one byte past
    /// `max_body_bytes` so an oversized page can be told apart.
    fn read_page(&self, url: &str, response: ureq::Response) -> Result<FetchedPage, FailureEvent> {
        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers_names()
            .into_iter()
            .map(|name| {
                let value = response.all(&name).join(", ");
                (name.to_ascii_lowercase(), value)
            })
            .collect();

        let mut body = Vec::new();
        response
            .into_reader()
            .take(self.max_body_bytes.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|err| FailureEvent::network(format!("read body: {err}")))?;

        Ok(FetchedPage {
            url: url.to_string(),
            status,
            headers,
            body,
        })
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(skip(self))]
    fn fetch(&self, url: &str) -> Result<FetchedPage, FailureEvent> {
        let Some((origin, path)) = split_url(url) else {
            return Err(FailureEvent::new(
                FailureClass::ClientError,
                None,
                format!("unsupported url {url:?}"),
            ));
        };

        if !self.robots_allowed(&origin, &path) {
            info!("blocked by robots.txt");
            return Err(FailureEvent::new(
                FailureClass::ClientError,
                Some(403),
                "Blocked by robots.txt",
            ));
        }

        let response = match self
            .agent
            .get(url)
            .set(
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .set("accept-language", "en-US,en;q=0.9")
            .call()
        {
            Ok(response) => response,
            // Non-2xx statuses still carry headers (Retry-After) worth classifying.
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => {
                warn!(err = %err, "transport failure");
                return Err(FailureEvent::network(err.to_string()));
            }
        };

        let page = self.read_page(url, response)?;
        debug!(status = page.status, body_size = page.body.len(), "fetched");

        if let Some(failure) = validate_transport(&page) {
            return Err(failure);
        }
        // Oversized pages are rejected, never stored truncated.
        if page.body.len() as u64 > self.max_body_bytes {
            warn!(max_body_bytes = self.max_body_bytes, "body over size limit");
            return Err(FailureEvent::new(
                FailureClass::Semantic,
                Some(page.status),
                format!("body exceeds {} bytes", self.max_body_bytes),
            ));
        }
        if let Some(failure) = validate_structure(&page) {
            return Err(failure);
        }
        Ok(page)
    }
}
