use anyhow::Context as _;
use axum::Router;
use axum::http::{Method, Uri};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// API prefix the mock upstream serves under, mirroring a real instance.
pub const API_PREFIX: &str = "/api/v1";

/// Local HTTP server standing in for the upstream instance.
///
/// Shuts down gracefully when dropped.
pub struct MockUpstream {
    site_url: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockUpstream {
    /// Serve `app` on an ephemeral localhost port.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn spawn(app: Router) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind mock upstream")?;
        let addr = listener.local_addr().context("mock upstream local_addr")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        tokio::spawn(async move {
            let _ = server.await;
        });

        Ok(Self {
            site_url: format!("http://{addr}"),
            shutdown: Some(shutdown_tx),
        })
    }

    /// `http://127.0.0.1:<port>`
    #[must_use]
    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// `http://127.0.0.1:<port>/api/v1`
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("{}{API_PREFIX}", self.site_url)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    #[must_use]
    pub fn new(method: &Method, uri: &Uri, body: &[u8]) -> Self {
        let query = uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            method: method.clone(),
            path: uri.path().to_string(),
            query,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn param_count(&self, key: &str) -> usize {
        self.query.iter().filter(|(k, _)| k == key).count()
    }
}

/// Shared log of requests seen by a mock handler.
#[derive(Debug, Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<RecordedRequest>>>);

impl RequestLog {
    pub fn record(&self, req: RecordedRequest) {
        self.0.lock().push(req);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.0.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Requests whose path ends with `suffix`.
    #[must_use]
    pub fn matching(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.0
            .lock()
            .iter()
            .filter(|r| r.path.ends_with(suffix))
            .cloned()
            .collect()
    }
}
