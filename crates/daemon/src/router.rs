//! Host-keyed dispatch to lazily built proxy instances

use crate::error::RouteError;
use crate::proxy::{ProxyBody, ProxyInstance, UpstreamClient, error_response};
use dashmap::DashMap;
use http::header::HOST;
use http::{Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info};

/// Dispatches each request to the proxy instance for its `Host`.
///
/// Instances are built on first use and kept for the process lifetime.
/// Concurrent first requests for the same host share one instance.
pub struct ProxyRouter {
    target: String,
    client: UpstreamClient,
    cache: DashMap<String, Arc<ProxyInstance>>,
    constructed: AtomicUsize,
}

impl ProxyRouter {
    pub fn new(target: impl Into<String>, client: UpstreamClient) -> Self {
        Self {
            target: target.into(),
            client,
            cache: DashMap::new(),
            constructed: AtomicUsize::new(0),
        }
    }

    /// Return the cached instance for `host`, building it if absent.
    ///
    /// A failed build is not cached; the next request retries.
    pub fn proxy_for(&self, host: &str) -> Result<Arc<ProxyInstance>, RouteError> {
        if let Some(proxy) = self.cache.get(host) {
            return Ok(Arc::clone(&proxy));
        }

        let entry = self
            .cache
            .entry(host.to_string())
            .or_try_insert_with(|| {
                let proxy = ProxyInstance::new(&self.target, host)?;
                self.constructed.fetch_add(1, Ordering::Relaxed);
                debug!("Created proxy for {} -> {}", host, proxy.target());
                Ok::<_, RouteError>(Arc::new(proxy))
            })?;
        Ok(Arc::clone(&entry))
    }

    /// Serve one request. Never fails: errors become HTTP responses.
    pub async fn handle(&self, request: Request<ProxyBody>, remote: SocketAddr) -> Response<ProxyBody> {
        let host = match request_host(&request) {
            Ok(host) => host,
            Err(e) => {
                error!("{} from {}", e, remote);
                return error_response(StatusCode::BAD_REQUEST, e);
            }
        };

        match self.proxy_for(&host) {
            Ok(proxy) => {
                info!("requesting url: https://{}{}", host, request_target(&request));
                proxy.forward(&self.client, request, remote.ip()).await
            }
            Err(e) => {
                error!("{}", e);
                error_response(StatusCode::BAD_REQUEST, e)
            }
        }
    }

    /// Number of cached proxy instances
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of instances ever built
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::Relaxed)
    }
}

/// The `Host` header, falling back to the URI authority (HTTP/2)
fn request_host<B>(request: &Request<B>) -> Result<String, RouteError> {
    request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .or_else(|| request.uri().authority().map(http::uri::Authority::as_str))
        .map(str::to_string)
        .ok_or(RouteError::MissingHost)
}

fn request_target<B>(request: &Request<B>) -> &str {
    request
        .uri()
        .path_and_query()
        .map_or("/", http::uri::PathAndQuery::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{build_upstream_client, empty};
    use std::io;
    use std::sync::Mutex;

    fn router(target: &str) -> ProxyRouter {
        ProxyRouter::new(target, build_upstream_client().unwrap())
    }

    /// Log sink shared with a thread-local subscriber
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_proxy_for_caches_per_host() {
        let router = router("https://mirror.ghproxy.com");

        let first = router.proxy_for("github.com").unwrap();
        let again = router.proxy_for("github.com").unwrap();
        let gist = router.proxy_for("gist.github.com").unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &gist));
        assert_eq!(router.len(), 2);
        assert_eq!(router.constructed(), 2);
        assert_eq!(
            gist.target().as_str(),
            "https://mirror.ghproxy.com/https://gist.github.com"
        );
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let router = router("://bad-target");

        assert!(router.proxy_for("github.com").is_err());
        assert!(router.proxy_for("github.com").is_err());
        assert!(router.is_empty());
        assert_eq!(router.constructed(), 0);
    }

    #[tokio::test]
    async fn test_handle_bad_target_returns_400() {
        let router = router("://bad-target");
        let request = Request::builder()
            .uri("/fatindeed/github-proxy")
            .header(HOST, "github.com")
            .body(empty())
            .unwrap();

        let response = router.handle(request, "127.0.0.1:50000".parse().unwrap()).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(router.is_empty());
    }

    #[tokio::test]
    async fn test_parse_failure_logs_only_the_error() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let router = router("://bad-target");
        let request = Request::builder()
            .uri("/fatindeed/github-proxy")
            .header(HOST, "github.com")
            .body(empty())
            .unwrap();
        router.handle(request, "127.0.0.1:50000".parse().unwrap()).await;

        let logs = captured.text();
        assert!(logs.contains("parse ://bad-target/https://github.com error"));
        assert!(!logs.contains("requesting url"));
    }

    #[test]
    fn test_request_host_prefers_header() {
        let request = Request::builder()
            .uri("https://authority.example/path")
            .header(HOST, "github.com")
            .body(())
            .unwrap();
        assert_eq!(request_host(&request).unwrap(), "github.com");

        let request = Request::builder()
            .uri("https://gist.github.com/path")
            .body(())
            .unwrap();
        assert_eq!(request_host(&request).unwrap(), "gist.github.com");

        let request = Request::builder().uri("/path").body(()).unwrap();
        assert!(matches!(request_host(&request), Err(RouteError::MissingHost)));
    }

    #[test]
    fn test_request_target_defaults_to_root() {
        let request = Request::builder().uri("/a/b?c=d").body(()).unwrap();
        assert_eq!(request_target(&request), "/a/b?c=d");

        let request = Request::builder().uri("https://github.com").body(()).unwrap();
        assert_eq!(request_target(&request), "/");
    }
}
