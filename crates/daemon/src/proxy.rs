//! Per-host upstream rewriting and forwarding
//!
//! A [`ProxyInstance`] holds the rewrite rule for one incoming `Host`: every
//! request is sent to `<proxy target>/https://<host><path>?<query>` with the
//! `Host` header replaced by the target's host. Responses are streamed back
//! untouched apart from hop-by-hop headers.

use crate::error::RouteError;
use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_TYPE, HOST, HeaderName, HeaderValue, TE};
use http::request::Parts;
use http::uri::{Authority, Scheme};
use http::{HeaderMap, Request, Response, StatusCode, Uri, Version};
use http_body_util::{BodyExt, Empty, Full, combinators::BoxBody};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::{ClientConfig, RootCertStore};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

/// Body type used on both sides of the proxy
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Shared HTTP(S) client used for every upstream request
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, ProxyBody>;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that only apply to a single connection
const HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Build the client used to reach the mirror, trusting the webpki roots
pub fn build_upstream_client() -> Result<UpstreamClient, rustls::Error> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let tls_config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// A fixed body
pub fn full(body: impl Into<Bytes>) -> ProxyBody {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed()
}

/// An empty body
pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Plain-text response carrying the canonical reason and a detail line
pub fn error_response(status: StatusCode, detail: impl std::fmt::Display) -> Response<ProxyBody> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = Response::new(full(format!("{reason}: {detail}\n")));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Rewrite rule toward the mirror for one incoming host
#[derive(Debug)]
pub struct ProxyInstance {
    host: String,
    target: Url,
    scheme: Scheme,
    authority: Authority,
    host_header: HeaderValue,
}

impl ProxyInstance {
    /// Parse `<proxy_target>/https://<host>` as the upstream for `host`
    pub fn new(proxy_target: &str, host: &str) -> Result<Self, RouteError> {
        let url = format!("{proxy_target}/https://{host}");
        let target = Url::parse(&url).map_err(|source| RouteError::Parse {
            url: url.clone(),
            source,
        })?;

        let scheme = match target.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            _ => return Err(RouteError::Unsupported { url }),
        };
        let Some(target_host) = target.host_str() else {
            return Err(RouteError::Unsupported { url });
        };
        // Url drops a port equal to the scheme default; keep it as written
        let port = url
            .parse::<Uri>()
            .ok()
            .and_then(|uri| uri.authority().and_then(Authority::port_u16))
            .or_else(|| target.port());
        let authority = match port {
            Some(port) => format!("{target_host}:{port}"),
            None => target_host.to_string(),
        };
        let host_header = HeaderValue::from_str(&authority).map_err(|e| RouteError::Rewrite {
            url: url.clone(),
            source: e.into(),
        })?;
        let authority = authority
            .parse::<Authority>()
            .map_err(|e| RouteError::Rewrite {
                url: url.clone(),
                source: e.into(),
            })?;

        Ok(Self {
            host: host.to_string(),
            target,
            scheme,
            authority,
            host_header,
        })
    }

    /// The incoming host this instance serves
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The parsed upstream base URL
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Value written to the outgoing `Host` header
    pub fn upstream_host(&self) -> &str {
        self.authority.as_str()
    }

    /// Map an incoming request URI onto the upstream, keeping path and query
    pub fn upstream_uri(&self, uri: &Uri) -> Result<Uri, http::Error> {
        let path = join_path(self.target.path(), uri.path());
        let path_and_query = match (self.target.query().unwrap_or(""), uri.query().unwrap_or("")) {
            ("", "") => path,
            (query, "") | ("", query) => format!("{path}?{query}"),
            (target_query, query) => format!("{path}?{target_query}&{query}"),
        };

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }

    /// Point request parts at the upstream
    pub fn rewrite(&self, parts: &mut Parts, client_ip: IpAddr) -> Result<(), RouteError> {
        parts.uri = self
            .upstream_uri(&parts.uri)
            .map_err(|source| RouteError::Rewrite {
                url: self.target.to_string(),
                source,
            })?;
        parts.version = Version::HTTP_11;

        remove_hop_headers(&mut parts.headers, true);
        parts.headers.insert(HOST, self.host_header.clone());
        append_forwarded_for(&mut parts.headers, client_ip);
        Ok(())
    }

    /// Send the request upstream and stream the response back.
    ///
    /// Transport failures become `502 Bad Gateway`; upstream statuses are
    /// returned as they are.
    pub async fn forward(
        &self,
        client: &UpstreamClient,
        request: Request<ProxyBody>,
        client_ip: IpAddr,
    ) -> Response<ProxyBody> {
        let (mut parts, body) = request.into_parts();
        if let Err(e) = self.rewrite(&mut parts, client_ip) {
            error!("{}", e);
            return error_response(StatusCode::BAD_REQUEST, e);
        }

        let uri = parts.uri.clone();
        debug!("Forwarding {} {} for {}", parts.method, uri, self.host);

        match client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                remove_hop_headers(&mut parts.headers, false);
                Response::from_parts(parts, body.boxed())
            }
            Err(e) => {
                error!("proxy error for {}: {}", uri, e);
                let mut response = Response::new(empty());
                *response.status_mut() = StatusCode::BAD_GATEWAY;
                response
            }
        }
    }
}

/// Join two URL paths with exactly one slash between them
fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Strip connection-scoped headers, including the ones named in `Connection`.
/// `TE: trailers` survives on requests.
fn remove_hop_headers(headers: &mut HeaderMap, request: bool) {
    let keep_trailers = request
        && headers.get_all(TE).iter().any(|value| {
            value.to_str().is_ok_and(|v| {
                v.split(',')
                    .any(|part| part.trim().eq_ignore_ascii_case("trailers"))
            })
        });

    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    for name in &listed {
        headers.remove(name.as_str());
    }
    for name in HOP_HEADERS {
        headers.remove(*name);
    }

    if keep_trailers {
        headers.insert(TE, HeaderValue::from_static("trailers"));
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    let value = if prior.is_empty() {
        client_ip.to_string()
    } else {
        format!("{}, {client_ip}", prior.join(", "))
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}
