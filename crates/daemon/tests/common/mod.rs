//! Shared fixtures: local upstreams and a self-signed certificate

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::pki_types::CertificateDer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Upstream that answers every request with what it received.
///
/// The request target, `Host`, method and `X-Forwarded-For` come back as
/// `x-upstream-*` headers and the body is echoed. Paths ending in `/missing`
/// get a 404.
pub async fn spawn_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let service = service_fn(|request: Request<Incoming>| async move {
                    let header = |name: &str| {
                        request
                            .headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string()
                    };
                    let status = if request.uri().path().ends_with("/missing") {
                        StatusCode::NOT_FOUND
                    } else {
                        StatusCode::OK
                    };
                    let response = Response::builder()
                        .status(status)
                        .header("x-upstream-uri", request.uri().to_string())
                        .header("x-upstream-host", header("host"))
                        .header("x-upstream-method", request.method().as_str())
                        .header("x-upstream-forwarded-for", header("x-forwarded-for"));
                    let body = request.into_body().collect().await?.to_bytes();
                    Ok::<_, hyper::Error>(response.body(Full::new(body)).unwrap())
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// Upstream that accepts connections and never answers
pub async fn spawn_stalled_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    addr
}

/// An address nothing listens on
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Self-signed certificate for the GitHub hosts written as PEM files
pub struct TestCert {
    pub dir: TempDir,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub der: CertificateDer<'static>,
}

pub fn test_cert() -> TestCert {
    let rcgen::CertifiedKey { cert, signing_key } = rcgen::generate_simple_self_signed(vec![
        "github.com".to_string(),
        "raw.githubusercontent.com".to_string(),
    ])
    .unwrap();

    let dir = TempDir::new().unwrap();
    let cert_file = dir.path().join("github.com.pem");
    let key_file = dir.path().join("github.com-key.pem");
    std::fs::write(&cert_file, cert.pem()).unwrap();
    std::fs::write(&key_file, signing_key.serialize_pem()).unwrap();

    TestCert {
        dir,
        cert_file,
        key_file,
        der: cert.der().clone(),
    }
}

pub async fn body_bytes(response: Response<Incoming>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub fn header<B>(response: &Response<B>, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
