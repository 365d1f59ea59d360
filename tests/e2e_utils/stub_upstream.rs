#![cfg(test)]
#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Canned answer for every request whose path and query start with `prefix`.
#[derive(Clone)]
pub struct StubRoute {
    pub prefix: String,
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl StubRoute {
    pub fn json(prefix: &str, status: u16, body: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            status,
            content_type: "application/json".to_string(),
            body: body.as_bytes().to_vec(),
            delay: Duration::from_millis(0),
        }
    }

    pub fn bytes(prefix: &str, status: u16, content_type: &str, body: &[u8]) -> Self {
        Self {
            prefix: prefix.to_string(),
            status,
            content_type: content_type.to_string(),
            body: body.to_vec(),
            delay: Duration::from_millis(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Plays the catalog, the CDN and the relays on one local port.
pub struct StubUpstream {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    _handle: JoinHandle<()>,
}

impl StubUpstream {
    pub async fn start(routes: Vec<StubRoute>) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let routes = Arc::new(routes);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let recorded = recorded.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let routes = routes.clone();
                        let recorded = recorded.clone();
                        async move { Ok::<_, Infallible>(Self::answer(&routes, &recorded, req).await) }
                    });

                    let _ = ServerBuilder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            _handle: handle,
        })
    }

    async fn answer(
        routes: &[StubRoute],
        recorded: &Mutex<Vec<String>>,
        req: Request<hyper::body::Incoming>,
    ) -> Response<Full<Bytes>> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default();
        recorded.lock().unwrap().push(path_and_query.clone());

        match routes.iter().find(|route| path_and_query.starts_with(&route.prefix)) {
            Some(route) => {
                if !route.delay.is_zero() {
                    tokio::time::sleep(route.delay).await;
                }
                Response::builder()
                    .status(route.status)
                    .header("content-type", route.content_type.as_str())
                    .body(Full::new(Bytes::from(route.body.clone())))
                    .unwrap()
            }
            None => Response::builder()
                .status(404)
                .body(Full::new(Bytes::from_static(b"no stub route")))
                .unwrap(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|pq| pq.starts_with(prefix))
            .cloned()
            .collect()
    }
}
