//! HTTP gateway fronting every request with the admission gate.

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::middleware;
use crate::error::Result;
use crate::ratelimit::AdmissionControl;

/// HTTP/1 server answering `200 OK` to admitted requests and `429` otherwise.
pub struct Gateway<A: AdmissionControl + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The admission controller
    limiter: Arc<A>,
}

impl<A: AdmissionControl + 'static> Gateway<A> {
    pub fn new(addr: SocketAddr, limiter: Arc<A>) -> Self {
        Self { addr, limiter }
    }

    /// Bind and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener_with_shutdown(listener, signal).await
    }

    /// Serve connections from an already bound listener until `signal`
    /// resolves. Connections in flight are left to finish on their own.
    pub async fn serve_listener_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(addr = %listener.local_addr()?, "Starting admission gateway");
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "accept error");
                            continue;
                        }
                    };

                    let limiter = Arc::clone(&self.limiter);
                    tokio::spawn(async move {
                        let svc = service_fn(move |req: Request<Incoming>| {
                            let resp = handle(limiter.as_ref(), &req, peer);
                            async move { Ok::<_, Infallible>(resp) }
                        });

                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), svc)
                            .await
                        {
                            warn!(?peer, error = %e, "serve_connection error");
                        }
                    });
                }
            }
        }

        Ok(())
    }
}

/// Answer one request: the gate's rejection, or `200 OK`.
pub fn handle<A, B>(limiter: &A, req: &Request<B>, peer: SocketAddr) -> Response<Full<Bytes>>
where
    A: AdmissionControl + ?Sized,
{
    let remote_addr = peer.to_string();
    match middleware::check(limiter, req.headers(), Some(&remote_addr)) {
        Some(rejection) => rejection,
        None => Response::new(Full::new(Bytes::from_static(b"OK"))),
    }
}
