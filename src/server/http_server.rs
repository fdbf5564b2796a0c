use super::request::to_http_request;
use super::response::{into_response, plain_response, status_reason};
use crate::app::Application;
use crate::dispatcher::FALLBACK_MESSAGE;
use crate::response::BufferedTransport;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Single-threaded HTTP host for an [`Application`].
pub struct HttpServer(pub Arc<Application>);

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    server: Arc<tiny_http::Server>,
    handle: JoinHandle<()>,
}

/// Stops the server loop from another thread (signal handlers, tests).
#[derive(Clone)]
pub struct Stopper(Arc<tiny_http::Server>);

impl Stopper {
    pub fn stop(&self) {
        self.0.unblock();
    }
}

impl ServerHandle {
    /// Address the server is bound to; useful after binding port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll until the listener accepts connections.
    ///
    /// # Errors
    ///
    /// `TimedOut` if the server is not reachable within ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    pub fn stopper(&self) -> Stopper {
        Stopper(Arc::clone(&self.server))
    }

    /// Stop accepting requests and wait for the in-flight one to finish.
    pub fn stop(self) {
        self.server.unblock();
        if self.handle.join().is_err() {
            error!("HTTP server thread panicked");
        }
    }

    /// Block until the server loop ends.
    ///
    /// # Errors
    ///
    /// The server thread panicked.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

impl HttpServer {
    pub fn new(app: Arc<Application>) -> Self {
        Self(app)
    }

    /// Build the route registry, bind `addr` and start the server thread.
    ///
    /// # Errors
    ///
    /// An invalid registry (reported as `InvalidData`), an invalid address, or a port that
    /// cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let app = self.0;
        app.registry()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let server = tiny_http::Server::http(addr).map_err(io::Error::other)?;
        let addr = server.server_addr().to_ip().unwrap_or(addr);
        let server = Arc::new(server);

        info!(addr = %addr, "HTTP server listening");
        let worker = Arc::clone(&server);
        let handle = thread::Builder::new()
            .name("brrtdispatch-http".to_string())
            .spawn(move || serve(&app, &worker))?;
        Ok(ServerHandle {
            addr,
            server,
            handle,
        })
    }
}

fn serve(app: &Application, server: &tiny_http::Server) {
    for mut request in server.incoming_requests() {
        let started = Instant::now();
        let method = request.method().to_string();
        let target = request.url().to_string();

        let response = match to_http_request(&mut request) {
            Ok(http_request) => {
                let mut transport = BufferedTransport::new();
                match app.handle_http(http_request, &mut transport) {
                    Ok(outcome) => {
                        info!(
                            method = %method,
                            target = %target,
                            status = outcome.code,
                            reason = status_reason(outcome.code),
                            dispatch_id = %outcome.dispatch_id,
                            duration_ms = started.elapsed().as_millis() as u64,
                            "HTTP request handled"
                        );
                        into_response(transport, outcome)
                    }
                    Err(e) => {
                        error!(method = %method, target = %target, error = %e, "Dispatch unavailable");
                        plain_response(500, FALLBACK_MESSAGE)
                    }
                }
            }
            Err(e) => {
                warn!(method = %method, target = %target, error = %e, "Unreadable request");
                plain_response(400, status_reason(400))
            }
        };

        if let Err(e) = request.respond(response) {
            debug!(target = %target, error = %e, "Client went away before the response was sent");
        }
    }
    info!("HTTP server stopped");
}
