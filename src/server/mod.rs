pub mod pool;

use crate::auth;
use crate::http::request::{parse_request, ParseError};
use crate::http::response::{write_response, ApiError};
use crate::router::{RequestContext, Router};
use crate::state::AppState;
use pool::ThreadPool;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const LISTEN_BACKLOG: i32 = 128;
const POLL_TIMEOUT_MS: i32 = 1000;

/// Non-blocking acceptor with a level-triggered readiness loop. Accepted
/// sockets are registered for read readiness; once readable they are
/// switched to blocking mode and handed to the worker pool, which owns them
/// through the response.
pub struct Server {
    listener: TcpListener,
    pending: Vec<TcpStream>,
    state: AppState,
    router: Arc<Router>,
    pool: ThreadPool,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(state: AppState, router: Router, shutdown: Arc<AtomicBool>) -> io::Result<Server> {
        let addr: SocketAddr = ([0, 0, 0, 0], state.config.port).into();
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;

        let workers = ThreadPool::default_size();
        info!(addr = %listener.local_addr()?, workers, "server listening");
        Ok(Server {
            listener,
            pending: Vec::new(),
            state,
            router: Arc::new(router),
            pool: ThreadPool::new(workers),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Blocks until the shutdown flag is raised. The 1-second poll timeout
    /// bounds how long a quiet loop takes to notice the flag; a signal also
    /// interrupts the wait directly.
    pub fn run(&mut self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            let mut fds: Vec<libc::pollfd> = Vec::with_capacity(1 + self.pending.len());
            fds.push(libc::pollfd {
                fd: self.listener.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
            for stream in &self.pending {
                fds.push(libc::pollfd {
                    fd: stream.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                });
            }

            let ready = unsafe {
                libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, POLL_TIMEOUT_MS)
            };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!(error = %err, "poll failed");
                break;
            }
            if ready == 0 {
                continue;
            }

            if fds[0].revents & libc::POLLIN != 0 {
                self.accept_ready();
            }

            // Walk connection slots back to front so swap_remove only moves
            // entries whose readiness was already inspected.
            let interest = libc::POLLIN | libc::POLLERR | libc::POLLHUP;
            for i in (1..fds.len()).rev() {
                if fds[i].revents & interest != 0 {
                    let stream = self.pending.swap_remove(i - 1);
                    self.dispatch(stream);
                }
            }
        }
        info!("acceptor loop stopped");
    }

    /// Drains the accept queue, registering each new socket for readiness.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "accepted connection");
                    if let Err(err) = stream.set_nonblocking(true) {
                        warn!(error = %err, "failed to set socket non-blocking");
                        continue;
                    }
                    self.pending.push(stream);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    break;
                }
            }
        }
    }

    /// Switches a readable socket to blocking mode and hands it to a worker.
    fn dispatch(&self, stream: TcpStream) {
        if let Err(err) = stream.set_nonblocking(false) {
            warn!(error = %err, "failed to restore blocking mode");
            return;
        }
        let state = self.state.clone();
        let router = Arc::clone(&self.router);
        self.pool.submit(Box::new(move || {
            handle_connection(&state, &router, stream);
        }));
    }
}

/// One request, one response, close. Runs on a worker thread with a blocking
/// socket.
fn handle_connection(state: &AppState, router: &Router, mut stream: TcpStream) {
    let request = match parse_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            debug!(error = %err, "rejected request");
            if !matches!(err, ParseError::ConnectionClosed | ParseError::Io(_)) {
                let reject = ApiError::bad_request("malformed request").into_response();
                let _ = write_response(&mut stream, reject);
            }
            return;
        }
    };

    let user = match auth::authenticate(state, &request) {
        Ok(user) => user,
        Err(err) => {
            let _ = write_response(&mut stream, ApiError::internal(err).into_response());
            return;
        }
    };

    let mut ctx = RequestContext::new(state, &request, user);
    let response = match router.dispatch(&mut ctx) {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };
    if let Err(err) = write_response(&mut stream, response) {
        debug!(error = %err, method = %request.method, path = %request.path, "send failed");
    }
}
