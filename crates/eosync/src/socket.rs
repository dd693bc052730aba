//! Low-level TCP client socket with tick-driven connection establishment.
//!
//! The connect runs in non-blocking mode so the caller's tick loop stays
//! responsive; each tick while connecting polls the socket for writability
//! with a 1 ms bound and then reads `SO_ERROR` to learn the outcome. Once
//! established the socket flips to blocking mode: sends are best-effort
//! blocking writes, reads are bounded by a per-call timeout.
//!
//! Any transport error is fatal to the connection: the state drops to
//! `NotConnected` and stays there until the owner shuts down and
//! re-initializes.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;

use socket2::{SockAddr, Socket, Type};

use crate::error::{Error, Result};
use crate::log::Log;

/// Bytes read from the socket per recv call.
const RECV_BUF_SIZE: usize = 1024;

/// Writability poll bound while a connect is in flight, in milliseconds.
const CONNECT_POLL_MS: i32 = 1;

/// Externally observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    NotConnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
enum SocketState {
    /// No socket; `initialize` may be called.
    Idle,
    /// Non-blocking connect in flight.
    Connecting(Socket),
    /// Established, blocking mode.
    Connected(TcpStream),
    /// A transport error killed the connection; only `shutdown` resets.
    Dead,
}

/// A scoped TCP client connection.
#[derive(Debug)]
pub struct TcpConnection {
    state: SocketState,
    log_prefix: String,
}

impl Default for TcpConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpConnection {
    pub fn new() -> Self {
        Self {
            state: SocketState::Idle,
            log_prefix: "tcp client".to_string(),
        }
    }

    pub fn connect_state(&self) -> ConnectState {
        match self.state {
            SocketState::Idle | SocketState::Dead => ConnectState::NotConnected,
            SocketState::Connecting(_) => ConnectState::Connecting,
            SocketState::Connected(_) => ConnectState::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connect_state() == ConnectState::Connected
    }

    /// Begin a non-blocking connect to `host:port`.
    ///
    /// Returns `Ok` once the connect is either established or in flight;
    /// `tick` drives it from there.
    pub fn initialize(&mut self, log: &mut Log, host: &str, port: u16) -> Result<()> {
        if !matches!(self.state, SocketState::Idle) {
            log.warning(format!("{} initialize failed, already initialized", self.log_prefix));
            return Err(Error::NotConnected);
        }

        self.log_prefix = format!("tcp client {host}:{port}");

        if host.is_empty() {
            log.error(format!("{} initialize failed, invalid arguments", self.log_prefix));
            return Err(Error::InvalidAddress(format!("{host}:{port}")));
        }

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress(format!("{host}:{port}")))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("{host}:{port}")))?;
        let addr = SockAddr::from(addr);

        let socket = Socket::new(addr.domain(), Type::STREAM, None)?;
        socket.set_nonblocking(true)?;

        match socket.connect(&addr) {
            Ok(()) => {
                log.info(format!("{} connected", self.log_prefix));
                socket.set_nonblocking(false)?;
                self.state = SocketState::Connected(socket.into());
                Ok(())
            }
            Err(err)
                if err.raw_os_error() == Some(libc::EINPROGRESS)
                    || err.kind() == std::io::ErrorKind::WouldBlock =>
            {
                log.info(format!("{} connecting...", self.log_prefix));
                self.state = SocketState::Connecting(socket);
                Ok(())
            }
            Err(err) => {
                log.error(format!("{} connect failed: {err}", self.log_prefix));
                Err(err.into())
            }
        }
    }

    /// Advance an in-flight connect. Connected and dead sockets are left
    /// alone; ticking an uninitialized connection logs a warning.
    pub fn tick(&mut self, log: &mut Log) {
        enum Outcome {
            Pending,
            Established,
            Failed(String),
        }

        let outcome = match &self.state {
            SocketState::Idle => {
                log.warning(format!("{} tick failed, not initialized", self.log_prefix));
                return;
            }
            SocketState::Connected(_) | SocketState::Dead => return,
            SocketState::Connecting(socket) => {
                let mut pfd = libc::pollfd {
                    fd: socket.as_raw_fd(),
                    events: libc::POLLOUT,
                    revents: 0,
                };
                // SAFETY: pfd points at one valid pollfd for the duration
                // of the call.
                let ready = unsafe { libc::poll(&mut pfd, 1, CONNECT_POLL_MS) };
                if ready > 0 {
                    match socket.take_error() {
                        Ok(None) => Outcome::Established,
                        Ok(Some(err)) => Outcome::Failed(format!("connect failed: {err}")),
                        Err(err) => Outcome::Failed(format!("connect status check failed: {err}")),
                    }
                } else if ready < 0 {
                    Outcome::Failed(format!(
                        "connect wait failed: {}",
                        std::io::Error::last_os_error()
                    ))
                } else {
                    Outcome::Pending
                }
            }
        };

        match outcome {
            Outcome::Pending => {}
            Outcome::Established => {
                let SocketState::Connecting(socket) =
                    std::mem::replace(&mut self.state, SocketState::Idle)
                else {
                    unreachable!()
                };
                if let Err(err) = socket.set_nonblocking(false) {
                    log.error(format!("{} connect failed: {err}", self.log_prefix));
                    self.state = SocketState::Dead;
                    return;
                }
                log.info(format!("{} connected", self.log_prefix));
                self.state = SocketState::Connected(socket.into());
            }
            Outcome::Failed(text) => {
                log.error(format!("{} {text}", self.log_prefix));
                self.shutdown();
            }
        }
    }

    /// Best-effort blocking write. A write error or short write is fatal
    /// to the connection.
    pub fn send(&mut self, log: &mut Log, data: &[u8]) -> bool {
        let fatal = match &mut self.state {
            SocketState::Connected(stream) => match stream.write(data) {
                Ok(n) if n == data.len() => return true,
                Ok(n) => {
                    log.error(format!("{} send truncated {n} of {}", self.log_prefix, data.len()));
                    true
                }
                Err(err) => {
                    log.error(format!("{} send failed: {err}", self.log_prefix));
                    true
                }
            },
            SocketState::Idle => {
                log.error(format!("{} send failed, not initialized", self.log_prefix));
                false
            }
            SocketState::Connecting(_) | SocketState::Dead => {
                log.error(format!("{} send failed, not connected", self.log_prefix));
                false
            }
        };

        if fatal {
            self.state = SocketState::Dead;
        }
        false
    }

    /// Read up to one socket chunk, waiting at most `timeout`.
    ///
    /// `None` means no data within the bound. A read error or an orderly
    /// shutdown by the peer is fatal to the connection.
    pub fn recv(&mut self, log: &mut Log, timeout: Duration) -> Option<Vec<u8>> {
        let (data, fatal) = match &mut self.state {
            SocketState::Connected(stream) => {
                if let Err(err) = stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1)))) {
                    log.error(format!("{} recv failed: {err}", self.log_prefix));
                    (None, true)
                } else {
                    let mut buf = [0u8; RECV_BUF_SIZE];
                    match stream.read(&mut buf) {
                        Ok(0) => {
                            log.info(format!("{} connection closed by peer", self.log_prefix));
                            (None, true)
                        }
                        Ok(n) => (Some(buf[..n].to_vec()), false),
                        Err(err)
                            if err.kind() == std::io::ErrorKind::WouldBlock
                                || err.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            (None, false)
                        }
                        Err(err) => {
                            log.error(format!("{} recv failed: {err}", self.log_prefix));
                            (None, true)
                        }
                    }
                }
            }
            SocketState::Idle => {
                log.error(format!("{} recv failed, not initialized", self.log_prefix));
                (None, false)
            }
            SocketState::Connecting(_) | SocketState::Dead => {
                log.error(format!("{} recv failed, not connected", self.log_prefix));
                (None, false)
            }
        };

        if fatal {
            self.state = SocketState::Dead;
        }
        data
    }

    /// Close the socket and return to the idle state.
    pub fn shutdown(&mut self) {
        self.state = SocketState::Idle;
    }
}
