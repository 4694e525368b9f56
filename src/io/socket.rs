//! Shared duplex socket
//!
//! One connected TCP stream used by both workers of an endpoint. The sender
//! writes frames and probes while the listener peeks and reads. A single
//! mutex serializes the individual non-blocking syscalls; it is never held
//! across an await point, so a slow write does not stall the reader between
//! its header and body reads, and vice versa.
//!
//! Every wait is bounded: readiness is awaited under a timeout and the
//! actual I/O is a `try_*` call made while holding the lock.

use crate::error::{IgtlError, Result};
use crate::io::config::EndpointConfig;
use std::future::poll_fn;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::task::Poll;
use std::time::Duration;
use tokio::io::ReadBuf;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Connected socket shared by a sender/listener pair
#[derive(Debug)]
pub struct SharedSocket {
    stream: TcpStream,
    io_lock: Mutex<()>,
    closed: AtomicBool,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    io_timeout: Duration,
}

impl SharedSocket {
    /// Wrap a connected stream, applying the socket options from `config`
    ///
    /// # Errors
    ///
    /// - [`IgtlError::Io`] if the addresses cannot be read or an option
    ///   cannot be applied
    pub fn new(stream: TcpStream, config: &EndpointConfig) -> Result<Self> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;

        stream.set_nodelay(config.nodelay)?;

        #[cfg(unix)]
        {
            if let Some(size) = config.recv_buffer_size {
                set_buffer_size(&stream, libc::SO_RCVBUF, size)?;
            }
            if let Some(size) = config.send_buffer_size {
                set_buffer_size(&stream, libc::SO_SNDBUF, size)?;
            }
        }
        #[cfg(not(unix))]
        {
            if config.recv_buffer_size.is_some() || config.send_buffer_size.is_some() {
                warn!("Socket buffer sizes are only applied on unix targets");
            }
        }

        debug!(
            local = %local_addr,
            peer = %peer_addr,
            nodelay = config.nodelay,
            "Shared socket created"
        );

        Ok(SharedSocket {
            stream,
            io_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            local_addr,
            peer_addr,
            io_timeout: config.io_timeout,
        })
    }

    /// Local address of the connection
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Remote address of the connection
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock carries no broken state.
        self.io_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(IgtlError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Peek at buffered bytes without consuming them
    ///
    /// Waits at most `wait` for the socket to become readable.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(n))` - `n` bytes were copied into `buf`, still unread
    /// - `Ok(None)` - nothing arrived within `wait`
    ///
    /// # Errors
    ///
    /// - [`IgtlError::ConnectionClosed`] on EOF or after [`close`](Self::close)
    /// - [`IgtlError::Io`] on any other socket error
    pub async fn peek_available(&self, buf: &mut [u8], wait: Duration) -> Result<Option<usize>> {
        self.ensure_open()?;

        match timeout(wait, self.stream.readable()).await {
            Err(_) => return Ok(None),
            Ok(ready) => ready?,
        }

        let peeked = poll_fn(|cx| {
            let _guard = self.lock();
            let mut read_buf = ReadBuf::new(&mut *buf);
            match self.stream.poll_peek(cx, &mut read_buf) {
                Poll::Ready(Ok(n)) => Poll::Ready(Ok(Some(n))),
                Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                Poll::Pending => Poll::Ready(Ok(None)),
            }
        })
        .await?;

        match peeked {
            Some(0) => Err(IgtlError::ConnectionClosed),
            other => Ok(other),
        }
    }

    /// Read whatever is available, up to `buf.len()` bytes
    ///
    /// Waits at most `wait` for readability.
    ///
    /// # Errors
    ///
    /// - [`IgtlError::Timeout`] if nothing became readable within `wait`
    /// - [`IgtlError::ConnectionClosed`] on EOF or after [`close`](Self::close)
    /// - [`IgtlError::Io`] on any other socket error
    pub async fn read_some(&self, buf: &mut [u8], wait: Duration) -> Result<usize> {
        loop {
            self.ensure_open()?;

            match timeout(wait, self.stream.readable()).await {
                Err(_) => return Err(IgtlError::Timeout(format!("no data within {:?}", wait))),
                Ok(ready) => ready?,
            }

            let result = {
                let _guard = self.lock();
                self.stream.try_read(buf)
            };

            match result {
                Ok(0) => return Err(IgtlError::ConnectionClosed),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fill `buf` completely
    ///
    /// `wait` bounds each individual chunk, not the whole read.
    pub async fn read_exact(&self, buf: &mut [u8], wait: Duration) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            filled += self.read_some(&mut buf[filled..], wait).await?;
        }
        Ok(())
    }

    /// Read and discard exactly `len` bytes
    pub async fn skip(&self, mut len: u64, wait: Duration) -> Result<()> {
        let mut scratch = [0u8; 8192];
        while len > 0 {
            let chunk = len.min(scratch.len() as u64) as usize;
            let n = self.read_some(&mut scratch[..chunk], wait).await?;
            len -= n as u64;
        }
        Ok(())
    }

    /// Write all of `data`
    ///
    /// The lock is taken for each `try_write`; a frame may be split across
    /// several syscalls but only the sender writes, so frames never
    /// interleave on the wire.
    ///
    /// # Errors
    ///
    /// - [`IgtlError::Timeout`] if the socket stays unwritable for the I/O timeout
    /// - [`IgtlError::ConnectionClosed`] after [`close`](Self::close) or a zero-length write
    /// - [`IgtlError::Io`] on any other socket error
    pub async fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            self.ensure_open()?;

            match timeout(self.io_timeout, self.stream.writable()).await {
                Err(_) => {
                    return Err(IgtlError::Timeout(format!(
                        "socket not writable within {:?}",
                        self.io_timeout
                    )))
                }
                Ok(ready) => ready?,
            }

            let result = {
                let _guard = self.lock();
                self.stream.try_write(&data[written..])
            };

            match result {
                Ok(0) => return Err(IgtlError::ConnectionClosed),
                Ok(n) => {
                    written += n;
                    trace!(written = written, total = data.len(), "Partial write");
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Close both directions of the connection
    ///
    /// Idempotent. Wakes any worker blocked on readiness; subsequent calls
    /// on this socket fail with [`IgtlError::ConnectionClosed`].
    pub fn close(&self) {
        let _guard = self.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        #[cfg(unix)]
        {
            use std::os::fd::AsRawFd;
            // SAFETY: the descriptor is owned by `self.stream`, which outlives this call.
            let ret = unsafe { libc::shutdown(self.stream.as_raw_fd(), libc::SHUT_RDWR) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() != ErrorKind::NotConnected {
                    warn!(peer = %self.peer_addr, error = %err, "Socket shutdown failed");
                }
            }
        }

        debug!(peer = %self.peer_addr, "Shared socket closed");
    }
}

#[cfg(unix)]
fn set_buffer_size(stream: &TcpStream, option: libc::c_int, size: usize) -> Result<()> {
    use std::os::fd::AsRawFd;

    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;

    // SAFETY: `fd` is a valid socket for the lifetime of `stream`; the value
    // pointer and length describe a live c_int.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            &size as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if ret != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}
