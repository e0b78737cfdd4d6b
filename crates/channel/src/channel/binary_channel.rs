//! The binary channel: one connected stream with pooled receive and send buffers.
//!
//! A channel owns the read half of its stream directly, so only one receive can be
//! outstanding at a time. The write half sits behind an async mutex that every send
//! acquires with a bounded wait; [`ChannelSender`] handles share that write half so a
//! writer can run while the read loop is parked in [`BinaryChannel::receive`].

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::io;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::select;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{ChannelConfig, ChannelData, ChannelEvents, ChannelId, ChannelState, LoggingEvents, MaybeTlsStream};
use crate::buffer::{BufferPool, BufferSegment};
use super::AtomicState;
use crate::tls::ClientStreamBuilder;
use crate::{ChannelError, ensure};

/// State shared by a channel and all of its senders.
struct Shared {
    id: ChannelId,
    state: AtomicState,
    notified: AtomicBool,
    events: Arc<dyn ChannelEvents>,
    /// Cancelled when the stream is torn down; replaced on every `assign`.
    abort: parking_lot::Mutex<CancellationToken>,
}

impl Shared {
    fn abort_token(&self) -> CancellationToken {
        self.abort.lock().clone()
    }

    /// Notifies the disconnect callback unless it already fired in this lifetime.
    fn notify_disconnect(&self, cause: Option<&ChannelError>) {
        if !self.notified.swap(true, Ordering::AcqRel) {
            self.events.on_disconnect(self.id, cause);
        }
    }

    /// Marks the channel closed after a transport failure and reports it.
    fn fail(&self, source: io::Error) -> ChannelError {
        self.state.set(ChannelState::Closed);
        let error = ChannelError::io(source);
        self.notify_disconnect(Some(&error));
        error
    }
}

/// The write half of the stream plus the segments staged by `send_queued`.
struct WriteSide<S> {
    stream: Option<WriteHalf<S>>,
    queued: VecDeque<BufferSegment>,
    queued_bytes: usize,
}

impl<S: AsyncRead + AsyncWrite> WriteSide<S> {
    fn stage(&mut self, mut bytes: &[u8], pool: &BufferPool) {
        self.queued_bytes += bytes.len();
        while !bytes.is_empty() {
            let has_room = self.queued.back().is_some_and(|segment| segment.remaining_capacity() > 0);
            if !has_room {
                self.queued.push_back(pool.lease());
            }
            if let Some(tail) = self.queued.back_mut() {
                let written = tail.write(bytes);
                bytes = &bytes[written..];
            }
        }
    }

    async fn flush_queued(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::from(ErrorKind::NotConnected));
        };

        while let Some(segment) = self.queued.front() {
            write_fully(stream, segment.unread()).await?;
            self.queued_bytes -= segment.count();
            // the segment goes back to the pool here
            self.queued.pop_front();
        }
        stream.flush().await
    }

    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.queued.is_empty() {
            self.flush_queued().await?;
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::from(ErrorKind::NotConnected));
        };
        write_fully(stream, bytes).await?;
        stream.flush().await
    }

    fn discard(&mut self) {
        if !self.queued.is_empty() {
            debug!(segments = self.queued.len(), bytes = self.queued_bytes, "drop queued sends");
        }
        self.queued.clear();
        self.queued_bytes = 0;
        self.stream = None;
    }
}

/// Runs a write until it finishes or the channel is torn down underneath it.
///
/// `None` means the write was abandoned.
async fn abortable<F: Future<Output = io::Result<()>>>(abort: &CancellationToken, write: F) -> Option<io::Result<()>> {
    select! {
        result = write => Some(result),
        () = abort.cancelled() => None,
    }
}

/// Writes the whole buffer, resuming after partial transport writes.
async fn write_fully<W: AsyncWrite + Unpin>(writer: &mut W, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        let written = writer.write(bytes).await?;
        if written == 0 {
            return Err(io::Error::from(ErrorKind::WriteZero));
        }
        if written < bytes.len() {
            trace!(written, remaining = bytes.len() - written, "partial write, resuming");
        }
        bytes = &bytes[written..];
    }
    Ok(())
}

/// A cloneable handle to the send side of a [`BinaryChannel`].
pub struct ChannelSender<S> {
    shared: Arc<Shared>,
    writer: Arc<Mutex<WriteSide<S>>>,
    pool: BufferPool,
    config: ChannelConfig,
}

impl<S> Clone for ChannelSender<S> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared), writer: Arc::clone(&self.writer), pool: self.pool.clone(), config: self.config }
    }
}

impl<S> ChannelSender<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn id(&self) -> ChannelId {
        self.shared.id
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state.get()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Sends the whole buffer before returning. Staged bytes are flushed first.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Closed`] when the channel can't send, or was torn down by `close`
    ///   while this send was blocked
    /// - [`ChannelError::SendLockTimeout`] when another sender held the lock too long
    /// - [`ChannelError::Io`] when the transport failed; the channel is closed afterwards
    pub async fn send(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        let abort = self.shared.abort_token();
        let mut writer = self.lock().await?;
        let result = abortable(&abort, writer.send(bytes)).await;
        self.settle(&mut writer, result)?;
        trace!(channel = %self.shared.id, bytes = bytes.len(), "sent");
        Ok(())
    }

    /// Stages bytes into pooled segments, flushing once more than
    /// [`ChannelConfig::max_bytes_per_write`] bytes are waiting.
    pub async fn send_queued(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        let abort = self.shared.abort_token();
        let mut writer = self.lock().await?;
        writer.stage(bytes, &self.pool);

        if writer.queued_bytes > self.config.max_bytes_per_write {
            trace!(channel = %self.shared.id, bytes = writer.queued_bytes, "flush queued sends");
            let result = abortable(&abort, writer.flush_queued()).await;
            self.settle(&mut writer, result)?;
        }
        Ok(())
    }

    /// Transmits every staged byte.
    pub async fn flush(&self) -> Result<(), ChannelError> {
        let abort = self.shared.abort_token();
        let mut writer = self.lock().await?;
        if writer.queued.is_empty() {
            return Ok(());
        }
        let result = abortable(&abort, writer.flush_queued()).await;
        self.settle(&mut writer, result)
    }

    /// Number of bytes staged by `send_queued` and not yet transmitted.
    pub async fn queued_bytes(&self) -> usize {
        self.writer.lock().await.queued_bytes
    }

    async fn lock(&self) -> Result<MutexGuard<'_, WriteSide<S>>, ChannelError> {
        ensure!(self.shared.state.get().can_send(), ChannelError::Closed);

        let wait = self.config.send_lock_timeout;
        let writer = timeout(wait, self.writer.lock()).await.map_err(|_elapsed| ChannelError::SendLockTimeout { timeout: wait })?;

        // the channel may have failed while we were waiting
        ensure!(self.shared.state.get().can_send(), ChannelError::Closed);
        Ok(writer)
    }

    /// Transport failures close the channel; an abandoned write leaves the cause to `close`.
    fn settle(&self, writer: &mut WriteSide<S>, result: Option<io::Result<()>>) -> Result<(), ChannelError> {
        match result {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => {
                writer.discard();
                Err(self.shared.fail(e))
            }
            None => {
                debug!(channel = %self.shared.id, "send abandoned, channel torn down");
                writer.discard();
                Err(ChannelError::Closed)
            }
        }
    }
}

impl<S> fmt::Debug for ChannelSender<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSender").field("id", &self.shared.id).field("state", &self.shared.state.get()).finish_non_exhaustive()
    }
}

/// Builds [`BinaryChannel`]s sharing a pool, configuration and event subscriber.
#[derive(Clone)]
pub struct ChannelBuilder {
    id: ChannelId,
    pool: BufferPool,
    config: ChannelConfig,
    events: Arc<dyn ChannelEvents>,
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self { id: ChannelId::new(0), pool: BufferPool::default(), config: ChannelConfig::default(), events: Arc::new(LoggingEvents) }
    }
}

impl ChannelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, id: ChannelId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: BufferPool) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn events(mut self, events: Arc<dyn ChannelEvents>) -> Self {
        self.events = events;
        self
    }

    /// Creates a channel in the `Opening` state, ready for [`BinaryChannel::assign`].
    pub fn build<S>(self) -> BinaryChannel<S> {
        BinaryChannel::new(self.id, self.pool, self.config, self.events)
    }

    /// Builds a channel and binds it to an already connected stream.
    pub async fn open<S>(self, stream: S, remote_addr: Option<SocketAddr>) -> Result<BinaryChannel<S>, ChannelError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut channel = self.build();
        channel.assign(stream, remote_addr).await?;
        Ok(channel)
    }

    /// Dials `addr`, runs the client handshake when `tls` is given, and returns an open channel.
    pub async fn connect<A: ToSocketAddrs>(
        self,
        addr: A,
        tls: Option<&ClientStreamBuilder>,
    ) -> Result<BinaryChannel<MaybeTlsStream<TcpStream>>, ChannelError> {
        let tcp_stream = TcpStream::connect(addr).await?;
        let remote_addr = tcp_stream.peer_addr().ok();
        tcp_stream.set_nodelay(true)?;

        let stream = match tls {
            Some(builder) => MaybeTlsStream::from(builder.build(tcp_stream).await?),
            None => MaybeTlsStream::Plain(tcp_stream),
        };

        debug!(channel = %self.id, remote = ?remote_addr, tls = stream.is_tls(), "channel connected");
        self.open(stream, remote_addr).await
    }
}

impl fmt::Debug for ChannelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBuilder").field("id", &self.id).field("pool", &self.pool).field("config", &self.config).finish_non_exhaustive()
    }
}

/// A live connection over one stream, plain or TLS wrapped.
pub struct BinaryChannel<S> {
    sender: ChannelSender<S>,
    reader: Option<ReadHalf<S>>,
    remote_addr: Option<SocketAddr>,
    data: ChannelData,
}

impl<S> BinaryChannel<S> {
    /// Creates a channel in the `Opening` state with no stream attached.
    pub fn new(id: ChannelId, pool: BufferPool, config: ChannelConfig, events: Arc<dyn ChannelEvents>) -> Self {
        let shared = Arc::new(Shared {
            id,
            state: AtomicState::new(ChannelState::Opening),
            notified: AtomicBool::new(false),
            events,
            abort: parking_lot::Mutex::new(CancellationToken::new()),
        });
        let writer = Arc::new(Mutex::new(WriteSide { stream: None, queued: VecDeque::new(), queued_bytes: 0 }));

        Self { sender: ChannelSender { shared, writer, pool, config }, reader: None, remote_addr: None, data: ChannelData::new() }
    }
}

impl<S> BinaryChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Binds a connected stream, moving the channel from `Opening` to `Open`.
    pub async fn assign(&mut self, stream: S, remote_addr: Option<SocketAddr>) -> Result<(), ChannelError> {
        let state = self.state();
        ensure!(state == ChannelState::Opening, ChannelError::InvalidState { state });

        let (reader, writer) = tokio::io::split(stream);
        {
            let mut write_side = self.sender.writer.lock().await;
            write_side.stream = Some(writer);
            write_side.queued.clear();
            write_side.queued_bytes = 0;
        }
        self.reader = Some(reader);
        self.remote_addr = remote_addr;
        *self.sender.shared.abort.lock() = CancellationToken::new();
        self.sender.shared.notified.store(false, Ordering::Release);
        self.sender.shared.state.set(ChannelState::Open);

        trace!(channel = %self.id(), remote = ?remote_addr, "channel open");
        Ok(())
    }

    pub fn id(&self) -> ChannelId {
        self.sender.shared.id
    }

    pub fn state(&self) -> ChannelState {
        self.sender.shared.state.get()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn pool(&self) -> &BufferPool {
        &self.sender.pool
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.sender.config
    }

    pub fn data(&self) -> &ChannelData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ChannelData {
        &mut self.data
    }

    /// A handle that sends through this channel without borrowing it.
    pub fn sender(&self) -> ChannelSender<S> {
        self.sender.clone()
    }

    /// Reports a protocol level failure to the event subscriber.
    pub fn report_failure(&self, error: &(dyn std::error::Error + Send + Sync)) {
        self.sender.shared.events.on_failure(self.id(), error);
    }

    /// Performs one read into the spare region of `segment`.
    ///
    /// Returns the number of bytes appended to the segment's unread window. `0` means the
    /// remote side closed the connection in an orderly way: the channel moves to
    /// `Disconnecting`, further receives fail, and sends keep working until [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// - [`ChannelError::NotConnected`] when no stream is attached or the read side is gone
    /// - [`ChannelError::BufferFull`] when the segment has no spare room even after compacting
    /// - [`ChannelError::Io`] when the read fails; the channel is closed and the disconnect
    ///   callback notified
    pub async fn receive(&mut self, segment: &mut BufferSegment) -> Result<usize, ChannelError> {
        let reader = self.reader.as_mut().ok_or(ChannelError::NotConnected)?;

        if segment.remaining_capacity() == 0 {
            segment.compact();
        }
        ensure!(segment.remaining_capacity() > 0, ChannelError::BufferFull { capacity: segment.capacity() });

        match reader.read(segment.spare_mut()).await {
            Ok(0) => {
                debug!(channel = %self.id(), "remote closed the channel");
                self.reader = None;
                self.sender.shared.state.set(ChannelState::Disconnecting);
                Ok(0)
            }
            Ok(n) => {
                segment.commit(n);
                trace!(channel = %self.id(), bytes = n, "received");
                Ok(n)
            }
            Err(e) => {
                let error = self.sender.shared.fail(e);
                self.teardown().await;
                Err(error)
            }
        }
    }

    pub async fn send(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.sender.send(bytes).await
    }

    pub async fn send_queued(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.sender.send_queued(bytes).await
    }

    pub async fn flush(&self) -> Result<(), ChannelError> {
        self.sender.flush().await
    }

    /// Flushes staged bytes, half closes the send direction and waits for the peer to finish.
    ///
    /// The whole sequence runs under one [`ChannelConfig::close_timeout`] deadline. When the
    /// send side can't flush in time, because the peer stopped reading or another sender is
    /// blocked mid write, both halves are dropped, blocked senders give up with
    /// [`ChannelError::Closed`], and the disconnect callback gets the timeout as its cause.
    ///
    /// Closing a channel that is not open, or already closed, is a no-op.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::CloseTimeout`] when the send side did not finish before the deadline
    /// - [`ChannelError::Io`] when flushing or shutting down the send direction failed
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        if !self.state().can_send() {
            return Ok(());
        }
        self.sender.shared.state.set(ChannelState::Closing);

        let wait = self.sender.config.close_timeout;
        let deadline = Instant::now() + wait;
        let shutdown_result = match timeout_at(deadline, self.shutdown_send()).await {
            Ok(result) => result.map_err(ChannelError::io),
            Err(_elapsed) => {
                debug!(channel = %self.id(), "send side did not finish in time, forcing close");
                Err(ChannelError::CloseTimeout { timeout: wait })
            }
        };

        if let (Ok(()), Some(reader)) = (&shutdown_result, self.reader.as_mut()) {
            let mut scratch = [0u8; 512];
            let drain = async {
                loop {
                    match reader.read(&mut scratch).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => trace!(bytes = n, "discard bytes received while closing"),
                    }
                }
            };
            if timeout_at(deadline, drain).await.is_err() {
                debug!(channel = %self.id(), "peer did not finish in time, forcing close");
            }
        }

        self.teardown().await;
        self.sender.shared.state.set(ChannelState::Closed);

        match shutdown_result {
            Ok(()) => {
                self.sender.shared.notify_disconnect(None);
                Ok(())
            }
            Err(error) => {
                self.sender.shared.notify_disconnect(Some(&error));
                Err(error)
            }
        }
    }

    async fn shutdown_send(&self) -> io::Result<()> {
        let mut writer = self.sender.writer.lock().await;
        if !writer.queued.is_empty() {
            writer.flush_queued().await?;
        }
        match writer.stream.as_mut() {
            Some(stream) => stream.shutdown().await,
            None => Ok(()),
        }
    }

    /// Detaches the stream and clears per connection data so the channel can be reused.
    pub async fn reset(&mut self) {
        if self.state().can_send() {
            warn!(channel = %self.id(), "reset an open channel, stream dropped without close");
        }
        self.teardown().await;
        self.data.clear();
        self.remote_addr = None;
        self.sender.shared.notified.store(false, Ordering::Release);
        self.sender.shared.state.set(ChannelState::Opening);
    }

    async fn teardown(&mut self) {
        self.reader = None;
        // wakes senders blocked mid write so the lock comes free
        self.sender.shared.abort_token().cancel();
        self.sender.writer.lock().await.discard();
        if self.state() != ChannelState::Closed {
            self.sender.shared.state.set(ChannelState::Closed);
        }
    }
}

impl<S> fmt::Debug for BinaryChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryChannel")
            .field("id", &self.sender.shared.id)
            .field("state", &self.sender.shared.state.get())
            .field("remote_addr", &self.remote_addr)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}
