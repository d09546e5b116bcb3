use std::fmt;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{hub::HubHandle, Frame};

/// Process-unique identity of one viewer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a frame could not be queued for a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The viewer's write pump is not keeping up.
    Full,
    /// The write pump has gone away.
    Closed,
}

/// Hub-side half of a viewer: its id and the sending end of its queue.
///
/// The hub holds the only `Connection` for a viewer, so dropping it there
/// closes the queue.
pub struct Connection {
    id: ConnectionId,
    queue: mpsc::Sender<Frame>,
}

impl Connection {
    /// Create a connection with a bounded outbound queue. The receiver goes
    /// to [`write_pump`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: ConnectionId::new(),
            queue: tx,
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame without waiting.
    pub(crate) fn try_enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        self.queue.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Drain `queue` onto `sink`, one frame per transport message, in order.
///
/// Stops at the first write error or when the queue is closed, and closes
/// the sink either way. Nothing else closes the write side.
pub async fn write_pump<S>(id: ConnectionId, mut queue: mpsc::Receiver<Frame>, mut sink: S)
where
    S: Sink<Frame> + Unpin,
    S::Error: fmt::Display + Send,
{
    while let Some(frame) = queue.recv().await {
        if let Err(e) = sink.send(frame).await {
            warn!(conn_id = %id, error = %e, "could not write frame");
            break;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(conn_id = %id, error = %e, "error closing transport");
    }
    debug!(conn_id = %id, "write pump finished");
}

/// Consume `stream` until it ends or errors. Inbound payloads are ignored;
/// this only exists to notice the viewer going away.
pub async fn read_pump<R, T, E>(id: ConnectionId, mut stream: R)
where
    R: Stream<Item = Result<T, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(item) = stream.next().await {
        if let Err(e) = item {
            debug!(conn_id = %id, error = %e, "error reading from viewer");
            break;
        }
    }
}

/// Run one viewer for its whole lifetime.
///
/// Registers a fresh [`Connection`], spawns its write pump, blocks on the
/// read pump and unregisters once reading stops. Unregistering closes the
/// queue, which in turn ends the write pump and closes the transport.
pub async fn serve<S, R, T, E>(hub: &HubHandle, sink: S, stream: R, capacity: usize)
where
    S: Sink<Frame> + Unpin + Send + 'static,
    S::Error: fmt::Display + Send,
    R: Stream<Item = Result<T, E>> + Unpin,
    E: fmt::Display,
{
    let (conn, queue) = Connection::new(capacity);
    let id = conn.id();
    info!(conn_id = %id, "viewer connected");

    hub.register(conn).await;
    tokio::spawn(write_pump(id, queue, sink));

    read_pump(id, stream).await;

    hub.unregister(id).await;
    info!(conn_id = %id, "viewer disconnected");
}
