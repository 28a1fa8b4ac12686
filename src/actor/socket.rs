//! TCP layer: one connection per message, acknowledged before processing.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::str::Utf8Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::Sender;
use tracing::{debug, trace, warn};

use crate::common::{FormatError, Message, PeerAddress};

/// Size of the buffer an acknowledgement is read into.
pub const ACK_BUFFER_SIZE: usize = 100;
/// How long the listener sleeps when no connection is pending.
pub const LISTENER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A parsed inbound message and the IP of the connection it arrived on.
pub(crate) type Inbound = (Message, IpAddr);

#[derive(Debug)]
/// Accepts connections on a background thread and forwards acknowledged messages.
pub struct Listener {
    local_addr: PeerAddress,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

#[derive(thiserror::Error, Debug)]
pub enum TransmitError {
    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    #[error("Acknowledgement is not valid UTF-8: {0}")]
    Utf8(#[from] Utf8Error),

    #[error("Malformed acknowledgement: {0}")]
    Format(#[from] FormatError),

    #[error("Expected {expected}_OK, got {reply:?}")]
    UnexpectedReply { expected: String, reply: String },
}

impl Listener {
    pub(crate) fn bind(address: PeerAddress, inbound: Sender<Inbound>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address.socket_addr())?;
        listener.set_nonblocking(true)?;

        let local_addr = PeerAddress::from(listener.local_addr()?);
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        let handle = thread::Builder::new()
            .name(format!("peersearch-listener-{}", local_addr.port()))
            .spawn(move || accept_loop(listener, inbound, flag))?;

        Ok(Listener {
            local_addr,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> PeerAddress {
        self.local_addr
    }

    /// Stops accepting connections and waits for the accept loop to exit.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, inbound: Sender<Inbound>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, from)) => {
                let inbound = inbound.clone();
                thread::spawn(move || handle_connection(stream, from, inbound));
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(LISTENER_POLL_INTERVAL);
            }
            Err(e) => {
                // Errors like EMFILE persist, back off instead of spinning.
                debug!(?e, "accept failed unexpectedly");
                thread::sleep(LISTENER_POLL_INTERVAL);
            }
        }
    }

    trace!(context = "socket_listener", "Listener stopped");
}

/// Reads one line, writes the acknowledgement and only then hands the message over.
fn handle_connection(stream: TcpStream, from: SocketAddr, inbound: Sender<Inbound>) {
    if let Err(error) = stream.set_nonblocking(false) {
        debug!(?error, ?from, "Could not switch connection to blocking mode");
        return;
    }

    let mut line = String::new();
    if let Err(error) = BufReader::new(&stream).read_line(&mut line) {
        debug!(?error, ?from, "Failed to read message");
        return;
    }

    let message = match Message::parse(&line) {
        Ok(message) => message,
        Err(error) => {
            warn!(?error, ?from, line = line.trim_end(), "Received malformed message");
            return;
        }
    };

    trace!(context = "socket_message_receiving", %message, ?from, "Received message");

    let ack = message.acknowledgement();
    if let Err(error) = (&stream).write_all(format!("{ack}\n").as_bytes()) {
        debug!(?error, ?from, "Failed to acknowledge message");
        return;
    }
    drop(stream);

    let _ = inbound.send((message, from.ip()));
}

/// Sends `message` over a new connection and waits for its acknowledgement.
///
/// Returns `false` if the peer is unreachable or did not acknowledge.
pub fn transmit(to: PeerAddress, message: &Message, timeout: Option<Duration>) -> bool {
    match try_transmit(to, message, timeout) {
        Ok(()) => {
            trace!(context = "socket_message_sending", %message, %to, "Message acknowledged");
            true
        }
        Err(TransmitError::IO(error)) if error.kind() == ErrorKind::ConnectionRefused => {
            debug!(%to, %message, "Peer is offline");
            false
        }
        Err(error) => {
            debug!(?error, %to, %message, "Failed to transmit message");
            false
        }
    }
}

/// Like [transmit], returning why the message was not acknowledged.
pub fn try_transmit(
    to: PeerAddress,
    message: &Message,
    timeout: Option<Duration>,
) -> Result<(), TransmitError> {
    let mut stream = match timeout {
        Some(timeout) => TcpStream::connect_timeout(&to.socket_addr(), timeout)?,
        None => TcpStream::connect(to.socket_addr())?,
    };
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    trace!(context = "socket_message_sending", %message, %to, "Sending message");
    stream.write_all(format!("{message}\n").as_bytes())?;

    let mut buffer = Vec::with_capacity(ACK_BUFFER_SIZE);
    (&stream)
        .take(ACK_BUFFER_SIZE as u64)
        .read_to_end(&mut buffer)?;

    let reply = Message::parse(std::str::from_utf8(&buffer)?)?;

    if message.is_acknowledged_by(&reply) {
        Ok(())
    } else {
        Err(TransmitError::UnexpectedReply {
            expected: message.operation.name().into_owned(),
            reply: reply.to_string(),
        })
    }
}
