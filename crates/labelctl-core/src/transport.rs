//! Datagram transport and request/response correlation.
//!
//! A [`Session`] owns the netlink endpoint for the lifetime of one client
//! invocation: the kernel-assigned port identity, the monotonically
//! increasing sequence counter, and the operator-supplied receive deadline.
//! Exactly one request is in flight at a time; replies are matched on
//! sequence number and port identity, and anything else arriving on the
//! socket (multicast chatter, stale replies) is discarded.
//!
//! The socket sits behind the [`Endpoint`] trait so the collection logic is
//! exercised in tests against scripted fakes instead of a live kernel.

use std::io;
use std::time::{Duration, Instant};

use tracing::debug;

use labelctl_proto::{
    CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, CTRL_CMD_GETFAMILY, CTRL_VERSION, Frame,
    GENL_ID_CTRL, Message, NLM_F_REQUEST, Nla, find_attr, split_frames,
};

use crate::error::{Error, ErrorKind, ServiceError, TransportError};
use crate::status::{Disposition, classify};

const CONTROLLER: &str = "controller";

/// Options consumed by the transport; owned by the invoking shell.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Overall deadline for collecting one response.
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// A connected datagram endpoint.
///
/// `recv` returns one whole datagram per call and honours the supplied
/// timeout with `WouldBlock`/`TimedOut`, the way a non-blocking socket read
/// does.
pub trait Endpoint {
    /// Writes one request datagram.
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Reads one response datagram, waiting at most `timeout`.
    fn recv(&mut self, timeout: Duration) -> io::Result<Vec<u8>>;

    /// The kernel-assigned port identity of this endpoint.
    fn port_id(&self) -> u32;
}

/// An open transport handle bound to a kernel-assigned port identity.
#[derive(Debug)]
pub struct Session<E> {
    endpoint: E,
    timeout: Duration,
    next_sequence: u32,
}

#[cfg(unix)]
impl Session<NetlinkSocket> {
    /// Acquires a datagram endpoint bound to a kernel-assigned identity.
    pub fn open(options: SessionOptions) -> Result<Self, TransportError> {
        let endpoint = NetlinkSocket::open().map_err(TransportError::Endpoint)?;
        Ok(Self::with_endpoint(endpoint, options.timeout))
    }
}

impl<E: Endpoint> Session<E> {
    /// Wraps an already-open endpoint. Sequence numbering starts at one so a
    /// zeroed reply header can never accidentally match.
    pub fn with_endpoint(endpoint: E, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            next_sequence: 1,
        }
    }

    /// The port identity replies must be addressed to.
    pub fn port_id(&self) -> u32 {
        self.endpoint.port_id()
    }

    /// Test access to the underlying endpoint.
    #[cfg(test)]
    pub(crate) fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Resolves a service family name to its runtime id.
    ///
    /// A `NotFound` refusal from the controller means the family is not
    /// registered: the labeling service is absent, which is
    /// [`TransportError::Unavailable`].
    pub fn resolve_family(&mut self, family: &str) -> Result<u16, Error> {
        let request = Message::request(
            GENL_ID_CTRL,
            CTRL_CMD_GETFAMILY,
            CTRL_VERSION,
            NLM_F_REQUEST,
            vec![Nla::string(CTRL_ATTR_FAMILY_NAME, family)],
        );
        let frames = self.transact(request, false)?;
        let frame = frames
            .first()
            .ok_or_else(|| ServiceError::malformed(CONTROLLER))?;
        match classify(frame, CONTROLLER) {
            Disposition::Failed(error) if error.kind == ErrorKind::NotFound => {
                Err(TransportError::Unavailable {
                    family: family.to_owned(),
                }
                .into())
            }
            Disposition::Failed(error) => Err(error.into()),
            Disposition::Ack => Err(ServiceError::malformed(CONTROLLER).into()),
            Disposition::Data => {
                let message = Message::decode(frame).map_err(TransportError::Frame)?;
                find_attr(&message.attrs, CTRL_ATTR_FAMILY_ID)
                    .and_then(|attr| attr.as_u16().ok())
                    .ok_or_else(|| ServiceError::malformed(CONTROLLER).into())
            }
        }
    }

    /// Sends `message` and collects the full response.
    ///
    /// With `expect_dump` the collection runs until the terminator frame;
    /// otherwise the first matching frame is the whole response. A kernel
    /// status report ends the collection immediately and is returned as the
    /// final frame for the status layer to classify.
    pub fn transact(
        &mut self,
        mut message: Message,
        expect_dump: bool,
    ) -> Result<Vec<Frame>, TransportError> {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        message.sequence = sequence;
        message.port = self.endpoint.port_id();

        self.endpoint
            .send(&message.encode())
            .map_err(TransportError::Send)?;

        let deadline = Instant::now() + self.timeout;
        let mut collected = Vec::new();
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(TransportError::Timeout(self.timeout))?;
            let datagram = match self.endpoint.recv(remaining) {
                Ok(datagram) => datagram,
                Err(error) => return Err(receive_error(error, self.timeout)),
            };
            for frame in split_frames(&datagram)? {
                if !self.matches(&frame, sequence) {
                    debug!(
                        sequence = frame.sequence,
                        port = frame.port,
                        "discarding unrelated frame"
                    );
                    continue;
                }
                if frame.is_noop() {
                    continue;
                }
                if frame.is_done() {
                    return Ok(collected);
                }
                if frame.is_status() {
                    collected.push(frame);
                    return Ok(collected);
                }
                collected.push(frame);
                if !expect_dump {
                    return Ok(collected);
                }
            }
        }
    }

    /// A reply belongs to the outstanding request when its sequence number
    /// matches and it is addressed to this endpoint's port (the kernel also
    /// uses port zero for locally-generated control frames).
    fn matches(&self, frame: &Frame, sequence: u32) -> bool {
        frame.sequence == sequence
            && (frame.port == self.endpoint.port_id() || frame.port == 0)
    }
}

fn receive_error(error: io::Error, timeout: Duration) -> TransportError {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout(timeout),
        io::ErrorKind::Interrupted => TransportError::Interrupted,
        _ => TransportError::Receive(error),
    }
}

/// The real kernel-facing endpoint: a raw generic-netlink datagram socket.
#[cfg(unix)]
#[derive(Debug)]
pub struct NetlinkSocket {
    socket: socket2::Socket,
    port: u32,
}

#[cfg(unix)]
impl NetlinkSocket {
    const RECV_BUFFER: usize = 16 * 1024;

    fn open() -> io::Result<Self> {
        use socket2::{Domain, Protocol, Socket, Type};

        let socket = Socket::new(
            Domain::from(libc::AF_NETLINK),
            Type::from(libc::SOCK_RAW),
            Some(Protocol::from(libc::NETLINK_GENERIC)),
        )?;
        socket.bind(&netlink_address(0))?;
        // Connecting pins the kernel as the peer for send and receive.
        socket.connect(&netlink_address(0))?;
        let port = bound_port(&socket)?;
        Ok(Self { socket, port })
    }
}

#[cfg(unix)]
impl Endpoint for NetlinkSocket {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let written = self.socket.send(datagram)?;
        if written == datagram.len() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short write on netlink socket",
            ))
        }
    }

    fn recv(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
        use std::io::Read;

        // A zero timeout means block forever; clamp to something observable.
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(timeout))?;
        let mut buf = vec![0u8; Self::RECV_BUFFER];
        let received = self.socket.read(&mut buf)?;
        buf.truncate(received);
        Ok(buf)
    }

    fn port_id(&self) -> u32 {
        self.port
    }
}

/// Builds a netlink socket address for the given port (zero asks the kernel
/// to assign one on bind, and names the kernel itself as a peer).
#[cfg(unix)]
fn netlink_address(port: u32) -> socket2::SockAddr {
    use std::mem;

    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    // SAFETY: sockaddr_nl is smaller than sockaddr_storage and the storage
    // was zero-initialised above, so the remaining fields are valid.
    let address = unsafe { &mut *(&raw mut storage).cast::<libc::sockaddr_nl>() };
    address.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    address.nl_pid = port;
    address.nl_groups = 0;
    let length = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
    // SAFETY: the storage holds a fully-initialised sockaddr_nl of `length`
    // bytes.
    unsafe { socket2::SockAddr::new(storage, length) }
}

/// Reads back the port identity the kernel assigned on bind.
#[cfg(unix)]
fn bound_port(socket: &socket2::Socket) -> io::Result<u32> {
    let address = socket.local_addr()?;
    if address.family() != libc::AF_NETLINK as libc::sa_family_t {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "socket is not a netlink socket",
        ));
    }
    // SAFETY: the family check above guarantees the storage holds a
    // sockaddr_nl.
    let nl = unsafe { &*address.as_ptr().cast::<libc::sockaddr_nl>() };
    Ok(nl.nl_pid)
}
