//! Fake endpoints and reply builders for exercising the client offline.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use labelctl_proto::{
    CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, GENL_ID_CTRL, Message, NLM_F_MULTI, Nla,
    encode_done, encode_error, find_attr, split_frames,
};

use crate::transport::{Endpoint, Session};

/// Port identity the fakes hand out.
pub(crate) const PORT: u32 = 7001;

/// Runtime family ids the fake controller assigns.
pub(crate) const MGMT_FAMILY: u16 = 0x18;
pub(crate) const UNLBL_FAMILY: u16 = 0x19;
pub(crate) const CIPSO_FAMILY: u16 = 0x1a;

/// An endpoint with a manually stocked receive queue.
///
/// Used by the transport suite, which wants byte-level control over what
/// arrives and in what order.
#[derive(Debug, Default)]
pub(crate) struct FakeEndpoint {
    pub(crate) sent: Vec<Vec<u8>>,
    pub(crate) queue: VecDeque<Vec<u8>>,
    pub(crate) recv_error: Option<io::ErrorKind>,
}

impl FakeEndpoint {
    pub(crate) fn push(&mut self, datagram: Vec<u8>) {
        self.queue.push_back(datagram);
    }
}

impl Endpoint for FakeEndpoint {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.sent.push(datagram.to_vec());
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> io::Result<Vec<u8>> {
        if let Some(kind) = self.recv_error.take() {
            return Err(io::Error::from(kind));
        }
        self.queue
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))
    }

    fn port_id(&self) -> u32 {
        PORT
    }
}

/// Builds a session around a manual endpoint with a short deadline.
pub(crate) fn fake_session(endpoint: FakeEndpoint) -> Session<FakeEndpoint> {
    Session::with_endpoint(endpoint, Duration::from_secs(1))
}

/// Canned responses a script can hand back for one request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// A data message; `multi` marks it part of a dump run.
    Data {
        family: u16,
        command: u8,
        attrs: Vec<Nla>,
        multi: bool,
    },
    /// The dump terminator.
    Done,
    /// A positive acknowledgement.
    Ack,
    /// A refusal with the given errno.
    Errno(i32),
}

/// An endpoint that answers each request through a script.
///
/// Controller lookups are answered internally with the fake family table,
/// so scripts only see subsystem requests. Replies are encoded with the
/// request's own sequence number and port, which keeps correlation honest
/// without the script having to care.
pub(crate) struct ScriptedEndpoint {
    script: Box<dyn FnMut(&Message) -> Vec<Reply>>,
    queue: VecDeque<Vec<u8>>,
    pub(crate) requests: Vec<Message>,
}

impl ScriptedEndpoint {
    pub(crate) fn new(script: impl FnMut(&Message) -> Vec<Reply> + 'static) -> Self {
        Self {
            script: Box::new(script),
            queue: VecDeque::new(),
            requests: Vec::new(),
        }
    }

    fn family_for(name: &str) -> Option<u16> {
        match name {
            "NLBL_MGMT" => Some(MGMT_FAMILY),
            "NLBL_UNLBL" => Some(UNLBL_FAMILY),
            "NLBL_CIPSOv4" => Some(CIPSO_FAMILY),
            _ => None,
        }
    }
}

impl Endpoint for ScriptedEndpoint {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let frames = split_frames(datagram).map_err(io::Error::other)?;
        for frame in frames {
            let request = Message::decode(&frame).map_err(io::Error::other)?;
            let sequence = request.sequence;
            if request.family == GENL_ID_CTRL {
                let name = find_attr(&request.attrs, CTRL_ATTR_FAMILY_NAME)
                    .and_then(|attr| attr.as_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                match Self::family_for(&name) {
                    Some(id) => self.queue.push_back(
                        Message {
                            family: GENL_ID_CTRL,
                            command: 1,
                            version: 1,
                            flags: 0,
                            sequence,
                            port: PORT,
                            attrs: vec![Nla::u16(CTRL_ATTR_FAMILY_ID, id)],
                        }
                        .encode(),
                    ),
                    // ENOENT: the family is not registered.
                    None => self.queue.push_back(encode_error(-2, sequence, PORT)),
                }
                continue;
            }
            let replies = (self.script)(&request);
            self.requests.push(request);
            for reply in replies {
                let datagram = match reply {
                    Reply::Data {
                        family,
                        command,
                        attrs,
                        multi,
                    } => Message {
                        family,
                        command,
                        version: crate::SERVICE_VERSION,
                        flags: if multi { NLM_F_MULTI } else { 0 },
                        sequence,
                        port: PORT,
                        attrs,
                    }
                    .encode(),
                    Reply::Done => encode_done(sequence, PORT),
                    Reply::Ack => encode_error(0, sequence, PORT),
                    Reply::Errno(errno) => encode_error(-errno, sequence, PORT),
                };
                self.queue.push_back(datagram);
            }
        }
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> io::Result<Vec<u8>> {
        self.queue
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))
    }

    fn port_id(&self) -> u32 {
        PORT
    }
}

/// Builds a session around a scripted endpoint.
pub(crate) fn scripted_session(
    script: impl FnMut(&Message) -> Vec<Reply> + 'static,
) -> Session<ScriptedEndpoint> {
    Session::with_endpoint(ScriptedEndpoint::new(script), Duration::from_secs(1))
}
