use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Length-prefixed protocol literal of the peer wire handshake
const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";

/// Total handshake size: 1 + 19 + 8 reserved + 20 infohash + 20 peer id
pub const HANDSHAKE_LEN: usize = 68;

/// The fixed-length peer wire handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    pub fn encode(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];

        buf[0] = PROTOCOL.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL);
        // buf[20..28] stays zero: no extension bits advertised
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);

        buf
    }

    /// Decode a peer's handshake; `None` if the protocol header is wrong
    pub fn decode(buf: &[u8; HANDSHAKE_LEN]) -> Option<Self> {
        if buf[0] as usize != PROTOCOL.len() || &buf[1..20] != PROTOCOL {
            return None;
        }

        let mut info_hash = [0u8; 20];
        let mut peer_id = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        peer_id.copy_from_slice(&buf[48..68]);

        Some(Self { info_hash, peer_id })
    }
}

/// Result of one reachability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Peer answered a valid handshake for the probed infohash
    Connected { peer_id: [u8; 20] },
    /// Connect, read, or overall deadline failure
    Unreachable,
    /// Peer answered, but not with a matching handshake
    HandshakeMismatch,
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Connected { peer_id } => {
                write!(f, "connected (peer id {})", hex::encode(peer_id))
            }
            ProbeOutcome::Unreachable => write!(f, "unreachable"),
            ProbeOutcome::HandshakeMismatch => write!(f, "handshake mismatch"),
        }
    }
}

/// Probe a peer with a handshake-only connection test
///
/// Sends the handshake, reads the peer's, and verifies the infohash
/// echoes back. Stops there: no bitfield, no piece traffic. The whole
/// exchange shares one deadline. Standalone utility, independent of the
/// announce path and the session registry.
pub async fn probe(
    host: &str,
    port: u16,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    deadline: Duration,
) -> ProbeOutcome {
    match timeout(deadline, probe_inner(host, port, info_hash, peer_id)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            debug!(host, port, "Probe timed out");
            ProbeOutcome::Unreachable
        }
    }
}

async fn probe_inner(
    host: &str,
    port: u16,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
) -> ProbeOutcome {
    let mut stream = match TcpStream::connect((host, port)).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(host, port, error = %e, "Probe connect failed");
            return ProbeOutcome::Unreachable;
        }
    };

    let ours = Handshake::new(info_hash, peer_id);
    if stream.write_all(&ours.encode()).await.is_err() {
        return ProbeOutcome::Unreachable;
    }

    let mut buf = [0u8; HANDSHAKE_LEN];
    if stream.read_exact(&mut buf).await.is_err() {
        return ProbeOutcome::Unreachable;
    }

    match Handshake::decode(&buf) {
        Some(theirs) if theirs.info_hash == info_hash => ProbeOutcome::Connected {
            peer_id: theirs.peer_id,
        },
        _ => ProbeOutcome::HandshakeMismatch,
    }
}
