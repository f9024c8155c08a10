use crate::core::error::ValidationError;
use crate::utils::escape::url_decode;

/// Announce lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    Started,
    Stopped,
    Completed,
}

impl AnnounceEvent {
    /// Parse the event query value; empty or unknown means a plain
    /// interval announce
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "started" => Some(AnnounceEvent::Started),
            "stopped" => Some(AnnounceEvent::Stopped),
            "completed" => Some(AnnounceEvent::Completed),
            _ => None,
        }
    }
}

/// Validated announce query
///
/// Besides the standard tracker parameters, the rewritten torrents
/// embed two extension parameters in their announce URL: `total_size`
/// and `orig_tracker`. They are only required on the first "started"
/// announce for an unseen infohash; the handler enforces that.
#[derive(Debug)]
pub struct AnnounceQuery {
    pub info_hash: [u8; 20],
    pub event: Option<AnnounceEvent>,
    pub total_size: Option<u64>,
    pub upstream: Option<String>,
}

impl AnnounceQuery {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let mut info_hash: Option<Vec<u8>> = None;
        let mut event = None;
        let mut total_size = None;
        let mut upstream = None;

        for pair in raw.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                match key {
                    "info_hash" => info_hash = Some(url_decode(value)?),
                    "event" => event = AnnounceEvent::parse(value),
                    "total_size" => {
                        let size = value.parse::<u64>().map_err(|_| {
                            ValidationError::InvalidFormat("total_size".to_string())
                        })?;
                        total_size = Some(size);
                    }
                    "orig_tracker" => {
                        let decoded = url_decode(value)?;
                        let url = String::from_utf8(decoded).map_err(|_| {
                            ValidationError::InvalidFormat("orig_tracker".to_string())
                        })?;
                        upstream = Some(url);
                    }
                    // The client's own counters (uploaded, downloaded,
                    // left, ...) are deliberately ignored: nothing the
                    // real client reports ever reaches upstream.
                    _ => {}
                }
            }
        }

        let info_hash = info_hash
            .ok_or_else(|| ValidationError::MissingParameter("info_hash".to_string()))?;
        let info_hash: [u8; 20] =
            info_hash
                .try_into()
                .map_err(|bytes: Vec<u8>| ValidationError::InvalidLength {
                    expected: 20,
                    actual: bytes.len(),
                })?;

        Ok(Self {
            info_hash,
            event,
            total_size,
            upstream,
        })
    }
}
