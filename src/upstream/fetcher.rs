use crate::bencode::decoder::decode;
use crate::bencode::value::Value;
use crate::core::config::Config;
use crate::core::error::BootstrapError;
use crate::session::entry::SessionEntry;
use crate::session::identity::ProcessSession;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use reqwest::header;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

/// Performs the one-time "started" announce against the real tracker
///
/// The response body is required to arrive gzip-compressed, is
/// decompressed and sanity-checked as a bencode dictionary, and is then
/// cached verbatim by the session registry. Any failure aborts the
/// bootstrap; there are no retries here, the client's own re-announce
/// cadence drives recovery.
pub struct BootstrapFetcher {
    client: reqwest::Client,
    user_agent: String,
    numwant: u32,
}

impl BootstrapFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream.timeout_secs))
            .build()
            .context("Failed to create upstream HTTP client")?;

        Ok(Self {
            client,
            user_agent: config.client.user_agent.clone(),
            numwant: config.client.numwant,
        })
    }

    /// Build the full upstream announce URL for a session
    ///
    /// Counters come from the synthetic session entry, never from the
    /// local client. `uploaded` is pinned to zero.
    pub fn announce_url(
        &self,
        entry: &SessionEntry,
        session: &ProcessSession,
        event: &str,
    ) -> String {
        let sep = if entry.upstream.contains('?') { '&' } else { '?' };

        format!(
            "{upstream}{sep}info_hash={info_hash}&peer_id={peer_id}&port={port}\
             &uploaded=0&downloaded={downloaded}&left={left}&corrupt=0&key={key}\
             &event={event}&numwant={numwant}&compact=1&no_peer_id=1&supportcrypto=1&redundant=0",
            upstream = entry.upstream,
            sep = sep,
            info_hash = entry.info_hash_encoded,
            peer_id = session.peer_id,
            port = session.port,
            downloaded = entry.downloaded,
            left = entry.left,
            key = session.key,
            event = event,
            numwant = self.numwant,
        )
    }

    /// Issue the bootstrap announce and return the decompressed body
    pub async fn bootstrap(
        &self,
        entry: &SessionEntry,
        session: &ProcessSession,
    ) -> Result<Vec<u8>, BootstrapError> {
        let url = self.announce_url(entry, session, "started");
        debug!(url = %url, "Issuing upstream bootstrap announce");

        let response = self
            .client
            .get(&url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT_ENCODING, "gzip")
            .header(header::CONNECTION, "close")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let decompressed = decompress_gzip(&body)?;
        validate_response(&decompressed)?;

        Ok(decompressed)
    }
}

/// Decompress a gzip body; anything else is a protocol error
pub fn decompress_gzip(body: &[u8]) -> Result<Vec<u8>, BootstrapError> {
    let mut decoder = GzDecoder::new(body);
    let mut decompressed = Vec::new();

    decoder
        .read_to_end(&mut decompressed)
        .map_err(BootstrapError::Decompress)?;

    Ok(decompressed)
}

/// A usable tracker response is a bencode dictionary
pub fn validate_response(body: &[u8]) -> Result<(), BootstrapError> {
    match decode(body)? {
        Value::Dict(_) => Ok(()),
        _ => Err(BootstrapError::NotADict),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn fetcher() -> BootstrapFetcher {
        BootstrapFetcher::new(&Config::default()).unwrap()
    }

    fn session() -> ProcessSession {
        ProcessSession {
            peer_id: "-qB5020-abcdefghijkl".to_string(),
            key: "DEADBEEF".to_string(),
            port: 17673,
        }
    }

    fn entry(upstream: &str) -> SessionEntry {
        SessionEntry::new([0xffu8; 20], 2048, upstream.to_string(), 1, 2)
    }

    #[test]
    fn test_announce_url_shape() {
        let url = fetcher().announce_url(&entry("http://t.example/ann"), &session(), "started");

        assert_eq!(
            url,
            "http://t.example/ann?info_hash=\
             %FF%FF%FF%FF%FF%FF%FF%FF%FF%FF%FF%FF%FF%FF%FF%FF%FF%FF%FF%FF\
             &peer_id=-qB5020-abcdefghijkl&port=17673\
             &uploaded=0&downloaded=0&left=2048&corrupt=0&key=DEADBEEF\
             &event=started&numwant=200&compact=1&no_peer_id=1&supportcrypto=1&redundant=0"
        );
    }

    #[test]
    fn test_announce_url_appends_to_existing_query() {
        let url = fetcher().announce_url(
            &entry("http://t.example/ann?passkey=abc123"),
            &session(),
            "started",
        );

        assert!(url.starts_with("http://t.example/ann?passkey=abc123&info_hash="));
        // No second '?'
        assert_eq!(url.matches('?').count(), 1);
    }

    #[test]
    fn test_decompress_gzip_roundtrip() {
        let payload = b"d8:intervali1800e5:peers6:\x01\x02\x03\x04\x1a\xe1e";

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let decompressed = decompress_gzip(&compressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn test_decompress_rejects_plain_body() {
        assert!(matches!(
            decompress_gzip(b"d8:intervali1800ee"),
            Err(BootstrapError::Decompress(_))
        ));
    }

    #[test]
    fn test_validate_response() {
        assert!(validate_response(b"d8:intervali1800ee").is_ok());
        assert!(matches!(
            validate_response(b"i42e"),
            Err(BootstrapError::NotADict)
        ));
        assert!(matches!(
            validate_response(b"not bencode"),
            Err(BootstrapError::InvalidResponse(_))
        ));
    }
}
