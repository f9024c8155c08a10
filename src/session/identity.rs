use rand::distr::Alphanumeric;
use rand::Rng;

/// Per-process announce identity
///
/// One peer id and one session key are generated at startup and reused
/// for every torrent the process handles, the same way a single real
/// client instance would. Threaded into the proxy and the fetcher as an
/// argument, never read from ambient state.
#[derive(Debug, Clone)]
pub struct ProcessSession {
    /// 20-character peer id in the Azureus style of the spoofed client
    pub peer_id: String,
    /// 8-character session key sent with every upstream announce
    pub key: String,
    /// Port reported to the upstream tracker
    pub port: u16,
}

impl ProcessSession {
    pub fn generate(port: u16) -> Self {
        let mut rng = rand::rng();

        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();

        let key = format!("{:08X}", rng.random::<u32>());

        Self {
            peer_id: format!("-qB5020-{suffix}"),
            key,
            port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_shape() {
        let session = ProcessSession::generate(17673);

        assert_eq!(session.peer_id.len(), 20);
        assert!(session.peer_id.starts_with("-qB5020-"));
        // Peer id must survive a query string unescaped
        assert!(session
            .peer_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_key_shape() {
        let session = ProcessSession::generate(17673);

        assert_eq!(session.key.len(), 8);
        assert!(session.key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identities_differ_between_generations() {
        let a = ProcessSession::generate(1);
        let b = ProcessSession::generate(1);

        // Overwhelmingly likely; a collision here means the RNG is broken
        assert_ne!((&a.peer_id, &a.key), (&b.peer_id, &b.key));
    }
}
