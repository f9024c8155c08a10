use crate::utils::escape::url_encode;
use rand::Rng;

/// One torrent's proxied session
///
/// All counters are synthetic. The real client's figures are never read;
/// upstream only ever observes the numbers fabricated here. Invariant:
/// `downloaded + left == total_size` at every point in the lifecycle.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub info_hash: [u8; 20],
    /// Percent-escaped form, precomputed for upstream announce URLs
    pub info_hash_encoded: String,
    pub total_size: u64,
    pub downloaded: u64,
    /// Stays at zero: this tool never claims upload credit
    pub uploaded: u64,
    pub left: u64,
    /// Per-session ceiling on the apparent rate, drawn once at creation
    pub max_rate: u64,
    /// The genuine tracker this session was bootstrapped against
    pub upstream: String,
    /// Decompressed upstream response bytes, served verbatim
    pub cached_peers: Vec<u8>,
}

impl SessionEntry {
    pub fn new(
        info_hash: [u8; 20],
        total_size: u64,
        upstream: String,
        rate_floor: u64,
        rate_ceiling: u64,
    ) -> Self {
        let max_rate = rand::rng().random_range(rate_floor..rate_ceiling);

        Self {
            info_hash,
            info_hash_encoded: url_encode(&info_hash),
            total_size,
            downloaded: 0,
            uploaded: 0,
            left: total_size,
            max_rate,
            upstream,
            cached_peers: Vec::new(),
        }
    }

    /// Advance the synthetic progress by one announce tick
    ///
    /// `delta = base_rate * uniform(0.9, 1.1)`, gated by the session's
    /// own max rate and clamped at completion. Independent of wall-clock
    /// spacing between announces.
    pub fn advance(&mut self, base_rate: u64) {
        let ratio: f64 = rand::rng().random_range(0.9..1.1);
        let delta = ((base_rate as f64 * ratio) as u64)
            .min(self.max_rate)
            .min(self.left);

        self.downloaded += delta;
        self.left -= delta;
    }

    pub fn is_complete(&self) -> bool {
        self.left == 0
    }
}
