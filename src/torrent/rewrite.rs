use crate::core::error::RewriteError;
use crate::torrent::metadata::TorrentMetadata;
use crate::utils::escape::url_encode;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Prefix that marks a torrent file as already rewritten
pub const PROCESSED_PREFIX: &str = "FREE_";

/// Suffix appended to a source file once its rewrite has been persisted
pub const SOURCE_MARKER: &str = ".orig";

/// One successfully rewritten torrent
#[derive(Debug, Clone)]
pub struct RewrittenTorrent {
    pub file_name: String,
    pub info_hash: [u8; 20],
    pub total_size: u64,
    pub upstream: String,
}

/// Outcome of one directory pass
#[derive(Debug, Default)]
pub struct RewriteSummary {
    pub processed: Vec<RewrittenTorrent>,
    pub skipped: usize,
    pub failed: usize,
}

/// Rewrite every unprocessed `.torrent` file in a directory
///
/// A file that fails to decode or persist is logged and abandoned; the
/// pass continues with the remaining files. Already-processed files
/// (the `FREE_` prefix) and non-torrent files are skipped, which makes
/// repeated passes idempotent.
pub fn rewrite_directory(dir: &Path, proxy_url: &str) -> Result<RewriteSummary, std::io::Error> {
    let mut summary = RewriteSummary::default();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };

        if !name.ends_with(".torrent") {
            continue;
        }

        if name.starts_with(PROCESSED_PREFIX) {
            info!(file = %name, "Skipping already processed torrent");
            summary.skipped += 1;
            continue;
        }

        match rewrite_file(&entry.path(), proxy_url) {
            Ok(rewritten) => {
                info!(
                    file = %rewritten.file_name,
                    info_hash = %hex::encode(rewritten.info_hash),
                    total_size = rewritten.total_size,
                    upstream = %rewritten.upstream,
                    "Torrent rewritten to announce locally"
                );
                summary.processed.push(rewritten);
            }
            Err(e) => {
                warn!(file = %name, error = %e, "Failed to rewrite torrent, skipping file");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Rewrite a single torrent file
///
/// The rewritten copy lands next to the source as `FREE_<name>` via a
/// temp-file-then-rename sequence, so a concurrently running client
/// never observes a half-written file. The source is then renamed with
/// a `.orig` suffix to mark it processed.
pub fn rewrite_file(path: &Path, proxy_url: &str) -> Result<RewrittenTorrent, RewriteError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RewriteError::BadFileName(path.display().to_string()))?
        .to_string();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let raw = fs::read(path)?;
    let mut meta = TorrentMetadata::from_bytes(raw)?;

    let info_hash = meta.info_hash();
    let total_size = meta.total_size()?;
    let upstream = String::from_utf8_lossy(meta.announce()?).into_owned();

    // The client echoes these two extension parameters back on every
    // announce, which is how the proxy learns the size and the real
    // tracker on first contact.
    let local_announce = format!(
        "{}?total_size={}&orig_tracker={}",
        proxy_url,
        total_size,
        url_encode(upstream.as_bytes())
    );
    meta.rewrite_announce(&local_announce);

    let output = dir.join(format!("{PROCESSED_PREFIX}{name}"));
    let tmp = dir.join(format!(".{name}.tmp"));

    fs::write(&tmp, meta.to_bytes())?;
    fs::rename(&tmp, &output)?;

    // Sentinel rename: the source loses its .torrent suffix and is
    // invisible to later passes.
    fs::rename(path, dir.join(format!("{name}{SOURCE_MARKER}")))?;

    Ok(RewrittenTorrent {
        file_name: name,
        info_hash,
        total_size,
        upstream,
    })
}
