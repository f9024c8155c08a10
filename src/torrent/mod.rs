pub mod metadata;
pub mod rewrite;

pub use metadata::TorrentMetadata;
