pub mod fetcher;

pub use fetcher::BootstrapFetcher;
