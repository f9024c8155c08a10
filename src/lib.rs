pub mod bencode;
pub mod core;
pub mod handlers;
pub mod probe;
pub mod session;
pub mod torrent;
pub mod upstream;
pub mod utils;
pub mod validation;
