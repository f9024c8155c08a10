pub mod handshake;

pub use handshake::{probe, Handshake, ProbeOutcome};
