pub mod announce;
pub mod fallback;
pub mod health;
