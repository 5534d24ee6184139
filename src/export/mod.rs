pub mod graphite;
pub mod plaintext;
