pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{all_backends, seeded_bytes, sha256_hash};
