pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{sha256_digest, seeded_bytes, test_config, test_uploads};
#[allow(unused_imports)]
pub use mocks::{FlakyBackend, GatedBackend};
