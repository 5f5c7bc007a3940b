//! Shared helpers for the cross-crate wire tests
//!
//! Run a single category with e.g. `cargo test -p integration-tests --test variant_tests`;
//! set `RUST_LOG=trace` to see the decoders' trace output.

use std::sync::Once;

use bytes::Bytes;
use midl_ndr::{decode, encode, NdrContext, NdrDecode, NdrEncode};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static TRACING: Once = Once::new();

/// Install the test subscriber once per test binary
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Encode as a complete little-endian message
pub fn encode_le<T: NdrEncode + ?Sized>(value: &T) -> Bytes {
    encode(value, NdrContext::new()).expect("encode")
}

/// Encode, decode and return the decoded value
pub fn roundtrip<T: NdrEncode + NdrDecode>(value: &T) -> T {
    let bytes = encode_le(value);
    decode(&bytes, NdrContext::new()).expect("decode")
}

/// The message as little-endian 32-bit words; a trailing partial word is dropped
pub fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
