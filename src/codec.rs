//! Value encoding between typed values and store bytes

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Reversible encoding of values to bytes
///
/// `decode(encode(v))` must equal `v` for every value the cache stores.
pub trait Codec: Send + Sync {
    /// Error produced by either direction
    type Error: std::error::Error + Send + Sync + 'static;

    /// Encode a value to bytes
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, Self::Error>;

    /// Decode bytes into a value of type `T`
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error>;
}

/// JSON encoding via serde_json
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    type Error = serde_json::Error;

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(value)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error> {
        serde_json::from_slice(bytes)
    }
}
