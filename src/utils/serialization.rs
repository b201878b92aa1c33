use crate::error::{FoamError, Result};

/// Get the bincode configuration
fn get_config() -> impl bincode::config::Config {
    // Legacy encoding keeps the on-disk layout stable across bincode releases.
    // The limit stops a corrupt length prefix from exhausting memory.
    bincode::config::legacy().with_limit::<{ 256 * 1024 * 1024 }>()
}

/// Serialize data using bincode v2.0 with serde
///
/// # Errors
///
/// Returns a `Corruption` error naming `what` if serialization fails
pub fn serialize<T: serde::Serialize>(what: &str, data: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(data, get_config()).map_err(|e| FoamError::corruption(what, e))
}

/// Deserialize data using bincode v2.0 with serde
///
/// # Errors
///
/// Returns a `Corruption` error naming `what` if the bytes are malformed or
/// were written by an incompatible format
pub fn deserialize<T: serde::de::DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T> {
    let (result, _bytes_read) = bincode::serde::decode_from_slice(bytes, get_config())
        .map_err(|e| FoamError::corruption(what, e))?;
    Ok(result)
}
