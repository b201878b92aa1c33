use crate::error::{FoamError, Result};
use std::io::{Read, Write};
use zstd::stream::Encoder;

/// Compress bytes using zstd compression
///
/// # Errors
///
/// Returns a `Corruption` error naming `what` if compression fails
pub fn compress_bytes(what: &str, data: &[u8], level: i32) -> Result<Vec<u8>> {
    zstd::encode_all(data, level).map_err(|e| FoamError::corruption(what, e))
}

/// Decompress bytes compressed with zstd
///
/// # Errors
///
/// Returns a `Corruption` error naming `what` if the frame is damaged
pub fn decompress_bytes(what: &str, data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data).map_err(|e| FoamError::corruption(what, e))
}

/// Which side of a streaming copy failed
#[derive(Debug)]
pub enum StreamError {
    /// Reading the source failed
    Read(std::io::Error),
    /// Compressing or writing the destination failed
    Write(std::io::Error),
}

/// Compress everything from `input` into `output`, returning the number of
/// uncompressed bytes consumed.
///
/// Read and write failures are reported separately so the caller can blame
/// the right path.
///
/// # Errors
///
/// Returns [`StreamError::Read`] or [`StreamError::Write`]
pub fn compress_stream<R: Read, W: Write>(
    mut input: R,
    output: W,
    level: i32,
) -> std::result::Result<(u64, W), StreamError> {
    let mut encoder = Encoder::new(output, level).map_err(StreamError::Write)?;
    let mut buffer = vec![0u8; 65536];
    let mut total = 0u64;

    loop {
        let n = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StreamError::Read(e)),
        };
        encoder.write_all(&buffer[..n]).map_err(StreamError::Write)?;
        total += n as u64;
    }

    let output = encoder.finish().map_err(StreamError::Write)?;
    Ok((total, output))
}
