//! # ZStd decompressor that uses thread local buffers to prevent allocations
use std::{cell::RefCell, time::Instant};
use zstd::block::Decompressor;

/// minimum size of the buffer.
///
/// The buffer will shrink back to this capacity after each use.
const MIN_CAPACITY: usize = 1024 * 64;
/// max capacity the buffer will grow to.
///
/// Hierarchies of very large trees decompress to hundreds of megabytes, anything beyond
/// this is treated as corrupt.
const MAX_CAPACITY: usize = 1024 * 1024 * 1024;

fn invalid_data(what: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, what)
}

/// thread-local decompression state
pub(crate) struct DecompressionState {
    /// reused zstd decompressor
    decompressor: Decompressor,
    /// buffer sized to the frame being decompressed, at most MAX_CAPACITY
    buffer: Vec<u8>,
}

impl DecompressionState {
    fn new() -> Self {
        let buffer: Vec<u8> = Vec::with_capacity(MIN_CAPACITY);
        Self {
            decompressor: Decompressor::new(),
            buffer,
        }
    }

    fn decompress(&mut self, data: &[u8]) -> std::io::Result<usize> {
        // the bound comes from the frame header, so garbage fails before any allocation
        let bound =
            Decompressor::upper_bound(data).ok_or_else(|| invalid_data("not a zstd frame"))?;
        if bound > MAX_CAPACITY {
            return Err(invalid_data("decompressed size exceeds the limit"));
        }
        self.buffer.resize(bound, 0);
        self.decompressor.decompress_to_buffer(data, &mut self.buffer)
    }

    /// Decompress some data and apply a transform to it, e.g. deserialization.
    ///
    /// Returns the result of the transform and the uncompressed size.
    fn decompress_and_transform<F, R>(
        &mut self,
        compressed: &[u8],
        f: &mut F,
    ) -> std::io::Result<(usize, R)>
    where
        F: FnMut(&[u8]) -> R,
    {
        let span = tracing::debug_span!("decompress_and_transform");
        let _entered = span.enter();
        let t0 = Instant::now();
        let len = self.decompress(compressed)?;
        let result = f(&self.buffer[0..len]);
        self.buffer.truncate(MIN_CAPACITY);
        self.buffer.shrink_to_fit();
        let dt = t0.elapsed();
        tracing::debug!("decompress_and_transform took {}", dt.as_secs_f64());
        Ok((len, result))
    }
}

thread_local!(static DECOMPRESSOR: RefCell<DecompressionState> = RefCell::new(DecompressionState::new()));

/// decompress some data into an internal thread-local buffer, and, on success, applies a transform to the buffer
///
/// returns the uncompressed size and the result of the function call
pub fn decompress_and_transform<F, R>(compressed: &[u8], f: &mut F) -> std::io::Result<(usize, R)>
where
    F: FnMut(&[u8]) -> R,
{
    DECOMPRESSOR.with(|d| d.borrow_mut().decompress_and_transform(compressed, f))
}
