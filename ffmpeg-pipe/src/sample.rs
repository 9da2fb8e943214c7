//! Mono s16le PCM, the raw audio format on the channel.

/// Scale between normalized floats and 16-bit integers. Both directions use
/// the positive extreme, so `i16::MIN` decodes slightly below -1.
pub const SCALE: f64 = i16::MAX as f64;

pub const SAMPLE_BYTES: usize = 2;

/// Decodes whole little-endian samples from `bytes` into `out`. A trailing odd
/// byte is ignored. Returns the number of samples written.
pub fn decode(bytes: &[u8], out: &mut [f64]) -> usize {
    let mut count = 0;
    for (pair, slot) in bytes.chunks_exact(SAMPLE_BYTES).zip(out.iter_mut()) {
        *slot = i16::from_le_bytes([pair[0], pair[1]]) as f64 / SCALE;
        count += 1;
    }
    count
}

/// Converts one normalized sample. Input is clamped to [-1, 1] first, so
/// out-of-range values saturate rather than wrap. NaN becomes 0.
pub fn quantize(x: f64) -> i16 {
    if x.is_nan() {
        return 0;
    }
    (x.clamp(-1.0, 1.0) * SCALE) as i16
}

/// Appends the little-endian encoding of `samples` to `out`.
pub fn encode_into(samples: &[f64], out: &mut Vec<u8>) {
    out.reserve(samples.len() * SAMPLE_BYTES);
    for &x in samples {
        out.extend_from_slice(&quantize(x).to_le_bytes());
    }
}
