//! Common audio constants and sample helpers

/// Default sample rate for new instances (CD rate, libpd's own default)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Audio sample type exchanged with engines
pub type Sample = f32;

/// Split an interleaved buffer into per-channel vectors
pub fn deinterleave(interleaved: &[Sample], channels: usize) -> Vec<Vec<Sample>> {
    if channels == 0 {
        return Vec::new();
    }
    let mut out = vec![Vec::with_capacity(interleaved.len() / channels); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            out[ch].push(sample);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave() {
        let split = deinterleave(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2);
        assert_eq!(split, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
        assert!(deinterleave(&[1.0], 0).is_empty());
    }
}
