//! Sample alignment across chunk boundaries.
//!
//! Deltas are cut by the server without regard for sample boundaries, so a
//! 16-bit sample can be split between two chunks. The aligner emits only whole
//! samples and carries the odd byte over to the next chunk.
//!
//! Chunks must be aligned in arrival order: the carry byte is the low byte of
//! a sample whose high byte comes next.

use crate::defaults::BYTES_PER_SAMPLE;

/// Byte sequence holding a whole number of 16-bit little-endian samples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlignedChunk(Vec<u8>);

impl AlignedChunk {
    /// Wrap bytes that are already sample aligned.
    ///
    /// Returns `None` if `bytes` has an odd length.
    pub fn from_aligned(bytes: Vec<u8>) -> Option<Self> {
        (bytes.len() % BYTES_PER_SAMPLE == 0).then_some(Self(bytes))
    }

    /// Build a chunk from decoded samples.
    pub fn from_samples(samples: &[i16]) -> Self {
        Self(samples.iter().flat_map(|s| s.to_le_bytes()).collect())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.0.len() / BYTES_PER_SAMPLE
    }

    /// Signed 16-bit samples, little-endian.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.0
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }
}

/// Carry state between two calls to [`align`]: zero or one leftover byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignmentState {
    carry: Option<u8>,
}

impl AlignmentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn carry(&self) -> Option<u8> {
        self.carry
    }
}

/// Prepend the carried byte to `raw` and split off the whole samples.
///
/// Returns the aligned prefix and the state to pass to the next call.
pub fn align(state: AlignmentState, raw: &[u8]) -> (AlignedChunk, AlignmentState) {
    let mut combined = Vec::with_capacity(raw.len() + 1);
    combined.extend(state.carry);
    combined.extend_from_slice(raw);

    let even_len = combined.len() / BYTES_PER_SAMPLE * BYTES_PER_SAMPLE;
    let carry = combined.get(even_len).copied();
    combined.truncate(even_len);

    (AlignedChunk(combined), AlignmentState { carry })
}

/// Owned aligner for one streaming session.
#[derive(Debug, Default)]
pub struct SampleAligner {
    state: AlignmentState,
}

impl SampleAligner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn align(&mut self, raw: &[u8]) -> AlignedChunk {
        let (chunk, state) = align(self.state, raw);
        self.state = state;
        chunk
    }

    pub fn state(&self) -> AlignmentState {
        self.state
    }

    /// End of stream: drop and return a trailing odd byte, if any.
    ///
    /// A lone byte cannot form a sample, so it is discarded rather than
    /// reported as an error.
    pub fn finish(&mut self) -> Option<u8> {
        self.state.carry.take()
    }

    pub fn reset(&mut self) {
        self.state = AlignmentState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_chunk_carries_last_byte() {
        let (chunk, state) = align(AlignmentState::new(), &[0x00, 0x01, 0x02]);
        assert_eq!(chunk.as_bytes(), &[0x00, 0x01]);
        assert_eq!(state.carry(), Some(0x02));

        let (chunk, state) = align(state, &[0x03]);
        assert_eq!(chunk.as_bytes(), &[0x02, 0x03]);
        assert_eq!(state.carry(), None);
    }

    #[test]
    fn even_chunk_passes_through() {
        let (chunk, state) = align(AlignmentState::new(), &[1, 2, 3, 4]);
        assert_eq!(chunk.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(state, AlignmentState::new());
    }

    #[test]
    fn single_byte_chunk_emits_nothing() {
        let (chunk, state) = align(AlignmentState::new(), &[7]);
        assert!(chunk.is_empty());
        assert_eq!(state.carry(), Some(7));
    }

    #[test]
    fn empty_chunk_keeps_carry() {
        let (chunk, state) = align(AlignmentState { carry: Some(9) }, &[]);
        assert!(chunk.is_empty());
        assert_eq!(state.carry(), Some(9));
    }

    #[test]
    fn concatenation_is_preserved_for_even_total() {
        let raw: Vec<Vec<u8>> = vec![vec![1], vec![2, 3, 4], vec![], vec![5, 6, 7], vec![8]];
        let mut aligner = SampleAligner::new();
        let mut out = Vec::new();
        for chunk in &raw {
            let aligned = aligner.align(chunk);
            assert_eq!(aligned.len() % 2, 0);
            out.extend_from_slice(aligned.as_bytes());
        }
        assert_eq!(aligner.finish(), None);
        assert_eq!(out, raw.concat());
    }

    #[test]
    fn odd_total_drops_exactly_one_trailing_byte() {
        let raw: Vec<Vec<u8>> = vec![vec![1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]];
        let mut aligner = SampleAligner::new();
        let mut out = Vec::new();
        for chunk in &raw {
            out.extend_from_slice(aligner.align(chunk).as_bytes());
        }
        assert_eq!(aligner.finish(), Some(9));
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(aligner.state().carry(), None);
    }

    #[test]
    fn samples_are_little_endian() {
        let chunk = AlignedChunk::from_aligned(vec![0x01, 0x00, 0xFF, 0xFF, 0x00, 0x80]).unwrap();
        assert_eq!(chunk.samples().collect::<Vec<_>>(), vec![1, -1, i16::MIN]);
        assert_eq!(chunk.sample_count(), 3);
    }

    #[test]
    fn from_aligned_rejects_odd_length() {
        assert!(AlignedChunk::from_aligned(vec![1, 2, 3]).is_none());
    }

    #[test]
    fn from_samples_roundtrips_through_samples() {
        let chunk = AlignedChunk::from_samples(&[0, 1000, -1000, i16::MAX]);
        assert_eq!(
            chunk.samples().collect::<Vec<_>>(),
            vec![0, 1000, -1000, i16::MAX]
        );
    }

    #[test]
    fn reset_clears_carry() {
        let mut aligner = SampleAligner::new();
        aligner.align(&[1]);
        aligner.reset();
        assert_eq!(aligner.state().carry(), None);
    }
}
