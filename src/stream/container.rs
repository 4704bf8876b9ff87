//! WAV container encoding for the accumulated PCM.
//!
//! The header is written by hand so the output is byte-exact: a canonical
//! 44-byte RIFF/WAVE header with a single `fmt ` and `data` chunk.

use crate::defaults::{BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE};
use crate::stream::aligner::AlignedChunk;
use std::io::{self, Write};

/// Size of the canonical PCM WAV header.
pub const HEADER_LEN: usize = 44;

/// PCM format code in the `fmt ` chunk.
const FORMAT_PCM: u16 = 1;

/// Size of the `fmt ` chunk body for PCM.
const FMT_CHUNK_LEN: u32 = 16;

/// Uncompressed PCM stream layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// 16-bit mono at `sample_rate`.
    pub fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: CHANNELS,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels.saturating_mul(self.bits_per_sample / 8)
    }

    /// Bytes per second. Saturates rather than wrapping for absurd rates.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(u32::from(self.block_align()))
    }

    /// Playback duration of `data_len` bytes, in seconds.
    pub fn duration_secs(&self, data_len: usize) -> f64 {
        let rate = self.byte_rate();
        if rate == 0 {
            return 0.0;
        }
        data_len as f64 / rate as f64
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::mono16(SAMPLE_RATE)
    }
}

/// Append-only PCM accumulator that serializes to a WAV file.
#[derive(Debug, Clone, Default)]
pub struct ContainerBuffer {
    format: PcmFormat,
    data: Vec<u8>,
}

impl ContainerBuffer {
    pub fn new(format: PcmFormat) -> Self {
        Self {
            format,
            data: Vec::new(),
        }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Append a chunk as-is.
    pub fn append(&mut self, chunk: &AlignedChunk) {
        self.data.extend_from_slice(chunk.as_bytes());
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The 44-byte header describing the current contents.
    pub fn header(&self) -> [u8; HEADER_LEN] {
        let data_size = u32::try_from(self.data.len()).unwrap_or(u32::MAX);
        let riff_size = data_size.saturating_add(36);
        let format = self.format;

        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(b"RIFF");
        header[4..8].copy_from_slice(&riff_size.to_le_bytes());
        header[8..12].copy_from_slice(b"WAVE");
        header[12..16].copy_from_slice(b"fmt ");
        header[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        header[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
        header[22..24].copy_from_slice(&format.channels.to_le_bytes());
        header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
        header[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
        header[32..34].copy_from_slice(&format.block_align().to_le_bytes());
        header[34..36].copy_from_slice(&format.bits_per_sample.to_le_bytes());
        header[36..40].copy_from_slice(b"data");
        header[40..44].copy_from_slice(&data_size.to_le_bytes());
        header
    }

    /// Header followed by the raw PCM bytes.
    ///
    /// Does not consume the buffer; calling it twice yields identical bytes.
    pub fn finalize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.header());
        out.extend_from_slice(&self.data);
        out
    }

    /// Stream the container to `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.header())?;
        writer.write_all(&self.data)?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk(bytes: &[u8]) -> AlignedChunk {
        AlignedChunk::from_aligned(bytes.to_vec()).unwrap()
    }

    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    fn read_u16(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    #[test]
    fn empty_buffer_finalizes_to_bare_header() {
        let wav = ContainerBuffer::new(PcmFormat::mono16(22050)).finalize();
        assert_eq!(wav.len(), HEADER_LEN);
        assert_eq!(read_u32(&wav, 4), 36);
        assert_eq!(read_u32(&wav, 40), 0);
    }

    #[test]
    fn header_layout_is_canonical() {
        let mut buffer = ContainerBuffer::new(PcmFormat::mono16(22050));
        buffer.append(&chunk(&[1, 2, 3, 4, 5, 6]));
        let wav = buffer.finalize();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(read_u32(&wav, 4), 36 + 6);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(read_u32(&wav, 16), 16);
        assert_eq!(read_u16(&wav, 20), 1);
        assert_eq!(read_u16(&wav, 22), 1);
        assert_eq!(read_u32(&wav, 24), 22050);
        assert_eq!(read_u32(&wav, 28), 44100);
        assert_eq!(read_u16(&wav, 32), 2);
        assert_eq!(read_u16(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(read_u32(&wav, 40), 6);
        assert_eq!(&wav[44..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn appended_chunks_are_concatenated_in_order() {
        let a = chunk(&[0x10, 0x11, 0x12, 0x13]);
        let b = chunk(&[0x20, 0x21]);
        let mut buffer = ContainerBuffer::default();
        buffer.append(&a);
        buffer.append(&b);

        let wav = buffer.finalize();
        assert_eq!(read_u32(&wav, 40) as usize, a.len() + b.len());
        assert_eq!(&wav[HEADER_LEN..], &[0x10, 0x11, 0x12, 0x13, 0x20, 0x21]);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut buffer = ContainerBuffer::default();
        buffer.append(&chunk(&[9, 8, 7, 6]));
        assert_eq!(buffer.finalize(), buffer.finalize());
    }

    #[test]
    fn write_to_matches_finalize() {
        let mut buffer = ContainerBuffer::default();
        buffer.append(&chunk(&[1, 0, 2, 0]));
        let mut out = Vec::new();
        buffer.write_to(&mut out).unwrap();
        assert_eq!(out, buffer.finalize());
    }

    #[test]
    fn output_parses_as_standard_wav() {
        let mut buffer = ContainerBuffer::new(PcmFormat::mono16(22050));
        buffer.append(&AlignedChunk::from_samples(&[0, 1000, -1000, i16::MAX, i16::MIN]));

        let reader = hound::WavReader::new(Cursor::new(buffer.finalize())).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);

        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, i16::MAX, i16::MIN]);
    }

    #[test]
    fn empty_output_parses_as_standard_wav() {
        let reader =
            hound::WavReader::new(Cursor::new(ContainerBuffer::default().finalize())).unwrap();
        assert_eq!(reader.len(), 0);
    }

    #[test]
    fn format_derived_fields() {
        let format = PcmFormat::mono16(16000);
        assert_eq!(format.block_align(), 2);
        assert_eq!(format.byte_rate(), 32000);
        assert_eq!(format.duration_secs(32000), 1.0);
    }

    #[test]
    fn huge_sample_rate_saturates_byte_rate() {
        let format = PcmFormat::mono16(3_000_000_000);
        assert_eq!(format.byte_rate(), u32::MAX);

        let header = ContainerBuffer::new(format).header();
        assert_eq!(&header[24..28], &3_000_000_000u32.to_le_bytes());
        assert_eq!(&header[28..32], &u32::MAX.to_le_bytes());
    }

    #[test]
    fn clear_empties_data() {
        let mut buffer = ContainerBuffer::default();
        buffer.append(&chunk(&[1, 2]));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.finalize().len(), HEADER_LEN);
    }
}
