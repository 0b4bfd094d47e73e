//! # Realtime Audio Utilities
//!
//! Helpers shared by the realtime session multiplexer and the realtime
//! provider adapters: MIME/format validation, PCM16 chunking, base64 transit
//! encoding, and duration accounting for the canonical audio frame (mono,
//! 16-bit linear PCM, little-endian, 16000 Hz).

use base64::Engine as _;
use thiserror::Error;

/// Sample rate assumed for every realtime audio frame. The gateway does not
/// resample; anything else is rejected.
pub const SAMPLE_RATE_HZ: u32 = 16_000;
/// Bytes per sample for 16-bit PCM.
pub const BYTES_PER_SAMPLE: usize = 2;
pub const BYTES_PER_SECOND: usize = SAMPLE_RATE_HZ as usize * BYTES_PER_SAMPLE;
/// Default maximum size of one audio chunk, roughly 1s at 16kHz mono PCM16.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("invalid_audio_chunk")]
    InvalidChunk,
    #[error("invalid_audio_base64")]
    InvalidBase64,
    #[error("resampling is not implemented; reject non-16kHz-mono-PCM16 input instead")]
    ResamplingNotImplemented,
}

/// The canonical input audio format: `audio/pcm;rate=16000`, mono.
/// All three conditions (MIME, channel count, rate) must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub mime_type: &'static str,
    pub channels: u16,
    pub sample_rate_hz: u32,
}

impl AudioFormat {
    pub const CANONICAL: AudioFormat = AudioFormat {
        mime_type: "audio/pcm;rate=16000",
        channels: 1,
        sample_rate_hz: SAMPLE_RATE_HZ,
    };

    /// Validates a claimed format against the canonical one. Any mismatch
    /// triggers `ResamplingNotImplemented` — the gateway rejects rather than
    /// converts.
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.mime_type != Self::CANONICAL.mime_type
            || self.channels != Self::CANONICAL.channels
            || self.sample_rate_hz != Self::CANONICAL.sample_rate_hz
        {
            return Err(AudioError::ResamplingNotImplemented);
        }
        Ok(())
    }
}

/// Decode a base64 chunk and validate it as canonical PCM16: even byte
/// length (2-byte sample alignment) and within `max_chunk_bytes`.
pub fn decode_and_validate_chunk(b64: &str, max_chunk_bytes: usize) -> Result<Vec<u8>, AudioError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|_| AudioError::InvalidBase64)?;

    validate_chunk_bytes(&bytes, max_chunk_bytes)?;
    Ok(bytes)
}

/// Validate raw (already-decoded) PCM16 bytes against alignment and size
/// bounds, without the base64 step.
pub fn validate_chunk_bytes(bytes: &[u8], max_chunk_bytes: usize) -> Result<(), AudioError> {
    if bytes.is_empty() || bytes.len() % BYTES_PER_SAMPLE != 0 || bytes.len() > max_chunk_bytes {
        return Err(AudioError::InvalidChunk);
    }
    Ok(())
}

pub fn encode_chunk(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Duration in milliseconds implied by a byte length of canonical PCM16.
pub fn duration_ms(byte_len: usize) -> u64 {
    (byte_len as u64 * 1000) / BYTES_PER_SECOND as u64
}

/// Split a PCM16 buffer into fixed-duration chunks on sample boundaries.
/// The final chunk may be shorter than `chunk_duration_ms`.
pub fn chunk_by_duration(pcm: &[u8], chunk_duration_ms: u64) -> Vec<&[u8]> {
    if pcm.is_empty() || chunk_duration_ms == 0 {
        return Vec::new();
    }

    let mut chunk_bytes = (BYTES_PER_SECOND as u64 * chunk_duration_ms / 1000) as usize;
    // Round down to a 2-byte (sample) boundary, never to zero.
    chunk_bytes -= chunk_bytes % BYTES_PER_SAMPLE;
    if chunk_bytes == 0 {
        chunk_bytes = BYTES_PER_SAMPLE;
    }

    pcm.chunks(chunk_bytes).collect()
}

/// Running accounting of buffered audio for a single realtime session.
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioAccounting {
    pub buffered_bytes: u64,
}

impl AudioAccounting {
    pub fn record_chunk(&mut self, byte_len: usize) {
        self.buffered_bytes += byte_len as u64;
    }

    pub fn buffered_ms(&self) -> u64 {
        duration_ms(self.buffered_bytes as usize)
    }

    pub fn clear(&mut self) {
        self.buffered_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_format_validates() {
        assert!(AudioFormat::CANONICAL.validate().is_ok());
    }

    #[test]
    fn non_canonical_rate_rejected() {
        let format = AudioFormat { sample_rate_hz: 44_100, ..AudioFormat::CANONICAL };
        assert!(matches!(format.validate(), Err(AudioError::ResamplingNotImplemented)));
    }

    #[test]
    fn rejects_odd_length_chunk() {
        let bytes = vec![0u8; 3];
        assert!(matches!(
            validate_chunk_bytes(&bytes, DEFAULT_MAX_CHUNK_BYTES),
            Err(AudioError::InvalidChunk)
        ));
    }

    #[test]
    fn rejects_oversized_chunk() {
        let bytes = vec![0u8; DEFAULT_MAX_CHUNK_BYTES + 2];
        assert!(matches!(
            validate_chunk_bytes(&bytes, DEFAULT_MAX_CHUNK_BYTES),
            Err(AudioError::InvalidChunk)
        ));
    }

    #[test]
    fn rejects_empty_chunk() {
        assert!(matches!(
            validate_chunk_bytes(&[], DEFAULT_MAX_CHUNK_BYTES),
            Err(AudioError::InvalidChunk)
        ));
    }

    #[test]
    fn base64_round_trip() {
        let bytes = vec![1u8, 2, 3, 4];
        let encoded = encode_chunk(&bytes);
        let decoded = decode_and_validate_chunk(&encoded, DEFAULT_MAX_CHUNK_BYTES).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn invalid_base64_rejected() {
        let result = decode_and_validate_chunk("not base64!!", DEFAULT_MAX_CHUNK_BYTES);
        assert!(matches!(result, Err(AudioError::InvalidBase64)));
    }

    #[test]
    fn duration_matches_one_second_of_audio() {
        assert_eq!(duration_ms(BYTES_PER_SECOND), 1000);
        assert_eq!(duration_ms(BYTES_PER_SECOND / 2), 500);
    }

    #[test]
    fn chunking_respects_sample_alignment() {
        let pcm = vec![0u8; BYTES_PER_SECOND]; // 1s of silence
        let chunks = chunk_by_duration(&pcm, 100);
        assert!(chunks.iter().all(|c| c.len() % BYTES_PER_SAMPLE == 0));
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), pcm.len());
    }

    #[test]
    fn accounting_tracks_buffered_ms() {
        let mut accounting = AudioAccounting::default();
        accounting.record_chunk(BYTES_PER_SECOND / 2);
        assert_eq!(accounting.buffered_ms(), 500);
        accounting.clear();
        assert_eq!(accounting.buffered_ms(), 0);
    }
}
