//! WAV container header logic.
//!
//! A session starts with a placeholder header whose size fields are zero;
//! once the PCM byte count is final the header is rewritten in place. The
//! layout is the fixed 44-byte mono 16-bit PCM header, nothing more.

use std::io::{self, Seek, SeekFrom, Write};

/// Fixed PCM WAV header length.
pub const HEADER_LEN: usize = 44;

/// The RIFF chunk size field counts everything after itself: 36 bytes of
/// header remainder plus the data payload.
pub const RIFF_OVERHEAD: u32 = 36;

const NUM_CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Builds the complete 44-byte header for the given payload size.
pub fn encode_header(sample_rate: u32, data_size: u32) -> [u8; HEADER_LEN] {
    let byte_rate = sample_rate * (NUM_CHANNELS as u32) * (BITS_PER_SAMPLE as u32) / 8;
    let block_align = NUM_CHANNELS * BITS_PER_SAMPLE / 8;

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(data_size + RIFF_OVERHEAD).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&NUM_CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

/// Writes the placeholder header at the current position.
pub fn write_placeholder_header<W: Write + ?Sized>(
    file: &mut W,
    sample_rate: u32,
) -> io::Result<()> {
    file.write_all(&encode_header(sample_rate, 0))
}

/// Rewrites the header in place with the final data size.
///
/// `None` means the file is already closed and the call is a no-op.
/// Patching twice with the same size leaves the bytes unchanged.
pub fn patch_header<F: Write + Seek + ?Sized>(
    file: Option<&mut F>,
    sample_rate: u32,
    data_size: u32,
) -> io::Result<()> {
    let Some(file) = file else {
        return Ok(());
    };
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&encode_header(sample_rate, data_size))
}
