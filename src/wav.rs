use std::path::{Path, PathBuf};

use thiserror::Error;


/// Size of the canonical RIFF/WAVE header. Sample data starts right after it.
pub const HEADER_LEN: usize = 44;

const RIFF_SIZE_OFFSET: usize = 4;
const CHANNELS_OFFSET: usize = 22;
const SAMPLE_RATE_OFFSET: usize = 24;
const BIT_DEPTH_OFFSET: usize = 34;
const DATA_SIZE_OFFSET: usize = 40;



#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
	#[error("Unsupported file format: missing RIFF/WAVE header")]
	NotWav,

	#[error("Unsupported WAV file: {channels} channel(s) at {bit_depth} bits, only 8 or 16-bit PCM can be edited")]
	UnsupportedEncoding { channels: u16, bit_depth: u16 },

	#[error("Truncated WAV file: expected {expected} bytes, found {actual}")]
	Truncated { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum WavError {
	#[error("Unable to open file {path:?}: {source}")]
	Io { path: PathBuf, source: std::io::Error },

	#[error(transparent)]
	Format(#[from] FormatError),

	#[error("Cannot write file {path:?}: {source}")]
	Export { path: PathBuf, source: std::io::Error },
}



/// An uncompressed PCM WAV file held entirely in memory.
///
/// The header is decoded once at construction and only the RIFF and data size
/// fields are ever rewritten afterwards, by [`WavContainer::cut`]. The buffer always holds
/// exactly `HEADER_LEN + audio_data_size` bytes.
#[derive(Debug, Clone)]
pub struct WavContainer {
	raw_bytes: Vec<u8>,
	path: Option<PathBuf>,

	channel_count: u16,
	bit_depth: u16,
	sample_rate: u32,

	audio_data_size: usize,
	frame_count: usize,
}


impl WavContainer {
	pub fn load(path: impl AsRef<Path>) -> Result<WavContainer, WavError> {
		let path = path.as_ref();
		let raw_bytes = std::fs::read(path)
			.map_err(|source| WavError::Io { path: path.to_owned(), source })?;

		let mut container = WavContainer::from_bytes(raw_bytes)?;
		container.path = Some(path.to_owned());

		log::info!(
			"Loaded {:?}: {} channel(s), {} bits, {} Hz, {} frames",
			path, container.channel_count, container.bit_depth, container.sample_rate, container.frame_count
		);

		Ok(container)
	}

	/// Parses a complete file image. Only the fixed offsets of the canonical
	/// 44-byte header are read; files with extra chunks before `data` misparse.
	pub fn from_bytes(mut raw_bytes: Vec<u8>) -> Result<WavContainer, FormatError> {
		if raw_bytes.len() < 12 || &raw_bytes[0..4] != b"RIFF" || &raw_bytes[8..12] != b"WAVE" {
			return Err(FormatError::NotWav);
		}

		if raw_bytes.len() < HEADER_LEN {
			return Err(FormatError::Truncated { expected: HEADER_LEN, actual: raw_bytes.len() });
		}

		let channel_count = read_u16(&raw_bytes, CHANNELS_OFFSET);
		let bit_depth = read_u16(&raw_bytes, BIT_DEPTH_OFFSET);
		let sample_rate = read_u32(&raw_bytes, SAMPLE_RATE_OFFSET);
		let audio_data_size = read_u32(&raw_bytes, DATA_SIZE_OFFSET) as usize;

		if channel_count < 1 || !matches!(bit_depth, 8 | 16) {
			return Err(FormatError::UnsupportedEncoding { channels: channel_count, bit_depth });
		}

		let expected = HEADER_LEN + audio_data_size;
		if raw_bytes.len() < expected {
			return Err(FormatError::Truncated { expected, actual: raw_bytes.len() });
		}

		if raw_bytes.len() > expected {
			log::warn!("Dropping {} bytes following the data chunk", raw_bytes.len() - expected);
			raw_bytes.truncate(expected);
			sync_riff_size(&mut raw_bytes);
		}

		let mut container = WavContainer {
			raw_bytes,
			path: None,

			channel_count,
			bit_depth,
			sample_rate,

			audio_data_size,
			frame_count: 0,
		};

		container.update_frame_count();
		Ok(container)
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	pub fn channel_count(&self) -> u16 {
		self.channel_count
	}

	pub fn bit_depth(&self) -> u16 {
		self.bit_depth
	}

	pub fn sample_rate(&self) -> u32 {
		self.sample_rate
	}

	pub fn bytes_per_sample(&self) -> usize {
		usize::from(self.bit_depth / 8)
	}

	pub fn bytes_per_frame(&self) -> usize {
		self.bytes_per_sample() * usize::from(self.channel_count)
	}

	pub fn audio_data_size(&self) -> usize {
		self.audio_data_size
	}

	pub fn frame_count(&self) -> usize {
		self.frame_count
	}

	pub fn duration_ms(&self) -> u64 {
		if self.sample_rate == 0 {
			return 0;
		}

		self.frame_count as u64 * 1000 / u64::from(self.sample_rate)
	}

	/// Signed amplitude of one sample. 8-bit data is stored unsigned and is
	/// re-centered around 127.
	///
	/// `frame` must be below [`frame_count`](Self::frame_count).
	pub fn sample(&self, frame: usize, channel: usize) -> i32 {
		let offset = HEADER_LEN + frame * self.bytes_per_frame() + channel * self.bytes_per_sample();

		match self.bit_depth {
			8 => i32::from(self.raw_bytes[offset]) - 127,
			_ => i32::from(i16::from_le_bytes([self.raw_bytes[offset], self.raw_bytes[offset + 1]])),
		}
	}

	/// Smallest and largest sample of `length` frames starting at `start`.
	pub fn min_max_in_range(&self, start: usize, length: usize, channel: usize) -> (i32, i32) {
		if length <= 1 {
			let sample = self.sample(start, channel);
			return (sample, sample);
		}

		(start..start + length)
			.map(|frame| self.sample(frame, channel))
			.fold((i32::MAX, i32::MIN), |(min, max), sample| (min.min(sample), max.max(sample)))
	}

	/// Removes frames `min(start, end)..=max(start, end)` and rewrites the size
	/// fields of the header.
	///
	/// Both endpoints are removed, so `|end - start| + 1` frames disappear.
	/// Callers clamp the range to `0..frame_count` beforehand.
	pub fn cut(&mut self, start_frame: usize, end_frame: usize) {
		let bytes_per_frame = self.bytes_per_frame();
		let first = start_frame.min(end_frame);
		let removed_frames = start_frame.abs_diff(end_frame) + 1;

		let begin = HEADER_LEN + first * bytes_per_frame;
		let removed_bytes = removed_frames * bytes_per_frame;

		debug_assert!(begin + removed_bytes <= self.raw_bytes.len(), "cut past the end of the data chunk");

		self.raw_bytes.drain(begin..begin + removed_bytes);
		sync_riff_size(&mut self.raw_bytes);

		self.set_audio_data_size(self.audio_data_size - removed_bytes);

		log::info!("Cut frames {}..={} ({} frames left)", first, first + removed_frames - 1, self.frame_count);
	}

	/// The current file image, header included.
	pub fn export_bytes(&self) -> &[u8] {
		&self.raw_bytes
	}

	pub fn export_to(&self, path: impl AsRef<Path>) -> Result<(), WavError> {
		let path = path.as_ref();

		std::fs::write(path, self.export_bytes())
			.map_err(|source| WavError::Export { path: path.to_owned(), source })?;

		log::info!("Exported {} bytes to {:?}", self.raw_bytes.len(), path);
		Ok(())
	}

	/// Interleaved samples normalized to `-1.0..=1.0`.
	pub fn to_f32_frames(&self) -> Vec<f32> {
		let channels = usize::from(self.channel_count);
		let full_scale = match self.bit_depth {
			8 => 128.0,
			_ => 32768.0,
		};

		(0..self.frame_count)
			.flat_map(|frame| (0..channels).map(move |channel| (frame, channel)))
			.map(|(frame, channel)| self.sample(frame, channel) as f32 / full_scale)
			.collect()
	}

	fn set_audio_data_size(&mut self, size: usize) {
		self.audio_data_size = size;
		write_u32(&mut self.raw_bytes, DATA_SIZE_OFFSET, size as u32);
		self.update_frame_count();
	}

	fn update_frame_count(&mut self) {
		self.frame_count = self.audio_data_size * 8 / (usize::from(self.bit_depth) * usize::from(self.channel_count));
	}
}



fn read_u16(bytes: &[u8], offset: usize) -> u16 {
	u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
	u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
	bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

// The RIFF size covers everything after the first 8 bytes.
fn sync_riff_size(bytes: &mut [u8]) {
	let riff_size = (bytes.len() - 8) as u32;
	write_u32(bytes, RIFF_SIZE_OFFSET, riff_size);
}



/// Builds a canonical 44-byte header followed by `payload`.
#[cfg(test)]
pub(crate) fn canonical_wav(channels: u16, bit_depth: u16, sample_rate: u32, payload: &[u8]) -> Vec<u8> {
	let block_align = channels * (bit_depth / 8);

	let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
	bytes.extend_from_slice(b"RIFF");
	bytes.extend_from_slice(&(36 + payload.len() as u32).to_le_bytes());
	bytes.extend_from_slice(b"WAVE");
	bytes.extend_from_slice(b"fmt ");
	bytes.extend_from_slice(&16u32.to_le_bytes());
	bytes.extend_from_slice(&1u16.to_le_bytes());
	bytes.extend_from_slice(&channels.to_le_bytes());
	bytes.extend_from_slice(&sample_rate.to_le_bytes());
	bytes.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
	bytes.extend_from_slice(&block_align.to_le_bytes());
	bytes.extend_from_slice(&bit_depth.to_le_bytes());
	bytes.extend_from_slice(b"data");
	bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
	bytes.extend_from_slice(payload);
	bytes
}

#[cfg(test)]
pub(crate) fn pcm16(samples: &[i16]) -> Vec<u8> {
	samples.iter().flat_map(|sample| sample.to_le_bytes()).collect()
}
