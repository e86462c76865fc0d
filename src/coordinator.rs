use tokio::sync::mpsc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task;
use tokio::runtime::Handle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cpal::traits::{HostTrait, DeviceTrait};

use crate::output::{self, OUTPUT_CHANNELS};
use crate::session::Playback;
use crate::wav::WavContainer;



/// Plays files on the default output device from a dedicated thread.
pub struct Coordinator {
	cmd_tx: mpsc::Sender<Command>,

	display_state: Arc<Mutex<DisplayState>>,
	seen_end_count: u64,
}

#[derive(Default)]
pub struct DisplayState {
	pub position_ms: u64,
	pub duration_ms: u64,
	pub end_count: u64,
}



impl Coordinator {
	pub fn start(poll_interval: Duration) -> anyhow::Result<Coordinator> {
		let (cmd_tx, cmd_rx) = mpsc::channel(16);
		let display_state = Arc::new(Mutex::new(DisplayState::default()));
		let async_handle = Handle::current();

		std::thread::Builder::new()
			.name("playback".to_owned())
			.spawn({
				let display_state = display_state.clone();

				move || {
					if let Err(err) = start_inner(cmd_rx, display_state, async_handle, poll_interval) {
						log::error!("Playback unavailable: {err:#}");
					}
				}
			})?;

		Ok(Coordinator {
			cmd_tx,
			display_state,
			seen_end_count: 0,
		})
	}

	pub fn display_state(&self) -> MutexGuard<'_, DisplayState> {
		task::block_in_place(|| self.display_state.blocking_lock())
	}

	fn send(&self, cmd: Command) {
		if let Err(err) = self.cmd_tx.try_send(cmd) {
			log::warn!("Dropped playback command: {err}");
		}
	}
}

impl Playback for Coordinator {
	fn load(&mut self, path: &Path) {
		let end_count = {
			let mut display_state = self.display_state();
			display_state.position_ms = 0;
			display_state.duration_ms = 0;
			display_state.end_count
		};

		self.seen_end_count = end_count;

		self.send(Command::Load(path.to_owned()));
	}

	fn unload(&mut self) {
		self.send(Command::Unload);
	}

	fn play(&mut self) {
		let end_count = self.display_state().end_count;
		self.seen_end_count = end_count;
		self.send(Command::Play);
	}

	fn pause(&mut self) {
		self.send(Command::Pause);
	}

	fn stop(&mut self) {
		self.display_state().position_ms = 0;
		self.send(Command::Stop);
	}

	fn seek(&mut self, position_ms: u64) {
		self.display_state().position_ms = position_ms;
		self.send(Command::Seek(position_ms));
	}

	fn set_volume(&mut self, volume: f32) {
		self.send(Command::SetVolume(volume));
	}

	fn position_ms(&self) -> u64 {
		self.display_state().position_ms
	}

	fn duration_ms(&self) -> u64 {
		self.display_state().duration_ms
	}

	fn take_finished(&mut self) -> bool {
		let end_count = self.display_state().end_count;
		ended_since(&mut self.seen_end_count, end_count)
	}
}



#[derive(Debug)]
enum Command {
	Load(PathBuf),
	Unload,

	Play,
	Pause,
	Stop,
	Seek(u64),

	SetVolume(f32),
}



fn start_inner(mut cmd_rx: mpsc::Receiver<Command>, display_state: Arc<Mutex<DisplayState>>,
	async_handle: tokio::runtime::Handle, poll_interval: Duration) -> anyhow::Result<()>
{
	let host = cpal::default_host();
	let output_device = host.default_output_device().ok_or_else(|| anyhow::Error::msg("No default output device"))?;

	log::info!("Output device config: {:?}", output_device.default_output_config());

	let output_config = cpal::StreamConfig {
		channels: OUTPUT_CHANNELS as u16,
		.. output_device.default_output_config()?.config()
	};

	let device_rate = output_config.sample_rate.0;
	let output_stream = output::OutputStream::start(&output_device, output_config)?;

	// Required because cpal::Stream is not Send and this infects OutputStream.
	async_handle.block_on(async move {
		use tokio::time::MissedTickBehavior;

		let mut interval = tokio::time::interval(poll_interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			tokio::select!{
				value = cmd_rx.recv() => match value {
					Some(cmd) => match cmd {
						Command::Load(path) => {
							let decoded = task::spawn_blocking(move || decode(&path, device_rate)).await?;

							match decoded {
								Ok(buffer) => {
									let frames = buffer.len() / OUTPUT_CHANNELS;
									output_stream.set_play_buffer(buffer).await;

									let mut display_state = display_state.lock().await;
									display_state.duration_ms = frames_to_ms(frames, device_rate);
									display_state.position_ms = 0;
								}

								Err(err) => {
									log::error!("Unable to prepare playback: {err:#}");
									output_stream.clear_play_buffer().await;
								}
							}
						}

						Command::Unload => {
							output_stream.clear_play_buffer().await;

							let mut display_state = display_state.lock().await;
							display_state.duration_ms = 0;
							display_state.position_ms = 0;
						}

						Command::Play => output_stream.play().await,
						Command::Pause => output_stream.pause().await,
						Command::Stop => output_stream.stop().await,

						Command::Seek(position_ms) => {
							let frame = (position_ms * u64::from(device_rate) / 1000) as usize;
							output_stream.seek(frame).await;
						}

						Command::SetVolume(volume) => {
							output_stream.set_volume(volume).await;
						}
					}

					None => break,
				},

				_ = interval.tick() => {
					let (cursor, end_count) = output_stream.progress().await;

					let mut display_state = display_state.lock().await;
					display_state.position_ms = frames_to_ms(cursor, device_rate);
					display_state.end_count = end_count;
				}
			}
		}

		Ok(())
	})
}


// Compares against the last end count seen and catches up with it.
fn ended_since(seen_end_count: &mut u64, end_count: u64) -> bool {
	let ended = end_count != *seen_end_count;
	*seen_end_count = end_count;
	ended
}


fn frames_to_ms(frames: usize, sample_rate: u32) -> u64 {
	frames as u64 * 1000 / u64::from(sample_rate.max(1))
}


/// Reads the file at `path` and turns it into interleaved stereo at `device_rate`.
fn decode(path: &Path, device_rate: u32) -> anyhow::Result<Vec<f32>> {
	let container = WavContainer::load(path)?;
	anyhow::ensure!(container.sample_rate() > 0, "{:?} has a sample rate of 0", path);

	let channels = usize::from(container.channel_count());
	let samples = container.to_f32_frames();

	// Mono is duplicated, anything past the second channel is dropped.
	let (left, right): (Vec<f32>, Vec<f32>) = samples.chunks_exact(channels)
		.map(|frame| (frame[0], frame[frame.len().min(2) - 1]))
		.unzip();

	let ratio = f64::from(device_rate) / f64::from(container.sample_rate());
	let waves = resample(vec![left, right], ratio)
		.with_context(|| format!("Failed to resample {:?}", path))?;

	Ok(interleave(&waves))
}


fn interleave(waves: &[Vec<f32>]) -> Vec<f32> {
	let frames = waves.iter().map(Vec::len).min().unwrap_or(0);

	(0..frames)
		.flat_map(|frame| waves.iter().map(move |wave| wave[frame]))
		.collect()
}


fn resample(waves_in: Vec<Vec<f32>>, sample_rate_ratio: f64) -> anyhow::Result<Vec<Vec<f32>>> {
	use rubato::{Resampler, SincFixedIn, InterpolationType, InterpolationParameters, WindowFunction};

	let num_frames = waves_in.first().map_or(0, Vec::len);
	if num_frames == 0 || (sample_rate_ratio - 1.0).abs() < f64::EPSILON {
		return Ok(waves_in);
	}

	let params = InterpolationParameters {
		sinc_len: 256,
		f_cutoff: 0.95,
		interpolation: InterpolationType::Linear,
		oversampling_factor: 256,
		window: WindowFunction::BlackmanHarris2,
	};

	let mut resampler = SincFixedIn::<f32>::new(
		sample_rate_ratio,
		2.0,
		params,
		num_frames,
		waves_in.len(),
	)?;

	Ok(resampler.process(&waves_in, None)?)
}



#[cfg(test)]
mod tests {
	use super::*;
	use crate::wav::{canonical_wav, pcm16};

	#[test]
	fn test_decode_duplicates_mono_at_native_rate() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("mono.wav");
		std::fs::write(&path, canonical_wav(1, 16, 48000, &pcm16(&[0, 16384, i16::MIN]))).unwrap();

		let buffer = decode(&path, 48000).unwrap();
		assert_eq!(buffer, vec![0.0, 0.0, 0.5, 0.5, -1.0, -1.0]);
	}

	#[test]
	fn test_decode_keeps_first_two_channels() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("quad.wav");
		std::fs::write(&path, canonical_wav(4, 16, 8000, &pcm16(&[16384, -16384, 1, 2, 0, 8192, 3, 4]))).unwrap();

		let buffer = decode(&path, 8000).unwrap();
		assert_eq!(buffer, vec![0.5, -0.5, 0.0, 0.25]);
	}

	#[test]
	fn test_decode_reports_bad_files() {
		let dir = tempfile::tempdir().unwrap();
		assert!(decode(&dir.path().join("missing.wav"), 48000).is_err());
	}

	#[test]
	fn test_interleave_truncates_to_shortest_wave() {
		assert_eq!(interleave(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0]]), vec![1.0, 4.0, 2.0, 5.0]);
	}

	#[test]
	fn test_end_is_reported_once() {
		let mut seen = 0;

		assert!(!ended_since(&mut seen, 0));
		assert!(ended_since(&mut seen, 1));
		assert!(!ended_since(&mut seen, 1));

		// Two ends between polls still read as one finished playback.
		assert!(ended_since(&mut seen, 3));
		assert_eq!(seen, 3);
		assert!(!ended_since(&mut seen, 3));
	}

	#[test]
	fn test_frames_to_ms() {
		assert_eq!(frames_to_ms(48000, 48000), 1000);
		assert_eq!(frames_to_ms(12, 0), 12000);
	}
}
