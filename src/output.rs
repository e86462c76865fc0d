use cpal::traits::{DeviceTrait, StreamTrait};

use std::sync::Arc;
use tokio::sync::Mutex;


pub const OUTPUT_CHANNELS: usize = 2;


pub struct OutputStream {
	_stream: cpal::Stream,

	state: Arc<Mutex<OutputStreamState>>,
}


pub struct OutputStreamState {
	/// Interleaved stereo at the device rate.
	pub play_buffer: Vec<f32>,
	/// In frames.
	pub cursor: usize,

	pub playing: bool,
	pub volume: f32,

	/// Bumped every time playback runs off the end of the buffer.
	pub end_count: u64,
}

impl Default for OutputStreamState {
	fn default() -> Self {
		OutputStreamState {
			play_buffer: Vec::new(),
			cursor: 0,

			playing: false,
			volume: 1.0,

			end_count: 0,
		}
	}
}


impl OutputStreamState {
	fn frames(&self) -> usize {
		self.play_buffer.len() / OUTPUT_CHANNELS
	}

	fn reset(&mut self, buffer: Vec<f32>) {
		self.play_buffer = buffer;
		self.cursor = 0;
		self.playing = false;
	}

	// Starting again after the end rewinds.
	fn play(&mut self) {
		if self.cursor >= self.frames() {
			self.cursor = 0;
		}

		self.playing = true;
	}

	fn seek(&mut self, frame: usize) {
		self.cursor = frame.min(self.frames());
	}
}


impl OutputStream {
	pub fn start(device: &cpal::Device, config: cpal::StreamConfig) -> anyhow::Result<OutputStream> {
		let state = Arc::new(Mutex::new(OutputStreamState::default()));
		let callback = Callback { state: state.clone() };

		let stream = device.build_output_stream(
			&config,

			move |data: &mut [f32], callback_info: &cpal::OutputCallbackInfo| {
				callback.process(data, callback_info);
			},

			move |err| {
				log::error!("OutputStream error: {err}");
			}
		)?;

		stream.play()?;

		Ok(OutputStream {
			_stream: stream,
			state,
		})
	}

	pub async fn set_play_buffer(&self, buffer: Vec<f32>) {
		self.state.lock().await.reset(buffer);
	}

	pub async fn clear_play_buffer(&self) {
		self.state.lock().await.reset(Vec::new());
	}

	pub async fn play(&self) {
		self.state.lock().await.play();
	}

	pub async fn pause(&self) {
		self.state.lock().await.playing = false;
	}

	pub async fn stop(&self) {
		let mut state = self.state.lock().await;
		state.playing = false;
		state.cursor = 0;
	}

	pub async fn seek(&self, frame: usize) {
		self.state.lock().await.seek(frame);
	}

	pub async fn set_volume(&self, volume: f32) {
		self.state.lock().await.volume = volume.clamp(0.0, 1.0);
	}

	/// Play cursor in frames, and how often the end was reached so far.
	pub async fn progress(&self) -> (usize, u64) {
		let state = self.state.lock().await;
		(state.cursor, state.end_count)
	}
}



struct Callback {
	state: Arc<Mutex<OutputStreamState>>,
}

impl Callback {
	fn process(&self, data: &mut [f32], _: &cpal::OutputCallbackInfo) {
		mix(&mut self.state.blocking_lock(), data);
	}
}


/// Fills `data` from the cursor, scaled by volume. Whatever the buffer cannot
/// cover stays silent, and running out stops playback.
fn mix(state: &mut OutputStreamState, data: &mut [f32]) {
	let OutputStreamState {play_buffer, cursor, playing, volume, end_count} = state;

	data.fill(0.0);

	if !*playing {
		return;
	}

	let start = (*cursor * OUTPUT_CHANNELS).min(play_buffer.len());
	let count = (play_buffer.len() - start).min(data.len());

	for (out, sample) in data[..count].iter_mut().zip(&play_buffer[start..start + count]) {
		*out = sample * *volume;
	}

	*cursor += count / OUTPUT_CHANNELS;

	if count < data.len() {
		*playing = false;
		*end_count += 1;
	}
}
