use std::path::Path;
use std::time::{Duration, Instant};

use egui::{vec2, Pos2, Rect};

use crate::config::{Config, DisplayConfig, PlaybackConfig};
use crate::render::{ChannelGeometry, Layout, ViewState, WaveformRenderer};
use crate::selection::{FrameRange, SelectionMapper};
use crate::wav::{WavContainer, WavError};


/// The audio output the editor drives. It is handed a file path on open and
/// reports where it currently is; it never sees the edited buffer.
pub trait Playback {
	fn load(&mut self, path: &Path);
	fn unload(&mut self);

	fn play(&mut self);
	fn pause(&mut self);
	fn stop(&mut self);
	fn seek(&mut self, position_ms: u64);
	fn set_volume(&mut self, volume: f32);

	fn position_ms(&self) -> u64;
	fn duration_ms(&self) -> u64;

	/// True once after playback ran off the end of the file.
	fn take_finished(&mut self) -> bool;
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
	Empty,
	Loaded,
	Playing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportAction {
	Play,
	Pause,
	Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
	Waveform,
	Timecode,
}

#[derive(Clone, Copy, Debug)]
pub struct FileInfo<'a> {
	pub path: Option<&'a Path>,
	pub channels: u16,
	pub bit_depth: u16,
	pub sample_rate: u32,
	pub frames: usize,
}



pub struct Session<P> {
	playback: P,

	display: DisplayConfig,
	refresh: PlaybackConfig,

	state: State,
	plot_rect: Rect,
	scale: usize,
	volume: u8,
}

enum State {
	Empty,
	Loaded(Box<OpenFile>),
	Playing(Box<OpenFile>),
}

// Everything that lives exactly as long as a file is open.
struct OpenFile {
	container: WavContainer,
	layout: Layout,
	selection: SelectionMapper,
	position_sample: usize,
	schedule: RefreshSchedule,
	timecode: String,
}

struct RefreshSchedule {
	waveform_every: Duration,
	timecode_every: Duration,
	next_waveform: Instant,
	next_timecode: Instant,
}



impl<P: Playback> Session<P> {
	pub fn new(playback: P, config: &Config) -> Session<P> {
		Session {
			playback,

			display: config.display.clone(),
			refresh: config.playback.clone(),

			state: State::Empty,
			plot_rect: Rect::from_min_size(Pos2::ZERO, vec2(0.0, 0.0)),
			scale: config.display.default_scale.max(1),
			volume: config.playback.volume,
		}
	}

	pub fn state(&self) -> SessionState {
		match self.state {
			State::Empty => SessionState::Empty,
			State::Loaded(_) => SessionState::Loaded,
			State::Playing(_) => SessionState::Playing,
		}
	}

	pub fn playback(&self) -> &P {
		&self.playback
	}

	/// Loads `path`, replacing the current file only if loading succeeds.
	pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), WavError> {
		let path = path.as_ref();
		let container = WavContainer::load(path)?;

		self.close();

		self.playback.load(path);
		self.playback.set_volume(f32::from(self.volume) / 100.0);

		let mut file = OpenFile {
			layout: Layout::new(self.plot_rect, usize::from(container.channel_count()), self.display.padding),
			container,
			selection: SelectionMapper::default(),
			position_sample: 0,
			schedule: RefreshSchedule::new(&self.refresh, Instant::now()),
			timecode: format_timecode(0),
		};
		file.selection.set_bounds(file.layout.drawable());

		self.state = State::Loaded(Box::new(file));
		Ok(())
	}

	/// Drops the open file together with its selection and refresh schedule.
	pub fn close(&mut self) {
		if let State::Empty = self.state {
			return;
		}

		self.playback.stop();
		self.playback.unload();
		self.state = State::Empty;

		log::info!("File closed");
	}

	pub fn export(&self, path: impl AsRef<Path>) -> Result<(), WavError> {
		match self.file() {
			Some(file) => file.container.export_to(path),
			None => {
				log::warn!("Nothing to export");
				Ok(())
			}
		}
	}

	pub fn transport(&mut self, action: TransportAction) {
		let state = std::mem::replace(&mut self.state, State::Empty);

		self.state = match (action, state) {
			(_, State::Empty) => State::Empty,

			(TransportAction::Play, State::Loaded(file) | State::Playing(file)) => {
				self.playback.play();
				State::Playing(file)
			}

			(TransportAction::Pause, State::Loaded(file) | State::Playing(file)) => {
				self.playback.pause();
				State::Loaded(file)
			}

			(TransportAction::Stop, State::Loaded(mut file) | State::Playing(mut file)) => {
				self.playback.stop();
				file.position_sample = 0;
				file.timecode = format_timecode(0);
				State::Loaded(file)
			}
		};

		log::debug!("{:?} -> {:?}", action, self.state());
	}

	pub fn seek(&mut self, position_ms: u64) {
		if self.file().is_none() {
			return;
		}

		self.playback.seek(position_ms);
		self.refresh_position(position_ms);
	}

	pub fn volume(&self) -> u8 {
		self.volume
	}

	pub fn set_volume(&mut self, volume: u8) {
		self.volume = volume.min(100);
		self.playback.set_volume(f32::from(self.volume) / 100.0);
	}

	pub fn scale(&self) -> usize {
		self.scale
	}

	pub fn max_scale(&self) -> usize {
		self.display.max_scale
	}

	pub fn set_scale(&mut self, scale: usize) {
		self.scale = scale.clamp(1, self.display.max_scale.max(1));
	}

	pub fn view(&self) -> Option<ViewState> {
		self.file().map(|file| ViewState {
			position_sample: file.position_sample,
			scale: self.scale,
		})
	}

	pub fn position_ms(&self) -> u64 {
		self.playback.position_ms()
	}

	pub fn duration_ms(&self) -> u64 {
		self.playback.duration_ms()
	}

	pub fn timecode(&self) -> &str {
		self.file().map_or("", |file| file.timecode.as_str())
	}

	pub fn info(&self) -> Option<FileInfo<'_>> {
		self.file().map(|file| FileInfo {
			path: file.container.path(),
			channels: file.container.channel_count(),
			bit_depth: file.container.bit_depth(),
			sample_rate: file.container.sample_rate(),
			frames: file.container.frame_count(),
		})
	}

	/// Ticks whose interval elapsed by `now`. Nothing is due without an open file.
	pub fn due_ticks(&mut self, now: Instant) -> Vec<Tick> {
		match self.file_mut() {
			Some(file) => file.schedule.due(now),
			None => Vec::new(),
		}
	}

	pub fn tick(&mut self, tick: Tick) {
		if self.file().is_none() {
			return;
		}

		match tick {
			Tick::Waveform => {
				let position_ms = self.playback.position_ms();
				self.refresh_position(position_ms);

				if self.playback.take_finished() {
					self.state = match std::mem::replace(&mut self.state, State::Empty) {
						State::Playing(file) => State::Loaded(file),
						other => other,
					};
					log::debug!("Playback reached the end");
				}
			}

			Tick::Timecode => {
				let timecode = format_timecode(self.playback.position_ms());
				if let Some(file) = self.file_mut() {
					file.timecode = timecode;
				}
			}
		}
	}

	/// Lays the channel bands out inside `rect`, the area the waveform widget occupies.
	pub fn set_plot_rect(&mut self, rect: Rect) {
		self.plot_rect = rect;

		let padding = self.display.padding;
		if let Some(file) = self.file_mut() {
			file.layout = Layout::new(rect, usize::from(file.container.channel_count()), padding);
			file.selection.set_bounds(file.layout.drawable());
		}
	}

	pub fn render(&self) -> Vec<ChannelGeometry> {
		let Some(file) = self.file() else {
			return Vec::new();
		};

		WaveformRenderer {
			source: &file.container,
			view: ViewState { position_sample: file.position_sample, scale: self.scale },
			layout: &file.layout,
		}.render()
	}

	/// Starts a selection. Refused while playing or without a file.
	pub fn begin_selection(&mut self, pointer: Pos2) -> bool {
		match &mut self.state {
			State::Loaded(file) => {
				file.selection.begin(pointer);
				true
			}
			_ => false,
		}
	}

	pub fn update_selection(&mut self, pointer: Pos2) -> bool {
		match &mut self.state {
			State::Loaded(file) if file.selection.is_active() => {
				file.selection.update(pointer);
				true
			}
			_ => false,
		}
	}

	pub fn selection(&self) -> Option<Rect> {
		self.file().and_then(|file| file.selection.rect())
	}

	/// Frames the current selection would remove.
	pub fn selected_frames(&self) -> Option<FrameRange> {
		let view = self.view()?;
		self.file()
			.and_then(|file| file.selection.frame_range(view, file.container.frame_count()))
	}

	/// Removes the selected frames from the buffer.
	pub fn cut(&mut self) -> Option<FrameRange> {
		let view = self.view()?;
		let file = self.file_mut()?;

		file.selection.commit(&mut file.container, view)
	}

	fn refresh_position(&mut self, position_ms: u64) {
		if let Some(file) = self.file_mut() {
			let sample_rate = u64::from(file.container.sample_rate());
			file.position_sample = (position_ms * sample_rate / 1000) as usize;
		}
	}

	fn file(&self) -> Option<&OpenFile> {
		match &self.state {
			State::Loaded(file) | State::Playing(file) => Some(&**file),
			State::Empty => None,
		}
	}

	fn file_mut(&mut self) -> Option<&mut OpenFile> {
		match &mut self.state {
			State::Loaded(file) | State::Playing(file) => Some(&mut **file),
			State::Empty => None,
		}
	}
}



impl RefreshSchedule {
	fn new(config: &PlaybackConfig, now: Instant) -> Self {
		let waveform_every = config.waveform_refresh();
		let timecode_every = config.timecode_refresh();

		RefreshSchedule {
			waveform_every,
			timecode_every,
			next_waveform: now + waveform_every,
			next_timecode: now + timecode_every,
		}
	}

	// Missed intervals collapse into a single tick.
	fn due(&mut self, now: Instant) -> Vec<Tick> {
		let mut ticks = Vec::new();

		if now >= self.next_waveform {
			ticks.push(Tick::Waveform);
			self.next_waveform = now + self.waveform_every;
		}

		if now >= self.next_timecode {
			ticks.push(Tick::Timecode);
			self.next_timecode = now + self.timecode_every;
		}

		ticks
	}
}


/// `mm:ss`, minutes keep counting past the hour.
pub fn format_timecode(position_ms: u64) -> String {
	let seconds = position_ms / 1000;
	format!("{:02}:{:02}", seconds / 60, seconds % 60)
}



#[cfg(test)]
mod tests {
	use super::*;
	use crate::wav::{canonical_wav, pcm16};
	use egui::pos2;
	use std::path::PathBuf;

	#[derive(Default)]
	struct FakePlayback {
		calls: Vec<String>,
		loaded: Option<PathBuf>,
		position_ms: u64,
		volume: f32,
		finished: bool,
	}

	impl Playback for FakePlayback {
		fn load(&mut self, path: &Path) {
			self.calls.push("load".to_owned());
			self.loaded = Some(path.to_owned());
		}

		fn unload(&mut self) {
			self.calls.push("unload".to_owned());
			self.loaded = None;
		}

		fn play(&mut self) { self.calls.push("play".to_owned()); }
		fn pause(&mut self) { self.calls.push("pause".to_owned()); }

		fn stop(&mut self) {
			self.calls.push("stop".to_owned());
			self.position_ms = 0;
		}

		fn seek(&mut self, position_ms: u64) {
			self.calls.push(format!("seek {position_ms}"));
			self.position_ms = position_ms;
		}

		fn set_volume(&mut self, volume: f32) { self.volume = volume; }

		fn position_ms(&self) -> u64 { self.position_ms }
		fn duration_ms(&self) -> u64 { 1000 }

		fn take_finished(&mut self) -> bool {
			std::mem::take(&mut self.finished)
		}
	}

	struct Fixture {
		_dir: tempfile::TempDir,
		path: PathBuf,
		session: Session<FakePlayback>,
	}

	// One second of 8 kHz mono audio, opened in a session with a 120x100 plot.
	fn fixture() -> Fixture {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tone.wav");
		let samples: Vec<i16> = (0..8000).map(|i| (i % 100) as i16).collect();
		std::fs::write(&path, canonical_wav(1, 16, 8000, &pcm16(&samples))).unwrap();

		let mut session = Session::new(FakePlayback::default(), &Config::default());
		session.set_plot_rect(Rect::from_min_size(Pos2::ZERO, vec2(120.0, 100.0)));
		session.open(&path).unwrap();

		Fixture { _dir: dir, path, session }
	}

	#[test]
	fn test_new_session_is_empty() {
		let session = Session::new(FakePlayback::default(), &Config::default());

		assert_eq!(session.state(), SessionState::Empty);
		assert!(session.info().is_none());
		assert!(session.render().is_empty());
	}

	#[test]
	fn test_open_loads_file_and_playback() {
		let Fixture { path, session, .. } = fixture();

		assert_eq!(session.state(), SessionState::Loaded);
		assert_eq!(session.playback().loaded.as_deref(), Some(path.as_path()));
		assert_eq!(session.playback().volume, 0.5);

		let info = session.info().unwrap();
		assert_eq!(info.path, Some(path.as_path()));
		assert_eq!((info.channels, info.bit_depth, info.sample_rate, info.frames), (1, 16, 8000, 8000));
		assert_eq!(session.timecode(), "00:00");
	}

	#[test]
	fn test_failed_open_keeps_current_state() {
		let Fixture { _dir, mut session, path } = fixture();
		let bogus = _dir.path().join("bogus.wav");
		std::fs::write(&bogus, b"RIFF\0\0\0\0WAVE").unwrap();

		assert!(session.open(&bogus).is_err());
		assert_eq!(session.state(), SessionState::Loaded);
		assert_eq!(session.info().unwrap().path, Some(path.as_path()));
		assert_eq!(session.playback().calls, vec!["load"]);

		let mut empty = Session::new(FakePlayback::default(), &Config::default());
		assert!(empty.open(_dir.path().join("missing.wav")).is_err());
		assert_eq!(empty.state(), SessionState::Empty);
		assert!(empty.playback().calls.is_empty());
	}

	#[test]
	fn test_transport_actions_drive_state() {
		let Fixture { mut session, .. } = fixture();

		session.transport(TransportAction::Play);
		assert_eq!(session.state(), SessionState::Playing);

		session.transport(TransportAction::Pause);
		assert_eq!(session.state(), SessionState::Loaded);

		session.transport(TransportAction::Play);
		session.seek(500);
		assert_eq!(session.view().unwrap().position_sample, 4000);

		session.transport(TransportAction::Stop);
		assert_eq!(session.state(), SessionState::Loaded);
		assert_eq!(session.view().unwrap().position_sample, 0);
		assert_eq!(session.playback().calls, vec!["load", "play", "pause", "play", "seek 500", "stop"]);
	}

	#[test]
	fn test_transport_without_file_is_ignored() {
		let mut session = Session::new(FakePlayback::default(), &Config::default());
		session.transport(TransportAction::Play);

		assert_eq!(session.state(), SessionState::Empty);
		assert!(session.playback().calls.is_empty());
	}

	#[test]
	fn test_waveform_tick_follows_playback() {
		let Fixture { mut session, .. } = fixture();
		session.transport(TransportAction::Play);

		session.playback.position_ms = 250;
		session.tick(Tick::Waveform);
		assert_eq!(session.view().unwrap().position_sample, 2000);
		assert_eq!(session.timecode(), "00:00");

		session.playback.position_ms = 61_000;
		session.tick(Tick::Timecode);
		assert_eq!(session.timecode(), "01:01");
	}

	#[test]
	fn test_finished_playback_returns_to_loaded() {
		let Fixture { mut session, .. } = fixture();
		session.transport(TransportAction::Play);

		session.playback.finished = true;
		session.tick(Tick::Waveform);

		assert_eq!(session.state(), SessionState::Loaded);
	}

	#[test]
	fn test_selection_is_refused_while_playing() {
		let Fixture { mut session, .. } = fixture();
		session.transport(TransportAction::Play);

		assert!(!session.begin_selection(pos2(30.0, 40.0)));
		assert!(session.selection().is_none());

		session.transport(TransportAction::Pause);
		assert!(session.begin_selection(pos2(30.0, 40.0)));
		assert!(session.update_selection(pos2(50.0, 40.0)));

		session.transport(TransportAction::Play);
		assert!(!session.update_selection(pos2(90.0, 40.0)));
		assert_eq!(session.selection().unwrap().width(), 20.0);
	}

	#[test]
	fn test_cut_uses_current_view() {
		let Fixture { mut session, .. } = fixture();

		session.begin_selection(pos2(30.0, 40.0));
		session.update_selection(pos2(50.0, 40.0));
		session.set_scale(10);
		session.seek(100);

		assert_eq!(session.selected_frames(), Some(FrameRange { start: 1000, end: 1200 }));
		assert_eq!(session.cut(), Some(FrameRange { start: 1000, end: 1200 }));
		assert_eq!(session.info().unwrap().frames, 8000 - 201);
		assert!(session.selection().is_none());
		assert_eq!(session.cut(), None);
	}

	#[test]
	fn test_render_uses_current_layout() {
		let Fixture { mut session, .. } = fixture();

		let geometry = session.render();
		assert_eq!(geometry.len(), 1);
		assert_eq!(geometry[0].primitives.len(), 100);

		session.set_plot_rect(Rect::from_min_size(Pos2::ZERO, vec2(70.0, 100.0)));
		assert_eq!(session.render()[0].primitives.len(), 50);
	}

	#[test]
	fn test_close_tears_everything_down() {
		let Fixture { mut session, .. } = fixture();
		session.transport(TransportAction::Play);
		session.close();

		assert_eq!(session.state(), SessionState::Empty);
		assert!(session.playback().loaded.is_none());
		assert!(session.due_ticks(Instant::now() + Duration::from_secs(5)).is_empty());

		session.tick(Tick::Waveform);
		assert!(session.view().is_none());
		assert_eq!(session.timecode(), "");
		assert!(!session.begin_selection(pos2(30.0, 40.0)));
		assert_eq!(session.cut(), None);
	}

	#[test]
	fn test_refresh_schedule_emits_due_ticks() {
		let start = Instant::now();
		let mut schedule = RefreshSchedule::new(&PlaybackConfig::default(), start);

		assert!(schedule.due(start).is_empty());
		assert_eq!(schedule.due(start + Duration::from_millis(20)), vec![Tick::Waveform]);
		assert_eq!(schedule.due(start + Duration::from_millis(1000)), vec![Tick::Waveform, Tick::Timecode]);
		assert!(schedule.due(start + Duration::from_millis(1001)).is_empty());
	}

	#[test]
	fn test_scale_and_volume_are_clamped() {
		let Fixture { mut session, .. } = fixture();

		session.set_scale(0);
		assert_eq!(session.scale(), 1);
		session.set_scale(10_000);
		assert_eq!(session.scale(), 500);

		session.set_volume(180);
		assert_eq!(session.volume(), 100);
		assert_eq!(session.playback().volume, 1.0);
	}

	#[test]
	fn test_export_writes_edited_buffer() {
		let Fixture { _dir, mut session, .. } = fixture();
		let target = _dir.path().join("edited.wav");

		session.begin_selection(pos2(10.0, 40.0));
		session.update_selection(pos2(20.0, 40.0));
		session.cut();
		session.export(&target).unwrap();

		let exported = WavContainer::load(&target).unwrap();
		assert_eq!(exported.frame_count(), 8000 - 11);
	}

	#[test]
	fn test_timecode_format() {
		assert_eq!(format_timecode(0), "00:00");
		assert_eq!(format_timecode(59_999), "00:59");
		assert_eq!(format_timecode(3_725_000), "62:05");
	}
}
