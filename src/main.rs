use eframe::egui;
use anyhow::Result;
use std::time::Instant;


mod config;
mod coordinator;
mod output;
mod render;
mod selection;
mod session;
mod view;
mod wav;

use coordinator::Coordinator;
use session::{Session, SessionState, TransportAction};
use wav::WavError;


#[tokio::main]
async fn main() -> Result<()> {
	// Set RUST_LOG=debug for verbose output
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
		.format_timestamp_millis()
		.init();

	let config_path = config::default_config_path();
	let config = config::load_config(&config_path);

	if !config_path.exists() {
		if let Err(err) = config::save_config(&config, &config_path) {
			log::warn!("Could not write default config: {err:#}");
		}
	}

	let coordinator = Coordinator::start(config.playback.waveform_refresh())?;
	let mut app = AppRoot::new(Session::new(coordinator, &config));

	// An optional first argument names a file to open right away.
	if let Some(path) = std::env::args_os().nth(1) {
		app.open_path = path.to_string_lossy().into_owned();
		app.open();
	}

	eframe::run_native("wavcut", <_>::default(), Box::new(move |_cc| {
		Box::new(app)
	}));

	Ok(())
}



struct AppRoot {
	session: Session<Coordinator>,

	open_path: String,
	export_path: String,
	last_error: Option<String>,
}

impl AppRoot {
	fn new(session: Session<Coordinator>) -> Self {
		AppRoot {
			session,

			open_path: String::new(),
			export_path: String::new(),
			last_error: None,
		}
	}

	fn open(&mut self) {
		let result = self.session.open(self.open_path.trim());
		self.report(result);
	}

	fn export(&mut self) {
		let result = self.session.export(self.export_path.trim());
		self.report(result);
	}

	fn report(&mut self, result: Result<(), WavError>) {
		match result {
			Ok(()) => self.last_error = None,
			Err(err) => {
				log::error!("{err}");
				self.last_error = Some(err.to_string());
			}
		}
	}

	fn toolbar(&mut self, ui: &mut egui::Ui) {
		let state = self.session.state();
		let loaded = state != SessionState::Empty;

		ui.horizontal(|ui| {
			ui.add_enabled(!loaded, egui::TextEdit::singleline(&mut self.open_path).hint_text("file.wav"));
			if ui.add_enabled(!loaded, egui::Button::new("Open")).clicked() {
				self.open();
			}

			ui.separator();

			ui.add_enabled(loaded, egui::TextEdit::singleline(&mut self.export_path).hint_text("export.wav"));
			if ui.add_enabled(loaded, egui::Button::new("Export")).clicked() {
				self.export();
			}

			if ui.add_enabled(loaded, egui::Button::new("Close")).clicked() {
				self.session.close();
			}

			ui.separator();

			let (label, action) = match state {
				SessionState::Playing => ("Pause", TransportAction::Pause),
				_ => ("Play", TransportAction::Play),
			};

			if ui.add_enabled(loaded, egui::Button::new(label)).clicked() {
				self.session.transport(action);
			}

			if ui.add_enabled(loaded, egui::Button::new("Stop")).clicked() {
				self.session.transport(TransportAction::Stop);
			}

			let can_cut = state == SessionState::Loaded && self.session.selection().is_some();
			if ui.add_enabled(can_cut, egui::Button::new("Cut")).clicked() {
				self.session.cut();
			}
		});
	}

	fn info_section(&self, ui: &mut egui::Ui) {
		let info = self.session.info();

		egui::Grid::new("info").num_columns(8).spacing([12.0, 4.0]).show(ui, |ui| {
			ui.label("File Path");
			ui.strong(info.and_then(|info| info.path).map(|path| path.display().to_string()).unwrap_or_default());
			ui.end_row();

			ui.label("Channels");
			ui.strong(info.map(|info| info.channels.to_string()).unwrap_or_default());
			ui.label("Bit Depth");
			ui.strong(info.map(|info| info.bit_depth.to_string()).unwrap_or_default());
			ui.label("Sample Rate");
			ui.strong(info.map(|info| info.sample_rate.to_string()).unwrap_or_default());
			ui.label("Frames");
			ui.strong(info.map(|info| info.frames.to_string()).unwrap_or_default());
			ui.end_row();
		});
	}

	fn player_controls(&mut self, ui: &mut egui::Ui) {
		let loaded = self.session.state() != SessionState::Empty;

		ui.horizontal(|ui| {
			ui.label("Scale (samples/pixel)");

			let mut scale = self.session.scale();
			if ui.add_enabled(loaded, egui::Slider::new(&mut scale, 1..=self.session.max_scale())).changed() {
				self.session.set_scale(scale);
			}

			ui.separator();

			let mut volume = self.session.volume();
			if ui.add_enabled(loaded, egui::Slider::new(&mut volume, 0..=100).text("volume")).changed() {
				self.session.set_volume(volume);
			}

			if let Some(range) = self.session.selected_frames() {
				ui.separator();
				ui.label(format!("Selected frames {}..={} ({})", range.start, range.end, range.len()));
			}
		});
	}

	fn timeline(&mut self, ui: &mut egui::Ui) {
		let loaded = self.session.state() != SessionState::Empty;
		let duration = self.session.duration_ms();

		ui.horizontal(|ui| {
			if loaded && duration > 0 {
				let mut position = self.session.position_ms().min(duration);
				let slider = egui::Slider::new(&mut position, 0..=duration).show_value(false);

				if ui.add(slider).changed() {
					self.session.seek(position);
				}
			}

			ui.add_enabled(loaded, egui::Label::new(self.session.timecode()));
		});

		if let Some(error) = &self.last_error {
			ui.colored_label(egui::Color32::RED, error);
		}
	}
}

impl eframe::App for AppRoot {
	fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
		for tick in self.session.due_ticks(Instant::now()) {
			self.session.tick(tick);
		}

		egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
			self.toolbar(ui);
		});

		egui::TopBottomPanel::bottom("timeline").show(ctx, |ui| {
			self.timeline(ui);
		});

		egui::CentralPanel::default().show(ctx, |ui| {
			self.info_section(ui);
			ui.separator();
			self.player_controls(ui);

			ui.add(view::Waveform { session: &mut self.session });
		});

		ctx.request_repaint();
	}
}
