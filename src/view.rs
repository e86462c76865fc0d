use crate::render::Primitive;
use crate::session::{Playback, Session};


/// Paints the open file's waveform and turns drags into cut selections.
pub struct Waveform<'a, P> {
	pub session: &'a mut Session<P>,
}


impl<P: Playback> egui::Widget for Waveform<'_, P> {
	fn ui(mut self, ui: &mut egui::Ui) -> egui::Response {
		let (mut response, mut painter) = ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
		let rect = response.rect;

		painter.set_clip_rect(rect);

		let bg_color = egui::Color32::from_gray(200);
		let band_color = egui::Color32::WHITE;
		let outline_stroke = ui.visuals().window_stroke;
		let wave_stroke = egui::Stroke::new(1.5, egui::Color32::from_rgb(5, 31, 41));
		let cursor_stroke = egui::Stroke::new(1.0, egui::Color32::LIGHT_BLUE);
		let selection_color = egui::Color32::RED.linear_multiply(0.2);
		let selection_stroke = egui::Stroke::new(2.0, egui::Color32::BLACK);

		// Background
		painter.rect(rect, 0.0, bg_color, outline_stroke);

		self.session.set_plot_rect(rect);

		if self.session.view().is_none() {
			painter.text(
				rect.center(),
				egui::Align2::CENTER_CENTER,
				"Please load a file to see its waveform",
				egui::FontId::proportional(16.0),
				egui::Color32::BLACK,
			);

			return response;
		}

		// Handle interactions
		self.handle_input(&mut response);

		// Draw waveform
		for channel in self.session.render() {
			painter.rect(channel.band, 0.0, band_color, outline_stroke);

			for primitive in channel.primitives {
				match primitive {
					Primitive::Segment { from, to } => painter.line_segment([from, to], wave_stroke),
					Primitive::Bar { x, top, bottom } => painter.vline(x, top..=bottom, wave_stroke),
				}
			}
		}

		// Draw selection
		if let Some(selection) = self.session.selection() {
			painter.rect(selection, 0.0, selection_color, selection_stroke);
		}

		// Draw mouse cursor
		if let Some(pos) = response.hover_pos() {
			painter.vline(pos.x, rect.y_range(), cursor_stroke);
		}

		response
	}
}

impl<P: Playback> Waveform<'_, P> {
	fn handle_input(&mut self, response: &mut egui::Response) {
		if response.drag_started() {
			if let Some(pos) = response.interact_pointer_pos() {
				if self.session.begin_selection(pos) {
					response.mark_changed();
				}
			}
		}

		if response.dragged() {
			if let Some(pos) = response.interact_pointer_pos() {
				if self.session.update_selection(pos) {
					response.mark_changed();
				}
			}
		}
	}
}
