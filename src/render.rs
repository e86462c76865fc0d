use egui::{pos2, vec2, Pos2, Rect};

use crate::wav::WavContainer;


/// Above this many frames per pixel the waveform is drawn as a min/max envelope
/// instead of sample-to-sample lines.
pub const ENVELOPE_THRESHOLD: usize = 7;

const HEADROOM: f32 = 1.1;



/// Random access to decoded samples, as needed by the renderer.
pub trait SampleSource {
	fn channel_count(&self) -> usize;
	fn frame_count(&self) -> usize;
	fn amplitude_range(&self) -> AmplitudeRange;

	fn sample(&self, frame: usize, channel: usize) -> i32;
	fn min_max_in_range(&self, start: usize, length: usize, channel: usize) -> (i32, i32);
}

impl SampleSource for WavContainer {
	fn channel_count(&self) -> usize {
		usize::from(WavContainer::channel_count(self))
	}

	fn frame_count(&self) -> usize {
		WavContainer::frame_count(self)
	}

	fn amplitude_range(&self) -> AmplitudeRange {
		AmplitudeRange::for_bit_depth(self.bit_depth())
	}

	fn sample(&self, frame: usize, channel: usize) -> i32 {
		WavContainer::sample(self, frame, channel)
	}

	fn min_max_in_range(&self, start: usize, length: usize, channel: usize) -> (i32, i32) {
		WavContainer::min_max_in_range(self, start, length, channel)
	}
}



#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AmplitudeRange {
	pub min: i32,
	pub max: i32,
}

impl AmplitudeRange {
	pub fn for_bit_depth(bit_depth: u16) -> AmplitudeRange {
		match bit_depth {
			// 256 levels, re-centered around 127
			8 => AmplitudeRange { min: -127, max: 128 },
			_ => AmplitudeRange { min: i32::from(i16::MIN), max: i32::from(i16::MAX) },
		}
	}

	/// Vertical position of `value` inside `band`. The band spans
	/// `1.1 * max` at the top down to `1.1 * (min - 1)` at the bottom.
	pub fn to_y(&self, value: i32, band: Rect) -> f32 {
		let top = HEADROOM * self.max as f32;
		let span = HEADROOM * (self.max - self.min + 1) as f32;

		band.min.y + (top - value as f32) / span * band.height()
	}
}



/// Which frames are visible: the first one, and how many frames share a pixel column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewState {
	pub position_sample: usize,
	pub scale: usize,
}

impl Default for ViewState {
	fn default() -> Self {
		ViewState {
			position_sample: 0,
			scale: 1,
		}
	}
}



/// One horizontal band per channel, separated and surrounded by `padding`.
#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
	pub bands: Vec<Rect>,
	pub subplot_width: usize,
}

impl Layout {
	pub fn new(rect: Rect, channels: usize, padding: f32) -> Layout {
		let channels = channels.max(1);

		let subplot_width = (rect.width() - 2.0 * padding).max(0.0).floor();
		let band_height = ((rect.height() - padding * (channels + 1) as f32) / channels as f32)
			.max(0.0)
			.floor();

		let bands = (0..channels)
			.map(|index| {
				let top = rect.min.y + padding + index as f32 * (padding + band_height);
				Rect::from_min_size(pos2(rect.min.x + padding, top), vec2(subplot_width, band_height))
			})
			.collect();

		Layout {
			bands,
			subplot_width: subplot_width as usize,
		}
	}

	/// From the top-left corner of the first band to the bottom-right corner of the last.
	pub fn drawable(&self) -> Rect {
		match (self.bands.first(), self.bands.last()) {
			(Some(first), Some(last)) => Rect::from_min_max(first.min, last.max),
			_ => Rect::from_min_size(Pos2::ZERO, vec2(0.0, 0.0)),
		}
	}
}



#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Primitive {
	/// Line between two consecutive samples.
	Segment { from: Pos2, to: Pos2 },

	/// Vertical min/max extent of one pixel column.
	Bar { x: f32, top: f32, bottom: f32 },
}

#[derive(Clone, Debug)]
pub struct ChannelGeometry {
	pub band: Rect,
	pub primitives: Vec<Primitive>,
}



pub struct WaveformRenderer<'a, S: ?Sized> {
	pub source: &'a S,
	pub view: ViewState,
	pub layout: &'a Layout,
}

impl<S: SampleSource + ?Sized> WaveformRenderer<'_, S> {
	pub fn render(&self) -> Vec<ChannelGeometry> {
		let channels = self.source.channel_count();

		self.layout.bands.iter()
			.take(channels)
			.enumerate()
			.map(|(channel, &band)| {
				let primitives = if self.scale() > ENVELOPE_THRESHOLD {
					self.envelope(channel, band)
				} else {
					self.exact(channel, band)
				};

				ChannelGeometry { band, primitives }
			})
			.collect()
	}

	fn scale(&self) -> usize {
		self.view.scale.max(1)
	}

	// Columns that would run past the last frame are left out.
	fn envelope(&self, channel: usize, band: Rect) -> Vec<Primitive> {
		let scale = self.scale();
		let frame_count = self.source.frame_count();
		let range = self.source.amplitude_range();

		(0..self.layout.subplot_width)
			.map(|column| (column, self.view.position_sample + column * scale))
			.take_while(|&(_, start)| start + scale <= frame_count)
			.map(|(column, start)| {
				let (min, max) = self.source.min_max_in_range(start, scale, channel);

				Primitive::Bar {
					x: band.min.x + column as f32,
					top: range.to_y(max, band),
					bottom: range.to_y(min, band),
				}
			})
			.collect()
	}

	fn exact(&self, channel: usize, band: Rect) -> Vec<Primitive> {
		let scale = self.scale();
		let frame_count = self.source.frame_count();
		let range = self.source.amplitude_range();
		let pixels_per_frame = 1.0 / scale as f32;

		let mut next = None;

		(0..self.layout.subplot_width * scale)
			.take_while(|&offset| self.view.position_sample + offset + 1 < frame_count)
			.map(|offset| {
				let frame = self.view.position_sample + offset;
				let current = next.take().unwrap_or_else(|| self.source.sample(frame, channel));
				let following = self.source.sample(frame + 1, channel);
				next = Some(following);

				Primitive::Segment {
					from: pos2(band.min.x + offset as f32 * pixels_per_frame, range.to_y(current, band)),
					to: pos2(band.min.x + (offset + 1) as f32 * pixels_per_frame, range.to_y(following, band)),
				}
			})
			.collect()
	}
}
