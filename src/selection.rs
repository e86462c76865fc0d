use std::ops::RangeInclusive;

use egui::{pos2, vec2, Pos2, Rect};

use crate::render::ViewState;
use crate::wav::WavContainer;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRange {
	pub start: usize,
	pub end: usize,
}

impl FrameRange {
	/// Number of frames a cut of this range removes, both ends included.
	pub fn len(&self) -> usize {
		self.start.abs_diff(self.end) + 1
	}
}



/// Pixel-space selection over the drawable area of the waveform.
///
/// The selection only stores pixels. Frames are derived from the view state
/// passed to [`SelectionMapper::commit`], so scrolling or zooming between
/// dragging and cutting changes what gets cut.
#[derive(Clone, Debug)]
pub struct SelectionMapper {
	bounds: Rect,
	origin_x: f32,
	rect: Option<Rect>,
}

impl Default for SelectionMapper {
	fn default() -> Self {
		SelectionMapper::new(Rect::from_min_size(Pos2::ZERO, vec2(0.0, 0.0)))
	}
}


impl SelectionMapper {
	pub fn new(bounds: Rect) -> Self {
		SelectionMapper {
			bounds,
			origin_x: bounds.min.x,
			rect: None,
		}
	}

	/// Updates the drawable area, e.g. after the widget was resized.
	pub fn set_bounds(&mut self, bounds: Rect) {
		self.bounds = bounds;
	}

	pub fn bounds(&self) -> Rect {
		self.bounds
	}

	pub fn rect(&self) -> Option<Rect> {
		self.rect
	}

	pub fn is_active(&self) -> bool {
		self.rect.is_some()
	}

	pub fn clear(&mut self) {
		self.rect = None;
	}

	pub fn begin(&mut self, pointer: Pos2) {
		self.origin_x = self.clamp_x(pointer.x);
		self.rect = Some(Rect::from_x_y_ranges(self.origin_x..=self.origin_x, self.y_range()));
	}

	pub fn update(&mut self, pointer: Pos2) {
		if self.rect.is_none() {
			return;
		}

		let x = self.clamp_x(pointer.x);
		let (left, right) = if x < self.origin_x { (x, self.origin_x) } else { (self.origin_x, x) };

		self.rect = Some(Rect::from_min_max(pos2(left, self.bounds.min.y), pos2(right, self.bounds.max.y)));
	}

	/// Frames covered by the current selection under `view`, clamped to `0..frame_count`.
	///
	/// `None` without a selection, or when it starts past the last frame.
	pub fn frame_range(&self, view: ViewState, frame_count: usize) -> Option<FrameRange> {
		let rect = self.rect?;

		let x = (rect.min.x - self.bounds.min.x).max(0.0) as usize;
		let width = rect.width().max(0.0) as usize;

		let start = view.position_sample + x * view.scale;
		if start >= frame_count {
			return None;
		}

		let end = (start + width * view.scale).min(frame_count - 1);
		Some(FrameRange { start, end })
	}

	/// Cuts the selected frames out of `container` and clears the selection.
	pub fn commit(&mut self, container: &mut WavContainer, view: ViewState) -> Option<FrameRange> {
		let range = self.frame_range(view, container.frame_count());
		self.clear();

		let range = range?;
		container.cut(range.start, range.end);

		Some(range)
	}

	// Written as max/min instead of clamp: bounds may still be empty before the first layout.
	fn clamp_x(&self, x: f32) -> f32 {
		x.max(self.bounds.min.x).min(self.bounds.max.x)
	}

	fn y_range(&self) -> RangeInclusive<f32> {
		self.bounds.min.y..=self.bounds.max.y
	}
}
