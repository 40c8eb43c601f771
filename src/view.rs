//! Pan/zoom view over the layout
//!
//! This module is pure calculation logic: pointer and wheel events go in,
//! `ViewUpdate` notifications come out. It also decides when the layout may
//! keep stepping: never while the user drags, and only after the view has
//! been left alone for `idle_delay`.

use std::time::{Duration, Instant};

use crate::config::Viewport;
use crate::region::Bounds;
use crate::vec2::Vec2;

/// Smallest zoom factor allowed by default
pub const DEFAULT_MIN_ZOOM: f32 = 0.1;

/// Largest zoom factor allowed by default
pub const DEFAULT_MAX_ZOOM: f32 = 10.0;

/// Zoom multiplier applied per wheel notch
pub const ZOOM_STEP: f32 = 1.1;

/// How long the view must be idle before stepping resumes
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(250);

/// Camera state after an interaction changed it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewUpdate {
    pub zoom: f32,
    pub offset: Vec2,
    /// Screen pixels per layout unit
    pub scale: f32,
}

/// Camera state for the layout view
#[derive(Debug, Clone)]
pub struct ViewController {
    /// Canvas size in pixels
    pub canvas_width: f32,
    pub canvas_height: f32,
    /// Layout rectangle shown across the canvas width at zoom 1
    pub viewport: Viewport,
    pub zoom: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Pan translation in layout units
    pub offset: Vec2,
    pub idle_delay: Duration,
    /// Last pointer position while a drag is in progress
    drag_from: Option<(f32, f32)>,
    last_interaction: Option<Instant>,
}

impl Default for ViewController {
    fn default() -> Self {
        Self {
            canvas_width: 800.0,
            canvas_height: 600.0,
            viewport: Viewport::default(),
            zoom: 1.0,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            offset: Vec2::ZERO,
            idle_delay: DEFAULT_IDLE_DELAY,
            drag_from: None,
            last_interaction: None,
        }
    }
}

impl ViewController {
    pub fn new(canvas_width: f32, canvas_height: f32, viewport: Viewport) -> Self {
        Self {
            canvas_width,
            canvas_height,
            viewport,
            ..Default::default()
        }
    }

    /// Limit zoom to `[min_zoom, max_zoom]`; an inverted range is swapped
    pub fn with_zoom_range(mut self, min_zoom: f32, max_zoom: f32) -> Self {
        self.min_zoom = min_zoom.min(max_zoom);
        self.max_zoom = min_zoom.max(max_zoom);
        self.zoom = self.clamp_zoom(self.zoom);
        self
    }

    /// Clamp into the zoom range without panicking on inverted limits
    fn clamp_zoom(&self, zoom: f32) -> f32 {
        let lo = self.min_zoom.min(self.max_zoom);
        let hi = self.min_zoom.max(self.max_zoom);
        zoom.max(lo).min(hi)
    }

    /// Screen pixels per layout unit
    pub fn scale(&self) -> f32 {
        self.zoom * self.canvas_width / self.viewport.width
    }

    fn half_canvas(&self) -> Vec2 {
        Vec2::new(self.canvas_width / 2.0, self.canvas_height / 2.0)
    }

    /// Layout coordinates to canvas pixels
    pub fn layout_to_screen(&self, p: Vec2) -> Vec2 {
        (p - self.viewport.center() + self.offset).scale(self.scale()) + self.half_canvas()
    }

    /// Canvas pixels to layout coordinates
    pub fn screen_to_layout(&self, s: Vec2) -> Vec2 {
        (s - self.half_canvas()).scale(1.0 / self.scale()) - self.offset + self.viewport.center()
    }

    /// A pixel delta expressed in layout units
    pub fn screen_delta_to_layout(&self, dx: f32, dy: f32) -> Vec2 {
        Vec2::new(dx, dy).scale(1.0 / self.scale())
    }

    fn touch(&mut self) {
        self.last_interaction = Some(Instant::now());
    }

    fn snapshot(&self) -> ViewUpdate {
        ViewUpdate {
            zoom: self.zoom,
            offset: self.offset,
            scale: self.scale(),
        }
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) -> Option<ViewUpdate> {
        self.drag_from = Some((x, y));
        self.touch();
        None
    }

    /// Pan while dragging; ignored otherwise
    pub fn pointer_move(&mut self, x: f32, y: f32) -> Option<ViewUpdate> {
        let (lx, ly) = self.drag_from?;
        let delta = self.screen_delta_to_layout(x - lx, y - ly);
        self.offset += delta;
        self.drag_from = Some((x, y));
        self.touch();
        Some(self.snapshot())
    }

    pub fn pointer_up(&mut self, _x: f32, _y: f32) -> Option<ViewUpdate> {
        self.drag_from = None;
        self.touch();
        None
    }

    /// Zoom by one notch about the cursor. Negative `delta_y` zooms in.
    /// Returns `None` when the zoom is already at its limit.
    pub fn wheel(&mut self, x: f32, y: f32, delta_y: f32) -> Option<ViewUpdate> {
        if delta_y == 0.0 {
            return None;
        }
        let factor = if delta_y < 0.0 {
            ZOOM_STEP
        } else {
            1.0 / ZOOM_STEP
        };
        let zoom = self.clamp_zoom(self.zoom * factor);
        self.touch();
        if zoom == self.zoom {
            return None;
        }

        // Keep the point under the cursor fixed
        let cursor = Vec2::new(x, y);
        let before = self.screen_to_layout(cursor);
        self.zoom = zoom;
        let after = self.screen_to_layout(cursor);
        self.offset += after - before;
        Some(self.snapshot())
    }

    pub fn resize(&mut self, width: f32, height: f32) -> Option<ViewUpdate> {
        if width == self.canvas_width && height == self.canvas_height {
            return None;
        }
        self.canvas_width = width;
        self.canvas_height = height;
        Some(self.snapshot())
    }

    /// Zoom and pan so `bounds` fills the canvas, minus `padding` pixels
    pub fn fit_to_bounds(&mut self, bounds: &Bounds, padding: f32) -> ViewUpdate {
        let width = (bounds.max_x - bounds.min_x).max(1.0);
        let height = (bounds.max_y - bounds.min_y).max(1.0);

        let available_width = self.canvas_width - 2.0 * padding;
        let available_height = self.canvas_height - 2.0 * padding;
        let scale = (available_width / width).min(available_height / height);

        self.zoom = self.clamp_zoom(scale * self.viewport.width / self.canvas_width);
        self.offset = self.viewport.center() - bounds.center();
        self.snapshot()
    }

    pub fn reset_view(&mut self) {
        self.zoom = self.clamp_zoom(1.0);
        self.offset = Vec2::ZERO;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_from.is_some()
    }

    /// Whether the layout should take more steps right now
    pub fn should_step(&self) -> bool {
        self.should_step_at(Instant::now())
    }

    pub fn should_step_at(&self, now: Instant) -> bool {
        if self.is_dragging() {
            return false;
        }
        self.last_interaction
            .is_none_or(|t| now.saturating_duration_since(t) >= self.idle_delay)
    }
}
