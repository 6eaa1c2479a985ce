//! Pixel mapping for the timeline view.

use cutline_core::{PlacementTime, RationalTime, Result, ViewportConfig};

use crate::timeline::Timeline;

/// Horizontal mapping between placement time and screen pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    /// Width available to clips, excluding the label gutter.
    pub container_width: f64,
    /// Horizontal scroll offset in pixels, never negative.
    pub scroll_x: f64,
    /// Fixed label column left of the clips.
    pub label_gutter: f64,
    min_pixels_per_second: f64,
}

impl Viewport {
    pub fn new(container_width: f64, config: &ViewportConfig) -> Self {
        Self {
            container_width,
            scroll_x: 0.0,
            label_gutter: config.label_gutter_px,
            min_pixels_per_second: config.min_pixels_per_second,
        }
    }

    /// `max(min, container_width / duration * zoom)`, with a one-second
    /// floor on the duration so an empty timeline still has a scale.
    pub fn pixels_per_second(&self, timeline: &Timeline) -> f64 {
        let duration = timeline
            .program_duration()
            .max(RationalTime::from_secs(1))
            .to_seconds_f64();
        (self.container_width / duration * timeline.zoom()).max(self.min_pixels_per_second)
    }

    /// Screen x of a placement time.
    pub fn placement_to_x(&self, timeline: &Timeline, time: PlacementTime) -> f64 {
        self.label_gutter + time.to_seconds_f64() * self.pixels_per_second(timeline) - self.scroll_x
    }

    /// Placement time under screen x, clamped at zero.
    pub fn x_to_placement(&self, timeline: &Timeline, x: f64) -> PlacementTime {
        let seconds = (x - self.label_gutter + self.scroll_x) / self.pixels_per_second(timeline);
        PlacementTime::from_seconds_f64(seconds.max(0.0))
    }

    /// Change zoom while keeping the playhead's placement time at the same
    /// screen x.
    pub fn set_zoom(&mut self, timeline: &mut Timeline, zoom: f64) -> Result<()> {
        let anchor = timeline.playhead_placement();
        let anchor_x = self.placement_to_x(timeline, anchor);
        timeline.set_zoom(zoom)?;
        let pps = self.pixels_per_second(timeline);
        self.scroll_x = (self.label_gutter + anchor.to_seconds_f64() * pps - anchor_x).max(0.0);
        Ok(())
    }
}
