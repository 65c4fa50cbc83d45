//! Timestamp to track-position conversion.
//!
//! Track positions are what the presentation layer uses to place notes
//! vertically. With velocity effects enabled the position is the integral
//! of the active multiplier over time, so a note's distance from the
//! judgement line reflects every speed change between now and its time.

use super::constants::POSITION_SCALE;
use crate::models::chart::{Chart, TimingInfo};

/// Converts absolute milliseconds into track positions.
pub trait TimingResolver: Send {
    /// Position at `time`, with no assumption about previous queries.
    fn offset_at(&self, time: f64) -> f64;

    /// Position at `time`, scanning forward from `hint`.
    ///
    /// `hint` is updated in place; pass the same cursor back on every tick
    /// for amortized constant-time lookups while time moves forward.
    fn offset_at_hinted(&self, time: f64, hint: &mut usize) -> f64;
}

/// Linear scrolling that ignores every velocity point.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticTiming;

impl TimingResolver for StaticTiming {
    fn offset_at(&self, time: f64) -> f64 {
        time * POSITION_SCALE
    }

    fn offset_at_hinted(&self, time: f64, _hint: &mut usize) -> f64 {
        self.offset_at(time)
    }
}

/// Integrates the normalized velocity sequence.
#[derive(Debug, Clone)]
pub struct VelocityTiming {
    initial: f64,
    points: Vec<TimingInfo>,
    /// Position reached at each point's start time.
    anchors: Vec<f64>,
}

impl VelocityTiming {
    /// `points` must be sorted with unique start times.
    pub fn new(initial: f64, points: Vec<TimingInfo>) -> Self {
        let mut anchors = Vec::with_capacity(points.len());
        for (i, point) in points.iter().enumerate() {
            let anchor = match i {
                0 => (point.start_time * initial * POSITION_SCALE).round(),
                _ => {
                    let prev = &points[i - 1];
                    anchors[i - 1]
                        + ((point.start_time - prev.start_time) * prev.value * POSITION_SCALE)
                            .round()
                }
            };
            anchors.push(anchor);
        }
        Self {
            initial,
            points,
            anchors,
        }
    }

    pub fn from_chart(chart: &Chart) -> Self {
        Self::new(chart.initial_sv_multiplier, chart.svs.clone())
    }

    /// `index` is the number of points starting at or before `time`.
    fn position_from(&self, time: f64, index: usize) -> f64 {
        match index {
            0 => time * self.initial * POSITION_SCALE,
            _ => {
                let point = &self.points[index - 1];
                self.anchors[index - 1] + (time - point.start_time) * point.value * POSITION_SCALE
            }
        }
    }
}

impl TimingResolver for VelocityTiming {
    fn offset_at(&self, time: f64) -> f64 {
        let index = self.points.partition_point(|p| p.start_time <= time);
        self.position_from(time, index)
    }

    fn offset_at_hinted(&self, time: f64, hint: &mut usize) -> f64 {
        let stale = *hint > self.points.len()
            || (*hint > 0 && time < self.points[*hint - 1].start_time);
        if stale {
            *hint = self.points.partition_point(|p| p.start_time <= time);
        }
        while *hint < self.points.len() && time >= self.points[*hint].start_time {
            *hint += 1;
        }
        self.position_from(time, *hint)
    }
}

/// Builds the resolver a session asks for.
pub fn resolver_for(chart: &Chart, no_sv: bool) -> Box<dyn TimingResolver> {
    if no_sv {
        Box::new(StaticTiming)
    } else {
        Box::new(VelocityTiming::from_chart(chart))
    }
}
