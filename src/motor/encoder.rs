// Wheel encoder: interrupt-side edge counting plus angle/velocity estimation
//
// The edge interrupt only ever touches `EdgeCounter` (one atomic add per edge).
// Scaling, direction sign and the velocity estimate all happen in
// `Encoder::sample` on the control thread.

use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use crate::error::ConfigError;

/// Samples closer together than this are treated as the same instant
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_micros(100);

/// Raw edge counter shared between the edge interrupt and the sampling routine
#[derive(Debug, Default)]
pub struct EdgeCounter {
    edges: AtomicI32,
}

impl EdgeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a single edge. Safe to call from interrupt context.
    #[inline]
    pub fn record(&self, forward: bool) {
        self.edges
            .fetch_add(if forward { 1 } else { -1 }, Ordering::Relaxed);
    }

    /// Half-quadrature decoding: call on every edge of channel A with the
    /// levels of both channels. A leading B means forward rotation.
    #[inline]
    pub fn on_channel_a(&self, a: bool, b: bool) {
        self.record(a != b);
    }

    /// Add a batch of edges (hardware counters that report deltas, simulation)
    #[inline]
    pub fn add(&self, edges: i32) {
        self.edges.fetch_add(edges, Ordering::Relaxed);
    }

    /// Read and reset the counter in one step, so no edge is lost or counted twice
    pub fn take(&self) -> i32 {
        self.edges.swap(0, Ordering::AcqRel)
    }

    /// Edges recorded since the last `take`
    pub fn pending(&self) -> i32 {
        self.edges.load(Ordering::Acquire)
    }
}

/// Angle and velocity estimate for one wheel
#[derive(Debug)]
pub struct Encoder {
    counter: Arc<EdgeCounter>,
    radians_per_edge: f64,
    /// +1.0 or -1.0, flips sensors mounted mirrored to their motor
    sign: f64,
    /// Accumulated angle in radians, never wrapped
    angle: f64,
    last_angle: f64,
    last_sample: Option<Instant>,
    velocity: f64,
}

impl Encoder {
    /// Create an encoder reading from `counter`
    ///
    /// `edges_per_revolution` counts every edge the interrupt records over one
    /// full turn of the wheel shaft.
    pub fn new(
        counter: Arc<EdgeCounter>,
        edges_per_revolution: u32,
        reversed: bool,
    ) -> Result<Self, ConfigError> {
        if edges_per_revolution == 0 {
            return Err(ConfigError::invalid("edges_per_revolution", 0));
        }

        Ok(Self {
            counter,
            radians_per_edge: TAU / edges_per_revolution as f64,
            sign: if reversed { -1.0 } else { 1.0 },
            angle: 0.0,
            last_angle: 0.0,
            last_sample: None,
            velocity: 0.0,
        })
    }

    /// Handle for the interrupt side
    pub fn counter(&self) -> Arc<EdgeCounter> {
        Arc::clone(&self.counter)
    }

    pub fn sample(&mut self) {
        self.sample_at(Instant::now());
    }

    /// Fold the edges recorded since the previous call into the angle and
    /// refresh the velocity estimate.
    ///
    /// The first sample only establishes the time base. If `now` is too close to
    /// the previous sample the velocity is held and the angle delta is carried
    /// over into the next estimate.
    pub fn sample_at(&mut self, now: Instant) {
        let edges = self.counter.take();
        self.angle += self.sign * edges as f64 * self.radians_per_edge;

        let Some(last) = self.last_sample else {
            self.last_sample = Some(now);
            self.last_angle = self.angle;
            return;
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed < MIN_SAMPLE_INTERVAL {
            return;
        }

        self.velocity = (self.angle - self.last_angle) / elapsed.as_secs_f64();
        self.last_angle = self.angle;
        self.last_sample = Some(now);
    }

    /// Accumulated angle in radians
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Angular velocity in rad/s as of the last accepted sample
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn radians_per_edge(&self) -> f64 {
        self.radians_per_edge
    }
}
