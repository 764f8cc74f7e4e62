//! Discrete-time PID controller driven by the measured elapsed time.
//!
//! The control loop is not guaranteed to run at a fixed rate, so the integral
//! and derivative terms use the `dt` handed in on every call. A non-positive
//! or non-finite `dt` leaves the state untouched and returns the previous
//! output. So does an update whose error or output is not finite.

use serde::{Deserialize, Serialize};

/// Controller gains
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// Saturation limits (anti-windup).
///
/// `integral_limit` bounds the accumulated error integral to `±limit`,
/// `output_limit` bounds the returned effort. `None` disables the clamp.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidLimits {
    pub integral_limit: Option<f64>,
    pub output_limit: Option<f64>,
}

impl PidLimits {
    /// Limits for a normalized effort output: output `±output_limit` and an
    /// integral that can at most saturate the output on its own.
    pub fn for_output(gains: &PidGains, output_limit: f64) -> Self {
        let integral_limit = if gains.ki > 0.0 {
            Some(output_limit / gains.ki)
        } else {
            None
        };
        Self {
            integral_limit,
            output_limit: Some(output_limit),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    limits: PidLimits,
    integral: f64,
    /// `None` until the first accepted update
    previous_error: Option<f64>,
    output: f64,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self::with_limits(gains, PidLimits::default())
    }

    pub fn with_limits(gains: PidGains, limits: PidLimits) -> Self {
        Self {
            gains,
            limits,
            integral: 0.0,
            previous_error: None,
            output: 0.0,
        }
    }

    /// Run one step of the control law and return the new effort
    pub fn update(&mut self, target: f64, measured: f64, dt: f64) -> f64 {
        if !(dt.is_finite() && dt > 0.0) {
            return self.output;
        }

        let error = target - measured;

        let mut integral = self.integral + error * dt;
        if let Some(limit) = self.limits.integral_limit {
            integral = integral.clamp(-limit, limit);
        }

        // no previous error on the first step, so no derivative kick
        let derivative = match self.previous_error {
            Some(previous) => (error - previous) / dt,
            None => 0.0,
        };

        let mut output = self.gains.kp * error + self.gains.ki * integral + self.gains.kd * derivative;
        if let Some(limit) = self.limits.output_limit {
            output = output.clamp(-limit, limit);
        }

        // overflowing inputs (infinite target or measurement) leave the state as it was
        if !(output.is_finite() && integral.is_finite() && error.is_finite()) {
            return self.output;
        }

        self.integral = integral;
        self.previous_error = Some(error);
        self.output = output;
        output
    }

    /// Forget the integral, derivative history and last output
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
        self.output = 0.0;
    }

    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn limits(&self) -> PidLimits {
        self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.02;

    fn representative() -> Pid {
        Pid::with_limits(
            PidGains::new(0.2, 0.05, 0.01),
            PidLimits {
                integral_limit: None,
                output_limit: Some(1.0),
            },
        )
    }

    #[test]
    fn test_pure_proportional() {
        let mut pid = Pid::new(PidGains::new(2.0, 0.0, 0.0));
        let out = pid.update(3.0, 1.0, DT);
        assert!((out - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_integral_uses_elapsed_time() {
        let mut pid = Pid::new(PidGains::new(0.0, 1.0, 0.0));
        pid.update(1.0, 0.0, 0.01);
        pid.update(1.0, 0.0, 0.05);
        pid.update(1.0, 0.0, 0.04);
        // integral = 1.0 * (0.01 + 0.05 + 0.04)
        assert!((pid.integral() - 0.1).abs() < 1e-12);
        assert!((pid.output() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_derivative_zero_on_first_call() {
        let mut pid = Pid::new(PidGains::new(0.0, 0.0, 1.0));
        assert_eq!(pid.update(5.0, 0.0, DT), 0.0);

        // error goes 5 -> 4 over 0.02 s
        let out = pid.update(5.0, 1.0, DT);
        assert!((out - (-50.0)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_dt_returns_previous_output() {
        let mut pid = representative();
        let first = pid.update(1.0, 0.0, DT);
        let integral = pid.integral();

        assert_eq!(pid.update(10.0, -3.0, 0.0), first);
        assert_eq!(pid.update(10.0, -3.0, -0.5), first);
        assert_eq!(pid.update(10.0, -3.0, f64::NAN), first);
        assert_eq!(pid.update(10.0, -3.0, f64::INFINITY), first);
        assert_eq!(pid.integral(), integral);
    }

    #[test]
    fn test_non_finite_error_holds_previous_output() {
        let mut pid = representative();
        let first = pid.update(1.0, 0.0, DT);
        let integral = pid.integral();

        // target overflowed to infinity upstream
        assert_eq!(pid.update(f64::INFINITY, 0.0, DT), first);
        assert_eq!(pid.update(f64::INFINITY, f64::INFINITY, DT), first);
        assert_eq!(pid.update(1.0, f64::NAN, DT), first);
        assert_eq!(pid.integral(), integral);

        // and a zero-dt hold afterwards still reports a finite value
        assert!(pid.update(1.0, 0.0, 0.0).is_finite());
        let next = pid.update(1.0, 0.0, DT);
        assert!(next.is_finite() && next > 0.0);
    }

    #[test]
    fn test_zero_dt_before_any_update_is_zero() {
        let mut pid = representative();
        let out = pid.update(1.0, 0.0, 0.0);
        assert_eq!(out, 0.0);
        assert!(out.is_finite());
    }

    #[test]
    fn test_converges_on_first_order_plant() {
        // plant: dv/dt = (gain * u - v) / tau, exact discretization
        let gain = 10.0;
        let tau = 0.2;
        let alpha = 1.0 - (-DT / tau).exp();
        let target = 5.0;

        let mut pid = representative();
        let mut v = 0.0;
        let mut settled_at = None;
        for cycle in 0..3000 {
            let u = pid.update(target, v, DT);
            v += (gain * u - v) * alpha;
            if (v - target).abs() < 0.05 {
                settled_at.get_or_insert(cycle);
            } else {
                settled_at = None;
            }
        }

        let settled_at = settled_at.expect("plant never settled");
        assert!(settled_at < 2000, "settled after {} cycles", settled_at);
        assert!((v - target).abs() < 0.05);
    }

    #[test]
    fn test_integral_clamp_limits_windup() {
        let gains = PidGains::new(0.0, 1.0, 0.0);
        let mut pid = Pid::with_limits(gains, PidLimits::for_output(&gains, 1.0));

        // saturated for a long time
        for _ in 0..1000 {
            pid.update(100.0, 0.0, DT);
        }
        assert!((pid.integral() - 1.0).abs() < 1e-12);

        // a single step of negative error immediately pulls the output down
        let out = pid.update(-100.0, 0.0, DT);
        assert!(out < 1.0);
    }

    #[test]
    fn test_output_clamp() {
        let mut pid = Pid::with_limits(
            PidGains::new(10.0, 0.0, 0.0),
            PidLimits {
                integral_limit: None,
                output_limit: Some(1.0),
            },
        );
        assert_eq!(pid.update(5.0, 0.0, DT), 1.0);
        assert_eq!(pid.update(-5.0, 0.0, DT), -1.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut pid = representative();
        pid.update(1.0, 0.0, DT);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.output(), 0.0);
        // derivative history gone as well
        let out = pid.update(1.0, 1.0, DT);
        assert_eq!(out, 0.0);
    }
}
