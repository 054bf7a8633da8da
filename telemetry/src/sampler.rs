//! Sampler policies.
//!
//! A sampler is consulted exactly once per root span. Child spans inherit
//! the decision of their root and never call the sampler.

use crate::error::TelemetryError;
use crate::ids::TraceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Decides whether a new trace is recorded.
pub trait Sampler: Send + Sync + fmt::Debug {
    /// Returns true if the trace rooted at `trace_id` should be recorded.
    fn should_sample(&self, trace_id: TraceId) -> bool;

    /// Human-readable description, used in startup logs.
    fn description(&self) -> String;
}

/// Records every trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOn;

impl Sampler for AlwaysOn {
    fn should_sample(&self, _trace_id: TraceId) -> bool {
        true
    }

    fn description(&self) -> String {
        "AlwaysOn".to_string()
    }
}

/// Records no trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOff;

impl Sampler for AlwaysOff {
    fn should_sample(&self, _trace_id: TraceId) -> bool {
        false
    }

    fn description(&self) -> String {
        "AlwaysOff".to_string()
    }
}

/// Records a deterministic fraction of traces, keyed on the trace id.
///
/// The same trace id always yields the same decision.
#[derive(Debug, Clone, Copy)]
pub struct TraceIdRatio {
    ratio: f64,
    upper_bound: u64,
}

impl TraceIdRatio {
    /// Creates a ratio sampler. Ratios are clamped to `0.0..=1.0`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn new(ratio: f64) -> Self {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        Self {
            ratio,
            upper_bound: (ratio * (1u64 << 63) as f64) as u64,
        }
    }
}

impl Sampler for TraceIdRatio {
    fn should_sample(&self, trace_id: TraceId) -> bool {
        if self.ratio >= 1.0 {
            return true;
        }
        (trace_id.low_u64() >> 1) < self.upper_bound
    }

    fn description(&self) -> String {
        format!("TraceIdRatio{{{}}}", self.ratio)
    }
}

// leaky bucket refilled continuously at `per_second`
#[derive(Debug)]
struct LeakyBucket {
    per_second: f64,
    available: f64,
    capacity: f64,
    last_refill: Instant,
}

impl LeakyBucket {
    fn new(per_second: f64) -> Self {
        let capacity = per_second.max(1.0);
        Self {
            per_second,
            available: capacity,
            capacity,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = now;
        self.available =
            (self.available + elapsed.as_secs_f64() * self.per_second).min(self.capacity);

        if self.available >= 1.0 {
            self.available -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Records at most `per_second` traces per second, with bursts up to that
/// many traces.
#[derive(Debug)]
pub struct RateLimited {
    per_second: f64,
    bucket: Mutex<LeakyBucket>,
}

impl RateLimited {
    /// Creates a rate-limited sampler. Non-positive rates record nothing.
    #[must_use]
    pub fn new(per_second: f64) -> Self {
        let per_second = if per_second.is_finite() { per_second.max(0.0) } else { 0.0 };
        Self {
            per_second,
            bucket: Mutex::new(LeakyBucket::new(per_second)),
        }
    }

    fn should_sample_at(&self, now: Instant) -> bool {
        if self.per_second <= 0.0 {
            return false;
        }
        self.bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(now)
    }
}

impl Sampler for RateLimited {
    fn should_sample(&self, _trace_id: TraceId) -> bool {
        self.should_sample_at(Instant::now())
    }

    fn description(&self) -> String {
        format!("RateLimited{{{}/s}}", self.per_second)
    }
}

/// Sampler selection as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", content = "arg", rename_all = "snake_case")]
pub enum SamplerMode {
    /// Record every trace.
    #[default]
    AlwaysOn,
    /// Record no trace.
    AlwaysOff,
    /// Record the given fraction of traces.
    TraceIdRatio(f64),
    /// Record at most the given number of traces per second.
    RateLimited(f64),
}

impl SamplerMode {
    /// Parses a sampler name and optional argument, following the
    /// `OTEL_TRACES_SAMPLER` / `OTEL_TRACES_SAMPLER_ARG` conventions.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfig`] for an unknown sampler name
    /// or an argument that is not a number.
    pub fn parse(name: &str, arg: Option<&str>) -> Result<Self, TelemetryError> {
        let parse_arg = |default: f64| -> Result<f64, TelemetryError> {
            arg.map(str::trim).filter(|a| !a.is_empty()).map_or(Ok(default), |a| {
                a.parse::<f64>().map_err(|_| {
                    TelemetryError::invalid_config(format!("sampler argument '{a}' is not a number"))
                })
            })
        };

        match name.trim().to_ascii_lowercase().as_str() {
            "always_on" | "parentbased_always_on" => Ok(Self::AlwaysOn),
            "always_off" | "parentbased_always_off" => Ok(Self::AlwaysOff),
            "traceidratio" | "parentbased_traceidratio" => Ok(Self::TraceIdRatio(parse_arg(1.0)?)),
            "ratelimited" | "rate_limited" => Ok(Self::RateLimited(parse_arg(100.0)?)),
            other => Err(TelemetryError::invalid_config(format!(
                "unknown sampler '{other}'"
            ))),
        }
    }

    /// Instantiates the policy.
    #[must_use]
    pub fn build(self) -> Arc<dyn Sampler> {
        match self {
            Self::AlwaysOn => Arc::new(AlwaysOn),
            Self::AlwaysOff => Arc::new(AlwaysOff),
            Self::TraceIdRatio(ratio) => Arc::new(TraceIdRatio::new(ratio)),
            Self::RateLimited(per_second) => Arc::new(RateLimited::new(per_second)),
        }
    }
}
