//! Session configuration
use std::time::Duration as StdDuration;

use hifitime::{Duration, Unit};

#[cfg(feature = "serde")]
use serde::Deserialize;

use crate::{error::ParseError, mount::MountLimits};

fn default_az_limits() -> (f64, f64) {
    (-360.0, 360.0)
}

fn default_el_limits() -> (f64, f64) {
    (0.0, 180.0)
}

fn default_pulse() -> u8 {
    10
}

fn default_step() -> f64 {
    0.1
}

/// Mount geometry and encoder setup
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MountConfig {
    /// Drivable azimuth range [deg]
    pub az_limits: (f64, f64),
    /// Drivable elevation range [deg]. Mounts with a 0..180 elevation
    /// axis can flip over the zenith.
    pub el_limits: (f64, f64),
    /// Encoder pulses per degree, until the mount reports its own.
    pub pulse_resolution: u8,
    /// Manual nudge step [deg]
    pub step_deg: f64,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            az_limits: default_az_limits(),
            el_limits: default_el_limits(),
            pulse_resolution: default_pulse(),
            step_deg: default_step(),
        }
    }
}

impl MountConfig {
    pub fn limits(&self) -> MountLimits {
        MountLimits::new(self.az_limits, self.el_limits)
    }
}

/// Overshoot applied while closing in on a fast target.
/// These values were tuned on the bench and still need field validation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LeadCompensation {
    pub enabled: bool,
    /// Only compensate when the new target is closer than this [deg]
    pub threshold_deg: f64,
    /// Minimal elevation rise between two polls [deg]
    pub rising_deg: f64,
    /// Multiplier applied to the incremental move
    pub factor: f64,
}

impl Default for LeadCompensation {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_deg: 2.0,
            rising_deg: 0.1,
            factor: 2.0,
        }
    }
}

/// Program track loop settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackingConfig {
    /// Poll period [s]. This is also the SET rate limit.
    pub poll_interval_s: f64,
    /// Moves smaller than this are not commanded [deg]
    pub deadband_deg: f64,
    pub lead: LeadCompensation,
    /// Position commanded when leaving program track (az, el) [deg]
    pub home: (f64, f64),
    /// Depth of the serial command queue
    pub queue_depth: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_s: 0.2,
            deadband_deg: 0.3,
            lead: LeadCompensation::default(),
            home: (0.0, 0.0),
            queue_depth: 64,
        }
    }
}

impl TrackingConfig {
    pub fn poll_interval(&self) -> StdDuration {
        StdDuration::from_secs_f64(self.poll_interval_s)
    }
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    /// Serial device path, or "tcp://host:port" for a serial bridge
    pub port: String,
    pub baud_rate: u32,
    /// Response timeout [s]
    pub timeout_s: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 600,
            timeout_s: 5.0,
        }
    }
}

impl LinkConfig {
    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_secs_f64(self.timeout_s)
    }
}

/// Pass prediction settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PredictionConfig {
    /// Cursor advance past the end of a pass [s]
    pub guard_s: f64,
    /// Peak search resolution [s]
    pub peak_epsilon_s: f64,
    /// Prune bisection resolution [s]
    pub prune_epsilon_s: f64,
    /// Peak search iteration budget
    pub max_peak_iterations: usize,
    /// SGP4 window scan: coarse step [s]
    pub scan_step_s: f64,
    /// SGP4 window scan: sample spacing inside a pass [s]
    pub sample_step_s: f64,
    /// SGP4 window scan: how far ahead to look for a pass [days]
    pub horizon_days: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            guard_s: 60.0,
            peak_epsilon_s: 0.1,
            prune_epsilon_s: 0.1,
            max_peak_iterations: 1000,
            scan_step_s: 60.0,
            sample_step_s: 10.0,
            horizon_days: 7.0,
        }
    }
}

impl PredictionConfig {
    pub fn guard(&self) -> Duration {
        self.guard_s * Unit::Second
    }
    pub fn peak_epsilon(&self) -> Duration {
        self.peak_epsilon_s * Unit::Second
    }
    pub fn prune_epsilon(&self) -> Duration {
        self.prune_epsilon_s * Unit::Second
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub mount: MountConfig,
    pub tracking: TrackingConfig,
    pub link: LinkConfig,
    pub prediction: PredictionConfig,
}

impl Config {
    /// Checks values that would otherwise only fail deep in the tracking loop.
    pub fn validate(&self) -> Result<(), ParseError> {
        let (az_min, az_max) = self.mount.az_limits;
        if az_min >= az_max {
            return Err(ParseError::Config(format!(
                "empty azimuth range [{}, {}]",
                az_min, az_max
            )));
        }
        let (el_min, el_max) = self.mount.el_limits;
        if el_min >= el_max {
            return Err(ParseError::Config(format!(
                "empty elevation range [{}, {}]",
                el_min, el_max
            )));
        }
        if self.mount.pulse_resolution == 0 {
            return Err(ParseError::Config("pulse resolution must be non zero".to_string()));
        }
        if !(self.tracking.poll_interval_s > 0.0) {
            return Err(ParseError::Config(format!(
                "invalid poll interval {}",
                self.tracking.poll_interval_s
            )));
        }
        if !(self.prediction.peak_epsilon_s > 0.0) || !(self.prediction.prune_epsilon_s > 0.0) {
            return Err(ParseError::Config("search resolutions must be positive".to_string()));
        }
        if !(self.prediction.scan_step_s > 0.0) || !(self.prediction.sample_step_s > 0.0) {
            return Err(ParseError::Config("scan steps must be positive".to_string()));
        }
        if self.tracking.queue_depth == 0 {
            return Err(ParseError::Config("queue depth must be non zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.mount.az_limits, (-360.0, 360.0));
        assert_eq!(cfg.mount.el_limits, (0.0, 180.0));
        assert_eq!(cfg.tracking.poll_interval(), StdDuration::from_millis(200));
        assert_eq!(cfg.link.baud_rate, 600);
        assert_eq!(cfg.prediction.guard().to_seconds(), 60.0);
    }

    #[test]
    fn rejects_empty_ranges() {
        let mut cfg = Config::default();
        cfg.mount.el_limits = (90.0, 0.0);
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.mount.pulse_resolution = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.tracking.poll_interval_s = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "mount": { "pulse_resolution": 2 },
                "tracking": { "lead": { "enabled": false } }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.mount.pulse_resolution, 2);
        assert_eq!(cfg.mount.az_limits, (-360.0, 360.0));
        assert!(!cfg.tracking.lead.enabled);
        assert_eq!(cfg.tracking.lead.factor, 2.0);
        assert_eq!(cfg.link, LinkConfig::default());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn bundled_config() {
        let cfg: Config = serde_json::from_str(include_str!("../data/config.json")).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tracking, TrackingConfig::default());
        assert_eq!(cfg.mount, MountConfig::default());
    }
}
