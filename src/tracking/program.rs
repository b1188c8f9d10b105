//! Program track: sky position to mount command
use log::trace;

use crate::{
    cfg::LeadCompensation,
    mount::{MountLimits, Pointing},
    observation::Observation,
};

/// The four mount encodings of one sky position, in preference order.
/// Flipped encodings go over the zenith (elevation > 90°).
pub fn candidates(azimuth_deg: f64, elevation_deg: f64) -> [Pointing; 4] {
    let (az, el) = (azimuth_deg, elevation_deg);
    if az > 180.0 {
        [
            Pointing::new(az, el),
            Pointing::new(az - 180.0, 180.0 - el),
            Pointing::new(az - 360.0, el),
            Pointing::new(az - 540.0, 180.0 - el),
        ]
    } else {
        [
            Pointing::new(az, el),
            Pointing::new(az + 180.0, 180.0 - el),
            Pointing::new(az - 180.0, 180.0 - el),
            Pointing::new(az - 360.0, el),
        ]
    }
}

/// Picks the drivable encoding of `sky` closest to `last`.
/// Ties go to the first candidate. When no encoding is drivable,
/// `sky` is saturated into the mount range.
pub fn resolve(sky: Pointing, last: &Pointing, limits: &MountLimits) -> Pointing {
    candidates(sky.azimuth_deg, sky.elevation_deg)
        .into_iter()
        .filter(|candidate| limits.contains(candidate))
        .fold(None, |best: Option<(Pointing, f64)>, candidate| {
            let cost = candidate.distance_sq(last);
            match best {
                Some((_, best_cost)) if best_cost <= cost => best,
                _ => Some((candidate, cost)),
            }
        })
        .map(|(candidate, _)| candidate)
        .unwrap_or_else(|| limits.clamp(sky))
}

/// Turns successive observations into mount commands
#[derive(Debug, Clone)]
pub struct ProgramTracker {
    deadband_deg: f64,
    lead: LeadCompensation,
    previous_elevation: Option<f64>,
}

impl ProgramTracker {
    pub fn new(deadband_deg: f64, lead: LeadCompensation) -> Self {
        Self {
            deadband_deg,
            lead,
            previous_elevation: None,
        }
    }
    /// Returns the next command, given the last commanded position.
    /// None when the satellite moved less than the deadband.
    pub fn step(
        &mut self,
        observation: &Observation,
        last: Pointing,
        limits: &MountLimits,
    ) -> Option<Pointing> {
        let rising = self
            .previous_elevation
            .replace(observation.elevation_deg)
            .map(|previous| observation.elevation_deg - previous >= self.lead.rising_deg)
            .unwrap_or(false);

        let sky = Pointing::new(
            observation.azimuth_deg,
            observation.elevation_deg.max(limits.elevation.0),
        );
        let target = resolve(sky, &last, limits);
        let distance = target.distance(&last);
        if distance < self.deadband_deg {
            return None;
        }

        if self.lead.enabled && distance < self.lead.threshold_deg && rising {
            let factor = self.lead.factor;
            let lead = limits.clamp(Pointing::new(
                last.azimuth_deg + factor * (target.azimuth_deg - last.azimuth_deg),
                last.elevation_deg + factor * (target.elevation_deg - last.elevation_deg),
            ));
            trace!("lead {} -> {}", target, lead);
            Some(lead)
        } else {
            Some(target)
        }
    }
}
