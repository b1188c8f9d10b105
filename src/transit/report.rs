//! Upcoming passes report
use hifitime::{Duration, Epoch};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{
    elements::OrbitalElements,
    error::Error,
    location::ObserverLocation,
    observation::{Observation, Propagator},
    transit::{finder::transits, Transit},
};

/// Pass summary, as presented to the operator
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PassSummary {
    /// Satellite name
    pub satellite: String,
    /// Rise instant
    pub start: Epoch,
    /// Azimuth at rise [deg]
    pub start_azimuth_deg: f64,
    /// Set instant
    pub end: Epoch,
    /// Azimuth at set [deg]
    pub end_azimuth_deg: f64,
    /// Culmination instant
    pub peak_epoch: Epoch,
    /// Maximal elevation [deg]
    pub peak_elevation_deg: f64,
    /// Pass duration
    pub duration: Duration,
}

impl PassSummary {
    /// Summarizes a [Transit], its peak resolved down to `epsilon`
    pub fn new<P: Propagator + ?Sized>(
        transit: &Transit<'_, P>,
        epsilon: Duration,
    ) -> Result<Self, Error> {
        let rise = transit.at(transit.start)?;
        let set = transit.at(transit.end)?;
        let Observation {
            epoch: peak_epoch,
            elevation_deg: peak_elevation_deg,
            ..
        } = transit.peak_with(epsilon)?;
        Ok(Self {
            satellite: transit.elements().name().to_string(),
            start: transit.start,
            start_azimuth_deg: rise.azimuth_deg,
            end: transit.end,
            end_azimuth_deg: set.azimuth_deg,
            peak_epoch,
            peak_elevation_deg,
            duration: transit.duration(),
        })
    }
}

impl std::fmt::Display for PassSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(
            f,
            "Start:  {}, Azimuth: {:.2}°",
            self.start, self.start_azimuth_deg
        )?;
        writeln!(f, "Finish: {}, Azimuth: {:.2}°", self.end, self.end_azimuth_deg)?;
        write!(
            f,
            "Maximum Elevation: {:.2}° @{} ({})",
            self.peak_elevation_deg, self.peak_epoch, self.duration
        )
    }
}

/// Summarizes the `count` passes ending after `now`.
pub fn upcoming<P: Propagator + ?Sized>(
    source: &P,
    elements: &OrbitalElements,
    location: ObserverLocation,
    now: Epoch,
    count: usize,
    epsilon: Duration,
) -> Result<Vec<PassSummary>, Error> {
    transits(source, elements, location, now)
        .take(count)
        .map(|transit| PassSummary::new(&transit?, epsilon))
        .collect()
}
