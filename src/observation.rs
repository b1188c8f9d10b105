use hifitime::Epoch;

use crate::{elements::OrbitalElements, error::Error, location::ObserverLocation};

/// Implement this trait to provide satellite look angles.
/// This is the only access to orbital mechanics the crate needs:
/// pass prediction and program tracking are built on top of it.
pub trait Propagator {
    /// Look angles of the satellite described by `elements`, seen from
    /// `location`, at instant `t`.
    fn observe(
        &self,
        elements: &OrbitalElements,
        location: &ObserverLocation,
        t: Epoch,
    ) -> Result<Observation, Error>;

    /// Samples bounding the next visibility window, in chronological order.
    /// If the satellite is already above the horizon at `from`, this
    /// describes the ongoing pass. First and last samples mark
    /// the rise and set instants.
    fn predict_window(
        &self,
        elements: &OrbitalElements,
        location: &ObserverLocation,
        from: Epoch,
    ) -> Result<Vec<Observation>, Error>;
}

impl<P: Propagator + ?Sized> Propagator for &P {
    fn observe(
        &self,
        elements: &OrbitalElements,
        location: &ObserverLocation,
        t: Epoch,
    ) -> Result<Observation, Error> {
        (**self).observe(elements, location, t)
    }
    fn predict_window(
        &self,
        elements: &OrbitalElements,
        location: &ObserverLocation,
        from: Epoch,
    ) -> Result<Vec<Observation>, Error> {
        (**self).predict_window(elements, location, from)
    }
}

/// Satellite look angles at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Sampling Epoch
    pub epoch: Epoch,
    /// Azimuth, clockwise from North, in [0, 360) [deg]
    pub azimuth_deg: f64,
    /// Elevation above the horizon, in [-90, 90] [deg]
    pub elevation_deg: f64,
}

impl Observation {
    /// Builds new [Observation], azimuth is normalized to [0, 360).
    pub fn new(epoch: Epoch, azimuth_deg: f64, elevation_deg: f64) -> Self {
        let azimuth_deg = azimuth_deg.rem_euclid(360.0);
        Self {
            epoch,
            // rem_euclid rounds tiny negative angles up to 360
            azimuth_deg: if azimuth_deg >= 360.0 { 0.0 } else { azimuth_deg },
            elevation_deg,
        }
    }
    /// True when the satellite is above the geometric horizon
    pub fn visible(&self) -> bool {
        self.elevation_deg >= 0.0
    }
}
