//! SGP4 backed [Propagator]
use std::{collections::HashMap, f64::consts::FRAC_PI_2, sync::Arc};

use hifitime::{Epoch, Unit};
use log::{debug, trace};
use map_3d::rad2deg;
use nalgebra::{Matrix3, Vector3};
use parking_lot::Mutex;

use crate::{
    cfg::PredictionConfig,
    elements::OrbitalElements,
    error::Error,
    location::ObserverLocation,
    observation::{Observation, Propagator},
};

/// Julian date of the Unix epoch
const UNIX_EPOCH_JD: f64 = 2440587.5;
/// Julian date of J2000
const J2000_JD: f64 = 2451545.0;
/// Rise/Set instants resolution [s]
const CROSSING_RESOLUTION_S: f64 = 0.5;

/// Decoded element set ready for propagation
struct Model {
    /// TLE epoch, in julian years since J2000
    epoch_years: f64,
    constants: sgp4::Constants,
}

/// [Propagator] built on the `sgp4` crate. Satellite positions are
/// rotated from TEME to ECEF using mean sidereal time (polar motion
/// and nutation are neglected), then projected on the local horizon.
pub struct Sgp4Propagator {
    cfg: PredictionConfig,
    models: Mutex<HashMap<OrbitalElements, Arc<Model>>>,
}

impl Default for Sgp4Propagator {
    fn default() -> Self {
        Self::new(PredictionConfig::default())
    }
}

impl Sgp4Propagator {
    pub fn new(cfg: PredictionConfig) -> Self {
        Self {
            cfg,
            models: Mutex::new(HashMap::with_capacity(4)),
        }
    }
    fn model(&self, elements: &OrbitalElements) -> Result<Arc<Model>, Error> {
        if let Some(model) = self.models.lock().get(elements) {
            return Ok(model.clone());
        }
        let (line1, line2) = elements.lines();
        let parsed = sgp4::Elements::from_tle(
            Some(elements.name().to_string()),
            line1.as_bytes(),
            line2.as_bytes(),
        )
        .map_err(|e| Error::Predict(format!("{}: {}", elements.name(), e)))?;
        let constants = sgp4::Constants::from_elements(&parsed)
            .map_err(|e| Error::Predict(format!("{}: {}", elements.name(), e)))?;
        debug!("{} - elements epoch {}", elements.name(), parsed.datetime);
        let model = Arc::new(Model {
            epoch_years: parsed.epoch(),
            constants,
        });
        self.models.lock().insert(elements.clone(), model.clone());
        Ok(model)
    }
    /// Julian years elapsed since J2000
    fn julian_years(t: Epoch) -> f64 {
        (t.to_unix_seconds() / 86400.0 + UNIX_EPOCH_JD - J2000_JD) / 365.25
    }
    /// TEME to ECEF rotation, for given Greenwich sidereal angle [rad]
    fn teme_to_ecef(gmst: f64) -> Matrix3<f64> {
        let (s, c) = gmst.sin_cos();
        Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
    }
    /// Satellite ECEF position [m] at given instant
    fn ecef(&self, elements: &OrbitalElements, t: Epoch) -> Result<Vector3<f64>, Error> {
        let model = self.model(elements)?;
        let years = Self::julian_years(t);
        let minutes = (years - model.epoch_years) * 365.25 * 1440.0;
        let prediction = model
            .constants
            .propagate(sgp4::MinutesSinceEpoch(minutes))
            .map_err(|e| Error::Predict(format!("{} @{}: {}", elements.name(), t, e)))?;
        let teme = Vector3::new(
            prediction.position[0],
            prediction.position[1],
            prediction.position[2],
        ) * 1.0E3;
        let gmst = sgp4::iau_epoch_to_sidereal_time(years);
        Ok(Self::teme_to_ecef(gmst) * teme)
    }
    /// Computes Elevation and Azimuth angles between given ECEF position
    /// in the Sky and the ground station.
    fn elevation_azimuth(position: Vector3<f64>, location: &ObserverLocation) -> (f64, f64) {
        let geo = location.geodetic_rad();
        let (ref_lat, ref_lon) = (geo[0], geo[1]);

        let a_i = (position - location.ecef()).normalize();

        // ECEF to VEN 3X3 transform matrix
        let ecef_to_ven = Matrix3::new(
            ref_lat.cos() * ref_lon.cos(),
            ref_lat.cos() * ref_lon.sin(),
            ref_lat.sin(),
            -ref_lon.sin(),
            ref_lon.cos(),
            0.0_f64,
            -ref_lat.sin() * ref_lon.cos(),
            -ref_lat.sin() * ref_lon.sin(),
            ref_lat.cos(),
        );
        let ven = ecef_to_ven * a_i;
        let el = rad2deg(FRAC_PI_2 - ven[0].clamp(-1.0, 1.0).acos());
        let az = rad2deg(ven[1].atan2(ven[2]));
        (el, az)
    }
    /// Bisects a horizon crossing, `below` and `above` bracket the crossing
    /// in either chronological order. Returns the visible bound.
    fn crossing(
        &self,
        elements: &OrbitalElements,
        location: &ObserverLocation,
        mut below: Epoch,
        mut above: Epoch,
    ) -> Result<Epoch, Error> {
        while (above - below).abs().to_seconds() > CROSSING_RESOLUTION_S {
            let mid = below + (above - below).to_seconds() * 0.5 * Unit::Second;
            if self.observe(elements, location, mid)?.visible() {
                above = mid;
            } else {
                below = mid;
            }
        }
        Ok(above)
    }
}

impl Propagator for Sgp4Propagator {
    fn observe(
        &self,
        elements: &OrbitalElements,
        location: &ObserverLocation,
        t: Epoch,
    ) -> Result<Observation, Error> {
        let position = self.ecef(elements, t)?;
        let (elevation, azimuth) = Self::elevation_azimuth(position, location);
        trace!("{} @{} - az={} el={}", elements.name(), t, azimuth, elevation);
        Ok(Observation::new(t, azimuth, elevation))
    }

    fn predict_window(
        &self,
        elements: &OrbitalElements,
        location: &ObserverLocation,
        from: Epoch,
    ) -> Result<Vec<Observation>, Error> {
        let step = self.cfg.scan_step_s * Unit::Second;
        let horizon = self.cfg.horizon_days * Unit::Day;

        let rise = if self.observe(elements, location, from)?.visible() {
            // ongoing pass: walk back to its rise
            let mut t = from;
            loop {
                let prev = t - step;
                if from - prev > horizon {
                    return Err(Error::Predict(format!(
                        "{} never sets over this location",
                        elements.name()
                    )));
                }
                if !self.observe(elements, location, prev)?.visible() {
                    break self.crossing(elements, location, prev, t)?;
                }
                t = prev;
            }
        } else {
            let mut t = from;
            loop {
                let next = t + step;
                if next - from > horizon {
                    return Err(Error::Predict(format!(
                        "{}: no pass within {} days",
                        elements.name(),
                        self.cfg.horizon_days
                    )));
                }
                if self.observe(elements, location, next)?.visible() {
                    break self.crossing(elements, location, t, next)?;
                }
                t = next;
            }
        };

        let set = {
            let mut t = rise;
            loop {
                let next = t + step;
                if next - rise > horizon {
                    return Err(Error::Predict(format!(
                        "{} never sets over this location",
                        elements.name()
                    )));
                }
                if !self.observe(elements, location, next)?.visible() {
                    break self.crossing(elements, location, next, t)?;
                }
                t = next;
            }
        };

        debug!("{} - window [{}, {}]", elements.name(), rise, set);

        let sample_step = self.cfg.sample_step_s * Unit::Second;
        let mut samples = Vec::with_capacity(
            ((set - rise).to_seconds() / self.cfg.sample_step_s) as usize + 2,
        );
        let mut t = rise;
        while t < set {
            samples.push(self.observe(elements, location, t)?);
            t += sample_step;
        }
        samples.push(self.observe(elements, location, set)?);
        Ok(samples)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use map_3d::{deg2rad, ecef2geodetic, Ellipsoid};
    use std::str::FromStr;

    const ISS: &str = "ISS (ZARYA)
1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927
2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    fn tle_epoch() -> Epoch {
        Epoch::from_str("2008-09-20T12:25:40 UTC").unwrap()
    }

    #[test]
    fn look_angles_are_bounded() {
        let elements = OrbitalElements::from_str(ISS).unwrap();
        let boulder = ObserverLocation::from_east_longitude(40.015, -105.27, 1624.0);
        let propagator = Sgp4Propagator::default();
        for minutes in [0.0_f64, 10.0, 90.0, 600.0, 1440.0] {
            let t = tle_epoch() + minutes * Unit::Minute;
            let obs = propagator.observe(&elements, &boulder, t).unwrap();
            assert!((0.0..360.0).contains(&obs.azimuth_deg), "az {}", obs.azimuth_deg);
            assert!(
                (-90.0..=90.0).contains(&obs.elevation_deg),
                "el {}",
                obs.elevation_deg
            );
            assert_eq!(obs.epoch, t);
        }
    }

    #[test]
    fn zenith_below_satellite() {
        let elements = OrbitalElements::from_str(ISS).unwrap();
        let propagator = Sgp4Propagator::default();
        let t = tle_epoch() + 30.0 * Unit::Minute;
        let ecef = propagator.ecef(&elements, t).unwrap();
        let (lat, lon, _) = ecef2geodetic(ecef[0], ecef[1], ecef[2], Ellipsoid::WGS84);
        let below = ObserverLocation::from_east_longitude(rad2deg(lat), rad2deg(lon), 0.0);
        let obs = propagator.observe(&elements, &below, t).unwrap();
        assert!(obs.elevation_deg > 85.0, "el {}", obs.elevation_deg);

        let antipode = ObserverLocation::from_east_longitude(
            -rad2deg(lat),
            rad2deg(lon + deg2rad(180.0)),
            0.0,
        );
        let obs = propagator.observe(&elements, &antipode, t).unwrap();
        assert!(obs.elevation_deg < -85.0, "el {}", obs.elevation_deg);
    }

    #[test]
    fn window_brackets_one_pass() {
        let elements = OrbitalElements::from_str(ISS).unwrap();
        let boulder = ObserverLocation::from_east_longitude(40.015, -105.27, 1624.0);
        let propagator = Sgp4Propagator::default();
        let window = propagator
            .predict_window(&elements, &boulder, tle_epoch())
            .unwrap();
        assert!(window.len() > 2);
        let (first, last) = (window[0], window[window.len() - 1]);
        assert!(last.epoch > first.epoch);
        assert!((last.epoch - first.epoch).to_seconds() < 1200.0);
        for pair in window.windows(2) {
            assert!(pair[1].epoch > pair[0].epoch);
        }
        for obs in &window {
            assert!(obs.elevation_deg > -0.1, "el {} @{}", obs.elevation_deg, obs.epoch);
        }
        // just before rise / after set, the satellite is below the horizon
        let before = propagator
            .observe(&elements, &boulder, first.epoch - 2.0 * Unit::Second)
            .unwrap();
        let after = propagator
            .observe(&elements, &boulder, last.epoch + 2.0 * Unit::Second)
            .unwrap();
        assert!(!before.visible());
        assert!(!after.visible());
    }

    #[test]
    fn ongoing_pass_starts_at_rise() {
        let elements = OrbitalElements::from_str(ISS).unwrap();
        let boulder = ObserverLocation::from_east_longitude(40.015, -105.27, 1624.0);
        let propagator = Sgp4Propagator::default();
        let window = propagator
            .predict_window(&elements, &boulder, tle_epoch())
            .unwrap();
        let rise = window[0].epoch;
        let middle = window[window.len() / 2].epoch;
        let ongoing = propagator
            .predict_window(&elements, &boulder, middle)
            .unwrap();
        assert!((ongoing[0].epoch - rise).abs().to_seconds() < 1.0);
    }

    #[test]
    fn invalid_elements() {
        let elements = OrbitalElements::from_str(
            "BROKEN\n1 garbage line that is not a tle\n2 neither is this one",
        )
        .unwrap();
        let boulder = ObserverLocation::from_east_longitude(40.015, -105.27, 1624.0);
        let propagator = Sgp4Propagator::default();
        assert!(matches!(
            propagator.observe(&elements, &boulder, tle_epoch()),
            Err(Error::Predict(_))
        ));
    }
}
