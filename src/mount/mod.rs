//! Two axis (azimuth, elevation) mount
use crate::error::RangeError;

pub mod link;
pub mod protocol;
pub mod sim;

/// Default pulse resolution (pulses per degree)
pub const DEFAULT_PULSE_RESOLUTION: u8 = 10;

/// Mount space pointing. Unlike sky look angles, azimuth may be
/// negative or exceed 360° and elevation may exceed 90° (flipped over).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pointing {
    /// Azimuth [deg]
    pub azimuth_deg: f64,
    /// Elevation [deg]
    pub elevation_deg: f64,
}

impl Pointing {
    pub fn new(azimuth_deg: f64, elevation_deg: f64) -> Self {
        Self {
            azimuth_deg,
            elevation_deg,
        }
    }
    /// Squared angular distance, in (az, el) space [deg²]
    pub fn distance_sq(&self, rhs: &Self) -> f64 {
        (self.azimuth_deg - rhs.azimuth_deg).powi(2)
            + (self.elevation_deg - rhs.elevation_deg).powi(2)
    }
    /// Angular distance, in (az, el) space [deg]
    pub fn distance(&self, rhs: &Self) -> f64 {
        self.distance_sq(rhs).sqrt()
    }
}

impl std::fmt::Display for Pointing {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "az={:.2}° el={:.2}°", self.azimuth_deg, self.elevation_deg)
    }
}

/// Mechanical range of the mount
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountLimits {
    /// (min, max) azimuth [deg]
    pub azimuth: (f64, f64),
    /// (min, max) elevation [deg]
    pub elevation: (f64, f64),
}

impl Default for MountLimits {
    fn default() -> Self {
        Self {
            azimuth: (-360.0, 360.0),
            elevation: (0.0, 180.0),
        }
    }
}

impl MountLimits {
    pub fn new(azimuth: (f64, f64), elevation: (f64, f64)) -> Self {
        Self { azimuth, elevation }
    }
    /// True if this pointing is drivable
    pub fn contains(&self, pointing: &Pointing) -> bool {
        (self.azimuth.0..=self.azimuth.1).contains(&pointing.azimuth_deg)
            && (self.elevation.0..=self.elevation.1).contains(&pointing.elevation_deg)
    }
    /// Returns [RangeError] if this pointing is not drivable
    pub fn check(&self, pointing: &Pointing) -> Result<(), RangeError> {
        let (min, max) = self.azimuth;
        if !(min..=max).contains(&pointing.azimuth_deg) {
            return Err(RangeError::Azimuth {
                value: pointing.azimuth_deg,
                min,
                max,
            });
        }
        let (min, max) = self.elevation;
        if !(min..=max).contains(&pointing.elevation_deg) {
            return Err(RangeError::Elevation {
                value: pointing.elevation_deg,
                min,
                max,
            });
        }
        Ok(())
    }
    /// Saturates each axis into the mount range
    pub fn clamp(&self, pointing: Pointing) -> Pointing {
        Pointing::new(
            pointing.azimuth_deg.clamp(self.azimuth.0, self.azimuth.1),
            self.clamp_elevation(pointing.elevation_deg),
        )
    }
    /// Saturates elevation into the mount range
    pub fn clamp_elevation(&self, elevation_deg: f64) -> f64 {
        elevation_deg.clamp(self.elevation.0, self.elevation.1)
    }
    /// Brings azimuth into range by whole turns. When the range
    /// spans less than a turn, the wrapped value is then saturated.
    pub fn wrap_azimuth(&self, azimuth_deg: f64) -> f64 {
        let (min, max) = self.azimuth;
        if max - min >= 360.0 {
            if azimuth_deg > max {
                azimuth_deg - 360.0 * ((azimuth_deg - max) / 360.0).ceil()
            } else if azimuth_deg < min {
                azimuth_deg + 360.0 * ((min - azimuth_deg) / 360.0).ceil()
            } else {
                azimuth_deg
            }
        } else {
            (min + (azimuth_deg - min).rem_euclid(360.0)).min(max)
        }
    }
}

/// Mount status, as known by the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountState {
    /// Last position reported by the mount
    pub current: Pointing,
    /// Last commanded position
    pub motor: Pointing,
    /// Pulses per degree, as last reported by the mount
    pub pulse_resolution: u8,
    /// Mechanical range
    pub limits: MountLimits,
    /// True while the serial link is up
    pub connected: bool,
}

impl MountState {
    pub fn new(limits: MountLimits, pulse_resolution: u8) -> Self {
        Self {
            current: Pointing::default(),
            motor: Pointing::default(),
            pulse_resolution,
            limits,
            connected: false,
        }
    }
    /// Updates Self from a mount report
    pub(crate) fn apply_reading(&mut self, reading: &protocol::Reading) {
        self.current = reading.pointing;
        self.pulse_resolution = reading.pulse;
    }
    /// Records a new target. Commanding a connected mount outside
    /// of its range is a programming error.
    pub(crate) fn command(&mut self, target: Pointing) {
        assert!(
            !self.connected || self.limits.contains(&target),
            "commanding {} outside of mount limits {:?}",
            target,
            self.limits
        );
        self.motor = target;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(930.0, 210.0)]
    #[case(-400.0, -40.0)]
    #[case(360.0, 360.0)]
    #[case(-360.0, -360.0)]
    #[case(725.0, 5.0)]
    #[case(123.4, 123.4)]
    fn full_range_wrapping(#[case] azimuth: f64, #[case] expected: f64) {
        let limits = MountLimits::default();
        let wrapped = limits.wrap_azimuth(azimuth);
        assert!((wrapped - expected).abs() < 1.0E-9, "{} -> {}", azimuth, wrapped);
    }

    #[rstest]
    #[case(-90.0, 270.0)]
    #[case(400.0, 40.0)]
    #[case(300.0, 300.0)]
    #[case(350.0, 300.0)]
    fn narrow_range_wrapping(#[case] azimuth: f64, #[case] expected: f64) {
        let limits = MountLimits::new((0.0, 300.0), (0.0, 90.0));
        assert_eq!(limits.wrap_azimuth(azimuth), expected);
    }

    #[test]
    fn clamping() {
        let limits = MountLimits::default();
        assert_eq!(limits.clamp_elevation(200.0), 180.0);
        assert_eq!(limits.clamp_elevation(-40.0), 0.0);
        assert_eq!(
            limits.clamp(Pointing::new(-500.0, 45.0)),
            Pointing::new(-360.0, 45.0)
        );
    }

    #[test]
    fn range_check() {
        let limits = MountLimits::default();
        assert!(limits.check(&Pointing::new(-360.0, 180.0)).is_ok());
        assert!(matches!(
            limits.check(&Pointing::new(361.0, 10.0)),
            Err(RangeError::Azimuth { .. })
        ));
        assert!(matches!(
            limits.check(&Pointing::new(10.0, -0.1)),
            Err(RangeError::Elevation { .. })
        ));
    }

    #[test]
    fn distance() {
        let a = Pointing::new(0.0, 0.0);
        let b = Pointing::new(3.0, 4.0);
        assert_eq!(a.distance_sq(&b), 25.0);
        assert_eq!(a.distance(&b), 5.0);
    }

    #[test]
    #[should_panic]
    fn connected_mount_out_of_range() {
        let mut state = MountState::new(MountLimits::default(), DEFAULT_PULSE_RESOLUTION);
        state.connected = true;
        state.command(Pointing::new(0.0, -10.0));
    }

    #[test]
    fn disconnected_mount_records_target() {
        let mut state = MountState::new(MountLimits::default(), DEFAULT_PULSE_RESOLUTION);
        state.command(Pointing::new(12.0, 34.0));
        assert_eq!(state.motor, Pointing::new(12.0, 34.0));
        assert_eq!(state.current, Pointing::default());
    }
}
