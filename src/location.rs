use std::{path::Path, str::FromStr};

use map_3d::{deg2rad, geodetic2ecef, Ellipsoid};
use nalgebra::Vector3;

use crate::error::{Error, ParseError};

/// Ground station location.
/// Longitude is stored West-positive, the convention of the
/// station files and of the historical predict tools.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObserverLocation {
    /// Latitude, North positive [ddeg]
    pub latitude_deg: f64,
    /// Longitude, West positive [ddeg]
    pub longitude_deg: f64,
    /// Altitude above sea level [m]
    pub altitude_m: f64,
}

impl ObserverLocation {
    /// Builds Self from West-positive longitude
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            altitude_m,
        }
    }
    /// Builds Self from the usual East-positive longitude
    pub fn from_east_longitude(latitude_deg: f64, east_longitude_deg: f64, altitude_m: f64) -> Self {
        Self::new(latitude_deg, -east_longitude_deg, altitude_m)
    }
    /// Returns longitude, East positive [ddeg]
    pub fn east_longitude_deg(&self) -> f64 {
        -self.longitude_deg
    }
    /// Returns Geodetic coordinates (latitude [rad], East longitude [rad], altitude [m])
    pub fn geodetic_rad(&self) -> Vector3<f64> {
        Vector3::new(
            deg2rad(self.latitude_deg),
            deg2rad(self.east_longitude_deg()),
            self.altitude_m,
        )
    }
    /// Returns coordinates in ECEF [m]
    pub fn ecef(&self) -> Vector3<f64> {
        let geo = self.geodetic_rad();
        let (x, y, z) = geodetic2ecef(geo[0], geo[1], geo[2], Ellipsoid::WGS84);
        Vector3::new(x, y, z)
    }
    /// Loads Self from a .qth file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<(String, Self), Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ParseError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self::parse_qth(&content)?)
    }
    /// Parses a QTH record: station name followed by latitude, longitude and
    /// altitude lines. The file longitude sign is flipped on load.
    pub fn parse_qth(content: &str) -> Result<(String, Self), ParseError> {
        let lines = content
            .trim()
            .lines()
            .map(|l| l.trim())
            .collect::<Vec<_>>();
        if lines.len() != 4 {
            return Err(ParseError::QthLineCount(lines.len().saturating_sub(1)));
        }
        let name = lines[0].to_string();
        let latitude = parse_field("latitude", lines[1])?;
        let longitude = parse_field("longitude", lines[2])?;
        let altitude = parse_field("altitude", lines[3])?;
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ParseError::OutOfRange {
                field: "latitude",
                value: latitude,
            });
        }
        if !(-360.0..=360.0).contains(&longitude) {
            return Err(ParseError::OutOfRange {
                field: "longitude",
                value: longitude,
            });
        }
        Ok((name, Self::new(latitude, -longitude, altitude)))
    }
}

impl FromStr for ObserverLocation {
    type Err = ParseError;
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        Self::parse_qth(content).map(|(_, loc)| loc)
    }
}

fn parse_field(field: &'static str, value: &str) -> Result<f64, ParseError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}
