#![doc = include_str!("../README.md")]
#![cfg_attr(docrs, feature(doc_cfg))]

// private modules
mod error;

pub mod cfg;
pub mod elements;
pub mod location;
pub mod mount;
pub mod observation;
pub mod orbit;
pub mod tracking;
pub mod transit;

// pub export
pub use error::{CommunicationError, Error, ParseError, RangeError};

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::cfg::{
        Config, LeadCompensation, LinkConfig, MountConfig, PredictionConfig, TrackingConfig,
    };
    pub use crate::elements::OrbitalElements;
    pub use crate::error::{CommunicationError, Error, ParseError, RangeError};
    pub use crate::location::ObserverLocation;
    pub use crate::mount::{
        link::{MotorHandle, MotorLink, StreamLink},
        protocol::{Query, Reading},
        sim::SimulatedMount,
        MountLimits, MountState, Pointing,
    };
    pub use crate::observation::{Observation, Propagator};
    pub use crate::orbit::Sgp4Propagator;
    pub use crate::tracking::{
        Axis, Clock, Direction, TrackingController, TrackingEvent, TrackingMode,
    };
    pub use crate::transit::{
        finder::{transits, TransitFinder},
        report::{upcoming, PassSummary},
        Transit,
    };
    // re-export
    pub use hifitime::{Duration, Epoch, TimeScale, Unit};
}
