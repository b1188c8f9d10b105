//! Simulated motor controller, speaking the wire protocol
use std::{collections::VecDeque, sync::Arc};

use log::debug;
use parking_lot::Mutex;

use crate::{
    error::CommunicationError,
    mount::{
        link::MotorLink,
        protocol::{decode_set, encode_response, Command, Opcode, Reading, Response},
        Pointing,
    },
};

#[derive(Debug, Default)]
struct Inner {
    position: Pointing,
    pulse: u8,
    pending: VecDeque<Response>,
    frames: Vec<Command>,
    pulse_mismatch: bool,
    unplugged: bool,
}

/// Mount that reaches any SET target instantly. Clones share
/// the same mount, so one may be handed to the link worker while
/// another one is inspected.
#[derive(Debug, Clone)]
pub struct SimulatedMount {
    inner: Arc<Mutex<Inner>>,
}

impl SimulatedMount {
    /// Mount parked at (0°, 0°), with given pulse resolution
    pub fn new(pulse: u8) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pulse,
                ..Default::default()
            })),
        }
    }
    /// Current mount position
    pub fn position(&self) -> Pointing {
        self.inner.lock().position
    }
    /// Every frame received so far
    pub fn frames(&self) -> Vec<Command> {
        self.inner.lock().frames.clone()
    }
    /// Targets of every SET received so far
    pub fn targets(&self) -> Vec<Pointing> {
        self.inner
            .lock()
            .frames
            .iter()
            .filter_map(|frame| decode_set(frame).map(|(target, _)| target))
            .collect()
    }
    /// When enabled, responses carry inconsistent pulse bytes
    pub fn set_pulse_mismatch(&self, enabled: bool) {
        self.inner.lock().pulse_mismatch = enabled;
    }
    /// Any further exchange fails
    pub fn unplug(&self) {
        self.inner.lock().unplugged = true;
    }
}

impl MotorLink for SimulatedMount {
    fn send(&mut self, frame: &Command) -> Result<(), CommunicationError> {
        let mut inner = self.inner.lock();
        if inner.unplugged {
            return Err(CommunicationError::Io("simulated mount unplugged".to_string()));
        }
        inner.frames.push(*frame);
        match Opcode::try_from(frame[11]) {
            Ok(Opcode::Set) => {
                if let Some((target, _)) = decode_set(frame) {
                    debug!("simulated mount moving to {}", target);
                    inner.position = target;
                }
            },
            Ok(Opcode::Status) | Ok(Opcode::Stop) => {
                let reading = Reading {
                    pointing: inner.position,
                    pulse: inner.pulse,
                };
                let mut response = encode_response(frame[0], &reading);
                if inner.pulse_mismatch {
                    response[10] = response[10].wrapping_add(1);
                }
                inner.pending.push_back(response);
            },
            Err(opcode) => debug!("simulated mount ignoring opcode {:02x}", opcode),
        }
        Ok(())
    }
    fn receive(&mut self) -> Result<Response, CommunicationError> {
        let mut inner = self.inner.lock();
        if inner.unplugged {
            return Err(CommunicationError::Io("simulated mount unplugged".to_string()));
        }
        inner.pending.pop_front().ok_or(CommunicationError::Timeout)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mount::{
        protocol::{decode_response, encode_query, encode_set, Query},
        MountLimits,
    };

    #[test]
    fn set_then_status() {
        let mut mount = SimulatedMount::new(10);
        let frame = encode_set(Pointing::new(-40.0, 120.0), 10, &MountLimits::default()).unwrap();
        mount.send(&frame).unwrap();
        assert_eq!(mount.receive(), Err(CommunicationError::Timeout));

        mount.send(&encode_query(Query::Status)).unwrap();
        let reading = decode_response(&mount.receive().unwrap()).unwrap();
        assert!((reading.pointing.azimuth_deg + 40.0).abs() < 1.0E-9);
        assert!((reading.pointing.elevation_deg - 120.0).abs() < 1.0E-9);
        assert_eq!(mount.targets(), vec![Pointing::new(-40.0, 120.0)]);
    }

    #[test]
    fn unplugged() {
        let mut mount = SimulatedMount::new(10);
        mount.clone().unplug();
        assert!(mount.send(&encode_query(Query::Stop)).is_err());
        assert!(mount.frames().is_empty());
    }
}
