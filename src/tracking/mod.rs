//! Mount tracking controller
use std::sync::Arc;

use hifitime::{Epoch, Unit};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{interval, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::{Config, MountConfig, TrackingConfig},
    elements::OrbitalElements,
    error::{CommunicationError, Error, RangeError},
    location::ObserverLocation,
    mount::{
        link::{MotorHandle, MotorLink},
        protocol::{encode_set, Query, Reading},
        MountState, Pointing,
    },
    observation::Propagator,
};

pub mod program;

use program::ProgramTracker;

/// Capacity of the event channel
const EVENT_CAPACITY: usize = 256;

/// Who drives the mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingMode {
    /// Operator commands
    #[default]
    Manual,
    /// Follows the satellite
    Program,
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "Manual"),
            Self::Program => write!(f, "Program"),
        }
    }
}

/// Mount axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Azimuth,
    Elevation,
}

/// Nudge direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

/// Notifications published by the [TrackingController]
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingEvent {
    /// A SET was queued to the mount
    Commanded {
        at: Instant,
        mode: TrackingMode,
        target: Pointing,
    },
    /// The mount answered a STATUS or STOP
    Reported(Reading),
    /// The link is gone. `reason` is None when closed on request.
    Disconnected { reason: Option<CommunicationError> },
}

/// Maps the runtime clock to [Epoch]s
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Epoch,
    instant: Instant,
}

impl Clock {
    /// Clock following the system time
    pub fn system() -> Result<Self, Error> {
        let epoch = Epoch::now().map_err(|e| Error::Clock(e.to_string()))?;
        Ok(Self::starting_at(epoch))
    }
    /// Clock that reads `epoch` now, then runs with the runtime clock
    pub fn starting_at(epoch: Epoch) -> Self {
        Self {
            epoch,
            instant: Instant::now(),
        }
    }
    pub fn now(&self) -> Epoch {
        self.epoch + self.instant.elapsed().as_secs_f64() * Unit::Second
    }
}

struct Shared {
    state: RwLock<MountState>,
    mode: RwLock<TrackingMode>,
    link: RwLock<Option<MotorHandle>>,
    events: broadcast::Sender<TrackingEvent>,
}

impl Shared {
    fn publish(&self, event: TrackingEvent) {
        // no subscriber is fine
        let _ = self.events.send(event);
    }
    /// Drops the link, if any
    fn disconnected(&self, reason: Option<CommunicationError>) {
        let handle = self.link.write().take();
        self.state.write().connected = false;
        if let Some(handle) = handle {
            handle.close();
            match &reason {
                Some(e) => error!("mount disconnected: {}", e),
                None => info!("mount disconnected"),
            }
            self.publish(TrackingEvent::Disconnected { reason });
        }
    }
    /// Records `target` and sends it to the mount, when connected
    fn command(&self, target: Pointing, mode: TrackingMode) -> Result<(), Error> {
        let handle = self.link.read().clone();
        if let Some(handle) = &handle {
            if handle.is_closed() {
                self.disconnected(Some(CommunicationError::LinkClosed));
            }
        }
        let frame = {
            let mut state = self.state.write();
            let frame = if state.connected {
                Some(encode_set(target, state.pulse_resolution, &state.limits)?)
            } else {
                None
            };
            state.command(target);
            frame
        };
        match (handle, frame) {
            (Some(handle), Some(frame)) => {
                if let Err(e) = handle.set(frame) {
                    self.disconnected(Some(e.clone()));
                    return Err(e.into());
                }
                debug!("{} - SET {}", mode, target);
                self.publish(TrackingEvent::Commanded {
                    at: Instant::now(),
                    mode,
                    target,
                });
            },
            _ => debug!("{} - mount offline, target {}", mode, target),
        }
        Ok(())
    }
    async fn query(&self, query: Query) -> Result<Reading, Error> {
        let handle = self
            .link
            .read()
            .clone()
            .ok_or(CommunicationError::LinkClosed)?;
        match handle.query(query).await {
            Ok(reading) => {
                self.state.write().apply_reading(&reading);
                debug!("{} - mount @{} pulse={}", query, reading.pointing, reading.pulse);
                self.publish(TrackingEvent::Reported(reading));
                Ok(reading)
            },
            Err(e) => {
                self.disconnected(Some(e.clone()));
                Err(e.into())
            },
        }
    }
}

struct ProgramTask {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives the mount, either from operator commands ([TrackingMode::Manual])
/// or by following the satellite ([TrackingMode::Program]).
/// Must be used within a tokio runtime.
pub struct TrackingController<P> {
    source: Arc<P>,
    elements: Arc<OrbitalElements>,
    location: ObserverLocation,
    mount_cfg: MountConfig,
    cfg: TrackingConfig,
    clock: Clock,
    shared: Arc<Shared>,
    program: Option<ProgramTask>,
}

impl<P: Propagator + Send + Sync + 'static> TrackingController<P> {
    /// Builds a new [TrackingController] in [TrackingMode::Manual],
    /// following the system time.
    pub fn new(
        source: Arc<P>,
        elements: Arc<OrbitalElements>,
        location: ObserverLocation,
        cfg: &Config,
    ) -> Result<Self, Error> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = MountState::new(cfg.mount.limits(), cfg.mount.pulse_resolution);
        Ok(Self {
            source,
            elements,
            location,
            mount_cfg: cfg.mount.clone(),
            cfg: cfg.tracking.clone(),
            clock: Clock::system()?,
            shared: Arc::new(Shared {
                state: RwLock::new(state),
                mode: RwLock::new(TrackingMode::Manual),
                link: RwLock::new(None),
                events,
            }),
            program: None,
        })
    }
    /// Replaces the time reference
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
    /// Active mode
    pub fn mode(&self) -> TrackingMode {
        *self.shared.mode.read()
    }
    /// Mount status snapshot
    pub fn mount(&self) -> MountState {
        *self.shared.state.read()
    }
    /// Current [Epoch], as seen by the controller
    pub fn now(&self) -> Epoch {
        self.clock.now()
    }
    /// Subscribes to [TrackingEvent]s
    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.shared.events.subscribe()
    }
    /// Hands `link` over to a worker and reads the mount status.
    /// A previous link is closed first.
    pub async fn connect<L: MotorLink + 'static>(&mut self, link: L) -> Result<Reading, Error> {
        self.disconnect();
        let handle = MotorHandle::spawn(link, self.cfg.queue_depth)?;
        *self.shared.link.write() = Some(handle);
        self.shared.state.write().connected = true;
        info!("mount connected");
        self.shared.query(Query::Status).await
    }
    /// Closes the link
    pub fn disconnect(&mut self) {
        self.shared.disconnected(None);
    }
    /// Reads the mount position
    pub async fn status(&self) -> Result<Reading, Error> {
        self.shared.query(Query::Status).await
    }
    /// Halts the mount, returns where it stopped
    pub async fn stop(&self) -> Result<Reading, Error> {
        self.shared.query(Query::Stop).await
    }
    fn manual(&self) -> Result<(), Error> {
        match self.mode() {
            TrackingMode::Manual => Ok(()),
            mode => Err(Error::WrongMode(mode)),
        }
    }
    /// Points the mount at (azimuth, elevation). Azimuth is brought into
    /// range by whole turns, elevation is saturated. Non finite angles
    /// are rejected.
    /// Returns the commanded position.
    pub fn set_target(&self, azimuth_deg: f64, elevation_deg: f64) -> Result<Pointing, Error> {
        self.manual()?;
        if !azimuth_deg.is_finite() {
            return Err(RangeError::NotFinite {
                axis: "azimuth",
                value: azimuth_deg,
            }
            .into());
        }
        if !elevation_deg.is_finite() {
            return Err(RangeError::NotFinite {
                axis: "elevation",
                value: elevation_deg,
            }
            .into());
        }
        let limits = self.shared.state.read().limits;
        let target = Pointing::new(
            limits.wrap_azimuth(azimuth_deg),
            limits.clamp_elevation(elevation_deg),
        );
        self.shared.command(target, TrackingMode::Manual)?;
        Ok(target)
    }
    /// Moves one axis by one step. Elevation saturates, azimuth
    /// wraps around by one turn past the limits.
    /// Returns the commanded position.
    pub fn nudge(&self, axis: Axis, direction: Direction) -> Result<Pointing, Error> {
        self.manual()?;
        let (motor, limits) = {
            let state = self.shared.state.read();
            (state.motor, state.limits)
        };
        let step = self.mount_cfg.step_deg;
        let (min_az, max_az) = limits.azimuth;
        let (min_el, max_el) = limits.elevation;
        let mut target = motor;
        match (axis, direction) {
            (Axis::Elevation, Direction::Increase) => {
                target.elevation_deg = (motor.elevation_deg + step).min(max_el);
            },
            (Axis::Elevation, Direction::Decrease) => {
                target.elevation_deg = (motor.elevation_deg - step).max(min_el);
            },
            (Axis::Azimuth, Direction::Increase) => {
                let az = motor.azimuth_deg + step;
                target.azimuth_deg = if az >= max_az { az - 360.0 } else { az };
            },
            (Axis::Azimuth, Direction::Decrease) => {
                let az = motor.azimuth_deg - step;
                target.azimuth_deg = if az < min_az { az + 360.0 } else { az };
            },
        }
        let target = limits.clamp(target);
        self.shared.command(target, TrackingMode::Manual)?;
        Ok(target)
    }
    /// Starts following the satellite
    pub fn go_program(&mut self) {
        if self.program.is_some() {
            return;
        }
        *self.shared.mode.write() = TrackingMode::Program;
        let token = CancellationToken::new();
        let task = tokio::spawn(program_track(
            self.shared.clone(),
            self.source.clone(),
            self.elements.clone(),
            self.location,
            self.cfg.clone(),
            self.clock,
            token.clone(),
        ));
        info!("{} - program track", self.elements.name());
        self.program = Some(ProgramTask { token, task });
    }
    /// Stops following the satellite (waiting for the poll loop to exit),
    /// then sends the mount home. Returns the home position.
    pub async fn go_manual(&mut self) -> Result<Pointing, Error> {
        if let Some(ProgramTask { token, task }) = self.program.take() {
            token.cancel();
            if let Err(e) = task.await {
                warn!("program track task: {}", e);
            }
        }
        *self.shared.mode.write() = TrackingMode::Manual;
        info!("manual track");
        let (az, el) = self.cfg.home;
        let home = self.shared.state.read().limits.clamp(Pointing::new(az, el));
        self.shared.command(home, TrackingMode::Manual)?;
        Ok(home)
    }
}

impl<P> Drop for TrackingController<P> {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            program.token.cancel();
        }
        if let Some(handle) = self.shared.link.write().take() {
            handle.close();
        }
    }
}

/// Program track loop: one observation, at most one SET, per tick.
async fn program_track<P: Propagator>(
    shared: Arc<Shared>,
    source: Arc<P>,
    elements: Arc<OrbitalElements>,
    location: ObserverLocation,
    cfg: TrackingConfig,
    clock: Clock,
    token: CancellationToken,
) {
    let mut tracker = ProgramTracker::new(cfg.deadband_deg, cfg.lead);
    let mut ticker = interval(cfg.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {},
        }
        let t = clock.now();
        let observation = match source.observe(&elements, &location, t) {
            Ok(observation) => observation,
            Err(e) => {
                error!("{} @{} - {}", elements.name(), t, e);
                continue;
            },
        };
        let (last, limits) = {
            let state = shared.state.read();
            (state.motor, state.limits)
        };
        if let Some(target) = tracker.step(&observation, last, &limits) {
            if let Err(e) = shared.command(target, TrackingMode::Program) {
                error!("{} @{} - {}", elements.name(), t, e);
            }
        }
    }
    debug!("{} - program track stopped", elements.name());
}
