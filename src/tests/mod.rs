
use std::{str::FromStr, sync::Arc};

use hifitime::{Epoch, Unit};

use crate::{
    cfg::Config,
    elements::OrbitalElements,
    error::{CommunicationError, Error},
    location::ObserverLocation,
    mount::{sim::SimulatedMount, Pointing, DEFAULT_PULSE_RESOLUTION},
    orbit::Sgp4Propagator,
    tracking::{Clock, TrackingController, TrackingEvent, TrackingMode},
    transit::finder::transits,
};

use sky::LinearSky;

const ISS: &str = "ISS (ZARYA)
1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927
2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

fn t0() -> Epoch {
    Epoch::from_str("2024-03-01T00:00:00 UTC").unwrap()
}

fn controller(sky: LinearSky) -> TrackingController<LinearSky> {
    TrackingController::new(
        Arc::new(sky),
        Arc::new(sky::SyntheticSky::elements()),
        ObserverLocation::default(),
        &Config::default(),
    )
    .unwrap()
    .with_clock(Clock::starting_at(sky.origin))
}

#[test]
fn iss_consecutive_passes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let elements = OrbitalElements::from_str(ISS).unwrap();
    let boulder = ObserverLocation::from_east_longitude(40.015, -105.27, 1624.0);
    let propagator = Sgp4Propagator::default();
    let tle_epoch = Epoch::from_str("2008-09-20T12:25:40 UTC").unwrap();

    let passes = transits(&propagator, &elements, boulder, tle_epoch)
        .take(3)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(passes.len(), 3);

    for pair in passes.windows(2) {
        assert!(pair[0].end < pair[1].start, "overlapping passes");
    }
    for pass in &passes {
        assert!(pass.end > tle_epoch);
        assert!(pass.duration().to_seconds() > 0.0);
        assert!(pass.duration() < 20.0 * Unit::Minute);

        let peak = pass.peak().unwrap();
        assert!(
            (0.0..=90.0).contains(&peak.elevation_deg),
            "peak {}",
            peak.elevation_deg
        );
        assert!(pass.start <= peak.epoch && peak.epoch <= pass.end);
        for t in [pass.start, pass.end] {
            let obs = pass.at(t).unwrap();
            assert!(obs.elevation_deg <= peak.elevation_deg);
        }

        let above = pass.above(peak.elevation_deg / 2.0).unwrap();
        assert!(above.start >= pass.start && above.end <= pass.end);
        assert!(above.duration() <= pass.duration());
    }
}

#[tokio::test]
async fn manual_clamping_reaches_the_mount() {
    let mut controller = controller(LinearSky::fixed(t0(), 0.0, 0.0));
    let mount = SimulatedMount::new(DEFAULT_PULSE_RESOLUTION);
    controller.connect(mount.clone()).await.unwrap();

    assert_eq!(
        controller.set_target(930.0, 200.0).unwrap(),
        Pointing::new(210.0, 180.0)
    );
    assert_eq!(
        controller.set_target(-400.0, -40.0).unwrap(),
        Pointing::new(-40.0, 0.0)
    );
    // queries are served after pending SETs
    let reading = controller.status().await.unwrap();
    assert_eq!(reading.pointing, Pointing::new(-40.0, 0.0));
    assert_eq!(
        mount.targets(),
        vec![Pointing::new(210.0, 180.0), Pointing::new(-40.0, 0.0)]
    );
}

#[tokio::test]
async fn pulse_mismatch_leaves_state_untouched() {
    let mut controller = controller(LinearSky::fixed(t0(), 0.0, 0.0));
    let mount = SimulatedMount::new(DEFAULT_PULSE_RESOLUTION);
    controller.connect(mount.clone()).await.unwrap();
    controller.set_target(45.0, 30.0).unwrap();
    controller.status().await.unwrap();
    let before = controller.mount();

    mount.set_pulse_mismatch(true);
    assert_eq!(
        controller.status().await,
        Err(Error::Communication(CommunicationError::PulseMismatch {
            horizontal: DEFAULT_PULSE_RESOLUTION,
            vertical: DEFAULT_PULSE_RESOLUTION + 1,
        }))
    );
    let after = controller.mount();
    assert_eq!(after.current, before.current);
    assert_eq!(after.motor, before.motor);
    assert_eq!(after.pulse_resolution, before.pulse_resolution);
    assert!(!after.connected);
}

#[tokio::test(start_paused = true)]
async fn program_track_rate_limit() {
    let sky = LinearSky {
        origin: t0(),
        azimuth_deg: 100.0,
        elevation_deg: 30.0,
        azimuth_rate: 10.0,
        elevation_rate: 0.0,
    };
    let poll_interval = Config::default().tracking.poll_interval();
    let mut controller = controller(sky);
    let mount = SimulatedMount::new(DEFAULT_PULSE_RESOLUTION);
    controller.connect(mount.clone()).await.unwrap();

    let mut events = controller.subscribe();
    controller.go_program();

    let mut commands = Vec::new();
    while commands.len() < 10 {
        if let TrackingEvent::Commanded { at, mode, target } = events.recv().await.unwrap() {
            assert_eq!(mode, TrackingMode::Program);
            commands.push((at, target));
        }
    }
    controller.go_manual().await.unwrap();

    for pair in commands.windows(2) {
        let (dt, (previous, next)) = (pair[1].0 - pair[0].0, (pair[0].1, pair[1].1));
        assert!(dt >= poll_interval, "SETs {:?} apart", dt);
        assert!(next.azimuth_deg > previous.azimuth_deg);
    }
    let first = commands[0].1;
    assert!((first.azimuth_deg - 100.0).abs() < 1.0E-6);
    assert!((first.elevation_deg - 30.0).abs() < 1.0E-6);
}

#[tokio::test(start_paused = true)]
async fn program_to_manual_goes_home() {
    let mut controller = controller(LinearSky::fixed(t0(), 250.0, 60.0));
    let mount = SimulatedMount::new(DEFAULT_PULSE_RESOLUTION);
    controller.connect(mount.clone()).await.unwrap();

    let mut events = controller.subscribe();
    controller.go_program();
    loop {
        if let TrackingEvent::Commanded { target, .. } = events.recv().await.unwrap() {
            // closest encoding of (250°, 60°) from (0°, 0°)
            assert_eq!(target, Pointing::new(-110.0, 60.0));
            break;
        }
    }
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    // still satellite: no more SET
    controller.status().await.unwrap();
    assert_eq!(mount.targets().len(), 1);

    let home = controller.go_manual().await.unwrap();
    assert_eq!(home, Pointing::new(0.0, 0.0));
    assert_eq!(controller.mode(), TrackingMode::Manual);
    let reading = controller.status().await.unwrap();
    assert_eq!(reading.pointing, home);
    assert_eq!(mount.targets().last(), Some(&home));
}

#[tokio::test(start_paused = true)]
async fn program_track_stops_writing_once_disconnected() {
    let sky = LinearSky {
        origin: t0(),
        azimuth_deg: 10.0,
        elevation_deg: 10.0,
        azimuth_rate: 5.0,
        elevation_rate: 0.0,
    };
    let mut controller = controller(sky);
    let mount = SimulatedMount::new(DEFAULT_PULSE_RESOLUTION);
    controller.connect(mount.clone()).await.unwrap();

    let mut events = controller.subscribe();
    controller.go_program();
    loop {
        if let TrackingEvent::Commanded { .. } = events.recv().await.unwrap() {
            break;
        }
    }
    mount.unplug();
    loop {
        if let TrackingEvent::Disconnected { reason } = events.recv().await.unwrap() {
            assert!(reason.is_some());
            break;
        }
    }
    assert!(!controller.mount().connected);

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, TrackingEvent::Commanded { .. }),
            "SET after disconnection"
        );
    }
    // program track goes on, offline
    assert_eq!(controller.mode(), TrackingMode::Program);
    controller.go_manual().await.unwrap();
}
