//! satpoint: pass prediction and mount tracking from the command line
use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration as StdDuration};

use clap::{Parser, Subcommand};
use log::{error, info};
use tokio::sync::broadcast::error::RecvError;

use satpoint::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "satpoint")]
#[command(about = "LEO satellite pass prediction and az/el mount tracking", long_about = None)]
#[command(version)]
struct Cli {
    /// Orbital elements (3 line TLE file)
    #[arg(long, value_name = "FILE")]
    tle: PathBuf,
    /// Ground station (QTH file)
    #[arg(long, value_name = "FILE")]
    qth: PathBuf,
    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Reference epoch, defaults to now (for example "2024-03-01T12:00:00 UTC")
    #[arg(long, value_name = "EPOCH")]
    at: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists upcoming passes
    Passes {
        /// Number of passes
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
        /// Only report the portion of each pass above this elevation [deg]
        #[arg(long, value_name = "DEG")]
        above: Option<f64>,
        /// JSON output
        #[arg(long)]
        json: bool,
    },
    /// Prints the satellite look angles
    Observe,
    /// Follows the satellite with the mount
    Track {
        /// Serial device, or tcp://host:port for a serial bridge
        #[arg(short, long)]
        port: Option<String>,
        /// Drives a simulated mount
        #[arg(long)]
        simulate: bool,
        /// Tracking duration [s]
        #[arg(short, long, default_value_t = 600.0)]
        duration: f64,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Error> {
    let cfg = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ParseError::Config(format!("{}: {}", path.display(), e)))?;
            serde_json::from_str::<Config>(&content)
                .map_err(|e| ParseError::Config(format!("{}: {}", path.display(), e)))?
        },
        None => Config::default(),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn reference_epoch(at: Option<&str>) -> Result<Epoch, Error> {
    match at {
        Some(at) => Epoch::from_str(at)
            .map_err(|e| ParseError::Config(format!("invalid epoch \"{}\": {}", at, e)).into()),
        None => Epoch::now().map_err(|e| Error::Clock(e.to_string())),
    }
}

fn open_link(cfg: &LinkConfig) -> Result<Box<dyn MotorLink>, Error> {
    match cfg.port.strip_prefix("tcp://") {
        Some(addr) => Ok(Box::new(StreamLink::connect_tcp(addr, cfg.timeout())?)),
        None => Ok(Box::new(StreamLink::open_serial(cfg)?)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.as_ref())?;
    let elements = OrbitalElements::from_file(&cli.tle)?;
    let (station, location) = ObserverLocation::from_file(&cli.qth)?;
    let now = reference_epoch(cli.at.as_deref())?;
    let propagator = Arc::new(Sgp4Propagator::new(cfg.prediction.clone()));

    info!("{} from {} @{}", elements.name(), station, now);

    match cli.command {
        Command::Passes { count, above, json } => {
            let mut report = Vec::with_capacity(count);
            for transit in transits(propagator.as_ref(), &elements, location, now)
                .with_config(&cfg.prediction)
                .take(count)
            {
                let mut transit = transit?;
                if let Some(elevation) = above {
                    let pruned = transit.prune_with(
                        |t| Ok(transit.at(t)?.elevation_deg >= elevation),
                        cfg.prediction.prune_epsilon(),
                    )?;
                    transit = pruned;
                }
                report.push(PassSummary::new(&transit, cfg.prediction.peak_epsilon())?);
            }
            if json {
                let content = serde_json::to_string_pretty(&report)
                    .map_err(|e| ParseError::Config(e.to_string()))?;
                println!("{}", content);
            } else {
                for (nth, summary) in report.iter().enumerate() {
                    println!("Pass {} - {}:\n{}\n", nth + 1, summary.satellite, summary);
                }
            }
        },
        Command::Observe => {
            let obs = propagator.observe(&elements, &location, now)?;
            println!(
                "{} @{}: azimuth {:.2}° elevation {:.2}°",
                elements.name(),
                obs.epoch,
                obs.azimuth_deg,
                obs.elevation_deg
            );
        },
        Command::Track {
            port,
            simulate,
            duration,
        } => {
            if let Some(port) = port {
                cfg.link.port = port;
            }
            let mut controller =
                TrackingController::new(propagator, Arc::new(elements), location, &cfg)?
                    .with_clock(Clock::starting_at(now));
            let mut events = controller.subscribe();

            if simulate {
                controller
                    .connect(SimulatedMount::new(cfg.mount.pulse_resolution))
                    .await?;
            } else {
                controller.connect(open_link(&cfg.link)?).await?;
            }
            controller.go_program();

            let deadline = tokio::time::sleep(StdDuration::from_secs_f64(duration.max(0.0)));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut deadline => break,
                    event = events.recv() => match event {
                        Ok(TrackingEvent::Commanded { target, .. }) => {
                            let mount = controller.mount();
                            println!("{} - {} (mount {})", controller.now(), target, mount.current);
                        },
                        Ok(TrackingEvent::Reported(reading)) => {
                            println!("{} - mount {}", controller.now(), reading.pointing);
                        },
                        Ok(TrackingEvent::Disconnected { reason }) => {
                            error!("mount lost: {:?}", reason);
                            break;
                        },
                        Err(RecvError::Closed) => break,
                        Err(e) => error!("events: {}", e),
                    },
                }
            }

            let home = controller.go_manual().await?;
            info!("mount sent home {}", home);
            if controller.mount().connected {
                controller.status().await?;
            }
            controller.disconnect();
        },
    }
    Ok(())
}
