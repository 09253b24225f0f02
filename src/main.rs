use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use spin_sleep::SpinSleeper;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use swerve_drive::{
    config::{SimConfig, SwerveConfig, DEFAULT_CONFIG_PATH},
    controller::{clock, Drive},
    corrections::{correction_queue, CorrectionSender},
    domain::{Frame, Pose2D, WheelGeometry},
    io::{Backend, DriveIo},
    simulator::{SimChassis, SimVision},
};

const DEMO_DURATION: f64 = 10.0;

/// Latest simulated truth and the time it was reached.
type Truth = Arc<RwLock<(f64, Pose2D)>>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = SwerveConfig::load(&path).context("invalid configuration")?;

    let io = match config.backend {
        Backend::Real => bail!("no hardware drivers are available, use the sim or replay backend"),
        Backend::Sim => DriveIo::sim(config.drive.period, config.sim.wheel_slip),
        Backend::Replay => DriveIo::replay(),
    };

    let (corrections, receiver) = correction_queue(config.estimator.queue_capacity);
    let mut drive = Drive::new(&config, io, receiver, clock())?;

    let geometry = WheelGeometry::rectangular(config.drive.wheel_base, config.drive.track_width)?;
    let mut chassis = SimChassis::new(geometry, drive.pose());
    let truth: Truth = Arc::new(RwLock::new((clock(), chassis.pose())));
    let running = Arc::new(AtomicBool::new(true));

    let vision = if config.backend == Backend::Sim {
        let vision = SimVision::new(
            config.sim.seed,
            config.sim.vision_noise,
            config.sim.vision_confidence,
        )?;
        Some(spawn_vision(
            vision,
            config.sim.clone(),
            Arc::clone(&truth),
            corrections,
            Arc::clone(&running),
        )?)
    } else {
        None
    };

    info!(backend = ?config.backend, "Driving for {DEMO_DURATION} s");

    let sleeper = SpinSleeper::default();
    let period = config.drive.period;
    let start = clock();
    let mut next_tick = start;
    let mut next_report = start;

    while clock() - start < DEMO_DURATION {
        let now = clock();
        drive.periodic(now);

        let true_pose = chassis.advance(&drive.module_states(), period);
        *truth.write() = (now, true_pose);

        // sweep the stick around a slow circle while turning
        let t = now - start;
        drive.drive(
            0.6 * (0.4 * t).cos(),
            0.6 * (0.4 * t).sin(),
            0.15,
            Frame::Field,
            true,
            now,
        );

        if now >= next_report {
            let error = drive.pose().position().distance(true_pose.position());
            info!(estimate = %drive.pose(), truth = %true_pose, error, "Drive state");
            next_report += 1.0;
        }

        next_tick += period;
        let remaining = next_tick - clock();
        if remaining > 0.0 {
            sleeper.sleep(Duration::from_secs_f64(remaining));
        } else {
            warn!(overrun = -remaining, "Control loop overran its period");
            next_tick = clock();
        }
    }

    drive.set_cross();
    running.store(false, Ordering::Relaxed);
    if let Some(handle) = vision {
        if let Err(panic) = handle.join() {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            warn!(reason = %reason, "Vision thread panicked");
        }
    }

    let final_truth = truth.read().1;
    info!(
        estimate = %drive.pose(),
        truth = %final_truth,
        error = drive.pose().position().distance(final_truth.position()),
        "Finished"
    );
    Ok(())
}

/// Publishes noisy observations of the truth, delivered after the configured latency.
fn spawn_vision(
    mut vision: SimVision,
    config: SimConfig,
    truth: Truth,
    corrections: CorrectionSender,
    running: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("vision".into())
        .spawn(move || {
            info!("Vision thread started");
            let sleeper = SpinSleeper::default();
            while running.load(Ordering::Relaxed) {
                sleeper.sleep(Duration::from_secs_f64(config.vision_period));

                let (captured_at, pose) = *truth.read();
                let correction = vision.observe(pose, captured_at);
                sleeper.sleep(Duration::from_secs_f64(config.vision_latency));

                if !corrections.send(correction) {
                    break;
                }
            }
            info!("Vision thread stopped");
        })?;
    Ok(handle)
}
