//! locomotion-sim - run a scripted avatar scenario headless and print its track

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avatar_locomotion::avatar::math::{transform_from, Point, Quat, Vec3};
use avatar_locomotion::avatar::physics::rapier_world::SolidKind;
use avatar_locomotion::avatar::swim_region::SwimRegion;
use avatar_locomotion::avatar::{
    AvatarEvent, AvatarMessage, AvatarOutputs, AvatarSender, CollisionBackend, ControlCode,
    ObjectId, PlaneWorld, RapierWorld, Simulation,
};
use avatar_locomotion::LocomotionConfig;

const AVATAR: ObjectId = ObjectId(1);
const SWIM_SURFACE: f32 = 6.0;
const LIFT_SPEED: f32 = 1.0;

#[derive(Parser)]
#[command(name = "locomotion-sim")]
#[command(about = "Headless avatar locomotion scenarios", long_about = None)]
struct Cli {
    /// Scenario to run
    #[arg(value_enum, default_value = "walk")]
    scenario: Scenario,

    /// Collision backend
    #[arg(short, long, value_enum, default_value = "rapier")]
    backend: Backend,

    /// Simulated seconds
    #[arg(short, long, default_value = "5")]
    seconds: f32,

    /// Locomotion tunables (TOML); defaults when omitted
    #[arg(short, long, env = "LOCOMOTION_CONFIG")]
    config: Option<PathBuf>,

    /// Print a track line every this many ticks
    #[arg(long, default_value = "30")]
    every: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Walk forward, then run in a circle
    Walk,
    /// Drop from a height and land
    Fall,
    /// Stand in deep water and swim sideways
    Swim,
    /// Toggle into physics-free flight and climb
    Drive,
    /// Stand on a rising lift
    Ride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Plane,
    Rapier,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avatar_locomotion=info,locomotion_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match LocomotionConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => LocomotionConfig::default(),
    };

    info!(scenario = ?cli.scenario, backend = ?cli.backend, "starting");
    match cli.backend {
        Backend::Plane => {
            let mut world = PlaneWorld::with_ground(0.0);
            if cli.scenario == Scenario::Ride {
                world.add_platform(0.5, [-3.0, -3.0, 3.0, 3.0], Vec3::new(0.0, 0.0, LIFT_SPEED));
            }
            run(Simulation::new(world, config), &cli);
        }
        Backend::Rapier => {
            let mut world = RapierWorld::new(config.physics.gravity);
            world.add_solid(
                ObjectId(100),
                Point::new(0.0, 0.0, -0.5),
                Vec3::new(200.0, 200.0, 0.5),
                Quat::identity(),
                SolidKind::Static,
            );
            if cli.scenario == Scenario::Ride {
                world.add_platform(
                    ObjectId(101),
                    Point::new(0.0, 0.0, 0.25),
                    Vec3::new(3.0, 3.0, 0.25),
                    Vec3::new(0.0, 0.0, LIFT_SPEED),
                );
            }
            run(Simulation::new(world, config), &cli);
        }
    }
}

fn run<B: CollisionBackend>(mut sim: Simulation<B>, cli: &Cli) {
    let start = match cli.scenario {
        Scenario::Fall => Point::new(0.0, 0.0, 40.0),
        Scenario::Ride => Point::new(0.0, 0.0, 0.55),
        _ => Point::origin(),
    };
    let (tx, outputs) = match sim.spawn_avatar(AVATAR, transform_from(start, Quat::identity())) {
        Ok(handles) => handles,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let dt = sim.config().physics.timestep;
    let total = (cli.seconds / dt).round() as u64;
    script(cli.scenario, 0, &tx);
    for tick in 1..=total {
        sim.step(dt);
        script(cli.scenario, tick, &tx);
        report(&outputs, tick);

        if tick % cli.every.max(1) == 0 {
            let Some(avatar) = sim.avatar(AVATAR) else {
                warn!("avatar vanished");
                break;
            };
            let p = avatar.controller().world_position();
            println!(
                "t={:6.2}  pos=({:7.2}, {:7.2}, {:7.2})  ground={}  brain={}",
                sim.time(),
                p.x,
                p.y,
                p.z,
                avatar.controller().is_on_ground(),
                avatar
                    .current_brain()
                    .map(|kind| kind.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
    }
    if sim.is_faulted(AVATAR) {
        eprintln!("avatar faulted during the run");
        std::process::exit(2);
    }
}

/// Feeds the scenario's input for `tick`.
fn script(scenario: Scenario, tick: u64, tx: &AvatarSender) {
    match (scenario, tick) {
        (Scenario::Walk, 0) => {
            tx.press(ControlCode::MoveForward);
        }
        (Scenario::Walk, 120) => {
            tx.press(ControlCode::Fast);
            tx.press(ControlCode::TurnLeft);
        }
        (Scenario::Swim, 0) => {
            tx.send(AvatarMessage::SwimEnter(SwimRegion::still(SWIM_SURFACE)));
            tx.press(ControlCode::StrafeRight);
        }
        (Scenario::Drive, 0) => {
            tx.send(AvatarMessage::TogglePhysical);
            tx.press(ControlCode::Jump);
        }
        (Scenario::Ride, 0) => {
            tx.send(AvatarMessage::RideEnter);
        }
        (Scenario::Drive, 60) => {
            tx.release(ControlCode::Jump);
            tx.press(ControlCode::MoveForward);
        }
        _ => {}
    }
}

fn report(outputs: &AvatarOutputs, tick: u64) {
    for event in outputs.events() {
        match event {
            AvatarEvent::PanicLink => warn!(tick, "panic link requested"),
            other => info!(tick, event = ?other, "event"),
        }
    }
}
