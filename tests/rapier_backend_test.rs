//! Avatars walking against Rapier geometry: floors, walls, exclude regions and props.
//!
//! Run with: cargo test --test rapier_backend_test -- --nocapture

use avatar_locomotion::avatar::math::{transform_from, Point, Quat, Vec3};
use avatar_locomotion::avatar::physics::rapier_world::SolidKind;
use avatar_locomotion::avatar::{
    AvatarMessage, AvatarSender, BrainKind, ControlCode, ObjectId, RapierWorld, Simulation,
};
use avatar_locomotion::LocomotionConfig;

const AVATAR: ObjectId = ObjectId(1);
const FLOOR: ObjectId = ObjectId(100);
const DT: f32 = 1.0 / 60.0;

/// Floor top at z = 0.
fn world_with_floor() -> RapierWorld {
    let mut world = RapierWorld::default();
    world.add_solid(
        FLOOR,
        Point::new(0.0, 0.0, -0.5),
        Vec3::new(50.0, 50.0, 0.5),
        Quat::identity(),
        SolidKind::Static,
    );
    world
}

/// Thin wall across the +Y path whose near face sits at `y`.
fn add_wall(world: &mut RapierWorld, object: ObjectId, y: f32, kind: SolidKind) {
    world.add_solid(
        object,
        Point::new(0.0, y + 0.5, 4.0),
        Vec3::new(10.0, 0.5, 4.0),
        Quat::identity(),
        kind,
    );
}

fn spawn(world: RapierWorld, at: Point) -> (Simulation<RapierWorld>, AvatarSender) {
    let mut sim = Simulation::new(world, LocomotionConfig::default());
    let (tx, _outputs) = sim
        .spawn_avatar(AVATAR, transform_from(at, Quat::identity()))
        .expect("fresh id");
    (sim, tx)
}

fn run(sim: &mut Simulation<RapierWorld>, ticks: usize) {
    for _ in 0..ticks {
        sim.step(DT);
    }
}

fn feet(sim: &Simulation<RapierWorld>) -> Point {
    sim.avatar(AVATAR).unwrap().controller().world_position()
}

#[test]
fn test_drop_onto_floor_and_stand() {
    let (mut sim, _tx) = spawn(world_with_floor(), Point::new(0.0, 0.0, 5.0));
    run(&mut sim, 120);
    let p = feet(&sim);
    println!("settled at {:?}", p);
    assert!(p.z > -0.05 && p.z < 0.2, "feet should rest on the floor, got {}", p.z);
    assert!(sim.avatar(AVATAR).unwrap().controller().is_on_ground());
}

#[test]
fn test_walk_across_floor() {
    let (mut sim, tx) = spawn(world_with_floor(), Point::new(0.0, 0.0, 0.05));
    run(&mut sim, 10);
    tx.press(ControlCode::MoveForward);
    run(&mut sim, 90);
    let p = feet(&sim);
    println!("walked to {:?}", p);
    assert!(p.y > 2.0, "should walk forward, got {:?}", p);
    assert!(p.z > -0.05 && p.z < 0.2, "should stay on the floor, got {}", p.z);
}

#[test]
fn test_wall_stops_walker() {
    let mut world = world_with_floor();
    add_wall(&mut world, ObjectId(2), 4.0, SolidKind::Static);
    let (mut sim, tx) = spawn(world, Point::new(0.0, 0.0, 0.05));
    tx.press(ControlCode::MoveForward);
    run(&mut sim, 240);
    let p = feet(&sim);
    let radius = sim.avatar(AVATAR).unwrap().controller().radius();
    println!("stopped at {:?}", p);
    assert!(p.y > 1.0, "walked up to the wall");
    assert!(p.y < 4.0 - radius + 0.1, "wall should block, got {}", p.y);
}

#[test]
fn test_exclude_region_blocks_walker() {
    let mut world = world_with_floor();
    add_wall(&mut world, ObjectId(3), 4.0, SolidKind::ExcludeRegion);
    let (mut sim, tx) = spawn(world, Point::new(0.0, 0.0, 0.05));
    tx.press(ControlCode::MoveForward);
    run(&mut sim, 240);
    assert!(feet(&sim).y < 4.0, "exclude region keeps walkers out, got {:?}", feet(&sim));
}

#[test]
fn test_walker_shoves_dynamic_prop() {
    let mut world = world_with_floor();
    let crate_id = ObjectId(4);
    world.add_dynamic_box(crate_id, Point::new(0.0, 4.0, 0.5), Vec3::new(0.5, 0.5, 0.5), 0.2);
    let (mut sim, tx) = spawn(world, Point::new(0.0, 0.0, 0.05));
    run(&mut sim, 30);
    let before = sim.backend().object_position(crate_id).unwrap().translation.y;

    tx.press(ControlCode::MoveForward);
    run(&mut sim, 180);
    let after = sim.backend().object_position(crate_id).unwrap().translation.y;
    println!("prop moved from {before} to {after}");
    assert!(after > before + 0.1, "prop should be pushed along +Y");
}

#[test]
fn test_rider_is_carried_by_platform() {
    let mut world = world_with_floor();
    let lift = ObjectId(5);
    // Top face at z = 0.5, rising at 1 unit/s
    world.add_platform(lift, Point::new(0.0, 0.0, 0.25), Vec3::new(3.0, 3.0, 0.25), Vec3::new(0.0, 0.0, 1.0));
    let (mut sim, tx) = spawn(world, Point::new(0.0, 0.0, 0.55));
    tx.send(AvatarMessage::RideEnter);
    run(&mut sim, 120);
    assert_eq!(sim.avatar(AVATAR).unwrap().current_brain(), Some(BrainKind::Ride));
    let top = sim.backend().object_position(lift).unwrap().translation.z + 0.25;
    let z = feet(&sim).z;
    println!("platform top {top}, feet {z}");
    assert!(top > 2.0, "platform rose to {top}");
    assert!((z - top).abs() < 0.3, "avatar should ride the platform, feet {z} top {top}");
}
