//! A two-lane corridor in which the right lane ends, forcing its vehicles to merge left.

use anyhow::Result;
use lmrs_sim::{
    BehaviorConfig, EgoState, LateralDirection, LateralIntent, PerceptionSnapshot, Population,
    RelativeLane, RouteInfo, SpeedLimitInfo, VehicleId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slotmap::SecondaryMap;

/// The length of the corridor in m.
const LENGTH: f64 = 2000.0;
/// The position at which the right lane ends in m.
const LANE_DROP: f64 = 1500.0;
/// The speed limit in m/s.
const SPEED_LIMIT: f64 = 100.0 / 3.6;
const VEHICLE_LENGTH: f64 = 4.5;
const DT: f64 = 0.5;
const STEPS: usize = 600;

/// The kinematic state of a vehicle, integrated by this demo.
#[derive(Clone, Copy, Debug)]
struct Kinematics {
    /// 0 is the right lane, 1 the left lane.
    lane: usize,
    /// The lane being changed to, until the maneuver completes.
    target: Option<usize>,
    pos: f64,
    speed: f64,
}

fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => BehaviorConfig::load(path)?,
        None => BehaviorConfig::default(),
    };
    let factory = config.parameter_factory()?;
    let mut population = Population::new(config.build_model());
    let mut vehicles = SecondaryMap::<VehicleId, Kinematics>::new();

    let mut rng = StdRng::from_seed(*b"Vegemite sandwhich is not fun...");
    for i in 0..40 {
        let id = population.add_driver(factory.create(&mut rng)?, config.car_following());
        let state = Kinematics {
            lane: i % 2,
            target: None,
            pos: 25.0 * (i / 2) as f64 + rng.gen_range(0.0..5.0),
            speed: rng.gen_range(15.0..25.0),
        };
        vehicles.insert(id, state);
    }

    let limits = SpeedLimitInfo::new(SPEED_LIMIT, 50.0);
    let mut lane_changes = 0;
    let mut failures = 0;
    let mut exited = 0;

    for step in 0..STEPS {
        let outcomes = population.step(DT, |population, id| {
            perceive(population, &vehicles, id, limits)
        });

        for (id, outcome) in outcomes {
            let plan = match outcome {
                Ok(plan) => plan,
                Err(_) => {
                    failures += 1;
                    continue;
                }
            };
            let state = &mut vehicles[id];
            match plan.lateral {
                LateralIntent::Left if state.lane == 0 => state.target = Some(1),
                LateralIntent::Right if state.lane == 1 && state.pos < LANE_DROP => {
                    state.target = Some(0)
                }
                _ => {}
            }
            // The departure lane stays the current lane until the maneuver completes
            let changing = population
                .get_driver(id)
                .map_or(false, |driver| driver.memory().is_changing_lane());
            if let (Some(target), false) = (state.target, changing) {
                state.target = None;
                if target == 1 || state.pos < LANE_DROP {
                    state.lane = target;
                    lane_changes += 1;
                }
            }
            state.speed = f64::max(0.0, state.speed + plan.acceleration * DT);
            state.pos += state.speed * DT;
        }

        let done = vehicles
            .iter()
            .filter(|(_, state)| state.pos >= LENGTH)
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        for id in done {
            vehicles.remove(id);
            population.remove_driver(id);
            exited += 1;
        }

        if step % 60 == 0 {
            log::info!(
                "t = {:.0} s: {} vehicles, {} lane changes",
                population.time(),
                population.len(),
                lane_changes
            );
        }
    }

    let stuck = vehicles
        .values()
        .filter(|state| state.lane == 0 && state.pos >= LANE_DROP - 1.0)
        .count();
    println!(
        "{} lane changes, {} vehicles exited, {} stuck at the lane drop, {} failed steps",
        lane_changes, exited, stuck, failures
    );
    Ok(())
}

/// Gathers the perception of one vehicle.
fn perceive(
    population: &Population,
    vehicles: &SecondaryMap<VehicleId, Kinematics>,
    id: VehicleId,
    limits: SpeedLimitInfo,
) -> PerceptionSnapshot {
    let ego = vehicles[id];
    let mut snapshot = PerceptionSnapshot::new(
        EgoState {
            speed: ego.speed,
            length: VEHICLE_LENGTH,
        },
        limits,
    );

    let to_drop = RouteInfo::new(1, LANE_DROP - ego.pos);
    let right_lane_open = ego.pos < LANE_DROP;
    match ego.lane {
        0 => {
            snapshot = snapshot
                .with_lane(LateralDirection::Left)
                .with_route(RelativeLane::Current, to_drop);
        }
        _ if right_lane_open => {
            snapshot = snapshot
                .with_lane(LateralDirection::Right)
                .with_route(RelativeLane::Right, to_drop);
        }
        _ => {}
    }

    for (other_id, other) in vehicles {
        if other_id == id {
            continue;
        }
        let lane = match other.lane as isize - ego.lane as isize {
            0 => RelativeLane::Current,
            1 => RelativeLane::Left,
            -1 if right_lane_open => RelativeLane::Right,
            _ => continue,
        };
        let offset = other.pos - ego.pos;
        let distance = if offset > 0.0 {
            offset - VEHICLE_LENGTH
        } else {
            offset + VEHICLE_LENGTH
        };
        if lane != RelativeLane::Current && offset.abs() < VEHICLE_LENGTH {
            let dir = match lane {
                RelativeLane::Left => LateralDirection::Left,
                _ => LateralDirection::Right,
            };
            snapshot = snapshot.with_alongside(dir);
            continue;
        }
        if let Some(driver) = population.get_driver(other_id) {
            let obs = driver.observe(distance, other.speed, VEHICLE_LENGTH, limits);
            snapshot = snapshot.with_vehicle(lane, obs);
        }
    }
    snapshot
}
