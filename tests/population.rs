//! Tests that step several drivers together.

use lmrs_sim::parameters::DLEFT;
use lmrs_sim::{
    Desire, EgoState, GapAcceptance, HeadwayObservation, IdmPlus, IncentiveContext,
    LateralDirection, Lmrs, MandatoryIncentive, OperationalPlan, ParameterFactory, Perception,
    PerceptionError, PerceptionSnapshot, Population, RelativeLane, RouteInfo, SpeedLimitInfo,
    StepError, Synchronization, Tailgating, VehicleId,
};
use std::cell::RefCell;
use std::rc::Rc;

const DT: f64 = 0.5;

#[derive(Debug)]
struct FixedDesire(Desire);

impl MandatoryIncentive for FixedDesire {
    fn determine_desire(&self, _ctx: &IncentiveContext) -> Result<Desire, StepError> {
        Ok(self.0)
    }
}

fn limits() -> SpeedLimitInfo {
    SpeedLimitInfo::new(30.0, 50.0)
}

/// Both drivers want to go left, but a vehicle alongside keeps them in their lane.
fn population() -> (Population, VehicleId, VehicleId) {
    let model = Lmrs::new(
        Synchronization::Active,
        GapAcceptance::Informed,
        Tailgating::None,
    )
    .with_mandatory(FixedDesire(Desire {
        left: 0.5,
        right: 0.0,
    }));
    let mut population = Population::new(model);
    let factory = ParameterFactory::new();
    let mut rng = rand::thread_rng();
    let leader = population.add_driver(factory.create(&mut rng).unwrap(), Rc::new(IdmPlus));
    let follower = population.add_driver(factory.create(&mut rng).unwrap(), Rc::new(IdmPlus));
    (population, leader, follower)
}

/// A perception that fails entirely when `broken` is set.
struct Scene {
    snapshot: PerceptionSnapshot,
    broken: bool,
}

impl Scene {
    fn new(
        population: &Population,
        id: VehicleId,
        leader: VehicleId,
        broken: bool,
    ) -> (Self, Option<HeadwayObservation>) {
        let mut snapshot = PerceptionSnapshot::new(
            EgoState {
                speed: 20.0,
                length: 4.5,
            },
            limits(),
        )
        .with_lane(LateralDirection::Left)
        .with_alongside(LateralDirection::Left);
        let mut seen = None;
        if id != leader {
            if let Some(driver) = population.get_driver(leader) {
                let obs = driver.observe(40.0, 20.0, 4.5, limits());
                seen = Some(obs.clone());
                snapshot = snapshot.with_vehicle(RelativeLane::Current, obs);
            }
        }
        (Self { snapshot, broken }, seen)
    }

    fn check(&self) -> Result<(), PerceptionError> {
        if self.broken {
            Err(PerceptionError::MissingCategory { category: "ego" })
        } else {
            Ok(())
        }
    }
}

impl Perception for Scene {
    fn ego(&self) -> Result<EgoState, PerceptionError> {
        self.check()?;
        self.snapshot.ego()
    }

    fn speed_limit(&self) -> Result<SpeedLimitInfo, PerceptionError> {
        self.snapshot.speed_limit()
    }

    fn has_lane(&self, dir: LateralDirection) -> bool {
        self.snapshot.has_lane(dir)
    }

    fn leaders(&self, lane: RelativeLane) -> Result<&[HeadwayObservation], PerceptionError> {
        self.snapshot.leaders(lane)
    }

    fn followers(&self, lane: RelativeLane) -> Result<&[HeadwayObservation], PerceptionError> {
        self.snapshot.followers(lane)
    }

    fn alongside(&self, dir: LateralDirection) -> Result<bool, PerceptionError> {
        self.snapshot.alongside(dir)
    }

    fn route(&self, lane: RelativeLane) -> Result<RouteInfo, PerceptionError> {
        self.snapshot.route(lane)
    }

    fn legal_lane_change(&self, dir: LateralDirection) -> Result<f64, PerceptionError> {
        self.snapshot.legal_lane_change(dir)
    }

    fn upstream_of_conflicts(&self, lane: RelativeLane) -> Result<&[VehicleId], PerceptionError> {
        self.snapshot.upstream_of_conflicts(lane)
    }
}

#[test]
fn peers_see_desire_of_previous_step() {
    let (mut population, leader, follower) = population();
    let observed = RefCell::new(vec![]);
    let mut perceive = |population: &Population, id| {
        let (scene, seen) = Scene::new(population, id, leader, false);
        observed.borrow_mut().extend(seen);
        scene
    };

    let first = population.step(DT, &mut perceive);
    assert!(first.iter().all(|(_, plan)| *plan == Ok(OperationalPlan::NEUTRAL)));

    population.step(DT, &mut perceive);
    // The leader committed its desire during the second step...
    let committed = population.get_driver(leader).unwrap().desire();
    assert_eq!(committed, (0.5, 0.0));
    // ...but the follower's observation was taken before that
    let observed = observed.into_inner();
    assert_eq!(observed.len(), 2);
    assert_eq!(observed[1].parameters.get(&DLEFT), Ok(0.0));
    assert_eq!(population.get_driver(follower).unwrap().desire(), (0.5, 0.0));
}

#[test]
fn observations_are_snapshots() {
    let (mut population, leader, _) = population();
    let perceive = |population: &Population, id| Scene::new(population, id, leader, false).0;
    population.step(DT, perceive);
    population.step(DT, perceive);

    let driver = population.get_driver_mut(leader).unwrap();
    let obs = driver.observe(10.0, 20.0, 4.5, limits());
    assert_eq!(obs.parameters.get(&DLEFT), Ok(0.5));

    driver.parameters_mut().set(&DLEFT, 0.1).unwrap();
    assert_eq!(driver.desire(), (0.1, 0.0));
    assert_eq!(obs.parameters.get(&DLEFT), Ok(0.5));
}

#[test]
fn failed_driver_does_not_affect_others() {
    let (mut population, leader, follower) = population();
    let perceive = |population: &Population, id| Scene::new(population, id, leader, false).0;
    population.step(DT, perceive);

    let outcomes = population.step(DT, |population: &Population, id| {
        Scene::new(population, id, leader, id == leader).0
    });
    assert_eq!(outcomes.len(), 2);
    for (id, outcome) in &outcomes {
        if *id == leader {
            assert!(matches!(outcome, Err(StepError::Perception(_))));
        } else {
            assert!(outcome.is_ok());
        }
    }

    let leader = population.get_driver(leader).unwrap();
    assert_eq!(leader.desire(), (0.0, 0.0));
    assert_eq!(leader.memory().steps(), 1);
    let follower = population.get_driver(follower).unwrap();
    assert_eq!(follower.desire(), (0.5, 0.0));
    assert_eq!(follower.memory().steps(), 2);
    assert_eq!(population.time(), 2.0 * DT);
}
