#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
use crate::debug::debug_failure;
use crate::driver::{CarFollowingModel, Driver};
use crate::error::StepError;
use crate::lmrs::{Lmrs, OperationalPlan};
use crate::parameters::ParameterSet;
use crate::perception::Perception;
use crate::VehicleId;
use slotmap::SlotMap;
use std::rc::Rc;

/// The outcome of one driver's decision step.
pub type StepOutcome = (VehicleId, Result<OperationalPlan, StepError>);

/// A population of drivers sharing one decision model, stepped together.
///
/// All drivers of one step decide on perception gathered before any of them steps, so a
/// driver reading a neighbour's desire or social pressure always sees the value committed in
/// the neighbour's previous step.
pub struct Population {
    /// The decision model.
    model: Lmrs,
    /// The drivers being simulated.
    drivers: SlotMap<VehicleId, Driver>,
    /// The simulation time of the next step in s.
    now: f64,
    /// Debugging information from the previous step.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl Population {
    /// Creates an empty population.
    pub fn new(model: Lmrs) -> Self {
        Self {
            model,
            drivers: SlotMap::with_key(),
            now: 0.0,
            #[cfg(feature = "debug")]
            debug: Default::default(),
        }
    }

    /// The decision model.
    pub fn model(&self) -> &Lmrs {
        &self.model
    }

    /// Adds a driver to the population.
    pub fn add_driver(
        &mut self,
        params: ParameterSet,
        car_following: Rc<dyn CarFollowingModel>,
    ) -> VehicleId {
        self.drivers
            .insert_with_key(|id| Driver::new(id, params, car_following))
    }

    /// Removes a driver, e.g. when its vehicle leaves the network.
    pub fn remove_driver(&mut self, id: VehicleId) -> Option<Driver> {
        self.drivers.remove(id)
    }

    /// Gets a reference to the driver with the given ID.
    pub fn get_driver(&self, id: VehicleId) -> Option<&Driver> {
        self.drivers.get(id)
    }

    /// Gets a mutable reference to the driver with the given ID.
    pub fn get_driver_mut(&mut self, id: VehicleId) -> Option<&mut Driver> {
        self.drivers.get_mut(id)
    }

    /// Returns an iterator over all the drivers.
    pub fn iter_drivers(&self) -> impl Iterator<Item = &Driver> {
        self.drivers.values()
    }

    /// The number of drivers.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// The simulation time of the next step in s.
    pub fn time(&self) -> f64 {
        self.now
    }

    /// Performs one decision step of every driver, then advances the time by `dt`.
    ///
    /// `perceive` is called for every driver before any driver steps. A failed step is
    /// logged and reported in the outcome; it leaves that driver's state unchanged and does
    /// not affect the other drivers.
    pub fn step<P: Perception>(
        &mut self,
        dt: f64,
        mut perceive: impl FnMut(&Population, VehicleId) -> P,
    ) -> Vec<StepOutcome> {
        let perceptions = self
            .drivers
            .keys()
            .map(|id| (id, perceive(self, id)))
            .collect::<Vec<_>>();

        let mut outcomes = Vec::with_capacity(perceptions.len());
        for (id, perception) in perceptions {
            let driver = &mut self.drivers[id];
            let result = self.model.step(driver, &perception, self.now, dt);
            if let Err(err) = &result {
                log::warn!("decision step of {:?} failed: {}", id, err);
                debug_failure(driver, &err.to_string());
            }
            outcomes.push((id, result));
        }
        self.now += dt;

        #[cfg(feature = "debug")]
        {
            self.debug = take_debug_frame();
        }
        outcomes
    }

    /// Gets the debugging information for the previous step as JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&self) -> serde_json::Value {
        self.debug.clone()
    }
}
