use super::{ParameterSet, ParameterType, FSPEED};
use crate::error::ParameterError;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Produces the parameter sets of new drivers.
///
/// Every driver starts as an alias of a shared base set. Only drivers that receive a
/// randomised value take a private copy of the storage.
#[derive(Clone, Debug)]
pub struct ParameterFactory {
    base: ParameterSet,
    fspeed: Option<Normal<f64>>,
}

impl ParameterFactory {
    /// Creates a factory that hands out the default parameters.
    pub fn new() -> Self {
        Self::with_base(ParameterSet::with_defaults())
    }

    /// Creates a factory that hands out the given parameters.
    pub fn with_base(base: ParameterSet) -> Self {
        Self { base, fspeed: None }
    }

    /// Overrides a base value, as validated by [ParameterSet::set].
    pub fn set(&mut self, ty: &'static ParameterType, value: f64) -> Result<(), ParameterError> {
        self.base.set(ty, value)
    }

    /// Randomises the speed limit adherence factor of each driver, which is sampled from
    /// a normal distribution with a mean of 1 and standard deviation of `stddev`.
    /// A standard deviation of zero, or one that is not finite, disables randomisation.
    pub fn randomise_fspeed(&mut self, stddev: f64) {
        self.fspeed = if stddev > 0.0 {
            Normal::new(1.0, stddev).ok()
        } else {
            None
        };
    }

    /// The shared base parameters.
    pub fn base(&self) -> &ParameterSet {
        &self.base
    }

    /// Creates the parameters of a new driver.
    pub fn create(&self, rng: &mut impl Rng) -> Result<ParameterSet, ParameterError> {
        let mut params = self.base.clone();
        if let Some(distr) = &self.fspeed {
            let factor = distr.sample(rng).clamp(0.75, 1.25);
            params.set(&FSPEED, factor)?;
        }
        Ok(params)
    }
}

impl Default for ParameterFactory {
    fn default() -> Self {
        Self::new()
    }
}
