use crate::driver::{CarFollowingModel, Idm, IdmPlus};
use crate::lmrs::{
    GapAcceptance, KeepRightIncentive, Lmrs, RouteIncentive, SpeedWithCourtesyIncentive,
    Synchronization, Tailgating,
};
use crate::parameters::{self, ParameterFactory};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

/// Driver behaviour configuration, loaded from a TOML file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BehaviorConfig {
    #[serde(default)]
    pub model: ModelConfig,
    /// Overrides of the default parameters, by parameter id.
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default)]
    pub randomisation: RandomisationConfig,
}

/// The components of the decision model.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub synchronization: Synchronization,
    pub gap_acceptance: GapAcceptance,
    pub tailgating: Tailgating,
    pub car_following: CarFollowingKind,
    pub neutral_first_step: bool,
    pub mandatory: Vec<MandatoryKind>,
    pub voluntary: Vec<VoluntaryKind>,
}

/// Per-driver randomisation of parameters.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomisationConfig {
    /// Standard deviation of `FSPEED`; zero disables randomisation.
    pub fspeed_stddev: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarFollowingKind {
    Idm,
    #[default]
    IdmPlus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandatoryKind {
    Route,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoluntaryKind {
    SpeedWithCourtesy,
    KeepRight,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            synchronization: Synchronization::default(),
            gap_acceptance: GapAcceptance::default(),
            tailgating: Tailgating::default(),
            car_following: CarFollowingKind::default(),
            neutral_first_step: true,
            mandatory: vec![MandatoryKind::Route],
            voluntary: vec![VoluntaryKind::SpeedWithCourtesy, VoluntaryKind::KeepRight],
        }
    }
}

impl CarFollowingKind {
    /// Creates the car-following model.
    pub fn build(self) -> Rc<dyn CarFollowingModel> {
        match self {
            CarFollowingKind::Idm => Rc::new(Idm),
            CarFollowingKind::IdmPlus => Rc::new(IdmPlus),
        }
    }
}

impl BehaviorConfig {
    /// Loads the configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    /// Parses the configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: BehaviorConfig = toml::from_str(content).context("Failed to parse TOML")?;
        let stddev = config.randomisation.fspeed_stddev;
        if !stddev.is_finite() || stddev < 0.0 {
            anyhow::bail!("fspeed_stddev must be a non-negative number");
        }
        Ok(config)
    }

    /// Creates the decision model.
    pub fn build_model(&self) -> Lmrs {
        let model = &self.model;
        let mut lmrs = Lmrs::new(
            model.synchronization,
            model.gap_acceptance,
            model.tailgating,
        )
        .with_neutral_first_step(model.neutral_first_step);
        for kind in &model.mandatory {
            lmrs = match kind {
                MandatoryKind::Route => lmrs.with_mandatory(RouteIncentive),
            };
        }
        for kind in &model.voluntary {
            lmrs = match kind {
                VoluntaryKind::SpeedWithCourtesy => lmrs.with_voluntary(SpeedWithCourtesyIncentive),
                VoluntaryKind::KeepRight => lmrs.with_voluntary(KeepRightIncentive),
            };
        }
        lmrs
    }

    /// Creates the factory of driver parameters, with all overrides applied.
    ///
    /// Overrides are applied in whichever order passes the cross-checks, e.g. a new `TMAX`
    /// before a `T` above the old `TMAX`. Any override that cannot be applied is an error.
    pub fn parameter_factory(&self) -> Result<ParameterFactory> {
        let mut factory = ParameterFactory::new();
        let mut pending = self
            .parameters
            .iter()
            .map(|(id, value)| Ok((parameters::lookup(id)?, *value)))
            .collect::<Result<Vec<_>, crate::ParameterError>>()?;

        while !pending.is_empty() {
            let before = pending.len();
            let mut last_error = None;
            pending.retain(|(ty, value)| match factory.set(*ty, *value) {
                Ok(()) => false,
                Err(err) => {
                    last_error = Some(err);
                    true
                }
            });
            if pending.len() == before {
                if let Some(err) = last_error {
                    return Err(err).context("Invalid parameter override");
                }
            }
        }

        factory.randomise_fspeed(self.randomisation.fspeed_stddev);
        Ok(factory)
    }

    /// The car-following model of the drivers.
    pub fn car_following(&self) -> Rc<dyn CarFollowingModel> {
        self.model.car_following.build()
    }
}
