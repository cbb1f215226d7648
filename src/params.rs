//! Regressor parameters.
//!
//! Parameters are stored with the regressor and persisted alongside it. A
//! `num_neighbours` of zero is accepted here and reported as `SmallK` when a
//! prediction is attempted.

use crate::regressor::Weighting;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NUM_NEIGHBOURS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegressorParams {
    /// Number of nearest neighbours consulted per prediction.
    pub num_neighbours: usize,
    /// Weight neighbours by inverse distance.
    pub weight: bool,
}

impl Default for RegressorParams {
    fn default() -> Self {
        RegressorParams { num_neighbours: DEFAULT_NUM_NEIGHBOURS, weight: true }
    }
}

impl RegressorParams {
    pub fn weighting(&self) -> Weighting {
        Weighting::from(self.weight)
    }

    /// Sets a parameter by its name, as typed on the command line.
    ///
    /// Accepts `k`/`numNeighbours` and `weight` (`on`/`off`, `yes`/`no`, `1`/`0`).
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            "k" | "numNeighbours" => {
                self.num_neighbours = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid {} value: '{}'. Must be a non-negative integer.", name, value))?;
                Ok(())
            }
            "weight" => {
                self.weight = match value {
                    "on" | "yes" | "1" | "true" => true,
                    "off" | "no" | "0" | "false" => false,
                    _ => return Err(format!("Invalid weight value: '{}'. Use on or off.", value)),
                };
                Ok(())
            }
            _ => Err(format!("Unknown parameter: {}. Available: k, weight", name)),
        }
    }
}
