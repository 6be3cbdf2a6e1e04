//! Epsilon-greedy action selection and the SARSA update rule
//!
//! Selection exploits the **minimum**-valued action of a state's row. Rewards
//! fed into [`Policy::update`] are negative delays, so this keeps the
//! selection rule of the deployed routers rather than the reward-maximizing
//! convention; see DESIGN.md for the open question.

use rand::seq::IteratorRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::topology::NodeId;
use super::value_table::ValueTable;
use crate::RouterError;

/// Learning constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningParams {
    /// Learning rate
    pub alpha: f64,
    /// Discount factor applied to the next state's value
    pub gamma: f64,
    /// Exploration probability
    pub epsilon: f64,
}

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.1,
        }
    }
}

impl LearningParams {
    pub fn validate(&self) -> Result<(), RouterError> {
        for (name, value) in [
            ("alpha", self.alpha),
            ("gamma", self.gamma),
            ("epsilon", self.epsilon),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RouterError::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Epsilon-greedy policy with on-policy (SARSA) updates
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    params: LearningParams,
}

impl Policy {
    pub fn new(params: LearningParams) -> Result<Self, RouterError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> LearningParams {
        self.params
    }

    /// Pick the next hop for `state`.
    ///
    /// Explores a uniformly random action of the state's own row with
    /// probability epsilon, otherwise returns the minimum-valued action.
    /// Returns `None` when `state` is not a known routing state or has no
    /// actions.
    pub fn choose_action<R: Rng>(
        &self,
        table: &ValueTable,
        state: &NodeId,
        rng: &mut R,
    ) -> Option<NodeId> {
        let actions = table.actions(state)?;
        if rng.gen::<f64>() < self.params.epsilon {
            return actions.choose(rng).cloned();
        }
        table.min_action(state)
    }

    /// SARSA update of `Q[state][action]`; returns the new value.
    ///
    /// The continuation is the value of the action actually chosen for the
    /// next state, or zero if that cell does not exist.
    pub fn update(
        &self,
        table: &mut ValueTable,
        state: &NodeId,
        action: &NodeId,
        reward: f64,
        next_state: &NodeId,
        next_action: &NodeId,
    ) -> f64 {
        let current = table.value(state, action).unwrap_or(0.0);
        let continuation = table.value(next_state, next_action).unwrap_or(0.0);
        let LearningParams { alpha, gamma, .. } = self.params;

        let updated = current + alpha * (reward + gamma * continuation - current);
        table.set(state, action, updated);
        updated
    }
}
