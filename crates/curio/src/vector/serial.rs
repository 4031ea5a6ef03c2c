//! Serial (sequential) vectorization backend.
//!
//! Runs environments one at a time in a single thread.

use super::vecenv::{VecEnv, VecStep};
use crate::env::{Env, EpisodeStats};
use crate::{CurioError, Result};
use ndarray::Array2;

/// Serial vectorization backend.
///
/// Every environment is wrapped in `EpisodeStats` and reset as soon as its
/// episode ends, so the returned observation always belongs to a live
/// episode.
pub struct Serial<E: Env> {
    envs: Vec<EpisodeStats<E>>,
    obs_size: usize,
    num_actions: usize,
}

impl<E: Env> Serial<E> {
    /// Create a new serial backend
    pub fn new<F>(env_creator: F, num_envs: usize) -> Self
    where
        F: Fn() -> E,
    {
        let envs: Vec<EpisodeStats<E>> = (0..num_envs.max(1))
            .map(|_| EpisodeStats::new(env_creator()))
            .collect();
        let obs_size = envs[0].observation_size();
        let num_actions = envs[0].num_actions();

        Self {
            envs,
            obs_size,
            num_actions,
        }
    }

    fn stack(&self, observations: Vec<f32>) -> Result<Array2<f32>> {
        let actual = observations.len();
        Array2::from_shape_vec((self.envs.len(), self.obs_size), observations).map_err(|_| {
            CurioError::ShapeMismatch {
                what: "observations",
                expected: vec![(self.envs.len() * self.obs_size) as i64],
                actual: vec![actual as i64],
            }
        })
    }
}

impl<E: Env> VecEnv for Serial<E> {
    fn num_envs(&self) -> usize {
        self.envs.len()
    }

    fn observation_size(&self) -> usize {
        self.obs_size
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<Array2<f32>> {
        let mut observations = Vec::with_capacity(self.envs.len() * self.obs_size);
        for (i, env) in self.envs.iter_mut().enumerate() {
            let env_seed = seed.map(|s| s + i as u64);
            observations.extend(env.reset(env_seed));
        }
        self.stack(observations)
    }

    fn step(&mut self, actions: &[i64]) -> Result<VecStep> {
        if actions.len() != self.envs.len() {
            return Err(CurioError::ShapeMismatch {
                what: "actions",
                expected: vec![self.envs.len() as i64],
                actual: vec![actions.len() as i64],
            });
        }

        let num_envs = self.envs.len();
        let mut observations = Vec::with_capacity(num_envs * self.obs_size);
        let mut rewards = Vec::with_capacity(num_envs);
        let mut dones = Vec::with_capacity(num_envs);
        let mut infos = Vec::with_capacity(num_envs);

        for (env, &action) in self.envs.iter_mut().zip(actions) {
            if action < 0 || action as usize >= self.num_actions {
                return Err(CurioError::InvalidAction {
                    action,
                    num_actions: self.num_actions as i64,
                });
            }

            let result = env.step(action as usize);
            let done = result.done();
            if done {
                observations.extend(env.reset(None));
            } else {
                observations.extend(result.observation);
            }
            rewards.push(result.reward);
            dones.push(done);
            infos.push(result.info);
        }

        Ok(VecStep {
            observations: self.stack(observations)?,
            rewards,
            dones,
            infos,
        })
    }

    fn close(&mut self) {
        for env in &mut self.envs {
            env.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvInfo, StepResult};
    use ndarray::Array1;

    /// Counts steps and terminates after `horizon`.
    struct Ticker {
        t: usize,
        horizon: usize,
    }

    impl Env for Ticker {
        fn observation_size(&self) -> usize {
            2
        }

        fn num_actions(&self) -> usize {
            3
        }

        fn reset(&mut self, _seed: Option<u64>) -> Array1<f32> {
            self.t = 0;
            Array1::from_vec(vec![0.0, 1.0])
        }

        fn step(&mut self, _action: usize) -> StepResult {
            self.t += 1;
            StepResult {
                observation: Array1::from_vec(vec![self.t as f32, 1.0]),
                reward: 1.0,
                terminated: self.t >= self.horizon,
                truncated: false,
                info: EnvInfo::new(),
            }
        }
    }

    fn ticker(horizon: usize) -> Serial<Ticker> {
        Serial::new(move || Ticker { t: 0, horizon }, 3)
    }

    #[test]
    fn test_reset_shape() {
        let mut envs = ticker(2);
        let obs = envs.reset(Some(7)).unwrap();
        assert_eq!(obs.dim(), (3, 2));
        assert_eq!(envs.num_actions(), 3);
    }

    #[test]
    fn test_auto_reset_reports_episode_return() {
        let mut envs = ticker(2);
        envs.reset(None).unwrap();

        let first = envs.step(&[0, 1, 2]).unwrap();
        assert!(first.dones.iter().all(|d| !d));
        assert_eq!(first.observations[[0, 0]], 1.0);

        let second = envs.step(&[0, 1, 2]).unwrap();
        assert!(second.dones.iter().all(|&d| d));
        // Observation is the first one of the next episode
        assert_eq!(second.observations[[0, 0]], 0.0);
        assert_eq!(second.episode_returns().collect::<Vec<_>>(), vec![2.0; 3]);

        let masks = second.masks(tch::Device::Cpu);
        assert_eq!(masks.size(), vec![3, 1]);
        assert_eq!(masks.sum(tch::Kind::Float).double_value(&[]), 0.0);
    }

    #[test]
    fn test_rejects_bad_actions() {
        let mut envs = ticker(2);
        envs.reset(None).unwrap();
        assert!(matches!(
            envs.step(&[0, 1]),
            Err(CurioError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            envs.step(&[0, 1, 3]),
            Err(CurioError::InvalidAction { action: 3, .. })
        ));
    }
}
