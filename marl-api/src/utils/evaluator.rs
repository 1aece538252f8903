use candle_core::{Result, Tensor};
use marl_core::{
    distributions::Distribution,
    env::Env,
    env_pools::{SequentialStepHooks, StepTransition},
    rng,
};

pub struct EvaluatorOptions {
    pub eval_episodes: usize,
    /// Evaluate once this many env steps have been collected since the last
    /// evaluation.
    pub eval_freq: usize,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            eval_episodes: 10,
            eval_freq: 10_000,
        }
    }
}

impl EvaluatorOptions {
    pub fn build<E: Env>(self, env: E) -> Evaluator<E> {
        Evaluator {
            env,
            eval_episodes: self.eval_episodes,
            eval_freq: self.eval_freq,
            steps_since_eval: 0,
            history: vec![],
        }
    }
}

/// Runs evaluation episodes on a held out environment during rollout
/// collection. Mean episode rewards are logged and kept in `history`.
pub struct Evaluator<E: Env> {
    env: E,
    eval_episodes: usize,
    eval_freq: usize,
    steps_since_eval: usize,
    pub history: Vec<f32>,
}

impl<E: Env> Evaluator<E> {
    pub fn evaluate(&mut self, distr: &dyn Distribution) -> Result<()> {
        let mut total_reward = 0.;
        for _ in 0..self.eval_episodes {
            let mut state = self.env.reset(rng::next_seed())?;
            loop {
                let (action, _) = distr.get_action(&state.unsqueeze(0)?)?;
                let snapshot = self.env.step(&action)?;
                total_reward += snapshot.reward;
                if snapshot.done() {
                    break;
                }
                state = snapshot.state;
            }
        }
        let mean_episode_reward = total_reward / self.eval_episodes as f32;
        tracing::info!(mean_episode_reward, "evaluation");
        self.history.push(mean_episode_reward);
        Ok(())
    }
}

impl<E: Env> SequentialStepHooks for Evaluator<E> {
    fn step_hook(
        &mut self,
        distr: &dyn Distribution,
        transitions: &mut Vec<StepTransition>,
    ) -> Result<bool> {
        self.steps_since_eval += transitions.len();
        if self.steps_since_eval >= self.eval_freq {
            self.evaluate(distr)?;
            self.steps_since_eval = 0;
        }
        Ok(false)
    }

    fn post_rollout_hook(&mut self, _last_states: &mut Vec<Tensor>) -> Result<bool> {
        Ok(false)
    }
}
