use ndarray::Array1;

/// Fixed-length state vector emitted by an environment.
pub type Observation = Array1<f32>;

#[derive(Debug, Clone)]
pub struct StepOutcome<I> {
    pub next_obs: Observation,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: I,
}

impl<I> StepOutcome<I> {
    pub fn new(next_obs: Observation, reward: f32, terminated: bool, truncated: bool, info: I) -> Self {
        Self {
            next_obs,
            reward,
            terminated,
            truncated,
            info,
        }
    }

    /// Terminated or truncated.
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A single discrete-action environment.
///
/// Errors returned from [`Environment::reset`] and [`Environment::step`] are
/// handed to the caller of the training loop unchanged; the runner never retries.
pub trait Environment {
    /// Information attached to every reset and step, ignored by the learner.
    type Info;

    fn get_obs_dim(&self) -> usize;

    /// Size of the discrete action set.
    fn get_action_dim(&self) -> usize;

    fn reset(&mut self) -> anyhow::Result<(Observation, Self::Info)>;

    fn step(&mut self, action: usize) -> anyhow::Result<StepOutcome<Self::Info>>;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    type Info = E::Info;

    fn get_obs_dim(&self) -> usize {
        (**self).get_obs_dim()
    }

    fn get_action_dim(&self) -> usize {
        (**self).get_action_dim()
    }

    fn reset(&mut self) -> anyhow::Result<(Observation, Self::Info)> {
        (**self).reset()
    }

    fn step(&mut self, action: usize) -> anyhow::Result<StepOutcome<Self::Info>> {
        (**self).step(action)
    }
}
