use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::Module;
use burn::optim::{AdamConfig, Optimizer};
use burn::record::{DefaultFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use log::{debug, info, warn};
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::PpoError;
use crate::rl_algorithm::ppo::config::PpoConfig;
use crate::rl_algorithm::ppo::ppo_agent::PPO;
use crate::rl_algorithm::preload_net::actor_critic::{ActorCritic, ActorCriticConfig};
use crate::rl_env::env::{Environment, Observation, StepOutcome};

use super::memory::{Memory, Transition, TransitionBatch};
use super::metric::{MetricSample, ReturnAccumulator};
use super::model::PolicyValueModel;
use super::rl_utils::{ndarray2tensor2, tensor2vec, UpdateInfo};
use super::{EpochLogger, EpochLoggerAggMode};

/// Asks a running session to stop. Honored before the next rollout starts.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Turns one environment step into the transition stored for training.
///
/// The reward is divided by `reward_scale`; only termination marks the
/// transition as done, a truncated step still bootstraps from `next_obs`.
pub fn make_transition<I>(
    obs: Observation,
    action: usize,
    action_prob: f32,
    outcome: &StepOutcome<I>,
    reward_scale: f32,
) -> Transition {
    let action_prob = if action_prob.is_finite() { action_prob } else { 0.0 };
    return Transition::new(
        obs,
        action,
        outcome.reward / reward_scale,
        outcome.next_obs.clone(),
        action_prob,
        outcome.terminated,
    );
}

/// Adam with the optimizer settings carried by `config`.
pub fn adam_optimizer<B: AutodiffBackend, M: PolicyValueModel<B>>(
    config: &PpoConfig,
) -> impl Optimizer<M, B> {
    AdamConfig::new()
        .with_grad_clipping(config.grad_clip_norm.map(GradientClippingConfig::Norm))
        .init::<B, M>()
}

/// Runner over the default actor-critic network, sized from `env` and seeded
/// from `config.seed`.
pub fn ppo_runner<E: Environment, B: AutodiffBackend>(
    env: E,
    config: PpoConfig,
    device: B::Device,
) -> Result<OnPolicyRunner<E, B, ActorCritic<B>, impl Optimizer<ActorCritic<B>, B>>, PpoError> {
    config.validate()?;
    B::seed(config.seed);
    let model = ActorCriticConfig::new(env.get_obs_dim(), env.get_action_dim())
        .with_hidden_dims(config.hidden_dims.clone())
        .init::<B>(&device);
    let optimizer = adam_optimizer::<B, ActorCritic<B>>(&config);
    OnPolicyRunner::new(env, model, optimizer, config, device)
}

/// Drives one training session.
///
/// Each call to `next` plays episodes until the next metric sample is due.
/// Inside an episode, steps are collected into the trajectory buffer until
/// `horizon` is reached or the episode ends, then one PPO update consumes the
/// whole buffer. After an error or a stop request the iterator is exhausted.
pub struct OnPolicyRunner<E, B, M, O>
where
    E: Environment,
    B: AutodiffBackend,
    M: PolicyValueModel<B>,
    O: Optimizer<M, B>,
{
    env: E,
    model: M,
    optimizer: O,
    ppo: PPO<B, M>,
    memory: Memory,
    config: PpoConfig,
    device: B::Device,
    rng: StdRng,
    accumulator: ReturnAccumulator,
    logger: EpochLogger,
    stop: StopHandle,
    episodes: usize,
    total_steps: usize,
    last_update: Option<UpdateInfo>,
    finished: bool,
    backend: PhantomData<B>,
}

impl<E, B, M, O> OnPolicyRunner<E, B, M, O>
where
    E: Environment,
    B: AutodiffBackend,
    M: PolicyValueModel<B>,
    O: Optimizer<M, B>,
{
    pub fn new(
        env: E,
        model: M,
        optimizer: O,
        config: PpoConfig,
        device: B::Device,
    ) -> Result<Self, PpoError> {
        config.validate()?;
        if model.get_obs_dim() != env.get_obs_dim() || model.get_action_dim() != env.get_action_dim()
        {
            return Err(PpoError::invalid(
                "model",
                format!(
                    "network is {}->{} but environment is {}->{}",
                    model.get_obs_dim(),
                    model.get_action_dim(),
                    env.get_obs_dim(),
                    env.get_action_dim()
                ),
            ));
        }
        let logger = match config.logdir.as_deref() {
            Some(logdir) => EpochLogger::with_writer(logdir, "ppo"),
            None => EpochLogger::disabled(),
        };
        info!(
            "ppo session: obs_dim={} action_dim={} lr={} eps_clip={} entropy_coef={} horizon={} max_episodes={}",
            env.get_obs_dim(),
            env.get_action_dim(),
            config.learning_rate,
            config.epsilon_clip,
            config.entropy_coef,
            config.horizon,
            config.max_episodes
        );
        Ok(Self {
            env,
            model,
            optimizer,
            ppo: PPO::new(),
            memory: Memory::with_capacity(config.horizon),
            rng: StdRng::seed_from_u64(config.seed),
            accumulator: ReturnAccumulator::new(config.print_interval),
            logger,
            stop: StopHandle::new(),
            episodes: 0,
            total_steps: 0,
            last_update: None,
            finished: false,
            config,
            device,
            backend: PhantomData,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    /// Completed episodes.
    pub fn episodes(&self) -> usize {
        self.episodes
    }

    pub fn updates(&self) -> usize {
        self.ppo.updates()
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn last_update(&self) -> Option<&UpdateInfo> {
        self.last_update.as_ref()
    }

    fn select_action(&mut self, obs: &Observation) -> (usize, f32) {
        let input = ndarray2tensor2::<B::InnerBackend, f32>(
            obs.clone().insert_axis(Axis(0)),
            &self.device,
        );
        let (dist, _) = self.model.eval_forward(input);
        let probs = tensor2vec(&dist.probs());
        let action = dist.sample(&mut self.rng)[0];
        return (action, probs.get(action).copied().unwrap_or(0.0));
    }

    /// Steps until the horizon or the end of the episode. Returns the last
    /// observation, whether the episode ended and the raw reward collected.
    fn collect_rollout(&mut self, mut obs: Observation) -> Result<(Observation, bool, f32), PpoError> {
        let mut reward_sum = 0.0;
        for _ in 0..self.config.horizon {
            let (action, action_prob) = self.select_action(&obs);
            let outcome = self.env.step(action).map_err(PpoError::Environment)?;
            self.total_steps += 1;
            reward_sum += outcome.reward;
            self.memory.record(make_transition(
                obs,
                action,
                action_prob,
                &outcome,
                self.config.reward_scale,
            ));
            let done = outcome.is_done();
            obs = outcome.next_obs;
            if done {
                return Ok((obs, true, reward_sum));
            }
        }
        return Ok((obs, false, reward_sum));
    }

    fn update(&mut self) -> Result<(), PpoError> {
        debug!(
            "update={} on {} transitions",
            self.ppo.updates() + 1,
            self.memory.len()
        );
        let transitions = self.memory.drain();
        let batch = TransitionBatch::<B>::from_transitions(&transitions, &self.device)?;
        let (model, info) =
            self.ppo
                .train(self.model.clone(), &batch, &mut self.optimizer, &self.config);
        self.model = model;
        if !info.is_finite() {
            warn!("update {} produced non-finite losses {:?}", self.ppo.updates(), info);
        }
        self.logger
            .add_scalar_agg(("train", "policy_loss"), info.policy_loss, EpochLoggerAggMode::Mean);
        self.logger
            .add_scalar_agg(("train", "value_loss"), info.value_loss, EpochLoggerAggMode::Mean);
        self.logger
            .add_scalar_agg(("train", "entropy"), info.entropy, EpochLoggerAggMode::Mean);
        self.logger
            .add_scalar_agg(("train", "approx_kl"), info.approx_kl, EpochLoggerAggMode::Max);
        self.last_update = Some(info);
        Ok(())
    }

    /// Plays one episode. `None` when a stop request cut it short.
    fn run_episode(&mut self) -> Result<Option<f32>, PpoError> {
        let (mut obs, _) = self.env.reset().map_err(PpoError::Environment)?;
        let mut episode_return = 0.0;
        loop {
            if self.stop.is_stopped() {
                return Ok(None);
            }
            let (next_obs, ended, reward_sum) = self.collect_rollout(obs)?;
            episode_return += reward_sum;
            self.update()?;
            if ended {
                return Ok(Some(episode_return));
            }
            obs = next_obs;
        }
    }

    pub fn save_checkpoint(&self, dir: &str) -> Result<(), PpoError> {
        std::fs::create_dir_all(dir).map_err(|e| PpoError::Checkpoint(format!("{}: {}", dir, e)))?;
        let recorder = DefaultFileRecorder::<crate::MyPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(format!("{}/model", dir), &recorder)
            .map_err(|e| PpoError::Checkpoint(format!("{}/model: {}", dir, e)))?;
        recorder
            .record(self.optimizer.to_record(), format!("{}/optimizer", dir).into())
            .map_err(|e| PpoError::Checkpoint(format!("{}/optimizer: {}", dir, e)))?;
        self.config.save_json(&format!("{}/config.json", dir))?;
        info!("checkpoint saved to {} after {} episodes", dir, self.episodes);
        Ok(())
    }

    /// Loads network and optimizer state written by [`Self::save_checkpoint`].
    pub fn resume_from_checkpoint(mut self, dir: &str) -> Result<Self, PpoError> {
        let recorder = DefaultFileRecorder::<crate::MyPrecisionSettings>::new();
        self.model = self
            .model
            .load_file(format!("{}/model", dir), &recorder, &self.device)
            .map_err(|e| PpoError::Checkpoint(format!("{}/model: {}", dir, e)))?;
        let record: O::Record = recorder
            .load(format!("{}/optimizer", dir).into(), &self.device)
            .map_err(|e| PpoError::Checkpoint(format!("{}/optimizer: {}", dir, e)))?;
        self.optimizer = self.optimizer.load_record(record);
        info!("resumed from checkpoint {}", dir);
        Ok(self)
    }
}

impl<E, B, M, O> Iterator for OnPolicyRunner<E, B, M, O>
where
    E: Environment,
    B: AutodiffBackend,
    M: PolicyValueModel<B>,
    O: Optimizer<M, B>,
{
    type Item = Result<MetricSample, PpoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        while self.episodes < self.config.max_episodes {
            if self.stop.is_stopped() {
                break;
            }
            let episode_return = match self.run_episode() {
                Ok(Some(episode_return)) => episode_return,
                Ok(None) => break,
                Err(e) => {
                    warn!("training stopped after {} episodes: {}", self.episodes, e);
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            self.episodes += 1;
            debug!("episode={} return={}", self.episodes, episode_return);
            self.logger
                .add_scalar_agg(("train", "episode_return"), episode_return, EpochLoggerAggMode::Mean);
            if let Some(sample) = self.accumulator.push(self.episodes, episode_return) {
                info!(
                    "# of episode :{}, avg score : {:.1}",
                    sample.episode, sample.average_reward
                );
                self.logger.add_scalar(("train", "avg_score"), sample.average_reward);
                self.logger.add_scalar(("train", "updates"), self.ppo.updates() as f32);
                self.logger.log(sample.episode);
                return Some(Ok(sample));
            }
        }
        if self.stop.is_stopped() {
            info!("stop requested, ending after {} episodes", self.episodes);
        }
        self.finished = true;
        None
    }
}

impl<E, B, M, O> FusedIterator for OnPolicyRunner<E, B, M, O>
where
    E: Environment,
    B: AutodiffBackend,
    M: PolicyValueModel<B>,
    O: Optimizer<M, B>,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl_env::stub_env::{FailingEnv, FixedEpisodeEnv};
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::backend::Autodiff;
    use burn::tensor::Tensor;
    use ndarray::array;
    use tempdir::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn small_config() -> PpoConfig {
        init_logger();
        PpoConfig::new()
            .with_hidden_dims(vec![8])
            .with_update_epochs(1)
    }

    #[test]
    fn test_single_step_episode_updates_once() {
        let config = small_config().with_max_episodes(1).with_horizon(5);
        let env = FixedEpisodeEnv::new(3, 2, 1, 1.0);
        let mut runner = ppo_runner::<_, TestBackend>(env, config, NdArrayDevice::default()).unwrap();

        assert!(runner.next().is_none());
        assert_eq!(runner.episodes(), 1);
        assert_eq!(runner.updates(), 1);
        assert_eq!(runner.last_update().unwrap().batch_size, 1);
        assert_eq!(runner.env().steps, 1);
        assert_eq!(runner.env().resets, 1);
        assert!(runner.next().is_none());
    }

    #[test]
    fn test_metric_every_twenty_episodes() {
        // 4 steps of 25.0 per episode, split by a horizon of 2
        let config = small_config().with_max_episodes(40).with_horizon(2);
        let env = FixedEpisodeEnv::new(2, 3, 4, 25.0);
        let runner = ppo_runner::<_, TestBackend>(env, config, NdArrayDevice::default()).unwrap();

        let samples: Vec<MetricSample> = runner.collect::<Result<_, _>>().unwrap();
        assert_eq!(
            samples,
            vec![MetricSample::new(20, 100.0), MetricSample::new(40, 100.0)]
        );
    }

    #[test]
    fn test_leftover_episodes_not_reported() {
        let config = small_config().with_max_episodes(30).with_horizon(8);
        let env = FixedEpisodeEnv::new(2, 2, 2, 1.0);
        let mut runner = ppo_runner::<_, TestBackend>(env, config, NdArrayDevice::default()).unwrap();

        assert_eq!(runner.next().unwrap().unwrap(), MetricSample::new(20, 2.0));
        assert!(runner.next().is_none());
        assert_eq!(runner.episodes(), 30);
        assert_eq!(runner.updates(), 30);
    }

    #[test]
    fn test_horizon_splits_episode() {
        let config = small_config().with_max_episodes(2).with_horizon(3);
        let env = FixedEpisodeEnv::new(2, 2, 7, 1.0);
        let mut runner = ppo_runner::<_, TestBackend>(env, config, NdArrayDevice::default()).unwrap();

        assert!(runner.next().is_none());
        // 3 + 3 + 1 steps per episode
        assert_eq!(runner.updates(), 6);
        assert_eq!(runner.last_update().unwrap().batch_size, 1);
        assert_eq!(runner.total_steps(), 14);
    }

    #[test]
    fn test_truncated_episodes_end_rollouts() {
        let config = small_config().with_max_episodes(3).with_horizon(10);
        let env = FixedEpisodeEnv::new(2, 2, 4, 1.0).truncating();
        let mut runner = ppo_runner::<_, TestBackend>(env, config, NdArrayDevice::default()).unwrap();

        assert!(runner.next().is_none());
        assert_eq!(runner.episodes(), 3);
        assert_eq!(runner.updates(), 3);
        assert_eq!(runner.env().resets, 3);
    }

    #[test]
    fn test_transition_done_means_terminated() {
        let truncated = StepOutcome::new(array![1.0f32], 50.0, false, true, ());
        let t = make_transition(array![0.0f32], 1, f32::NAN, &truncated, 100.0);
        assert!(!t.done);
        assert_eq!(t.reward, 0.5);
        assert_eq!(t.action_prob, 0.0);
        assert_eq!(t.next_obs, array![1.0f32]);

        let terminated = StepOutcome::new(array![1.0f32], -100.0, true, false, ());
        let t = make_transition(array![0.0f32], 0, 0.3, &terminated, 100.0);
        assert!(t.done);
        assert_eq!(t.reward, -1.0);
        assert_eq!(t.action_prob, 0.3);
    }

    #[test]
    fn test_environment_error_ends_session() {
        let config = small_config().with_horizon(2);
        let mut runner =
            ppo_runner::<_, TestBackend>(FailingEnv::new(4), config, NdArrayDevice::default()).unwrap();

        match runner.next() {
            Some(Err(PpoError::Environment(e))) => assert!(e.to_string().contains("step 4")),
            other => panic!("expected environment error, got {:?}", other.map(|r| r.is_ok())),
        }
        // one update for the first full horizon before the failure
        assert_eq!(runner.updates(), 1);
        assert!(runner.next().is_none());
    }

    #[test]
    fn test_stop_handle_halts_between_rollouts() {
        let config = small_config().with_max_episodes(100).with_horizon(4);
        let env = FixedEpisodeEnv::new(2, 2, 3, 1.0);
        let mut runner = ppo_runner::<_, TestBackend>(env, config, NdArrayDevice::default()).unwrap();
        let handle = runner.stop_handle();

        assert_eq!(runner.next().unwrap().unwrap().episode, 20);
        handle.stop();
        assert!(runner.next().is_none());
        assert_eq!(runner.episodes(), 20);
        assert_eq!(runner.env().resets, 20);
        assert!(runner.next().is_none());
    }

    #[test]
    fn test_stop_before_start() {
        let env = FixedEpisodeEnv::new(2, 2, 3, 1.0);
        let mut runner =
            ppo_runner::<_, TestBackend>(env, small_config(), NdArrayDevice::default()).unwrap();
        runner.stop_handle().stop();
        assert!(runner.next().is_none());
        assert_eq!(runner.env().resets, 0);
        assert_eq!(runner.updates(), 0);
    }

    #[test]
    fn test_rejects_invalid_setup() {
        let env = FixedEpisodeEnv::new(2, 2, 3, 1.0);
        let result = ppo_runner::<_, TestBackend>(
            env,
            small_config().with_horizon(0),
            NdArrayDevice::default(),
        );
        assert!(matches!(
            result.err(),
            Some(PpoError::InvalidConfig { field: "horizon", .. })
        ));

        let device = NdArrayDevice::default();
        let config = small_config();
        let model = ActorCriticConfig::new(5, 2)
            .with_hidden_dims(vec![8])
            .init::<TestBackend>(&device);
        let optimizer = adam_optimizer::<TestBackend, ActorCritic<TestBackend>>(&config);
        let result = OnPolicyRunner::new(FixedEpisodeEnv::new(2, 2, 3, 1.0), model, optimizer, config, device);
        assert!(matches!(
            result.err(),
            Some(PpoError::InvalidConfig { field: "model", .. })
        ));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = TempDir::new("ppo_ckpt").unwrap();
        let ckpt = dir.path().join("ckpt");
        let ckpt = ckpt.to_str().unwrap();
        let device = NdArrayDevice::default();
        let probe = Tensor::<TestBackend, 2>::from_floats([[0.3, -0.7]], &device);

        let config = small_config().with_max_episodes(3).with_horizon(4);
        let mut trained = ppo_runner::<_, TestBackend>(
            FixedEpisodeEnv::new(2, 2, 3, 1.0),
            config,
            NdArrayDevice::default(),
        )
        .unwrap();
        assert!(trained.next().is_none());
        trained.save_checkpoint(ckpt).unwrap();
        let expected = tensor2vec(&trained.model().pi(probe.clone()));

        let config = small_config().with_seed(7);
        let fresh = ppo_runner::<_, TestBackend>(
            FixedEpisodeEnv::new(2, 2, 3, 1.0),
            config,
            NdArrayDevice::default(),
        )
        .unwrap();
        let fresh = fresh.resume_from_checkpoint(ckpt).unwrap();
        let restored = tensor2vec(&fresh.model().pi(probe));
        assert_eq!(expected.len(), restored.len());
        for (a, b) in expected.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert!(PpoConfig::load_json(&format!("{}/config.json", ckpt)).is_ok());

        let missing = dir.path().join("missing");
        assert!(matches!(
            fresh.resume_from_checkpoint(missing.to_str().unwrap()),
            Err(PpoError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_logdir_writes_run() {
        let dir = TempDir::new("ppo_tb").unwrap();
        let config = small_config()
            .with_max_episodes(1)
            .with_print_interval(1)
            .with_logdir(Some(dir.path().to_str().unwrap().to_string()));
        let runner =
            ppo_runner::<_, TestBackend>(FixedEpisodeEnv::new(2, 2, 2, 3.0), config, NdArrayDevice::default())
                .unwrap();
        let samples: Vec<_> = runner.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(samples, vec![MetricSample::new(1, 6.0)]);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_some());
    }
}
