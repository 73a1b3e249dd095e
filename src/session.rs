//! Independent training sessions
//!
//! A [`TrainingSession`] owns everything one run mutates: networks,
//! optimizer state, observation filter, RNG, environment and sinks. Several
//! sessions never share state, so they can run back to back in one process.

use std::path::{Path, PathBuf};

use anyhow::Context;
use burn::tensor::backend::AutodiffBackend;
use tracing::{info, warn};

use crate::{
    algo::{TRPOAgent, UpdateReport},
    checkpoint::{Checkpoint, CheckpointStore},
    config::{EnvKind, TrpoConfig},
    diagnostics::{DiagnosticsSink, IterationDiagnostics, JsonLinesSink, MultiSink, TracingSink},
    env::{ContinuousActionSpace, Environment},
    gym::{LinearQuadratic, Pendulum},
    nn::{FlatParams, GaussianActor, GaussianActorConfig, MLPConfig, MLP},
};

pub type SessionAgent<B, E> = TRPOAgent<B, GaussianActor<B>, MLP<B>, E>;

/// Outcome of a finished session
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub session: usize,
    pub iterations: usize,
    pub accepted_updates: usize,
    pub last_score: f32,
    pub best_score: f32,
}

pub struct TrainingSession<B, E>
where
    B: AutodiffBackend,
    E: Environment<State = Vec<f32>, Action = Vec<f32>> + ContinuousActionSpace,
{
    session: usize,
    iteration: usize,
    agent: SessionAgent<B, E>,
    env: E,
    sink: Box<dyn DiagnosticsSink>,
    store: Option<CheckpointStore>,
    plot_freq: usize,
    last_score: f32,
}

/// Actor and critic for an environment, initialised from the backend RNG
pub fn build_agent<B, E>(config: &TrpoConfig, env: &E, seed: u64, device: &B::Device) -> SessionAgent<B, E>
where
    B: AutodiffBackend,
    E: Environment<State = Vec<f32>, Action = Vec<f32>> + ContinuousActionSpace,
{
    B::seed(device, seed);
    let network = &config.network;
    let actor = GaussianActorConfig::new(env.observation_dim(), env.action_dim())
        .with_hidden_layers(network.hidden_layers.clone())
        .with_use_relu(network.use_relu)
        .with_initial_log_std(network.initial_log_std)
        .init::<B>(device);
    let critic = MLPConfig::new(env.observation_dim(), network.hidden_layers.clone(), 1)
        .with_use_relu(network.use_relu)
        .init::<B>(device);

    TRPOAgent::new(
        actor,
        critic,
        config.agent.clone(),
        env.observation_dim(),
        seed,
        device.clone(),
    )
}

impl<B, E> TrainingSession<B, E>
where
    B: AutodiffBackend,
    E: Environment<State = Vec<f32>, Action = Vec<f32>> + ContinuousActionSpace,
{
    /// Seed everything with `seed_base + session` and build fresh networks
    pub fn new(
        session: usize,
        config: &TrpoConfig,
        mut env: E,
        device: &B::Device,
        sink: Box<dyn DiagnosticsSink>,
        store: Option<CheckpointStore>,
    ) -> Self {
        let seed = config.run.seed_base + session as u64;
        env.seed(seed);
        let agent = build_agent::<B, E>(config, &env, seed, device);

        Self {
            session,
            iteration: 0,
            agent,
            env,
            sink,
            store,
            plot_freq: config.run.plot_freq.max(1),
            last_score: 0.0,
        }
    }

    pub fn agent(&self) -> &SessionAgent<B, E> {
        &self.agent
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Continue from a checkpoint's parameters, filter and iteration count
    pub fn resume(&mut self, path: &Path) -> anyhow::Result<()> {
        let checkpoint = CheckpointStore::load(path)?;
        self.agent
            .load_state(&checkpoint.actor, &checkpoint.critic, checkpoint.filter)
            .with_context(|| format!("restoring {}", path.display()))?;
        self.iteration = checkpoint.iteration;
        self.last_score = checkpoint.score.unwrap_or(f32::NAN);
        info!(session = self.session, iteration = self.iteration, path = %path.display(), "resumed");
        Ok(())
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            session: self.session,
            iteration: self.iteration,
            score: self.last_score.is_finite().then_some(self.last_score),
            actor: self.agent.actor().flat_params(),
            critic: self.agent.critic().flat_params(),
            filter: self.agent.filter().stat().clone(),
            config: self.agent.config().clone(),
        }
    }

    pub fn save_checkpoint(&self) -> anyhow::Result<Option<PathBuf>> {
        match &self.store {
            Some(store) => Ok(Some(store.save(&self.checkpoint())?)),
            None => Ok(None),
        }
    }

    /// Collect, update, record diagnostics and checkpoint on schedule
    pub fn run_iteration(&mut self) -> anyhow::Result<UpdateReport> {
        let trajectory = self.agent.collect_trajectory(&mut self.env);
        let report = self.agent.update(&trajectory);
        self.iteration += 1;
        self.last_score = trajectory.mean_score();

        info!(
            session = self.session,
            iteration = self.iteration,
            score = self.last_score,
            episodes = trajectory.episodes(),
            accepted = report.outcome.is_accepted(),
            "iteration finished"
        );

        if self.iteration % self.plot_freq == 0 {
            let diagnostics = IterationDiagnostics::from_report(
                self.session,
                self.iteration,
                self.last_score,
                trajectory.episodes(),
                trajectory.len(),
                &report,
            );
            if let Err(err) = self.sink.record(&diagnostics) {
                warn!(error = %err, "diagnostics sink failed");
            }
        }

        if self.store.as_ref().is_some_and(|s| s.should_save(self.iteration)) {
            self.save_checkpoint()?;
        }

        Ok(report)
    }

    /// Run `iterations` more iterations and write a final checkpoint
    pub fn run(&mut self, iterations: usize) -> anyhow::Result<SessionSummary> {
        let mut summary = SessionSummary {
            session: self.session,
            iterations: 0,
            accepted_updates: 0,
            last_score: self.last_score,
            best_score: f32::NEG_INFINITY,
        };

        for _ in 0..iterations {
            let report = self.run_iteration()?;
            summary.iterations += 1;
            if report.outcome.is_accepted() {
                summary.accepted_updates += 1;
            }
            summary.last_score = self.last_score;
            summary.best_score = summary.best_score.max(self.last_score);
        }

        self.save_checkpoint()?;
        Ok(summary)
    }
}

/// Where a run writes its outputs
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub logdir: Option<PathBuf>,
    pub checkpoint_dir: Option<PathBuf>,
    /// Checkpoint to resume every session from
    pub load_model: Option<PathBuf>,
}

/// Tracing plus, when a logdir is set and usable, a JSON-lines file
///
/// A diagnostics file that cannot be opened only costs the file output.
fn session_sink(options: &RunOptions, env: EnvKind, session: usize) -> Box<dyn DiagnosticsSink> {
    let mut sink = MultiSink::new().with(TracingSink);
    if let Some(logdir) = &options.logdir {
        match JsonLinesSink::create(JsonLinesSink::path_for(logdir, env.name(), session)) {
            Ok(file) => sink = sink.with(file),
            Err(err) => warn!(session, error = %err, "diagnostics file unavailable, logging only"),
        }
    }
    Box::new(sink)
}

fn run_sessions_with<B, E>(
    config: &TrpoConfig,
    options: &RunOptions,
    device: &B::Device,
    make_env: impl Fn() -> E,
) -> anyhow::Result<Vec<SessionSummary>>
where
    B: AutodiffBackend,
    E: Environment<State = Vec<f32>, Action = Vec<f32>> + ContinuousActionSpace,
{
    let store = options
        .checkpoint_dir
        .as_ref()
        .map(|dir| CheckpointStore::new(dir, config.run.checkpoint_every));

    let mut summaries = Vec::with_capacity(config.run.sessions);
    for session in 1..=config.run.sessions {
        let sink = session_sink(options, config.run.env, session);
        let mut training = TrainingSession::<B, E>::new(session, config, make_env(), device, sink, store.clone());
        if let Some(path) = &options.load_model {
            training.resume(path)?;
        }

        info!(session, env = config.run.env.name(), "session started");
        let summary = training.run(config.run.iterations)?;
        info!(
            session,
            accepted = summary.accepted_updates,
            last_score = summary.last_score,
            best_score = summary.best_score,
            "session finished"
        );
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Run sessions `1..=sessions` one after another, each fully independent
pub fn run_sessions<B: AutodiffBackend>(
    config: &TrpoConfig,
    options: &RunOptions,
    device: &B::Device,
) -> anyhow::Result<Vec<SessionSummary>> {
    config.validate()?;
    let horizon = config.run.env_horizon;
    match config.run.env {
        EnvKind::Pendulum => run_sessions_with::<B, _>(config, options, device, || Pendulum::new(horizon)),
        EnvKind::Lqr => run_sessions_with::<B, _>(config, options, device, || LinearQuadratic::new(horizon)),
    }
}

fn evaluate_with<B, E>(
    config: &TrpoConfig,
    checkpoint: &Checkpoint,
    episodes: usize,
    device: &B::Device,
    mut env: E,
) -> anyhow::Result<Vec<f32>>
where
    B: AutodiffBackend,
    E: Environment<State = Vec<f32>, Action = Vec<f32>> + ContinuousActionSpace,
{
    let seed = config.run.seed_base + checkpoint.session as u64;
    env.seed(seed);
    let mut agent = build_agent::<B, E>(config, &env, seed, device);
    agent.load_state(&checkpoint.actor, &checkpoint.critic, checkpoint.filter.clone())?;
    Ok(agent.evaluate(&mut env, episodes))
}

/// Deterministic episode scores of a checkpointed policy
pub fn evaluate_checkpoint<B: AutodiffBackend>(
    config: &TrpoConfig,
    path: &Path,
    episodes: usize,
    device: &B::Device,
) -> anyhow::Result<Vec<f32>> {
    let checkpoint = CheckpointStore::load(path)?;
    let horizon = config.run.env_horizon;
    match config.run.env {
        EnvKind::Pendulum => evaluate_with::<B, _>(config, &checkpoint, episodes, device, Pendulum::new(horizon)),
        EnvKind::Lqr => evaluate_with::<B, _>(config, &checkpoint, episodes, device, LinearQuadratic::new(horizon)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullSink;
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn tiny_config() -> TrpoConfig {
        let mut config = TrpoConfig::default();
        config.agent.min_steps_per_iteration = 30;
        config.network.hidden_layers = vec![8];
        config.run.env = EnvKind::Lqr;
        config.run.env_horizon = 10;
        config.run.sessions = 2;
        config.run.iterations = 2;
        config.run.checkpoint_every = 1;
        config
    }

    #[test]
    fn sessions_write_checkpoints_and_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions {
            logdir: Some(dir.path().join("logs")),
            checkpoint_dir: Some(dir.path().join("ckpt")),
            load_model: None,
        };
        let device = NdArrayDevice::default();

        let summaries = run_sessions::<TestBackend>(&tiny_config(), &options, &device).unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.iterations == 2));

        let store = CheckpointStore::new(dir.path().join("ckpt"), 1);
        for session in 1..=2 {
            let latest = store.latest(session).unwrap().unwrap();
            assert_eq!(CheckpointStore::load(latest).unwrap().iteration, 2);

            let log = JsonLinesSink::path_for(&dir.path().join("logs"), "lqr", session);
            assert_eq!(std::fs::read_to_string(log).unwrap().lines().count(), 2);
        }
    }

    #[test]
    fn unwritable_logdir_does_not_stop_training() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the log directory should be
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let mut config = tiny_config();
        config.run.sessions = 1;
        let options = RunOptions {
            logdir: Some(blocker.join("logs")),
            checkpoint_dir: Some(dir.path().join("ckpt")),
            load_model: None,
        };

        let summaries = run_sessions::<TestBackend>(&config, &options, &NdArrayDevice::default()).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].iterations, 2);
        let store = CheckpointStore::new(dir.path().join("ckpt"), 1);
        assert!(store.latest(1).unwrap().is_some());
    }

    #[test]
    fn resume_restores_parameters_and_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let device = NdArrayDevice::default();
        let config = tiny_config();
        let store = CheckpointStore::new(dir.path(), 1);

        let mut first = TrainingSession::<TestBackend, _>::new(
            1,
            &config,
            LinearQuadratic::new(10),
            &device,
            Box::new(NullSink),
            Some(store.clone()),
        );
        first.run(1).unwrap();
        let path = store.latest(1).unwrap().unwrap();

        let mut second = TrainingSession::<TestBackend, _>::new(
            1,
            &config,
            LinearQuadratic::new(10),
            &device,
            Box::new(NullSink),
            None,
        );
        second.resume(&path).unwrap();
        assert_eq!(second.iteration(), 1);
        assert_eq!(second.agent().actor().flat_params(), first.agent().actor().flat_params());
        assert_eq!(second.agent().filter().stat(), first.agent().filter().stat());

        let scores = evaluate_checkpoint::<TestBackend>(&config, &path, 3, &device).unwrap();
        assert_eq!(scores.len(), 3);
    }
}
