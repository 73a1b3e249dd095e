//! Saving and restoring training state
//!
//! A checkpoint holds the flat actor and critic parameters, the observation
//! filter statistics and the agent configuration, as JSON under
//! `<dir>/session-<s>/ckpt-<iteration>-<score>.json`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    algo::TRPOAgentConfig,
    error::{Result, TrpoError},
    normalize::RunningStat,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session: usize,
    pub iteration: usize,
    /// Mean episode score of the iteration that produced it, `None` when it
    /// was not finite (JSON has no NaN)
    pub score: Option<f32>,
    pub actor: Vec<f32>,
    pub critic: Vec<f32>,
    pub filter: RunningStat,
    pub config: TRPOAgentConfig,
}

/// Directory of checkpoints, one subdirectory per session
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    /// Save every N iterations
    save_every: usize,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, save_every: usize) -> Self {
        Self {
            dir: dir.into(),
            save_every,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn should_save(&self, iteration: usize) -> bool {
        self.save_every > 0 && iteration > 0 && iteration % self.save_every == 0
    }

    pub fn session_dir(&self, session: usize) -> PathBuf {
        self.dir.join(format!("session-{session}"))
    }

    pub fn checkpoint_path(&self, session: usize, iteration: usize, score: Option<f32>) -> PathBuf {
        let name = match score {
            Some(score) => format!("ckpt-{iteration}-{score:.3}.json"),
            None => format!("ckpt-{iteration}-nan.json"),
        };
        self.session_dir(session).join(name)
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let path = self.checkpoint_path(checkpoint.session, checkpoint.iteration, checkpoint.score);
        fs::create_dir_all(self.session_dir(checkpoint.session))?;
        fs::write(&path, serde_json::to_vec(checkpoint)?)?;
        info!(path = %path.display(), "saved checkpoint");
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Checkpoint> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|err| TrpoError::Checkpoint(format!("reading {}: {err}", path.display())))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Path of the highest-iteration checkpoint of a session, if any
    pub fn latest(&self, session: usize) -> Result<Option<PathBuf>> {
        let dir = self.session_dir(session);
        if !dir.exists() {
            return Ok(None);
        }

        let mut best: Option<(usize, PathBuf)> = None;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(iteration) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_iteration)
            else {
                continue;
            };
            if best.as_ref().map_or(true, |(i, _)| iteration > *i) {
                best = Some((iteration, path));
            }
        }
        Ok(best.map(|(_, path)| path))
    }
}

/// `ckpt-<iteration>-<score>.json` → `iteration`
fn parse_iteration(file_name: &str) -> Option<usize> {
    let rest = file_name.strip_prefix("ckpt-")?.strip_suffix(".json")?;
    let (iteration, _score) = rest.split_once('-')?;
    iteration.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(iteration: usize, score: f32) -> Checkpoint {
        let mut filter = RunningStat::new(2);
        filter.push(&[1.0, 2.0]);
        filter.push(&[3.0, 0.0]);
        Checkpoint {
            session: 3,
            iteration,
            score: Some(score),
            actor: vec![0.5, -0.25, 1.0],
            critic: vec![2.0, 0.0],
            filter,
            config: TRPOAgentConfig::default(),
        }
    }

    #[test]
    fn save_then_load_restores_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), 100);

        let path = store.save(&checkpoint(100, -153.2)).unwrap();
        assert!(path.ends_with("session-3/ckpt-100--153.200.json"));

        let loaded = CheckpointStore::load(&path).unwrap();
        assert_eq!(loaded.actor, vec![0.5, -0.25, 1.0]);
        assert_eq!(loaded.critic, vec![2.0, 0.0]);
        assert_eq!(loaded.filter.n, 2);
        assert_eq!(loaded.filter.mean, vec![2.0, 1.0]);
        assert_eq!(loaded.config.cg_iterations, 10);
        assert_eq!(loaded.config.max_kl, 0.01);
    }

    #[test]
    fn latest_picks_the_highest_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), 100);
        assert!(store.latest(3).unwrap().is_none());

        store.save(&checkpoint(100, 1.0)).unwrap();
        store.save(&checkpoint(1200, -5.0)).unwrap();
        store.save(&checkpoint(300, 9.0)).unwrap();

        let latest = store.latest(3).unwrap().unwrap();
        assert_eq!(CheckpointStore::load(latest).unwrap().iteration, 1200);
    }

    #[test]
    fn missing_score_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), 100);

        let path = store
            .save(&Checkpoint {
                score: None,
                ..checkpoint(400, 0.0)
            })
            .unwrap();
        assert!(path.ends_with("session-3/ckpt-400-nan.json"));

        let loaded = CheckpointStore::load(&path).unwrap();
        assert_eq!(loaded.score, None);
        assert_eq!(loaded.iteration, 400);
        assert_eq!(store.latest(3).unwrap(), Some(path));
    }

    #[test]
    fn missing_file_is_a_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CheckpointStore::load(dir.path().join("nope.json"));
        assert!(matches!(result, Err(TrpoError::Checkpoint(_))));
    }

    #[test]
    fn save_schedule() {
        let store = CheckpointStore::new("unused", 100);
        assert!(!store.should_save(0));
        assert!(!store.should_save(99));
        assert!(store.should_save(200));
        assert!(!CheckpointStore::new("unused", 0).should_save(100));
    }
}
