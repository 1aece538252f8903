use bincode::{Decode, Encode};
use candle_core::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

const META_FILE: &str = "meta.bin";
const CHECKPOINT_VERSION: u32 = 1;

/// Anything whose learned state can be written to and restored from a
/// checkpoint directory. Agents implement this by saving their varmaps as
/// safetensors files.
pub trait Checkpointable {
    fn save(&self, dir: &Path) -> Result<()>;
    fn restore(&mut self, dir: &Path) -> Result<()>;
}

#[derive(Debug, Encode, Decode)]
struct CheckpointMeta {
    version: u32,
    step: u64,
}

/// Writes one directory per checkpoint under `base_dir` and restores the one
/// with the highest step. Malformed entries in the directory are skipped so a
/// previously interrupted save never blocks resumption.
pub struct Saver {
    base_dir: PathBuf,
}

impl Saver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(Error::wrap)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn step_dir(&self, step: usize) -> PathBuf {
        self.base_dir.join(format!("step_{step:012}"))
    }

    pub fn save_step(&self, step: usize, agent: &impl Checkpointable) -> Result<PathBuf> {
        let dir = self.step_dir(step);
        fs::create_dir_all(&dir).map_err(Error::wrap)?;
        agent.save(&dir)?;
        let meta = CheckpointMeta {
            version: CHECKPOINT_VERSION,
            step: step as u64,
        };
        let encoded =
            bincode::encode_to_vec(&meta, bincode::config::standard()).map_err(Error::wrap)?;
        fs::write(dir.join(META_FILE), encoded).map_err(Error::wrap)?;
        tracing::info!(step, dir = %dir.display(), "saved checkpoint");
        Ok(dir)
    }

    /// The highest step with a readable checkpoint, if any.
    pub fn latest_step(&self) -> Result<Option<(usize, PathBuf)>> {
        let mut latest: Option<(usize, PathBuf)> = None;
        for entry in fs::read_dir(&self.base_dir).map_err(Error::wrap)? {
            let entry = entry.map_err(Error::wrap)?;
            let dir = entry.path();
            let Ok(encoded) = fs::read(dir.join(META_FILE)) else {
                continue;
            };
            let Ok((meta, _)) = bincode::decode_from_slice::<CheckpointMeta, _>(
                &encoded,
                bincode::config::standard(),
            ) else {
                tracing::warn!(dir = %dir.display(), "skipping unreadable checkpoint");
                continue;
            };
            if meta.version != CHECKPOINT_VERSION {
                tracing::warn!(
                    dir = %dir.display(),
                    version = meta.version,
                    "skipping checkpoint with unknown version"
                );
                continue;
            }
            let step = meta.step as usize;
            if latest.as_ref().is_none_or(|(s, _)| step > *s) {
                latest = Some((step, dir));
            }
        }
        Ok(latest)
    }

    /// Restores the newest checkpoint into `agent`, returning its step.
    pub fn restore_latest(&self, agent: &mut impl Checkpointable) -> Result<Option<usize>> {
        let Some((step, dir)) = self.latest_step()? else {
            return Ok(None);
        };
        agent.restore(&dir)?;
        tracing::info!(step, dir = %dir.display(), "restored checkpoint");
        Ok(Some(step))
    }
}

/// Drives a [`Saver`] from the training loop: saves whenever `save_freq` env
/// steps have elapsed since the last save.
pub struct Checkpointer {
    pub saver: Saver,
    pub save_freq: usize,
    last_save_step: Option<usize>,
}

impl Checkpointer {
    pub fn new(saver: Saver, save_freq: usize) -> Self {
        Self {
            saver,
            save_freq,
            last_save_step: None,
        }
    }

    pub fn maybe_save(&mut self, step: usize, agent: &impl Checkpointable) -> Result<()> {
        let due = match self.last_save_step {
            Some(last) => step.saturating_sub(last) >= self.save_freq,
            None => step >= self.save_freq,
        };
        if due {
            self.saver.save_step(step, agent)?;
            self.last_save_step = Some(step);
        }
        Ok(())
    }

    pub fn save_now(&mut self, step: usize, agent: &impl Checkpointable) -> Result<()> {
        if self.last_save_step != Some(step) {
            self.saver.save_step(step, agent)?;
            self.last_save_step = Some(step);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeAgent {
        weights: HashMap<String, f32>,
    }

    impl Checkpointable for FakeAgent {
        fn save(&self, dir: &Path) -> Result<()> {
            let encoded = bincode::encode_to_vec(
                self.weights.iter().collect::<Vec<_>>(),
                bincode::config::standard(),
            )
            .map_err(Error::wrap)?;
            fs::write(dir.join("weights.bin"), encoded).map_err(Error::wrap)
        }

        fn restore(&mut self, dir: &Path) -> Result<()> {
            let encoded = fs::read(dir.join("weights.bin")).map_err(Error::wrap)?;
            let (weights, _) = bincode::decode_from_slice::<Vec<(String, f32)>, _>(
                &encoded,
                bincode::config::standard(),
            )
            .map_err(Error::wrap)?;
            self.weights = weights.into_iter().collect();
            Ok(())
        }
    }

    #[test]
    fn restore_latest_picks_highest_step() -> Result<()> {
        let dir = tempfile::tempdir().map_err(Error::wrap)?;
        let saver = Saver::new(dir.path())?;
        let mut agent = FakeAgent::default();
        agent.weights.insert("w".into(), 1.);
        saver.save_step(100, &agent)?;
        agent.weights.insert("w".into(), 2.);
        saver.save_step(2000, &agent)?;
        agent.weights.insert("w".into(), 3.);

        let restored = saver.restore_latest(&mut agent)?;
        assert_eq!(restored, Some(2000));
        assert_eq!(agent.weights["w"], 2.);
        Ok(())
    }

    #[test]
    fn alien_directory_entries_are_skipped() -> Result<()> {
        let dir = tempfile::tempdir().map_err(Error::wrap)?;
        let saver = Saver::new(dir.path())?;
        let mut agent = FakeAgent::default();
        agent.weights.insert("w".into(), 1.);
        saver.save_step(10, &agent)?;
        fs::create_dir(dir.path().join("not_a_checkpoint")).map_err(Error::wrap)?;
        fs::write(dir.path().join("stray_file"), b"junk").map_err(Error::wrap)?;

        assert_eq!(saver.restore_latest(&mut agent)?, Some(10));
        Ok(())
    }

    #[test]
    fn checkpointer_respects_save_freq() -> Result<()> {
        let dir = tempfile::tempdir().map_err(Error::wrap)?;
        let mut checkpointer = Checkpointer::new(Saver::new(dir.path())?, 100);
        let agent = FakeAgent::default();
        checkpointer.maybe_save(50, &agent)?;
        assert!(checkpointer.saver.latest_step()?.is_none());
        checkpointer.maybe_save(120, &agent)?;
        assert_eq!(checkpointer.saver.latest_step()?.map(|(s, _)| s), Some(120));
        checkpointer.maybe_save(150, &agent)?;
        assert_eq!(checkpointer.saver.latest_step()?.map(|(s, _)| s), Some(120));
        Ok(())
    }
}
