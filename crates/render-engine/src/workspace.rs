//! Per-job scratch directory.

use std::path::{Path, PathBuf};

use reelsmith_common::error::ReelResult;
use reelsmith_timeline_model::job::TempPolicy;

/// Scratch directory of one job. Every file in it carries the job id as
/// a name prefix, so artifacts of concurrent jobs never collide even in a
/// shared directory.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    job_id: String,
    dir: PathBuf,
}

impl JobWorkspace {
    /// Create `<root>/<job_id>`.
    pub fn create(root: &Path, job_id: &str) -> ReelResult<Self> {
        let dir = root.join(job_id);
        std::fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "Created job workspace");
        Ok(Self {
            job_id: job_id.to_string(),
            dir,
        })
    }

    /// Where `create` would put the workspace, without touching disk.
    pub fn planned(root: &Path, job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            dir: root.join(job_id),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<job>_<kind>.<ext>`
    pub fn file(&self, kind: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}_{kind}.{ext}", self.job_id))
    }

    /// `<dir>/<job>_<kind>_<slot:03>.<ext>`
    pub fn slot_file(&self, kind: &str, slot: usize, ext: &str) -> PathBuf {
        self.dir.join(format!("{}_{kind}_{slot:03}.{ext}", self.job_id))
    }

    /// Write a text artifact and return its path.
    pub fn write_text(&self, kind: &str, ext: &str, contents: &str) -> ReelResult<PathBuf> {
        let path = self.file(kind, ext);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Apply the temp policy. Returns the directory when it was kept.
    pub fn finish(self, succeeded: bool, policy: TempPolicy) -> Option<PathBuf> {
        let keep = if succeeded {
            policy.keep_on_success
        } else {
            policy.keep_on_failure
        };
        if keep {
            tracing::info!(dir = %self.dir.display(), succeeded, "Keeping job workspace");
            return Some(self.dir);
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                tracing::debug!(dir = %self.dir.display(), "Removed job workspace");
                None
            }
            Err(err) => {
                tracing::warn!(dir = %self.dir.display(), error = %err, "Failed to remove job workspace");
                Some(self.dir)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_carry_job_prefix() {
        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(root.path(), "reel-0badf00d").unwrap();
        assert_eq!(
            ws.slot_file("norm", 3, "mp4"),
            root.path().join("reel-0badf00d/reel-0badf00d_norm_003.mp4")
        );
        assert_eq!(
            ws.file("captions", "ass"),
            root.path().join("reel-0badf00d/reel-0badf00d_captions.ass")
        );
    }

    #[test]
    fn test_planned_workspace_creates_nothing() {
        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::planned(root.path(), "reel-plan");
        assert!(!ws.dir().exists());
        assert_eq!(ws.file("mixed", "wav"), root.path().join("reel-plan/reel-plan_mixed.wav"));
    }

    #[test]
    fn test_finish_follows_policy() {
        let root = tempfile::tempdir().unwrap();
        let policy = TempPolicy {
            keep_on_success: false,
            keep_on_failure: true,
        };

        let ws = JobWorkspace::create(root.path(), "reel-a").unwrap();
        ws.write_text("list", "txt", "x").unwrap();
        let dir = ws.dir().to_path_buf();
        assert_eq!(ws.finish(true, policy), None);
        assert!(!dir.exists());

        let ws = JobWorkspace::create(root.path(), "reel-b").unwrap();
        let kept = ws.finish(false, policy).unwrap();
        assert!(kept.exists());
    }
}
