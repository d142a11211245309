use std::fs;
use std::path::{Path, PathBuf};

use super::ShaderJob;
use crate::config::{
    FAIL_SUFFIX, MISC_DIR, REDUCED_FINAL_SUFFIX, REDUCED_INFIX, RESULT_SUFFIX, SUCCESS_SUFFIX,
};
use crate::error::io_error;
use crate::GlFuzzError;

/// Output directory of one reduction: step files, the final result,
/// markers, and a `misc` directory for logs.
#[derive(Debug, Clone)]
pub struct ReductionDir {
    path: PathBuf,
    variant: String,
}

impl ReductionDir {
    pub fn new(path: &Path, variant: &str) -> Result<Self, GlFuzzError> {
        let misc = path.join(MISC_DIR);
        fs::create_dir_all(&misc).map_err(|e| io_error(e, &misc))?;
        Ok(Self {
            path: path.to_path_buf(),
            variant: variant.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn misc_dir(&self) -> PathBuf {
        self.path.join(MISC_DIR)
    }

    /// `{variant}_reduced_{step:04}.json`, before it is judged.
    pub fn step_path(&self, step: usize) -> PathBuf {
        self.path
            .join(format!("{}{REDUCED_INFIX}{step:04}.json", self.variant))
    }

    fn judged_path(&self, step: usize, interesting: bool) -> PathBuf {
        let suffix = if interesting { SUCCESS_SUFFIX } else { FAIL_SUFFIX };
        self.path
            .join(format!("{}{REDUCED_INFIX}{step:04}{suffix}.json", self.variant))
    }

    pub fn final_path(&self) -> PathBuf {
        self.path
            .join(format!("{}{REDUCED_FINAL_SUFFIX}.json", self.variant))
    }

    /// Where the judge writes its result for the job at `json_path`.
    pub fn result_path(&self, json_path: &Path) -> PathBuf {
        let stem = json_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.path.join(format!("{stem}{RESULT_SUFFIX}.json"))
    }

    pub fn write_step(&self, job: &ShaderJob, step: usize) -> Result<PathBuf, GlFuzzError> {
        let path = self.step_path(step);
        job.write(&path)?;
        Ok(path)
    }

    /// Rename the files of step `step` once the judge has spoken.
    pub fn mark_step(
        &self,
        job: &ShaderJob,
        step: usize,
        interesting: bool,
    ) -> Result<PathBuf, GlFuzzError> {
        let from = self.step_path(step);
        let to = self.judged_path(step, interesting);
        for (src, dst) in job.files(&from).into_iter().zip(job.files(&to)) {
            if src.exists() {
                fs::rename(&src, &dst).map_err(|e| io_error(e, &src))?;
            }
        }
        Ok(to)
    }

    /// Create the empty marker file `name`.
    pub fn write_marker(&self, name: &str) -> Result<(), GlFuzzError> {
        let path = self.path.join(name);
        fs::write(&path, "").map_err(|e| io_error(e, &path))
    }

    pub fn has_marker(&self, name: &str) -> bool {
        self.path.join(name).exists()
    }
}

#[test]
fn test_step_files_are_renamed() {
    let dir = crate::test::temp_dir("depot_steps");
    let out = ReductionDir::new(&dir, "variant").unwrap();
    let job = ShaderJob::new(
        serde_json::json!({}),
        vec![crate::test::parse_frag("void main() { }")],
    );
    let path = out.write_step(&job, 3).unwrap();
    assert!(path.ends_with("variant_reduced_0003.json"));
    let judged = out.mark_step(&job, 3, true).unwrap();
    assert!(judged.ends_with("variant_reduced_0003_success.json"));
    assert!(dir.join("variant_reduced_0003_success.frag").exists());
    assert!(!path.exists());
    out.write_marker(crate::config::REDUCTION_INCOMPLETE).unwrap();
    assert!(out.has_marker(crate::config::REDUCTION_INCOMPLETE));
    assert!(out.misc_dir().exists());
}
