//! Interestingness judges.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::GlFuzzError;

/// Decides whether a candidate still shows the behavior being reduced.
pub trait Judge {
    /// `shader_job` is the `.json` file of the candidate; the judge may
    /// write whatever it produced to `result_output`.
    fn is_interesting(&mut self, shader_job: &Path, result_output: &Path) -> Result<bool, GlFuzzError>;
}

impl<F> Judge for F
where
    F: FnMut(&Path, &Path) -> Result<bool, GlFuzzError>,
{
    fn is_interesting(&mut self, shader_job: &Path, result_output: &Path) -> Result<bool, GlFuzzError> {
        self(shader_job, result_output)
    }
}

/// Runs an external program; exit status 0 means interesting.
#[derive(Debug, Clone)]
pub struct CommandJudge {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandJudge {
    /// `command` is the program followed by its leading arguments.
    pub fn new(command: &[String], timeout: Option<Duration>) -> Result<Self, GlFuzzError> {
        let Some((program, args)) = command.split_first() else {
            return Err(GlFuzzError::Judge("empty judge command".to_string()));
        };
        Ok(Self {
            program: PathBuf::from(program),
            args: args.to_vec(),
            timeout,
        })
    }
}

impl Judge for CommandJudge {
    fn is_interesting(&mut self, shader_job: &Path, result_output: &Path) -> Result<bool, GlFuzzError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(shader_job)
            .arg(result_output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| GlFuzzError::Judge(format!("fail to spawn {:?}: {e}", self.program)))?;
        let status = match self.timeout {
            Some(limit) => {
                let waited = child
                    .wait_timeout(limit)
                    .map_err(|e| GlFuzzError::Judge(format!("fail to wait for judge: {e}")))?;
                match waited {
                    Some(status) => status,
                    None => {
                        crate::log!(warn, "judge timed out after {limit:?} on {shader_job:?}");
                        let _ = child.kill();
                        let _ = child.wait();
                        return Ok(false);
                    }
                }
            }
            None => child
                .wait()
                .map_err(|e| GlFuzzError::Judge(format!("fail to wait for judge: {e}")))?,
        };
        crate::log!(trace, "judge exit status: {status:?}");
        Ok(status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_judge() {
        let mut calls = 0;
        let mut judge = |_: &Path, _: &Path| {
            calls += 1;
            Ok::<_, GlFuzzError>(calls > 1)
        };
        let p = Path::new("a.json");
        assert!(!judge.is_interesting(p, p).unwrap());
        assert!(judge.is_interesting(p, p).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_judge_exit_status() {
        let p = Path::new("a.json");
        let mut yes = CommandJudge::new(&["true".to_string()], None).unwrap();
        assert!(yes.is_interesting(p, p).unwrap());
        let mut no = CommandJudge::new(&["false".to_string()], None).unwrap();
        assert!(!no.is_interesting(p, p).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_judge_timeout() {
        let command = vec!["sh".to_string(), "-c".to_string(), "sleep 5".to_string()];
        let mut slow = CommandJudge::new(&command, Some(Duration::from_millis(100))).unwrap();
        let p = Path::new("a.json");
        assert!(!slow.is_interesting(p, p).unwrap());
    }

    #[test]
    fn test_missing_program_is_a_judge_error() {
        let mut judge = CommandJudge::new(&["./no-such-judge-program".to_string()], None).unwrap();
        let p = Path::new("a.json");
        assert!(matches!(judge.is_interesting(p, p), Err(GlFuzzError::Judge(_))));
        assert!(CommandJudge::new(&[], None).is_err());
    }
}
