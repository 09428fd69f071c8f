//! The external face-swap tool, behind a narrow seam.
//!
//! The tool is an opaque collaborator: a command-line program that reads a
//! source image and a target video and writes the swapped video. Everything
//! this crate knows about it is the argument contract in
//! [`CommandSwapTool::swap`].

use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;

use crate::types::{SwapJob, SwapOutcome};

/// Longest stderr suffix carried into an error message.
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Error, Debug)]
pub enum SwapToolError {
    #[error("missing input file: {0}")]
    MissingInput(PathBuf),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool exited with {status}: {stderr_tail}")]
    NonZeroExit { status: String, stderr_tail: String },
}

/// Strategy for producing a swapped video from staged inputs.
///
/// Implementations run synchronously on the engine thread; the daemon never
/// blocks its async runtime on a swap.
pub trait FaceSwapTool {
    fn swap(&self, job: &SwapJob) -> Result<SwapOutcome, SwapToolError>;
}

/// Production implementation: shells out to the face-swap program with the
/// fixed flag set it expects.
pub struct CommandSwapTool {
    /// Interpreter or executable, e.g. `python`.
    program: String,
    /// Entry script passed as the first argument, e.g. `run.py`.
    script: String,
    /// Directory the tool must run from (it resolves its models relative
    /// to its own checkout).
    tool_dir: PathBuf,
    /// Inference backend selector, e.g. `cuda`.
    execution_provider: String,
    /// Processing stage selector, e.g. `face_swapper`.
    frame_processor: String,
}

impl CommandSwapTool {
    pub fn new(
        program: impl Into<String>,
        script: impl Into<String>,
        tool_dir: impl Into<PathBuf>,
        execution_provider: impl Into<String>,
        frame_processor: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            tool_dir: tool_dir.into(),
            execution_provider: execution_provider.into(),
            frame_processor: frame_processor.into(),
        }
    }

    /// The argument vector for one job, exactly as handed to the program.
    fn args(&self, job: &SwapJob) -> Vec<String> {
        vec![
            self.script.clone(),
            "--target".to_string(),
            job.target_video.display().to_string(),
            "--source".to_string(),
            job.source_image.display().to_string(),
            "-o".to_string(),
            job.output_video.display().to_string(),
            "--execution-provider".to_string(),
            self.execution_provider.clone(),
            "--frame-processor".to_string(),
            self.frame_processor.clone(),
        ]
    }
}

impl FaceSwapTool for CommandSwapTool {
    fn swap(&self, job: &SwapJob) -> Result<SwapOutcome, SwapToolError> {
        // A download that failed earlier leaves the input absent; surface
        // that here rather than as an opaque tool crash.
        for input in [&job.target_video, &job.source_image] {
            if !input.exists() {
                return Err(SwapToolError::MissingInput(input.clone()));
            }
        }

        let args = self.args(job);
        tracing::info!(
            request = %job.id,
            program = %self.program,
            tool_dir = %self.tool_dir.display(),
            "invoking face-swap tool"
        );

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.tool_dir)
            .output()
            .map_err(|source| SwapToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SwapToolError::NonZeroExit {
                status: output.status.to_string(),
                stderr_tail: tail(&stderr, STDERR_TAIL_BYTES),
            });
        }

        tracing::info!(request = %job.id, output = %job.output_video.display(), "face swap completed");
        Ok(SwapOutcome {
            output_path: job.output_video.clone(),
        })
    }
}

/// Scripted tool for tests: records jobs and returns a preset result.
#[cfg(feature = "mock")]
pub struct MockSwapTool {
    pub jobs: std::sync::Mutex<Vec<SwapJob>>,
    pub fail_with: Option<String>,
}

#[cfg(feature = "mock")]
impl MockSwapTool {
    pub fn succeeding() -> Self {
        Self {
            jobs: std::sync::Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            jobs: std::sync::Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }
}

#[cfg(feature = "mock")]
impl FaceSwapTool for MockSwapTool {
    fn swap(&self, job: &SwapJob) -> Result<SwapOutcome, SwapToolError> {
        self.jobs.lock().unwrap().push(job.clone());
        match &self.fail_with {
            Some(message) => Err(SwapToolError::NonZeroExit {
                status: "exit status: 1".to_string(),
                stderr_tail: message.clone(),
            }),
            None => Ok(SwapOutcome {
                output_path: job.output_video.clone(),
            }),
        }
    }
}

/// Last `max_bytes` of `text`, on a char boundary.
fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
