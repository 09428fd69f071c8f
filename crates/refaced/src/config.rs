use std::path::PathBuf;

use reface_core::provision::{self, ProvisionSettings};
use reface_core::CommandSwapTool;

/// Remote location of the face-swap model weights.
const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/ezioruan/inswapper_128.onnx/resolve/main/inswapper_128.onnx";

/// Package index for the CUDA framework reinstall.
const DEFAULT_FRAMEWORK_INDEX_URL: &str = "https://download.pytorch.org/whl/cu118";

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Address the HTTP server binds (default: 0.0.0.0:8080).
    pub bind_addr: String,
    /// Root working directory for staged files and the model artifact.
    pub work_dir: PathBuf,
    /// Where the model weights are fetched from when absent.
    pub model_url: String,
    /// Package-manager executable for the external tool's runtime.
    pub pip_program: String,
    /// Alternate package index for the framework packages.
    pub framework_index_url: String,
    /// Interpreter for the face-swap tool.
    pub tool_program: String,
    /// Tool entry script, relative to the tool directory.
    pub tool_script: String,
    /// Directory containing the tool checkout; also the tool's cwd.
    pub tool_dir: PathBuf,
    /// Execution provider passed to the tool (e.g. cuda, cpu).
    pub execution_provider: String,
    /// Frame processor passed to the tool.
    pub frame_processor: String,
    /// Whether a failed input download may fall back to a file already at
    /// the destination instead of failing the request.
    pub allow_stale_inputs: bool,
}

impl Config {
    /// Load configuration from `REFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let work_dir = std::env::var("REFACE_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp/reface"));

        let tool_dir = std::env::var("REFACE_TOOL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| work_dir.clone());

        Self {
            bind_addr: env_string("REFACE_BIND_ADDR", "0.0.0.0:8080"),
            model_url: env_string("REFACE_MODEL_URL", DEFAULT_MODEL_URL),
            pip_program: env_string("REFACE_PIP", "pip"),
            framework_index_url: env_string(
                "REFACE_FRAMEWORK_INDEX_URL",
                DEFAULT_FRAMEWORK_INDEX_URL,
            ),
            tool_program: env_string("REFACE_TOOL_PROGRAM", "python"),
            tool_script: env_string("REFACE_TOOL_SCRIPT", "run.py"),
            execution_provider: env_string("REFACE_EXECUTION_PROVIDER", "cuda"),
            frame_processor: env_string("REFACE_FRAME_PROCESSOR", "face_swapper"),
            allow_stale_inputs: std::env::var("REFACE_ALLOW_STALE_INPUTS")
                .map(|v| v == "1")
                .unwrap_or(false),
            work_dir,
            tool_dir,
        }
    }

    /// Path of the model weights artifact.
    pub fn model_path(&self) -> PathBuf {
        provision::default_model_path(&self.work_dir)
    }

    /// Directory request workspaces are created under.
    pub fn requests_root(&self) -> PathBuf {
        self.work_dir.join("requests")
    }

    /// Settings for the startup provisioning run.
    pub fn provision_settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            work_dir: self.work_dir.clone(),
            model_path: self.model_path(),
            model_url: self.model_url.clone(),
            pip_program: self.pip_program.clone(),
            framework_index_url: self.framework_index_url.clone(),
        }
    }

    /// The production face-swap tool described by this configuration.
    pub fn swap_tool(&self) -> CommandSwapTool {
        CommandSwapTool::new(
            self.tool_program.as_str(),
            self.tool_script.as_str(),
            &self.tool_dir,
            self.execution_provider.as_str(),
            self.frame_processor.as_str(),
        )
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
