//! One-time environment provisioning, run before the server accepts traffic.
//!
//! Best-effort by contract: every step can fail (network error, missing
//! package manager) and the failure is recorded in the [`ProvisionReport`]
//! while the remaining steps still run. The daemon starts either way; a
//! request after a failed step fails downstream at tool invocation.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::process::Command;

use crate::staging::Stager;

/// GPU-accelerated inference runtime required by the external tool.
const RUNTIME_PACKAGE: &str = "onnxruntime-gpu";

/// Framework packages the external tool imports at run time.
const FRAMEWORK_PACKAGES: [&str; 3] = ["torch", "torchvision", "torchaudio"];

/// Runtime packages that conflict with a CUDA framework install and are
/// removed before reinstalling the framework set.
const CONFLICTING_RUNTIMES: [&str; 2] = ["onnxruntime", "onnxruntime-gpu"];

/// Settings for one provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Root working directory; created along with its subdirectories.
    pub work_dir: PathBuf,
    /// Where the model weights file must end up.
    pub model_path: PathBuf,
    /// Remote URL the weights are fetched from when absent.
    pub model_url: String,
    /// Package-manager executable used for runtime checks and installs.
    pub pip_program: String,
    /// Alternate package index for the framework reinstall.
    pub framework_index_url: String,
}

/// Outcome of a single provisioning step.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step found nothing to do.
    AlreadySatisfied,
    /// The step changed the environment (download or install performed).
    Applied,
    /// The step errored; the daemon continues regardless.
    Failed { error: String },
}

/// One step's result, named for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Per-step outcomes of a provisioning run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvisionReport {
    pub steps: Vec<StepReport>,
}

impl ProvisionReport {
    fn record(&mut self, step: &'static str, outcome: StepOutcome) {
        if let StepOutcome::Failed { error } = &outcome {
            tracing::warn!(step, error = %error, "provisioning step failed");
        } else {
            tracing::info!(step, ?outcome, "provisioning step done");
        }
        self.steps.push(StepReport { step, outcome });
    }

    /// True when no step failed.
    pub fn is_clean(&self) -> bool {
        self.steps
            .iter()
            .all(|s| !matches!(s.outcome, StepOutcome::Failed { .. }))
    }
}

/// Prepares the filesystem and the external tool's package environment.
pub struct Provisioner {
    settings: ProvisionSettings,
    stager: Stager,
}

impl Provisioner {
    pub fn new(settings: ProvisionSettings) -> Self {
        Self {
            settings,
            stager: Stager::new(),
        }
    }

    /// Run every provisioning step in order, collecting outcomes.
    pub async fn run(&self) -> ProvisionReport {
        let mut report = ProvisionReport::default();

        report.record("layout", self.ensure_layout());
        report.record("model_weights", self.ensure_model().await);
        report.record("inference_runtime", self.ensure_runtime().await);
        report.record("framework_packages", self.ensure_frameworks().await);

        report
    }

    /// Create the working directory tree. Idempotent.
    fn ensure_layout(&self) -> StepOutcome {
        let dirs = [
            self.settings.work_dir.clone(),
            self.settings.work_dir.join("models"),
            self.settings.work_dir.join("requests"),
        ];
        for dir in &dirs {
            if let Err(e) = std::fs::create_dir_all(dir) {
                return StepOutcome::Failed {
                    error: format!("create {}: {e}", dir.display()),
                };
            }
        }
        StepOutcome::AlreadySatisfied
    }

    /// Download the model weights unless already on disk.
    ///
    /// Existence is the sole freshness signal: once the file is present it
    /// is never re-downloaded, so a second run performs no network I/O.
    async fn ensure_model(&self) -> StepOutcome {
        if self.settings.model_path.exists() {
            tracing::info!(path = %self.settings.model_path.display(), "model already present");
            return StepOutcome::AlreadySatisfied;
        }

        tracing::info!(
            url = %self.settings.model_url,
            path = %self.settings.model_path.display(),
            "model not found, downloading"
        );
        match self
            .stager
            .fetch(&self.settings.model_url, &self.settings.model_path)
            .await
        {
            Ok(bytes) => {
                tracing::info!(bytes, "model weights downloaded");
                StepOutcome::Applied
            }
            Err(e) => StepOutcome::Failed {
                error: format!("model download: {e}"),
            },
        }
    }

    /// Install the GPU inference runtime unless already installed.
    async fn ensure_runtime(&self) -> StepOutcome {
        match self.is_package_installed(RUNTIME_PACKAGE).await {
            Ok(true) => StepOutcome::AlreadySatisfied,
            Ok(false) => {
                tracing::info!(package = RUNTIME_PACKAGE, "installing inference runtime");
                self.pip(&["install", RUNTIME_PACKAGE]).await
            }
            Err(e) => StepOutcome::Failed { error: e },
        }
    }

    /// Ensure all framework packages are present; a single missing one
    /// triggers the full conflict-purge-and-reinstall sequence from the
    /// alternate index.
    async fn ensure_frameworks(&self) -> StepOutcome {
        for package in FRAMEWORK_PACKAGES {
            match self.is_package_installed(package).await {
                Ok(true) => continue,
                Ok(false) => {
                    tracing::info!(missing = package, "framework packages incomplete, reinstalling");
                    return self.reinstall_frameworks().await;
                }
                Err(e) => return StepOutcome::Failed { error: e },
            }
        }
        StepOutcome::AlreadySatisfied
    }

    async fn reinstall_frameworks(&self) -> StepOutcome {
        let mut uninstall: Vec<&str> = vec!["uninstall"];
        uninstall.extend(CONFLICTING_RUNTIMES);
        uninstall.push("-y");
        // The uninstall exits non-zero when nothing was installed; only the
        // install result decides the outcome.
        if let StepOutcome::Failed { error } = self.pip(&uninstall).await {
            tracing::debug!(error = %error, "conflicting runtime uninstall reported an error");
        }

        let mut install: Vec<&str> = vec!["install"];
        install.extend(FRAMEWORK_PACKAGES);
        install.push("--force-reinstall");
        install.push("--index-url");
        install.push(&self.settings.framework_index_url);
        self.pip(&install).await
    }

    /// `pip show <package>` — exit 0 means installed.
    async fn is_package_installed(&self, package: &str) -> Result<bool, String> {
        let status = Command::new(&self.settings.pip_program)
            .args(["show", package])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| format!("{} show {package}: {e}", self.settings.pip_program))?;
        Ok(status.success())
    }

    /// Run the package manager with `args`, mapping the exit status to a
    /// step outcome.
    async fn pip(&self, args: &[&str]) -> StepOutcome {
        let result = Command::new(&self.settings.pip_program)
            .args(args)
            .status()
            .await;
        match result {
            Ok(status) if status.success() => StepOutcome::Applied,
            Ok(status) => StepOutcome::Failed {
                error: format!("{} {} exited with {status}", self.settings.pip_program, args.join(" ")),
            },
            Err(e) => StepOutcome::Failed {
                error: format!("{} {}: {e}", self.settings.pip_program, args.join(" ")),
            },
        }
    }
}

/// Default model artifact location under a working directory.
pub fn default_model_path(work_dir: &Path) -> PathBuf {
    work_dir.join("models").join("inswapper_128.onnx")
}
