use std::path::{Path, PathBuf};

use uuid::Uuid;

/// File names inside a request workspace. Fixed by the external tool's
/// expectations on extension (it sniffs image vs. video by suffix).
const SOURCE_IMAGE_NAME: &str = "source_image.jpg";
const TARGET_VIDEO_NAME: &str = "target_video.mp4";
const OUTPUT_VIDEO_NAME: &str = "output_face_swap.mp4";

/// Per-request staging directory under `<work_dir>/requests/<id>/`.
///
/// Each request gets its own workspace so concurrent requests never share
/// input or output paths. Workspaces are created on demand and never
/// cleaned up; the deployment model is ephemeral instances.
#[derive(Debug, Clone)]
pub struct RequestWorkspace {
    pub id: Uuid,
    dir: PathBuf,
}

impl RequestWorkspace {
    /// Create a fresh workspace directory for a new request.
    pub fn create(requests_root: &Path) -> std::io::Result<Self> {
        let id = Uuid::new_v4();
        let dir = requests_root.join(id.to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(Self { id, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the source face image is staged.
    pub fn source_image(&self) -> PathBuf {
        self.dir.join(SOURCE_IMAGE_NAME)
    }

    /// Where the target video is staged.
    pub fn target_video(&self) -> PathBuf {
        self.dir.join(TARGET_VIDEO_NAME)
    }

    /// Where the external tool writes the swapped video.
    pub fn output_video(&self) -> PathBuf {
        self.dir.join(OUTPUT_VIDEO_NAME)
    }

    /// A swap job referencing this workspace's paths.
    pub fn job(&self) -> SwapJob {
        SwapJob {
            id: self.id,
            source_image: self.source_image(),
            target_video: self.target_video(),
            output_video: self.output_video(),
        }
    }
}

/// One unit of work for a [`FaceSwapTool`](crate::FaceSwapTool): staged
/// input paths plus the path the tool must write its result to.
#[derive(Debug, Clone)]
pub struct SwapJob {
    pub id: Uuid,
    pub source_image: PathBuf,
    pub target_video: PathBuf,
    pub output_video: PathBuf,
}

/// Successful result of a tool invocation.
#[derive(Debug, Clone)]
pub struct SwapOutcome {
    /// Path of the swapped video, as declared by the tool invocation.
    pub output_path: PathBuf,
}
