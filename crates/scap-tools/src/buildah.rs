//! buildah integration: unprivileged container creation and filesystem
//! mounts.
//!
//! Mount operations run inside `buildah unshare` so the container never
//! needs elevated privileges; the mount lives in a user-namespace-scoped
//! wrapper.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use scap_core::{ContainerRuntime, MountedSnapshot, ScanError, ScanResult};

use crate::{run_command, ToolError, ToolResult};

/// buildah wrapper
pub struct Buildah {
    executable: PathBuf,
}

impl Buildah {
    pub fn new() -> ToolResult<Self> {
        let executable = crate::get_command_path("buildah")
            .ok_or_else(|| ToolError::NotFound("buildah".to_string()))?;
        Ok(Self { executable })
    }

    pub fn with_executable(executable: PathBuf) -> Self {
        Self { executable }
    }

    /// `buildah from <driver><image>`; returns the working container name.
    pub fn create_container(&self, image_ref: &str, registry_driver: &str) -> ToolResult<String> {
        let source = format!("{registry_driver}{image_ref}");
        let (stdout, stderr, code) = run_command(&self.executable, ["from", source.as_str()])?;
        if code != 0 {
            return Err(ToolError::ExecutionFailed(format!(
                "buildah from {source} exited with code {code}: {}",
                stderr.trim()
            )));
        }
        // the container name is the last line; earlier lines may be pull progress
        let container_id = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .next_back()
            .unwrap_or("")
            .to_string();
        if container_id.is_empty() {
            return Err(ToolError::ParseError(format!(
                "buildah from {source} produced no container name"
            )));
        }
        Ok(container_id)
    }

    /// Mount the container filesystem; returns the mount path.
    pub fn mount_container(&self, container_id: &str) -> ToolResult<PathBuf> {
        let (stdout, stderr, code) =
            run_command(&self.executable, ["unshare", "buildah", "mount", container_id])?;
        if code != 0 {
            return Err(ToolError::ExecutionFailed(format!(
                "buildah mount {container_id} exited with code {code}: {}",
                stderr.trim()
            )));
        }
        let mount_path = stdout.trim();
        if mount_path.is_empty() {
            return Err(ToolError::ParseError(format!(
                "buildah mount {container_id} produced no mount path"
            )));
        }
        Ok(PathBuf::from(mount_path))
    }

    pub fn unmount_container(&self, container_id: &str) -> ToolResult<()> {
        let (_, stderr, code) =
            run_command(&self.executable, ["unshare", "buildah", "umount", container_id])?;
        if code != 0 {
            return Err(ToolError::ExecutionFailed(format!(
                "buildah umount {container_id} exited with code {code}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }

    pub fn remove_container(&self, container_id: &str) -> ToolResult<()> {
        let (_, stderr, code) = run_command(&self.executable, ["rm", container_id])?;
        if code != 0 {
            return Err(ToolError::ExecutionFailed(format!(
                "buildah rm {container_id} exited with code {code}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl ContainerRuntime for Buildah {
    fn acquire(&self, image_ref: &str, registry_driver: &str) -> ScanResult<MountedSnapshot> {
        let container_id = self
            .create_container(image_ref, registry_driver)
            .map_err(|tool_error| ScanError::Tool(tool_error.to_string()))?;
        info!("created container {container_id} from image {image_ref}");

        let mount_path = match self.mount_container(&container_id) {
            Ok(mount_path) => mount_path,
            Err(mount_error) => {
                // the container exists but cannot be mounted; remove it rather than leak it
                if let Err(rm_error) = self.remove_container(&container_id) {
                    warn!("failed to remove unmountable container {container_id}: {rm_error}");
                }
                return Err(ScanError::Tool(mount_error.to_string()));
            }
        };
        debug!("mounted container {container_id} at {}", mount_path.display());

        Ok(MountedSnapshot {
            container_id,
            mount_path,
        })
    }

    fn release(&self, snapshot: &MountedSnapshot) -> ScanResult<()> {
        let unmounted = self.unmount_container(&snapshot.container_id);
        let removed = self.remove_container(&snapshot.container_id);
        unmounted.map_err(|tool_error| ScanError::Tool(tool_error.to_string()))?;
        removed.map_err(|tool_error| ScanError::Tool(tool_error.to_string()))?;
        info!("released container {}", snapshot.container_id);
        Ok(())
    }
}
