use std::path::Path;

use tracing::debug;

/// Returns whether an entry exists at `path` right now.
///
/// Errors (permission denied, a NUL byte in the path, ...) are reported as
/// `false`: callers cannot tell "absent" from "cannot be checked".
pub async fn file_exists(path: &Path) -> bool {
	if path.as_os_str().is_empty() {
		return false;
	}
	match tokio::fs::try_exists(path).await {
		Ok(exists) => exists,
		Err(err) => {
			debug!(target = "cuke.task", path = %path.display(), error = %err, "existence check failed, reporting false");
			false
		}
	}
}
