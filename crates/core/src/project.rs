//! Project root detection.
//!
//! The host resolves every relative path (spec files, step definition globs,
//! `fileExists` payloads) against a single fixed root chosen at startup.

use std::path::{Path, PathBuf};
use std::env;

use tracing::debug;

use crate::config::CONFIG_FILE;

/// Marker files that identify a project root, in lookup order.
const ROOT_MARKERS: [&str; 2] = [CONFIG_FILE, "package.json"];

/// Detected test project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
	root: PathBuf,
	config_file: Option<PathBuf>,
}

impl Project {
	/// Detects a project from the current directory, falling back to the
	/// current directory itself when no marker is found.
	pub fn detect() -> std::io::Result<Self> {
		let cwd = env::current_dir()?;
		Ok(Self::detect_from(&cwd).unwrap_or_else(|| Self::from_root(cwd)))
	}

	pub fn detect_from(start: &Path) -> Option<Self> {
		find_project_root(start).map(Self::from_root)
	}

	pub fn from_root(root: PathBuf) -> Self {
		let config = root.join(CONFIG_FILE);
		let config_file = config.is_file().then_some(config);
		Self { root, config_file }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn config_file(&self) -> Option<&Path> {
		self.config_file.as_deref()
	}

	/// Resolves `path` against the project root unless it is already absolute.
	pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
		let path = path.as_ref();
		if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.root.join(path)
		}
	}
}

/// Searches upward from `start` for a directory containing a root marker.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
	let start = if start.is_absolute() {
		start.to_path_buf()
	} else {
		env::current_dir().ok()?.join(start)
	};

	let mut current = start.as_path();
	loop {
		debug!(target = "cuke.project", path = %current.display(), "checking for project root");

		if ROOT_MARKERS.iter().any(|marker| current.join(marker).is_file()) {
			debug!(target = "cuke.project", root = %current.display(), "found project root");
			return Some(current.to_path_buf());
		}

		match current.parent() {
			Some(parent) if parent != current => current = parent,
			_ => break,
		}
	}

	None
}

#[cfg(test)]
mod tests {
	use std::fs;

	use tempfile::TempDir;

	use super::*;

	#[test]
	fn finds_root_from_nested_directory() {
		let temp = TempDir::new().unwrap();
		fs::write(temp.path().join(CONFIG_FILE), "{}").unwrap();
		let nested = temp.path().join("cypress").join("e2e").join("features");
		fs::create_dir_all(&nested).unwrap();

		let project = Project::detect_from(&nested).unwrap();
		assert_eq!(project.root(), temp.path());
		assert_eq!(project.config_file(), Some(temp.path().join(CONFIG_FILE).as_path()));
	}

	#[test]
	fn package_json_marks_a_root_without_config() {
		let temp = TempDir::new().unwrap();
		fs::write(temp.path().join("package.json"), "{}").unwrap();

		let project = Project::detect_from(temp.path()).unwrap();
		assert_eq!(project.root(), temp.path());
		assert!(project.config_file().is_none());
	}

	#[test]
	fn resolve_keeps_absolute_paths() {
		let project = Project::from_root(PathBuf::from("/work/app"));
		assert_eq!(project.resolve("cypress/fixtures/a.json"), PathBuf::from("/work/app/cypress/fixtures/a.json"));
		assert_eq!(project.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
	}
}
