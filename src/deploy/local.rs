//! Local side of a deploy: which files go to the device, and their CRCs

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::config::Config;
use crate::crc;
use crate::error::{ConfigError, DeployError};

/// Entry assembly every application build produces
pub const APP_ASSEMBLY: &str = "App.dll";

/// Build output folders produced by the linker
pub const PRELINK_DIR: &str = "prelink_bin";
pub const POSTLINK_DIR: &str = "postlink_bin";

/// One local file selected for deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileEntry {
	pub path: PathBuf,
	pub crc: u32,
}

impl LocalFileEntry {
	pub fn new(path: impl Into<PathBuf>, crc: u32) -> Self {
		Self { path: path.into(), crc }
	}

	/// Read the file and compute its CRC
	pub async fn from_path(path: &Path) -> Result<Self, DeployError> {
		let crc = crc::file_crc(path)
			.await
			.map_err(|source| DeployError::Scan { path: path.to_path_buf(), source })?;
		Ok(Self::new(path, crc))
	}

	/// Comparison key: the bare file name
	pub fn name(&self) -> &str {
		file_name(&self.path)
	}
}

fn file_name(path: &Path) -> &str {
	path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn has_extension(path: &Path, ext: &str) -> bool {
	path.extension().and_then(|e| e.to_str()).map_or(false, |e| e.eq_ignore_ascii_case(ext))
}

/// Immutable deploy filter: deny-list plus debug symbol policy
#[derive(Debug, Clone)]
pub struct DeployFilter {
	deny: GlobSet,
	include_pdbs: bool,
}

impl DeployFilter {
	/// Compile deny-list patterns; they match bare file names
	pub fn new(patterns: &[String], include_pdbs: bool) -> Result<Self, ConfigError> {
		let mut builder = GlobSetBuilder::new();
		for pattern in patterns {
			let glob = Glob::new(pattern).map_err(|e| ConfigError::Invalid {
				field: "doNotDeploy",
				message: format!("{}: {}", pattern, e),
			})?;
			builder.add(glob);
		}
		let deny = builder.build().map_err(|e| ConfigError::Invalid {
			field: "doNotDeploy",
			message: format!("Failed to build pattern set: {}", e),
		})?;
		Ok(Self { deny, include_pdbs })
	}

	pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
		Self::new(&config.do_not_deploy, config.include_pdbs)
	}

	/// Same deny-list, different debug symbol policy
	pub fn with_pdbs(mut self, include_pdbs: bool) -> Self {
		self.include_pdbs = include_pdbs;
		self
	}

	pub fn include_pdbs(&self) -> bool {
		self.include_pdbs
	}

	pub fn is_denied(&self, name: &str) -> bool {
		self.deny.is_match(name)
	}

	/// Whether a build output file may be deployed
	pub fn allows(&self, path: &Path) -> bool {
		if self.is_denied(file_name(path)) {
			return false;
		}
		self.include_pdbs || !has_extension(path, "pdb")
	}
}

/// Regular files directly inside `dir`, sorted by name
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, DeployError> {
	let scan_error = |source| DeployError::Scan { path: dir.to_path_buf(), source };
	let mut files = Vec::new();
	for entry in fs::read_dir(dir).map_err(scan_error)? {
		let entry = entry.map_err(scan_error)?;
		if entry.file_type().map_err(scan_error)?.is_file() {
			files.push(entry.path());
		}
	}
	files.sort();
	Ok(files)
}

/// Ordered file set keyed by file name; the first entry for a name wins
struct DeployList {
	entries: Vec<LocalFileEntry>,
	names: HashSet<String>,
}

impl DeployList {
	fn new() -> Self {
		Self { entries: Vec::new(), names: HashSet::new() }
	}

	fn contains_name(&self, name: &str) -> bool {
		self.names.contains(name)
	}

	async fn add(&mut self, path: &Path) -> Result<(), DeployError> {
		let name = file_name(path);
		if self.contains_name(name) {
			warn!("Duplicate file name {}, keeping the first ({})", name, path.display());
			return Ok(());
		}
		let entry = LocalFileEntry::from_path(path).await?;
		self.names.insert(name.to_string());
		self.entries.push(entry);
		Ok(())
	}
}

/// Build the local file set for a deploy
///
/// 1. files of `binary_dir` the filter allows
/// 2. `dependencies` not already provided by name from `binary_dir`
/// 3. files of `additional_dir` that are not assemblies, executables,
///    symbols, or XML docs of a collected assembly, and not already present
pub async fn generate_deploy_list(
	binary_dir: &Path,
	additional_dir: Option<&Path>,
	dependencies: &[PathBuf],
	filter: &DeployFilter,
) -> Result<Vec<LocalFileEntry>, DeployError> {
	let mut list = DeployList::new();

	for path in list_files(binary_dir)? {
		if filter.allows(&path) {
			list.add(&path).await?;
		} else {
			debug!("Not deploying {}", path.display());
		}
	}

	for path in dependencies {
		if list.contains_name(file_name(path)) {
			debug!("{} provided by the binary directory", file_name(path));
			continue;
		}
		if filter.allows(path) {
			list.add(path).await?;
		}
	}

	if let Some(additional_dir) = additional_dir.filter(|dir| *dir != binary_dir) {
		for path in list_files(additional_dir)? {
			let name = file_name(&path);
			if filter.is_denied(name)
				|| has_extension(&path, "dll")
				|| has_extension(&path, "exe")
				|| has_extension(&path, "pdb")
				|| list.contains_name(name)
			{
				continue;
			}
			if has_extension(&path, "xml") {
				let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
				if list.contains_name(&format!("{}.dll", stem)) {
					continue;
				}
			}
			list.add(&path).await?;
		}
	}

	debug!("Deploy list: {} files", list.entries.len());
	Ok(list.entries)
}

/// CRCs for an explicit set of files, in order
pub async fn local_file_set(paths: &[PathBuf]) -> Result<Vec<LocalFileEntry>, DeployError> {
	let mut list = DeployList::new();
	for path in paths {
		list.add(path).await?;
	}
	Ok(list.entries)
}

/// Where an application build lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLocation {
	/// Folder holding `App.dll`
	pub app_dir: PathBuf,

	/// Folder whose files are deployed (post-link output when preferred)
	pub binary_dir: PathBuf,

	/// Debug builds ship their symbols
	pub include_pdbs: bool,
}

/// Find the application build under `path`
///
/// A file path selects its folder; a folder holding `App.dll` is used as is;
/// otherwise the most recently built `App.dll` below it wins.
pub fn locate_application(path: &Path, prefer_postlink: bool) -> Result<AppLocation, DeployError> {
	let not_found = || DeployError::Scan {
		path: path.to_path_buf(),
		source: std::io::Error::new(
			std::io::ErrorKind::NotFound,
			format!("no {} found", APP_ASSEMBLY),
		),
	};

	let app_dir = if path.is_file() {
		path.parent().map(Path::to_path_buf).ok_or_else(not_found)?
	} else if path.join(APP_ASSEMBLY).is_file() {
		path.to_path_buf()
	} else {
		newest_app_dir(path).ok_or_else(not_found)?
	};

	let postlink = app_dir.join(POSTLINK_DIR);
	let binary_dir =
		if prefer_postlink && postlink.is_dir() { postlink } else { app_dir.clone() };
	let include_pdbs = binary_dir.components().any(|c| c.as_os_str() == "Debug");

	debug!("Application in {}, deploying from {}", app_dir.display(), binary_dir.display());
	Ok(AppLocation { app_dir, binary_dir, include_pdbs })
}

fn newest_app_dir(root: &Path) -> Option<PathBuf> {
	let mut newest: Option<(SystemTime, PathBuf)> = None;
	let walker = ignore::WalkBuilder::new(root).standard_filters(false).build();
	for entry in walker.filter_map(Result::ok) {
		let path = entry.path();
		if file_name(path) != APP_ASSEMBLY {
			continue;
		}
		let linked = path.components().any(|c| {
			let c = c.as_os_str();
			c == PRELINK_DIR || c == POSTLINK_DIR
		});
		if linked {
			continue;
		}
		let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
			Some(modified) => modified,
			None => continue,
		};
		let parent = match path.parent() {
			Some(parent) => parent.to_path_buf(),
			None => continue,
		};
		if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
			newest = Some((modified, parent));
		}
	}
	newest.map(|(_, dir)| dir)
}


// vim: ts=4
