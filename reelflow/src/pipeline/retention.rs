//! Output retention: pruning and rotating finished videos.
//!
//! Two mutually exclusive policies are configured per run:
//!
//! - `keep_count`: keep the newest N videos and N other files of a job,
//!   judged by descending file name (names embed a sortable date).
//! - `fix_names`: keep a ring of fixed slots. The newest output always
//!   lands in the first-listed slot, every occupied slot moves one position
//!   toward the end and the last-listed slot is evicted.
//!
//! Without `fix_names` the new outputs are moved into the output directory
//! under a dated name before any pruning.
//!
//! Filesystem failures while pruning, evicting or shifting are logged and
//! left as they are. Only failing to move the new output is an error.

use crate::errors::{report, RetentionError};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const VIDEO_EXT: &str = ".mp4";
const THUMBNAIL_SUFFIX: &str = "_thumbnail";
const THUMBNAIL_EXT: &str = ".png";

/// How finished outputs of a job are retained.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// Outputs accumulate.
    #[default]
    None,
    /// Keep the newest N files per kind.
    KeepCount(usize),
    /// Rotate through fixed slot suffixes, first-listed is newest.
    FixedNames(Vec<String>),
}

impl RetentionPolicy {
    /// Reads the policy from run configuration overrides.
    ///
    /// `fix_names` may be a slot count `K` (suffixes `_1` to `_K`), a list
    /// of suffixes, `{"count": K}` or `{"names": [...]}`. It wins over
    /// `keep_count`, which must be a positive integer.
    #[must_use]
    pub fn from_run_config(config: &Map<String, Value>) -> Self {
        if let Some(spec) = config.get("fix_names") {
            match parse_fix_names(spec) {
                Some(names) if !names.is_empty() => return Self::FixedNames(names),
                _ => warn!(fix_names = %spec, "Ignoring invalid fix_names"),
            }
        }

        match config.get("keep_count").and_then(Value::as_u64) {
            Some(count) if count > 0 => Self::KeepCount(usize::try_from(count).unwrap_or(usize::MAX)),
            _ => Self::None,
        }
    }

    /// Applies the policy after a successful run.
    ///
    /// Without fixed names the new outputs are first moved into `dir` as
    /// `<job>_<stamp>.mp4` and `<job>_<stamp>_thumbnail.png`, so pruning
    /// sees them next to the older runs.
    pub fn apply(
        &self,
        dir: &OutputDirectory,
        job_name: &str,
        stamp: &str,
        outputs: &mut OutputFiles,
    ) -> Result<(), RetentionError> {
        match self {
            Self::None => store_outputs(dir, job_name, stamp, outputs),
            Self::KeepCount(keep) => {
                store_outputs(dir, job_name, stamp, outputs)?;
                prune_keep_count(dir, job_name, *keep);
                Ok(())
            }
            Self::FixedNames(names) => rotate_fixed_names(dir, job_name, names, outputs).map(drop),
        }
    }
}

fn parse_fix_names(spec: &Value) -> Option<Vec<String>> {
    let numbered = |count: u64| -> Vec<String> { (1..=count).map(|i| format!("_{i}")).collect() };
    let listed = |items: &Vec<Value>| {
        items
            .iter()
            .map(|item| item.as_str().map(String::from))
            .collect::<Option<Vec<_>>>()
    };

    match spec {
        Value::Number(count) => count.as_u64().map(numbered),
        Value::Array(items) => listed(items),
        Value::Object(map) => match (map.get("count"), map.get("names")) {
            (_, Some(Value::Array(items))) => listed(items),
            (Some(count), None) => count.as_u64().map(numbered),
            _ => None,
        },
        _ => None,
    }
}

/// Paths of the finished video and thumbnail of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputFiles {
    /// The assembled video.
    pub video: Option<PathBuf>,
    /// Its thumbnail.
    pub thumbnail: Option<PathBuf>,
}

impl OutputFiles {
    /// Key of the finished video path in a step definition.
    pub const VIDEO_KEY: &'static str = "sequence";
    /// Key of the finished thumbnail path in a step definition.
    pub const THUMBNAIL_KEY: &'static str = "thumbnail";

    /// Reads the output paths the stages left in `values`.
    ///
    /// Entries that are not strings (for example an unrendered blueprint)
    /// are treated as absent.
    #[must_use]
    pub fn from_values(values: &Value) -> Self {
        let path = |key: &str| values.get(key).and_then(Value::as_str).map(PathBuf::from);
        Self {
            video: path(Self::VIDEO_KEY),
            thumbnail: path(Self::THUMBNAIL_KEY),
        }
    }

    /// Writes the known output paths back into `values`.
    pub fn write_to(&self, values: &mut Value) {
        let Value::Object(map) = values else {
            return;
        };
        for (key, path) in [(Self::VIDEO_KEY, &self.video), (Self::THUMBNAIL_KEY, &self.thumbnail)] {
            if let Some(path) = path {
                map.insert(key.to_string(), Value::String(path.to_string_lossy().into_owned()));
            }
        }
    }
}

/// The directory finished outputs are kept in.
#[derive(Debug, Clone)]
pub struct OutputDirectory {
    dir: PathBuf,
}

impl OutputDirectory {
    /// Wraps `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of `file_name` inside the directory.
    #[must_use]
    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Lists the file names starting with `job_name`, unsorted.
    ///
    /// A missing directory lists as empty.
    pub fn list(&self, job_name: &str) -> Result<Vec<String>, RetentionError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(RetentionError::new("list", &self.dir, err)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| RetentionError::new("list", &self.dir, err))?;
            if !entry.file_type().is_ok_and(|kind| kind.is_file()) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(job_name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Returns true if `file_name` exists.
    #[must_use]
    pub fn exists(&self, file_name: &str) -> bool {
        self.path_of(file_name).exists()
    }

    /// Deletes `file_name`.
    pub fn remove(&self, file_name: &str) -> Result<(), RetentionError> {
        let path = self.path_of(file_name);
        fs::remove_file(&path).map_err(|err| RetentionError::new("remove", path, err))
    }

    /// Moves `from` (anywhere) to `file_name` inside the directory.
    ///
    /// Falls back to copy and delete when a plain rename is not possible.
    pub fn rename(&self, from: &Path, file_name: &str) -> Result<PathBuf, RetentionError> {
        let to = self.path_of(file_name);
        fs::create_dir_all(&self.dir).map_err(|err| RetentionError::new("create", &self.dir, err))?;
        fs::rename(from, &to)
            .or_else(|_| fs::copy(from, &to).and_then(|_| fs::remove_file(from)))
            .map_err(|err| RetentionError::new("rename", from, err))?;
        Ok(to)
    }
}

/// Moves new outputs that are not yet in `dir` to their dated names.
///
/// Outputs already inside `dir` keep their names.
pub fn store_outputs(dir: &OutputDirectory, job_name: &str, stamp: &str, outputs: &mut OutputFiles) -> Result<(), RetentionError> {
    let stamped = format!("_{stamp}");
    let targets = [
        (&mut outputs.video, slot_file(job_name, &stamped, "", VIDEO_EXT)),
        (&mut outputs.thumbnail, slot_file(job_name, &stamped, THUMBNAIL_SUFFIX, THUMBNAIL_EXT)),
    ];
    for (output, name) in targets {
        let Some(path) = output.as_ref() else {
            continue;
        };
        if path.parent() == Some(dir.path()) {
            continue;
        }
        let stored = dir.rename(path, &name)?;
        debug!(file = %name, "Stored output");
        *output = Some(stored);
    }
    Ok(())
}

/// Deletes all but the newest `keep` videos and `keep` other files of a job.
///
/// Returns the failures, which are also logged.
pub fn prune_keep_count(dir: &OutputDirectory, job_name: &str, keep: usize) -> Vec<RetentionError> {
    let mut names = match dir.list(job_name) {
        Ok(names) => names,
        Err(err) => {
            warn!(error = %report(&err), "Could not list outputs");
            return vec![err];
        }
    };
    names.sort_unstable_by(|a, b| b.cmp(a));

    let mut seen = [0_usize; 2];
    let mut failures = Vec::new();
    for name in names {
        let kind = usize::from(!name.ends_with(VIDEO_EXT));
        seen[kind] += 1;
        if seen[kind] <= keep {
            continue;
        }
        match dir.remove(&name) {
            Ok(()) => info!(file = %name, "Deleted old output"),
            Err(err) => {
                warn!(error = %report(&err), "Could not delete old output");
                failures.push(err);
            }
        }
    }
    failures
}

fn slot_file(job_name: &str, slot: &str, suffix: &str, ext: &str) -> String {
    format!("{job_name}{slot}{suffix}{ext}")
}

/// Rotates the fixed-name slots of a job and moves the new outputs in.
///
/// With slots `[s1, s2, .., sk]` the file in `sk` is deleted, `s(k-1)`
/// moves to `sk` and so on down to `s1 -> s2`; the new video and thumbnail
/// then become `<job><s1>.mp4` and `<job><s1>_thumbnail.png`. `outputs` is
/// updated to the new locations. Eviction and shift failures are returned
/// (and logged) instead of aborting the rotation.
pub fn rotate_fixed_names(
    dir: &OutputDirectory,
    job_name: &str,
    names: &[String],
    outputs: &mut OutputFiles,
) -> Result<Vec<RetentionError>, RetentionError> {
    let Some((newest, _)) = names.split_first() else {
        return Ok(Vec::new());
    };
    let file = |slot: &str, suffix: &str, ext: &str| slot_file(job_name, slot, suffix, ext);
    let mut failures = Vec::new();

    for (suffix, ext) in [("", VIDEO_EXT), (THUMBNAIL_SUFFIX, THUMBNAIL_EXT)] {
        if let Some(oldest) = names.last() {
            let evicted = file(oldest.as_str(), suffix, ext);
            if dir.exists(&evicted) {
                match dir.remove(&evicted) {
                    Ok(()) => info!(file = %evicted, "Deleted old output"),
                    Err(err) => failures.push(err),
                }
            }
        }

        for pair in names.windows(2).rev() {
            let from = file(pair[0].as_str(), suffix, ext);
            if !dir.exists(&from) {
                continue;
            }
            let to = file(pair[1].as_str(), suffix, ext);
            match dir.rename(&dir.path_of(&from), &to) {
                Ok(_) => debug!(from = %from, to = %to, "Shifted output slot"),
                Err(err) => failures.push(err),
            }
        }
    }

    for err in &failures {
        warn!(error = %report(err), "Output rotation left a slot unchanged");
    }

    if let Some(video) = &outputs.video {
        outputs.video = Some(dir.rename(video, &file(newest.as_str(), "", VIDEO_EXT))?);
    }
    if let Some(thumbnail) = &outputs.thumbnail {
        outputs.thumbnail = Some(dir.rename(thumbnail, &file(newest.as_str(), THUMBNAIL_SUFFIX, THUMBNAIL_EXT))?);
    }
    Ok(failures)
}
