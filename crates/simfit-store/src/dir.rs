use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use simfit_core::{
    EnsembleMember, Fingerprint, ModelCache, ObservationVector, RunState, SimulationRecord,
    StudyConfig,
};
use tracing::{debug, info};

use crate::{StoreError, check_names, check_transition};

const STATE_FILE: &str = "state";
const PARAMS_FILE: &str = "parameters.json";
const OBS_FILE: &str = "observations.json";
const STAGING_PREFIX: &str = ".staging-";

/// Contents of a case's `parameters.json`.
#[derive(Debug, Serialize, Deserialize)]
struct CaseFile {
    fingerprint: Fingerprint,
    member: EnsembleMember,
}

/// A record store with one case directory per simulation.
///
/// Layout under the study root:
///
/// ```text
/// <root>/<fingerprint>/parameters.json    member and fingerprint
/// <root>/<fingerprint>/state              NEW | QUEUED | RUNNING | COMPLETED
/// <root>/<fingerprint>/observations.json  written by post-processing
/// ```
///
/// New cases are assembled in a hidden staging directory and renamed into
/// place, so a case directory either does not exist or is complete. When two
/// processes race to create the same case, the loser sees the winner's
/// directory and treats the case as existing.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
    names: Vec<String>,
}

impl DirStore {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open<S: Into<String>>(
        root: impl Into<PathBuf>,
        names: impl IntoIterator<Item = S>,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(StoreError::io(&root))?;
        Ok(Self {
            root,
            names: names.into_iter().map(Into::into).collect(),
        })
    }

    /// Opens a store for the study's active parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn for_study(root: impl Into<PathBuf>, config: &StudyConfig) -> Result<Self, StoreError> {
        Self::open(root, config.param_names())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the case directory for a fingerprint.
    #[must_use]
    pub fn case_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.as_str())
    }

    /// Reads a record, or `None` if no case directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the case files are unreadable or inconsistent, or
    /// if a completed case lacks its observations artifact.
    pub fn get(&self, fingerprint: &Fingerprint) -> Result<Option<SimulationRecord>, StoreError> {
        let dir = self.case_dir(fingerprint);
        if !dir.is_dir() {
            return Ok(None);
        }

        let params_path = dir.join(PARAMS_FILE);
        let text = fs::read_to_string(&params_path).map_err(StoreError::io(&params_path))?;
        let case: CaseFile = serde_json::from_str(&text).map_err(StoreError::json(&params_path))?;
        if &case.fingerprint != fingerprint {
            return Err(StoreError::FingerprintMismatch {
                path: dir,
                found: case.fingerprint,
            });
        }

        let state = self.read_state(fingerprint)?;
        let observations = if state.is_completed() {
            let obs_path = dir.join(OBS_FILE);
            match fs::read_to_string(&obs_path) {
                Ok(text) => Some(
                    serde_json::from_str::<ObservationVector>(&text)
                        .map_err(StoreError::json(&obs_path))?,
                ),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(StoreError::MissingArtifact(fingerprint.clone()));
                }
                Err(e) => return Err(StoreError::io(obs_path)(e)),
            }
        } else {
            None
        };

        Ok(Some(SimulationRecord {
            fingerprint: case.fingerprint,
            state,
            member: case.member,
            observations,
        }))
    }

    /// Lists the fingerprints of cases whose marker reads `state`, sorted.
    ///
    /// Directories without a readable marker are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be listed.
    pub fn cases_in_state(&self, state: RunState) -> Result<Vec<Fingerprint>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(StoreError::io(&self.root))?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::io(&self.root))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }

            let fingerprint = Fingerprint::from_hex(name);
            if matches!(self.read_state(&fingerprint), Ok(s) if s == state) {
                found.push(fingerprint);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Rewrites a case's state marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the case does not exist, `state` precedes the
    /// current state, or the marker cannot be written.
    pub fn set_state(&self, fingerprint: &Fingerprint, state: RunState) -> Result<(), StoreError> {
        if !self.case_dir(fingerprint).is_dir() {
            return Err(StoreError::NotFound(fingerprint.clone()));
        }
        let current = self.read_state(fingerprint)?;
        check_transition(fingerprint, current, state)?;

        let dir = self.case_dir(fingerprint);
        write_atomic(&dir, STATE_FILE, state.as_str())?;
        debug!(%fingerprint, from = %current, to = %state, "state advanced");
        Ok(())
    }

    /// Writes the observations artifact and marks the case completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the case does not exist or cannot be written.
    pub fn complete(
        &self,
        fingerprint: &Fingerprint,
        observations: &ObservationVector,
    ) -> Result<(), StoreError> {
        let dir = self.case_dir(fingerprint);
        if !dir.is_dir() {
            return Err(StoreError::NotFound(fingerprint.clone()));
        }
        let json = serde_json::to_string_pretty(observations)
            .map_err(StoreError::json(dir.join(OBS_FILE)))?;
        write_atomic(&dir, OBS_FILE, &json)?;
        self.set_state(fingerprint, RunState::Completed)
    }

    fn read_state(&self, fingerprint: &Fingerprint) -> Result<RunState, StoreError> {
        let path = self.case_dir(fingerprint).join(STATE_FILE);
        let text = fs::read_to_string(&path).map_err(StoreError::io(&path))?;
        text.parse().map_err(|source| StoreError::StateMarker {
            fingerprint: fingerprint.clone(),
            source,
        })
    }

    /// Creates the case directory for `member`.
    ///
    /// Returns `false` if another creator got there first.
    fn create(&self, fingerprint: &Fingerprint, member: &EnsembleMember) -> Result<bool, StoreError> {
        let staging = self.root.join(format!(
            "{STAGING_PREFIX}{fingerprint}-{}",
            std::process::id()
        ));
        fs::create_dir_all(&staging).map_err(StoreError::io(&staging))?;

        let case = CaseFile {
            fingerprint: fingerprint.clone(),
            member: member.clone(),
        };
        let json = serde_json::to_string_pretty(&case)
            .map_err(StoreError::json(staging.join(PARAMS_FILE)))?;
        write_file(&staging.join(PARAMS_FILE), &json)?;
        write_file(&staging.join(STATE_FILE), RunState::New.as_str())?;

        let target = self.case_dir(fingerprint);
        match fs::rename(&staging, &target) {
            Ok(()) => {
                info!(%fingerprint, dir = %target.display(), "created case");
                Ok(true)
            }
            Err(_) if target.is_dir() => {
                debug!(%fingerprint, "case created concurrently");
                fs::remove_dir_all(&staging).map_err(StoreError::io(&staging))?;
                Ok(false)
            }
            Err(e) => Err(StoreError::io(target)(e)),
        }
    }
}

impl ModelCache for DirStore {
    type Error = StoreError;

    fn resolve(&self, member: &EnsembleMember) -> Result<Option<SimulationRecord>, Self::Error> {
        check_names(&self.names, member)?;
        let fingerprint = member.fingerprint();

        if let Some(record) = self.get(&fingerprint)? {
            debug!(%fingerprint, state = %record.state, "cache hit");
            return Ok(Some(record));
        }

        if self.create(&fingerprint, member)? {
            Ok(None)
        } else {
            self.get(&fingerprint)
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), StoreError> {
    fs::write(path, contents).map_err(StoreError::io(path))
}

/// Writes `name` inside `dir` via a temporary sibling and a rename.
fn write_atomic(dir: &Path, name: &str, contents: &str) -> Result<(), StoreError> {
    let tmp = dir.join(format!(".{name}.tmp"));
    write_file(&tmp, contents)?;
    let path = dir.join(name);
    fs::rename(&tmp, &path).map_err(StoreError::io(path))
}
