//! Resident and staff profiles
//!
//! The user store itself lives outside fixdesk. The tracker only needs to
//! resolve a username to a role and a location, which is what
//! [`ProfileDirectory`] exposes.

use crate::store::read_lines;
use crate::{Error, Location, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
pub enum Role {
    #[default]
    Student,
    Management,
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "management" | "staff" => Ok(Role::Management),
            _ => Err(Error::InvalidRole(s.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "Student"),
            Role::Management => write!(f, "Management"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub location: Location,
}

impl Profile {
    pub fn student(username: impl Into<String>, location: Location) -> Self {
        Self {
            username: username.into(),
            role: Role::Student,
            location,
        }
    }

    pub fn management(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Management,
            location: Location::default(),
        }
    }
}

/// Read access to the external user store
pub trait ProfileDirectory: Send + Sync {
    fn lookup(&self, username: &str) -> Result<Option<Profile>>;
}

impl<T: ProfileDirectory + ?Sized> ProfileDirectory for Arc<T> {
    fn lookup(&self, username: &str) -> Result<Option<Profile>> {
        (**self).lookup(username)
    }
}

/// Profile book kept in `profiles.jsonl` next to the issue data.
/// Without a path it stays in memory, which is what tests use.
pub struct ProfileBook {
    path: Option<PathBuf>,
    profiles: RwLock<BTreeMap<String, Profile>>,
}

impl ProfileBook {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            profiles: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load profiles from a JSONL file; a missing file is an empty book and
    /// malformed lines are skipped like in the issue store
    pub fn open(path: &Path) -> Result<Self> {
        let profiles: BTreeMap<String, Profile> = read_lines::<Profile>(path)?
            .into_iter()
            .map(|p| (p.username.clone(), p))
            .collect();
        tracing::debug!(path = %path.display(), count = profiles.len(), "loaded profiles");
        Ok(Self {
            path: Some(path.to_path_buf()),
            profiles: RwLock::new(profiles),
        })
    }

    /// Insert or replace a profile
    pub fn upsert(&self, profile: Profile) -> Result<()> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| Error::Other("profile lock poisoned".into()))?;
        profiles.insert(profile.username.clone(), profile);
        self.save(&profiles)
    }

    pub fn list(&self) -> Result<Vec<Profile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| Error::Other("profile lock poisoned".into()))?;
        Ok(profiles.values().cloned().collect())
    }

    fn save(&self, profiles: &BTreeMap<String, Profile>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        for profile in profiles.values() {
            serde_json::to_writer(&mut writer, profile)?;
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ProfileDirectory for ProfileBook {
    fn lookup(&self, username: &str) -> Result<Option<Profile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| Error::Other("profile lock poisoned".into()))?;
        Ok(profiles.get(username).cloned())
    }
}
