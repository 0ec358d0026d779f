//! The `.fixdesk` directory: config, profiles and issue data

use crate::{Config, Error, Profile, ProfileBook, Result, StorageBackend};
use std::fs;
use std::path::{Path, PathBuf};

const FIXDESK_DIR: &str = ".fixdesk";
const CONFIG_FILE: &str = "config.toml";
const PROFILES_FILE: &str = "profiles.jsonl";

/// Default management account created by `init`
pub const DEFAULT_ADMIN: &str = "admin";

pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Find the workspace for the current directory
    pub fn find() -> Result<Self> {
        Self::find_from(&std::env::current_dir()?)
    }

    /// Walk up from `start` to the directory containing `.fixdesk`
    pub fn find_from(start: &Path) -> Result<Self> {
        let mut current = start.to_path_buf();
        loop {
            if current.join(FIXDESK_DIR).exists() {
                return Ok(Self { root: current });
            }
            if !current.pop() {
                return Err(Error::NotInitialized);
            }
        }
    }

    /// Create `.fixdesk` under `root` with the given storage backend
    pub fn init(root: &Path, storage: StorageBackend) -> Result<Self> {
        let dir = root.join(FIXDESK_DIR);
        if dir.exists() {
            return Err(Error::AlreadyInitialized(dir.display().to_string()));
        }
        fs::create_dir_all(&dir)?;

        let config = Config::default_with_comments().replacen(
            "storage = \"jsonl\"",
            &format!("storage = \"{}\"", storage),
            1,
        );
        fs::write(dir.join(CONFIG_FILE), config)?;

        let workspace = Self {
            root: root.to_path_buf(),
        };
        ProfileBook::open(&workspace.profiles_path())?.upsert(Profile::management(DEFAULT_ADMIN))?;
        tracing::info!(dir = %dir.display(), %storage, "initialized workspace");
        Ok(workspace)
    }

    /// Path to the .fixdesk directory
    pub fn dir(&self) -> PathBuf {
        self.root.join(FIXDESK_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir().join(CONFIG_FILE)
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.dir().join(PROFILES_FILE)
    }

    pub fn config(&self) -> Result<Config> {
        Config::load(&self.config_path())
    }

    pub fn profiles(&self) -> Result<ProfileBook> {
        ProfileBook::open(&self.profiles_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProfileDirectory, Role};

    #[test]
    fn test_init_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::init(dir.path(), StorageBackend::Sqlite).unwrap();
        assert_eq!(workspace.config().unwrap().storage, StorageBackend::Sqlite);

        let admin = workspace.profiles().unwrap().lookup(DEFAULT_ADMIN).unwrap().unwrap();
        assert_eq!(admin.role, Role::Management);

        let nested = dir.path().join("block-a").join("room-101");
        fs::create_dir_all(&nested).unwrap();
        let found = Workspace::find_from(&nested).unwrap();
        assert_eq!(found.dir(), workspace.dir());

        assert!(matches!(
            Workspace::init(dir.path(), StorageBackend::Jsonl),
            Err(Error::AlreadyInitialized(_))
        ));
    }
}
