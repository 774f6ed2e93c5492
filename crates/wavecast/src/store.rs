//! List persistence
//!
//! The station and access-point lists are raw `\r\n`-delimited text blobs
//! owned by the administrative interface; the core only loads and saves
//! them whole through the `ConfigStore` capability. `FsStore` keeps them as
//! files under a configuration directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{RadioError, Result};

/// File name of the station list (one URI per record)
pub const STATION_LIST: &str = "webradio.lst";

/// File name of the access-point list (`ssid/password` per record)
pub const AP_LIST: &str = "wifiap.lst";

/// Whole-blob persistence for the two lists
pub trait ConfigStore {
    fn load_list(&self, name: &str) -> Result<Vec<u8>>;
    fn save_list(&self, name: &str, data: &[u8]) -> Result<()>;
}

/// Directory-backed `ConfigStore`
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            RadioError::Config(format!("cannot create config dir {root:?}: {e}"))
        })?;
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ConfigStore for FsStore {
    fn load_list(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name);
        tracing::debug!(?path, "reading list");
        fs::read(&path).map_err(|e| {
            let msg = match e.kind() {
                ErrorKind::NotFound => format!("list {path:?} does not exist"),
                ErrorKind::PermissionDenied => format!("permission denied reading {path:?}"),
                _ => format!("failed to read {path:?}: {e}"),
            };
            RadioError::Config(msg)
        })
    }

    fn save_list(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(name);
        tracing::debug!(?path, len = data.len(), "writing list");
        fs::write(&path, data).map_err(|e| {
            let msg = match e.kind() {
                ErrorKind::PermissionDenied => format!("permission denied writing {path:?}"),
                _ => format!("failed to write {path:?}: {e}"),
            };
            RadioError::Config(msg)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store
            .save_list(STATION_LIST, b"http://a/1\r\nhttp://b/2")
            .unwrap();
        assert_eq!(
            store.load_list(STATION_LIST).unwrap(),
            b"http://a/1\r\nhttp://b/2"
        );
    }

    #[test]
    fn missing_list_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load_list(AP_LIST),
            Err(RadioError::Config(_))
        ));
    }

    #[test]
    fn save_overwrites_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.save_list(AP_LIST, b"old/secret").unwrap();
        store.save_list(AP_LIST, b"new/pass").unwrap();
        assert_eq!(store.load_list(AP_LIST).unwrap(), b"new/pass");
    }

    #[test]
    fn open_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FsStore::open(&nested).unwrap();
        store.save_list(STATION_LIST, b"http://x/").unwrap();
        assert!(nested.join(STATION_LIST).exists());
    }
}
