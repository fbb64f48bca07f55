//! File-backed credential slot.
//!
//! The file is a flat JSON object shared with other keys the host
//! application may keep next to the credential; only the storage key is
//! ever touched.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::credential::{Credential, CredentialStore};

/// Key the credential is stored under when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "token";

/// Persistent [`CredentialStore`] keeping the credential under one key of a
/// JSON object file.
///
/// The file is read once on [`open`](Self::open). From then on the in-memory
/// copy is authoritative; every change is written through.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    key: String,
    current: Mutex<Option<Credential>>,
}

impl FileCredentialStore {
    /// Open the store at `path` using [`DEFAULT_STORAGE_KEY`].
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_key(path, DEFAULT_STORAGE_KEY)
    }

    /// Open the store at `path`, keeping the credential under `key`.
    ///
    /// A missing file is an empty store. An unreadable or malformed file is
    /// logged and also treated as empty.
    #[must_use]
    pub fn with_key(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        let path = path.into();
        let key = key.into();
        let current = match read_object(&path) {
            Ok(object) => object
                .get(&key)
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(Credential::new),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring unreadable credentials file"
                );
                None
            }
        };

        tracing::debug!(
            path = %path.display(),
            key = %key,
            present = current.is_some(),
            "opened credentials file"
        );

        Self {
            path,
            key,
            current: Mutex::new(current),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn persist(&self, credential: Option<&Credential>) {
        if let Err(e) = self.write_through(credential) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to persist credential; keeping in-memory copy"
            );
        }
    }

    fn write_through(&self, credential: Option<&Credential>) -> io::Result<()> {
        // Foreign keys survive; a corrupt file is replaced.
        let mut object = read_object(&self.path).unwrap_or_default();
        match credential {
            Some(c) => {
                object.insert(self.key.clone(), Value::String(c.secret().expose().to_owned()));
            }
            None => {
                object.remove(&self.key);
            }
        }

        let encoded = serde_json::to_vec_pretty(&Value::Object(object)).map_err(io::Error::other)?;
        write_private(&self.path, &encoded)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<Credential> {
        self.current.lock().clone()
    }

    fn store(&self, credential: Credential) {
        let mut current = self.current.lock();
        self.persist(Some(&credential));
        *current = Some(credential);
    }

    fn clear(&self) {
        let mut current = self.current.lock();
        self.persist(None);
        current.take();
    }
}

fn read_object(path: &Path) -> io::Result<Map<String, Value>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(e),
    };
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(&raw).map_err(io::Error::other)? {
        Value::Object(object) => Ok(object),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "credentials file is not a JSON object",
        )),
    }
}

/// Write `contents` to a sibling temp file and rename it over `path`.
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)
}
