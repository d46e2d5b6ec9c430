use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use mailsync_common::{SubmissionId, internal};
use tokio::{fs, sync::Mutex};

use crate::{
    EventKey, EventRecord, EventRecordId, EventStore, MimeCache, MimeFileName, StoreError,
    ValidationError,
};

const SENSITIVE_PREFIXES: [&str; 9] = [
    "/etc",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/boot",
    "/sys",
    "/proc",
    "/dev",
];

/// Validate a storage directory
///
/// Rejects `..` components, relative paths and system directories.
pub fn validate_path(path: &Path) -> Result<(), ValidationError> {
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(ValidationError::ParentComponent(path.display().to_string()));
    }

    if !path.is_absolute() {
        return Err(ValidationError::NotAbsolute(path.display().to_string()));
    }

    if let Some(prefix) = SENSITIVE_PREFIXES
        .into_iter()
        .find(|prefix| path.starts_with(prefix))
    {
        return Err(ValidationError::SystemDirectory {
            prefix,
            path: path.display().to_string(),
        });
    }

    Ok(())
}

/// Create `path` if needed, with the given permissions on unix.
async fn ensure_directory(path: &Path, #[allow(unused)] mode: u32) -> crate::Result<()> {
    if !fs::try_exists(path).await? {
        internal!("{} does not exist, creating...", path.display());

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(mode);
        builder.create(path).await?;
    } else if !fs::metadata(path).await?.is_dir() {
        return Err(ValidationError::NotDirectory(path.display().to_string()).into());
    }

    Ok(())
}

/// Write `content` to `path` via a temporary file in the same directory.
async fn write_atomic(
    directory: &Path,
    filename: &str,
    content: &[u8],
    #[allow(unused)] mode: u32,
) -> crate::Result<PathBuf> {
    let path = directory.join(filename);
    let temp_path = directory.join(format!(".tmp_{filename}"));

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);

    let mut file = options.open(&temp_path).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, content).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, &path).await?;

    Ok(path)
}

/// File-based event store
///
/// Each record is a bincode file named `{id}.bin`. Writes go to a `.tmp_`
/// file first and are renamed into place. Saves are serialized through a
/// mutex so the key lookup and the write of an upsert cannot interleave.
#[derive(Debug)]
pub struct FileEventStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileEventStore {
    /// Open the store at `path`, creating the directory if needed.
    pub async fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        validate_path(&path)?;

        internal!(level = DEBUG, "Opening event store at {}", path.display());
        ensure_directory(&path, 0o700).await?;

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_path(&self, id: &EventRecordId) -> PathBuf {
        self.path.join(format!("{id}.bin"))
    }

    async fn read_record(&self, id: &EventRecordId) -> crate::Result<EventRecord> {
        let content = match fs::read(self.record_path(id)).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*id));
            }
            Err(err) => return Err(err.into()),
        };

        let (record, _) =
            bincode::serde::decode_from_slice(&content, bincode::config::standard())?;
        Ok(record)
    }

    async fn all_records(&self) -> crate::Result<Vec<EventRecord>> {
        let mut records = Vec::new();
        for id in self.list().await? {
            records.push(self.read_record(&id).await?);
        }

        Ok(records)
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    #[tracing::instrument(level = "debug", skip_all, fields(event_id = %record.event_id))]
    async fn save(&self, record: &mut EventRecord) -> crate::Result<EventRecordId> {
        let _guard = self.write_lock.lock().await;

        let id = match record.id {
            Some(id) => id,
            None => match self.find(&record.key()).await? {
                Some(existing) => existing.id.unwrap_or_else(EventRecordId::generate),
                None => EventRecordId::generate(),
            },
        };
        record.id = Some(id);

        let content = bincode::serde::encode_to_vec(&*record, bincode::config::standard())?;
        let path = write_atomic(&self.path, &format!("{id}.bin"), &content, 0o600).await?;

        internal!(level = DEBUG, "Saved event record {id} to {}", path.display());

        Ok(id)
    }

    async fn find(&self, key: &EventKey) -> crate::Result<Option<EventRecord>> {
        Ok(self
            .all_records()
            .await?
            .into_iter()
            .find(|record| record.key() == *key))
    }

    async fn get(&self, id: &EventRecordId) -> crate::Result<EventRecord> {
        self.read_record(id).await
    }

    /// Temporary files and anything that is not `{ulid}.bin` are ignored.
    async fn list(&self) -> crate::Result<Vec<EventRecordId>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            if let Some(id) = EventRecordId::from_filename(&filename.to_string_lossy()) {
                ids.push(id);
            }
        }

        ids.sort();

        Ok(ids)
    }

    async fn for_recipient(
        &self,
        submission_id: Option<SubmissionId>,
        recipient: &str,
    ) -> crate::Result<Vec<EventRecord>> {
        Ok(self
            .all_records()
            .await?
            .into_iter()
            .filter(|record| record.same_recipient(submission_id, recipient))
            .collect())
    }
}

/// File-based MIME cache
///
/// The directory is created owner-only (0700) and blobs are written 0600.
#[derive(Debug, Clone)]
pub struct FileMimeCache {
    path: PathBuf,
}

impl FileMimeCache {
    pub async fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        validate_path(&path)?;
        ensure_directory(&path, 0o700).await?;

        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MimeCache for FileMimeCache {
    async fn write(&self, content: &[u8]) -> crate::Result<MimeFileName> {
        let name = MimeFileName::generate();
        write_atomic(&self.path, name.as_str(), content, 0o600).await?;

        internal!(level = DEBUG, "Cached {} bytes of MIME as {name}", content.len());

        Ok(name)
    }

    async fn read(&self, name: &MimeFileName) -> crate::Result<Option<Vec<u8>>> {
        match fs::read(self.path.join(name.as_str())).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, name: &MimeFileName) -> crate::Result<bool> {
        Ok(fs::try_exists(self.path.join(name.as_str())).await?)
    }

    async fn remove(&self, name: &MimeFileName) -> crate::Result<()> {
        match fs::remove_file(self.path.join(name.as_str())).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::MimeNotFound(name.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(matches!(
            validate_path(Path::new("/var/lib/../etc")),
            Err(ValidationError::ParentComponent(_))
        ));
        assert!(matches!(
            validate_path(Path::new("relative/path")),
            Err(ValidationError::NotAbsolute(_))
        ));
        assert!(matches!(
            validate_path(Path::new("/etc/mailsync")),
            Err(ValidationError::SystemDirectory { prefix: "/etc", .. })
        ));
        assert!(validate_path(Path::new("/var/lib/mailsync")).is_ok());
    }
}
