use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chime_types::models::MediaKind;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest sanitized name kept in a sink name.
const MAX_SAFE_NAME: usize = 64;

/// Relative identifier of an accepted transfer's destination, e.g.
/// `voice/7-3f2a9c01b4de-hello.ogg`.
///
/// Derived only from the media kind, client id and declared name, so the same
/// sender and name always land in the same sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SinkName(String);

impl SinkName {
    pub fn derive(kind: MediaKind, client_id: i64, declared_name: &str) -> Self {
        let digest = hex::encode(Sha256::digest(declared_name.as_bytes()));
        Self(format!(
            "{}/{}-{}-{}",
            kind.as_str(),
            client_id,
            &digest[..12],
            safe_name(declared_name)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SinkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn safe_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SAFE_NAME)
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Scratch file holding one accepted transfer until it completes.
///
/// Lives next to its sink as `{sink}.part-{id}`, so concurrent transfers into
/// the same sink never share a file.
#[derive(Debug, PartialEq, Eq)]
pub struct Staging {
    sink: SinkName,
    part: PathBuf,
}

impl Staging {
    pub fn sink(&self) -> &SinkName {
        &self.sink
    }

    pub fn path(&self) -> &Path {
        &self.part
    }
}

/// On-disk sinks for accepted multimedia.
///
/// Each sink is a flat file at `{media_dir}/{kind}/{name}`. Sinks only ever
/// grow, and only by whole transfers: chunks go to a [`Staging`] file that is
/// appended to the sink once the transfer completes.
pub struct MediaStore {
    dir: PathBuf,
    // Serializes commits so two transfers never interleave inside one sink
    commits: Mutex<()>,
}

impl MediaStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        for kind in [MediaKind::Voice, MediaKind::Video] {
            fs::create_dir_all(dir.join(kind.as_str())).await?;
        }
        info!("Media directory: {}", dir.display());
        Ok(Self {
            dir,
            commits: Mutex::new(()),
        })
    }

    pub fn file_path(&self, sink: &SinkName) -> PathBuf {
        self.dir.join(sink.as_str())
    }

    /// Reserve a fresh staging file for a transfer into `sink`. Nothing is
    /// created on disk until the first chunk.
    pub fn stage(&self, sink: &SinkName) -> Staging {
        let part = self.dir.join(format!(
            "{}.part-{}",
            sink.as_str(),
            Uuid::new_v4().simple()
        ));
        Staging {
            sink: sink.clone(),
            part,
        }
    }

    /// Append a chunk to a staging file, creating it on first write.
    pub async fn append(&self, staging: &Staging, data: &[u8]) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&staging.part)
            .await?;
        file.write_all(data).await?;
        file.flush().await
    }

    /// Append a finished transfer to its sink and drop the staging file.
    pub async fn commit(&self, staging: Staging) -> std::io::Result<u64> {
        let _guard = self.commits.lock().await;

        let mut part = match fs::File::open(&staging.part).await {
            Ok(file) => file,
            // Only empty chunks arrived; the sink is still created
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.file_path(&staging.sink))
                    .await?;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        let mut sink = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path(&staging.sink))
            .await?;
        let copied = tokio::io::copy(&mut part, &mut sink).await?;
        sink.flush().await?;
        drop(part);

        debug!("Committed {} bytes into {}", copied, staging.sink);
        if let Err(e) = fs::remove_file(&staging.part).await {
            warn!(
                "Could not remove staging file {}: {}",
                staging.part.display(),
                e
            );
        }
        Ok(copied)
    }

    /// Throw away a transfer that will not complete. The sink is untouched.
    pub async fn discard(&self, staging: Staging) {
        match fs::remove_file(&staging.part).await {
            Ok(()) => debug!("Dropped staging file for {}", staging.sink),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Could not remove staging file {}: {}",
                staging.part.display(),
                e
            ),
        }
    }
}
