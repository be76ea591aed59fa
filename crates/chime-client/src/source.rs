//! Files a client can stream: a local path or a downloadable URL.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use reqwest::Url;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::ClientError;

pub struct MediaSource {
    name: String,
    size: u64,
    body: Body,
}

enum Body {
    Local(tokio::fs::File),
    Remote {
        response: reqwest::Response,
        pending: BytesMut,
    },
}

impl MediaSource {
    /// Open `address` as a local file if the path exists, otherwise as a URL.
    pub async fn open(address: &str) -> Result<Self, ClientError> {
        if tokio::fs::try_exists(address).await.unwrap_or(false) {
            return Self::open_local(Path::new(address)).await;
        }
        match parse_url(address) {
            Some(url) => Self::open_remote(url).await,
            None => Err(ClientError::InvalidSource(address.to_string())),
        }
    }

    pub async fn open_local(path: &Path) -> Result<Self, ClientError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::InvalidSource(path.display().to_string()))?
            .to_string();
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        debug!("Local source {} ({} bytes)", path.display(), size);

        Ok(Self {
            name,
            size,
            body: Body::Local(file),
        })
    }

    /// The response must carry a content length and a `filename=` in its
    /// content disposition; text and HTML pages are refused.
    pub async fn open_remote(url: Url) -> Result<Self, ClientError> {
        let response = reqwest::get(url.clone()).await?.error_for_status()?;

        let content_type = header_str(&response, CONTENT_TYPE).to_ascii_lowercase();
        if content_type.contains("text") || content_type.contains("html") {
            return Err(ClientError::NotDownloadable(format!(
                "{} serves {}",
                url, content_type
            )));
        }

        let name = filename(&header_str(&response, CONTENT_DISPOSITION)).ok_or_else(|| {
            ClientError::NotDownloadable(format!("{} has no filename in its content disposition", url))
        })?;
        let size = response
            .content_length()
            .ok_or_else(|| ClientError::NotDownloadable(format!("{} has no content length", url)))?;
        debug!("Remote source {} as '{}' ({} bytes)", url, name, size);

        Ok(Self {
            name,
            size,
            body: Body::Remote {
                response,
                pending: BytesMut::new(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Next chunk of at most `max` bytes, `None` once the source is exhausted.
    pub async fn next_chunk(&mut self, max: usize) -> Result<Option<Bytes>, ClientError> {
        match &mut self.body {
            Body::Local(file) => {
                let mut buf = vec![0u8; max];
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            Body::Remote { response, pending } => {
                while pending.len() < max {
                    match response.chunk().await? {
                        Some(chunk) => pending.extend_from_slice(&chunk),
                        None => break,
                    }
                }
                if pending.is_empty() {
                    return Ok(None);
                }
                let take = pending.len().min(max);
                Ok(Some(pending.split_to(take).freeze()))
            }
        }
    }
}

fn parse_url(address: &str) -> Option<Url> {
    let url = Url::parse(address).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    (web && url.host_str().is_some()).then_some(url)
}

fn header_str(response: &reqwest::Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// `attachment; filename="clip.mp4"` gives `clip.mp4`.
fn filename(disposition: &str) -> Option<String> {
    let (_, rest) = disposition.split_once("filename=")?;
    let name = rest.split(';').next()?.trim().trim_matches('"');
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename() {
        assert_eq!(filename("attachment; filename=clip.mp4").as_deref(), Some("clip.mp4"));
        assert_eq!(
            filename("attachment; filename=\"a b.ogg\"; size=3").as_deref(),
            Some("a b.ogg")
        );
        assert_eq!(filename("inline"), None);
        assert_eq!(filename("attachment; filename=\"\""), None);
    }

    #[test]
    fn test_parse_url() {
        assert!(parse_url("https://example.com/a.ogg").is_some());
        assert!(parse_url("http://127.0.0.1:8080/clip").is_some());
        assert!(parse_url("ftp://example.com/a.ogg").is_none());
        assert!(parse_url("notes/voice.ogg").is_none());
        assert!(parse_url("file:///tmp/a.ogg").is_none());
    }

    #[tokio::test]
    async fn test_local_file_is_chunked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.ogg");
        std::fs::write(&path, b"abcdefg").unwrap();

        let mut source = MediaSource::open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(source.name(), "memo.ogg");
        assert_eq!(source.size(), 7);

        let mut chunks = Vec::new();
        while let Some(chunk) = source.next_chunk(3).await.unwrap() {
            chunks.push(chunk);
        }
        assert_eq!(chunks, [&b"abc"[..], &b"def"[..], &b"g"[..]]);
    }

    #[tokio::test]
    async fn test_missing_path_is_invalid() {
        assert!(matches!(
            MediaSource::open("no/such/file.ogg").await,
            Err(ClientError::InvalidSource(_))
        ));
    }
}
