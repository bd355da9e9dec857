use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// Path the media directory is served under.
pub const MEDIA_ROUTE: &str = "/media";

/// Where issue photos go. `upload` returns a URL clients can fetch the bytes
/// from; `delete` takes that same URL back.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, bytes: Bytes) -> Result<String>;

    async fn delete(&self, url: &str) -> Result<()>;
}

/// Stores each upload as a flat file at `{dir}/{uuid}` and hands out URLs
/// under `{public_base_url}/media/`.
pub struct LocalMediaStore {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalMediaStore {
    pub async fn new(dir: PathBuf, public_base_url: &str) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a URL handed out by `upload` back to its file name. Anything that
    /// is not one of ours (or could escape the directory) is refused.
    fn file_name<'a>(&self, url: &'a str) -> Option<&'a str> {
        let name = url
            .strip_prefix(self.public_base_url.as_str())?
            .strip_prefix(MEDIA_ROUTE)?
            .strip_prefix('/')?;
        name.parse::<Uuid>().ok().map(|_| name)
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, bytes: Bytes) -> Result<String> {
        if bytes.is_empty() {
            bail!("Refusing to store an empty image");
        }

        let name = Uuid::new_v4().to_string();
        fs::write(self.dir.join(&name), &bytes).await?;

        Ok(format!("{}{}/{}", self.public_base_url, MEDIA_ROUTE, name))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let name = self
            .file_name(url)
            .ok_or_else(|| anyhow!("Not a local media URL: {}", url))?;

        match fs::remove_file(self.dir.join(name)).await {
            Ok(()) => {
                info!("Deleted media {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
