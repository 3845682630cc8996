use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::error::{KernelError, Result};

/// キャッシュディレクトリ内の JSON ファイルを読み書きする
#[derive(Debug, Clone)]
pub struct CacheHandler {
    directory: PathBuf,
}

impl CacheHandler {
    /// ディレクトリが無ければ作成する
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        if !directory.is_dir() {
            fs::create_dir_all(&directory).map_err(|source| KernelError::CacheDirectory {
                path: directory.clone(),
                source,
            })?;
        }
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    /// エントリが無い場合は `Ok(None)`。読めるが壊れているエントリは捨てて `Ok(None)` を返す
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.entry_path(name);
        if !path.is_file() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(value) => {
                debug!("キャッシュヒット: {:?}", path);
                Ok(Some(value))
            }
            Err(e) => {
                warn!("壊れたキャッシュエントリを無視します: {:?} ({})", path, e);
                Ok(None)
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.entry_path(name);
        let content = serde_json::to_string(value)?;
        fs::write(&path, content)?;
        debug!("キャッシュ書き込み: {:?}", path);
        Ok(())
    }
}

/// ファイル群の内容と追加のキーから xxh3 のフィンガープリントを作る。
///
/// 存在しないファイルは「無い」という事実だけがハッシュに入る。
pub fn fingerprint_files<P, S>(paths: &[P], extra: &[S]) -> Result<u64>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let mut hasher = Xxh3::new();
    for path in paths {
        let path = path.as_ref();
        match fs::read(path) {
            Ok(content) => {
                hasher.write_u8(1);
                hasher.write_u64(content.len() as u64);
                hasher.write(&content);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => hasher.write_u8(0),
            Err(e) => return Err(e.into()),
        }
    }
    for key in extra {
        let key = key.as_ref();
        hasher.write_u64(key.len() as u64);
        hasher.write(key.as_bytes());
    }
    Ok(hasher.finish())
}
