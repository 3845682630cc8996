use path_absolutize::Absolutize;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{KernelError, Result};

/// アプリケーションルートを基準にしたパスの組み立て
#[derive(Debug, Clone)]
pub struct PathBuilder {
    root_dir: PathBuf,
}

impl PathBuilder {
    /// `root_dir` は存在するディレクトリでなければならない (正規化して保持する)
    pub fn new(root_dir: impl AsRef<Path>) -> Result<Self> {
        let root_dir = root_dir.as_ref();
        let canonical = root_dir
            .canonicalize()
            .map_err(|_| KernelError::InvalidPath(root_dir.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(KernelError::InvalidPath(canonical));
        }
        Ok(Self {
            root_dir: canonical,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// ルートからの相対パスを絶対パスへ変換する (存在確認はしない)。
    ///
    /// ルート (と Windows のドライブ接頭辞) は無視されるので、"/config/settings.yml" も
    /// "config/settings.yml" も同じ場所を指す。UTF-8 でないファイル名もそのまま通す。
    pub fn join(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let relative: PathBuf = relative
            .as_ref()
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
            .collect();
        let joined = self.root_dir.join(relative);
        Ok(joined.absolutize()?.to_path_buf())
    }

    /// `join` した上で存在を確認する。`create` が真ならディレクトリとして作成する
    pub fn absolute_path(&self, relative: impl AsRef<Path>, create: bool) -> Result<PathBuf> {
        let path = self.join(relative)?;
        if path.exists() {
            return Ok(path);
        }
        if !create {
            return Err(KernelError::InvalidPath(path));
        }
        self.create_path(&path)?;
        Ok(path)
    }

    pub fn create_path(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|_| KernelError::InvalidPath(path.to_path_buf()))
    }
}
