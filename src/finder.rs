use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{KernelError, Result};
use crate::model::{DiscoveredClass, NamespaceMapping};
use crate::parser::extract_class_name;
use crate::resolver::{load_mapping, resolve_directories, resolve_directory};

/// 静的なマニフェストをもとに、名前空間に属するクラスをソースツリーから探し出す。
///
/// ファイルごとの抽出結果は `store` にメモ化される。メモは 1 回の探索パスの間だけ有効で、
/// 次のパスの前に `clear_memo` で捨てること。`&mut self` を要求するため、
/// 複数スレッドで共有する場合は外側でロックする必要がある。
#[derive(Debug)]
pub struct ClassFinder {
    app_root: PathBuf,
    mapping: NamespaceMapping,
    store: HashMap<PathBuf, Option<String>>,
}

impl ClassFinder {
    pub fn new(app_root: impl Into<PathBuf>, mapping: NamespaceMapping) -> Self {
        Self {
            app_root: app_root.into(),
            mapping,
            store: HashMap::new(),
        }
    }

    /// `app_root` 配下のマニフェストを読み込んで `ClassFinder` を作る
    pub fn from_manifest(app_root: impl Into<PathBuf>, manifest_path: &Path) -> Result<Self> {
        let mapping = load_mapping(manifest_path)?;
        Ok(Self::new(app_root, mapping))
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    pub fn root_namespaces(&self) -> &NamespaceMapping {
        &self.mapping
    }

    pub fn clear_memo(&mut self) {
        self.store.clear();
    }

    pub fn resolve_directory(&self, namespace: &str) -> Result<PathBuf> {
        resolve_directory(&self.app_root, namespace, &self.mapping)
    }

    /// 1 ファイル分のクラス名を (メモを経由して) 取得する
    fn class_name_for(&mut self, path: &Path) -> Option<String> {
        if let Some(cached) = self.store.get(path) {
            return cached.clone();
        }

        // UTF-8 として読めないファイルはクラスを持たないものとして扱う
        let name = match fs::read_to_string(path) {
            Ok(contents) => extract_class_name(&contents),
            Err(e) => {
                debug!("読み込みをスキップ: {:?} ({})", path, e);
                None
            }
        };

        self.store.insert(path.to_path_buf(), name.clone());
        name
    }

    /// `directory` 配下を再帰的に走査し、クラス名が取れたファイルだけを返す。
    ///
    /// 走査順はファイル名でソートされた深さ優先順で、結果の順序もそれに従う。
    /// 読めないファイルもサブディレクトリも debug ログを出して飛ばす。
    /// エラーになるのは `directory` 自体が存在しない場合だけ。
    pub fn scan_directory(&mut self, directory: &Path) -> Result<Vec<DiscoveredClass>> {
        if !directory.is_dir() {
            return Err(KernelError::InvalidPath(directory.to_path_buf()));
        }

        let files: Vec<PathBuf> = WalkDir::new(directory)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!("読み取れないエントリをスキップ: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        let mut discovered = Vec::new();
        for path in files {
            match self.class_name_for(&path) {
                Some(fqcn) => discovered.push(DiscoveredClass { path, fqcn }),
                None => debug!("クラス宣言なし: {:?}", path),
            }
        }

        Ok(discovered)
    }

    /// 名前空間に対応する (存在する) 全ディレクトリを走査してクラス名を集める
    pub fn get_classes_in_namespace(&mut self, namespace: &str) -> Result<Vec<String>> {
        let directories = resolve_directories(&self.app_root, namespace, &self.mapping)?;

        let existing: Vec<PathBuf> = directories.iter().filter(|d| d.is_dir()).cloned().collect();
        if existing.is_empty() {
            // どのディレクトリも無い場合は最初のものをエラーとして報告する
            let first = directories
                .into_iter()
                .next()
                .ok_or_else(|| KernelError::NamespaceUnresolved(namespace.to_string()))?;
            return Err(KernelError::InvalidPath(first));
        }

        let mut classes = IndexSet::new();
        for directory in existing {
            for class in self.scan_directory(&directory)? {
                classes.insert(class.fqcn);
            }
        }

        info!("名前空間 {} で {} 個のクラスを発見", namespace, classes.len());
        Ok(classes.into_iter().collect())
    }

    /// 複数の名前空間の結果を、初出順・重複なしで結合する
    pub fn get_classes_in_namespaces<S: AsRef<str>>(
        &mut self,
        namespaces: &[S],
    ) -> Result<Vec<String>> {
        let mut classes = IndexSet::new();
        for namespace in namespaces {
            classes.extend(self.get_classes_in_namespace(namespace.as_ref())?);
        }
        Ok(classes.into_iter().collect())
    }

    pub fn namespace_has_classes(&mut self, namespace: &str) -> Result<bool> {
        Ok(!self.get_classes_in_namespace(namespace)?.is_empty())
    }

    pub fn namespaces_have_classes<S: AsRef<str>>(
        &mut self,
        namespaces: &[S],
    ) -> Result<IndexMap<String, bool>> {
        let mut result = IndexMap::new();
        for namespace in namespaces {
            let namespace = namespace.as_ref();
            result.insert(namespace.to_string(), self.namespace_has_classes(namespace)?);
        }
        Ok(result)
    }
}
