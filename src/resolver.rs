use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{KernelError, Result};
use crate::model::{NamespaceEntry, NamespaceMapping};

/// マニフェスト中で psr-4 マッピングを保持しているキー
pub const AUTOLOAD_KEY: &str = "autoload";
pub const PSR4_KEY: &str = "psr-4";

/// 名前空間の区切り文字
pub const NAMESPACE_SEPARATOR: char = '\\';

/// composer.json 形式のマニフェストを読み込み、`autoload.psr-4` の対応表を返す。
///
/// - ファイルが読めない     → `ManifestMissing`
/// - JSON として不正         → `ManifestMalformed`
/// - autoload / psr-4 が無い → `ManifestSchema`
pub fn load_mapping(manifest_path: &Path) -> Result<NamespaceMapping> {
    let content = fs::read_to_string(manifest_path).map_err(|source| {
        KernelError::ManifestMissing {
            path: manifest_path.to_path_buf(),
            source,
        }
    })?;

    let decoded: Value =
        serde_json::from_str(&content).map_err(|source| KernelError::ManifestMalformed {
            path: manifest_path.to_path_buf(),
            source,
        })?;

    let schema_error = |reason: String| KernelError::ManifestSchema {
        path: manifest_path.to_path_buf(),
        reason,
    };

    let psr4 = decoded
        .get(AUTOLOAD_KEY)
        .and_then(|autoload| autoload.get(PSR4_KEY))
        .and_then(Value::as_object)
        .ok_or_else(|| schema_error(format!("no \"{AUTOLOAD_KEY}.{PSR4_KEY}\" object found")))?;

    // preserve_order により、ここでの反復順はファイル上の宣言順になる
    let mut entries = Vec::with_capacity(psr4.len());
    for (prefix, dirs) in psr4 {
        let directories = match dirs {
            Value::String(dir) => vec![dir.clone()],
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .filter(|dirs| !dirs.is_empty())
                .ok_or_else(|| {
                    schema_error(format!("prefix \"{prefix}\" must map to directory strings"))
                })?,
            _ => {
                return Err(schema_error(format!(
                    "prefix \"{prefix}\" must map to a directory string or a list of them"
                )));
            }
        };
        entries.push(NamespaceEntry {
            prefix: prefix.clone(),
            directories,
        });
    }

    debug!(
        "マニフェスト {:?} から {} 個の名前空間を読み込みました",
        manifest_path,
        entries.len()
    );
    Ok(NamespaceMapping::new(entries))
}

/// `namespace` を、対応表の最初に一致したエントリのディレクトリへ変換する。
///
/// 例: root = /app, mapping = {"App\\": "src/"}, namespace = "App\\Controller"
///   → /app/src/Controller
pub fn resolve_directory(
    root: &Path,
    namespace: &str,
    mapping: &NamespaceMapping,
) -> Result<PathBuf> {
    resolve_directories(root, namespace, mapping)?
        .into_iter()
        .next()
        .ok_or_else(|| KernelError::NamespaceUnresolved(namespace.to_string()))
}

/// 一致したエントリに宣言された全ディレクトリについて `resolve_directory` と同じ変換を行う
pub fn resolve_directories(
    root: &Path,
    namespace: &str,
    mapping: &NamespaceMapping,
) -> Result<Vec<PathBuf>> {
    let entry = mapping
        .find_root(namespace)
        .ok_or_else(|| KernelError::NamespaceUnresolved(namespace.to_string()))?;

    // 1) プレフィックスを取り除いた残りの名前空間を区切り文字で分割
    let remainder = namespace[entry.prefix.len()..].trim_start_matches(NAMESPACE_SEPARATOR);
    let segments: Vec<&str> = remainder
        .split(NAMESPACE_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect();

    // 2) root + マップされたディレクトリ + セグメント を結合
    Ok(entry
        .directories
        .iter()
        .map(|dir| {
            let mut path = root.join(dir.trim_start_matches(['/', '\\']));
            for segment in &segments {
                path.push(segment);
            }
            path
        })
        .collect())
}
