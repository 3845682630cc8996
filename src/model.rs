// src/model.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// マニフェスト (composer.json の autoload.psr-4) の 1 エントリ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceEntry {
    /// 名前空間プレフィックス (例: "App\\")
    pub prefix: String,

    /// プレフィックスに対応するディレクトリ (アプリルートからの相対パス)
    /// composer は文字列と配列の両方を許すので、宣言順のまま保持する
    pub directories: Vec<String>,
}

/// 宣言順を保持した名前空間プレフィックス → ディレクトリの対応表。
///
/// プレフィックスは宣言順に前方一致で検査され、最初に一致したものが採用される。
/// より長い (具体的な) プレフィックスが後ろに宣言されていても優先されない点に注意。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMapping {
    pub entries: Vec<NamespaceEntry>,
}

impl NamespaceMapping {
    pub fn new(entries: Vec<NamespaceEntry>) -> Self {
        Self { entries }
    }

    /// `namespace` を前方一致で含む最初のエントリを返す
    pub fn find_root(&self, namespace: &str) -> Option<&NamespaceEntry> {
        self.entries
            .iter()
            .find(|entry| namespace.starts_with(&entry.prefix))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// スキャンで名前が解決できたソースファイル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredClass {
    /// ソースファイルへの絶対パス
    pub path: PathBuf,

    /// 完全修飾クラス名 (例: "App\\Controller\\Foo")
    pub fqcn: String,
}

/// ルートの呼び出し先 (コントローラクラス + アクション名)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    pub controller: String,
    pub action: String,
}

/// フラット化された 1 本のルート
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRoute {
    /// 大文字に正規化された HTTP メソッド
    pub methods: Vec<String>,

    /// ルートから葉までのラベルを連結したパターン (区切り文字は挿入しない)
    pub pattern: String,

    /// アクション識別子
    pub action: String,
}
