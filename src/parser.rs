use once_cell::sync::Lazy;
use regex::Regex;

/// 行頭 (もしくは `<?php` の直後) の `namespace Foo\Bar;` 宣言
static NAMESPACE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:<\?php)?\s*namespace\s+([A-Za-z0-9_\\]+?)\s*;")
        .expect("namespace pattern is a valid regex")
});

/// 1 桁目 (もしくは同じ行の `;` の直後) の `class Foo` 宣言。インデントされた宣言は対象外
static CLASS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:^|;[ \t]*)class\s+([A-Za-z_][A-Za-z0-9_]*)\b")
        .expect("class pattern is a valid regex")
});

/// ソースファイルの内容から完全修飾クラス名を取り出す。
///
/// 構文解析は行わず、2 つのテキストパターンの最初の一致を `\` で連結するだけの簡易実装。
/// 以下は意図的に検出しない:
/// - `abstract class` / `final class` (キーワードが `class` の前に付くもの)
/// - 条件分岐の中で宣言されたクラス
/// - 同じファイル内の 2 つ目以降のクラス
/// - namespace 宣言の無いファイル
pub fn extract_class_name(contents: &str) -> Option<String> {
    let namespace = NAMESPACE_PATTERN.captures(contents)?.get(1)?.as_str();
    let class = CLASS_PATTERN.captures(contents)?.get(1)?.as_str();

    Some(format!(
        "{}\\{}",
        namespace.trim_end_matches('\\'),
        class
    ))
}
