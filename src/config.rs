use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use toml::{Table, Value};
use tracing::debug;

use crate::error::{KernelError, Result};

/// カーネル設定が置かれるセクション名
pub const SETTINGS_KEY: &str = "kernel";
pub const DEBUG_KEY: &str = "debug";
pub const BASE_PATH_KEY: &str = "base_path";

type ParseError = Box<dyn std::error::Error + Send + Sync>;

/// `%name%` 形式のプレースホルダ
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([A-Za-z0-9_.\-]+?)%").expect("placeholder pattern is valid"));

/// 設定ファイルの書式。拡張子が `.yml` / `.yaml` なら YAML、それ以外は TOML
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml" | "yaml") => Self::Yaml,
            _ => Self::Toml,
        }
    }

    /// どちらの書式も同じ `toml::Table` に読み込む (YAML の null は表現できないのでエラー)
    pub fn parse(self, text: &str) -> std::result::Result<Table, ParseError> {
        match self {
            Self::Toml => Ok(text.parse::<Table>()?),
            // 空の YAML 文書は空のマッピングとして扱う
            Self::Yaml if text.trim().is_empty() => Ok(Table::new()),
            Self::Yaml => Ok(serde_yaml::from_str::<Table>(text)?),
        }
    }
}

/// 設定テーブルへのドット区切りアクセス
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    table: Table,
}

impl ConfigTree {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// "kernel.base_path" のようなドット区切りのキーで値を引く
    pub fn get(&self, dotted_key: &str) -> Option<&Value> {
        let mut parts = dotted_key.split('.');
        let mut current = self.table.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, dotted_key: &str) -> Option<&str> {
        self.get(dotted_key)?.as_str()
    }

    pub fn get_bool(&self, dotted_key: &str) -> Option<bool> {
        self.get(dotted_key)?.as_bool()
    }

    pub fn contains(&self, dotted_key: &str) -> bool {
        self.get(dotted_key).is_some()
    }
}

/// settings と parameters をまとめたもの
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub settings: ConfigTree,
    pub parameters: ConfigTree,
}

impl Config {
    /// 両ファイルを読み込み、parameters を自己展開した上で settings に差し込む。
    ///
    /// 1) parameters の生テキストを、トップレベルのスカラー値で不動点まで置換
    /// 2) 置換後の parameters を読み直す
    /// 3) settings の生テキストを 2) の値で 1 回だけ置換して読み込む
    ///
    /// 書式は各ファイルの拡張子で決まる ([`ConfigFormat::from_path`])。
    ///
    /// 置換はテキストに値をそのまま貼り込むだけで、エスケープはしない。
    /// `"` や `\` を含む値 (例: `'C:\dir'`) を TOML の基本文字列 `"%dir%"` や
    /// YAML のダブルクォート文字列に差し込むと `ConfigParse` になる。
    /// そうした値はリテラル文字列 (`'%dir%'`) の中で参照すること。
    pub fn load(parameters_path: &Path, settings_path: &Path) -> Result<Self> {
        let raw_parameters = read_config_file(parameters_path)?;
        let raw_settings = read_config_file(settings_path)?;
        let parameters_format = ConfigFormat::from_path(parameters_path);

        let initial = parse_table(parameters_path, &raw_parameters)?;
        let resolved_text = resolve_parameters(parameters_format, &raw_parameters, &initial)?;
        let parameters = parse_table(parameters_path, &resolved_text)?;

        let values = scalar_values(&parameters);
        let settings_text = interpolate(&raw_settings, &values);
        let settings = parse_table(settings_path, &settings_text)?;

        debug!(
            "設定を読み込みました: {} 個の parameters, {} 個の settings セクション",
            parameters.len(),
            settings.len()
        );

        Ok(Self {
            settings: ConfigTree::new(settings),
            parameters: ConfigTree::new(parameters),
        })
    }

    /// サービス設定用に settings のセクションを取り出す
    pub fn setting(&self, section: &str) -> Option<&Table> {
        self.settings.table.get(section)?.as_table()
    }

    /// `[kernel]` セクションと `kernel.debug` の存在を確認する
    pub fn validate_kernel_settings(&self) -> Result<()> {
        let kernel = self
            .setting(SETTINGS_KEY)
            .ok_or_else(|| KernelError::MissingConfigKey {
                key: SETTINGS_KEY.to_string(),
                section: None,
            })?;
        if !kernel.get(DEBUG_KEY).is_some_and(Value::is_bool) {
            return Err(KernelError::MissingConfigKey {
                key: DEBUG_KEY.to_string(),
                section: Some(SETTINGS_KEY.to_string()),
            });
        }
        Ok(())
    }

    pub fn is_debug(&self) -> bool {
        self.settings
            .get_bool(&format!("{SETTINGS_KEY}.{DEBUG_KEY}"))
            .unwrap_or(false)
    }

    pub fn base_path(&self) -> &str {
        self.settings
            .get_str(&format!("{SETTINGS_KEY}.{BASE_PATH_KEY}"))
            .unwrap_or_default()
    }
}

fn read_config_file(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(KernelError::ConfigFile(path.to_path_buf()));
    }
    Ok(fs::read_to_string(path)?)
}

fn parse_table(path: &Path, text: &str) -> Result<Table> {
    ConfigFormat::from_path(path).parse(text).map_err(|source| KernelError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// トップレベルのスカラー値を置換用の文字列に変換する (テーブルと配列は対象外)
fn scalar_values(table: &Table) -> HashMap<String, String> {
    table
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Integer(i) => i.to_string(),
                Value::Float(f) => f.to_string(),
                Value::Boolean(b) => b.to_string(),
                Value::Datetime(d) => d.to_string(),
                Value::Array(_) | Value::Table(_) => return None,
            };
            Some((key.clone(), text))
        })
        .collect()
}

/// 既知のプレースホルダだけを置換する。未知のものはそのまま残す
fn interpolate(text: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// parameters 同士の参照を不動点まで展開する。
///
/// 各ラウンドで値を読み直すので、`a = "%b%"`, `b = "%c%"` のような連鎖も解決される。
/// 収束後 (またはパラメータ数 + 1 ラウンド後) に既知のパラメータを指す
/// プレースホルダが残っていれば循環参照とみなす。
fn resolve_parameters(format: ConfigFormat, raw: &str, initial: &Table) -> Result<String> {
    let mut text = raw.to_string();
    let mut values = scalar_values(initial);
    let max_rounds = values.len() + 1;

    for _ in 0..max_rounds {
        let next = interpolate(&text, &values);
        if next == text {
            break;
        }
        text = next;
        // 途中経過が読めない場合は、最後に読めた値で続行する
        if let Ok(table) = format.parse(&text) {
            values = scalar_values(&table);
        }
    }

    let pending = PLACEHOLDER
        .captures_iter(&text)
        .map(|caps| caps[1].to_string())
        .find(|name| values.contains_key(name));
    match pending {
        Some(name) => Err(KernelError::UnresolvedParameter(name)),
        None => Ok(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, parameters: &str, settings: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        write_config_as(dir, "toml", parameters, settings)
    }

    fn write_config_as(
        dir: &Path,
        extension: &str,
        parameters: &str,
        settings: &str,
    ) -> (std::path::PathBuf, std::path::PathBuf) {
        let parameters_path = dir.join(format!("parameters.{extension}"));
        let settings_path = dir.join(format!("settings.{extension}"));
        fs::write(&parameters_path, parameters).unwrap();
        fs::write(&settings_path, settings).unwrap();
        (parameters_path, settings_path)
    }

    #[test]
    fn test_parameters_are_interpolated_into_settings() {
        let temp = tempfile::tempdir().unwrap();
        let (p, s) = write_config(
            temp.path(),
            "db_host = \"localhost\"\ndb_port = 5432\ndsn = \"pgsql://%db_host%:%db_port%\"\nroot = \"%dsn%/app\"\n",
            "[kernel]\ndebug = false\nbase_path = \"/api\"\n\n[database]\nurl = \"%root%\"\nport = %db_port%\nkeep = \"%unknown%\"\n",
        );

        let config = Config::load(&p, &s).unwrap();
        assert_eq!(
            config.parameters.get_str("root"),
            Some("pgsql://localhost:5432/app")
        );
        assert_eq!(
            config.settings.get_str("database.url"),
            Some("pgsql://localhost:5432/app")
        );
        assert_eq!(
            config.settings.get("database.port").and_then(Value::as_integer),
            Some(5432)
        );
        assert_eq!(config.settings.get_str("database.keep"), Some("%unknown%"));
        assert_eq!(config.base_path(), "/api");
        assert!(!config.is_debug());
        assert!(config.setting("database").is_some());
        config.validate_kernel_settings().unwrap();
    }

    #[test]
    fn test_circular_parameters() {
        let temp = tempfile::tempdir().unwrap();
        let (p, s) = write_config(
            temp.path(),
            "a = \"%b%\"\nb = \"%a%\"\n",
            "[kernel]\ndebug = true\n",
        );
        assert!(matches!(
            Config::load(&p, &s),
            Err(KernelError::UnresolvedParameter(_))
        ));
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("missing.toml");
        let (p, _) = write_config(temp.path(), "a = 1\n", "");
        assert!(matches!(
            Config::load(&p, &missing),
            Err(KernelError::ConfigFile(_))
        ));

        let (p, s) = write_config(temp.path(), "a = 1\n", "[kernel\n");
        assert!(matches!(
            Config::load(&p, &s),
            Err(KernelError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_kernel_settings_validation() {
        let temp = tempfile::tempdir().unwrap();

        let (p, s) = write_config(temp.path(), "", "[other]\nx = 1\n");
        let err = Config::load(&p, &s).unwrap().validate_kernel_settings().unwrap_err();
        assert!(matches!(err, KernelError::MissingConfigKey { key, section: None } if key == "kernel"));

        let (p, s) = write_config(temp.path(), "", "[kernel]\nbase_path = \"\"\n");
        let err = Config::load(&p, &s).unwrap().validate_kernel_settings().unwrap_err();
        assert!(matches!(
            err,
            KernelError::MissingConfigKey { key, section: Some(section) } if key == "debug" && section == "kernel"
        ));
    }

    #[test]
    fn test_yaml_files_are_interpolated() {
        let temp = tempfile::tempdir().unwrap();
        let (p, s) = write_config_as(
            temp.path(),
            "yml",
            "db_host: localhost\ndb_port: 5432\ndsn: \"pgsql://%db_host%:%db_port%\"\n",
            "kernel:\n  debug: true\n  base_path: \"/api\"\ndatabase:\n  url: \"%dsn%/app\"\n  port: %db_port%\n",
        );

        let config = Config::load(&p, &s).unwrap();
        assert_eq!(config.parameters.get_str("dsn"), Some("pgsql://localhost:5432"));
        assert_eq!(
            config.settings.get_str("database.url"),
            Some("pgsql://localhost:5432/app")
        );
        assert_eq!(
            config.settings.get("database.port").and_then(Value::as_integer),
            Some(5432)
        );
        assert!(config.is_debug());
        assert_eq!(config.base_path(), "/api");
        config.validate_kernel_settings().unwrap();
    }

    #[test]
    fn test_format_follows_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("config/settings.yml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("settings.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("settings.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("settings")), ConfigFormat::Toml);
        assert!(ConfigFormat::Yaml.parse("").unwrap().is_empty());

        let temp = tempfile::tempdir().unwrap();
        let (p, s) = write_config_as(temp.path(), "yml", "", "kernel: [unclosed\n");
        assert!(matches!(
            Config::load(&p, &s),
            Err(KernelError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_values_are_substituted_without_escaping() {
        let temp = tempfile::tempdir().unwrap();

        // 基本文字列の中に `\` を含む値を貼り込むと不正なエスケープになる
        let (p, s) = write_config(
            temp.path(),
            "dir = 'C:\\dir'\n",
            "[kernel]\ndebug = true\n\n[storage]\npath = \"%dir%\"\n",
        );
        assert!(matches!(
            Config::load(&p, &s),
            Err(KernelError::ConfigParse { .. })
        ));

        // リテラル文字列の中なら値はそのまま残る
        let (p, s) = write_config(
            temp.path(),
            "dir = 'C:\\dir'\n",
            "[kernel]\ndebug = true\n\n[storage]\npath = '%dir%'\n",
        );
        let config = Config::load(&p, &s).unwrap();
        assert_eq!(config.settings.get_str("storage.path"), Some("C:\\dir"));
    }
}
