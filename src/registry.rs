use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::model::RouteTarget;
use crate::route::Group;

/// コントローラが自分のルートツリーを返す関数
pub type RouteFactory = Box<dyn Fn() -> Result<Group>>;

/// 完全修飾クラス名 → ルートツリー生成関数 の対応表。
///
/// 発見されたクラス名はこの表を通してのみルートに変換される (名前からの動的生成はしない)。
#[derive(Default)]
pub struct ControllerRegistry {
    factories: IndexMap<String, RouteFactory>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, fqcn: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Group> + 'static,
    {
        self.factories.insert(fqcn.into(), Box::new(factory));
        self
    }

    /// `{ "<fqcn>": <グループ宣言>, ... }` 形式の JSON ファイルから表を作る
    pub fn from_declarations(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let decoded: Value = serde_json::from_str(&content)?;
        let Value::Object(entries) = decoded else {
            return Err(KernelError::InvalidRouteElement(
                "\"non-object route declaration file\"".to_string(),
            ));
        };

        let mut registry = Self::new();
        for (fqcn, declaration) in entries {
            // 宣言の誤りは読み込み時点で報告する
            Group::try_from(&declaration)?;
            registry.register(fqcn, move || Group::try_from(&declaration));
        }
        debug!("{:?} から {} 個のコントローラ宣言を読み込みました", path, registry.len());
        Ok(registry)
    }

    pub fn get(&self, fqcn: &str) -> Option<&RouteFactory> {
        self.factories.get(fqcn)
    }

    pub fn contains(&self, fqcn: &str) -> bool {
        self.factories.contains_key(fqcn)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// コンソールから実行できるコマンド
pub trait Command {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// 終了コードを返す
    fn execute(&self, args: &[String]) -> Result<i32>;
}

pub type CommandFactory = Box<dyn Fn(&Kernel) -> Box<dyn Command>>;

/// 完全修飾クラス名 → コマンド生成関数
#[derive(Default)]
pub struct CommandRegistry {
    factories: IndexMap<String, CommandFactory>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, fqcn: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Kernel) -> Box<dyn Command> + 'static,
    {
        self.factories.insert(fqcn.into(), Box::new(factory));
        self
    }

    pub fn get(&self, fqcn: &str) -> Option<&CommandFactory> {
        self.factories.get(fqcn)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// 名前で引けるコマンドの集合
#[derive(Default)]
pub struct Console {
    commands: IndexMap<String, Box<dyn Command>>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, command: Box<dyn Command>) -> Result<()> {
        let name = command.name().to_string();
        if self.commands.contains_key(&name) {
            return Err(KernelError::DuplicateCommand(name));
        }
        self.commands.insert(name, command);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn run(&self, name: &str, args: &[String]) -> Result<i32> {
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| KernelError::UnknownCommand(name.to_string()))?;
        command.execute(args)
    }
}

/// フラット化されたルートを受け取る外部ディスパッチャ
pub trait RouteDispatcher {
    fn set_base_path(&mut self, base_path: &str);

    fn map(&mut self, methods: &[String], pattern: &str, target: RouteTarget);
}

/// 登録されたルート 1 件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredRoute {
    pub methods: Vec<String>,
    pub pattern: String,
    pub target: RouteTarget,
}

/// 登録順を保持するだけの `RouteDispatcher` 実装
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteTable {
    pub base_path: String,
    pub routes: Vec<RegisteredRoute>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RouteDispatcher for RouteTable {
    fn set_base_path(&mut self, base_path: &str) {
        self.base_path = base_path.to_string();
    }

    fn map(&mut self, methods: &[String], pattern: &str, target: RouteTarget) {
        self.routes.push(RegisteredRoute {
            methods: methods.to_vec(),
            pattern: pattern.to_string(),
            target,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{Action, RouteTree};

    struct Echo;

    impl Command for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn execute(&self, args: &[String]) -> Result<i32> {
            Ok(args.len() as i32)
        }
    }

    #[test]
    fn test_controller_registry_register() {
        let mut registry = ControllerRegistry::new();
        registry.register("App\\Controller\\Home", || {
            Ok(Group::create("/", [Action::create("home", "get", "index")?]))
        });

        assert!(registry.contains("App\\Controller\\Home"));
        let group = registry.get("App\\Controller\\Home").unwrap()().unwrap();
        let routes = RouteTree::new(group).flatten();
        assert_eq!(routes[0].pattern, "/home");
    }

    #[test]
    fn test_controller_registry_from_declarations() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("routes.json");
        fs::write(
            &path,
            r#"{
                "App\\Controller\\Users": {"label": "/users", "children": [
                    {"pattern": "", "methods": "GET", "action": "list"}
                ]},
                "App\\Controller\\Health": {"label": "", "children": [
                    {"pattern": "/health", "methods": ["GET"], "action": "check"}
                ]}
            }"#,
        )
        .unwrap();

        let registry = ControllerRegistry::from_declarations(&path).unwrap();
        assert_eq!(registry.len(), 2);
        let group = registry.get("App\\Controller\\Health").unwrap()().unwrap();
        assert_eq!(RouteTree::new(group).flatten()[0].pattern, "/health");

        fs::write(&path, r#"{"App\\Controller\\Bad": {"label": "/", "children": [true]}}"#)
            .unwrap();
        assert!(matches!(
            ControllerRegistry::from_declarations(&path),
            Err(KernelError::InvalidRouteElement(_))
        ));
    }

    #[test]
    fn test_console_dispatch() {
        let mut console = Console::new();
        console.add(Box::new(Echo)).unwrap();
        assert!(matches!(
            console.add(Box::new(Echo)),
            Err(KernelError::DuplicateCommand(_))
        ));

        let args = vec!["a".to_string(), "b".to_string()];
        assert_eq!(console.run("echo", &args).unwrap(), 2);
        assert!(matches!(
            console.run("missing", &args),
            Err(KernelError::UnknownCommand(_))
        ));
        assert_eq!(console.names().collect::<Vec<_>>(), vec!["echo"]);
    }

    #[test]
    fn test_route_table_records_in_order() {
        let mut table = RouteTable::new();
        table.set_base_path("/api");
        for action in ["a", "b"] {
            table.map(
                &["GET".to_string()],
                &format!("/{action}"),
                RouteTarget {
                    controller: "App\\C".to_string(),
                    action: action.to_string(),
                },
            );
        }
        assert_eq!(table.base_path, "/api");
        let patterns: Vec<_> = table.routes.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["/a", "/b"]);
    }
}
