use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cache::{CacheHandler, fingerprint_files};
use crate::config::Config;
use crate::error::Result;
use crate::finder::ClassFinder;
use crate::model::RouteTarget;
use crate::path::PathBuilder;
use crate::registry::{CommandRegistry, Console, ControllerRegistry, RouteDispatcher, RouteTable};
use crate::route::RouteTree;

pub const CACHE_DIR: &str = "var/cache";
pub const SETTINGS_PATH: &str = "config/settings.yml";
pub const PARAMETERS_PATH: &str = "config/parameters.yml";
pub const MANIFEST_PATH: &str = "composer.json";

/// 何を探しているか。キャッシュエントリの名前に使う
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKind {
    Controllers,
    Commands,
}

impl DiscoveryKind {
    pub fn cache_name(&self) -> &'static str {
        match self {
            DiscoveryKind::Controllers => "controllers",
            DiscoveryKind::Commands => "commands",
        }
    }
}

/// `Kernel` の組み立て。パスはすべてアプリケーションルートからの相対パス
#[derive(Debug, Clone)]
pub struct KernelBuilder {
    root: PathBuf,
    controllers: Vec<String>,
    commands: Vec<String>,
    manifest_path: PathBuf,
    settings_path: PathBuf,
    parameters_path: PathBuf,
    cache_dir: PathBuf,
}

impl KernelBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            controllers: Vec::new(),
            commands: Vec::new(),
            manifest_path: PathBuf::from(MANIFEST_PATH),
            settings_path: PathBuf::from(SETTINGS_PATH),
            parameters_path: PathBuf::from(PARAMETERS_PATH),
            cache_dir: PathBuf::from(CACHE_DIR),
        }
    }

    /// コントローラを探す名前空間
    pub fn controllers<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.controllers.extend(namespaces.into_iter().map(Into::into));
        self
    }

    /// コマンドを探す名前空間
    pub fn commands<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(namespaces.into_iter().map(Into::into));
        self
    }

    pub fn manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = path.into();
        self
    }

    pub fn parameters_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.parameters_path = path.into();
        self
    }

    pub fn cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }

    /// 1) ルートの正規化 2) キャッシュディレクトリ 3) 設定 4) マニフェスト の順に読み込む
    pub fn build(self) -> Result<Kernel> {
        let paths = PathBuilder::new(&self.root)?;
        let cache = CacheHandler::new(paths.join(&self.cache_dir)?)?;

        let parameters_path = paths.join(&self.parameters_path)?;
        let settings_path = paths.join(&self.settings_path)?;
        let config = Config::load(&parameters_path, &settings_path)?;
        config.validate_kernel_settings()?;

        let manifest_path = paths.join(&self.manifest_path)?;
        let finder = ClassFinder::from_manifest(paths.root_dir(), &manifest_path)?;

        info!(
            "カーネル起動: root={:?}, debug={}",
            paths.root_dir(),
            config.is_debug()
        );

        Ok(Kernel {
            paths,
            config,
            cache,
            finder,
            controllers: self.controllers,
            commands: self.commands,
            fingerprint_sources: vec![manifest_path, parameters_path, settings_path],
        })
    }
}

/// アプリケーションコンテキスト。
///
/// グローバルなインスタンスは持たず、起動コードが生成して参照で渡す。
#[derive(Debug)]
pub struct Kernel {
    paths: PathBuilder,
    config: Config,
    cache: CacheHandler,
    finder: ClassFinder,
    controllers: Vec<String>,
    commands: Vec<String>,
    fingerprint_sources: Vec<PathBuf>,
}

impl Kernel {
    pub fn builder(root: impl Into<PathBuf>) -> KernelBuilder {
        KernelBuilder::new(root)
    }

    pub fn root_dir(&self) -> &Path {
        self.paths.root_dir()
    }

    pub fn paths(&self) -> &PathBuilder {
        &self.paths
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheHandler {
        &self.cache
    }

    pub fn finder(&self) -> &ClassFinder {
        &self.finder
    }

    pub fn is_debug(&self) -> bool {
        self.config.is_debug()
    }

    pub fn controller_namespaces(&self) -> &[String] {
        &self.controllers
    }

    pub fn command_namespaces(&self) -> &[String] {
        &self.commands
    }

    /// 名前空間群のクラスを探す。
    ///
    /// debug でない場合、結果はマニフェスト・設定ファイル・名前空間のフィンガープリントを
    /// キーにキャッシュされる。ソースファイル自体の変更はキーに含まれない。
    pub fn discover(&mut self, kind: DiscoveryKind, namespaces: &[String]) -> Result<Vec<String>> {
        if self.is_debug() {
            self.finder.clear_memo();
            return self.finder.get_classes_in_namespaces(namespaces);
        }

        let fingerprint = fingerprint_files(self.fingerprint_sources.as_slice(), namespaces)?;
        let name = format!("{}.{:016x}.json", kind.cache_name(), fingerprint);
        if let Some(cached) = self.cache.get::<Vec<String>>(&name)? {
            return Ok(cached);
        }

        self.finder.clear_memo();
        let classes = self.finder.get_classes_in_namespaces(namespaces)?;
        self.cache.set(&name, &classes)?;
        Ok(classes)
    }

    /// 発見したコントローラのルートを、発見順・フラット化順でディスパッチャに登録する。
    ///
    /// レジストリに無いクラスは (ヘルパーなどとみなして) 読み飛ばす。登録したルート数を返す。
    pub fn register_controllers(
        &mut self,
        registry: &ControllerRegistry,
        dispatcher: &mut dyn RouteDispatcher,
    ) -> Result<usize> {
        let namespaces = self.controllers.clone();
        let classes = self.discover(DiscoveryKind::Controllers, &namespaces)?;

        dispatcher.set_base_path(self.config.base_path());

        let mut count = 0;
        for class in &classes {
            let Some(factory) = registry.get(class) else {
                debug!("ルート定義の無いクラスを読み飛ばします: {}", class);
                continue;
            };

            let tree = RouteTree::new(factory()?);
            for action in tree.flattened_children(tree.root()) {
                let pattern = action.prefixed_pattern();
                info!(
                    "ルート登録: {:?} {} → {}::{}",
                    action.methods(),
                    pattern,
                    class,
                    action.action()
                );
                dispatcher.map(
                    action.methods(),
                    &pattern,
                    RouteTarget {
                        controller: class.clone(),
                        action: action.action().to_string(),
                    },
                );
                count += 1;
            }
        }

        Ok(count)
    }

    /// `register_controllers` の結果を `RouteTable` として返す
    pub fn route_table(&mut self, registry: &ControllerRegistry) -> Result<RouteTable> {
        let mut table = RouteTable::new();
        self.register_controllers(registry, &mut table)?;
        Ok(table)
    }

    /// 発見したコマンドクラスをレジストリ経由で生成し、コンソールへ追加する
    pub fn register_commands(
        &mut self,
        registry: &CommandRegistry,
        console: &mut Console,
    ) -> Result<usize> {
        let namespaces = self.commands.clone();
        let classes = self.discover(DiscoveryKind::Commands, &namespaces)?;

        let mut count = 0;
        for class in &classes {
            let Some(factory) = registry.get(class) else {
                debug!("コマンド定義の無いクラスを読み飛ばします: {}", class);
                continue;
            };
            let kernel: &Kernel = self;
            console.add(factory(kernel))?;
            count += 1;
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;
    use crate::registry::Command;
    use crate::route::{Action, Group};
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn scaffold(root: &Path, debug: bool) {
        write(root, "composer.json", r#"{"autoload": {"psr-4": {"App\\": "src/"}}}"#);
        write(root, "config/parameters.yml", "prefix: /v1\n");
        write(
            root,
            "config/settings.yml",
            &format!("kernel:\n  debug: {debug}\n  base_path: \"%prefix%\"\n"),
        );
        write(
            root,
            "src/Controller/Users.php",
            "<?php\nnamespace App\\Controller;\n\nclass Users\n{\n}\n",
        );
        write(
            root,
            "src/Controller/Support/Helper.php",
            "<?php\nnamespace App\\Controller\\Support;\n\nclass Helper\n{\n}\n",
        );
        write(
            root,
            "src/Command/Greet.php",
            "<?php\nnamespace App\\Command;\n\nclass Greet\n{\n}\n",
        );
    }

    fn controllers() -> ControllerRegistry {
        let mut registry = ControllerRegistry::new();
        registry.register("App\\Controller\\Users", || {
            Ok(Group::create(
                "/users",
                [
                    Action::create("", "get", "list")?,
                    Action::create("/{id}", ["get", "put"], "show")?,
                ],
            ))
        });
        registry
    }

    struct Greet {
        greeting: String,
    }

    impl Command for Greet {
        fn name(&self) -> &str {
            "greet"
        }

        fn execute(&self, args: &[String]) -> Result<i32> {
            Ok(if self.greeting.is_empty() { 1 } else { args.len() as i32 })
        }
    }

    #[test]
    fn test_register_controllers() {
        let temp = tempfile::tempdir().unwrap();
        scaffold(temp.path(), true);

        let mut kernel = Kernel::builder(temp.path())
            .controllers(["App\\Controller"])
            .build()
            .unwrap();
        let table = kernel.route_table(&controllers()).unwrap();

        assert_eq!(table.base_path, "/v1");
        let routes: Vec<_> = table
            .routes
            .iter()
            .map(|r| (r.pattern.as_str(), r.target.action.as_str()))
            .collect();
        assert_eq!(routes, vec![("/users", "list"), ("/users/{id}", "show")]);
        assert_eq!(table.routes[1].methods, vec!["GET", "PUT"]);
        assert_eq!(table.routes[0].target.controller, "App\\Controller\\Users");
    }

    #[test]
    fn test_discovery_is_cached_outside_debug() {
        let temp = tempfile::tempdir().unwrap();
        scaffold(temp.path(), false);

        let mut kernel = Kernel::builder(temp.path()).build().unwrap();
        let namespaces = vec!["App\\Controller".to_string()];
        let first = kernel.discover(DiscoveryKind::Controllers, &namespaces).unwrap();
        assert_eq!(
            first,
            vec!["App\\Controller\\Support\\Helper", "App\\Controller\\Users"]
        );

        // 新しいファイルはキャッシュキーに影響しないので、結果は変わらない
        write(
            temp.path(),
            "src/Controller/Zeta.php",
            "<?php\nnamespace App\\Controller;\n\nclass Zeta\n{\n}\n",
        );
        let second = kernel.discover(DiscoveryKind::Controllers, &namespaces).unwrap();
        assert_eq!(first, second);

        // 設定を変えるとフィンガープリントが変わり、再探索される
        write(
            temp.path(),
            "config/parameters.yml",
            "prefix: /v2\n",
        );
        let third = kernel.discover(DiscoveryKind::Controllers, &namespaces).unwrap();
        assert_eq!(third.len(), 3);
    }

    #[test]
    fn test_register_commands() {
        let temp = tempfile::tempdir().unwrap();
        scaffold(temp.path(), true);

        let mut registry = CommandRegistry::new();
        registry.register("App\\Command\\Greet", |kernel: &Kernel| {
            Box::new(Greet {
                greeting: kernel.config().base_path().to_string(),
            }) as Box<dyn Command>
        });

        let mut kernel = Kernel::builder(temp.path())
            .commands(["App\\Command"])
            .build()
            .unwrap();
        let mut console = Console::new();
        assert_eq!(kernel.register_commands(&registry, &mut console).unwrap(), 1);
        assert_eq!(console.run("greet", &["x".to_string()]).unwrap(), 1);
    }

    #[test]
    fn test_build_failures() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            Kernel::builder(temp.path()).build(),
            Err(KernelError::ConfigFile(_))
        ));

        scaffold(temp.path(), true);
        assert!(matches!(
            Kernel::builder(temp.path())
                .manifest_path("missing/composer.json")
                .build(),
            Err(KernelError::ManifestMissing { .. })
        ));

        let mut kernel = Kernel::builder(temp.path())
            .controllers(["Vendor\\Controller"])
            .build()
            .unwrap();
        assert!(matches!(
            kernel.route_table(&controllers()),
            Err(KernelError::NamespaceUnresolved(_))
        ));
    }

    #[test]
    fn test_build_fails_when_cache_directory_cannot_be_created() {
        let temp = tempfile::tempdir().unwrap();
        scaffold(temp.path(), false);
        write(temp.path(), "var/blocked", "not a directory");

        let err = Kernel::builder(temp.path())
            .cache_dir("var/blocked/cache")
            .build()
            .unwrap_err();
        match err {
            KernelError::CacheDirectory { path, .. } => {
                assert!(path.ends_with("var/blocked/cache"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
