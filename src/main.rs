// src/main.rs

use clap::{Parser, Subcommand};
use psr4_route_analyzer::registry::ControllerRegistry;
use psr4_route_analyzer::{ClassFinder, Group, Kernel, RouteTree};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI 引数定義
#[derive(Parser, Debug)]
#[command(
    name = "PSR-4 Route Analyzer",
    version = "0.1.0",
    about = "PSR-4 マニフェストからクラスを探索し、コントローラのルートツリーをフラット化して JSON 出力する CLI ツール"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 名前空間に属するクラスを一覧する
    Classes {
        /// アプリケーションルート
        #[arg(short = 'r', long = "project-root", value_name = "DIR")]
        project_root: PathBuf,

        /// マニフェストのパス (ルートからの相対パス)
        #[arg(long, value_name = "FILE", default_value = "composer.json")]
        manifest: PathBuf,

        /// クラス一覧の代わりに「名前空間 → クラスの有無」を出力する
        #[arg(long)]
        check: bool,

        /// 探索する名前空間 (例: `App\Controller`)
        #[arg(value_name = "NAMESPACE", required = true)]
        namespaces: Vec<String>,
    },
    /// 名前空間に対応するディレクトリを表示する
    Resolve {
        #[arg(short = 'r', long = "project-root", value_name = "DIR")]
        project_root: PathBuf,

        #[arg(long, value_name = "FILE", default_value = "composer.json")]
        manifest: PathBuf,

        #[arg(value_name = "NAMESPACE")]
        namespace: String,
    },
    /// JSON のグループ宣言 1 つをフラット化する
    Tree {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// カーネルを起動し、発見したコントローラのルート表を出力する
    Routes {
        #[arg(short = 'r', long = "project-root", value_name = "DIR")]
        project_root: PathBuf,

        /// コントローラを探す名前空間
        #[arg(short = 'c', long = "controllers", value_name = "NAMESPACE", required = true)]
        controllers: Vec<String>,

        /// `{ "<FQCN>": <グループ宣言> }` 形式のルート宣言ファイル (ルートからの相対パス)
        #[arg(long, value_name = "FILE", default_value = "config/routes.json")]
        declarations: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1) ログは stderr に出し、stdout は JSON 出力専用にする
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // 2) CLI 引数をパースしてサブコマンドを実行
    let cli = Cli::parse();
    let json = match cli.command {
        Commands::Classes {
            project_root,
            manifest,
            check,
            namespaces,
        } => {
            let root = project_root.canonicalize()?; // 絶対化
            let mut finder = ClassFinder::from_manifest(&root, &root.join(manifest))?;
            if check {
                serde_json::to_string_pretty(&finder.namespaces_have_classes(namespaces.as_slice())?)?
            } else {
                serde_json::to_string_pretty(&finder.get_classes_in_namespaces(namespaces.as_slice())?)?
            }
        }
        Commands::Resolve {
            project_root,
            manifest,
            namespace,
        } => {
            let root = project_root.canonicalize()?;
            let finder = ClassFinder::from_manifest(&root, &root.join(manifest))?;
            serde_json::to_string_pretty(&finder.resolve_directory(&namespace)?)?
        }
        Commands::Tree { file } => {
            let content = fs::read_to_string(&file)?;
            let declaration: serde_json::Value = serde_json::from_str(&content)?;
            let tree = RouteTree::new(Group::try_from(&declaration)?);
            serde_json::to_string_pretty(&tree.flatten())?
        }
        Commands::Routes {
            project_root,
            controllers,
            declarations,
        } => {
            let mut kernel = Kernel::builder(&project_root)
                .controllers(controllers)
                .build()?;
            let registry =
                ControllerRegistry::from_declarations(&kernel.paths().absolute_path(&declarations, false)?)?;
            let table = kernel.route_table(&registry)?;
            info!("{} 本のルートを登録しました", table.routes.len());
            serde_json::to_string_pretty(&table)?
        }
    };

    // 3) 結果を標準出力へ
    println!("{}", json);

    Ok(())
}
