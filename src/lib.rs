//! PSR-4 形式のマニフェストから名前空間ごとのクラスを探し出し、
//! コントローラが宣言したルートツリーをフラットなルート表へ変換する。

pub mod cache;
pub mod config;
pub mod error;
pub mod finder;
pub mod kernel;
pub mod model;
pub mod parser;
pub mod path;
pub mod registry;
pub mod resolver;
pub mod route;

pub use error::{KernelError, Result};
pub use finder::ClassFinder;
pub use kernel::{DiscoveryKind, Kernel, KernelBuilder};
pub use model::{DiscoveredClass, FlatRoute, NamespaceMapping, RouteTarget};
pub use registry::{
    Command, CommandRegistry, Console, ControllerRegistry, RouteDispatcher, RouteTable,
};
pub use route::{Action, Group, Methods, RouteElement, RouteTree};
