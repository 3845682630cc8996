// src/route.rs
use indexmap::IndexSet;
use serde_json::Value;

use crate::error::{KernelError, Result};
use crate::model::FlatRoute;

/// HTTP メソッドの指定。単一の文字列でもリストでもよい
#[derive(Debug, Clone)]
pub enum Methods {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for Methods {
    fn from(method: &str) -> Self {
        Methods::One(method.to_string())
    }
}

impl From<String> for Methods {
    fn from(method: String) -> Self {
        Methods::One(method)
    }
}

impl From<Vec<String>> for Methods {
    fn from(methods: Vec<String>) -> Self {
        Methods::Many(methods)
    }
}

impl From<Vec<&str>> for Methods {
    fn from(methods: Vec<&str>) -> Self {
        Methods::Many(methods.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Methods {
    fn from(methods: [&str; N]) -> Self {
        Methods::Many(methods.iter().map(|m| m.to_string()).collect())
    }
}

impl Methods {
    /// 大文字化し、空文字を除き、初出順で重複を取り除く
    fn normalize(self) -> Vec<String> {
        let raw = match self {
            Methods::One(method) => vec![method],
            Methods::Many(methods) => methods,
        };
        raw.iter()
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }
}

/// ルートツリーの葉。パターン 1 つと HTTP メソッドの集合、アクション識別子を持つ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    methods: Vec<String>,
    pattern: String,
    action: String,
}

impl Action {
    pub fn create(
        pattern: impl Into<String>,
        methods: impl Into<Methods>,
        action: impl Into<String>,
    ) -> Result<Self> {
        let pattern = pattern.into();
        let methods = methods.into().normalize();
        if methods.is_empty() {
            return Err(KernelError::EmptyMethods { pattern });
        }

        Ok(Self {
            methods,
            pattern,
            action: action.into(),
        })
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

/// 子孫にパスのプレフィックス (ラベル) を与えるルートのまとまり
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    label: String,
    children: Vec<RouteElement>,
}

impl Group {
    pub fn create<I, E>(label: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<RouteElement>,
    {
        Self {
            label: label.into(),
            children: children.into_iter().map(Into::into).collect(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn children(&self) -> &[RouteElement] {
        &self.children
    }
}

/// `Group` の子になれるのはこの 2 種類だけ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteElement {
    Group(Group),
    Action(Action),
}

impl From<Group> for RouteElement {
    fn from(group: Group) -> Self {
        RouteElement::Group(group)
    }
}

impl From<Action> for RouteElement {
    fn from(action: Action) -> Self {
        RouteElement::Action(action)
    }
}

impl TryFrom<&Value> for RouteElement {
    type Error = KernelError;

    /// JSON のルート宣言を読み込む。
    ///
    /// - `{"label": "...", "children": [...]}`                  → Group
    /// - `{"pattern": "...", "methods": "GET", "action": "..."}` → Action
    fn try_from(value: &Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(KernelError::InvalidRouteElement(describe(value)));
        };

        if let Some(label) = object.get("label") {
            let label = label.as_str().ok_or_else(|| {
                KernelError::InvalidRouteElement(format!("group label {}", describe(label)))
            })?;
            let children = match object.get("children") {
                None => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(RouteElement::try_from)
                    .collect::<Result<Vec<_>>>()?,
                Some(other) => {
                    return Err(KernelError::InvalidRouteElement(format!(
                        "group children {}",
                        describe(other)
                    )));
                }
            };
            return Ok(RouteElement::Group(Group::create(label, children)));
        }

        let field = |name: &str| object.get(name).and_then(Value::as_str);
        match (field("pattern"), field("action"), object.get("methods")) {
            (Some(pattern), Some(action), Some(methods)) => {
                let methods = match methods {
                    Value::String(m) => Methods::from(m.as_str()),
                    Value::Array(items) => Methods::Many(
                        items
                            .iter()
                            .map(|item| {
                                item.as_str().map(str::to_string).ok_or_else(|| {
                                    KernelError::InvalidRouteElement(format!(
                                        "method {}",
                                        describe(item)
                                    ))
                                })
                            })
                            .collect::<Result<Vec<_>>>()?,
                    ),
                    other => {
                        return Err(KernelError::InvalidRouteElement(format!(
                            "methods {}",
                            describe(other)
                        )));
                    }
                };
                Ok(RouteElement::Action(Action::create(pattern, methods, action)?))
            }
            _ => Err(KernelError::InvalidRouteElement(
                "\"object without label or pattern/methods/action\"".to_string(),
            )),
        }
    }
}

fn describe(value: &Value) -> String {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    format!("\"{kind}\"")
}

impl TryFrom<&Value> for Group {
    type Error = KernelError;

    fn try_from(value: &Value) -> Result<Self> {
        match RouteElement::try_from(value)? {
            RouteElement::Group(group) => Ok(group),
            RouteElement::Action(_) => Err(KernelError::InvalidRouteElement(
                "\"action\" at the root".to_string(),
            )),
        }
    }
}

/// アリーナ内のノード番号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
enum RouteNode {
    Group {
        label: String,
        parent: Option<NodeId>,
        children: Vec<NodeId>,
    },
    Action {
        action: Action,
        parent: NodeId,
    },
}

/// 構築済みのルートツリー。
///
/// 子は番号で所有され、親へのリンクはプレフィックス計算のための参照番号にすぎない。
/// 親は `new` の中で一度だけ設定され、以後ツリーは変更されない。
#[derive(Debug)]
pub struct RouteTree {
    nodes: Vec<RouteNode>,
}

impl RouteTree {
    pub fn new(root: Group) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.insert_group(root, None);
        tree
    }

    fn insert_group(&mut self, group: Group, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(RouteNode::Group {
            label: group.label,
            parent,
            children: Vec::new(),
        });

        let mut child_ids = Vec::with_capacity(group.children.len());
        for child in group.children {
            let child_id = match child {
                RouteElement::Group(g) => self.insert_group(g, Some(id)),
                RouteElement::Action(action) => {
                    let action_id = NodeId(self.nodes.len());
                    self.nodes.push(RouteNode::Action { action, parent: id });
                    action_id
                }
            };
            child_ids.push(child_id);
        }

        if let RouteNode::Group { children, .. } = &mut self.nodes[id.0] {
            *children = child_ids;
        }
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// グループのラベル。アクションを指す番号には `None`
    pub fn label(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id.0)? {
            RouteNode::Group { label, .. } => Some(label),
            RouteNode::Action { .. } => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        match self.nodes.get(id.0)? {
            RouteNode::Group { parent, .. } => *parent,
            RouteNode::Action { parent, .. } => Some(*parent),
        }
    }

    /// 親のプレフィックス + 親のラベル。根では空文字
    pub fn prefix(&self, id: NodeId) -> String {
        match self.parent(id) {
            Some(parent) => {
                let mut prefix = self.prefix(parent);
                prefix.push_str(self.label(parent).unwrap_or_default());
                prefix
            }
            None => String::new(),
        }
    }

    pub fn action(&self, id: NodeId) -> Option<ActionRef<'_>> {
        match self.nodes.get(id.0)? {
            RouteNode::Action { action, .. } => Some(ActionRef {
                tree: self,
                id,
                action,
            }),
            RouteNode::Group { .. } => None,
        }
    }

    /// 深さ優先・行きがけ順で、宣言順を保ったままアクションを並べる
    pub fn flattened_children(&self, id: NodeId) -> Vec<ActionRef<'_>> {
        let mut flattened = Vec::new();
        self.collect_actions(id, &mut flattened);
        flattened
    }

    fn collect_actions<'a>(&'a self, id: NodeId, out: &mut Vec<ActionRef<'a>>) {
        let Some(RouteNode::Group { children, .. }) = self.nodes.get(id.0) else {
            return;
        };
        for &child in children {
            match &self.nodes[child.0] {
                RouteNode::Group { .. } => self.collect_actions(child, out),
                RouteNode::Action { action, .. } => out.push(ActionRef {
                    tree: self,
                    id: child,
                    action,
                }),
            }
        }
    }

    pub fn flatten(&self) -> Vec<FlatRoute> {
        self.flattened_children(self.root())
            .into_iter()
            .map(|action| action.to_flat_route())
            .collect()
    }
}

impl From<Group> for RouteTree {
    fn from(root: Group) -> Self {
        RouteTree::new(root)
    }
}

/// ツリー内のアクションへの参照
#[derive(Debug, Clone, Copy)]
pub struct ActionRef<'a> {
    tree: &'a RouteTree,
    id: NodeId,
    action: &'a Action,
}

impl<'a> ActionRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn methods(&self) -> &'a [String] {
        self.action.methods()
    }

    pub fn pattern(&self) -> &'a str {
        self.action.pattern()
    }

    pub fn action(&self) -> &'a str {
        self.action.action()
    }

    pub fn prefix(&self) -> String {
        self.tree.prefix(self.id)
    }

    pub fn prefixed_pattern(&self) -> String {
        let mut pattern = self.prefix();
        pattern.push_str(self.action.pattern());
        pattern
    }

    pub fn to_flat_route(&self) -> FlatRoute {
        FlatRoute {
            methods: self.methods().to_vec(),
            pattern: self.prefixed_pattern(),
            action: self.action().to_string(),
        }
    }
}
