//! The root `/` object and interior `TreeNode`s of a published object tree.
//!
//! `GetValue`/`GetText` aggregate a subtree into one dict reply, `GetItems`
//! lists every leaf, `ItemsChanged` batches change notifications — all
//! keyed on this crate's [`Value`] rather than a JSON value.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use zbus::object_server::SignalEmitter;
use zbus::zvariant::OwnedValue;

use super::shared::DbusSharedState;
use super::util::{format_text_value, value_to_owned_value};
use crate::value::Value;

pub struct RootBus {
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl RootBus {
    fn collect_subtree(&self, prefix: &str, as_text: bool) -> HashMap<String, OwnedValue> {
        let shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        let mut px = prefix.to_string();
        if !px.ends_with('/') {
            px.push('/');
        }
        shared
            .paths
            .iter()
            .filter_map(|(path, val)| {
                path.strip_prefix(&px).map(|suffix| (suffix.to_string(), render(val, as_text)))
            })
            .collect()
    }
}

fn render(val: &Value, as_text: bool) -> OwnedValue {
    if as_text {
        OwnedValue::try_from(zbus::zvariant::Value::from(format_text_value(val)))
            .unwrap_or_else(|_| OwnedValue::from(0i64))
    } else {
        value_to_owned_value(val)
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl RootBus {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(self.collect_subtree("/", false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(self.collect_subtree("/", true))
    }

    #[zbus(name = "GetItems")]
    async fn get_items(&self) -> HashMap<String, HashMap<String, OwnedValue>> {
        let shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        shared
            .paths
            .iter()
            .map(|(path, val)| {
                let mut entry = HashMap::new();
                entry.insert("Value".to_string(), value_to_owned_value(val));
                entry.insert(
                    "Text".to_string(),
                    render(val, true),
                );
                (path.clone(), entry)
            })
            .collect()
    }

    #[zbus(signal)]
    pub async fn items_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, HashMap<&str, OwnedValue>>,
    ) -> zbus::Result<()>;
}

/// A non-leaf path segment (e.g. `/Ac/In`): aggregates whatever leaves
/// currently live below it, the way `aiovelib`'s tree addressing allows
/// `GetValue` on an interior node to return the whole subtree.
pub struct TreeNode {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl TreeNode {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }

    fn collect_subtree(&self, as_text: bool) -> HashMap<String, OwnedValue> {
        let shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        let mut px = self.path.clone();
        if !px.ends_with('/') {
            px.push('/');
        }
        shared
            .paths
            .iter()
            .filter_map(|(path, val)| {
                path.strip_prefix(&px).map(|suffix| (suffix.to_string(), render(val, as_text)))
            })
            .collect()
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl TreeNode {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(self.collect_subtree(false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(self.collect_subtree(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use zbus::zvariant::OwnedObjectPath;

    fn make_shared(paths: &[(&str, Value)]) -> Arc<Mutex<DbusSharedState>> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let root = OwnedObjectPath::try_from("/").unwrap();
        let shared = Arc::new(Mutex::new(DbusSharedState::new(tx, root)));
        {
            let mut s = shared.lock().unwrap();
            for (k, v) in paths {
                s.paths.insert((*k).to_string(), v.clone());
            }
        }
        shared
    }

    #[test]
    fn collect_subtree_scopes_to_prefix() {
        let shared = make_shared(&[
            ("/Ac/Out/P", Value::Double(123.0)),
            ("/Ac/Out/L1/P", Value::Double(41.0)),
            ("/Mode", Value::Int(1)),
        ]);
        let node = TreeNode::new("/Ac/Out".to_string(), shared);
        let map = node.collect_subtree(false);
        assert!(map.contains_key("P"));
        assert!(map.contains_key("L1/P"));
        assert!(!map.contains_key("/Mode"));
    }

    #[tokio::test]
    async fn get_items_includes_every_leaf() {
        let shared = make_shared(&[("/State", Value::Int(9)), ("/Mode", Value::Int(1))]);
        let root = RootBus { shared };
        let items = root.get_items().await;
        assert_eq!(items.len(), 2);
        assert!(items["/State"].contains_key("Value"));
        assert!(items["/State"].contains_key("Text"));
    }
}
