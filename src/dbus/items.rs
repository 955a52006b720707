//! A single published `com.victronenergy.BusItem` object.
//!
//! `GetValue`/`GetText`/`SetValue` plus `PropertiesChanged`, with no
//! per-path value normalisation or inline write dispatch here: writes are
//! validated and fanned out by
//! [`crate::leader::aggregate::LeaderAggregate::apply_command`], reached
//! through the [`WriteRequest`] channel in [`super::shared`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::OwnedValue;

use super::shared::{DbusSharedState, WriteRequest};
use super::util::{format_text_value, owned_value_to_value, value_to_owned_value};
use crate::value::Value;

pub struct BusItem {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl BusItem {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }

    fn current_value(&self) -> Value {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .paths
            .get(&self.path)
            .cloned()
            .unwrap_or(Value::Absent)
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl BusItem {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        value_to_owned_value(&self.current_value())
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> String {
        format_text_value(&self.current_value())
    }

    /// Forwards the write to the owning leader and returns its verdict:
    /// `0` accepted, `1` rejected (unknown/non-writable path, or failed
    /// validation).
    #[zbus(name = "SetValue")]
    async fn set_value(&self, value: OwnedValue) -> i32 {
        let (write_tx, writable) = {
            let shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            (shared.write_tx.clone(), shared.writable.contains(&self.path))
        };
        if !writable {
            return 1;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = WriteRequest {
            path: self.path.clone(),
            value: owned_value_to_value(&value),
            reply: reply_tx,
        };
        if write_tx.send(request).is_err() {
            return 1;
        }
        match reply_rx.await {
            Ok(true) => 0,
            Ok(false) | Err(_) => 1,
        }
    }

    #[zbus(signal)]
    pub async fn properties_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, OwnedValue>,
    ) -> zbus::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use zbus::zvariant::OwnedObjectPath;

    fn make_item(path: &str) -> (BusItem, mpsc::UnboundedReceiver<WriteRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let root = OwnedObjectPath::try_from("/").unwrap();
        let shared = Arc::new(Mutex::new(DbusSharedState::new(tx, root)));
        (BusItem::new(path.to_string(), shared), rx)
    }

    #[tokio::test]
    async fn non_writable_path_rejects_without_forwarding() {
        let (item, mut rx) = make_item("/State");
        let rc = item.set_value(OwnedValue::from(1i64)).await;
        assert_eq!(rc, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn writable_path_forwards_and_relays_reply() {
        let (item, mut rx) = make_item("/Mode");
        {
            let mut shared = item.shared.lock().unwrap();
            shared.writable.insert("/Mode".to_string());
        }
        let handle = tokio::spawn(async move { item.set_value(OwnedValue::from(2i64)).await });
        let request = rx.recv().await.expect("write request forwarded");
        assert_eq!(request.path, "/Mode");
        assert_eq!(request.value, Value::Int(2));
        request.reply.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), 0);
    }
}
