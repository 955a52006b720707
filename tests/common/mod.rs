//! Shared scaffolding for the scenario tests in this directory: a p2p
//! connection pair (no system/session bus daemon needed, mirroring zbus's
//! own client/server test pairs) plus an optional recording `BusItem`
//! responder that lets a test observe what a member's fan-out writes would
//! actually put on the wire.

use std::sync::{Arc, Mutex};

use acsystem::member::MemberProxy;
use acsystem::value::Value;
use zbus::zvariant::OwnedValue;
use zbus::Connection;

async fn p2p_pair() -> (Connection, Connection) {
    let (a, b) = tokio::net::UnixStream::pair().expect("unix socketpair");
    let conn_a = zbus::connection::Builder::unix_stream(a)
        .p2p()
        .build()
        .await
        .expect("client-side p2p connection");
    let conn_b = zbus::connection::Builder::unix_stream(b)
        .p2p()
        .build()
        .await
        .expect("server-side p2p connection");
    (conn_a, conn_b)
}

/// A member proxy seeded with `values` (plus `/DeviceInstance`, for the
/// deterministic lowest-device-instance-first ordering `ordered_members`
/// relies on) with no responder on the other end of its connection: fine
/// for scenarios that only ever read cached values.
pub async fn member(service_name: &str, device_instance: i64, values: &[(&str, Value)]) -> Arc<MemberProxy> {
    let (conn_a, _conn_b) = p2p_pair().await;
    let proxy = MemberProxy::new(conn_a, service_name.to_string());
    proxy.set_value_for_test("/DeviceInstance", Value::Int(device_instance));
    for (path, value) in values {
        proxy.set_value_for_test(path, value.clone());
    }
    proxy
}

/// Same as [`member`], but also registers a recording `com.victronenergy.BusItem`
/// responder for each of `writable_paths` on the other end of the pair, so
/// a test can assert on what a fan-out write actually sent.
pub async fn recording_member(
    service_name: &str,
    device_instance: i64,
    values: &[(&str, Value)],
    writable_paths: &[&str],
) -> (Arc<MemberProxy>, Arc<Mutex<Vec<(String, Value)>>>) {
    let (conn_a, conn_b) = p2p_pair().await;
    let writes = Arc::new(Mutex::new(Vec::new()));

    for path in writable_paths {
        let obj_path = zbus::zvariant::OwnedObjectPath::try_from(*path).expect("valid object path");
        let item = RecordingBusItem {
            writes: Arc::clone(&writes),
            path: (*path).to_string(),
        };
        conn_b
            .object_server()
            .at(&obj_path, item)
            .await
            .expect("register recording responder");
    }

    let proxy = MemberProxy::new(conn_a, service_name.to_string());
    proxy.set_value_for_test("/DeviceInstance", Value::Int(device_instance));
    for (path, value) in values {
        proxy.set_value_for_test(path, value.clone());
    }
    (proxy, writes)
}

/// Polls `writes` for the most recent entry at `path`, up to `timeout` —
/// `write_raw` is fire-and-forget, so the RPC lands on the responder some
/// short time after the call that triggered it returns.
pub async fn wait_for_write(
    writes: &Arc<Mutex<Vec<(String, Value)>>>,
    path: &str,
    timeout: std::time::Duration,
) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        {
            let guard = writes.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((_, v)) = guard.iter().rev().find(|(p, _)| p == path) {
                return Some(v.clone());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

struct RecordingBusItem {
    writes: Arc<Mutex<Vec<(String, Value)>>>,
    path: String,
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl RecordingBusItem {
    #[zbus(name = "SetValue")]
    async fn set_value(&self, value: OwnedValue) -> i32 {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((self.path.clone(), owned_to_value(&value)));
        0
    }
}

fn owned_to_value(v: &OwnedValue) -> Value {
    if let Ok(i) = <i64 as TryFrom<&OwnedValue>>::try_from(v) {
        return Value::Int(i);
    }
    if let Ok(u) = <u64 as TryFrom<&OwnedValue>>::try_from(v) {
        return Value::Int(u as i64);
    }
    if let Ok(f) = <f64 as TryFrom<&OwnedValue>>::try_from(v) {
        return Value::Double(f);
    }
    if let Ok(s) = <&str as TryFrom<&OwnedValue>>::try_from(v) {
        return Value::Text(s.to_string());
    }
    Value::Absent
}
