//! Discovers RS units on the bus, groups them by `N2kSystemInstance`, and
//! owns the leader for each group.
//!
//! Grounded on `original_source/dbus-acsystem.py`'s `SystemMonitor`
//! (`serviceAdded`/`serviceRemoved`/`systemInstanceChanged`/`itemsChanged`),
//! adapted from `aiovelib.client.Monitor`'s polling-based service discovery
//! to zbus's `NameOwnerChanged` signal stream, and from the source's
//! `asyncio.Future()` in-flight latch to [`tokio::sync::OnceCell`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex as AsyncMutex, OnceCell};
use tokio_stream::StreamExt;
use zbus::Connection;

use crate::dbus::shared::WriteRequest;
use crate::dbus::DbusPublisher;
use crate::error::{AcSystemError, Result};
use crate::leader::{Command, LeaderAggregate};
use crate::logging::{get_logger_with_context, LogContext, StructuredLogger};
use crate::member::MemberProxy;
use crate::paths::SYNCHRONISED_PATHS;
use crate::value::Value;

const MULTI_SERVICE_PREFIX: &str = "com.victronenergy.multi.";

struct LeaderState {
    aggregate: LeaderAggregate,
    publisher: DbusPublisher,
}

impl LeaderState {
    /// Pushes every current aggregate item to the published tree. `update_path`
    /// is a no-op for unchanged values, so calling this after every mutation
    /// is cheap and keeps the tree always consistent with `aggregate`.
    async fn republish(&mut self) {
        for (path, value) in self.aggregate.snapshot_items() {
            if let Err(e) = self.publisher.update_path(&path, value).await {
                tracing::warn!("failed to republish {path}: {e}");
            }
        }
    }
}

/// One running supervisor: owns the bus connection, the set of leaders
/// (one per `N2kSystemInstance`), and the in-flight coalescing latches used
/// while a leader is still being created.
pub struct SystemMonitor {
    connection: Connection,
    leaders: StdMutex<HashMap<u8, Arc<OnceCell<Arc<AsyncMutex<LeaderState>>>>>>,
    logger: StructuredLogger,
}

impl SystemMonitor {
    pub fn new(connection: Connection) -> Arc<Self> {
        Arc::new(Self {
            connection,
            leaders: StdMutex::new(HashMap::new()),
            logger: get_logger_with_context(LogContext::new("monitor")),
        })
    }

    /// Enumerates already-running RS units, then follows `NameOwnerChanged`
    /// for the rest of the process's life. Mirrors `SystemMonitor.create`
    /// (initial scan) plus its ongoing `Monitor` base-class subscription.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let dbus_proxy = zbus::fdo::DBusProxy::new(&self.connection).await.map_err(AcSystemError::from)?;

        let existing = dbus_proxy.list_names().await.map_err(AcSystemError::from)?;
        for name in existing {
            let name = name.to_string();
            if name.starts_with(MULTI_SERVICE_PREFIX) {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.admit(name).await });
            }
        }

        let mut stream = dbus_proxy.receive_name_owner_changed().await.map_err(AcSystemError::from)?;
        while let Some(signal) = stream.next().await {
            let Ok(args) = signal.args() else { continue };
            let name = args.name.to_string();
            if !name.starts_with(MULTI_SERVICE_PREFIX) {
                continue;
            }
            let had_owner = args.old_owner.is_some();
            let has_owner = args.new_owner.is_some();
            if !had_owner && has_owner {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.admit(name).await });
            } else if had_owner && !has_owner {
                self.depart(&name).await;
            }
        }
        Ok(())
    }

    /// Admits one newly-seen RS unit: waits for its essential paths, groups
    /// it by `N2kSystemInstance`, creating a new leader (coalesced through
    /// `OnceCell` so concurrent admissions for the same instance don't race
    /// to publish two services) or joining an existing one.
    async fn admit(self: Arc<Self>, service_name: String) {
        let member = MemberProxy::new(self.connection.clone(), service_name.clone());
        let rx = match member.start_watching().await {
            Ok(rx) => rx,
            Err(e) => {
                self.logger.warn(&format!("watching {service_name} failed: {e}"));
                return;
            }
        };
        member.wait_for_essential_paths().await;
        member.fetch_ac_max_limits().await;

        let Some(instance) = member.systeminstance() else {
            self.logger.warn(&format!("{service_name} has no N2kSystemInstance after essential paths settled"));
            return;
        };

        let cell = {
            let mut leaders = self.leaders.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(leaders.entry(instance).or_insert_with(|| Arc::new(OnceCell::new())))
        };

        let member_for_init = Arc::clone(&member);
        let connection = self.connection.clone();
        let init_result = cell
            .get_or_try_init(|| async move {
                Self::spawn_leader(connection, instance, member_for_init).await
            })
            .await;
        let state = match init_result {
            Ok(s) => Arc::clone(s),
            Err(e) => {
                self.logger.warn(&format!("failed to stand up leader for instance {instance}: {e}"));
                return;
            }
        };

        {
            let mut state = state.lock().await;
            if !state.aggregate.members.contains_key(&service_name) {
                state.aggregate.add_member(Arc::clone(&member));
                for path in SYNCHRONISED_PATHS {
                    let v = state.aggregate.get_item(path);
                    if !v.is_absent() && v != member.value_at(path) {
                        member.write_raw(path, v);
                    }
                }
            }
            state.republish().await;
        }

        let this = Arc::clone(&self);
        let state_for_dispatch = Arc::clone(&state);
        tokio::spawn(async move { this.dispatch(member, state_for_dispatch, rx).await });
    }

    /// Builds a brand-new leader for `instance`, seeded from `first_member`:
    /// publishes its service on the bus and spawns the task that owns the
    /// write-request channel: writes are validated and
    /// fanned out from a single owner rather than from each `BusItem`).
    async fn spawn_leader(
        connection: Connection,
        instance: u8,
        first_member: Arc<MemberProxy>,
    ) -> Result<Arc<AsyncMutex<LeaderState>>> {
        let aggregate = LeaderAggregate::new(instance, Arc::clone(&first_member));
        aggregate.settings.init(&connection).await.ok();

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let mut publisher = DbusPublisher::new(aggregate.bus_name.clone(), write_tx)?;
        publisher.start(connection).await?;

        for path in crate::leader::commands::WRITABLE_PATHS {
            publisher.ensure_item(path, aggregate.get_item(path), true).await?;
        }

        let state = Arc::new(AsyncMutex::new(LeaderState { aggregate, publisher }));
        state.lock().await.republish().await;

        let state_for_writes = Arc::clone(&state);
        tokio::spawn(Self::run_write_loop(state_for_writes, write_rx));

        Ok(state)
    }

    /// Owns the `SetValue` reply channel for one leader: validates and
    /// applies every incoming write, then republishes whatever changed.
    async fn run_write_loop(state: Arc<AsyncMutex<LeaderState>>, mut rx: mpsc::UnboundedReceiver<WriteRequest>) {
        while let Some(request) = rx.recv().await {
            let accepted = match Command::from_path(&request.path, request.value) {
                Some(cmd) => {
                    let mut state = state.lock().await;
                    let accepted = state.aggregate.apply_command(cmd);
                    if accepted {
                        state.republish().await;
                    }
                    accepted
                }
                None => false,
            };
            let _ = request.reply.send(accepted);
        }
    }

    /// Forwards one member's observed changes to its leader: summary paths
    /// trigger a recompute, synchronised paths fan out to the other members
    /// and the leader's own item, and an `N2kSystemInstance` change triggers
    /// a full depart-then-readmit (`systemInstanceChanged`).
    async fn dispatch(
        self: Arc<Self>,
        member: Arc<MemberProxy>,
        state: Arc<AsyncMutex<LeaderState>>,
        mut rx: mpsc::UnboundedReceiver<Vec<(String, Value)>>,
    ) {
        while let Some(batch) = rx.recv().await {
            if batch.iter().any(|(p, _)| p == "/N2kSystemInstance") {
                let this = Arc::clone(&self);
                let service_name = member.service_name.clone();
                tokio::spawn(async move {
                    this.depart(&service_name).await;
                    this.admit(service_name.clone()).await;
                });
                return;
            }

            let mut state = state.lock().await;
            let mut changed_summary = false;
            for (path, value) in &batch {
                if crate::summary::is_summary_path(path) {
                    state.aggregate.update_summary(path);
                    changed_summary = true;
                    continue;
                }
                if crate::paths::is_synchronised(path) {
                    for other in state.aggregate.members.values() {
                        if other.service_name != member.service_name && &other.value_at(path) != value {
                            other.write_raw(path, value.clone());
                        }
                    }
                    if &state.aggregate.get_item(path) != value {
                        state.aggregate.set_item(path, value.clone());
                    }
                }
            }
            if changed_summary || !batch.is_empty() {
                state.republish().await;
            }
        }
    }

    /// Removes `service_name` from whichever leader holds it; tears the
    /// leader down entirely once its last member departs.
    async fn depart(&self, service_name: &str) {
        let cells: Vec<(u8, Arc<OnceCell<Arc<AsyncMutex<LeaderState>>>>)> = {
            let leaders = self.leaders.lock().unwrap_or_else(|e| e.into_inner());
            leaders.iter().map(|(k, v)| (*k, Arc::clone(v))).collect()
        };
        for (instance, cell) in cells {
            let Some(state) = cell.get() else { continue };
            let now_empty = {
                let mut state = state.lock().await;
                if state.aggregate.remove_member(service_name) {
                    state.republish().await;
                }
                state.aggregate.is_empty()
            };
            if now_empty {
                let mut leaders = self.leaders.lock().unwrap_or_else(|e| e.into_inner());
                leaders.remove(&instance);
                self.logger.info(&format!("leader for instance {instance} torn down: no members remain"));
            }
        }
    }

    /// Advances every leader's control-timeout state machine one second and
    /// republishes (`calculation_loop`'s 1 Hz tick).
    pub async fn tick_all(&self) {
        let cells: Vec<Arc<OnceCell<Arc<AsyncMutex<LeaderState>>>>> = {
            let leaders = self.leaders.lock().unwrap_or_else(|e| e.into_inner());
            leaders.values().cloned().collect()
        };
        for cell in cells {
            let Some(state) = cell.get() else { continue };
            let mut state = state.lock().await;
            state.aggregate.tick();
            state.republish().await;
        }
    }
}
