//! In-memory stand-in for the wrapped resource-handle library.

use anyhow::{anyhow, bail};
use provio_core::{ConnectorId, ContainerId, ObjectKind};
use provio_id::{Identity, IdentityError, ObjectToken};
use provio_interceptor::{DatasetShape, ObjectInfo, UnderlyingLibrary};
use provio_stats::ManualClock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Raw handle issued by [`FakeLibrary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeHandle {
    pub address: u64,
    pub container: ContainerId,
}

#[derive(Debug, Default)]
struct FakeState {
    next_address: u64,
    next_container: u64,
    containers: BTreeMap<String, ContainerId>,
    objects: BTreeMap<(ContainerId, ObjectKind, String), FakeHandle>,
    shapes: BTreeMap<String, DatasetShape>,
    failing: BTreeSet<&'static str>,
    open_handles: usize,
}

impl FakeState {
    fn allocate(&mut self, container: ContainerId) -> FakeHandle {
        self.next_address += 0x10;
        FakeHandle {
            address: 0x1000 + self.next_address,
            container,
        }
    }
}

/// Scriptable library: objects are keyed by `(container, kind, name)` and
/// reopening the same name yields the same address, hence the same token.
#[derive(Debug)]
pub struct FakeLibrary {
    connector: ConnectorId,
    state: Mutex<FakeState>,
    latency: Option<(ManualClock, Duration)>,
    failing_comparisons: AtomicBool,
}

impl FakeLibrary {
    pub fn new(connector: u64) -> Self {
        Self {
            connector: ConnectorId::new(connector),
            state: Mutex::new(FakeState::default()),
            latency: None,
            failing_comparisons: AtomicBool::new(false),
        }
    }

    /// Advance `clock` by `per_call` on every library call.
    pub fn with_latency(mut self, clock: ManualClock, per_call: Duration) -> Self {
        self.latency = Some((clock, per_call));
        self
    }

    /// Shape reported for datasets called `name`.
    pub fn with_dataset_shape(self, name: &str, type_size: u64, dimensions: &[u64]) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.shapes.insert(
                name.to_string(),
                DatasetShape {
                    type_size,
                    dimensions: dimensions.to_vec(),
                },
            );
        }
        self
    }

    /// Make the next call of `op` fail.
    pub fn fail_next(&self, op: &'static str) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.insert(op);
        }
    }

    pub fn fail_comparisons(&self, failing: bool) {
        self.failing_comparisons.store(failing, AtomicOrdering::SeqCst);
    }

    /// Make `name` inside `from` resolve to an object living in `target`.
    pub fn add_external_link(&self, from: ContainerId, kind: ObjectKind, name: &str, target: ContainerId) {
        if let Ok(mut state) = self.state.lock() {
            let handle = state.allocate(target);
            state.objects.insert((from, kind, name.to_string()), handle);
        }
    }

    /// A raw handle for an object the caller obtained behind the
    /// interceptor's back.
    pub fn raw_object(&self, container: ContainerId, address: u64) -> FakeHandle {
        if let Ok(mut state) = self.state.lock() {
            state.open_handles += 1;
        }
        FakeHandle { address, container }
    }

    /// Handles issued and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.state.lock().map(|state| state.open_handles).unwrap_or(0)
    }

    fn enter(&self, op: &'static str) -> anyhow::Result<MutexGuard<'_, FakeState>> {
        if let Some((clock, per_call)) = &self.latency {
            clock.advance(*per_call);
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("fake library state poisoned"))?;
        if state.failing.remove(op) {
            tracing::debug!(op, "injected failure");
            bail!("injected failure in {op}");
        }
        Ok(state)
    }
}

impl Identity for FakeLibrary {
    type Handle = FakeHandle;
    type Token = ObjectToken;

    fn compare_identity(
        &self,
        _handle: &FakeHandle,
        token_a: &ObjectToken,
        token_b: &ObjectToken,
    ) -> Result<Ordering, IdentityError> {
        if self.failing_comparisons.load(AtomicOrdering::SeqCst) {
            return Err(IdentityError::Comparison("injected comparison failure".to_string()));
        }
        Ok(token_a.as_bytes().cmp(token_b.as_bytes()))
    }
}

impl UnderlyingLibrary for FakeLibrary {
    fn connector_id(&self) -> ConnectorId {
        self.connector
    }

    fn create_container(&self, name: &str) -> anyhow::Result<FakeHandle> {
        let mut state = self.enter("create_container")?;
        let id = match state.containers.get(name) {
            Some(id) => *id,
            None => {
                state.next_container += 1;
                let id = ContainerId::new(state.next_container);
                state.containers.insert(name.to_string(), id);
                id
            }
        };
        state.open_handles += 1;
        Ok(state.allocate(id))
    }

    fn open_container(&self, name: &str) -> anyhow::Result<FakeHandle> {
        let mut state = self.enter("open_container")?;
        let Some(id) = state.containers.get(name).copied() else {
            bail!("no such container: {name}");
        };
        state.open_handles += 1;
        Ok(state.allocate(id))
    }

    fn close_container(&self, _handle: &FakeHandle) -> anyhow::Result<()> {
        let mut state = self.enter("close_container")?;
        state.open_handles = state.open_handles.saturating_sub(1);
        Ok(())
    }

    fn container_id(&self, handle: &FakeHandle) -> anyhow::Result<ContainerId> {
        let _state = self.enter("container_id")?;
        Ok(handle.container)
    }

    fn create_object(
        &self,
        parent: &FakeHandle,
        kind: ObjectKind,
        name: &str,
    ) -> anyhow::Result<FakeHandle> {
        let mut state = self.enter("create_object")?;
        let key = (parent.container, kind, name.to_string());
        if state.objects.contains_key(&key) {
            bail!("{kind} {name} already exists");
        }
        let handle = state.allocate(parent.container);
        state.objects.insert(key, handle.clone());
        state.open_handles += 1;
        Ok(handle)
    }

    fn open_object(
        &self,
        parent: &FakeHandle,
        kind: ObjectKind,
        name: &str,
    ) -> anyhow::Result<FakeHandle> {
        let mut state = self.enter("open_object")?;
        let Some(handle) = state
            .objects
            .get(&(parent.container, kind, name.to_string()))
            .cloned()
        else {
            bail!("no such {kind}: {name}");
        };
        state.open_handles += 1;
        Ok(handle)
    }

    fn close_object(&self, _handle: &FakeHandle, _kind: ObjectKind) -> anyhow::Result<()> {
        let mut state = self.enter("close_object")?;
        state.open_handles = state.open_handles.saturating_sub(1);
        Ok(())
    }

    fn object_info(
        &self,
        handle: &FakeHandle,
        _kind: ObjectKind,
    ) -> anyhow::Result<ObjectInfo<ObjectToken>> {
        let _state = self.enter("object_info")?;
        Ok(ObjectInfo {
            container: handle.container,
            token: ObjectToken::from_address(handle.address),
        })
    }

    fn dataset_shape(&self, handle: &FakeHandle) -> anyhow::Result<DatasetShape> {
        let state = self.enter("dataset_shape")?;
        let name = state
            .objects
            .iter()
            .find(|(_, candidate)| *candidate == handle)
            .map(|((_, _, name), _)| name.clone());
        let shape = name
            .and_then(|name| state.shapes.get(&name).cloned())
            .unwrap_or(DatasetShape {
                type_size: 8,
                dimensions: vec![16],
            });
        Ok(shape)
    }

    fn read_dataset(&self, _handle: &FakeHandle, _selected_points: Option<u64>) -> anyhow::Result<()> {
        let _state = self.enter("read_dataset")?;
        Ok(())
    }

    fn write_dataset(&self, _handle: &FakeHandle, _selected_points: Option<u64>) -> anyhow::Result<()> {
        let _state = self.enter("write_dataset")?;
        Ok(())
    }
}
