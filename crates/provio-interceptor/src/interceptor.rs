//! The provenance interceptor.
//!
//! Every public operation forwards to the [`UnderlyingLibrary`], keeps the
//! registry in step with the handles it returns, and reports its duration
//! into the stats table. Library time and bookkeeping time are tracked
//! separately so teardown can report the cost of interception itself.

use crate::error::{CloseError, InterceptError, Result};
use crate::library::{DatasetShape, UnderlyingLibrary};
use crate::proxy::{Proxy, ProxyTarget, WrapContext};
use provio_core::{ObjectKind, ProvioConfig};
use provio_observability::spans;
use provio_registry::{NodeHandle, Registry, TeardownReport};
use provio_stats::{Clock, OpTimer, Overhead, OverheadList, StatsTable, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

type CloseResult<H> = std::result::Result<u32, CloseError<H>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Create,
    Open,
    Close,
}

fn op_name(kind: ObjectKind, verb: Verb) -> &'static str {
    match (kind, verb) {
        (ObjectKind::Dataset, Verb::Create) => "dataset_create",
        (ObjectKind::Dataset, Verb::Open) => "dataset_open",
        (ObjectKind::Dataset, Verb::Close) => "dataset_close",
        (ObjectKind::Group, Verb::Create) => "group_create",
        (ObjectKind::Group, Verb::Open) => "group_open",
        (ObjectKind::Group, Verb::Close) => "group_close",
        (ObjectKind::Datatype, Verb::Create) => "datatype_commit",
        (ObjectKind::Datatype, Verb::Open) => "datatype_open",
        (ObjectKind::Datatype, Verb::Close) => "datatype_close",
        (ObjectKind::Attribute, Verb::Create) => "attr_create",
        (ObjectKind::Attribute, Verb::Open) => "attr_open",
        (ObjectKind::Attribute, Verb::Close) => "attr_close",
    }
}

/// What an interceptor leaves behind when its connector terminates.
#[derive(Debug)]
pub struct TeardownSummary {
    pub teardown: TeardownReport,
    pub stats: StatsTable,
    pub overhead: Overhead,
}

impl TeardownSummary {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "stats": self.stats.to_json(),
            "overhead": self.overhead,
            "leaked": self.teardown.leaked,
        })
    }
}

pub struct ProvenanceInterceptor<L: UnderlyingLibrary> {
    registry: Registry<L>,
    stats: StatsTable,
    overhead: Overhead,
    clock: Arc<dyn Clock>,
    config: ProvioConfig,
}

impl<L: UnderlyingLibrary> ProvenanceInterceptor<L> {
    pub fn new(library: L, config: ProvioConfig) -> Result<Self> {
        Self::with_clock(library, config, Arc::new(SystemClock::new()))
    }

    /// Create an interceptor that reads time from `clock`.
    pub fn with_clock(library: L, config: ProvioConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let stats = StatsTable::from_config(&config)?;
        let registry = Registry::open(library, &config);
        tracing::debug!(
            registry_id = %registry.id(),
            connector_id = %registry.identity().connector_id(),
            stats_capacity = stats.capacity(),
            "provenance interceptor initialized"
        );
        Ok(Self {
            registry,
            stats,
            overhead: Overhead::new(),
            clock,
            config,
        })
    }

    pub fn registry(&self) -> &Registry<L> {
        &self.registry
    }

    pub fn stats(&self) -> &StatsTable {
        &self.stats
    }

    pub fn overhead(&self) -> &Overhead {
        &self.overhead
    }

    pub fn config(&self) -> &ProvioConfig {
        &self.config
    }

    pub fn library(&self) -> &L {
        self.registry.identity()
    }

    pub fn file_create(&mut self, name: &str) -> Result<Proxy<L::Handle>> {
        self.open_file("file_create", name, true)
    }

    pub fn file_open(&mut self, name: &str) -> Result<Proxy<L::Handle>> {
        self.open_file("file_open", name, false)
    }

    /// Close a container proxy; returns the container's remaining refcount.
    ///
    /// The container entry outlives this call while objects inside it are
    /// still open. If the library rejects the close the proxy comes back
    /// inside the error with its bookkeeping intact.
    pub fn file_close(&mut self, proxy: Proxy<L::Handle>) -> CloseResult<L::Handle> {
        let op = "file_close";
        let _span = spans::intercepted_op(op, None).entered();
        let (ProxyTarget::Container(id), Some(handle)) = (proxy.target(), proxy.handle()) else {
            return Err(CloseError::new(
                proxy,
                InterceptError::WrongProxy { op, expected: "container" },
            ));
        };
        let timer = OpTimer::start(&*self.clock);
        let library_time = match self.call_library(op, |lib| lib.close_container(handle)) {
            Ok(((), elapsed)) => elapsed,
            Err(err) => {
                tracing::warn!(container_id = %id, error = %err, "container close rejected");
                return Err(CloseError::new(proxy, err));
            }
        };
        drop(proxy);
        let remaining = self.timed_list(OverheadList::Containers, |registry| {
            registry.close_container(id)
        });
        self.finish(op, timer, library_time);
        tracing::debug!(container_id = %id, remaining, "container proxy closed");
        Ok(remaining)
    }

    pub fn object_create(
        &mut self,
        parent: &Proxy<L::Handle>,
        kind: ObjectKind,
        name: &str,
    ) -> Result<Proxy<L::Handle>> {
        self.open_object(parent, kind, name, Verb::Create)
    }

    pub fn object_open(
        &mut self,
        parent: &Proxy<L::Handle>,
        kind: ObjectKind,
        name: &str,
    ) -> Result<Proxy<L::Handle>> {
        self.open_object(parent, kind, name, Verb::Open)
    }

    /// Close an object proxy; returns the node's remaining refcount.
    pub fn object_close(&mut self, proxy: Proxy<L::Handle>) -> CloseResult<L::Handle> {
        let (Some(node), Some(handle)) = (proxy.node(), proxy.handle()) else {
            return Err(CloseError::new(
                proxy,
                InterceptError::WrongProxy { op: "object_close", expected: "object" },
            ));
        };
        let op = op_name(node.kind, Verb::Close);
        let _span = spans::intercepted_op(op, Some(node.kind)).entered();
        let timer = OpTimer::start(&*self.clock);
        let library_time = match self.call_library(op, |lib| lib.close_object(handle, node.kind)) {
            Ok(((), elapsed)) => elapsed,
            Err(err) => {
                tracing::warn!(node_id = %node.node, error = %err, "object close rejected");
                return Err(CloseError::new(proxy, err));
            }
        };
        drop(proxy);
        let remaining = self.timed_list(OverheadList::Objects(node.kind), |registry| {
            registry.untrack_object(node)
        });
        self.finish(op, timer, library_time);
        Ok(remaining)
    }

    /// Read through a dataset proxy; returns the bytes transferred.
    pub fn dataset_read(
        &mut self,
        proxy: &Proxy<L::Handle>,
        selected_points: Option<u64>,
    ) -> Result<u64> {
        let op = "dataset_read";
        let _span = spans::intercepted_op(op, Some(ObjectKind::Dataset)).entered();
        let (node, handle) = dataset_parts(op, proxy)?;
        let timer = OpTimer::start(&*self.clock);
        let ((), library_time) =
            self.call_library(op, |lib| lib.read_dataset(handle, selected_points))?;
        let bytes = self.timed_list(OverheadList::Objects(ObjectKind::Dataset), |registry| {
            registry.record_dataset_read(node, selected_points, library_time)
        })?;
        self.finish(op, timer, library_time);
        tracing::trace!(node_id = %node.node, bytes, "dataset read");
        Ok(bytes)
    }

    /// Write through a dataset proxy; returns the bytes transferred.
    pub fn dataset_write(
        &mut self,
        proxy: &Proxy<L::Handle>,
        selected_points: Option<u64>,
    ) -> Result<u64> {
        let op = "dataset_write";
        let _span = spans::intercepted_op(op, Some(ObjectKind::Dataset)).entered();
        let (node, handle) = dataset_parts(op, proxy)?;
        let timer = OpTimer::start(&*self.clock);
        let ((), library_time) =
            self.call_library(op, |lib| lib.write_dataset(handle, selected_points))?;
        let bytes = self.timed_list(OverheadList::Objects(ObjectKind::Dataset), |registry| {
            registry.record_dataset_write(node, selected_points, library_time)
        })?;
        self.finish(op, timer, library_time);
        tracing::trace!(node_id = %node.node, bytes, "dataset written");
        Ok(bytes)
    }

    /// Pin the container behind `proxy` so objects can be wrapped later.
    pub fn get_wrap_ctx(&mut self, proxy: &Proxy<L::Handle>) -> Result<WrapContext> {
        let op = "get_wrap_ctx";
        let _span = spans::intercepted_op(op, None).entered();
        let container = proxy.container_id();
        let timer = OpTimer::start(&*self.clock);
        self.timed_list(OverheadList::Containers, |registry| {
            registry.pin_container(container)
        })?;
        self.finish(op, timer, Duration::ZERO);
        Ok(WrapContext {
            connector: proxy.connector(),
            container,
        })
    }

    /// Wrap a raw handle that reached the caller outside open/create.
    pub fn wrap_object(
        &mut self,
        handle: L::Handle,
        kind: ObjectKind,
        ctx: &WrapContext,
    ) -> Result<Proxy<L::Handle>> {
        let parent = Proxy::fake(ctx.connector, ctx.container);
        self.wrap_under("wrap_object", &parent, handle, kind, None)
    }

    /// Wrap the object produced by an asynchronous request once its
    /// completion is observed.
    pub fn complete_request(
        &mut self,
        parent: &Proxy<L::Handle>,
        handle: L::Handle,
        kind: ObjectKind,
        name: Option<&str>,
    ) -> Result<Proxy<L::Handle>> {
        let fake = Proxy::fake(parent.connector(), parent.container_id());
        self.wrap_under("request_wait", &fake, handle, kind, name)
    }

    /// Release an object proxy's bookkeeping and hand back the raw handle.
    pub fn unwrap_object(&mut self, proxy: Proxy<L::Handle>) -> Result<L::Handle> {
        let op = "unwrap_object";
        let Some(node) = proxy.node() else {
            return Err(InterceptError::WrongProxy { op, expected: "object" });
        };
        let _span = spans::intercepted_op(op, Some(node.kind)).entered();
        let Some(handle) = proxy.into_handle() else {
            return Err(InterceptError::WrongProxy { op, expected: "object" });
        };
        let timer = OpTimer::start(&*self.clock);
        self.timed_list(OverheadList::Objects(node.kind), |registry| {
            registry.untrack_object(node)
        });
        self.finish(op, timer, Duration::ZERO);
        Ok(handle)
    }

    /// Drop the container reference taken by [`Self::get_wrap_ctx`].
    pub fn free_wrap_ctx(&mut self, ctx: WrapContext) -> u32 {
        let op = "free_wrap_ctx";
        let _span = spans::intercepted_op(op, None).entered();
        let timer = OpTimer::start(&*self.clock);
        let remaining = self.timed_list(OverheadList::Containers, |registry| {
            registry.close_container(ctx.container)
        });
        self.finish(op, timer, Duration::ZERO);
        remaining
    }

    /// Tear down the registry and write the stats report if configured.
    pub fn terminate(self) -> Result<TeardownSummary> {
        let span = spans::registry_teardown(self.registry.id());
        let _guard = span.enter();
        let ProvenanceInterceptor {
            registry,
            stats,
            overhead,
            config,
            ..
        } = self;
        if let Some(path) = &config.stat_file_path {
            write_report(path, &stats, &overhead, config.record_overhead)?;
        }
        let teardown = registry.close();
        tracing::info!(
            operations = stats.len(),
            total_us = stats.total().as_micros() as u64,
            interception_us = overhead.interception().as_micros() as u64,
            leaked = teardown.leaked.len(),
            "provenance interceptor terminated"
        );
        Ok(TeardownSummary {
            teardown,
            stats,
            overhead,
        })
    }

    fn open_file(&mut self, op: &'static str, name: &str, create: bool) -> Result<Proxy<L::Handle>> {
        let _span = spans::intercepted_op(op, None).entered();
        let timer = OpTimer::start(&*self.clock);
        let (handle, mut library_time) = self.call_library(op, |lib| {
            if create {
                lib.create_container(name)
            } else {
                lib.open_container(name)
            }
        })?;
        let registered = self
            .call_library(op, |lib| lib.container_id(&handle))
            .and_then(|(id, elapsed)| {
                library_time += elapsed;
                let _scope = spans::container_scope(id).entered();
                self.timed_list(OverheadList::Containers, |registry| {
                    registry.open_container(id, Some(name)).map(|_| ())
                })?;
                Ok(id)
            });
        let id = match registered {
            Ok(id) => id,
            Err(err) => {
                if let Err(close_err) = self.registry.identity().close_container(&handle) {
                    tracing::warn!(error = %close_err, "failed to release unregistered container");
                }
                return Err(err);
            }
        };
        self.finish(op, timer, library_time);
        tracing::debug!(container_id = %id, name, "container proxy created");
        let connector = self.registry.identity().connector_id();
        Ok(Proxy::container(handle, connector, id))
    }

    fn open_object(
        &mut self,
        parent: &Proxy<L::Handle>,
        kind: ObjectKind,
        name: &str,
        verb: Verb,
    ) -> Result<Proxy<L::Handle>> {
        let op = op_name(kind, verb);
        let _span = spans::intercepted_op(op, Some(kind)).entered();
        let Some(parent_handle) = parent.handle() else {
            return Err(InterceptError::WrongProxy { op, expected: "non-fake" });
        };
        let timer = OpTimer::start(&*self.clock);
        let (handle, mut library_time) = self.call_library(op, |lib| match verb {
            Verb::Create => lib.create_object(parent_handle, kind, name),
            _ => lib.open_object(parent_handle, kind, name),
        })?;

        let info = match self.call_library(op, |lib| lib.object_info(&handle, kind)) {
            Ok((info, elapsed)) => {
                library_time += elapsed;
                info
            }
            Err(err) => {
                self.discard(&handle, kind);
                return Err(err);
            }
        };

        let home = parent.container_id();
        let tracked = self.timed_list(OverheadList::Objects(kind), |registry| {
            registry.track_object_in(home, info.container, kind, info.token, Some(name), &handle)
        });
        let node = match tracked {
            Ok(node) => node,
            Err(err) => {
                self.discard(&handle, kind);
                return Err(err.into());
            }
        };
        match self.describe_object(op, node, verb, &handle) {
            Ok(elapsed) => library_time += elapsed,
            Err(err) => {
                self.timed_list(OverheadList::Objects(kind), |registry| {
                    registry.untrack_object(node)
                });
                self.discard(&handle, kind);
                return Err(err);
            }
        }
        self.finish(op, timer, library_time);
        tracing::debug!(
            container_id = %node.container,
            kind = %kind,
            node_id = %node.node,
            name,
            "object proxy created"
        );
        let connector = self.registry.identity().connector_id();
        Ok(Proxy::object(handle, connector, node))
    }

    fn wrap_under(
        &mut self,
        op: &'static str,
        parent: &Proxy<L::Handle>,
        handle: L::Handle,
        kind: ObjectKind,
        name: Option<&str>,
    ) -> Result<Proxy<L::Handle>> {
        let _span = spans::intercepted_op(op, Some(kind)).entered();
        let timer = OpTimer::start(&*self.clock);
        let (info, library_time) = match self.call_library(op, |lib| lib.object_info(&handle, kind)) {
            Ok(found) => found,
            Err(err) => {
                self.discard(&handle, kind);
                return Err(err);
            }
        };
        let home = parent.container_id();
        let tracked = self.timed_list(OverheadList::Objects(kind), |registry| {
            registry.track_object_in(home, info.container, kind, info.token, name, &handle)
        });
        let node = match tracked {
            Ok(node) => node,
            Err(err) => {
                self.discard(&handle, kind);
                return Err(err.into());
            }
        };
        self.finish(op, timer, library_time);
        tracing::debug!(
            container_id = %node.container,
            kind = %kind,
            node_id = %node.node,
            "object wrapped"
        );
        Ok(Proxy::object(handle, parent.connector(), node))
    }

    /// Fill in the per-kind counters of a freshly tracked node; returns the
    /// time spent in the library.
    fn describe_object(
        &mut self,
        op: &'static str,
        node: NodeHandle,
        verb: Verb,
        handle: &L::Handle,
    ) -> Result<Duration> {
        let (shape, library_time) = if node.kind == ObjectKind::Dataset {
            let (shape, elapsed) = self.call_library(op, |lib| lib.dataset_shape(handle))?;
            (Some(shape), elapsed)
        } else {
            (None, Duration::ZERO)
        };
        self.timed_list(OverheadList::Objects(node.kind), |registry| {
            record_open(registry, node, verb, shape)
        })?;
        Ok(library_time)
    }

    /// Close a handle whose bookkeeping could not be set up.
    fn discard(&self, handle: &L::Handle, kind: ObjectKind) {
        if let Err(err) = self.registry.identity().close_object(handle, kind) {
            tracing::warn!(kind = %kind, error = %err, "failed to release untracked object");
        }
    }

    fn call_library<R>(
        &self,
        op: &'static str,
        call: impl FnOnce(&L) -> anyhow::Result<R>,
    ) -> Result<(R, Duration)> {
        let timer = OpTimer::start(&*self.clock);
        let value = call(self.registry.identity())
            .map_err(|source| InterceptError::Library { op, source })?;
        Ok((value, timer.elapsed(&*self.clock)))
    }

    fn timed_list<R>(
        &mut self,
        list: OverheadList,
        work: impl FnOnce(&mut Registry<L>) -> R,
    ) -> R {
        let timer = OpTimer::start(&*self.clock);
        let result = work(&mut self.registry);
        if self.config.record_overhead {
            self.overhead.add_list(list, timer.elapsed(&*self.clock));
        }
        result
    }

    fn finish(&mut self, op: &'static str, timer: OpTimer, library_time: Duration) {
        let total = timer.elapsed(&*self.clock);
        if let Err(err) = self.stats.accumulate(op, total) {
            tracing::warn!(op, error = %err, "operation timing dropped");
        }
        if self.config.record_overhead {
            self.overhead.add_library(library_time);
            self.overhead.add_interception(total.saturating_sub(library_time));
        }
    }
}

fn dataset_parts<'a, H>(op: &'static str, proxy: &'a Proxy<H>) -> Result<(NodeHandle, &'a H)> {
    match (proxy.node(), proxy.handle()) {
        (Some(node), Some(handle)) if node.kind == ObjectKind::Dataset => Ok((node, handle)),
        _ => Err(InterceptError::WrongProxy { op, expected: "dataset" }),
    }
}

fn record_open<L: UnderlyingLibrary>(
    registry: &mut Registry<L>,
    node: NodeHandle,
    verb: Verb,
    shape: Option<DatasetShape>,
) -> provio_registry::Result<()> {
    if verb == Verb::Create {
        registry.record_created(node.container, node.kind)?;
    } else {
        registry.record_accessed(node.container, node.kind)?;
    }
    match node.kind {
        ObjectKind::Dataset => {
            if let Some(shape) = shape {
                registry.set_dataset_shape(node, shape.type_size, &shape.dimensions)?;
            }
        }
        ObjectKind::Datatype if verb == Verb::Create => {
            registry.record_datatype_commit(node)?;
        }
        ObjectKind::Datatype => {
            registry.record_datatype_get(node)?;
        }
        ObjectKind::Group | ObjectKind::Attribute => {
            registry.record_object_op(node)?;
        }
    }
    Ok(())
}

fn write_report(
    path: &Path,
    stats: &StatsTable,
    overhead: &Overhead,
    with_overhead: bool,
) -> Result<()> {
    let _span = spans::stats_report(stats.len()).entered();
    if !with_overhead {
        stats.write_report(path)?;
        return Ok(());
    }
    let mut contents = stats.render_text();
    contents.push_str(&overhead.render_text());
    std::fs::write(path, contents).map_err(|source| InterceptError::Report {
        path: PathBuf::from(path),
        source,
    })?;
    tracing::debug!(path = %path.display(), "stats report written");
    Ok(())
}
