//! The tunnel registry: the set of live tunnels, used for fleet shutdown.
//!
//! Unlike a tunnel's own state (owned exclusively by the task driving it,
//! never locked), the registry is genuinely shared across every tunnel's
//! task, so it is backed by a concurrent map rather than the no-locks rule
//! in §5 of the design. Iteration during `shutdown_all` tolerates concurrent
//! removal: `DashMap` iteration is safe under concurrent mutation, and each
//! tunnel removes itself from the registry when its task ends.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Opaque per-tunnel identifier, unique within one registry.
pub type TunnelId = u64;

/// Per-environment container of live tunnels' shutdown handles.
#[derive(Default)]
pub struct TunnelRegistry {
    tunnels: DashMap<TunnelId, CancellationToken>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tunnel, returning a guard that removes it from the
    /// registry when dropped (the `dying` callback of §3's lifecycle).
    pub fn register(&self, id: TunnelId, token: CancellationToken) -> RegistryGuard<'_> {
        self.tunnels.insert(id, token);
        RegistryGuard { registry: self, id }
    }

    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }

    /// Cancel every live tunnel's token. Idempotent: a tunnel that has
    /// already removed itself is simply absent from the iteration.
    pub fn shutdown_all(&self) {
        for entry in self.tunnels.iter() {
            entry.value().cancel();
        }
    }
}

/// RAII handle that removes a tunnel from its registry on drop.
pub struct RegistryGuard<'a> {
    registry: &'a TunnelRegistry,
    id: TunnelId,
}

impl Drop for RegistryGuard<'_> {
    fn drop(&mut self) {
        self.registry.tunnels.remove(&self.id);
    }
}
