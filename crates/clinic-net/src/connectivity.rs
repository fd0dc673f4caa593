//! Network reachability gate checked before each outbound call.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

/// Reports current reachability.
#[async_trait]
pub trait ConnectivityGate: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Gate that always reports reachable (desktop/server hosts).
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl ConnectivityGate for AlwaysOnline {
    async fn is_reachable(&self) -> bool {
        true
    }
}

/// Reachability flag pushed by the host's network listener.
#[derive(Debug)]
pub struct ConnectivityFlag {
    online: AtomicBool,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            tracing::info!(online, "Connectivity changed");
        }
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConnectivityGate for ConnectivityFlag {
    async fn is_reachable(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
