// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::occupancy::models::{PingHandle, ScheduledPing};

#[derive(Default)]
/// A scheduled ping that only records whether it was called off.
pub struct ManualPing {
    cancelled: AtomicBool,
}

impl ManualPing {
    pub fn handle() -> (Arc<ManualPing>, PingHandle) {
        let ping = Arc::new(ManualPing::default());
        let handle = PingHandle::new(ping.clone());
        (ping, handle)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl ScheduledPing for ManualPing {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
