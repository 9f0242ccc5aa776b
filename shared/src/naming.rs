//! Collision-resistant names for platform resources
//!
//! Concurrent suite runs share one platform, so every generated name carries a
//! random suffix. Drain names follow the `<prefix>-<unix nanos>` shape that the
//! drain listing assertions match on.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::Rng;

const SUFFIX_LEN: usize = 16;
const HEX: &[u8] = b"0123456789abcdef";

#[derive(Debug)]
pub struct NameGenerator {
    node: u32,
    last_nanos: AtomicU64,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::with_node(1)
    }

    /// `node` distinguishes parallel runners within one invocation.
    fn with_node(node: u32) -> Self {
        Self {
            node,
            last_nanos: AtomicU64::new(0),
        }
    }

    /// `<prefix>-<node>-<resource>-<16 hex>`, e.g. `LOG-EMITTER-1--0f3a...`.
    pub fn prefixed(&self, prefix: &str, resource: &str) -> String {
        format!("{}-{}-{}-{}", prefix, self.node, resource, random_hex(SUFFIX_LEN))
    }

    /// `<prefix>-<nanos>`, strictly increasing per generator.
    pub fn timestamped(&self, prefix: &str) -> String {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default().max(0) as u64;
        let mut previous = self.last_nanos.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous + 1);
            match self.last_nanos.compare_exchange_weak(
                previous,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return format!("{}-{}", prefix, candidate),
                Err(actual) => previous = actual,
            }
        }
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Line the constant-logger app prints for itself, `APP_LOG: <app>`.
pub fn app_log_line(app_name: &str) -> String {
    format!("APP_LOG: {app_name}")
}

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}
