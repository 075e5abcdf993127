use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tracing::debug;

use crate::config::ZapDefaults;
use crate::errors::RestackError;
use crate::models::SessionId;

const MAX_PORT_ATTEMPTS: usize = 64;

/// Hands out host ports to concurrently running sessions.
///
/// A candidate is accepted only when no other live session holds it and a
/// bind test on 127.0.0.1 succeeds. The reservation lives as long as the
/// returned [`PortLease`].
#[derive(Clone)]
pub struct PortAllocator {
    preferred: u16,
    range: RangeInclusive<u16>,
    reserved: Arc<DashMap<u16, SessionId>>,
}

impl PortAllocator {
    pub fn new(preferred: u16, range: RangeInclusive<u16>) -> Self {
        Self { preferred, range, reserved: Arc::new(DashMap::new()) }
    }

    pub fn from_config(zap: &ZapDefaults) -> Self {
        Self::new(zap.preferred_port, zap.port_range_start..=zap.port_range_end)
    }

    pub fn reserve(&self, session: &SessionId) -> Result<PortLease, RestackError> {
        let mut rng = rand::thread_rng();
        for attempt in 0..MAX_PORT_ATTEMPTS {
            let candidate = if attempt == 0 {
                self.preferred
            } else {
                rng.gen_range(self.range.clone())
            };

            if let Entry::Vacant(slot) = self.reserved.entry(candidate) {
                if is_port_free(candidate) {
                    slot.insert(session.clone());
                    debug!(session_id = %session, port = candidate, attempt, "Reserved port");
                    return Ok(PortLease { port: candidate, reserved: self.reserved.clone() });
                }
            }
        }

        Err(RestackError::Container(format!(
            "No free port found for session {} after {} attempts",
            session, MAX_PORT_ATTEMPTS
        )))
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }
}

fn is_port_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// A reserved port, released when dropped.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    reserved: Arc<DashMap<u16, SessionId>>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.reserved.remove(&self.port);
    }
}
