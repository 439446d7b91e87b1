//! Active session handles
//!
//! Typed slots for the at-most-one live interface handle and the at-most-one
//! live transport sink. The interface slot is filled once per session; the
//! transport slot turns over on every reconnect. Slot reads hand out clones,
//! so a pump can keep using a handle that has since been cleared; the next
//! operation on a closed handle fails and the pump reacts to that.

use std::sync::{Arc, Mutex};

use crate::transport::FrameSink;
use crate::tun::PacketInterface;

#[derive(Default)]
pub struct SessionHandles {
    interface: Mutex<Option<Arc<dyn PacketInterface>>>,
    transport: Mutex<Option<Arc<dyn FrameSink>>>,
}

impl SessionHandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_interface(&self, iface: Arc<dyn PacketInterface>) {
        *self.interface.lock().unwrap() = Some(iface);
    }

    pub fn interface(&self) -> Option<Arc<dyn PacketInterface>> {
        self.interface.lock().unwrap().clone()
    }

    pub fn clear_interface(&self) {
        *self.interface.lock().unwrap() = None;
    }

    pub fn set_transport(&self, sink: Arc<dyn FrameSink>) {
        *self.transport.lock().unwrap() = Some(sink);
    }

    pub fn transport(&self) -> Option<Arc<dyn FrameSink>> {
        self.transport.lock().unwrap().clone()
    }

    pub fn clear_transport(&self) {
        *self.transport.lock().unwrap() = None;
    }
}
