//! In-memory register interface.
//!
//! [`MockRegisterIface`] implements [`RegisterIface`] over a register map.
//! Every poke is logged in order so tests can assert the exact write
//! sequence a DSP proxy produced.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::RegisterIface;

#[derive(Debug, Default)]
struct State {
    regs: HashMap<u32, u32>,
    pokes: Vec<(u32, u32)>,
}

/// A [`RegisterIface`] backed by an in-memory register map.
#[derive(Debug)]
pub struct MockRegisterIface {
    state: Mutex<State>,
    connected: AtomicBool,
}

impl MockRegisterIface {
    /// An empty, connected register interface.
    pub fn new() -> Self {
        MockRegisterIface {
            state: Mutex::new(State::default()),
            connected: AtomicBool::new(true),
        }
    }

    /// Preload a register without logging a poke.
    pub fn set(&self, addr: u32, value: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.regs.insert(addr, value);
        }
    }

    /// Current value of a register (0 if never written).
    pub fn value(&self, addr: u32) -> u32 {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.regs.get(&addr).copied())
            .unwrap_or(0)
    }

    /// Every poke so far, in order, as `(addr, value)`.
    pub fn pokes(&self) -> Vec<(u32, u32)> {
        self.state
            .lock()
            .map(|s| s.pokes.clone())
            .unwrap_or_default()
    }

    /// Pokes to one address, in order.
    pub fn pokes_to(&self, addr: u32) -> Vec<u32> {
        self.pokes()
            .into_iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, v)| v)
            .collect()
    }

    /// Forget the poke log, keeping register values.
    pub fn clear_log(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.pokes.clear();
        }
    }

    /// Set the connected state.
    ///
    /// When `false`, every access returns [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

impl Default for MockRegisterIface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegisterIface for MockRegisterIface {
    async fn poke32(&self, addr: u32, value: u32) -> Result<()> {
        self.check_connected()?;
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Transport("register map poisoned".into()))?;
        state.regs.insert(addr, value);
        state.pokes.push((addr, value));
        Ok(())
    }

    async fn peek32(&self, addr: u32) -> Result<u32> {
        self.check_connected()?;
        Ok(self.value(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poke_is_logged() {
        let regs = MockRegisterIface::new();
        regs.poke32(0x10, 1).await.unwrap();
        regs.poke32(0x14, 2).await.unwrap();
        regs.poke32(0x10, 3).await.unwrap();
        assert_eq!(regs.pokes(), vec![(0x10, 1), (0x14, 2), (0x10, 3)]);
        assert_eq!(regs.pokes_to(0x10), vec![1, 3]);
        assert_eq!(regs.peek32(0x10).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn disconnected_fails() {
        let regs = MockRegisterIface::new();
        regs.set_connected(false);
        assert!(matches!(regs.poke32(0, 0).await, Err(Error::NotConnected)));
        assert!(matches!(regs.peek32(0).await, Err(Error::NotConnected)));
    }
}
