//! Non-owning index of live streamers, keyed by DSP.
//!
//! The application owns its streamers. The registry only keeps a [`Weak`]
//! handle to each streamer's rate state so the device can push rate changes
//! to whichever streamers are still alive. Updating a dropped streamer is
//! a no-op.

use std::sync::{Arc, Mutex, Weak};

use crate::streamer::StreamerRates;

/// Weak handles to the rate state of the current streamer on each DSP.
#[derive(Debug, Default)]
pub struct StreamerRegistry {
    rx: Mutex<Vec<Weak<StreamerRates>>>,
    tx: Mutex<Vec<Weak<StreamerRates>>>,
}

fn slots(num: usize) -> Mutex<Vec<Weak<StreamerRates>>> {
    Mutex::new((0..num).map(|_| Weak::new()).collect())
}

fn live(list: &Mutex<Vec<Weak<StreamerRates>>>, dsp: usize) -> Option<Arc<StreamerRates>> {
    list.lock().ok()?.get(dsp)?.upgrade()
}

fn store(list: &Mutex<Vec<Weak<StreamerRates>>>, dsp: usize, rates: &Arc<StreamerRates>) {
    if let Ok(mut list) = list.lock() {
        if list.len() <= dsp {
            list.resize_with(dsp + 1, Weak::new);
        }
        list[dsp] = Arc::downgrade(rates);
    }
}

impl StreamerRegistry {
    /// A registry with room for `num_rx` receive and `num_tx` transmit DSPs.
    pub fn new(num_rx: usize, num_tx: usize) -> Self {
        StreamerRegistry {
            rx: slots(num_rx),
            tx: slots(num_tx),
        }
    }

    /// Record the receive streamer for `dsp`, replacing any earlier one.
    pub fn register_rx(&self, dsp: usize, rates: &Arc<StreamerRates>) {
        store(&self.rx, dsp, rates);
    }

    /// Record the transmit streamer for `dsp`, replacing any earlier one.
    pub fn register_tx(&self, dsp: usize, rates: &Arc<StreamerRates>) {
        store(&self.tx, dsp, rates);
    }

    /// Rate state of the receive streamer on `dsp`, if it is still alive.
    pub fn rx_streamer(&self, dsp: usize) -> Option<Arc<StreamerRates>> {
        live(&self.rx, dsp)
    }

    /// Rate state of the transmit streamer on `dsp`, if it is still alive.
    pub fn tx_streamer(&self, dsp: usize) -> Option<Arc<StreamerRates>> {
        live(&self.tx, dsp)
    }

    /// Push a tick rate to every live streamer.
    pub fn update_tick_rate(&self, rate: f64) {
        for list in [&self.rx, &self.tx] {
            let Ok(list) = list.lock() else { continue };
            for rates in list.iter().filter_map(Weak::upgrade) {
                rates.set_tick_rate(rate);
            }
        }
    }

    /// Push a sample rate and scale factor to the receive streamer for
    /// `dsp`. Returns false if none is alive.
    pub fn update_rx_samp_rate(&self, dsp: usize, rate: f64, scale: f64) -> bool {
        let Some(rates) = self.rx_streamer(dsp) else {
            return false;
        };
        rates.set_samp_rate(rate);
        rates.set_scale_factor(scale);
        true
    }

    /// Push a sample rate to the transmit streamer for `dsp`. Returns false
    /// if none is alive.
    pub fn update_tx_samp_rate(&self, dsp: usize, rate: f64) -> bool {
        let Some(rates) = self.tx_streamer(dsp) else {
            return false;
        };
        rates.set_samp_rate(rate);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_reach_live_streamers() {
        let registry = StreamerRegistry::new(2, 1);
        let rx = StreamerRates::new();
        let tx = StreamerRates::new();
        registry.register_rx(1, &rx);
        registry.register_tx(0, &tx);

        registry.update_tick_rate(64e6);
        assert_eq!(rx.tick_rate(), 64e6);
        assert_eq!(tx.tick_rate(), 64e6);

        assert!(registry.update_rx_samp_rate(1, 1e6, 0.75));
        assert_eq!(rx.samp_rate(), 1e6);
        assert_eq!(rx.scale_factor(), 0.75);
        assert!(!registry.update_rx_samp_rate(0, 1e6, 1.0));
    }

    #[test]
    fn dropped_streamer_is_a_no_op() {
        let registry = StreamerRegistry::new(1, 1);
        let rx = StreamerRates::new();
        registry.register_rx(0, &rx);
        drop(rx);

        assert!(registry.rx_streamer(0).is_none());
        assert!(!registry.update_rx_samp_rate(0, 1e6, 1.0));
        registry.update_tick_rate(1.0);
    }

    #[test]
    fn out_of_range_dsp_grows() {
        let registry = StreamerRegistry::new(0, 0);
        let tx = StreamerRates::new();
        registry.register_tx(3, &tx);
        assert!(registry.update_tx_samp_rate(3, 2e6));
        assert_eq!(tx.samp_rate(), 2e6);
        assert!(!registry.update_tx_samp_rate(9, 2e6));
    }
}
