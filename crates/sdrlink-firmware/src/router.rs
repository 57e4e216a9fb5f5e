//! Data-port router.
//!
//! The host opens a receive stream by sending any non-empty datagram to
//! one of the four receive data ports. The router binds that flow to the
//! port's DSP lane: it resolves the host's link address and programs the
//! sample framer so outbound sample packets travel back to the sender.
//!
//! When the host goes away, the network stack reports the next sample
//! packet as destination-unreachable. The router then halts the lane
//! immediately, superseding any scheduled stop.

use std::net::SocketAddrV4;

use sdrlink_core::hal::{Board, Framer, FramerConfig, NetStack, RegisterBus};
use sdrlink_wire::ports::rx_port_to_lane;
use sdrlink_wire::regs::{
    RX_CMD_HALT, RX_CTRL_CMD, RX_CTRL_TIME_SECS, RX_CTRL_TIME_TICKS, rx_ctrl_addr,
};

/// What the router did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The lane was halted after a destination-unreachable report.
    Halted {
        /// Lane index.
        lane: usize,
    },
    /// The lane's framer was programmed for the sender.
    Bound {
        /// Lane index.
        lane: usize,
    },
    /// The sender's link address was not in the ARP cache.
    ArpMiss {
        /// Lane index.
        lane: usize,
    },
    /// Not a receive data port, or an empty datagram.
    Ignored,
}

/// Stateless router for the receive data ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataRouter;

impl DataRouter {
    /// Handle one event on a data port.
    ///
    /// `payload == None` is a destination-unreachable report for a packet
    /// we sent from `source`. Otherwise it is a datagram from `source` to
    /// our `destination`.
    pub fn handle(
        &self,
        board: &mut dyn Board,
        source: SocketAddrV4,
        destination: SocketAddrV4,
        payload: Option<&[u8]>,
    ) -> RouteOutcome {
        match payload {
            None => match rx_port_to_lane(source.port()) {
                Some(lane) => {
                    self.halt_lane(board, lane);
                    tracing::info!(lane, peer = %destination, "Peer unreachable, receive lane halted");
                    RouteOutcome::Halted { lane }
                }
                None => RouteOutcome::Ignored,
            },
            Some([]) => {
                tracing::debug!(%source, %destination, "Empty datagram on data port");
                RouteOutcome::Ignored
            }
            Some(_) => match rx_port_to_lane(destination.port()) {
                Some(lane) => self.bind_lane(board, source, destination, lane),
                None => RouteOutcome::Ignored,
            },
        }
    }

    /// Stop a receive lane now: halt command, zero time, latch.
    pub fn halt_lane(&self, board: &mut dyn Board, lane: usize) {
        let (Some(cmd), Some(secs), Some(ticks)) = (
            rx_ctrl_addr(lane, RX_CTRL_CMD),
            rx_ctrl_addr(lane, RX_CTRL_TIME_SECS),
            rx_ctrl_addr(lane, RX_CTRL_TIME_TICKS),
        ) else {
            tracing::warn!(lane, "No receive control bank for lane");
            return;
        };
        board.poke32(cmd, RX_CMD_HALT);
        board.poke32(secs, 0);
        // Writing the tick register latches the command.
        board.poke32(ticks, 0);
    }

    /// Program the framer on `lane` to send samples back to `source`.
    pub fn bind_lane(
        &self,
        board: &mut dyn Board,
        source: SocketAddrV4,
        destination: SocketAddrV4,
        lane: usize,
    ) -> RouteOutcome {
        let Some(peer_mac) = board.arp_lookup(*source.ip()) else {
            tracing::warn!(lane, peer = %source, "No ARP entry for peer, lane not bound");
            return RouteOutcome::ArpMiss { lane };
        };

        let config = FramerConfig {
            peer_mac,
            own_mac: board.mac_addr(),
            device: destination,
            peer: source,
            lane,
        };
        board.setup_framer(&config);

        tracing::debug!(lane, peer = %source, peer_mac = %peer_mac, "Receive lane bound");
        RouteOutcome::Bound { lane }
    }
}
