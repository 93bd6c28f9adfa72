//! # Action Windows
//!
//! Groups one player's glove IMU stream into fixed-size windows, one per
//! candidate action, and mutes the stream for a cooldown after each window:
//!
//! ```text
//!   WaitingForAction ──first IMU──▶ SendingAction ──packets_per_action──▶ Cooldown
//!          ▲                                                                │
//!          └─────────────────────── cooldown_period elapsed ───────────────┘
//! ```
//!
//! Sans-I/O: the caller feeds readings in and forwards the windows this
//! returns. Time comes from a `quanta::Clock` so tests can drive it.

use std::fmt;
use std::time::Duration;

use bluno_wire::payload::ImuPacket;
use quanta::{Clock, Instant};

use crate::config::TimingConfig;

/// Where the relay is in its window cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuRelayState {
    WaitingForAction,
    SendingAction,
    /// Readings are dropped until the cooldown elapses.
    Cooldown,
}

/// A complete window of IMU readings for one action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionWindow {
    pub player_id: u8,
    pub packets: Vec<ImuPacket>,
}

impl fmt::Display for ActionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ActionWindow(playerID={}, packets={}) [",
            self.player_id,
            self.packets.len()
        )?;
        for (i, p) in self.packets.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{:?} {:?}", p.accel, p.gyro)?;
        }
        f.write_str("]")
    }
}

pub struct ImuRelay {
    player_id: u8,
    state: ImuRelayState,
    window: Vec<ImuPacket>,
    packets_per_action: usize,
    cooldown_period: Duration,
    clock: Clock,
    cooldown_since: Option<Instant>,
    dropped: u64,
}

impl ImuRelay {
    pub fn new(player_id: u8, timing: &TimingConfig) -> Self {
        Self::with_clock(player_id, timing, Clock::new())
    }

    /// Use an explicit clock, e.g. `Clock::mock()` in tests.
    pub fn with_clock(player_id: u8, timing: &TimingConfig, clock: Clock) -> Self {
        let packets_per_action = timing.packets_per_action.max(1);
        ImuRelay {
            player_id,
            state: ImuRelayState::WaitingForAction,
            window: Vec::with_capacity(packets_per_action),
            packets_per_action,
            cooldown_period: timing.cooldown_period,
            clock,
            cooldown_since: None,
            dropped: 0,
        }
    }

    pub fn state(&self) -> ImuRelayState {
        self.state
    }

    /// Readings collected towards the current window.
    pub fn pending(&self) -> usize {
        self.window.len()
    }

    /// Readings dropped during cooldowns so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Leave the cooldown once it has elapsed. Call periodically.
    pub fn poll(&mut self) {
        if self.state != ImuRelayState::Cooldown {
            return;
        }
        let Some(since) = self.cooldown_since else {
            return;
        };
        if self.clock.now().duration_since(since) >= self.cooldown_period {
            tracing::debug!(player = self.player_id, "cooldown over, waiting for action");
            self.state = ImuRelayState::WaitingForAction;
            self.cooldown_since = None;
        }
    }

    /// Feed one glove reading. Returns the window it completes, if any.
    /// Readings for another player are ignored.
    pub fn on_imu(&mut self, imu: &ImuPacket) -> Option<ActionWindow> {
        if imu.player_id != self.player_id {
            return None;
        }
        self.poll();
        match self.state {
            ImuRelayState::Cooldown => {
                self.dropped += 1;
                None
            }
            ImuRelayState::WaitingForAction | ImuRelayState::SendingAction => {
                self.state = ImuRelayState::SendingAction;
                self.window.push(*imu);
                if self.window.len() < self.packets_per_action {
                    return None;
                }
                let packets = std::mem::replace(
                    &mut self.window,
                    Vec::with_capacity(self.packets_per_action),
                );
                self.state = ImuRelayState::Cooldown;
                self.cooldown_since = Some(self.clock.now());
                tracing::debug!(
                    player = self.player_id,
                    packets = packets.len(),
                    "action window complete"
                );
                Some(ActionWindow {
                    player_id: self.player_id,
                    packets,
                })
            }
        }
    }

    /// Discard a partial window and return to waiting.
    pub fn reset(&mut self) {
        self.state = ImuRelayState::WaitingForAction;
        self.window.clear();
        self.cooldown_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mocked(
        packets_per_action: usize,
        cooldown: Duration,
    ) -> (ImuRelay, std::sync::Arc<quanta::Mock>) {
        let (clock, mock) = Clock::mock();
        let timing = TimingConfig {
            packets_per_action,
            cooldown_period: cooldown,
            ..TimingConfig::default()
        };
        (ImuRelay::with_clock(1, &timing, clock), mock)
    }

    fn reading(player_id: u8, x: i16) -> ImuPacket {
        ImuPacket::from_raw(player_id, [x, 0, 0, 0, 0, 0])
    }

    #[test]
    fn collects_a_full_window() {
        let (mut relay, _mock) = mocked(3, Duration::from_secs(3));
        assert_eq!(relay.state(), ImuRelayState::WaitingForAction);

        assert_eq!(relay.on_imu(&reading(1, 1)), None);
        assert_eq!(relay.state(), ImuRelayState::SendingAction);
        assert_eq!(relay.on_imu(&reading(1, 2)), None);
        assert_eq!(relay.pending(), 2);

        let window = relay.on_imu(&reading(1, 3)).unwrap();
        assert_eq!(window.player_id, 1);
        assert_eq!(window.packets, vec![reading(1, 1), reading(1, 2), reading(1, 3)]);
        assert_eq!(relay.state(), ImuRelayState::Cooldown);
        assert_eq!(relay.pending(), 0);
    }

    #[test]
    fn drops_readings_during_cooldown() {
        let (mut relay, mock) = mocked(2, Duration::from_secs(3));
        relay.on_imu(&reading(1, 1));
        assert!(relay.on_imu(&reading(1, 2)).is_some());

        mock.increment(Duration::from_secs(1));
        assert_eq!(relay.on_imu(&reading(1, 3)), None);
        assert_eq!(relay.on_imu(&reading(1, 4)), None);
        assert_eq!(relay.dropped(), 2);
        assert_eq!(relay.state(), ImuRelayState::Cooldown);

        mock.increment(Duration::from_secs(2));
        relay.poll();
        assert_eq!(relay.state(), ImuRelayState::WaitingForAction);
        assert_eq!(relay.on_imu(&reading(1, 5)), None);
        assert_eq!(relay.pending(), 1);
    }

    #[test]
    fn reading_after_cooldown_starts_next_window() {
        let (mut relay, mock) = mocked(1, Duration::from_millis(500));
        assert!(relay.on_imu(&reading(1, 1)).is_some());
        mock.increment(Duration::from_millis(600));
        let window = relay.on_imu(&reading(1, 2)).unwrap();
        assert_eq!(window.packets, vec![reading(1, 2)]);
    }

    #[test]
    fn zero_cooldown_windows_back_to_back() {
        let (mut relay, _mock) = mocked(2, Duration::ZERO);
        let windows = (0..5).filter_map(|x| relay.on_imu(&reading(1, x))).count();
        assert_eq!(windows, 2);
        assert_eq!(relay.pending(), 1);
        assert_eq!(relay.dropped(), 0);
    }

    #[test]
    fn ignores_other_players() {
        let (mut relay, _mock) = mocked(1, Duration::ZERO);
        assert_eq!(relay.on_imu(&reading(2, 1)), None);
        assert_eq!(relay.state(), ImuRelayState::WaitingForAction);
    }

    #[test]
    fn reset_discards_partial_window() {
        let (mut relay, _mock) = mocked(3, Duration::ZERO);
        relay.on_imu(&reading(1, 1));
        relay.reset();
        assert_eq!(relay.pending(), 0);
        assert_eq!(relay.state(), ImuRelayState::WaitingForAction);
    }

    #[test]
    fn display_summarises_window() {
        let window = ActionWindow {
            player_id: 2,
            packets: vec![ImuPacket::from_raw(2, [16384, 0, 0, 131, 0, 0])],
        };
        assert_eq!(
            window.to_string(),
            "ActionWindow(playerID=2, packets=1) [[1.0, 0.0, 0.0] [1.0, 0.0, 0.0]]"
        );
    }
}
