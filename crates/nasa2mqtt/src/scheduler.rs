//! Poll scheduler
//!
//! Issues read requests for the configured poll targets and tracks them
//! until a response arrives. Each target moves through
//!
//! ```text
//! Idle -> Awaiting -> Idle            (response received)
//!                  -> Awaiting (retry) ... -> Stale
//! Stale -> Awaiting                    (after one full poll interval)
//! ```
//!
//! The scheduler never performs I/O. It returns [`PollRequest`]s carrying
//! encoded frames for the bridge service to write; response correlation
//! happens when the service reports decoded responses via
//! [`PollScheduler::on_response`].

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::codec::{Address, Command, DataType, Frame, MessageNumber, MessageSet};
use crate::config::{PollConfig, PollTarget};
use crate::error::BridgeError;

/// Why a request exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    /// Periodic read of a poll target
    Poll,
    /// Command received over MQTT
    Command,
}

/// A frame the bridge should write to the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub address: Address,
    pub message: MessageNumber,
    /// 1 for the first transmission, incremented per retry
    pub attempt: u32,
    pub frame: Frame,
}

/// A request that ran out of retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTimeout {
    pub address: Address,
    pub message: MessageNumber,
    /// Total transmissions made
    pub attempts: u32,
    pub origin: RequestOrigin,
}

impl From<RequestTimeout> for BridgeError {
    fn from(t: RequestTimeout) -> Self {
        BridgeError::RequestTimeout {
            address: t.address.to_string(),
            message: t.message.to_string(),
            attempts: t.attempts,
        }
    }
}

/// State of one poll target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Idle,
    Awaiting { sent_at: Instant, attempts: u32 },
    Stale { since: Instant },
}

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Read requests emitted, retries included
    pub requests_sent: u64,
    /// Retransmissions
    pub retries: u64,
    /// Responses matched to a pending request
    pub responses: u64,
    /// Requests that exhausted their retries
    pub timeouts: u64,
}

#[derive(Debug, Clone, Copy)]
struct PendingCommand {
    sent_at: Instant,
}

/// Periodic read scheduler with retry and stale tracking
#[derive(Debug)]
pub struct PollScheduler {
    interval: Duration,
    response_timeout: Duration,
    max_retries: u32,
    targets: Vec<(PollTarget, PairState)>,
    commands: HashMap<(Address, MessageNumber), PendingCommand>,
    packet_number: u8,
    stats: SchedulerStats,
}

impl PollScheduler {
    /// Create a scheduler from poll configuration
    pub fn new(config: &PollConfig) -> Self {
        let mut targets: Vec<(PollTarget, PairState)> = Vec::with_capacity(config.targets.len());
        for target in &config.targets {
            if targets.iter().any(|(t, _)| t == target) {
                continue;
            }
            targets.push((*target, PairState::Idle));
        }

        Self {
            interval: config.interval,
            response_timeout: config.response_timeout,
            max_retries: config.max_retries,
            targets,
            commands: HashMap::new(),
            packet_number: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Next rolling packet number
    pub fn next_packet_number(&mut self) -> u8 {
        self.packet_number = self.packet_number.wrapping_add(1);
        self.packet_number
    }

    /// Start a poll round
    ///
    /// Emits a read request for every target that is idle, or stale for at
    /// least one full interval. Targets still awaiting a response are left
    /// alone.
    pub fn tick(&mut self, now: Instant) -> Vec<PollRequest> {
        let mut out = Vec::new();
        for i in 0..self.targets.len() {
            let (target, state) = self.targets[i];
            let due = match state {
                PairState::Idle => true,
                PairState::Awaiting { .. } => false,
                PairState::Stale { since } => now.saturating_duration_since(since) >= self.interval,
            };
            if !due {
                continue;
            }
            let request = self.read_request(target, 1);
            self.targets[i].1 = PairState::Awaiting {
                sent_at: now,
                attempts: 1,
            };
            out.push(request);
        }
        if !out.is_empty() {
            debug!(requests = out.len(), "Poll round");
        }
        out
    }

    /// Handle response timeouts
    ///
    /// Targets whose response is overdue are retried until `max_retries`
    /// retries have been sent, then marked stale. Overdue command requests
    /// are never retried.
    pub fn expire(&mut self, now: Instant) -> (Vec<PollRequest>, Vec<RequestTimeout>) {
        let mut retries = Vec::new();
        let mut timeouts = Vec::new();

        for i in 0..self.targets.len() {
            let (target, state) = self.targets[i];
            let PairState::Awaiting { sent_at, attempts } = state else {
                continue;
            };
            if now.saturating_duration_since(sent_at) < self.response_timeout {
                continue;
            }

            if attempts <= self.max_retries {
                let request = self.read_request(target, attempts + 1);
                self.targets[i].1 = PairState::Awaiting {
                    sent_at: now,
                    attempts: attempts + 1,
                };
                self.stats.retries += 1;
                debug!(
                    address = %target.address,
                    message = %target.message,
                    attempt = attempts + 1,
                    "Retrying read request"
                );
                retries.push(request);
            } else {
                self.targets[i].1 = PairState::Stale { since: now };
                self.stats.timeouts += 1;
                warn!(
                    address = %target.address,
                    message = %target.message,
                    attempts,
                    "No response, marking stale"
                );
                timeouts.push(RequestTimeout {
                    address: target.address,
                    message: target.message,
                    attempts,
                    origin: RequestOrigin::Poll,
                });
            }
        }

        let timeout = self.response_timeout;
        let expired: Vec<(Address, MessageNumber)> = self
            .commands
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.sent_at) >= timeout)
            .map(|(key, _)| *key)
            .collect();
        for (address, message) in expired {
            self.commands.remove(&(address, message));
            self.stats.timeouts += 1;
            warn!(%address, %message, "Command not acknowledged");
            timeouts.push(RequestTimeout {
                address,
                message,
                attempts: 1,
                origin: RequestOrigin::Command,
            });
        }

        (retries, timeouts)
    }

    /// Resolve a pending request; returns true if one matched
    pub fn on_response(&mut self, address: Address, message: MessageNumber) -> bool {
        let mut matched = self.commands.remove(&(address, message)).is_some();

        for (target, state) in self.targets.iter_mut() {
            if target.address == address && target.message == message {
                if matches!(state, PairState::Awaiting { .. }) {
                    matched = true;
                }
                *state = PairState::Idle;
            }
        }

        if matched {
            self.stats.responses += 1;
        }
        matched
    }

    /// Track a command sent on behalf of MQTT
    pub fn track_command(&mut self, address: Address, message: MessageNumber, now: Instant) {
        self.commands
            .insert((address, message), PendingCommand { sent_at: now });
    }

    /// Drop every pending request without retry; returns how many were pending
    pub fn abandon_all(&mut self) -> usize {
        let mut abandoned = self.commands.len();
        self.commands.clear();
        for (_, state) in self.targets.iter_mut() {
            if matches!(state, PairState::Awaiting { .. }) {
                abandoned += 1;
                *state = PairState::Idle;
            }
        }
        abandoned
    }

    /// Number of requests awaiting a response
    pub fn pending_count(&self) -> usize {
        self.commands.len()
            + self
                .targets
                .iter()
                .filter(|(_, s)| matches!(s, PairState::Awaiting { .. }))
                .count()
    }

    /// Current state of a poll target
    pub fn state_of(&self, address: Address, message: MessageNumber) -> Option<PairState> {
        self.targets
            .iter()
            .find(|(t, _)| t.address == address && t.message == message)
            .map(|(_, s)| *s)
    }

    /// Scheduler statistics
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    fn read_request(&mut self, target: PollTarget, attempt: u32) -> PollRequest {
        let mut command = Command::normal(DataType::Read, self.next_packet_number());
        command.retry_count = attempt.saturating_sub(1).min(3) as u8;
        self.stats.requests_sent += 1;
        PollRequest {
            address: target.address,
            message: target.message,
            attempt,
            frame: Frame::new(
                Address::bridge(),
                target.address,
                command,
                vec![MessageSet::zero(target.message)],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AddressClass, MessageValue};

    const ROOM_TEMP: MessageNumber = MessageNumber(0x4203);

    fn indoor() -> Address {
        Address::new(AddressClass::Indoor, 0x00, 0x00)
    }

    fn config() -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(30),
            response_timeout: Duration::from_secs(2),
            max_retries: 3,
            targets: vec![PollTarget {
                address: indoor(),
                message: ROOM_TEMP,
            }],
        }
    }

    #[test]
    fn test_tick_emits_read_request() {
        let mut scheduler = PollScheduler::new(&config());
        let requests = scheduler.tick(Instant::now());
        assert_eq!(requests.len(), 1);

        let frame = &requests[0].frame;
        assert_eq!(frame.source, Address::bridge());
        assert_eq!(frame.destination, indoor());
        assert_eq!(frame.command.data_type, DataType::Read);
        assert_eq!(frame.messages[0].number, ROOM_TEMP);
        assert_eq!(frame.messages[0].value, MessageValue::Variable(0));
    }

    #[test]
    fn test_no_duplicate_while_awaiting() {
        let mut scheduler = PollScheduler::new(&config());
        let now = Instant::now();
        assert_eq!(scheduler.tick(now).len(), 1);
        assert!(scheduler.tick(now + Duration::from_secs(1)).is_empty());
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_response_returns_to_idle() {
        let mut scheduler = PollScheduler::new(&config());
        let now = Instant::now();
        scheduler.tick(now);
        assert!(scheduler.on_response(indoor(), ROOM_TEMP));
        assert_eq!(scheduler.state_of(indoor(), ROOM_TEMP), Some(PairState::Idle));
        assert_eq!(scheduler.tick(now + Duration::from_secs(30)).len(), 1);
    }

    #[test]
    fn test_retry_then_stale() {
        let mut scheduler = PollScheduler::new(&config());
        let mut now = Instant::now();
        scheduler.tick(now);

        let mut retries = 0;
        loop {
            now += Duration::from_secs(2);
            let (sent, timeouts) = scheduler.expire(now);
            retries += sent.len();
            if !timeouts.is_empty() {
                assert_eq!(timeouts[0].attempts, 4);
                assert_eq!(timeouts[0].origin, RequestOrigin::Poll);
                break;
            }
        }
        assert_eq!(retries, 3);
        assert!(matches!(
            scheduler.state_of(indoor(), ROOM_TEMP),
            Some(PairState::Stale { .. })
        ));

        // nothing more until a full interval has passed
        now += Duration::from_secs(2);
        assert_eq!(scheduler.expire(now), (vec![], vec![]));
        assert!(scheduler.tick(now).is_empty());
        assert_eq!(scheduler.tick(now + Duration::from_secs(30)).len(), 1);
    }

    #[test]
    fn test_retry_carries_retry_count() {
        let mut scheduler = PollScheduler::new(&config());
        let now = Instant::now();
        let first = scheduler.tick(now);
        let (retries, _) = scheduler.expire(now + Duration::from_secs(2));
        assert_eq!(retries[0].attempt, 2);
        assert_eq!(retries[0].frame.command.retry_count, 1);
        assert_ne!(
            retries[0].frame.command.packet_number,
            first[0].frame.command.packet_number
        );
    }

    #[test]
    fn test_command_not_retried() {
        let mut scheduler = PollScheduler::new(&PollConfig::default());
        let now = Instant::now();
        scheduler.track_command(indoor(), MessageNumber(0x4000), now);
        assert_eq!(scheduler.pending_count(), 1);

        let (retries, timeouts) = scheduler.expire(now + Duration::from_secs(3));
        assert!(retries.is_empty());
        assert_eq!(timeouts.len(), 1);
        assert_eq!(timeouts[0].origin, RequestOrigin::Command);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_abandon_all() {
        let mut scheduler = PollScheduler::new(&config());
        let now = Instant::now();
        scheduler.tick(now);
        scheduler.track_command(indoor(), MessageNumber(0x4000), now);
        assert_eq!(scheduler.abandon_all(), 2);
        assert_eq!(scheduler.pending_count(), 0);
        let (retries, timeouts) = scheduler.expire(now + Duration::from_secs(10));
        assert!(retries.is_empty() && timeouts.is_empty());
    }
}
