//! Freshness check and the bounded start/handshake probe.
//!
//! A board is fresh while its last heartbeat is at most `inactivity_threshold_ms` old.
//! A stale board is probed: up to `max_retries` start requests, each followed by a
//! polling window of `attempt_window_ms`. The first window that sees a heartbeat younger
//! than `response_freshness_ms` ends the probe; exhausting every attempt declares the board
//! dead. Worst-case blocking is `max_retries * attempt_window_ms`.

use crate::{Clock, NodeError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const INACTIVITY_THRESHOLD_MS: u64 = 2000;
pub const MAX_RETRIES: u32 = 8;
pub const ATTEMPT_WINDOW_MS: u64 = 50;
pub const POLL_INTERVAL_MS: u64 = 1;
pub const RESPONSE_FRESHNESS_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub inactivity_threshold_ms: u64,
    pub max_retries: u32,
    pub attempt_window_ms: u64,
    pub poll_interval_ms: u64,
    pub response_freshness_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_ms: INACTIVITY_THRESHOLD_MS,
            max_retries: MAX_RETRIES,
            attempt_window_ms: ATTEMPT_WINDOW_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            response_freshness_ms: RESPONSE_FRESHNESS_MS,
        }
    }
}

impl LivenessConfig {
    /// Upper bound on how long one probe may block.
    pub fn worst_case_ms(&self) -> u64 {
        u64::from(self.max_retries) * self.attempt_window_ms
    }
}

/// Where a board sits in the freshness/probe cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Fresh,
    /// Never heard from, or silent for longer than the inactivity threshold.
    #[default]
    Stale,
    /// Start requests are going out; held only for the duration of a probe.
    Probing,
    /// The last probe exhausted every attempt.
    Dead,
}

/// `Fresh` or `Stale` from the heartbeat timestamp alone.
pub fn freshness(last_update_ms: Option<u64>, now_ms: u64, threshold_ms: u64) -> Liveness {
    match last_update_ms {
        Some(last) if now_ms.saturating_sub(last) <= threshold_ms => Liveness::Fresh,
        _ => Liveness::Stale,
    }
}

/// Cancels an in-progress probe from another thread. Checked between polls.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The two things a probe needs from the rest of the system.
pub trait ProbeLink {
    /// Send one start request to the board. The first call of a probe moves the board to
    /// [`Liveness::Probing`].
    fn send_start(&mut self) -> Result<()>;

    /// Process whatever arrived on the bus, then report the board's heartbeat timestamp.
    fn poll(&mut self) -> Result<Option<u64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Fresh without probing; no bus traffic was generated.
    AlreadyFresh,
    /// The board answered during attempt `attempt` (1-based).
    Recovered { attempt: u32 },
    /// Every attempt timed out.
    Unresponsive { attempts: u32 },
}

impl ProbeOutcome {
    pub fn is_alive(&self) -> bool {
        !matches!(self, ProbeOutcome::Unresponsive { .. })
    }

    pub fn state(&self) -> Liveness {
        if self.is_alive() {
            Liveness::Fresh
        } else {
            Liveness::Dead
        }
    }
}

/// Run the freshness check and, if stale, the bounded probe.
pub fn ensure_fresh<L, C>(
    link: &mut L,
    last_update_ms: Option<u64>,
    clock: &C,
    cfg: &LivenessConfig,
    cancel: Option<&CancelFlag>,
) -> Result<ProbeOutcome>
where
    L: ProbeLink + ?Sized,
    C: Clock + ?Sized,
{
    if freshness(last_update_ms, clock.now_ms(), cfg.inactivity_threshold_ms) == Liveness::Fresh {
        return Ok(ProbeOutcome::AlreadyFresh);
    }
    probe(link, clock, cfg, cancel)
}

/// Probe unconditionally: the `Probing` state.
pub fn probe<L, C>(
    link: &mut L,
    clock: &C,
    cfg: &LivenessConfig,
    cancel: Option<&CancelFlag>,
) -> Result<ProbeOutcome>
where
    L: ProbeLink + ?Sized,
    C: Clock + ?Sized,
{
    let interval = cfg.poll_interval_ms.max(1);
    for attempt in 1..=cfg.max_retries {
        link.send_start()?;
        let started = clock.now_ms();
        while clock.now_ms().saturating_sub(started) < cfg.attempt_window_ms {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return Err(NodeError::Cancelled);
            }
            let last = link.poll()?;
            let now = clock.now_ms();
            if last.is_some_and(|t| now.saturating_sub(t) < cfg.response_freshness_ms) {
                tracing::debug!(attempt, waited_ms = now - started, "probe answered");
                return Ok(ProbeOutcome::Recovered { attempt });
            }
            clock.delay_ms(interval);
        }
        tracing::trace!(attempt, "probe attempt timed out");
    }
    Ok(ProbeOutcome::Unresponsive {
        attempts: cfg.max_retries,
    })
}
