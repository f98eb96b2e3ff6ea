use crate::encode::{set_servo, start_request};
use crate::liveness::{
    ensure_fresh, freshness, CancelFlag, Liveness, LivenessConfig, ProbeLink, ProbeOutcome,
};
use crate::{
    BoardSnapshot, Clock, NodeConfig, NodeError, NodeMetrics, NodeRegistry, Result, Slot,
    ANALOG_COUNT, MAX_BOARDS, SERVO_COUNT, SWITCH_COUNT,
};
use can_transport::{CanBus, CanFilter, CanFrame, TransportError};

/// Upper bound on frames taken from the transport by one poll.
const DRAIN_LIMIT: usize = MAX_BOARDS * 4;

/// Host side of a node bus: the registry plus the transport and clock it runs on.
///
/// Everything runs on the caller's thread. The only call that blocks is the liveness
/// check ([`NodeController::started`]) and anything built on it.
pub struct NodeController<B, C> {
    bus: B,
    clock: C,
    registry: NodeRegistry,
    liveness: LivenessConfig,
    start_mode: u8,
    metrics: NodeMetrics,
    cancel: Option<CancelFlag>,
}

impl<B: CanBus, C: Clock> NodeController<B, C> {
    pub fn new(bus: B, clock: C, config: &NodeConfig) -> Result<Self> {
        Ok(Self {
            bus,
            clock,
            registry: NodeRegistry::new(config.address_table()?),
            liveness: config.liveness,
            start_mode: config.start_mode,
            metrics: NodeMetrics::new()?,
            cancel: None,
        })
    }

    /// Probes started after this honour `flag`.
    pub fn set_cancel_flag(&mut self, flag: CancelFlag) {
        self.cancel = Some(flag);
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    /// Register a board and tell the transport to accept its status identifier.
    ///
    /// The filters go in first; if the transport rejects them the slot stays free.
    pub fn register(&mut self, name: &str) -> Result<Slot> {
        // A full table is reported (and logged) by the registry itself
        let Ok(next) = self.registry.table().address_for(self.registry.len()) else {
            return self.registry.register(name);
        };
        let mut filters = Vec::with_capacity(self.registry.len() + 1);
        for (_, board) in self.registry.iter() {
            filters.push(CanFilter::exact(board.address.outbound_id()?));
        }
        filters.push(CanFilter::exact(next.outbound_id()?));
        match self.bus.set_filters(&filters) {
            Ok(()) => {}
            Err(TransportError::Unsupported(why)) => {
                tracing::debug!(why, "transport has no acceptance filters; relying on dispatch");
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "acceptance filters rejected; board not registered");
                return Err(e.into());
            }
        }

        let slot = self.registry.register(name)?;
        self.metrics.boards_registered.set(self.registry.len() as i64);
        Ok(slot)
    }

    /// Route the frames the transport has ready to their boards, at most `4 * MAX_BOARDS`
    /// per call.
    ///
    /// Returns the number of frames received.
    pub fn poll(&mut self) -> Result<usize> {
        pump(&mut self.bus, &mut self.registry, &self.metrics, &self.clock)
    }

    /// Send raw command bytes to a board's inbound identifier.
    pub fn send_to(&mut self, slot: Slot, data: &[u8]) -> Result<()> {
        let address = self.registry.board(slot)?.address;
        send(&mut self.bus, &self.metrics, address.inbound_id()?, data)
    }

    /// Make sure `slot` is streaming fresh data, probing it if needed.
    ///
    /// `Err(BoardUnresponsive)` means every start attempt went unanswered; the board is
    /// marked dead until a later call succeeds.
    pub fn started(&mut self, slot: Slot) -> Result<ProbeOutcome> {
        let last = self.registry.board(slot)?.state.last_update_ms;
        let Self {
            bus,
            clock,
            registry,
            liveness,
            start_mode,
            metrics,
            cancel,
        } = self;
        let mut link = Link {
            bus,
            registry,
            metrics,
            clock: &*clock,
            slot,
            start_mode: *start_mode,
        };
        let outcome = match ensure_fresh(&mut link, last, &*clock, liveness, cancel.as_ref()) {
            Ok(outcome) => outcome,
            Err(e) => {
                // An interrupted probe decides nothing
                let state = &mut self.registry.board_mut(slot)?.state;
                if state.liveness == Liveness::Probing {
                    state.liveness = Liveness::Stale;
                }
                return Err(e);
            }
        };

        let board = self.registry.board_mut(slot)?;
        board.state.alive = outcome.is_alive();
        board.state.liveness = outcome.state();
        match outcome {
            ProbeOutcome::AlreadyFresh => {}
            ProbeOutcome::Recovered { attempt } => {
                tracing::info!(slot, attempt, "node board started");
            }
            ProbeOutcome::Unresponsive { attempts } => {
                tracing::warn!(slot, attempts, "node board dead");
                let name = board.name.clone();
                self.registry.record(Some(slot), format!("{name} {slot} dead."));
            }
        }
        self.metrics
            .boards_dead
            .set(self.registry.dead_count() as i64);
        if outcome.is_alive() {
            Ok(outcome)
        } else {
            Err(NodeError::BoardUnresponsive(slot))
        }
    }

    /// Like [`started`](Self::started) but folds the outcome into a bool.
    pub fn is_started(&mut self, slot: Slot) -> bool {
        self.started(slot).is_ok()
    }

    /// Liveness of `slot` as of now, without touching the bus.
    ///
    /// `Dead` sticks until the next [`started`](Self::started) call; otherwise the heartbeat
    /// age decides between `Fresh` and `Stale`.
    pub fn liveness(&self, slot: Slot) -> Result<Liveness> {
        let state = &self.registry.board(slot)?.state;
        Ok(match state.liveness {
            Liveness::Dead | Liveness::Probing => state.liveness,
            Liveness::Fresh | Liveness::Stale => freshness(
                state.last_update_ms,
                self.clock.now_ms(),
                self.liveness.inactivity_threshold_ms,
            ),
        })
    }

    /// Last analog value of `channel`, without checking freshness.
    pub fn reading(&self, channel: usize, slot: Slot) -> Result<u16> {
        check_channel(channel, ANALOG_COUNT)?;
        Ok(self.registry.board(slot)?.state.readings[channel])
    }

    /// Analog value after a liveness check; 0 when the board is not started.
    pub fn fresh_reading(&mut self, channel: usize, slot: Slot) -> Result<u16> {
        check_channel(channel, ANALOG_COUNT)?;
        match self.started(slot) {
            Ok(_) => self.reading(channel, slot),
            Err(NodeError::BoardUnresponsive(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub fn switch_read(&self, channel: usize, slot: Slot) -> Result<bool> {
        check_channel(channel, SWITCH_COUNT)?;
        Ok(self.registry.board(slot)?.state.switches[channel])
    }

    /// Command `servo` of board `slot` to `degrees`. Returns whether a frame went out.
    pub fn servo_write(&mut self, servo: u8, degrees: u16, slot: Slot) -> Result<bool> {
        let board = self.registry.board_mut(slot)?;
        let address = board.address;
        match set_servo(&mut board.state, servo, degrees)? {
            Some(frame) => {
                send(&mut self.bus, &self.metrics, address.inbound_id()?, &frame)?;
                Ok(true)
            }
            None => {
                self.metrics.tx_suppressed.inc();
                Ok(false)
            }
        }
    }

    /// Sweep every servo of every alive board from 0 to 180 degrees in `step` increments,
    /// waiting `dwell_ms` after each step. Returns the number of frames sent.
    pub fn servo_sweep(&mut self, step: u16, dwell_ms: u64) -> Result<usize> {
        let step = usize::from(step.max(1));
        let alive = self.registry.alive_slots();
        let mut sent = 0;
        for degrees in (0..=180u16).step_by(step) {
            for &slot in &alive {
                for servo in 0..SERVO_COUNT as u8 {
                    if self.servo_write(servo, degrees, slot)? {
                        sent += 1;
                    }
                }
            }
            tracing::info!(degrees, "servo sweep");
            self.clock.delay_ms(dwell_ms);
        }
        Ok(sent)
    }

    /// One line with the analog and digital inputs of every alive board.
    pub fn dump(&self) -> String {
        self.registry
            .iter()
            .filter(|(_, b)| b.state.alive)
            .map(|(_, b)| b.state.to_string())
            .collect::<Vec<_>>()
            .join("| ")
    }

    /// Every analog value of every registered board.
    pub fn readings_line(&self) -> String {
        let mut line = String::from("Readings:");
        for (_, board) in self.registry.iter() {
            for r in &board.state.readings {
                line.push_str(&format!(" {r:3}"));
            }
        }
        line
    }

    pub fn snapshots(&self) -> Vec<BoardSnapshot> {
        self.registry.snapshots()
    }
}

fn check_channel(channel: usize, count: usize) -> Result<()> {
    if channel < count {
        Ok(())
    } else {
        Err(NodeError::ChannelOutOfRange { channel, count })
    }
}

fn send<B: CanBus>(
    bus: &mut B,
    metrics: &NodeMetrics,
    id: can_transport::CanId,
    data: &[u8],
) -> Result<()> {
    let frame = CanFrame::new(id, data).ok_or(TransportError::InvalidFrame("len"))?;
    bus.send(&frame)?;
    metrics.tx_frames.inc();
    Ok(())
}

fn pump<B: CanBus, C: Clock>(
    bus: &mut B,
    registry: &mut NodeRegistry,
    metrics: &NodeMetrics,
    clock: &C,
) -> Result<usize> {
    let mut received = 0;
    while received < DRAIN_LIMIT {
        let frame = match bus.recv(Some(0)) {
            Ok(frame) => frame,
            Err(e) if e.is_timeout() => break,
            Err(e) => return Err(e.into()),
        };
        received += 1;
        metrics.rx_frames.inc();
        // Decode failures are logged and recorded by the registry
        if let Err(NodeError::UnknownCommand(_)) = registry.dispatch(&frame, clock.now_ms()) {
            metrics.unknown_commands.inc();
        }
    }
    // REPORT_ALIVE can revive a dead board
    metrics.boards_dead.set(registry.dead_count() as i64);
    Ok(received)
}

/// Probe plumbing for one board: start requests out, every inbound frame through dispatch.
struct Link<'a, B, C> {
    bus: &'a mut B,
    registry: &'a mut NodeRegistry,
    metrics: &'a NodeMetrics,
    clock: &'a C,
    slot: Slot,
    start_mode: u8,
}

impl<B: CanBus, C: Clock> ProbeLink for Link<'_, B, C> {
    fn send_start(&mut self) -> Result<()> {
        let board = self.registry.board_mut(self.slot)?;
        board.state.liveness = Liveness::Probing;
        let id = board.address.inbound_id()?;
        send(self.bus, self.metrics, id, &start_request(self.start_mode))?;
        self.metrics.probe_attempts.inc();
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<u64>> {
        pump(self.bus, self.registry, self.metrics, self.clock)?;
        Ok(self.registry.board(self.slot)?.state.last_update_ms)
    }
}
