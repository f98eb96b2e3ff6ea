use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Bus and liveness counters for one controller.
#[derive(Clone)]
pub struct NodeMetrics {
    pub registry: Registry,
    pub rx_frames: IntCounter,
    pub tx_frames: IntCounter,
    pub tx_suppressed: IntCounter,
    pub unknown_commands: IntCounter,
    pub probe_attempts: IntCounter,
    pub boards_registered: IntGauge,
    pub boards_dead: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let rx_frames = IntCounter::new("node_rx_frames", "Status frames received")?;
        let tx_frames = IntCounter::new("node_tx_frames", "Command frames sent")?;
        let tx_suppressed = IntCounter::new(
            "node_tx_suppressed",
            "Servo writes skipped because the angle was already commanded",
        )?;
        let unknown_commands =
            IntCounter::new("node_unknown_commands", "Inbound frames with an unknown opcode")?;
        let probe_attempts =
            IntCounter::new("node_probe_attempts", "Start requests sent while probing")?;
        let boards_registered =
            IntGauge::new("node_boards_registered", "Number of node boards registered")?;
        let boards_dead = IntGauge::new("node_boards_dead", "Boards whose last probe failed")?;

        registry.register(Box::new(rx_frames.clone()))?;
        registry.register(Box::new(tx_frames.clone()))?;
        registry.register(Box::new(tx_suppressed.clone()))?;
        registry.register(Box::new(unknown_commands.clone()))?;
        registry.register(Box::new(probe_attempts.clone()))?;
        registry.register(Box::new(boards_registered.clone()))?;
        registry.register(Box::new(boards_dead.clone()))?;

        Ok(Self {
            registry,
            rx_frames,
            tx_frames,
            tx_suppressed,
            unknown_commands,
            probe_attempts,
            boards_registered,
            boards_dead,
        })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_exposition_lists_counters() -> anyhow::Result<()> {
        let m = NodeMetrics::new()?;
        m.tx_frames.inc();
        m.boards_registered.set(2);
        let text = m.encode_text();
        assert!(text.contains("node_tx_frames 1"));
        assert!(text.contains("node_boards_registered 2"));
        Ok(())
    }
}
