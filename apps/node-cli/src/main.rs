use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, warn};

use can_transport as can;
use can_transport::CanBus;
use node_board::opcode::{
    MEASURE_CONTINUOUS, SENSORS_GROUP_1, SENSORS_GROUP_2, SENSORS_GROUP_3, SWITCH_ON,
};
use node_board::{
    AddressTable, NodeConfig, NodeController, NodeError, Slot, SystemClock, ANALOG_COUNT,
};

#[derive(Parser, Debug)]
#[command(
    name = "node",
    version,
    about = "Node board bus tool",
    disable_help_subcommand = true
)]
struct Cli {
    /// YAML config (address layout, liveness timing)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the slot → bus identifier table
    Addresses,
    /// Decode one status frame into a board and print its state
    Decode {
        /// Board slot the frame came from
        #[arg(long, default_value_t = 0)]
        slot: Slot,
        /// Payload bytes as hex, space-separated (e.g., "06 01 02 00 05 00 09 00")
        #[arg(long, value_delimiter = ' ')]
        data: Vec<String>,
    },
    /// Show which servo frames a sequence of angles produces
    Servo {
        #[arg(long, default_value_t = 0)]
        slot: Slot,
        #[arg(long, default_value_t = 0)]
        servo: u8,
        /// Angles in degrees, space-separated
        #[arg(long, value_delimiter = ' ')]
        degrees: Vec<u16>,
    },
    /// Run the start handshake against simulated boards on a mock bus
    Simulate {
        /// Number of boards to register
        #[arg(long, default_value_t = 2)]
        boards: usize,
        /// Slots that never answer
        #[arg(long, value_delimiter = ' ')]
        silent: Vec<Slot>,
        /// Print board snapshots as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
        /// Print every frame the host sent
        #[arg(long, action = ArgAction::SetTrue)]
        trace: bool,
        /// Print prometheus metrics at the end
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Sweep all servos of simulated boards from 0 to 180 degrees
    Sweep {
        #[arg(long, default_value_t = 1)]
        boards: usize,
        #[arg(long, default_value_t = 5)]
        step: u16,
        #[arg(long, default_value_t = 100)]
        dwell_ms: u64,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => node_board::load_config_file(path)?,
        None => NodeConfig::default(),
    };

    match cli.command {
        Commands::Addresses => addresses(&config),
        Commands::Decode { slot, data } => decode(&config, slot, &data),
        Commands::Servo {
            slot,
            servo,
            degrees,
        } => self::servo(&config, slot, servo, &degrees),
        Commands::Simulate {
            boards,
            silent,
            json,
            trace,
            metrics,
        } => simulate(&config, boards, &silent, json, trace, metrics),
        Commands::Sweep {
            boards,
            step,
            dwell_ms,
        } => sweep(&config, boards, step, dwell_ms),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn addresses(config: &NodeConfig) -> Result<()> {
    let table = config.address_table()?;
    println!("slot\tinbound\toutbound");
    for (slot, pair) in table.iter() {
        println!("{slot}\t0x{:03X}\t0x{:03X}", pair.inbound, pair.outbound);
    }
    for (a, b) in table.collisions() {
        println!("warning: slots {a} and {b} share a bus identifier");
    }
    Ok(())
}

fn decode(config: &NodeConfig, slot: Slot, data_hex: &[String]) -> Result<()> {
    let bytes = parse_hex_bytes(data_hex)?;
    let mut ctrl = NodeController::new(can::MockBus::open("mock0")?, SystemClock::new(), config)?;
    register_boards(&mut ctrl, boards_through(slot)?)?;
    let status = ctrl.registry().board(slot)?.address.outbound_id()?;
    let frame = can::CanFrame::new(status, &bytes)
        .ok_or_else(|| anyhow::anyhow!("invalid frame length: {}", bytes.len()))?;
    print_frame(&frame);
    ctrl.bus_mut().push_inbound(frame);
    ctrl.poll()?;
    for err in ctrl.registry().errors() {
        println!("error: {}", err.message);
    }
    let snaps = ctrl.snapshots();
    let snap = snaps
        .get(slot)
        .ok_or_else(|| anyhow::anyhow!("node{slot} not registered"))?;
    println!("{}", serde_json::to_string_pretty(snap)?);
    Ok(())
}

fn servo(config: &NodeConfig, slot: Slot, servo: u8, degrees: &[u16]) -> Result<()> {
    let mut ctrl = NodeController::new(can::MockBus::open("mock0")?, SystemClock::new(), config)?;
    register_boards(&mut ctrl, boards_through(slot)?)?;
    for &deg in degrees {
        let before = ctrl.bus().sent().len();
        if ctrl.servo_write(servo, deg, slot)? {
            if let Some(frame) = ctrl.bus().sent().get(before) {
                print_frame(frame);
            }
        } else {
            println!("{deg}\tsuppressed (already commanded)");
        }
    }
    Ok(())
}

fn simulate(
    config: &NodeConfig,
    boards: usize,
    silent: &[Slot],
    json: bool,
    trace: bool,
    metrics: bool,
) -> Result<()> {
    let table = config.address_table()?;
    let bus = simulated_bus(&table, boards, silent)?;
    let mut ctrl = NodeController::new(bus, SystemClock::new(), config)?;
    register_boards(&mut ctrl, boards)?;

    for slot in 0..boards {
        match ctrl.started(slot) {
            Ok(outcome) => println!("node{slot}: started ({outcome:?})"),
            Err(NodeError::BoardUnresponsive(_)) => println!("node{slot}: dead"),
            Err(e) => return Err(e).with_context(|| format!("probing node{slot}")),
        }
    }
    // Pick up the switch events that followed the heartbeats
    ctrl.poll()?;
    for slot in 0..boards {
        println!("node{slot}: {:?}", ctrl.liveness(slot)?);
    }

    println!("{}", ctrl.dump());
    println!("{}", ctrl.readings_line());
    if json {
        println!("{}", serde_json::to_string_pretty(&ctrl.snapshots())?);
    }
    if trace {
        for frame in ctrl.bus().sent() {
            print_frame(frame);
        }
    }
    if metrics {
        print!("{}", ctrl.metrics().encode_text());
    }
    Ok(())
}

fn sweep(config: &NodeConfig, boards: usize, step: u16, dwell_ms: u64) -> Result<()> {
    let table = config.address_table()?;
    let bus = simulated_bus(&table, boards, &[])?;
    let mut ctrl = NodeController::new(bus, SystemClock::new(), config)?;
    register_boards(&mut ctrl, boards)?;
    for slot in 0..boards {
        match ctrl.started(slot) {
            Ok(_) => {}
            Err(NodeError::BoardUnresponsive(_)) => {
                warn!(slot, "board did not start; it will not move")
            }
            Err(e) => return Err(e).with_context(|| format!("probing node{slot}")),
        }
    }
    let sent = ctrl.servo_sweep(step, dwell_ms)?;
    println!("sweep: {sent} servo frames sent");
    Ok(())
}

/// Number of boards to register so that `slot` exists.
fn boards_through(slot: Slot) -> Result<usize> {
    slot.checked_add(1)
        .ok_or_else(|| anyhow::anyhow!("slot {slot} is out of range"))
}

fn register_boards<B: CanBus>(ctrl: &mut NodeController<B, SystemClock>, count: usize) -> Result<()> {
    for i in 0..count {
        ctrl.register(&format!("node{i}"))
            .with_context(|| format!("registering node{i}"))?;
    }
    Ok(())
}

/// Mock bus whose far end behaves like `boards` node boards: each non-silent board answers a
/// start request with a full sensor cycle followed by a switch event.
fn simulated_bus(table: &AddressTable, boards: usize, silent: &[Slot]) -> Result<can::MockBus> {
    let mut sims = Vec::with_capacity(boards);
    for slot in 0..boards {
        let pair = table.address_for(slot)?;
        sims.push((pair.inbound, pair.outbound_id()?, slot));
    }
    let silent = silent.to_vec();
    info!(boards, ?silent, "simulated node bus");
    Ok(can::MockBus::with_responder(
        "mock0",
        Box::new(move |sent: &can::CanFrame| {
            if sent.opcode() != Some(MEASURE_CONTINUOUS) {
                return Vec::new();
            }
            let Some(&(_, status, slot)) = sims
                .iter()
                .find(|(inbound, _, _)| u32::from(*inbound) == sent.id.raw())
            else {
                return Vec::new();
            };
            if silent.contains(&slot) {
                return Vec::new();
            }
            sensor_cycle(status, slot)
        }),
    ))
}

fn sensor_cycle(status: can::CanId, slot: Slot) -> Vec<can::CanFrame> {
    let base = (slot as u16 + 1) * 100;
    let mut values = [0u16; ANALOG_COUNT];
    for (i, v) in values.iter_mut().enumerate() {
        *v = base + i as u16;
    }
    let mut out = Vec::new();
    for (opcode, chunk) in [SENSORS_GROUP_1, SENSORS_GROUP_2, SENSORS_GROUP_3]
        .into_iter()
        .zip(values.chunks(3))
    {
        let mut data = vec![opcode];
        for v in chunk {
            data.extend_from_slice(&v.to_be_bytes());
        }
        data.push(0);
        out.extend(can::CanFrame::new(status, &data));
    }
    let switch = (slot % node_board::SWITCH_COUNT) as u8;
    out.extend(can::CanFrame::new(status, &[SWITCH_ON, (switch << 1) | 1]));
    out
}

fn parse_hex_bytes(items: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(items.len());
    for s in items {
        let t = s.trim();
        if t.is_empty() {
            continue;
        }
        let no_prefix = t.strip_prefix("0x").unwrap_or(t);
        let b = u8::from_str_radix(no_prefix, 16)
            .map_err(|e| anyhow::anyhow!("invalid hex byte '{t}': {e}"))?;
        out.push(b);
    }
    Ok(out)
}

fn print_frame(f: &can::CanFrame) {
    let ts = f
        .timestamp
        .map(|t| {
            t.0.format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default()
        })
        .unwrap_or_default();
    let name = f
        .opcode()
        .map(node_board::opcode::command_name)
        .unwrap_or_default();
    println!("{f}\t{name}\t{ts}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_at_usize_max_is_an_error() -> Result<()> {
        assert_eq!(boards_through(0)?, 1);
        assert_eq!(boards_through(7)?, 8);
        assert!(boards_through(usize::MAX).is_err());
        Ok(())
    }

    #[test]
    fn hex_bytes_accept_prefixes_and_blanks() -> Result<()> {
        let items = ["0x06", "01", "", "ff"].map(String::from);
        assert_eq!(parse_hex_bytes(&items)?, vec![0x06, 0x01, 0xFF]);
        assert!(parse_hex_bytes(&["zz".to_string()]).is_err());
        Ok(())
    }
}
