use std::sync::Arc;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use wwanmux_channel::{LoopbackConfig, LoopbackTransport};
use wwanmux_core::{
    CollectingHost, DeviceStats, MuxConfig, MuxError, RootDevice, SessionSnapshot, TxStatus,
};
use wwanmux_frame::{tag_to_session, LinkFrame, MacAddr, PayloadClass, ETH_HLEN};

use crate::cmd::SimulateArgs;
use crate::exit::{io_error, mux_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{
    new_table, print_device_pretty, print_json, schema_id, sessions_table, OutputFormat,
};

type SimDevice = RootDevice<Arc<LoopbackTransport>, Arc<CollectingHost>>;

/// A scripted run against the loopback modem.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub config: MuxConfig,
    pub loopback: LoopbackConfig,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Add {
        tag: u16,
    },
    Remove {
        tag: u16,
    },
    Transmit {
        tag: u16,
        payload: Payload,
        #[serde(default)]
        in_band: bool,
    },
    Receive {
        session_id: u32,
        payload: Payload,
        #[serde(default)]
        control: bool,
    },
    FlowControl {
        session_id: u32,
        engage: bool,
    },
    /// Complete every queued uplink payload of `tag`.
    Drain {
        tag: u16,
    },
    Mtu {
        mtu: usize,
    },
    Open,
    Stop,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Add { .. } => "add",
            Step::Remove { .. } => "remove",
            Step::Transmit { .. } => "transmit",
            Step::Receive { .. } => "receive",
            Step::FlowControl { .. } => "flow_control",
            Step::Drain { .. } => "drain",
            Step::Mtu { .. } => "mtu",
            Step::Open => "open",
            Step::Stop => "stop",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Hex(String),
    Text(String),
}

impl Payload {
    fn to_bytes(&self) -> Result<Vec<u8>, String> {
        match self {
            Payload::Text(text) => Ok(text.as_bytes().to_vec()),
            Payload::Hex(digits) => {
                let compact: String = digits.split_whitespace().collect();
                hex::decode(compact).map_err(|err| format!("invalid hex: {err}"))
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct StepOutcome {
    index: usize,
    op: &'static str,
    ok: bool,
    result: String,
}

#[derive(Serialize)]
struct SimulateOutput {
    schema_id: String,
    device: DeviceStats,
    sessions: Vec<SessionSnapshot>,
    steps: Vec<StepOutcome>,
    delivered: usize,
    failed_steps: usize,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = std::fs::read_to_string(&args.scenario)
        .map_err(|err| io_error(&format!("read {}", args.scenario.display()), err))?;
    let scenario: Scenario = serde_json::from_str(&raw)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid scenario: {err}")))?;

    let transport = Arc::new(LoopbackTransport::with_config(scenario.loopback.clone()));
    let host = Arc::new(CollectingHost::new());
    let device = RootDevice::init(Arc::clone(&transport), Arc::clone(&host), scenario.config)
        .map_err(|err| mux_error("device init failed", err))?;

    let flow = device.flow_handle();
    transport.set_backpressure_hook(Arc::new(move |session_id, engage| {
        if let Err(err) = flow.set_flow_control(session_id, engage) {
            tracing::debug!(session_id, engage, error = %err, "backpressure for unbound session");
        }
    }));
    device
        .open()
        .map_err(|err| mux_error("device open failed", err))?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = run_step(&device, step);
        tracing::debug!(index, op = step.name(), ?outcome, "step");
        match outcome {
            Ok(result) => steps.push(StepOutcome {
                index,
                op: step.name(),
                ok: true,
                result,
            }),
            Err(StepError::Mux(err)) if args.strict => {
                return Err(mux_error(&format!("step {index} ({})", step.name()), err));
            }
            Err(StepError::Payload(msg)) if args.strict => {
                return Err(CliError::new(
                    DATA_INVALID,
                    format!("step {index} ({}): {msg}", step.name()),
                ));
            }
            Err(err) => steps.push(StepOutcome {
                index,
                op: step.name(),
                ok: false,
                result: err.to_string(),
            }),
        }
    }

    let failed_steps = steps.iter().filter(|s| !s.ok).count();
    let out = SimulateOutput {
        schema_id: schema_id("simulation-report"),
        device: device.stats(),
        sessions: device.sessions(),
        steps,
        delivered: host.take_frames().len(),
        failed_steps,
    };
    device.deinit();

    print_report(&out, format);
    Ok(SUCCESS)
}

#[derive(Debug)]
enum StepError {
    Mux(MuxError),
    Payload(String),
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepError::Mux(err) => write!(f, "{err}"),
            StepError::Payload(msg) => write!(f, "bad payload: {msg}"),
        }
    }
}

impl From<MuxError> for StepError {
    fn from(err: MuxError) -> Self {
        StepError::Mux(err)
    }
}

fn run_step(device: &SimDevice, step: &Step) -> Result<String, StepError> {
    match step {
        Step::Add { tag } => {
            let channel = device.add_session(*tag)?;
            Ok(format!("channel {channel}"))
        }
        Step::Remove { tag } => {
            device.remove_session(*tag)?;
            Ok("removed".to_string())
        }
        Step::Transmit {
            tag,
            payload,
            in_band,
        } => {
            let payload = payload.to_bytes().map_err(StepError::Payload)?;
            let frame = host_frame(device.mac_address(), *tag, *in_band, &payload);
            let status = match device.transmit(frame)? {
                TxStatus::Sent => "sent".to_string(),
                TxStatus::Busy(frame) => format!("busy ({} bytes returned)", frame.len()),
                TxStatus::Discarded => "discarded".to_string(),
            };
            Ok(status)
        }
        Step::Receive {
            session_id,
            payload,
            control,
        } => {
            let payload = payload.to_bytes().map_err(StepError::Payload)?;
            let mut buf = BytesMut::zeroed(ETH_HLEN);
            buf.extend_from_slice(&payload);
            device.receive(*session_id, buf, *control)?;
            Ok("delivered".to_string())
        }
        Step::FlowControl { session_id, engage } => {
            device.set_flow_control(*session_id, *engage)?;
            Ok(if *engage { "stopped" } else { "started" }.to_string())
        }
        Step::Drain { tag } => {
            let entry = device
                .registry()
                .lookup(*tag)
                .ok_or(MuxError::UnknownSession(*tag))?;
            let drained = device.transport().drain(entry.session.channel());
            if let Some(session_id) = tag_to_session(*tag) {
                for payload in &drained {
                    device.update_stats(session_id, payload.len() as u64, true)?;
                }
            }
            Ok(format!("{} payloads completed", drained.len()))
        }
        Step::Mtu { mtu } => {
            device.change_mtu(*mtu)?;
            Ok(format!("mtu {mtu}"))
        }
        Step::Open => {
            device.open()?;
            Ok("up".to_string())
        }
        Step::Stop => {
            device.stop();
            Ok("down".to_string())
        }
    }
}

/// Frame as the host stack would hand it down: addressed to the modem peer,
/// ethertype taken from the payload.
fn host_frame(mac: MacAddr, tag: u16, in_band: bool, payload: &[u8]) -> LinkFrame {
    let ethertype = PayloadClass::sniff(payload).ethertype();
    let peer = mac.with_low_bit_flipped();
    if in_band {
        LinkFrame::vlan_in_band(tag, peer, mac, ethertype, payload)
    } else {
        LinkFrame::ethernet(tag, peer, mac, ethertype, payload)
    }
}

fn print_report(out: &SimulateOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut steps = new_table(vec!["#", "OP", "OK", "RESULT"]);
            for step in &out.steps {
                steps.add_row(vec![
                    step.index.to_string(),
                    step.op.to_string(),
                    step.ok.to_string(),
                    step.result.clone(),
                ]);
            }
            println!("{steps}");
            println!("{}", sessions_table(&out.sessions));
        }
        OutputFormat::Pretty => {
            print_device_pretty(&out.device);
            println!("  Delivered: {}", out.delivered);
            for step in &out.steps {
                let mark = if step.ok { "ok " } else { "ERR" };
                println!("  [{mark}] {:>3} {:<12} {}", step.index, step.op, step.result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_device() -> SimDevice {
        let transport = Arc::new(LoopbackTransport::with_config(LoopbackConfig {
            max_channels: 16,
            queue_depth: Some(2),
        }));
        let device =
            RootDevice::init(transport, Arc::new(CollectingHost::new()), MuxConfig::default())
                .unwrap();
        device.open().unwrap();
        device
    }

    #[test]
    fn decodes_hex_with_spaces() {
        let hex = |digits: &str| Payload::Hex(digits.to_string()).to_bytes();
        assert_eq!(hex("45 00 0a").unwrap(), vec![0x45, 0x00, 0x0a]);
        assert_eq!(hex("4500\n0a").unwrap(), vec![0x45, 0x00, 0x0a]);
        assert!(hex("450").unwrap_err().starts_with("invalid hex"));
        assert!(hex("zz").is_err());
    }

    #[test]
    fn parses_scenario() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "config": {"max_sessions": 2},
                "steps": [
                    {"op": "add", "tag": 1},
                    {"op": "transmit", "tag": 1, "payload": {"hex": "4500"}, "in_band": true},
                    {"op": "receive", "session_id": 0, "payload": {"text": "hi"}, "control": true},
                    {"op": "flow_control", "session_id": 0, "engage": true},
                    {"op": "stop"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(scenario.config.max_sessions, 2);
        assert_eq!(scenario.steps.len(), 5);
        assert!(matches!(
            scenario.steps[1],
            Step::Transmit { in_band: true, .. }
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<Scenario>(r#"{"stepz": []}"#).is_err());
    }

    #[test]
    fn transmit_and_drain_count_tx() {
        let device = sim_device();
        run_step(&device, &Step::Add { tag: 1 }).unwrap();
        let sent = run_step(
            &device,
            &Step::Transmit {
                tag: 1,
                payload: Payload::Hex("45000014".to_string()),
                in_band: false,
            },
        )
        .unwrap();
        assert_eq!(sent, "sent");

        let drained = run_step(&device, &Step::Drain { tag: 1 }).unwrap();
        assert_eq!(drained, "1 payloads completed");
        let stats = device.session_stats(1).unwrap().stats;
        assert_eq!((stats.tx_packets, stats.tx_bytes), (1, 4));
    }

    #[test]
    fn mismatch_is_reported() {
        let device = sim_device();
        run_step(&device, &Step::Add { tag: 257 }).unwrap();
        let err = run_step(
            &device,
            &Step::Transmit {
                tag: 257,
                payload: Payload::Hex("4500".to_string()),
                in_band: false,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StepError::Mux(MuxError::ProtocolMismatch { tag: 257, .. })
        ));
    }
}
