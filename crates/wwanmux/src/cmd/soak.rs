use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use serde::Serialize;
use wwanmux_channel::{LoopbackConfig, LoopbackTransport, RESERVED_CHANNELS};
use wwanmux_core::{CollectingHost, DeviceStats, MuxConfig, MuxError, RootDevice, TxStatus};
use wwanmux_frame::{LinkFrame, DATA_TAG_END, ETH_HLEN, ETH_P_IP};

use crate::cmd::SoakArgs;
use crate::exit::{
    io_error, mux_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{new_table, print_device_pretty, print_json, schema_id, OutputFormat};

type SoakDevice = RootDevice<Arc<LoopbackTransport>, Arc<CollectingHost>>;

const HOST_BACKLOG: usize = 1024;

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    busy: AtomicU64,
    rejected: AtomicU64,
    received: AtomicU64,
    completed: AtomicU64,
    churn_cycles: AtomicU64,
    unexpected: AtomicU64,
}

#[derive(Serialize)]
struct SoakReport {
    schema_id: String,
    sessions: u16,
    frames_requested: u64,
    sent: u64,
    busy: u64,
    rejected: u64,
    completed: u64,
    received: u64,
    churn_cycles: u64,
    unexpected: u64,
    interrupted: bool,
    elapsed_ms: u128,
    device: DeviceStats,
}

pub fn run(args: SoakArgs, format: OutputFormat) -> CliResult<i32> {
    if args.sessions == 0 || args.sessions > DATA_TAG_END {
        return Err(CliError::new(
            USAGE,
            format!("--sessions must be in 1..={DATA_TAG_END}"),
        ));
    }
    let timeout = parse_timeout(&args.timeout)?;

    let transport = Arc::new(LoopbackTransport::with_config(LoopbackConfig {
        max_channels: usize::from(args.sessions) + RESERVED_CHANNELS,
        queue_depth: None,
    }));
    let host = Arc::new(CollectingHost::with_limit(HOST_BACKLOG));
    let config = MuxConfig {
        max_sessions: usize::from(args.sessions),
        ..MuxConfig::default()
    };
    let device: Arc<SoakDevice> = Arc::new(
        RootDevice::init(Arc::clone(&transport), Arc::clone(&host), config)
            .map_err(|err| mux_error("device init failed", err))?,
    );

    let flow = device.flow_handle();
    transport.set_backpressure_hook(Arc::new(move |session_id, engage| {
        if let Err(err) = flow.set_flow_control(session_id, engage) {
            tracing::debug!(session_id, engage, error = %err, "backpressure for unbound session");
        }
    }));
    device
        .open()
        .map_err(|err| mux_error("device open failed", err))?;
    for tag in 1..=args.sessions {
        device
            .add_session(tag)
            .map_err(|err| mux_error("session setup failed", err))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let interrupted = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&running), Arc::clone(&interrupted))?;

    let counters = Arc::new(Counters::default());
    let started = Instant::now();

    let sender = spawn("soak-tx", {
        let device = Arc::clone(&device);
        let counters = Arc::clone(&counters);
        let running = Arc::clone(&running);
        let (sessions, frames) = (args.sessions, args.frames);
        move || send_frames(&device, &counters, &running, sessions, frames)
    })?;
    let workers = vec![
        spawn("soak-churn", {
            let device = Arc::clone(&device);
            let counters = Arc::clone(&counters);
            let running = Arc::clone(&running);
            let sessions = args.sessions;
            move || churn_sessions(&device, &counters, &running, sessions)
        })?,
        spawn("soak-drain", {
            let device = Arc::clone(&device);
            let counters = Arc::clone(&counters);
            let running = Arc::clone(&running);
            move || complete_uplink(&device, &counters, &running)
        })?,
        spawn("soak-rx", {
            let device = Arc::clone(&device);
            let counters = Arc::clone(&counters);
            let running = Arc::clone(&running);
            let sessions = args.sessions;
            move || receive_frames(&device, &counters, &running, sessions)
        })?,
    ];

    let mut timed_out = false;
    while !sender.is_finished() {
        if started.elapsed() >= timeout {
            timed_out = true;
            running.store(false, Ordering::SeqCst);
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    let mut panicked = sender.join().is_err();
    running.store(false, Ordering::SeqCst);
    for worker in workers {
        panicked |= worker.join().is_err();
    }
    if panicked {
        return Err(CliError::new(INTERNAL, "soak worker panicked"));
    }
    if timed_out {
        return Err(CliError::new(
            TIMEOUT,
            format!("soak did not finish within {timeout:?}"),
        ));
    }

    let report = SoakReport {
        schema_id: schema_id("soak-report"),
        sessions: args.sessions,
        frames_requested: args.frames,
        sent: counters.sent.load(Ordering::SeqCst),
        busy: counters.busy.load(Ordering::SeqCst),
        rejected: counters.rejected.load(Ordering::SeqCst),
        completed: counters.completed.load(Ordering::SeqCst),
        received: counters.received.load(Ordering::SeqCst),
        churn_cycles: counters.churn_cycles.load(Ordering::SeqCst),
        unexpected: counters.unexpected.load(Ordering::SeqCst),
        interrupted: interrupted.load(Ordering::SeqCst),
        elapsed_ms: started.elapsed().as_millis(),
        device: device.stats(),
    };
    print_report(&report, format);

    if report.unexpected > 0 {
        return Ok(FAILURE);
    }
    Ok(SUCCESS)
}

fn spawn<F>(name: &str, body: F) -> CliResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|err| io_error(&format!("spawn {name}"), err))
}

fn send_frames(
    device: &SoakDevice,
    counters: &Counters,
    running: &AtomicBool,
    sessions: u16,
    frames: u64,
) {
    let mac = device.mac_address();
    let payload = ipv4_packet();
    for i in 0..frames {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let tag = (i % u64::from(sessions)) as u16 + 1;
        let frame = LinkFrame::ethernet(tag, mac.with_low_bit_flipped(), mac, ETH_P_IP, &payload);
        match device.transmit(frame) {
            Ok(TxStatus::Sent) => {
                counters.sent.fetch_add(1, Ordering::Relaxed);
            }
            Ok(TxStatus::Busy(_)) => {
                counters.busy.fetch_add(1, Ordering::Relaxed);
            }
            // Sessions come and go underneath the sender.
            Err(MuxError::UnknownSession(_)) | Err(MuxError::Io { .. }) => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
            }
            other => {
                tracing::warn!(tag, result = ?other, "unexpected transmit result");
                counters.unexpected.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Repeatedly remove and re-add every odd IP session.
fn churn_sessions(device: &SoakDevice, counters: &Counters, running: &AtomicBool, sessions: u16) {
    while running.load(Ordering::SeqCst) {
        for tag in (1..=sessions).step_by(2) {
            let cycle = device
                .remove_session(tag)
                .and_then(|()| device.add_session(tag).map(|_| ()));
            if let Err(err) = cycle {
                tracing::warn!(tag, error = %err, "churn cycle failed");
                counters.unexpected.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        counters.churn_cycles.fetch_add(1, Ordering::Relaxed);
    }
}

/// Play the modem side of the uplink: take queued payloads off every open
/// channel and report them as transmitted.
fn complete_uplink(device: &SoakDevice, counters: &Counters, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        for (tag, channel) in device.transport().open_channels() {
            let session_id = u32::from(tag.saturating_sub(1));
            for payload in device.transport().drain(channel) {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                // The session may already be gone again.
                let _ = device.update_stats(session_id, payload.len() as u64, true);
            }
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn receive_frames(device: &SoakDevice, counters: &Counters, running: &AtomicBool, sessions: u16) {
    let packet = ipv4_packet();
    while running.load(Ordering::SeqCst) {
        for session_id in 0..u32::from(sessions) {
            let mut buf = BytesMut::zeroed(ETH_HLEN);
            buf.extend_from_slice(&packet);
            match device.receive(session_id, buf, false) {
                Ok(()) => {
                    counters.received.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    tracing::warn!(session_id, error = %err, "receive failed");
                    counters.unexpected.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        device.host().take_frames();
    }
}

/// Minimal IPv4 header (20 bytes, no payload).
fn ipv4_packet() -> Vec<u8> {
    let mut packet = vec![0u8; 20];
    packet[0] = 0x45;
    packet[3] = 20;
    packet[8] = 64;
    packet[9] = 17;
    packet
}

fn install_ctrlc_handler(running: Arc<AtomicBool>, interrupted: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        interrupted.store(true, Ordering::SeqCst);
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn print_report(report: &SoakReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = new_table(vec!["METRIC", "VALUE"]);
            for (name, value) in [
                ("sessions", u64::from(report.sessions)),
                ("frames requested", report.frames_requested),
                ("sent", report.sent),
                ("busy", report.busy),
                ("rejected", report.rejected),
                ("completed", report.completed),
                ("received", report.received),
                ("churn cycles", report.churn_cycles),
                ("unexpected", report.unexpected),
            ] {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            print_device_pretty(&report.device);
            println!(
                "Soak: sent={} busy={} rejected={} received={} churn={} unexpected={} ({} ms{})",
                report.sent,
                report.busy,
                report.rejected,
                report.received,
                report.churn_cycles,
                report.unexpected,
                report.elapsed_ms,
                if report.interrupted { ", interrupted" } else { "" }
            );
        }
    }
}

fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
