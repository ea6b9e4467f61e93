use clap::{App, Arg};
use satcore::executive::ExecutiveState;
use satcore::tasks::{AdcsReading, GpsMessage, GpsTime};
use satcore::{logging, FileStore, FlightConfig, FlightExecutive, SystemClock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::Sender;
use tokio::time;
use tracing::{error, info, warn};

const ADCS_PERIOD_MS: u64 = 100;
const GPS_PERIOD_MS: u64 = 200;
const ADCS_DAMPING: f32 = 0.97;
const MS_PER_WEEK: u32 = 604_800_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("satcore-fsw")
        .version("0.1.0")
        .about("🛰️  Flight software executive with simulated devices")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("store")
                .short("s")
                .long("store")
                .value_name("FILE")
                .help("Non-volatile store image, overrides the configured path")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("cycles")
                .short("n")
                .long("cycles")
                .value_name("COUNT")
                .help("Stop after this many control cycles (default: run until Ctrl+C)")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("cycle count must be a number".into()),
                }),
        )
        .arg(
            Arg::with_name("json")
                .long("json")
                .help("Print the final executive state as JSON"),
        )
        .get_matches();

    logging::init();

    let mut config = match matches.value_of("config") {
        Some(path) => FlightConfig::from_file(path)?,
        None => FlightConfig::default(),
    };
    if let Some(path) = matches.value_of("store") {
        config.store.path = path.into();
    }
    let cycles = matches.value_of("cycles").and_then(|v| v.parse::<u64>().ok());

    println!("🛰️  Satcore Flight Software");
    println!("===========================");

    let store = FileStore::open(&config.store.path)?;
    let (mut executive, links) = FlightExecutive::new(&config, Box::new(store), SystemClock::new())?;
    info!(
        "🚀 Executive started in {:?} (boot #{})",
        executive.context().mode(),
        executive.context().boot_record().boot_count
    );

    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(simulate_adcs(links.adcs, Arc::clone(&running)));
    tokio::spawn(simulate_gps(links.gps, Arc::clone(&running)));
    tokio::spawn(forward_console(links.console_requests));

    let mut downlink_rx = links.downlink;
    tokio::spawn(async move {
        while let Some(frame) = downlink_rx.recv().await {
            info!(
                "📡 DOWNLINK #{}: {} packets, {} bytes",
                frame.downlink_no,
                frame.packets.len(),
                frame.len_bytes()
            );
        }
    });

    let mut console_rx = links.console_responses;
    tokio::spawn(async move {
        while let Some(response) = console_rx.recv().await {
            println!("{response}");
        }
    });

    let signal_flag = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Shutdown requested");
            signal_flag.store(false, Ordering::Relaxed);
        }
    });

    let loop_flag = Arc::clone(&running);
    let state: ExecutiveState = tokio::task::spawn_blocking(move || {
        let mut remaining = cycles;
        while loop_flag.load(Ordering::Relaxed) {
            if remaining == Some(0) {
                break;
            }
            executive.run_cycle();
            remaining = remaining.map(|n| n - 1);
        }
        loop_flag.store(false, Ordering::Relaxed);
        executive.get_state()
    })
    .await
    .map_err(|e| {
        error!("❌ Executive thread failed: {}", e);
        e
    })?;

    if matches.is_present("json") {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!(
            "✅ {} cycles, mode {:?} ({:?}), {} overruns",
            state.cycles, state.status.mode, state.status.hold_reason, state.scheduler.overruns
        );
    }
    println!("🚀 Flight software stopped");

    Ok(())
}

/// Attitude box that reports a slowly damped tumble.
async fn simulate_adcs(tx: Sender<AdcsReading>, running: Arc<AtomicBool>) {
    let mut interval = time::interval(Duration::from_millis(ADCS_PERIOD_MS));
    let mut w_body = [0.35f32, -0.25, 0.1];

    while running.load(Ordering::Relaxed) {
        interval.tick().await;
        let reading = AdcsReading {
            w_body,
            functional: true,
        };
        if tx.try_send(reading).is_err() {
            warn!("ADCS queue full, reading dropped");
        }
        for w in &mut w_body {
            *w *= ADCS_DAMPING;
        }
    }
}

async fn simulate_gps(tx: Sender<GpsMessage>, running: Arc<AtomicBool>) {
    let mut interval = time::interval(Duration::from_millis(GPS_PERIOD_MS));
    let mut time = GpsTime {
        wn: 2_300,
        tow: 0,
        ns: 0,
    };

    while running.load(Ordering::Relaxed) {
        interval.tick().await;
        time.tow = (time.tow + GPS_PERIOD_MS as u32) % MS_PER_WEEK;

        let messages = [
            GpsMessage::Heartbeat { healthy: true },
            GpsMessage::Time(time),
            GpsMessage::Position {
                ecef: [6_778_137.0, 0.0, 0.0],
                tow: time.tow,
                nsats: 9,
            },
            GpsMessage::Velocity {
                ecef: [0.0, 7_668.0, 0.0],
                tow: time.tow,
            },
        ];
        for message in messages {
            if tx.try_send(message).is_err() {
                warn!("GPS queue full, message dropped");
                break;
            }
        }
    }
}

/// Forwards stdin lines to the debug console.
async fn forward_console(tx: Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        if tx.send(line).await.is_err() {
            break;
        }
    }
}
