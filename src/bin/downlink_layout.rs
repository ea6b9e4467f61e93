use clap::{App, Arg};
use colored::*;
use satcore::protocol::UplinkLayout;
use satcore::telemetry::{DownlinkLayout, PACKET_PAYLOAD_BITS, PACKET_SIZE_BYTES};
use satcore::{FlightConfig, FlightExecutive, MemoryStore, SimulatedClock};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("satcore-layout")
        .version("0.1.0")
        .about("📏 Print the downlink packet layout and uplink index table")
        .arg(
            Arg::with_name("json")
                .long("json")
                .help("Print the layout as JSON"),
        )
        .get_matches();

    // Same registration pass as flight, so the layout matches bit for bit
    let (executive, _links) = FlightExecutive::new(
        &FlightConfig::default(),
        Box::new(MemoryStore::new()),
        SimulatedClock::new(),
    )?;
    let downlink = DownlinkLayout::new(executive.bus())?;
    let uplink = UplinkLayout::new(executive.bus());

    if matches.is_present("json") {
        let report = serde_json::json!({
            "profile": executive.profile().name,
            "packet_bytes": PACKET_SIZE_BYTES,
            "packets": downlink.packet_count(),
            "field_bits": downlink.field_bits(),
            "slots": downlink.slots(),
            "uplink_index_bits": uplink.index_bits(),
            "uplink_fields": uplink.field_names().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "📡 Downlink layout".bold());
    println!("{:<24} {:>6} {:>8} {:>6}", "FIELD", "PACKET", "OFFSET", "BITS");
    for slot in downlink.slots() {
        println!(
            "{:<24} {:>6} {:>8} {:>6}",
            slot.name.cyan(),
            slot.packet,
            slot.bit_offset,
            slot.bits
        );
    }

    let capacity = downlink.packet_count() * PACKET_PAYLOAD_BITS;
    let ratio = downlink.field_bits() as f32 / capacity as f32 * 100.0;
    println!();
    println!(
        "📏 {} fields, {} bits in {} packet(s) of {} bytes ({} bytes per frame)",
        downlink.slots().len(),
        downlink.field_bits(),
        downlink.packet_count(),
        PACKET_SIZE_BYTES,
        downlink.frame_bytes()
    );
    let fill = format!("{ratio:.1}%");
    if ratio > 90.0 {
        println!("📊 Payload fill: {}", fill.yellow());
    } else {
        println!("📊 Payload fill: {}", fill.green());
    }

    println!();
    println!("{}", "📨 Uplink index table".bold());
    println!("index width: {} bits", uplink.index_bits());
    for name in uplink.field_names() {
        let index = uplink.index_of(name).unwrap_or(0);
        println!("{:>4}  {}", index, name.cyan());
    }

    Ok(())
}
