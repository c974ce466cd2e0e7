//! Stand-in for a robot bridge process
//!
//! Run with: cargo run --example emit_readings [COUNT]
//!
//! Writes COUNT (default 50) readings to stdout at 20 Hz, one JSON object per
//! line, with a log line mixed in every tenth reading and a diagnostic on
//! stderr. Useful as the external producer for `telemetry_tail`.

use std::io::Write;
use std::time::Duration;

use telemetry_hub::Reading;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let count: u64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 50,
    };

    eprintln!("emit_readings: sending {} readings", count);

    let mut stdout = std::io::stdout();
    let mut ticker = tokio::time::interval(Duration::from_millis(50));

    for i in 0..count {
        ticker.tick().await;

        let t = i as f64 * 0.05;
        let motors: Vec<f64> = (0..6).map(|j| 50.0 + 10.0 * j as f64 + t).collect();
        let reading = Reading::new(t, motors);

        writeln!(stdout, "{}", serde_json::to_string(&reading)?)?;
        if i % 10 == 9 {
            writeln!(stdout, "bridge: {} readings sent", i + 1)?;
        }
        stdout.flush()?;
    }

    Ok(())
}
