//! Tail the telemetry stream to stdout
//!
//! Run with: cargo run --example telemetry_tail [-- COMMAND [ARGS...]]
//!
//! Examples:
//!   cargo run --example telemetry_tail
//!       # synthetic readings only
//!   cargo run --example telemetry_tail -- cargo run -q --example emit_readings
//!       # readings from an external process, synthetic again once it exits
//!
//! Each sample is printed as one JSON line. A second, deliberately slow
//! subscriber shows that it loses old samples instead of stalling the stream.
//! Press Ctrl+C to stop; counters are printed on exit.

use std::time::Duration;

use telemetry_hub::{ExternalCommand, StreamConfig, StreamCoordinator};

fn print_usage() {
    eprintln!("Usage: telemetry_tail [COMMAND [ARGS...]]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  COMMAND    External producer writing one JSON reading per line");
    eprintln!("             (default: synthetic readings only)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    // Logs go to stderr so stdout stays pure JSON lines
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("telemetry_hub=info".parse()?)
                .add_directive("telemetry_tail=debug".parse()?),
        )
        .init();

    let coordinator = StreamCoordinator::new(StreamConfig::default());
    let subscription = coordinator.subscribe();
    coordinator.ensure_default_running().await;

    if !args.is_empty() {
        let command = ExternalCommand::from_argv(args)?;
        if let Err(e) = coordinator.start_external(&command).await {
            eprintln!("Error: {}", e);
            eprintln!("Continuing with synthetic readings");
        }
    }

    let slow = coordinator.subscribe();
    let slow_id = slow.id();
    let slow_reader = tokio::spawn(async move {
        let mut received = 0u64;
        while slow.recv().await.is_some() {
            received += 1;
            if slow.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        (received, slow.dropped(), slow.len(), slow.capacity())
    });

    let mut states = coordinator.state_changes();
    loop {
        tokio::select! {
            sample = subscription.recv() => match sample {
                Some(sample) => println!("{}", sample.to_json()),
                None => break,
            },
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                tracing::info!(state = %state, "Producer changed");
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
        }
    }

    coordinator.shutdown().await;
    coordinator.unsubscribe(&subscription);
    coordinator.hub().unsubscribe(slow_id);

    // Unsubscribing closes the channel, which ends the slow reader
    let (received, dropped, left, capacity) = slow_reader.await?;
    eprintln!(
        "Slow subscriber: received {}, dropped {}, {} of {} still queued",
        received, dropped, left, capacity
    );

    let stats = coordinator.stats();
    eprintln!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
