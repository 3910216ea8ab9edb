//! Echo example.
//!
//! Opens an OSS device full-duplex and plays captured audio straight back
//! until Ctrl+C.
//!
//! Run with: cargo run --example echo -- [device] [channels] [format]
//!
//! e.g. `cargo run --example echo -- /dev/dsp 2 s32`

#[cfg(all(unix, feature = "oss"))]
use oss_duplex::device::OssDevice;
#[cfg(all(unix, feature = "oss"))]
use oss_duplex::{
    event_callback, ChannelRequest, DuplexPump, SampleFormat, StreamRequest, DEFAULT_DEVICE,
};
#[cfg(all(unix, feature = "oss"))]
use tracing_subscriber::EnvFilter;

#[cfg(all(unix, feature = "oss"))]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| DEFAULT_DEVICE.to_string());
    let channels: ChannelRequest = args.next().as_deref().unwrap_or("auto").parse()?;
    let format: SampleFormat = args.next().as_deref().unwrap_or("s32").parse()?;

    let request = StreamRequest::new(&path)
        .with_channels(channels)
        .with_sample_format(format);

    println!("Echoing {path} ({format}). Press Ctrl+C to stop.");

    let on_event = event_callback(|event| println!("note: {event:?}"));
    let stats = match format {
        SampleFormat::Signed8 => {
            let pump = DuplexPump::<_, _, i8>::open(request)?.on_event(on_event);
            echo(pump).await?
        }
        SampleFormat::Signed16 => {
            let pump = DuplexPump::<_, _, i16>::open(request)?.on_event(on_event);
            echo(pump).await?
        }
        SampleFormat::Signed24 | SampleFormat::Signed32 => {
            let pump = DuplexPump::<_, _, i32>::open(request)?.on_event(on_event);
            echo(pump).await?
        }
    };

    println!("Stats: {stats:?}");
    Ok(())
}

/// Runs the pump on a blocking thread and stops it on Ctrl+C.
#[cfg(all(unix, feature = "oss"))]
async fn echo<S: oss_duplex::Sample>(
    mut pump: DuplexPump<OssDevice, oss_duplex::Identity, S>,
) -> Result<oss_duplex::PumpStats, Box<dyn std::error::Error>> {
    let config = pump.start()?;
    println!("Negotiated: {config}");

    let stop = pump.stop_handle();
    let mut task = tokio::task::spawn_blocking(move || pump.run());

    tokio::select! {
        result = &mut task => return Ok(result??),
        _ = tokio::signal::ctrl_c() => {
            println!("\nStopping...");
            stop.stop();
        }
    }

    Ok(task.await??)
}

#[cfg(not(all(unix, feature = "oss")))]
fn main() {
    eprintln!("This example requires a unix target with the `oss` feature enabled.");
}
