//! Negotiation probe example.
//!
//! Negotiates a stream with a device and prints what was granted, without
//! moving any audio. Falls back to an in-memory device when no path is
//! given, which is handy for seeing the negotiation log.
//!
//! Run with: cargo run --example probe -- [device] [channels] [format] [rate]
//!
//! Use `RUST_LOG=debug` to see every control request.

use oss_duplex::device::MockDevice;
use oss_duplex::{
    event_callback, ChannelRequest, Negotiator, SampleFormat, StreamRequest, DEFAULT_SAMPLE_RATE,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next();
    let channels: ChannelRequest = args.next().as_deref().unwrap_or("auto").parse()?;
    let format: SampleFormat = args.next().as_deref().unwrap_or("s16").parse()?;
    let rate = match args.next() {
        Some(rate) => rate.parse()?,
        None => DEFAULT_SAMPLE_RATE,
    };

    let request = path
        .as_deref()
        .map_or_else(StreamRequest::default, StreamRequest::new)
        .with_channels(channels)
        .with_sample_format(format)
        .with_sample_rate(rate);
    let negotiator = Negotiator::new(request)
        .on_event(event_callback(|event| println!("note: {event:?}")));

    let config = match path {
        #[cfg(all(unix, feature = "oss"))]
        Some(_) => {
            let mut device = oss_duplex::device::OssDevice::for_request(negotiator.request())?;
            negotiator.negotiate(&mut device)?
        }
        #[cfg(not(all(unix, feature = "oss")))]
        Some(_) => return Err("real devices need a unix target with the `oss` feature".into()),
        None => {
            let mut device = MockDevice::full_duplex().named("mock");
            negotiator.negotiate(&mut device)?
        }
    };

    println!("Negotiated: {config}");
    println!("  channels:            {}", config.channels());
    println!("  format:              {}", config.sample_format());
    println!("  rate:                {} Hz", config.sample_rate());
    println!(
        "  fragments:           {} x {} bytes",
        config.fragment_count(),
        config.fragment_bytes()
    );
    println!("  samples per channel: {}", config.per_channel_sample_count());
    if config.truncated_samples() > 0 {
        println!("  dropped per fragment: {}", config.truncated_samples());
    }
    Ok(())
}
