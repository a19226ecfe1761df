use clap::Parser;
use rplidar_driver::{AxisConvention, Config, DriverError, RPLidar};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reads point clouds from an RPLiDAR and prints them as JSON lines.
#[derive(Parser)]
struct Args {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial device, overriding the configuration.
    #[arg(long)]
    port: Option<String>,
    /// Minimum range in millimetres, overriding the configuration.
    #[arg(long)]
    min_range_mm: Option<f64>,
    /// Leave the sensor's X axis as reported.
    #[arg(long)]
    raw_axes: bool,
    /// Number of clouds to print before exiting.
    #[arg(long, default_value_t = 10)]
    count: usize,
    /// Delay between reads in milliseconds.
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config: Config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    if let Some(port) = &args.port {
        config.device_path = Some(port.clone());
    }
    if let Some(min_range_mm) = args.min_range_mm {
        config.min_range_mm = min_range_mm;
    }
    if args.raw_axes {
        config.axis_convention = AxisConvention::Raw;
    }
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rplidar_driver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut lidar = RPLidar::new(&config)?;
    tracing::info!(
        model = lidar.model_name(),
        firmware = %lidar.device_info().firmware_version_string(),
        serial = %lidar.device_info().serial_number_string(),
        "reading point clouds"
    );

    let mut printed = 0;
    while printed < args.count {
        std::thread::sleep(Duration::from_millis(args.interval_ms));
        match lidar.next_point_cloud() {
            Ok(cloud) => {
                println!("{}", serde_json::to_string(&*cloud)?);
                printed += 1;
            }
            Err(DriverError::NotYetAvailable) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    lidar.close()?;
    Ok(())
}
