//! Cellmon - Battery Cell Voltage Monitor Binary
//!
//! A standalone binary polling battery cell voltages over I2C and serving
//! them through a REST + SSE API.

use clap::{Args, Parser, Subcommand};
use cellmon::{
    acquisition::bus, start_web_server, CellSampler, SamplerConfig, VoltageStore, WebConfig,
    DEFAULT_CELL_COUNT, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WEB_PORT,
};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "cellmon")]
#[command(about = "Battery cell voltage monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Polls battery cell voltages from a PCF8591 ADC over I2C, \
persists them to SQLite, and serves them over a REST + SSE API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Streaming poll interval in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    interval: u64,

    /// SQLite database path
    #[arg(long, default_value = "voltage_history.db")]
    database: String,

    /// Number of monitored battery cells
    #[arg(long, default_value_t = DEFAULT_CELL_COUNT)]
    cells: u8,

    /// Voltage-divider compensation factor
    #[arg(long, default_value_t = 1.0)]
    compensation_factor: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve(ServeArgs),

    /// Run a single acquisition cycle and exit
    Sample(SampleArgs),

    /// Show configuration and hardware availability
    Info,
}

#[derive(Args)]
struct ServeArgs {
    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Keep readings in memory only (no database file)
    #[arg(long)]
    volatile: bool,
}

#[derive(Args)]
struct SampleArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(&cli)?;
    print_banner();

    match &cli.command {
        Some(Commands::Serve(args)) => {
            serve_command(&cli, args).await?;
        }
        Some(Commands::Sample(args)) => {
            sample_command(&cli, args).await?;
        }
        Some(Commands::Info) => {
            info_command(&cli);
        }
        None => {
            let serve_args = ServeArgs {
                no_cors: false,
                volatile: false,
            };
            serve_command(&cli, &serve_args).await?;
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    println!("🔋 Cellmon - Battery Cell Voltage Monitor");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn sampler_config(cli: &Cli) -> SamplerConfig {
    SamplerConfig::default()
        .with_cells(cli.cells)
        .with_compensation_factor(cli.compensation_factor)
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting battery monitor...");

    let sampler = CellSampler::detect(sampler_config(cli));
    if sampler.hardware_available() {
        info!("I2C interface detected; ADC readings enabled");
    } else {
        info!("No I2C interface; API stays up, readings report hardware-unavailable");
    }

    let store = if args.volatile {
        info!("Using in-memory database (volatile mode)");
        VoltageStore::open_in_memory()?
    } else {
        info!("Using database file: {}", cli.database);
        VoltageStore::open(&cli.database)?
    };

    let web_config = WebConfig::new(&cli.host, cli.port)
        .with_cors(!args.no_cors)
        .with_poll_interval_ms(cli.interval);

    info!("Web server configuration:");
    info!("  - Bind address: {}:{}", cli.host, cli.port);
    info!("  - CORS enabled: {}", !args.no_cors);
    info!("  - Poll interval: {}ms", cli.interval);
    info!("  - Monitored cells: {}", cli.cells);

    start_web_server(web_config, sampler, store).await?;

    Ok(())
}

async fn sample_command(cli: &Cli, args: &SampleArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut sampler = CellSampler::detect(sampler_config(cli));
    let readings = sampler.sample_all().await?;

    match args.format.as_str() {
        "json" => {
            let snapshot = cellmon::VoltageSnapshot::success(readings);
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        "pretty" => {
            println!("🔋 Acquisition cycle ({} cells)", readings.len());
            println!("==============================");
            for reading in &readings {
                match reading.voltage {
                    Some(v) => println!("  Cell {} ({}): {:.3} V", reading.cell, reading.ain_channel, v),
                    None => println!("  Cell {} ({}): read error", reading.cell, reading.ain_channel),
                }
            }
        }
        _ => {
            error!("Unsupported format: {}. Use 'json' or 'pretty'", args.format);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn info_command(cli: &Cli) {
    let config = sampler_config(cli);
    let availability = bus::probe_availability();

    println!("🔋 Cellmon Configuration");
    println!("========================");
    println!();
    println!("Acquisition:");
    println!("  Cells: {}", config.cells);
    println!("  Reference voltage: {:.1} V", config.reference_voltage);
    println!("  Compensation factor: {}", config.compensation_factor);
    println!(
        "  Functional zero threshold: {:.1} V",
        config.functional_zero_threshold
    );
    println!("  Settle delay: {} ms", config.settle_delay_ms);
    println!("  Device address: 0x{:02x}", config.device_address);
    println!();
    println!("Hardware:");
    println!(
        "  I2C interface: {}",
        if availability.available { "available" } else { "not available" }
    );
    println!("  Detail: {}", availability.detail);
    println!();
    println!("Server:");
    println!("  Bind address: {}:{}", cli.host, cli.port);
    println!("  Database: {}", cli.database);
    println!("  Poll interval: {} ms", cli.interval);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        use clap::Parser;

        let cli = Cli::try_parse_from(["cellmon", "--port", "9090"]).unwrap();
        assert_eq!(cli.port, 9090);
    }

    #[test]
    fn test_default_values() {
        use clap::Parser;

        let cli = Cli::try_parse_from(["cellmon"]).unwrap();
        assert_eq!(cli.port, DEFAULT_WEB_PORT);
        assert_eq!(cli.interval, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.cells, DEFAULT_CELL_COUNT);
    }
}
