// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command-line front end for the twilight overlay.

mod config;
mod export;
mod live;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use config::AppConfig;
use log::{error, info, warn};
use serde::Serialize;
use twilight_overlay::{generate, Color, GeoPoint, SolarPosition, TileCoord, Timestamp};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(name = "crepuscule", version, about = "Day/night twilight overlay tiles")]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one tile as a PNG.
    Render(RenderArgs),
    /// Print the sun's position.
    Sun(SunArgs),
    /// Run the crossfading overlay against an in-memory map.
    Live(LiveArgs),
    /// Show or store the configuration.
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[arg(long)]
    z: u8,
    #[arg(long)]
    x: u32,
    #[arg(long)]
    y: u32,

    /// Milliseconds since the Unix epoch; defaults to now.
    #[arg(long, allow_negative_numbers = true)]
    timestamp: Option<i64>,

    /// Tile edge length in pixels.
    #[arg(long)]
    size: Option<u32>,

    /// Output PNG path.
    #[arg(long, default_value = "tile.png")]
    out: PathBuf,

    /// Draw the tile border.
    #[arg(long)]
    debug: bool,
}

#[derive(Parser, Debug)]
struct SunArgs {
    /// Milliseconds since the Unix epoch; defaults to now.
    #[arg(long, allow_negative_numbers = true)]
    timestamp: Option<i64>,

    /// Also report the sun's elevation at this latitude.
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,

    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,
}

#[derive(Parser, Debug)]
struct LiveArgs {
    /// Zoom level the in-memory map shows.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=6))]
    zoom: u8,

    /// Number of swaps to serve before exiting.
    #[arg(long, default_value_t = 3)]
    ticks: u32,

    /// Swap interval in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Tint the two buffers and draw tile borders.
    #[arg(long)]
    debug: bool,
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Print the config file location instead.
    #[arg(long)]
    path: bool,

    /// Write the effective configuration to disk.
    #[arg(long)]
    write: bool,
}

#[derive(Serialize, Debug)]
struct SunReport {
    timestamp_ms: i64,
    utc: String,
    declination_deg: f64,
    equation_of_time_min: f64,
    subsolar_lat: f64,
    subsolar_lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    elevation_deg: Option<f64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load configuration, using defaults: {}", e);
        AppConfig::default()
    });

    let result = match cli.cmd {
        Command::Render(args) => cmd_render(&config, args),
        Command::Sun(args) => cmd_sun(&args),
        Command::Live(args) => cmd_live(&config, &args),
        Command::Config(args) => cmd_config(&config, &args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn timestamp_or_now(millis: Option<i64>) -> Result<Timestamp, String> {
    match millis {
        Some(ms) => Timestamp::from_millis(ms).ok_or_else(|| format!("timestamp {ms} is out of range")),
        None => Ok(Timestamp::now()),
    }
}

fn cmd_render(config: &AppConfig, args: RenderArgs) -> CmdResult {
    let coord = TileCoord::new(args.z, args.x, args.y)
        .ok_or_else(|| format!("tile {}/{}/{} does not exist", args.z, args.x, args.y))?;
    let timestamp = timestamp_or_now(args.timestamp)?;
    let size = args.size.unwrap_or(config.tile_size);
    if size == 0 {
        return Err("tile size must be positive".into());
    }

    let buffer = generate(
        coord,
        timestamp,
        Color::from(config.color),
        size,
        args.debug || config.debug,
    );
    export::write_png(&args.out, &buffer)?;
    info!("Rendered {} at {} to {}", coord, timestamp, args.out.display());
    println!("{}  {}", export::sha256_hex(buffer.as_bytes()), args.out.display());
    Ok(())
}

fn cmd_sun(args: &SunArgs) -> CmdResult {
    let timestamp = timestamp_or_now(args.timestamp)?;
    let sun = SolarPosition::at(timestamp);
    let elevation_deg = match (args.lat, args.lon) {
        (Some(lat), Some(lon)) => Some(sun.elevation_deg(&GeoPoint::new(lat, lon))),
        _ => None,
    };

    let report = SunReport {
        timestamp_ms: timestamp.as_millis(),
        utc: timestamp.as_datetime().to_rfc3339(),
        declination_deg: sun.declination_deg,
        equation_of_time_min: sun.equation_of_time_min,
        subsolar_lat: sun.subsolar.lat,
        subsolar_lon: sun.subsolar.lon,
        elevation_deg,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_live(config: &AppConfig, args: &LiveArgs) -> CmdResult {
    let mut options = config.overlay_options();
    options.debug |= args.debug;
    let mut crossfade = config.crossfade();
    if let Some(ms) = args.interval_ms.filter(|ms| *ms > 0) {
        crossfade.tick_interval = std::time::Duration::from_millis(ms);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(live::run(args.zoom, args.ticks, options, crossfade))
}

fn cmd_config(config: &AppConfig, args: &ConfigArgs) -> CmdResult {
    if args.path {
        println!("{}", AppConfig::get_config_path()?.display());
        return Ok(());
    }
    if args.write {
        config.save()?;
        info!("Configuration written to {}", AppConfig::get_config_path()?.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_negative_timestamp_accepted() {
        let cli = Cli::try_parse_from(["crepuscule", "sun", "--timestamp", "-86400000"]).unwrap();
        let Command::Sun(args) = cli.cmd else {
            panic!("expected sun command");
        };
        assert_eq!(args.timestamp, Some(-86_400_000));
        assert_eq!(timestamp_or_now(args.timestamp).unwrap().as_millis(), -86_400_000);
    }

    #[test]
    fn test_out_of_range_timestamp_rejected() {
        assert!(timestamp_or_now(Some(i64::MAX)).is_err());
    }

    #[test]
    fn test_live_zoom_is_bounded() {
        assert!(Cli::try_parse_from(["crepuscule", "live", "--zoom", "9"]).is_err());
    }
}
