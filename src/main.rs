//! Drawlink CLI - headless client for the shared canvas server.
//!
//! This is the main binary entry point. See the `drawlink` library for the
//! sync layer itself.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use drawlink::{Brush, BrushShape, Config, Rgb, SyncSession};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "drawlink")]
#[command(version)]
#[command(about = "Sync client for a shared drawing canvas")]
struct Cli {
    /// Server host (overrides config and DRAWLINK_SERVER_HOST)
    #[arg(long, global = true)]
    host: Option<String>,
    /// Server port (overrides config and DRAWLINK_SERVER_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the canvas once and write it as a PPM image
    Snapshot {
        /// Output file
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Stay connected and log strokes from other clients
    Watch {
        /// Request a full refresh every N seconds
        #[arg(long)]
        refresh_every: Option<u64>,
    },
    /// Send one stroke
    Draw {
        /// Points as "x,y x,y ..."
        #[arg(long)]
        points: String,
        /// Colour as RRGGBB (defaults to the configured brush)
        #[arg(long, conflicts_with = "hsv")]
        color: Option<Rgb>,
        /// Colour as h,s,v with each component in 0..=1
        #[arg(long)]
        hsv: Option<String>,
        /// Brush size in pixels
        #[arg(long)]
        size: Option<u8>,
        /// Brush shape: circle, square, soft
        #[arg(long)]
        shape: Option<BrushShape>,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    match cli.command {
        Commands::Snapshot { out } => snapshot(&config, &out),
        Commands::Watch { refresh_every } => watch(&config, refresh_every.map(Duration::from_secs)),
        Commands::Draw {
            points,
            color,
            hsv,
            size,
            shape,
        } => {
            let brush = brush_from_flags(config.brush, color, hsv.as_deref(), size, shape)?;
            draw(&config, brush, &parse_points(&points)?)
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Log to stderr, or to `DRAWLINK_LOG_FILE` when set.
fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    if let Ok(path) = std::env::var("DRAWLINK_LOG_FILE") {
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn snapshot(config: &Config, out: &Path) -> Result<()> {
    let mut session = SyncSession::from_config(config);
    session
        .start()
        .with_context(|| format!("Failed to sync with {}:{}", config.server_host, config.server_port))?;
    let canvas = session.canvas().context("Server sent no canvas")?;

    let file = std::fs::File::create(out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    canvas.write_ppm(std::io::BufWriter::new(file))?;
    println!("Wrote {}x{} canvas to {}", canvas.width(), canvas.height(), out.display());

    session.shutdown();
    Ok(())
}

fn watch(config: &Config, refresh_every: Option<Duration>) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .context("Failed to install Ctrl-C handler")?;

    let mut session = SyncSession::from_config(config);
    if let Err(e) = session.start() {
        log::warn!("Initial sync incomplete: {e}");
    }
    log::info!("Watching {}:{} (Ctrl-C to stop)", config.server_host, config.server_port);

    let tick = config.tick_interval();
    let mut last_refresh = Instant::now();
    while !shutdown.load(Ordering::Relaxed) {
        if let Some(every) = refresh_every {
            if last_refresh.elapsed() >= every {
                session.request_refresh();
                last_refresh = Instant::now();
            }
        }

        let report = session.tick();
        for batch in &report.inbound {
            log::info!(
                "Stroke: {} points, {} size {} {:?}",
                batch.points.len(),
                batch.brush.color,
                batch.brush.size,
                batch.brush.shape
            );
        }
        if report.refreshed {
            log::info!("Canvas refreshed");
        }
        if report.peer_closed {
            log::warn!("Server closed the connection; reconnecting");
            if !session.reconnect() {
                std::thread::sleep(Duration::from_secs(1));
            }
        }

        std::thread::sleep(tick);
    }

    session.shutdown();
    Ok(())
}

fn draw(config: &Config, brush: Brush, points: &[(u16, u16)]) -> Result<()> {
    let mut session = SyncSession::from_config(config);
    if let Err(e) = session.start() {
        // Strokes do not need the canvas.
        log::warn!("Handshake failed: {e}");
    }

    session.begin_stroke(brush);
    for &(x, y) in points {
        session.add_point(x, y);
    }
    session.end_stroke();

    let stats = session.stats();
    session.shutdown();
    if stats.batches_dropped > 0 {
        bail!("{} batch(es) could not be sent", stats.batches_dropped);
    }
    println!("Sent {} point(s) in {} batch(es)", points.len(), stats.batches_sent);
    Ok(())
}

fn parse_points(input: &str) -> Result<Vec<(u16, u16)>> {
    let points = input
        .split_whitespace()
        .map(|pair| -> Result<(u16, u16)> {
            let (x, y) = pair
                .split_once(',')
                .with_context(|| format!("expected x,y, got {pair:?}"))?;
            Ok((
                x.trim().parse::<u16>().with_context(|| format!("bad x in {pair:?}"))?,
                y.trim().parse::<u16>().with_context(|| format!("bad y in {pair:?}"))?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    if points.is_empty() {
        bail!("no points given");
    }
    Ok(points)
}

/// Configured brush with any command-line flags applied on top.
fn brush_from_flags(
    base: Brush,
    color: Option<Rgb>,
    hsv: Option<&str>,
    size: Option<u8>,
    shape: Option<BrushShape>,
) -> Result<Brush> {
    let color = match (color, hsv) {
        (Some(color), _) => color,
        (None, Some(hsv)) => parse_hsv(hsv)?,
        (None, None) => base.color,
    };
    Ok(Brush {
        color,
        size: size.unwrap_or(base.size),
        shape: shape.unwrap_or(base.shape),
    })
}

fn parse_hsv(input: &str) -> Result<Rgb> {
    let parts = input
        .split(',')
        .map(|p| p.trim().parse::<f32>().with_context(|| format!("bad hsv component {p:?}")))
        .collect::<Result<Vec<_>>>()?;
    let [h, s, v] = parts[..] else {
        bail!("expected h,s,v, got {input:?}");
    };
    Ok(Rgb::from_hsv(h, s, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_points() {
        assert_eq!(parse_points("1,2  30,40").unwrap(), vec![(1, 2), (30, 40)]);
        assert!(parse_points("").is_err());
        assert!(parse_points("1;2").is_err());
        assert!(parse_points("1,70000").is_err());
    }

    #[test]
    fn test_parse_hsv() {
        assert_eq!(parse_hsv("0,1,1").unwrap(), Rgb::new(255, 0, 0));
        assert!(parse_hsv("0,1").is_err());
    }

    #[test]
    fn test_cli_parses_draw() {
        let cli = Cli::try_parse_from([
            "drawlink", "--port", "4000", "draw", "--points", "1,1 2,2", "--color", "ff0000",
            "--shape", "soft",
        ])
        .unwrap();
        assert_eq!(cli.port, Some(4000));
        match cli.command {
            Commands::Draw { color, shape, .. } => {
                assert_eq!(color, Some(Rgb::new(255, 0, 0)));
                assert_eq!(shape, Some(BrushShape::SoftCircle));
            }
            _ => panic!("expected draw"),
        }
    }

    #[test]
    fn test_flags_override_configured_brush() {
        let base = Brush {
            color: Rgb::new(1, 2, 3),
            size: 7,
            shape: BrushShape::Square,
        };
        assert_eq!(brush_from_flags(base, None, None, None, None).unwrap(), base);

        let brush = brush_from_flags(base, None, Some("0,1,1"), Some(2), None).unwrap();
        assert_eq!(brush.color, Rgb::new(255, 0, 0));
        assert_eq!(brush.size, 2);
        assert_eq!(brush.shape, BrushShape::Square);
    }
}
