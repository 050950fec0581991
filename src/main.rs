//! tempomap: tempo map conversion and a lookahead click track.
//!
//! Usage:
//!   tempomap convert --bar 8         - time and tempo at a musical position
//!   tempomap table --bars 16         - bar-by-bar time table
//!   tempomap play                    - play the click track until Ctrl-C
//!   tempomap render clicks.wav       - render the click track to a WAV file

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use tempomap::audio::{self, AudioEngine};
use tempomap::config::{MetronomeConfig, PointSpec};
use tempomap::metronome::{Metronome, MetronomeSettings, SettingsUpdate};
use tempomap::tempo::{TempoCurve, BEATS_PER_BAR};
use tempomap::transport::Transport;

/// Playhead refresh while playing.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Largest table the `table` command prints.
const MAX_TABLE_ROWS: usize = 100_000;

#[derive(Parser)]
#[command(name = "tempomap", version, about = "Tempo map conversion and click track")]
struct Cli {
    /// Config file (default: ~/.tempomap/metronome.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tempo point as BAR:BPM; repeat for more. Replaces the configured points.
    #[arg(short, long = "point", value_parser = parse_point)]
    points: Vec<PointSpec>,

    /// Time signature as N/D, e.g. 7/8
    #[arg(short, long, value_parser = parse_signature)]
    signature: Option<(u32, u32)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert between musical position and seconds
    Convert {
        /// Position in bars
        #[arg(long, conflicts_with_all = ["beat", "time"])]
        bar: Option<f64>,
        /// Position in quarter-note beats
        #[arg(long, conflicts_with = "time")]
        beat: Option<f64>,
        /// Time in seconds
        #[arg(long)]
        time: Option<f64>,
    },
    /// Print time and tempo at regular bar intervals
    Table {
        /// Number of bars
        #[arg(short, long, default_value_t = 8.0)]
        bars: f64,
        /// Row spacing in bars
        #[arg(long, default_value_t = 1.0)]
        step: f64,
    },
    /// Play the click track on the default output device
    Play {
        /// Project time to start from, in seconds
        #[arg(short, long, default_value_t = 0.0)]
        from: f64,
        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<f64>,
        /// Click volume, 0.0..=1.0
        #[arg(long)]
        volume: Option<f32>,
    },
    /// Render the click track to a mono WAV file
    Render {
        /// Output file
        output: PathBuf,
        /// Project time to start from, in seconds
        #[arg(short, long, default_value_t = 0.0)]
        from: f64,
        /// Length in seconds
        #[arg(short, long, default_value_t = 30.0)]
        duration: f64,
        /// Sample rate (default from config)
        #[arg(long)]
        sample_rate: Option<u32>,
    },
}

fn parse_point(s: &str) -> Result<PointSpec, String> {
    let (bar, bpm) = s
        .split_once(':')
        .ok_or_else(|| format!("expected BAR:BPM, got '{s}'"))?;
    let bar = bar.trim().parse().map_err(|e| format!("bad bar '{bar}': {e}"))?;
    let bpm = bpm.trim().parse().map_err(|e| format!("bad tempo '{bpm}': {e}"))?;
    Ok(PointSpec { bar, bpm })
}

fn parse_signature(s: &str) -> Result<(u32, u32), String> {
    let (num, den) = s
        .split_once('/')
        .ok_or_else(|| format!("expected N/D, got '{s}'"))?;
    let num = num.trim().parse().map_err(|e| format!("bad numerator '{num}': {e}"))?;
    let den = den.trim().parse().map_err(|e| format!("bad denominator '{den}': {e}"))?;
    Ok((num, den))
}

fn load_config(cli: &Cli) -> Result<MetronomeConfig> {
    let mut config = match &cli.config {
        Some(path) => MetronomeConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => MetronomeConfig::load().unwrap_or_default(),
    };
    if !cli.points.is_empty() {
        config.points = cli.points.clone();
    }
    if let Some((numerator, denominator)) = cli.signature {
        config.numerator = numerator;
        config.denominator = denominator;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let settings = config.settings().context("invalid tempo map")?;

    match cli.command {
        Commands::Convert { bar, beat, time } => convert(&settings.curve, bar, beat, time),
        Commands::Table { bars, step } => table(&settings.curve, bars, step),
        Commands::Play {
            from,
            duration,
            volume,
        } => play(&config, settings, from, duration, volume),
        Commands::Render {
            output,
            from,
            duration,
            sample_rate,
        } => render(&config, &settings, &output, from, duration, sample_rate),
    }
}

fn convert(curve: &TempoCurve, bar: Option<f64>, beat: Option<f64>, time: Option<f64>) -> Result<()> {
    let beat = match (bar, beat, time) {
        (Some(bar), _, _) => bar * BEATS_PER_BAR,
        (_, Some(beat), _) => beat,
        (_, _, Some(time)) => curve.beat_at_time(time),
        _ => bail!("one of --bar, --beat or --time is required"),
    };
    let seconds = curve.time_at_beat(beat);
    println!("bar    {:.4}", beat / BEATS_PER_BAR);
    println!("beat   {beat:.4}");
    println!("time   {seconds:.6} s");
    println!("tempo  {:.3} BPM", curve.tempo_at_beat(beat));
    Ok(())
}

/// Index of the last table row for `bars` bars at `step` bar spacing.
fn table_rows(bars: f64, step: f64) -> Result<usize> {
    if !(step > 0.0) || !bars.is_finite() {
        bail!("--step must be positive and --bars finite");
    }
    let rows = (bars / step).floor().max(0.0);
    if rows >= MAX_TABLE_ROWS as f64 {
        bail!("table would have {rows} rows, limit is {MAX_TABLE_ROWS}; use a larger --step");
    }
    Ok(rows as usize)
}

fn table(curve: &TempoCurve, bars: f64, step: f64) -> Result<()> {
    let rows = table_rows(bars, step)?;
    println!("{:>8} {:>10} {:>12} {:>10}", "bar", "beat", "time (s)", "BPM");
    for i in 0..=rows {
        let bar = i as f64 * step;
        let beat = bar * BEATS_PER_BAR;
        println!(
            "{:>8.2} {:>10.2} {:>12.4} {:>10.2}",
            bar,
            beat,
            curve.time_at_beat(beat),
            curve.tempo_at_beat(beat)
        );
    }
    Ok(())
}

fn play(
    config: &MetronomeConfig,
    settings: MetronomeSettings,
    from: f64,
    duration: Option<f64>,
    volume: Option<f32>,
) -> Result<()> {
    let mut engine = AudioEngine::new(config.voice()).context("failed to open audio output")?;
    let sink = engine
        .take_click_sink()
        .context("audio engine has no click sink")?;

    let curve = settings.curve.clone();
    let (numerator, denominator) = (settings.numerator, settings.denominator);
    let metronome = Metronome::spawn(engine.clock(), sink, settings, config.timing())
        .context("failed to spawn metronome thread")?;
    if let Some(volume) = volume {
        metronome.update_settings(SettingsUpdate::default().with_volume(volume));
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    let mut transport = Transport::new(engine.clock());
    transport.set_start_marker(from);
    transport.seek(from);
    let playhead = transport.subscribe();
    transport.play();
    metronome.start(curve.clone(), numerator, denominator, transport.position());

    tracing::info!(from, numerator, denominator, "playing, Ctrl-C to stop");

    let started = Instant::now();
    let mut stdout = std::io::stdout();
    while running.load(Ordering::SeqCst) {
        if duration.is_some_and(|d| started.elapsed().as_secs_f64() >= d) {
            break;
        }
        thread::sleep(TICK_INTERVAL);
        transport.tick();
        if let Ok(position) = playhead.try_recv() {
            let beat = curve.beat_at_time(position);
            print!(
                "\r{:>9.2} s   bar {:>7.2}   {:>6.1} BPM ",
                position,
                beat / BEATS_PER_BAR + 1.0,
                curve.tempo_at_beat(beat)
            );
            let _ = stdout.flush();
        }
    }
    println!();

    metronome.stop();
    transport.stop();
    tracing::info!("stopped");
    Ok(())
}

fn render(
    config: &MetronomeConfig,
    settings: &MetronomeSettings,
    output: &Path,
    from: f64,
    duration: f64,
    sample_rate: Option<u32>,
) -> Result<()> {
    let sample_rate = sample_rate.unwrap_or(config.sample_rate);
    if sample_rate == 0 {
        bail!("sample rate must be positive");
    }
    let samples = audio::render_click_track(
        settings,
        config.timing(),
        config.voice(),
        from,
        duration,
        sample_rate,
    );
    audio::write_wav(output, &samples, sample_rate)
        .with_context(|| format!("failed to export {}", output.display()))?;
    println!(
        "wrote {:.1} s of clicks to {}",
        samples.len() as f64 / sample_rate as f64,
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_parsing() {
        assert_eq!(
            parse_point("4:150").unwrap(),
            PointSpec { bar: 4.0, bpm: 150.0 }
        );
        assert_eq!(
            parse_point(" 0.5 : 90.5 ").unwrap(),
            PointSpec { bar: 0.5, bpm: 90.5 }
        );
        assert!(parse_point("4-150").is_err());
        assert!(parse_point("x:150").is_err());
    }

    #[test]
    fn signature_parsing() {
        assert_eq!(parse_signature("7/8").unwrap(), (7, 8));
        assert!(parse_signature("7").is_err());
        assert!(parse_signature("-1/4").is_err());
    }

    #[test]
    fn cli_parses_points_and_command() {
        let cli = Cli::try_parse_from([
            "tempomap", "-p", "0:120", "-p", "8:160", "-s", "3/4", "table", "--bars", "4",
        ])
        .unwrap();
        assert_eq!(cli.points.len(), 2);
        assert_eq!(cli.signature, Some((3, 4)));
        assert!(matches!(cli.command, Commands::Table { bars, .. } if bars == 4.0));
    }

    #[test]
    fn table_row_count_is_bounded() {
        assert_eq!(table_rows(8.0, 1.0).unwrap(), 8);
        assert_eq!(table_rows(4.0, 0.5).unwrap(), 8);
        assert_eq!(table_rows(-3.0, 1.0).unwrap(), 0);
        assert!(table_rows(1e18, 1e-9).is_err());
        assert!(table_rows(8.0, 0.0).is_err());
        assert!(table_rows(f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn convert_flags_conflict() {
        assert!(Cli::try_parse_from(["tempomap", "convert", "--bar", "1", "--time", "2"]).is_err());
    }
}
