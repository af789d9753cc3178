use backbeat::messaging::NotificationLevel;
use backbeat::messaging::channels::{NotificationConsumer, ProgressConsumer};
use backbeat::midi::MidiDeviceManager;
use backbeat::{
    ChordLibrary, EngineResult, Heartbeat, InMemoryLibrary, LogSink, MidiOutputSink, NoteSink,
    PatternLibrary, PerformanceConfig, PerformanceEngine, QuantizationMode, SystemTimeSource,
    create_notification_channel, create_progress_channel,
};
use clap::{Parser, Subcommand};
use ringbuf::traits::Consumer;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Ringbuffer capacity constants
// Progress is pushed once per beat at most; 256 covers more than a minute at 240 BPM
const PROGRESS_RINGBUFFER_CAPACITY: usize = 256;
const NOTIFICATION_RINGBUFFER_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "backbeat")]
#[command(about = "Real-time performance scheduling: loops, count-in and chord strums over MIDI", long_about = None)]
struct Cli {
    /// Substring of the MIDI output port to use (default: first port)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Log events instead of sending them to a MIDI port
    #[arg(long, global = true)]
    log_only: bool,

    /// Performance settings (.json or .ron)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pattern and chord library (.json or .ron), replaces the built-in one
    #[arg(short, long, global = true)]
    library: Option<PathBuf>,

    /// Tempo override in BPM
    #[arg(short, long, global = true)]
    tempo: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List MIDI output ports
    Ports,

    /// List patterns and chords in the library
    List,

    /// Print the settings in effect as JSON
    Config,

    /// Loop a pattern, optionally strumming a chord progression over it
    Play {
        /// Percussion pattern to loop
        #[arg(default_value = "Rock")]
        pattern: String,

        /// Comma separated chords, one per measure
        #[arg(long, value_delimiter = ',')]
        chords: Vec<String>,

        /// Strum pattern for the chords
        #[arg(long, default_value = "Down strum")]
        strum: String,

        /// Pattern to swap to halfway through
        #[arg(long)]
        then: Option<String>,

        /// How long to play, in seconds
        #[arg(short, long, default_value = "8.0")]
        seconds: f64,
    },

    /// Play one pass of a pattern
    Preview {
        pattern: String,
    },

    /// Sound every string of a chord
    Audition {
        chord: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("backbeat=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> EngineResult<()> {
    if let Commands::Ports = cli.command {
        list_ports();
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => PerformanceConfig::from_path(path)?,
        None => PerformanceConfig::default(),
    };
    if let Some(tempo) = cli.tempo {
        config.tempo_bpm = tempo;
    }
    if let Commands::Config = cli.command {
        println!("{}", config.to_json_string()?);
        return Ok(());
    }
    let config = config.resolve();

    let library = Arc::new(match &cli.library {
        Some(path) => InMemoryLibrary::from_path(path)?,
        None => InMemoryLibrary::builtin(),
    });

    if let Commands::List = cli.command {
        println!("Patterns: {}", library.pattern_names().join(", "));
        println!("Chords:   {}", library.chord_names().join(", "));
        return Ok(());
    }

    let sink = open_sink(cli.port.as_deref(), cli.log_only);
    let interval = config.heartbeat_interval;
    let mut engine = PerformanceEngine::new(
        sink,
        Arc::new(SystemTimeSource::new()),
        library.clone(),
        library,
        config,
    );
    let (progress_tx, progress_rx) = create_progress_channel(PROGRESS_RINGBUFFER_CAPACITY);
    let (notification_tx, notification_rx) =
        create_notification_channel(NOTIFICATION_RINGBUFFER_CAPACITY);
    engine.attach_progress(progress_tx);
    engine.attach_notifications(notification_tx);

    let engine = Arc::new(Mutex::new(engine));
    let mut heartbeat = Heartbeat::start(engine.clone(), interval)?;
    let mut monitor = Monitor {
        progress_rx,
        notification_rx,
    };

    let result = match cli.command {
        Commands::Play {
            pattern,
            chords,
            strum,
            then,
            seconds,
        } => play(&engine, &mut monitor, &pattern, &chords, &strum, then.as_deref(), seconds),
        Commands::Preview { pattern } => {
            let end = lock(&engine).preview(&pattern)?;
            info!(end, "previewing {}", pattern);
            wait_until_idle(&engine, &mut monitor);
            Ok(())
        }
        Commands::Audition { chord } => {
            lock(&engine).audition_chord(&chord)?;
            wait_until_idle(&engine, &mut monitor);
            Ok(())
        }
        Commands::Ports | Commands::List | Commands::Config => Ok(()),
    };

    lock(&engine).stop();
    heartbeat.stop();
    monitor.drain();
    result
}

fn play(
    engine: &Arc<Mutex<PerformanceEngine>>,
    monitor: &mut Monitor,
    pattern: &str,
    chords: &[String],
    strum: &str,
    then: Option<&str>,
    seconds: f64,
) -> EngineResult<()> {
    let started = Instant::now();
    let total = Duration::from_secs_f64(seconds.max(0.0));
    let measure = {
        let mut engine = lock(engine);
        engine.play(pattern)?;
        engine.set_quantization(QuantizationMode::Measure);
        engine.clock_snapshot().measure_duration()
    };

    let mut swapped = then.is_none();
    let mut next_chord = 0usize;
    let mut next_chord_at = Duration::ZERO;
    while started.elapsed() < total {
        if !swapped && started.elapsed() >= total / 2 {
            if let Some(next) = then {
                lock(engine).play(next)?;
            }
            swapped = true;
        }
        // Requested a measure ahead; quantization lands each on a downbeat
        if !chords.is_empty() && started.elapsed() >= next_chord_at {
            let chord = &chords[next_chord % chords.len()];
            if let Err(e) = lock(engine).play_chord(chord, strum) {
                warn!(chord = %chord, "skipping chord: {}", e);
            }
            next_chord += 1;
            next_chord_at += Duration::from_secs_f64(measure);
        }
        monitor.wait(Duration::from_millis(50));
    }
    Ok(())
}

/// Wait until the scheduler has nothing left to send
fn wait_until_idle(engine: &Arc<Mutex<PerformanceEngine>>, monitor: &mut Monitor) {
    loop {
        let remaining = {
            let engine = lock(engine);
            engine
                .scheduler()
                .next_due_time()
                .map(|due| (due - engine.now()).max(0.0))
        };
        let Some(remaining) = remaining else {
            break;
        };
        monitor.wait(Duration::from_secs_f64(remaining.min(1.0)) + Duration::from_millis(10));
    }
    monitor.wait(Duration::from_millis(250));
}

fn open_sink(port: Option<&str>, log_only: bool) -> Box<dyn NoteSink> {
    if log_only {
        return Box::new(LogSink);
    }
    match MidiOutputSink::connect(port) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            warn!("{}; logging events instead", e);
            Box::new(LogSink)
        }
    }
}

fn list_ports() {
    let ports = MidiDeviceManager::new().list_output_ports();
    if ports.is_empty() {
        println!("No MIDI output ports found");
        return;
    }
    for port in ports {
        let marker = if port.is_default { "*" } else { " " };
        println!("{} {}", marker, port.name);
    }
}

fn lock(engine: &Arc<Mutex<PerformanceEngine>>) -> MutexGuard<'_, PerformanceEngine> {
    engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Prints what the engine reports while the main thread waits
struct Monitor {
    progress_rx: ProgressConsumer,
    notification_rx: NotificationConsumer,
}

impl Monitor {
    fn wait(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.drain();
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn drain(&mut self) {
        while let Some(progress) = self.progress_rx.try_pop() {
            info!(
                position = %progress.label(),
                pattern = progress.active_pattern.as_deref().unwrap_or("-"),
                chord = progress.last_chord.as_deref().unwrap_or("-"),
                "progress"
            );
        }
        while let Some(notification) = self.notification_rx.try_pop() {
            match notification.level {
                NotificationLevel::Info => {
                    info!(category = ?notification.category, "{}", notification.message)
                }
                NotificationLevel::Warning => {
                    warn!(category = ?notification.category, "{}", notification.message)
                }
                NotificationLevel::Error => {
                    error!(category = ?notification.category, "{}", notification.message)
                }
            }
        }
    }
}
