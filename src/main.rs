use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use mixdeck_lib::audio::track::default_roster;
use mixdeck_lib::commands::{logging, mixer, services};
use mixdeck_lib::EngineSettings;

#[derive(Parser)]
#[command(author, version, about = "Multi-track mixing and playback engine")]
struct Cli {
    /// Settings file (JSON). Defaults to the user config directory.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Also append log records to the log file
    #[arg(long, global = true)]
    log_file: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default track roster.
    Tracks,
    /// List audio output devices.
    Devices,
    /// Play the roster for a while, printing the spectrum.
    Play(PlayArgs),
    /// Generate a clip with the generation service.
    Generate {
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value_t = 10)]
        duration: u32,
    },
    /// Split a file into stems with the stem-separation service.
    Stems { file_ref: String },
    /// Pair with a cloud speaker.
    Pair { device_name: String },
    /// Save an artifact under the naming contract.
    Save {
        label: String,
        #[arg(long, default_value = "wav")]
        ext: String,
        /// File whose bytes are saved; a placeholder is written when omitted
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Show or clear the log file.
    Logs {
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Args)]
struct PlayArgs {
    #[arg(long, default_value_t = 5.0)]
    seconds: f32,
    /// Track names to solo
    #[arg(long)]
    solo: Vec<String>,
    /// Track names to mute
    #[arg(long)]
    mute: Vec<String>,
    /// Master level (0.0 - 1.0)
    #[arg(long)]
    master: Option<f32>,
    /// Render offline on a paced thread instead of an output device
    #[arg(long)]
    headless: bool,
}

fn load_settings(path: Option<&PathBuf>) -> Result<EngineSettings, String> {
    let settings = match path {
        Some(path) => EngineSettings::load(path),
        None => EngineSettings::load_default(),
    };
    settings.map_err(|e| format!("Failed to load settings: {}", e))
}

fn spectrum_bar(bands: &[f32]) -> String {
    const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    bands
        .iter()
        .map(|&b| LEVELS[((b / 100.0) * 7.0).round().clamp(0.0, 7.0) as usize])
        .collect()
}

fn play_duration(seconds: f32) -> Result<Duration, String> {
    Duration::try_from_secs_f32(seconds.max(0.0))
        .map_err(|e| format!("Invalid --seconds {}: {}", seconds, e))
}

async fn play(settings: EngineSettings, args: PlayArgs) -> Result<(), String> {
    let duration = play_duration(args.seconds)?;
    let settings = EngineSettings {
        headless: settings.headless || args.headless,
        ..settings
    };
    mixer::init_mixer_engine(&settings)?;

    for name in &args.solo {
        mixer::mixer_set_solo(mixer::mixer_find_track(name)?, true)?;
    }
    for name in &args.mute {
        mixer::mixer_set_mute(mixer::mixer_find_track(name)?, true)?;
    }
    if let Some(level) = args.master {
        mixer::mixer_set_master_level(level)?;
    }

    let deadline = Instant::now()
        .checked_add(duration)
        .ok_or_else(|| format!("Invalid --seconds {}", args.seconds))?;
    mixer::mixer_play()?;
    while Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let state = mixer::mixer_get_state()?;
        println!("{}", spectrum_bar(&state.spectrum));
    }
    mixer::mixer_stop()?;

    let status = mixer::mixer_get_status()?;
    println!(
        "{:?} | master {:.2} | {} track nodes live",
        status.state, status.master_level, status.track_nodes
    );
    for track in &status.tracks {
        println!(
            "  {:<12} gain {:.2} pan {:+.2}",
            track.config.name(),
            track.effective.gain,
            track.effective.pan
        );
    }
    mixer::shutdown_mixer_engine();
    Ok(())
}

async fn run(cli: Cli) -> Result<(), String> {
    let settings = load_settings(cli.settings.as_ref())?;
    services::configure_services(&settings.services);

    match cli.command {
        Commands::Tracks => {
            for track in &default_roster() {
                println!(
                    "{:>2}  {:<12} {:?}  vol {:>3}  pan {:>4}",
                    track.id(),
                    track.name(),
                    track.source(),
                    track.volume(),
                    track.pan()
                );
            }
        }
        Commands::Devices => {
            for device in mixer::get_audio_devices()? {
                let marker = if device.is_default { "*" } else { " " };
                println!("{} {}", marker, device.name);
            }
        }
        Commands::Play(args) => play(settings, args).await?,
        Commands::Generate { prompt, duration } => {
            let response = services::generate_audio(prompt, duration).await?;
            println!("{}", response.log_text);
            println!("artifact: {}", response.artifact_ref.location.display());
        }
        Commands::Stems { file_ref } => {
            for stem in services::separate_stems(file_ref).await? {
                println!("{}", stem);
            }
        }
        Commands::Pair { device_name } => {
            let state = services::pair_speaker(device_name).await?;
            println!("{:?}", state);
        }
        Commands::Save { label, ext, input } => {
            let content = match input {
                Some(path) => Some(
                    tokio::fs::read(&path)
                        .await
                        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?,
                ),
                None => None,
            };
            let filename = services::save_artifact(&label, &ext, content)?;
            println!("{}", filename);
        }
        Commands::Logs { clear } => {
            if clear {
                logging::clear_log_file()?;
            } else {
                println!("{}", logging::get_log_file_path()?);
                println!("{} bytes", logging::get_log_file_size()?);
                print!("{}", logging::read_log_file()?);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging("info", cli.log_file);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
