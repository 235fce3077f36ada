use anyhow::Context;
use boxlight_common::AppConfig;
use boxlight_input::{Action, KeyState};
use boxlight_render::{DemoScene, RecordingDevice, RenderDevice, RenderLoop, shaders};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "boxlight-cli", about = "Headless tools for the boxlight demo")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and built-in program info
    Info,
    /// Load and validate a configuration file
    CheckConfig {
        path: PathBuf,
        /// Print the effective configuration with defaults filled in
        #[arg(long)]
        dump: bool,
    },
    /// Print the default configuration as YAML
    DefaultConfig,
    /// Run the demo scene on the recording device and report what was drawn
    Simulate {
        /// Number of frames to run
        #[arg(short, long, default_value = "60")]
        frames: u64,
        /// Actions held for every frame, e.g. `move-forward,rotate-left`
        #[arg(long, value_delimiter = ',')]
        hold: Vec<Action>,
        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Totals over a simulated run.
#[derive(Debug, Default, PartialEq)]
struct Summary {
    frames: u64,
    presented: u64,
    draws: u64,
    triangles: u64,
    skipped: u64,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => {
            AppConfig::load(path).with_context(|| format!("load config {}", path.display()))
        }
        None => Ok(AppConfig::default()),
    }
}

fn simulate(
    config: &AppConfig,
    frames: u64,
    keys: &KeyState,
) -> anyhow::Result<(Summary, RenderLoop)> {
    let device: Rc<dyn RenderDevice> = Rc::new(RecordingDevice::new());
    let demo = DemoScene::build(&device, config).context("build demo scene")?;
    let mut render_loop = RenderLoop::from_config(device, config);
    tracing::info!(frames, held = keys.iter().count(), "simulating demo scene");

    let mut summary = Summary::default();
    for _ in 0..frames {
        let report = render_loop.frame(&demo.scene, keys)?;
        summary.frames += 1;
        summary.presented += u64::from(report.presented);
        summary.draws += u64::from(report.draws);
        summary.triangles += u64::from(report.triangles);
        summary.skipped += u64::from(report.skipped);
    }
    Ok((summary, render_loop))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Info => {
            println!("boxlight-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", boxlight_common::crate_info());
            println!("input: {}", boxlight_input::crate_info());
            println!("render: {}", boxlight_render::crate_info());
            for (name, iface) in [
                ("scene", shaders::scene_interface()),
                ("light", shaders::light_interface()),
            ] {
                let inputs: Vec<String> = iface
                    .attributes()
                    .iter()
                    .map(|a| format!("{}:{}", a.slot, a.format))
                    .collect();
                println!(
                    "program {name}: inputs [{}], uniform block {} bytes",
                    inputs.join(", "),
                    iface.uniform_block_size()
                );
            }
        }
        Commands::CheckConfig { path, dump } => {
            let config = load_config(Some(&path))?;
            println!("{}: OK", path.display());
            println!(
                "window {}x{}, camera at {}, light at {}",
                config.window.width,
                config.window.height,
                config.camera.position,
                config.light.position
            );
            if dump {
                print!("{}", config.to_yaml()?);
            }
        }
        Commands::DefaultConfig => {
            print!("{}", AppConfig::default().to_yaml()?);
        }
        Commands::Simulate {
            frames,
            hold,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let keys: KeyState = hold.into_iter().collect();
            let (summary, render_loop) = simulate(&config, frames, &keys)?;

            println!(
                "frames={} presented={} draws={} triangles={} skipped={}",
                summary.frames,
                summary.presented,
                summary.draws,
                summary.triangles,
                summary.skipped
            );
            let camera = &render_loop.camera;
            println!(
                "camera: position={:.3} facing={:.3}",
                camera.position,
                camera.facing()
            );
            println!(
                "light: position={:.3} direction={:.3}",
                render_loop.light.position,
                render_loop.light.direction()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn simulate_counts_every_draw() {
        let (summary, _) = simulate(&AppConfig::default(), 10, &KeyState::new()).unwrap();
        assert_eq!(
            summary,
            Summary {
                frames: 10,
                presented: 10,
                draws: 30,
                triangles: 360,
                skipped: 0,
            }
        );
    }

    #[test]
    fn held_actions_move_camera_and_light() {
        let keys: KeyState = [Action::MoveBackward, Action::LightRight].into_iter().collect();
        let (_, render_loop) = simulate(&AppConfig::default(), 100, &keys).unwrap();
        assert!((render_loop.camera.position.z - 3.0).abs() < 1e-3);
        assert!((render_loop.light.position.x - 4.825).abs() < 1e-3);
    }

    #[test]
    fn hold_list_parses_action_names() {
        let cli = Cli::try_parse_from([
            "boxlight-cli",
            "simulate",
            "--frames",
            "3",
            "--hold",
            "move-forward,rotate-left",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate { frames, hold, .. } => {
                assert_eq!(frames, 3);
                assert_eq!(hold, vec![Action::MoveForward, Action::RotateLeft]);
            }
            _ => panic!("expected simulate"),
        }
        assert!(Cli::try_parse_from(["boxlight-cli", "simulate", "--hold", "jump"]).is_err());
    }

    #[test]
    fn invalid_config_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "camera:\n  near: 0.0").unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("near"));
    }
}
