use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use smilepnp::pipeline::{
    default_report_name, CalibrationOutcome, InMemoryProject, RefineFlags, Session, SolverConfig,
    SolverError,
};
use tracing::{info, warn, Level};

/// Camera pose and calibration from 2D/3D landmarks.
#[derive(Debug, Parser)]
#[command(author, version, about = "SmilePnP camera pose and calibration solver")]
struct Cli {
    /// Path to the JSON project (tracks, scene, mapping and session state).
    #[arg(long)]
    project: PathBuf,

    /// Optional path to a JSON SolverConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild the mapping table from the clip's tracks.
    Sync,
    /// Solve the camera pose and move the camera.
    Solve {
        /// Camera to move. The scene's active camera is used if omitted.
        #[arg(long)]
        camera: Option<String>,
    },
    /// Refine the selected intrinsics and store them.
    Calibrate(CalibrateArgs),
    /// Restore the default intrinsics.
    Reset,
    /// Write the quality report.
    Report {
        /// Output file. Defaults to a timestamped name next to the project.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Remove one mapping row.
    Remove {
        /// Zero-based row index.
        index: usize,
    },
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    #[arg(long)]
    focal: bool,
    #[arg(long)]
    principal: bool,
    #[arg(long)]
    k1: bool,
    #[arg(long)]
    k2: bool,
    #[arg(long)]
    k3: bool,
}

impl CalibrateArgs {
    fn flags(&self) -> RefineFlags {
        RefineFlags {
            focal_length: self.focal,
            principal_point: self.principal,
            k1: self.k1,
            k2: self.k2,
            k3: self.k3,
        }
    }
}

fn init_logger() {
    use tracing_subscriber::fmt::time::SystemTime;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .with_timer(SystemTime)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

fn load_config(path: Option<&Path>) -> Result<SolverConfig> {
    let config = match path {
        Some(path) => load_json_file::<SolverConfig>(path)?,
        None => SolverConfig::default(),
    };
    Ok(config)
}

fn save_project(project: &InMemoryProject, path: &Path) -> Result<()> {
    fs::write(path, project.to_json()?).with_context(|| format!("writing {}", path.display()))
}

/// Run one command against the project file and return the solver message.
fn run(cli: &Cli) -> Result<String> {
    let mut project: InMemoryProject = load_json_file(&cli.project)?;
    let config = load_config(cli.config.as_deref())?;
    let mut session = Session::new(config)?.with_state(project.state.clone());

    let mut changed = true;
    match &cli.command {
        Command::Sync => {
            session.sync_landmarks(&project.tracks, &project.scene, &mut project.mapping)?;
        }
        Command::Solve { camera } => {
            session.solve_pose(
                &project.tracks,
                &mut project.scene,
                &project.mapping,
                camera.as_deref(),
            )?;
        }
        Command::Calibrate(args) => {
            let outcome = session.calibrate(
                &mut project.tracks,
                &project.scene,
                &project.mapping,
                &args.flags(),
            )?;
            if let CalibrationOutcome::Applied(result) = &outcome {
                info!("focal length now {:.3} px", result.camera.focal_px);
            }
        }
        Command::Reset => session.reset_calibration(&mut project.tracks)?,
        Command::Report { output } => {
            let path = output.clone().unwrap_or_else(|| {
                cli.project
                    .with_file_name(default_report_name(&Local::now()))
            });
            session.generate_report(&project.tracks, &project.scene, &project.mapping, &path)?;
            changed = false;
        }
        Command::Remove { index } => {
            if !session.remove_mapping(&mut project.mapping, *index) {
                warn!("no mapping row at index {index}");
                changed = false;
            }
        }
    }

    let message = session.message().to_string();
    if changed {
        project.state = session.into_state();
        save_project(&project, &cli.project)?;
    }
    Ok(message)
}

fn main() {
    init_logger();
    if let Err(err) = try_main() {
        match err.downcast_ref::<SolverError>() {
            Some(solver) => eprintln!("error[{}]: {err}", solver.code()),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let message = run(&cli)?;
    if !message.is_empty() {
        println!("{message}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smilepnp::core::synthetic::{look_at, project_all, scattered_points};
    use smilepnp::core::{CameraModel, ImageSize, Pt3, Vec3};
    use smilepnp::pipeline::{ClipInfo, ObjectKind, SceneGraph};
    use tempfile::tempdir;

    fn synthetic_project() -> InMemoryProject {
        let camera = CameraModel::pinhole(2000.0, ImageSize::new(1920, 1080)).unwrap();
        let (r, t) = look_at(&Pt3::new(3.0, -6.0, 3.5), &Pt3::origin(), &Vec3::z());
        let set = project_all(&camera, &r, &t, &scattered_points()).unwrap();

        let mut project = InMemoryProject::new(ClipInfo::new("shot.mp4", 1920, 1080));
        for c in set.iter() {
            project.tracks.set_marker_px(c.label.clone(), 1, c.point2d);
            project.scene.add_empty(c.label.clone(), c.point3d);
        }
        project.scene.add_camera("Camera");
        project
    }

    fn cli(project: &Path, command: Command) -> Cli {
        Cli {
            project: project.to_path_buf(),
            config: None,
            command,
        }
    }

    #[test]
    fn parses_calibrate_flags() {
        let cli = Cli::parse_from([
            "smilepnp",
            "--project",
            "p.json",
            "calibrate",
            "--focal",
            "--k1",
        ]);
        let Command::Calibrate(args) = cli.command else {
            panic!("expected calibrate");
        };
        let flags = args.flags();
        assert!(flags.focal_length && flags.k1);
        assert!(!flags.principal_point && !flags.k2 && !flags.k3);
    }

    #[test]
    fn sync_solve_report_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.json");
        save_project(&synthetic_project(), &path).unwrap();

        let message = run(&cli(&path, Command::Sync)).unwrap();
        assert_eq!(message, "12 correspondences initialized.");

        let message = run(&cli(&path, Command::Solve { camera: None })).unwrap();
        assert!(message.starts_with("Reprojection error : 0.000 px"));

        let project: InMemoryProject = load_json_file(&path).unwrap();
        assert_eq!(project.state.last_pairs.len(), 12);
        let placed = project.scene.camera_transform("Camera").unwrap();
        assert!((placed.location - Vec3::new(3.0, -6.0, 3.5)).norm() < 1e-6);

        let report = dir.path().join("out").join("report.txt");
        run(&cli(
            &path,
            Command::Report {
                output: Some(report.clone()),
            },
        ))
        .unwrap();
        let text = fs::read_to_string(report).unwrap();
        assert!(text.contains("SmilePnP Quality Report"));
    }

    #[test]
    fn solve_with_mesh_landmark_still_saves() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.json");
        let mut project = synthetic_project();
        let p1 = project.scene.object("P1").unwrap().world_position;
        project.scene.add_object("P1", ObjectKind::Mesh, p1);
        save_project(&project, &path).unwrap();

        run(&cli(&path, Command::Sync)).unwrap();
        let message = run(&cli(&path, Command::Solve { camera: None })).unwrap();
        assert!(message.starts_with("Reprojection error : "));

        let project: InMemoryProject = load_json_file(&path).unwrap();
        assert_eq!(project.state.last_pairs.len(), 12);
        assert!(project.state.last_pairs.iter().all(|r| r.error_px.is_some()));
    }

    #[test]
    fn report_defaults_next_to_project() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.json");
        save_project(&synthetic_project(), &path).unwrap();

        run(&cli(&path, Command::Report { output: None })).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("Quality_Report_"))
            .collect();
        assert_eq!(names.len(), 1);
        // Quality_Report_YYYYmmdd_HHMM.txt
        assert_eq!(names[0].len(), "Quality_Report_".len() + 13 + ".txt".len());
    }

    #[test]
    fn solver_errors_keep_their_code() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.json");
        save_project(&synthetic_project(), &path).unwrap();

        let err = run(&cli(&path, Command::Solve { camera: None })).unwrap_err();
        let solver = err.downcast_ref::<SolverError>().unwrap();
        assert_eq!(solver.code(), "mapping_error");
    }

    #[test]
    fn config_file_is_validated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "pose_refine": { "max_iters": 0 } }"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        let err = Session::new(config).unwrap_err();
        assert_eq!(err.code(), "solver_unavailable");
    }
}
