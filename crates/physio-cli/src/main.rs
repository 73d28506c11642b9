//! `physio` command-line tool
//!
//! - `physio exercises`: list the available exercises
//! - `physio show <name>`: print an exercise's steps and requirements
//! - `physio replay`: calibrate and score an exercise over a recorded
//!   frame stream

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use physio_pose::CheckKind;
use physio_session::{
    load_recording, replay, ExerciseDefinition, ExerciseEvent, ExerciseLibrary, ReplaySummary,
    SessionConfig,
};

#[derive(Parser, Debug)]
#[command(name = "physio", about = "Guided physiotherapy exercise engine", version)]
struct Args {
    /// Directory of additional exercise definitions (*.json)
    #[arg(long, global = true, value_name = "DIR")]
    exercises_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available exercises
    Exercises,

    /// Print the steps of an exercise
    Show {
        /// Exercise name (case-insensitive)
        name: String,
    },

    /// Run calibration and an exercise over a recorded frame stream
    Replay {
        /// Exercise name (case-insensitive)
        #[arg(long)]
        exercise: String,

        /// JSON-lines recording of SDK frames
        #[arg(long, value_name = "PATH")]
        recording: PathBuf,

        /// Session configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let library = load_library(args.exercises_dir.as_ref())?;

    match args.command {
        Command::Exercises => {
            for exercise in library.iter() {
                println!(
                    "{:<45} {:>2} steps  {:>5.1}s",
                    exercise.exercise_name,
                    exercise.len(),
                    exercise.total_duration()
                );
            }
        }
        Command::Show { name } => {
            let exercise = library.require(&name)?;
            print_exercise(exercise);
        }
        Command::Replay {
            exercise,
            recording,
            config,
            json,
        } => {
            let exercise = library.require(&exercise)?;
            let config = SessionConfig::load(config.as_deref())
                .context("Failed to load session configuration")?;
            let frames = load_recording(&recording)
                .with_context(|| format!("Failed to read recording {}", recording.display()))?;
            if frames.is_empty() {
                bail!("Recording {} contains no frames", recording.display());
            }
            info!("Replaying {} frames of {}", frames.len(), recording.display());

            let summary = replay(&frames, exercise, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(exercise, &summary);
            }
        }
    }

    Ok(())
}

fn load_library(dir: Option<&PathBuf>) -> Result<ExerciseLibrary> {
    let mut library = ExerciseLibrary::builtin()?;
    if let Some(dir) = dir {
        let extra = ExerciseLibrary::from_dir(dir)
            .with_context(|| format!("Failed to load exercises from {}", dir.display()))?;
        library.extend(extra);
    }
    Ok(library)
}

fn print_exercise(exercise: &ExerciseDefinition) {
    println!(
        "{} ({} steps, {:.1}s of holds)",
        exercise.exercise_name,
        exercise.len(),
        exercise.total_duration()
    );

    for (i, step) in exercise.steps.iter().enumerate() {
        println!();
        println!("{}. {} [{}s]", i + 1, step.name, step.duration_seconds);
        if !step.instructions.is_empty() {
            println!("   {}", step.instructions);
        }

        let req = &step.requirements;
        for (pose, required) in &req.required_poses {
            println!("   pose   {:<28} {}", pose, required);
        }
        for (angle, target) in &req.target_angles {
            println!(
                "   angle  {:<28} {}° ±{}°",
                angle, target, req.tolerance.angle_tolerance
            );
        }
        if exercise.step_requires_motion(step) {
            println!("   motion required");
        }
    }
}

fn print_summary(exercise: &ExerciseDefinition, summary: &ReplaySummary) {
    match &summary.calibration {
        Ok(metrics) => println!(
            "Calibration: ok ({} samples) height={:.0}mm arm={:.0}mm hips={:.0}mm shoulders={:.0}mm leg={:.0}mm",
            summary.calibration_samples,
            metrics.height,
            metrics.arm_length,
            metrics.hip_width,
            metrics.shoulder_width,
            metrics.leg_length
        ),
        Err(failure) => {
            println!("Calibration: {} - {}", failure.kind(), failure);
            println!("  {}", failure.advice());
            return;
        }
    }

    for event in &summary.events {
        match event {
            ExerciseEvent::StepStarted { index, name, .. } => {
                println!("  > step {}/{}: {}", index + 1, exercise.len(), name)
            }
            ExerciseEvent::StepCompleted { index, .. } => {
                println!("  ✓ step {} complete", index + 1)
            }
            ExerciseEvent::ExerciseCompleted { exercise_name } => {
                println!("{} complete", exercise_name)
            }
        }
    }

    if !summary.completed {
        println!(
            "Stopped at step {}/{} after {} frames",
            summary.final_step_index + 1,
            exercise.len(),
            summary.frames
        );
        if let Some(report) = &summary.last_report {
            println!(
                "Last tick: accuracy {:.0}% ({:?}), hold {:.1}s",
                report.accuracy, report.band, report.hold_seconds
            );
            for check in report.checks.iter().filter(|c| !c.ok) {
                let kind = match check.kind {
                    CheckKind::Pose => "pose",
                    CheckKind::Angle => "angle",
                };
                println!("  {} {}: {}", kind, check.name, check.message);
            }
        }
    }
}
