//! Command-line driver for the generation tracker.
//!
//! Submits one generation job, attaches a progress feed, and prints
//! events until the job reaches a terminal state. Ctrl-C cancels the
//! active job (best-effort on the backend, always terminal locally).
//!
//! Usage: `adstudio <project-id> <step> <input> [--poll]`
//!
//! `<input>` is the step's prerequisite: a path to a brief JSON file
//! for `concept`, otherwise the id of the upstream artifact (concept
//! id for `screenplays`, screenplay id for `storyboard`, storyboard id
//! for `production`).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adstudio_core::workflow::WorkflowStep;
use adstudio_pipeline::api::StepParams;
use adstudio_pipeline::config::PipelineConfig;
use adstudio_pipeline::events::JobEvent;
use adstudio_pipeline::tracker::{GenerationTracker, ProgressSource};

const USAGE: &str = "Usage: adstudio <project-id> <step> <input> [--poll]";

/// Turn the positional `<step> <input>` pair into typed submission
/// parameters.
fn step_params(step: WorkflowStep, input: &str) -> anyhow::Result<StepParams> {
    Ok(match step {
        WorkflowStep::Concept => {
            let brief = serde_json::from_str(&std::fs::read_to_string(input)?)?;
            StepParams::Concept { brief }
        }
        WorkflowStep::Screenplays => StepParams::Screenplays {
            concept_id: input.to_string(),
        },
        WorkflowStep::Storyboard => StepParams::Storyboard {
            screenplay_id: input.to_string(),
        },
        WorkflowStep::Production => StepParams::Production {
            storyboard_id: input.to_string(),
        },
        other => anyhow::bail!("Step '{other}' is not generated by the pipeline"),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adstudio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (project_id, step_arg, input) = match (args.get(1), args.get(2), args.get(3)) {
        (Some(project_id), Some(step), Some(input)) => {
            (project_id.clone(), step.clone(), input.clone())
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };
    let step = WorkflowStep::from_str_value(&step_arg)?;
    let params = step_params(step, &input)?;
    let source = if args.iter().any(|a| a == "--poll") {
        ProgressSource::Poll
    } else {
        ProgressSource::Stream
    };

    let tracker = GenerationTracker::new(PipelineConfig::from_env());

    let handle = tracker.start_generation(&project_id, &params).await?;
    println!(
        "Job {} submitted: ~{}s, ~{:.2} estimated cost",
        handle.job_id, handle.estimated_time, handle.estimated_cost
    );

    let mut events = tracker.subscribe_to_progress(&handle.job_id, source);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Cancelling...");
                if let Err(e) = tracker.cancel_generation().await {
                    tracing::warn!(error = %e, "Nothing to cancel");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(JobEvent::Progress { percent, message, estimated_time_remaining, .. }) => {
                    let note = message.unwrap_or_default();
                    let eta = estimated_time_remaining
                        .map(|s| format!(" (~{s}s left)"))
                        .unwrap_or_default();
                    println!("  {percent:>3}%{eta} {note}");
                }
                Ok(JobEvent::Partial { artifact }) => {
                    println!("  partial {} received", artifact.kind());
                }
                Ok(JobEvent::Completed { .. }) => {
                    println!("Done.");
                    break;
                }
                Ok(JobEvent::Failed { message }) => {
                    eprintln!("Failed: {message}");
                    break;
                }
                Err(_) => break,
            }
        }
    }

    let state = tracker.state();
    if let Some(error) = state.error {
        eprintln!("Final state: {error}");
    }
    Ok(())
}
