use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use imagegen::config::DEFAULT_BASE_URL;
use imagegen::display::{format_timestamp, preview_prompt};
use imagegen::session::EXAMPLE_PROMPTS;
use imagegen::{
    Completion, Config, Controller, HistoryView, HttpBackend, Phase, SubmitRejected, UserIdentity,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  generate [prompt]   submit the given prompt (or the current one)
  prompt <text>       set the prompt without submitting
  examples            list example prompts
  example <n>         copy example n into the prompt
  abort               give up on the pending generation
  status              show prompt, state and current result
  recent              list recent generations from this session
  select <id>         show a recent generation again
  clear               clear recent generations
  history             refresh the server-side history
  details [id]        open (or re-show) a server-side history entry
  close               close the open history entry
  clear-history       clear the displayed server-side history
  health              query the service health endpoint
  quit";

#[derive(Parser)]
#[command(name = "imagegen", about = "Generate interior and exterior design images")]
struct Cli {
    /// Base URL of the generation service
    #[arg(long, env = "IMAGEGEN_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
}

// application entry point
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let backend = Arc::new(HttpBackend::new(Config::new(cli.base_url)));
    let controller = Controller::with_backend(UserIdentity::generate(), backend);
    let shutdown = CancellationToken::new();

    println!("session user: {}", controller.user_id());
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();

        match command {
            "" => {}
            "quit" | "exit" => break,
            "generate" => {
                if !arg.is_empty() {
                    controller.set_prompt(arg).await;
                }
                spawn_generation(controller.clone(), shutdown.clone());
            }
            "prompt" => controller.set_prompt(arg).await,
            "examples" => {
                for (i, example) in EXAMPLE_PROMPTS.iter().enumerate() {
                    println!("  {i}: {example}");
                }
            }
            "example" => {
                let applied = match arg.parse::<usize>() {
                    Ok(index) => controller.apply_example(index).await,
                    Err(_) => false,
                };
                if applied {
                    println!("prompt: {}", controller.session().await.prompt());
                } else {
                    println!("no such example (or a generation is running)");
                }
            }
            "abort" => {
                if !controller.abandon_generation().await {
                    println!("nothing to abort");
                }
            }
            "status" => print_status(&controller).await,
            "recent" => print_recent(&controller).await,
            "select" => match arg.parse::<u64>() {
                Ok(id) => match controller.select_history_entry(id).await {
                    Ok(()) => print_status(&controller).await,
                    Err(err) => println!("{err}"),
                },
                Err(_) => println!("usage: select <id>"),
            },
            "clear" => controller.clear_local_history().await,
            "history" => spawn_refresh(controller.clone(), shutdown.clone()),
            "details" => {
                let entry = if arg.is_empty() {
                    controller.history_details().await
                } else {
                    controller.open_history_details(arg).await
                };
                match entry {
                    Some(entry) => {
                        println!("prompt:    {}", entry.prompt);
                        println!("generated: {}", format_timestamp(&entry.timestamp));
                        println!("user:      {}", entry.user_id);
                    }
                    None if arg.is_empty() => println!("no details open"),
                    None => println!("no history entry {arg}"),
                }
            }
            "close" => controller.close_history_details().await,
            "clear-history" => controller.clear_viewed_history().await,
            "health" => match controller.health().await {
                Ok(health) => println!(
                    "status: {} (gpu: {}, model loaded: {})",
                    health.status, health.gpu_available, health.model_loaded
                ),
                Err(err) => println!("{err}"),
            },
            "help" => println!("{HELP}"),
            other => println!("unknown command: {other}"),
        }
    }

    shutdown.cancel();
    Ok(())
}

fn spawn_generation(controller: Controller, shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            outcome = controller.submit_current() => match outcome {
                Ok(Completion::Applied) => print_status(&controller).await,
                Ok(Completion::Superseded) => println!("generation abandoned"),
                Err(SubmitRejected::InFlight) => println!("a generation is already running"),
                Err(err) => println!("{err}"),
            },
            _ = shutdown.cancelled() => {}
        }
    });
}

fn spawn_refresh(controller: Controller, shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            completion = controller.refresh_history() => {
                if completion == Completion::Applied {
                    print_history(&controller).await;
                }
            }
            _ = shutdown.cancelled() => {}
        }
    });
}

async fn print_status(controller: &Controller) {
    let session = controller.session().await;
    println!("prompt: {}", session.prompt());
    match session.phase() {
        Phase::Submitting => println!("generating..."),
        Phase::Idle | Phase::IdleWithResult | Phase::IdleWithError => {}
    }
    if let Some(error) = session.error() {
        println!("error: {error}");
    }
    if let Some(result) = session.result() {
        println!("image: {} bytes of data", result.image.len());
        println!("original prompt: {}", result.prompt);
        if let Some(enhanced) = &result.enhanced_prompt {
            println!("enhanced prompt: {enhanced}");
        }
        println!("generated at: {}", format_timestamp(&result.timestamp));
    }
}

async fn print_recent(controller: &Controller) {
    let session = controller.session().await;
    if session.history().is_empty() {
        println!("no recent generations");
        return;
    }
    for entry in session.history().iter() {
        println!(
            "  [{}] {} ({})",
            entry.id,
            preview_prompt(&entry.prompt),
            format_timestamp(&entry.timestamp)
        );
    }
}

async fn print_history(controller: &Controller) {
    let history = controller.history().await;
    match history.view() {
        HistoryView::NotLoaded | HistoryView::Loading => println!("loading history..."),
        HistoryView::Failed(err) => println!("error: {err}"),
        HistoryView::Loaded(entries) if entries.is_empty() => println!("no generation history yet"),
        HistoryView::Loaded(entries) => {
            println!("showing {} recent generations", entries.len());
            for entry in entries {
                println!(
                    "  [{}] {} ({})",
                    entry.id,
                    entry.prompt,
                    format_timestamp(&entry.timestamp)
                );
            }
        }
    }
}
