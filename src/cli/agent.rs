//! Agent command handler (interactive + single-message mode).

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use uuid::Uuid;

use tether::agent::{LoopObserver, LoopStop};
use tether::config::Config;
use tether::orchestrator::{Orchestrator, RunRequest, RunResult};
use tether::utils::string::preview;

/// Prints streamed text to stdout and tool activity to stderr.
struct TerminalObserver;

impl LoopObserver for TerminalObserver {
    fn on_partial_reply(&self, text: &str) {
        print!("{}", text);
        let _ = io::stdout().flush();
    }

    fn on_tool_start(&self, name: &str, args: &Value) {
        eprintln!("\n[tool] {} {}", name, preview(&args.to_string(), 120));
    }

    fn on_tool_end(&self, name: &str, result: &str) {
        eprintln!("[tool] {} -> {}", name, preview(result, 120));
    }
}

/// Interactive or single-message agent mode.
pub(crate) async fn cmd_agent(
    message: Option<String>,
    session: Option<String>,
    provider: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    if let Err(e) = config.validate() {
        eprintln!("Warning: {}", e);
    }

    let orchestrator =
        Orchestrator::from_config(config).with_context(|| "Failed to initialize agent")?;

    let session_id = session.unwrap_or_else(|| format!("cli:{}", Uuid::new_v4()));
    let make_request = |input: &str| {
        let mut request = RunRequest::new(&session_id, input);
        if let Some(p) = provider.as_deref() {
            request = request.with_provider(p);
        }
        if let Some(m) = model.as_deref() {
            request = request.with_model(m);
        }
        request
    };

    if let Some(msg) = message {
        // Single message mode
        let result = run_turn(&orchestrator, make_request(&msg)).await?;
        println!();
        report(&result);
        if let Some(failure) = result.failure {
            bail!("{} ({})", failure.message, failure.kind);
        }
        return Ok(());
    }

    // Interactive mode
    println!("Tether Interactive Agent (session {})", session_id);
    println!("Type your message and press Enter. Ctrl-C cancels a reply; 'quit' or 'exit' stops.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => {
                // EOF
                println!();
                break;
            }
            Ok(_) => {
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "quit" || input == "exit" {
                    println!("Goodbye!");
                    break;
                }

                println!();
                match run_turn(&orchestrator, make_request(input)).await {
                    Ok(result) => {
                        println!();
                        report(&result);
                        println!();
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        eprintln!();
                    }
                }
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
    }

    orchestrator.shutdown();
    Ok(())
}

/// Submit one turn, cancelling it on Ctrl-C.
async fn run_turn(orchestrator: &Orchestrator, request: RunRequest) -> Result<RunResult> {
    let session_id = request.session_id.clone();
    let turn = orchestrator.submit(request, Arc::new(TerminalObserver));
    tokio::pin!(turn);

    loop {
        tokio::select! {
            result = &mut turn => return Ok(result?),
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                if orchestrator.cancel(&session_id) {
                    eprintln!("\n[cancelling]");
                }
            }
        }
    }
}

fn report(result: &RunResult) {
    match result.stop {
        LoopStop::Cancelled => eprintln!("[cancelled]"),
        LoopStop::IterationCap => eprintln!(
            "[stopped after {} model calls without a final answer]",
            result.iterations
        ),
        LoopStop::Failed => {
            if let Some(failure) = result.failure.as_ref() {
                eprintln!("[{}] {}", failure.kind, failure.message);
            }
        }
        LoopStop::Completed => {}
    }
    tracing::debug!(
        input_tokens = result.usage.input_tokens,
        output_tokens = result.usage.output_tokens,
        "Turn usage"
    );
}
