//! CLI module for clinroute
//!
//! Provides commands:
//! - `ask` / `stream`: route one prompt for a task
//! - `consensus`: ask several models and score agreement
//! - `providers` / `health` / `models`: inspect the provider set
//! - `estimate`: local token estimate

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clinroute_llm::{
    CancellationToken, ConsensusOrchestrator, HeuristicEstimator, LlmRequest, LlmResponse,
    ModelChoice, ResponseFormat, TaskType, TiktokenEstimator, TokenEstimator,
};
use tracing::warn;

use crate::config::load_config;

/// Clinroute CLI
#[derive(Parser, Debug)]
#[command(name = "clinroute")]
#[command(about = "Multi-provider LLM routing with circuit breakers and fallback")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options shared by the prompt-sending commands
#[derive(clap::Args, Debug)]
pub struct PromptArgs {
    /// User prompt
    pub prompt: String,
    /// Task category used for routing
    #[arg(short, long, default_value = "conversation", value_parser = parse_task)]
    pub task: TaskType,
    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,
    /// JSON context appended to the prompt
    #[arg(long, value_parser = parse_json)]
    pub context: Option<serde_json::Value>,
    /// Ask for a JSON object
    #[arg(long)]
    pub json: bool,
    /// Output token limit (defaults to the task budget)
    #[arg(long)]
    pub max_tokens: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route a prompt and print the answer
    Ask {
        #[command(flatten)]
        prompt: PromptArgs,
        /// Print every attempt made
        #[arg(long)]
        report: bool,
    },
    /// Route a prompt and stream the answer
    Stream {
        #[command(flatten)]
        prompt: PromptArgs,
    },
    /// Ask several models and score their agreement
    Consensus {
        #[command(flatten)]
        prompt: PromptArgs,
        /// provider/model to ask (repeatable; defaults to the config)
        #[arg(short, long = "model", value_parser = parse_choice)]
        models: Vec<ModelChoice>,
        /// provider/model reviewing the answers
        #[arg(long, value_parser = parse_choice)]
        critic: Option<ModelChoice>,
        /// Skip the critique pass
        #[arg(long)]
        no_critic: bool,
    },
    /// List providers, candidate chains and breaker states
    Providers,
    /// Probe every provider
    Health,
    /// List models offered by a provider
    Models {
        /// Provider name
        provider: String,
    },
    /// Estimate the token count of a text
    Estimate {
        /// Text to measure
        text: String,
        /// Use the cl100k tokenizer instead of the heuristic
        #[arg(long)]
        tiktoken: bool,
    },
}

fn parse_task(s: &str) -> std::result::Result<TaskType, String> {
    s.parse()
}

fn parse_choice(s: &str) -> std::result::Result<ModelChoice, String> {
    s.parse().map_err(|e: clinroute_llm::Error| e.to_string())
}

fn parse_json(s: &str) -> std::result::Result<serde_json::Value, String> {
    serde_json::from_str(s).or_else(|_| Ok(serde_json::Value::String(s.to_string())))
}

impl PromptArgs {
    fn to_request(&self, cancel: CancellationToken) -> LlmRequest {
        let mut request = LlmRequest::new(&self.prompt).with_cancellation(cancel);
        if let Some(system) = &self.system {
            request = request.with_system_prompt(system);
        }
        if let Some(context) = &self.context {
            request = request.with_context(context.clone());
        }
        if self.json {
            request = request.with_response_format(ResponseFormat::Json);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            child.cancel();
        }
    });
    token
}

fn print_failure(response: &LlmResponse) -> Result<()> {
    bail!(
        "all candidates failed (last: {}/{}): {}",
        response.provider,
        response.model,
        response.error_message()
    )
}

/// Run the CLI command
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Estimate { text, tiktoken }) => {
            let count = if tiktoken {
                TiktokenEstimator.estimate(&text)
            } else {
                HeuristicEstimator.estimate(&text)
            };
            println!("{count}");
            Ok(())
        }
        Some(command) => run_routed(command).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

async fn run_routed(command: Commands) -> Result<()> {
    let config = load_config()?;
    let router = Arc::new(config.build_router()?);

    match command {
        Commands::Ask { prompt, report } => {
            let request = prompt.to_request(cancel_on_ctrl_c());
            let result = router.route_with_report(prompt.task, &request).await?;
            if report {
                for attempt in &result.attempts {
                    eprintln!(
                        "{}/{} {}ms {}",
                        attempt.provider,
                        attempt.model,
                        attempt.latency_ms,
                        serde_json::to_string(&attempt.outcome)?
                    );
                }
            }
            if !result.response.success {
                return print_failure(&result.response);
            }
            println!("{}", result.response.content);
        }
        Commands::Stream { prompt } => {
            let request = prompt.to_request(cancel_on_ctrl_c());
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
            let printer = tokio::spawn(async move {
                let mut stdout = std::io::stdout();
                while let Some(token) = rx.recv().await {
                    let _ = write!(stdout, "{token}");
                    let _ = stdout.flush();
                }
            });
            let response = router.route_stream(prompt.task, &request, tx).await?;
            printer.await.context("stream printer panicked")?;
            println!();
            if !response.success {
                return print_failure(&response);
            }
        }
        Commands::Consensus {
            prompt,
            models,
            critic,
            no_critic,
        } => {
            let models = if models.is_empty() { config.consensus.models.clone() } else { models };
            if models.is_empty() {
                bail!("no models given; pass --model provider/model or set consensus.models");
            }
            let mut orchestrator = ConsensusOrchestrator::new(Arc::clone(&router));
            if !no_critic {
                if let Some(critic) = critic.or_else(|| config.consensus.critic.clone()) {
                    orchestrator = orchestrator.with_critic(critic);
                }
            }

            let request = prompt.to_request(cancel_on_ctrl_c());
            let result = orchestrator.run(prompt.task, &models, &request).await?;
            for (choice, response) in models.iter().zip(&result.responses) {
                if response.success {
                    println!("── {choice}\n{}\n", response.content);
                } else {
                    println!("── {choice} (failed: {})\n", response.error_message());
                }
            }
            println!("agreement: {:.2}", result.agreement);
            match result.final_answer {
                Some(answer) => println!("\n{answer}"),
                None => bail!("no model answered successfully"),
            }
        }
        Commands::Providers => {
            println!("Configured: {}", router.configured_providers().join(", "));
            println!("Registered: {}\n", router.list_providers().join(", "));
            for task in TaskType::ALL {
                let chain: Vec<String> = router.candidates(task).iter().map(ToString::to_string).collect();
                println!("{:<16} {}", task.as_str(), chain.join(" -> "));
            }
            let breakers = router.breakers().snapshot();
            if !breakers.is_empty() {
                println!();
                for breaker in breakers {
                    println!("{:<12} {} ({} failures)", breaker.name, breaker.state, breaker.failure_count);
                }
            }
        }
        Commands::Health => {
            for status in router.provider_status().await {
                let mark = match (status.configured, status.reachable) {
                    (false, _) => "not configured",
                    (true, true) => "ok",
                    (true, false) => "unreachable",
                };
                println!("{:<12} {mark}", status.name);
            }
        }
        Commands::Models { provider } => {
            let Some(adapter) = router.get(&provider) else {
                bail!("unknown provider '{provider}'");
            };
            let cancel = cancel_on_ctrl_c();
            let models = tokio::select! {
                models = adapter.list_models() => models?,
                () = cancel.cancelled() => bail!("cancelled"),
            };
            for model in models {
                println!("{model}");
            }
        }
        Commands::Estimate { .. } => {}
    }

    Ok(())
}
