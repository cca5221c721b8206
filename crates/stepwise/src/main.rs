//! A simple program demonstrates how to use `stepwise` as a library.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use stepwise::core::event::ProgressNotice;
use stepwise::core::tool::ToolOutput;
use stepwise::core::{AgentError, RunEvent, RunResult};
use stepwise::{Config, Session, SessionBuilder};
use stepwise_openai_model::OpenAIProvider;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

const BAR_CHAR: &str = "▎";

#[derive(Parser, Debug)]
#[command(name = "stepwise", about = "Chat with a tool-using agent", version)]
struct Args {
    /// Print answers while they are being generated.
    #[arg(long)]
    stream: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let history = match config.load_history() {
        Ok(history) => history,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let model_provider = match OpenAIProvider::new(config.openai_config()) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("failed to create the model provider: {err}");
            return ExitCode::FAILURE;
        }
    };

    let system_prompt = config.system_prompt.clone().unwrap_or_else(|| {
        include_str!("./system_prompt.md").replace("{{HOST_OS}}", host_os())
    });
    let (notice_tx, mut notice_rx) = unbounded_channel();

    let mut builder = SessionBuilder::with_model_provider(model_provider)
        .with_system_prompt(system_prompt)
        .with_history(history)
        .with_event_sink(notice_tx);
    if let Some(timeout) = config.timeout {
        builder = builder.with_timeout(timeout);
    }
    let mut session = builder.build();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if args.stream {
            stream_answer(&mut session, line, &mut notice_rx).await;
        } else {
            wait_for_answer(&mut session, line, &mut notice_rx).await;
        }
    }

    ExitCode::SUCCESS
}

async fn wait_for_answer(
    session: &mut Session,
    line: &str,
    notice_rx: &mut UnboundedReceiver<ProgressNotice>,
) {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(progress_style);
    progress_bar.set_message("🤔 Thinking...");
    progress_bar.enable_steady_tick(Duration::from_millis(100));

    let run = session.send_message(line);
    tokio::pin!(run);
    let result = loop {
        select! {
            result = &mut run => break result,
            Some(notice) = notice_rx.recv() => {
                progress_bar.println(format_notice(&notice));
            }
        }
    };
    while let Ok(notice) = notice_rx.try_recv() {
        progress_bar.println(format_notice(&notice));
    }
    progress_bar.finish_and_clear();

    match result {
        Ok(RunResult { response, sources }) => {
            println!(
                "{}🤖 {}",
                BAR_CHAR.bright_cyan(),
                response.content.bright_white()
            );
            print_sources(&sources);
        }
        Err(err) => print_error(&err),
    }
}

async fn stream_answer(
    session: &mut Session,
    line: &str,
    notice_rx: &mut UnboundedReceiver<ProgressNotice>,
) {
    let mut stream = session.stream_message(line);
    let mut started = false;
    loop {
        let event = select! {
            event = stream.next() => event,
            Some(notice) = notice_rx.recv() => {
                if started {
                    println!();
                    started = false;
                }
                println!("{}", format_notice(&notice));
                continue;
            }
        };

        match event {
            Some(Ok(RunEvent::Delta(delta))) => {
                if !started {
                    print!("{}🤖 ", BAR_CHAR.bright_cyan());
                    started = true;
                }
                print!("{}", delta.bright_white());
                std::io::stdout().flush().ok();
            }
            Some(Ok(RunEvent::Finished(result))) => {
                if started {
                    println!();
                }
                print_sources(&result.sources);
            }
            Some(Err(err)) => {
                if started {
                    println!();
                }
                print_error(&err);
            }
            None => break,
        }
    }
}

fn format_notice(notice: &ProgressNotice) -> String {
    format!(
        "{}{} {}",
        BAR_CHAR.bright_black(),
        notice.source.dimmed(),
        notice.message.dimmed()
    )
}

fn print_sources(sources: &[ToolOutput]) {
    if sources.is_empty() {
        return;
    }
    println!("{}📎 Sources:", BAR_CHAR.bright_green());
    for source in sources {
        println!(
            "{}   {} {}",
            BAR_CHAR.bright_green(),
            source.tool_name.bold(),
            source.arguments
        );
    }
}

fn print_error(err: &AgentError) {
    println!("{}⚠️  {}", BAR_CHAR.bright_red(), err.bright_red());
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

#[inline]
fn host_os() -> &'static str {
    let os = std::env::consts::OS;
    match os {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        _ => "some other OS",
    }
}
