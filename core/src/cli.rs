use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogConfig, CONFIG_PATH_VAR};
use crate::esolangs::Registry;
use crate::host::{write_events, Host};
use crate::types::{ButtonAction, ButtonArgs, Command, Event, InputKind, LangOptions};

#[derive(Parser)]
#[command(name = "esohost")]
#[command(about = "Esohost - Esoteric language interpreters behind a command/event protocol", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Speak the JSON-lines protocol over stdin/stdout
    Serve {
        /// Language to create before the first command (overrides config)
        #[arg(short = 'l', long = "lang")]
        lang: Option<String>,

        /// Language option as key=value; repeatable
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, JsonValue)>,
    },

    /// Run a program to completion
    Run {
        /// Language tag
        #[arg(short = 'l', long = "lang")]
        lang: String,

        /// Source file
        file: PathBuf,

        /// Program input (defaults to stdin, read when first requested)
        #[arg(short = 'i', long = "input")]
        input: Option<String>,

        /// Language option as key=value; repeatable
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, JsonValue)>,
    },

    /// List registered languages and what they support
    Languages,

    /// Strip a program down to its instructions
    Minify {
        /// Language tag
        #[arg(short = 'l', long = "lang")]
        lang: String,

        /// Source file
        file: PathBuf,
    },

    /// Generate a program that prints the given text
    TextToCode {
        /// Language tag
        #[arg(short = 'l', long = "lang")]
        lang: String,

        /// Text the generated program should print
        text: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    use std::env;

    if let Some(config_path) = &cli.config {
        env::set_var(CONFIG_PATH_VAR, config_path);
    }

    let config = Config::load()?;
    init_logging(&config.log);

    match cli.command {
        Commands::Serve { lang, options } => serve(&config, lang, options).await?,

        Commands::Run {
            lang,
            file,
            input,
            options,
        } => {
            let source = read_source(&file)?;
            let options = merge_options(LangOptions::new(), options);
            let failed = run_program(&config, &lang, options, source, input)?;
            if failed {
                bail!("{} program terminated with errors", lang);
            }
        }

        Commands::Languages => {
            let registry = Registry::builtin();
            for lang in registry.languages() {
                let caps = registry.create(lang, &LangOptions::default())?.capabilities();
                println!(
                    "  {:<10} | input: {:<5} | step: {:<5} | minify: {:<5} | textToCode: {}",
                    lang,
                    caps.supports_input,
                    caps.supports_step,
                    caps.supports_minify,
                    caps.supports_text_to_code
                );
            }
        }

        Commands::Minify { lang, file } => {
            let source = read_source(&file)?;
            let events = one_shot(
                &config,
                &lang,
                ButtonAction::Minify,
                ButtonArgs {
                    code: Some(source),
                    text: None,
                },
            )?;
            let code = events.into_iter().find_map(|event| match event {
                Event::MinifiedCode { code } => Some(code),
                _ => None,
            });
            match code {
                Some(code) => println!("{}", code),
                None => bail!("{} produced no minified code", lang),
            }
        }

        Commands::TextToCode { lang, text } => {
            let events = one_shot(
                &config,
                &lang,
                ButtonAction::TextToCode,
                ButtonArgs {
                    code: None,
                    text: Some(text),
                },
            )?;
            let code = events.into_iter().find_map(|event| match event {
                Event::TextToCode { code, .. } => Some(code),
                _ => None,
            });
            match code {
                Some(code) => println!("{}", code),
                None => bail!("{} produced no code", lang),
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Install the stderr subscriber. `RUST_LOG` wins over the configured filter.
pub fn init_logging(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    // A subscriber may already be installed by an embedding adapter
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse `key=value`. Values that are valid JSON keep their type, anything
/// else is taken as a string.
fn parse_option(raw: &str) -> std::result::Result<(String, JsonValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("missing option name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn merge_options(base: LangOptions, overrides: Vec<(String, JsonValue)>) -> LangOptions {
    overrides
        .into_iter()
        .fold(base, |options, (key, value)| options.with(key, value))
}

fn read_source(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

async fn serve(config: &Config, lang: Option<String>, options: Vec<(String, JsonValue)>) -> Result<()> {
    let mut host_config = config.host.clone();
    if lang.is_some() {
        host_config.language = lang;
        host_config.options = LangOptions::new();
    }
    host_config.options = merge_options(host_config.options, options);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            ctrl_c.cancel();
        }
    });

    let mut host = Host::from_config(&host_config);
    let mut stdout = tokio::io::stdout();
    write_events(&mut stdout, &host.boot(&host_config)).await?;

    info!("Serving protocol on stdin/stdout");
    host.serve(tokio::io::BufReader::new(tokio::io::stdin()), stdout, shutdown)
        .await
}

/// Create `lang`, press one button, and fail on any `Error` event.
fn one_shot(config: &Config, lang: &str, action: ButtonAction, args: ButtonArgs) -> Result<Vec<Event>> {
    let mut host = Host::from_config(&config.host);
    let mut events = host.handle(Command::SetLanguage {
        lang: lang.to_string(),
        options: LangOptions::new(),
    });
    events.extend(host.handle(Command::ButtonPress { action, args }));

    if let Some(message) = events.iter().find_map(|event| match event {
        Event::Error { message } => Some(message),
        _ => None,
    }) {
        bail!("{}", message);
    }
    Ok(events)
}

/// Drive a whole run through the protocol, answering input requests from
/// `input` or stdin. Returns whether any `Error` event was seen.
fn run_program(
    config: &Config,
    lang: &str,
    options: LangOptions,
    source: String,
    input: Option<String>,
) -> Result<bool> {
    let mut host = Host::from_config(&config.host);
    let mut feed = InputFeed::new(input);
    let mut stdout = std::io::stdout().lock();
    let mut failed = false;

    let mut pending = host.handle(Command::SetLanguage {
        lang: lang.to_string(),
        options,
    });
    pending.extend(host.handle(Command::LoadCode { source }));
    pending.extend(host.handle(Command::ButtonPress {
        action: ButtonAction::Interpret,
        args: ButtonArgs::default(),
    }));

    loop {
        let mut request = None;
        for event in pending.drain(..) {
            match event {
                Event::Print { text } => stdout.write_all(text.as_bytes())?,
                Event::Error { message } => {
                    failed = true;
                    eprintln!("{}", message);
                }
                Event::RequestByteInput => request = Some(InputKind::Byte),
                Event::RequestLineInput => request = Some(InputKind::Line),
                _ => {}
            }
        }
        stdout.flush()?;

        let Some(kind) = request else {
            break;
        };
        let value = feed.next(kind)?;
        debug!(?kind, %value, "Answering input request");
        pending = host.handle(Command::Unblock {
            value,
            pop_status: true,
        });
    }

    writeln!(stdout)?;
    Ok(failed)
}

/// Program input, consumed a character or a line at a time.
struct InputFeed {
    buffered: Option<Vec<char>>,
    position: usize,
}

impl InputFeed {
    fn new(input: Option<String>) -> Self {
        Self {
            buffered: input.map(|text| text.chars().collect()),
            position: 0,
        }
    }

    fn next(&mut self, kind: InputKind) -> Result<JsonValue> {
        let position = self.position;
        let chars = self.chars()?;
        let rest = &chars[position.min(chars.len())..];

        let (value, consumed) = match kind {
            // Exhausted input reads as 0
            InputKind::Byte => match rest.first() {
                Some(c) => (JsonValue::from(u32::from(*c)), 1),
                None => (JsonValue::from(0), 0),
            },
            InputKind::Line => {
                let end = rest.iter().position(|c| *c == '\n');
                let line: String = rest[..end.unwrap_or(rest.len())].iter().collect();
                let consumed = end.map_or(rest.len(), |end| end + 1);
                (JsonValue::String(line), consumed)
            }
        };
        self.position += consumed;
        Ok(value)
    }

    fn chars(&mut self) -> Result<&[char]> {
        if self.buffered.is_none() {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read program input from stdin")?;
            self.buffered = Some(text.chars().collect());
        }
        Ok(self.buffered.as_deref().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_option() {
        assert_eq!(parse_option("numType=u16").unwrap(), ("numType".to_string(), json!("u16")));
        assert_eq!(parse_option("reelLength=10").unwrap(), ("reelLength".to_string(), json!(10)));
        assert_eq!(parse_option("debug=true").unwrap(), ("debug".to_string(), json!(true)));
        assert!(parse_option("novalue").is_err());
        assert!(parse_option("=1").is_err());
    }

    #[test]
    fn test_input_feed() {
        let mut feed = InputFeed::new(Some("ab\nline two\nrest".to_string()));
        assert_eq!(feed.next(InputKind::Byte).unwrap(), json!(97));
        assert_eq!(feed.next(InputKind::Line).unwrap(), json!("b"));
        assert_eq!(feed.next(InputKind::Line).unwrap(), json!("line two"));
        assert_eq!(feed.next(InputKind::Line).unwrap(), json!("rest"));
        assert_eq!(feed.next(InputKind::Byte).unwrap(), json!(0));
        assert_eq!(feed.next(InputKind::Line).unwrap(), json!(""));
    }

    #[test]
    fn test_run_program_with_input() {
        let failed = run_program(
            &Config::default(),
            "brainfuck",
            LangOptions::new(),
            ",+.".to_string(),
            Some("A".to_string()),
        )
        .unwrap();
        assert!(!failed);
    }

    #[test]
    fn test_run_program_reports_failure() {
        let failed = run_program(
            &Config::default(),
            "length",
            LangOptions::new(),
            // a lone 23-character line pops an empty stack
            format!("{}\n", "x".repeat(23)),
            Some(String::new()),
        )
        .unwrap();
        assert!(failed);
    }

    #[test]
    fn test_one_shot_capability_missing() {
        let err = one_shot(
            &Config::default(),
            "befunge",
            ButtonAction::Minify,
            ButtonArgs {
                code: Some("@".to_string()),
                text: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("minify"));
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::parse_from(["esohost", "run", "--lang", "brainfuck", "prog.b", "-o", "numType=u16"]);
        match cli.command {
            Commands::Run { lang, file, options, .. } => {
                assert_eq!(lang, "brainfuck");
                assert_eq!(file, PathBuf::from("prog.b"));
                assert_eq!(options, vec![("numType".to_string(), json!("u16"))]);
            }
            _ => panic!("expected run"),
        }
    }
}
