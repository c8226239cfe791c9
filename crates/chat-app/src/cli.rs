use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lexchat_llm::{ProviderError, create_provider};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::chat::{ChatError, ChatMessage, ChatSession, DisplaySink, SendOutcome};
use crate::settings::{SettingsError, SettingsStore};

#[derive(Debug, Parser)]
#[command(name = "lexchat", version, about = "Ask a legal assistant from the terminal")]
pub struct Cli {
    /// Settings file to use instead of the per-user default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream one answer to stdout.
    Ask {
        /// Question to send; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
        #[arg(long)]
        model: Option<String>,
        /// Reasoning paragraphs kept on screen.
        #[arg(long)]
        window: Option<usize>,
    },
    /// List models offered by the configured provider.
    Models,
    /// Manage the settings file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Write the effective settings to the settings file.
    Init,
    /// Print the effective settings with the API key masked.
    Show,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("no API key configured; set LEXCHAT_API_KEY or edit {}", path.display()))]
    MissingApiKey { stage: &'static str, path: PathBuf },
    #[snafu(display("provider setup failed on `{stage}`: {source}"))]
    Provider {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("chat failed on `{stage}`: {source}"))]
    Chat {
        stage: &'static str,
        source: ChatError,
    },
    #[snafu(display("settings failed on `{stage}`: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    Serialize {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write to terminal on `{stage}`: {source}"))]
    Output {
        stage: &'static str,
        source: io::Error,
    },
}

/// Writes display updates to a terminal.
///
/// Growth is printed as a suffix; when the display is reshaped the whole text is reprinted
/// after a blank line.
pub struct TerminalSink<W: Write> {
    out: W,
    shown: String,
    error: Option<io::Error>,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            shown: String::new(),
            error: None,
        }
    }

    /// Returns the writer, or the first write error seen while streaming.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn render(&mut self, display: &str) -> io::Result<()> {
        match display.strip_prefix(self.shown.as_str()) {
            Some(rest) => self.out.write_all(rest.as_bytes())?,
            None => write!(self.out, "\n\n{display}")?,
        }
        self.out.flush()
    }
}

impl<W: Write> DisplaySink for TerminalSink<W> {
    fn on_display(&mut self, display: &str, _messages: &[ChatMessage]) {
        if self.error.is_some() {
            return;
        }
        match self.render(display) {
            Ok(()) => display.clone_into(&mut self.shown),
            Err(error) => self.error = Some(error),
        }
    }
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let store = match cli.config {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };

    match cli.command {
        Command::Ask {
            prompt,
            model,
            window,
        } => ask(&store, &prompt.join(" "), model, window).await,
        Command::Models => list_models(&store).await,
        Command::Config { action } => config(&store, action),
    }
}

async fn ask(
    store: &SettingsStore,
    prompt: &str,
    model: Option<String>,
    window: Option<usize>,
) -> Result<(), CliError> {
    let mut settings = (*store.settings()).clone();
    if let Some(model) = model {
        settings.model = model;
    }
    if let Some(window) = window {
        settings.reasoning_window = window;
    }
    let settings = settings.normalized();

    let config = settings.to_provider_config().context(MissingApiKeySnafu {
        stage: "ask-provider-config",
        path: store.config_path().to_path_buf(),
    })?;
    let provider = create_provider(config).context(ProviderSnafu {
        stage: "ask-create-provider",
    })?;
    let session = ChatSession::new(provider, settings.session_options());

    let mut sink = TerminalSink::new(io::stdout().lock());
    let abort = async {
        if tokio::signal::ctrl_c().await.is_err() {
            futures::future::pending::<()>().await;
        }
    };
    let outcome = session
        .send_message(prompt, &mut sink, abort)
        .await
        .context(ChatSnafu { stage: "ask-send" })?;
    sink.finish().context(OutputSnafu {
        stage: "ask-finish-output",
    })?;

    match outcome {
        SendOutcome::Completed { phase, .. } => {
            tracing::debug!(?phase, "answer complete");
        }
        SendOutcome::Cancelled { .. } => eprintln!("(cancelled)"),
        SendOutcome::Busy => {}
    }
    Ok(())
}

async fn list_models(store: &SettingsStore) -> Result<(), CliError> {
    let settings = store.settings();
    let config = settings.to_provider_config().context(MissingApiKeySnafu {
        stage: "models-provider-config",
        path: store.config_path().to_path_buf(),
    })?;
    let provider = create_provider(config).context(ProviderSnafu {
        stage: "models-create-provider",
    })?;
    let catalog = provider.fetch_models().await.context(ProviderSnafu {
        stage: "models-fetch",
    })?;

    if let Some(warning) = &catalog.warning {
        eprintln!("warning: {warning}");
    }
    println!("{} models from {}:", provider.name(), catalog.source.label());
    for model in &catalog.models {
        let marker = if model.id == settings.model { "*" } else { " " };
        match &model.description {
            Some(description) => println!("{marker} {} - {description}", model.id),
            None => println!("{marker} {}", model.id),
        }
    }
    Ok(())
}

fn config(store: &SettingsStore, action: ConfigAction) -> Result<(), CliError> {
    match action {
        ConfigAction::Init => {
            store
                .update((*store.settings()).clone())
                .context(SettingsSnafu {
                    stage: "config-init",
                })?;
            println!("{}", store.config_path().display());
        }
        ConfigAction::Show => {
            let json = serde_json::to_string_pretty(&store.settings().redacted())
                .context(SerializeSnafu {
                    stage: "config-show",
                })?;
            println!("{json}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_joins_prompt_words() {
        let cli = Cli::try_parse_from(["lexchat", "ask", "¿Qué", "plazo?", "--window", "3"])
            .unwrap();
        let Command::Ask { prompt, window, .. } = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(prompt.join(" "), "¿Qué plazo?");
        assert_eq!(window, Some(3));
    }

    #[test]
    fn config_flag_is_global() {
        let cli =
            Cli::try_parse_from(["lexchat", "config", "show", "--config", "/tmp/x.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.json")));
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn ask_requires_a_prompt() {
        assert!(Cli::try_parse_from(["lexchat", "ask"]).is_err());
    }

    #[test]
    fn terminal_sink_appends_growth_and_reprints_reshapes() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.on_display("Hola", &[]);
        sink.on_display("Hola mundo", &[]);
        sink.on_display("## ⚖️ Análisis Legal", &[]);

        let out = String::from_utf8(sink.finish().unwrap()).unwrap();
        assert_eq!(out, "Hola mundo\n\n## ⚖️ Análisis Legal\n");
    }

    #[test]
    fn config_init_writes_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone());

        config(&store, ConfigAction::Init).unwrap();
        assert!(path.exists());
    }
}
