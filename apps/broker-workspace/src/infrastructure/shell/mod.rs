//! Interactive Shell
//!
//! Line-oriented shell over the workspace. Reads commands from any
//! `AsyncBufRead`, writes replies to any `AsyncWrite`, and closes the
//! session through the environment when the user exits.
//!
//! # Commands
//!
//! - `$ <text>`: resolve securities and bind them
//! - `chain <symbol>`, `curve <symbol>`: resolve and bind
//! - `ls`: list bindings
//! - `free <name>`: cancel and unbind
//! - `<name>`: describe one binding
//! - `session`, `metrics`, `help`
//! - `exit`, `.exit` or end of input: close the session

use std::fmt::Write as _;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::application::ports::{BrokerError, Handle};
use crate::application::services::Environment;

const HELP: &str = "\
commands:
  $ <text>        resolve securities and bind them by symbol
  chain <symbol>  resolve an option chain
  curve <symbol>  resolve a curve
  ls              list bindings
  free <name>     cancel and remove a binding
  <name>          describe a binding
  session         session status
  metrics         render metrics
  help            this text
  exit            close the session and leave
";

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line.
    Empty,
    /// `$ <text>`.
    Securities(String),
    /// `chain <symbol>`.
    Chain(String),
    /// `curve <symbol>`.
    Curve(String),
    /// `ls`.
    List,
    /// `free <name>`.
    Free(String),
    /// `session`.
    Session,
    /// `metrics`.
    Metrics,
    /// `help`.
    Help,
    /// `exit` or `.exit`.
    Exit,
    /// A bare name.
    Describe(String),
    /// Anything else.
    Unknown(String),
}

impl Command {
    /// Parse one input line.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if let Some(text) = line.strip_prefix('$') {
            let text = text.trim();
            return if text.is_empty() {
                Self::Unknown(line.to_string())
            } else {
                Self::Securities(text.to_string())
            };
        }

        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));
        match (word, rest) {
            ("chain", symbol) if !symbol.is_empty() => Self::Chain(symbol.to_string()),
            ("curve", symbol) if !symbol.is_empty() => Self::Curve(symbol.to_string()),
            ("free", name) if !name.is_empty() => Self::Free(name.to_string()),
            ("ls", "") => Self::List,
            ("session", "") => Self::Session,
            ("metrics", "") => Self::Metrics,
            ("help", "") => Self::Help,
            ("exit" | ".exit", "") => Self::Exit,
            (name, "") => Self::Describe(name.to_string()),
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Shell error.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Reading or writing the terminal failed.
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Closing the session on exit failed.
    #[error("closing session failed: {0}")]
    Close(#[from] BrokerError),
}

/// Interactive shell bound to one environment.
pub struct Shell<'a> {
    env: &'a Environment,
    prompt: String,
    metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for Shell<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("prompt", &self.prompt)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Shell<'a> {
    /// Create a shell over `env` with the given prompt.
    #[must_use]
    pub fn new(env: &'a Environment, prompt: impl Into<String>) -> Self {
        Self {
            env,
            prompt: prompt.into(),
            metrics: None,
        }
    }

    /// Render metrics from this handle on `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// Run until exit or end of input, then close the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal fails or the session cannot close.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), ShellError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::debug!(prompt = %self.prompt, "Shell started");
        let mut line = String::new();

        loop {
            writer.write_all(self.prompt.as_bytes()).await?;
            writer.flush().await?;

            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                writer.write_all(b"\n").await?;
                break;
            }

            match self.execute(Command::parse(&line)).await {
                Some(reply) => writer.write_all(reply.as_bytes()).await?,
                None => break,
            }
        }

        writer.flush().await?;
        tracing::debug!("Shell exited");
        self.env.close().await?;
        Ok(())
    }

    /// Execute one command and return its reply; `None` means exit.
    pub async fn execute(&self, command: Command) -> Option<String> {
        let reply = match command {
            Command::Empty => String::new(),
            Command::Exit => return None,
            Command::Help => HELP.to_string(),
            Command::Securities(text) => match self.env.security(&text).await {
                Ok(securities) if securities.is_empty() => format!("no securities for {text}\n"),
                Ok(securities) => securities
                    .iter()
                    .map(|s| {
                        self.binding_reply(s.contract().symbol(), &Handle::Security(Arc::clone(s)))
                    })
                    .collect(),
                Err(error) => format!("error: {error}\n"),
            },
            Command::Chain(symbol) => {
                match self.env.option_chains(std::slice::from_ref(&symbol)).await {
                    Ok(chains) => chains
                        .iter()
                        .map(|c| self.binding_reply(c.symbol(), &Handle::OptionChain(Arc::clone(c))))
                        .collect(),
                    Err(error) => format!("error: {error}\n"),
                }
            }
            Command::Curve(symbol) => match self.env.curves(std::slice::from_ref(&symbol)).await {
                Ok(curves) => curves
                    .iter()
                    .map(|c| self.binding_reply(c.symbol(), &Handle::Curve(Arc::clone(c))))
                    .collect(),
                Err(error) => format!("error: {error}\n"),
            },
            Command::List => self.list(),
            Command::Free(name) => {
                if self.env.get(&name).is_none() {
                    format!("unbound: {name}\n")
                } else {
                    match self.env.free(&name) {
                        Ok(_) => format!("freed {name}\n"),
                        Err(error) => format!("error: {error}\n"),
                    }
                }
            }
            Command::Describe(name) => self.env.get(&name).map_or_else(
                || format!("unbound: {name}\n"),
                |handle| format!("{}\n", handle.describe()),
            ),
            Command::Session => format!(
                "frozen={} bindings={}\n",
                self.env.session().frozen(),
                self.env.len()
            ),
            Command::Metrics => self.metrics.as_ref().map_or_else(
                || "metrics disabled (set WORKSPACE_METRICS=true)\n".to_string(),
                PrometheusHandle::render,
            ),
            Command::Unknown(line) => format!("unknown command: {line} (try help)\n"),
        };
        Some(reply)
    }

    /// Reply for a looked-up object: bound, or shadowed by an earlier binding.
    fn binding_reply(&self, name: &str, handle: &Handle) -> String {
        match self.env.get(name) {
            Some(existing) if existing.same_object(handle) => format!("bound {name}\n"),
            Some(_) => format!("{name} already bound, kept existing\n"),
            None => format!("unbound: {name}\n"),
        }
    }

    fn list(&self) -> String {
        let bindings = self.env.bindings();
        if bindings.is_empty() {
            return "(empty)\n".to_string();
        }
        let width = bindings.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        let mut out = String::new();
        for (name, handle) in bindings {
            let _ = writeln!(out, "{name:<width$}  {}", handle.describe());
        }
        out
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use test_case::test_case;

    use super::*;
    use crate::infrastructure::config::PaperSettings;
    use crate::infrastructure::paper::PaperSession;

    #[test_case("", Command::Empty ; "blank")]
    #[test_case("$ AAPL stock", Command::Securities("AAPL stock".into()) ; "securities")]
    #[test_case("$AAPL", Command::Securities("AAPL".into()) ; "securities no space")]
    #[test_case("$", Command::Unknown("$".into()) ; "bare dollar")]
    #[test_case("chain SPX", Command::Chain("SPX".into()) ; "chain")]
    #[test_case("curve  USD ", Command::Curve("USD".into()) ; "curve padded")]
    #[test_case("chain", Command::Describe("chain".into()) ; "chain without symbol")]
    #[test_case("ls", Command::List ; "list")]
    #[test_case("free AAPL", Command::Free("AAPL".into()) ; "free")]
    #[test_case(".exit", Command::Exit ; "dot exit")]
    #[test_case("exit\n", Command::Exit ; "exit newline")]
    #[test_case("AAPL", Command::Describe("AAPL".into()) ; "describe")]
    #[test_case("ls -l", Command::Unknown("ls -l".into()) ; "unknown")]
    fn parsing(line: &str, expected: Command) {
        assert_eq!(Command::parse(line), expected);
    }

    fn paper(settings: PaperSettings) -> (PaperSession, Environment) {
        let session = PaperSession::new(settings);
        let env = Environment::new(Arc::new(session.clone()));
        (session, env)
    }

    #[tokio::test]
    async fn lookup_list_describe_free() {
        let (session, env) = paper(PaperSettings::default());
        let shell = Shell::new(&env, "> ");

        assert_eq!(
            shell.execute(Command::parse("$ AAPL")).await.unwrap(),
            "bound AAPL\n"
        );
        assert_eq!(
            shell.execute(Command::parse("curve USD")).await.unwrap(),
            "bound USD\n"
        );
        assert_eq!(
            shell.execute(Command::List).await.unwrap(),
            "AAPL  security AAPL (stock, markets open)\nUSD   curve USD\n"
        );
        assert_eq!(
            shell.execute(Command::parse("USD")).await.unwrap(),
            "curve USD\n"
        );
        assert_eq!(
            shell.execute(Command::parse("free USD")).await.unwrap(),
            "freed USD\n"
        );
        assert_eq!(
            shell.execute(Command::parse("free USD")).await.unwrap(),
            "unbound: USD\n"
        );
        assert_eq!(session.calls_for("USD"), vec!["curve", "cancel"]);
    }

    #[tokio::test]
    async fn rebinding_reports_the_kept_binding() {
        let (session, env) = paper(PaperSettings::default());
        let shell = Shell::new(&env, "> ");

        assert_eq!(
            shell.execute(Command::parse("$ aapl stock")).await.unwrap(),
            "bound AAPL\n"
        );
        assert_eq!(
            shell.execute(Command::parse("$ AAPL")).await.unwrap(),
            "AAPL already bound, kept existing\n"
        );
        assert_eq!(
            shell.execute(Command::parse("chain SPX")).await.unwrap(),
            "bound SPX\n"
        );
        assert_eq!(
            shell.execute(Command::parse("chain SPX")).await.unwrap(),
            "SPX already bound, kept existing\n"
        );
        assert_eq!(
            shell.execute(Command::parse("curve USD")).await.unwrap(),
            "bound USD\n"
        );
        assert_eq!(
            shell.execute(Command::parse("curve USD")).await.unwrap(),
            "USD already bound, kept existing\n"
        );

        // Freeing cancels the first curve, not the discarded duplicate.
        shell.execute(Command::parse("free USD")).await.unwrap();
        assert_eq!(session.calls_for("USD"), vec!["curve", "curve", "cancel"]);
        assert_eq!(env.len(), 2);
    }

    #[tokio::test]
    async fn lookup_errors_are_printed() {
        let (_session, env) = paper(PaperSettings {
            unknown: vec!["XYZ".to_string()],
            ..PaperSettings::default()
        });
        let shell = Shell::new(&env, "> ");

        let reply = shell.execute(Command::parse("chain XYZ")).await.unwrap();

        assert!(reply.starts_with("error: option_chains lookup failed for XYZ"));
        assert_eq!(shell.execute(Command::List).await.unwrap(), "(empty)\n");
    }

    #[tokio::test]
    async fn session_and_metrics_replies() {
        let (_session, env) = paper(PaperSettings::default());
        let shell = Shell::new(&env, "> ");

        assert_eq!(
            shell.execute(Command::Session).await.unwrap(),
            "frozen=false bindings=0\n"
        );
        assert!(
            shell
                .execute(Command::Metrics)
                .await
                .unwrap()
                .starts_with("metrics disabled")
        );
        assert!(shell.execute(Command::Exit).await.is_none());
    }

    #[tokio::test]
    async fn run_reads_until_exit_and_closes() {
        let (session, env) = paper(PaperSettings::default());
        let reader = tokio_test::io::Builder::new()
            .read(b"$ MSFT\n")
            .read(b"ls\n")
            .read(b"exit\n")
            .build();
        let mut output = Vec::new();

        Shell::new(&env, "ws> ")
            .run(tokio::io::BufReader::new(reader), &mut output)
            .await
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_eq!(
            output,
            "ws> bound MSFT\nws> MSFT  security MSFT (stock, markets open)\nws> "
        );
        assert!(session.is_closed());
        assert!(env.is_empty());
    }

    #[tokio::test]
    async fn end_of_input_closes_session() {
        let (session, env) = paper(PaperSettings::default());
        let mut output = Vec::new();

        Shell::new(&env, "> ")
            .run(&b"help\n"[..], &mut output)
            .await
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("commands:"));
        assert!(output.ends_with("> \n"));
        assert!(session.is_closed());
    }
}
