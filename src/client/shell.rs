//! Interactive client shell.
//!
//! Each command name maps to a parse function that turns the remaining words
//! into a [`Command`]; only [`run`] touches the network or the filesystem.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::client::target::Target;
use crate::client::{ClientError, Exchange, ExchangeOutcome, HttpClient, Payload};
use crate::config::ClientConfig;

/// Host and port applied when a command names only a path or omits the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub host: String,
    pub port: u16,
}

impl From<&ClientConfig> for Defaults {
    fn from(config: &ClientConfig) -> Self {
        Self {
            host: config.default_host.clone(),
            port: config.default_port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySource {
    Inline(String),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get(Target),
    Post {
        target: Target,
        content_type: String,
        body: BodySource,
    },
    History,
    Help,
    Quit,
}

type ParseFn = fn(&[&str], &Defaults) -> Result<Command, String>;

pub struct CommandTable {
    parsers: HashMap<&'static str, (ParseFn, &'static str)>,
}

impl Default for CommandTable {
    fn default() -> Self {
        let mut parsers: HashMap<&'static str, (ParseFn, &'static str)> = HashMap::new();
        parsers.insert("send", (parse_send, "send <url>            GET a URL, http:// optional"));
        parsers.insert("get", (parse_get, "get [path]            GET a path on the default server"));
        parsers.insert(
            "post",
            (parse_post, "post <path> <type> <text|@file>  POST a body to a directory"),
        );
        parsers.insert("history", (parse_history, "history               list completed exchanges"));
        parsers.insert("help", (parse_help, "help                  show this list"));
        parsers.insert("quit", (parse_quit, "quit                  close connections and exit"));
        Self { parsers }
    }
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one input line; a blank line yields `None`.
    pub fn parse(&self, line: &str, defaults: &Defaults) -> Result<Option<Command>, String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((name, args)) = words.split_first() else {
            return Ok(None);
        };

        let (parse, _) = self
            .parsers
            .get(name.to_ascii_lowercase().as_str())
            .ok_or_else(|| format!("unknown command {name:?}, try help"))?;
        parse(args, defaults).map(Some)
    }

    pub fn usage(&self) -> Vec<&'static str> {
        let mut lines: Vec<&'static str> = self.parsers.values().map(|(_, usage)| *usage).collect();
        lines.sort_unstable();
        lines
    }
}

fn parse_send(args: &[&str], defaults: &Defaults) -> Result<Command, String> {
    let [url] = args else {
        return Err("usage: send <url>".to_string());
    };
    let target = Target::parse(url, defaults.port).map_err(|e| e.to_string())?;
    Ok(Command::Get(target))
}

fn parse_get(args: &[&str], defaults: &Defaults) -> Result<Command, String> {
    let path = match args {
        [] => "/",
        [path] => *path,
        _ => return Err("usage: get [path]".to_string()),
    };
    Ok(Command::Get(Target::new(defaults.host.clone(), defaults.port, path)))
}

fn parse_post(args: &[&str], defaults: &Defaults) -> Result<Command, String> {
    let [path, content_type, rest @ ..] = args else {
        return Err("usage: post <path> <content-type> <text|@file>".to_string());
    };
    if rest.is_empty() {
        return Err("post needs a body: inline text or @file".to_string());
    }

    let body = match rest {
        [single] if single.len() > 1 && single.starts_with('@') => {
            BodySource::File(PathBuf::from(&single[1..]))
        }
        _ => BodySource::Inline(rest.join(" ")),
    };
    Ok(Command::Post {
        target: Target::new(defaults.host.clone(), defaults.port, *path),
        content_type: content_type.to_string(),
        body,
    })
}

fn parse_history(_: &[&str], _: &Defaults) -> Result<Command, String> {
    Ok(Command::History)
}

fn parse_help(_: &[&str], _: &Defaults) -> Result<Command, String> {
    Ok(Command::Help)
}

fn parse_quit(_: &[&str], _: &Defaults) -> Result<Command, String> {
    Ok(Command::Quit)
}

/// Renders an outcome as one line for the terminal.
pub fn describe(outcome: &ExchangeOutcome) -> String {
    match outcome {
        ExchangeOutcome::Fetched {
            target,
            response,
            stored: Some(path),
        } => format!(
            "{} {} {}: saved to {}",
            response.status.as_u16(),
            response.reason,
            target,
            path.display()
        ),
        ExchangeOutcome::Fetched { target, response, .. } => {
            let location = response
                .headers
                .first("Content-Location")
                .map(|l| format!(" (stored as {l})"))
                .unwrap_or_default();
            format!("{} {} {}{}", response.status.as_u16(), response.reason, target, location)
        }
        ExchangeOutcome::NotModified { target } => format!("304 {target}: read from local cache"),
        ExchangeOutcome::Status { target, response } => {
            format!("{} {} {}", response.status.as_u16(), response.reason, target)
        }
    }
}

/// Reads commands from stdin until `quit` or end of input.
///
/// A failed command prints a diagnostic; the shell keeps running.
pub async fn run(client: &HttpClient) -> anyhow::Result<()> {
    let table = CommandTable::new();
    let defaults = Defaults::from(client.config());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match table.parse(&line, &defaults) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => {
                for usage in table.usage() {
                    println!("  {usage}");
                }
            }
            Command::History => {
                for entry in client.history() {
                    let at: DateTime<Local> = entry.at.into();
                    println!("{}  {}", at.format("%Y-%m-%d %H:%M:%S"), entry.line);
                }
            }
            Command::Get(target) => report(client.exchange(Exchange::get(target)).await),
            Command::Post {
                target,
                content_type,
                body,
            } => {
                let data = match body {
                    BodySource::Inline(text) => text.into_bytes(),
                    BodySource::File(path) => match tokio::fs::read(&path).await {
                        Ok(data) => data,
                        Err(e) => {
                            println!("cannot read {}: {e}", path.display());
                            continue;
                        }
                    },
                };
                let payload = Payload::new(content_type, data);
                report(client.exchange(Exchange::post(target, payload)).await);
            }
        }
    }

    client.close_all();
    Ok(())
}

fn report(result: Result<ExchangeOutcome, ClientError>) {
    match result {
        Ok(outcome) => println!("{}", describe(&outcome)),
        Err(e) => println!("exchange failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Defaults {
        Defaults {
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }

    #[test]
    fn blank_lines_are_ignored() {
        let table = CommandTable::new();
        assert_eq!(table.parse("   ", &defaults()), Ok(None));
    }

    #[test]
    fn get_uses_default_server() {
        let table = CommandTable::new();

        let command = table.parse("get /index.html", &defaults()).unwrap();
        assert_eq!(
            command,
            Some(Command::Get(Target::new("127.0.0.1", 8089, "/index.html")))
        );
        assert_eq!(
            table.parse("GET", &defaults()).unwrap(),
            Some(Command::Get(Target::new("127.0.0.1", 8089, "/")))
        );
    }

    #[test]
    fn send_parses_direct_url() {
        let table = CommandTable::new();

        let command = table.parse("send example.org/a.txt", &defaults()).unwrap();
        assert_eq!(
            command,
            Some(Command::Get(Target::new("example.org", 8089, "/a.txt")))
        );
        assert!(table.parse("send", &defaults()).is_err());
    }

    #[test]
    fn post_takes_inline_text_or_file() {
        let table = CommandTable::new();

        let inline = table.parse("post / text/plain hello world", &defaults()).unwrap();
        assert_eq!(
            inline,
            Some(Command::Post {
                target: Target::new("127.0.0.1", 8089, "/"),
                content_type: "text/plain".to_string(),
                body: BodySource::Inline("hello world".to_string()),
            })
        );

        let file = table.parse("post /up image/png @logo.png", &defaults()).unwrap();
        assert!(matches!(
            file,
            Some(Command::Post { body: BodySource::File(ref path), .. }) if path == &PathBuf::from("logo.png")
        ));

        assert!(table.parse("post / text/plain", &defaults()).is_err());
    }

    #[test]
    fn unknown_command_is_reported() {
        let table = CommandTable::new();
        let err = table.parse("delete /x", &defaults()).unwrap_err();
        assert!(err.contains("unknown command"));
    }

    #[test]
    fn usage_lists_every_command() {
        assert_eq!(CommandTable::new().usage().len(), 6);
    }
}
