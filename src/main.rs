//! Minimal interactive query shell over a [`pubsql::Session`].
//!
//! Reads commands from stdin: `\connect [host[:port]]`, `\disconnect`,
//! `\cancel`, `\quit`; any other line is executed as a query. Demonstrates
//! how a front-end drives the session through [`pubsql::Command`] dispatch.

use std::io::{BufRead, Write as _};

use pubsql::{Command, CommandOutcome, Session};

fn prompt(session: &Session) {
    let marker = if session.connected() { ">" } else { "(disconnected)>" };
    print!("{marker} ");
    let _ = std::io::stdout().flush();
}

fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    match line.split_once(' ').map_or((line, ""), |(a, b)| (a, b)) {
        ("\\connect", addr) => {
            let addr = if addr.is_empty() { "localhost" } else { addr };
            Some(Command::Connect(addr.to_owned()))
        }
        ("\\disconnect", _) => Some(Command::Disconnect),
        ("\\cancel", _) => Some(Command::Cancel),
        _ if line.is_empty() => None,
        _ => Some(Command::Execute(line.to_owned())),
    }
}

#[tokio::main]
async fn main() {
    // Enable structured logging for the shell; applications embedding the
    // library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let session = Session::new();
    prompt(&session);
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        if line.trim() == "\\quit" {
            break;
        }
        if let Some(command) = parse(&line) {
            match session.dispatch(command).await {
                Ok(CommandOutcome::Connected) => println!("connected"),
                Ok(CommandOutcome::Disconnected) => println!("disconnected"),
                Ok(CommandOutcome::Executed(result)) => {
                    for row in result.rows() {
                        println!("{row:?}");
                    }
                    if !result.message().is_empty() {
                        println!("{}", result.message());
                    }
                }
                Ok(CommandOutcome::Cancelled(true)) => println!("cancelled"),
                Ok(CommandOutcome::Cancelled(false)) => println!("nothing to cancel"),
                Err(err) => eprintln!("error: {err}"),
            }
        }
        prompt(&session);
    }
    session.disconnect().await;
}
