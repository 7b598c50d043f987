//! Front-end command dispatch.
//!
//! Instead of wiring one handler object per button, a front-end maps every
//! user action onto a [`Command`] and hands it to [`Session::dispatch`]. The
//! outcome carries whatever the command produced, so the caller renders it
//! without knowing which session method ran.

use crate::{error::SessionError, result::QueryResult, session::Session};

/// A user-initiated session command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Connect to the given `"host:port"` address.
    Connect(String),
    /// Tear down the current connection.
    Disconnect,
    /// Execute a query.
    Execute(String),
    /// Cancel the outstanding query.
    Cancel,
}

/// What a dispatched command produced.
#[derive(Debug)]
pub enum CommandOutcome {
    /// The session is now connected.
    Connected,
    /// The session is now disconnected.
    Disconnected,
    /// The query completed (successfully or not).
    Executed(QueryResult),
    /// Whether a pending query was actually cancelled.
    Cancelled(bool),
}

impl Session {
    /// Run `command` against this session.
    ///
    /// # Errors
    ///
    /// Propagates the [`SessionError`] of the underlying operation.
    pub async fn dispatch(&self, command: Command) -> Result<CommandOutcome, SessionError> {
        match command {
            Command::Connect(addr) => {
                self.connect(&addr).await?;
                Ok(CommandOutcome::Connected)
            }
            Command::Disconnect => {
                self.disconnect().await;
                Ok(CommandOutcome::Disconnected)
            }
            Command::Execute(query) => Ok(CommandOutcome::Executed(self.execute(&query).await?)),
            Command::Cancel => Ok(CommandOutcome::Cancelled(self.cancel_execute())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_mirrors_session_errors() {
        let session = Session::new();
        let err = session
            .dispatch(Command::Execute("select 1".into()))
            .await
            .expect_err("must fail while disconnected");
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[tokio::test]
    async fn cancel_outcome_reports_noop() {
        let session = Session::new();
        let outcome = session
            .dispatch(Command::Cancel)
            .await
            .expect("cancel never errors");
        assert!(matches!(outcome, CommandOutcome::Cancelled(false)));
    }
}
