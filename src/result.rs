//! Query results returned to callers.
//!
//! The server answers every command with a JSON document. `QueryResult`
//! parses that document into a status, a message, and an ordered sequence of
//! rows, while keeping the raw text around so front-ends can show the
//! unparsed server response alongside the tabulated one.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// Outcome of a query as reported by the server (or synthesized locally).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Command succeeded.
    Ok,
    /// Command failed; the message explains why.
    Err,
}

/// One result row, column name to value.
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Deserialize)]
struct WireResult {
    status: Status,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    rows: Vec<Row>,
}

/// Parsed result of one executed query.
///
/// Constructed exactly once per request and delivered to exactly one caller.
#[derive(Clone, Debug)]
pub struct QueryResult {
    status: Status,
    message: String,
    rows: Vec<Row>,
    raw: String,
}

impl QueryResult {
    /// Parse a server response payload.
    ///
    /// A payload that is not the expected JSON document still produces a
    /// result (status [`Status::Err`]) rather than an error: the caller
    /// always receives something renderable, and the raw text is preserved
    /// for inspection.
    #[must_use]
    pub fn parse(payload: String) -> Self {
        match serde_json::from_str::<WireResult>(&payload) {
            Ok(wire) => Self {
                status: wire.status,
                message: wire.msg,
                rows: wire.rows,
                raw: payload,
            },
            Err(err) => Self {
                status: Status::Err,
                message: format!("unparseable server response: {err}"),
                rows: Vec::new(),
                raw: payload,
            },
        }
    }

    /// Synthesize a failed result with no server involvement.
    ///
    /// Used for cancellation and drain-on-disconnect, where the caller must
    /// still receive exactly one result.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: Status::Err,
            message,
            rows: Vec::new(),
            raw: String::new(),
        }
    }

    /// Status reported by the server.
    #[must_use]
    pub const fn status(&self) -> Status { self.status }

    /// Convenience check for [`Status::Ok`].
    #[must_use]
    pub fn is_ok(&self) -> bool { self.status == Status::Ok }

    /// Server message; empty on plain successes.
    #[must_use]
    pub fn message(&self) -> &str { &self.message }

    /// Result rows in server order.
    #[must_use]
    pub fn rows(&self) -> &[Row] { &self.rows }

    /// Raw response text as received from the server.
    ///
    /// Empty for locally synthesized results.
    #[must_use]
    pub fn raw(&self) -> &str { &self.raw }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_status() {
        let payload = r#"{
            "status": "ok",
            "rows": [
                {"ticker": "GOOG", "bid": "1500.00"},
                {"ticker": "MSFT", "bid": "380.50"}
            ]
        }"#;
        let result = QueryResult::parse(payload.to_owned());
        assert!(result.is_ok());
        assert_eq!(result.rows().len(), 2);
        assert_eq!(result.rows()[0]["ticker"], "GOOG");
        assert_eq!(result.raw(), payload);
    }

    #[test]
    fn parses_server_error_status() {
        let result = QueryResult::parse(r#"{"status":"err","msg":"table not found"}"#.into());
        assert_eq!(result.status(), Status::Err);
        assert_eq!(result.message(), "table not found");
        assert!(result.rows().is_empty());
    }

    #[test]
    fn garbage_payload_becomes_error_result() {
        let result = QueryResult::parse("not json".into());
        assert_eq!(result.status(), Status::Err);
        assert_eq!(result.raw(), "not json");
    }

    #[test]
    fn failed_result_carries_message() {
        let result = QueryResult::failed("query cancelled");
        assert_eq!(result.status(), Status::Err);
        assert_eq!(result.message(), "query cancelled");
        assert!(result.raw().is_empty());
    }
}
