//! Kernel wire-protocol message types and parser.
//!
//! The runner and a kernel process exchange newline-delimited JSON over the
//! kernel's stdio. Requests carry an `"op"` tag; kernel messages carry a
//! `"msg_type"` tag plus the `id` of the execute request they answer. This
//! module deserializes inbound lines into a strongly-typed [`KernelMessage`]
//! enum.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A request sent from the runner to the kernel process.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum KernelRequest {
    /// Execute one cell's code. The kernel answers with zero or more output
    /// messages followed by exactly one `reply` carrying the same `id`.
    Execute { id: Uuid, code: String },

    /// Ask the kernel to exit. No reply is expected.
    Shutdown,
}

/// All known kernel-to-runner message types.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum KernelMessage {
    /// Text written to stdout or stderr while the cell ran.
    Stream {
        id: Uuid,
        /// `"stdout"` or `"stderr"`.
        name: String,
        text: String,
    },

    /// The value produced by the cell, keyed by MIME type.
    ExecuteResult {
        id: Uuid,
        #[serde(default)]
        data: Map<String, Value>,
    },

    /// The cell raised. `traceback` lines keep their own newlines.
    Error {
        id: Uuid,
        ename: String,
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },

    /// Terminator for one execute request.
    Reply { id: Uuid, status: ReplyStatus },
}

/// Outcome of one execute request, reported in the `reply` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    Error,
}

impl KernelMessage {
    /// The execute-request id this message answers.
    pub fn id(&self) -> Uuid {
        match self {
            Self::Stream { id, .. }
            | Self::ExecuteResult { id, .. }
            | Self::Error { id, .. }
            | Self::Reply { id, .. } => *id,
        }
    }
}

/// Parse one inbound line into a typed message.
///
/// Returns `Err` for malformed JSON or unknown `msg_type` values.
pub fn parse_message(text: &str) -> Result<KernelMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "6b1f3a52-6c2e-4b7f-9d64-0a5a1b9a7c01";

    #[test]
    fn parse_stream_message() {
        let json =
            format!(r#"{{"msg_type":"stream","id":"{ID}","name":"stdout","text":"hi\n"}}"#);
        let msg = parse_message(&json).unwrap();
        match msg {
            KernelMessage::Stream { name, text, .. } => {
                assert_eq!(name, "stdout");
                assert_eq!(text, "hi\n");
            }
            other => panic!("Expected Stream, got {other:?}"),
        }
    }

    #[test]
    fn parse_execute_result_message() {
        let json = format!(
            r#"{{"msg_type":"execute_result","id":"{ID}","data":{{"text/plain":"4"}}}}"#
        );
        let msg = parse_message(&json).unwrap();
        match msg {
            KernelMessage::ExecuteResult { data, .. } => {
                assert_eq!(data["text/plain"], "4");
            }
            other => panic!("Expected ExecuteResult, got {other:?}"),
        }
    }

    #[test]
    fn parse_error_message() {
        let json = format!(
            r#"{{"msg_type":"error","id":"{ID}","ename":"ZeroDivisionError","evalue":"division by zero","traceback":["boom\n"]}}"#
        );
        let msg = parse_message(&json).unwrap();
        match msg {
            KernelMessage::Error { ename, traceback, .. } => {
                assert_eq!(ename, "ZeroDivisionError");
                assert_eq!(traceback, vec!["boom\n"]);
            }
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn parse_reply_message() {
        let json = format!(r#"{{"msg_type":"reply","id":"{ID}","status":"ok"}}"#);
        let msg = parse_message(&json).unwrap();
        match msg {
            KernelMessage::Reply { status, .. } => assert_eq!(status, ReplyStatus::Ok),
            other => panic!("Expected Reply, got {other:?}"),
        }

        let json = format!(r#"{{"msg_type":"reply","id":"{ID}","status":"error"}}"#);
        match parse_message(&json).unwrap() {
            KernelMessage::Reply { status, .. } => assert_eq!(status, ReplyStatus::Error),
            other => panic!("Expected Reply, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_unknown_msg_type() {
        let json = format!(r#"{{"msg_type":"telemetry","id":"{ID}"}}"#);
        assert!(parse_message(&json).is_err());
    }

    #[test]
    fn execute_request_serializes_with_op_tag() {
        let id: Uuid = ID.parse().unwrap();
        let req = KernelRequest::Execute {
            id,
            code: "1 + 1".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            format!(r#"{{"op":"execute","id":"{ID}","code":"1 + 1"}}"#)
        );

        assert_eq!(
            serde_json::to_string(&KernelRequest::Shutdown).unwrap(),
            r#"{"op":"shutdown"}"#
        );
    }
}
