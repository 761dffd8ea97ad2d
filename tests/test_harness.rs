//! Shared helpers for pipeline integration tests.
//!
//! Converters are real `sh` child processes so the tests exercise the same
//! isolation boundary production uses: payload on stdin, JSON on stdout,
//! killable with a signal.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use convertd::config::{ConverterCommand, ServiceConfig};
use convertd::pipeline::job::ConvertRequest;
use convertd::service::ConvertService;

pub fn sh_converter(script: &str) -> ConverterCommand {
    ConverterCommand::new("sh", vec!["-c".to_string(), script.to_string()])
}

/// Ignores the payload and immediately produces a fixed document.
pub fn echo_converter() -> ConverterCommand {
    sh_converter(
        r##"cat >/dev/null; printf '{"markdown":"# Hello","title":"Hello","metadata":{}}'"##,
    )
}

/// Sleeps for the number of seconds given in the payload, then answers.
/// Lets a single service mix fast, slow, and effectively-hung jobs.
pub fn sleep_for_payload_converter() -> ConverterCommand {
    sh_converter(
        r#"P=$(cat); sleep "$P"; printf '{"markdown":"slept %s","title":null,"metadata":{}}' "$P""#,
    )
}

/// Dies from SIGKILL when the payload is `crash`, answers normally otherwise.
pub fn crash_on_demand_converter() -> ConverterCommand {
    sh_converter(
        r#"P=$(cat); if [ "$P" = "crash" ]; then kill -9 $$; fi; printf '{"markdown":"%s","title":null,"metadata":{}}' "$P""#,
    )
}

/// Reports a conversion error with the given message on stderr.
pub fn failing_converter(message: &str) -> ConverterCommand {
    sh_converter(&format!("cat >/dev/null; echo '{message}' >&2; exit 1"))
}

/// Appends each payload to `path` before answering, so tests can observe
/// dispatch order.
pub fn recording_converter(path: &Path) -> ConverterCommand {
    sh_converter(&format!(
        r#"P=$(cat); echo "$P" >> {}; printf '{{"markdown":"%s","title":null,"metadata":{{}}}}' "$P""#,
        path.display()
    ))
}

pub fn base_config(converter: ConverterCommand) -> ServiceConfig {
    ServiceConfig::default()
        .with_converter(converter)
        .with_job_deadline(Duration::from_secs(30))
        .with_shutdown_grace(Duration::from_secs(5))
}

pub fn start(config: ServiceConfig) -> ConvertService {
    convertd::init_tracing();
    ConvertService::start(config).expect("service should start")
}

pub fn pdf_request(payload: &[u8]) -> ConvertRequest {
    ConvertRequest::new("doc.pdf", payload.to_vec())
}
