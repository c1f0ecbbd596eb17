//! Extraction and analyst collaborator seams
//!
//! Free-text chat messages are turned into raw parameter triples by an
//! external extractor (typically an LLM behind some command), and follow-up
//! questions about a stored result go to an analyst. Both are handed in
//! explicitly to whoever needs them; normalization and the engine never see
//! them.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

use crate::models::{CalculationResult, RawParameter};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*```[A-Za-z0-9_-]*\s*$").expect("fence pattern is valid"));

/// Something that can turn a chat message into raw parameters.
pub trait Extractor {
    fn extract(&self, message: &str) -> Result<Vec<RawParameter>>;
}

/// Runs an external program, writes the message to its stdin and parses
/// its stdout as an extractor reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandExtractor {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Extractor for CommandExtractor {
    fn extract(&self, message: &str) -> Result<Vec<RawParameter>> {
        tracing::debug!(program = %self.program, "running extractor");
        let reply = run_piped("extractor", &self.program, &self.args, message.to_string())?;
        parse_reply(&reply)
    }
}

/// Something that can answer a question about a calculated result.
pub trait Analyst {
    fn answer(&self, question: &str, result: &CalculationResult) -> Result<String>;
}

/// Runs an external program with `{"question", "result"}` JSON on stdin and
/// takes its stdout as the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAnalyst {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Serialize)]
struct AnalystRequest<'a> {
    question: &'a str,
    result: &'a CalculationResult,
}

impl Analyst for CommandAnalyst {
    fn answer(&self, question: &str, result: &CalculationResult) -> Result<String> {
        tracing::debug!(program = %self.program, "running analyst");
        let request = serde_json::to_string_pretty(&AnalystRequest { question, result })?;
        let answer = run_piped("analyst", &self.program, &self.args, request)?;
        let answer = answer.trim();
        if answer.is_empty() {
            bail!("analyst '{}' returned an empty answer", self.program);
        }
        Ok(answer.to_string())
    }
}

/// Spawn `program`, feed `input` to its stdin from a writer thread while
/// stdout is drained, and return stdout.
fn run_piped(role: &str, program: &str, args: &[String], input: String) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("Failed to start {} '{}'", role, program))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("{} stdin unavailable", role))?;
    let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

    let output = child
        .wait_with_output()
        .with_context(|| format!("{} '{}' did not finish", role, program))?;
    let written = writer
        .join()
        .map_err(|_| anyhow!("{} input writer panicked", role))?;
    if !output.status.success() {
        bail!("{} '{}' exited with {}", role, program, output.status);
    }
    // a successful child may exit without reading all of its input
    match written {
        Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
            return Err(e).with_context(|| format!("Failed to send input to {}", role));
        }
        _ => {}
    }

    String::from_utf8(output.stdout).with_context(|| format!("{} reply is not UTF-8", role))
}

#[derive(Deserialize)]
struct ReplyEntry {
    key: String,
    value: Value,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct KeyedEntry {
    value: Value,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply {
    List(Vec<ReplyEntry>),
    Keyed(BTreeMap<String, KeyedEntry>),
}

/// Parse an extractor reply.
///
/// Accepts a JSON array of `{key, value, type}` or an object mapping each key
/// to `{value, type}`, optionally wrapped in Markdown code fences. Numeric
/// JSON values are turned back into strings; validating them is the
/// normalizer's job.
pub fn parse_reply(text: &str) -> Result<Vec<RawParameter>> {
    let body = FENCE_RE.replace_all(text, "");
    let reply: Reply = serde_json::from_str(body.trim()).context("Extractor reply was not valid parameter JSON")?;

    let params = match reply {
        Reply::List(entries) => entries
            .into_iter()
            .map(|e| -> Result<RawParameter> {
                let value = value_text(&e.key, e.value)?;
                Ok(RawParameter::new(e.key, value, e.kind))
            })
            .collect::<Result<Vec<_>>>()?,
        Reply::Keyed(map) => map
            .into_iter()
            .map(|(key, e)| -> Result<RawParameter> {
                let value = value_text(&key, e.value)?;
                Ok(RawParameter::new(key, value, e.kind))
            })
            .collect::<Result<Vec<_>>>()?,
    };

    tracing::debug!(count = params.len(), "parsed extractor reply");
    Ok(params)
}

fn value_text(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => bail!("parameter '{}' has a non-scalar value: {}", key, other),
    }
}

/// Find all `*.json` scenario files under `dir`, sorted by path
pub fn find_scenario_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Load one scenario file (an extractor reply saved to disk).
pub fn load_scenario(path: &Path) -> Result<Vec<RawParameter>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_reply(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    impl Extractor for Canned {
        fn extract(&self, _message: &str) -> Result<Vec<RawParameter>> {
            parse_reply(self.0)
        }
    }

    struct EchoAnalyst;

    impl Analyst for EchoAnalyst {
        fn answer(&self, question: &str, result: &CalculationResult) -> Result<String> {
            Ok(format!("{}: NPV {:.0}", question, result.profitability_metrics.npv))
        }
    }

    fn sample_result() -> CalculationResult {
        use crate::models::{CashFlowPoint, ProfitabilityMetrics};

        CalculationResult {
            cash_flow_projections: vec![
                CashFlowPoint { year: 0, cash_flow: -100.0 },
                CashFlowPoint { year: 1, cash_flow: 150.0 },
            ],
            profitability_metrics: ProfitabilityMetrics {
                npv: 36.0,
                irr: Some(0.5),
                payback_period: Some(0.67),
            },
            chart_data: Vec::new(),
        }
    }

    #[test]
    fn parses_list_reply() {
        let params = parse_reply(r#"[{"key":"vesselPrice","value":"25000000","type":"currency"}]"#).unwrap();
        assert_eq!(params, vec![RawParameter::new("vesselPrice", "25000000", "currency")]);
    }

    #[test]
    fn strips_code_fences_and_stringifies_numbers() {
        let reply = "```json\n[{\"key\":\"term\",\"value\":15,\"type\":\"years\"}]\n```\n";
        let params = parse_reply(reply).unwrap();
        assert_eq!(params[0].value, "15");
        assert_eq!(params[0].kind, "years");
    }

    #[test]
    fn parses_keyed_reply() {
        let reply = r#"{"discountRate":{"value":0.08,"type":"percentage"},"name":{"value":"Ocean Star","type":"text"}}"#;
        let params = parse_reply(reply).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], RawParameter::new("discountRate", "0.08", "percentage"));
    }

    #[test]
    fn rejects_prose() {
        assert!(parse_reply("Sure! The vessel costs 20M.").is_err());
    }

    #[test]
    fn rejects_nested_values() {
        assert!(parse_reply(r#"[{"key":"x","value":{"a":1},"type":"currency"}]"#).is_err());
    }

    #[test]
    fn extractor_is_injectable() {
        let extractor: &dyn Extractor = &Canned(r#"[{"key":"term","value":"5","type":"years"}]"#);
        let params = extractor.extract("five year charter").unwrap();
        assert_eq!(params[0].key, "term");
    }

    #[test]
    fn analyst_is_injectable() {
        let analyst: &dyn Analyst = &EchoAnalyst;
        let answer = analyst.answer("Is it worth it?", &sample_result()).unwrap();
        assert_eq!(answer, "Is it worth it?: NPV 36");
    }

    #[test]
    fn analyst_request_carries_wire_result() {
        let result = sample_result();
        let request = serde_json::to_value(AnalystRequest {
            question: "Why is payback short?",
            result: &result,
        })
        .unwrap();
        assert_eq!(request["question"], "Why is payback short?");
        assert_eq!(request["result"]["profitabilityMetrics"]["paybackPeriod"], 0.67);
        assert_eq!(request["result"]["cashFlowProjections"][1]["cashFlow"], 150.0);
    }

    #[cfg(unix)]
    #[test]
    fn command_analyst_reads_stdout() {
        let analyst = CommandAnalyst {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "cat >/dev/null; echo '  NPV is positive.  '".to_string()],
        };
        let answer = analyst.answer("Is NPV positive?", &sample_result()).unwrap();
        assert_eq!(answer, "NPV is positive.");
    }

    #[cfg(unix)]
    #[test]
    fn large_input_does_not_block_on_pipe() {
        // the child echoes its input back, so both pipes fill at once
        let extractor = CommandExtractor {
            program: "cat".to_string(),
            args: Vec::new(),
        };
        let entries: Vec<String> = (0..5000)
            .map(|i| format!(r#"{{"key":"note{}","value":"{}","type":"text"}}"#, i, "x".repeat(40)))
            .collect();
        let reply = format!("[{}]", entries.join(","));
        let params = extractor.extract(&reply).unwrap();
        assert_eq!(params.len(), 5000);
    }
}
