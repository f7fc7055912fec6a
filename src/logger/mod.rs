//! Structured event logging for pipeline runs: a line-delimited JSON trace
//! written to `<data>/events.jsonl`, independent of the human-facing
//! stdout/stderr rendering the CLI does at lower verbosity levels.

pub mod jsonl;
