// src/prompt.rs

//! Prompt composition and output-metadata parsing.
//!
//! Both halves of the backend text contract live here:
//! - [`compose_prompt`] builds the full stdin payload from an agent profile
//!   and the user's prompt, including the instruction to emit a trailing
//!   metadata block.
//! - [`parse_metadata`] recovers the title/summary from the raw output,
//!   with fixed fallback defaults when the marker is absent.
//!
//! These are pure text transforms with no IO and no state.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::AgentProfile;

/// Marker the backend is instructed to emit before its metadata block.
pub const METADATA_MARKER: &str = "---COMMIT_METADATA---";

const DEFAULT_TITLE: &str = "Executed Claude command";
const DEFAULT_SUMMARY: &str = "Claude execution completed.";

/// Title and summary derived from the backend's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMetadata {
    pub title: String,
    pub summary: String,
}

impl OutputMetadata {
    /// Fixed defaults used when the output carries no metadata block.
    pub fn fallback() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            summary: DEFAULT_SUMMARY.to_string(),
        }
    }
}

/// Compose the full prompt delivered to the backend over stdin.
///
/// Structure: system instructions (agent identity, permissions and explicit
/// restrictions), the metadata-block instruction, then the user prompt.
pub fn compose_prompt(agent: &AgentProfile, user_prompt: &str) -> String {
    let permissions = permissions_sentence(agent);
    let restrictions = restriction_lines(agent);

    format!(
        "SYSTEM:\n\
         You are acting as {name}.\n\
         Role: {role}\n\
         Permissions: {permissions}{restrictions}\n\
         You must strictly respect these permissions.\n\
         \n\
         IMPORTANT: At the end of your response, you MUST provide metadata in this exact format:\n\
         {marker}\n\
         TITLE: <one-line summary of what was done, max 80 characters>\n\
         SUMMARY: <2-3 sentence description of the changes and reasoning>\n\
         \n\
         USER:\n\
         {user_prompt}",
        name = agent.name,
        role = agent.role,
        permissions = permissions,
        restrictions = restrictions,
        marker = METADATA_MARKER,
        user_prompt = user_prompt,
    )
}

fn permissions_sentence(agent: &AgentProfile) -> String {
    let mut granted = Vec::new();
    if agent.permissions.read {
        granted.push("read files");
    }
    if agent.permissions.write {
        granted.push("create and modify files");
    }
    if agent.permissions.delete {
        granted.push("delete files");
    }

    if granted.is_empty() {
        "You have no file permissions.".to_string()
    } else {
        format!("You may {}.", granted.join(", "))
    }
}

fn restriction_lines(agent: &AgentProfile) -> String {
    let mut restrictions = Vec::new();
    if !agent.permissions.read {
        restrictions.push("DO NOT attempt to read any files.");
    }
    if !agent.permissions.write {
        restrictions.push("DO NOT create or modify any files.");
    }
    if !agent.permissions.delete {
        restrictions.push("DO NOT delete any files.");
    }

    if restrictions.is_empty() {
        String::new()
    } else {
        format!("\n{}", restrictions.join("\n"))
    }
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"TITLE:[ \t]*(.+)").expect("valid title regex"))
}

fn summary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Non-greedy across lines, terminated by a `---` line, a blank line, or
    // end of input, so multi-line summaries survive.
    RE.get_or_init(|| {
        Regex::new(r"(?s)SUMMARY:[ \t]*(.+?)(?:\n---|\n\n|$)").expect("valid summary regex")
    })
}

/// Parse the metadata block from the backend's raw output.
///
/// Returns [`OutputMetadata::fallback`] values for anything that cannot be
/// recovered: a missing marker, or a marker without the expected fields.
pub fn parse_metadata(raw_output: &str) -> OutputMetadata {
    let fallback = OutputMetadata::fallback();

    let Some(marker_idx) = raw_output.find(METADATA_MARKER) else {
        return fallback;
    };
    let section = &raw_output[marker_idx..];

    let title = title_re()
        .captures(section)
        .map(|c| c[1].trim().to_string())
        .unwrap_or(fallback.title);

    let summary = summary_re()
        .captures(section)
        .map(|c| c[1].trim().to_string())
        .unwrap_or(fallback.summary);

    OutputMetadata { title, summary }
}

/// Whether the output carried a metadata block at all.
pub fn has_metadata(raw_output: &str) -> bool {
    raw_output.contains(METADATA_MARKER)
}

/// The response body without the trailing metadata block.
pub fn strip_metadata(raw_output: &str) -> &str {
    match raw_output.find(METADATA_MARKER) {
        Some(idx) => raw_output[..idx].trim_end(),
        None => raw_output,
    }
}
