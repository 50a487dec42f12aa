//! Counter extraction from engine state dumps
//!
//! iptables-save emits per-chain policy counters on `:` lines and per-rule
//! counters as a leading `[packets:bytes]` bracket when invoked with
//! `--counters`. This parser scans line by line, attributing rule counters
//! to the most recently seen chain.
//!
//! The parser is total: malformed brackets degrade to zero instead of
//! failing the read, since a counter display must never be taken down by
//! one odd line in an otherwise valid dump.

use crate::core::rules::Counter;

/// Parses iptables-save output into counter records.
///
/// A line `:INPUT ACCEPT [1234:56789]` starts tracking `INPUT` and emits a
/// `"policy"` counter; a line `[100:4096] -A INPUT ...` emits a rule
/// counter attributed to the current chain.
pub fn parse_counters(raw: &str) -> Vec<Counter> {
    let mut counters = Vec::new();
    let mut current_chain = String::new();

    for line in raw.lines() {
        let line = line.trim();

        // Chain policy line: ":INPUT ACCEPT [1234:56789]"
        if let Some(rest) = line.strip_prefix(':') {
            let fields: Vec<&str> = rest.split_whitespace().collect();
            if fields.len() >= 3 {
                current_chain = fields[0].to_string();
                let (packets, bytes) = parse_counter_bracket(fields[2]);
                counters.push(Counter {
                    chain: current_chain.clone(),
                    rule: "policy".to_string(),
                    packets,
                    bytes,
                });
            }
            continue;
        }

        // Rule line with counter: "[100:4096] -A INPUT ..."
        if line.starts_with('[') {
            let (bracket, rest) = match line.find(']') {
                Some(end) => (&line[..=end], line[end + 1..].trim_start()),
                None => ("", line),
            };
            let (packets, bytes) = parse_counter_bracket(bracket);
            counters.push(Counter {
                chain: current_chain.clone(),
                rule: rest.to_string(),
                packets,
                bytes,
            });
        }
    }

    counters
}

/// Parses a "[packets:bytes]" pair, degrading to (0, 0) on any malformation
fn parse_counter_bracket(s: &str) -> (u64, u64) {
    let inner = s.trim_matches(|c| c == '[' || c == ']');
    let Some((packets, bytes)) = inner.split_once(':') else {
        return (0, 0);
    };
    (
        packets.trim().parse().unwrap_or(0),
        bytes.trim().parse().unwrap_or(0),
    )
}
