//! Framed trace records.
//!
//! One channel per `<channel>.dilog` file, UTF-8 text, LF line endings,
//! one record per line:
//!
//! | Record      | Syntax              |
//! |-------------|---------------------|
//! | Message     | `[<prefix>]<payload>` |
//! | Open block  | `[<prefix>[`        |
//! | Close block | `]<prefix>]`        |
//!
//! `<prefix>` is `channelName(/blockName)*`. Every record starts with one
//! sigil character (`[` or `]`) followed immediately by the prefix, which
//! is what the relevance predicate exploits.

use std::fmt;

/// Longest payload emitted or matched, in bytes. Longer messages are
/// truncated at a char boundary at or below this cap.
pub const MAX_PAYLOAD: usize = 999;

// ═══════════════════════════════════════════════════════════════════════
//  Frame construction
// ═══════════════════════════════════════════════════════════════════════

/// The opening frame line for `prefix` (without trailing newline).
pub fn open_frame(prefix: &str) -> String {
    format!("[{prefix}[")
}

/// The closing frame line for `prefix` (without trailing newline).
pub fn close_frame(prefix: &str) -> String {
    format!("]{prefix}]")
}

/// The message line for `payload` under `prefix` (without trailing newline).
///
/// `payload` must already be normalized (see [`normalize_payload`]).
pub fn message_line(prefix: &str, payload: &str) -> String {
    format!("[{prefix}]{payload}")
}

/// Strip trailing newlines and cap the payload at [`MAX_PAYLOAD`] bytes.
///
/// The caller supplies already-formatted text that may or may not end in a
/// newline; the emitted record always carries exactly one. Interior
/// newlines are the caller's contract to avoid (a payload line must be a
/// single record).
pub fn normalize_payload(text: &str) -> &str {
    let mut payload = text.trim_end_matches('\n');
    if payload.len() > MAX_PAYLOAD {
        let mut cut = MAX_PAYLOAD;
        while !payload.is_char_boundary(cut) {
            cut -= 1;
        }
        payload = &payload[..cut];
    }
    payload
}

// ═══════════════════════════════════════════════════════════════════════
//  Relevance predicate
// ═══════════════════════════════════════════════════════════════════════

/// Whether `line` is relevant to `prefix`: the prefix appears starting at
/// offset 1, right after the sigil character.
///
/// Sibling sub-blocks the verifier is not inside fail this test and are
/// skipped silently while scanning. Note the documented quirk: a longer
/// prefix sharing the same leading characters also passes, so sibling
/// block names where one is a prefix of the other (`a` and `ab`) produce
/// undefined matching behavior.
pub fn is_relevant(line: &str, prefix: &str) -> bool {
    line.len() > prefix.len() && line.is_char_boundary(1) && line[1..].starts_with(prefix)
}

// ═══════════════════════════════════════════════════════════════════════
//  Parsed records (inspector side)
// ═══════════════════════════════════════════════════════════════════════

/// A parsed trace record, used by the offline inspector. The live
/// verifier matches raw lines and never goes through this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    Message { prefix: String, payload: String },
    Open { prefix: String },
    Close { prefix: String },
}

impl TraceRecord {
    /// Parse one line (without trailing newline). Returns `None` for
    /// lines that are not well-formed records.
    pub fn parse(line: &str) -> Option<Self> {
        let bytes = line.as_bytes();
        match bytes.first()? {
            b'[' => {
                // "[prefix[" opens a block, "[prefix]payload" is a message.
                let rest = &line[1..];
                if let Some(open) = rest.find('[') {
                    // A '[' before any ']' terminates the prefix of an
                    // open frame; a ']' first means message.
                    match rest.find(']') {
                        Some(close) if close < open => Some(Self::Message {
                            prefix: rest[..close].to_string(),
                            payload: rest[close + 1..].to_string(),
                        }),
                        _ if open == rest.len() - 1 => Some(Self::Open {
                            prefix: rest[..open].to_string(),
                        }),
                        _ => None,
                    }
                } else {
                    let close = rest.find(']')?;
                    Some(Self::Message {
                        prefix: rest[..close].to_string(),
                        payload: rest[close + 1..].to_string(),
                    })
                }
            }
            b']' => {
                if bytes.len() >= 3 && *bytes.last()? == b']' {
                    Some(Self::Close {
                        prefix: line[1..line.len() - 1].to_string(),
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            Self::Message { prefix, .. } | Self::Open { prefix } | Self::Close { prefix } => prefix,
        }
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message { prefix, payload } => write!(f, "[{prefix}]{payload}"),
            Self::Open { prefix } => write!(f, "[{prefix}["),
            Self::Close { prefix } => write!(f, "]{prefix}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip_through_parse() {
        assert_eq!(
            TraceRecord::parse("[c/loop["),
            Some(TraceRecord::Open {
                prefix: "c/loop".into()
            })
        );
        assert_eq!(
            TraceRecord::parse("]c/loop]"),
            Some(TraceRecord::Close {
                prefix: "c/loop".into()
            })
        );
        assert_eq!(
            TraceRecord::parse("[c]hello world"),
            Some(TraceRecord::Message {
                prefix: "c".into(),
                payload: "hello world".into()
            })
        );
    }

    #[test]
    fn message_payload_may_contain_brackets() {
        assert_eq!(
            TraceRecord::parse("[c]a[0] = b[1]"),
            Some(TraceRecord::Message {
                prefix: "c".into(),
                payload: "a[0] = b[1]".into()
            })
        );
    }

    #[test]
    fn garbage_lines_do_not_parse() {
        assert_eq!(TraceRecord::parse(""), None);
        assert_eq!(TraceRecord::parse("plain text"), None);
        assert_eq!(TraceRecord::parse("]"), None);
        assert_eq!(TraceRecord::parse("[nocloser"), None);
    }

    #[test]
    fn relevance_requires_prefix_at_offset_one() {
        assert!(is_relevant("[c/L]i=0", "c/L"));
        assert!(is_relevant("[c/L[", "c/L"));
        assert!(is_relevant("]c/L]", "c/L"));
        assert!(!is_relevant("[c/M]i=0", "c/L"));
        assert!(!is_relevant("[c]done", "c/L"));
        // Documented quirk: deeper prefixes stay relevant to their parent.
        assert!(is_relevant("[c/L]i=0", "c"));
        assert!(is_relevant("[c/L[", "c"));
    }

    #[test]
    fn normalize_strips_trailing_newlines_only() {
        assert_eq!(normalize_payload("abc\n"), "abc");
        assert_eq!(normalize_payload("abc"), "abc");
        assert_eq!(normalize_payload("abc\n\n"), "abc");
        assert_eq!(normalize_payload(""), "");
    }

    #[test]
    fn normalize_caps_payload_bytes() {
        let long = "x".repeat(2000);
        assert_eq!(normalize_payload(&long).len(), MAX_PAYLOAD);
        let exact = "y".repeat(MAX_PAYLOAD);
        assert_eq!(normalize_payload(&exact).len(), MAX_PAYLOAD);
        // Multi-byte chars are cut on a boundary at or below the cap.
        let wide = "é".repeat(600); // 1200 bytes
        let cut = normalize_payload(&wide);
        assert!(cut.len() <= MAX_PAYLOAD);
        assert!(cut.is_char_boundary(cut.len()));
    }
}
