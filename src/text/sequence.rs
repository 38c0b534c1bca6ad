//! Text <-> symbol id conversion
//!
//! Plain characters map one-to-one onto the symbol table; ARPAbet can be
//! embedded in curly braces: `"Turn left on {HH AW1 S S T AH0 N} Street."`

use super::symbols::{symbol_id, SYMBOLS};

/// Convert text to symbol ids, dropping characters the table does not know
pub fn text_to_sequence(text: &str) -> Vec<u32> {
    let mut sequence = Vec::with_capacity(text.len());
    let mut rest = text;

    while !rest.is_empty() {
        match rest.find('{') {
            Some(open) => {
                push_characters(&rest[..open], &mut sequence);
                let after = &rest[open + 1..];
                match after.find('}') {
                    Some(close) => {
                        push_arpabet(&after[..close], &mut sequence);
                        rest = &after[close + 1..];
                    }
                    None => {
                        // Unterminated group: treat the remainder as plain text
                        push_characters(after, &mut sequence);
                        rest = "";
                    }
                }
            }
            None => {
                push_characters(rest, &mut sequence);
                rest = "";
            }
        }
    }
    sequence
}

/// Convert symbol ids back to text, re-wrapping ARPAbet in braces
pub fn sequence_to_text(sequence: &[u32]) -> String {
    let mut out = String::new();
    let mut in_arpabet = false;

    for symbol in sequence.iter().filter_map(|&id| SYMBOLS.get(id)) {
        match symbol.strip_prefix('@') {
            Some(phone) => {
                out.push(if in_arpabet { ' ' } else { '{' });
                out.push_str(phone);
                in_arpabet = true;
            }
            None => {
                if in_arpabet {
                    out.push('}');
                    in_arpabet = false;
                }
                out.push_str(symbol);
            }
        }
    }
    if in_arpabet {
        out.push('}');
    }
    out
}

fn push_characters(text: &str, sequence: &mut Vec<u32>) {
    let mut buf = [0u8; 4];
    for c in text.chars() {
        if c == '_' || c == '~' {
            continue;
        }
        if let Some(id) = symbol_id(c.encode_utf8(&mut buf)) {
            sequence.push(id);
        }
    }
}

fn push_arpabet(group: &str, sequence: &mut Vec<u32>) {
    sequence.extend(
        group
            .split_whitespace()
            .filter_map(|phone| symbol_id(&format!("@{}", phone))),
    );
}
