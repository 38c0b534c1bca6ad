//! Symbol inventory shared with the text embedding table
//!
//! Order matters: a symbol's id is its index here.

use std::collections::HashMap;
use std::sync::OnceLock;

const PAD: &str = "_";
const SPECIAL: &str = "-";
const PUNCTUATION: &str = "!'(),.:;? ";
const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// CMUdict phonemes, stored with an `@` prefix in the table
const ARPABET: [&str; 84] = [
    "AA", "AA0", "AA1", "AA2", "AE", "AE0", "AE1", "AE2", "AH", "AH0", "AH1", "AH2", "AO", "AO0",
    "AO1", "AO2", "AW", "AW0", "AW1", "AW2", "AY", "AY0", "AY1", "AY2", "B", "CH", "D", "DH",
    "EH", "EH0", "EH1", "EH2", "ER", "ER0", "ER1", "ER2", "EY", "EY0", "EY1", "EY2", "F", "G",
    "HH", "IH", "IH0", "IH1", "IH2", "IY", "IY0", "IY1", "IY2", "JH", "K", "L", "M", "N", "NG",
    "OW", "OW0", "OW1", "OW2", "OY", "OY0", "OY1", "OY2", "P", "R", "S", "SH", "T", "TH", "UH",
    "UH0", "UH1", "UH2", "UW", "UW0", "UW1", "UW2", "V", "W", "Y", "Z", "ZH",
];

/// Number of symbols in [`SYMBOLS`]
pub const NUMBER_SYMBOLS: usize = 1 + SPECIAL.len() + PUNCTUATION.len() + LETTERS.len() + ARPABET.len();

/// The symbol table, index = id
pub static SYMBOLS: SymbolTable = SymbolTable;

/// Lazily built view of the symbol inventory
pub struct SymbolTable;

struct Tables {
    symbols: Vec<String>,
    ids: HashMap<String, u32>,
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let symbols: Vec<String> = std::iter::once(PAD.to_string())
            .chain(SPECIAL.chars().map(String::from))
            .chain(PUNCTUATION.chars().map(String::from))
            .chain(LETTERS.chars().map(String::from))
            .chain(ARPABET.iter().map(|s| format!("@{}", s)))
            .collect();
        let ids = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect();
        Tables { symbols, ids }
    })
}

impl SymbolTable {
    /// Symbol for an id
    pub fn get(&self, id: u32) -> Option<&'static str> {
        tables().symbols.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        tables().symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Id of a symbol (`"a"`, `"@AH0"`, ...)
pub fn symbol_id(symbol: &str) -> Option<u32> {
    tables().ids.get(symbol).copied()
}
