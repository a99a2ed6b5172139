//! Base-62 rendering of ID values.

use crate::{IdGenError, IdGenResult};

/// Number of symbols in the alphabet.
pub const RADIX: u64 = 62;

/// Symbols ordered by value: digits, then lowercase, then uppercase.
pub const SYMBOLS: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub const DEFAULT_ID_LENGTH: usize = 6;

/// Renders values in base 62, optionally left-padded with `'0'`.
///
/// Value `0` renders as the empty string before padding. Values whose
/// rendering is longer than the fixed length are not truncated.
///
/// ```rust
/// use warden_idgen::SymbolCodec;
///
/// let codec = SymbolCodec::fixed(6);
/// assert_eq!(codec.render(0), "000000");
/// assert_eq!(codec.render(61), "00000z");
/// assert_eq!(codec.render(62), "000010");
/// assert_eq!(codec.parse("000010").unwrap(), 62);
///
/// assert_eq!(SymbolCodec::variable().render(0), "");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolCodec {
    fixed_length: Option<usize>,
}

impl Default for SymbolCodec {
    fn default() -> Self {
        Self::fixed(DEFAULT_ID_LENGTH)
    }
}

impl SymbolCodec {
    pub fn new(fixed_length: Option<usize>) -> Self {
        Self { fixed_length }
    }

    pub fn fixed(length: usize) -> Self {
        Self::new(Some(length))
    }

    pub fn variable() -> Self {
        Self::new(None)
    }

    pub fn fixed_length(&self) -> Option<usize> {
        self.fixed_length
    }

    pub fn render(&self, mut value: u64) -> String {
        let mut digits = Vec::with_capacity(11);
        while value > 0 {
            digits.push(SYMBOLS[(value % RADIX) as usize]);
            value /= RADIX;
        }
        if let Some(length) = self.fixed_length {
            while digits.len() < length {
                digits.push(b'0');
            }
        }
        digits.reverse();
        digits.into_iter().map(char::from).collect()
    }

    /// Inverse of [`render`](Self::render). Leading `'0'` padding is
    /// ignored.
    pub fn parse(&self, rendered: &str) -> IdGenResult<u64> {
        let mut value: u64 = 0;
        for (position, symbol) in rendered.chars().enumerate() {
            let digit = symbol_value(symbol).ok_or(IdGenError::InvalidSymbol { symbol, position })?;
            value = value
                .checked_mul(RADIX)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(|| IdGenError::SymbolOverflow {
                    input: rendered.to_string(),
                })?;
        }
        Ok(value)
    }
}

fn symbol_value(symbol: char) -> Option<u64> {
    let value = match symbol {
        '0'..='9' => symbol as u64 - '0' as u64,
        'a'..='z' => symbol as u64 - 'a' as u64 + 10,
        'A'..='Z' => symbol as u64 - 'A' as u64 + 36,
        _ => return None,
    };
    Some(value)
}
