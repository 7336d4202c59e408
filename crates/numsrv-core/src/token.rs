//! Wire frames and the 9-digit token type.
//!
//! Every client line is either a decimal number written with exactly
//! [`TOKEN_LEN`] ASCII digits (leading zeros allowed) or the literal
//! [`TERMINATOR`]. Surrounding whitespace, including the `\r\n` or `\n`
//! line ending, is trimmed before classification.

use std::fmt;

use crate::error::FrameError;

/// Number of digits in a token. Nine digits always fit in a `u32`.
pub const TOKEN_LEN: usize = 9;

/// In-band frame that requests a graceful shutdown.
pub const TERMINATOR: &[u8] = b"terminate";

/// A frame confirmed to be a 9-digit decimal value.
///
/// Keeps the original digits so the log can be written without
/// re-formatting the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedToken {
    value: u32,
    digits: [u8; TOKEN_LEN],
}

impl ValidatedToken {
    /// Parse an already trimmed frame.
    pub fn parse(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() != TOKEN_LEN {
            return Err(FrameError::Length {
                expected: TOKEN_LEN,
                actual: frame.len(),
            });
        }

        let mut digits = [0u8; TOKEN_LEN];
        let mut value = 0u32;
        for (slot, &b) in digits.iter_mut().zip(frame) {
            if !b.is_ascii_digit() {
                return Err(FrameError::NonDigit(b));
            }
            *slot = b;
            value = value * 10 + u32::from(b - b'0');
        }

        Ok(Self { value, digits })
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// The digits exactly as the client sent them.
    #[inline]
    pub fn digits(&self) -> &[u8; TOKEN_LEN] {
        &self.digits
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Only ASCII digits are ever stored.
        std::str::from_utf8(&self.digits).unwrap_or("")
    }
}

impl fmt::Display for ValidatedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Token(ValidatedToken),
    Terminate,
}

/// Trim a raw line and classify it.
pub fn classify(raw: &[u8]) -> Result<Frame, FrameError> {
    let trimmed = raw.trim_ascii();
    if trimmed == TERMINATOR {
        return Ok(Frame::Terminate);
    }
    ValidatedToken::parse(trimmed).map(Frame::Token)
}
