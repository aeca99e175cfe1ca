use std::error::Error;
use std::fmt;

use crate::encoder::parse_octal;
use crate::memory::MEMORY_SIZE;
use crate::symbol::Span;

/// Parse load text into `(address, word)` pairs.
///
/// Each line is `<address-octal> <word-octal>`. Blank lines and lines starting with `#` or `;`
/// are skipped. Anything after the word is ignored, so a listing loads as well.
pub fn parse_load_text(src: &str) -> Result<Vec<(u16, u16)>, LoadError> {
    let mut image = Vec::new();
    let mut offs = 0;

    for (i, raw) in src.split('\n').enumerate() {
        let line_offs = offs;
        offs += raw.len() + 1;

        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let error = |kind: LoadErrorKind, part: &str| {
            let start = part.as_ptr() as usize - raw.as_ptr() as usize;
            LoadError {
                kind,
                line: i + 1,
                text: line.to_string(),
                span: Span::new(line_offs + start, part.len()),
            }
        };
        let octal = |token: &str| {
            parse_octal(token).map_err(|_| {
                error(
                    LoadErrorKind::InvalidOctal {
                        token: token.to_string(),
                    },
                    token,
                )
            })
        };

        let mut parts = line.split_whitespace();
        let (Some(address_token), Some(word_token)) = (parts.next(), parts.next()) else {
            return Err(error(LoadErrorKind::MissingWord, line));
        };
        let address = octal(address_token)?;
        let word = octal(word_token)?;
        if address as usize >= MEMORY_SIZE {
            return Err(error(
                LoadErrorKind::AddressOutOfRange { address },
                address_token,
            ));
        }
        image.push((address, word));
    }

    Ok(image)
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LoadError {
    pub kind: LoadErrorKind,
    /// 1-based
    pub line: usize,
    pub text: String,
    pub span: Span,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LoadErrorKind {
    MissingWord,
    InvalidOctal { token: String },
    AddressOutOfRange { address: u16 },
}

impl Error for LoadError {}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Load line {}: {} - ", self.line, self.text)?;
        match &self.kind {
            LoadErrorKind::MissingWord => write!(f, "expected `<address> <word>`"),
            LoadErrorKind::InvalidOctal { token } => write!(f, "`{}` is not a 16-bit octal number", token),
            LoadErrorKind::AddressOutOfRange { address } => {
                write!(f, "address {:o} is outside of memory", address)
            }
        }
    }
}
