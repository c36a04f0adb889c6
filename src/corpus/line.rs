//! Corpus line parser.
//!
//! Two line formats coexist in word lists seen in the wild:
//!
//! - `word` - a bare plaintext
//! - `word 5f4dcc3b5aa765d61d8327deb882cf99` - plaintext with a precomputed digest
//!
//! The embedded digest is only an integrity check. The digest that gets indexed
//! is always recomputed from the plaintext.

use crate::utils::digest::Digest;

/// A parsed, non-blank corpus line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusLine<'a> {
    Plain(&'a str),
    PlainWithDigest(&'a str, Digest),
}

/// Why a line contributes nothing to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRejection {
    /// Empty or whitespace only
    Blank,
    /// Not valid UTF-8
    NotUtf8,
    /// Embedded digest disagrees with the plaintext
    Mismatch,
}

impl<'a> CorpusLine<'a> {
    /// Parse raw line bytes (without the terminator)
    pub fn parse_bytes(raw: &'a [u8]) -> Result<Self, LineRejection> {
        let text = std::str::from_utf8(raw).map_err(|_| LineRejection::NotUtf8)?;
        Self::parse(text)
    }

    /// Parse a line. Surrounding whitespace (including `\r`) is ignored.
    pub fn parse(line: &'a str) -> Result<Self, LineRejection> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(LineRejection::Blank);
        }

        if let Some((word, token)) = trimmed.rsplit_once(' ') {
            let word = word.trim_end();
            if !word.is_empty() && Digest::looks_like_hex(token) {
                // looks_like_hex guarantees the decode succeeds
                if let Ok(digest) = Digest::from_hex(token) {
                    return Ok(CorpusLine::PlainWithDigest(word, digest));
                }
            }
        }

        Ok(CorpusLine::Plain(trimmed))
    }

    /// The plaintext part of the line
    pub fn word(&self) -> &'a str {
        match *self {
            CorpusLine::Plain(word) | CorpusLine::PlainWithDigest(word, _) => word,
        }
    }

    /// Compute the digest to index under, validating any embedded digest
    pub fn resolve(&self) -> Result<(Digest, &'a str), LineRejection> {
        match *self {
            CorpusLine::Plain(word) => Ok((Digest::of(word.as_bytes()), word)),
            CorpusLine::PlainWithDigest(word, embedded) => {
                let computed = Digest::of(word.as_bytes());
                if computed == embedded {
                    Ok((computed, word))
                } else {
                    Err(LineRejection::Mismatch)
                }
            }
        }
    }
}

/// Parse and resolve a raw line in one step
#[inline]
pub fn resolve_line(raw: &[u8]) -> Result<(Digest, &str), LineRejection> {
    CorpusLine::parse_bytes(raw)?.resolve()
}
