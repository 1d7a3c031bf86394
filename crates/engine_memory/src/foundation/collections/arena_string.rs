//! Arena-backed strings
//!
//! Immutable UTF-8 text living in an [`Arena`]. Every derived string (case
//! changes, slices, concatenation) is written to the arena passed to the
//! operation, usually the frame's temporary arena.

use std::ffi::CStr;
use std::fmt;
use std::ops::Deref;

use crate::foundation::memory::Arena;

/// Immutable string stored in an arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ArenaString<'a> {
    text: &'a str,
}

impl<'a> ArenaString<'a> {
    /// Copy `text` into `arena`.
    pub fn new(arena: &'a Arena, text: &str) -> Self {
        Self {
            text: arena.push_str(text),
        }
    }

    /// String of `len` NUL characters.
    pub fn with_len(arena: &'a Arena, len: usize) -> Self {
        let bytes = arena.push_zero(len);
        // SAFETY: all-zero bytes are valid UTF-8.
        Self {
            text: unsafe { std::str::from_utf8_unchecked(bytes) },
        }
    }

    /// Concatenate `parts` into one new string.
    pub fn join(arena: &'a Arena, parts: &[&str]) -> Self {
        let len = parts.iter().map(|part| part.len()).sum();
        let bytes = arena.push(len);
        let mut at = 0;
        for part in parts {
            bytes[at..at + part.len()].copy_from_slice(part.as_bytes());
            at += part.len();
        }
        // SAFETY: a concatenation of `str`s is valid UTF-8.
        Self {
            text: unsafe { std::str::from_utf8_unchecked(bytes) },
        }
    }

    /// Text as a `&str`
    pub const fn as_str(&self) -> &'a str {
        self.text
    }

    /// Length in bytes
    pub const fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the string is empty
    pub const fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Copy of the byte range `[start, end)`.
    ///
    /// Returns an empty string when the range is empty, out of bounds, or
    /// splits a character.
    pub fn substr<'b>(&self, arena: &'b Arena, start: usize, end: usize) -> ArenaString<'b> {
        match self.text.get(start..end) {
            Some(slice) if start < end => ArenaString::new(arena, slice),
            _ => ArenaString::default(),
        }
    }

    /// Copy of everything from byte `start` on.
    pub fn substr_from<'b>(&self, arena: &'b Arena, start: usize) -> ArenaString<'b> {
        self.substr(arena, start, self.len())
    }

    /// ASCII upper-case copy
    pub fn upper<'b>(&self, arena: &'b Arena) -> ArenaString<'b> {
        let text = arena.push_str(self.text);
        text.make_ascii_uppercase();
        ArenaString { text }
    }

    /// ASCII lower-case copy
    pub fn lower<'b>(&self, arena: &'b Arena) -> ArenaString<'b> {
        let text = arena.push_str(self.text);
        text.make_ascii_lowercase();
        ArenaString { text }
    }

    /// Copy with the characters in reverse order
    pub fn reverse<'b>(&self, arena: &'b Arena) -> ArenaString<'b> {
        let bytes = arena.push(self.len());
        let mut at = 0;
        for c in self.text.chars().rev() {
            at += c.encode_utf8(&mut bytes[at..]).len();
        }
        // SAFETY: the buffer is filled with whole encoded characters.
        ArenaString {
            text: unsafe { std::str::from_utf8_unchecked(bytes) },
        }
    }

    /// `self` followed by `other`
    pub fn concat<'b>(&self, arena: &'b Arena, other: &str) -> ArenaString<'b> {
        ArenaString::join(arena, &[self.text, other])
    }

    /// Same as [`ArenaString::concat`]
    pub fn append<'b>(&self, arena: &'b Arena, other: &str) -> ArenaString<'b> {
        self.concat(arena, other)
    }

    /// `other` followed by `self`
    pub fn prepend<'b>(&self, arena: &'b Arena, other: &str) -> ArenaString<'b> {
        ArenaString::join(arena, &[other, self.text])
    }

    /// NUL-terminated copy for C APIs.
    ///
    /// The result stops at the first interior NUL, if any.
    pub fn to_c_str<'b>(&self, arena: &'b Arena) -> &'b CStr {
        let bytes = arena.push(self.len() + 1);
        bytes[..self.len()].copy_from_slice(self.text.as_bytes());
        bytes[self.len()] = 0;
        CStr::from_bytes_until_nul(bytes).unwrap_or_default()
    }
}

impl Deref for ArenaString<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        self.text
    }
}

impl<'a> From<&'a str> for ArenaString<'a> {
    /// Wrap text that already lives in an arena.
    fn from(text: &'a str) -> Self {
        Self { text }
    }
}

impl AsRef<str> for ArenaString<'_> {
    fn as_ref(&self) -> &str {
        self.text
    }
}

impl PartialEq<str> for ArenaString<'_> {
    fn eq(&self, other: &str) -> bool {
        self.text == other
    }
}

impl PartialEq<&str> for ArenaString<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

impl fmt::Display for ArenaString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text)
    }
}

impl fmt::Debug for ArenaString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.text, f)
    }
}
