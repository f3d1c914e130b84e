//! Message flags.
//!
//! The six system flags live in a bit set; keywords are kept by name in
//! the order they were first seen. Names compare case-insensitively, as
//! IMAP requires.

use std::fmt;

/// A system flag or a keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// `\Seen`
    Seen,
    /// `\Answered`
    Answered,
    /// `\Flagged`
    Flagged,
    /// `\Deleted`
    Deleted,
    /// `\Draft`
    Draft,
    /// `\Recent`, read-only.
    Recent,
    /// Anything else, such as `$Forwarded` or `\*`.
    Keyword(String),
}

/// System flags in wire order.
static SYSTEM: [(Flag, &str); 6] = [
    (Flag::Seen, "\\Seen"),
    (Flag::Answered, "\\Answered"),
    (Flag::Flagged, "\\Flagged"),
    (Flag::Deleted, "\\Deleted"),
    (Flag::Draft, "\\Draft"),
    (Flag::Recent, "\\Recent"),
];

impl Flag {
    /// Reads one flag atom.
    #[must_use]
    pub fn parse(atom: &str) -> Self {
        SYSTEM
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(atom))
            .map_or_else(|| Self::Keyword(atom.to_string()), |(flag, _)| flag.clone())
    }

    /// Wire form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Keyword(name) => name,
            system => SYSTEM[system.bit_index().unwrap_or_default()].1,
        }
    }

    const fn bit_index(&self) -> Option<usize> {
        Some(match self {
            Self::Seen => 0,
            Self::Answered => 1,
            Self::Flagged => 2,
            Self::Deleted => 3,
            Self::Draft => 4,
            Self::Recent => 5,
            Self::Keyword(_) => return None,
        })
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of flags without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    system: u8,
    keywords: Vec<String>,
}

impl Flags {
    /// The empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `(\Seen $Label1)`; the parentheses may be left out.
    #[must_use]
    pub fn parse_list(list: &str) -> Self {
        list.trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split_whitespace()
            .map(Flag::parse)
            .collect()
    }

    /// Adds `flag`; a keyword already present under any casing is kept as is.
    pub fn insert(&mut self, flag: Flag) {
        match flag.bit_index() {
            Some(bit) => self.system |= 1 << bit,
            None => {
                if let Flag::Keyword(name) = flag
                    && self.keyword_position(&name).is_none()
                {
                    self.keywords.push(name);
                }
            }
        }
    }

    /// Drops `flag` if present.
    pub fn remove(&mut self, flag: &Flag) {
        match (flag.bit_index(), flag) {
            (Some(bit), _) => self.system &= !(1 << bit),
            (None, Flag::Keyword(name)) => {
                if let Some(at) = self.keyword_position(name) {
                    self.keywords.remove(at);
                }
            }
            (None, _) => {}
        }
    }

    /// Membership test.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        match (flag.bit_index(), flag) {
            (Some(bit), _) => self.system & (1 << bit) != 0,
            (None, Flag::Keyword(name)) => self.keyword_position(name).is_some(),
            (None, _) => false,
        }
    }

    /// `\Seen` is set.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.contains(&Flag::Seen)
    }

    /// `\Deleted` is set.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.contains(&Flag::Deleted)
    }

    /// System flags in wire order, then keywords.
    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        SYSTEM
            .iter()
            .enumerate()
            .filter(|&(bit, _)| self.system & (1 << bit) != 0)
            .map(|(_, (flag, _))| flag.clone())
            .chain(self.keywords.iter().cloned().map(Flag::Keyword))
    }

    /// Number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.system.count_ones() as usize + self.keywords.len()
    }

    /// No flag set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.system == 0 && self.keywords.is_empty()
    }

    /// Parenthesized list for `STORE` and `APPEND`.
    #[must_use]
    pub fn to_list(&self) -> String {
        let mut out = String::from("(");
        for (i, flag) in self.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(flag.as_str());
        }
        out.push(')');
        out
    }

    fn keyword_position(&self, name: &str) -> Option<usize> {
        self.keywords.iter().position(|k| k.eq_ignore_ascii_case(name))
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        let mut flags = Self::new();
        iter.into_iter().for_each(|flag| flags.insert(flag));
        flags
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let flags = Flags::parse_list("($Forwarded \\flagged \\Seen)");
        assert!(flags.is_seen());
        assert!(flags.contains(&Flag::Flagged));
        assert!(flags.contains(&Flag::Keyword("$forwarded".into())));
        assert_eq!(flags.len(), 3);
        assert_eq!(flags.to_list(), "(\\Seen \\Flagged $Forwarded)");
    }

    #[test]
    fn test_empty_list() {
        assert!(Flags::parse_list("()").is_empty());
        assert_eq!(Flags::new().to_list(), "()");
        assert_eq!(Flags::parse_list("\\Deleted").len(), 1);
    }

    #[test]
    fn test_insert_and_remove() {
        let mut flags = Flags::new();
        flags.insert(Flag::Seen);
        flags.insert(Flag::Seen);
        flags.insert(Flag::Keyword("$Label1".into()));
        flags.insert(Flag::Keyword("$LABEL1".into()));
        assert_eq!(flags.len(), 2);
        assert_eq!(flags.to_list(), "(\\Seen $Label1)");

        flags.remove(&Flag::Seen);
        flags.remove(&Flag::Keyword("$label1".into()));
        assert!(flags.is_empty());
    }

    #[test]
    fn test_permanent_wildcard_is_a_keyword() {
        let flags = Flags::parse_list("(\\Deleted \\Seen \\*)");
        assert!(flags.is_deleted());
        assert_eq!(
            flags.iter().collect::<Vec<_>>(),
            vec![Flag::Seen, Flag::Deleted, Flag::Keyword("\\*".into())]
        );
    }
}
