//! Absolute domain names.
//!
//! [`Name`] keeps an uncompressed absolute domain name in wire format: a
//! sequence of labels, each preceded by its length, ending in the empty
//! root label. Names can be created from their presentation format via
//! `FromStr` or parsed out of a message, in which case compression
//! pointers are followed.

use super::wire::{ParseError, Parser};
use bytes::{BufMut, Bytes, BytesMut};
use core::{fmt, hash, str};

/// The maximum length of a label in octets.
const MAX_LABEL_LEN: usize = 63;

/// The maximum length of a name in wire format.
const MAX_NAME_LEN: usize = 255;

/// How many compression pointers we follow before calling it a loop.
const MAX_POINTERS: usize = 64;

//------------ Name ----------------------------------------------------------

/// An uncompressed, absolute domain name.
///
/// Comparison and hashing ignore ASCII case as required by RFC 4343.
#[derive(Clone)]
pub struct Name(Bytes);

/// # Creation
///
impl Name {
    /// Returns the root name.
    pub fn root() -> Self {
        Name(Bytes::from_static(b"\0"))
    }

    /// Creates a name from octets in wire format.
    ///
    /// The octets must contain exactly one uncompressed absolute name.
    pub fn from_octets(octets: Bytes) -> Result<Self, NameError> {
        Self::check_slice(&octets)?;
        Ok(Name(octets))
    }

    /// Checks that a slice is an uncompressed absolute name.
    fn check_slice(mut s: &[u8]) -> Result<(), NameError> {
        if s.len() > MAX_NAME_LEN {
            return Err(NameError::LongName);
        }
        loop {
            let (&len, tail) = s.split_first().ok_or(NameError::RelativeName)?;
            let len = usize::from(len);
            if len > MAX_LABEL_LEN {
                return Err(NameError::LongLabel);
            }
            if tail.len() < len {
                return Err(NameError::ShortInput);
            }
            if len == 0 {
                if !tail.is_empty() {
                    return Err(NameError::TrailingData);
                }
                return Ok(());
            }
            s = &tail[len..];
        }
    }

    /// Parses a possibly compressed name from a message.
    ///
    /// The parser is left right behind the name as it appears at its
    /// position, i.e., after the first compression pointer if there is
    /// one.
    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let mut res = BytesMut::with_capacity(32);
        let mut cur = *parser;
        let mut pointers = 0;
        let mut end = None;
        loop {
            let len = cur.parse_u8()?;
            match len & 0xC0 {
                0x00 => {
                    let len = usize::from(len);
                    res.put_u8(len as u8);
                    res.extend_from_slice(cur.parse_slice(len)?);
                    if res.len() > MAX_NAME_LEN {
                        return Err(ParseError::form_error("long domain name"));
                    }
                    if len == 0 {
                        break;
                    }
                }
                0xC0 => {
                    let low = cur.parse_u8()?;
                    if end.is_none() {
                        end = Some(cur.pos());
                    }
                    pointers += 1;
                    if pointers > MAX_POINTERS {
                        return Err(ParseError::form_error(
                            "compression pointer loop",
                        ));
                    }
                    let target = (usize::from(len & 0x3F) << 8) | usize::from(low);
                    if target + 2 >= cur.pos() {
                        return Err(ParseError::form_error(
                            "forward compression pointer",
                        ));
                    }
                    cur = Parser::at(cur.octets(), target)?;
                }
                _ => {
                    return Err(ParseError::form_error("invalid label type"))
                }
            }
        }
        parser.seek(end.unwrap_or(cur.pos()))?;
        Ok(Name(res.freeze()))
    }
}

/// # Properties
///
impl Name {
    /// Returns the wire format octets of the name.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Returns the length of the name in wire format.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Returns an iterator over the labels of the name.
    ///
    /// The final, empty root label is included.
    pub fn iter_labels(&self) -> LabelIter {
        LabelIter {
            slice: self.as_slice(),
        }
    }
}

//--- FromStr

impl str::FromStr for Name {
    type Err = NameError;

    /// Parses a name in presentation format.
    ///
    /// The name is always taken as absolute, the final dot is optional.
    /// Escape sequences of the form `\X` and `\DDD` are supported.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." {
            return Ok(Name::root());
        }
        if s.is_empty() {
            return Err(NameError::EmptyLabel);
        }
        let mut res = BytesMut::with_capacity(s.len() + 2);
        let mut label = Vec::with_capacity(MAX_LABEL_LEN);
        let mut chars = s.bytes();
        let mut trailing_dot = false;
        while let Some(ch) = chars.next() {
            trailing_dot = false;
            match ch {
                b'.' => {
                    push_label(&mut res, &label)?;
                    label.clear();
                    trailing_dot = true;
                }
                b'\\' => label.push(parse_escape(&mut chars)?),
                b' '..=b'~' => label.push(ch),
                _ => return Err(NameError::IllegalCharacter),
            }
        }
        if !trailing_dot {
            push_label(&mut res, &label)?;
        }
        res.put_u8(0);
        if res.len() > MAX_NAME_LEN {
            return Err(NameError::LongName);
        }
        Ok(Name(res.freeze()))
    }
}

/// Appends a non-empty label to a name under construction.
fn push_label(target: &mut BytesMut, label: &[u8]) -> Result<(), NameError> {
    if label.is_empty() {
        return Err(NameError::EmptyLabel);
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(NameError::LongLabel);
    }
    target.put_u8(label.len() as u8);
    target.extend_from_slice(label);
    Ok(())
}

/// Parses the escape sequence following a backslash.
fn parse_escape(
    chars: &mut impl Iterator<Item = u8>,
) -> Result<u8, NameError> {
    let first = chars.next().ok_or(NameError::BadEscape)?;
    if !first.is_ascii_digit() {
        return Ok(first);
    }
    let mut value = u32::from(first - b'0');
    for _ in 0..2 {
        let ch = chars.next().ok_or(NameError::BadEscape)?;
        if !ch.is_ascii_digit() {
            return Err(NameError::BadEscape);
        }
        value = value * 10 + u32::from(ch - b'0');
    }
    u8::try_from(value).map_err(|_| NameError::BadEscape)
}

//--- PartialEq, Eq, and Hash

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice().eq_ignore_ascii_case(other.as_slice())
    }
}

impl Eq for Name {}

impl hash::Hash for Name {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        for ch in self.as_slice() {
            ch.to_ascii_lowercase().hash(state)
        }
    }
}

//--- Display and Debug

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.iter_labels() {
            if label.is_empty() {
                break;
            }
            for &ch in label {
                match ch {
                    b'.' | b'\\' => write!(f, "\\{}", ch as char)?,
                    b'!'..=b'~' => write!(f, "{}", ch as char)?,
                    _ => write!(f, "\\{:03}", ch)?,
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

//------------ LabelIter -----------------------------------------------------

/// An iterator over the labels of a name.
pub struct LabelIter<'a> {
    slice: &'a [u8],
}

impl<'a> Iterator for LabelIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, tail) = self.slice.split_first()?;
        let len = usize::from(len);
        let label = &tail[..len];
        self.slice = if len == 0 { &[] } else { &tail[len..] };
        Some(label)
    }
}

//------------ NameError -----------------------------------------------------

/// A domain name could not be created.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NameError {
    /// A label other than the root label was empty.
    EmptyLabel,

    /// A label was longer than 63 octets.
    LongLabel,

    /// The name was longer than 255 octets.
    LongName,

    /// A character outside of printable ASCII appeared unescaped.
    IllegalCharacter,

    /// An escape sequence was malformed.
    BadEscape,

    /// The wire format name didn't end in the root label.
    RelativeName,

    /// The wire format ended in the middle of a label.
    ShortInput,

    /// There was data after the root label.
    TrailingData,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            NameError::EmptyLabel => "empty label",
            NameError::LongLabel => "label exceeds 63 octets",
            NameError::LongName => "name exceeds 255 octets",
            NameError::IllegalCharacter => "illegal character",
            NameError::BadEscape => "invalid escape sequence",
            NameError::RelativeName => "name is not absolute",
            NameError::ShortInput => "unexpected end of input",
            NameError::TrailingData => "trailing data after name",
        })
    }
}

impl std::error::Error for NameError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::string::ToString;

    #[test]
    fn from_str() {
        let name: Name = "www.example.com".parse().unwrap();
        assert_eq!(name.as_slice(), b"\x03www\x07example\x03com\x00");
        assert_eq!(name, "WWW.Example.COM.".parse().unwrap());
        assert_eq!(".".parse::<Name>().unwrap(), Name::root());
        assert_eq!(
            r"a\.b.c".parse::<Name>().unwrap().as_slice(),
            b"\x03a.b\x01c\x00"
        );
        assert_eq!(
            r"\065.c".parse::<Name>().unwrap().as_slice(),
            b"\x01A\x01c\x00"
        );
    }

    #[test]
    fn from_str_errors() {
        assert_eq!("a..b".parse::<Name>(), Err(NameError::EmptyLabel));
        assert_eq!("".parse::<Name>(), Err(NameError::EmptyLabel));
        assert_eq!(
            "a".repeat(64).parse::<Name>(),
            Err(NameError::LongLabel)
        );
        let long = ["a".repeat(63).as_str(); 5].join(".");
        assert_eq!(long.parse::<Name>(), Err(NameError::LongName));
        assert_eq!(r"a\25".parse::<Name>(), Err(NameError::BadEscape));
        assert_eq!(r"a\300".parse::<Name>(), Err(NameError::BadEscape));
    }

    #[test]
    fn display() {
        let name: Name = r"w\.w.example.com".parse().unwrap();
        assert_eq!(name.to_string(), r"w\.w.example.com.");
        assert_eq!(Name::root().to_string(), ".");
    }

    #[test]
    fn from_octets() {
        assert!(Name::from_octets(Bytes::from_static(b"\x01a\x00")).is_ok());
        assert_eq!(
            Name::from_octets(Bytes::from_static(b"\x01a")).err(),
            Some(NameError::RelativeName)
        );
        assert_eq!(
            Name::from_octets(Bytes::from_static(b"\x01a\x00\x00")).err(),
            Some(NameError::TrailingData)
        );
    }

    #[test]
    fn parse_compressed() {
        // "example.com" at 0, "www" + pointer to 0 at 13.
        let msg = b"\x07example\x03com\x00\x03www\xC0\x00\xFF";
        let mut parser = Parser::at(msg, 13).unwrap();
        let name = Name::parse(&mut parser).unwrap();
        assert_eq!(name.to_string(), "www.example.com.");
        assert_eq!(parser.pos(), 19);
        assert_eq!(parser.parse_u8(), Ok(0xFF));
    }

    #[test]
    fn parse_pointer_loop() {
        let msg = b"\xC0\x00";
        let mut parser = Parser::new(msg);
        assert!(Name::parse(&mut parser).is_err());
    }

    #[test]
    fn parse_short() {
        let mut parser = Parser::new(b"\x07exam");
        assert_eq!(Name::parse(&mut parser), Err(ParseError::ShortInput));
    }
}
