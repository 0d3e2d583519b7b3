//! Reading data in DNS wire format.
//!
//! The [`Parser`] walks over the octets of a complete message so that
//! compressed domain names, which refer back into the message, can be
//! resolved. All reads are bounds checked and fail with a [`ParseError`]
//! instead of panicking.

use core::fmt;

//------------ Parser --------------------------------------------------------

/// A cursor over the octets of a DNS message.
#[derive(Clone, Copy, Debug)]
pub struct Parser<'a> {
    /// The complete message.
    octets: &'a [u8],

    /// The current position within `octets`.
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser at the start of the given octets.
    pub fn new(octets: &'a [u8]) -> Self {
        Parser { octets, pos: 0 }
    }

    /// Creates a new parser at the given position.
    pub fn at(octets: &'a [u8], pos: usize) -> Result<Self, ParseError> {
        if pos > octets.len() {
            return Err(ParseError::ShortInput);
        }
        Ok(Parser { octets, pos })
    }

    /// Returns the complete octets the parser works on.
    pub fn octets(&self) -> &'a [u8] {
        self.octets
    }

    /// Returns the current position.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Returns the number of octets left to parse.
    pub fn remaining(&self) -> usize {
        self.octets.len() - self.pos
    }

    /// Moves the position to `pos`.
    pub fn seek(&mut self, pos: usize) -> Result<(), ParseError> {
        if pos > self.octets.len() {
            return Err(ParseError::ShortInput);
        }
        self.pos = pos;
        Ok(())
    }

    /// Skips over `len` octets.
    pub fn advance(&mut self, len: usize) -> Result<(), ParseError> {
        self.parse_slice(len).map(|_| ())
    }

    /// Takes the next `len` octets.
    pub fn parse_slice(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        if self.remaining() < len {
            return Err(ParseError::ShortInput);
        }
        let res = &self.octets[self.pos..self.pos + len];
        self.pos += len;
        Ok(res)
    }

    /// Takes a single octet.
    pub fn parse_u8(&mut self) -> Result<u8, ParseError> {
        self.parse_slice(1).map(|s| s[0])
    }

    /// Takes a big endian 16 bit integer.
    pub fn parse_u16_be(&mut self) -> Result<u16, ParseError> {
        self.parse_slice(2).map(|s| u16::from_be_bytes([s[0], s[1]]))
    }

    /// Takes a big endian 32 bit integer.
    pub fn parse_u32_be(&mut self) -> Result<u32, ParseError> {
        self.parse_slice(4)
            .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
    }
}

//------------ ParseError ----------------------------------------------------

/// An error happened while parsing wire format data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// An attempt was made to go beyond the end of the data.
    ShortInput,

    /// A formatting error occurred.
    Form(FormError),
}

impl ParseError {
    /// Creates a new parse error as a form error with the given message.
    pub fn form_error(msg: &'static str) -> Self {
        FormError::new(msg).into()
    }
}

//--- From

impl From<FormError> for ParseError {
    fn from(err: FormError) -> Self {
        ParseError::Form(err)
    }
}

//--- Display and Error

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ParseError::ShortInput => f.write_str("unexpected end of input"),
            ParseError::Form(ref err) => err.fmt(f),
        }
    }
}

impl std::error::Error for ParseError {}

//------------ FormError -----------------------------------------------------

/// A formatting error occurred.
///
/// The static string describes what was wrong.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormError(&'static str);

impl FormError {
    /// Creates a new form error with the given diagnostics string.
    pub fn new(msg: &'static str) -> Self {
        FormError(msg)
    }
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for FormError {}

//============ Testing =======================================================
