//! A single question in a DNS message.

use super::iana::{Class, Rtype};
use super::name::Name;
use super::wire::{ParseError, Parser};
use bytes::{BufMut, BytesMut};
use core::fmt;

//------------ Question ------------------------------------------------------

/// A question in a DNS message.
///
/// A question asks for all records of type `qtype` and class `qclass`
/// owned by `qname`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Question {
    /// The domain name of the question.
    qname: Name,

    /// The record type of the question.
    qtype: Rtype,

    /// The class of the question.
    qclass: Class,
}

impl Question {
    /// Creates a new question from its three components.
    pub fn new(qname: Name, qtype: Rtype, qclass: Class) -> Self {
        Question {
            qname,
            qtype,
            qclass,
        }
    }

    /// Creates a new question with class IN.
    pub fn new_in(qname: Name, qtype: Rtype) -> Self {
        Self::new(qname, qtype, Class::IN)
    }

    /// Returns a reference to the domain name in the question.
    pub fn qname(&self) -> &Name {
        &self.qname
    }

    /// Returns the record type of the question.
    pub fn qtype(&self) -> Rtype {
        self.qtype
    }

    /// Returns the class of the question.
    pub fn qclass(&self) -> Class {
        self.qclass
    }

    /// Parses a question from a message.
    pub fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        Ok(Question::new(
            Name::parse(parser)?,
            parser.parse_u16_be()?.into(),
            parser.parse_u16_be()?.into(),
        ))
    }

    /// Returns the length of the question in (uncompressed) wire format.
    pub fn compose_len(&self) -> usize {
        self.qname.len() + 4
    }

    /// Appends the wire format of the question to `target`.
    pub fn compose(&self, target: &mut BytesMut) {
        target.extend_from_slice(self.qname.as_slice());
        target.put_u16(self.qtype.to_int());
        target.put_u16(self.qclass.to_int());
    }
}

//--- From

impl From<(Name, Rtype)> for Question {
    fn from((qname, qtype): (Name, Rtype)) -> Self {
        Question::new_in(qname, qtype)
    }
}

//--- Display

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}

//============ Testing =======================================================
