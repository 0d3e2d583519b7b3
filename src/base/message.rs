//! Accessing existing DNS messages.
//!
//! This module defines [`Message`], an immutable view over the octets of a
//! complete DNS message. Creating a message only checks that there is a
//! full header. Everything beyond the header is parsed lazily when asked
//! for, so that a malformed message can still be inspected for its ID and
//! flags.

use super::header::{Header, HeaderCounts};
use super::iana::Rtype;
use super::name::Name;
use super::question::Question;
use super::wire::{ParseError, Parser};
use bytes::Bytes;
use core::fmt;

//------------ Message -------------------------------------------------------

/// A DNS message.
///
/// The message keeps its octets as a [`Bytes`] value so that clones are
/// cheap and responses can be handed to several observers.
#[derive(Clone)]
pub struct Message {
    /// The wire format octets of the message.
    octets: Bytes,
}

/// # Creation and Conversion
///
impl Message {
    /// The length of the complete header section in octets.
    pub const HEADER_LEN: usize = Header::LEN + HeaderCounts::LEN;

    /// Creates a message from octets.
    ///
    /// Returns an error if the octets are too short to even contain the
    /// header section.
    pub fn from_octets(octets: Bytes) -> Result<Self, ShortMessage> {
        if octets.len() < Self::HEADER_LEN {
            return Err(ShortMessage);
        }
        Ok(Message { octets })
    }

    /// Returns a reference to the underlying octets.
    pub fn as_octets(&self) -> &Bytes {
        &self.octets
    }

    /// Converts the message into its underlying octets.
    pub fn into_octets(self) -> Bytes {
        self.octets
    }

    /// Returns the message as a slice.
    pub fn as_slice(&self) -> &[u8] {
        self.octets.as_ref()
    }
}

/// # Header Section
///
impl Message {
    /// Returns the message header.
    pub fn header(&self) -> Header {
        Header::from_message_slice(self.as_slice()).unwrap_or_default()
    }

    /// Returns the header counts of the message.
    pub fn header_counts(&self) -> HeaderCounts {
        HeaderCounts::from_message_slice(self.as_slice()).unwrap_or_default()
    }

    /// Returns the message ID.
    pub fn id(&self) -> u16 {
        self.header().id()
    }

    /// Returns whether the TC bit is set.
    pub fn is_truncated(&self) -> bool {
        self.header().tc()
    }
}

/// # Sections
///
impl Message {
    /// Returns the first question, if there is any.
    pub fn first_question(&self) -> Result<Option<Question>, ParseError> {
        if self.header_counts().qdcount() == 0 {
            return Ok(None);
        }
        let mut parser = self.body_parser();
        Question::parse(&mut parser).map(Some)
    }

    /// Returns whether this message is an answer to `query`.
    ///
    /// A message is an answer if it has the QR bit set, its ID equals that
    /// of the query, and its first question is equal to the query’s first
    /// question.
    pub fn is_answer(&self, query: &Message) -> bool {
        if !self.header().qr() || self.id() != query.id() {
            return false;
        }
        match (self.first_question(), query.first_question()) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }

    /// Returns the UDP payload size advertised in the OPT record, if any.
    pub fn opt_udp_payload_size(&self) -> Result<Option<u16>, ParseError> {
        let counts = self.header_counts();
        let mut parser = self.body_parser();
        for _ in 0..counts.qdcount() {
            Question::parse(&mut parser)?;
        }
        for _ in 0..(u32::from(counts.ancount()) + u32::from(counts.nscount()))
        {
            skip_record(&mut parser)?;
        }
        for _ in 0..counts.arcount() {
            let (rtype, class) = skip_record(&mut parser)?;
            if rtype == Rtype::OPT {
                return Ok(Some(class));
            }
        }
        Ok(None)
    }

    /// Returns a parser positioned right after the header section.
    fn body_parser(&self) -> Parser {
        let mut parser = Parser::new(self.as_slice());
        // The constructor guarantees the header is present.
        let _ = parser.seek(Self::HEADER_LEN);
        parser
    }
}

/// Skips over a resource record, returning its type and raw class field.
fn skip_record(parser: &mut Parser) -> Result<(Rtype, u16), ParseError> {
    Name::parse(parser)?;
    let rtype = Rtype::from_int(parser.parse_u16_be()?);
    let class = parser.parse_u16_be()?;
    let _ttl = parser.parse_u32_be()?;
    let rdlen = parser.parse_u16_be()?;
    parser.advance(usize::from(rdlen))?;
    Ok((rtype, class))
}

//--- AsRef

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

//--- Debug

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let header = self.header();
        f.debug_struct("Message")
            .field("id", &header.id())
            .field("qr", &header.qr())
            .field("tc", &header.tc())
            .field("rcode", &header.rcode())
            .field("len", &self.octets.len())
            .finish()
    }
}

//------------ ShortMessage --------------------------------------------------

/// An octets sequence was too short to be a valid DNS message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShortMessage;

impl fmt::Display for ShortMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("short message")
    }
}

impl std::error::Error for ShortMessage {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::Class;
    use crate::base::message_builder::MessageBuilder;

    fn query(id: u16) -> Message {
        let mut builder = MessageBuilder::new();
        builder.header_mut().set_id(id);
        builder
            .push_question(&Question::new_in(
                "example.com".parse().unwrap(),
                Rtype::A,
            ))
            .unwrap();
        builder.push_opt(1232).unwrap();
        builder.into_message()
    }

    #[test]
    fn short_message() {
        assert!(Message::from_octets(Bytes::from_static(b"\x00\x01")).is_err());
        assert!(Message::from_octets(Bytes::from(vec![0u8; 12])).is_ok());
    }

    #[test]
    fn accessors() {
        let msg = query(0x1234);
        assert_eq!(msg.id(), 0x1234);
        assert!(!msg.is_truncated());
        assert_eq!(msg.header_counts().qdcount(), 1);
        assert_eq!(msg.header_counts().arcount(), 1);
        let question = msg.first_question().unwrap().unwrap();
        assert_eq!(question.qtype(), Rtype::A);
        assert_eq!(question.qclass(), Class::IN);
        assert_eq!(msg.opt_udp_payload_size(), Ok(Some(1232)));
    }

    #[test]
    fn is_answer() {
        let request = query(7);
        let mut builder = MessageBuilder::new();
        let mut header = request.header();
        header.set_qr(true);
        *builder.header_mut() = header;
        builder
            .push_question(&request.first_question().unwrap().unwrap())
            .unwrap();
        let response = builder.into_message();
        assert!(response.is_answer(&request));
        assert!(!request.is_answer(&request));
        assert!(!response.is_answer(&query(8)));
    }

    #[test]
    fn truncated_body() {
        let msg = query(1);
        let cut = Message::from_octets(msg.as_octets().slice(..20)).unwrap();
        assert_eq!(cut.id(), 1);
        assert!(cut.first_question().is_err());
        assert!(cut.opt_udp_payload_size().is_err());
    }
}
