//! Building a new DNS message.
//!
//! A [`MessageBuilder`] assembles a message section by section. The
//! sections have to be filled in order: first the questions, then the
//! answer, authority, and additional records. Pushing into an earlier
//! section after a later one has been started fails. The builder keeps the
//! section counts in the header up to date and refuses to grow the message
//! beyond what fits into the 16 bit length prefix of a stream transport.

use super::header::{Header, HeaderCounts};
use super::iana::{Class, Rtype};
use super::message::Message;
use super::name::Name;
use super::question::Question;
use bytes::{BufMut, BytesMut};
use core::fmt;

//------------ MessageBuilder ------------------------------------------------

/// Builds a DNS message.
#[derive(Clone, Debug)]
pub struct MessageBuilder {
    /// The first part of the header.
    header: Header,

    /// The section counts.
    counts: HeaderCounts,

    /// Everything after the header section.
    body: BytesMut,

    /// The section we are currently in.
    section: Section,
}

/// The sections of a message in the order they appear.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

/// The maximum length of a message.
const MAX_LEN: usize = 0xFFFF;

impl MessageBuilder {
    /// Creates a new, empty message builder.
    pub fn new() -> Self {
        MessageBuilder {
            header: Header::new(),
            counts: HeaderCounts::new(),
            body: BytesMut::with_capacity(512 - Message::HEADER_LEN),
            section: Section::Question,
        }
    }

    /// Returns the header of the message under construction.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Returns a mutable reference to the header.
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Returns the section counts so far.
    pub fn counts(&self) -> HeaderCounts {
        self.counts
    }

    /// Appends a question.
    pub fn push_question(&mut self, question: &Question) -> Result<(), PushError> {
        self.enter(Section::Question, question.compose_len())?;
        let count = bump(self.counts.qdcount())?;
        question.compose(&mut self.body);
        self.counts.set_qdcount(count);
        Ok(())
    }

    /// Appends a record to the answer section.
    pub fn push_answer(
        &mut self,
        owner: &Name,
        rtype: Rtype,
        class: Class,
        ttl: u32,
        rdata: &[u8],
    ) -> Result<(), PushError> {
        self.push_record(Section::Answer, owner, rtype, class.to_int(), ttl, rdata)
    }

    /// Appends a record to the authority section.
    pub fn push_authority(
        &mut self,
        owner: &Name,
        rtype: Rtype,
        class: Class,
        ttl: u32,
        rdata: &[u8],
    ) -> Result<(), PushError> {
        self.push_record(
            Section::Authority,
            owner,
            rtype,
            class.to_int(),
            ttl,
            rdata,
        )
    }

    /// Appends a record to the additional section.
    pub fn push_additional(
        &mut self,
        owner: &Name,
        rtype: Rtype,
        class: Class,
        ttl: u32,
        rdata: &[u8],
    ) -> Result<(), PushError> {
        self.push_record(
            Section::Additional,
            owner,
            rtype,
            class.to_int(),
            ttl,
            rdata,
        )
    }

    /// Appends an EDNS(0) OPT record to the additional section.
    ///
    /// The record advertises `udp_payload_size` as the largest response
    /// we are willing to receive over UDP. Extended rcode, version, and
    /// flags are all zero and there are no options.
    pub fn push_opt(&mut self, udp_payload_size: u16) -> Result<(), PushError> {
        self.push_record(
            Section::Additional,
            &Name::root(),
            Rtype::OPT,
            udp_payload_size,
            0,
            b"",
        )
    }

    /// Converts the builder into the finished message.
    pub fn into_message(self) -> Message {
        let mut octets =
            BytesMut::with_capacity(Message::HEADER_LEN + self.body.len());
        octets.extend_from_slice(self.header.as_slice());
        octets.extend_from_slice(self.counts.as_slice());
        octets.extend_from_slice(&self.body);
        // There is always a full header, so this can't fail.
        match Message::from_octets(octets.freeze()) {
            Ok(msg) => msg,
            Err(_) => unreachable!(),
        }
    }

    fn push_record(
        &mut self,
        section: Section,
        owner: &Name,
        rtype: Rtype,
        class: u16,
        ttl: u32,
        rdata: &[u8],
    ) -> Result<(), PushError> {
        let rdlen = u16::try_from(rdata.len()).map_err(|_| PushError::ShortBuf)?;
        self.enter(section, owner.len() + 10 + rdata.len())?;
        let count = match section {
            Section::Answer => self.counts.ancount(),
            Section::Authority => self.counts.nscount(),
            _ => self.counts.arcount(),
        };
        let count = bump(count)?;
        self.body.extend_from_slice(owner.as_slice());
        self.body.put_u16(rtype.to_int());
        self.body.put_u16(class);
        self.body.put_u32(ttl);
        self.body.put_u16(rdlen);
        self.body.extend_from_slice(rdata);
        match section {
            Section::Answer => self.counts.set_ancount(count),
            Section::Authority => self.counts.set_nscount(count),
            _ => self.counts.set_arcount(count),
        }
        Ok(())
    }

    /// Moves to `section` and checks that `len` more octets fit.
    fn enter(&mut self, section: Section, len: usize) -> Result<(), PushError> {
        if section < self.section {
            return Err(PushError::SectionOrder);
        }
        if Message::HEADER_LEN + self.body.len() + len > MAX_LEN {
            return Err(PushError::ShortBuf);
        }
        self.section = section;
        Ok(())
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Increases a section count.
fn bump(count: u16) -> Result<u16, PushError> {
    count.checked_add(1).ok_or(PushError::CountOverflow)
}

//------------ PushError -----------------------------------------------------

/// An error happened while adding data to a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PushError {
    /// A section was pushed to after a later section was started.
    SectionOrder,

    /// The message would exceed its maximum size.
    ShortBuf,

    /// A section count would overflow.
    CountOverflow,
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PushError::SectionOrder => f.write_str("sections out of order"),
            PushError::ShortBuf => f.write_str("message too long"),
            PushError::CountOverflow => f.write_str("counter overflow"),
        }
    }
}

impl std::error::Error for PushError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn build_response() {
        let name: Name = "example.com".parse().unwrap();
        let mut builder = MessageBuilder::new();
        builder.header_mut().set_id(0x4242);
        builder.header_mut().set_qr(true);
        builder
            .push_question(&Question::new_in(name.clone(), Rtype::A))
            .unwrap();
        builder
            .push_answer(&name, Rtype::A, Class::IN, 3600, &[192, 0, 2, 1])
            .unwrap();
        builder.push_opt(4096).unwrap();
        let msg = builder.into_message();

        let counts = msg.header_counts();
        assert_eq!(counts.qdcount(), 1);
        assert_eq!(counts.ancount(), 1);
        assert_eq!(counts.nscount(), 0);
        assert_eq!(counts.arcount(), 1);
        assert_eq!(msg.id(), 0x4242);
        assert_eq!(msg.opt_udp_payload_size(), Ok(Some(4096)));
        assert_eq!(msg.as_slice().len(), 12 + 17 + 27 + 11);
    }

    #[test]
    fn section_order() {
        let name: Name = "example.com".parse().unwrap();
        let mut builder = MessageBuilder::new();
        builder.push_opt(1232).unwrap();
        assert_eq!(
            builder.push_question(&Question::new_in(name.clone(), Rtype::A)),
            Err(PushError::SectionOrder)
        );
        assert_eq!(
            builder.push_answer(&name, Rtype::A, Class::IN, 0, b""),
            Err(PushError::SectionOrder)
        );
    }

    #[test]
    fn too_long() {
        let name: Name = "example.com".parse().unwrap();
        let rdata = vec![0u8; 0xFFFF];
        let mut builder = MessageBuilder::new();
        assert_eq!(
            builder.push_answer(&name, Rtype::TXT, Class::IN, 0, &rdata),
            Err(PushError::ShortBuf)
        );
        let rdata = vec![0u8; 30000];
        builder.push_answer(&name, Rtype::TXT, Class::IN, 0, &rdata).unwrap();
        builder.push_answer(&name, Rtype::TXT, Class::IN, 0, &rdata).unwrap();
        assert_eq!(
            builder.push_answer(&name, Rtype::TXT, Class::IN, 0, &rdata),
            Err(PushError::ShortBuf)
        );
    }
}
