//! The header of a DNS message.
//!
//! Each DNS message starts with a twelve octet long header section. The
//! first four octets carry the message ID, the opcode, the response code,
//! and a set of flags. The remaining eight octets contain the number of
//! entries in each of the four sections that follow the header. The format
//! is defined in section 4.1.1 of [RFC 1035].
//!
//! Because changing the section counts may invalidate the rest of a
//! message, the two parts are kept as separate types: [`Header`] for the
//! part that can be modified freely and [`HeaderCounts`] for the counts.
//!
//! [RFC 1035]: https://tools.ietf.org/html/rfc1035

use super::iana::{Opcode, Rcode};

//------------ Header --------------------------------------------------------

/// The first part of the header of a DNS message.
///
/// The four octets are kept in wire format, i.e., the ID is in network
/// byte order. The layout is:
///
/// ```text
///                                 1  1  1  1  1  1
///   0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                      ID                       |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |QR|   Opcode  |AA|TC|RD|RA|Z |AD|CD|   RCODE   |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Header {
    /// The header in wire format.
    inner: [u8; 4],
}

/// # Creation and Conversion
///
impl Header {
    /// The length of the header in octets.
    pub const LEN: usize = 4;

    /// Creates a new header with all fields zero or unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header from the first four octets of a message.
    ///
    /// Returns `None` if the slice is too short.
    pub fn from_message_slice(s: &[u8]) -> Option<Self> {
        let inner = s.get(..Self::LEN)?;
        let mut res = Self::default();
        res.inner.copy_from_slice(inner);
        Some(res)
    }

    /// Returns the wire format representation of the header.
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }
}

/// # Field Access
///
impl Header {
    /// Returns the value of the ID field.
    ///
    /// The ID is used to match responses with the query they answer. The
    /// query engine drops a response whose ID differs from its query.
    pub fn id(self) -> u16 {
        u16::from_be_bytes([self.inner[0], self.inner[1]])
    }

    /// Sets the value of the ID field.
    pub fn set_id(&mut self, value: u16) {
        self.inner[..2].copy_from_slice(&value.to_be_bytes())
    }

    /// Returns whether the QR bit is set, i.e., the message is a response.
    pub fn qr(self) -> bool {
        self.get_bit(2, 7)
    }

    /// Sets the QR bit.
    pub fn set_qr(&mut self, set: bool) {
        self.set_bit(2, 7, set)
    }

    /// Returns the opcode.
    pub fn opcode(self) -> Opcode {
        Opcode::from_int((self.inner[2] >> 3) & 0x0F)
    }

    /// Sets the opcode.
    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.inner[2] = (self.inner[2] & 0x87) | ((opcode.to_int() & 0x0F) << 3);
    }

    /// Returns whether the AA bit is set.
    pub fn aa(self) -> bool {
        self.get_bit(2, 2)
    }

    /// Sets the AA bit.
    pub fn set_aa(&mut self, set: bool) {
        self.set_bit(2, 2, set)
    }

    /// Returns whether the TC bit is set.
    ///
    /// A server sets the bit when a response didn't fit into the datagram
    /// it was sent in. The client should then repeat the query over a
    /// stream transport.
    pub fn tc(self) -> bool {
        self.get_bit(2, 1)
    }

    /// Sets the TC bit.
    pub fn set_tc(&mut self, set: bool) {
        self.set_bit(2, 1, set)
    }

    /// Returns whether the RD bit is set.
    pub fn rd(self) -> bool {
        self.get_bit(2, 0)
    }

    /// Sets the RD bit.
    pub fn set_rd(&mut self, set: bool) {
        self.set_bit(2, 0, set)
    }

    /// Returns whether the RA bit is set.
    pub fn ra(self) -> bool {
        self.get_bit(3, 7)
    }

    /// Sets the RA bit.
    pub fn set_ra(&mut self, set: bool) {
        self.set_bit(3, 7, set)
    }

    /// Returns whether the AD bit is set.
    pub fn ad(self) -> bool {
        self.get_bit(3, 5)
    }

    /// Sets the AD bit.
    pub fn set_ad(&mut self, set: bool) {
        self.set_bit(3, 5, set)
    }

    /// Returns whether the CD bit is set.
    pub fn cd(self) -> bool {
        self.get_bit(3, 4)
    }

    /// Sets the CD bit.
    pub fn set_cd(&mut self, set: bool) {
        self.set_bit(3, 4, set)
    }

    /// Returns the response code.
    ///
    /// This is only the lower four bits. Extended response codes live in
    /// the OPT record.
    pub fn rcode(self) -> Rcode {
        Rcode::from_int(self.inner[3] & 0x0F)
    }

    /// Sets the response code.
    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.inner[3] = (self.inner[3] & 0xF0) | (rcode.to_int() & 0x0F);
    }

    fn get_bit(self, offset: usize, bit: usize) -> bool {
        self.inner[offset] & (1 << bit) != 0
    }

    fn set_bit(&mut self, offset: usize, bit: usize, set: bool) {
        if set {
            self.inner[offset] |= 1 << bit
        } else {
            self.inner[offset] &= !(1 << bit)
        }
    }
}

//------------ HeaderCounts --------------------------------------------------

/// The section count part of the header of a DNS message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HeaderCounts {
    /// The counts in wire format.
    inner: [u8; 8],
}

impl HeaderCounts {
    /// The length of the counts in octets.
    pub const LEN: usize = 8;

    /// Creates new counts, all zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates counts from the octets of a complete message.
    ///
    /// Returns `None` if the slice is shorter than a full header.
    pub fn from_message_slice(s: &[u8]) -> Option<Self> {
        let inner = s.get(Header::LEN..Header::LEN + Self::LEN)?;
        let mut res = Self::default();
        res.inner.copy_from_slice(inner);
        Some(res)
    }

    /// Returns the wire format representation of the counts.
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Returns the number of questions.
    pub fn qdcount(self) -> u16 {
        self.get(0)
    }

    /// Sets the number of questions.
    pub fn set_qdcount(&mut self, value: u16) {
        self.set(0, value)
    }

    /// Returns the number of answer records.
    pub fn ancount(self) -> u16 {
        self.get(2)
    }

    /// Sets the number of answer records.
    pub fn set_ancount(&mut self, value: u16) {
        self.set(2, value)
    }

    /// Returns the number of authority records.
    pub fn nscount(self) -> u16 {
        self.get(4)
    }

    /// Sets the number of authority records.
    pub fn set_nscount(&mut self, value: u16) {
        self.set(4, value)
    }

    /// Returns the number of additional records.
    pub fn arcount(self) -> u16 {
        self.get(6)
    }

    /// Sets the number of additional records.
    pub fn set_arcount(&mut self, value: u16) {
        self.set(6, value)
    }

    fn get(self, offset: usize) -> u16 {
        u16::from_be_bytes([self.inner[offset], self.inner[offset + 1]])
    }

    fn set(&mut self, offset: usize, value: u16) {
        self.inner[offset..offset + 2].copy_from_slice(&value.to_be_bytes())
    }
}

//============ Testing =======================================================
