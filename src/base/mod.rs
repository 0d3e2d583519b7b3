//! Basics.
//!
//! This module provides the wire format types the query engine exchanges
//! with name servers. It is deliberately small: a [`Message`] is a cheap,
//! immutable view over the octets of a complete DNS message that gives
//! access to the header and, lazily, to the first question. A
//! [`MessageBuilder`] assembles new messages section by section.
//!
//! In order to easily distinguish the process of creating and dissecting
//! wire format messages from other forms of conversion, we use the term
//! *parsing* for extracting data from wire format and *composing* for
//! producing it. Parsing always happens on a buffer holding a complete
//! message since compressed domain names refer back into the message.
//!
//! The submodules are:
//!
//! * [header] for the header of DNS messages,
//! * [iana] for the registry values used in messages,
//! * [message] for reading messages,
//! * [message_builder] for creating messages,
//! * [name] for domain names,
//! * [question] for the question section, and
//! * [wire] for the low-level parser.

pub use self::header::{Header, HeaderCounts};
pub use self::iana::{Class, Opcode, Rcode, Rtype};
pub use self::message::{Message, ShortMessage};
pub use self::message_builder::{MessageBuilder, PushError};
pub use self::name::{Name, NameError};
pub use self::question::Question;
pub use self::wire::ParseError;

pub mod header;
pub mod iana;
pub mod message;
pub mod message_builder;
pub mod name;
pub mod question;
pub mod wire;
