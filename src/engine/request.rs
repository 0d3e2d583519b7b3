//! Composing the request messages sent by the engine.
//!
//! The engine itself doesn’t care what a request looks like. It only needs
//! the octets to send and the message ID to match responses against. The
//! [`ComposeRequest`] trait provides both by producing a complete
//! [`Message`]. It is implemented for messages themselves and for
//! [`RequestMessage`], which builds a standard query from a question.

use super::error::Error;
use crate::base::{Message, MessageBuilder, Question};

//------------ ComposeRequest ------------------------------------------------

/// A type that can produce a DNS request message.
pub trait ComposeRequest {
    /// Produces the request message.
    ///
    /// The message ID of the returned message is the one responses are
    /// matched against.
    fn to_message(&self) -> Result<Message, Error>;
}

impl ComposeRequest for Message {
    fn to_message(&self) -> Result<Message, Error> {
        Ok(self.clone())
    }
}

impl<T: ComposeRequest + ?Sized> ComposeRequest for &T {
    fn to_message(&self) -> Result<Message, Error> {
        (**self).to_message()
    }
}

//------------ RequestMessage ------------------------------------------------

/// A standard query for a single question.
#[derive(Clone, Debug)]
pub struct RequestMessage {
    /// The question to ask.
    question: Question,

    /// The message ID.
    id: u16,

    /// Whether to set the RD bit.
    recursion_desired: bool,

    /// Whether to set the CD bit.
    checking_disabled: bool,

    /// The UDP payload size for an OPT record or `None` for no EDNS.
    udp_payload_size: Option<u16>,
}

impl RequestMessage {
    /// Creates a new request with a random ID and the RD bit set.
    pub fn new(question: impl Into<Question>) -> Self {
        RequestMessage {
            question: question.into(),
            id: rand::random(),
            recursion_desired: true,
            checking_disabled: false,
            udp_payload_size: None,
        }
    }

    /// Returns the question.
    pub fn question(&self) -> &Question {
        &self.question
    }

    /// Returns the message ID.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Sets the message ID.
    pub fn set_id(&mut self, id: u16) {
        self.id = id
    }

    /// Sets a new random message ID.
    pub fn set_random_id(&mut self) {
        self.id = rand::random()
    }

    /// Sets whether recursion is desired.
    pub fn set_recursion_desired(&mut self, value: bool) {
        self.recursion_desired = value
    }

    /// Sets whether DNSSEC checking is disabled.
    pub fn set_checking_disabled(&mut self, value: bool) {
        self.checking_disabled = value
    }

    /// Enables EDNS(0) advertising the given UDP payload size.
    ///
    /// Passing `None` removes the OPT record again.
    pub fn set_udp_payload_size(&mut self, value: Option<u16>) {
        self.udp_payload_size = value
    }
}

impl ComposeRequest for RequestMessage {
    fn to_message(&self) -> Result<Message, Error> {
        let mut builder = MessageBuilder::new();
        let header = builder.header_mut();
        header.set_id(self.id);
        header.set_rd(self.recursion_desired);
        header.set_cd(self.checking_disabled);
        builder
            .push_question(&self.question)
            .map_err(|_| Error::MessageBuilderPushError)?;
        if let Some(size) = self.udp_payload_size {
            builder
                .push_opt(size)
                .map_err(|_| Error::MessageBuilderPushError)?;
        }
        Ok(builder.into_message())
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{Name, Rtype};

    #[test]
    fn compose() {
        let mut request = RequestMessage::new((
            "example.org".parse::<Name>().unwrap(),
            Rtype::AAAA,
        ));
        request.set_id(4711);
        request.set_udp_payload_size(Some(1400));
        let msg = request.to_message().unwrap();
        assert_eq!(msg.id(), 4711);
        assert!(msg.header().rd());
        assert!(!msg.header().qr());
        assert_eq!(
            msg.first_question().unwrap().as_ref(),
            Some(request.question())
        );
        assert_eq!(msg.opt_udp_payload_size(), Ok(Some(1400)));

        request.set_udp_payload_size(None);
        request.set_recursion_desired(false);
        let msg = request.to_message().unwrap();
        assert!(!msg.header().rd());
        assert_eq!(msg.opt_udp_payload_size(), Ok(None));
    }
}
