//! IANA definitions for DNS.
//!
//! This module contains the handful of registry values the crate needs to
//! compose queries and to inspect responses. Each type is a thin wrapper
//! around the integer used on the wire so that unknown values survive a
//! round trip.

use core::fmt;

//------------ int_type ------------------------------------------------------

/// Defines a newtype over an integer with a set of well-known constants.
macro_rules! int_type {
    (
        $(#[$attr:meta])*
        $ident:ident, $int:ty, $unknown:literal;
        $( $(#[$cattr:meta])* ($name:ident, $value:literal, $mnemonic:literal) )*
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $ident($int);

        impl $ident {
            $(
                $(#[$cattr])*
                pub const $name: Self = Self($value);
            )*

            /// Creates a value from its integer representation.
            pub const fn from_int(value: $int) -> Self {
                Self(value)
            }

            /// Returns the integer representation.
            pub const fn to_int(self) -> $int {
                self.0
            }

            /// Returns the mnemonic for the value if there is one.
            pub fn to_mnemonic(self) -> Option<&'static str> {
                match self.0 {
                    $( $value => Some($mnemonic), )*
                    _ => None,
                }
            }
        }

        impl From<$int> for $ident {
            fn from(value: $int) -> Self {
                Self(value)
            }
        }

        impl From<$ident> for $int {
            fn from(value: $ident) -> Self {
                value.0
            }
        }

        impl fmt::Display for $ident {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                match self.to_mnemonic() {
                    Some(m) => f.write_str(m),
                    None => write!(f, "{}{}", $unknown, self.0),
                }
            }
        }
    }
}

//------------ Rtype ---------------------------------------------------------

int_type! {
    /// Resource record types.
    Rtype, u16, "TYPE";

    /// A host address.
    (A, 1, "A")
    /// An authoritative name server.
    (NS, 2, "NS")
    /// The canonical name for an alias.
    (CNAME, 5, "CNAME")
    /// The start of a zone of authority.
    (SOA, 6, "SOA")
    /// A domain name pointer.
    (PTR, 12, "PTR")
    /// Mail exchange.
    (MX, 15, "MX")
    /// Text strings.
    (TXT, 16, "TXT")
    /// An IPv6 host address.
    (AAAA, 28, "AAAA")
    /// Server selection.
    (SRV, 33, "SRV")
    /// The EDNS(0) pseudo-record.
    (OPT, 41, "OPT")
    /// A request for all records.
    (ANY, 255, "ANY")
}

//------------ Class ---------------------------------------------------------

int_type! {
    /// DNS classes.
    Class, u16, "CLASS";

    /// Internet.
    (IN, 1, "IN")
    /// Chaos.
    (CH, 3, "CH")
    /// Hesiod.
    (HS, 4, "HS")
    /// Any class.
    (ANY, 255, "ANY")
}

//------------ Opcode --------------------------------------------------------

int_type! {
    /// DNS opcodes.
    Opcode, u8, "OPCODE";

    /// A standard query.
    (QUERY, 0, "QUERY")
    /// A server status request.
    (STATUS, 2, "STATUS")
    /// A zone change notification.
    (NOTIFY, 4, "NOTIFY")
    /// A dynamic update.
    (UPDATE, 5, "UPDATE")
}

impl Default for Opcode {
    fn default() -> Self {
        Opcode::QUERY
    }
}

//------------ Rcode ---------------------------------------------------------

int_type! {
    /// DNS response codes, the four bit variant from the header.
    Rcode, u8, "RCODE";

    /// No error condition.
    (NOERROR, 0, "NOERROR")
    /// The server was unable to interpret the query.
    (FORMERR, 1, "FORMERR")
    /// The server was unable to process the query.
    (SERVFAIL, 2, "SERVFAIL")
    /// The domain name does not exist.
    (NXDOMAIN, 3, "NXDOMAIN")
    /// The server does not support the requested kind of query.
    (NOTIMP, 4, "NOTIMP")
    /// The server refuses to perform the operation.
    (REFUSED, 5, "REFUSED")
}

impl Default for Rcode {
    fn default() -> Self {
        Rcode::NOERROR
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::string::ToString;

    #[test]
    fn display() {
        assert_eq!(Rtype::AAAA.to_string(), "AAAA");
        assert_eq!(Rtype::from_int(65280).to_string(), "TYPE65280");
        assert_eq!(Class::IN.to_string(), "IN");
        assert_eq!(Rcode::from_int(11).to_string(), "RCODE11");
    }
}
