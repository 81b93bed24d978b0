//! The DNS wire format: message, question, and resource record types,
//! and their encoding/decoding to and from the octet stream described
//! in RFC 1035 section 4.

pub mod deserialise;
pub mod serialise;
pub mod types;
