//! Serialisation of DNS messages to the wire format.  See the `types`
//! module for the format itself, and §4.1.4 of RFC 1035 for name
//! compression.

use bytes::BytesMut;
use std::collections::HashMap;

use crate::protocol::types::*;

impl Message {
    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more states
    /// than the wire format strictly allows, e.g. more than 65535 answers).
    pub fn into_octets(&self) -> Result<Vec<u8>, Error> {
        let mut buffer = WritableBuffer::default();
        self.serialise(&mut buffer)?;
        Ok(buffer.octets.to_vec())
    }

    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        let qdcount = usize_to_u16(self.questions.len())?;
        let ancount = usize_to_u16(self.answers.len())?;
        let nscount = usize_to_u16(self.authority.len())?;
        let arcount = usize_to_u16(self.additional.len())?;

        self.header.serialise(buffer);
        buffer.write_u16(qdcount);
        buffer.write_u16(ancount);
        buffer.write_u16(nscount);
        buffer.write_u16(arcount);

        for question in &self.questions {
            question.serialise(buffer);
        }
        for rr in &self.answers {
            rr.serialise(buffer)?;
        }
        for rr in &self.authority {
            rr.serialise(buffer)?;
        }
        for rr in &self.additional {
            rr.serialise(buffer)?;
        }

        Ok(())
    }
}

impl Header {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        let flag_qr = if self.is_response { HEADER_MASK_QR } else { 0 };
        let field_opcode = HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let flag_aa = if self.is_authoritative {
            HEADER_MASK_AA
        } else {
            0
        };
        let flag_tc = if self.is_truncated { HEADER_MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired {
            HEADER_MASK_RD
        } else {
            0
        };
        let flag_ra = if self.recursion_available {
            HEADER_MASK_RA
        } else {
            0
        };
        let field_rcode = HEADER_MASK_RCODE & u8::from(self.rcode);

        buffer.write_u16(self.id);
        buffer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        buffer.write_u8(flag_ra | field_rcode);
    }
}

impl Question {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        self.name.serialise(buffer, true);
        self.qtype.serialise(buffer);
        self.qclass.serialise(buffer);
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the RDATA is too long to fit in a u16 `rdlength`.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        self.name.serialise(buffer, true);
        self.rtype_with_data.rtype().serialise(buffer);
        self.rclass.serialise(buffer);
        buffer.write_u32(self.ttl);

        let rdlength_index = buffer.index();
        buffer.write_u16(0);

        match &self.rtype_with_data {
            RecordTypeWithData::A { address } => buffer.write_octets(&address.octets()),
            RecordTypeWithData::AAAA { address } => buffer.write_octets(&address.octets()),
            RecordTypeWithData::NS { nsdname } => nsdname.serialise(buffer, false),
            RecordTypeWithData::CNAME { cname } => cname.serialise(buffer, false),
            RecordTypeWithData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(buffer, false);
                rname.serialise(buffer, false);
                buffer.write_u32(*serial);
                buffer.write_u32(*refresh);
                buffer.write_u32(*retry);
                buffer.write_u32(*expire);
                buffer.write_u32(*minimum);
            }
            RecordTypeWithData::TXT { octets } => buffer.write_octets(octets),
            RecordTypeWithData::Unknown { octets, .. } => buffer.write_octets(octets),
        };

        let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)?;
        let [hi, lo] = rdlength.to_be_bytes();
        buffer.octets[rdlength_index] = hi;
        buffer.octets[rdlength_index + 1] = lo;

        Ok(())
    }
}

impl DomainName {
    /// Serialise this name into `buffer`, using (and updating) its
    /// compression table when `compress` is set.
    ///
    /// Per RFC 1035 section 4.1.4: a name is written as a run of raw
    /// labels followed by either a terminating zero octet, or a
    /// pointer to an identical suffix written earlier in this
    /// message.  The suffix search tries the longest possible match
    /// first (i.e. the whole name, then every smaller tail) so the
    /// shortest possible encoding is chosen.
    pub fn serialise(&self, buffer: &mut WritableBuffer, compress: bool) {
        let start_offset = buffer.index();

        if compress {
            for start in 0..self.labels.len() {
                let suffix = &self.labels[start..];
                if let Some(&pointer) = buffer.name_pointers.get(suffix) {
                    for label in &self.labels[..start] {
                        buffer.write_label(label);
                    }
                    buffer.write_pointer(pointer);
                    buffer.memoise_suffixes(&self.labels, start_offset);
                    return;
                }
            }
        }

        for label in &self.labels {
            buffer.write_label(label);
        }
        buffer.write_u8(0);

        if compress {
            buffer.memoise_suffixes(&self.labels, start_offset);
        }
    }
}

impl QueryType {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

impl QueryClass {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

impl RecordType {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

impl RecordClass {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

/// Errors encountered when serialising a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A counter does not fit in the desired width.
    CounterTooLarge { counter: usize, bits: u32 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CounterTooLarge { counter, bits } => {
                write!(f, "'{counter}' cannot be converted to a u{bits}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which can be written to, for serialisation purposes.
///
/// Owns the name-compression table for the one message being
/// written: a mapping from a (lowercased) label-suffix to the byte
/// offset it was first written at.  Scope is exactly one `serialise`
/// call; never persisted.
pub struct WritableBuffer {
    pub octets: BytesMut,
    name_pointers: HashMap<Vec<Label>, u16>,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
            name_pointers: HashMap::new(),
        }
    }
}

impl WritableBuffer {
    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.extend_from_slice(&[octet]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.extend_from_slice(octets);
    }

    fn write_label(&mut self, label: &Label) {
        #[allow(clippy::cast_possible_truncation)]
        self.write_u8(label.len() as u8);
        self.write_octets(label.octets());
    }

    fn write_pointer(&mut self, offset: u16) {
        let hi = 0b1100_0000 | ((offset >> 8) as u8);
        let lo = (offset & 0xFF) as u8;
        self.octets.extend_from_slice(&[hi, lo]);
    }

    /// Record every suffix of `labels`, whose full (uncompressed) form
    /// started at `start_offset`, for future compression — provided
    /// the suffix's offset fits in the 14-bit pointer field.
    fn memoise_suffixes(&mut self, labels: &[Label], start_offset: usize) {
        let mut offset = start_offset;
        for start in 0..labels.len() {
            if offset > 0x3FFF {
                break;
            }
            #[allow(clippy::cast_possible_truncation)]
            self.name_pointers
                .entry(labels[start..].to_vec())
                .or_insert(offset as u16);
            offset += labels[start].len() + 1;
        }
    }
}

/// Helper function to convert a `usize` into a `u16` (or return an error).
///
/// # Errors
///
/// If the value cannot be converted.
fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    if let Ok(t) = u16::try_from(counter) {
        Ok(t)
    } else {
        Err(Error::CounterTooLarge {
            counter,
            bits: u16::BITS,
        })
    }
}
