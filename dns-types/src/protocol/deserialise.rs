//! Deserialisation of DNS messages from the wire format.

use bytes::Bytes;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;

impl Message {
    /// # Errors
    ///
    /// If the message is truncated, has an invalid length field, or
    /// contains an invalid domain-name pointer.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        let mut buffer = ConsumableBuffer::new(octets);
        Message::deserialise(&mut buffer)
    }

    fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let wire_header = WireHeader::deserialise(buffer)?;
        let header = wire_header.header;

        if wire_header.qdcount == 0 {
            return Err(Error::QuestionTooShort { id: header.id });
        }

        let mut questions = Vec::with_capacity(wire_header.qdcount as usize);
        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(buffer, header.id)?);
        }

        let mut answers = Vec::with_capacity(wire_header.ancount as usize);
        for _ in 0..wire_header.ancount {
            answers.push(ResourceRecord::deserialise(buffer, header.id)?);
        }

        let mut authority = Vec::with_capacity(wire_header.nscount as usize);
        for _ in 0..wire_header.nscount {
            authority.push(ResourceRecord::deserialise(buffer, header.id)?);
        }

        let mut additional = Vec::with_capacity(wire_header.arcount as usize);
        for _ in 0..wire_header.arcount {
            additional.push(ResourceRecord::deserialise(buffer, header.id)?);
        }

        Ok(Message {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

struct WireHeader {
    header: Header,
    qdcount: u16,
    ancount: u16,
    nscount: u16,
    arcount: u16,
}

impl WireHeader {
    fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::HeaderTooShort)?;
        let flags1 = buffer.next_u8().ok_or(Error::HeaderTooShort)?;
        let flags2 = buffer.next_u8().ok_or(Error::HeaderTooShort)?;
        let qdcount = buffer.next_u16().ok_or(Error::HeaderTooShort)?;
        let ancount = buffer.next_u16().ok_or(Error::HeaderTooShort)?;
        let nscount = buffer.next_u16().ok_or(Error::HeaderTooShort)?;
        let arcount = buffer.next_u16().ok_or(Error::HeaderTooShort)?;

        // the `z` field is masked off on read, per spec: real-world
        // servers sometimes set it to a non-zero value.
        let _ = HEADER_MASK_Z;

        let header = Header {
            id,
            is_response: flags1 & HEADER_MASK_QR != 0,
            opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
            is_authoritative: flags1 & HEADER_MASK_AA != 0,
            is_truncated: flags1 & HEADER_MASK_TC != 0,
            recursion_desired: flags1 & HEADER_MASK_RD != 0,
            recursion_available: flags2 & HEADER_MASK_RA != 0,
            rcode: Rcode::from(flags2 & HEADER_MASK_RCODE),
        };

        Ok(WireHeader {
            header,
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    fn deserialise(buffer: &mut ConsumableBuffer, id: u16) -> Result<Self, Error> {
        let name = DomainName::deserialise(buffer, id)?;
        let qtype = QueryType::from(buffer.next_u16().ok_or(Error::QuestionTooShort { id })?);
        let qclass = QueryClass::from(buffer.next_u16().ok_or(Error::QuestionTooShort { id })?);

        Ok(Question { name, qtype, qclass })
    }
}

impl ResourceRecord {
    fn deserialise(buffer: &mut ConsumableBuffer, id: u16) -> Result<Self, Error> {
        let name = DomainName::deserialise(buffer, id)?;
        let rtype = RecordType::from(
            buffer
                .next_u16()
                .ok_or(Error::ResourceRecordTooShort { id })?,
        );
        let rclass = RecordClass::from(
            buffer
                .next_u16()
                .ok_or(Error::ResourceRecordTooShort { id })?,
        );
        let ttl = buffer
            .next_u32()
            .ok_or(Error::ResourceRecordTooShort { id })?;
        let rdlength = buffer
            .next_u16()
            .ok_or(Error::ResourceRecordTooShort { id })? as usize;

        let rdata_start = buffer.position();
        let rdata_stop = rdata_start + rdlength;
        if rdata_stop > buffer.len() {
            return Err(Error::ResourceRecordTooShort { id });
        }

        let rtype_with_data = match rtype {
            RecordType::A => {
                let octets = buffer
                    .take(4)
                    .ok_or(Error::ResourceRecordInvalid { id })?;
                RecordTypeWithData::A {
                    address: Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
                }
            }
            RecordType::AAAA => {
                let octets = buffer
                    .take(16)
                    .ok_or(Error::ResourceRecordInvalid { id })?;
                let mut segments = [0u8; 16];
                segments.copy_from_slice(octets);
                RecordTypeWithData::AAAA {
                    address: Ipv6Addr::from(segments),
                }
            }
            RecordType::NS => RecordTypeWithData::NS {
                nsdname: DomainName::deserialise(buffer, id)?,
            },
            RecordType::CNAME => RecordTypeWithData::CNAME {
                cname: DomainName::deserialise(buffer, id)?,
            },
            RecordType::SOA => {
                let mname = DomainName::deserialise(buffer, id)?;
                let rname = DomainName::deserialise(buffer, id)?;
                let serial = buffer
                    .next_u32()
                    .ok_or(Error::ResourceRecordInvalid { id })?;
                let refresh = buffer
                    .next_u32()
                    .ok_or(Error::ResourceRecordInvalid { id })?;
                let retry = buffer
                    .next_u32()
                    .ok_or(Error::ResourceRecordInvalid { id })?;
                let expire = buffer
                    .next_u32()
                    .ok_or(Error::ResourceRecordInvalid { id })?;
                let minimum = buffer
                    .next_u32()
                    .ok_or(Error::ResourceRecordInvalid { id })?;
                RecordTypeWithData::SOA {
                    mname,
                    rname,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                }
            }
            RecordType::TXT => {
                // rdlength has already been range-checked above; take
                // whatever's left up to rdata_stop, below.
                let remaining = rdata_stop.saturating_sub(buffer.position());
                let octets = buffer.take(remaining).ok_or(Error::ResourceRecordInvalid { id })?;
                RecordTypeWithData::TXT {
                    octets: Bytes::copy_from_slice(octets),
                }
            }
            RecordType::Unknown(n) => {
                let remaining = rdata_stop.saturating_sub(buffer.position());
                let octets = buffer.take(remaining).ok_or(Error::ResourceRecordInvalid { id })?;
                RecordTypeWithData::Unknown {
                    rtype: n,
                    octets: Bytes::copy_from_slice(octets),
                }
            }
        };

        // The per-type parser may have consumed fewer bytes than
        // `rdlength` (e.g. a compressed name inside rdata, or a
        // deliberately permissive record type) — discard the
        // remainder.  Consuming *more* than `rdlength` is invalid.
        if buffer.position() > rdata_stop {
            return Err(Error::ResourceRecordInvalid { id });
        }
        buffer.seek(rdata_stop);

        Ok(ResourceRecord {
            name,
            rtype_with_data,
            rclass,
            ttl,
        })
    }
}

impl DomainName {
    /// Maximum number of pointer hops to follow before giving up: a
    /// pointer may only ever reference a strictly earlier offset than
    /// the name currently being decoded, which structurally bounds any
    /// chain of pointers by the message length — this limit is an
    /// extra guard against pathological inputs.
    const MAX_POINTER_HOPS: usize = 128;

    fn deserialise(buffer: &mut ConsumableBuffer, id: u16) -> Result<Self, Error> {
        let start = buffer.position();
        let mut labels = Vec::new();
        let mut len = 0usize;
        let mut cursor = start;
        let mut hops = 0usize;

        loop {
            let byte = buffer
                .peek_u8_at(cursor)
                .ok_or(Error::DomainTooShort { id })?;

            if byte & 0b1100_0000 == 0b1100_0000 {
                let lo = buffer.peek_u8_at(cursor + 1).ok_or(Error::DomainTooShort { id })?;
                let pointer = (u16::from(byte & 0b0011_1111) << 8) | u16::from(lo);
                let pointer = pointer as usize;

                if pointer >= start {
                    return Err(Error::DomainPointerInvalid { id });
                }
                hops += 1;
                if hops > Self::MAX_POINTER_HOPS {
                    return Err(Error::DomainPointerInvalid { id });
                }

                if buffer.position() <= cursor {
                    buffer.seek(cursor + 2);
                }
                cursor = pointer;
                continue;
            } else if byte & 0b1100_0000 != 0 {
                return Err(Error::DomainLabelInvalid { id });
            } else if byte == 0 {
                if buffer.position() <= cursor {
                    buffer.seek(cursor + 1);
                }
                break;
            } else {
                let label_len = byte as usize;
                let label_octets = buffer
                    .peek_slice_at(cursor + 1, label_len)
                    .ok_or(Error::DomainTooShort { id })?;
                let label = Label::try_from(label_octets).map_err(|_| Error::DomainLabelInvalid { id })?;
                len += label.len() + 1;
                if len > DOMAINNAME_MAX_LEN - 1 {
                    return Err(Error::DomainTooLong { id });
                }
                labels.push(label);

                let next_cursor = cursor + 1 + label_len;
                if buffer.position() <= cursor {
                    buffer.seek(next_cursor);
                }
                cursor = next_cursor;
            }
        }

        DomainName::from_labels(labels).ok_or(Error::DomainTooLong { id })
    }
}

impl QueryType {
    fn deserialise(buffer: &mut ConsumableBuffer) -> Option<Self> {
        Some(QueryType::from(buffer.next_u16()?))
    }
}

impl QueryClass {
    #[allow(dead_code)]
    fn deserialise(buffer: &mut ConsumableBuffer) -> Option<Self> {
        Some(QueryClass::from(buffer.next_u16()?))
    }
}

/// Errors encountered when deserialising a message.  Every variant
/// except `CompletelyBusted` carries the request id (recovered from
/// the first two octets) so the caller can echo it back in a format
/// error response; `CompletelyBusted` means even that much could not
/// be recovered.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    CompletelyBusted,
    HeaderTooShort,
    QuestionTooShort { id: u16 },
    ResourceRecordTooShort { id: u16 },
    ResourceRecordInvalid { id: u16 },
    DomainTooShort { id: u16 },
    DomainTooLong { id: u16 },
    DomainPointerInvalid { id: u16 },
    DomainLabelInvalid { id: u16 },
}

impl Error {
    /// The request id to echo back in a format-error response, if one
    /// could be recovered from the malformed datagram.
    pub fn id(&self) -> Option<u16> {
        match self {
            Error::CompletelyBusted | Error::HeaderTooShort => None,
            Error::QuestionTooShort { id }
            | Error::ResourceRecordTooShort { id }
            | Error::ResourceRecordInvalid { id }
            | Error::DomainTooShort { id }
            | Error::DomainTooLong { id }
            | Error::DomainPointerInvalid { id }
            | Error::DomainLabelInvalid { id } => Some(*id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A cursor over a read-only message buffer.  `at_offset`-style
/// access (`peek_*_at`) lets domain-name decoding follow a
/// compression pointer into an earlier part of the message without
/// disturbing the caller's own cursor position.
struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    fn new(octets: &'a [u8]) -> Self {
        ConsumableBuffer { octets, position: 0 }
    }

    fn len(&self) -> usize {
        self.octets.len()
    }

    fn position(&self) -> usize {
        self.position
    }

    fn seek(&mut self, position: usize) {
        self.position = position;
    }

    fn next_u8(&mut self) -> Option<u8> {
        let byte = *self.octets.get(self.position)?;
        self.position += 1;
        Some(byte)
    }

    fn next_u16(&mut self) -> Option<u16> {
        let hi = self.next_u8()?;
        let lo = self.next_u8()?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    fn next_u32(&mut self) -> Option<u32> {
        let a = self.next_u8()?;
        let b = self.next_u8()?;
        let c = self.next_u8()?;
        let d = self.next_u8()?;
        Some(u32::from_be_bytes([a, b, c, d]))
    }

    fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        let slice = self.octets.get(self.position..self.position + size)?;
        self.position += size;
        Some(slice)
    }

    fn peek_u8_at(&self, position: usize) -> Option<u8> {
        self.octets.get(position).copied()
    }

    fn peek_slice_at(&self, position: usize, size: usize) -> Option<&'a [u8]> {
        self.octets.get(position..position + size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    fn roundtrip(m: &Message) -> Message {
        let bytes = m.into_octets().unwrap();
        Message::from_octets(&bytes).unwrap()
    }

    fn base_message() -> Message {
        let mut m = Message::from_question(
            0x04D2,
            Question {
                name: domain("example.com."),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        );
        m.header.is_response = true;
        m
    }

    #[test]
    fn round_trips_simple_query() {
        let m = base_message();
        assert_eq!(roundtrip(&m), m);
    }

    #[test]
    fn round_trips_a_answer() {
        let mut m = base_message();
        m.answers.push(a_record("example.com.", "93.184.216.34".parse().unwrap()));
        assert_eq!(roundtrip(&m), m);
    }

    #[test]
    fn round_trips_aaaa_answer() {
        let mut m = base_message();
        m.answers
            .push(aaaa_record("example.com.", "2606:2800:220:1:248:1893:25c8:1946".parse().unwrap()));
        assert_eq!(roundtrip(&m), m);
    }

    #[test]
    fn round_trips_compressed_names() {
        let mut m = base_message();
        m.questions[0].name = domain("www.example.com.");
        m.answers.push(cname_record("www.example.com.", "example.com."));
        m.answers.push(a_record("example.com.", "1.1.1.1".parse().unwrap()));
        assert_eq!(roundtrip(&m), m);
    }

    #[test]
    fn round_trips_prefix_label_plus_pointer_owner_name() {
        // "ns1.example.com." owner name: "ns1" is a raw label, but the
        // "example.com." suffix compresses against the question name.
        let mut m = base_message();
        m.additional
            .push(a_record("ns1.example.com.", "203.0.113.5".parse().unwrap()));
        assert_eq!(roundtrip(&m), m);
    }

    #[test]
    fn round_trips_soa() {
        let mut m = base_message();
        m.answers.push(soa_record("example.com.", "ns1.example.com.", "admin.example.com."));
        assert_eq!(roundtrip(&m), m);
    }

    #[test]
    fn rejects_self_pointing_name() {
        // header (12 bytes) + 1 question with a name that is just a
        // pointer to its own start offset (byte 12).
        let mut bytes = vec![
            0, 1, // id
            0, 0, // flags
            0, 1, // qdcount
            0, 0, 0, 0, 0, 0, // an/ns/arcount
        ];
        let self_offset = bytes.len() as u16;
        bytes.push(0b1100_0000 | ((self_offset >> 8) as u8));
        bytes.push((self_offset & 0xFF) as u8);
        bytes.extend_from_slice(&[0, 1, 0, 1]); // qtype, qclass

        assert!(matches!(
            Message::from_octets(&bytes),
            Err(Error::DomainPointerInvalid { .. })
        ));
    }

    #[test]
    fn rejects_pointer_past_end_of_buffer() {
        let mut bytes = vec![
            0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, // header
        ];
        bytes.push(0b1100_0000);
        bytes.push(0xFF);
        bytes.extend_from_slice(&[0, 1, 0, 1]);

        assert!(Message::from_octets(&bytes).is_err());
    }

    #[test]
    fn rejects_qdcount_zero() {
        let bytes = vec![0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            Message::from_octets(&bytes),
            Err(Error::QuestionTooShort { .. })
        ));
    }

    #[test]
    fn rejects_too_short_header() {
        let bytes = vec![0, 1, 0, 0];
        assert!(matches!(Message::from_octets(&bytes), Err(Error::HeaderTooShort)));
    }

    #[test]
    fn accepts_nonzero_z_bits() {
        let mut m = base_message();
        let mut bytes = m.into_octets().unwrap();
        bytes[3] |= HEADER_MASK_Z;
        let decoded = Message::from_octets(&bytes).unwrap();
        m.header.rcode = Rcode::NoError;
        assert_eq!(decoded.header.id, m.header.id);
    }

    #[test]
    fn tolerates_rdlength_under_consumption() {
        // an rdlength longer than the type actually needs must not
        // error; the remainder is discarded.
        let mut bytes = vec![
            0, 1, 0, 0x80, 0, 1, 0, 1, 0, 0, 0, 0, // header: qr=1, qd=1, an=1
        ];
        // question: root name, type A, class IN
        bytes.extend_from_slice(&[0, 0, 1, 0, 1]);
        // answer: root name, type A, class IN, ttl=0, rdlength=6 (but A only needs 4)
        bytes.extend_from_slice(&[0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 6, 1, 2, 3, 4, 0xAA, 0xBB]);

        let decoded = Message::from_octets(&bytes).unwrap();
        assert_eq!(decoded.answers.len(), 1);
        match &decoded.answers[0].rtype_with_data {
            RecordTypeWithData::A { address } => assert_eq!(*address, Ipv4Addr::new(1, 2, 3, 4)),
            other => panic!("expected A, got {other:?}"),
        }
    }
}
