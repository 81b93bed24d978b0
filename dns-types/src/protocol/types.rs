//! The data model for DNS messages: headers, questions, resource
//! records, and domain names.  See RFC 1035 section 4 for the wire
//! format these types represent.

use bytes::Bytes;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// The longest a domain name may be, in octets, once encoded (RFC
/// 1035 section 2.3.4).
pub const DOMAINNAME_MAX_LEN: usize = 255;

/// The longest a single label may be, in octets.
pub const LABEL_MAX_LEN: usize = 63;

pub(crate) const HEADER_MASK_QR: u8 = 0b1000_0000;
pub(crate) const HEADER_MASK_OPCODE: u8 = 0b0111_1000;
pub(crate) const HEADER_OFFSET_OPCODE: u8 = 3;
pub(crate) const HEADER_MASK_AA: u8 = 0b0000_0100;
pub(crate) const HEADER_MASK_TC: u8 = 0b0000_0010;
pub(crate) const HEADER_MASK_RD: u8 = 0b0000_0001;
pub(crate) const HEADER_MASK_RA: u8 = 0b1000_0000;
pub(crate) const HEADER_MASK_Z: u8 = 0b0111_0000;
pub(crate) const HEADER_MASK_RCODE: u8 = 0b0000_1111;

/// A full DNS message: header, question section, and the three
/// resource-record sections.
///
/// The `*count` fields of the wire header are not stored here: they
/// are derived from the length of the corresponding `Vec` at
/// serialisation time, and read into locals (then discarded) at
/// deserialisation time.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

// hand-written rather than derived: a decoded message always has
// qdcount >= 1 (see `deserialise`), so an arbitrary `Message` with an
// empty `questions` vec would not round-trip.
#[cfg(feature = "test-util")]
impl<'a> arbitrary::Arbitrary<'a> for Message {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut questions = vec![u.arbitrary()?];
        questions.extend(u.arbitrary_iter()?.collect::<Result<Vec<Question>, _>>()?);
        Ok(Message {
            header: u.arbitrary()?,
            questions,
            answers: u.arbitrary()?,
            authority: u.arbitrary()?,
            additional: u.arbitrary()?,
        })
    }
}

impl Message {
    /// Build a single-question query message with a random-ish caller-supplied
    /// id and `recursion_desired` set.
    pub fn from_question(id: u16, question: Question) -> Self {
        Self {
            header: Header {
                id,
                is_response: false,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: true,
                recursion_available: false,
                rcode: Rcode::NoError,
            },
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Build an empty response to this message, copying the id, opcode, and
    /// questions, and setting `qr`.  The caller fills in the answer
    /// sections and `rcode`.
    pub fn make_response(&self) -> Self {
        Self {
            header: Header {
                id: self.header.id,
                is_response: true,
                opcode: self.header.opcode,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: self.header.recursion_desired,
                recursion_available: false,
                rcode: Rcode::NoError,
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// A response carrying no question, used when the request could not be
    /// parsed far enough to recover even a question section.
    pub fn make_format_error_response(id: u16) -> Self {
        Self {
            header: Header {
                id,
                is_response: true,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: false,
                rcode: Rcode::FormatError,
            },
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }
}

/// The fixed 12-octet message header, minus the section-length
/// counters (see `Message`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "test-util", derive(arbitrary::Arbitrary))]
pub struct Header {
    pub id: u16,
    pub is_response: bool,
    pub opcode: Opcode,
    pub is_authoritative: bool,
    pub is_truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: Rcode,
}

/// A single question: the name and type/class being asked about.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "test-util", derive(arbitrary::Arbitrary))]
pub struct Question {
    pub name: DomainName,
    pub qtype: QueryType,
    pub qclass: QueryClass,
}

impl Question {
    /// An unknown question is one this server does not know how to
    /// usefully answer: neither a known `RecordType`/wildcard, nor a
    /// known `RecordClass`/wildcard.
    pub fn is_unknown(&self) -> bool {
        matches!(self.qtype, QueryType::Record(RecordType::Unknown(_)))
            || matches!(self.qclass, QueryClass::Record(RecordClass::Unknown(_)))
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.qclass, self.qtype)
    }
}

/// A single resource record, as carried in the answer, authority, or
/// additional section of a message.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "test-util", derive(arbitrary::Arbitrary))]
pub struct ResourceRecord {
    pub name: DomainName,
    pub rtype_with_data: RecordTypeWithData,
    pub rclass: RecordClass,
    pub ttl: u32,
}

impl ResourceRecord {
    pub fn is_unknown(&self) -> bool {
        matches!(self.rtype_with_data, RecordTypeWithData::Unknown { .. })
            || matches!(self.rclass, RecordClass::Unknown(_))
    }
}

/// The decoded rdata for a resource record, tagged by record type.
///
/// Only the types named in the record-type list this resolver gives
/// semantic meaning to ({A, AAAA, NS, CNAME, SOA, TXT}) carry
/// structured rdata; everything else decodes to `Unknown` with the
/// raw octets preserved.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum RecordTypeWithData {
    A {
        address: Ipv4Addr,
    },
    AAAA {
        address: Ipv6Addr,
    },
    NS {
        nsdname: DomainName,
    },
    CNAME {
        cname: DomainName,
    },
    SOA {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    TXT {
        octets: Bytes,
    },
    Unknown {
        rtype: u16,
        octets: Bytes,
    },
}

impl RecordTypeWithData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordTypeWithData::A { .. } => RecordType::A,
            RecordTypeWithData::AAAA { .. } => RecordType::AAAA,
            RecordTypeWithData::NS { .. } => RecordType::NS,
            RecordTypeWithData::CNAME { .. } => RecordType::CNAME,
            RecordTypeWithData::SOA { .. } => RecordType::SOA,
            RecordTypeWithData::TXT { .. } => RecordType::TXT,
            RecordTypeWithData::Unknown { rtype, .. } => RecordType::from(*rtype),
        }
    }

    /// Does this record answer a question of the given type (taking the
    /// wildcard query type into account)?
    pub fn matches(&self, qtype: QueryType) -> bool {
        match qtype {
            QueryType::Wildcard => true,
            QueryType::Record(rtype) => self.rtype() == rtype,
        }
    }
}

#[cfg(feature = "test-util")]
impl<'a> arbitrary::Arbitrary<'a> for RecordTypeWithData {
    // this is pretty verbose but it feels like a better way to guarantee the
    // max size of the opaque `octets` than adding a wrapper type
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let len = u.int_in_range(0..=128)?;
        let octets = Bytes::copy_from_slice(u.bytes(len)?);

        Ok(match u.arbitrary::<RecordType>()? {
            RecordType::A => RecordTypeWithData::A {
                address: u.arbitrary()?,
            },
            RecordType::AAAA => RecordTypeWithData::AAAA {
                address: u.arbitrary()?,
            },
            RecordType::NS => RecordTypeWithData::NS {
                nsdname: u.arbitrary()?,
            },
            RecordType::CNAME => RecordTypeWithData::CNAME {
                cname: u.arbitrary()?,
            },
            RecordType::SOA => RecordTypeWithData::SOA {
                mname: u.arbitrary()?,
                rname: u.arbitrary()?,
                serial: u.arbitrary()?,
                refresh: u.arbitrary()?,
                retry: u.arbitrary()?,
                expire: u.arbitrary()?,
                minimum: u.arbitrary()?,
            },
            RecordType::TXT => RecordTypeWithData::TXT { octets },
            RecordType::Unknown(rtype) => RecordTypeWithData::Unknown { rtype, octets },
        })
    }
}

/// The type of a resource record.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    TXT,
    AAAA,
    Unknown(u16),
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::Unknown(n) => write!(f, "TYPE{n}"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordTypeFromStr {
    BadType,
}

impl FromStr for RecordType {
    type Err = RecordTypeFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "NS" => Ok(RecordType::NS),
            "CNAME" => Ok(RecordType::CNAME),
            "SOA" => Ok(RecordType::SOA),
            "TXT" => Ok(RecordType::TXT),
            "AAAA" => Ok(RecordType::AAAA),
            other => {
                if let Some(rest) = other.strip_prefix("TYPE") {
                    rest.parse::<u16>()
                        .map(RecordType::from)
                        .map_err(|_| RecordTypeFromStr::BadType)
                } else {
                    Err(RecordTypeFromStr::BadType)
                }
            }
        }
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            other => RecordType::Unknown(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::Unknown(n) => n,
        }
    }
}

#[cfg(feature = "test-util")]
impl<'a> arbitrary::Arbitrary<'a> for RecordType {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

/// The class of a resource record.  Only `IN` is meaningfully
/// supported; the resolver only ever issues `IN` questions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordClass {
    IN,
    Unknown(u16),
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::Unknown(n) => write!(f, "CLASS{n}"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordClassFromStr {
    BadClass,
}

impl FromStr for RecordClass {
    type Err = RecordClassFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(RecordClass::IN),
            other => {
                if let Some(rest) = other.strip_prefix("CLASS") {
                    rest.parse::<u16>()
                        .map(RecordClass::from)
                        .map_err(|_| RecordClassFromStr::BadClass)
                } else {
                    Err(RecordClassFromStr::BadClass)
                }
            }
        }
    }
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            other => RecordClass::Unknown(other),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::Unknown(n) => n,
        }
    }
}

#[cfg(feature = "test-util")]
impl<'a> arbitrary::Arbitrary<'a> for RecordClass {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

/// The type field of a question: either a concrete `RecordType` or
/// the `*` wildcard (matches any type).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueryType {
    Record(RecordType),
    Wildcard,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryType::Record(rtype) => write!(f, "{rtype}"),
            QueryType::Wildcard => write!(f, "*"),
        }
    }
}

impl From<u16> for QueryType {
    fn from(value: u16) -> Self {
        match value {
            255 => QueryType::Wildcard,
            other => QueryType::Record(RecordType::from(other)),
        }
    }
}

impl From<QueryType> for u16 {
    fn from(value: QueryType) -> Self {
        match value {
            QueryType::Wildcard => 255,
            QueryType::Record(rtype) => rtype.into(),
        }
    }
}

#[cfg(feature = "test-util")]
impl<'a> arbitrary::Arbitrary<'a> for QueryType {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

/// The class field of a question: either a concrete `RecordClass` or
/// the `*` wildcard.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueryClass {
    Record(RecordClass),
    Wildcard,
}

impl fmt::Display for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryClass::Record(rclass) => write!(f, "{rclass}"),
            QueryClass::Wildcard => write!(f, "*"),
        }
    }
}

impl From<u16> for QueryClass {
    fn from(value: u16) -> Self {
        match value {
            255 => QueryClass::Wildcard,
            other => QueryClass::Record(RecordClass::from(other)),
        }
    }
}

impl From<QueryClass> for u16 {
    fn from(value: QueryClass) -> Self {
        match value {
            QueryClass::Wildcard => 255,
            QueryClass::Record(rclass) => rclass.into(),
        }
    }
}

#[cfg(feature = "test-util")]
impl<'a> arbitrary::Arbitrary<'a> for QueryClass {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

/// The header opcode: what kind of query this is.  The resolver only
/// ever handles (and only ever emits) `Standard`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Opcode {
    Standard,
    Inverse,
    Status,
    Unknown(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Opcode::Standard,
            1 => Opcode::Inverse,
            2 => Opcode::Status,
            other => Opcode::Unknown(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Standard => 0,
            Opcode::Inverse => 1,
            Opcode::Status => 2,
            Opcode::Unknown(n) => n,
        }
    }
}

#[cfg(feature = "test-util")]
impl<'a> arbitrary::Arbitrary<'a> for Opcode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u8>()?))
    }
}

/// The header response code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Unknown(u8),
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Rcode::NoError => "no-error",
            Rcode::FormatError => "format-error",
            Rcode::ServerFailure => "server-failure",
            Rcode::NameError => "name-error",
            Rcode::NotImplemented => "not-implemented",
            Rcode::Refused => "refused",
            Rcode::Unknown(_) => "unknown",
        };
        write!(f, "{s}")
    }
}

impl From<u8> for Rcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            other => Rcode::Unknown(other),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Unknown(n) => n,
        }
    }
}

#[cfg(feature = "test-util")]
impl<'a> arbitrary::Arbitrary<'a> for Rcode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u8>()?))
    }
}

/// A domain name: a sequence of labels, most-specific first, with no
/// trailing empty label stored (`example.com`, not `example.com.`).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct DomainName {
    pub labels: Vec<Label>,
    len: usize,
}

impl DomainName {
    /// The root domain: zero labels.
    pub fn root_domain() -> Self {
        DomainName {
            labels: Vec::new(),
            len: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Total encoded length, including the terminating zero octet
    /// but not any compression pointer.
    pub fn encoded_len(&self) -> usize {
        self.len + 1
    }

    /// Build a name from its labels, most-specific first, validating the
    /// 63-octet-per-label and 255-octet-total limits.
    pub fn from_labels(labels: Vec<Label>) -> Option<Self> {
        let mut len = 0usize;
        for label in &labels {
            len += label.len() + 1;
        }
        if len > DOMAINNAME_MAX_LEN - 1 {
            None
        } else {
            Some(DomainName { labels, len })
        }
    }

    /// Parse a dotted string such as `"www.example.com."` or
    /// `"www.example.com"` (a trailing dot is optional and stripped).
    pub fn from_dotted_string(s: &str) -> Option<Self> {
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Some(DomainName::root_domain());
        }
        let mut labels = Vec::new();
        for part in trimmed.split('.') {
            labels.push(Label::try_from(part.as_bytes()).ok()?);
        }
        DomainName::from_labels(labels)
    }

    /// Parse a name relative to no implicit origin (used for rdata
    /// names which are always absolute once decoded off the wire).
    pub fn from_relative_dotted_string(origin: &DomainName, s: &str) -> Option<Self> {
        if s == "@" {
            return Some(origin.clone());
        }
        if let Some(absolute) = s.strip_suffix('.') {
            return DomainName::from_dotted_string(absolute);
        }
        let mut labels = Vec::new();
        for part in s.split('.') {
            labels.push(Label::try_from(part.as_bytes()).ok()?);
        }
        labels.extend(origin.labels.iter().cloned());
        DomainName::from_labels(labels)
    }

    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }
        let mut s = String::with_capacity(self.len + 1);
        for label in &self.labels {
            s.push_str(&String::from_utf8_lossy(label.octets()));
            s.push('.');
        }
        s
    }

    /// Is `self` equal to, or a subdomain of, `other`?
    pub fn is_subdomain_of(&self, other: &DomainName) -> bool {
        if other.labels.len() > self.labels.len() {
            return false;
        }
        let offset = self.labels.len() - other.labels.len();
        self.labels[offset..] == other.labels[..]
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_dotted_string())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DomainNameFromStr {
    NoParse,
}

impl FromStr for DomainName {
    type Err = DomainNameFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DomainName::from_dotted_string(s).ok_or(DomainNameFromStr::NoParse)
    }
}

/// A single label of a domain name: 0 to 63 octets, case-preserved on
/// the wire, compared case-insensitively for compression and cache
/// keying by whoever does that comparison (labels store the raw,
/// unmodified case).
#[derive(Debug, Clone, Eq)]
pub struct Label {
    octets: Bytes,
}

// `Label` equality is case-insensitive, so its `Hash` impl must hash
// the lowercased form too, or two labels differing only by case would
// be `Eq` but land in different `HashMap` buckets.
impl std::hash::Hash for Label {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_lowercase().hash(state);
    }
}

impl Label {
    pub fn new(octets: Bytes) -> Option<Self> {
        if octets.len() > LABEL_MAX_LEN {
            None
        } else {
            Some(Label { octets })
        }
    }

    pub fn len(&self) -> usize {
        self.octets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    pub fn octets(&self) -> &[u8] {
        &self.octets
    }

    /// Case-insensitive view, used for compression-table and cache
    /// keys.
    pub fn to_lowercase(&self) -> Vec<u8> {
        self.octets.to_ascii_lowercase()
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.octets.eq_ignore_ascii_case(&other.octets)
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_lowercase().cmp(&other.to_lowercase())
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<&[u8]> for Label {
    type Error = LabelError;

    fn try_from(octets: &[u8]) -> Result<Self, Self::Error> {
        if octets.len() > LABEL_MAX_LEN {
            Err(LabelError::TooLong { len: octets.len() })
        } else {
            Ok(Label {
                octets: Bytes::copy_from_slice(octets),
            })
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LabelError {
    TooLong { len: usize },
}

#[cfg(feature = "test-util")]
pub mod test_util {
    use super::*;
    use arbitrary::{Arbitrary, Unstructured};

    pub fn domain(s: &str) -> DomainName {
        DomainName::from_dotted_string(s).unwrap_or_else(|| panic!("bad test domain {s:?}"))
    }

    pub fn a_record(name: &str, address: Ipv4Addr) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::A { address },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn aaaa_record(name: &str, address: Ipv6Addr) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::AAAA { address },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn ns_record(name: &str, nsdname: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::NS {
                nsdname: domain(nsdname),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn cname_record(name: &str, cname: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::CNAME {
                cname: domain(cname),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn soa_record(name: &str, mname: &str, rname: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::SOA {
                mname: domain(mname),
                rname: domain(rname),
                serial: 1,
                refresh: 3600,
                retry: 600,
                expire: 86400,
                minimum: 300,
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn txt_record(name: &str, text: &[u8]) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::TXT {
                octets: Bytes::copy_from_slice(text),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn unknown_record(name: &str, octets: &[u8]) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::Unknown {
                rtype: 1234,
                octets: Bytes::copy_from_slice(octets),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    impl<'a> Arbitrary<'a> for Label {
        fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
            let len = u.int_in_range(1..=LABEL_MAX_LEN)?;
            let mut octets = Vec::with_capacity(len);
            for _ in 0..len {
                let b: u8 = u.arbitrary()?;
                // sanitise separators and control bytes so the
                // generated label round-trips through dotted-string
                // parsing unambiguously.
                octets.push(match b {
                    b'.' | b'*' | b'@' | b'#' | 0..=0x20 => b'x',
                    other => other,
                });
            }
            Ok(Label {
                octets: Bytes::from(octets),
            })
        }
    }

    impl<'a> Arbitrary<'a> for DomainName {
        fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
            let n = u.int_in_range(0..=5)?;
            let mut labels = Vec::with_capacity(n);
            let mut len = 0usize;
            for _ in 0..n {
                let label = Label::arbitrary(u)?;
                len += label.len() + 1;
                if len > DOMAINNAME_MAX_LEN - 1 {
                    break;
                }
                labels.push(label);
            }
            DomainName::from_labels(labels).ok_or(arbitrary::Error::IncorrectFormat)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_name_round_trips_dotted_string() {
        let d = DomainName::from_dotted_string("www.example.com.").unwrap();
        assert_eq!(d.to_dotted_string(), "www.example.com.");
        assert_eq!(d.labels.len(), 3);
    }

    #[test]
    fn domain_name_strips_optional_trailing_dot() {
        assert_eq!(
            DomainName::from_dotted_string("example.com"),
            DomainName::from_dotted_string("example.com."),
        );
    }

    #[test]
    fn domain_name_root_is_empty() {
        let root = DomainName::from_dotted_string(".").unwrap();
        assert!(root.is_root());
        assert_eq!(root.to_dotted_string(), ".");
    }

    #[test]
    fn domain_name_rejects_too_long() {
        let label = "a".repeat(63);
        let joined = std::iter::repeat(label).take(5).collect::<Vec<_>>().join(".");
        assert!(DomainName::from_dotted_string(&joined).is_none());
    }

    #[test]
    fn domain_name_is_subdomain_of() {
        let sub = domain_name("www.example.com.");
        let sup = domain_name("example.com.");
        assert!(sub.is_subdomain_of(&sup));
        assert!(sup.is_subdomain_of(&sup));
        assert!(!sup.is_subdomain_of(&sub));
    }

    #[test]
    fn domain_name_equality_is_case_insensitive() {
        assert_eq!(domain_name("WWW.Example.COM."), domain_name("www.example.com."));
    }

    #[test]
    fn record_type_display_and_from_str_round_trip() {
        for rtype in [
            RecordType::A,
            RecordType::NS,
            RecordType::CNAME,
            RecordType::SOA,
            RecordType::TXT,
            RecordType::AAAA,
        ] {
            assert_eq!(rtype.to_string().parse::<RecordType>(), Ok(rtype));
        }
        assert_eq!("TYPE999".parse::<RecordType>(), Ok(RecordType::Unknown(999)));
    }

    #[test]
    fn rcode_numeric_round_trip() {
        for n in 0u8..6 {
            assert_eq!(u8::from(Rcode::from(n)), n);
        }
    }

    fn domain_name(s: &str) -> DomainName {
        DomainName::from_dotted_string(s).unwrap()
    }
}
