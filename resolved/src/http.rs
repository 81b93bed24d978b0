//! The HTTP forwarding endpoint: `GET /resolve?domain=&type=[&host=]`,
//! a JSON rendering of the same resolution pipeline the UDP front-end
//! drives.
//!
//! `domain`/`type`/`host` are validated with the same `FromStr`
//! parsing the wire codec and std already provide
//! (`DomainName::from_dotted_string`, `RecordType::from_str`,
//! `Ipv4Addr::from_str`) rather than pulling in a `regex` dependency.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Instant;

use actix_web::{get, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use dns_resolver::engine::Engine;
use dns_resolver::transport;
use dns_types::protocol::types::*;

use crate::metrics::{
    DNS_QUESTION_PROCESSING_TIME_SECONDS, DNS_REQUESTS_TOTAL, DNS_RESOLVER_CACHE_HIT_TOTAL,
    DNS_RESOLVER_CACHE_MISS_TOTAL, DNS_RESPONSES_TOTAL,
};

/// The record types this endpoint accepts; the resolver only issues
/// class IN questions of one of these six types. A
/// `type=TYPE123`-style value parses fine as a `RecordType` but is
/// rejected here, same as an unsupported type name.
const SUPPORTED_TYPES: [RecordType; 6] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::NS,
    RecordType::CNAME,
    RecordType::SOA,
    RecordType::TXT,
];

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    domain: String,
    #[serde(rename = "type")]
    qtype: String,
    host: Option<String>,
}

#[get("/resolve")]
pub async fn resolve_handler(engine: web::Data<Engine>, query: web::Query<ResolveQuery>) -> impl Responder {
    DNS_REQUESTS_TOTAL.with_label_values(&["http"]).inc();

    let Some(name) = DomainName::from_dotted_string(&query.domain) else {
        return HttpResponse::BadRequest().body("invalid domain");
    };
    let Ok(rtype) = RecordType::from_str(&query.qtype) else {
        return HttpResponse::BadRequest().body("invalid type");
    };
    if !SUPPORTED_TYPES.contains(&rtype) {
        return HttpResponse::BadRequest().body("invalid type");
    }
    let host = match &query.host {
        Some(raw) => match Ipv4Addr::from_str(raw) {
            Ok(ip) => Some(ip),
            Err(_) => return HttpResponse::BadRequest().body("invalid host"),
        },
        None => None,
    };

    let question = Question {
        name,
        qtype: QueryType::Record(rtype),
        qclass: QueryClass::Record(RecordClass::IN),
    };
    let id = rand::random::<u16>();
    let request = Message::from_question(id, question);

    let timer = DNS_QUESTION_PROCESSING_TIME_SECONDS
        .with_label_values(&[&rtype.to_string()])
        .start_timer();
    let start = Instant::now();

    // The host parameter, when provided, bypasses the recursive
    // engine and sends a single UDP query straight to (host, 53) --
    // the sole path by which external callers can reach the
    // single-nameserver transport directly.
    let response = if let Some(host) = host {
        let packet = match request.into_octets() {
            Ok(packet) => packet,
            Err(error) => {
                tracing::warn!(%error, "could not serialise forwarded query");
                return HttpResponse::InternalServerError().body("could not serialise query");
            }
        };
        match transport::query(&packet, host, 53, transport::DEFAULT_TIMEOUT).await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(%error, %host, "direct upstream query failed");
                let mut response = request.make_response();
                response.header.rcode = Rcode::ServerFailure;
                response
            }
        }
    } else {
        let (response, stats) = engine.resolve(&request).await;
        DNS_RESOLVER_CACHE_HIT_TOTAL.inc_by(u64::from(stats.cache_hits));
        DNS_RESOLVER_CACHE_MISS_TOTAL.inc_by(u64::from(stats.cache_misses));
        response
    };

    timer.observe_duration();
    tracing::debug!(question = %request.questions[0], duration_seconds = %start.elapsed().as_secs_f64(), "http resolve");
    DNS_RESPONSES_TOTAL
        .with_label_values(&[&response.header.rcode.to_string()])
        .inc();

    HttpResponse::Ok().json(JsonMessage::from(&response))
}

/// A JSON rendering of a `Message`. `dns-types` itself carries no
/// `serde` dependency, so this mirror type lives here, in the one
/// crate that actually needs to render a message as JSON -- the same
/// approach `dns-resolver`'s cache module takes for its own
/// JSON-serialized cache values.
#[derive(Debug, Serialize)]
struct JsonMessage {
    id: u16,
    qr: bool,
    aa: bool,
    tc: bool,
    rd: bool,
    ra: bool,
    rcode: String,
    questions: Vec<JsonQuestion>,
    answers: Vec<JsonResourceRecord>,
    authority: Vec<JsonResourceRecord>,
    additional: Vec<JsonResourceRecord>,
}

#[derive(Debug, Serialize)]
struct JsonQuestion {
    name: String,
    qtype: String,
    qclass: String,
}

#[derive(Debug, Serialize)]
struct JsonResourceRecord {
    name: String,
    #[serde(rename = "type")]
    rtype: String,
    class: String,
    ttl: u32,
    rdata: serde_json::Value,
}

impl From<&Message> for JsonMessage {
    fn from(message: &Message) -> Self {
        JsonMessage {
            id: message.header.id,
            qr: message.header.is_response,
            aa: message.header.is_authoritative,
            tc: message.header.is_truncated,
            rd: message.header.recursion_desired,
            ra: message.header.recursion_available,
            rcode: message.header.rcode.to_string(),
            questions: message.questions.iter().map(JsonQuestion::from).collect(),
            answers: message.answers.iter().map(JsonResourceRecord::from).collect(),
            authority: message.authority.iter().map(JsonResourceRecord::from).collect(),
            additional: message.additional.iter().map(JsonResourceRecord::from).collect(),
        }
    }
}

impl From<&Question> for JsonQuestion {
    fn from(question: &Question) -> Self {
        JsonQuestion {
            name: question.name.to_dotted_string(),
            qtype: question.qtype.to_string(),
            qclass: question.qclass.to_string(),
        }
    }
}

impl From<&ResourceRecord> for JsonResourceRecord {
    fn from(rr: &ResourceRecord) -> Self {
        let rdata = match &rr.rtype_with_data {
            RecordTypeWithData::A { address } => serde_json::json!({ "address": address.to_string() }),
            RecordTypeWithData::AAAA { address } => serde_json::json!({ "address": address.to_string() }),
            RecordTypeWithData::NS { nsdname } => serde_json::json!({ "nsdname": nsdname.to_dotted_string() }),
            RecordTypeWithData::CNAME { cname } => serde_json::json!({ "cname": cname.to_dotted_string() }),
            RecordTypeWithData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => serde_json::json!({
                "mname": mname.to_dotted_string(),
                "rname": rname.to_dotted_string(),
                "serial": serial,
                "refresh": refresh,
                "retry": retry,
                "expire": expire,
                "minimum": minimum,
            }),
            RecordTypeWithData::TXT { octets } => {
                serde_json::json!({ "text": String::from_utf8_lossy(octets) })
            }
            RecordTypeWithData::Unknown { rtype, octets } => {
                serde_json::json!({ "rtype": rtype, "octets_base64": base64_encode(octets) })
            }
        };
        JsonResourceRecord {
            name: rr.name.to_dotted_string(),
            rtype: rr.rtype_with_data.rtype().to_string(),
            class: rr.rclass.to_string(),
            ttl: rr.ttl,
            rdata,
        }
    }
}

/// A minimal base64 encoder for rendering opaque rdata in the JSON
/// response. Not on the wire path and not round-tripped, so a small
/// hand-rolled encoder is preferable to adding a `base64` dependency
/// for one debug-rendering call site.
fn base64_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity((bytes.len() + 2) / 3 * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();

        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[((b0 & 0x03) << 4 | b1.unwrap_or(0) >> 4) as usize] as char);
        out.push(match b1 {
            Some(b1) => ALPHABET[((b1 & 0x0F) << 2 | b2.unwrap_or(0) >> 6) as usize] as char,
            None => '=',
        });
        out.push(match b2 {
            Some(b2) => ALPHABET[(b2 & 0x3F) as usize] as char,
            None => '=',
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip_lengths() {
        assert_eq!(base64_encode(b""), "");
        assert_eq!(base64_encode(b"f"), "Zg==");
        assert_eq!(base64_encode(b"fo"), "Zm8=");
        assert_eq!(base64_encode(b"foo"), "Zm9v");
    }
}
