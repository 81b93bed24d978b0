//! The iterative recursive resolution engine. `resolve` is the
//! top-level per-request entry point; `lookup` is the inner iterative
//! walk against root -> delegation -> authoritative servers.
//!
//! The per-response decision (which branch of the algorithm applies,
//! and what to do about it) is a pure, synchronous function
//! (`classify_response`) that can be unit tested directly against
//! constructed `Message` fixtures, with the async iterative loop as
//! thin glue around it.

use async_recursion::async_recursion;
use rand::seq::SliceRandom;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::Instrument;

use dns_types::protocol::types::*;

use crate::cache::AnswerCache;
use crate::roots::random_root_hint;
use crate::transport;

/// (i) outer-loop iterations per `lookup` call.
const MAX_LOOKUP_ITERATIONS: usize = 16;
/// (ii) recursive `lookup` invocations per top-level `resolve` call.
const MAX_RECURSIVE_LOOKUPS: usize = 32;
/// (iii) wall-clock cap per question.
const PER_QUESTION_TIMEOUT: Duration = Duration::from_secs(10);

const UPSTREAM_PORT: u16 = 53;

/// Engine-wide behavior knobs.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// When following a CNAME chain, re-query the client's original
    /// qtype instead of re-querying type `CNAME`. Default `false`
    /// preserves the latter, more conservative behavior; flip this on
    /// to opt into the former.
    pub fix_cname_requery_type: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fix_cname_requery_type: false,
        }
    }
}

/// Per-`resolve`-call bookkeeping handed back to the caller, so the
/// UDP/HTTP front-ends can feed cache hit/miss counts into whatever
/// metrics system they use without the engine itself depending on one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveStats {
    pub cache_hits: u32,
    pub cache_misses: u32,
}

#[derive(Clone)]
pub struct Engine {
    cache: AnswerCache,
    config: Config,
}

impl Engine {
    pub fn new(cache: AnswerCache, config: Config) -> Self {
        Engine { cache, config }
    }

    /// Resolve every question in `request`, returning a single response
    /// message.
    ///
    /// Each question in `request` is resolved independently and
    /// serially: a cache hit short-circuits straight to a synthesized
    /// response; a miss drives a fresh `lookup`. The first non-null
    /// per-question response is returned; questions beyond the first
    /// are still resolved (and cached) but their responses are not
    /// merged into one wire message.
    pub async fn resolve(&self, request: &Message) -> (Message, ResolveStats) {
        let mut stats = ResolveStats::default();
        let mut responses = Vec::with_capacity(request.questions.len());
        let mut budget = MAX_RECURSIVE_LOOKUPS;

        for question in &request.questions {
            if let Some(cached) = self.cache.get(question) {
                stats.cache_hits += 1;
                let mut response = request.make_response();
                response.header.recursion_available = true;
                response.questions = vec![question.clone()];
                response.answers = cached;
                responses.push(response);
                continue;
            }
            stats.cache_misses += 1;

            let subquery = Message::from_question(request.header.id, question.clone());
            let response = match tokio::time::timeout(
                PER_QUESTION_TIMEOUT,
                lookup(self, &subquery, &mut budget, question.qtype),
            )
            .instrument(tracing::error_span!("lookup", %question))
            .await
            {
                Ok(response) => response,
                Err(_) => {
                    tracing::debug!(%question, "question exceeded the wall-clock cap");
                    name_error_response(&subquery)
                }
            };

            if response.header.rcode == Rcode::NoError && !response.answers.is_empty() {
                self.cache.set(question, &response.answers);
            }

            responses.push(response);
        }

        let response = responses
            .into_iter()
            .next()
            .unwrap_or_else(|| request.make_response());
        (response, stats)
    }
}

/// Drive a single question through the iterative root -> delegation ->
/// authoritative walk, returning a fully-formed response message.
///
/// `client_qtype` is the *original* question's qtype, threaded
/// unchanged through every recursive call — including the
/// glue-less-authority path — rather than re-derived from each nested
/// call's own (possibly CNAME- or A-typed) sub-query. Only a
/// non-CNAME original qtype triggers CNAME chasing.
#[async_recursion]
async fn lookup(engine: &Engine, query: &Message, budget: &mut usize, client_qtype: QueryType) -> Message {
    let question = query.questions[0].clone();
    let mut next_server_ip = random_root_hint();

    for _ in 0..MAX_LOOKUP_ITERATIONS {
        let packet = match query.into_octets() {
            Ok(packet) => packet,
            Err(error) => {
                tracing::warn!(%question, %error, "could not serialise outbound query");
                return name_error_response(query);
            }
        };

        // a.
        let response = match transport::query(&packet, next_server_ip, UPSTREAM_PORT, transport::DEFAULT_TIMEOUT)
            .instrument(tracing::error_span!("query_upstream", address = %next_server_ip))
            .await
        {
            Ok(response) => response,
            // b.
            Err(error) => {
                tracing::debug!(%question, address = %next_server_ip, %error, "upstream query failed");
                return name_error_response(query);
            }
        };

        match classify_response(query, &response, client_qtype) {
            Step::Terminal(out) => return out,

            // d.
            Step::Answers { mut answers, cname_targets } => {
                for target in cname_targets {
                    if *budget == 0 {
                        tracing::debug!(%question, "hit the recursive lookup cap while following a CNAME chain");
                        return name_error_response(query);
                    }
                    *budget -= 1;

                    let requery_type = if engine.config.fix_cname_requery_type {
                        client_qtype
                    } else {
                        QueryType::Record(RecordType::CNAME)
                    };
                    let sub_question = Question {
                        name: target,
                        qtype: requery_type,
                        qclass: QueryClass::Record(RecordClass::IN),
                    };
                    let sub_query = Message::from_question(query.header.id, sub_question);
                    let sub_response = lookup(engine, &sub_query, budget, client_qtype).await;
                    answers.extend(sub_response.answers);
                }

                let mut out = query.make_response();
                out.header.recursion_available = true;
                out.answers = answers;
                return out;
            }

            // e.
            Step::FollowGlue(address) => {
                next_server_ip = address;
                continue;
            }

            // f.
            Step::FollowDelegation { name, authority } => {
                if *budget == 0 {
                    tracing::debug!(%question, "hit the recursive lookup cap while resolving a glue-less delegation");
                    let mut out = name_error_response(query);
                    out.authority = authority;
                    return out;
                }
                *budget -= 1;

                let ns_question = Question {
                    name,
                    qtype: QueryType::Record(RecordType::A),
                    qclass: QueryClass::Record(RecordClass::IN),
                };
                let ns_query = Message::from_question(query.header.id, ns_question);
                let ns_response = lookup(engine, &ns_query, budget, client_qtype).await;

                match ns_response.answers.choose(&mut rand::thread_rng()) {
                    Some(answer) => {
                        if let RecordTypeWithData::A { address } = answer.rtype_with_data {
                            next_server_ip = address;
                            continue;
                        }
                        return name_error_response(query);
                    }
                    None => return name_error_response(query),
                }
            }
        }
    }

    tracing::debug!(%question, "hit the outer iteration cap");
    name_error_response(query)
}

/// The outcome of looking at a single upstream response.
enum Step {
    /// A fully-formed response to hand back as `lookup`'s own result,
    /// no further upstream traffic needed.
    Terminal(Message),
    /// An answer, plus any CNAME targets still needing a recursive
    /// sub-`lookup` before the answer set is complete.
    Answers {
        answers: Vec<ResourceRecord>,
        cname_targets: Vec<DomainName>,
    },
    /// Follow a glue IP and continue the same loop.
    FollowGlue(Ipv4Addr),
    /// Resolve `name` for type A via a recursive `lookup`, then
    /// continue the same loop at whatever address comes back.
    /// `authority` is carried along only so a budget-exhausted dead
    /// end can still report it.
    FollowDelegation {
        name: DomainName,
        authority: Vec<ResourceRecord>,
    },
}

/// Pure decision function: given the query that was sent and the
/// response that came back, decide what `lookup` should do about it.
/// Contains no I/O and no recursion, so it is unit-testable directly.
fn classify_response(query: &Message, response: &Message, client_qtype: QueryType) -> Step {
    // c.
    if response.header.rcode == Rcode::NameError {
        let mut out = response.clone();
        out.header.is_response = true;
        out.header.is_authoritative = false;
        out.header.recursion_available = true;
        out.header.rcode = Rcode::NameError;
        return Step::Terminal(out);
    }

    // d.
    if !response.answers.is_empty() {
        let cname_targets = if client_qtype == QueryType::Record(RecordType::CNAME) {
            Vec::new()
        } else {
            response
                .answers
                .iter()
                .filter_map(|rr| match &rr.rtype_with_data {
                    RecordTypeWithData::CNAME { cname } => Some(cname.clone()),
                    _ => None,
                })
                .collect()
        };
        return Step::Answers {
            answers: response.answers.clone(),
            cname_targets,
        };
    }

    // e.
    if !response.additional.is_empty() {
        let glue: Vec<&ResourceRecord> = response
            .additional
            .iter()
            .filter(|rr| matches!(rr.rtype_with_data, RecordTypeWithData::A { .. }))
            .collect();

        return match glue.choose(&mut rand::thread_rng()) {
            Some(chosen) => match chosen.rtype_with_data {
                RecordTypeWithData::A { address } => Step::FollowGlue(address),
                _ => Step::Terminal(name_error_response(query)),
            },
            None => Step::Terminal(name_error_response(query)),
        };
    }

    // f.
    if !response.authority.is_empty() {
        let candidates: Vec<ResourceRecord> = response
            .authority
            .iter()
            .filter_map(|rr| {
                let target_name = authority_target_name(rr)?;
                if is_plausible_delegation_target(&target_name) {
                    let mut candidate = rr.clone();
                    candidate.name = target_name;
                    Some(candidate)
                } else {
                    None
                }
            })
            .collect();

        return match candidates.choose(&mut rand::thread_rng()) {
            Some(chosen) if chosen.rtype_with_data.rtype() == RecordType::SOA => {
                let mut out = query.make_response();
                out.header.rcode = Rcode::NameError;
                out.authority = response.authority.clone();
                out.additional = response.additional.clone();
                Step::Terminal(out)
            }
            Some(chosen) => Step::FollowDelegation {
                name: chosen.name.clone(),
                authority: response.authority.clone(),
            },
            None => {
                let mut out = name_error_response(query);
                out.authority = response.authority.clone();
                Step::Terminal(out)
            }
        };
    }

    // g.
    let mut out = name_error_response(query);
    out.authority = response.authority.clone();
    Step::Terminal(out)
}

/// The RR's rdata's domain-name target, if it has one: the NS's
/// target host, the CNAME's target, or the SOA's primary master. An
/// authority section in practice carries NS or SOA records, and this
/// generalizes cleanly to both.
fn authority_target_name(rr: &ResourceRecord) -> Option<DomainName> {
    match &rr.rtype_with_data {
        RecordTypeWithData::NS { nsdname } => Some(nsdname.clone()),
        RecordTypeWithData::SOA { mname, .. } => Some(mname.clone()),
        RecordTypeWithData::CNAME { cname } => Some(cname.clone()),
        _ => None,
    }
}

/// A delegation target must look like a real hostname: alphanumerics
/// and hyphens, with a TLD of at least two alphabetic characters (the
/// per-label length limit is already enforced by `Label`'s own
/// invariant).
fn is_plausible_delegation_target(name: &DomainName) -> bool {
    if name.labels.is_empty() {
        return false;
    }
    let all_labels_alphanumeric_or_hyphen = name
        .labels
        .iter()
        .all(|label| !label.is_empty() && label.octets().iter().all(|&b| b.is_ascii_alphanumeric() || b == b'-'));
    if !all_labels_alphanumeric_or_hyphen {
        return false;
    }

    let tld = name.labels.last().expect("checked non-empty above");
    tld.len() >= 2 && tld.octets().iter().all(u8::is_ascii_alphabetic)
}

fn name_error_response(query: &Message) -> Message {
    let mut response = query.make_response();
    response.header.recursion_available = true;
    response.header.rcode = Rcode::NameError;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::*;

    fn a_question(name: &str) -> Question {
        Question {
            name: domain(name),
            qtype: QueryType::Record(RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        }
    }

    fn base_query(name: &str) -> Message {
        Message::from_question(0x04D2, a_question(name))
    }

    #[test]
    fn delegation_target_validity_accepts_ordinary_hostnames() {
        let name = DomainName::from_dotted_string("ns1.example.com.").unwrap();
        assert!(is_plausible_delegation_target(&name));
    }

    #[test]
    fn delegation_target_validity_rejects_empty_name() {
        assert!(!is_plausible_delegation_target(&DomainName::root_domain()));
    }

    #[test]
    fn delegation_target_validity_rejects_short_tld() {
        let name = DomainName::from_dotted_string("ns1.example.x.").unwrap();
        assert!(!is_plausible_delegation_target(&name));
    }

    #[test]
    fn delegation_target_validity_rejects_numeric_tld() {
        let name = DomainName::from_dotted_string("ns1.example.123.").unwrap();
        assert!(!is_plausible_delegation_target(&name));
    }

    #[test]
    fn delegation_target_validity_accepts_hyphenated_labels() {
        let name = DomainName::from_dotted_string("a-gtld-servers.net.").unwrap();
        assert!(is_plausible_delegation_target(&name));
    }

    #[test]
    fn classifies_name_error_as_terminal() {
        let query = base_query("example.com.");
        let mut response = query.make_response();
        response.header.rcode = Rcode::NameError;

        match classify_response(&query, &response, QueryType::Record(RecordType::A)) {
            Step::Terminal(out) => {
                assert_eq!(out.header.rcode, Rcode::NameError);
                assert!(out.header.is_response);
                assert!(out.header.recursion_available);
            }
            _ => panic!("expected a terminal NAME_ERROR response"),
        }
    }

    #[test]
    fn classifies_plain_answer() {
        let query = base_query("example.com.");
        let mut response = query.make_response();
        response
            .answers
            .push(a_record("example.com.", "93.184.216.34".parse().unwrap()));

        match classify_response(&query, &response, QueryType::Record(RecordType::A)) {
            Step::Answers { answers, cname_targets } => {
                assert_eq!(answers.len(), 1);
                assert!(cname_targets.is_empty());
            }
            _ => panic!("expected Answers"),
        }
    }

    #[test]
    fn classifies_cname_answer_with_a_non_cname_client_qtype() {
        let query = base_query("www.example.com.");
        let mut response = query.make_response();
        response.answers.push(cname_record("www.example.com.", "example.com."));

        match classify_response(&query, &response, QueryType::Record(RecordType::A)) {
            Step::Answers { answers, cname_targets } => {
                assert_eq!(answers.len(), 1);
                assert_eq!(cname_targets, vec![domain("example.com.")]);
            }
            _ => panic!("expected Answers with a pending CNAME target"),
        }
    }

    #[test]
    fn does_not_chase_cname_when_client_qtype_is_cname() {
        let query = base_query("www.example.com.");
        let mut response = query.make_response();
        response.answers.push(cname_record("www.example.com.", "example.com."));

        match classify_response(&query, &response, QueryType::Record(RecordType::CNAME)) {
            Step::Answers { cname_targets, .. } => assert!(cname_targets.is_empty()),
            _ => panic!("expected Answers"),
        }
    }

    #[test]
    fn classifies_glue() {
        let query = base_query("example.com.");
        let mut response = query.make_response();
        response
            .additional
            .push(a_record("ns.example.com.", "203.0.113.5".parse().unwrap()));

        match classify_response(&query, &response, QueryType::Record(RecordType::A)) {
            Step::FollowGlue(address) => assert_eq!(address, "203.0.113.5".parse::<Ipv4Addr>().unwrap()),
            _ => panic!("expected FollowGlue"),
        }
    }

    #[test]
    fn classifies_glueless_delegation() {
        let query = base_query("example.com.");
        let mut response = query.make_response();
        response.authority.push(ns_record("example.com.", "ns.example.com."));

        match classify_response(&query, &response, QueryType::Record(RecordType::A)) {
            Step::FollowDelegation { name, .. } => assert_eq!(name, domain("ns.example.com.")),
            _ => panic!("expected FollowDelegation"),
        }
    }

    #[test]
    fn classifies_soa_authority_as_nxdomain() {
        let query = base_query("nonexistent.com.");
        let mut response = query.make_response();
        response
            .authority
            .push(soa_record("com.", "a.gtld-servers.net.", "nstld.verisign-grs.com."));

        match classify_response(&query, &response, QueryType::Record(RecordType::A)) {
            Step::Terminal(out) => {
                assert_eq!(out.header.rcode, Rcode::NameError);
                assert_eq!(out.authority.len(), 1);
            }
            _ => panic!("expected a terminal NXDOMAIN/SOA response"),
        }
    }

    #[test]
    fn classifies_empty_response_as_dead_end() {
        let query = base_query("example.com.");
        let response = query.make_response();

        match classify_response(&query, &response, QueryType::Record(RecordType::A)) {
            Step::Terminal(out) => assert_eq!(out.header.rcode, Rcode::NameError),
            _ => panic!("expected a terminal dead end"),
        }
    }

    #[test]
    fn classifies_authority_with_invalid_target_name_as_dead_end() {
        let query = base_query("example.com.");
        let mut response = query.make_response();
        // a single-character TLD fails the domain-validity check
        response.authority.push(ns_record("example.com.", "ns.example.x."));

        match classify_response(&query, &response, QueryType::Record(RecordType::A)) {
            Step::Terminal(out) => {
                assert_eq!(out.header.rcode, Rcode::NameError);
                assert_eq!(out.authority.len(), 1, "original authorities are still carried through");
            }
            _ => panic!("expected a terminal dead end"),
        }
    }
}
