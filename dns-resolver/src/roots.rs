//! The 13 IANA root name servers, used as the entry point for every
//! fresh iterative walk.  Read-only, compiled in: see
//! <https://www.iana.org/domains/root/servers>.

use std::net::Ipv4Addr;

pub const ROOT_HINTS: [(&str, Ipv4Addr); 13] = [
    ("a.root-servers.net", Ipv4Addr::new(198, 41, 0, 4)),
    ("b.root-servers.net", Ipv4Addr::new(199, 9, 14, 201)),
    ("c.root-servers.net", Ipv4Addr::new(192, 33, 4, 12)),
    ("d.root-servers.net", Ipv4Addr::new(199, 7, 91, 13)),
    ("e.root-servers.net", Ipv4Addr::new(192, 203, 230, 10)),
    ("f.root-servers.net", Ipv4Addr::new(192, 5, 5, 241)),
    ("g.root-servers.net", Ipv4Addr::new(192, 112, 36, 4)),
    ("h.root-servers.net", Ipv4Addr::new(198, 97, 190, 53)),
    ("i.root-servers.net", Ipv4Addr::new(192, 36, 148, 17)),
    ("j.root-servers.net", Ipv4Addr::new(192, 58, 128, 30)),
    ("k.root-servers.net", Ipv4Addr::new(193, 0, 14, 129)),
    ("l.root-servers.net", Ipv4Addr::new(199, 7, 83, 42)),
    ("m.root-servers.net", Ipv4Addr::new(202, 12, 27, 33)),
];

/// Pick a root hint uniformly at random: load spread and resilience to
/// a single poisoned hint, not a cryptographic requirement.
pub fn random_root_hint() -> Ipv4Addr {
    use rand::seq::SliceRandom;
    ROOT_HINTS
        .choose(&mut rand::thread_rng())
        .expect("ROOT_HINTS is never empty")
        .1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_thirteen_roots() {
        assert_eq!(ROOT_HINTS.len(), 13);
    }

    #[test]
    fn random_hint_is_one_of_the_roots() {
        let picked = random_root_hint();
        assert!(ROOT_HINTS.iter().any(|(_, ip)| *ip == picked));
    }
}
