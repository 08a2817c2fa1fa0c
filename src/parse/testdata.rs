//! Sample documents shared by the unit tests.

use crate::utils::compute_digest;

pub(crate) const CONSENSUS: &str = "\
network-status-version 3
vote-status consensus
valid-after 2024-01-01 00:00:00
dir-source moria1 D586D18309DED4CD6D57C18FDB97EFA96D330566 128.31.0.34 128.31.0.34 9131 9101
contact 1024D/28988BF5 arma mit edu
vote-digest 1A2B3C4D5E6F708192A3B4C5D6E7F80912A3B4C5
dir-source tor26 14C131DFC5C6F93646BE72FA1401C02A8DF2E8B4 86.59.21.38 86.59.21.38 80 443
contact Peter Palfrader
r relayA AAoQ1DAR6kkoo19hBAX5K0QztNw 0JG7r9uHRDC6T1EYQ4E9KfMTDS0 2023-12-31 23:10:00 10.0.0.1 9001 0
s Fast Guard Running
v Tor 0.4.8.10
w Bandwidth=1200
p accept 80,443
r relayB ABjzdIFyKrUvfQ5Rzz6v8TqWEvA 7hUAB8kfkqqK1D3s1hgd6cqy0Ko 2023-12-31 23:20:00 10.0.0.2 443 80
s Fast Guard Running
directory-footer
directory-signature D586D18309DED4CD6D57C18FDB97EFA96D330566 E5A2D0A8D4E3A1E1D1B4C88F5A1C9A0FCB0B1C2D
-----BEGIN SIGNATURE-----
-----END SIGNATURE-----
";

pub(crate) const SERVER_DESCRIPTOR: &str = "\
router relayA 10.0.0.1 9001 0 0
identity-ed25519
-----BEGIN ED25519 CERT-----
AQQABvmKAb7dvK1u0wXFMvE6z5hJ5g1wE1v7jXqjW4Hfp0vV
-----END ED25519 CERT-----
platform Tor 0.4.8.10 on Linux
proto Cons=1-2 Desc=1-2 DirCache=2 Link=1-5 Relay=1-4
published 2024-01-01 00:00:00
fingerprint 000A 10D4 3011 EA49 28A3 5F61 0405 F92B 4433 B4DC
uptime 86400
bandwidth 1073741824 1073741824 2500000
extra-info-digest 5D2B6F0AC4FA1B5B8B1D32E0C2A0E2C3D4E5F601 fC+Dk3yt2ZkMC8Oq1X8uR2aDCq1GkIYUoEmvzrNj4Ew
onion-key
-----BEGIN RSA PUBLIC KEY-----
MIGJAoGBAL
-----END RSA PUBLIC KEY-----
reject *:*
router-signature
-----BEGIN SIGNATURE-----
c2lnbmF0dXJl
-----END SIGNATURE-----
";

pub(crate) const EXTRA_INFO: &str = "\
extra-info relayA 000A10D43011EA4928A35F610405F92B4433B4DC
identity-ed25519
-----BEGIN ED25519 CERT-----
AQQABvmKAb7dvK1u0wXFMvE6z5hJ5g1wE1v7jXqjW4Hfp0vV
-----END ED25519 CERT-----
published 2024-01-01 00:00:00
write-history 2023-12-31 23:45:00 (900 s) 10,20,30,40
read-history 2023-12-31 23:45:00 (900 s) 1,2,3
dirreq-write-history 2023-12-24 00:00:00 (900 s) 5,6
dirreq-read-history 2023-12-23 23:59:59 (900 s) 7,8
dirreq-stats-end 2023-12-31 20:00:00 (86400 s)
dirreq-v3-ips us=8,de=8
dirreq-v3-reqs us8,de8
dirreq-v3-share 50.00%
router-sig-ed25519 c2lnbmF0dXJl
router-signature
-----BEGIN SIGNATURE-----
c2lnbmF0dXJl
-----END SIGNATURE-----
";

/// Encodes a hex digest the way status entries carry it: base64 without padding.
pub(crate) fn status_entry_base64(hex_digest: &str) -> String {
    let bytes = hex::decode(hex_digest).unwrap();
    base64::encode(bytes).trim_end_matches('=').to_string()
}

/// The server descriptor, referencing the digest of the sample extra-info descriptor.
pub(crate) fn linked_server_descriptor() -> String {
    let extra_digest = compute_digest(EXTRA_INFO.as_bytes(), "extra-info ", "\nrouter-signature\n").unwrap();
    SERVER_DESCRIPTOR.replace(
        "5D2B6F0AC4FA1B5B8B1D32E0C2A0E2C3D4E5F601",
        &extra_digest.to_uppercase(),
    )
}

/// A consensus whose first entry references the given server descriptor digest.
pub(crate) fn consensus_referencing(server_digest: &str) -> String {
    CONSENSUS.replacen("0JG7r9uHRDC6T1EYQ4E9KfMTDS0", &status_entry_base64(server_digest), 1)
}
