// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Packet codec: fragments an application message into ordered datagrams and
//! reassembles datagrams back into (sender, endpoint, fragment, …) tuples.
//!
//! Wire framing (spec.md §4.1):
//! `<device>/<endpoint>:<encoding>:<id>:<seq>:<count>\n<fragment-bytes>`

use crate::config::{HEADER_SEPARATOR, MAX_FRAGMENT_PAYLOAD};
use crate::error::{Error, Result};

/// Payload encoding tag, exactly as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// Structured text payload; round-tripped through [`crate::value`].
    Yaml,
    /// Opaque bytes, passed through unchanged.
    Binary,
    /// An encoding tag this build doesn't recognize. Preserved verbatim so a
    /// future/foreign peer's traffic doesn't get dropped outright; decode
    /// only, never produced by `encode`.
    Unknown(String),
}

impl Encoding {
    fn as_wire_str(&self) -> &str {
        match self {
            Self::Yaml => "yaml",
            Self::Binary => "binary",
            Self::Unknown(tag) => tag,
        }
    }

    fn parse(tag: &str) -> Self {
        match tag {
            "yaml" => Self::Yaml,
            "binary" => Self::Binary,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// One decoded datagram: header fields plus its fragment bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub device: String,
    pub endpoint: String,
    pub encoding: Encoding,
    pub id: u64,
    pub seq: u32,
    pub count: u32,
    pub bytes: Vec<u8>,
}

/// Encode an application message into ordered fragments.
///
/// Produces `ceil(max(len, 1) / MAX_FRAGMENT_PAYLOAD)` datagrams; an empty
/// payload still yields exactly one fragment of zero bytes.
///
/// # Errors
/// Returns [`Error::UnsupportedEncoding`] if `encoding` is not `yaml` or
/// `binary` — unknown tags are accepted on decode but rejected here.
pub fn encode(
    device: &str,
    endpoint: &str,
    payload: &[u8],
    encoding: Encoding,
    id: u64,
) -> Result<Vec<Vec<u8>>> {
    if matches!(encoding, Encoding::Unknown(_)) {
        return Err(Error::UnsupportedEncoding(
            encoding.as_wire_str().to_string(),
        ));
    }

    let count = payload.len().div_ceil(MAX_FRAGMENT_PAYLOAD).max(1) as u32;
    let mut datagrams = Vec::with_capacity(count as usize);

    for seq in 0..count {
        let start = seq as usize * MAX_FRAGMENT_PAYLOAD;
        let end = (start + MAX_FRAGMENT_PAYLOAD).min(payload.len());
        let slice = &payload[start..end];

        let header = format!(
            "{}/{}:{}:{}:{}:{}\n",
            device,
            endpoint,
            encoding.as_wire_str(),
            id,
            seq,
            count
        );
        let mut datagram = Vec::with_capacity(header.len() + slice.len());
        datagram.extend_from_slice(header.as_bytes());
        datagram.extend_from_slice(slice);
        datagrams.push(datagram);
    }

    Ok(datagrams)
}

/// Decode one inbound datagram into its header fields and fragment bytes.
///
/// # Errors
/// Returns [`Error::Malformed`] when the terminator is missing, the header
/// does not split into exactly six fields, or a numeric field fails to
/// parse.
pub fn decode(datagram: &[u8]) -> Result<Fragment> {
    let split = datagram
        .iter()
        .position(|&b| b == HEADER_SEPARATOR)
        .ok_or_else(|| Error::Malformed("missing header terminator".to_string()))?;

    let header = std::str::from_utf8(&datagram[..split])
        .map_err(|err| Error::Malformed(err.to_string()))?;
    let bytes = datagram[split + 1..].to_vec();

    let (device, rest) = header
        .split_once('/')
        .ok_or_else(|| Error::Malformed("header missing '/' separator".to_string()))?;

    let fields: Vec<&str> = rest.split(':').collect();
    if fields.len() != 5 {
        return Err(Error::Malformed(format!(
            "expected 6 header fields, got {}",
            fields.len() + 1
        )));
    }
    let endpoint = fields[0];
    let encoding_tag = fields[1];
    let id_str = fields[2];
    let seq_str = fields[3];
    let count_str = fields[4];

    let id: u64 = id_str
        .parse()
        .map_err(|_| Error::Malformed(format!("non-numeric id: {}", id_str)))?;
    let seq: u32 = seq_str
        .parse()
        .map_err(|_| Error::Malformed(format!("non-numeric seq: {}", seq_str)))?;
    let count: u32 = count_str
        .parse()
        .map_err(|_| Error::Malformed(format!("non-numeric count: {}", count_str)))?;
    if count == 0 {
        return Err(Error::Malformed("fragment count must be >= 1".to_string()));
    }

    Ok(Fragment {
        device: device.to_string(),
        endpoint: endpoint.to_string(),
        encoding: Encoding::parse(encoding_tag),
        id,
        seq,
        count,
        bytes,
    })
}

/// ID comparison rule (spec.md §4.1): a newly received id replaces the
/// stored one when it's strictly greater, or when the two differ by more
/// than [`crate::config::ID_RESET_THRESHOLD`] (sender-restart reset clause).
pub fn accepts_id(stored: u64, new: u64) -> bool {
    let stored = stored as i64;
    let new = new as i64;
    new > stored || (new - stored).abs() > crate::config::ID_RESET_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single_fragment() {
        let payload = b"hello";
        let datagrams = encode("dev", "ep", payload, Encoding::Binary, 3).unwrap();
        assert_eq!(datagrams.len(), 1);

        let frag = decode(&datagrams[0]).unwrap();
        assert_eq!(frag.device, "dev");
        assert_eq!(frag.endpoint, "ep");
        assert_eq!(frag.encoding, Encoding::Binary);
        assert_eq!(frag.id, 3);
        assert_eq!(frag.seq, 0);
        assert_eq!(frag.count, 1);
        assert_eq!(frag.bytes, payload);
    }

    #[test]
    fn empty_payload_yields_one_zero_length_fragment() {
        let datagrams = encode("dev", "ep", b"", Encoding::Binary, 0).unwrap();
        assert_eq!(datagrams.len(), 1);
        let frag = decode(&datagrams[0]).unwrap();
        assert_eq!(frag.count, 1);
        assert!(frag.bytes.is_empty());
    }

    #[test]
    fn fragment_counts_match_corner_cases() {
        for (len, expected) in [
            (0usize, 1u32),
            (1, 1),
            (999, 1),
            (1000, 1),
            (1001, 2),
            (2000, 2),
            (2001, 3),
        ] {
            let payload = vec![0u8; len];
            let datagrams = encode("dev", "ep", &payload, Encoding::Binary, 0).unwrap();
            assert_eq!(datagrams.len() as u32, expected, "len={}", len);
        }
    }

    #[test]
    fn concatenated_fragments_equal_original_payload() {
        let payload: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        let datagrams = encode("dev", "ep", &payload, Encoding::Binary, 7).unwrap();
        let mut reassembled = Vec::new();
        for (seq, datagram) in datagrams.iter().enumerate() {
            let frag = decode(datagram).unwrap();
            assert_eq!(frag.seq as usize, seq);
            reassembled.extend_from_slice(&frag.bytes);
        }
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn rejects_unsupported_encoding_tag() {
        let err = encode("dev", "ep", b"x", Encoding::Unknown("zstd".to_string()), 0);
        assert!(matches!(err, Err(Error::UnsupportedEncoding(_))));
    }

    #[test]
    fn decode_preserves_unknown_encoding_verbatim() {
        let datagram = b"dev/ep:zstd:0:0:1\nabc".to_vec();
        let frag = decode(&datagram).unwrap();
        assert_eq!(frag.encoding, Encoding::Unknown("zstd".to_string()));
    }

    #[test]
    fn decode_rejects_missing_terminator() {
        let datagram = b"dev/ep:binary:0:0:1".to_vec();
        assert!(matches!(decode(&datagram), Err(Error::Malformed(_))));
    }

    #[test]
    fn decode_rejects_non_numeric_id() {
        let datagram = b"dev/ep:binary:x:0:1\n".to_vec();
        assert!(matches!(decode(&datagram), Err(Error::Malformed(_))));
    }

    #[test]
    fn id_comparison_rule() {
        assert!(accepts_id(5, 6)); // strictly greater
        assert!(!accepts_id(5, 5)); // equal, rejected
        assert!(!accepts_id(10, 3)); // 7 less, rejected
        assert!(accepts_id(102, 0)); // reset clause: |0-102| > 10
    }
}
