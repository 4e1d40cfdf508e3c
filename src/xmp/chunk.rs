//! Splitting a packet across APP1 segments.
//!
//! This is a plain byte split: every segment repeats the standard XMP signature and
//! carries the next slice of the packet, and readers concatenate the slices in stream
//! order. It is not the GUID/offset based extended XMP scheme, so other tools will
//! only see the first slice as an (incomplete) packet.

use crate::jpeg::{MAX_PAYLOAD, XMP_SIGNATURE};

/// Packet bytes that fit in one APP1 segment after the signature.
pub const MAX_CHUNK: usize = MAX_PAYLOAD - XMP_SIGNATURE.len();

/// Cut a packet into APP1 payloads, each prefixed with the XMP signature.
pub fn split_packet(packet: &[u8]) -> Vec<Vec<u8>> {
    let payloads: Vec<Vec<u8>> = packet
        .chunks(MAX_CHUNK)
        .map(|chunk| [XMP_SIGNATURE, chunk].concat())
        .collect();
    if payloads.len() > 1 {
        log::debug!(
            "XMP packet of {} bytes split across {} APP1 segments",
            packet.len(),
            payloads.len()
        );
    }
    payloads
}

/// Concatenate the packet slices of XMP APP1 payloads. Payloads without the
/// signature are skipped. Returns `None` when no payload qualifies.
pub fn join_payloads<'a>(payloads: impl IntoIterator<Item = &'a [u8]>) -> Option<Vec<u8>> {
    let mut packet: Option<Vec<u8>> = None;
    for payload in payloads {
        if let Some(slice) = payload.strip_prefix(XMP_SIGNATURE) {
            packet.get_or_insert_with(Vec::new).extend_from_slice(slice);
        }
    }
    packet
}
