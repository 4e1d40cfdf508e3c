use super::{IptcStore, OpaqueBlock, RawDataset, IPTC_RESOURCE_ID, dataset};
use crate::error::{Error, Result};
use crate::jpeg::{MAX_PAYLOAD, PHOTOSHOP_SIGNATURE};

const BIM_SIGNATURE: &[u8] = b"8BIM";
const TAG_MARKER: u8 = 0x1C;
const ENVELOPE_RECORD: u8 = 1;
const APPLICATION_RECORD: u8 = 2;
const CODED_CHARACTER_SET: u8 = 90;
const UTF8_DECLARATION: &[u8] = b"\x1B%G";
/// Application record datasets decoded as text. Any other record 2 dataset (object
/// preview data, category codes ...) is kept as raw bytes.
const TEXT_DATASETS: [u8; 16] = [
    dataset::OBJECT_NAME,
    dataset::KEYWORDS,
    dataset::SPECIAL_INSTRUCTIONS,
    dataset::DATE_CREATED,
    dataset::BYLINE,
    dataset::BYLINE_TITLE,
    dataset::CITY,
    dataset::PROVINCE_STATE,
    dataset::COUNTRY,
    dataset::HEADLINE,
    dataset::SOURCE,
    dataset::COPYRIGHT_NOTICE,
    dataset::CONTACT,
    dataset::CAPTION_ABSTRACT,
    dataset::WRITER_EDITOR,
    dataset::IMAGE_ORIENTATION,
];
/// Record version 4, written when the source carried none.
const DEFAULT_RECORD_VERSION: [u8; 2] = [0x00, 0x04];

fn even(n: usize) -> usize {
    n + (n & 1)
}

fn truncated(what: &str, offset: usize) -> Error {
    Error::iptc(format!("truncated {what} at offset {offset}"))
}

/// Decode an APP13 payload (`"Photoshop 3.0\0"` followed by 8BIM resource blocks).
pub fn decode(payload: &[u8]) -> Result<IptcStore> {
    decode_blocks(payload, false)
}

/// Like [`decode`], but an unreadable IIM stream only costs its records. The other
/// resource blocks and the slot of the IIM block are kept, so a later encode writes
/// fresh records in place of the broken ones. Fails when the resource blocks
/// themselves cannot be walked.
pub fn decode_lossy(payload: &[u8]) -> Result<IptcStore> {
    decode_blocks(payload, true)
}

fn decode_blocks(payload: &[u8], lossy: bool) -> Result<IptcStore> {
    let data = payload
        .strip_prefix(PHOTOSHOP_SIGNATURE)
        .ok_or_else(|| Error::iptc("missing Photoshop 3.0 signature"))?;

    let mut store = IptcStore::new();
    let mut pos = 0;
    while pos < data.len() {
        // Some writers zero-pad the segment after the last block
        if data[pos..].iter().all(|&b| b == 0) {
            break;
        }
        let block = read_block(data, &mut pos)?;
        if block.resource_id == IPTC_RESOURCE_ID && store.iptc_slot.is_none() {
            let mut iim = IptcStore::new();
            match decode_iim(&block.data, &mut iim) {
                Ok(()) => {
                    store.records = iim.records;
                    store.raw = iim.raw;
                }
                Err(e) if lossy => log::warn!("Dropping unreadable IIM records: {e}"),
                Err(e) => return Err(e),
            }
            store.iptc_slot = Some((store.blocks.len(), block.name));
        } else {
            store.blocks.push(block);
        }
    }

    log::debug!(
        "Decoded IPTC: {} records, {} raw datasets, {} other resource blocks",
        store.records.len(),
        store.raw.len(),
        store.blocks.len()
    );
    Ok(store)
}

fn read_block(data: &[u8], pos: &mut usize) -> Result<OpaqueBlock> {
    let start = *pos;
    let header = data
        .get(start..start + 6)
        .ok_or_else(|| truncated("resource header", start))?;
    if &header[..4] != BIM_SIGNATURE {
        return Err(Error::iptc(format!(
            "expected 8BIM resource signature at offset {start}"
        )));
    }
    let resource_id = u16::from_be_bytes([header[4], header[5]]);

    // Pascal string name, length byte included, padded to even
    let mut cursor = start + 6;
    let name_len = *data
        .get(cursor)
        .ok_or_else(|| truncated("resource name", cursor))? as usize;
    let name = data
        .get(cursor + 1..cursor + 1 + name_len)
        .ok_or_else(|| truncated("resource name", cursor))?
        .to_vec();
    cursor += even(1 + name_len);

    let len_bytes = data
        .get(cursor..cursor + 4)
        .ok_or_else(|| truncated("resource length", cursor))?;
    let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    cursor += 4;

    let block_data = data
        .get(cursor..cursor + len)
        .ok_or_else(|| truncated("resource data", cursor))?
        .to_vec();
    // The pad byte of the final block is sometimes missing
    *pos = (cursor + even(len)).min(data.len());

    Ok(OpaqueBlock {
        resource_id,
        name,
        data: block_data,
    })
}

fn decode_iim(data: &[u8], store: &mut IptcStore) -> Result<()> {
    let mut pos = 0;
    let mut utf8_declared = false;
    let mut text: Vec<(u8, Vec<u8>)> = Vec::new();

    while pos < data.len() {
        if data[pos] != TAG_MARKER {
            if data[pos..].iter().all(|&b| b == 0) {
                break;
            }
            return Err(Error::iptc(format!(
                "expected dataset marker 0x1C at offset {pos}, found 0x{:02X}",
                data[pos]
            )));
        }
        let header = data
            .get(pos..pos + 5)
            .ok_or_else(|| truncated("dataset header", pos))?;
        let (record, number) = (header[1], header[2]);
        let mut len = u16::from_be_bytes([header[3], header[4]]) as usize;
        pos += 5;

        if len & 0x8000 != 0 {
            // Extended dataset: the low 15 bits give the size of the length field
            let count = len & 0x7FFF;
            if count == 0 || count > 4 {
                return Err(Error::iptc(format!(
                    "unsupported extended length field of {count} bytes at offset {pos}"
                )));
            }
            let bytes = data
                .get(pos..pos + count)
                .ok_or_else(|| truncated("extended length", pos))?;
            len = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
            pos += count;
        }

        let value = data
            .get(pos..pos + len)
            .ok_or_else(|| truncated("dataset value", pos))?;
        pos += len;

        if record == APPLICATION_RECORD && TEXT_DATASETS.contains(&number) {
            text.push((number, value.to_vec()));
        } else {
            if record == ENVELOPE_RECORD && number == CODED_CHARACTER_SET {
                utf8_declared = value == UTF8_DECLARATION;
            }
            store.raw.push(RawDataset {
                record,
                dataset: number,
                value: value.to_vec(),
            });
        }
    }

    for (number, value) in text {
        store.accumulate(number, decode_text(&value, utf8_declared));
    }
    Ok(())
}

/// IIM text is UTF-8 when declared (or when it happens to be valid UTF-8), Latin-1 otherwise.
fn decode_text(value: &[u8], utf8_declared: bool) -> String {
    match std::str::from_utf8(value) {
        Ok(s) => s.to_string(),
        Err(_) if utf8_declared => String::from_utf8_lossy(value).into_owned(),
        Err(_) => value.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Encode a store into a fresh APP13 payload.
///
/// Returns `None` when the store holds nothing worth a segment. Every text value
/// becomes its own dataset, so repeatable fields are written as consecutive datasets.
pub fn encode(store: &IptcStore) -> Result<Option<Vec<u8>>> {
    if store.is_empty() {
        return Ok(None);
    }

    let iim = encode_iim(store);
    let (slot, iim_name) = match &store.iptc_slot {
        Some((slot, name)) => ((*slot).min(store.blocks.len()), name.as_slice()),
        None => (store.blocks.len(), &[][..]),
    };

    let mut out = PHOTOSHOP_SIGNATURE.to_vec();
    for (i, block) in store.blocks.iter().enumerate() {
        if i == slot {
            if let Some(iim) = &iim {
                write_block(&mut out, IPTC_RESOURCE_ID, iim_name, iim);
            }
        }
        write_block(&mut out, block.resource_id, &block.name, &block.data);
    }
    if slot == store.blocks.len() {
        if let Some(iim) = &iim {
            write_block(&mut out, IPTC_RESOURCE_ID, iim_name, iim);
        }
    }

    if out.len() > MAX_PAYLOAD {
        return Err(Error::SegmentTooLarge(out.len()));
    }
    log::debug!("Encoded APP13 payload: {} bytes", out.len());
    Ok(Some(out))
}

fn encode_iim(store: &IptcStore) -> Option<Vec<u8>> {
    if store.records.is_empty() && store.raw.is_empty() {
        return None;
    }

    let needs_utf8 = store
        .records()
        .flat_map(|r| r.values.iter())
        .any(|v| !v.is_ascii());

    let mut envelope: Vec<(u8, &[u8])> = store
        .raw
        .iter()
        .filter(|d| d.record == ENVELOPE_RECORD)
        .filter(|d| !(needs_utf8 && d.dataset == CODED_CHARACTER_SET))
        .map(|d| (d.dataset, d.value.as_slice()))
        .collect();
    if needs_utf8 {
        envelope.push((CODED_CHARACTER_SET, UTF8_DECLARATION));
        envelope.sort_by_key(|(number, _)| *number);
    }

    let mut out = Vec::new();
    for d in store.raw.iter().filter(|d| d.record < ENVELOPE_RECORD) {
        write_dataset(&mut out, d.record, d.dataset, &d.value);
    }
    for (number, value) in envelope {
        write_dataset(&mut out, ENVELOPE_RECORD, number, value);
    }

    let version = store
        .raw
        .iter()
        .find(|d| d.record == APPLICATION_RECORD && d.dataset == dataset::RECORD_VERSION)
        .map(|d| d.value.as_slice())
        .unwrap_or(&DEFAULT_RECORD_VERSION);
    write_dataset(&mut out, APPLICATION_RECORD, dataset::RECORD_VERSION, version);

    // Text records and raw application datasets, merged in dataset order
    let mut application: Vec<(u8, &[u8])> = store
        .records()
        .flat_map(|r| r.values.iter().map(move |v| (r.dataset, v.as_bytes())))
        .chain(
            store
                .raw
                .iter()
                .filter(|d| d.record == APPLICATION_RECORD && d.dataset != dataset::RECORD_VERSION)
                .map(|d| (d.dataset, d.value.as_slice())),
        )
        .collect();
    application.sort_by_key(|(number, _)| *number);
    for (number, value) in application {
        write_dataset(&mut out, APPLICATION_RECORD, number, value);
    }

    for d in store.raw.iter().filter(|d| d.record > APPLICATION_RECORD) {
        write_dataset(&mut out, d.record, d.dataset, &d.value);
    }
    Some(out)
}

fn write_dataset(out: &mut Vec<u8>, record: u8, number: u8, value: &[u8]) {
    out.extend_from_slice(&[TAG_MARKER, record, number]);
    if value.len() <= 0x7FFF {
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    } else {
        out.extend_from_slice(&[0x80, 0x04]);
        out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(value);
}

fn write_block(out: &mut Vec<u8>, resource_id: u16, name: &[u8], data: &[u8]) {
    out.extend_from_slice(BIM_SIGNATURE);
    out.extend_from_slice(&resource_id.to_be_bytes());
    out.push(name.len() as u8);
    out.extend_from_slice(name);
    if (1 + name.len()) % 2 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 != 0 {
        out.push(0);
    }
}
