//! Builders for synthetic image byte streams used by the unit tests.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage};

use crate::jpeg::{JpegStream, Segment};

/// A length-prefixed marker segment.
pub fn app_segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, marker];
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// A structurally valid baseline JPEG skeleton:
/// SOI, APP0 JFIF (18 bytes, so `extra` starts at offset 20), `extra`, DQT, SOF0,
/// DHT, SOS, scan data with a stuffed byte and an RST marker, EOI.
pub fn minimal_jpeg(extra: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend(app_segment(
        0xE0,
        &[b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0],
    ));
    for segment in extra {
        out.extend_from_slice(segment);
    }

    let mut dqt = vec![0u8];
    dqt.extend([1u8; 64]);
    out.extend(app_segment(0xDB, &dqt));

    out.extend(app_segment(0xC0, &[8, 0, 1, 0, 1, 1, 1, 0x11, 0]));

    let mut dht = vec![0x00, 1];
    dht.extend([0u8; 15]);
    dht.push(0);
    out.extend(app_segment(0xC4, &dht));

    out.extend(app_segment(0xDA, &[1, 1, 0x00, 0, 0x3F, 0]));
    out.extend_from_slice(&[0x12, 0x34, 0xFF, 0x00, 0x56, 0xFF, 0xD0, 0x78, 0x9A]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// One IIM dataset with a standard two-byte length.
pub fn iim_dataset(record: u8, dataset: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![0x1C, record, dataset];
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
    out
}

/// One 8BIM image resource block, padded the way Photoshop pads it.
pub fn resource_block(resource_id: u16, name: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = b"8BIM".to_vec();
    out.extend_from_slice(&resource_id.to_be_bytes());
    out.push(name.len() as u8);
    out.extend_from_slice(name);
    if (name.len() + 1) % 2 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 != 0 {
        out.push(0);
    }
    out
}

/// An APP13 payload holding the given resource blocks.
pub fn photoshop_payload(blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = b"Photoshop 3.0\0".to_vec();
    for block in blocks {
        out.extend_from_slice(block);
    }
    out
}

/// An APP1 payload holding an XMP packet.
pub fn xmp_payload(packet: &str) -> Vec<u8> {
    [b"http://ns.adobe.com/xap/1.0/\0".as_slice(), packet.as_bytes()].concat()
}

/// A small gradient image encoded by the `image` crate.
pub fn encoded_image(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let raster = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(raster)
        .write_to(&mut out, format)
        .expect("encode test image");
    out.into_inner()
}

/// `data` with APPn segments spliced in after its leading APPn run.
pub fn with_app_segments(data: &[u8], segments: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let extra = segments
        .iter()
        .map(|(marker, payload)| Segment::app(*marker, payload.clone()).expect("segment fits"))
        .collect();
    JpegStream::parse(data)
        .expect("parse JPEG")
        .insert_after_leading_app_run(extra)
        .to_bytes()
}

/// An APP1 EXIF payload (big-endian TIFF): Make "Canon", the given Orientation and a
/// GPS IFD at N 48deg 51' 30", E 2deg 17' 40".
pub fn exif_payload(orientation: u16) -> Vec<u8> {
    fn entry(out: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: [u8; 4]) {
        out.extend_from_slice(&tag.to_be_bytes());
        out.extend_from_slice(&kind.to_be_bytes());
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(&value);
    }
    const ASCII: u16 = 2;
    const SHORT: u16 = 3;
    const LONG: u16 = 4;
    const RATIONAL: u16 = 5;

    // IFD0 at 8 (3 entries, ends at 50), "Canon\0" at 50, GPS IFD at 56 (4 entries,
    // ends at 110), latitude rationals at 110, longitude rationals at 134
    let mut tiff = b"MM\0\x2A".to_vec();
    tiff.extend_from_slice(&8u32.to_be_bytes());

    tiff.extend_from_slice(&3u16.to_be_bytes());
    entry(&mut tiff, 0x010F, ASCII, 6, 50u32.to_be_bytes());
    let [hi, lo] = orientation.to_be_bytes();
    entry(&mut tiff, 0x0112, SHORT, 1, [hi, lo, 0, 0]);
    entry(&mut tiff, 0x8825, LONG, 1, 56u32.to_be_bytes());
    tiff.extend_from_slice(&0u32.to_be_bytes());
    tiff.extend_from_slice(b"Canon\0");

    tiff.extend_from_slice(&4u16.to_be_bytes());
    entry(&mut tiff, 0x0001, ASCII, 2, *b"N\0\0\0");
    entry(&mut tiff, 0x0002, RATIONAL, 3, 110u32.to_be_bytes());
    entry(&mut tiff, 0x0003, ASCII, 2, *b"E\0\0\0");
    entry(&mut tiff, 0x0004, RATIONAL, 3, 134u32.to_be_bytes());
    tiff.extend_from_slice(&0u32.to_be_bytes());

    for value in [48u32, 51, 30, 2, 17, 40] {
        tiff.extend_from_slice(&value.to_be_bytes());
        tiff.extend_from_slice(&1u32.to_be_bytes());
    }
    debug_assert_eq!(tiff.len(), 158);

    [b"Exif\0\0".as_slice(), &tiff].concat()
}
