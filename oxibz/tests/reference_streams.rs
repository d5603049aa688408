//! Decoding streams produced by the reference bzip2 implementation.

use oxibz::{BzDecoder, BzError, CrcKind, DecompressStatus, decompress};
use std::io::Cursor;

/// `"hello world\n" * 3` at level 9.
const HELLO_BZ2: [u8; 56] = [
    0x42, 0x5a, 0x68, 0x39, 0x31, 0x41, 0x59, 0x26, 0x53, 0x59, 0xa3, 0x54, 0x56, 0x92, 0x00, 0x00,
    0x07, 0x51, 0x80, 0x00, 0x10, 0x40, 0x00, 0x06, 0x44, 0x90, 0x80, 0x20, 0x00, 0x22, 0xbf, 0xd5,
    0x43, 0x4f, 0x44, 0x20, 0xc9, 0x88, 0xe2, 0x22, 0x29, 0x6b, 0x56, 0x98, 0x8c, 0x7c, 0x5d, 0xc9,
    0x14, 0xe1, 0x42, 0x42, 0x8d, 0x51, 0x5a, 0x48,
];

/// `"The quick brown fox jumps over the lazy dog. " * 20` at level 1.
const FOX_BZ2: [u8; 124] = [
    0x42, 0x5a, 0x68, 0x31, 0x31, 0x41, 0x59, 0x26, 0x53, 0x59, 0x86, 0x01, 0xee, 0xcc, 0x00, 0x00,
    0x6d, 0x93, 0x80, 0x40, 0x01, 0x04, 0x00, 0x3f, 0xff, 0xff, 0xf0, 0x30, 0x00, 0xb8, 0x0a, 0x00,
    0x06, 0x80, 0x00, 0x0a, 0x00, 0x06, 0x80, 0x00, 0x02, 0x95, 0x29, 0xa9, 0xa6, 0x8d, 0x18, 0x4d,
    0x0d, 0xa9, 0xb6, 0xa4, 0xc1, 0x39, 0x13, 0x24, 0xfa, 0x26, 0x49, 0xf0, 0x4d, 0x49, 0x82, 0x6a,
    0x4e, 0x84, 0xf7, 0x27, 0xd9, 0x30, 0x4e, 0xc4, 0xc1, 0x3b, 0x09, 0xb1, 0x37, 0x13, 0xb9, 0x3c,
    0x13, 0xa9, 0x36, 0x27, 0xa1, 0x3f, 0x09, 0x82, 0x6e, 0x26, 0x49, 0xdc, 0x9a, 0x13, 0x91, 0x35,
    0x27, 0x82, 0x68, 0x4e, 0xa4, 0xfe, 0x26, 0xc4, 0xd0, 0x99, 0x26, 0x49, 0xd0, 0xab, 0xc9, 0x3c,
    0x93, 0xfc, 0x5d, 0xc9, 0x14, 0xe1, 0x42, 0x42, 0x18, 0x07, 0xbb, 0x30,
];

/// `"a" * 1000 + "b" * 300 + "abc"` at level 1 (runs longer than one RLE1 group).
const RUNS_BZ2: [u8; 54] = [
    0x42, 0x5a, 0x68, 0x31, 0x31, 0x41, 0x59, 0x26, 0x53, 0x59, 0xa3, 0xf0, 0x6d, 0x19, 0x00, 0x00,
    0x02, 0x11, 0x01, 0x80, 0x20, 0x38, 0x00, 0x00, 0x80, 0x00, 0x08, 0x20, 0x00, 0x30, 0xc0, 0x04,
    0xa6, 0x8f, 0x49, 0xb7, 0x14, 0x06, 0x03, 0x8d, 0xd3, 0xa1, 0x02, 0x78, 0xbb, 0x92, 0x29, 0xc2,
    0x84, 0x85, 0x1f, 0x83, 0x68, 0xc8,
];

fn runs_plain() -> Vec<u8> {
    let mut data = vec![b'a'; 1000];
    data.extend(std::iter::repeat_n(b'b', 300));
    data.extend_from_slice(b"abc");
    data
}

#[test]
fn test_reference_hello() {
    let out = decompress(&HELLO_BZ2[..]).expect("decompress failed");
    assert_eq!(out, b"hello world\n".repeat(3));
}

#[test]
fn test_reference_fox() {
    let out = decompress(&FOX_BZ2[..]).expect("decompress failed");
    assert_eq!(
        out,
        b"The quick brown fox jumps over the lazy dog. ".repeat(20)
    );
}

#[test]
fn test_reference_long_runs() {
    let out = decompress(&RUNS_BZ2[..]).expect("decompress failed");
    assert_eq!(out, runs_plain());
}

#[test]
fn test_reference_one_byte_at_a_time() {
    let mut decoder = BzDecoder::new(Cursor::new(&RUNS_BZ2[..])).unwrap();
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let (n, status) = decoder.read(&mut byte).unwrap();
        out.extend_from_slice(&byte[..n]);
        if status == DecompressStatus::Done {
            break;
        }
    }
    assert_eq!(out, runs_plain());
    assert_eq!(decoder.blocks(), 1);
}

#[test]
fn test_reference_block_crc_damage() {
    let mut damaged = HELLO_BZ2;
    // First byte of the block CRC
    damaged[10] ^= 0x01;

    let mut decoder = BzDecoder::new(Cursor::new(&damaged[..])).unwrap();
    let mut buf = [0u8; 256];

    // The block's bytes are still delivered
    let (n, _) = decoder.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello world\n".repeat(3).as_slice());

    let err = decoder.read(&mut buf).unwrap_err();
    assert!(err.is_integrity());
    assert!(matches!(
        err,
        BzError::CrcMismatch {
            kind: CrcKind::Block,
            ..
        }
    ));
}

#[test]
fn test_reference_truncated() {
    for cut in [10, 20, 40, HELLO_BZ2.len() - 1] {
        let result = decompress(&HELLO_BZ2[..cut]);
        assert!(
            matches!(result, Err(BzError::UnexpectedEof { .. })),
            "cut at {cut}: {result:?}"
        );
    }
}
