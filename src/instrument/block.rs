// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! IEEE 488.2 arbitrary block handling
//!
//! Trace arrays travel as definite-length blocks: `#`, one digit `n`, `n`
//! digits giving the payload length, then the payload. `#0` introduces an
//! indefinite block terminated by a newline.

use std::io::{BufRead, BufReader, Read};

use super::error::{InstrumentError, InstrumentResult};

/// Wrap a payload in a definite-length block header.
pub fn encode_block(payload: &[u8]) -> Vec<u8> {
    let len = payload.len().to_string();
    let mut out = Vec::with_capacity(2 + len.len() + payload.len());
    out.push(b'#');
    out.push(b'0' + len.len() as u8);
    out.extend_from_slice(len.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Extract the payload of an in-memory block.
///
/// Trailing bytes after a definite-length payload (usually the `\n`
/// terminator) are ignored.
pub fn parse_block(raw: &[u8]) -> InstrumentResult<&[u8]> {
    let rest = raw
        .strip_prefix(b"#")
        .ok_or_else(|| InstrumentError::Block("missing '#' marker".to_string()))?;
    let (&digit, rest) = rest
        .split_first()
        .ok_or_else(|| InstrumentError::Block("missing header length digit".to_string()))?;
    let ndigits = header_digit(digit)?;
    if ndigits == 0 {
        let end = rest
            .iter()
            .rposition(|&b| b != b'\n' && b != b'\r')
            .map_or(0, |i| i + 1);
        return Ok(&rest[..end]);
    }
    if rest.len() < ndigits {
        return Err(InstrumentError::Block("truncated length field".to_string()));
    }
    let len = parse_length(&rest[..ndigits])?;
    let payload = &rest[ndigits..];
    if payload.len() < len {
        return Err(InstrumentError::Block(format!(
            "payload truncated: expected {} bytes, got {}",
            len,
            payload.len()
        )));
    }
    Ok(&payload[..len])
}

/// Read one block from a buffered stream.
///
/// The line terminator after a definite-length payload is consumed only when
/// it is already buffered, so a reply without one never waits on the stream.
/// Stray terminators left before the `#` marker are skipped.
pub fn read_block<R: Read>(reader: &mut BufReader<R>) -> std::io::Result<Vec<u8>> {
    skip_terminators(reader)?;
    let mut head = [0u8; 2];
    reader.read_exact(&mut head)?;
    if head[0] != b'#' {
        return Err(invalid_data("missing '#' marker"));
    }
    let ndigits = header_digit(head[1]).map_err(|e| invalid_data(&e.to_string()))?;

    if ndigits == 0 {
        let mut payload = Vec::new();
        reader.read_until(b'\n', &mut payload)?;
        while matches!(payload.last(), Some(b'\n') | Some(b'\r')) {
            payload.pop();
        }
        return Ok(payload);
    }

    let mut len_field = vec![0u8; ndigits];
    reader.read_exact(&mut len_field)?;
    let len = parse_length(&len_field).map_err(|e| invalid_data(&e.to_string()))?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    let pending = reader.buffer();
    let terminator = if pending.starts_with(b"\r\n") {
        2
    } else if pending.starts_with(b"\n") {
        1
    } else {
        0
    };
    reader.consume(terminator);
    Ok(payload)
}

fn skip_terminators<R: Read>(reader: &mut BufReader<R>) -> std::io::Result<()> {
    loop {
        let buf = reader.fill_buf()?;
        match buf.first() {
            Some(b'\n') | Some(b'\r') => reader.consume(1),
            _ => return Ok(()),
        }
    }
}

/// Decode a payload of little-endian IEEE 754 doubles.
pub fn decode_f64_le(payload: &[u8]) -> InstrumentResult<Vec<f64>> {
    if payload.len() % 8 != 0 {
        return Err(InstrumentError::Block(format!(
            "payload of {} bytes is not a whole number of f64 values",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            f64::from_le_bytes(bytes)
        })
        .collect())
}

pub fn encode_f64_le(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn header_digit(digit: u8) -> InstrumentResult<usize> {
    if digit.is_ascii_digit() {
        Ok((digit - b'0') as usize)
    } else {
        Err(InstrumentError::Block(format!(
            "invalid header digit {:?}",
            digit as char
        )))
    }
}

fn parse_length(field: &[u8]) -> InstrumentResult<usize> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| InstrumentError::Block("invalid length field".to_string()))
}

fn invalid_data(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out its chunks one read at a time, then fails every read.
    struct Chunked {
        chunks: Vec<Vec<u8>>,
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    "nothing more on the wire",
                ));
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_parse_definite_block() {
        let raw = b"#15hello\n";
        assert_eq!(parse_block(raw).unwrap(), b"hello");
    }

    #[test]
    fn test_parse_indefinite_block() {
        let raw = b"#0abc\r\n";
        assert_eq!(parse_block(raw).unwrap(), b"abc");
    }

    #[test]
    fn test_parse_truncated_block_is_an_error() {
        assert!(parse_block(b"#210abc").is_err());
        assert!(parse_block(b"hello").is_err());
        assert!(parse_block(b"#x12").is_err());
    }

    #[test]
    fn test_read_block_consumes_terminator() {
        let values = [1.5f64, -2.25, 1310.0];
        let mut wire = encode_block(&encode_f64_le(&values));
        wire.extend_from_slice(b"\n1\n");
        let mut reader = BufReader::new(Cursor::new(wire));

        let payload = read_block(&mut reader).unwrap();
        assert_eq!(decode_f64_le(&payload).unwrap(), values);

        // The next reply starts right after the terminator
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "1\n");
    }

    #[test]
    fn test_definite_block_without_terminator_returns_at_once() {
        let wire = encode_block(&encode_f64_le(&[1.0, 2.0]));
        let mut reader = BufReader::new(Chunked { chunks: vec![wire] });

        // A further read would fail, so the payload must come back untouched
        let payload = read_block(&mut reader).unwrap();
        assert_eq!(decode_f64_le(&payload).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_late_terminator_is_skipped_by_the_next_block() {
        let mut first = encode_block(b"abc");
        first.extend_from_slice(b"\r\n");
        let mut reader = BufReader::new(Chunked {
            chunks: vec![encode_block(b"xy"), b"\n".to_vec(), first],
        });

        assert_eq!(read_block(&mut reader).unwrap(), b"xy");
        assert_eq!(read_block(&mut reader).unwrap(), b"abc");
        assert!(reader.buffer().is_empty());
    }

    #[test]
    fn test_decode_rejects_partial_values() {
        assert!(decode_f64_le(&[0u8; 12]).is_err());
    }
}
