// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Raw SCPI over a TCP socket
//!
//! The CTP10 accepts newline-terminated SCPI on port 5025. This binding uses a
//! blocking [`std::net::TcpStream`] with read and write timeouts equal to the
//! session timeout, so a dead instrument surfaces as
//! [`InstrumentError::Timeout`] instead of hanging a worker thread forever.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use crate::instrument::block::read_block;
use crate::instrument::error::{InstrumentError, InstrumentResult};
use crate::instrument::{ScpiTransport, TransportConnector};

const DEFAULT_SCPI_PORT: u16 = 5025;
const TERMINATOR: &str = "\n";

/// Parse a VISA-style socket resource or a plain `host[:port]`.
///
/// Accepted forms: `TCPIP::<host>::<port>::SOCKET`, `TCPIP0::<host>::<port>::SOCKET`,
/// `<host>:<port>` and `<host>`.
pub fn parse_address(address: &str) -> InstrumentResult<(String, u16)> {
    let address = address.trim();
    if address.is_empty() {
        return Err(InstrumentError::Address("empty address".to_string()));
    }

    if address.to_ascii_uppercase().starts_with("TCPIP") {
        let parts: Vec<&str> = address.split("::").collect();
        return match parts.as_slice() {
            [_, host, port, kind] if kind.eq_ignore_ascii_case("SOCKET") => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| InstrumentError::Address(address.to_string()))?;
                Ok((host.to_string(), port))
            }
            [_, host, kind] if kind.eq_ignore_ascii_case("SOCKET") => {
                Ok((host.to_string(), DEFAULT_SCPI_PORT))
            }
            _ => Err(InstrumentError::Address(format!(
                "{} (expected TCPIP::<host>::<port>::SOCKET)",
                address
            ))),
        };
    }

    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port
                .parse::<u16>()
                .map_err(|_| InstrumentError::Address(address.to_string()))?;
            Ok((host.to_string(), port))
        }
        _ => Ok((address.to_string(), DEFAULT_SCPI_PORT)),
    }
}

/// Blocking SCPI socket.
#[derive(Debug)]
pub struct TcpScpiTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    timeout: Duration,
    // A block terminator that arrived late may still be on the wire
    after_block: bool,
}

impl TcpScpiTransport {
    /// Connect to `host:port` with the given I/O timeout.
    pub fn try_new(host: &str, port: u16, timeout: Duration) -> InstrumentResult<Self> {
        let sock_addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| InstrumentError::Address(format!("{}:{}", host, port)))?;
        debug!("Opening SCPI socket to {}", sock_addr);

        let stream = TcpStream::connect_timeout(&sock_addr, timeout)
            .map_err(|e| InstrumentError::from_io(e, "connect", timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
            timeout,
            after_block: false,
        })
    }

    fn send(&mut self, command: &str) -> InstrumentResult<()> {
        let line = format!("{}{}", command, TERMINATOR);
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| InstrumentError::from_io(e, command, self.timeout))
    }
}

impl ScpiTransport for TcpScpiTransport {
    fn write(&mut self, command: &str) -> InstrumentResult<()> {
        self.send(command)
    }

    fn query(&mut self, command: &str) -> InstrumentResult<String> {
        self.send(command)?;
        let mut skip_blank = std::mem::take(&mut self.after_block);
        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| InstrumentError::from_io(e, command, self.timeout))?;
            if read == 0 {
                return Err(InstrumentError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "instrument closed the connection",
                )));
            }
            let reply = line.trim_end_matches(['\r', '\n']);
            if reply.is_empty() && skip_blank {
                skip_blank = false;
                continue;
            }
            return Ok(reply.to_string());
        }
    }

    fn query_block(&mut self, command: &str) -> InstrumentResult<Vec<u8>> {
        self.send(command)?;
        let payload = read_block(&mut self.reader)
            .map_err(|e| InstrumentError::from_io(e, command, self.timeout))?;
        self.after_block = true;
        Ok(payload)
    }

    fn close(&mut self) -> InstrumentResult<()> {
        match self.writer.shutdown(std::net::Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already closed by the peer
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Opens [`TcpScpiTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl TransportConnector for TcpConnector {
    fn open(&self, address: &str, timeout: Duration) -> InstrumentResult<Box<dyn ScpiTransport>> {
        let (host, port) = parse_address(address)?;
        Ok(Box::new(TcpScpiTransport::try_new(&host, port, timeout)?))
    }

    fn name(&self) -> &'static str {
        "scpi-tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::block::{decode_f64_le, encode_block, encode_f64_le};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_parse_address_forms() {
        assert_eq!(
            parse_address("TCPIP::192.168.1.37::5025::SOCKET").unwrap(),
            ("192.168.1.37".to_string(), 5025)
        );
        assert_eq!(
            parse_address("TCPIP0::10.0.0.2::5000::SOCKET").unwrap(),
            ("10.0.0.2".to_string(), 5000)
        );
        assert_eq!(
            parse_address("10.0.0.2:5001").unwrap(),
            ("10.0.0.2".to_string(), 5001)
        );
        assert_eq!(
            parse_address("ctp10.lab").unwrap(),
            ("ctp10.lab".to_string(), 5025)
        );
        assert!(parse_address("TCPIP::10.0.0.2::x::SOCKET").is_err());
        assert!(parse_address("TCPIP::10.0.0.2::5025::INSTR").is_err());
        assert!(parse_address("").is_err());
    }

    #[test]
    fn test_query_and_block_over_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut line = String::new();

            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "*IDN?\n");
            writer.write_all(b"EXFO,CTP10,12345678,1.2.3\n").unwrap();

            line.clear();
            reader.read_line(&mut line).unwrap();
            assert!(line.starts_with(":TRAC:"));
            let mut block = encode_block(&encode_f64_le(&[1.0, 2.0]));
            block.push(b'\n');
            writer.write_all(&block).unwrap();

            line.clear();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, ":ABOR\n");
        });

        let mut transport =
            TcpScpiTransport::try_new("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        assert_eq!(transport.query("*IDN?").unwrap(), "EXFO,CTP10,12345678,1.2.3");
        let payload = transport
            .query_block(":TRAC:SENS4:CHAN1:TYPE1:DATA? DB,BIN")
            .unwrap();
        assert_eq!(decode_f64_le(&payload).unwrap(), vec![1.0, 2.0]);
        transport.write(":ABOR").unwrap();
        server.join().unwrap();
        transport.close().unwrap();
    }

    #[test]
    fn test_block_without_terminator_does_not_wait_for_more() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut line = String::new();

            reader.read_line(&mut line).unwrap();
            writer.write_all(&encode_block(&encode_f64_le(&[3.0]))).unwrap();

            // The terminator only shows up in front of the next reply
            line.clear();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "*OPC?\n");
            writer.write_all(b"\n1\n").unwrap();
        });

        let mut transport =
            TcpScpiTransport::try_new("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let started = std::time::Instant::now();
        let payload = transport
            .query_block(":TRAC:SENS4:CHAN1:TYPE1:DATA? DB,BIN")
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(decode_f64_le(&payload).unwrap(), vec![3.0]);
        assert_eq!(transport.query("*OPC?").unwrap(), "1");
        server.join().unwrap();
    }

    #[test]
    fn test_silent_instrument_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let mut transport =
            TcpScpiTransport::try_new("127.0.0.1", port, Duration::from_millis(100)).unwrap();
        let err = transport.query("*IDN?").unwrap_err();
        assert!(matches!(err, InstrumentError::Timeout { .. }), "{err:?}");
        server.join().unwrap();
    }
}
