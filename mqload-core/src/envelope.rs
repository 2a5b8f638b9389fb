// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Timestamped message envelope carried in every published payload.
//!
//! Layout (UTF-8 text):
//!
//! ```text
//! origin_host|publisher_id|connect_init|connect_ack|publish_time|qos|xxxxxxxx...
//! ```
//!
//! Timestamps are epoch microseconds zero-padded to 16 digits, so the header
//! length depends only on the host name and publisher id. The remainder of
//! the payload is filler up to the configured size.

use crate::error::{ConfigurationError, EnvelopeError};
use crate::types::{PayloadSize, QosLevel, Timestamp};

/// Field separator. Host names and worker ids may not contain it.
pub const SEPARATOR: char = '|';

const TIMESTAMP_WIDTH: usize = 16;
const HEADER_FIELDS: usize = 6;
const FILLER: u8 = b'x';

/// Decoded message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub origin_host: String,
    pub publisher_id: String,
    pub connect_init: Timestamp,
    pub connect_ack: Timestamp,
    pub publish_time: Timestamp,
    pub qos: QosLevel,
}

impl Envelope {
    /// Bytes taken by the header for a given host and publisher id,
    /// including the separator that precedes the padding.
    pub fn header_len(origin_host: &str, publisher_id: &str) -> usize {
        origin_host.len() + publisher_id.len() + 3 * TIMESTAMP_WIDTH + 1 + HEADER_FIELDS
    }

    /// Check that `size` can hold the header for this host and publisher id.
    pub fn check_fits(
        size: PayloadSize,
        origin_host: &str,
        publisher_id: &str,
    ) -> Result<(), ConfigurationError> {
        let min = Self::header_len(origin_host, publisher_id);
        if size.bytes() < min {
            return Err(ConfigurationError::PayloadTooSmall {
                size: size.bytes(),
                min,
            });
        }
        Ok(())
    }

    /// Encode the envelope and pad it with filler bytes up to `size`.
    pub fn encode(&self, size: PayloadSize) -> Vec<u8> {
        let header = format!(
            "{host}{sep}{id}{sep}{init:0w$}{sep}{ack:0w$}{sep}{publish:0w$}{sep}{qos}{sep}",
            host = self.origin_host,
            id = self.publisher_id,
            init = self.connect_init.micros(),
            ack = self.connect_ack.micros(),
            publish = self.publish_time.micros(),
            qos = self.qos.as_u8(),
            sep = SEPARATOR,
            w = TIMESTAMP_WIDTH,
        );

        let mut payload = Vec::with_capacity(size.bytes().max(header.len()));
        payload.extend_from_slice(header.as_bytes());
        if payload.len() < size.bytes() {
            payload.resize(size.bytes(), FILLER);
        }
        payload
    }

    /// Parse an envelope out of a received payload.
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let text = std::str::from_utf8(payload).map_err(|_| EnvelopeError::NotUtf8)?;
        let fields: Vec<&str> = text.splitn(HEADER_FIELDS + 1, SEPARATOR).collect();
        if fields.len() < HEADER_FIELDS + 1 {
            return Err(EnvelopeError::MissingFields {
                found: fields.len(),
                expected: HEADER_FIELDS + 1,
            });
        }

        let qos_raw = parse_number::<u8>("qos", fields[5])?;
        let qos = QosLevel::new(qos_raw).map_err(|_| EnvelopeError::InvalidNumber {
            field: "qos",
            value: fields[5].to_string(),
        })?;

        Ok(Self {
            origin_host: fields[0].to_string(),
            publisher_id: fields[1].to_string(),
            connect_init: Timestamp::from_micros(parse_number("connect_init", fields[2])?),
            connect_ack: Timestamp::from_micros(parse_number("connect_ack", fields[3])?),
            publish_time: Timestamp::from_micros(parse_number("publish_time", fields[4])?),
            qos,
        })
    }

    /// End-to-end delay in microseconds for a message that arrived at `arrival`.
    pub fn e2e_delay_micros(&self, arrival: Timestamp) -> i64 {
        arrival.micros_since(self.publish_time)
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, EnvelopeError> {
    raw.parse().map_err(|_| EnvelopeError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope(publish_micros: i64) -> Envelope {
        Envelope {
            origin_host: "10.0.1.5".to_string(),
            publisher_id: "pub3".to_string(),
            connect_init: Timestamp::from_micros(1_700_000_000_000_000),
            connect_ack: Timestamp::from_micros(1_700_000_000_001_200),
            publish_time: Timestamp::from_micros(publish_micros),
            qos: QosLevel::AtLeastOnce,
        }
    }

    #[test]
    fn test_encode_pads_to_requested_size() {
        let size = PayloadSize::new(256).unwrap();
        let payload = sample_envelope(1_700_000_000_005_000).encode(size);
        assert_eq!(payload.len(), 256);
        assert!(payload.ends_with(b"xxxx"));
    }

    #[test]
    fn test_decoded_delay_matches_timestamps() {
        let publish = 1_700_000_000_005_000;
        let payload = sample_envelope(publish).encode(PayloadSize::new(128).unwrap());

        let decoded = Envelope::decode(&payload).unwrap();
        assert_eq!(decoded, sample_envelope(publish));

        let arrival = Timestamp::from_micros(publish + 4_321);
        assert_eq!(decoded.e2e_delay_micros(arrival), 4_321);
    }

    #[test]
    fn test_header_len_is_exact() {
        let envelope = sample_envelope(1_700_000_000_005_000);
        let header_len = Envelope::header_len("10.0.1.5", "pub3");
        let exact = PayloadSize::new(header_len).unwrap();
        let payload = envelope.encode(exact);
        assert_eq!(payload.len(), header_len);
        assert_eq!(*payload.last().unwrap(), SEPARATOR as u8);
    }

    #[test]
    fn test_check_fits_rejects_small_payload() {
        let long_host = "broker-cluster-node.example.internal";
        let size = PayloadSize::new(60).unwrap();
        assert!(matches!(
            Envelope::check_fits(size, long_host, "pub1"),
            Err(ConfigurationError::PayloadTooSmall { size: 60, .. })
        ));
        assert!(Envelope::check_fits(PayloadSize::new(1024).unwrap(), long_host, "pub1").is_ok());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Envelope::decode(b"hello world"),
            Err(EnvelopeError::MissingFields { found: 1, .. })
        ));
        assert!(matches!(
            Envelope::decode(b"h|p|abc|1|2|0|"),
            Err(EnvelopeError::InvalidNumber {
                field: "connect_init",
                ..
            })
        ));
        assert_eq!(Envelope::decode(&[0xff, 0xfe]), Err(EnvelopeError::NotUtf8));
    }
}
