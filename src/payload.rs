//! Producer payload generation.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::config::{PayloadKind, ProducerConfig};

/// Length of the big-endian sequence prefix in sequential payloads.
const SEQUENCE_PREFIX: usize = 8;

/// Produces fixed-size payloads for one producer.
///
/// Each worker owns its own generator, so no state is shared between workers.
///
/// ```
/// use msgload::config::PayloadKind;
/// use msgload::payload::PayloadGenerator;
///
/// let mut generator = PayloadGenerator::new(PayloadKind::Pattern, 5, b"ab");
/// assert_eq!(generator.next_payload(), b"ababa");
/// ```
#[derive(Debug, Clone)]
pub struct PayloadGenerator {
    kind: PayloadKind,
    size: usize,
    pattern: Vec<u8>,
    sequence: u64,
    rng: StdRng,
}

impl PayloadGenerator {
    /// Generator for `size`-byte payloads. An empty `pattern` falls back to
    /// a single zero byte.
    pub fn new(kind: PayloadKind, size: usize, pattern: &[u8]) -> Self {
        let pattern = if pattern.is_empty() {
            vec![0]
        } else {
            pattern.to_vec()
        };
        Self {
            kind,
            size,
            pattern,
            sequence: 0,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_config(config: &ProducerConfig) -> Self {
        Self::new(config.payload, config.message_size, config.pattern.as_bytes())
    }

    /// Length of every payload, in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of payloads generated so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Produce the next payload and advance the sequence counter.
    pub fn next_payload(&mut self) -> Vec<u8> {
        let mut buf = vec![0u8; self.size];
        match self.kind {
            PayloadKind::Random => self.rng.fill_bytes(&mut buf),
            PayloadKind::Sequential => {
                let prefix = self.sequence.to_be_bytes();
                let head = self.size.min(SEQUENCE_PREFIX);
                buf[..head].copy_from_slice(&prefix[..head]);
                for (i, byte) in buf.iter_mut().enumerate().skip(head) {
                    *byte = self.sequence.wrapping_add(i as u64) as u8;
                }
            }
            PayloadKind::Pattern => {
                for (byte, p) in buf.iter_mut().zip(self.pattern.iter().cycle()) {
                    *byte = *p;
                }
            }
        }
        self.sequence = self.sequence.wrapping_add(1);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_payloads_have_requested_size_and_differ() {
        let mut generator = PayloadGenerator::new(PayloadKind::Random, 64, b"");
        let a = generator.next_payload();
        let b = generator.next_payload();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn sequential_payloads_carry_big_endian_counter() {
        let mut generator = PayloadGenerator::new(PayloadKind::Sequential, 12, b"");
        let first = generator.next_payload();
        let second = generator.next_payload();
        assert_eq!(&first[..8], &0u64.to_be_bytes());
        assert_eq!(&second[..8], &1u64.to_be_bytes());
        assert_eq!(&first[8..], &[8, 9, 10, 11]);
        assert_eq!(&second[8..], &[9, 10, 11, 12]);
        assert_eq!(generator.sequence(), 2);
    }

    #[test]
    fn sequential_prefix_truncates_for_small_payloads() {
        let mut generator = PayloadGenerator::new(PayloadKind::Sequential, 3, b"");
        assert_eq!(generator.next_payload(), vec![0, 0, 0]);
    }

    #[test]
    fn pattern_repeats_to_size() {
        let mut generator = PayloadGenerator::new(PayloadKind::Pattern, 7, b"xyz");
        assert_eq!(generator.next_payload(), b"xyzxyzx");
    }

    #[test]
    fn zero_size_is_empty() {
        let mut generator = PayloadGenerator::new(PayloadKind::Random, 0, b"");
        assert!(generator.next_payload().is_empty());
    }
}
