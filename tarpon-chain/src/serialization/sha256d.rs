//! Streaming double-SHA-256, Bitcoin's content-addressing hash.

use sha2::{Digest, Sha256};
use std::io;

/// An `io::Write` adapter that computes SHA-256(SHA-256(x)) over everything
/// written to it.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl Writer {
    /// Consume the writer, returning the double hash of its input.
    pub fn finish(self) -> [u8; 32] {
        let result = Sha256::digest(&self.hash.finalize());
        let mut buffer = [0u8; 32];
        buffer[0..32].copy_from_slice(&result);
        buffer
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One-shot double-SHA-256 of `data`.
pub fn digest(data: &[u8]) -> [u8; 32] {
    use std::io::Write;

    let mut writer = Writer::default();
    writer.write_all(data).expect("sha256d::Writer is infallible");
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_hash_of_empty_input() {
        // sha256d("") is a fixed, well-known vector.
        let expected =
            hex::decode("5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456")
                .unwrap();
        assert_eq!(digest(b""), expected[..]);
    }

    #[test]
    fn incremental_writes_match_one_shot() {
        use std::io::Write;

        let mut writer = Writer::default();
        writer.write_all(b"tar").unwrap();
        writer.write_all(b"pon").unwrap();
        assert_eq!(writer.finish(), digest(b"tarpon"));
    }
}
