//! Value Size Estimation
//!
//! Estimates how many bytes a value occupies by serializing it to JSON into a
//! counting sink. Nothing is buffered, and serialization is aborted as soon as
//! the nesting depth exceeds [`MAX_SIZE_DEPTH`], so self-referencing or
//! pathologically deep values cost a bounded amount of work.

use std::io::{self, Write};

use serde::Serialize;

/// Deepest JSON nesting the estimator will follow before giving up.
pub const MAX_SIZE_DEPTH: usize = 64;

/// Returns the serialized JSON size of `value` in bytes.
///
/// Values that cannot be serialized (maps with non-string keys, failing
/// `Serialize` impls) or that nest deeper than [`MAX_SIZE_DEPTH`] are reported
/// as 0 bytes instead of producing an error.
pub fn estimate_size<V: Serialize + ?Sized>(value: &V) -> usize {
    let mut sink = MeasuringWriter::default();
    match serde_json::to_writer(&mut sink, value) {
        Ok(()) => sink.bytes,
        Err(_) => 0,
    }
}

// == Measuring Writer ==
/// An `io::Write` sink that counts bytes and tracks JSON nesting depth.
///
/// Depth is derived from the bracket characters serde_json emits outside of
/// string literals; the serializer always escapes quotes and backslashes
/// inside strings, which keeps the small state machine below exact.
#[derive(Debug, Default)]
struct MeasuringWriter {
    bytes: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Write for MeasuringWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => {
                    self.depth += 1;
                    if self.depth > MAX_SIZE_DEPTH {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "value nests too deeply to measure",
                        ));
                    }
                }
                b'}' | b']' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
        }

        self.bytes += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
