//! Byte input with a byte-order-mark probe and incremental decoding.
//!
//! The reader is a lazy, finite, non-restartable sequence of characters:
//! [`Reader::read`] yields decoded chunks until the input is exhausted and
//! [`Reader::data_available`] tells whether another chunk may follow. Only
//! the three BOM forms select an encoding; everything else is taken as
//! UTF-8. Malformed byte sequences are fatal.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use encoding_rs::{Decoder, DecoderResult, Encoding, UTF_16BE, UTF_16LE, UTF_8};

use crate::error::XmlError;

const BLOCK_SIZE: usize = 8 * 1024;

pub struct Reader {
    path: PathBuf,
    inner: Inner,
    encoding_name: &'static str,
}

enum Inner {
    Stream {
        input: File,
        decoder: Decoder,
        /// Bytes read from the input but not yet consumed by the decoder.
        pending: Vec<u8>,
        /// Count of bytes handed to the decoder, for error positions.
        bytes_fed: usize,
        input_done: bool,
        finished: bool,
    },
    /// Already-decoded input, handed out as a single chunk.
    Memory { text: Option<String> },
}

impl Reader {
    /// Opens `path` and probes up to three leading bytes: `EF BB BF` selects
    /// UTF-8, `FF FE` UTF-16LE, `FE FF` UTF-16BE; each BOM is discarded.
    /// Without a BOM the stream is assumed to be UTF-8.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, XmlError> {
        let path = path.as_ref().to_path_buf();
        let mut input = File::open(&path).map_err(|source| XmlError::Io {
            path: path.clone(),
            source,
        })?;

        let mut head = [0u8; 3];
        let mut len = 0;
        while len < head.len() {
            let n = input
                .read(&mut head[len..])
                .map_err(|source| XmlError::Io {
                    path: path.clone(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            len += n;
        }

        let (encoding, bom_len) = probe_bom(&head[..len]);
        let mut pending = Vec::with_capacity(BLOCK_SIZE);
        pending.extend_from_slice(&head[bom_len..len]);

        Ok(Self {
            path,
            encoding_name: encoding.name(),
            inner: Inner::Stream {
                input,
                decoder: encoding.new_decoder_without_bom_handling(),
                pending,
                bytes_fed: bom_len,
                input_done: len == 0,
                finished: false,
            },
        })
    }

    /// Wraps an already-decoded string; used for in-memory documents.
    pub fn from_str(text: impl Into<String>) -> Self {
        Self {
            path: PathBuf::from("<memory>"),
            encoding_name: UTF_8.name(),
            inner: Inner::Memory {
                text: Some(text.into()),
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the encoding selected by the probe.
    pub fn encoding(&self) -> &'static str {
        self.encoding_name
    }

    pub fn data_available(&self) -> bool {
        match &self.inner {
            Inner::Stream { finished, .. } => !finished,
            Inner::Memory { text } => text.is_some(),
        }
    }

    /// Yields the next decoded chunk, or `None` once the input is exhausted.
    pub fn read(&mut self) -> Result<Option<String>, XmlError> {
        match &mut self.inner {
            Inner::Memory { text } => Ok(text.take().filter(|t| !t.is_empty())),
            Inner::Stream {
                input,
                decoder,
                pending,
                bytes_fed,
                input_done,
                finished,
            } => {
                if *finished {
                    return Ok(None);
                }
                loop {
                    if !*input_done && pending.len() < BLOCK_SIZE {
                        let mut block = [0u8; BLOCK_SIZE];
                        let n = input.read(&mut block).map_err(|source| XmlError::Io {
                            path: self.path.clone(),
                            source,
                        })?;
                        if n == 0 {
                            *input_done = true;
                        } else {
                            pending.extend_from_slice(&block[..n]);
                        }
                    }

                    let mut out = String::with_capacity(
                        decoder
                            .max_utf8_buffer_length_without_replacement(pending.len())
                            .unwrap_or(BLOCK_SIZE),
                    );
                    let (result, consumed) = decoder.decode_to_string_without_replacement(
                        pending,
                        &mut out,
                        *input_done,
                    );
                    pending.drain(..consumed);
                    *bytes_fed += consumed;

                    match result {
                        DecoderResult::Malformed(_, _) => {
                            *finished = true;
                            return Err(XmlError::Encoding {
                                path: self.path.clone(),
                                position: *bytes_fed,
                                cause: format!("malformed {} sequence", self.encoding_name),
                            });
                        }
                        DecoderResult::InputEmpty if *input_done => {
                            *finished = true;
                            return Ok(if out.is_empty() { None } else { Some(out) });
                        }
                        DecoderResult::InputEmpty | DecoderResult::OutputFull => {
                            if !out.is_empty() {
                                return Ok(Some(out));
                            }
                            // Nothing decoded yet; pull more input.
                        }
                    }
                }
            }
        }
    }
}

fn probe_bom(head: &[u8]) -> (&'static Encoding, usize) {
    match head {
        [0xEF, 0xBB, 0xBF, ..] => (UTF_8, 3),
        [0xFF, 0xFE, ..] => (UTF_16LE, 2),
        [0xFE, 0xFF, ..] => (UTF_16BE, 2),
        _ => (UTF_8, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn reader_for(bytes: &[u8]) -> Reader {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        Reader::open(file.path()).unwrap()
    }

    fn read_all(mut reader: Reader) -> String {
        let mut text = String::new();
        while let Some(chunk) = reader.read().unwrap() {
            text.push_str(&chunk);
        }
        text
    }

    #[test]
    fn utf8_bom_is_discarded() {
        let reader = reader_for(b"\xEF\xBB\xBF<r/>");
        assert_eq!(reader.encoding(), "UTF-8");
        assert_eq!(read_all(reader), "<r/>");
    }

    #[test]
    fn utf16le_bom_selects_utf16() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<r/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let reader = reader_for(&bytes);
        assert_eq!(reader.encoding(), "UTF-16LE");
        assert_eq!(read_all(reader), "<r/>");
    }

    #[test]
    fn utf16be_bom_selects_utf16() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "<a b=\"1\"/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        let reader = reader_for(&bytes);
        assert_eq!(reader.encoding(), "UTF-16BE");
        assert_eq!(read_all(reader), "<a b=\"1\"/>");
    }

    #[test]
    fn missing_bom_defaults_to_utf8() {
        let reader = reader_for("<r>caf\u{e9}</r>".as_bytes());
        assert_eq!(reader.encoding(), "UTF-8");
        assert_eq!(read_all(reader), "<r>caf\u{e9}</r>");
    }

    #[test]
    fn malformed_utf8_is_fatal() {
        let mut reader = reader_for(b"<r>\xC3\x28</r>");
        let err = loop {
            match reader.read() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected a decode error"),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, XmlError::Encoding { .. }));
    }

    #[test]
    fn memory_reader_yields_one_chunk() {
        let mut reader = Reader::from_str("<r/>");
        assert!(reader.data_available());
        assert_eq!(reader.read().unwrap().as_deref(), Some("<r/>"));
        assert_eq!(reader.read().unwrap(), None);
        assert!(!reader.data_available());
    }
}
