//! Checksummed binary streams and the codec file header/footer.
//!
//! Every file written by a codec has the layout
//!
//! ```text
//! [header: CODEC_MAGIC, codec name, version, segment id, suffix]
//! [payload]
//! [footer: FOOTER_MAGIC, algorithm id, checksum]
//! ```
//!
//! [`ChecksumOutput`] keeps a running CRC-32 over every byte it writes and
//! appends the footer; [`ChecksumInput`] recomputes the CRC while reading and
//! [`ChecksumInput::check_footer`] compares it with the stored value. A file
//! is valid only if the checksums match and nothing follows the footer.

use std::collections::BTreeMap;
use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use log::warn;

use crate::error::{Result, TesseraError};
use crate::storage::{Storage, StorageInput, StorageOutput};
use crate::util::varint;

/// Magic number at the start of every codec header.
pub const CODEC_MAGIC: u32 = 0x3fd7_6c17;

/// Magic number at the start of every footer.
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;

/// Footer length: magic + algorithm id + checksum.
pub const FOOTER_LENGTH: u64 = 16;

/// Length of a segment id.
pub const ID_LENGTH: usize = 16;

/// Checksum algorithm identifier recorded in the footer (CRC-32).
const ALGORITHM_CRC32: u32 = 0;

/// A segment or commit id.
pub type SegmentId = [u8; ID_LENGTH];

/// A writer that checksums everything it writes.
#[derive(Debug)]
pub struct ChecksumOutput<W: StorageOutput> {
    writer: W,
    hasher: Hasher,
    position: u64,
}

impl<W: StorageOutput> ChecksumOutput<W> {
    /// Wrap an output. Nothing may have been written to it yet.
    pub fn new(writer: W) -> Self {
        ChecksumOutput {
            writer,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.update(&[value]);
        Ok(())
    }

    /// Write a u32 value (big-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<BigEndian>(value)?;
        self.update(&value.to_be_bytes());
        Ok(())
    }

    /// Write a u64 value (big-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<BigEndian>(value)?;
        self.update(&value.to_be_bytes());
        Ok(())
    }

    /// Write a variable-length u32.
    pub fn write_vint(&mut self, value: u32) -> Result<()> {
        self.write_vlong(value as u64)
    }

    /// Write a variable-length u64.
    pub fn write_vlong(&mut self, value: u64) -> Result<()> {
        let (bytes, len) = varint::encode_u64(value);
        self.write_raw(&bytes[..len])
    }

    /// Write a zig-zag encoded variable-length i64.
    pub fn write_zlong(&mut self, value: i64) -> Result<()> {
        self.write_vlong(varint::zigzag_encode(value))
    }

    /// Write a string with a vint length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with a vint length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_vint(value.len() as u32)?;
        self.write_raw(value)
    }

    /// Write raw bytes without a length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.update(value);
        Ok(())
    }

    /// Write a string-to-string map, sorted by key.
    pub fn write_string_map(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        self.write_vint(map.len() as u32)?;
        for (key, value) in map {
            self.write_string(key)?;
            self.write_string(value)?;
        }
        Ok(())
    }

    /// Write a list of strings.
    pub fn write_string_list(&mut self, values: &[String]) -> Result<()> {
        self.write_vint(values.len() as u32)?;
        for value in values {
            self.write_string(value)?;
        }
        Ok(())
    }

    /// Write the codec header.
    ///
    /// The codec name must be ASCII and shorter than 128 bytes; the suffix
    /// shorter than 256 bytes.
    pub fn write_header(
        &mut self,
        codec: &str,
        version: u32,
        id: &SegmentId,
        suffix: &str,
    ) -> Result<()> {
        if !codec.is_ascii() || codec.len() >= 128 {
            return Err(TesseraError::invalid_argument(format!(
                "codec name must be ASCII and < 128 bytes: {codec:?}"
            )));
        }
        if suffix.len() >= 256 {
            return Err(TesseraError::invalid_argument(format!(
                "suffix must be < 256 bytes: {suffix:?}"
            )));
        }

        self.write_u32(CODEC_MAGIC)?;
        self.write_string(codec)?;
        self.write_u32(version)?;
        self.write_raw(id)?;
        self.write_u8(suffix.len() as u8)?;
        self.write_raw(suffix.as_bytes())
    }

    /// Append the footer: magic, algorithm id and the checksum of every byte
    /// written before the checksum field itself.
    pub fn write_footer(&mut self) -> Result<()> {
        self.write_u32(FOOTER_MAGIC)?;
        self.write_u32(ALGORITHM_CRC32)?;
        let checksum = self.checksum();
        self.write_u64(checksum)
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Checksum of everything written so far.
    pub fn checksum(&self) -> u64 {
        self.hasher.clone().finalize() as u64
    }

    /// Close the underlying output.
    pub fn close(mut self) -> Result<()> {
        self.writer.close()
    }

    /// Give back the underlying output without closing it.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.position += data.len() as u64;
    }
}

/// A reader that checksums everything it reads.
#[derive(Debug)]
pub struct ChecksumInput<R: StorageInput> {
    reader: R,
    hasher: Hasher,
}

impl<R: StorageInput> ChecksumInput<R> {
    /// Wrap an input positioned at its start.
    pub fn new(reader: R) -> Self {
        ChecksumInput {
            reader,
            hasher: Hasher::new(),
        }
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.reader.read_u8().map_err(|e| self.eof(e))?;
        self.hasher.update(&[value]);
        Ok(value)
    }

    /// Read a u32 value (big-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self
            .reader
            .read_u32::<BigEndian>()
            .map_err(|e| self.eof(e))?;
        self.hasher.update(&value.to_be_bytes());
        Ok(value)
    }

    /// Read a u64 value (big-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let value = self
            .reader
            .read_u64::<BigEndian>()
            .map_err(|e| self.eof(e))?;
        self.hasher.update(&value.to_be_bytes());
        Ok(value)
    }

    /// Read a variable-length u32.
    pub fn read_vint(&mut self) -> Result<u32> {
        let value = self.read_vlong()?;
        u32::try_from(value).map_err(|_| self.corrupt(format!("vint out of range: {value}")))
    }

    /// Read a variable-length u64.
    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut bytes = [0u8; varint::MAX_VLONG_BYTES];
        for i in 0..varint::MAX_VLONG_BYTES {
            bytes[i] = self.read_u8()?;
            if bytes[i] & 0x80 == 0 {
                let (value, _) = varint::decode_u64(&bytes[..=i])
                    .map_err(|_| self.corrupt("malformed vlong"))?;
                return Ok(value);
            }
        }
        Err(self.corrupt("vlong longer than 10 bytes"))
    }

    /// Read a zig-zag encoded variable-length i64.
    pub fn read_zlong(&mut self) -> Result<i64> {
        Ok(varint::zigzag_decode(self.read_vlong()?))
    }

    /// Read a string with a vint length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| self.corrupt(format!("invalid UTF-8: {e}")))
    }

    /// Read bytes with a vint length prefix.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_vint()? as u64;
        if length > self.reader.remaining() {
            return Err(self.corrupt(format!(
                "length {length} exceeds remaining {} bytes",
                self.reader.remaining()
            )));
        }
        self.read_raw(length as usize)
    }

    /// Read exactly `length` raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes).map_err(|e| self.eof(e))?;
        self.hasher.update(&bytes);
        Ok(bytes)
    }

    /// Read a string-to-string map.
    pub fn read_string_map(&mut self) -> Result<BTreeMap<String, String>> {
        let count = self.read_vint()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.read_string()?;
            let value = self.read_string()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Read a list of strings.
    pub fn read_string_list(&mut self) -> Result<Vec<String>> {
        let count = self.read_vint()?;
        let mut values = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            values.push(self.read_string()?);
        }
        Ok(values)
    }

    /// Validate the codec header and return the format version.
    ///
    /// `expected_id` may be `None` for files that are not tied to a segment.
    pub fn check_header(
        &mut self,
        codec: &str,
        min_version: u32,
        max_version: u32,
        expected_id: Option<&SegmentId>,
        suffix: &str,
    ) -> Result<u32> {
        let (version, id) = self.read_header(codec, min_version, max_version, suffix)?;
        if let Some(expected) = expected_id
            && &id != expected
        {
            return Err(self.corrupt(format!(
                "segment id mismatch: actual={} vs expected={}",
                id_to_string(&id),
                id_to_string(expected)
            )));
        }
        Ok(version)
    }

    /// Validate the codec header and return the format version and the id
    /// it carries. Used for files that own their id, like the commit point.
    pub fn read_header(
        &mut self,
        codec: &str,
        min_version: u32,
        max_version: u32,
        suffix: &str,
    ) -> Result<(u32, SegmentId)> {
        let magic = self.read_u32()?;
        if magic != CODEC_MAGIC {
            return Err(self.corrupt(format!(
                "codec header mismatch: actual header={magic:#x} vs expected header={CODEC_MAGIC:#x}"
            )));
        }

        let actual_codec = self.read_string()?;
        if actual_codec != codec {
            return Err(self.corrupt(format!(
                "codec mismatch: actual codec={actual_codec} vs expected codec={codec}"
            )));
        }

        let version = self.read_u32()?;
        if version < min_version {
            return Err(self.corrupt(format!(
                "format version {version} is too old (minimum supported {min_version})"
            )));
        }
        if version > max_version {
            return Err(self.corrupt(format!(
                "format version {version} is too new (maximum supported {max_version})"
            )));
        }

        let mut id = [0u8; ID_LENGTH];
        id.copy_from_slice(&self.read_raw(ID_LENGTH)?);

        let suffix_len = self.read_u8()? as usize;
        let actual_suffix = self.read_raw(suffix_len)?;
        if actual_suffix != suffix.as_bytes() {
            return Err(self.corrupt(format!(
                "file suffix mismatch: actual={:?} vs expected={suffix:?}",
                String::from_utf8_lossy(&actual_suffix)
            )));
        }

        Ok((version, id))
    }

    /// Verify the footer and that no bytes follow it.
    ///
    /// Must be called with the input positioned right after the payload.
    /// Returns the verified checksum.
    pub fn check_footer(&mut self) -> Result<u64> {
        let remaining = self.reader.remaining();
        if remaining < FOOTER_LENGTH {
            return Err(self.corrupt(format!(
                "misplaced codec footer (file truncated?): remaining={remaining}, expected={FOOTER_LENGTH}"
            )));
        }
        if remaining > FOOTER_LENGTH {
            return Err(self.corrupt(format!(
                "misplaced codec footer (file extended?): remaining={remaining}, expected={FOOTER_LENGTH}"
            )));
        }

        let magic = self.read_u32()?;
        if magic != FOOTER_MAGIC {
            return Err(self.corrupt(format!(
                "codec footer mismatch: actual footer={magic:#x} vs expected footer={FOOTER_MAGIC:#x}"
            )));
        }
        let algorithm = self.read_u32()?;
        if algorithm != ALGORITHM_CRC32 {
            return Err(self.corrupt(format!("unknown checksum algorithm: {algorithm}")));
        }

        let actual = self.checksum();
        let expected = self.reader.read_u64::<BigEndian>().map_err(|e| self.eof(e))?;
        validate_checksum_value(expected, self.reader.description())?;
        if expected != actual {
            return Err(self.corrupt(format!(
                "checksum failed (hardware problem?): expected={expected:#x} actual={actual:#x}"
            )));
        }

        Ok(actual)
    }

    /// Checksum of everything read so far.
    pub fn checksum(&self) -> u64 {
        self.hasher.clone().finalize() as u64
    }

    /// Current position in the underlying input.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Bytes left before the end of the input.
    pub fn remaining(&self) -> u64 {
        self.reader.remaining()
    }

    /// Get a reference to the underlying input.
    pub fn inner(&self) -> &R {
        &self.reader
    }

    /// Give back the underlying input, positioned where reading stopped.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Build a corruption error naming this input.
    pub fn corrupt<S: Into<String>>(&self, message: S) -> TesseraError {
        let err = TesseraError::corrupt(self.reader.description(), message);
        warn!("{err}");
        err
    }

    fn eof(&self, e: std::io::Error) -> TesseraError {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            self.corrupt("read past EOF")
        } else {
            TesseraError::Io(e)
        }
    }
}

fn validate_checksum_value(value: u64, resource: &str) -> Result<()> {
    if value >> 32 != 0 {
        return Err(TesseraError::corrupt(
            resource,
            format!("illegal CRC-32 checksum: {value:#x}"),
        ));
    }
    Ok(())
}

/// Verify a whole file: checksum every byte before the footer and compare.
///
/// The payload is not parsed. Returns the verified checksum.
pub fn checksum_entire_file(mut input: Box<dyn StorageInput>) -> Result<u64> {
    input.seek(0)?;
    let length = input.length();
    if length < FOOTER_LENGTH {
        return Err(TesseraError::corrupt(
            input.description(),
            format!("file too short ({length} bytes) to contain a footer"),
        ));
    }

    let mut checked = ChecksumInput::new(input);
    let mut remaining = length - FOOTER_LENGTH;
    let mut buffer = vec![0u8; 8192];
    while remaining > 0 {
        let chunk = remaining.min(buffer.len() as u64) as usize;
        checked
            .reader
            .read_exact(&mut buffer[..chunk])
            .map_err(|e| checked.eof(e))?;
        checked.hasher.update(&buffer[..chunk]);
        remaining -= chunk as u64;
    }
    checked.check_footer()
}

/// Verify a named file in a storage.
pub fn verify_file(storage: &dyn Storage, name: &str) -> Result<u64> {
    checksum_entire_file(storage.open_input(name)?)
}

/// Read the checksum stored in a file's footer without verifying it.
pub fn retrieve_checksum(input: &mut dyn StorageInput) -> Result<u64> {
    let length = input.length();
    if length < FOOTER_LENGTH {
        return Err(TesseraError::corrupt(
            input.description(),
            "file too short to contain a footer",
        ));
    }
    input.seek(length - FOOTER_LENGTH)?;

    let magic = input.read_u32::<BigEndian>()?;
    if magic != FOOTER_MAGIC {
        return Err(TesseraError::corrupt(
            input.description(),
            format!("codec footer mismatch: {magic:#x}"),
        ));
    }
    let algorithm = input.read_u32::<BigEndian>()?;
    if algorithm != ALGORITHM_CRC32 {
        return Err(TesseraError::corrupt(
            input.description(),
            format!("unknown checksum algorithm: {algorithm}"),
        ));
    }
    let checksum = input.read_u64::<BigEndian>()?;
    validate_checksum_value(checksum, input.description())?;
    Ok(checksum)
}

/// Length in bytes of the header written by [`ChecksumOutput::write_header`].
pub fn header_length(codec: &str, suffix: &str) -> u64 {
    let (_, name_len_bytes) = varint::encode_u64(codec.len() as u64);
    (4 + name_len_bytes + codec.len() + 4 + ID_LENGTH + 1 + suffix.len()) as u64
}

/// Render an id as lowercase hex.
pub fn id_to_string(id: &[u8]) -> String {
    id.iter().map(|b| format!("{b:02x}")).collect()
}

/// Generate a fresh random id.
pub fn random_id() -> SegmentId {
    *uuid::Uuid::new_v4().as_bytes()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::storage::memory::MemoryStorage;

    const ID: SegmentId = [7u8; ID_LENGTH];

    fn write_sample(storage: &MemoryStorage, name: &str) {
        let output = storage.create_output(name).unwrap();
        let mut out = ChecksumOutput::new(output);
        out.write_header("TestCodec", 3, &ID, "dv").unwrap();
        out.write_u8(42).unwrap();
        out.write_u32(5678).unwrap();
        out.write_u64(9_876_543_210).unwrap();
        out.write_vlong(12345).unwrap();
        out.write_zlong(-17).unwrap();
        out.write_string("Hello, World!").unwrap();
        out.write_bytes(b"binary data").unwrap();
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), "v".to_string());
        out.write_string_map(&map).unwrap();
        out.write_footer().unwrap();
        out.close().unwrap();
    }

    #[test]
    fn test_checksum_writer_reader() {
        let storage = MemoryStorage::new_default();
        write_sample(&storage, "test.bin");

        let input = storage.open_input("test.bin").unwrap();
        let mut reader = ChecksumInput::new(input);

        assert_eq!(reader.check_header("TestCodec", 0, 3, Some(&ID), "dv").unwrap(), 3);
        assert_eq!(reader.read_u8().unwrap(), 42);
        assert_eq!(reader.read_u32().unwrap(), 5678);
        assert_eq!(reader.read_u64().unwrap(), 9_876_543_210);
        assert_eq!(reader.read_vlong().unwrap(), 12345);
        assert_eq!(reader.read_zlong().unwrap(), -17);
        assert_eq!(reader.read_string().unwrap(), "Hello, World!");
        assert_eq!(reader.read_bytes().unwrap(), b"binary data");
        assert_eq!(reader.read_string_map().unwrap().get("k").unwrap(), "v");
        reader.check_footer().unwrap();

        assert!(verify_file(&storage, "test.bin").is_ok());
    }

    #[test]
    fn test_header_length_matches() {
        let storage = MemoryStorage::new_default();
        let mut out = ChecksumOutput::new(storage.create_output("h.bin").unwrap());
        out.write_header("Block10Postings", 1, &ID, "Inline10_0").unwrap();
        assert_eq!(out.position(), header_length("Block10Postings", "Inline10_0"));
    }

    #[test]
    fn test_header_mismatches() {
        let storage = MemoryStorage::new_default();
        write_sample(&storage, "test.bin");

        let check = |codec: &str, min: u32, max: u32, id: SegmentId, suffix: &str| {
            let mut reader = ChecksumInput::new(storage.open_input("test.bin").unwrap());
            reader.check_header(codec, min, max, Some(&id), suffix)
        };

        assert!(check("Other", 0, 3, ID, "dv").unwrap_err().is_corruption());
        assert!(check("TestCodec", 4, 5, ID, "dv").unwrap_err().is_corruption());
        assert!(check("TestCodec", 0, 2, ID, "dv").unwrap_err().is_corruption());
        assert!(check("TestCodec", 0, 3, [0u8; 16], "dv").unwrap_err().is_corruption());
        assert!(check("TestCodec", 0, 3, ID, "nv").unwrap_err().is_corruption());
    }

    #[test]
    fn test_every_flipped_byte_is_detected() {
        let storage = MemoryStorage::new_default();
        write_sample(&storage, "test.bin");
        let original = storage.read_contents("test.bin").unwrap();

        for i in 0..original.len() - FOOTER_LENGTH as usize {
            let mut corrupted = original.clone();
            corrupted[i] ^= 0x01;
            let name = format!("flip_{i}.bin");
            let mut output = storage.create_output(&name).unwrap();
            output.write_all(&corrupted).unwrap();
            output.close().unwrap();

            let err = verify_file(&storage, &name).unwrap_err();
            assert!(err.is_corruption(), "flip at {i} not detected");
        }
    }

    #[test]
    fn test_trailing_bytes_are_detected() {
        let storage = MemoryStorage::new_default();
        write_sample(&storage, "test.bin");
        let mut bytes = storage.read_contents("test.bin").unwrap();
        bytes.push(0);
        storage.replace_contents("test.bin", bytes).unwrap();

        let err = verify_file(&storage, "test.bin").unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_truncated_and_missing_footer() {
        let storage = MemoryStorage::new_default();
        {
            let mut out = ChecksumOutput::new(storage.create_output("partial.bin").unwrap());
            out.write_header("TestCodec", 0, &ID, "").unwrap();
            out.write_u64(1).unwrap();
            // no footer: simulates an aborted write
        }
        assert!(verify_file(&storage, "partial.bin").unwrap_err().is_corruption());

        let mut reader = ChecksumInput::new(storage.open_input("partial.bin").unwrap());
        reader.check_header("TestCodec", 0, 0, Some(&ID), "").unwrap();
        assert!(reader.check_footer().unwrap_err().is_corruption());
    }

    #[test]
    fn test_retrieve_checksum() {
        let storage = MemoryStorage::new_default();
        write_sample(&storage, "test.bin");
        let mut input = storage.open_input("test.bin").unwrap();
        let stored = retrieve_checksum(input.as_mut()).unwrap();
        assert_eq!(stored, verify_file(&storage, "test.bin").unwrap());
    }
}
