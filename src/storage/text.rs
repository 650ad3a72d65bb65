//! Human-inspectable text files.
//!
//! Payload is written as newline-terminated records. Any payload byte equal
//! to the newline or to the escape marker is preceded by the escape marker,
//! so a record may carry embedded newlines and still be read back as one
//! logical line. The file ends with a fixed-width footer line:
//!
//! ```text
//! checksum 00000000003735928559
//! ```
//!
//! The checksum is the CRC-32 of every byte before the footer line.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::{Result, TesseraError};
use crate::storage::checksum::{ChecksumInput, ChecksumOutput, SegmentId, id_to_string};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Escape marker.
pub const ESCAPE: u8 = b'\\';

/// Record terminator.
pub const NEWLINE: u8 = b'\n';

/// Prefix of the footer line.
pub const CHECKSUM_MARKER: &str = "checksum ";

const CHECKSUM_DIGITS: usize = 20;

/// Total length of the footer line.
pub const TEXT_FOOTER_LENGTH: u64 = (CHECKSUM_MARKER.len() + CHECKSUM_DIGITS + 1) as u64;

/// Writes escaped text records with a running checksum.
#[derive(Debug)]
pub struct TextOutput<W: StorageOutput> {
    out: ChecksumOutput<W>,
}

impl<W: StorageOutput> TextOutput<W> {
    pub fn new(writer: W) -> Self {
        TextOutput {
            out: ChecksumOutput::new(writer),
        }
    }

    /// Write payload bytes, escaping newlines and escape markers.
    pub fn write_escaped(&mut self, bytes: &[u8]) -> Result<()> {
        let mut start = 0;
        for (i, &b) in bytes.iter().enumerate() {
            if b == NEWLINE || b == ESCAPE {
                self.out.write_raw(&bytes[start..i])?;
                self.out.write_u8(ESCAPE)?;
                start = i;
            }
        }
        self.out.write_raw(&bytes[start..])
    }

    /// Terminate the current record.
    pub fn write_newline(&mut self) -> Result<()> {
        self.out.write_u8(NEWLINE)
    }

    /// Write a `label` + `value` record.
    pub fn write_field(&mut self, label: &str, value: &[u8]) -> Result<()> {
        self.write_escaped(label.as_bytes())?;
        self.write_escaped(value)?;
        self.write_newline()
    }

    /// Write a record whose value is rendered with `Display`.
    pub fn write_value<T: Display>(&mut self, label: &str, value: T) -> Result<()> {
        self.write_field(label, value.to_string().as_bytes())
    }

    /// Header records: codec name, version, segment id and suffix.
    pub fn write_header(
        &mut self,
        codec: &str,
        version: u32,
        id: &SegmentId,
        suffix: &str,
    ) -> Result<()> {
        self.write_field("codec ", codec.as_bytes())?;
        self.write_value("version ", version)?;
        self.write_field("id ", id_to_string(id).as_bytes())?;
        self.write_field("suffix ", suffix.as_bytes())
    }

    /// Append the footer line.
    pub fn write_checksum(&mut self) -> Result<()> {
        let checksum = self.out.checksum();
        let footer = format!("{CHECKSUM_MARKER}{checksum:0width$}\n", width = CHECKSUM_DIGITS);
        self.out.write_raw(footer.as_bytes())
    }

    pub fn position(&self) -> u64 {
        self.out.position()
    }

    pub fn close(self) -> Result<()> {
        self.out.close()
    }
}

/// Reads records written by [`TextOutput`].
#[derive(Debug)]
pub struct TextInput<R: StorageInput> {
    input: ChecksumInput<R>,
}

impl<R: StorageInput> TextInput<R> {
    pub fn new(reader: R) -> Self {
        TextInput {
            input: ChecksumInput::new(reader),
        }
    }

    /// Read one logical record with escapes removed, or `None` at EOF.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        if self.input.remaining() == 0 {
            return Ok(None);
        }

        let mut line = Vec::new();
        loop {
            if self.input.remaining() == 0 {
                return Err(self.input.corrupt("unterminated record"));
            }
            match self.input.read_u8()? {
                NEWLINE => return Ok(Some(line)),
                ESCAPE => {
                    if self.input.remaining() == 0 {
                        return Err(self.input.corrupt("dangling escape at end of file"));
                    }
                    line.push(self.input.read_u8()?);
                }
                b => line.push(b),
            }
        }
    }

    /// Read a record that must start with `label`; returns the rest.
    pub fn read_field(&mut self, label: &str) -> Result<Vec<u8>> {
        let line = self
            .read_line()?
            .ok_or_else(|| self.input.corrupt(format!("expected {label:?}, got EOF")))?;
        match line.strip_prefix(label.as_bytes()) {
            Some(rest) => Ok(rest.to_vec()),
            None => Err(self.input.corrupt(format!(
                "expected {label:?}, got {:?}",
                String::from_utf8_lossy(&line)
            ))),
        }
    }

    /// Read a labelled record as UTF-8.
    pub fn read_string(&mut self, label: &str) -> Result<String> {
        let bytes = self.read_field(label)?;
        String::from_utf8(bytes).map_err(|e| self.input.corrupt(format!("invalid UTF-8: {e}")))
    }

    /// Read a labelled record and parse it.
    pub fn read_value<T: FromStr>(&mut self, label: &str) -> Result<T> {
        let text = self.read_string(label)?;
        text.parse()
            .map_err(|_| self.input.corrupt(format!("cannot parse {label:?} value {text:?}")))
    }

    /// Check the header records; returns the version.
    pub fn check_header(
        &mut self,
        codec: &str,
        min_version: u32,
        max_version: u32,
        expected_id: Option<&SegmentId>,
        suffix: &str,
    ) -> Result<u32> {
        let actual_codec = self.read_string("codec ")?;
        if actual_codec != codec {
            return Err(self.input.corrupt(format!(
                "codec mismatch: actual codec={actual_codec} vs expected codec={codec}"
            )));
        }
        let version: u32 = self.read_value("version ")?;
        if version < min_version || version > max_version {
            return Err(self.input.corrupt(format!(
                "format version {version} outside supported range [{min_version}, {max_version}]"
            )));
        }
        let id = self.read_string("id ")?;
        if let Some(expected) = expected_id
            && id != id_to_string(expected)
        {
            return Err(self.input.corrupt(format!(
                "segment id mismatch: actual={id} vs expected={}",
                id_to_string(expected)
            )));
        }
        let actual_suffix = self.read_string("suffix ")?;
        if actual_suffix != suffix {
            return Err(self.input.corrupt(format!(
                "file suffix mismatch: actual={actual_suffix:?} vs expected={suffix:?}"
            )));
        }
        Ok(version)
    }

    /// Verify the footer line and that nothing follows it.
    pub fn check_footer(&mut self) -> Result<u64> {
        let actual = self.input.checksum();
        let remaining = self.input.remaining();
        if remaining != TEXT_FOOTER_LENGTH {
            return Err(self.input.corrupt(format!(
                "misplaced checksum footer: remaining={remaining}, expected={TEXT_FOOTER_LENGTH}"
            )));
        }
        let line = self
            .read_line()?
            .ok_or_else(|| self.input.corrupt("missing checksum footer"))?;
        let expected = parse_footer(&line).map_err(|msg| self.input.corrupt(msg))?;
        if expected != actual {
            return Err(self.input.corrupt(format!(
                "checksum failed: expected={expected:020} actual={actual:020}"
            )));
        }
        Ok(actual)
    }

    /// Bytes left before EOF.
    pub fn remaining(&self) -> u64 {
        self.input.remaining()
    }

    /// Build a corruption error naming this input.
    pub fn corrupt<S: Into<String>>(&self, message: S) -> TesseraError {
        self.input.corrupt(message)
    }
}

fn parse_footer(line: &[u8]) -> std::result::Result<u64, String> {
    let digits = line
        .strip_prefix(CHECKSUM_MARKER.as_bytes())
        .ok_or_else(|| format!("expected checksum footer, got {:?}", String::from_utf8_lossy(line)))?;
    if digits.len() != CHECKSUM_DIGITS || !digits.iter().all(u8::is_ascii_digit) {
        return Err(format!(
            "malformed checksum value {:?}",
            String::from_utf8_lossy(digits)
        ));
    }
    let text = std::str::from_utf8(digits).map_err(|e| e.to_string())?;
    text.parse::<u64>().map_err(|e| e.to_string())
}

/// Verify a text file without parsing its records.
pub fn verify_text_file(storage: &dyn Storage, name: &str) -> Result<u64> {
    let input = storage.open_input(name)?;
    let length = input.length();
    if length < TEXT_FOOTER_LENGTH {
        return Err(TesseraError::corrupt(
            name,
            format!("file too short ({length} bytes) to contain a checksum footer"),
        ));
    }

    let mut checked = ChecksumInput::new(input);
    checked.read_raw((length - TEXT_FOOTER_LENGTH) as usize)?;
    let mut text = TextInput { input: checked };
    text.check_footer()
}
