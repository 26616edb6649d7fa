//! Bytecode image codec.
//!
//! An image is the unit of exchange between the compiler and the VM:
//!
//! ```text
//! u32  instruction byte count          (big-endian)
//! u8[] instruction bytes
//! u32  constants section byte count    (big-endian)
//! u8[] constants section
//! u32  variable slot count             (big-endian)
//! ```
//!
//! The constants section is a concatenation of self-describing entries, one
//! per pool value: the `type_name()` tag string followed by the value's
//! public fields, each encoded as a JSON document. The reader consumes the
//! section until its bytes are exhausted — no entry count is written — and
//! fails with [`Error::UnknownConstantType`] on a tag it does not know.
//! `INSTANCE` entries never come out of this compiler, but the format is
//! shared with future producers, so they round-trip like everything else.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::bytecode::Instructions;
use crate::error::{Error, Result};
use crate::value::{CompiledFunction, Constructor, Instance, Value};

/// A compiled program: top-level instructions, the shared constant pool,
/// and the size of the variable slot table.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
    pub var_count: u32,
}

impl Image {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&(self.instructions.len() as u32).to_be_bytes())?;
        writer.write_all(self.instructions.as_bytes())?;

        let constants = serialize_constants(&self.constants)?;
        writer.write_all(&(constants.len() as u32).to_be_bytes())?;
        writer.write_all(&constants)?;

        writer.write_all(&self.var_count.to_be_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Image> {
        let instruction_len = read_u32(reader)?;
        let instructions = read_bytes(reader, instruction_len as usize)?;

        let constants_len = read_u32(reader)?;
        let constants_data = read_bytes(reader, constants_len as usize)?;
        let constants = deserialize_constants(&constants_data)?;

        let var_count = read_u32(reader)?;
        Ok(Image {
            instructions: Instructions(instructions),
            constants,
            var_count,
        })
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Image> {
        let mut reader = BufReader::new(File::open(path)?);
        Image::read_from(&mut reader)
    }
}

// ---------------------------------------------------------------------------
// Framing primitives
// ---------------------------------------------------------------------------

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_exact(reader, &mut buf)?;
    Ok(buf)
}

/// `read_exact` that reports a truncated stream as a decode error rather
/// than an I/O error: a short image is malformed, not unreadable.
fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            Error::Decode("unexpected end of image".to_string())
        } else {
            Error::Io(err)
        }
    })
}

// ---------------------------------------------------------------------------
// Constants section
// ---------------------------------------------------------------------------

fn serialize_constants(constants: &[Value]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    for constant in constants {
        write_json(&mut buffer, &constant.type_name())?;
        match constant {
            Value::Integer(n) => write_json(&mut buffer, n)?,
            Value::Constructor(c) => write_json(&mut buffer, c)?,
            Value::Instance(i) => write_json(&mut buffer, i)?,
            Value::CompiledFunction(f) => write_json(&mut buffer, f)?,
        }
    }
    Ok(buffer)
}

fn write_json<T: serde::Serialize>(buffer: &mut Vec<u8>, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *buffer, value).map_err(std::io::Error::other)?;
    buffer.push(b'\n');
    Ok(())
}

fn deserialize_constants(data: &[u8]) -> Result<Vec<Value>> {
    let mut stream = serde_json::Deserializer::from_slice(data).into_iter::<serde_json::Value>();
    let mut constants = Vec::new();
    while let Some(entry) = stream.next() {
        let tag = entry.map_err(|err| Error::Decode(err.to_string()))?;
        let Some(tag) = tag.as_str() else {
            return Err(Error::Decode(format!(
                "expected a constant type tag, got {tag}"
            )));
        };
        let constant = match tag {
            "INTEGER" => Value::Integer(next_payload(&mut stream)?),
            "CONSTRUCTOR" => Value::Constructor(next_payload::<Constructor>(&mut stream)?),
            "INSTANCE" => Value::Instance(next_payload::<Instance>(&mut stream)?),
            "COMPILED_FUNCTION" => {
                Value::CompiledFunction(next_payload::<CompiledFunction>(&mut stream)?)
            }
            other => return Err(Error::UnknownConstantType(other.to_string())),
        };
        constants.push(constant);
    }
    Ok(constants)
}

fn next_payload<'de, T: DeserializeOwned>(
    stream: &mut serde_json::StreamDeserializer<'de, serde_json::de::SliceRead<'de>, serde_json::Value>,
) -> Result<T> {
    let payload = stream
        .next()
        .ok_or_else(|| Error::Decode("constants section ends after a type tag".to_string()))?
        .map_err(|err| Error::Decode(err.to_string()))?;
    serde_json::from_value(payload).map_err(|err| Error::Decode(err.to_string()))
}
