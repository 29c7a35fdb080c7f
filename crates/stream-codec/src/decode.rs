use crate::value::Value;
use crate::{CodecError, MAX_DEPTH, tag};

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<usize, CodecError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(raw) as usize)
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u32()?;
        let offset = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8 { offset })
    }

    fn value(&mut self, depth: usize) -> Result<Value, CodecError> {
        let offset = self.pos;
        match self.u8()? {
            tag::NULL => Ok(Value::Null),
            tag::FALSE => Ok(Value::Bool(false)),
            tag::TRUE => Ok(Value::Bool(true)),
            tag::INT => Ok(Value::Int(self.u64()? as i64)),
            tag::FLOAT => Ok(Value::Float(f64::from_bits(self.u64()?))),
            tag::STRING => Ok(Value::String(self.string()?)),
            tag::BYTES => {
                let len = self.u32()?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            tag::ARRAY => {
                if depth >= MAX_DEPTH {
                    return Err(CodecError::TooDeep);
                }
                let count = self.u32()?;
                // Every item needs at least its tag byte.
                let mut items = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    items.push(self.value(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            tag::MAP => {
                if depth >= MAX_DEPTH {
                    return Err(CodecError::TooDeep);
                }
                let count = self.u32()?;
                let mut entries = Vec::with_capacity(count.min(self.remaining() / 5));
                for _ in 0..count {
                    let key = self.string()?;
                    entries.push((key, self.value(depth + 1)?));
                }
                Ok(Value::Map(entries))
            }
            other => Err(CodecError::UnknownTag { tag: other, offset }),
        }
    }
}

/// Decodes one complete record. The buffer must contain exactly one value.
pub fn decode(buf: &[u8]) -> Result<Value, CodecError> {
    if buf.is_empty() {
        return Err(CodecError::Empty);
    }
    let mut cursor = Cursor { buf, pos: 0 };
    let value = cursor.value(0)?;
    match cursor.remaining() {
        0 => Ok(value),
        extra => Err(CodecError::TrailingBytes(extra)),
    }
}
