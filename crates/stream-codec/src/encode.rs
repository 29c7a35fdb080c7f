use crate::value::Value;
use crate::{CodecError, DEFAULT_CHUNK_SIZE, MAX_DEPTH, tag};

enum Frame<'a> {
    Raw(&'a [u8]),
    Items(std::slice::Iter<'a, Value>),
    Entries(std::slice::Iter<'a, (String, Value)>),
}

/// Lazily serializes a [`Value`] into chunks of at most `chunk_size` bytes.
///
/// Large string and byte fields are split across chunks; nothing is
/// buffered beyond one chunk plus a field header.
pub struct StreamEncoder<'a> {
    root: Option<&'a Value>,
    stack: Vec<Frame<'a>>,
    pending: Vec<u8>,
    chunk_size: usize,
}

impl<'a> StreamEncoder<'a> {
    /// Creates an encoder. A `chunk_size` of zero selects
    /// [`DEFAULT_CHUNK_SIZE`].
    ///
    /// Fails up front if the record cannot be represented on the wire.
    pub fn new(value: &'a Value, chunk_size: usize) -> Result<Self, CodecError> {
        check(value, 0)?;
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            root: Some(value),
            stack: Vec::new(),
            pending: Vec::with_capacity(chunk_size.min(64 * 1024)),
            chunk_size,
        })
    }

    fn has_work(&self) -> bool {
        self.root.is_some() || !self.stack.is_empty()
    }

    fn write_len(&mut self, len: usize) {
        // Lengths were validated in `check`.
        self.pending.extend_from_slice(&(len as u32).to_be_bytes());
    }

    fn write_value(&mut self, value: &'a Value) {
        match value {
            Value::Null => self.pending.push(tag::NULL),
            Value::Bool(false) => self.pending.push(tag::FALSE),
            Value::Bool(true) => self.pending.push(tag::TRUE),
            Value::Int(i) => {
                self.pending.push(tag::INT);
                self.pending.extend_from_slice(&i.to_be_bytes());
            }
            Value::Float(f) => {
                self.pending.push(tag::FLOAT);
                self.pending.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            Value::String(s) => self.write_raw(tag::STRING, s.as_bytes()),
            Value::Bytes(b) => self.write_raw(tag::BYTES, b),
            Value::Array(items) => {
                self.pending.push(tag::ARRAY);
                self.write_len(items.len());
                self.stack.push(Frame::Items(items.iter()));
            }
            Value::Map(entries) => {
                self.pending.push(tag::MAP);
                self.write_len(entries.len());
                self.stack.push(Frame::Entries(entries.iter()));
            }
        }
    }

    fn write_raw(&mut self, field_tag: u8, bytes: &'a [u8]) {
        self.pending.push(field_tag);
        self.write_len(bytes.len());
        if !bytes.is_empty() {
            self.stack.push(Frame::Raw(bytes));
        }
    }

    fn step(&mut self) {
        let room = self
            .chunk_size
            .saturating_sub(self.pending.len())
            .max(1);

        match self.stack.last_mut() {
            None => {
                if let Some(root) = self.root.take() {
                    self.write_value(root);
                }
            }
            Some(Frame::Raw(rest)) => {
                let slice: &'a [u8] = *rest;
                let (head, tail) = slice.split_at(room.min(slice.len()));
                *rest = tail;
                if tail.is_empty() {
                    self.stack.pop();
                }
                self.pending.extend_from_slice(head);
            }
            Some(Frame::Items(iter)) => match iter.next() {
                Some(item) => self.write_value(item),
                None => {
                    self.stack.pop();
                }
            },
            Some(Frame::Entries(iter)) => match iter.next() {
                Some((key, value)) => {
                    self.write_len(key.len());
                    self.pending.extend_from_slice(key.as_bytes());
                    self.write_value(value);
                }
                None => {
                    self.stack.pop();
                }
            },
        }
    }
}

impl Iterator for StreamEncoder<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        while self.pending.len() < self.chunk_size && self.has_work() {
            self.step();
        }
        if self.pending.is_empty() {
            return None;
        }
        let take = self.pending.len().min(self.chunk_size);
        let rest = self.pending.split_off(take);
        Some(std::mem::replace(&mut self.pending, rest))
    }
}

/// Serializes a record into a single buffer.
pub fn encode_to_vec(value: &Value) -> Result<Vec<u8>, CodecError> {
    Ok(StreamEncoder::new(value, usize::MAX)?.flatten().collect())
}

fn check(value: &Value, depth: usize) -> Result<(), CodecError> {
    let fits = |len: usize| {
        if len > u32::MAX as usize {
            Err(CodecError::FieldTooLarge(len))
        } else {
            Ok(())
        }
    };
    match value {
        Value::String(s) => fits(s.len()),
        Value::Bytes(b) => fits(b.len()),
        Value::Array(items) => {
            if depth >= MAX_DEPTH {
                return Err(CodecError::TooDeep);
            }
            fits(items.len())?;
            items.iter().try_for_each(|item| check(item, depth + 1))
        }
        Value::Map(entries) => {
            if depth >= MAX_DEPTH {
                return Err(CodecError::TooDeep);
            }
            fits(entries.len())?;
            entries.iter().try_for_each(|(key, value)| {
                fits(key.len())?;
                check(value, depth + 1)
            })
        }
        _ => Ok(()),
    }
}
