//! Bounds-checked little-endian cursor over a payload.

/// Error from a [`Reader`] accessor; converted into a
/// [`crate::DecodeError::MalformedPayload`] by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadError {
    Truncated { wanted: usize, remaining: usize },
    Invalid(&'static str),
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Truncated { wanted, remaining } => {
                write!(f, "truncated: wanted {} bytes, {} remaining", wanted, remaining)
            }
            ReadError::Invalid(what) => write!(f, "invalid {}", what),
        }
    }
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        if self.remaining() < n {
            return Err(ReadError::Truncated {
                wanted: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16_be(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u16_le(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32_le(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i32_le(&mut self) -> Result<i32, ReadError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u64_le(&mut self) -> Result<u64, ReadError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub(crate) fn i64_le(&mut self) -> Result<i64, ReadError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// CompactSize integer.
    pub(crate) fn varint(&mut self) -> Result<u64, ReadError> {
        match self.u8()? {
            0xFD => Ok(u64::from(self.u16_le()?)),
            0xFE => Ok(u64::from(self.u32_le()?)),
            0xFF => self.u64_le(),
            n => Ok(u64::from(n)),
        }
    }

    /// Length-prefixed string, bounded by `max` bytes.
    pub(crate) fn var_str(&mut self, max: usize) -> Result<String, ReadError> {
        let len = self.varint()?;
        if len > max as u64 {
            return Err(ReadError::Invalid("string length"));
        }
        let raw = self.bytes(len as usize)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}

/// Append a CompactSize integer.
pub(crate) fn write_varint(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xFC => out.push(n as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}
