//! Structural scan of a big-endian NBT blob to find its end.
//!
//! The typed codec treats embedded NBT as an opaque byte span; only the
//! framing (tag ids, name lengths, element counts) is interpreted here.
//! Decoding into tags is the NBT crate's job.

use crate::error::ProtoError;

const MAX_DEPTH: usize = 512;

/// Length in bytes of the NBT value at the start of `data`. In the
/// anonymous form the root carries no name; a lone zero tag-id is an empty
/// blob in either form.
pub fn nbt_span(data: &[u8], anonymous: bool) -> Result<usize, ProtoError> {
    let mut scan = Scan { buf: data, pos: 0 };
    let tag = scan.u8()?;
    if tag == 0 {
        return Ok(scan.pos);
    }
    if !anonymous {
        scan.skip_name()?;
    }
    scan.payload(tag, 0)?;
    Ok(scan.pos)
}

struct Scan<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Scan<'_> {
    fn skip(&mut self, n: usize) -> Result<(), ProtoError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(ProtoError::BufferTooShort {
                needed: n,
                remaining,
            });
        }
        self.pos += n;
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, ProtoError> {
        let b = self.buf.get(self.pos).copied().ok_or(ProtoError::BufferTooShort {
            needed: 1,
            remaining: 0,
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, ProtoError> {
        self.skip(2)?;
        Ok(u16::from_be_bytes([
            self.buf[self.pos - 2],
            self.buf[self.pos - 1],
        ]))
    }

    fn i32(&mut self) -> Result<i32, ProtoError> {
        self.skip(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.buf[self.pos - 4..self.pos]);
        Ok(i32::from_be_bytes(raw))
    }

    fn count(&mut self) -> Result<usize, ProtoError> {
        // Negative counts are treated as empty, as vanilla does.
        Ok(self.i32()?.max(0) as usize)
    }

    fn skip_name(&mut self) -> Result<(), ProtoError> {
        let len = self.u16()? as usize;
        self.skip(len)
    }

    fn payload(&mut self, tag: u8, depth: usize) -> Result<(), ProtoError> {
        if depth > MAX_DEPTH {
            return Err(ProtoError::BadValue {
                expected: "nbt",
                got: "nesting too deep".into(),
            });
        }
        match tag {
            1 => self.skip(1),
            2 => self.skip(2),
            3 | 5 => self.skip(4),
            4 | 6 => self.skip(8),
            7 => {
                let n = self.count()?;
                self.skip(n)
            }
            8 => {
                let n = self.u16()? as usize;
                self.skip(n)
            }
            9 => {
                let elem = self.u8()?;
                let n = self.count()?;
                for _ in 0..n {
                    self.payload(elem, depth + 1)?;
                }
                Ok(())
            }
            10 => {
                loop {
                    let child = self.u8()?;
                    if child == 0 {
                        return Ok(());
                    }
                    self.skip_name()?;
                    self.payload(child, depth + 1)?;
                }
            }
            11 => {
                let n = self.count()?;
                self.skip(n * 4)
            }
            12 => {
                let n = self.count()?;
                self.skip(n * 8)
            }
            other => Err(ProtoError::BadValue {
                expected: "nbt",
                got: format!("tag {other}"),
            }),
        }
    }
}
