use super::ClassfileError;

/// Big-endian cursor over a classfile or one of its attribute bodies.
pub(crate) struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn ensure(&self, needed: usize) -> Result<(), ClassfileError> {
        if self.remaining() < needed {
            return Err(ClassfileError::UnexpectedEof {
                offset: self.pos,
                needed,
            });
        }
        Ok(())
    }

    pub(crate) fn expect_magic(&mut self) -> Result<(), ClassfileError> {
        const MAGIC: u32 = 0xCAFE_BABE;
        let found = self.read_u4()?;
        if found != MAGIC {
            return Err(ClassfileError::InvalidMagic { found });
        }
        Ok(())
    }

    pub(crate) fn read_u1(&mut self) -> Result<u8, ClassfileError> {
        self.ensure(1)?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    pub(crate) fn read_u2(&mut self) -> Result<u16, ClassfileError> {
        self.ensure(2)?;
        let value = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    pub(crate) fn read_u4(&mut self) -> Result<u32, ClassfileError> {
        self.ensure(4)?;
        let value = u32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(value)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u64, ClassfileError> {
        let high = u64::from(self.read_u4()?);
        let low = u64::from(self.read_u4()?);
        Ok((high << 32) | low)
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassfileError> {
        self.ensure(len)?;
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), ClassfileError> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }
}
