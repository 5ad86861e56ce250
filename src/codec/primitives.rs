//! Wire-level primitives shared by every opcode body: little-endian fixed
//! width integers come for free from `deku`'s derive; this module supplies
//! the two shapes the client uses that deku has no built-in for — a
//! length-prefixed, 8-bit-clean string, and a count-prefixed array.

use std::fmt::Debug;
use std::str::FromStr;

use anyhow::bail;
use deku::bitvec::{BitSlice, BitVec, Msb0};
use deku::prelude::*;

/// A string prefixed by a single `u8` length byte, holding raw (8-bit-clean)
/// bytes rather than a fixed-width buffer — the shape every room/host/
/// favorite/option sub-packet uses for names, passwords, and messages.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LenString(Vec<u8>);

impl LenString {
    pub fn as_str_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl<'a> DekuRead<'a> for LenString {
    fn read(
        input: &'a BitSlice<u8, Msb0>,
        ctx: (),
    ) -> Result<(&'a BitSlice<u8, Msb0>, Self), DekuError>
    where
        Self: Sized,
    {
        let (rest, len): (_, u8) = DekuRead::read(input, ctx)?;
        let (rest, bytes): (_, Vec<u8>) = Vec::read(rest, (deku::ctx::Limit::new_count(len as usize), ()))?;
        Ok((rest, LenString(bytes)))
    }
}

impl DekuWrite for LenString {
    fn write(&self, output: &mut BitVec<u8, Msb0>, ctx: ()) -> Result<(), DekuError> {
        if self.0.len() > u8::MAX as usize {
            return Err(DekuError::Assertion("LenString longer than 255 bytes".into()));
        }
        (self.0.len() as u8).write(output, ctx)?;
        self.0.write(output, ())?;
        Ok(())
    }
}

impl Debug for LenString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str_lossy().fmt(f)
    }
}

impl FromStr for LenString {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > u8::MAX as usize {
            bail!("string too long for LenString");
        }
        Ok(LenString(s.as_bytes().to_vec()))
    }
}

impl From<&str> for LenString {
    fn from(s: &str) -> Self {
        LenString(s.as_bytes().to_vec())
    }
}

impl From<String> for LenString {
    fn from(s: String) -> Self {
        LenString(s.into_bytes())
    }
}

/// An array prefixed by a `u16` element count — used for room lists,
/// member lists, and other repeated sub-packets.
#[derive(Clone, Debug, Default)]
pub struct CountedVec<T>(pub Vec<T>);

impl<'a, T> DekuRead<'a> for CountedVec<T>
where
    T: DekuRead<'a, ()>,
{
    fn read(
        input: &'a BitSlice<u8, Msb0>,
        ctx: (),
    ) -> Result<(&'a BitSlice<u8, Msb0>, Self), DekuError>
    where
        Self: Sized,
    {
        let (rest, count): (_, u16) = DekuRead::read(input, ctx)?;
        let (rest, items): (_, Vec<T>) =
            Vec::read(rest, (deku::ctx::Limit::new_count(count as usize), ()))?;
        Ok((rest, CountedVec(items)))
    }
}

impl<T> DekuWrite for CountedVec<T>
where
    T: DekuWrite,
{
    fn write(&self, output: &mut BitVec<u8, Msb0>, ctx: ()) -> Result<(), DekuError> {
        if self.0.len() > u16::MAX as usize {
            return Err(DekuError::Assertion("CountedVec longer than u16::MAX".into()));
        }
        (self.0.len() as u16).write(output, ctx)?;
        for item in &self.0 {
            item.write(output, ())?;
        }
        Ok(())
    }
}

impl<T> From<Vec<T>> for CountedVec<T> {
    fn from(v: Vec<T>) -> Self {
        CountedVec(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_string_round_trips() {
        let original = LenString::from("hello lobby");
        let mut out: BitVec<u8, Msb0> = BitVec::new();
        original.write(&mut out, ()).unwrap();
        let bytes = out.into_vec();
        let (rest, decoded) = LenString::read(BitSlice::from_slice(&bytes), ()).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded.as_str_lossy(), "hello lobby");
    }

    #[test]
    fn counted_vec_round_trips() {
        let original: CountedVec<u32> = vec![1, 2, 3, 4].into();
        let mut out: BitVec<u8, Msb0> = BitVec::new();
        original.write(&mut out, ()).unwrap();
        let bytes = out.into_vec();
        let (rest, decoded) = CountedVec::<u32>::read(BitSlice::from_slice(&bytes), ()).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded.0, vec![1, 2, 3, 4]);
    }
}
