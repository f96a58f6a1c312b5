use crate::prelude::*;

use super::Disconnection;

#[derive(Debug, Clone, Copy)]
pub struct var<T>(pub T);
pub trait Wire<'a>: Sized {
    fn decode(pkt: &'a [u8]) -> Result<(Self, &'a [u8]), Disconnection>;
}
macro_rules! impl_wire {
    {} => {};
    {$t:ident $($rt:ident)*} => {
        impl<'a, $t: Wire<'a>, $($rt: Wire<'a>),*> Wire<'a> for ($t,$($rt,)*) {
            #[allow(non_snake_case)]
            fn decode(pkt: &'a [u8]) -> Result<(Self, &[u8]), Disconnection> {
                let ($t, pkt) = $t::decode(pkt)?;
                $(let ($rt, pkt) = $rt::decode(pkt)?;)*
                Ok((($t, $($rt,)*), pkt))
            }
        }
        impl_wire!($($rt)*);
    }
}
impl_wire!(A B C D E F);
impl<'a, T: Wire<'a>> Wire<'a> for V3<T> {
    fn decode(pkt: &'a [u8]) -> Result<(Self, &[u8]), Disconnection> {
        let ((x, y, z), pkt) = Wire::decode(pkt)?;
        Ok((Self { x, y, z }, pkt))
    }
}
impl Wire<'_> for var<i32> {
    fn decode(pkt: &[u8]) -> Result<(Self, &[u8]), Disconnection> {
        varint(pkt).map(|(n, rem)| (Self(n), rem)).ok_or(Disconnection::new())
    }
}
impl Wire<'_> for u8 {
    fn decode(pkt: &[u8]) -> Result<(Self, &[u8]), Disconnection> {
        byte(pkt).ok_or(Disconnection::new())
    }
}
impl<'a> Wire<'a> for &'a [u8] {
    fn decode(pkt: &'a [u8]) -> Result<(Self, &[u8]), Disconnection> {
        str(pkt).ok_or(Disconnection::new())
    }
}
impl<'a> Wire<'a> for &'a str {
    fn decode(pkt: &'a [u8]) -> Result<(Self, &'a [u8]), Disconnection> {
        Wire::decode(pkt).and_then(|(buf, rem)| Ok((std::str::from_utf8(buf).map_err(|_| Disconnection::new())?, rem)))
    }
}
impl Wire<'_> for i16 {
    fn decode(pkt: &[u8]) -> Result<(Self, &[u8]), Disconnection> {
        i16(pkt).ok_or(Disconnection::new())
    }
}
impl Wire<'_> for u64 {
    fn decode(pkt: &[u8]) -> Result<(Self, &[u8]), Disconnection> {
        u64(pkt).ok_or(Disconnection::new())
    }
}
/// Only ids of defined blocks are accepted from clients.
impl Wire<'_> for Block {
    fn decode(pkt: &[u8]) -> Result<(Self, &[u8]), Disconnection> {
        let (id, rem) = u8::decode(pkt)?;
        Some(Block(id)).filter(|b| b.is_defined()).map(|b| (b, rem)).ok_or(Disconnection::new())
    }
}
impl Wire<'_> for Name {
    fn decode(pkt: &[u8]) -> Result<(Self, &[u8]), Disconnection> {
        let (name, rem): (&str, _) = Wire::decode(pkt)?;
        Name::new(name).map(|n| (n, rem)).ok_or(Disconnection::new())
    }
}

pub fn byte(buf: &[u8]) -> Option<(u8, &[u8])> {
    buf.split_first().map(|(&b, r)| (b, r))
}
macro_rules! be {
    { $($i:ident)* } => {
        $(
            pub fn $i(buf: &[u8]) -> Option<($i, &[u8])> {
                let (n, rem) = buf.split_at_checked(core::mem::size_of::<$i>())?;
                Some(($i::from_be_bytes(n.try_into().ok()?), rem))
            }
        )*
    }
}
be! { i16 u64 }

pub fn varint(buf: &[u8]) -> Option<(i32, &[u8])> {
    let mut n = 0u32;
    let mut i = 0;
    loop {
        let b = *buf.get(i)?;
        n |= (b as u32 & 0b111_1111) << (7 * i);
        i += 1;
        if b >> 7 == 0 || i == 5 {
            break;
        }
    }
    Some((i32::from_ne_bytes(n.to_ne_bytes()), &buf[i..]))
}
/// A varint length followed by that many bytes. Also how every packet is framed.
pub fn str(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    let (l, rem) = varint(buf)?;
    let l = usize::try_from(l).ok()?;
    (l <= rem.len()).then(|| rem.split_at(l))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varints() {
        assert_eq!(varint(&[0x00]), Some((0, &[][..])));
        assert_eq!(varint(&[0xac, 0x02, 0xff]), Some((300, &[0xff][..])));
        assert_eq!(varint(&[0xff, 0xff, 0xff, 0xff, 0x0f]), Some((-1, &[][..])));
        assert_eq!(varint(&[0x80]), None);
    }

    #[test]
    fn framing_waits_for_whole_packets() {
        assert_eq!(str(&[3, 1, 2, 3, 9]), Some((&[1, 2, 3][..], &[9][..])));
        assert_eq!(str(&[3, 1, 2]), None);
        // negative lengths never frame
        assert_eq!(str(&[0xff, 0xff, 0xff, 0xff, 0x0f, 1]), None);
    }

    #[test]
    fn decodes_block_edits() {
        let pkt = [0, 1, 0xff, 0xfe, 0, 3, 4, 7];
        let ((pos, block), rem): ((V3<i16>, Block), _) = Wire::decode(&pkt[..]).unwrap();
        assert_eq!(pos, V3(1, -2, 3));
        assert_eq!(block, Block::COBBLESTONE);
        assert_eq!(rem, &[7]);
        assert!(<(V3<i16>, Block)>::decode(&[0, 0, 0, 0, 0, 0, 200]).is_err());
    }

    #[test]
    fn decodes_names() {
        let (name, _) = Name::decode(&[5, b'a', b'l', b'i', b'c', b'e']).unwrap();
        assert_eq!(name.as_str(), "alice");
        let mut long = vec![17];
        long.extend([b'a'; 17]);
        assert!(Name::decode(&long).is_err());
        assert!(Name::decode(&[2, b'a', b' ']).is_err());
    }
}
