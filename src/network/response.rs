use crate::prelude::*;

use super::wire::var;

macro_rules! response {
    {$server:ident, $world:ident; $($name:ident($($field:ident : $t:ty),*): $id:literal $e:expr)*} => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Response {
            $($name($($t),*),)*
        }
        impl Response {
            /// Encodes one length-prefixed packet into `buf`, for a client in
            /// world `$world`.
            pub fn write<'a>(&self, $server: &crate::Server, $world: usize, buf: &'a mut Vec<u8>) -> &'a [u8] {
                buf.clear();
                buf.extend([0; 5]);
                match self {
                    $(Response::$name($($field),*) => ToWire::encode(&($id as u8, $e), buf),)*
                }
                let n = var((buf.len() - 5) as u32);
                let start = 5 - n.byte_len();
                let mut prefix = Vec::with_capacity(5);
                n.encode(&mut prefix);
                buf[start..5].copy_from_slice(&prefix);
                &buf[start..]
            }
        }
    };
}
response! {
    server, world;
    Welcome(player: PlayerId, world_name: String): 0x00 (player.0, world_name.as_str())
    Pong(n: u64): 0x01 n
    LevelData(): 0x02 ToWireFn(|buf: &mut Vec<u8>| level_data(server, world, buf))
    SetBlock(pos: V3<i32>, block: Block): 0x03 (pos.x as i16, pos.y as i16, pos.z as i16, block)
    Message(text: String): 0x04 text.as_str()
}

/// Dimensions then every block, `x`-fastest. An unloaded map is sent as
/// zero-sized.
fn level_data(server: &crate::Server, world: usize, buf: &mut Vec<u8>) {
    match server.world(world).and_then(|w| w.map()) {
        Some(map) => {
            let dims = map.dims();
            (dims.x as i16, dims.y as i16, dims.z as i16).encode(buf);
            var(map.blocks().len() as u32).encode(buf);
            buf.extend_from_slice(map.blocks());
        }
        None => (0i16, 0i16, 0i16, var(0u32)).encode(buf),
    }
}

trait ToWire {
    fn encode(&self, buf: &mut Vec<u8>);
}
impl<T: ToWire + ?Sized> ToWire for &'_ T {
    fn encode(&self, buf: &mut Vec<u8>) {
        (**self).encode(buf)
    }
}
impl ToWire for str {
    fn encode(&self, buf: &mut Vec<u8>) {
        var(self.len() as u32).encode(buf);
        buf.extend_from_slice(self.as_bytes());
    }
}

const CONTINUE_BIT: u8 = 0b1000_0000;
impl var<u32> {
    fn byte_len(&self) -> usize {
        let mut i = 0;
        let mut n = self.0;
        while n & !((!CONTINUE_BIT) as u32) != 0 {
            i += 1;
            n >>= 7;
        }
        i + 1
    }
}
impl ToWire for var<u32> {
    fn encode(&self, buf: &mut Vec<u8>) {
        let mut n = self.0;
        while n & !((!CONTINUE_BIT) as u32) != 0 {
            buf.push(n as u8 & !CONTINUE_BIT | CONTINUE_BIT);
            n >>= 7;
        }
        buf.push(n as u8);
    }
}
struct ToWireFn<F: Fn(&mut Vec<u8>)>(F);
impl<F: Fn(&mut Vec<u8>)> ToWire for ToWireFn<F> {
    fn encode(&self, buf: &mut Vec<u8>) {
        (self.0)(buf)
    }
}
impl ToWire for Block {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.0)
    }
}

macro_rules! impl_tuple {
    ($a:ident $b:ident) => {
        impl<$a: ToWire, $b: ToWire> ToWire for ($a, $b) {
            fn encode(&self, buf: &mut Vec<u8>) {
                self.0.encode(buf);
                self.1.encode(buf);
            }
        }
    };
    ($i:ident $($t:tt)*) => {
        impl<$i: ToWire, $($t: ToWire),*> ToWire for ($i, $($t),*) {
            #[allow(non_snake_case)]
            fn encode(&self, buf: &mut Vec<u8>) {
                match self {
                    ($i, $($t),*) => ($i, ($($t,)*)).encode(buf)
                }
            }
        }
        impl_tuple!($($t)*);
    }
}
impl_tuple!(A B C D E);
macro_rules! impl_n {
    ($($t:ident)*) => {$(
        impl ToWire for $t {
            fn encode(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_be_bytes());
            }
        }
    )*};
}
impl_n! { u8 i16 i32 u64 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, WorldConfig};

    fn server(dir: &std::path::Path) -> crate::Server {
        let config = Config {
            data_dir: dir.to_owned(),
            worlds: vec![WorldConfig { name: "tiny".into(), width: 2, length: 2, height: 2 }],
            ..Config::default()
        };
        crate::Server::new(config).unwrap()
    }

    #[test]
    fn varint_lengths() {
        for (n, len) in [(0, 1), (127, 1), (128, 2), (16_383, 2), (16_384, 3), (u32::MAX, 5)] {
            let mut buf = vec![];
            var(n).encode(&mut buf);
            assert_eq!((buf.len(), var(n).byte_len()), (len, len));
            assert_eq!(super::super::wire::varint(&buf).map(|(v, _)| v as u32), Some(n));
        }
    }

    #[test]
    fn packets_are_length_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let mut buf = vec![];
        let pkt = Response::SetBlock(V3(1, 2, 3), Block::GLASS).write(&server, 0, &mut buf);
        assert_eq!(pkt, &[8, 0x03, 0, 1, 0, 2, 0, 3, 20]);

        let pkt = Response::Message("hi".into()).write(&server, 0, &mut buf);
        assert_eq!(pkt, &[4, 0x04, 2, b'h', b'i']);

        let pkt = Response::Welcome(PlayerId(1), "tiny".into()).write(&server, 0, &mut buf);
        assert_eq!(pkt, &[10, 0x00, 0, 0, 0, 1, 4, b't', b'i', b'n', b'y']);
    }

    #[test]
    fn level_data_carries_the_map() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let mut buf = vec![];
        let pkt = Response::LevelData().write(&server, 0, &mut buf).to_vec();
        let map = server.world(0).unwrap().map().unwrap();
        let mut expected = vec![16, 0x02, 0, 2, 0, 2, 0, 2, 8];
        expected.extend_from_slice(map.blocks());
        assert_eq!(pkt, expected);

        let pkt = Response::LevelData().write(&server, 7, &mut buf);
        assert_eq!(pkt, &[8, 0x02, 0, 0, 0, 0, 0, 0, 0]);
    }
}
