//! Small value types shared by the world, the change log and the network.

/// Block coordinates. `z` is the vertical axis ("h" in map terms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct V3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}
#[allow(non_snake_case)]
pub const fn V3<T>(x: T, y: T, z: T) -> V3<T> {
    V3 { x, y, z }
}
impl<T: Copy + Ord> V3<T> {
    pub fn min(self, other: Self) -> Self {
        V3(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }
    pub fn max(self, other: Self) -> Self {
        V3(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}
impl V3<i32> {
    /// Narrows to the 16-bit coordinates stored in change records.
    pub fn to_record(self) -> Option<V3<i16>> {
        Some(V3(
            self.x.try_into().ok()?,
            self.y.try_into().ok()?,
            self.z.try_into().ok()?,
        ))
    }
}
impl From<V3<i16>> for V3<i32> {
    fn from(v: V3<i16>) -> Self {
        V3(v.x.into(), v.y.into(), v.z.into())
    }
}
impl<T: std::fmt::Display> std::fmt::Display for V3<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

/// Numeric identity of whoever made a change. Foreign key into the player directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i32);
impl PlayerId {
    /// Changes made by the server itself (console commands, scripted edits).
    pub const CONSOLE: PlayerId = PlayerId(-1);
}

/// An 8-bit block id. Ids 0..=49 are the known block types, 255 means "none".
/// Any other byte can still round-trip through the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block(pub u8);

macro_rules! blocks {
    {$($id:literal $name:ident $text:literal)*} => {
        impl Block {
            $(pub const $name: Block = Block($id);)*
            pub const NONE: Block = Block(255);

            pub fn name(self) -> &'static str {
                match self.0 {
                    $($id => $text,)*
                    255 => "none",
                    _ => "unknown",
                }
            }
            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($text => Some(Self::$name),)*
                    _ => None,
                }
            }
        }
    };
}
blocks! {
    0 AIR "air"
    1 STONE "stone"
    2 GRASS "grass"
    3 DIRT "dirt"
    4 COBBLESTONE "cobblestone"
    5 WOOD "wood"
    6 PLANT "plant"
    7 ADMINCRETE "admincrete"
    8 WATER "water"
    9 STILL_WATER "stillwater"
    10 LAVA "lava"
    11 STILL_LAVA "stilllava"
    12 SAND "sand"
    13 GRAVEL "gravel"
    14 GOLD_ORE "goldore"
    15 IRON_ORE "ironore"
    16 COAL "coal"
    17 LOG "log"
    18 LEAVES "leaves"
    19 SPONGE "sponge"
    20 GLASS "glass"
    21 RED "red"
    22 ORANGE "orange"
    23 YELLOW "yellow"
    24 LIME "lime"
    25 GREEN "green"
    26 TEAL "teal"
    27 AQUA "aqua"
    28 CYAN "cyan"
    29 BLUE "blue"
    30 INDIGO "indigo"
    31 VIOLET "violet"
    32 MAGENTA "magenta"
    33 PINK "pink"
    34 BLACK "black"
    35 GRAY "gray"
    36 WHITE "white"
    37 YELLOW_FLOWER "yellowflower"
    38 RED_FLOWER "redflower"
    39 BROWN_MUSHROOM "brownmushroom"
    40 RED_MUSHROOM "redmushroom"
    41 GOLD "gold"
    42 IRON "iron"
    43 DOUBLE_STAIR "doublestair"
    44 STAIR "stair"
    45 BRICK "brick"
    46 TNT "tnt"
    47 BOOKS "books"
    48 MOSSY_ROCKS "mossyrocks"
    49 OBSIDIAN "obsidian"
}
impl Block {
    pub fn is_defined(self) -> bool {
        self.0 <= Self::OBSIDIAN.0
    }
}
impl std::str::FromStr for Block {
    type Err = ();
    /// Accepts either a block name or its numeric id.
    fn from_str(s: &str) -> Result<Self, ()> {
        match s.parse::<u8>() {
            Ok(id) if Block(id).is_defined() => Ok(Block(id)),
            Ok(_) => Err(()),
            Err(_) => Self::from_name(&s.to_ascii_lowercase()).ok_or(()),
        }
    }
}

/// A player name: 1 to 16 bytes of `[A-Za-z0-9_.]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name {
    bytes: [u8; 16],
    len: u8,
}
impl Name {
    pub fn new(name: &str) -> Option<Self> {
        let valid = |b: &u8| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'.';
        if name.is_empty() || name.len() > 16 || !name.bytes().all(|b| valid(&b)) {
            return None;
        }
        let mut bytes = [0; 16];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Some(Self { bytes, len: name.len() as u8 })
    }
    pub fn as_str(&self) -> &str {
        // only ascii is ever stored
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }
}
impl std::fmt::Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}
impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_names_parse() {
        assert_eq!("Stone".parse(), Ok(Block::STONE));
        assert_eq!("49".parse(), Ok(Block::OBSIDIAN));
        assert_eq!("50".parse::<Block>(), Err(()));
        assert_eq!("bedrock".parse::<Block>(), Err(()));
        assert_eq!(Block::NONE.name(), "none");
        assert!(!Block::NONE.is_defined());
    }

    #[test]
    fn names_are_validated() {
        assert_eq!(Name::new("notch").unwrap().as_str(), "notch");
        assert!(Name::new("").is_none());
        assert!(Name::new("seventeen_letters").is_none());
        assert!(Name::new("no spaces").is_none());
    }

    #[test]
    fn record_coordinates_narrow() {
        assert_eq!(V3(1, -2, 3).to_record(), Some(V3(1i16, -2, 3)));
        assert_eq!(V3(40_000, 0, 0).to_record(), None);
    }
}
