use serde::{Deserialize, Serialize};

/// Straight (non-premultiplied) RGBA8 color used by caption styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    pub(crate) fn to_cpu_color(self) -> vello_cpu::peniko::Color {
        vello_cpu::peniko::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

impl std::str::FromStr for Rgba8 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            "transparent" => return Ok(Self::TRANSPARENT),
            _ => {}
        }
        parse_hex(s)
    }
}

impl Serialize for Rgba8 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgba8 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Arr(Vec<u8>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Arr(v) => match v.as_slice() {
                [r, g, b] => Ok(Self::rgb(*r, *g, *b)),
                [r, g, b, a] => Ok(Self::rgba(*r, *g, *b, *a)),
                _ => Err(serde::de::Error::custom(
                    "rgba array must have len 3 ([r,g,b]) or 4 ([r,g,b,a])",
                )),
            },
        }
    }
}

fn parse_hex(s: &str) -> Result<Rgba8, String> {
    let hex = s.strip_prefix('#').unwrap_or(s);

    fn hex_byte(pair: &str) -> Result<u8, String> {
        u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte \"{pair}\""))
    }

    fn hex_nibble(c: &str) -> Result<u8, String> {
        let v = u8::from_str_radix(c, 16).map_err(|_| format!("invalid hex digit \"{c}\""))?;
        Ok(v * 17)
    }

    if !hex.is_ascii() {
        return Err(format!("invalid color \"{s}\""));
    }

    match hex.len() {
        3 => Ok(Rgba8::rgb(
            hex_nibble(&hex[0..1])?,
            hex_nibble(&hex[1..2])?,
            hex_nibble(&hex[2..3])?,
        )),
        6 => Ok(Rgba8::rgb(
            hex_byte(&hex[0..2])?,
            hex_byte(&hex[2..4])?,
            hex_byte(&hex[4..6])?,
        )),
        8 => Ok(Rgba8::rgba(
            hex_byte(&hex[0..2])?,
            hex_byte(&hex[2..4])?,
            hex_byte(&hex[4..6])?,
            hex_byte(&hex[6..8])?,
        )),
        _ => Err("color must be #RGB, #RRGGBB, #RRGGBBAA or a named color".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_hex_forms() {
        let c: Rgba8 = serde_json::from_value(json!("#fff")).unwrap();
        assert_eq!(c, Rgba8::WHITE);

        let c: Rgba8 = serde_json::from_value(json!("#ff0000")).unwrap();
        assert_eq!(c, Rgba8::rgb(255, 0, 0));

        let c: Rgba8 = serde_json::from_value(json!("#0000ff80")).unwrap();
        assert_eq!(c, Rgba8::rgba(0, 0, 255, 128));
    }

    #[test]
    fn parses_names_and_arrays() {
        let c: Rgba8 = serde_json::from_value(json!("Black")).unwrap();
        assert_eq!(c, Rgba8::BLACK);

        let c: Rgba8 = serde_json::from_value(json!([10, 20, 30])).unwrap();
        assert_eq!(c, Rgba8::rgb(10, 20, 30));

        assert!(serde_json::from_value::<Rgba8>(json!([1, 2])).is_err());
        assert!(serde_json::from_value::<Rgba8>(json!("#12345")).is_err());
        assert!(serde_json::from_value::<Rgba8>(json!("#zzz")).is_err());
    }

    #[test]
    fn serializes_as_hex() {
        assert_eq!(serde_json::to_value(Rgba8::WHITE).unwrap(), json!("#ffffff"));
        assert_eq!(
            serde_json::to_value(Rgba8::rgba(1, 2, 3, 4)).unwrap(),
            json!("#01020304")
        );
    }
}
