use serde::{Deserialize, Deserializer, de};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// Colour with alpha; parsed from `#RRGGBB`, `#RRGGBBAA` (leading `#` optional)
/// or `r,g,b[,a]` decimal components.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba(pub image::Rgba<u8>);

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(image::Rgba([r, g, b, a]))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseColorError(String);

impl Display for ParseColorError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "invalid colour `{}`", self.0)
    }
}

impl std::error::Error for ParseColorError {}

impl FromStr for Rgba {
    type Err = ParseColorError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let error = || ParseColorError(string.to_owned());

        let trimmed = string.trim();

        if trimmed.contains(',') {
            let parts = trimmed
                .split(',')
                .map(|part| part.trim().parse::<u8>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| error())?;

            return match parts[..] {
                [r, g, b] => Ok(Self::new(r, g, b, 255)),
                [r, g, b, a] => Ok(Self::new(r, g, b, a)),
                _ => Err(error()),
            };
        }

        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(error());
        }

        let color = u32::from_str_radix(hex, 16).map_err(|_| error())?;

        match hex.len() {
            6 => {
                let [_, r, g, b] = color.to_be_bytes();

                Ok(Self::new(r, g, b, 255))
            }
            8 => {
                let [r, g, b, a] = color.to_be_bytes();

                Ok(Self::new(r, g, b, a))
            }
            _ => Err(error()),
        }
    }
}

impl Display for Rgba {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0.0;

        write!(formatter, "{r},{g},{b},{a}")
    }
}

impl<'de> Deserialize<'de> for Rgba {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_with_and_without_alpha() {
        assert_eq!("#FFFFFF00".parse(), Ok(Rgba::new(255, 255, 255, 0)));
        assert_eq!("102030".parse(), Ok(Rgba::new(0x10, 0x20, 0x30, 255)));
    }

    #[test]
    fn parses_decimal_components() {
        assert_eq!("255, 255, 255, 10".parse(), Ok(Rgba::new(255, 255, 255, 10)));
        assert_eq!("0,0,0".parse(), Ok(Rgba::new(0, 0, 0, 255)));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!("#FFF".parse::<Rgba>().is_err());
        assert!("1,2".parse::<Rgba>().is_err());
        assert!("300,0,0".parse::<Rgba>().is_err());
        assert!("+12345".parse::<Rgba>().is_err());
    }

    #[test]
    fn displays_as_decimal_components() {
        assert_eq!(Rgba::new(1, 2, 3, 4).to_string(), "1,2,3,4");
    }
}
