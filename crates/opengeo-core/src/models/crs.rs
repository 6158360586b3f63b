//! Coordinate reference system tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System identified by EPSG code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
    pub name: String,
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl Crs {
    pub fn new(epsg: u32, name: impl Into<String>) -> Self {
        Self { epsg, name: name.into() }
    }

    /// WGS 84 (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::new(4326, "WGS 84")
    }

    /// Web Mercator (EPSG:3857)
    pub fn web_mercator() -> Self {
        Self::new(3857, "Web Mercator")
    }

    /// Build a CRS from a bare EPSG code, naming the common ones
    pub fn from_epsg(epsg: u32) -> Self {
        match epsg {
            4326 => Self::wgs84(),
            3857 => Self::web_mercator(),
            32601..=32660 => Self::new(epsg, format!("WGS 84 / UTM zone {}N", epsg - 32600)),
            32701..=32760 => Self::new(epsg, format!("WGS 84 / UTM zone {}S", epsg - 32700)),
            _ => Self::new(epsg, format!("EPSG:{}", epsg)),
        }
    }

    /// Parse `"EPSG:32633"`, `"epsg:4326"` or a bare code
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return None,
            None => trimmed,
        };
        code.trim().parse::<u32>().ok().map(Self::from_epsg)
    }

    /// Authority string understood by PROJ, e.g. `EPSG:4326`
    pub fn code(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        self.epsg == 4326
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authority_codes() {
        assert_eq!(Crs::parse("EPSG:32633").unwrap().epsg, 32633);
        assert_eq!(Crs::parse("epsg:4326").unwrap(), Crs::wgs84());
        assert_eq!(Crs::parse("3857").unwrap(), Crs::web_mercator());
        assert!(Crs::parse("ESRI:102100").is_none());
        assert!(Crs::parse("not-a-crs").is_none());
    }

    #[test]
    fn test_utm_names() {
        assert_eq!(Crs::from_epsg(32643).name, "WGS 84 / UTM zone 43N");
        assert_eq!(Crs::from_epsg(32750).name, "WGS 84 / UTM zone 50S");
    }
}
