//! Tile formats and the parser seam.
//!
//! Turning raw bytes into renderable data is the job of a [`TileParser`].
//! The crate ships [`RawParser`], which validates the payload against the
//! source's [`TileFormat`] and hands the bytes through unchanged.

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use super::TileAddress;

/// Parsed tile content. Concrete parsers choose the type; consumers
/// downcast with [`ParsedTileData::content_as`](super::ParsedTileData::content_as).
pub type ParsedContent = Arc<dyn Any + Send + Sync>;

/// Errors produced while parsing a tile payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Tile {0} has no data")]
    Empty(String),

    #[error("Tile {address} is not valid {format}: {reason}")]
    InvalidFormat {
        address: String,
        format: TileFormat,
        reason: String,
    },

    #[error("Tile {address} could not be parsed: {reason}")]
    Other { address: String, reason: String },
}

/// Payload format served by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileFormat {
    GeoJson,
    TopoJson,
    #[default]
    Mvt,
    Raster,
}

impl TileFormat {
    /// MIME type advertised for the format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            TileFormat::GeoJson => "application/geo+json",
            TileFormat::TopoJson => "application/topo+json",
            TileFormat::Mvt => "application/vnd.mapbox-vector-tile",
            TileFormat::Raster => "image/png",
        }
    }

    /// Name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            TileFormat::GeoJson => "geojson",
            TileFormat::TopoJson => "topojson",
            TileFormat::Mvt => "mvt",
            TileFormat::Raster => "raster",
        }
    }

    /// Check that `data` plausibly holds this format.
    ///
    /// JSON formats must be UTF-8 text opening an object. Raster tiles must
    /// start with a PNG, JPEG or WebP signature. Vector tiles are protobuf
    /// and only need to be non-empty.
    pub fn validate(&self, data: &[u8]) -> Result<(), String> {
        match self {
            TileFormat::GeoJson | TileFormat::TopoJson => {
                let text = std::str::from_utf8(data).map_err(|e| e.to_string())?;
                match text.trim_start().chars().next() {
                    Some('{') => Ok(()),
                    Some(c) => Err(format!("expected a JSON object, found '{}'", c)),
                    None => Err("blank document".to_string()),
                }
            }
            TileFormat::Raster => {
                const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
                const JPEG: &[u8] = b"\xff\xd8\xff";
                let is_webp = data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP";
                if data.starts_with(PNG) || data.starts_with(JPEG) || is_webp {
                    Ok(())
                } else {
                    Err("unrecognised image signature".to_string())
                }
            }
            TileFormat::Mvt => Ok(()),
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geojson" | "json" => Ok(TileFormat::GeoJson),
            "topojson" => Ok(TileFormat::TopoJson),
            "mvt" | "pbf" => Ok(TileFormat::Mvt),
            "raster" | "png" | "jpg" | "jpeg" | "webp" => Ok(TileFormat::Raster),
            other => Err(format!(
                "unknown tile format '{}', expected geojson, topojson, mvt or raster",
                other
            )),
        }
    }
}

/// Turns a raw payload into structured tile data.
///
/// Runs on the thread that asked for the tile, never on a fetch worker.
pub trait TileParser: Send + Sync {
    fn parse(&self, address: &TileAddress, data: &Bytes) -> Result<ParsedContent, ParseError>;
}

/// Validates the payload format and passes the bytes through as [`Bytes`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RawParser {
    format: TileFormat,
}

impl RawParser {
    pub fn new(format: TileFormat) -> Self {
        Self { format }
    }
}

impl TileParser for RawParser {
    fn parse(&self, address: &TileAddress, data: &Bytes) -> Result<ParsedContent, ParseError> {
        if data.is_empty() {
            return Err(ParseError::Empty(address.to_string()));
        }
        self.format
            .validate(data)
            .map_err(|reason| ParseError::InvalidFormat {
                address: address.to_string(),
                format: self.format,
                reason,
            })?;
        Ok(Arc::new(data.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> TileAddress {
        TileAddress::new(1, 2, 3)
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(TileFormat::GeoJson.mime_type(), "application/geo+json");
        assert_eq!(TileFormat::TopoJson.mime_type(), "application/topo+json");
        assert_eq!(
            TileFormat::Mvt.mime_type(),
            "application/vnd.mapbox-vector-tile"
        );
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("GeoJSON".parse::<TileFormat>(), Ok(TileFormat::GeoJson));
        assert_eq!("pbf".parse::<TileFormat>(), Ok(TileFormat::Mvt));
        assert_eq!("png".parse::<TileFormat>(), Ok(TileFormat::Raster));
        assert!("svg".parse::<TileFormat>().is_err());
    }

    #[test]
    fn test_raw_parser_passes_bytes_through() {
        let parser = RawParser::new(TileFormat::GeoJson);
        let data = Bytes::from_static(br#"{"type":"FeatureCollection","features":[]}"#);
        let content = parser.parse(&address(), &data).unwrap();
        assert_eq!(content.downcast_ref::<Bytes>(), Some(&data));
    }

    #[test]
    fn test_raw_parser_rejects_empty() {
        let parser = RawParser::new(TileFormat::Mvt);
        assert!(matches!(
            parser.parse(&address(), &Bytes::new()),
            Err(ParseError::Empty(_))
        ));
    }

    #[test]
    fn test_raw_parser_rejects_malformed_json() {
        let parser = RawParser::new(TileFormat::TopoJson);
        let err = parser
            .parse(&address(), &Bytes::from_static(b"<html>not found</html>"))
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidFormat { format: TileFormat::TopoJson, .. }));
    }

    #[test]
    fn test_raster_signatures() {
        assert!(TileFormat::Raster.validate(b"\x89PNG\r\n\x1a\n....").is_ok());
        assert!(TileFormat::Raster.validate(b"\xff\xd8\xff\xe0").is_ok());
        assert!(TileFormat::Raster.validate(b"RIFF\0\0\0\0WEBPVP8 ").is_ok());
        assert!(TileFormat::Raster.validate(b"GIF89a").is_err());
    }
}
