//! Tile URL templates.
//!
//! A template is a URL with placeholders:
//!
//! | Placeholder | Replaced with |
//! |-------------|---------------|
//! | `{x}` | tile column |
//! | `{y}` | tile row (flipped for TMS servers) |
//! | `{z}` | source zoom |
//! | `{s}` | next subdomain, round robin |
//! | `{q}` | quadkey |

use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use crate::tile::TileAddress;

const PLACEHOLDERS: [&str; 5] = ["{x}", "{y}", "{z}", "{s}", "{q}"];

/// URL template errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlTemplateError {
    #[error("URL template is empty")]
    Empty,

    #[error("URL template '{0}' must contain {{x}}, {{y}} and {{z}}, or {{q}}")]
    MissingCoordinates(String),

    #[error("URL template '{0}' uses {{s}} but no subdomains are configured")]
    MissingSubdomains(String),

    #[error("URL template '{template}' contains unknown placeholder '{placeholder}'")]
    UnknownPlaceholder {
        template: String,
        placeholder: String,
    },
}

/// Builds tile URLs from a validated template.
#[derive(Debug)]
pub struct UrlTemplate {
    template: String,
    subdomains: Vec<String>,
    tms: bool,
    next_subdomain: AtomicUsize,
}

impl UrlTemplate {
    /// Validate `template` and prepare it for use.
    ///
    /// # Example
    ///
    /// ```
    /// use quadfetch::source::UrlTemplate;
    /// use quadfetch::tile::TileAddress;
    ///
    /// let template = UrlTemplate::new("https://tiles.example.com/{z}/{x}/{y}.mvt").unwrap();
    /// assert_eq!(
    ///     template.build(&TileAddress::new(19295, 24641, 16)),
    ///     "https://tiles.example.com/16/19295/24641.mvt"
    /// );
    /// ```
    pub fn new(template: impl Into<String>) -> Result<Self, UrlTemplateError> {
        Self::with_options(template, Vec::new(), false)
    }

    /// Template with subdomains for `{s}` and optional TMS row numbering.
    pub fn with_options(
        template: impl Into<String>,
        subdomains: Vec<String>,
        tms: bool,
    ) -> Result<Self, UrlTemplateError> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(UrlTemplateError::Empty);
        }

        let mut rest = template.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            let placeholder = &rest[start..start + len + 1];
            if !PLACEHOLDERS.contains(&placeholder) {
                return Err(UrlTemplateError::UnknownPlaceholder {
                    template: template.clone(),
                    placeholder: placeholder.to_string(),
                });
            }
            rest = &rest[start + len + 1..];
        }

        let has_xyz = ["{x}", "{y}", "{z}"].iter().all(|p| template.contains(p));
        if !has_xyz && !template.contains("{q}") {
            return Err(UrlTemplateError::MissingCoordinates(template));
        }
        if template.contains("{s}") && subdomains.is_empty() {
            return Err(UrlTemplateError::MissingSubdomains(template));
        }

        Ok(Self {
            template,
            subdomains,
            tms,
            next_subdomain: AtomicUsize::new(0),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn is_tms(&self) -> bool {
        self.tms
    }

    pub fn subdomains(&self) -> &[String] {
        &self.subdomains
    }

    /// URL for `address`. Each call that uses `{s}` advances the subdomain
    /// rotation.
    pub fn build(&self, address: &TileAddress) -> String {
        let y = if self.tms { address.tms_y() } else { address.y };
        let mut url = self
            .template
            .replace("{x}", &address.x.to_string())
            .replace("{y}", &y.to_string())
            .replace("{z}", &address.z.to_string());

        if url.contains("{q}") {
            url = url.replace("{q}", &address.quadkey());
        }
        if url.contains("{s}") && !self.subdomains.is_empty() {
            let index = self.next_subdomain.fetch_add(1, Ordering::Relaxed) % self.subdomains.len();
            url = url.replace("{s}", &self.subdomains[index]);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xyz_template() {
        let template = UrlTemplate::new("https://t.example/{z}/{x}/{y}.png").unwrap();
        assert_eq!(
            template.build(&TileAddress::new(3, 5, 4)),
            "https://t.example/4/3/5.png"
        );
    }

    #[test]
    fn test_tms_flips_rows() {
        let template =
            UrlTemplate::with_options("https://t.example/{z}/{x}/{y}.png", Vec::new(), true)
                .unwrap();
        assert_eq!(
            template.build(&TileAddress::new(0, 1, 2)),
            "https://t.example/2/0/2.png"
        );
    }

    #[test]
    fn test_quadkey_template() {
        let template = UrlTemplate::new("https://t.example/tiles/a{q}.jpeg").unwrap();
        assert_eq!(
            template.build(&TileAddress::new(3, 5, 3)),
            "https://t.example/tiles/a213.jpeg"
        );
    }

    #[test]
    fn test_subdomains_rotate() {
        let template = UrlTemplate::with_options(
            "https://{s}.t.example/{z}/{x}/{y}",
            vec!["a".into(), "b".into(), "c".into()],
            false,
        )
        .unwrap();
        let address = TileAddress::new(0, 0, 0);
        let hosts: Vec<_> = (0..4).map(|_| template.build(&address)).collect();
        assert_eq!(
            hosts,
            vec![
                "https://a.t.example/0/0/0",
                "https://b.t.example/0/0/0",
                "https://c.t.example/0/0/0",
                "https://a.t.example/0/0/0",
            ]
        );
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(UrlTemplate::new("  ").unwrap_err(), UrlTemplateError::Empty);
    }

    #[test]
    fn test_rejects_missing_coordinates() {
        assert!(matches!(
            UrlTemplate::new("https://t.example/{z}/{x}"),
            Err(UrlTemplateError::MissingCoordinates(_))
        ));
    }

    #[test]
    fn test_rejects_subdomain_without_list() {
        assert!(matches!(
            UrlTemplate::new("https://{s}.t.example/{z}/{x}/{y}"),
            Err(UrlTemplateError::MissingSubdomains(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_placeholder() {
        let err = UrlTemplate::new("https://t.example/{z}/{x}/{y}?key={apikey}").unwrap_err();
        assert_eq!(
            err,
            UrlTemplateError::UnknownPlaceholder {
                template: "https://t.example/{z}/{x}/{y}?key={apikey}".into(),
                placeholder: "{apikey}".into(),
            }
        );
    }
}
