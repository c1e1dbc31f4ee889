//! Image delivery: turns opaque media identifiers into renderable URLs.
//!
//! The platform stores images as `wix:image://v1/<id>/<file>#originWidth=..`
//! identifiers, bare media IDs, or (for some legacy items) absolute URLs.
//! Everything resolves to a scaled-to-fill CDN URL; missing identifiers
//! resolve to a local placeholder.

/// Image shown when an item has no media.
pub const PLACEHOLDER_IMAGE: &str = "/static/images/placeholder.svg";

const MEDIA_SCHEME: &str = "wix:image://v1/";

/// Image display data for templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageView {
    pub src: String,
    pub alt: String,
    pub width: u32,
    pub height: u32,
}

/// Resolves media identifiers against the platform's media CDN.
#[derive(Debug, Clone)]
pub struct MediaResolver {
    base_url: String,
}

impl MediaResolver {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// URL of the image scaled to fill `width` x `height`.
    ///
    /// Returns [`PLACEHOLDER_IMAGE`] when the identifier is absent or blank.
    #[must_use]
    pub fn image_url(&self, identifier: Option<&str>, width: u32, height: u32) -> String {
        let Some(identifier) = identifier.map(str::trim).filter(|s| !s.is_empty()) else {
            return PLACEHOLDER_IMAGE.to_string();
        };

        if identifier.starts_with("https://") || identifier.starts_with("http://") {
            return identifier.to_string();
        }

        let (media_id, file_name) = parse_identifier(identifier);
        format!(
            "{}/{media_id}/v1/fill/w_{width},h_{height},al_c,q_85,enc_auto/{}",
            self.base_url,
            urlencoding::encode(file_name)
        )
    }

    /// Build an [`ImageView`], falling back to `default_alt` for blank alt text.
    #[must_use]
    pub fn image(
        &self,
        identifier: Option<&str>,
        alt: Option<&str>,
        default_alt: &str,
        width: u32,
        height: u32,
    ) -> ImageView {
        ImageView {
            src: self.image_url(identifier, width, height),
            alt: alt
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(default_alt)
                .to_string(),
            width,
            height,
        }
    }
}

/// Split an identifier into media ID and file name.
///
/// `wix:image://v1/abc~mv2.jpg/shirt.jpg#originWidth=800` yields
/// `("abc~mv2.jpg", "shirt.jpg")`; a bare ID is used as both.
fn parse_identifier(identifier: &str) -> (&str, &str) {
    let Some(rest) = identifier.strip_prefix(MEDIA_SCHEME) else {
        return (identifier, identifier);
    };
    let rest = rest.split('#').next().unwrap_or(rest);
    match rest.split_once('/') {
        Some((id, name)) if !name.is_empty() => (id, name),
        Some((id, _)) => (id, id),
        None => (rest, rest),
    }
}
