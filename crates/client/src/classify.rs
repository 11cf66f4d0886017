//! Resource classification by request path.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|jpg|jpeg|webp|svg|gif|ico)$").expect("valid image pattern"));
static FONT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(woff2|woff|ttf|otf|eot)$").expect("valid font pattern"));
static CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.(html|js|css|json)$").expect("valid code pattern"));

/// Class of a requested resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Image,
    Font,
    /// HTML, JS, CSS, JSON, the root, or an extensionless route.
    Document,
    /// Any other extension.
    Other,
}

impl ResourceClass {
    /// Image and font responses are long-lived and served cache-first.
    pub fn is_cache_first(self) -> bool {
        matches!(self, ResourceClass::Image | ResourceClass::Font)
    }
}

/// Classify a URL path.
pub fn classify(path: &str) -> ResourceClass {
    if IMAGE.is_match(path) {
        ResourceClass::Image
    } else if FONT.is_match(path) {
        ResourceClass::Font
    } else if CODE.is_match(path) || path == "/" || !path.contains('.') {
        ResourceClass::Document
    } else {
        ResourceClass::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images() {
        for path in ["/logo.png", "/a/b.JPG", "/hero.jpeg", "/x.webp", "/icon.svg", "/anim.gif", "/favicon.ico"] {
            assert_eq!(classify(path), ResourceClass::Image, "{path}");
        }
    }

    #[test]
    fn test_fonts() {
        for path in ["/f.woff2", "/f.woff", "/f.TTF", "/f.otf", "/f.eot"] {
            assert_eq!(classify(path), ResourceClass::Font, "{path}");
        }
    }

    #[test]
    fn test_documents() {
        for path in ["/", "/index.html", "/app.js", "/style.css", "/data.json", "/profile", "/api/auth/user"] {
            assert_eq!(classify(path), ResourceClass::Document, "{path}");
        }
    }

    #[test]
    fn test_other_extensions() {
        assert_eq!(classify("/manual.pdf"), ResourceClass::Other);
        assert_eq!(classify("/bundle.js.map"), ResourceClass::Other);
    }

    #[test]
    fn test_suffix_only() {
        // The extension must end the path.
        assert_eq!(classify("/logo.png.txt"), ResourceClass::Other);
        assert_eq!(classify("/v1.2/users"), ResourceClass::Other);
    }

    #[test]
    fn test_cache_first_classes() {
        assert!(ResourceClass::Image.is_cache_first());
        assert!(ResourceClass::Font.is_cache_first());
        assert!(!ResourceClass::Document.is_cache_first());
        assert!(!ResourceClass::Other.is_cache_first());
    }
}
