//! Locale selection for HTTP requests.
//!
//! Sources, in priority order: a locale prefix in the path (`/fr/...`, `/en-GB/...`), the
//! `locale` cookie, then `Accept-Language`. Only locales the application declares are kept.

use super::HttpRequest;
use once_cell::sync::Lazy;
use regex::Regex;

static PATH_LOCALE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^/(\w{2}(?:-\w{2,3})?)(/.*)?$").ok());

/// Cookie holding an explicitly chosen locale.
pub const LOCALE_COOKIE: &str = "locale";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleRouting {
    available: Vec<String>,
    default: String,
}

impl LocaleRouting {
    /// Locales are written `ll` or `ll_CC`; `-` separators are accepted too.
    pub fn new<I, S>(available: I, default: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: available
                .into_iter()
                .map(|l| normalize_locale(&l.into()))
                .collect(),
            default: normalize_locale(&default.into()),
        }
    }

    #[must_use]
    pub fn available(&self) -> &[String] {
        &self.available
    }

    /// Split `/fr/blog` into `("fr", "/blog")`; `None` when the first segment is no locale.
    #[must_use]
    pub fn extract_from_path(path: &str) -> Option<(String, String)> {
        let captures = PATH_LOCALE_RE.as_ref()?.captures(path)?;
        let locale = normalize_locale(captures.get(1)?.as_str());
        let rest = captures
            .get(2)
            .map_or("/", |m| m.as_str())
            .to_string();
        Some((locale, rest))
    }

    /// Best available locale for `request`, or the default.
    #[must_use]
    pub fn resolve(&self, request: &HttpRequest) -> String {
        let from_path = Self::extract_from_path(request.path()).map(|(locale, _)| locale);
        let from_cookie = request.cookie(LOCALE_COOKIE).map(normalize_locale);
        from_path
            .into_iter()
            .chain(from_cookie)
            .chain(request.accepted_locales())
            .find_map(|candidate| self.match_available(&candidate))
            .unwrap_or_else(|| self.default.clone())
    }

    fn match_available(&self, candidate: &str) -> Option<String> {
        if let Some(exact) = self
            .available
            .iter()
            .find(|l| l.eq_ignore_ascii_case(candidate))
        {
            return Some(exact.clone());
        }
        // `fr_CA` falls back to `fr`, `fr` picks the first `fr_*`
        let language = candidate.split('_').next()?;
        self.available
            .iter()
            .find(|l| l.split('_').next().is_some_and(|p| p.eq_ignore_ascii_case(language)))
            .cloned()
    }
}

/// Locales listed in an `Accept-Language` header, ordered by quality.
///
/// `en-US,en;q=0.9,fr;q=0.8` → `["en_US", "en", "fr"]`. Wildcards are skipped.
#[must_use]
pub fn parse_accept_language(header: &str) -> Vec<String> {
    let mut weighted: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let quality = pieces
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((normalize_locale(tag), quality))
        })
        .collect();
    // Stable sort keeps header order among equal weights
    weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    weighted.into_iter().map(|(tag, _)| tag).collect()
}

fn normalize_locale(locale: &str) -> String {
    locale.trim().replace('-', "_")
}
