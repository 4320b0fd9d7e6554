//! Field extraction from raw upstream text.
//!
//! Upstream pages are not well-formed documents, so every field is pulled out
//! with a fixed regex over the raw body instead of a DOM parser. Each pattern
//! has exactly one capture group and only the first match is used.

use std::sync::LazyLock;

use regex::Regex;

use super::error::{ResolveError, Stage};

static FID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"fid="([^"]+)""#).unwrap());
static SECURE_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"v_con="([^"]+)""#).unwrap());
static EXPIRY_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"v_dt="([^"]+)""#).unwrap());
static PLAYER_SCRIPT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"src="(https://player\d+\.vip/zplayer\d+\.js\?[^"]+)""#).unwrap()
});
static PLAYER_PAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src="(https://zplayer\d+\.com/[^"]+)""#).unwrap());
static MANIFEST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"source: '([^']+\.m3u8[^']*)").unwrap());

/// A named value the resolver pulls out of an upstream body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Stream id on the embed page (`fid="..."`).
    Fid,
    /// Security token on the embed page (`v_con="..."`).
    SecureToken,
    /// Expiry token on the embed page (`v_dt="..."`).
    ExpiryToken,
    /// Player script reference on the embed page.
    PlayerScript,
    /// Player page base URL inside the player script.
    PlayerPage,
    /// `source: '...m3u8...'` literal on the player page.
    ManifestUrl,
}

impl Field {
    pub const fn name(self) -> &'static str {
        match self {
            Field::Fid => "fid",
            Field::SecureToken => "v_con",
            Field::ExpiryToken => "v_dt",
            Field::PlayerScript => "player_script",
            Field::PlayerPage => "player_page",
            Field::ManifestUrl => "source",
        }
    }
}

#[inline]
pub fn capture_group_1<'a>(re: &Regex, input: &'a str) -> Option<&'a str> {
    re.captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Pattern definitions for every [`Field`].
///
/// Format drift upstream is handled by swapping a pattern here, the resolver
/// control flow does not change.
#[derive(Debug, Clone)]
pub struct PatternTable {
    fid: Regex,
    secure_token: Regex,
    expiry_token: Regex,
    player_script: Regex,
    player_page: Regex,
    manifest_url: Regex,
}

impl Default for PatternTable {
    fn default() -> Self {
        Self {
            fid: FID_REGEX.clone(),
            secure_token: SECURE_TOKEN_REGEX.clone(),
            expiry_token: EXPIRY_TOKEN_REGEX.clone(),
            player_script: PLAYER_SCRIPT_REGEX.clone(),
            player_page: PLAYER_PAGE_REGEX.clone(),
            manifest_url: MANIFEST_REGEX.clone(),
        }
    }
}

impl PatternTable {
    /// Replace the pattern for `field`.
    ///
    /// The pattern must contain at least one capture group; the first one is
    /// the extracted value.
    pub fn with_pattern(mut self, field: Field, pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        if regex.captures_len() < 2 {
            return Err(regex::Error::Syntax(format!(
                "pattern for `{}` has no capture group",
                field.name()
            )));
        }
        *self.slot_mut(field) = regex;
        Ok(self)
    }

    pub fn pattern(&self, field: Field) -> &Regex {
        match field {
            Field::Fid => &self.fid,
            Field::SecureToken => &self.secure_token,
            Field::ExpiryToken => &self.expiry_token,
            Field::PlayerScript => &self.player_script,
            Field::PlayerPage => &self.player_page,
            Field::ManifestUrl => &self.manifest_url,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Regex {
        match field {
            Field::Fid => &mut self.fid,
            Field::SecureToken => &mut self.secure_token,
            Field::ExpiryToken => &mut self.expiry_token,
            Field::PlayerScript => &mut self.player_script,
            Field::PlayerPage => &mut self.player_page,
            Field::ManifestUrl => &mut self.manifest_url,
        }
    }

    /// First match of `field` in `text`, if any.
    pub fn extract_field<'a>(&self, text: &'a str, field: Field) -> Option<&'a str> {
        capture_group_1(self.pattern(field), text)
    }

    /// Like [`extract_field`](Self::extract_field) but a miss is an
    /// extraction error for `stage`.
    pub fn require<'a>(
        &self,
        stage: Stage,
        text: &'a str,
        field: Field,
    ) -> Result<&'a str, ResolveError> {
        self.extract_field(text, field)
            .ok_or_else(|| ResolveError::extraction(stage, field.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMBED: &str = r#"<html><script>
        fid="premium44"; v_con="c0ffee"; v_dt="1700000000";
        fid="second";
    </script><script src="https://player002.vip/zplayer2.js?v=7.061"></script>"#;

    #[test]
    fn test_first_match_wins() {
        let table = PatternTable::default();
        assert_eq!(table.extract_field(EMBED, Field::Fid), Some("premium44"));
        assert_eq!(table.extract_field(EMBED, Field::SecureToken), Some("c0ffee"));
        assert_eq!(table.extract_field(EMBED, Field::ExpiryToken), Some("1700000000"));
        assert_eq!(
            table.extract_field(EMBED, Field::PlayerScript),
            Some("https://player002.vip/zplayer2.js?v=7.061")
        );
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let table = PatternTable::default();
        assert_eq!(table.extract_field(r#"FID="x""#, Field::Fid), None);
        assert_eq!(table.extract_field(r#"V_CON="x""#, Field::SecureToken), None);
    }

    #[test]
    fn test_broken_markup_still_matches() {
        let table = PatternTable::default();
        let body = r#"<div <<< fid="abc" unterminated <script"#;
        assert_eq!(table.extract_field(body, Field::Fid), Some("abc"));
    }

    #[test]
    fn test_player_page_and_manifest() {
        let table = PatternTable::default();
        let script = r#"document.write('<iframe src="https://zplayer001.com/embed.php?a=1"></iframe>')"#;
        assert_eq!(
            table.extract_field(script, Field::PlayerPage),
            Some("https://zplayer001.com/embed.php?a=1")
        );

        let page = "var player = new Clappr.Player({ source: 'https://edge.example/live/index.m3u8?md6=x&expires=1', autoPlay: true });";
        assert_eq!(
            table.extract_field(page, Field::ManifestUrl),
            Some("https://edge.example/live/index.m3u8?md6=x&expires=1")
        );
    }

    #[test]
    fn test_manifest_requires_m3u8() {
        let table = PatternTable::default();
        let page = "source: 'https://edge.example/live/video.mp4'";
        assert_eq!(table.extract_field(page, Field::ManifestUrl), None);
    }

    #[test]
    fn test_require_names_missing_field() {
        let table = PatternTable::default();
        let err = table
            .require(Stage::Embed, r#"fid="abc""#, Field::SecureToken)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Embed));
        assert_eq!(err.field(), Some("v_con"));
    }

    #[test]
    fn test_with_pattern_overrides_field() {
        let table = PatternTable::default()
            .with_pattern(Field::PlayerPage, r#"src="(http://127\.0\.0\.1:\d+/[^"]+)""#)
            .unwrap();
        assert_eq!(
            table.extract_field(r#"src="http://127.0.0.1:8080/p.php""#, Field::PlayerPage),
            Some("http://127.0.0.1:8080/p.php")
        );
    }

    #[test]
    fn test_with_pattern_rejects_missing_group() {
        assert!(
            PatternTable::default()
                .with_pattern(Field::Fid, r"fid=\w+")
                .is_err()
        );
    }
}
