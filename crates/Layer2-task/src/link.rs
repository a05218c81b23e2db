//! Spotify link validation

use grove_foundation::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

pub const INVALID_LINK_MESSAGE: &str =
    "Invalid Spotify URL. Please provide a valid track, playlist, album, or artist URL.";

/// What a Spotify link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Track,
    Playlist,
    Album,
    Artist,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Track => "track",
            LinkKind::Playlist => "playlist",
            LinkKind::Album => "album",
            LinkKind::Artist => "artist",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "track" => Some(LinkKind::Track),
            "playlist" => Some(LinkKind::Playlist),
            "album" => Some(LinkKind::Album),
            "artist" => Some(LinkKind::Artist),
            _ => None,
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated Spotify link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpotifyLink {
    pub kind: LinkKind,
    pub id: String,
    pub url: String,
}

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"spotify\.com/(track|playlist|album|artist)/([a-zA-Z0-9]+)")
            .expect("static regex")
    })
}

impl SpotifyLink {
    /// Parse `url`, accepting anything containing `spotify.com/<kind>/<id>`
    pub fn parse(url: &str) -> Result<Self> {
        let caps = link_regex()
            .captures(url)
            .ok_or_else(|| Error::InvalidInput(INVALID_LINK_MESSAGE.to_string()))?;

        let kind = caps
            .get(1)
            .and_then(|m| LinkKind::from_segment(m.as_str()))
            .ok_or_else(|| Error::InvalidInput(INVALID_LINK_MESSAGE.to_string()))?;
        let id = caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidInput(INVALID_LINK_MESSAGE.to_string()))?;

        Ok(Self {
            kind,
            id,
            url: url.to_string(),
        })
    }
}
