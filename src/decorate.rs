use ratatui::style::Color;

use crate::catalog::{FetchError, RawRecord};

/// Shown before the first successful fetch.
pub const DEFAULT_BACKGROUND: &str = "#F5F5F5";
/// Categories missing from [`background_for`] land here so they stand out.
pub const FALLBACK_BACKGROUND: &str = "#FF00FF";

/// The normalized record shown on the Ready screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub category: String,
}

pub fn decorate(raw: RawRecord) -> Result<Entity, FetchError> {
    let RawRecord {
        id,
        name,
        sprites,
        types,
    } = raw;

    let image = sprites
        .front_default
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| FetchError::Decode(format!("record {id} has no front sprite")))?;
    let category = types
        .into_iter()
        .next()
        .map(|slot| slot.kind.name)
        .ok_or_else(|| FetchError::Decode(format!("record {id} has no types")))?;

    Ok(Entity {
        id,
        name,
        image,
        category,
    })
}

pub fn background_for(category: &str) -> &'static str {
    match category {
        "normal" => "#A8A77A",
        "fire" => "#EE8130",
        "water" => "#6390F0",
        "electric" => "#F7D02C",
        "grass" => "#7AC74C",
        "ice" => "#96D9D6",
        "fighting" => "#C22E28",
        "poison" => "#A33EA1",
        "ground" => "#E2BF65",
        "flying" => "#A98FF3",
        "psychic" => "#F95587",
        "bug" => "#A6B91A",
        "rock" => "#B6A136",
        "ghost" => "#735797",
        "dragon" => "#6F35FC",
        "dark" => "#705746",
        "steel" => "#B7B7CE",
        "fairy" => "#D685AD",
        _ => FALLBACK_BACKGROUND,
    }
}

pub fn parse_hex_color(value: &str) -> Option<Color> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
