use crate::models::Video;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageSize {
    W92,
    W185,
    W300,
    W500,
    Original,
}

impl ImageSize {
    fn as_path(&self) -> &'static str {
        match self {
            ImageSize::W92 => "w92",
            ImageSize::W185 => "w185",
            ImageSize::W300 => "w300",
            ImageSize::W500 => "w500",
            ImageSize::Original => "original",
        }
    }
}

pub fn image_url(path: Option<&str>, size: ImageSize) -> Option<String> {
    path.filter(|p| !p.is_empty())
        .map(|p| format!("{IMAGE_BASE}/{}{p}", size.as_path()))
}

/// Year of a full or partial ISO release date.
pub fn release_year(date: Option<&str>) -> Option<i32> {
    let date = date?.trim();
    if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(parsed.year());
    }
    date.split('-')
        .next()
        .filter(|y| y.len() == 4)
        .and_then(|y| y.parse().ok())
}

pub fn rating_label(vote_average: f32) -> String {
    format!("{:.1}", vote_average)
}

/// First YouTube trailer or teaser, in catalog order.
pub fn select_trailer(videos: &[Video]) -> Option<&Video> {
    videos.iter().find(|v| {
        v.site == "YouTube" && (v.video_type == "Trailer" || v.video_type == "Teaser")
    })
}

pub fn trailer_embed_url(video: &Video) -> String {
    format!("https://www.youtube.com/embed/{}", video.key)
}
