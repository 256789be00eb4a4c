use serde::{Deserialize, Serialize};

/// One entry of a catalog listing. Received from the catalog and never mutated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MovieSummary {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub vote_average: f32,
    #[serde(default)]
    pub release_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Genre {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CastMember {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub profile_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Video {
    pub key: String,
    pub site: String,
    #[serde(rename = "type")]
    pub video_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MovieDetail {
    #[serde(flatten)]
    pub summary: MovieSummary,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub videos: Vec<Video>,
}

/// A single page of catalog results. An empty page past the first ends pagination.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PagedResult {
    pub results: Vec<MovieSummary>,
}

/// What the discovery listing is currently showing. Exactly one is active at a time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum QueryIntent {
    Search(String),
    GenreFilter(u32),
    #[default]
    Popular,
}

impl QueryIntent {
    /// Mirrors the listing precedence of the discover view: non-blank search text wins,
    /// then a selected genre, then the popular listing.
    pub fn from_inputs(search: Option<&str>, genre: Option<u32>) -> Self {
        match (search.map(str::trim).filter(|s| !s.is_empty()), genre) {
            (Some(text), _) => QueryIntent::Search(text.to_string()),
            (None, Some(id)) => QueryIntent::GenreFilter(id),
            (None, None) => QueryIntent::Popular,
        }
    }

    pub fn label(&self) -> String {
        match self {
            QueryIntent::Search(text) => format!("search:{text}"),
            QueryIntent::GenreFilter(id) => format!("genre:{id}"),
            QueryIntent::Popular => "popular".to_string(),
        }
    }
}
