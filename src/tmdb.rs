use crate::error::CatalogError;
use crate::models::{CastMember, Genre, MovieDetail, MovieSummary, PagedResult, Video};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const TMDB_BASE: &str = "https://api.themoviedb.org/3";

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// The movie catalog as seen by the discovery controller and the HTTP facade.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn fetch_popular(&self, page: u32) -> CatalogResult<PagedResult>;
    async fn fetch_by_genre(&self, genre_id: u32, page: u32) -> CatalogResult<PagedResult>;
    async fn fetch_search(&self, text: &str, page: u32) -> CatalogResult<PagedResult>;
    async fn fetch_genres(&self) -> CatalogResult<Vec<Genre>>;
    async fn fetch_detail(&self, id: u64) -> CatalogResult<MovieDetail>;
    async fn fetch_recommendations(&self, id: u64) -> CatalogResult<PagedResult>;
    async fn fetch_top_rated(&self, page: u32) -> CatalogResult<PagedResult>;
    async fn fetch_upcoming(&self) -> CatalogResult<PagedResult>;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let user_agent = format!("cinevibe/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!("{}{path}?api_key={}", self.base_url, self.api_key);
        for (name, value) in params {
            url.push('&');
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> CatalogResult<T> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        let status = res.status();
        let text = res.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_page(&self, path: &str, params: &[(&str, String)]) -> CatalogResult<PagedResult> {
        let url = self.url(path, params);
        let page: PagedResult = self.get_json(&url).await?;
        debug!(path, results = page.results.len(), "Fetched catalog page");
        Ok(page)
    }
}

#[async_trait]
impl CatalogApi for TmdbClient {
    async fn fetch_popular(&self, page: u32) -> CatalogResult<PagedResult> {
        self.get_page("/movie/popular", &[("page", page.to_string())])
            .await
    }

    async fn fetch_by_genre(&self, genre_id: u32, page: u32) -> CatalogResult<PagedResult> {
        self.get_page(
            "/discover/movie",
            &[
                ("with_genres", genre_id.to_string()),
                ("sort_by", "popularity.desc".to_string()),
                ("page", page.to_string()),
            ],
        )
        .await
    }

    async fn fetch_search(&self, text: &str, page: u32) -> CatalogResult<PagedResult> {
        self.get_page(
            "/search/movie",
            &[("query", text.to_string()), ("page", page.to_string())],
        )
        .await
    }

    async fn fetch_genres(&self) -> CatalogResult<Vec<Genre>> {
        #[derive(Deserialize)]
        struct GenreList {
            genres: Vec<Genre>,
        }

        let url = self.url("/genre/movie/list", &[]);
        let list: GenreList = self.get_json(&url).await?;
        Ok(list.genres)
    }

    async fn fetch_detail(&self, id: u64) -> CatalogResult<MovieDetail> {
        let url = self.url(
            &format!("/movie/{id}"),
            &[("append_to_response", "credits,videos".to_string())],
        );
        let appended: DetailAppended = self.get_json(&url).await?;
        Ok(appended.into_detail())
    }

    async fn fetch_recommendations(&self, id: u64) -> CatalogResult<PagedResult> {
        self.get_page(&format!("/movie/{id}/recommendations"), &[])
            .await
    }

    async fn fetch_top_rated(&self, page: u32) -> CatalogResult<PagedResult> {
        self.get_page("/movie/top_rated", &[("page", page.to_string())])
            .await
    }

    async fn fetch_upcoming(&self) -> CatalogResult<PagedResult> {
        self.get_page("/movie/upcoming", &[]).await
    }
}

// The request URL carries the api key and must not reach logs or clients.
fn transport_error(err: reqwest::Error) -> CatalogError {
    CatalogError::Network(err.without_url())
}

#[derive(Debug, Deserialize)]
struct Credits {
    #[serde(default)]
    cast: Vec<CastMember>,
}

#[derive(Debug, Deserialize)]
struct Videos {
    #[serde(default)]
    results: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct DetailAppended {
    #[serde(flatten)]
    summary: MovieSummary,
    runtime: Option<u32>,
    #[serde(default)]
    genres: Vec<Genre>,
    credits: Option<Credits>,
    videos: Option<Videos>,
}

impl DetailAppended {
    fn into_detail(self) -> MovieDetail {
        MovieDetail {
            summary: self.summary,
            runtime: self.runtime,
            genres: self.genres,
            cast: self.credits.map(|c| c.cast).unwrap_or_default(),
            videos: self.videos.map(|v| v.results).unwrap_or_default(),
        }
    }
}
