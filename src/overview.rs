use crate::error::CatalogError;
use crate::models::{CastMember, MovieDetail, MovieSummary};
use crate::tmdb::CatalogApi;
use crate::utils::{
    image_url, rating_label, release_year, select_trailer, trailer_embed_url, ImageSize,
};
use serde::Serialize;

const TOP_CAST: usize = 4;
const TOP_RECOMMENDATIONS: usize = 4;

/// Everything the movie detail view shows, resolved into display-ready values.
#[derive(Debug, Clone, Serialize)]
pub struct MovieOverview {
    pub detail: MovieDetail,
    pub year: Option<i32>,
    pub rating: String,
    pub backdrop_url: Option<String>,
    pub poster_url: Option<String>,
    pub trailer_url: Option<String>,
    pub cast: Vec<CastMember>,
    pub recommendations: Vec<MovieSummary>,
}

pub async fn load_overview(
    catalog: &dyn CatalogApi,
    id: u64,
) -> Result<MovieOverview, CatalogError> {
    let (detail, recommendations) = tokio::try_join!(
        catalog.fetch_detail(id),
        catalog.fetch_recommendations(id),
    )?;

    let summary = &detail.summary;
    Ok(MovieOverview {
        year: release_year(summary.release_date.as_deref()),
        rating: rating_label(summary.vote_average),
        backdrop_url: image_url(summary.backdrop_path.as_deref(), ImageSize::Original),
        poster_url: image_url(summary.poster_path.as_deref(), ImageSize::W300),
        trailer_url: select_trailer(&detail.videos).map(trailer_embed_url),
        cast: detail.cast.iter().take(TOP_CAST).cloned().collect(),
        recommendations: recommendations
            .results
            .into_iter()
            .take(TOP_RECOMMENDATIONS)
            .collect(),
        detail,
    })
}
