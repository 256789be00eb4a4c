use crate::error::StoreError;
use crate::models::MovieSummary;
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub const FAVORITES_KEY: &str = "cinevibe-storage";

/// Saved movies keyed by id, kept in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoritesSet {
    favorites: Vec<MovieSummary>,
}

impl FavoritesSet {
    pub fn contains(&self, id: u64) -> bool {
        self.favorites.iter().any(|m| m.id == id)
    }

    /// Removes the movie when present, otherwise inserts it as given.
    /// Returns whether the movie is a favorite afterwards.
    pub fn toggle(&mut self, movie: MovieSummary) -> bool {
        if let Some(pos) = self.favorites.iter().position(|m| m.id == movie.id) {
            self.favorites.remove(pos);
            false
        } else {
            self.favorites.push(movie);
            true
        }
    }

    pub fn len(&self) -> usize {
        self.favorites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.favorites.is_empty()
    }

    pub fn movies(&self) -> &[MovieSummary] {
        &self.favorites
    }

    // Snapshots written by hand may repeat an id; the first occurrence wins.
    fn dedupe(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.favorites.retain(|m| seen.insert(m.id));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    pub is_favorite: bool,
    pub persisted: bool,
}

/// The watchlist service. Loads once on construction and saves after every toggle.
pub struct FavoritesStore {
    storage: Arc<dyn KeyValueStore>,
    set: Mutex<FavoritesSet>,
}

impl FavoritesStore {
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let set = match storage.get(FAVORITES_KEY) {
            Ok(Some(bytes)) => match serde_json::from_slice::<FavoritesSet>(&bytes) {
                Ok(set) => set.dedupe(),
                Err(e) => {
                    warn!("Discarding unreadable favorites snapshot: {}", e);
                    FavoritesSet::default()
                }
            },
            Ok(None) => FavoritesSet::default(),
            Err(e) => {
                warn!("Failed to read favorites snapshot, starting empty: {}", e);
                FavoritesSet::default()
            }
        };
        info!("Loaded {} favorites", set.len());
        Self {
            storage,
            set: Mutex::new(set),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FavoritesSet> {
        self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn toggle_favorite(&self, movie: MovieSummary) -> ToggleOutcome {
        let id = movie.id;
        let is_favorite = self.lock().toggle(movie);
        debug!(movie_id = id, is_favorite, "Toggled favorite");
        let persisted = match self.save() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to persist favorites after toggling {}: {}", id, e);
                false
            }
        };
        ToggleOutcome {
            is_favorite,
            persisted,
        }
    }

    pub fn is_favorite(&self, id: u64) -> bool {
        self.lock().contains(id)
    }

    pub fn favorites(&self) -> Vec<MovieSummary> {
        self.lock().movies().to_vec()
    }

    pub fn snapshot(&self) -> FavoritesSet {
        self.lock().clone()
    }

    /// Writes the current set under [`FAVORITES_KEY`]. The lock is held through the write so
    /// concurrent saves land in mutation order.
    pub fn save(&self) -> Result<(), StoreError> {
        let set = self.lock();
        let bytes = serde_json::to_vec(&*set)
            .map_err(|e| StoreError::Unavailable(format!("favorites encode failed: {e}")))?;
        self.storage.set(FAVORITES_KEY, &bytes)
    }
}
