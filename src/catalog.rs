//! In-memory video catalog for reeltube.
//!
//! The catalog is seeded once at startup and never gains or loses records
//! afterwards; only the like and share counters move. Every record lives
//! behind a single reader/writer lock together with the like ledger, so a
//! toggle can check the ledger, move the counter and record the new state
//! without another request observing the halfway point.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Stable identifier of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub u64);

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VideoId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(VideoId)
    }
}

/// Opaque caller identity used only to key the like ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single video as served by `GET /videos` and written to snapshots.
///
/// Field names are rendered in camelCase because that is what the browser
/// carousel reads (`createdAt`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: VideoId,
    pub title: String,
    pub description: String,
    pub url: String,
    pub thumbnail: String,
    pub likes: i64,
    pub shares: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of flipping one user's like on one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeToggle {
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("video {0} not found")]
    NotFound(VideoId),
    #[error("video id {0} appears more than once in the catalog")]
    DuplicateId(VideoId),
}

struct CatalogState {
    videos: Vec<VideoRecord>,
    positions: HashMap<VideoId, usize>,
    ledger: HashSet<(UserId, VideoId)>,
}

impl CatalogState {
    fn position(&self, id: VideoId) -> Result<usize, CatalogError> {
        self.positions
            .get(&id)
            .copied()
            .ok_or(CatalogError::NotFound(id))
    }

    fn record_mut(&mut self, id: VideoId) -> Result<&mut VideoRecord, CatalogError> {
        let position = self.position(id)?;
        Ok(&mut self.videos[position])
    }
}

/// Shared catalog plus the per-user like ledger.
pub struct CatalogStore {
    state: RwLock<CatalogState>,
}

impl CatalogStore {
    /// Builds a store from `videos`, keeping their order for listings.
    pub fn new(videos: Vec<VideoRecord>) -> Result<Self, CatalogError> {
        let mut positions = HashMap::with_capacity(videos.len());
        for (index, video) in videos.iter().enumerate() {
            if positions.insert(video.id, index).is_some() {
                return Err(CatalogError::DuplicateId(video.id));
            }
        }

        Ok(Self {
            state: RwLock::new(CatalogState {
                videos,
                positions,
                ledger: HashSet::new(),
            }),
        })
    }

    /// Store populated with the built-in sample feed.
    pub fn seeded() -> Result<Self> {
        let videos = seed_videos()?;
        Self::new(videos).context("building seed catalog")
    }

    pub fn len(&self) -> usize {
        self.state.read().videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies every record in seed order. The read guard is dropped before
    /// this returns, so callers may take as long as they like with the copy.
    pub fn list_all(&self) -> Vec<VideoRecord> {
        self.state.read().videos.clone()
    }

    pub fn get_by_id(&self, id: VideoId) -> Result<VideoRecord, CatalogError> {
        let state = self.state.read();
        let position = state.position(id)?;
        Ok(state.videos[position].clone())
    }

    /// Applies `delta` to the like counter and returns the new value.
    ///
    /// No clamping happens here; keeping the counter non-negative is up to
    /// the caller.
    pub fn adjust_likes(&self, id: VideoId, delta: i64) -> Result<i64, CatalogError> {
        let mut state = self.state.write();
        let record = state.record_mut(id)?;
        record.likes += delta;
        Ok(record.likes)
    }

    /// Applies `delta` to the share counter and returns the new value.
    pub fn adjust_shares(&self, id: VideoId, delta: i64) -> Result<i64, CatalogError> {
        let mut state = self.state.write();
        let record = state.record_mut(id)?;
        record.shares += delta;
        Ok(record.shares)
    }

    /// Flips `user`'s like on `video`.
    ///
    /// The ledger lookup, the counter change and the ledger update all happen
    /// under one write guard.
    pub fn toggle_like(&self, video: VideoId, user: &UserId) -> Result<LikeToggle, CatalogError> {
        let mut state = self.state.write();
        let position = state.position(video)?;
        let key = (user.clone(), video);

        let liked = if state.ledger.remove(&key) {
            state.videos[position].likes -= 1;
            false
        } else {
            state.videos[position].likes += 1;
            state.ledger.insert(key);
            true
        };

        Ok(LikeToggle {
            liked,
            likes: state.videos[position].likes,
        })
    }

    pub fn is_liked(&self, video: VideoId, user: &UserId) -> bool {
        self.state
            .read()
            .ledger
            .contains(&(user.clone(), video))
    }
}

struct SeedVideo {
    id: u64,
    title: &'static str,
    description: &'static str,
    url: &'static str,
    thumbnail: &'static str,
    likes: i64,
    shares: i64,
    created_at: &'static str,
}

const SAMPLE_BUNNY: &str = "https://www.w3schools.com/html/mov_bbb.mp4";
const SAMPLE_MOVIE: &str = "https://www.w3schools.com/html/movie.mp4";

const SEED: &[SeedVideo] = &[
    SeedVideo {
        id: 1,
        title: "Big Buck Bunny",
        description: "A short animated film featuring a big rabbit dealing with three bullies",
        url: SAMPLE_BUNNY,
        thumbnail: "https://upload.wikimedia.org/wikipedia/commons/c/c5/Big_buck_bunny_poster_big.jpg",
        likes: 245,
        shares: 127,
        created_at: "2023-01-15T10:30:00Z",
    },
    SeedVideo {
        id: 2,
        title: "Elephants Dream",
        description: "An experimental animated film about two characters exploring a mechanical world",
        url: SAMPLE_MOVIE,
        thumbnail: "https://upload.wikimedia.org/wikipedia/commons/d/d2/Elephants_Dream_poster.jpg",
        likes: 512,
        shares: 233,
        created_at: "2023-02-05T14:20:00Z",
    },
    SeedVideo {
        id: 3,
        title: "Nature's Beauty",
        description: "Breathtaking landscapes and wildlife footage",
        url: SAMPLE_BUNNY,
        thumbnail: "https://picsum.photos/id/10/400/300",
        likes: 178,
        shares: 96,
        created_at: "2023-03-12T09:15:00Z",
    },
    SeedVideo {
        id: 4,
        title: "Urban Exploration",
        description: "A journey through vibrant city streets and architecture",
        url: SAMPLE_MOVIE,
        thumbnail: "https://picsum.photos/id/20/400/300",
        likes: 823,
        shares: 341,
        created_at: "2023-04-18T16:45:00Z",
    },
    SeedVideo {
        id: 5,
        title: "Mountain Peaks",
        description: "Spectacular drone footage of mountain ranges",
        url: SAMPLE_BUNNY,
        thumbnail: "https://picsum.photos/id/30/400/300",
        likes: 315,
        shares: 153,
        created_at: "2023-05-29T11:30:00Z",
    },
    SeedVideo {
        id: 6,
        title: "Ocean Wonders",
        description: "Diving into the depths of ocean wildlife",
        url: SAMPLE_MOVIE,
        thumbnail: "https://picsum.photos/id/40/400/300",
        likes: 642,
        shares: 278,
        created_at: "2023-06-03T13:10:00Z",
    },
    SeedVideo {
        id: 7,
        title: "Desert Adventures",
        description: "Exploring vast desert landscapes",
        url: SAMPLE_BUNNY,
        thumbnail: "https://picsum.photos/id/50/400/300",
        likes: 415,
        shares: 189,
        created_at: "2023-07-08T15:25:00Z",
    },
    SeedVideo {
        id: 8,
        title: "Forest Trails",
        description: "Walking through serene forest paths",
        url: SAMPLE_MOVIE,
        thumbnail: "https://picsum.photos/id/60/400/300",
        likes: 738,
        shares: 321,
        created_at: "2023-08-14T10:40:00Z",
    },
    SeedVideo {
        id: 9,
        title: "Winter Wonderland",
        description: "Beautiful snowy landscapes and winter activities",
        url: SAMPLE_BUNNY,
        thumbnail: "https://picsum.photos/id/70/400/300",
        likes: 219,
        shares: 114,
        created_at: "2023-09-22T12:55:00Z",
    },
    SeedVideo {
        id: 10,
        title: "Sunset Views",
        description: "Stunning sunset scenes from around the world",
        url: SAMPLE_MOVIE,
        thumbnail: "https://picsum.photos/id/80/400/300",
        likes: 547,
        shares: 256,
        created_at: "2023-10-01T19:20:00Z",
    },
];

/// The sample feed served on every start.
pub fn seed_videos() -> Result<Vec<VideoRecord>> {
    SEED.iter()
        .map(|seed| {
            let created_at = DateTime::parse_from_rfc3339(seed.created_at)
                .with_context(|| format!("parsing createdAt of seed video {}", seed.id))?
                .with_timezone(&Utc);
            Ok(VideoRecord {
                id: VideoId(seed.id),
                title: seed.title.to_owned(),
                description: seed.description.to_owned(),
                url: seed.url.to_owned(),
                thumbnail: seed.thumbnail.to_owned(),
                likes: seed.likes,
                shares: seed.shares,
                created_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(id: u64, likes: i64) -> VideoRecord {
        VideoRecord {
            id: VideoId(id),
            title: format!("video {id}"),
            description: String::new(),
            url: "https://example.invalid/v.mp4".into(),
            thumbnail: "https://example.invalid/t.jpg".into(),
            likes,
            shares: 0,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn seeded_catalog_keeps_seed_order() -> Result<()> {
        let store = CatalogStore::seeded()?;
        let ids: Vec<u64> = store.list_all().iter().map(|video| video.id.0).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn get_by_id_returns_requested_record() -> Result<()> {
        let store = CatalogStore::seeded()?;
        for video in store.list_all() {
            assert_eq!(store.get_by_id(video.id)?.id, video.id);
        }
        Ok(())
    }

    #[test]
    fn unknown_id_is_not_found() -> Result<()> {
        let store = CatalogStore::seeded()?;
        let missing = VideoId(9999);
        assert_eq!(store.get_by_id(missing), Err(CatalogError::NotFound(missing)));
        assert_eq!(store.adjust_likes(missing, 1), Err(CatalogError::NotFound(missing)));
        assert_eq!(store.adjust_shares(missing, 1), Err(CatalogError::NotFound(missing)));
        assert_eq!(
            store.toggle_like(missing, &UserId::new("u1")),
            Err(CatalogError::NotFound(missing))
        );
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = CatalogStore::new(vec![blank(1, 0), blank(2, 0), blank(1, 0)]);
        assert!(matches!(result, Err(CatalogError::DuplicateId(VideoId(1)))));
    }

    #[test]
    fn adjust_counters_apply_signed_deltas() -> Result<()> {
        let store = CatalogStore::new(vec![blank(1, 10)])?;
        assert_eq!(store.adjust_likes(VideoId(1), 5)?, 15);
        assert_eq!(store.adjust_likes(VideoId(1), -3)?, 12);
        assert_eq!(store.adjust_shares(VideoId(1), 2)?, 2);
        let record = store.get_by_id(VideoId(1))?;
        assert_eq!((record.likes, record.shares), (12, 2));
        Ok(())
    }

    #[test]
    fn toggle_from_zero_never_goes_negative() -> Result<()> {
        let store = CatalogStore::new(vec![blank(1, 0)])?;
        let user = UserId::new("u1");

        let first = store.toggle_like(VideoId(1), &user)?;
        assert_eq!(first, LikeToggle { liked: true, likes: 1 });
        assert!(store.is_liked(VideoId(1), &user));

        let second = store.toggle_like(VideoId(1), &user)?;
        assert_eq!(second, LikeToggle { liked: false, likes: 0 });
        assert!(!store.is_liked(VideoId(1), &user));
        Ok(())
    }

    #[test]
    fn ledger_is_tracked_per_user_and_video() -> Result<()> {
        let store = CatalogStore::new(vec![blank(1, 245), blank(2, 7)])?;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");

        assert_eq!(store.toggle_like(VideoId(1), &u1)?.likes, 246);
        assert_eq!(store.toggle_like(VideoId(1), &u2)?, LikeToggle { liked: true, likes: 247 });
        assert_eq!(store.toggle_like(VideoId(2), &u1)?, LikeToggle { liked: true, likes: 8 });

        assert_eq!(store.toggle_like(VideoId(1), &u1)?, LikeToggle { liked: false, likes: 246 });
        assert!(store.is_liked(VideoId(1), &u2));
        assert!(store.is_liked(VideoId(2), &u1));
        Ok(())
    }

    #[test]
    fn structured_ledger_key_has_no_collisions() -> Result<()> {
        // "a-1" liking video 1 must not look like "a" liking video 11.
        let store = CatalogStore::new(vec![blank(1, 0), blank(11, 0)])?;
        store.toggle_like(VideoId(11), &UserId::new("a"))?;
        assert!(!store.is_liked(VideoId(1), &UserId::new("a-1")));
        assert!(store.toggle_like(VideoId(1), &UserId::new("a-1"))?.liked);
        Ok(())
    }

    #[test]
    fn concurrent_toggles_do_not_lose_updates() -> Result<()> {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(CatalogStore::new(vec![blank(1, 0)])?);
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let user = UserId::new(format!("user-{n}"));
                    // Odd number of toggles leaves every user in the liked state.
                    for _ in 0..101 {
                        store.toggle_like(VideoId(1), &user).map(|_| ())?;
                    }
                    Ok::<_, CatalogError>(())
                })
            })
            .collect();

        for handle in handles {
            handle.join().map_err(|_| anyhow::anyhow!("toggle thread panicked"))??;
        }

        assert_eq!(store.get_by_id(VideoId(1))?.likes, 8);
        Ok(())
    }

    #[test]
    fn record_serializes_with_camel_case_timestamp() -> Result<()> {
        let store = CatalogStore::seeded()?;
        let json = serde_json::to_value(store.get_by_id(VideoId(1))?)?;
        assert_eq!(json["createdAt"], "2023-01-15T10:30:00Z");
        assert_eq!(json["likes"], 245);
        assert_eq!(json["shares"], 127);
        assert_eq!(json["id"], 1);
        Ok(())
    }
}
