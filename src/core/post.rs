//! Posts and their activity lists
//!
//! A post is keyed by `author#post_id`. Its info record is written once; the
//! meta, likes, comments, views and donations live under separate keys so a
//! like never rewrites the post body.

use crate::core::coin::Coin;
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::state::{keys, State};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted title in bytes
pub const MAX_TITLE_LENGTH: usize = 50;

/// Longest accepted content in bytes
pub const MAX_CONTENT_LENGTH: usize = 1000;

/// Like weights are bounded to this magnitude; negative weights are dislikes
pub const MAX_LIKE_WEIGHT: i64 = 10_000;

/// Characters the store key layout uses as separators
const RESERVED_KEY_CHARS: [char; 2] = ['/', '#'];

/// `(author, post_id)` reference to a post
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostKey {
    pub author: String,
    pub post_id: String,
}

impl PostKey {
    pub fn new(author: &str, post_id: &str) -> Self {
        Self {
            author: author.to_string(),
            post_id: post_id.to_string(),
        }
    }

    /// Both parts non-empty and free of key separators
    pub fn validate(&self) -> LedgerResult<()> {
        let reason = if self.author.is_empty() {
            "empty author"
        } else if self.post_id.is_empty() {
            "empty post id"
        } else if self.author.contains(RESERVED_KEY_CHARS) {
            "author contains '/' or '#'"
        } else if self.post_id.contains(RESERVED_KEY_CHARS) {
            "post id contains '/' or '#'"
        } else {
            return Ok(());
        };
        Err(LedgerError::InvalidPost {
            post_key: self.to_string(),
            reason: reason.to_string(),
        })
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.author, self.post_id)
    }
}

/// Body of a post as submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostInfo {
    pub post_id: String,
    pub author: String,
    pub title: String,
    pub content: String,
    /// Set for comments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<PostKey>,
    /// Set for reposts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PostKey>,
    #[serde(default = "default_allow_replies")]
    pub allow_replies: bool,
}

fn default_allow_replies() -> bool {
    true
}

impl PostInfo {
    pub fn new(author: &str, post_id: &str, title: &str, content: &str) -> Self {
        Self {
            post_id: post_id.to_string(),
            author: author.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            parent: None,
            source: None,
            allow_replies: true,
        }
    }

    pub fn with_parent(mut self, parent: PostKey) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn key(&self) -> PostKey {
        PostKey::new(&self.author, &self.post_id)
    }

    /// Checks that need no store access
    pub fn validate_basic(&self) -> LedgerResult<()> {
        self.key().validate()?;
        for linked in self.parent.iter().chain(self.source.iter()) {
            linked.validate()?;
        }
        let invalid = |reason: &str| LedgerError::InvalidPost {
            post_key: self.key().to_string(),
            reason: reason.to_string(),
        };
        if self.title.len() > MAX_TITLE_LENGTH {
            return Err(invalid("title too long"));
        }
        if self.content.len() > MAX_CONTENT_LENGTH {
            return Err(invalid("content too long"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMeta {
    pub created_at: i64,
    pub last_activity: i64,
    pub allow_replies: bool,
    /// Bumped on every like, view, comment and donation
    pub activity_sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub username: String,
    pub weight: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub username: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub username: String,
    pub amount: Coin,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostDonations {
    pub donations: Vec<Donation>,
    /// Sum of every donation the author received through this post
    pub reward: Coin,
}

impl State<'_> {
    pub fn post_exists(&self, key: &PostKey) -> bool {
        key.validate().is_ok() && self.has_record(&keys::post(&key.to_string()))
    }

    pub fn get_post(&self, key: &PostKey) -> LedgerResult<Option<PostInfo>> {
        self.get_record(&keys::post(&key.to_string()))
    }

    pub fn post_meta(&self, key: &PostKey) -> LedgerResult<PostMeta> {
        self.get_record(&keys::post_meta(&key.to_string()))?
            .ok_or_else(|| LedgerError::UnknownTarget {
                post_key: key.to_string(),
            })
    }

    pub fn post_likes(&self, key: &PostKey) -> LedgerResult<Vec<Like>> {
        self.get_list(&keys::post_likes(&key.to_string()))
    }

    pub fn post_comments(&self, key: &PostKey) -> LedgerResult<Vec<PostKey>> {
        self.get_list(&keys::post_comments(&key.to_string()))
    }

    pub fn post_views(&self, key: &PostKey) -> LedgerResult<Vec<View>> {
        self.get_list(&keys::post_views(&key.to_string()))
    }

    pub fn post_donations(&self, key: &PostKey) -> LedgerResult<PostDonations> {
        Ok(self
            .get_record(&keys::post_donations(&key.to_string()))?
            .unwrap_or_default())
    }

    /// Store a new post with empty activity lists and link it to its parent
    pub fn create_post(&mut self, info: &PostInfo, time: i64) -> LedgerResult<()> {
        info.validate_basic()?;
        let key = info.key();
        let rendered = key.to_string();
        if self.post_exists(&key) {
            return Err(LedgerError::PostExists { post_key: rendered });
        }

        if let Some(parent) = &info.parent {
            if !self.post_exists(parent) {
                return Err(LedgerError::ParentNotFound {
                    post_key: parent.to_string(),
                });
            }
            let mut parent_meta = self.post_meta(parent)?;
            if !parent_meta.allow_replies {
                return Err(LedgerError::InvalidPost {
                    post_key: rendered,
                    reason: format!("{} does not allow replies", parent),
                });
            }
            let mut comments = self.post_comments(parent)?;
            comments.push(key.clone());
            self.set_record(&keys::post_comments(&parent.to_string()), &comments)?;
            parent_meta.last_activity = time;
            parent_meta.activity_sequence += 1;
            self.set_record(&keys::post_meta(&parent.to_string()), &parent_meta)?;
        }

        self.set_record(&keys::post(&rendered), info)?;
        self.set_record(
            &keys::post_meta(&rendered),
            &PostMeta {
                created_at: time,
                last_activity: time,
                allow_replies: info.allow_replies,
                activity_sequence: 0,
            },
        )?;
        self.set_record(&keys::post_likes(&rendered), &Vec::<Like>::new())?;
        self.set_record(&keys::post_comments(&rendered), &Vec::<PostKey>::new())?;
        self.set_record(&keys::post_views(&rendered), &Vec::<View>::new())?;
        self.set_record(&keys::post_donations(&rendered), &PostDonations::default())?;
        Ok(())
    }

    /// Add or replace `username`'s like on `target`
    pub fn add_like(
        &mut self,
        target: &PostKey,
        username: &str,
        weight: i64,
        time: i64,
    ) -> LedgerResult<()> {
        if !(-MAX_LIKE_WEIGHT..=MAX_LIKE_WEIGHT).contains(&weight) {
            return Err(LedgerError::WeightOverflow { weight });
        }
        self.require_post(target)?;

        let mut likes = self.post_likes(target)?;
        let like = Like {
            username: username.to_string(),
            weight,
            created_at: time,
        };
        match likes.iter_mut().find(|l| l.username == username) {
            Some(existing) => *existing = like,
            None => likes.push(like),
        }
        self.set_record(&keys::post_likes(&target.to_string()), &likes)?;
        self.touch_post(target, time)
    }

    pub fn add_view(&mut self, target: &PostKey, username: &str, time: i64) -> LedgerResult<()> {
        self.require_post(target)?;
        let mut views = self.post_views(target)?;
        views.push(View {
            username: username.to_string(),
            created_at: time,
        });
        self.set_record(&keys::post_views(&target.to_string()), &views)?;
        self.touch_post(target, time)
    }

    /// Record a donation; `amount` is what the author actually received
    pub fn add_donation(
        &mut self,
        target: &PostKey,
        username: &str,
        amount: Coin,
        time: i64,
    ) -> LedgerResult<()> {
        self.require_post(target)?;
        let mut donations = self.post_donations(target)?;
        donations.reward = donations.reward.checked_add(amount)?;
        donations.donations.push(Donation {
            username: username.to_string(),
            amount,
            created_at: time,
        });
        self.set_record(&keys::post_donations(&target.to_string()), &donations)?;
        self.touch_post(target, time)
    }

    /// `InvalidPost` for a malformed key, `UnknownTarget` for a missing post
    pub fn require_post(&self, target: &PostKey) -> LedgerResult<()> {
        target.validate()?;
        if self.post_exists(target) {
            Ok(())
        } else {
            Err(LedgerError::UnknownTarget {
                post_key: target.to_string(),
            })
        }
    }

    fn touch_post(&mut self, target: &PostKey, time: i64) -> LedgerResult<()> {
        let mut meta = self.post_meta(target)?;
        meta.last_activity = time;
        meta.activity_sequence += 1;
        self.set_record(&keys::post_meta(&target.to_string()), &meta)
    }
}
