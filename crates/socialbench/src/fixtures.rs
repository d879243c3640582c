//! Test data generation for benchmarks.
//!
//! Produces the six social-network entity kinds with referential links between
//! them. Every random choice comes from one seeded `StdRng`, so a seed fully
//! determines the dataset.
//!
//! Posts, Comments and Messages pick their foreign keys uniformly at random.
//! Likes and Followers are taken from the full pair space (posts x users and
//! ordered user pairs) instead: by default the first `count` pairs in
//! enumeration order, or a uniform sample when [`PairSelection::Sampled`] is
//! requested.

use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::{EntityCounts, PairSelection};
use crate::error::{Error, Result};
use crate::progress::{Progress, ProgressSink};

/// Default generator seed.
pub const DEFAULT_SEED: u64 = 41;

/// The six entity kinds of the workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EntityKind {
    User,
    Post,
    Comment,
    Like,
    Follower,
    Message,
}

impl EntityKind {
    /// Dependency order: every kind comes after the kinds it references.
    pub const INSERT_ORDER: [EntityKind; 6] = [
        EntityKind::User,
        EntityKind::Post,
        EntityKind::Comment,
        EntityKind::Like,
        EntityKind::Follower,
        EntityKind::Message,
    ];

    /// Reverse dependency order, safe for foreign keys.
    pub const DELETE_ORDER: [EntityKind; 6] = [
        EntityKind::Message,
        EntityKind::Follower,
        EntityKind::Like,
        EntityKind::Comment,
        EntityKind::Post,
        EntityKind::User,
    ];

    /// Collection / table name.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::User => "Users",
            EntityKind::Post => "Posts",
            EntityKind::Comment => "Comments",
            EntityKind::Like => "Likes",
            EntityKind::Follower => "Followers",
            EntityKind::Message => "Messages",
        }
    }

    /// Column / field names, in row order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::User => &[
                "user_id",
                "username",
                "email",
                "password_hash",
                "profile_picture",
                "bio",
            ],
            EntityKind::Post => &["post_id", "user_id", "content", "media_url"],
            EntityKind::Comment => &["comment_id", "post_id", "user_id", "content"],
            EntityKind::Like => &["like_id", "post_id", "user_id"],
            EntityKind::Follower => &["follower_user_id", "following_user_id"],
            EntityKind::Message => &["message_id", "sender_id", "receiver_id", "content"],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// A single column value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// A generated record of one entity kind.
pub trait Record {
    const KIND: EntityKind;

    /// Column values in [`EntityKind::columns`] order.
    fn values(&self) -> Vec<Value>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub profile_picture: String,
    pub bio: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Post {
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub media_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub comment_id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Like {
    pub like_id: i64,
    pub post_id: i64,
    pub user_id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Follower {
    pub follower_user_id: i64,
    pub following_user_id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
}

impl Record for User {
    const KIND: EntityKind = EntityKind::User;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.user_id),
            Value::Text(self.username.clone()),
            Value::Text(self.email.clone()),
            Value::Text(self.password_hash.clone()),
            Value::Text(self.profile_picture.clone()),
            Value::Text(self.bio.clone()),
        ]
    }
}

impl Record for Post {
    const KIND: EntityKind = EntityKind::Post;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.post_id),
            Value::Int(self.user_id),
            Value::Text(self.content.clone()),
            Value::Text(self.media_url.clone()),
        ]
    }
}

impl Record for Comment {
    const KIND: EntityKind = EntityKind::Comment;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.comment_id),
            Value::Int(self.post_id),
            Value::Int(self.user_id),
            Value::Text(self.content.clone()),
        ]
    }
}

impl Record for Like {
    const KIND: EntityKind = EntityKind::Like;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.like_id),
            Value::Int(self.post_id),
            Value::Int(self.user_id),
        ]
    }
}

impl Record for Follower {
    const KIND: EntityKind = EntityKind::Follower;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.follower_user_id),
            Value::Int(self.following_user_id),
        ]
    }
}

impl Record for Message {
    const KIND: EntityKind = EntityKind::Message;

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.message_id),
            Value::Int(self.sender_id),
            Value::Int(self.receiver_id),
            Value::Text(self.content.clone()),
        ]
    }
}

/// Backend-neutral rows of one entity kind, ready for a bulk insert.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub kind: EntityKind,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Convert generated records into rows.
    pub fn from_records<R: Record>(records: &[R]) -> Self {
        Self {
            kind: R::KIND,
            rows: records.iter().map(Record::values).collect(),
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        self.kind.columns()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Maximum number of distinct (post, user) like pairs. `None` on overflow.
pub fn like_ceiling(posts: usize, users: usize) -> Option<usize> {
    posts.checked_mul(users)
}

/// Maximum number of ordered (follower, following) pairs of distinct users.
/// `None` on overflow.
pub fn follower_ceiling(users: usize) -> Option<usize> {
    users.checked_mul(users.saturating_sub(1))
}

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "reprehenderit",
    "voluptate", "velit", "esse", "cillum", "fugiat", "nulla", "pariatur", "excepteur", "sint",
    "occaecat", "cupidatat", "non", "proident", "sunt", "culpa", "qui", "officia", "deserunt",
    "mollit", "anim", "id", "est", "laborum",
];

const NAME_PARTS: &[&str] = &[
    "alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi", "ivan", "judy", "mallory",
    "niaj", "olivia", "peggy", "rupert", "sybil", "trent", "victor", "walter", "zoe",
];

const DOMAINS: &[&str] = &["example.com", "example.org", "example.net", "mail.test"];

/// Seeded generator for all entity kinds.
pub struct Generator<'w> {
    rng: StdRng,
    selection: PairSelection,
    progress: Option<&'w ProgressSink<'w>>,
}

impl<'w> Generator<'w> {
    /// Create a generator from a seed. Progress output is off.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            selection: PairSelection::default(),
            progress: None,
        }
    }

    /// Set how Like and Follower pairs are chosen.
    pub fn with_pair_selection(mut self, selection: PairSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Draw a progress bar on `out` while generating.
    pub fn with_progress(mut self, out: &'w ProgressSink<'w>) -> Self {
        self.progress = Some(out);
        self
    }

    fn progress(&self, total: usize) -> Progress<'w> {
        Progress::new(total, self.progress)
    }

    fn sentence(&mut self, min_words: usize, max_words: usize) -> String {
        let n = self.rng.gen_range(min_words..=max_words);
        let mut text = String::new();
        for i in 0..n {
            if i > 0 {
                text.push(' ');
            }
            // WORDS is non-empty, choose cannot fail.
            text.push_str(WORDS.choose(&mut self.rng).copied().unwrap_or("lorem"));
        }
        if let Some(first) = text.get(0..1) {
            let upper = first.to_uppercase();
            text.replace_range(0..1, &upper);
        }
        text.push('.');
        text
    }

    fn paragraph(&mut self) -> String {
        let sentences = self.rng.gen_range(2..=4);
        (0..sentences)
            .map(|_| self.sentence(4, 12))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn image_url(&mut self) -> String {
        let token: u32 = self.rng.gen();
        format!("https://picsum.photos/seed/{token:08x}/640/480")
    }

    fn password_hash(&mut self) -> String {
        let salt: [u8; 16] = self.rng.gen();
        hex::encode(Sha256::digest(salt))
    }

    fn pick<'a, T>(&mut self, items: &'a [T], what: &str) -> Result<&'a T> {
        items
            .choose(&mut self.rng)
            .ok_or_else(|| Error::Config(format!("cannot reference {what}: none generated")))
    }

    /// Indices `0..count` into a pair space of `ceiling` pairs.
    fn pair_indices(&mut self, ceiling: usize, count: usize) -> Vec<usize> {
        match self.selection {
            PairSelection::Prefix => (0..count).collect(),
            PairSelection::Sampled => {
                let mut indices = rand::seq::index::sample(&mut self.rng, ceiling, count).into_vec();
                indices.sort_unstable();
                indices
            }
        }
    }

    /// Generate `count` users with ids `1..=count`.
    pub fn users(&mut self, count: usize) -> Vec<User> {
        let mut progress = self.progress(count);
        let mut users = Vec::with_capacity(count);
        for i in 0..count {
            let user_id = i as i64 + 1;
            let first = NAME_PARTS[self.rng.gen_range(0..NAME_PARTS.len())];
            let last = NAME_PARTS[self.rng.gen_range(0..NAME_PARTS.len())];
            let username = format!("{first}_{last}{user_id}");
            let domain = DOMAINS[self.rng.gen_range(0..DOMAINS.len())];
            let email = format!("{first}.{last}.{user_id}@{domain}");
            let password_hash = self.password_hash();
            let profile_picture = self.image_url();
            let bio = self.paragraph();

            users.push(User {
                user_id,
                username,
                email,
                password_hash,
                profile_picture,
                bio,
            });
            progress.tick();
        }
        progress.finish();
        users
    }

    /// Generate `count` posts, each by a random user.
    pub fn posts(&mut self, users: &[User], count: usize) -> Result<Vec<Post>> {
        let mut progress = self.progress(count);
        let mut posts = Vec::with_capacity(count);
        for i in 0..count {
            let user_id = self.pick(users, "users")?.user_id;
            let content = self.paragraph();
            let media_url = self.image_url();
            posts.push(Post {
                post_id: i as i64 + 1,
                user_id,
                content,
                media_url,
            });
            progress.tick();
        }
        progress.finish();
        Ok(posts)
    }

    /// Generate `count` comments on random posts by random users.
    pub fn comments(&mut self, posts: &[Post], users: &[User], count: usize) -> Result<Vec<Comment>> {
        let mut progress = self.progress(count);
        let mut comments = Vec::with_capacity(count);
        for i in 0..count {
            let post_id = self.pick(posts, "posts")?.post_id;
            let user_id = self.pick(users, "users")?.user_id;
            let content = self.sentence(3, 20);
            comments.push(Comment {
                comment_id: i as i64 + 1,
                post_id,
                user_id,
                content,
            });
            progress.tick();
        }
        progress.finish();
        Ok(comments)
    }

    /// Generate `count` likes from the posts x users pair space.
    ///
    /// Pairs are enumerated post-major: (p1, u1), (p1, u2), ... (p2, u1), ...
    pub fn likes(&mut self, posts: &[Post], users: &[User], count: usize) -> Result<Vec<Like>> {
        let ceiling = like_ceiling(posts.len(), users.len()).unwrap_or(usize::MAX);
        if count > ceiling {
            return Err(Error::Config(format!(
                "{count} likes requested but only {ceiling} (post, user) pairs exist"
            )));
        }

        let indices = self.pair_indices(ceiling, count);
        let mut progress = self.progress(count);
        let mut likes = Vec::with_capacity(count);
        for (i, index) in indices.into_iter().enumerate() {
            let post = &posts[index / users.len()];
            let user = &users[index % users.len()];
            likes.push(Like {
                like_id: i as i64 + 1,
                post_id: post.post_id,
                user_id: user.user_id,
            });
            progress.tick();
        }
        progress.finish();
        Ok(likes)
    }

    /// Generate `count` follower pairs from the ordered pairs of distinct users.
    ///
    /// Pairs are enumerated follower-major, skipping self-follows:
    /// (u1, u2), (u1, u3), ... (u2, u1), (u2, u3), ...
    pub fn followers(&mut self, users: &[User], count: usize) -> Result<Vec<Follower>> {
        let ceiling = follower_ceiling(users.len()).unwrap_or(usize::MAX);
        if count > ceiling {
            return Err(Error::Config(format!(
                "{count} followers requested but only {ceiling} ordered user pairs exist"
            )));
        }

        let indices = self.pair_indices(ceiling, count);
        let others = users.len().saturating_sub(1);
        let mut progress = self.progress(count);
        let mut followers = Vec::with_capacity(count);
        for index in indices {
            let a = index / others;
            let r = index % others;
            let b = if r < a { r } else { r + 1 };
            followers.push(Follower {
                follower_user_id: users[a].user_id,
                following_user_id: users[b].user_id,
            });
            progress.tick();
        }
        progress.finish();
        Ok(followers)
    }

    /// Generate `count` messages between random users.
    pub fn messages(&mut self, users: &[User], count: usize) -> Result<Vec<Message>> {
        let mut progress = self.progress(count);
        let mut messages = Vec::with_capacity(count);
        for i in 0..count {
            let sender_id = self.pick(users, "users")?.user_id;
            let receiver_id = self.pick(users, "users")?.user_id;
            let content = self.sentence(3, 25);
            messages.push(Message {
                message_id: i as i64 + 1,
                sender_id,
                receiver_id,
                content,
            });
            progress.tick();
        }
        progress.finish();
        Ok(messages)
    }
}

/// All six entity kinds generated in dependency order.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub users: Vec<User>,
    pub posts: Vec<Post>,
    pub comments: Vec<Comment>,
    pub likes: Vec<Like>,
    pub followers: Vec<Follower>,
    pub messages: Vec<Message>,
}

impl Dataset {
    /// Generate every kind at the requested counts.
    pub fn generate(counts: &EntityCounts, generator: &mut Generator<'_>) -> Result<Self> {
        counts.validate()?;
        let users = generator.users(counts.users);
        let posts = generator.posts(&users, counts.posts)?;
        let comments = generator.comments(&posts, &users, counts.comments)?;
        let likes = generator.likes(&posts, &users, counts.likes)?;
        let followers = generator.followers(&users, counts.followers)?;
        let messages = generator.messages(&users, counts.messages)?;

        Ok(Self {
            users,
            posts,
            comments,
            likes,
            followers,
            messages,
        })
    }

    /// Rows of one kind.
    pub fn table(&self, kind: EntityKind) -> Table {
        match kind {
            EntityKind::User => Table::from_records(&self.users),
            EntityKind::Post => Table::from_records(&self.posts),
            EntityKind::Comment => Table::from_records(&self.comments),
            EntityKind::Like => Table::from_records(&self.likes),
            EntityKind::Follower => Table::from_records(&self.followers),
            EntityKind::Message => Table::from_records(&self.messages),
        }
    }
}
