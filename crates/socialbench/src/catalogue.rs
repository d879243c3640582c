//! The fixed query catalogue.
//!
//! Each logical query has a SQL form for relational backends and a pipeline
//! form for the document store. Both forms are produced by exhaustive matches
//! on [`QueryId`], so adding a query without one of its forms does not compile.

use std::fmt;

use mongodb::bson::{doc, Document};
use serde::Serialize;

use crate::config::EntityCounts;
use crate::fixtures::EntityKind;

/// Logical query identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum QueryId {
    /// First half of the users.
    UsersLimit,
    /// Point-range lookup on user id with a projection.
    UsersBelowId,
    /// Row count of Posts.
    CountPosts,
    /// Users joined with their posts.
    UserPostsJoin,
    /// Comment count per username.
    CommentsPerUser,
    /// Like count per post, most liked first.
    LikesPerPost,
    /// Users following at least one other user (EXISTS subquery).
    UsersWithFollowing,
    /// Message count per (sender, receiver) pair.
    MessagesPerPair,
    /// Liked posts with their author (IN subquery).
    LikedPostsWithAuthor,
    /// Post count per username.
    PostsPerUser,
}

impl QueryId {
    /// Execution order.
    pub const ALL: [QueryId; 10] = [
        QueryId::UsersLimit,
        QueryId::UsersBelowId,
        QueryId::CountPosts,
        QueryId::UserPostsJoin,
        QueryId::CommentsPerUser,
        QueryId::LikesPerPost,
        QueryId::UsersWithFollowing,
        QueryId::MessagesPerPair,
        QueryId::LikedPostsWithAuthor,
        QueryId::PostsPerUser,
    ];

    /// 1-based position in [`QueryId::ALL`].
    pub fn number(&self) -> usize {
        Self::ALL
            .iter()
            .position(|id| id == self)
            .map_or(0, |i| i + 1)
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryId::UsersLimit => "users_limit",
            QueryId::UsersBelowId => "users_below_id",
            QueryId::CountPosts => "count_posts",
            QueryId::UserPostsJoin => "user_posts_join",
            QueryId::CommentsPerUser => "comments_per_user",
            QueryId::LikesPerPost => "likes_per_post",
            QueryId::UsersWithFollowing => "users_with_following",
            QueryId::MessagesPerPair => "messages_per_pair",
            QueryId::LikedPostsWithAuthor => "liked_posts_with_author",
            QueryId::PostsPerUser => "posts_per_user",
        }
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query {}", self.number())
    }
}

/// Document-store form of a query.
#[derive(Clone, Debug, PartialEq)]
pub enum Pipeline {
    /// `find` with optional projection and limit.
    Find {
        collection: EntityKind,
        filter: Document,
        projection: Option<Document>,
        limit: Option<i64>,
    },
    /// `countDocuments`.
    Count {
        collection: EntityKind,
        filter: Document,
    },
    /// `aggregate` over a stage list.
    Aggregate {
        collection: EntityKind,
        stages: Vec<Document>,
    },
}

impl Pipeline {
    /// Collection the pipeline starts from.
    pub fn collection(&self) -> EntityKind {
        match self {
            Pipeline::Find { collection, .. }
            | Pipeline::Count { collection, .. }
            | Pipeline::Aggregate { collection, .. } => *collection,
        }
    }

    /// Row limit of a `find`, or of the first `$limit` stage.
    pub fn limit(&self) -> Option<i64> {
        match self {
            Pipeline::Find { limit, .. } => *limit,
            Pipeline::Count { .. } => None,
            Pipeline::Aggregate { stages, .. } => stages
                .iter()
                .find_map(|stage| stage.get_i64("$limit").ok()),
        }
    }

    /// Collections pulled in by `$lookup` stages.
    pub fn lookups(&self) -> Vec<&str> {
        match self {
            Pipeline::Aggregate { stages, .. } => stages
                .iter()
                .filter_map(|stage| stage.get_document("$lookup").ok())
                .filter_map(|lookup| lookup.get_str("from").ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Shell-style rendering, e.g. `db.Posts.countDocuments({})`.
impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Find {
                collection,
                filter,
                projection,
                limit,
            } => {
                write!(f, "db.{collection}.find({filter}")?;
                if let Some(projection) = projection {
                    write!(f, ", {projection}")?;
                }
                f.write_str(")")?;
                if let Some(limit) = limit {
                    write!(f, ".limit({limit})")?;
                }
                Ok(())
            }
            Pipeline::Count { collection, filter } => {
                write!(f, "db.{collection}.countDocuments({filter})")
            }
            Pipeline::Aggregate { collection, stages } => {
                write!(f, "db.{collection}.aggregate([")?;
                for (i, stage) in stages.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{stage}")?;
                }
                f.write_str("])")
            }
        }
    }
}

/// One catalogue entry with both of its forms.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogueQuery {
    pub id: QueryId,
    pub sql: String,
    pub pipeline: Pipeline,
}

/// Build the catalogue for the given row counts, in [`QueryId::ALL`] order.
pub fn catalogue(counts: &EntityCounts) -> Vec<CatalogueQuery> {
    let limits = Limits::from(counts);
    QueryId::ALL
        .into_iter()
        .map(|id| CatalogueQuery {
            id,
            sql: sql(id, &limits),
            pipeline: pipeline(id, &limits),
        })
        .collect()
}

struct Limits {
    half_users: i64,
    half_posts: i64,
}

impl From<&EntityCounts> for Limits {
    fn from(counts: &EntityCounts) -> Self {
        Self {
            half_users: (counts.users / 2) as i64,
            half_posts: (counts.posts / 2) as i64,
        }
    }
}

fn sql(id: QueryId, limits: &Limits) -> String {
    let Limits {
        half_users,
        half_posts,
    } = limits;
    match id {
        QueryId::UsersLimit => format!("SELECT * FROM Users LIMIT {half_users}"),
        QueryId::UsersBelowId => {
            format!("SELECT username, email FROM Users WHERE user_id < {half_users}")
        }
        QueryId::CountPosts => "SELECT COUNT(*) FROM Posts".to_string(),
        QueryId::UserPostsJoin => format!(
            "SELECT Users.username, Posts.content FROM Users JOIN Posts ON Users.user_id = Posts.user_id LIMIT {half_posts}"
        ),
        QueryId::CommentsPerUser => "SELECT Users.username, COUNT(Comments.comment_id) FROM Users JOIN Comments ON Users.user_id = Comments.user_id GROUP BY Users.username".to_string(),
        QueryId::LikesPerPost => format!(
            "SELECT Posts.post_id, COUNT(Likes.like_id) AS like_count FROM Posts LEFT JOIN Likes ON Posts.post_id = Likes.post_id GROUP BY Posts.post_id ORDER BY like_count DESC LIMIT {half_posts}"
        ),
        QueryId::UsersWithFollowing => "SELECT Users.username FROM Users WHERE EXISTS (SELECT 1 FROM Followers WHERE Followers.follower_user_id = Users.user_id)".to_string(),
        QueryId::MessagesPerPair => "SELECT Messages.sender_id, Messages.receiver_id, COUNT(Messages.message_id) FROM Messages GROUP BY Messages.sender_id, Messages.receiver_id HAVING COUNT(Messages.message_id) > 0".to_string(),
        QueryId::LikedPostsWithAuthor => "SELECT Users.username, Posts.content FROM Users JOIN Posts ON Users.user_id = Posts.user_id WHERE Posts.post_id IN (SELECT post_id FROM Likes GROUP BY post_id HAVING COUNT(user_id) > 0)".to_string(),
        QueryId::PostsPerUser => "SELECT Users.username, COUNT(Posts.post_id) AS post_count FROM Users JOIN Posts ON Users.user_id = Posts.user_id GROUP BY Users.username HAVING COUNT(Posts.post_id) > 0".to_string(),
    }
}

fn lookup(from: EntityKind, local: &str, foreign: &str, alias: &str) -> Document {
    doc! {
        "$lookup": {
            "from": from.collection(),
            "localField": local,
            "foreignField": foreign,
            "as": alias,
        }
    }
}

fn pipeline(id: QueryId, limits: &Limits) -> Pipeline {
    match id {
        QueryId::UsersLimit => Pipeline::Find {
            collection: EntityKind::User,
            filter: doc! {},
            projection: None,
            limit: Some(limits.half_users),
        },
        QueryId::UsersBelowId => Pipeline::Find {
            collection: EntityKind::User,
            filter: doc! { "user_id": { "$lt": limits.half_users } },
            projection: Some(doc! { "username": 1, "email": 1 }),
            limit: None,
        },
        QueryId::CountPosts => Pipeline::Count {
            collection: EntityKind::Post,
            filter: doc! {},
        },
        QueryId::UserPostsJoin => Pipeline::Aggregate {
            collection: EntityKind::User,
            stages: vec![
                lookup(EntityKind::Post, "user_id", "user_id", "posts"),
                doc! { "$unwind": "$posts" },
                doc! { "$project": { "username": 1, "posts.content": 1 } },
                doc! { "$limit": limits.half_posts },
            ],
        },
        QueryId::CommentsPerUser => Pipeline::Aggregate {
            collection: EntityKind::User,
            stages: vec![
                lookup(EntityKind::Comment, "user_id", "user_id", "comments"),
                doc! { "$project": { "username": 1, "comment_count": { "$size": "$comments" } } },
                // Inner-join semantics: users without comments drop out.
                doc! { "$match": { "comment_count": { "$gt": 0 } } },
            ],
        },
        QueryId::LikesPerPost => Pipeline::Aggregate {
            collection: EntityKind::Post,
            stages: vec![
                lookup(EntityKind::Like, "post_id", "post_id", "likes"),
                doc! { "$project": { "post_id": 1, "like_count": { "$size": "$likes" } } },
                doc! { "$sort": { "like_count": -1 } },
                doc! { "$limit": limits.half_posts },
            ],
        },
        QueryId::UsersWithFollowing => Pipeline::Aggregate {
            collection: EntityKind::User,
            stages: vec![
                lookup(EntityKind::Follower, "user_id", "follower_user_id", "following"),
                doc! { "$match": { "following": { "$ne": [] } } },
                doc! { "$project": { "username": 1 } },
            ],
        },
        QueryId::MessagesPerPair => Pipeline::Aggregate {
            collection: EntityKind::Message,
            stages: vec![
                doc! {
                    "$group": {
                        "_id": { "sender_id": "$sender_id", "receiver_id": "$receiver_id" },
                        "message_count": { "$sum": 1 },
                    }
                },
                doc! { "$match": { "message_count": { "$gt": 0 } } },
                doc! {
                    "$project": {
                        "sender_id": "$_id.sender_id",
                        "receiver_id": "$_id.receiver_id",
                        "message_count": 1,
                        "_id": 0,
                    }
                },
            ],
        },
        QueryId::LikedPostsWithAuthor => Pipeline::Aggregate {
            collection: EntityKind::Post,
            stages: vec![
                lookup(EntityKind::User, "user_id", "user_id", "author"),
                doc! { "$unwind": "$author" },
                lookup(EntityKind::Like, "post_id", "post_id", "likes"),
                doc! { "$match": { "likes": { "$ne": [] } } },
                doc! { "$project": { "_id": 0, "username": "$author.username", "content": 1 } },
            ],
        },
        QueryId::PostsPerUser => Pipeline::Aggregate {
            collection: EntityKind::User,
            stages: vec![
                lookup(EntityKind::Post, "user_id", "user_id", "posts"),
                doc! { "$project": { "username": 1, "post_count": { "$size": "$posts" } } },
                doc! { "$match": { "post_count": { "$gt": 0 } } },
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn tables_in(sql: &str) -> HashSet<&'static str> {
        EntityKind::INSERT_ORDER
            .iter()
            .map(EntityKind::collection)
            .filter(|table| sql.contains(&format!("FROM {table}")) || sql.contains(&format!("JOIN {table}")))
            .collect()
    }

    #[test]
    fn test_catalogue_has_ten_named_queries() {
        let queries = catalogue(&EntityCounts::default());
        assert_eq!(queries.len(), 10);

        let ids: HashSet<_> = queries.iter().map(|q| q.id).collect();
        assert_eq!(ids.len(), 10);

        for (i, query) in queries.iter().enumerate() {
            assert_eq!(query.id.number(), i + 1);
        }
    }

    #[test]
    fn test_forms_touch_same_collections() {
        for query in catalogue(&EntityCounts::default()) {
            let tables = tables_in(&query.sql);
            assert!(
                tables.contains(query.pipeline.collection().collection()),
                "{} pipeline starts from {} which its SQL does not read",
                query.id.name(),
                query.pipeline.collection()
            );
            for from in query.pipeline.lookups() {
                assert!(
                    tables.contains(from),
                    "{} pipeline looks up {from} which its SQL does not read",
                    query.id.name()
                );
            }
        }
    }

    #[test]
    fn test_limits_follow_counts() {
        let counts = EntityCounts {
            users: 6,
            posts: 10,
            ..EntityCounts::uniform(0)
        };
        let queries = catalogue(&counts);

        assert_eq!(queries[0].sql, "SELECT * FROM Users LIMIT 3");
        assert!(queries[3].sql.ends_with("LIMIT 5"));
        match &queries[0].pipeline {
            Pipeline::Find { limit, .. } => assert_eq!(*limit, Some(3)),
            other => panic!("unexpected pipeline {other:?}"),
        }
    }

    #[test]
    fn test_pipeline_limits() {
        let queries = catalogue(&EntityCounts {
            users: 8,
            posts: 1,
            ..EntityCounts::uniform(0)
        });
        assert_eq!(queries[0].pipeline.limit(), Some(4));
        assert_eq!(queries[1].pipeline.limit(), None);
        assert_eq!(queries[2].pipeline.limit(), None);
        assert_eq!(queries[3].pipeline.limit(), Some(0));
    }

    #[test]
    fn test_count_posts_pairing() {
        let queries = catalogue(&EntityCounts::default());
        let count = queries
            .iter()
            .find(|q| q.id == QueryId::CountPosts)
            .unwrap();
        assert_eq!(count.sql, "SELECT COUNT(*) FROM Posts");
        assert_eq!(
            count.pipeline,
            Pipeline::Count {
                collection: EntityKind::Post,
                filter: doc! {},
            }
        );
    }

    #[test]
    fn test_pipeline_display() {
        let queries = catalogue(&EntityCounts {
            users: 6,
            ..EntityCounts::uniform(0)
        });
        assert_eq!(queries[0].pipeline.to_string(), "db.Users.find({}).limit(3)");
        assert_eq!(
            queries[2].pipeline.to_string(),
            "db.Posts.countDocuments({})"
        );
        assert!(queries[3]
            .pipeline
            .to_string()
            .starts_with("db.Users.aggregate([{ \"$lookup\""));
    }

    #[test]
    fn test_display_uses_position() {
        assert_eq!(QueryId::UsersLimit.to_string(), "Query 1");
        assert_eq!(QueryId::PostsPerUser.to_string(), "Query 10");
    }
}
