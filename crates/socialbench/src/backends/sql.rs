//! SQL shared by the relational backends.
//!
//! The DDL and statements are written in the subset PostgreSQL, MariaDB and
//! SQLite all accept; only bind placeholders differ.

use crate::fixtures::{EntityKind, Value};

/// Bind placeholder syntax.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placeholder {
    /// `$1, $2, ...` (PostgreSQL).
    Numbered,
    /// `?` (MariaDB, SQLite).
    Question,
}

/// Table definitions, in dependency order.
pub const SCHEMA: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS Users (
        user_id BIGINT PRIMARY KEY,
        username VARCHAR(255) NOT NULL,
        email VARCHAR(255) NOT NULL,
        password_hash VARCHAR(64) NOT NULL,
        profile_picture VARCHAR(255) NOT NULL,
        bio TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS Posts (
        post_id BIGINT PRIMARY KEY,
        user_id BIGINT NOT NULL,
        content TEXT NOT NULL,
        media_url VARCHAR(255) NOT NULL,
        FOREIGN KEY (user_id) REFERENCES Users(user_id)
    )",
    "CREATE TABLE IF NOT EXISTS Comments (
        comment_id BIGINT PRIMARY KEY,
        post_id BIGINT NOT NULL,
        user_id BIGINT NOT NULL,
        content TEXT NOT NULL,
        FOREIGN KEY (post_id) REFERENCES Posts(post_id),
        FOREIGN KEY (user_id) REFERENCES Users(user_id)
    )",
    "CREATE TABLE IF NOT EXISTS Likes (
        like_id BIGINT PRIMARY KEY,
        post_id BIGINT NOT NULL,
        user_id BIGINT NOT NULL,
        FOREIGN KEY (post_id) REFERENCES Posts(post_id),
        FOREIGN KEY (user_id) REFERENCES Users(user_id)
    )",
    "CREATE TABLE IF NOT EXISTS Followers (
        follower_user_id BIGINT NOT NULL,
        following_user_id BIGINT NOT NULL,
        PRIMARY KEY (follower_user_id, following_user_id),
        FOREIGN KEY (follower_user_id) REFERENCES Users(user_id),
        FOREIGN KEY (following_user_id) REFERENCES Users(user_id)
    )",
    "CREATE TABLE IF NOT EXISTS Messages (
        message_id BIGINT PRIMARY KEY,
        sender_id BIGINT NOT NULL,
        receiver_id BIGINT NOT NULL,
        content TEXT NOT NULL,
        FOREIGN KEY (sender_id) REFERENCES Users(user_id),
        FOREIGN KEY (receiver_id) REFERENCES Users(user_id)
    )",
];

/// Multi-row `INSERT` for `rows` rows of `kind`.
pub fn insert_statement(kind: EntityKind, rows: usize, placeholder: Placeholder) -> String {
    let columns = kind.columns();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        kind.collection(),
        columns.join(", ")
    );
    let mut n = 0;
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..columns.len() {
            if col > 0 {
                sql.push_str(", ");
            }
            n += 1;
            match placeholder {
                Placeholder::Numbered => {
                    sql.push('$');
                    sql.push_str(&n.to_string());
                }
                Placeholder::Question => sql.push('?'),
            }
        }
        sql.push(')');
    }
    sql
}

/// `DELETE` of every row of `kind`.
pub fn delete_statement(kind: EntityKind) -> String {
    format!("DELETE FROM {}", kind.collection())
}

/// Rows per `INSERT` so one statement stays under `max_params` binds.
pub fn rows_per_statement(kind: EntityKind, max_params: usize) -> usize {
    (max_params / kind.columns().len()).max(1)
}

/// Row-major flattening of a chunk into positional parameters.
pub fn flatten(rows: &[Vec<Value>]) -> impl Iterator<Item = &Value> {
    rows.iter().flatten()
}
