//! Database access for udulib-api
//!
//! One module per table family. Functions take the pool (or a transaction)
//! and return `sqlx::Result`, so constraint violations reach the error
//! mapping in [`crate::error`] intact.

pub mod academic_years;
pub mod comments;
pub mod departments;
pub mod documents;
pub mod forum_posts;
pub mod forum_replies;
pub mod forums;
pub mod history;
pub mod majors;
pub mod notifications;
pub mod ratings;
pub mod shared_links;
pub mod statistics;
pub mod subjects;
pub mod system_config;
pub mod tags;
pub mod users;

use sqlx::{QueryBuilder, Sqlite};

/// Append `AND (col1 LIKE %term% OR col2 LIKE ...)` for a non-empty term
pub(crate) fn push_search<'a>(qb: &mut QueryBuilder<'a, Sqlite>, columns: &[&str], term: Option<&'a str>) {
    let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
        return;
    };
    qb.push(" AND (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(*column).push(" LIKE '%' || ").push_bind(term).push(" || '%'");
    }
    qb.push(")");
}
