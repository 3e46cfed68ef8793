//! Subject queries

use chrono::Utc;
use sqlx::{QueryBuilder, Result, Sqlite, SqlitePool};
use udulib_common::models::Subject;

use crate::pagination::Pagination;

const COLUMNS: &str = "subject_id, subject_name, subject_code, description, major_id, year_id, created_at, updated_at";

#[derive(Debug, Default)]
pub struct SubjectFilter {
    pub major_id: Option<i64>,
    pub year_id: Option<i64>,
    pub search: Option<String>,
}

pub struct NewSubject {
    pub subject_name: String,
    pub subject_code: String,
    pub description: Option<String>,
    pub major_id: i64,
    pub year_id: i64,
}

#[derive(Debug, Default)]
pub struct SubjectChanges {
    pub subject_name: Option<String>,
    pub subject_code: Option<String>,
    pub description: Option<String>,
    pub major_id: Option<i64>,
    pub year_id: Option<i64>,
}

pub async fn get(pool: &SqlitePool, subject_id: i64) -> Result<Option<Subject>> {
    sqlx::query_as(&format!("SELECT {} FROM subjects WHERE subject_id = ?", COLUMNS))
        .bind(subject_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_code(pool: &SqlitePool, major_id: i64, code: &str) -> Result<Option<Subject>> {
    sqlx::query_as(&format!(
        "SELECT {} FROM subjects WHERE major_id = ? AND subject_code = ?",
        COLUMNS
    ))
    .bind(major_id)
    .bind(code)
    .fetch_optional(pool)
    .await
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a SubjectFilter) {
    qb.push(" WHERE 1=1");
    if let Some(major_id) = filter.major_id {
        qb.push(" AND major_id = ").push_bind(major_id);
    }
    if let Some(year_id) = filter.year_id {
        qb.push(" AND year_id = ").push_bind(year_id);
    }
    super::push_search(qb, &["subject_name", "subject_code"], filter.search.as_deref());
}

pub async fn count(pool: &SqlitePool, filter: &SubjectFilter) -> Result<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM subjects");
    push_filter(&mut qb, filter);
    qb.build_query_scalar().fetch_one(pool).await
}

pub async fn list(pool: &SqlitePool, filter: &SubjectFilter, page: Pagination) -> Result<(Vec<Subject>, i64)> {
    let total = count(pool, filter).await?;
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM subjects", COLUMNS));
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY subject_name, subject_id LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset);
    Ok((qb.build_query_as().fetch_all(pool).await?, total))
}

pub async fn create(pool: &SqlitePool, subject: NewSubject) -> Result<Subject> {
    let now = Utc::now();
    sqlx::query_as(&format!(
        "INSERT INTO subjects (subject_name, subject_code, description, major_id, year_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {}",
        COLUMNS
    ))
    .bind(subject.subject_name)
    .bind(subject.subject_code)
    .bind(subject.description)
    .bind(subject.major_id)
    .bind(subject.year_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &SqlitePool, subject_id: i64, changes: SubjectChanges) -> Result<Subject> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE subjects SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(name) = changes.subject_name {
        qb.push(", subject_name = ").push_bind(name);
    }
    if let Some(code) = changes.subject_code {
        qb.push(", subject_code = ").push_bind(code);
    }
    if let Some(description) = changes.description {
        qb.push(", description = ").push_bind(description);
    }
    if let Some(major_id) = changes.major_id {
        qb.push(", major_id = ").push_bind(major_id);
    }
    if let Some(year_id) = changes.year_id {
        qb.push(", year_id = ").push_bind(year_id);
    }
    qb.push(" WHERE subject_id = ").push_bind(subject_id);
    qb.push(" RETURNING ").push(COLUMNS);
    qb.build_query_as().fetch_one(pool).await
}

pub async fn document_count(pool: &SqlitePool, subject_id: i64) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE subject_id = ?")
        .bind(subject_id)
        .fetch_one(pool)
        .await
}

pub async fn delete(pool: &SqlitePool, subject_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM subjects WHERE subject_id = ?")
        .bind(subject_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{academic_years, majors};
    use crate::pagination::PageParams;
    use udulib_common::db::connect_in_memory;

    #[tokio::test]
    async fn test_filters_and_code_uniqueness() {
        let pool = connect_in_memory().await.unwrap();
        let major = majors::create(
            &pool,
            majors::MajorFields {
                major_name: "IT".into(),
                major_code: "IT".into(),
                description: None,
            },
        )
        .await
        .unwrap();
        let y1 = academic_years::create(&pool, "Year 1", 1).await.unwrap();
        let y2 = academic_years::create(&pool, "Year 2", 2).await.unwrap();

        let new = |name: &str, code: &str, year_id| NewSubject {
            subject_name: name.into(),
            subject_code: code.into(),
            description: None,
            major_id: major.major_id,
            year_id,
        };
        create(&pool, new("Calculus", "MATH1", y1.year_id)).await.unwrap();
        create(&pool, new("Databases", "DB2", y2.year_id)).await.unwrap();
        assert!(create(&pool, new("Calculus again", "MATH1", y2.year_id)).await.is_err());

        let page = PageParams::default().validate().unwrap();
        let filter = SubjectFilter {
            year_id: Some(y2.year_id),
            ..Default::default()
        };
        let (subjects, total) = list(&pool, &filter, page).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(subjects[0].subject_code, "DB2");

        // Years with subjects cannot be removed
        assert!(academic_years::delete(&pool, y1.year_id).await.is_err());
    }
}
