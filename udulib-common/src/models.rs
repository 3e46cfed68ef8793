//! Domain enums and database row models
//!
//! Row structs map 1:1 onto the tables created by [`crate::db::init`].
//! Enums are stored as lowercase text (file types as uppercase text).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Declares a text-backed enum with `as_str`, `Display` and `FromStr`
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $casing:literal { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[serde(rename_all = $casing)]
        #[sqlx(rename_all = $casing)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> crate::Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $(t if t == $text.to_ascii_lowercase() => Ok($name::$variant),)+
                    _ => Err(crate::Error::invalid(format!(
                        "'{}' is not a valid {}; expected one of: {}",
                        s,
                        stringify!($name),
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }
    };
}

text_enum! {
    /// Account role
    UserRole, "lowercase" {
        Student => "student",
        Lecturer => "lecturer",
        Admin => "admin",
    }
}

text_enum! {
    /// Account status; banned accounts cannot authenticate
    UserStatus, "lowercase" {
        Active => "active",
        Banned => "banned",
        Pending => "pending",
    }
}

text_enum! {
    /// Moderation state of documents, comments, posts and replies
    ContentStatus, "lowercase" {
        Approved => "approved",
        Pending => "pending",
        Rejected => "rejected",
    }
}

text_enum! {
    /// Coarse document format derived from the uploaded file extension
    FileType, "UPPERCASE" {
        Pdf => "PDF",
        Doc => "DOC",
        Xls => "XLS",
        Ppt => "PPT",
        Txt => "TXT",
        Image => "IMAGE",
        Other => "OTHER",
    }
}

text_enum! {
    /// Kind of document access recorded in the history table
    HistoryAction, "lowercase" {
        View => "view",
        Download => "download",
    }
}

impl FileType {
    /// Classify a filename by its extension
    pub fn from_filename(filename: &str) -> Self {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => FileType::Pdf,
            "doc" | "docx" => FileType::Doc,
            "xls" | "xlsx" => FileType::Xls,
            "ppt" | "pptx" => FileType::Ppt,
            "txt" => FileType::Txt,
            "jpg" | "jpeg" | "png" | "gif" => FileType::Image,
            _ => FileType::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub university_id: Option<String>,
    pub phone_number: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing)]
    pub google_id: Option<String>,
    pub is_private: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Major {
    pub major_id: i64,
    pub major_name: String,
    pub major_code: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AcademicYear {
    pub year_id: i64,
    pub year_name: String,
    pub year_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Department {
    pub department_id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Subject {
    pub subject_id: i64,
    pub subject_name: String,
    pub subject_code: String,
    pub description: Option<String>,
    pub major_id: i64,
    pub year_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Document {
    pub document_id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Storage reference, `minio://<bucket>/<object>`
    pub file_path: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub subject_id: i64,
    pub user_id: i64,
    pub status: ContentStatus,
    pub view_count: i64,
    pub download_count: i64,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Object name portion of the storage reference
    pub fn stored_filename(&self) -> &str {
        self.file_path
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tag {
    pub tag_id: i64,
    pub tag_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
    pub comment_id: i64,
    pub content: String,
    pub user_id: i64,
    pub document_id: i64,
    pub parent_comment_id: Option<i64>,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Rating {
    pub rating_id: i64,
    pub document_id: i64,
    pub user_id: i64,
    /// 1..=5, or 0 for a like without a score
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DocumentHistory {
    pub history_id: i64,
    pub document_id: i64,
    pub user_id: i64,
    pub action: HistoryAction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SharedLink {
    pub link_id: i64,
    pub document_id: i64,
    pub user_id: i64,
    pub share_token: String,
    pub expiration_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SharedLink {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Forum {
    pub forum_id: i64,
    pub subject_id: i64,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ForumPost {
    pub post_id: i64,
    pub forum_id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub status: ContentStatus,
    pub views: i64,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ForumReply {
    pub reply_id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub parent_reply_id: Option<i64>,
    pub content: String,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub notification_id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub is_read: bool,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub reference_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SystemConfigEntry {
    pub config_id: i64,
    pub config_key: String,
    pub config_value: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_file_type_from_filename() {
        assert_eq!(FileType::from_filename("notes.PDF"), FileType::Pdf);
        assert_eq!(FileType::from_filename("slides.pptx"), FileType::Ppt);
        assert_eq!(FileType::from_filename("sheet.xls"), FileType::Xls);
        assert_eq!(FileType::from_filename("photo.jpeg"), FileType::Image);
        // bmp/webp preview fine but are not classified as IMAGE uploads
        assert_eq!(FileType::from_filename("scan.bmp"), FileType::Other);
        assert_eq!(FileType::from_filename("README"), FileType::Other);
    }

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!(UserRole::from_str("Admin").unwrap(), UserRole::Admin);
        assert_eq!(FileType::from_str("pdf").unwrap(), FileType::Pdf);
        assert_eq!(ContentStatus::from_str(" pending ").unwrap(), ContentStatus::Pending);

        let err = ContentStatus::from_str("archived").unwrap_err();
        assert!(err.to_string().contains("approved, pending, rejected"));
    }

    #[test]
    fn test_enum_serde_casing() {
        assert_eq!(serde_json::to_string(&FileType::Image).unwrap(), "\"IMAGE\"");
        assert_eq!(serde_json::to_string(&UserStatus::Banned).unwrap(), "\"banned\"");
        let action: HistoryAction = serde_json::from_str("\"download\"").unwrap();
        assert_eq!(action, HistoryAction::Download);
    }

    #[test]
    fn test_shared_link_expiry() {
        let now = Utc::now();
        let mut link = SharedLink {
            link_id: 1,
            document_id: 1,
            user_id: 1,
            share_token: "t".into(),
            expiration_date: None,
            created_at: now,
        };
        assert!(!link.is_expired(now));
        link.expiration_date = Some(now - chrono::Duration::minutes(1));
        assert!(link.is_expired(now));
    }
}
