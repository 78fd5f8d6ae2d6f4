//! Append-only log of calls made through the relay
use chrono::Utc;
use sea_orm::{ActiveValue::Set, QueryOrder, entity::prelude::*};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "generation_history")]
/// One relayed call
pub struct Model {
    #[sea_orm(primary_key)]
    /// db id
    pub id: i32,
    /// platform job id the call was about
    pub video_id: String,
    /// calling app
    pub app_bundle_id: String,
    /// calling user within the app
    pub apphud_user_id: String,
    /// what was done
    pub description: String,
    /// when it was recorded
    pub created_at: DateTime,
}

/// no relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// What a history entry describes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// POST /text2video
    TextToVideo,
    /// POST /image2video
    ImageToVideo,
    /// GET /get_status
    StatusCheck,
}

impl CallKind {
    /// Stored description
    pub fn description(self) -> &'static str {
        match self {
            Self::TextToVideo => "generate video from text",
            Self::ImageToVideo => "generate video from image",
            Self::StatusCheck => "check generation",
        }
    }
}

/// Who made a relayed call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    /// calling app
    pub app_bundle_id: String,
    /// calling user within the app
    pub apphud_user_id: String,
}

/// Appends one entry to the log
pub async fn record(
    db: &DatabaseConnection,
    video_id: &str,
    caller: &Caller,
    kind: CallKind,
) -> Result<Model, DbErr> {
    ActiveModel {
        video_id: Set(video_id.to_string()),
        app_bundle_id: Set(caller.app_bundle_id.clone()),
        apphud_user_id: Set(caller.apphud_user_id.clone()),
        description: Set(kind.description().to_string()),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Entries for one job, oldest first
pub async fn for_video(db: &DatabaseConnection, video_id: &str) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::VideoId.eq(video_id))
        .order_by_asc(Column::Id)
        .all(db)
        .await
}

#[cfg(test)]
mod tests {
    use sea_orm_migration::MigratorTrait;

    use super::*;

    #[tokio::test]
    async fn entries_are_appended() {
        let db = crate::db::connect_test_db().await.expect("connect test db");
        crate::db::migrations::Migrator::up(&db, None)
            .await
            .expect("run migrations");
        let caller = Caller {
            app_bundle_id: "org.example.app".to_string(),
            apphud_user_id: "user-1".to_string(),
        };

        record(&db, "123", &caller, CallKind::TextToVideo)
            .await
            .expect("record submit");
        record(&db, "123", &caller, CallKind::StatusCheck)
            .await
            .expect("record poll");
        record(&db, "456", &caller, CallKind::StatusCheck)
            .await
            .expect("record other");

        let entries = for_video(&db, "123").await.expect("fetch entries");
        let descriptions: Vec<&str> = entries.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec!["generate video from text", "check generation"]
        );
        assert!(entries.iter().all(|e| e.apphud_user_id == "user-1"));
    }
}
