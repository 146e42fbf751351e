use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Single-use password reset token. Only the SHA-256 hash of the raw token
/// is stored; the raw value travels in the reset email and nowhere else.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "password_reset_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A token is usable while unexpired and not yet consumed.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(expires_in: i64, used: bool) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "deadbeef".into(),
            expires_at: now + Duration::seconds(expires_in),
            created_at: now,
            used_at: used.then_some(now),
        }
    }

    #[test]
    fn fresh_token_is_usable() {
        assert!(token(3600, false).is_usable(Utc::now()));
    }

    #[test]
    fn expired_token_is_not_usable() {
        assert!(!token(-5, false).is_usable(Utc::now()));
    }

    #[test]
    fn consumed_token_is_not_usable() {
        assert!(!token(3600, true).is_usable(Utc::now()));
    }
}
