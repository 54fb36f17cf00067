//! `state_records` table: one row per accepted command.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "state_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Canonical lowercase relay state
    pub state: String,
    pub timestamp: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
