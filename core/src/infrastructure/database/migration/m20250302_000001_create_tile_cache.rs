use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(TileCache::Table)
					.if_not_exists()
					.col(ColumnDef::new(TileCache::Layer).string().not_null())
					.col(ColumnDef::new(TileCache::Z).integer().not_null())
					.col(ColumnDef::new(TileCache::X).integer().not_null())
					.col(ColumnDef::new(TileCache::Y).integer().not_null())
					.col(ColumnDef::new(TileCache::Date).date().not_null())
					.col(ColumnDef::new(TileCache::Bytes).binary().not_null())
					.col(
						ColumnDef::new(TileCache::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.primary_key(
						Index::create()
							.col(TileCache::Layer)
							.col(TileCache::Z)
							.col(TileCache::X)
							.col(TileCache::Y)
							.col(TileCache::Date),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_tile_cache_created_at")
					.table(TileCache::Table)
					.col(TileCache::CreatedAt)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(TileCache::Table).to_owned())
			.await?;
		Ok(())
	}
}

#[derive(DeriveIden)]
enum TileCache {
	Table,
	Layer,
	Z,
	X,
	Y,
	Date,
	Bytes,
	CreatedAt,
}
