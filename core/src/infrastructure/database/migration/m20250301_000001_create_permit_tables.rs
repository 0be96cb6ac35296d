use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(Buildings::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Buildings::Bin)
							.string()
							.not_null()
							.primary_key(),
					)
					.col(ColumnDef::new(Buildings::Borough).string())
					.col(ColumnDef::new(Buildings::Block).string())
					.col(ColumnDef::new(Buildings::Lot).string())
					.col(ColumnDef::new(Buildings::HouseNumber).string())
					.col(ColumnDef::new(Buildings::StreetName).string())
					.col(ColumnDef::new(Buildings::ZipCode).string())
					.col(ColumnDef::new(Buildings::CommunityBoard).string())
					.col(ColumnDef::new(Buildings::ZoningDistrict).string())
					.col(
						ColumnDef::new(Buildings::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(PermitDetails::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(PermitDetails::PermitNumber)
							.string()
							.not_null()
							.primary_key(),
					)
					.col(ColumnDef::new(PermitDetails::FilingDate).date())
					.col(ColumnDef::new(PermitDetails::FilingStatus).string())
					.col(ColumnDef::new(PermitDetails::PermitStatus).string())
					.col(ColumnDef::new(PermitDetails::PermitType).string())
					.col(ColumnDef::new(PermitDetails::PermitSubtype).string())
					.col(ColumnDef::new(PermitDetails::WorkType).string())
					.col(ColumnDef::new(PermitDetails::SelfCert).string())
					.col(
						ColumnDef::new(PermitDetails::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Entities::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Entities::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Entities::Role).string().not_null())
					.col(ColumnDef::new(Entities::BusinessName).string())
					.col(ColumnDef::new(Entities::PersonName).string())
					.col(ColumnDef::new(Entities::LicenseNumber).string())
					.col(ColumnDef::new(Entities::LicenseType).string())
					.col(ColumnDef::new(Entities::Phone).string())
					.col(
						ColumnDef::new(Entities::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		// Uniqueness applies only to named businesses; sea-query's index
		// builder cannot express the predicate, so raw SQL it is.
		manager
			.get_connection()
			.execute_unprepared(
				"CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_role_business \
				 ON entities (role, business_name) WHERE business_name IS NOT NULL",
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Permits::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Permits::Id)
							.string()
							.not_null()
							.primary_key(),
					)
					.col(ColumnDef::new(Permits::Borough).string())
					.col(ColumnDef::new(Permits::Bin).string())
					.col(ColumnDef::new(Permits::PermitNumber).string())
					.col(ColumnDef::new(Permits::Status).string())
					.col(ColumnDef::new(Permits::PermitType).string())
					.col(ColumnDef::new(Permits::JobType).string())
					.col(ColumnDef::new(Permits::IssuanceDate).date())
					.col(ColumnDef::new(Permits::ExpirationDate).date())
					.col(ColumnDef::new(Permits::Latitude).double())
					.col(ColumnDef::new(Permits::Longitude).double())
					.col(ColumnDef::new(Permits::GeomLon).double())
					.col(ColumnDef::new(Permits::GeomLat).double())
					.col(ColumnDef::new(Permits::Raw).json().not_null())
					.col(
						ColumnDef::new(Permits::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_permits_geom")
					.table(Permits::Table)
					.col(Permits::GeomLon)
					.col(Permits::GeomLat)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_permits_issuance_date")
					.table(Permits::Table)
					.col(Permits::IssuanceDate)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_permits_updated_at")
					.table(Permits::Table)
					.col(Permits::UpdatedAt)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(SyncState::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(SyncState::Id)
							.integer()
							.not_null()
							.primary_key(),
					)
					.col(ColumnDef::new(SyncState::LastSyncedUpdatedAt).timestamp_with_time_zone())
					.col(
						ColumnDef::new(SyncState::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(SyncState::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Permits::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Entities::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(PermitDetails::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Buildings::Table).to_owned())
			.await?;
		Ok(())
	}
}

#[derive(DeriveIden)]
enum Buildings {
	Table,
	Bin,
	Borough,
	Block,
	Lot,
	HouseNumber,
	StreetName,
	ZipCode,
	CommunityBoard,
	ZoningDistrict,
	UpdatedAt,
}

#[derive(DeriveIden)]
enum PermitDetails {
	Table,
	PermitNumber,
	FilingDate,
	FilingStatus,
	PermitStatus,
	PermitType,
	PermitSubtype,
	WorkType,
	SelfCert,
	UpdatedAt,
}

#[derive(DeriveIden)]
enum Entities {
	Table,
	Id,
	Role,
	BusinessName,
	PersonName,
	LicenseNumber,
	LicenseType,
	Phone,
	UpdatedAt,
}

#[derive(DeriveIden)]
enum Permits {
	Table,
	Id,
	Borough,
	Bin,
	PermitNumber,
	Status,
	PermitType,
	JobType,
	IssuanceDate,
	ExpirationDate,
	Latitude,
	Longitude,
	GeomLon,
	GeomLat,
	Raw,
	UpdatedAt,
}

#[derive(DeriveIden)]
enum SyncState {
	Table,
	Id,
	LastSyncedUpdatedAt,
	UpdatedAt,
}
